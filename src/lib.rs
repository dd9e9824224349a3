#![forbid(unsafe_code)]
//! Asset generation from captured frames.
//!
//! Frames (or a live, channel-tagged buffer stream) become an encoded video, an animated gif,
//! or a paired still + video sharing one identifier. [`AssetOrchestrator`] is the single entry
//! point; the stages it sequences are public for callers that need only one of them.

pub mod capture;
pub mod compose;
pub mod config;
pub mod encode;
pub mod foundation;
pub mod live;
pub mod media;
pub mod orchestrator;
pub mod paired;

pub use capture::{FrameProducer, IterSource, LiveBufferSource, capture_frames};
pub use compose::layer::{InterpMode, Keyframe, Keyframes, OverlayItem, RenderLayer};
pub use compose::orientation::{Orientation, orientation_from_transform};
pub use compose::stage::{ComposedVideo, CompositionRequest, CompositionStage};
pub use config::PipelineConfig;
pub use encode::gif::{GifEncoder, GifInfo, GifOptions};
pub use encode::pixel::{PixelBuffer, PixelBufferConverter};
pub use encode::sequential::{EncodeStats, EncodedVideo, SequentialEncoder};
pub use foundation::cache::CacheDir;
pub use tokio_util::sync::CancellationToken;
pub use foundation::core::{Affine, Asset, DEFAULT_PREFERRED_FPS, Frame, FrameQueue, TimingModel, Vec2};
pub use foundation::error::{AssetError, AssetResult, ErrorKind};
pub use foundation::progress::{ProgressBlender, ProgressFn, StageProgress};
pub use live::multiplexer::{ChannelKind, DualTrackLiveMultiplexer, LiveBuffer, LiveOptions, PushOutcome};
pub use media::backend::{BackendKind, MediaBackend, MediaInfo, create_backend};
pub use media::ffmpeg::FfmpegBackend;
pub use media::manifest::ManifestBackend;
pub use media::metadata::{MetadataItem, MetadataKey, TimedMetadata, VendorField};
pub use orchestrator::{AssetOrchestrator, AssetRequest, FrameSource, OutputKind};
pub use paired::composer::{PairedAsset, PairedAssetComposer};
pub use paired::exif::read_still_identifier;
pub use paired::extract::{ExtractedPair, PairedAssetSource, PairedResource, ResourceKind, extract};
