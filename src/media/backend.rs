use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::RgbaImage;
use smallvec::SmallVec;

use crate::foundation::core::Affine;
use crate::foundation::error::AssetResult;
use crate::media::metadata::{MetadataItem, MetadataKey, TimedMetadata};
use crate::media::sample::{Sample, TrackKind, TrackSpec};

/// Synchronous end of one output track. Driven by a [`crate::media::writer::WriterSession`]
/// worker; samples arrive in strictly increasing presentation order, rebased to the track's
/// session start.
pub trait SampleSink: Send {
    fn write(&mut self, sample: Sample) -> AssetResult<()>;
    /// Flush and close the backing file.
    fn finish(self: Box<Self>) -> AssetResult<()>;
}

/// Sequential decoder of one track of an existing container.
pub trait SampleReader: Send {
    /// `Ok(None)` at end of track.
    fn next_sample(&mut self) -> AssetResult<Option<Sample>>;
}

/// Track description returned by [`MediaBackend::probe`].
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TrackInfo {
    pub kind: TrackKind,
    /// Stored pixel size (before the display transform).
    pub natural_size: Option<(u32, u32)>,
    pub transform: Affine,
    pub frame_rate: Option<f64>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u16>,
    /// Presentation times of every sample, when the container exposes them.
    pub sample_times: Vec<f64>,
}

impl TrackInfo {
    pub fn sample_count(&self) -> usize {
        self.sample_times.len()
    }
}

/// Container description returned by [`MediaBackend::probe`].
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MediaInfo {
    /// Seconds.
    pub duration: f64,
    pub tracks: SmallVec<[TrackInfo; 4]>,
    /// Container-level items keyed by their wire key.
    pub metadata: BTreeMap<String, String>,
    pub timed_metadata: Vec<TimedMetadata>,
}

impl MediaInfo {
    pub fn video_track(&self) -> Option<&TrackInfo> {
        self.tracks.iter().find(|t| t.kind == TrackKind::Video)
    }

    pub fn audio_tracks(&self) -> impl Iterator<Item = &TrackInfo> {
        self.tracks.iter().filter(|t| t.kind == TrackKind::Audio)
    }

    pub fn has_audio(&self) -> bool {
        self.audio_tracks().next().is_some()
    }

    pub fn content_identifier(&self) -> Option<&str> {
        self.metadata
            .get(MetadataKey::ContentIdentifier.wire_key())
            .map(String::as_str)
    }

    /// Offset of the embedded still-image-time marker, if any.
    pub fn still_image_time(&self) -> Option<f64> {
        self.timed_metadata
            .iter()
            .find(|m| m.key == MetadataKey::StillImageTime)
            .map(|m| m.pts)
    }
}

/// One input of a mux: the first track of `kind` found in `path`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MuxInput {
    pub path: PathBuf,
    pub kind: TrackKind,
}

/// Copy whole tracks from existing files into a new container, untouched.
#[derive(Clone, Debug, Default)]
pub struct MuxRequest {
    pub inputs: Vec<MuxInput>,
    pub output: PathBuf,
    pub metadata: Vec<MetadataItem>,
    pub timed_metadata: Vec<TimedMetadata>,
}

/// Media container capabilities used by every stage.
pub trait MediaBackend: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &'static str;

    /// Allocate a writer for one track at `path`.
    fn open_sink(&self, path: &Path, spec: &TrackSpec) -> AssetResult<Box<dyn SampleSink>>;

    fn probe(&self, path: &Path) -> AssetResult<MediaInfo>;

    /// Decode the first track of `kind` in `path`.
    fn open_reader(&self, path: &Path, kind: TrackKind) -> AssetResult<Box<dyn SampleReader>>;

    /// Decode the video frame displayed at `seconds`.
    fn frame_at(&self, path: &Path, seconds: f64) -> AssetResult<RgbaImage>;

    fn mux(&self, request: &MuxRequest) -> AssetResult<()>;
}

/// Available backend implementations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// System `ffmpeg`/`ffprobe` binaries.
    #[default]
    Ffmpeg,
    /// JSON track manifests; no external tools needed.
    Manifest,
}

/// Create a media backend implementation.
pub fn create_backend(kind: BackendKind) -> Arc<dyn MediaBackend> {
    match kind {
        BackendKind::Ffmpeg => Arc::new(crate::media::ffmpeg::FfmpegBackend::new()),
        BackendKind::Manifest => Arc::new(crate::media::manifest::ManifestBackend::new()),
    }
}
