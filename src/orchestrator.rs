use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;

use image::RgbaImage;

use crate::capture::LiveBufferSource;
use crate::compose::orientation::orientation_from_transform;
use crate::compose::stage::{CompositionRequest, CompositionStage};
use crate::config::PipelineConfig;
use crate::encode::gif::GifEncoder;
use crate::encode::sequential::SequentialEncoder;
use crate::foundation::cache::{CacheDir, remove_if_exists};
use crate::foundation::core::{Affine, Asset, Frame, FrameQueue, TimingModel};
use crate::foundation::error::{AssetError, AssetResult};
use crate::foundation::progress::{ProgressBlender, ProgressFn, StageProgress};
use crate::live::multiplexer::{DualTrackLiveMultiplexer, LiveOptions, PushOutcome};
use crate::media::backend::MediaBackend;
use crate::media::sample::{Sample, TrackKind};
use crate::paired::composer::PairedAssetComposer;

/// Where frames come from.
pub enum FrameSource {
    /// A finished capture.
    Frames { queue: FrameQueue, timing: TimingModel },
    /// A live, channel-tagged stream; drained to completion before downstream stages run.
    Live(Box<dyn LiveBufferSource>),
}

impl FrameSource {
    pub fn frames(queue: FrameQueue, timing: TimingModel) -> Self {
        Self::Frames { queue, timing }
    }

    pub fn live(source: impl LiveBufferSource + 'static) -> Self {
        Self::Live(Box::new(source))
    }
}

impl std::fmt::Debug for FrameSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Frames { queue, timing } => f
                .debug_struct("Frames")
                .field("frames", &queue.len())
                .field("timing", timing)
                .finish(),
            Self::Live(_) => f.write_str("Live"),
        }
    }
}

/// Requested artifact type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    Video,
    Gif,
    LivePhoto,
}

/// One asset generation job.
#[derive(Debug)]
pub struct AssetRequest {
    pub source: FrameSource,
    pub output: OutputKind,
    pub composition: Option<CompositionRequest>,
    /// Still for [`OutputKind::LivePhoto`]; extracted from the video when absent.
    pub still: Option<RgbaImage>,
    /// Display transform stored with offline encodes.
    pub transform: Affine,
    /// File stem of the artifacts.
    pub name: String,
}

impl AssetRequest {
    pub fn new(source: FrameSource, output: OutputKind) -> Self {
        Self {
            source,
            output,
            composition: None,
            still: None,
            transform: Affine::IDENTITY,
            name: "framecast".to_string(),
        }
    }

    pub fn with_composition(mut self, request: CompositionRequest) -> Self {
        self.composition = Some(request);
        self
    }

    pub fn with_still(mut self, still: RgbaImage) -> Self {
        self.still = Some(still);
        self
    }

    pub fn with_transform(mut self, transform: Affine) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// Per-stage progress weights for `output`.
///
/// The first stage is the base encode (or the live merge), then the optional composition,
/// then the output-specific stage.
pub fn stage_weights(output: OutputKind, composed: bool, live: bool) -> Vec<f64> {
    match (output, composed) {
        (OutputKind::Video, false) => vec![1.0],
        (OutputKind::Video, true) => vec![0.5, 0.5],
        (OutputKind::Gif, false) if !live => vec![1.0],
        (OutputKind::Gif, false) | (OutputKind::LivePhoto, false) => vec![0.5, 0.5],
        (OutputKind::Gif, true) | (OutputKind::LivePhoto, true) => vec![0.5, 0.25, 0.25],
    }
}

/// Clears the busy flag when the running operation ends.
struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Single entry point: sequences encode, composition, and the output stage for one request.
///
/// One operation may run at a time; a second call while one is in flight fails with
/// [`AssetError::Busy`].
#[derive(Clone, Debug)]
pub struct AssetOrchestrator {
    config: PipelineConfig,
    backend: Arc<dyn MediaBackend>,
    cache: CacheDir,
    busy: Arc<AtomicBool>,
}

impl AssetOrchestrator {
    pub fn new(config: PipelineConfig) -> AssetResult<Self> {
        config.validate()?;
        let backend = config.media_backend();
        Ok(Self::with_backend(config, backend))
    }

    pub fn with_backend(config: PipelineConfig, backend: Arc<dyn MediaBackend>) -> Self {
        let cache = config.cache();
        Self {
            config,
            backend,
            cache,
            busy: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn cache(&self) -> &CacheDir {
        &self.cache
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    fn acquire(&self) -> AssetResult<BusyGuard> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| AssetError::Busy)?;
        Ok(BusyGuard(self.busy.clone()))
    }

    /// Run `request` on a background worker.
    ///
    /// `progress` and `completion` are invoked from that worker. `Err(Busy)` is returned
    /// synchronously when another operation is in flight; every other outcome goes through
    /// `completion`, exactly once.
    pub fn generate(
        &self,
        request: AssetRequest,
        progress: ProgressFn,
        completion: impl FnOnce(AssetResult<Asset>) + Send + 'static,
    ) -> AssetResult<()> {
        let guard = self.acquire()?;
        let this = self.clone();
        std::thread::Builder::new()
            .name("framecast-orchestrator".to_string())
            .spawn(move || {
                let res = this.run(request, progress);
                drop(guard);
                completion(res);
            })?;
        Ok(())
    }

    /// Blocking form of [`AssetOrchestrator::generate`].
    pub fn generate_blocking(
        &self,
        request: AssetRequest,
        progress: ProgressFn,
    ) -> AssetResult<Asset> {
        let (tx, rx) = mpsc::channel();
        self.generate(request, progress, move |res| {
            let _ = tx.send(res);
        })?;
        rx.recv()
            .map_err(|_| AssetError::unknown("orchestrator worker exited without a result"))?
    }

    #[tracing::instrument(skip(self, request, progress), fields(output = ?request.output, name = %request.name))]
    fn run(&self, request: AssetRequest, progress: ProgressFn) -> AssetResult<Asset> {
        self.cache.ensure()?;
        let AssetRequest {
            source,
            output,
            composition,
            still,
            transform,
            name,
        } = request;
        let live = matches!(source, FrameSource::Live(_));
        let blender = ProgressBlender::new(
            &stage_weights(output, composition.is_some(), live),
            progress,
        );

        // Offline gifs without an overlay skip the video round trip.
        let source = match source {
            FrameSource::Frames { mut queue, .. }
                if output == OutputKind::Gif && composition.is_none() =>
            {
                let out = self.cache.fresh_path(&format!("{name}.gif"))?;
                let path =
                    GifEncoder::encode(&mut queue, &self.config.gif, &out, &blender.stage(0))?;
                blender.finish();
                return Ok(Asset::Gif(path));
            }
            other => other,
        };

        let base = self.base_video(source, transform, &name, &blender.stage(0))?;
        let output_stage = if composition.is_some() { 2 } else { 1 };
        let mut intermediates = Vec::new();

        let video = match composition {
            Some(request) => {
                let out = self.cache.fresh_path(&format!("{name}-composed.mov"))?;
                let composed = CompositionStage::new(self.backend.clone(), self.cache.clone())
                    .with_queue_depth(self.config.writer_queue_depth)
                    .with_poll_fps(self.config.preferred_fps)
                    .compose(&base, request, &out, &blender.stage(1));
                intermediates.push(base);
                match composed {
                    Ok(c) => c.path,
                    Err(e) => {
                        remove_all(&intermediates);
                        return Err(e);
                    }
                }
            }
            None => base,
        };

        let result = match output {
            OutputKind::Video => Ok(Asset::Video(video)),
            OutputKind::Gif => {
                let out = self.cache.fresh_path(&format!("{name}.gif"))?;
                let res = self.video_to_gif(&video, &out, &blender.stage(output_stage));
                intermediates.push(video);
                res.map(Asset::Gif)
            }
            OutputKind::LivePhoto => {
                let res = PairedAssetComposer::new(self.backend.clone(), self.cache.clone())
                    .with_queue_depth(self.config.writer_queue_depth)
                    .with_still_offset_fraction(self.config.still_offset_fraction)
                    .with_jpeg_quality(self.config.jpeg_quality)
                    .compose(&video, still, &blender.stage(output_stage));
                intermediates.push(video);
                res.map(|pair| Asset::LivePhoto {
                    still: pair.still,
                    video: pair.video,
                    identifier: pair.identifier,
                })
            }
        };
        remove_all(&intermediates);

        let asset = result?;
        blender.finish();
        tracing::info!(path = %asset.primary_path().display(), "asset generated");
        Ok(asset)
    }

    /// Encode the offline frames, or run the live capture to completion.
    fn base_video(
        &self,
        source: FrameSource,
        transform: Affine,
        name: &str,
        progress: &StageProgress,
    ) -> AssetResult<PathBuf> {
        match source {
            FrameSource::Frames { mut queue, timing } => {
                let out = self.cache.fresh_path(&format!("{name}.mov"))?;
                let encoded = SequentialEncoder::new(
                    self.backend.clone(),
                    self.config.writer_queue_depth,
                )
                .with_transform(transform)
                .encode(&mut queue, timing, &out, progress)?;
                Ok(encoded.path)
            }
            FrameSource::Live(mut buffers) => {
                let mut live = DualTrackLiveMultiplexer::new(
                    self.backend.clone(),
                    self.cache.clone(),
                    LiveOptions {
                        fps: self.config.preferred_fps,
                        transform,
                        queue_depth: self.config.writer_queue_depth,
                    },
                );
                while let Some(buffer) = buffers.next_buffer() {
                    match live.push(buffer) {
                        Ok(PushOutcome::Written) => {}
                        Ok(outcome) => tracing::debug!(?outcome, "live buffer dropped"),
                        Err(e) => tracing::warn!(error = %e, "live buffer rejected"),
                    }
                }
                let out = self.cache.fresh_path(&format!("{name}.mov"))?;
                let merged = live.finalize_blocking(out)?;
                progress.finish();
                Ok(merged)
            }
        }
    }

    /// Decode every frame of `video` in display orientation and encode them as a gif.
    fn video_to_gif(&self, video: &Path, out: &Path, progress: &StageProgress) -> AssetResult<PathBuf> {
        let info = self.backend.probe(video)?;
        let track = info
            .video_track()
            .ok_or(AssetError::CouldNotAccessVideoTrack)?;
        let (orientation, _) = orientation_from_transform(track.transform);

        let mut reader = self.backend.open_reader(video, TrackKind::Video)?;
        let mut queue = FrameQueue::new();
        while let Some(sample) = reader.next_sample()? {
            if let Sample::Video(v) = sample {
                let image = orientation.to_display(v.buffer.to_rgba_image());
                queue.push(Frame::new(image, self.config.capture_scale));
            }
        }
        tracing::debug!(frames = queue.len(), "frames extracted for gif");
        GifEncoder::encode(&mut queue, &self.config.gif, out, progress)
    }
}

fn remove_all(paths: &[PathBuf]) {
    for path in paths {
        if let Err(e) = remove_if_exists(path) {
            tracing::warn!(error = %e, "failed to remove intermediate");
        }
    }
}

#[cfg(test)]
#[path = "../tests/unit/orchestrator.rs"]
mod tests;
