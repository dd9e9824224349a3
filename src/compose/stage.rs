use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::compose::layer::RenderLayer;
use crate::compose::orientation::{Orientation, orientation_from_transform, render_size};
use crate::encode::pixel::PixelBufferConverter;
use crate::foundation::cache::{CacheDir, ensure_parent_dir, remove_if_exists};
use crate::foundation::error::{AssetError, AssetResult};
use crate::foundation::progress::StageProgress;
use crate::media::backend::{MediaBackend, MediaInfo, MuxInput, MuxRequest};
use crate::media::sample::{Sample, TrackKind, TrackSpec, VideoSample, VideoTrackSpec};
use crate::media::writer::WriterSession;

type OverlayFn = Box<dyn FnOnce(&mut RenderLayer) + Send>;

/// Overlay injection for one composition pass.
///
/// The callback receives the empty overlay layer, sized to the video's render size, and runs
/// exactly once before export begins.
pub struct CompositionRequest {
    overlay: OverlayFn,
}

impl CompositionRequest {
    pub fn new(overlay: impl FnOnce(&mut RenderLayer) + Send + 'static) -> Self {
        Self {
            overlay: Box::new(overlay),
        }
    }
}

impl std::fmt::Debug for CompositionRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositionRequest").finish_non_exhaustive()
    }
}

/// Result of [`CompositionStage::compose`].
#[derive(Clone, Debug, PartialEq)]
pub struct ComposedVideo {
    pub path: PathBuf,
    pub orientation: Orientation,
    pub portrait: bool,
    /// Size the overlay layer was rendered at.
    pub render_size: (u32, u32),
}

/// Re-exports an encoded video with an overlay layer baked into every frame.
#[derive(Clone, Debug)]
pub struct CompositionStage {
    backend: Arc<dyn MediaBackend>,
    cache: CacheDir,
    queue_depth: usize,
    poll_fps: u32,
}

/// Progress shared between the export worker and the poller, as `f64` bits.
#[derive(Debug, Default)]
struct ExportProgress(AtomicU64);

impl ExportProgress {
    fn set(&self, v: f64) {
        self.0.store(v.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }

    fn get(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }
}

struct ExportJob {
    backend: Arc<dyn MediaBackend>,
    source: PathBuf,
    info: MediaInfo,
    layer: RenderLayer,
    orientation: Orientation,
    video_tmp: PathBuf,
    out: PathBuf,
    queue_depth: usize,
    cancel: CancellationToken,
    progress: Arc<ExportProgress>,
}

impl ExportJob {
    fn run(self) -> AssetResult<PathBuf> {
        let res = self.render_video().and_then(|()| self.mux());
        if let Err(e) = remove_if_exists(&self.video_tmp) {
            tracing::warn!(error = %e, "failed to remove composition intermediate");
        }
        res.map(|()| self.out.clone())
    }

    fn render_video(&self) -> AssetResult<()> {
        let track = self
            .info
            .video_track()
            .ok_or(AssetError::CouldNotAccessVideoTrack)?;
        let (width, height) = track
            .natural_size
            .ok_or_else(|| AssetError::composition("source video track has no size"))?;
        let fps = track.frame_rate.map_or(30, |r| (r.round() as u32).max(1));
        let total = track.sample_count();
        let duration = self.info.duration;

        let mut reader = self
            .backend
            .open_reader(&self.source, TrackKind::Video)
            .map_err(|e| AssetError::export_session(e.to_string()))?;
        let spec = TrackSpec::Video(VideoTrackSpec {
            width,
            height,
            fps,
            transform: track.transform,
        });
        let mut session =
            WriterSession::open(self.backend.as_ref(), &self.video_tmp, &spec, self.queue_depth)
                .map_err(|e| AssetError::export_session(e.to_string()))?;
        session.start(0.0)?;

        let mut index = 0usize;
        while let Some(sample) = reader.next_sample()? {
            if self.cancel.is_cancelled() {
                return Err(AssetError::Cancelled);
            }
            let Sample::Video(VideoSample { pts, buffer }) = sample else {
                continue;
            };

            let mut frame = self.orientation.to_display(buffer.to_rgba_image());
            self.layer.composite_onto(&mut frame, pts)?;
            let frame = self.orientation.to_natural(frame);
            let buffer = PixelBufferConverter::convert_image(&frame)
                .ok_or_else(|| AssetError::unknown("failed to allocate composited frame"))?;

            session.wait_until_ready()?;
            session.append(Sample::Video(VideoSample { pts, buffer }))?;

            index += 1;
            let fraction = if total > 0 {
                index as f64 / total as f64
            } else if duration > 0.0 {
                pts / duration
            } else {
                0.0
            };
            // The final step belongs to the mux.
            self.progress.set(fraction.min(0.99));
        }
        session.finish()?;
        Ok(())
    }

    fn mux(&self) -> AssetResult<()> {
        let mut inputs = vec![MuxInput {
            path: self.video_tmp.clone(),
            kind: TrackKind::Video,
        }];
        if self.info.has_audio() {
            inputs.push(MuxInput {
                path: self.source.clone(),
                kind: TrackKind::Audio,
            });
        }
        self.backend.mux(&MuxRequest {
            inputs,
            output: self.out.clone(),
            ..MuxRequest::default()
        })?;
        self.progress.set(1.0);
        Ok(())
    }
}

/// Map a terminal export failure onto the composition error set.
fn export_status(err: AssetError) -> AssetError {
    match err {
        AssetError::CouldNotCreateComposition(_)
        | AssetError::CouldNotCreateExportSession(_)
        | AssetError::CouldNotCreateOutputLocation(_)
        | AssetError::Cancelled
        | AssetError::Unknown(_) => err,
        AssetError::CouldNotAccessVideoTrack => {
            AssetError::composition("source has no readable video track")
        }
        other => AssetError::unknown(other.to_string()),
    }
}

impl CompositionStage {
    pub fn new(backend: Arc<dyn MediaBackend>, cache: CacheDir) -> Self {
        Self {
            backend,
            cache,
            queue_depth: 4,
            poll_fps: crate::foundation::core::DEFAULT_PREFERRED_FPS,
        }
    }

    pub fn with_queue_depth(mut self, depth: usize) -> Self {
        self.queue_depth = depth;
        self
    }

    /// Cadence at which export progress is sampled.
    pub fn with_poll_fps(mut self, fps: u32) -> Self {
        self.poll_fps = fps.max(1);
        self
    }

    pub fn compose(
        &self,
        source: &Path,
        request: CompositionRequest,
        out: &Path,
        progress: &StageProgress,
    ) -> AssetResult<ComposedVideo> {
        self.compose_with_cancel(source, request, out, progress, &CancellationToken::new())
    }

    /// Overlay `request` onto `source` and export to `out`.
    ///
    /// Export runs on a worker thread; this thread polls its progress at the configured
    /// cadence until the export terminates.
    #[tracing::instrument(skip(self, request, progress, cancel), fields(source = %source.display()))]
    pub fn compose_with_cancel(
        &self,
        source: &Path,
        request: CompositionRequest,
        out: &Path,
        progress: &StageProgress,
        cancel: &CancellationToken,
    ) -> AssetResult<ComposedVideo> {
        let info = self.backend.probe(source).map_err(|e| {
            AssetError::composition(format!("failed to read '{}': {e}", source.display()))
        })?;
        let track = info
            .video_track()
            .ok_or_else(|| AssetError::composition("source has no video track"))?;
        let natural = track
            .natural_size
            .ok_or_else(|| AssetError::composition("source video track has no size"))?;
        let (orientation, portrait) = orientation_from_transform(track.transform);
        let (render_w, render_h) = render_size(natural, track.transform);

        let mut layer = RenderLayer::new(render_w, render_h);
        (request.overlay)(&mut layer);
        layer.validate()?;
        tracing::debug!(?orientation, portrait, render_w, render_h, "overlay layer prepared");

        ensure_parent_dir(out)
            .and_then(|()| remove_if_exists(out))
            .map_err(|e| AssetError::output_location(e.to_string()))?;
        let video_tmp = self
            .cache
            .unique_path("compose", "mov")
            .map_err(|e| AssetError::output_location(e.to_string()))?;

        let shared = Arc::new(ExportProgress::default());
        let job = ExportJob {
            backend: self.backend.clone(),
            source: source.to_path_buf(),
            info,
            layer,
            orientation,
            video_tmp,
            out: out.to_path_buf(),
            queue_depth: self.queue_depth,
            cancel: cancel.clone(),
            progress: shared.clone(),
        };

        let (tx, rx) = mpsc::channel();
        std::thread::Builder::new()
            .name("framecast-export".to_string())
            .spawn(move || {
                let _ = tx.send(job.run());
            })
            .map_err(|e| AssetError::export_session(format!("failed to spawn export: {e}")))?;

        let tick = Duration::from_secs_f64(1.0 / f64::from(self.poll_fps));
        let mut polling = true;
        let result = loop {
            match rx.recv_timeout(tick) {
                Ok(res) => break res,
                Err(RecvTimeoutError::Timeout) => {
                    if polling {
                        let p = shared.get();
                        progress.report(p);
                        polling = p < 1.0;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    break Err(AssetError::unknown("export worker exited without a status"));
                }
            }
        };

        let path = result.map_err(export_status)?;
        progress.finish();
        tracing::info!(path = %path.display(), "composition exported");
        Ok(ComposedVideo {
            path,
            orientation,
            portrait,
            render_size: (render_w, render_h),
        })
    }
}

#[cfg(test)]
#[path = "../../tests/unit/compose/stage.rs"]
mod tests;
