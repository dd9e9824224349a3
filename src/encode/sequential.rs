use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::encode::pixel::PixelBufferConverter;
use crate::foundation::cache::remove_if_exists;
use crate::foundation::core::{Affine, FrameQueue, TimingModel};
use crate::foundation::error::{AssetError, AssetResult};
use crate::foundation::progress::StageProgress;
use crate::media::backend::MediaBackend;
use crate::media::sample::{Sample, TrackSpec, VideoSample, VideoTrackSpec};
use crate::media::writer::WriterSession;

/// Frame accounting for one encode run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EncodeStats {
    pub frames_total: usize,
    pub frames_written: usize,
    /// Frames dropped because they could not be converted or did not match the track size.
    pub frames_skipped: usize,
}

/// Result of [`SequentialEncoder::encode`].
#[derive(Clone, Debug, PartialEq)]
pub struct EncodedVideo {
    pub path: PathBuf,
    pub fps: u32,
    /// Natural size of the video track, in pixels.
    pub width: u32,
    pub height: u32,
    pub stats: EncodeStats,
}

/// Drains a [`FrameQueue`] into a single-track video, one frame at a time.
#[derive(Clone, Debug)]
pub struct SequentialEncoder {
    backend: Arc<dyn MediaBackend>,
    queue_depth: usize,
    transform: Affine,
}

impl SequentialEncoder {
    pub fn new(backend: Arc<dyn MediaBackend>, queue_depth: usize) -> Self {
        Self {
            backend,
            queue_depth,
            transform: Affine::IDENTITY,
        }
    }

    /// Display transform stored on the output track.
    pub fn with_transform(mut self, transform: Affine) -> Self {
        self.transform = transform;
        self
    }

    /// Encode every frame of `queue` into `out`.
    ///
    /// Frame `i` is presented at `i / fps`. Slots are released as they are consumed, so the
    /// queue holds no frames once this returns. Frames that cannot be converted, or whose pixel
    /// size differs from the first frame, are skipped.
    #[tracing::instrument(skip(self, queue, timing, progress), fields(out = %out.display()))]
    pub fn encode(
        &self,
        queue: &mut FrameQueue,
        timing: TimingModel,
        out: &Path,
        progress: &StageProgress,
    ) -> AssetResult<EncodedVideo> {
        let count = queue.len();
        if queue.pending() == 0 {
            return Err(AssetError::NoFrames);
        }
        let fps = timing.frame_rate(count)?;
        let (width, height) = (0..count)
            .filter_map(|i| queue.get(i))
            .map(|f| (f.pixel_width(), f.pixel_height()))
            .find(|(w, h)| *w > 0 && *h > 0)
            .ok_or_else(|| AssetError::configuration("frames have no pixels"))?;

        let spec = TrackSpec::Video(VideoTrackSpec {
            width,
            height,
            fps,
            transform: self.transform,
        });
        let mut session = WriterSession::open(self.backend.as_ref(), out, &spec, self.queue_depth)?;
        session.start(0.0)?;
        tracing::debug!(count, fps, width, height, "sequential encode started");

        let mut stats = EncodeStats {
            frames_total: count,
            ..EncodeStats::default()
        };
        for i in 0..count {
            let converted = queue.take(i).and_then(|frame| {
                if (frame.pixel_width(), frame.pixel_height()) != (width, height) {
                    tracing::warn!(
                        index = i,
                        got_w = frame.pixel_width(),
                        got_h = frame.pixel_height(),
                        "frame size differs from track size"
                    );
                    return None;
                }
                let buffer = PixelBufferConverter::convert(&frame);
                if buffer.is_none() {
                    tracing::warn!(index = i, "pixel buffer conversion failed");
                }
                buffer
            });

            match converted {
                Some(buffer) => {
                    session.wait_until_ready()?;
                    session.append(Sample::Video(VideoSample {
                        pts: i as f64 / f64::from(fps),
                        buffer,
                    }))?;
                    stats.frames_written += 1;
                }
                None => stats.frames_skipped += 1,
            }
            progress.report((i + 1) as f64 / count as f64);
        }

        let path = session.finish()?;
        if stats.frames_written == 0 {
            remove_if_exists(&path)?;
            return Err(AssetError::CouldNotWriteAsset);
        }
        progress.finish();
        tracing::info!(
            path = %path.display(),
            written = stats.frames_written,
            skipped = stats.frames_skipped,
            "video encoded"
        );

        Ok(EncodedVideo {
            path,
            fps,
            width,
            height,
            stats,
        })
    }
}

#[cfg(test)]
#[path = "../../tests/unit/encode/sequential.rs"]
mod tests;
