use std::path::{Path, PathBuf};
use std::time::Instant;

use image::RgbaImage;

use crate::foundation::error::{AssetError, AssetResult};

pub use kurbo::{Affine, Point, Rect, Vec2};

/// Frame rate used when no capture window was measured.
pub const DEFAULT_PREFERRED_FPS: u32 = 60;

/// One captured bitmap sample.
///
/// Pixels are straight-alpha RGBA8 at device resolution; `scale` relates them back to the
/// logical (point) size the producer rendered at.
#[derive(Clone, Debug)]
pub struct Frame {
    image: RgbaImage,
    scale: f64,
}

impl Frame {
    /// Wrap a device-resolution bitmap captured at `scale`.
    pub fn new(image: RgbaImage, scale: f64) -> Self {
        let scale = if scale.is_finite() && scale > 0.0 {
            scale
        } else {
            1.0
        };
        Self { image, scale }
    }

    /// A uniformly filled frame of `width`x`height` points at `scale`.
    pub fn solid(width: u32, height: u32, scale: f64, rgba: [u8; 4]) -> Self {
        let px_w = (f64::from(width) * scale).round() as u32;
        let px_h = (f64::from(height) * scale).round() as u32;
        Self::new(
            RgbaImage::from_pixel(px_w, px_h, image::Rgba(rgba)),
            scale,
        )
    }

    /// Logical width in points.
    pub fn width(&self) -> f64 {
        f64::from(self.image.width()) / self.scale
    }

    /// Logical height in points.
    pub fn height(&self) -> f64 {
        f64::from(self.image.height()) / self.scale
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn pixel_width(&self) -> u32 {
        self.image.width()
    }

    pub fn pixel_height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn into_image(self) -> RgbaImage {
        self.image
    }
}

/// Ordered frame slots drained destructively by the active encode.
///
/// Slots are released (set to `None`) as soon as a frame has been consumed so peak memory
/// shrinks while a long sequence drains. The queue must not be mutated by anyone else while
/// a drain is running.
#[derive(Clone, Debug, Default)]
pub struct FrameQueue {
    slots: Vec<Option<Frame>>,
}

impl FrameQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, frame: Frame) {
        self.slots.push(Some(frame));
    }

    /// Total slot count, released slots included.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of slots still holding a frame.
    pub fn pending(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn get(&self, idx: usize) -> Option<&Frame> {
        self.slots.get(idx).and_then(Option::as_ref)
    }

    /// Release slot `idx`, handing its frame to the caller.
    pub fn take(&mut self, idx: usize) -> Option<Frame> {
        self.slots.get_mut(idx).and_then(Option::take)
    }

    /// Remove every slot, returning the frames still held in order.
    pub fn drain_frames(&mut self) -> Vec<Frame> {
        self.slots.drain(..).flatten().collect()
    }
}

impl From<Vec<Frame>> for FrameQueue {
    fn from(frames: Vec<Frame>) -> Self {
        Self {
            slots: frames.into_iter().map(Some).collect(),
        }
    }
}

impl FromIterator<Frame> for FrameQueue {
    fn from_iter<I: IntoIterator<Item = Frame>>(iter: I) -> Self {
        Self {
            slots: iter.into_iter().map(Some).collect(),
        }
    }
}

/// How presentation timing is derived for a frame sequence.
#[derive(Clone, Copy, Debug)]
pub enum TimingModel {
    /// Wall-clock capture window; the rate is `round(count / (end - start))`.
    Measured { start: Instant, end: Instant },
    /// Fixed rate in frames per second.
    Preferred(u32),
}

impl Default for TimingModel {
    fn default() -> Self {
        Self::Preferred(DEFAULT_PREFERRED_FPS)
    }
}

impl TimingModel {
    /// Resolve the frame rate for `frame_count` frames.
    pub fn frame_rate(&self, frame_count: usize) -> AssetResult<u32> {
        let rate = match *self {
            Self::Preferred(fps) => f64::from(fps),
            Self::Measured { start, end } => {
                let window = end.saturating_duration_since(start).as_secs_f64();
                if window <= 0.0 {
                    return Err(AssetError::configuration(
                        "capture window must have a positive duration",
                    ));
                }
                (frame_count as f64 / window).round()
            }
        };
        if !rate.is_finite() || rate < 1.0 {
            return Err(AssetError::configuration(format!(
                "derived frame rate must be > 0 (got {rate})"
            )));
        }
        Ok(rate as u32)
    }
}

/// A generated artifact.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Asset {
    Video(PathBuf),
    Gif(PathBuf),
    LivePhoto {
        still: PathBuf,
        video: PathBuf,
        identifier: String,
    },
}

impl Asset {
    /// The file a caller would open first: the video, the gif, or the paired still.
    pub fn primary_path(&self) -> &Path {
        match self {
            Self::Video(p) | Self::Gif(p) => p,
            Self::LivePhoto { still, .. } => still,
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
