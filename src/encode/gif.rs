use std::fs::File;
use std::io::{BufWriter, Cursor, Write as _};
use std::path::{Path, PathBuf};
use std::time::Duration;

use image::codecs::gif::{GifDecoder, GifEncoder as ImageGifEncoder, Repeat};
use image::imageops::FilterType;
use image::{AnimationDecoder as _, Delay};

use crate::foundation::cache::{ensure_parent_dir, remove_if_exists};
use crate::foundation::core::{Frame, FrameQueue};
use crate::foundation::error::{AssetError, AssetResult};
use crate::foundation::progress::StageProgress;

/// Delay used when a container does not resolve one.
pub const DEFAULT_GIF_DELAY_SEC: f64 = 0.1;

/// Gif delays at or below this are raised to [`DEFAULT_GIF_DELAY_SEC`] by players.
const CLAMP_THRESHOLD_SEC: f64 = 0.011;

/// Encoding options for animated gifs.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct GifOptions {
    /// Per-frame delay in seconds.
    pub delay_sec: f64,
    /// `0` loops forever.
    pub loop_count: u16,
    /// Output size relative to the source frames, in `(0, 1]`.
    pub resize_ratio: f64,
}

impl Default for GifOptions {
    fn default() -> Self {
        Self {
            delay_sec: DEFAULT_GIF_DELAY_SEC,
            loop_count: 0,
            resize_ratio: 1.0,
        }
    }
}

impl GifOptions {
    pub fn validate(&self) -> AssetResult<()> {
        if !self.delay_sec.is_finite() || self.delay_sec < 0.0 {
            return Err(AssetError::configuration(format!(
                "gif delay must be >= 0 (got {})",
                self.delay_sec
            )));
        }
        if !(self.resize_ratio > 0.0 && self.resize_ratio <= 1.0) {
            return Err(AssetError::configuration(format!(
                "gif resize ratio must be in (0, 1] (got {})",
                self.resize_ratio
            )));
        }
        Ok(())
    }

    fn repeat(&self) -> Repeat {
        match self.loop_count {
            0 => Repeat::Infinite,
            n => Repeat::Finite(n),
        }
    }
}

/// Decoded contents of an animated gif.
#[derive(Clone, Debug)]
pub struct GifInfo {
    pub frame_count: usize,
    /// Delay of the first frame.
    pub delay_sec: f64,
    pub frame_delays: Vec<f64>,
    pub frames: Vec<Frame>,
    /// Repetition count from the NETSCAPE2.0 application extension (`0` loops forever).
    /// `None` when the file carries no such block and plays once.
    pub loop_count: Option<u16>,
}

const NETSCAPE_APP_ID: &[u8] = b"NETSCAPE2.0";

/// Loop count stored in a gif's NETSCAPE2.0 application extension.
///
/// The block is `21 FF 0B "NETSCAPE2.0" 03 01 <count lo> <count hi> 00`.
pub fn netscape_loop_count(bytes: &[u8]) -> Option<u16> {
    let header = [&[0x21, 0xFF, 0x0B][..], NETSCAPE_APP_ID].concat();
    let at = bytes.windows(header.len()).position(|w| w == header)?;
    match bytes.get(at + header.len()..at + header.len() + 4)? {
        [0x03, 0x01, lo, hi] => Some(u16::from_le_bytes([*lo, *hi])),
        _ => None,
    }
}

/// Pick a frame delay: the unclamped value when positive, else the clamped one, else the
/// default.
pub fn resolve_delay(unclamped: Option<f64>, clamped: Option<f64>) -> f64 {
    [unclamped, clamped]
        .into_iter()
        .flatten()
        .find(|d| d.is_finite() && *d > 0.0)
        .unwrap_or(DEFAULT_GIF_DELAY_SEC)
}

fn delay_fields(delay: Delay) -> (Option<f64>, Option<f64>) {
    let (numer, denom) = delay.numer_denom_ms();
    if denom == 0 {
        return (None, None);
    }
    let raw = f64::from(numer) / f64::from(denom) / 1000.0;
    let clamped = if raw < CLAMP_THRESHOLD_SEC {
        DEFAULT_GIF_DELAY_SEC
    } else {
        raw
    };
    (Some(raw), Some(clamped))
}

fn scaled(len: u32, ratio: f64) -> u32 {
    ((f64::from(len) * ratio).round() as u32).max(1)
}

/// Animated gif encode and decode.
#[derive(Clone, Copy, Debug, Default)]
pub struct GifEncoder;

impl GifEncoder {
    /// Encode every frame of `queue` into `out`, releasing each slot once written.
    #[tracing::instrument(skip(queue, opts, progress), fields(out = %out.display()))]
    pub fn encode(
        queue: &mut FrameQueue,
        opts: &GifOptions,
        out: &Path,
        progress: &StageProgress,
    ) -> AssetResult<PathBuf> {
        opts.validate()?;
        let count = queue.len();
        if queue.pending() == 0 {
            return Err(AssetError::NoFrames);
        }

        remove_if_exists(out)?;
        ensure_parent_dir(out)?;
        let file = File::create(out).map_err(|e| {
            AssetError::CouldNotCreateDestination(format!("'{}': {e}", out.display()))
        })?;
        let mut writer = BufWriter::new(file);
        let delay = Delay::from_saturating_duration(Duration::from_secs_f64(opts.delay_sec));

        let mut written = 0usize;
        {
            let mut encoder = ImageGifEncoder::new(&mut writer);
            encoder
                .set_repeat(opts.repeat())
                .map_err(|e| AssetError::CouldNotCreateDestination(e.to_string()))?;

            for i in 0..count {
                let Some(frame) = queue.take(i) else {
                    continue;
                };
                let img = frame.into_image();
                let img = if opts.resize_ratio < 1.0 {
                    image::imageops::resize(
                        &img,
                        scaled(img.width(), opts.resize_ratio),
                        scaled(img.height(), opts.resize_ratio),
                        FilterType::Nearest,
                    )
                } else {
                    img
                };
                encoder
                    .encode_frame(image::Frame::from_parts(img, 0, 0, delay))
                    .map_err(|e| AssetError::FailedToFinalizeDestination(e.to_string()))?;
                written += 1;
                progress.report((i + 1) as f64 / count as f64);
            }
        }
        writer
            .flush()
            .map_err(|e| AssetError::FailedToFinalizeDestination(e.to_string()))?;

        progress.finish();
        tracing::info!(path = %out.display(), frames = written, "gif encoded");
        Ok(out.to_path_buf())
    }

    /// Decode every frame of the gif at `path`.
    #[tracing::instrument]
    pub fn decode(path: &Path) -> AssetResult<GifInfo> {
        let bytes = std::fs::read(path)?;
        let loop_count = netscape_loop_count(&bytes);
        let decoder = GifDecoder::new(Cursor::new(&bytes)).map_err(|e| {
            AssetError::composition(format!("'{}' is not a gif: {e}", path.display()))
        })?;
        let decoded = decoder.into_frames().collect_frames().map_err(|e| {
            AssetError::composition(format!("failed to decode '{}': {e}", path.display()))
        })?;

        let mut frame_delays = Vec::with_capacity(decoded.len());
        let mut frames = Vec::with_capacity(decoded.len());
        for f in decoded {
            let (unclamped, clamped) = delay_fields(f.delay());
            frame_delays.push(resolve_delay(unclamped, clamped));
            frames.push(Frame::new(f.into_buffer(), 1.0));
        }

        Ok(GifInfo {
            frame_count: frames.len(),
            delay_sec: frame_delays
                .first()
                .copied()
                .unwrap_or(DEFAULT_GIF_DELAY_SEC),
            frame_delays,
            frames,
            loop_count,
        })
    }
}

#[cfg(test)]
#[path = "../../tests/unit/encode/gif.rs"]
mod tests;
