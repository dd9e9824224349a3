use image::RgbaImage;

use crate::foundation::core::Frame;
use crate::foundation::math::{premultiply, unpremultiply};

/// Bytes per pixel of the encoder input format.
pub const BYTES_PER_PIXEL: usize = 4;

/// Raw encoder input: 32-bit, alpha-first (`A R G B`), premultiplied, tightly packed rows.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PixelBuffer {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl PixelBuffer {
    pub fn bytes_per_row(&self) -> usize {
        self.width as usize * BYTES_PER_PIXEL
    }

    /// `[a, r, g, b]` at `(x, y)`.
    pub fn argb_at(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let off = y as usize * self.bytes_per_row() + x as usize * BYTES_PER_PIXEL;
        let px = self.data.get(off..off + BYTES_PER_PIXEL)?;
        Some([px[0], px[1], px[2], px[3]])
    }

    /// Straight RGBA of the center pixel; a cheap color fingerprint of the buffer.
    pub fn swatch(&self) -> [u8; 4] {
        match self.argb_at(self.width / 2, self.height / 2) {
            Some([a, r, g, b]) => unpremultiply([r, g, b, a]),
            None => [0, 0, 0, 0],
        }
    }

    /// Back to a straight-alpha RGBA8 image.
    pub fn to_rgba_image(&self) -> RgbaImage {
        let mut out = RgbaImage::new(self.width, self.height);
        for (dst, src) in out
            .chunks_exact_mut(BYTES_PER_PIXEL)
            .zip(self.data.chunks_exact(BYTES_PER_PIXEL))
        {
            dst.copy_from_slice(&unpremultiply([src[1], src[2], src[3], src[0]]));
        }
        out
    }
}

/// Converts frames into [`PixelBuffer`]s sized to their pixel dimensions.
#[derive(Clone, Copy, Debug, Default)]
pub struct PixelBufferConverter;

impl PixelBufferConverter {
    /// `None` when the buffer cannot be allocated or the frame has no pixels; callers skip
    /// such frames instead of aborting.
    pub fn convert(frame: &Frame) -> Option<PixelBuffer> {
        Self::convert_image(frame.image())
    }

    pub fn convert_image(img: &RgbaImage) -> Option<PixelBuffer> {
        let (width, height) = img.dimensions();
        if width == 0 || height == 0 {
            return None;
        }
        let len = (width as usize)
            .checked_mul(height as usize)?
            .checked_mul(BYTES_PER_PIXEL)?;
        let src = img.as_raw();
        if src.len() != len {
            return None;
        }

        let mut data = Vec::new();
        data.try_reserve_exact(len).ok()?;
        for px in src.chunks_exact(BYTES_PER_PIXEL) {
            let [r, g, b, a] = premultiply([px[0], px[1], px[2], px[3]]);
            data.extend_from_slice(&[a, r, g, b]);
        }

        Some(PixelBuffer {
            width,
            height,
            data,
        })
    }
}

#[cfg(test)]
#[path = "../../tests/unit/encode/pixel.rs"]
mod tests;
