use image::RgbaImage;
use rayon::prelude::*;

use crate::foundation::core::Vec2;
use crate::foundation::error::{AssetError, AssetResult};
use crate::foundation::math::{over, premultiply, unpremultiply};

/// Interpolation contract for keyframed overlay values.
pub trait Lerp: Sized {
    /// Interpolate from `a` to `b` with normalized factor `t` in `[0, 1]`.
    fn lerp(a: &Self, b: &Self, t: f64) -> Self;
}

impl Lerp for f64 {
    fn lerp(a: &Self, b: &Self, t: f64) -> Self {
        a + (b - a) * t
    }
}

impl Lerp for Vec2 {
    fn lerp(a: &Self, b: &Self, t: f64) -> Self {
        Vec2::new(a.x + (b.x - a.x) * t, a.y + (b.y - a.y) * t)
    }
}

/// One keyframe, at `time` seconds into the video.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Keyframe<T> {
    pub time: f64,
    pub value: T,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterpMode {
    /// Keep the previous key value until the next keyframe.
    Hold,
    #[default]
    Linear,
}

/// Keyframed value; holds the first/last key outside the keyed range.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Keyframes<T> {
    /// Sorted by `time`.
    pub keys: Vec<Keyframe<T>>,
    #[serde(default)]
    pub mode: InterpMode,
}

impl<T: Lerp + Clone> Keyframes<T> {
    pub fn constant(value: T) -> Self {
        Self {
            keys: vec![Keyframe { time: 0.0, value }],
            mode: InterpMode::Hold,
        }
    }

    pub fn linear(keys: Vec<Keyframe<T>>) -> Self {
        Self {
            keys,
            mode: InterpMode::Linear,
        }
    }

    pub fn validate(&self) -> AssetResult<()> {
        if self.keys.is_empty() {
            return Err(AssetError::configuration("keyframes must have at least one key"));
        }
        if !self.keys.windows(2).all(|w| w[0].time <= w[1].time) {
            return Err(AssetError::configuration("keyframes must be sorted by time"));
        }
        Ok(())
    }

    /// Value at `t` seconds. `None` only for an empty key list.
    pub fn sample(&self, t: f64) -> Option<T> {
        let idx = self.keys.partition_point(|k| k.time <= t);
        if idx == 0 {
            return self.keys.first().map(|k| k.value.clone());
        }
        if idx >= self.keys.len() {
            return self.keys.last().map(|k| k.value.clone());
        }

        let a = &self.keys[idx - 1];
        let b = &self.keys[idx];
        let span = b.time - a.time;
        if span <= 0.0 || self.mode == InterpMode::Hold {
            return Some(a.value.clone());
        }
        Some(T::lerp(&a.value, &b.value, (t - a.time) / span))
    }
}

/// A bitmap placed on the overlay layer.
#[derive(Clone, Debug)]
pub struct OverlayItem {
    /// Straight-alpha pixels.
    pub image: RgbaImage,
    /// Top-left corner in layer pixels.
    pub position: Keyframes<Vec2>,
    pub opacity: Keyframes<f64>,
    /// `[start, end)` in seconds; `None` shows the item for the whole video.
    pub visible: Option<(f64, f64)>,
}

impl OverlayItem {
    pub fn new(image: RgbaImage, position: Vec2) -> Self {
        Self {
            image,
            position: Keyframes::constant(position),
            opacity: Keyframes::constant(1.0),
            visible: None,
        }
    }

    pub fn with_position(mut self, position: Keyframes<Vec2>) -> Self {
        self.position = position;
        self
    }

    pub fn with_opacity(mut self, opacity: Keyframes<f64>) -> Self {
        self.opacity = opacity;
        self
    }

    pub fn visible_between(mut self, start: f64, end: f64) -> Self {
        self.visible = Some((start, end));
        self
    }

    fn is_visible_at(&self, t: f64) -> bool {
        self.visible.is_none_or(|(start, end)| t >= start && t < end)
    }
}

/// Custom drawing on the overlay layer: `(seconds, straight-alpha canvas)`.
pub type Painter = Box<dyn Fn(f64, &mut RgbaImage) + Send + Sync>;

/// The overlay half of a two-layer render tree, sized to the video's render size.
///
/// Contents are sampled once per output frame and composited over the decoded base frame.
pub struct RenderLayer {
    width: u32,
    height: u32,
    opacity: f64,
    items: Vec<OverlayItem>,
    painters: Vec<Painter>,
}

impl std::fmt::Debug for RenderLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderLayer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("opacity", &self.opacity)
            .field("items", &self.items.len())
            .field("painters", &self.painters.len())
            .finish()
    }
}

impl RenderLayer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            opacity: 1.0,
            items: Vec::new(),
            painters: Vec::new(),
        }
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn opacity(&self) -> f64 {
        self.opacity
    }

    pub fn set_opacity(&mut self, opacity: f64) {
        self.opacity = opacity.clamp(0.0, 1.0);
    }

    pub fn add_item(&mut self, item: OverlayItem) {
        self.items.push(item);
    }

    pub fn add_painter(&mut self, painter: impl Fn(f64, &mut RgbaImage) + Send + Sync + 'static) {
        self.painters.push(Box::new(painter));
    }

    pub fn items(&self) -> &[OverlayItem] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty() && self.painters.is_empty()
    }

    pub fn validate(&self) -> AssetResult<()> {
        for item in &self.items {
            item.position.validate()?;
            item.opacity.validate()?;
        }
        Ok(())
    }

    /// Premultiplied RGBA8 overlay at `t` seconds.
    fn render_premul(&self, t: f64) -> Vec<u8> {
        let (w, h) = (self.width as usize, self.height as usize);
        let mut canvas = vec![0u8; w * h * 4];
        if canvas.is_empty() {
            return canvas;
        }

        for item in self.items.iter().filter(|i| i.is_visible_at(t)) {
            let pos = item.position.sample(t).unwrap_or(Vec2::ZERO);
            let opacity = item.opacity.sample(t).unwrap_or(1.0) as f32;
            if opacity <= 0.0 {
                continue;
            }
            let (ox, oy) = (pos.x.round() as i64, pos.y.round() as i64);
            let src = &item.image;
            let src_w = src.width() as usize;

            canvas
                .par_chunks_mut(w * 4)
                .enumerate()
                .for_each(|(y, row)| {
                    let sy = y as i64 - oy;
                    if sy < 0 || sy >= i64::from(src.height()) {
                        return;
                    }
                    let src_row = &src.as_raw()[sy as usize * src_w * 4..][..src_w * 4];
                    for (x, dst) in row.chunks_exact_mut(4).enumerate() {
                        let sx = x as i64 - ox;
                        if sx < 0 || sx >= src_w as i64 {
                            continue;
                        }
                        let s = &src_row[sx as usize * 4..][..4];
                        let out = over(
                            [dst[0], dst[1], dst[2], dst[3]],
                            premultiply([s[0], s[1], s[2], s[3]]),
                            opacity,
                        );
                        dst.copy_from_slice(&out);
                    }
                });
        }

        if !self.painters.is_empty() {
            let mut scratch = RgbaImage::new(self.width, self.height);
            for painter in &self.painters {
                scratch.fill(0);
                painter(t, &mut scratch);
                canvas
                    .par_chunks_mut(4)
                    .zip(scratch.as_raw().par_chunks(4))
                    .for_each(|(dst, s)| {
                        let out = over(
                            [dst[0], dst[1], dst[2], dst[3]],
                            premultiply([s[0], s[1], s[2], s[3]]),
                            1.0,
                        );
                        dst.copy_from_slice(&out);
                    });
            }
        }
        canvas
    }

    /// Composite the layer at `t` seconds over `base` (straight alpha, layer-sized).
    pub fn composite_onto(&self, base: &mut RgbaImage, t: f64) -> AssetResult<()> {
        if base.dimensions() != self.size() {
            return Err(AssetError::composition(format!(
                "overlay is {}x{}, frame is {}x{}",
                self.width,
                self.height,
                base.width(),
                base.height()
            )));
        }
        if self.is_empty() || self.opacity <= 0.0 {
            return Ok(());
        }

        let overlay = self.render_premul(t);
        let opacity = self.opacity as f32;
        base
            .par_chunks_mut(4)
            .zip(overlay.par_chunks(4))
            .for_each(|(dst, src)| {
                let d = premultiply([dst[0], dst[1], dst[2], dst[3]]);
                let out = unpremultiply(over(d, [src[0], src[1], src[2], src[3]], opacity));
                dst.copy_from_slice(&out);
            });
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/compose/layer.rs"]
mod tests;
