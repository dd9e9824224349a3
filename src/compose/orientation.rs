use image::{RgbaImage, imageops};

use crate::foundation::core::Affine;

/// Display orientation of a video track.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    Up,
    Down,
    Left,
    Right,
}

const EPS: f64 = 1e-6;

fn linear_part_is(t: Affine, abcd: [f64; 4]) -> bool {
    let c = t.as_coeffs();
    c[..4]
        .iter()
        .zip(abcd.iter())
        .all(|(got, want)| (got - want).abs() < EPS)
}

/// `(orientation, is_portrait)` for a track transform.
///
/// Only the four canonical rotations are recognized; anything else (scales, shears, arbitrary
/// angles) reports `(Up, false)`. Translation is ignored.
pub fn orientation_from_transform(t: Affine) -> (Orientation, bool) {
    if linear_part_is(t, [0.0, 1.0, -1.0, 0.0]) {
        (Orientation::Right, true)
    } else if linear_part_is(t, [0.0, -1.0, 1.0, 0.0]) {
        (Orientation::Left, true)
    } else if linear_part_is(t, [1.0, 0.0, 0.0, 1.0]) {
        (Orientation::Up, false)
    } else if linear_part_is(t, [-1.0, 0.0, 0.0, -1.0]) {
        (Orientation::Down, false)
    } else {
        (Orientation::Up, false)
    }
}

impl Orientation {
    /// Clockwise display rotation in degrees.
    pub fn rotation_degrees(self) -> u32 {
        match self {
            Self::Up => 0,
            Self::Right => 90,
            Self::Down => 180,
            Self::Left => 270,
        }
    }

    /// Canonical transform for this orientation.
    pub fn transform(self) -> Affine {
        match self {
            Self::Up => Affine::IDENTITY,
            Self::Right => Affine::new([0.0, 1.0, -1.0, 0.0, 0.0, 0.0]),
            Self::Down => Affine::new([-1.0, 0.0, 0.0, -1.0, 0.0, 0.0]),
            Self::Left => Affine::new([0.0, -1.0, 1.0, 0.0, 0.0, 0.0]),
        }
    }

    /// Nearest canonical orientation for a clockwise rotation in degrees.
    pub fn from_rotation_degrees(deg: i64) -> Self {
        let quarter = ((deg as f64 / 90.0).round() as i64).rem_euclid(4);
        match quarter {
            1 => Self::Right,
            2 => Self::Down,
            3 => Self::Left,
            _ => Self::Up,
        }
    }

    /// Rotate a decoded (natural) frame into display orientation.
    pub fn to_display(self, img: RgbaImage) -> RgbaImage {
        match self {
            Self::Up => img,
            Self::Right => imageops::rotate90(&img),
            Self::Down => imageops::rotate180(&img),
            Self::Left => imageops::rotate270(&img),
        }
    }

    /// Inverse of [`Orientation::to_display`].
    pub fn to_natural(self, img: RgbaImage) -> RgbaImage {
        match self {
            Self::Up => img,
            Self::Right => imageops::rotate270(&img),
            Self::Down => imageops::rotate180(&img),
            Self::Left => imageops::rotate90(&img),
        }
    }
}

/// Render size after applying the track transform to its natural size.
pub fn render_size(natural: (u32, u32), t: Affine) -> (u32, u32) {
    match orientation_from_transform(t) {
        (_, true) => (natural.1, natural.0),
        (_, false) => natural,
    }
}

#[cfg(test)]
#[path = "../../tests/unit/compose/orientation.rs"]
mod tests;
