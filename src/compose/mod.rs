//! Post-encode composition: overlay layers baked into an already encoded video.

pub mod layer;
pub mod orientation;
pub mod stage;
