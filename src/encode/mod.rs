//! Frame encoders.
//!
//! Encoders drain a [`crate::foundation::core::FrameQueue`] in order and release each slot once
//! written.

/// Animated gif encode/decode.
pub mod gif;
/// Frame to raw encoder buffer conversion.
pub mod pixel;
/// Single-track video encoder with backpressure.
pub mod sequential;
