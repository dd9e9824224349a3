//! Live capture: channel-tagged buffers written to per-channel tracks, then merged.

pub mod merge;
pub mod multiplexer;
