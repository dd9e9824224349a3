pub mod backend;
pub mod ffmpeg;
pub mod manifest;
pub mod metadata;
pub mod sample;
pub mod timed_track;
pub mod writer;
