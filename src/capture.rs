//! Injected capture capabilities: the producer side of the pipeline.

use std::time::Instant;

use crate::foundation::core::{Frame, FrameQueue, TimingModel};
use crate::live::multiplexer::LiveBuffer;

/// Renders the current visual state to a bitmap.
pub trait FrameProducer: Send {
    /// `None` when the producer has nothing more to render.
    fn render_frame(&mut self) -> Option<Frame>;
}

impl<F> FrameProducer for F
where
    F: FnMut() -> Option<Frame> + Send,
{
    fn render_frame(&mut self) -> Option<Frame> {
        self()
    }
}

/// Supplies the next channel-tagged buffer of a live capture.
pub trait LiveBufferSource: Send {
    /// `None` ends the capture.
    fn next_buffer(&mut self) -> Option<LiveBuffer>;
}

/// Iterator-backed live source.
#[derive(Debug)]
pub struct IterSource<I>(pub I);

impl<I> LiveBufferSource for IterSource<I>
where
    I: Iterator<Item = LiveBuffer> + Send,
{
    fn next_buffer(&mut self) -> Option<LiveBuffer> {
        self.0.next()
    }
}

/// Pull up to `count` frames from `producer`, measuring the wall-clock capture window.
pub fn capture_frames(producer: &mut dyn FrameProducer, count: usize) -> (FrameQueue, TimingModel) {
    let start = Instant::now();
    let mut queue = FrameQueue::new();
    for _ in 0..count {
        match producer.render_frame() {
            Some(frame) => queue.push(frame),
            None => break,
        }
    }
    let end = Instant::now();
    tracing::debug!(frames = queue.len(), "frames captured");
    (queue, TimingModel::Measured { start, end })
}

#[cfg(test)]
#[path = "../tests/unit/capture.rs"]
mod tests;
