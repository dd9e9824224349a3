use super::*;

#[test]
fn capture_stops_when_the_producer_runs_dry() {
    let mut left = 3;
    let mut producer = move || {
        if left == 0 {
            return None;
        }
        left -= 1;
        Some(Frame::solid(2, 2, 1.0, [0, 0, 0, 255]))
    };
    let (queue, timing) = capture_frames(&mut producer, 10);
    assert_eq!(queue.len(), 3);
    assert!(matches!(timing, TimingModel::Measured { .. }));
}

#[test]
fn iterator_sources_yield_in_order() {
    use crate::media::sample::AudioSample;
    let buffers = (0..2).map(|i| {
        LiveBuffer::mic(AudioSample {
            pts: f64::from(i),
            sample_rate: 10,
            channels: 1,
            pcm: vec![0.0; 10],
        })
    });
    let mut source = IterSource(buffers);
    assert_eq!(source.next_buffer().unwrap().sample.pts(), 0.0);
    assert_eq!(source.next_buffer().unwrap().sample.pts(), 1.0);
    assert!(source.next_buffer().is_none());
}
