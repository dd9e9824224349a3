use super::*;
use crate::foundation::core::Frame;
use crate::foundation::progress::ProgressFn;
use crate::media::manifest::{FailurePlan, ManifestBackend};
use std::sync::Mutex;
use std::time::{Duration, Instant};

fn recorder() -> (StageProgress, Arc<Mutex<Vec<f64>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let s = seen.clone();
    let sink: ProgressFn = Arc::new(move |v: f64| s.lock().unwrap().push(v));
    (StageProgress::new(sink), seen)
}

#[test]
fn three_frames_at_twelve_fps() {
    let tmp = tempfile::tempdir().unwrap();
    let backend = Arc::new(ManifestBackend::new());
    let scale = 2.0;
    let mut queue: FrameQueue = [[128, 128, 128, 255], [0, 0, 255, 255], [255, 0, 0, 255]]
        .into_iter()
        .map(|c| Frame::solid(100, 100, scale, c))
        .collect();

    let (progress, seen) = recorder();
    let out = tmp.path().join("out.mov");
    let encoded = SequentialEncoder::new(backend.clone(), 2)
        .encode(&mut queue, TimingModel::Preferred(12), &out, &progress)
        .unwrap();

    assert_eq!(encoded.fps, 12);
    assert_eq!(encoded.stats.frames_written, 3);
    assert_eq!(queue.pending(), 0);

    let info = backend.probe(&encoded.path).unwrap();
    let video = info.video_track().unwrap();
    assert_eq!(video.natural_size, Some((200, 200)));
    assert_eq!(video.sample_count(), 3);
    for (i, t) in video.sample_times.iter().enumerate() {
        assert!((t - i as f64 / 12.0).abs() < 1e-9);
    }
    assert_eq!(
        backend.frame_at(&encoded.path, 2.0 / 12.0).unwrap().get_pixel(0, 0).0,
        [255, 0, 0, 255]
    );

    let seen = seen.lock().unwrap();
    assert!(seen.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(seen.last().copied(), Some(1.0));
}

#[test]
fn empty_queue_fails_without_creating_a_file() {
    let tmp = tempfile::tempdir().unwrap();
    let out = tmp.path().join("none.mov");
    let err = SequentialEncoder::new(Arc::new(ManifestBackend::new()), 2)
        .encode(
            &mut FrameQueue::new(),
            TimingModel::default(),
            &out,
            &StageProgress::detached(),
        )
        .unwrap_err();
    assert!(matches!(err, AssetError::NoFrames));
    assert!(!out.exists());
}

#[test]
fn measured_window_derives_rate() {
    let tmp = tempfile::tempdir().unwrap();
    let backend = Arc::new(ManifestBackend::new());
    let start = Instant::now();
    let mut queue: FrameQueue = (0..180).map(|_| Frame::solid(2, 2, 1.0, [0, 0, 0, 255])).collect();
    let encoded = SequentialEncoder::new(backend, 8)
        .encode(
            &mut queue,
            TimingModel::Measured {
                start,
                end: start + Duration::from_secs(3),
            },
            &tmp.path().join("m.mov"),
            &StageProgress::detached(),
        )
        .unwrap();
    assert_eq!(encoded.fps, 60);
}

#[test]
fn mismatched_and_empty_frames_are_skipped() {
    let tmp = tempfile::tempdir().unwrap();
    let backend = Arc::new(ManifestBackend::new());
    let mut queue = FrameQueue::new();
    queue.push(Frame::solid(4, 4, 1.0, [1, 1, 1, 255]));
    queue.push(Frame::solid(8, 8, 1.0, [2, 2, 2, 255]));
    queue.push(Frame::new(image::RgbaImage::new(0, 0), 1.0));
    queue.push(Frame::solid(4, 4, 1.0, [3, 3, 3, 255]));

    let encoded = SequentialEncoder::new(backend.clone(), 2)
        .encode(
            &mut queue,
            TimingModel::Preferred(10),
            &tmp.path().join("s.mov"),
            &StageProgress::detached(),
        )
        .unwrap();
    assert_eq!(
        encoded.stats,
        EncodeStats {
            frames_total: 4,
            frames_written: 2,
            frames_skipped: 2,
        }
    );
    let info = backend.probe(&encoded.path).unwrap();
    assert_eq!(info.video_track().unwrap().sample_times, vec![0.0, 0.3]);
}

#[test]
fn writer_failure_is_forwarded() {
    let tmp = tempfile::tempdir().unwrap();
    let backend = Arc::new(ManifestBackend::new().with_failure(FailurePlan {
        kind: crate::media::sample::TrackKind::Video,
        after_samples: 2,
    }));
    let mut queue: FrameQueue = (0..20).map(|_| Frame::solid(2, 2, 1.0, [0, 0, 0, 255])).collect();
    let err = SequentialEncoder::new(backend, 1)
        .encode(
            &mut queue,
            TimingModel::Preferred(30),
            &tmp.path().join("f.mov"),
            &StageProgress::detached(),
        )
        .unwrap_err();
    assert!(matches!(err, AssetError::Writer(_)), "{err}");
}
