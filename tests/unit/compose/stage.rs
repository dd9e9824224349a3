use super::*;
use crate::compose::layer::OverlayItem;
use image::RgbaImage;
use crate::encode::sequential::SequentialEncoder;
use crate::foundation::core::{Affine, Frame, FrameQueue, TimingModel, Vec2};
use crate::foundation::progress::ProgressFn;
use crate::media::manifest::ManifestBackend;
use crate::media::sample::{AudioSample, AudioTrackSpec};
use std::sync::Mutex;
use std::sync::atomic::AtomicUsize;

fn encode(backend: &Arc<dyn MediaBackend>, dir: &Path, frames: usize, transform: Affine) -> PathBuf {
    let mut queue: FrameQueue = (0..frames)
        .map(|_| Frame::solid(8, 4, 1.0, [0, 0, 255, 255]))
        .collect();
    SequentialEncoder::new(backend.clone(), 2)
        .with_transform(transform)
        .encode(
            &mut queue,
            TimingModel::Preferred(10),
            &dir.join("base.mov"),
            &StageProgress::detached(),
        )
        .unwrap()
        .path
}

#[test]
fn overlay_callback_runs_once_and_is_baked_in() {
    let tmp = tempfile::tempdir().unwrap();
    let backend: Arc<dyn MediaBackend> = Arc::new(ManifestBackend::new());
    let base = encode(&backend, tmp.path(), 12, Affine::IDENTITY);

    let calls = Arc::new(AtomicUsize::new(0));
    let c = calls.clone();
    let request = CompositionRequest::new(move |layer| {
        c.fetch_add(1, Ordering::SeqCst);
        let (w, h) = layer.size();
        layer.add_item(OverlayItem::new(
            RgbaImage::from_pixel(w, h, image::Rgba([255, 0, 0, 255])),
            Vec2::ZERO,
        ));
    });

    let seen = Arc::new(Mutex::new(Vec::new()));
    let s = seen.clone();
    let sink: ProgressFn = Arc::new(move |v: f64| s.lock().unwrap().push(v));

    let stage = CompositionStage::new(backend.clone(), CacheDir::at(tmp.path().join("cache")))
        .with_poll_fps(1000);
    let out = tmp.path().join("composed.mov");
    let composed = stage
        .compose(&base, request, &out, &StageProgress::new(sink))
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(composed.path, out);
    assert_eq!((composed.orientation, composed.portrait), (Orientation::Up, false));
    assert_eq!(composed.render_size, (8, 4));

    let info = backend.probe(&out).unwrap();
    assert_eq!(info.video_track().unwrap().sample_count(), 12);
    assert_eq!(backend.frame_at(&out, 0.0).unwrap().get_pixel(0, 0).0, [255, 0, 0, 255]);

    let seen = seen.lock().unwrap();
    assert!(seen.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(seen.last().copied(), Some(1.0));
    assert_eq!(std::fs::read_dir(tmp.path().join("cache")).unwrap().count(), 0);
}

#[test]
fn portrait_sources_get_a_swapped_layer_and_keep_their_transform() {
    let tmp = tempfile::tempdir().unwrap();
    let backend: Arc<dyn MediaBackend> = Arc::new(ManifestBackend::new());
    let base = encode(&backend, tmp.path(), 2, Orientation::Right.transform());

    let layer_size = Arc::new(Mutex::new(None));
    let ls = layer_size.clone();
    let out = tmp.path().join("p.mov");
    let composed = CompositionStage::new(backend.clone(), CacheDir::at(tmp.path()))
        .compose(
            &base,
            CompositionRequest::new(move |layer| *ls.lock().unwrap() = Some(layer.size())),
            &out,
            &StageProgress::detached(),
        )
        .unwrap();

    assert_eq!(*layer_size.lock().unwrap(), Some((4, 8)));
    assert_eq!((composed.orientation, composed.portrait), (Orientation::Right, true));
    let video = backend.probe(&out).unwrap();
    let track = video.video_track().unwrap();
    assert_eq!(track.natural_size, Some((8, 4)));
    assert_eq!(orientation_from_transform(track.transform), (Orientation::Right, true));
}

#[test]
fn source_audio_is_carried_over() {
    let tmp = tempfile::tempdir().unwrap();
    let backend: Arc<dyn MediaBackend> = Arc::new(ManifestBackend::new());
    let video = encode(&backend, tmp.path(), 3, Affine::IDENTITY);

    let audio = tmp.path().join("a.m4a");
    let mut sink = backend
        .open_sink(
            &audio,
            &TrackSpec::Audio(AudioTrackSpec {
                sample_rate: 100,
                channels: 1,
            }),
        )
        .unwrap();
    sink.write(Sample::Audio(AudioSample {
        pts: 0.0,
        sample_rate: 100,
        channels: 1,
        pcm: vec![0.0; 30],
    }))
    .unwrap();
    sink.finish().unwrap();

    let with_audio = tmp.path().join("av.mov");
    backend
        .mux(&MuxRequest {
            inputs: vec![
                MuxInput {
                    path: video,
                    kind: TrackKind::Video,
                },
                MuxInput {
                    path: audio,
                    kind: TrackKind::Audio,
                },
            ],
            output: with_audio.clone(),
            ..MuxRequest::default()
        })
        .unwrap();

    let out = tmp.path().join("c.mov");
    CompositionStage::new(backend.clone(), CacheDir::at(tmp.path()))
        .compose(
            &with_audio,
            CompositionRequest::new(|_| {}),
            &out,
            &StageProgress::detached(),
        )
        .unwrap();
    assert!(backend.probe(&out).unwrap().has_audio());
}

#[test]
fn missing_source_is_a_composition_error() {
    let tmp = tempfile::tempdir().unwrap();
    let stage = CompositionStage::new(Arc::new(ManifestBackend::new()), CacheDir::at(tmp.path()));
    let err = stage
        .compose(
            &tmp.path().join("missing.mov"),
            CompositionRequest::new(|_| {}),
            &tmp.path().join("o.mov"),
            &StageProgress::detached(),
        )
        .unwrap_err();
    assert!(matches!(err, AssetError::CouldNotCreateComposition(_)));
}

#[test]
fn cancelled_exports_report_cancelled() {
    let tmp = tempfile::tempdir().unwrap();
    let backend: Arc<dyn MediaBackend> = Arc::new(ManifestBackend::new());
    let base = encode(&backend, tmp.path(), 4, Affine::IDENTITY);
    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = CompositionStage::new(backend, CacheDir::at(tmp.path()))
        .compose_with_cancel(
            &base,
            CompositionRequest::new(|_| {}),
            &tmp.path().join("x.mov"),
            &StageProgress::detached(),
            &cancel,
        )
        .unwrap_err();
    assert!(matches!(err, AssetError::Cancelled));
}
