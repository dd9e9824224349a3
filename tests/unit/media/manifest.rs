use super::*;
use crate::media::backend::MuxInput;
use crate::media::metadata::{MetadataItem, MetadataKey};
use crate::media::sample::{AudioTrackSpec, VideoTrackSpec};

fn video_spec(w: u32, h: u32, fps: u32) -> TrackSpec {
    TrackSpec::Video(VideoTrackSpec {
        width: w,
        height: h,
        fps,
        transform: Affine::IDENTITY,
    })
}

fn solid(w: u32, h: u32, rgba: [u8; 4]) -> PixelBuffer {
    PixelBufferConverter::convert_image(&RgbaImage::from_pixel(w, h, image::Rgba(rgba))).unwrap()
}

#[test]
fn video_sink_records_times_and_swatches() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("v.mov");
    let backend = ManifestBackend::new();
    let mut sink = backend.open_sink(&path, &video_spec(4, 2, 10)).unwrap();
    for (i, c) in [[255, 0, 0, 255], [0, 0, 255, 255]].into_iter().enumerate() {
        sink.write(Sample::Video(VideoSample {
            pts: i as f64 / 10.0,
            buffer: solid(4, 2, c),
        }))
        .unwrap();
    }
    sink.finish().unwrap();

    let info = backend.probe(&path).unwrap();
    let video = info.video_track().unwrap();
    assert_eq!(video.natural_size, Some((4, 2)));
    assert_eq!(video.sample_times, vec![0.0, 0.1]);
    assert!((info.duration - 0.2).abs() < 1e-9);
    assert!(!info.has_audio());

    let late = backend.frame_at(&path, 0.15).unwrap();
    assert_eq!(late.get_pixel(0, 0).0, [0, 0, 255, 255]);
}

#[test]
fn mismatched_buffer_size_is_a_writer_error() {
    let tmp = tempfile::tempdir().unwrap();
    let backend = ManifestBackend::new();
    let mut sink = backend
        .open_sink(&tmp.path().join("v.mov"), &video_spec(4, 4, 10))
        .unwrap();
    let err = sink
        .write(Sample::Video(VideoSample {
            pts: 0.0,
            buffer: solid(2, 2, [0, 0, 0, 255]),
        }))
        .unwrap_err();
    assert!(matches!(err, AssetError::Writer(_)));
}

#[test]
fn injected_failure_triggers_after_n_samples() {
    let tmp = tempfile::tempdir().unwrap();
    let backend = ManifestBackend::new().with_failure(FailurePlan {
        kind: TrackKind::Audio,
        after_samples: 1,
    });
    let mut sink = backend
        .open_sink(
            &tmp.path().join("a.m4a"),
            &TrackSpec::Audio(AudioTrackSpec {
                sample_rate: 100,
                channels: 1,
            }),
        )
        .unwrap();
    let chunk = |pts| {
        Sample::Audio(AudioSample {
            pts,
            sample_rate: 100,
            channels: 1,
            pcm: vec![0.0; 10],
        })
    };
    sink.write(chunk(0.0)).unwrap();
    assert!(sink.write(chunk(0.1)).is_err());
}

#[test]
fn mux_copies_tracks_and_metadata() {
    let tmp = tempfile::tempdir().unwrap();
    let backend = ManifestBackend::new();
    let v = tmp.path().join("v.mov");
    let a = tmp.path().join("a.m4a");

    let mut vs = backend.open_sink(&v, &video_spec(2, 2, 30)).unwrap();
    vs.write(Sample::Video(VideoSample {
        pts: 0.0,
        buffer: solid(2, 2, [1, 2, 3, 255]),
    }))
    .unwrap();
    vs.finish().unwrap();

    let mut as_ = backend
        .open_sink(
            &a,
            &TrackSpec::Audio(AudioTrackSpec {
                sample_rate: 48_000,
                channels: 2,
            }),
        )
        .unwrap();
    as_.write(Sample::Audio(AudioSample {
        pts: 0.0,
        sample_rate: 48_000,
        channels: 2,
        pcm: vec![0.0; 96_000],
    }))
    .unwrap();
    as_.finish().unwrap();

    let out = tmp.path().join("out.mov");
    backend
        .mux(&MuxRequest {
            inputs: vec![
                MuxInput {
                    path: v.clone(),
                    kind: TrackKind::Video,
                },
                MuxInput {
                    path: a.clone(),
                    kind: TrackKind::Audio,
                },
            ],
            output: out.clone(),
            metadata: vec![MetadataItem::content_identifier("ID-1")],
            timed_metadata: vec![TimedMetadata::still_image_time(0.0)],
        })
        .unwrap();

    let info = backend.probe(&out).unwrap();
    assert_eq!(info.tracks.len(), 2);
    assert!(info.has_audio());
    assert_eq!(info.content_identifier(), Some("ID-1"));
    assert_eq!(info.still_image_time(), Some(0.0));
    assert!((info.duration - 1.0).abs() < 1e-9);
    assert_eq!(
        info.metadata.keys().next().map(String::as_str),
        Some(MetadataKey::ContentIdentifier.wire_key())
    );
}

#[test]
fn missing_tracks_are_reported() {
    let tmp = tempfile::tempdir().unwrap();
    let backend = ManifestBackend::new();
    let v = tmp.path().join("v.mov");
    let sink = backend.open_sink(&v, &video_spec(2, 2, 30)).unwrap();
    sink.finish().unwrap();

    assert!(backend.open_reader(&v, TrackKind::Audio).is_err());
    let empty = tmp.path().join("empty.mov");
    std::fs::write(
        &empty,
        format!(r#"{{"format":"{FORMAT_TAG}","tracks":[]}}"#),
    )
    .unwrap();
    assert!(matches!(
        backend.open_reader(&empty, TrackKind::Video),
        Err(AssetError::CouldNotAccessVideoTrack)
    ));
}
