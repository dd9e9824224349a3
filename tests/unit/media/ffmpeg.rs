use super::*;

fn stream(json: &str) -> ProbeStream {
    serde_json::from_str(json).unwrap()
}

#[test]
fn rationals_parse_and_reject_zero() {
    assert_eq!(parse_rational("30000/1001").map(|r| (r * 1000.0).round()), Some(29970.0));
    assert_eq!(parse_rational("12"), Some(12.0));
    assert_eq!(parse_rational("0/0"), None);
    assert_eq!(parse_rational("abc"), None);
}

#[test]
fn flatten_forces_opaque_alpha() {
    let mut out = Vec::new();
    flatten_argb_over_black(&mut out, &[128, 64, 32, 16, 0, 0, 0, 0]).unwrap();
    assert_eq!(out, vec![255, 64, 32, 16, 255, 0, 0, 0]);
    assert!(flatten_argb_over_black(&mut out, &[1, 2, 3]).is_err());
}

#[test]
fn probe_stream_maps_display_matrix_rotation() {
    let s = stream(
        r#"{"codec_type":"video","width":1920,"height":1080,"avg_frame_rate":"30/1",
            "nb_read_packets":"3","side_data_list":[{"rotation":-90}]}"#,
    );
    let t = track_from_stream(&s).unwrap();
    assert_eq!(t.kind, TrackKind::Video);
    assert_eq!(t.natural_size, Some((1920, 1080)));
    assert_eq!(orientation_from_transform(t.transform), (Orientation::Right, true));
    assert_eq!(t.sample_times.len(), 3);
    assert!((t.sample_times[2] - 2.0 / 30.0).abs() < 1e-9);
}

#[test]
fn probe_stream_falls_back_to_rotate_tag() {
    let s = stream(r#"{"codec_type":"video","width":4,"height":4,"tags":{"rotate":"180"}}"#);
    let t = track_from_stream(&s).unwrap();
    assert_eq!(orientation_from_transform(t.transform).0, Orientation::Down);
    assert!(t.sample_times.is_empty());
}

#[test]
fn audio_and_data_streams() {
    let a = track_from_stream(&stream(
        r#"{"codec_type":"audio","sample_rate":"44100","channels":2}"#,
    ))
    .unwrap();
    assert_eq!(a.kind, TrackKind::Audio);
    assert_eq!(a.sample_rate, Some(44_100));
    assert_eq!(a.channels, Some(2));
    assert!(track_from_stream(&stream(r#"{"codec_type":"data"}"#)).is_none());
}

#[test]
fn odd_dimensions_switch_to_full_chroma() {
    assert_eq!(output_pix_fmt(1920, 1080), "yuv420p");
    assert_eq!(output_pix_fmt(1125, 2001), "yuv444p");
    assert_eq!(output_pix_fmt(4, 3), "yuv444p");
}

#[test]
fn odd_dimensions_reach_the_encoder() {
    let tmp = tempfile::tempdir().unwrap();
    let backend = FfmpegBackend::with_binaries("definitely-not-ffmpeg", "definitely-not-ffprobe");
    let res = backend.open_sink(
        &tmp.path().join("odd.mp4"),
        &TrackSpec::Video(VideoTrackSpec {
            width: 1125,
            height: 2001,
            fps: 30,
            transform: Affine::IDENTITY,
        }),
    );
    // Only the missing binary stops it; the size itself is accepted.
    assert!(matches!(res, Err(AssetError::Writer(_))));
}

#[test]
fn missing_binary_is_a_writer_error() {
    let tmp = tempfile::tempdir().unwrap();
    let backend = FfmpegBackend::with_binaries("definitely-not-ffmpeg", "definitely-not-ffprobe");
    let res = backend.open_sink(
        &tmp.path().join("a.m4a"),
        &TrackSpec::Audio(AudioTrackSpec {
            sample_rate: 48_000,
            channels: 2,
        }),
    );
    assert!(matches!(res, Err(AssetError::Writer(_))));
}
