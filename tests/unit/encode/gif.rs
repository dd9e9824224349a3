use super::*;
use crate::foundation::progress::ProgressFn;
use std::sync::{Arc, Mutex};

fn queue(n: usize, w: u32, h: u32) -> FrameQueue {
    (0..n)
        .map(|i| Frame::solid(w, h, 1.0, [(i * 40) as u8, 0, 255 - (i * 40) as u8, 255]))
        .collect()
}

#[test]
fn decode_returns_one_frame_per_encoded_frame() {
    let tmp = tempfile::tempdir().unwrap();
    let out = tmp.path().join("a.gif");
    let mut q = queue(5, 8, 6);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let s = seen.clone();
    let sink: ProgressFn = Arc::new(move |v: f64| s.lock().unwrap().push(v));
    GifEncoder::encode(&mut q, &GifOptions::default(), &out, &StageProgress::new(sink)).unwrap();
    assert_eq!(q.pending(), 0);
    assert_eq!(seen.lock().unwrap().last().copied(), Some(1.0));

    let info = GifEncoder::decode(&out).unwrap();
    assert_eq!(info.frame_count, 5);
    assert_eq!(info.frames.len(), 5);
    assert_eq!((info.frames[0].pixel_width(), info.frames[0].pixel_height()), (8, 6));
    assert!((info.delay_sec - 0.1).abs() < 1e-9);
}

#[test]
fn resize_ratio_scales_output() {
    let tmp = tempfile::tempdir().unwrap();
    let out = tmp.path().join("half.gif");
    let opts = GifOptions {
        delay_sec: 0.25,
        loop_count: 3,
        resize_ratio: 0.5,
    };
    GifEncoder::encode(&mut queue(2, 10, 4), &opts, &out, &StageProgress::detached()).unwrap();
    let info = GifEncoder::decode(&out).unwrap();
    assert_eq!((info.frames[1].pixel_width(), info.frames[1].pixel_height()), (5, 2));
    assert!(info.frame_delays.iter().all(|d| (d - 0.25).abs() < 1e-9));
}

#[test]
fn empty_queue_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let out = tmp.path().join("none.gif");
    let err = GifEncoder::encode(
        &mut FrameQueue::new(),
        &GifOptions::default(),
        &out,
        &StageProgress::detached(),
    )
    .unwrap_err();
    assert!(matches!(err, AssetError::NoFrames));
    assert!(!out.exists());
}

#[test]
fn invalid_ratio_is_a_configuration_error() {
    let opts = GifOptions {
        resize_ratio: 1.5,
        ..GifOptions::default()
    };
    assert!(matches!(opts.validate(), Err(AssetError::Configuration(_))));
}

#[test]
fn delay_resolution_prefers_unclamped() {
    assert_eq!(resolve_delay(Some(0.04), Some(0.1)), 0.04);
    assert_eq!(resolve_delay(Some(0.0), Some(0.07)), 0.07);
    assert_eq!(resolve_delay(None, None), DEFAULT_GIF_DELAY_SEC);
    assert_eq!(
        delay_fields(Delay::from_numer_denom_ms(0, 1)),
        (Some(0.0), Some(DEFAULT_GIF_DELAY_SEC))
    );
}

#[test]
fn garbage_is_not_a_gif() {
    let tmp = tempfile::tempdir().unwrap();
    let p = tmp.path().join("x.gif");
    std::fs::write(&p, b"not a gif").unwrap();
    assert!(GifEncoder::decode(&p).is_err());
}

fn encoded_with_loop(dir: &Path, loop_count: u16) -> (Vec<u8>, GifInfo) {
    let out = dir.join(format!("loop-{loop_count}.gif"));
    let opts = GifOptions {
        loop_count,
        ..GifOptions::default()
    };
    GifEncoder::encode(&mut queue(3, 4, 4), &opts, &out, &StageProgress::detached()).unwrap();
    (std::fs::read(&out).unwrap(), GifEncoder::decode(&out).unwrap())
}

#[test]
fn infinite_loop_writes_a_zero_repetition_block() {
    let tmp = tempfile::tempdir().unwrap();
    let (bytes, info) = encoded_with_loop(tmp.path(), 0);
    let mut block = vec![0x21, 0xFF, 0x0B];
    block.extend_from_slice(b"NETSCAPE2.0");
    block.extend_from_slice(&[0x03, 0x01, 0x00, 0x00, 0x00]);
    assert!(bytes.windows(block.len()).any(|w| w == block));
    assert_eq!(info.loop_count, Some(0));
}

#[test]
fn finite_loop_count_is_stored() {
    let tmp = tempfile::tempdir().unwrap();
    let (bytes, info) = encoded_with_loop(tmp.path(), 3);
    assert_eq!(netscape_loop_count(&bytes), Some(3));
    assert_eq!(info.loop_count, Some(3));
}

#[test]
fn loop_block_parsing() {
    let mut gif = b"GIF89a".to_vec();
    assert_eq!(netscape_loop_count(&gif), None);
    gif.extend_from_slice(&[0x21, 0xFF, 0x0B]);
    gif.extend_from_slice(b"NETSCAPE2.0");
    gif.extend_from_slice(&[0x03, 0x01, 0x2C, 0x01, 0x00]);
    assert_eq!(netscape_loop_count(&gif), Some(300));
    gif.truncate(gif.len() - 3);
    assert_eq!(netscape_loop_count(&gif), None);
}
