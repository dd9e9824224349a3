use super::*;

fn recorder() -> (ProgressFn, Arc<Mutex<Vec<f64>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    (
        Arc::new(move |v: f64| sink.lock().push(v)),
        seen,
    )
}

#[test]
fn stage_progress_is_clamped_and_monotonic() {
    let (sink, seen) = recorder();
    let p = StageProgress::new(sink);
    p.report(0.2);
    p.report(0.1);
    p.report(-3.0);
    p.report(0.5);
    p.report(7.0);
    p.report(1.0);
    assert_eq!(*seen.lock(), vec![0.2, 0.5, 1.0]);
    assert_eq!(p.last(), Some(1.0));
}

#[test]
fn blender_weights_stages_into_one_sequence() {
    let (sink, seen) = recorder();
    let blender = ProgressBlender::new(&[0.5, 0.25, 0.25], sink);
    let encode = blender.stage(0);
    let compose = blender.stage(1);
    let paired = blender.stage(2);

    encode.report(0.5);
    encode.report(1.0);
    compose.report(0.0);
    compose.report(1.0);
    paired.report(0.5);
    paired.report(1.0);

    let seen = seen.lock().clone();
    assert_eq!(seen.first().copied(), Some(0.25));
    assert!(seen.windows(2).all(|w| w[0] <= w[1]));
    assert!((seen.last().unwrap() - 1.0).abs() < 1e-9);
    assert!(seen.contains(&0.75));
}

#[test]
fn blender_normalizes_weights() {
    let (sink, seen) = recorder();
    let blender = ProgressBlender::new(&[2.0, 2.0], sink);
    blender.stage(0).report(1.0);
    assert_eq!(seen.lock().last().copied(), Some(0.5));
    blender.finish();
    assert_eq!(seen.lock().last().copied(), Some(1.0));
}

#[test]
fn empty_weights_fall_back_to_a_single_stage() {
    let (sink, seen) = recorder();
    let blender = ProgressBlender::new(&[], sink);
    assert_eq!(blender.stage_count(), 1);
    blender.stage(4).report(0.5);
    assert_eq!(*seen.lock(), vec![0.5]);
}

#[test]
fn concurrent_reporters_stay_monotonic() {
    let (sink, seen) = recorder();
    let p = StageProgress::new(sink);
    std::thread::scope(|s| {
        for t in 0..4 {
            let p = p.clone();
            s.spawn(move || {
                for i in 0..50 {
                    p.report(f64::from(i * 4 + t) / 200.0);
                }
            });
        }
    });
    let seen = seen.lock().clone();
    assert!(seen.windows(2).all(|w| w[0] < w[1]), "{seen:?}");
    assert_eq!(p.last(), seen.last().copied());
}
