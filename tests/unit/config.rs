use super::*;

#[test]
fn empty_object_yields_defaults() {
    let cfg = PipelineConfig::from_json_str("{}").unwrap();
    assert_eq!(cfg, PipelineConfig::default());
    assert_eq!(cfg.preferred_fps, 60);
    assert_eq!(cfg.writer_queue_depth, 4);
    assert_eq!(cfg.gif.delay_sec, 0.1);
    assert_eq!(cfg.backend, BackendKind::Ffmpeg);
}

#[test]
fn partial_overrides_keep_other_defaults() {
    let cfg = PipelineConfig::from_json_str(
        r#"{ "preferred_fps": 20, "backend": "manifest", "gif": { "loop_count": 3 } }"#,
    )
    .unwrap();
    assert_eq!(cfg.preferred_fps, 20);
    assert_eq!(cfg.backend, BackendKind::Manifest);
    assert_eq!(cfg.gif.loop_count, 3);
    assert_eq!(cfg.gif.resize_ratio, 1.0);
    assert_eq!(cfg.media_backend().name(), "manifest");
}

#[test]
fn invalid_values_are_configuration_errors() {
    for json in [
        r#"{ "preferred_fps": 0 }"#,
        r#"{ "capture_scale": 0.0 }"#,
        r#"{ "writer_queue_depth": 0 }"#,
        r#"{ "still_offset_fraction": 1.5 }"#,
        r#"{ "jpeg_quality": 0 }"#,
        r#"{ "gif": { "resize_ratio": 2.0 } }"#,
        r#"{ "backend": "quicktime" }"#,
    ] {
        let err = PipelineConfig::from_json_str(json).unwrap_err();
        assert!(matches!(err, AssetError::Configuration(_)), "{json}: {err:?}");
    }
}

#[test]
fn cache_dir_override_is_used() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("framecast.json");
    std::fs::write(
        &path,
        format!(r#"{{ "cache_dir": {:?} }}"#, tmp.path().join("c").display().to_string()),
    )
    .unwrap();
    let cfg = PipelineConfig::from_path(&path).unwrap();
    assert_eq!(cfg.cache().root(), tmp.path().join("c"));
}

#[test]
fn missing_file_is_reported() {
    let err = PipelineConfig::from_path(Path::new("/definitely/not/here.json")).unwrap_err();
    assert!(matches!(err, AssetError::Configuration(_)));
}
