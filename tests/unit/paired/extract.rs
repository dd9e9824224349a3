use super::*;
use std::io::Cursor;

fn resource(kind: ResourceKind, content_type: &str, bytes: &[u8]) -> PairedResource {
    PairedResource {
        kind,
        content_type: content_type.to_string(),
        reader: Box::new(Cursor::new(bytes.to_vec())),
    }
}

struct Broken;

impl Read for Broken {
    fn read(&mut self, _: &mut [u8]) -> std::io::Result<usize> {
        Err(std::io::Error::other("network dropped"))
    }
}

#[test]
fn extensions_follow_declared_content_types() {
    assert_eq!(extension_for("image/jpeg"), "jpg");
    assert_eq!(extension_for("IMAGE/HEIC"), "heic");
    assert_eq!(extension_for("video/quicktime; codecs=hvc1"), "mov");
    assert_eq!(extension_for("video/mp4"), "mp4");
    assert_eq!(extension_for("application/x-unknown"), "dat");
}

#[test]
fn both_resources_land_on_disk() {
    let tmp = tempfile::tempdir().unwrap();
    let source = PairedAssetSource {
        resources: vec![
            resource(ResourceKind::PairedVideo, "video/quicktime", b"movie"),
            resource(ResourceKind::Photo, "image/jpeg", b"still"),
        ],
    };
    let pair = extract(source, tmp.path(), "IMG_0001").unwrap();
    assert_eq!(pair.still, tmp.path().join("IMG_0001.jpg"));
    assert_eq!(pair.video, tmp.path().join("IMG_0001-video.mov"));
    assert_eq!(std::fs::read(&pair.still).unwrap(), b"still");
    assert_eq!(std::fs::read(&pair.video).unwrap(), b"movie");
}

#[test]
fn files_on_disk_round_trip() {
    let tmp = tempfile::tempdir().unwrap();
    let still = tmp.path().join("a.jpg");
    let video = tmp.path().join("a.mov");
    std::fs::write(&still, b"s").unwrap();
    std::fs::write(&video, b"v").unwrap();

    let source = PairedAssetSource::from_files(&still, &video).unwrap();
    let pair = extract(source, &tmp.path().join("out"), "pair").unwrap();
    assert_eq!(pair.still.extension().unwrap(), "jpg");
    assert_eq!(pair.video.extension().unwrap(), "mov");
}

#[test]
fn one_failed_fetch_fails_the_extraction() {
    let tmp = tempfile::tempdir().unwrap();
    let source = PairedAssetSource {
        resources: vec![
            resource(ResourceKind::Photo, "image/jpeg", b"still"),
            PairedResource {
                kind: ResourceKind::PairedVideo,
                content_type: "video/quicktime".to_string(),
                reader: Box::new(Broken),
            },
        ],
    };
    let err = extract(source, tmp.path(), "x").unwrap_err();
    assert!(matches!(err, AssetError::Io(_)), "{err:?}");
    assert!(!tmp.path().join("x.jpg").exists());
}

#[test]
fn missing_video_resource_is_reported() {
    let tmp = tempfile::tempdir().unwrap();
    let source = PairedAssetSource {
        resources: vec![resource(ResourceKind::Photo, "image/png", b"p")],
    };
    let err = extract(source, tmp.path(), "x").unwrap_err();
    assert!(matches!(err, AssetError::CouldNotAccessVideoTrack));
}
