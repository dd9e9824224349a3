use super::*;

const MEDIA: &[u8] = b"not really h264 but stays put";

fn mvhd(timescale: u32, next_track_id: u32) -> Vec<u8> {
    let mut p = full_box_u32s(0, &[0, 0, timescale, 10 * timescale, FIXED_ONE]);
    // volume, reserved
    p.extend_from_slice(&[0x01, 0x00]);
    p.extend_from_slice(&[0u8; 10]);
    for m in [FIXED_ONE, 0, 0, 0, FIXED_ONE, 0, 0, 0, 0x4000_0000] {
        p.extend_from_slice(&m.to_be_bytes());
    }
    p.extend_from_slice(&[0u8; 24]);
    p.extend_from_slice(&next_track_id.to_be_bytes());
    build_box(b"mvhd", &p)
}

fn moov() -> Vec<u8> {
    build_box(
        b"moov",
        &[mvhd(600, 2), build_box(b"udta", &build_box(b"free", &[]))].concat(),
    )
}

fn movie(moov_first: bool) -> Vec<u8> {
    let ftyp = build_box(b"ftyp", b"qt  \0\0\0\0qt  ");
    let mdat = build_box(b"mdat", MEDIA);
    let moov = moov();
    if moov_first {
        [ftyp, moov, mdat].concat()
    } else {
        [ftyp, mdat, moov].concat()
    }
}

fn write_movie(dir: &Path, moov_first: bool) -> std::path::PathBuf {
    let path = dir.join("m.mov");
    std::fs::write(&path, movie(moov_first)).unwrap();
    path
}

fn next_track_id(bytes: &[u8]) -> u32 {
    let moov = child(bytes, b"moov").unwrap().unwrap();
    movie_header(child(moov, b"mvhd").unwrap().unwrap())
        .unwrap()
        .next_track_id
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

#[test]
fn still_marker_becomes_a_metadata_track() {
    let tmp = tempfile::tempdir().unwrap();
    let path = write_movie(tmp.path(), false);
    let before = std::fs::read(&path).unwrap();
    let moov_start = before.len() - moov().len();

    append_timed_metadata_tracks(&path, &[TimedMetadata::still_image_time(1.5)]).unwrap();

    let after = std::fs::read(&path).unwrap();
    // Existing media is untouched and keeps its offsets.
    assert_eq!(&after[..moov_start], &before[..moov_start]);
    assert!(contains(&after, b"mebx"));
    assert!(contains(&after, b"mdtacom.apple.quicktime.still-image-time"));
    assert!(contains(&after, &[0, 0, 0, 17, b'm', b'd', b'a', b't', 0, 0, 0, 9, 0, 0, 0, 1, 0xFF]));
    assert_eq!(next_track_id(&after), 3);
    assert!(!tmp.path().join("m.timed-metadata.tmp").exists());

    let markers = read_timed_metadata(&path).unwrap();
    assert_eq!(markers, vec![TimedMetadata::still_image_time(1.5)]);
}

#[test]
fn marker_at_the_start_has_no_empty_edit() {
    let tmp = tempfile::tempdir().unwrap();
    let path = write_movie(tmp.path(), false);
    append_timed_metadata_tracks(&path, &[TimedMetadata::still_image_time(0.0)]).unwrap();
    let markers = read_timed_metadata(&path).unwrap();
    assert_eq!(markers.len(), 1);
    assert_eq!(markers[0].pts, 0.0);
    assert_eq!(markers[0].value, -1);
}

#[test]
fn each_marker_gets_its_own_track() {
    let tmp = tempfile::tempdir().unwrap();
    let path = write_movie(tmp.path(), false);
    let markers = [
        TimedMetadata::still_image_time(0.5),
        TimedMetadata::still_image_time(2.0),
    ];
    append_timed_metadata_tracks(&path, &markers).unwrap();

    let after = std::fs::read(&path).unwrap();
    assert_eq!(next_track_id(&after), 4);
    assert_eq!(read_timed_metadata(&path).unwrap(), markers.to_vec());
}

#[test]
fn moov_ahead_of_media_is_rejected_untouched() {
    let tmp = tempfile::tempdir().unwrap();
    let path = write_movie(tmp.path(), true);
    let err = append_timed_metadata_tracks(&path, &[TimedMetadata::still_image_time(1.0)])
        .unwrap_err();
    assert!(matches!(err, AssetError::Metadata(_)), "{err}");
    assert_eq!(std::fs::read(&path).unwrap(), movie(true));
}

#[test]
fn movies_without_marker_tracks_read_empty() {
    let tmp = tempfile::tempdir().unwrap();
    let path = write_movie(tmp.path(), false);
    assert!(read_timed_metadata(&path).unwrap().is_empty());
    append_timed_metadata_tracks(&path, &[]).unwrap();
    assert_eq!(std::fs::read(&path).unwrap(), movie(false));
}

#[test]
fn truncated_boxes_are_malformed() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("bad.mov");
    let mut bytes = movie(false);
    bytes.truncate(bytes.len() - 3);
    std::fs::write(&path, bytes).unwrap();
    assert!(matches!(read_timed_metadata(&path), Err(AssetError::Metadata(_))));
}
