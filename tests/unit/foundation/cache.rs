use super::*;

#[test]
fn fresh_path_removes_previous_file() {
    let tmp = tempfile::tempdir().unwrap();
    let cache = CacheDir::at(tmp.path().join("nested"));
    let p = cache.fresh_path("out.mov").unwrap();
    std::fs::write(&p, b"old").unwrap();

    let again = cache.fresh_path("out.mov").unwrap();
    assert_eq!(p, again);
    assert!(!again.exists());
}

#[test]
fn remove_if_exists_is_idempotent() {
    let tmp = tempfile::tempdir().unwrap();
    let p = tmp.path().join("x.bin");
    remove_if_exists(&p).unwrap();
    std::fs::write(&p, b"1").unwrap();
    remove_if_exists(&p).unwrap();
    remove_if_exists(&p).unwrap();
    assert!(!p.exists());
}

#[test]
fn unique_paths_differ() {
    let tmp = tempfile::tempdir().unwrap();
    let cache = CacheDir::at(tmp.path());
    let a = cache.unique_path("clip", "mov").unwrap();
    let b = cache.unique_path("clip", "mov").unwrap();
    assert_ne!(a, b);
    assert_eq!(a.extension().unwrap(), "mov");
}

#[test]
fn process_scoped_root_mentions_pid() {
    let cache = CacheDir::process_scoped();
    let name = cache.root().file_name().unwrap().to_string_lossy().to_string();
    assert!(name.ends_with(&std::process::id().to_string()));
}
