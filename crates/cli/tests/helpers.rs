use std::fs;
use std::path::Path;

use romscope::{canonicalize_or_current, infer_project_name, sha256_bytes, sha256_file};
use tempfile::tempdir;

#[test]
fn canonicalize_or_current_returns_cwd_for_dot() {
    let original = std::env::current_dir().expect("cwd");
    let tmp = tempdir().expect("tempdir");
    std::env::set_current_dir(tmp.path()).expect("chdir tmp");

    let result = canonicalize_or_current(".").expect("canonicalize").canonicalize().expect("canon");
    let expected = tmp.path().canonicalize().expect("canon tmp");
    assert_eq!(result, expected);

    std::env::set_current_dir(original).expect("restore cwd");
}

#[test]
fn canonicalize_or_current_keeps_missing_paths_absolute() {
    let tmp = tempdir().expect("tempdir");
    let missing = tmp.path().join("not-yet");
    let result = canonicalize_or_current(missing.to_str().expect("utf8")).expect("canonicalize");
    assert!(result.is_absolute());
    assert!(result.ends_with("not-yet"));
}

#[test]
fn infer_project_name_uses_last_path_component() {
    assert_eq!(infer_project_name(Path::new("/work/super-game")), "super-game");
    assert_eq!(infer_project_name(Path::new("/")), "unnamed-project");
}

#[test]
fn file_and_buffer_hashes_agree() {
    let tmp = tempdir().expect("tempdir");
    let path = tmp.path().join("abc.bin");
    fs::write(&path, b"abc").expect("write");

    let expected = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";
    assert_eq!(sha256_bytes(b"abc"), expected);
    assert_eq!(sha256_file(&path).expect("hash"), expected);
    assert!(sha256_file(&tmp.path().join("missing")).is_err());
}
