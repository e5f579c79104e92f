use std::fs;
use std::io::Read;

use bucketfs::{Blob, CreateOptions, Error, Url};

fn file_url(path: &std::path::Path) -> String {
    Url::from_file_path(path).unwrap().to_string()
}

#[test]
fn file_blob_lifecycle() {
    bucketfs::init();
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().canonicalize().unwrap();
    let mut blob = Blob::new(&file_url(&root.join("path/to/file.txt"))).unwrap();

    assert!(blob.info().unwrap_err().is_not_found());
    blob.write(b"TESTDATA", CreateOptions::new()).unwrap();
    assert_eq!(fs::read(root.join("path/to/file.txt")).unwrap(), b"TESTDATA");

    let info = blob.info().unwrap();
    assert_eq!(info.size(), 8);
    assert!(info.path().ends_with("path/to/file.txt"));

    let mut data = String::new();
    blob.open().unwrap().read_to_string(&mut data).unwrap();
    assert_eq!(data, "TESTDATA");

    let moved = root.join("path/to/moved.txt");
    blob.mv(moved.to_str().unwrap()).unwrap();
    assert!(moved.exists());
    assert!(!root.join("path/to/file.txt").exists());
    assert_eq!(blob.read().unwrap(), b"TESTDATA");

    blob.rm().unwrap();
    assert!(!moved.exists());
    blob.close().unwrap();
}

#[test]
fn file_blob_path_keeps_percent_escapes() {
    bucketfs::init();
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().canonicalize().unwrap();
    let blob = Blob::new(&file_url(&root.join("a b/x.txt"))).unwrap();
    assert!(blob.path().ends_with("a%20b/x.txt"));

    blob.write(b"escaped", CreateOptions::new()).unwrap();
    assert_eq!(fs::read(root.join("a%20b/x.txt")).unwrap(), b"escaped");
    assert!(!root.join("a b").exists());

    let bucket = bucketfs::resolve(&file_url(&root)).unwrap();
    let decoded = Blob::from_bucket(bucket, "a b/x.txt");
    decoded.write(b"decoded", CreateOptions::new()).unwrap();
    assert_eq!(fs::read(root.join("a b/x.txt")).unwrap(), b"decoded");
}

#[test]
fn mem_blob_round_trip() {
    bucketfs::init();
    let blob = Blob::new("mem://bucket/a/b.bin").unwrap();
    assert_eq!(blob.path(), "a/b.bin");

    let data: Vec<u8> = (0..=255u8).collect();
    blob.create_with(CreateOptions::new(), |w| w.write(&data))
        .unwrap();
    assert_eq!(blob.read().unwrap(), data);
}

#[test]
fn failed_move_keeps_blob_path() {
    bucketfs::init();
    let mut blob = Blob::new("mem://bucket/missing.txt").unwrap();
    assert!(matches!(
        blob.mv("other.txt"),
        Err(Error::FileNotFound { .. })
    ));
    assert_eq!(blob.path(), "missing.txt");
}

#[test]
fn scoped_blob() {
    bucketfs::init();
    let size = Blob::open_with("mem://bucket/scoped.txt", |blob| {
        blob.write(b"12345", CreateOptions::new())?;
        Ok::<_, Error>(blob.info()?.size())
    })
    .unwrap();
    assert_eq!(size, 5);
}

#[test]
fn unresolvable_blob() {
    bucketfs::init();
    assert!(matches!(
        Blob::new("ftp://host/file.txt"),
        Err(Error::UnresolvableScheme { .. })
    ));
    assert!(matches!(Blob::new("::"), Err(Error::InvalidUrl(_))));
}
