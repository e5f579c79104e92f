//! Shared conformance checks for [`Bucket`] implementations.
//!
//! Every backend should pass [`run_all`] (or [`run_all_with`] when it cannot
//! store content types or metadata). Each check starts from the same seeded
//! layout:
//!
//! ```text
//! a/b.txt          TESTDATA-b
//! a/b/c.txt        TESTDATA-c   text/plain, Meta-Key: value
//! a/b/c/d.txt      TESTDATA-d
//! a/b/c/d/e.txt    TESTDATA-e
//! ```

use std::io::Read;

use crate::{Bucket, BucketExt, CreateOptions, Error, FileInfo, DEFAULT_PATTERN};

/// What a backend is able to persist besides the bytes.
#[derive(Debug, Clone, Copy)]
pub struct Features {
    pub content_type: bool,
    pub metadata: bool,
}

impl Default for Features {
    fn default() -> Self {
        Self {
            content_type: true,
            metadata: true,
        }
    }
}

impl Features {
    /// Plain file storage: bytes and file attributes only.
    pub fn bytes_only() -> Self {
        Self {
            content_type: false,
            metadata: false,
        }
    }
}

pub fn run_all(bucket: &dyn Bucket) {
    run_all_with(bucket, Features::default());
}

pub fn run_all_with(bucket: &dyn Bucket, features: Features) {
    let checks: [(&str, fn(&dyn Bucket, Features)); 13] = [
        ("ls", |b, _| check_ls(b)),
        ("hidden", |b, _| check_hidden(b)),
        ("glob", |b, _| check_glob(b)),
        ("info", check_info),
        ("write_read", |b, _| check_write_read(b)),
        ("binary", |b, _| check_binary(b)),
        ("create_scoped", |b, _| check_create_scoped(b)),
        ("create_manual", |b, _| check_create_manual(b)),
        ("failed_create", |b, _| check_failed_create(b)),
        ("not_found", |b, _| check_not_found(b)),
        ("rm", |b, _| check_rm(b)),
        ("cp", |b, _| check_cp(b)),
        ("mv", |b, _| check_mv(b)),
    ];
    for (name, check) in checks {
        log::debug!("Running bucket check {}", name);
        reset(bucket);
        check(bucket, features);
    }
    clear(bucket);
}

/// Remove everything from the bucket.
pub fn clear(bucket: &dyn Bucket) {
    let paths = list(bucket, DEFAULT_PATTERN);
    for path in paths {
        bucket.rm(&path).unwrap();
    }
}

/// Clear the bucket, then write the seed layout.
pub fn reset(bucket: &dyn Bucket) {
    clear(bucket);
    bucket
        .write("/a/b.txt", b"TESTDATA-b", CreateOptions::new())
        .unwrap();
    bucket
        .write(
            "a/b/c.txt",
            b"TESTDATA-c",
            CreateOptions::new()
                .content_type("text/plain")
                .meta("meta-key", "value"),
        )
        .unwrap();
    bucket
        .write("a/b/c/d.txt", b"TESTDATA-d", CreateOptions::new())
        .unwrap();
    bucket
        .write("a/b/c/d/e.txt", b"TESTDATA-e", CreateOptions::new())
        .unwrap();
}

/// Sorted listing, panicking on any error.
pub fn list(bucket: &dyn Bucket, pattern: &str) -> Vec<String> {
    let mut paths: Vec<String> = bucket
        .ls(pattern)
        .unwrap()
        .collect::<crate::Result<_>>()
        .unwrap();
    paths.sort();
    paths
}

fn assert_not_found<T: std::fmt::Debug>(result: crate::Result<T>, expected: &str) {
    match result {
        Err(Error::FileNotFound { path }) => assert_eq!(path, expected),
        other => panic!("expected FileNotFound({}), got {:?}", expected, other),
    }
}

pub fn check_ls(bucket: &dyn Bucket) {
    assert_eq!(
        list(bucket, DEFAULT_PATTERN),
        vec!["a/b.txt", "a/b/c.txt", "a/b/c/d.txt", "a/b/c/d/e.txt"]
    );
    assert_eq!(list(bucket, "a/b/*/*"), vec!["a/b/c/d.txt"]);
    assert_eq!(list(bucket, "**/c*"), vec!["a/b/c.txt"]);
    assert_eq!(list(bucket, "a/*"), vec!["a/b.txt"]);
    assert!(list(bucket, "x/**").is_empty());

    // Listings can be restarted.
    assert_eq!(bucket.ls("a/b/*/*").unwrap().count(), 1);
    assert_eq!(bucket.ls("a/b/*/*").unwrap().count(), 1);
}

/// Objects whose name or directory starts with `.` are only listed by
/// patterns naming the dot.
pub fn check_hidden(bucket: &dyn Bucket) {
    let hidden = [".hidden", "a/.cfg", "a/.git/config"];
    for path in hidden {
        bucket.write(path, b"hidden", CreateOptions::new()).unwrap();
    }

    assert_eq!(
        list(bucket, DEFAULT_PATTERN),
        vec!["a/b.txt", "a/b/c.txt", "a/b/c/d.txt", "a/b/c/d/e.txt"]
    );
    assert_eq!(list(bucket, "a/*"), vec!["a/b.txt"]);
    assert_eq!(list(bucket, ".*"), vec![".hidden"]);
    assert_eq!(list(bucket, "a/.*"), vec!["a/.cfg"]);
    assert_eq!(list(bucket, "a/.git/*"), vec!["a/.git/config"]);
    assert_eq!(bucket.info("a/.cfg").unwrap().size(), 6);

    for path in hidden {
        bucket.rm(path).unwrap();
    }
    assert!(list(bucket, "**/.*").is_empty());
}

pub fn check_glob(bucket: &dyn Bucket) {
    let infos: Vec<FileInfo> = bucket
        .glob("a/b/*/*")
        .unwrap()
        .collect::<crate::Result<_>>()
        .unwrap();
    assert_eq!(infos.len(), 1);
    assert_eq!(infos[0].path(), "a/b/c/d.txt");
    assert_eq!(infos[0].size(), 10);

    assert_eq!(bucket.glob(DEFAULT_PATTERN).unwrap().count(), 4);
}

pub fn check_info(bucket: &dyn Bucket, features: Features) {
    let info = bucket.info("/a/b/c.txt").unwrap();
    assert_eq!(info.path(), "a/b/c.txt");
    assert_eq!(info.size(), 10);
    let age = chrono::Utc::now().signed_duration_since(info.mtime());
    assert!(age.num_seconds().abs() <= 10, "mtime is {:?} old", age);

    if features.content_type {
        assert_eq!(info.content_type(), Some("text/plain"));
    }
    if features.metadata {
        assert_eq!(info.metadata().len(), 1);
        assert_eq!(info.metadata()["Meta-Key"], "value");
    }

    assert_not_found(bucket.info("missing.txt"), "missing.txt");
    assert_not_found(bucket.info("a/b"), "a/b");
}

pub fn check_write_read(bucket: &dyn Bucket) {
    assert_eq!(bucket.read("a/b.txt").unwrap(), b"TESTDATA-b");
    assert_eq!(bucket.read("/a/b.txt").unwrap(), b"TESTDATA-b");

    bucket
        .write("a/b.txt", b"NEWDATA", CreateOptions::new())
        .unwrap();
    assert_eq!(bucket.read("a/b.txt").unwrap(), b"NEWDATA");
    assert_eq!(list(bucket, DEFAULT_PATTERN).len(), 4);
}

pub fn check_binary(bucket: &dyn Bucket) {
    let data: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
    bucket
        .write("bin/all-bytes.dat", &data, CreateOptions::new())
        .unwrap();
    assert_eq!(bucket.read("bin/all-bytes.dat").unwrap(), data);
    assert_eq!(bucket.info("bin/all-bytes.dat").unwrap().size(), 4096);

    bucket.write("empty.dat", b"", CreateOptions::new()).unwrap();
    assert!(bucket.read("empty.dat").unwrap().is_empty());
}

pub fn check_create_scoped(bucket: &dyn Bucket) {
    let written = bucket
        .create_with("x.txt", CreateOptions::new(), |w| {
            w.write(b"DATA-x")?;
            Ok::<_, Error>(6)
        })
        .unwrap();
    assert_eq!(written, 6);

    let read = bucket
        .open_with("x.txt", |r| {
            let mut s = String::new();
            r.read_to_string(&mut s)?;
            Ok::<_, Error>(s)
        })
        .unwrap();
    assert_eq!(read, "DATA-x");
}

pub fn check_create_manual(bucket: &dyn Bucket) {
    let mut writer = bucket.create("y.txt", CreateOptions::new()).unwrap();
    writer.write(b"DATA-y").unwrap();
    assert_not_found(bucket.info("y.txt"), "y.txt");

    assert!(writer.commit().unwrap());
    assert!(!writer.commit().unwrap());
    assert!(matches!(writer.write(b"more"), Err(Error::WriterClosed)));

    let mut reader = bucket.open("y.txt").unwrap();
    let mut data = Vec::new();
    reader.read_to_end(&mut data).unwrap();
    assert_eq!(data, b"DATA-y");
}

pub fn check_failed_create(bucket: &dyn Bucket) {
    let result = bucket.create_with("z.txt", CreateOptions::new(), |w| {
        w.write(b"partial")?;
        Err::<(), _>(Error::Transport("interrupted".into()))
    });
    assert!(matches!(result, Err(Error::Transport(_))));
    assert_not_found(bucket.info("z.txt"), "z.txt");

    let mut writer = bucket.create("a/b.txt", CreateOptions::new()).unwrap();
    writer.write(b"DISCARDED").unwrap();
    assert!(writer.discard());
    assert!(!writer.commit().unwrap());

    let mut writer = bucket.create("a/b.txt", CreateOptions::new()).unwrap();
    writer.write(b"DROPPED").unwrap();
    drop(writer);

    assert_eq!(bucket.read("a/b.txt").unwrap(), b"TESTDATA-b");
    assert_eq!(list(bucket, DEFAULT_PATTERN).len(), 4);
}

pub fn check_not_found(bucket: &dyn Bucket) {
    assert_not_found(bucket.read("not/found.txt"), "not/found.txt");
    assert_not_found(bucket.open("/not/found.txt").map(|_| ()), "not/found.txt");
}

pub fn check_rm(bucket: &dyn Bucket) {
    bucket.rm("a/b/c.txt").unwrap();
    bucket.rm("not/found.txt").unwrap();
    bucket.rm("a/b/c.txt").unwrap();
    assert_eq!(
        list(bucket, DEFAULT_PATTERN),
        vec!["a/b.txt", "a/b/c/d.txt", "a/b/c/d/e.txt"]
    );
}

pub fn check_cp(bucket: &dyn Bucket) {
    bucket.cp("a/b/c.txt", "x.txt").unwrap();
    assert_eq!(list(bucket, DEFAULT_PATTERN).len(), 5);
    assert_eq!(bucket.read("x.txt").unwrap(), b"TESTDATA-c");
    assert_eq!(bucket.read("a/b/c.txt").unwrap(), b"TESTDATA-c");

    bucket.cp("/a/b.txt", "new/parent/dirs.txt").unwrap();
    assert_eq!(bucket.read("new/parent/dirs.txt").unwrap(), b"TESTDATA-b");

    assert_not_found(bucket.cp("missing.txt", "x.txt"), "missing.txt");
    assert_eq!(bucket.read("x.txt").unwrap(), b"TESTDATA-c");
}

pub fn check_mv(bucket: &dyn Bucket) {
    bucket.mv("a/b/c.txt", "x.txt").unwrap();
    assert_eq!(list(bucket, DEFAULT_PATTERN).len(), 4);
    assert_eq!(bucket.read("x.txt").unwrap(), b"TESTDATA-c");
    assert_not_found(bucket.read("a/b/c.txt"), "a/b/c.txt");

    assert_not_found(bucket.mv("missing.txt", "x.txt"), "missing.txt");
    assert_eq!(bucket.read("x.txt").unwrap(), b"TESTDATA-c");
}

#[cfg(test)]
pub(crate) use map_bucket::MapBucket;

#[cfg(test)]
mod map_bucket {
    use std::collections::BTreeMap;
    use std::io;
    use std::sync::{Arc, Mutex};

    use chrono::{DateTime, Utc};

    use crate::bucket::{ObjectReader, Paths};
    use crate::{Bucket, CreateOptions, Error, FileInfo, Pattern, Result, Writer};

    struct Entry {
        data: Vec<u8>,
        mtime: DateTime<Utc>,
        options: CreateOptions,
    }

    /// Smallest possible bucket: only the required methods, so every
    /// provided default gets exercised.
    #[derive(Default, Clone)]
    pub struct MapBucket {
        files: Arc<Mutex<BTreeMap<String, Entry>>>,
    }

    impl Bucket for MapBucket {
        fn ls(&self, pattern: &str) -> Result<Paths<'_>> {
            let pattern = Pattern::new(pattern)?;
            let keys: Vec<String> = self.files.lock().unwrap().keys().cloned().collect();
            Ok(Box::new(
                keys.into_iter().filter(move |k| pattern.matches(k)).map(Ok),
            ))
        }

        fn info(&self, path: &str) -> Result<FileInfo> {
            let path = crate::norm_path(path);
            let files = self.files.lock().unwrap();
            let entry = files.get(&path).ok_or_else(|| Error::not_found(&path))?;
            Ok(FileInfo::new(path.clone())
                .with_size(entry.data.len() as u64)
                .with_mtime(entry.mtime)
                .with_mode(entry.options.get_perm().unwrap_or(0).into())
                .with_content_type(entry.options.get_content_type().map(str::to_string))
                .with_metadata(entry.options.get_metadata().clone()))
        }

        fn create(&self, path: &str, options: CreateOptions) -> Result<Writer> {
            let key = crate::norm_path(path);
            let files = self.files.clone();
            Writer::new(path, crate::DEFAULT_PERM, move |staged| {
                let data = std::fs::read(staged.path())?;
                let entry = Entry {
                    data,
                    mtime: Utc::now(),
                    options,
                };
                files.lock().unwrap().insert(key, entry);
                Ok(())
            })
        }

        fn open(&self, path: &str) -> Result<ObjectReader> {
            let path = crate::norm_path(path);
            let files = self.files.lock().unwrap();
            let entry = files.get(&path).ok_or_else(|| Error::not_found(&path))?;
            Ok(Box::new(io::Cursor::new(entry.data.clone())))
        }

        fn rm(&self, path: &str) -> Result<()> {
            self.files.lock().unwrap().remove(&crate::norm_path(path));
            Ok(())
        }
    }

    #[test]
    fn passes_conformance_suite() {
        super::run_all(&MapBucket::default());
    }
}
