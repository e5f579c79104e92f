use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::sync::{Arc, PoisonError, RwLock};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use url::Url;

use bucketfs_core::{
    norm_path, Bucket, BucketBox, CreateOptions, Error, FileInfo, Metadata, ObjectReader, Options,
    Paths, Pattern, Result, Writer, DEFAULT_PERM,
};

#[derive(Clone)]
struct Entry {
    data: Bytes,
    mtime: DateTime<Utc>,
    mode: u16,
    content_type: Option<String>,
    metadata: Metadata,
}

impl Entry {
    fn info(&self, path: &str) -> FileInfo {
        FileInfo::new(path)
            .with_size(self.data.len() as u64)
            .with_mtime(self.mtime)
            .with_mode(self.mode.into())
            .with_content_type(self.content_type.clone())
            .with_metadata(self.metadata.clone())
    }
}

type Entries = Arc<RwLock<BTreeMap<String, Entry>>>;

/// A process-local bucket keeping every object in memory.
///
/// Clones share the same contents. Content types, metadata and permissions
/// are kept as given on create and reported back by `info`.
#[derive(Clone, Default)]
pub struct InMemoryBucket {
    entries: Entries,
    perm: Option<u16>,
}

impl InMemoryBucket {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_perm(mut self, perm: u16) -> Self {
        self.perm = Some(bucketfs_core::norm_mode(perm.into()));
        self
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entry(&self, key: &str) -> Result<Entry> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
            .ok_or_else(|| Error::not_found(key))
    }
}

impl Bucket for InMemoryBucket {
    fn ls(&self, pattern: &str) -> Result<Paths<'_>> {
        let matcher = Pattern::new(pattern.trim_start_matches('/'))?;
        let keys: Vec<String> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        log::trace!("Listing {} of {} objects...", matcher, keys.len());
        Ok(Box::new(
            keys.into_iter()
                .filter(move |key| matcher.matches(key))
                .map(Ok),
        ))
    }

    fn info(&self, path: &str) -> Result<FileInfo> {
        let key = norm_path(path);
        Ok(self.entry(&key)?.info(&key))
    }

    fn create(&self, path: &str, options: CreateOptions) -> Result<Writer> {
        let key = norm_path(path);
        let perm = options.get_perm().or(self.perm).unwrap_or(DEFAULT_PERM);
        let entries = self.entries.clone();
        let hint = key.clone();
        log::debug!("Creating {}...", key);

        Writer::new(&hint, perm, move |staged| {
            let entry = Entry {
                data: Bytes::from(fs::read(staged.path())?),
                mtime: Utc::now(),
                mode: perm,
                content_type: options.get_content_type().map(str::to_string),
                metadata: options.get_metadata().clone(),
            };
            entries
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(key, entry);
            Ok(())
        })
    }

    fn open(&self, path: &str) -> Result<ObjectReader> {
        let key = norm_path(path);
        let entry = self.entry(&key)?;
        log::debug!("Opening {}...", key);
        Ok(Box::new(io::Cursor::new(entry.data)))
    }

    fn rm(&self, path: &str) -> Result<()> {
        let key = norm_path(path);
        log::debug!("Removing {}...", key);
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&key);
        Ok(())
    }

    fn cp(&self, src: &str, dst: &str) -> Result<()> {
        let (src, dst) = (norm_path(src), norm_path(dst));
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let mut entry = entries.get(&src).cloned().ok_or_else(|| Error::not_found(&src))?;
        log::debug!("Copying {} to {}...", src, dst);
        entry.mtime = Utc::now();
        entries.insert(dst, entry);
        Ok(())
    }

    fn mv(&self, src: &str, dst: &str) -> Result<()> {
        let (src, dst) = (norm_path(src), norm_path(dst));
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let entry = entries.remove(&src).ok_or_else(|| Error::not_found(&src))?;
        log::debug!("Moving {} to {}...", src, dst);
        entries.insert(dst, entry);
        Ok(())
    }

    fn read(&self, path: &str) -> Result<Vec<u8>> {
        let key = norm_path(path);
        Ok(self.entry(&key)?.data.to_vec())
    }
}

/// Builds an empty [`InMemoryBucket`] for every `mem://` URL.
///
/// Honors the `perm` option.
pub fn memory_factory(_url: &Url, options: &Options) -> Result<BucketBox> {
    let mut bucket = InMemoryBucket::new();
    if let Some(perm) = options.perm()? {
        bucket = bucket.with_perm(perm);
    }
    Ok(Box::new(bucket))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bucketfs_core::test_suite;

    #[test]
    fn passes_conformance_suite() {
        test_suite::run_all(&InMemoryBucket::new());
    }

    #[test]
    fn clones_share_contents() {
        let bucket = InMemoryBucket::new();
        let other = bucket.clone();
        bucket.write("a.txt", b"shared", CreateOptions::new()).unwrap();
        assert_eq!(other.read("a.txt").unwrap(), b"shared");
        assert_eq!(other.len(), 1);
    }

    #[test]
    fn reports_attributes_given_on_create() {
        let bucket = InMemoryBucket::new();
        bucket
            .write(
                "a.txt",
                b"x",
                CreateOptions::new()
                    .content_type("application/json")
                    .meta("x-trace-id", "abc")
                    .perm(0o600),
            )
            .unwrap();
        let info = bucket.info("/a.txt").unwrap();
        assert_eq!(info.mode(), 0o600);
        assert_eq!(info.content_type(), Some("application/json"));
        assert_eq!(info.metadata()["X-Trace-Id"], "abc");

        bucket.write("b.txt", b"y", CreateOptions::new()).unwrap();
        assert_eq!(bucket.info("b.txt").unwrap().mode(), DEFAULT_PERM);
    }

    #[test]
    fn native_cp_keeps_attributes() {
        let bucket = InMemoryBucket::new();
        bucket
            .write("a.txt", b"x", CreateOptions::new().content_type("text/plain"))
            .unwrap();
        bucket.cp("a.txt", "b/c.txt").unwrap();
        assert_eq!(bucket.info("b/c.txt").unwrap().content_type(), Some("text/plain"));
        assert_eq!(bucket.len(), 2);
    }

    #[test]
    fn long_keys_are_accepted() {
        let bucket = InMemoryBucket::new();
        let key = format!("dir/{}", "n".repeat(250));
        bucket.write(&key, b"x", CreateOptions::new()).unwrap();
        assert_eq!(bucket.read(&key).unwrap(), b"x");
    }

    #[test]
    fn listing_does_not_hold_the_lock() {
        let bucket = InMemoryBucket::new();
        bucket.write("a.txt", b"1", CreateOptions::new()).unwrap();
        bucket.write("b.txt", b"2", CreateOptions::new()).unwrap();

        let mut listed = Vec::new();
        for path in bucket.ls("*").unwrap() {
            let path = path.unwrap();
            bucket.rm(&path).unwrap();
            listed.push(path);
        }
        assert_eq!(listed, vec!["a.txt", "b.txt"]);
        assert!(bucket.is_empty());
    }

    #[test]
    fn factory_builds_fresh_buckets() {
        let url = Url::parse("mem://bucket?perm=0640").unwrap();
        let options = Options::from_url(&url);
        let first = memory_factory(&url, &options).unwrap();
        first.write("x.txt", b"x", CreateOptions::new()).unwrap();
        assert_eq!(first.info("x.txt").unwrap().mode(), 0o640);

        let second = memory_factory(&url, &options).unwrap();
        assert!(second.read("x.txt").unwrap_err().is_not_found());
    }
}
