//! Handles to a single object addressed by URL.

use std::fmt;

use url::Url;

use crate::bucket::ObjectReader;
use crate::registry::{self, Registry};
use crate::{Bucket, BucketBox, BucketExt, CreateOptions, Error, FileInfo, Result, Writer};

/// A single object, bound to the bucket that holds it.
///
/// The URL's path names the object; everything else (scheme, host,
/// credentials, query options) picks the bucket, which is resolved eagerly.
/// Dropping a blob closes its bucket.
///
/// ```rust,no_run
/// use bucketfs_core::{Blob, CreateOptions};
///
/// let mut blob = Blob::new("mem://bucket/reports/today.csv")?;
/// blob.write(b"a,b\n1,2\n", CreateOptions::new().content_type("text/csv"))?;
/// blob.mv("reports/yesterday.csv")?;
/// assert_eq!(blob.path(), "reports/yesterday.csv");
/// # Ok::<(), bucketfs_core::Error>(())
/// ```
pub struct Blob {
    bucket: BucketBox,
    path: String,
}

impl Blob {
    /// Resolve `url` against the global registry.
    ///
    /// The object path is used exactly as it appears in the URL, without
    /// percent-decoding. `Url::from_file_path("/tmp/a b/x")` therefore binds
    /// `tmp/a%20b/x`; pass file paths with reserved characters in unescaped
    /// form, or bind them with [`Blob::from_bucket`].
    pub fn new(url: &str) -> Result<Self> {
        Self::resolve_in(registry::global(), url)
    }

    pub fn resolve_in(registry: &Registry, url: &str) -> Result<Self> {
        Self::resolve_url_in(registry, Url::parse(url)?)
    }

    /// The path is taken as written in the URL and normalized; the bucket is
    /// resolved from the same URL with its path replaced by `/`.
    pub fn resolve_url_in(registry: &Registry, mut url: Url) -> Result<Self> {
        let path = crate::norm_path(url.path());
        url.set_path("/");
        let bucket = registry.resolve_url(&url)?;
        Ok(Self::from_bucket(bucket, &path))
    }

    /// Bind an already resolved bucket.
    pub fn from_bucket(bucket: BucketBox, path: &str) -> Self {
        Self {
            bucket,
            path: crate::norm_path(path),
        }
    }

    /// Resolve `url`, run `body` against the blob, then close it.
    pub fn open_with<T, E, F>(url: &str, body: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut Blob) -> std::result::Result<T, E>,
        E: From<Error>,
    {
        let mut blob = Blob::new(url)?;
        let result = body(&mut blob);
        match (result, blob.close()) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(close_err)) => Err(close_err.into()),
            (Err(err), close) => {
                if let Err(close_err) = close {
                    log::warn!("Failed to close blob {}: {}", blob.path, close_err);
                }
                Err(err)
            }
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn bucket(&self) -> &dyn Bucket {
        self.bucket.as_ref()
    }

    pub fn info(&self) -> Result<FileInfo> {
        self.bucket.info(&self.path)
    }

    /// Start writing the object; see [`Bucket::create`].
    pub fn create(&self, options: CreateOptions) -> Result<Writer> {
        self.bucket.create(&self.path, options)
    }

    /// Write the object through `body`, committing only if it succeeds.
    pub fn create_with<T, E, F>(&self, options: CreateOptions, body: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut Writer) -> std::result::Result<T, E>,
        E: From<Error>,
    {
        self.bucket.create_with(&self.path, options, body)
    }

    pub fn open(&self) -> Result<ObjectReader> {
        self.bucket.open(&self.path)
    }

    pub fn rm(&self) -> Result<()> {
        self.bucket.rm(&self.path)
    }

    pub fn read(&self) -> Result<Vec<u8>> {
        self.bucket.read(&self.path)
    }

    pub fn write(&self, data: &[u8], options: CreateOptions) -> Result<()> {
        self.bucket.write(&self.path, data, options)
    }

    /// Move the object within its bucket. The blob follows it only once the
    /// move succeeded.
    pub fn mv(&mut self, dst: &str) -> Result<()> {
        let dst = crate::norm_path(dst);
        self.bucket.mv(&self.path, &dst)?;
        self.path = dst;
        Ok(())
    }

    /// Close the underlying bucket. Safe to call more than once.
    pub fn close(&mut self) -> Result<()> {
        self.bucket.close()
    }
}

impl Drop for Blob {
    fn drop(&mut self) {
        if let Err(e) = self.bucket.close() {
            log::warn!("Failed to close bucket of blob {}: {}", self.path, e);
        }
    }
}

impl fmt::Debug for Blob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Blob").field("path", &self.path).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_suite::MapBucket;
    use crate::Options;

    fn registry_with(shared: &MapBucket) -> Registry {
        let registry = Registry::new();
        let inner = shared.clone();
        registry
            .register(&["mem"], move |url: &Url, _: &Options| -> Result<BucketBox> {
                assert_eq!(url.path(), "/");
                Ok(Box::new(inner.clone()))
            })
            .unwrap();
        registry
    }

    #[test]
    fn binds_normalized_path() {
        let shared = MapBucket::default();
        let registry = registry_with(&shared);
        let blob = Blob::resolve_in(&registry, "mem://bucket/path/to/file.txt").unwrap();
        assert_eq!(blob.path(), "path/to/file.txt");
    }

    #[test]
    fn path_is_not_percent_decoded() {
        let shared = MapBucket::default();
        let registry = registry_with(&shared);
        let blob = Blob::resolve_in(&registry, "mem://bucket/a%20b.txt").unwrap();
        assert_eq!(blob.path(), "a%20b.txt");
    }

    #[test]
    fn query_options_reach_the_bucket() {
        let shared = MapBucket::default();
        let registry = registry_with(&shared);
        let blob = Blob::resolve_in(&registry, "mem://bucket/x.txt?prefix=scope").unwrap();
        blob.write(b"data", CreateOptions::new()).unwrap();
        assert_eq!(shared.read("scope/x.txt").unwrap(), b"data");
        assert_eq!(blob.info().unwrap().path(), "x.txt");
    }

    #[test]
    fn lifecycle() {
        let shared = MapBucket::default();
        let registry = registry_with(&shared);
        let mut blob = Blob::resolve_in(&registry, "mem://bucket/path/to/file.txt").unwrap();

        assert!(blob.info().unwrap_err().is_not_found());
        blob.write(b"TESTDATA", CreateOptions::new().content_type("text/plain"))
            .unwrap();

        let info = blob.info().unwrap();
        assert_eq!(info.path(), "path/to/file.txt");
        assert_eq!(info.size(), 8);
        assert_eq!(info.content_type(), Some("text/plain"));
        assert_eq!(blob.read().unwrap(), b"TESTDATA");

        blob.mv("/path/to/moved.txt").unwrap();
        assert_eq!(blob.path(), "path/to/moved.txt");
        assert_eq!(blob.read().unwrap(), b"TESTDATA");
        assert!(shared.read("path/to/file.txt").unwrap_err().is_not_found());

        blob.rm().unwrap();
        assert!(blob.read().unwrap_err().is_not_found());
        blob.close().unwrap();
        blob.close().unwrap();
    }

    #[test]
    fn failed_move_keeps_path() {
        let shared = MapBucket::default();
        let registry = registry_with(&shared);
        let mut blob = Blob::resolve_in(&registry, "mem://bucket/missing.txt").unwrap();
        assert!(blob.mv("elsewhere.txt").unwrap_err().is_not_found());
        assert_eq!(blob.path(), "missing.txt");
    }

    #[test]
    fn scoped_create_and_open() {
        let blob = Blob::from_bucket(Box::new(MapBucket::default()), "/x/y.txt");
        blob.create_with(CreateOptions::new(), |w| w.write(b"abc"))
            .unwrap();

        let mut data = String::new();
        std::io::Read::read_to_string(&mut blob.open().unwrap(), &mut data).unwrap();
        assert_eq!(data, "abc");

        let mut writer = blob.create(CreateOptions::new()).unwrap();
        writer.write(b"replaced").unwrap();
        assert_eq!(blob.read().unwrap(), b"abc");
        writer.commit().unwrap();
        assert_eq!(blob.read().unwrap(), b"replaced");
    }

    #[test]
    fn unresolvable_scheme() {
        let registry = Registry::new();
        assert!(matches!(
            Blob::resolve_in(&registry, "nope://bucket/file.txt"),
            Err(Error::UnresolvableScheme { .. })
        ));
    }

    #[test]
    fn open_with_uses_global_registry() {
        let shared = MapBucket::default();
        let inner = shared.clone();
        registry::register(&["blob-test"], move |_: &Url, _: &Options| -> Result<BucketBox> {
            Ok(Box::new(inner.clone()))
        })
        .unwrap();

        let path = Blob::open_with("blob-test://b/dir/file.txt", |blob| {
            blob.write(b"hello", CreateOptions::new())?;
            Ok::<_, Error>(blob.path().to_string())
        })
        .unwrap();
        assert_eq!(path, "dir/file.txt");
        assert_eq!(shared.read("dir/file.txt").unwrap(), b"hello");

        registry::unregister(&["blob-test"]).unwrap();
    }
}
