//! The bucket contract every backend implements.

use std::io::{self, Read};

use crate::info::{norm_meta, norm_meta_key, Metadata};
use crate::{Error, FileInfo, Result, Writer};

/// A lazy listing of bucket paths.
pub type Paths<'a> = Box<dyn Iterator<Item = Result<String>> + 'a>;

/// A lazy listing of file infos.
pub type Infos<'a> = Box<dyn Iterator<Item = Result<FileInfo>> + 'a>;

/// A readable object stream.
pub type ObjectReader = Box<dyn Read + Send>;

/// A boxed bucket, as produced by the resolver.
pub type BucketBox = Box<dyn Bucket>;

/// Options for creating an object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateOptions {
    content_type: Option<String>,
    metadata: Metadata,
    perm: Option<u16>,
}

impl CreateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Add one metadata entry. The key is canonicalized (`x-key` → `X-Key`).
    #[must_use]
    pub fn meta(mut self, key: &str, value: impl Into<String>) -> Self {
        self.metadata.insert(norm_meta_key(key), value.into());
        self
    }

    /// Replace all metadata. Keys are canonicalized.
    #[must_use]
    pub fn metadata<K, V>(mut self, metadata: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: Into<String>,
    {
        self.metadata = norm_meta(metadata);
        self
    }

    /// Permission bits for the new object, overriding the bucket default.
    #[must_use]
    pub fn perm(mut self, perm: u16) -> Self {
        self.perm = Some(crate::norm_mode(perm.into()));
        self
    }

    pub fn get_content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn get_metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn get_perm(&self) -> Option<u16> {
        self.perm
    }

    /// Options that recreate an existing object's attributes.
    pub fn from_info(info: &FileInfo) -> Self {
        CreateOptions {
            content_type: info.content_type().map(str::to_string),
            metadata: info.metadata().clone(),
            perm: Some(info.mode()).filter(|mode| *mode != 0),
        }
    }
}

/// A handle bound to one storage namespace.
///
/// Paths given to a bucket are normalized with [`crate::norm_path`] before use,
/// and every path a bucket returns is in normalized form.
///
/// # Object Safety
///
/// This trait is object-safe: buckets are usually handled as [`BucketBox`].
/// The closure-taking conveniences live on [`BucketExt`].
pub trait Bucket: Send + Sync {
    /// List the files matching a glob pattern (see [`crate::glob`]).
    ///
    /// Only files are listed, never directories. Each call starts a fresh
    /// traversal; entries changed while iterating may or may not show up.
    fn ls(&self, pattern: &str) -> Result<Paths<'_>>;

    /// Like [`Bucket::ls`], but yields file infos.
    ///
    /// The default runs `info` for every listed path and skips entries that
    /// disappeared in between.
    fn glob(&self, pattern: &str) -> Result<Infos<'_>> {
        let paths = self.ls(pattern)?;
        Ok(Box::new(paths.filter_map(move |path| {
            match path.and_then(|path| self.info(&path)) {
                Err(Error::FileNotFound { .. }) => None,
                other => Some(other),
            }
        })))
    }

    /// Info for a single file. Fails with `FileNotFound` if it is absent.
    fn info(&self, path: &str) -> Result<FileInfo>;

    /// Start writing a new object. Nothing is visible at `path` until the
    /// returned writer is committed.
    fn create(&self, path: &str, options: CreateOptions) -> Result<Writer>;

    /// Open an existing object for reading. Fails with `FileNotFound`.
    fn open(&self, path: &str) -> Result<ObjectReader>;

    /// Delete an object. Deleting a missing object is not an error.
    fn rm(&self, path: &str) -> Result<()>;

    /// Copy `src` to `dst`, creating any missing parents of `dst`.
    ///
    /// The default streams `open(src)` into `create(dst)`, carrying the
    /// source's content type, metadata and mode over.
    fn cp(&self, src: &str, dst: &str) -> Result<()> {
        let info = self.info(src)?;
        let mut reader = self.open(src)?;
        self.create(dst, CreateOptions::from_info(&info))?
            .perform(|writer| {
                io::copy(&mut reader, writer)?;
                Ok(())
            })
    }

    /// Move `src` to `dst`. The default copies, then removes `src`.
    fn mv(&self, src: &str, dst: &str) -> Result<()> {
        self.cp(src, dst)?;
        self.rm(src)
    }

    /// Release the bucket's connection or session. Idempotent.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    /// Read a whole object into memory.
    fn read(&self, path: &str) -> Result<Vec<u8>> {
        let mut reader = self.open(path)?;
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Ok(data)
    }

    /// Write a whole object in one step.
    fn write(&self, path: &str, data: &[u8], options: CreateOptions) -> Result<()> {
        self.create(path, options)?.perform(|writer| writer.write(data))
    }
}

/// Scoped conveniences for any bucket.
pub trait BucketExt: Bucket {
    /// Create an object and hand its writer to `body`.
    ///
    /// The object is committed if `body` succeeds and discarded otherwise;
    /// the body's result is returned unchanged.
    fn create_with<T, E, F>(&self, path: &str, options: CreateOptions, body: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut Writer) -> std::result::Result<T, E>,
        E: From<Error>,
    {
        self.create(path, options)?.perform(body)
    }

    /// Open an object and hand its reader to `body`. The reader is closed
    /// when `body` returns.
    fn open_with<T, E, F>(&self, path: &str, body: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut dyn Read) -> std::result::Result<T, E>,
        E: From<Error>,
    {
        let mut reader = self.open(path)?;
        body(&mut reader)
    }
}

impl<B: Bucket + ?Sized> BucketExt for B {}

impl<B: Bucket + ?Sized> Bucket for Box<B> {
    fn ls(&self, pattern: &str) -> Result<Paths<'_>> {
        self.as_ref().ls(pattern)
    }

    fn glob(&self, pattern: &str) -> Result<Infos<'_>> {
        self.as_ref().glob(pattern)
    }

    fn info(&self, path: &str) -> Result<FileInfo> {
        self.as_ref().info(path)
    }

    fn create(&self, path: &str, options: CreateOptions) -> Result<Writer> {
        self.as_ref().create(path, options)
    }

    fn open(&self, path: &str) -> Result<ObjectReader> {
        self.as_ref().open(path)
    }

    fn rm(&self, path: &str) -> Result<()> {
        self.as_ref().rm(path)
    }

    fn cp(&self, src: &str, dst: &str) -> Result<()> {
        self.as_ref().cp(src, dst)
    }

    fn mv(&self, src: &str, dst: &str) -> Result<()> {
        self.as_ref().mv(src, dst)
    }

    fn close(&mut self) -> Result<()> {
        self.as_mut().close()
    }

    fn read(&self, path: &str) -> Result<Vec<u8>> {
        self.as_ref().read(path)
    }

    fn write(&self, path: &str, data: &[u8], options: CreateOptions) -> Result<()> {
        self.as_ref().write(path, data, options)
    }
}
