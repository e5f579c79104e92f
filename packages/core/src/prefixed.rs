//! Scope a bucket to a sub-namespace.

use crate::bucket::{Infos, ObjectReader, Paths};
use crate::path::{ensure_contained, join, strip};
use crate::{Bucket, BucketBox, CreateOptions, Error, FileInfo, Result, Writer};

/// A view of another bucket under a path prefix.
///
/// Paths passed in are joined onto the prefix; paths coming out (listings,
/// infos, `FileNotFound` errors) have it stripped again, so callers never see
/// it. Entries of the inner bucket outside the prefix are invisible.
pub struct PrefixedBucket<B> {
    inner: B,
    prefix: String,
}

impl<B: Bucket> PrefixedBucket<B> {
    pub fn new(inner: B, prefix: &str) -> Self {
        Self {
            inner,
            prefix: crate::norm_path(prefix),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn inner(&self) -> &B {
        &self.inner
    }

    pub fn into_inner(self) -> B {
        self.inner
    }

    fn full(&self, path: &str) -> Result<String> {
        let path = crate::norm_path(path);
        ensure_contained(&path)?;
        Ok(join(&self.prefix, &path))
    }

    fn full_pattern(&self, pattern: &str) -> String {
        let pattern = pattern.trim_start_matches('/');
        if self.prefix.is_empty() {
            return pattern.to_string();
        }
        format!("{}/{}", crate::glob::escape(&self.prefix), pattern)
    }

    fn local<'a>(&self, full: &'a str) -> Option<&'a str> {
        strip(&self.prefix, full)
    }

    fn localize(&self, error: Error) -> Error {
        match error {
            Error::FileNotFound { path } => match self.local(&path) {
                Some(local) => Error::not_found(local),
                None => Error::FileNotFound { path },
            },
            other => other,
        }
    }
}

impl<B: Bucket> Bucket for PrefixedBucket<B> {
    fn ls(&self, pattern: &str) -> Result<Paths<'_>> {
        let paths = self
            .inner
            .ls(&self.full_pattern(pattern))
            .map_err(|e| self.localize(e))?;
        Ok(Box::new(paths.filter_map(move |path| match path {
            Ok(path) => self.local(&path).map(|p| Ok(p.to_string())),
            Err(e) => Some(Err(self.localize(e))),
        })))
    }

    fn glob(&self, pattern: &str) -> Result<Infos<'_>> {
        let infos = self
            .inner
            .glob(&self.full_pattern(pattern))
            .map_err(|e| self.localize(e))?;
        Ok(Box::new(infos.filter_map(move |info| match info {
            Ok(info) => {
                let local = self.local(info.path())?.to_string();
                Some(Ok(info.relocated(local)))
            }
            Err(e) => Some(Err(self.localize(e))),
        })))
    }

    fn info(&self, path: &str) -> Result<FileInfo> {
        let full = self.full(path)?;
        let info = self.inner.info(&full).map_err(|e| self.localize(e))?;
        let local = self.local(info.path()).unwrap_or_default().to_string();
        Ok(info.relocated(local))
    }

    fn create(&self, path: &str, options: CreateOptions) -> Result<Writer> {
        let full = self.full(path)?;
        self.inner.create(&full, options).map_err(|e| self.localize(e))
    }

    fn open(&self, path: &str) -> Result<ObjectReader> {
        let full = self.full(path)?;
        self.inner.open(&full).map_err(|e| self.localize(e))
    }

    fn rm(&self, path: &str) -> Result<()> {
        let full = self.full(path)?;
        self.inner.rm(&full).map_err(|e| self.localize(e))
    }

    fn cp(&self, src: &str, dst: &str) -> Result<()> {
        let (src, dst) = (self.full(src)?, self.full(dst)?);
        self.inner.cp(&src, &dst).map_err(|e| self.localize(e))
    }

    fn mv(&self, src: &str, dst: &str) -> Result<()> {
        let (src, dst) = (self.full(src)?, self.full(dst)?);
        self.inner.mv(&src, &dst).map_err(|e| self.localize(e))
    }

    fn close(&mut self) -> Result<()> {
        self.inner.close()
    }

    fn read(&self, path: &str) -> Result<Vec<u8>> {
        let full = self.full(path)?;
        self.inner.read(&full).map_err(|e| self.localize(e))
    }

    fn write(&self, path: &str, data: &[u8], options: CreateOptions) -> Result<()> {
        let full = self.full(path)?;
        self.inner
            .write(&full, data, options)
            .map_err(|e| self.localize(e))
    }
}

/// Wrap `bucket` in a [`PrefixedBucket`] unless `prefix` is empty or absent.
pub fn with_prefix(bucket: BucketBox, prefix: Option<&str>) -> BucketBox {
    match prefix.map(crate::norm_path) {
        Some(prefix) if !prefix.is_empty() => {
            log::trace!("Scoping bucket to prefix {}", prefix);
            Box::new(PrefixedBucket::new(bucket, &prefix))
        }
        _ => bucket,
    }
}
