//! Staged, all-or-nothing object creation.
//!
//! A [`Writer`] collects bytes in a private temp file and only hands it to the
//! bucket's publish callback on [`Writer::commit`]. Nothing is ever visible
//! under the destination path before that, so a failed or abandoned write
//! leaves the bucket untouched.
//!
//! ```rust
//! use bucketfs_core::Writer;
//!
//! let mut writer = Writer::new("greeting.txt", 0o644, |staged| {
//!     let body = std::fs::read(staged.path())?;
//!     assert_eq!(body, b"hello");
//!     Ok(())
//! })?;
//! writer.write(b"hello")?;
//! assert!(writer.commit()?);
//! assert!(!writer.commit()?);
//! # Ok::<(), bucketfs_core::Error>(())
//! ```

use std::fmt;
use std::io::{self, Write as _};
use std::path::Path;

use tempfile::NamedTempFile;

use crate::{Error, Result};

/// Publish step run exactly once on commit. It receives ownership of the
/// staged file; the file is removed when the callback drops it, unless the
/// callback persisted it somewhere.
pub type CommitFn = Box<dyn FnOnce(NamedTempFile) -> Result<()> + Send>;

const HINT_CHARS: usize = 32;

pub struct Writer {
    name: String,
    perm: u16,
    staging: Option<NamedTempFile>,
    on_commit: Option<CommitFn>,
}

impl Writer {
    /// Stage a new object in the system temp directory.
    ///
    /// `path_hint` is only used to name the temp file.
    pub fn new<F>(path_hint: &str, perm: u16, on_commit: F) -> Result<Self>
    where
        F: FnOnce(NamedTempFile) -> Result<()> + Send + 'static,
    {
        let staging = Self::builder(path_hint).tempfile()?;
        Ok(Self::with_staging(path_hint, perm, staging, Box::new(on_commit)))
    }

    /// Stage a new object inside `dir`.
    pub fn new_in<F>(dir: impl AsRef<Path>, path_hint: &str, perm: u16, on_commit: F) -> Result<Self>
    where
        F: FnOnce(NamedTempFile) -> Result<()> + Send + 'static,
    {
        let staging = Self::builder(path_hint).tempfile_in(dir)?;
        Ok(Self::with_staging(path_hint, perm, staging, Box::new(on_commit)))
    }

    /// Temp file names carry at most the first `HINT_CHARS` characters of the
    /// object's base name, so long keys stay within file name limits.
    fn builder(path_hint: &str) -> tempfile::Builder<'_, 'static> {
        let base = path_hint.rsplit('/').next().unwrap_or_default();
        let base = match base.char_indices().nth(HINT_CHARS) {
            Some((end, _)) => &base[..end],
            None => base,
        };
        let mut builder = tempfile::Builder::new();
        builder.prefix(base).suffix(".bucketfs");
        builder
    }

    fn with_staging(path_hint: &str, perm: u16, staging: NamedTempFile, on_commit: CommitFn) -> Self {
        log::trace!(
            "Staging {} at {}...",
            path_hint,
            staging.path().display()
        );
        Writer {
            name: path_hint.to_string(),
            perm: crate::path::norm_mode(perm.into()),
            staging: Some(staging),
            on_commit: Some(on_commit),
        }
    }

    /// Append bytes to the staged object.
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        let staging = self.staging.as_mut().ok_or(Error::WriterClosed)?;
        staging.write_all(data)?;
        Ok(())
    }

    /// Publish the staged object.
    ///
    /// Returns `Ok(false)` without doing anything if the writer was already
    /// committed or discarded. The staged file is released whether or not the
    /// publish callback succeeds.
    pub fn commit(&mut self) -> Result<bool> {
        let Some(mut staging) = self.staging.take() else {
            return Ok(false);
        };
        let on_commit = self.on_commit.take();

        staging.flush()?;
        set_permissions(staging.path(), self.perm)?;

        log::debug!("Committing {}...", self.name);
        match on_commit {
            Some(publish) => publish(staging)?,
            None => drop(staging),
        }
        Ok(true)
    }

    /// Drop the staged object without publishing it.
    ///
    /// Returns `true` if this call closed the writer.
    pub fn discard(&mut self) -> bool {
        self.on_commit = None;
        match self.staging.take() {
            Some(staging) => {
                log::debug!("Discarding {}...", self.name);
                drop(staging);
                true
            }
            None => false,
        }
    }

    /// Run `body` against the writer, then commit on success or discard on
    /// failure. The body's error is returned unchanged.
    pub fn perform<T, E, F>(mut self, body: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut Writer) -> std::result::Result<T, E>,
        E: From<Error>,
    {
        match body(&mut self) {
            Ok(value) => {
                self.commit()?;
                Ok(value)
            }
            Err(error) => {
                self.discard();
                Err(error)
            }
        }
    }

    /// Location of the staged data, while the writer is open.
    pub fn staging_path(&self) -> Option<&Path> {
        self.staging.as_ref().map(NamedTempFile::path)
    }

    pub fn is_closed(&self) -> bool {
        self.staging.is_none()
    }

    pub fn perm(&self) -> u16 {
        self.perm
    }
}

impl io::Write for Writer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.staging.as_mut() {
            Some(staging) => staging.write(buf),
            None => Err(Error::WriterClosed.into()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.staging.as_mut() {
            Some(staging) => staging.flush(),
            None => Ok(()),
        }
    }
}

impl Drop for Writer {
    fn drop(&mut self) {
        if self.staging.is_some() {
            log::warn!("Writer for {} dropped without commit, discarding", self.name);
            self.discard();
        }
    }
}

impl fmt::Debug for Writer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Writer")
            .field("name", &self.name)
            .field("perm", &format_args!("{:o}", self.perm))
            .field("staging", &self.staging_path())
            .finish()
    }
}

#[cfg(unix)]
fn set_permissions(path: &Path, perm: u16) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    std::fs::set_permissions(path, std::fs::Permissions::from_mode(perm.into()))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_permissions(_path: &Path, _perm: u16) -> Result<()> {
    Ok(())
}
