//! File metadata snapshots returned by `info` and `glob`.

use std::collections::BTreeMap;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// User metadata attached to an object, keyed by canonical header-style names.
pub type Metadata = BTreeMap<String, String>;

/// An immutable snapshot of an object's attributes.
///
/// Backends build one with [`FileInfo::new`] and the `with_*` methods; callers
/// only ever read it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    path: String,
    size: u64,
    mtime: DateTime<Utc>,
    mode: u16,
    content_type: Option<String>,
    metadata: Metadata,
}

impl FileInfo {
    /// A snapshot with every attribute at its default: size 0, mtime at the
    /// Unix epoch, mode 0, no content type, no metadata.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            size: 0,
            mtime: DateTime::<Utc>::from(SystemTime::UNIX_EPOCH),
            mode: 0,
            content_type: None,
            metadata: Metadata::new(),
        }
    }

    #[must_use]
    pub fn with_size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    #[must_use]
    pub fn with_mtime(mut self, mtime: impl Into<DateTime<Utc>>) -> Self {
        self.mtime = mtime.into();
        self
    }

    /// Set the permission bits; anything above `0o777` is discarded.
    #[must_use]
    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = crate::path::norm_mode(mode);
        self
    }

    #[must_use]
    pub fn with_content_type(mut self, content_type: Option<String>) -> Self {
        self.content_type = content_type.filter(|s| !s.is_empty());
        self
    }

    /// Attach metadata. Keys are canonicalized with [`norm_meta_key`].
    #[must_use]
    pub fn with_metadata<K, V>(mut self, metadata: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: Into<String>,
    {
        self.metadata = norm_meta(metadata);
        self
    }

    /// The same snapshot reported under a different path.
    #[must_use]
    pub(crate) fn relocated(mut self, path: String) -> Self {
        self.path = path;
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn mtime(&self) -> DateTime<Utc> {
        self.mtime
    }

    pub fn mode(&self) -> u16 {
        self.mode
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }
}

impl Default for FileInfo {
    fn default() -> Self {
        Self::new(String::new())
    }
}

/// Canonicalize a metadata key the way HTTP headers are written:
/// `"x-key"` becomes `"X-Key"`.
pub fn norm_meta_key(key: &str) -> String {
    key.trim()
        .split('-')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join("-")
}

/// Canonicalize every key of a metadata map. Values are kept as-is; later
/// duplicates (after canonicalization) win.
pub fn norm_meta<K, V>(metadata: impl IntoIterator<Item = (K, V)>) -> Metadata
where
    K: AsRef<str>,
    V: Into<String>,
{
    metadata
        .into_iter()
        .map(|(k, v)| (norm_meta_key(k.as_ref()), v.into()))
        .collect()
}
