//! Bucket options carried in the URL query string.
//!
//! `prefix` and `perm` are understood by every bucket; everything else is
//! passed through untouched for the backend's factory to interpret.
//!
//! ```rust
//! use bucketfs_core::Options;
//! use url::Url;
//!
//! let url = Url::parse("mem://bucket?prefix=/a/b/&perm=0600").unwrap();
//! let options = Options::from_url(&url);
//! assert_eq!(options.prefix().as_deref(), Some("a/b"));
//! assert_eq!(options.perm().unwrap(), Some(0o600));
//! ```

use std::collections::BTreeMap;

use url::Url;

use crate::{Error, Result};

/// Default permission bits for newly created objects.
pub const DEFAULT_PERM: u16 = 0o644;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Options {
    values: BTreeMap<String, String>,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect the query parameters of `url`. Values are percent-decoded;
    /// when a key repeats, the last value wins.
    pub fn from_url(url: &Url) -> Self {
        let values = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        Options { values }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.values.insert(key.into(), value.into())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Parse a boolean option (`true/false`, `1/0`, `yes/no`, `on/off`).
    pub fn get_bool(&self, key: &str) -> Result<Option<bool>> {
        let Some(value) = self.get(key) else {
            return Ok(None);
        };
        match value.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(Some(true)),
            "false" | "0" | "no" | "off" => Ok(Some(false)),
            _ => Err(Error::InvalidOption {
                key: key.to_string(),
                message: format!("expected a boolean, got {:?}", value),
            }),
        }
    }

    /// Parse an unsigned integer option.
    pub fn get_u64(&self, key: &str) -> Result<Option<u64>> {
        self.get(key)
            .map(|value| {
                value.trim().parse::<u64>().map_err(|e| Error::InvalidOption {
                    key: key.to_string(),
                    message: e.to_string(),
                })
            })
            .transpose()
    }

    /// The normalized sub-namespace, if one was given and is not empty.
    pub fn prefix(&self) -> Option<String> {
        self.get("prefix")
            .map(crate::norm_path)
            .filter(|prefix| !prefix.is_empty())
    }

    /// Default permission bits for created objects, from an octal string.
    pub fn perm(&self) -> Result<Option<u16>> {
        self.get("perm")
            .map(|value| {
                crate::parse_mode(value).map_err(|_| Error::InvalidOption {
                    key: "perm".to_string(),
                    message: format!("expected an octal mode, got {:?}", value),
                })
            })
            .transpose()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Options {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Options {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}
