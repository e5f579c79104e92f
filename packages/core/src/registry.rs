//! Scheme registry and URL resolver.
//!
//! A [`Registry`] maps URL schemes to [`BucketFactory`] implementations.
//! Resolution looks up the factory for the URL's scheme, hands it the parsed
//! URL and its query [`Options`], and scopes the resulting bucket to the
//! `prefix` option when one is given.
//!
//! ```rust
//! use bucketfs_core::{BucketBox, Options, Registry, Result};
//! use url::Url;
//!
//! let registry = Registry::new();
//! registry.register(&["never"], |url: &Url, _: &Options| -> Result<BucketBox> {
//!     Err(bucketfs_core::Error::NotSupported { operation: url.to_string() })
//! })?;
//!
//! assert!(registry.is_registered("never"));
//! assert!(registry.resolve("unknown://host").is_err());
//! # Ok::<(), bucketfs_core::Error>(())
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use lazy_static::lazy_static;
use url::Url;

use crate::{with_prefix, Bucket, BucketBox, Error, Options, Result};

/// Builds buckets for one or more URL schemes.
pub trait BucketFactory: Send + Sync {
    fn create(&self, url: &Url, options: &Options) -> Result<BucketBox>;

    /// Whether [`Registry::resolve_with`] should close the bucket after the
    /// scoped body returns. Factories handing out shared connections opt out.
    fn close_after_scope(&self) -> bool {
        true
    }
}

impl<F> BucketFactory for F
where
    F: Fn(&Url, &Options) -> Result<BucketBox> + Send + Sync,
{
    fn create(&self, url: &Url, options: &Options) -> Result<BucketBox> {
        self(url, options)
    }
}

type FactoryRef = Arc<dyn BucketFactory>;

#[derive(Default)]
pub struct Registry {
    factories: RwLock<HashMap<String, FactoryRef>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `factory` for every scheme in `schemes`.
    ///
    /// Either all schemes are registered or, if any of them is taken, none
    /// are and `DuplicateScheme` is returned.
    pub fn register<F>(&self, schemes: &[&str], factory: F) -> Result<()>
    where
        F: BucketFactory + 'static,
    {
        let factory: FactoryRef = Arc::new(factory);
        let schemes: Vec<String> = schemes.iter().map(|s| s.to_ascii_lowercase()).collect();

        let mut factories = self.factories.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(taken) = schemes.iter().find(|s| factories.contains_key(*s)) {
            return Err(Error::DuplicateScheme {
                scheme: taken.clone(),
            });
        }
        for scheme in schemes {
            log::debug!("Registering bucket scheme {}", scheme);
            factories.insert(scheme, factory.clone());
        }
        Ok(())
    }

    /// Remove the factories for `schemes`. Fails with `UnknownScheme`, leaving
    /// the registry untouched, if any of them is not registered.
    pub fn unregister(&self, schemes: &[&str]) -> Result<()> {
        let schemes: Vec<String> = schemes.iter().map(|s| s.to_ascii_lowercase()).collect();

        let mut factories = self.factories.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(missing) = schemes.iter().find(|s| !factories.contains_key(*s)) {
            return Err(Error::UnknownScheme {
                scheme: missing.clone(),
            });
        }
        for scheme in schemes {
            log::debug!("Unregistering bucket scheme {}", scheme);
            factories.remove(&scheme);
        }
        Ok(())
    }

    pub fn is_registered(&self, scheme: &str) -> bool {
        self.factories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&scheme.to_ascii_lowercase())
    }

    /// Registered schemes, sorted.
    pub fn schemes(&self) -> Vec<String> {
        let mut schemes: Vec<String> = self
            .factories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        schemes.sort();
        schemes
    }

    fn factory(&self, scheme: &str) -> Result<FactoryRef> {
        self.factories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(scheme)
            .cloned()
            .ok_or_else(|| Error::UnresolvableScheme {
                scheme: scheme.to_string(),
            })
    }

    /// Parse `url` and build a fresh bucket for it.
    pub fn resolve(&self, url: &str) -> Result<BucketBox> {
        self.resolve_url(&Url::parse(url)?)
    }

    /// Build a fresh bucket for an already parsed URL.
    pub fn resolve_url(&self, url: &Url) -> Result<BucketBox> {
        let factory = self.factory(url.scheme())?;
        let options = Options::from_url(url);
        log::trace!("Resolving {}://{}{}", url.scheme(), url.host_str().unwrap_or_default(), url.path());
        let bucket = factory.create(url, &options)?;
        Ok(with_prefix(bucket, options.prefix().as_deref()))
    }

    /// Resolve `url` and run `body` against the bucket.
    ///
    /// Unless the factory opts out, the bucket is closed once `body` returns,
    /// whether it succeeded or not. A close failure after a failed body is
    /// logged and the body's error is returned.
    pub fn resolve_with<T, E, F>(&self, url: &str, body: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&dyn Bucket) -> std::result::Result<T, E>,
        E: From<Error>,
    {
        let url = Url::parse(url).map_err(Error::from)?;
        let factory = self.factory(url.scheme())?;
        let mut bucket = self.resolve_url(&url)?;

        let result = body(bucket.as_ref());
        if !factory.close_after_scope() {
            return result;
        }
        match (result, bucket.close()) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(close_err)) => Err(close_err.into()),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(close_err)) => {
                log::warn!("Failed to close bucket for {}: {}", url.scheme(), close_err);
                Err(err)
            }
        }
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("schemes", &self.schemes())
            .finish()
    }
}

lazy_static! {
    static ref GLOBAL: Registry = Registry::new();
}

/// The process-wide registry used by the free functions and [`crate::Blob::new`].
pub fn global() -> &'static Registry {
    &GLOBAL
}

/// Register a factory in the global registry.
pub fn register<F>(schemes: &[&str], factory: F) -> Result<()>
where
    F: BucketFactory + 'static,
{
    global().register(schemes, factory)
}

pub fn unregister(schemes: &[&str]) -> Result<()> {
    global().unregister(schemes)
}

/// Resolve a URL against the global registry.
pub fn resolve(url: &str) -> Result<BucketBox> {
    global().resolve(url)
}

pub fn resolve_with<T, E, F>(url: &str, body: F) -> std::result::Result<T, E>
where
    F: FnOnce(&dyn Bucket) -> std::result::Result<T, E>,
    E: From<Error>,
{
    global().resolve_with(url, body)
}
