//! bucketfs: a uniform interface for blob storage.
//!
//! Every store is a [`Bucket`]: a flat namespace of objects that can be
//! listed, inspected, written atomically, read, copied, moved and removed.
//! Buckets are addressed by URL and built by the factory registered for the
//! URL's scheme:
//!
//! ```rust
//! use bucketfs::{Bucket, CreateOptions};
//!
//! bucketfs::init();
//! let bucket = bucketfs::resolve("mem://scratch")?;
//! bucket.write("a/b.txt", b"hello", CreateOptions::new().content_type("text/plain"))?;
//! assert_eq!(bucket.read("/a/b.txt")?, b"hello");
//! assert_eq!(bucket.info("a/b.txt")?.size(), 5);
//! # Ok::<(), bucketfs::Error>(())
//! ```
//!
//! Built-in schemes are `file` and `mem`. Other backends implement
//! [`Bucket`] and plug in through [`registry::register`].

use std::sync::Once;

pub use bucketfs_core::*;
pub use bucketfs_stores::{local_factory, memory_factory, InMemoryBucket, LocalBucket};

static INIT: Once = Once::new();

/// Register the built-in schemes in the global registry. Runs once per
/// process; later calls do nothing.
pub fn init() {
    INIT.call_once(|| {
        if let Err(e) = bucketfs_stores::register(registry::global()) {
            log::warn!("Failed to register built-in bucket schemes: {}", e);
        }
    });
}

/// Resolve `url` against the global registry, registering the built-in
/// schemes first if needed.
pub fn resolve(url: &str) -> Result<BucketBox> {
    init();
    registry::resolve(url)
}

/// Resolve `url` and run `body` against the bucket, closing it afterwards.
pub fn resolve_with<T, E, F>(url: &str, body: F) -> std::result::Result<T, E>
where
    F: FnOnce(&dyn Bucket) -> std::result::Result<T, E>,
    E: From<Error>,
{
    init();
    registry::resolve_with(url, body)
}
