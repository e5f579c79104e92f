//! Core bucketfs: one contract for every blob store
//!
//! A bucket is a flat namespace of objects addressed by `/`-separated paths.
//! This crate holds everything that is independent of where the bytes live:
//! - `Bucket`: the store contract (`ls`, `glob`, `info`, `create`, `open`,
//!   `rm`, `cp`, `mv`, `close`)
//! - `Writer`: staged writes that become visible only on commit
//! - `Registry`: URL scheme to bucket factory mapping, and the resolver
//! - `Blob`: a handle to one object addressed by URL
//!
//! Backends live in their own crates and plug in through
//! [`Registry::register`].
//!
//! # Example
//!
//! ```rust
//! use bucketfs_core::{Bucket, CreateOptions, Result};
//!
//! fn publish(bucket: &dyn Bucket, report: &[u8]) -> Result<()> {
//!     bucket.write("reports/latest.csv", report, CreateOptions::new().content_type("text/csv"))
//! }
//! ```

pub use url::Url;

mod blob;
mod bucket;
mod config;
mod error;
pub mod glob;
mod info;
mod path;
mod prefixed;
pub mod registry;
mod writer;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_suite;

pub use blob::Blob;
pub use bucket::{Bucket, BucketBox, BucketExt, CreateOptions, Infos, ObjectReader, Paths};
pub use config::{Options, DEFAULT_PERM};
pub use error::{Error, Result};
pub use glob::{Pattern, DEFAULT_PATTERN};
pub use info::{norm_meta, norm_meta_key, FileInfo, Metadata};
pub use path::{ensure_contained, join, norm_mode, norm_path, parse_mode, strip};
pub use prefixed::{with_prefix, PrefixedBucket};
pub use registry::{BucketFactory, Registry};
pub use writer::{CommitFn, Writer};
