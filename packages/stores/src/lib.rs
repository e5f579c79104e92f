//! Built-in bucket backends.
//!
//! - [`LocalBucket`] (`file://`): objects are files below a root directory.
//! - [`InMemoryBucket`] (`mem://`): objects live in process memory; handy
//!   for tests and scratch space.

mod in_memory;
mod local_disk;

pub use in_memory::{memory_factory, InMemoryBucket};
pub use local_disk::{local_factory, LocalBucket};

use bucketfs_core::{Registry, Result};

/// Register the `file` and `mem` schemes with `registry`.
pub fn register(registry: &Registry) -> Result<()> {
    registry.register(&["file"], local_factory)?;
    registry.register(&["mem"], memory_factory)?;
    Ok(())
}
