//! Binary Storage Layer Abstraction
//!
//! This module provides an abstraction over binary object backends. Every
//! object lives in its owner's namespace and is addressed by the opaque
//! [`StoragePath`] handed out when it was saved.

pub mod config;
pub mod error;
pub mod local_store;
pub mod mock_store;
pub mod path;
pub mod reaper;


use serde::{Deserialize, Serialize};
use std::io::Read;

pub use error::{IoStep, StorageError};
pub use path::StoragePath;

/// Readable stream returned by [`BlobStorage::load`]; dropping it releases the file
pub type ObjectReader = Box<dyn Read + Send>;

/// Result of a completed save
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredObject {
    pub path: StoragePath,
    pub size: u64,
}

/// Trait defining the binary storage interface
pub trait BlobStorage: Send + Sync {
    /// Stream `content` into a brand-new object owned by `owner_id`.
    ///
    /// The object becomes visible only once the whole stream has been
    /// consumed; any failure leaves nothing loadable behind.
    fn save(&self, owner_id: &str, content: &mut dyn Read) -> Result<StoredObject, StorageError>;

    /// Open a previously saved object for sequential reading
    fn load(&self, path: &StoragePath) -> Result<ObjectReader, StorageError>;

    /// Remove an object. Removing an absent object succeeds.
    fn delete(&self, path: &StoragePath) -> Result<(), StorageError>;

    /// Stop background maintenance owned by this store
    fn close(&self) {}
}
