//! Backend primitives.
//!
//! A [`FileOps`] implementation is the only thing a backend has to write.
//! The core owns the object lifecycle, type caching, capability checks and
//! events; backends only answer name-keyed primitive calls.

use std::collections::BTreeMap;
use std::time::SystemTime;

use async_trait::async_trait;
use omnivfs_types::{Capability, FileName, FileType};

use crate::error::{BackendError, BackendResult};

/// Name-keyed primitive operations of one file system.
///
/// Names passed in always belong to the file system the ops were created
/// for; implementations key on [`FileName::path`].
#[async_trait]
pub trait FileOps: Send + Sync {
    /// Type of the file, [`FileType::Imaginary`] if it does not exist.
    async fn get_type(&self, name: &FileName) -> BackendResult<FileType>;

    /// Base names of the direct children of a folder.
    async fn list_children(&self, name: &FileName) -> BackendResult<Vec<String>>;

    /// Read up to `size` bytes starting at `offset`.
    async fn read(&self, name: &FileName, offset: u64, size: usize) -> BackendResult<Vec<u8>>;

    /// Write `data` at `offset` into an existing file, extending it as needed.
    async fn write(&self, name: &FileName, offset: u64, data: &[u8]) -> BackendResult<()>;

    /// Set the length of a file, creating it empty if it does not exist.
    async fn truncate(&self, name: &FileName, size: u64) -> BackendResult<()>;

    /// Length of a file in bytes.
    async fn content_size(&self, name: &FileName) -> BackendResult<u64>;

    /// Create a folder whose parent already exists.
    async fn create_folder(&self, name: &FileName) -> BackendResult<()>;

    /// Delete a file or an empty folder.
    async fn delete(&self, name: &FileName) -> BackendResult<()>;

    /// Move a file or folder within this file system.
    async fn rename(&self, from: &FileName, to: &FileName) -> BackendResult<()>;

    async fn last_modified(&self, name: &FileName) -> BackendResult<SystemTime>;

    async fn set_last_modified(&self, name: &FileName, time: SystemTime) -> BackendResult<()> {
        let _ = (name, time);
        Err(BackendError::Unsupported(Capability::SetLastModifiedFile))
    }

    async fn is_readable(&self, name: &FileName) -> BackendResult<bool> {
        let _ = name;
        Ok(true)
    }

    /// Whether an existing file may be written, or a folder written into.
    async fn is_writeable(&self, name: &FileName) -> BackendResult<bool> {
        let _ = name;
        Ok(true)
    }

    async fn is_hidden(&self, name: &FileName) -> BackendResult<bool> {
        let _ = name;
        Ok(false)
    }

    async fn attributes(&self, name: &FileName) -> BackendResult<BTreeMap<String, String>> {
        let _ = name;
        Ok(BTreeMap::new())
    }

    async fn set_attribute(&self, name: &FileName, key: &str, value: &str) -> BackendResult<()> {
        let _ = (name, key, value);
        Err(BackendError::Unsupported(Capability::Attributes))
    }
}
