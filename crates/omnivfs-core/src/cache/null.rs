//! Cache that never caches.

use std::sync::Arc;

use omnivfs_types::FileName;

use super::{CachePolicy, FilesCache};
use crate::fs::FileSystem;
use crate::object::FileObject;

/// Always misses, so every resolution yields a fresh object.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullFilesCache;

impl FilesCache for NullFilesCache {
    fn get(&self, _fs: &FileSystem, _name: &FileName) -> Option<Arc<FileObject>> {
        None
    }

    fn put(&self, _file: Arc<FileObject>) {}

    fn put_if_absent(&self, _file: Arc<FileObject>) -> bool {
        false
    }

    fn remove(&self, _fs: &FileSystem, _name: &FileName) {}

    fn clear(&self, _fs: &FileSystem) {}

    fn close(&self) {}

    fn policy(&self) -> CachePolicy {
        CachePolicy::None
    }
}
