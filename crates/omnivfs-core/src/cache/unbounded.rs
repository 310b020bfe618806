//! Unbounded identity map.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use omnivfs_types::FileName;

use super::{CacheKey, CachePolicy, FilesCache, key_of};
use crate::fs::FileSystem;
use crate::object::FileObject;

/// Keeps every object until it is removed or its file system is cleared.
#[derive(Default)]
pub struct UnboundedFilesCache {
    files: DashMap<CacheKey, Arc<FileObject>>,
}

impl UnboundedFilesCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl FilesCache for UnboundedFilesCache {
    fn get(&self, fs: &FileSystem, name: &FileName) -> Option<Arc<FileObject>> {
        self.files
            .get(&(fs.id(), name.clone()))
            .map(|entry| entry.value().clone())
    }

    fn put(&self, file: Arc<FileObject>) {
        self.files.insert(key_of(&file), file);
    }

    fn put_if_absent(&self, file: Arc<FileObject>) -> bool {
        match self.files.entry(key_of(&file)) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(file);
                true
            }
        }
    }

    fn remove(&self, fs: &FileSystem, name: &FileName) {
        self.files.remove(&(fs.id(), name.clone()));
    }

    fn clear(&self, fs: &FileSystem) {
        let id = fs.id();
        self.files.retain(|(fs_id, _), _| *fs_id != id);
    }

    fn close(&self) {
        self.files.clear();
    }

    fn policy(&self) -> CachePolicy {
        CachePolicy::Unbounded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::test_support::{memory_fs, object};

    #[test]
    fn test_concurrent_put_if_absent_has_one_winner() {
        let cache = Arc::new(UnboundedFilesCache::new());
        let fs = memory_fs(cache.clone());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                let file = object(&fs, "/contended");
                std::thread::spawn(move || cache.put_if_absent(file))
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();

        assert_eq!(winners, 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_remove() {
        let cache = UnboundedFilesCache::new();
        let fs = memory_fs(Arc::new(UnboundedFilesCache::new()));
        let file = object(&fs, "/a");
        cache.put(file.clone());
        cache.remove(&fs, file.name());
        assert!(cache.is_empty());
    }
}
