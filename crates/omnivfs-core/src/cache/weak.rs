//! Weak-reference identity map.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use omnivfs_types::FileName;

use super::{CacheKey, CachePolicy, FilesCache, key_of};
use crate::fs::FileSystem;
use crate::object::FileObject;

/// Sweep dead entries every this many insertions.
const SWEEP_INTERVAL: usize = 64;

/// Holds only weak references: an entry lives exactly as long as someone
/// outside the cache still holds the object.
#[derive(Default)]
pub struct WeakFilesCache {
    files: DashMap<CacheKey, Weak<FileObject>>,
    puts: AtomicUsize,
}

impl WeakFilesCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries whose object is still alive.
    pub fn live_len(&self) -> usize {
        self.files.iter().filter(|e| e.value().strong_count() > 0).count()
    }

    fn maybe_sweep(&self) {
        if self.puts.fetch_add(1, Ordering::Relaxed) % SWEEP_INTERVAL == SWEEP_INTERVAL - 1 {
            self.files.retain(|_, weak| weak.strong_count() > 0);
        }
    }
}

impl FilesCache for WeakFilesCache {
    fn get(&self, fs: &FileSystem, name: &FileName) -> Option<Arc<FileObject>> {
        let key = (fs.id(), name.clone());
        let upgraded = self.files.get(&key).map(|weak| weak.upgrade());
        match upgraded {
            Some(Some(file)) => Some(file),
            Some(None) => {
                self.files.remove_if(&key, |_, weak| weak.strong_count() == 0);
                None
            }
            None => None,
        }
    }

    fn put(&self, file: Arc<FileObject>) {
        self.files.insert(key_of(&file), Arc::downgrade(&file));
        self.maybe_sweep();
    }

    fn put_if_absent(&self, file: Arc<FileObject>) -> bool {
        let inserted = match self.files.entry(key_of(&file)) {
            Entry::Occupied(mut slot) => {
                if slot.get().strong_count() > 0 {
                    false
                } else {
                    slot.insert(Arc::downgrade(&file));
                    true
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(Arc::downgrade(&file));
                true
            }
        };
        if inserted {
            self.maybe_sweep();
        }
        inserted
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
        CachePolicy::Weak
    }
}
