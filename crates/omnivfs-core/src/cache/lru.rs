//! Bounded least-recently-used cache.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use omnivfs_types::FileName;
use parking_lot::Mutex;

use super::{CachePolicy, FilesCache};
use crate::fs::FileSystem;
use crate::object::FileObject;

struct LruEntry {
    file: Arc<FileObject>,
    /// Tick of the last get or put, for LRU eviction.
    last_use: u64,
}

type FsEntries = HashMap<FileName, LruEntry>;

/// Holds at most `capacity` objects per file system.
///
/// When full, the least recently used entry that is neither attached nor
/// holding open content is evicted and force-closed. If every entry is
/// pinned the file system's map grows past capacity until pressure drops.
pub struct LruFilesCache {
    capacity: usize,
    tick: AtomicU64,
    file_systems: Mutex<HashMap<u64, FsEntries>>,
}

impl LruFilesCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            tick: AtomicU64::new(0),
            file_systems: Mutex::new(HashMap::new()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of entries held for `fs`.
    pub fn len(&self, fs: &FileSystem) -> usize {
        self.file_systems
            .lock()
            .get(&fs.id())
            .map_or(0, HashMap::len)
    }

    fn next_tick(&self) -> u64 {
        self.tick.fetch_add(1, Ordering::Relaxed)
    }

    fn insert(&self, file: Arc<FileObject>, only_if_absent: bool) -> bool {
        let fs_id = file.file_system().id();
        let name = file.name().clone();
        let tick = self.next_tick();

        let evicted = {
            let mut file_systems = self.file_systems.lock();
            let entries = file_systems.entry(fs_id).or_default();
            if only_if_absent && entries.contains_key(&name) {
                return false;
            }
            entries.insert(name.clone(), LruEntry { file, last_use: tick });
            self.evict_if_needed(entries, &name)
        };

        // Close outside the lock.
        for file in evicted {
            tracing::debug!(file = %file.name(), "evicting file object from LRU cache");
            file.close();
        }
        true
    }

    /// Evict unpinned entries, oldest first, until back under capacity.
    fn evict_if_needed(&self, entries: &mut FsEntries, keep: &FileName) -> Vec<Arc<FileObject>> {
        let mut evicted = Vec::new();
        while entries.len() > self.capacity {
            let victim = entries
                .iter()
                .filter(|(name, entry)| *name != keep && !is_pinned(&entry.file))
                .min_by_key(|(_, entry)| entry.last_use)
                .map(|(name, _)| name.clone());

            match victim.and_then(|name| entries.remove(&name)) {
                Some(entry) => evicted.push(entry.file),
                None => break,
            }
        }
        evicted
    }
}

fn is_pinned(file: &FileObject) -> bool {
    file.is_attached() || file.is_content_open()
}

impl FilesCache for LruFilesCache {
    fn get(&self, fs: &FileSystem, name: &FileName) -> Option<Arc<FileObject>> {
        let tick = self.next_tick();
        let mut file_systems = self.file_systems.lock();
        let entry = file_systems.get_mut(&fs.id())?.get_mut(name)?;
        entry.last_use = tick;
        Some(entry.file.clone())
    }

    fn put(&self, file: Arc<FileObject>) {
        self.insert(file, false);
    }

    fn put_if_absent(&self, file: Arc<FileObject>) -> bool {
        self.insert(file, true)
    }

    fn remove(&self, fs: &FileSystem, name: &FileName) {
        let mut file_systems = self.file_systems.lock();
        if let Some(entries) = file_systems.get_mut(&fs.id()) {
            entries.remove(name);
            if entries.is_empty() {
                file_systems.remove(&fs.id());
            }
        }
    }

    fn clear(&self, fs: &FileSystem) {
        self.file_systems.lock().remove(&fs.id());
    }

    fn close(&self) {
        self.file_systems.lock().clear();
    }

    fn policy(&self) -> CachePolicy {
        CachePolicy::Lru
    }
}
