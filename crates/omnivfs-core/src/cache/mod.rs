//! File object identity caches.
//!
//! A [`FilesCache`] maps `(file system, name)` to the live [`FileObject`]
//! for that name. Four policies are provided:
//!
//! - [`UnboundedFilesCache`] - entries live until removed or cleared
//! - [`LruFilesCache`] - bounded per file system, evicts least recently used
//! - [`WeakFilesCache`] - holds only weak references
//! - [`NullFilesCache`] - never caches anything
//!
//! Cache operations never perform I/O and never fail.

mod lru;
mod null;
mod unbounded;
mod weak;

use std::sync::Arc;

use omnivfs_types::FileName;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

pub use lru::LruFilesCache;
pub use null::NullFilesCache;
pub use unbounded::UnboundedFilesCache;
pub use weak::WeakFilesCache;

use crate::fs::FileSystem;
use crate::object::FileObject;

/// Default LRU capacity per file system.
pub const DEFAULT_LRU_CAPACITY: usize = 100;

/// Identity map between names and live file objects.
pub trait FilesCache: Send + Sync {
    /// The cached object for `name` in `fs`, if any.
    fn get(&self, fs: &FileSystem, name: &FileName) -> Option<Arc<FileObject>>;

    /// Store `file`, replacing any previous entry for its name.
    fn put(&self, file: Arc<FileObject>);

    /// Store `file` only if no live entry exists for its name.
    ///
    /// Returns false, leaving the existing entry untouched, otherwise.
    fn put_if_absent(&self, file: Arc<FileObject>) -> bool;

    fn remove(&self, fs: &FileSystem, name: &FileName);

    /// Drop every entry of `fs`. Clearing an empty or unknown file system is a no-op.
    fn clear(&self, fs: &FileSystem);

    /// Drop everything.
    fn close(&self);

    fn policy(&self) -> CachePolicy;
}

/// Which [`FilesCache`] implementation to use.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum CachePolicy {
    #[default]
    Unbounded,
    Lru,
    Weak,
    None,
}

impl CachePolicy {
    /// Build a cache for this policy. `capacity` only applies to [`CachePolicy::Lru`].
    pub fn build(self, capacity: usize) -> Arc<dyn FilesCache> {
        match self {
            Self::Unbounded => Arc::new(UnboundedFilesCache::new()),
            Self::Lru => Arc::new(LruFilesCache::new(capacity)),
            Self::Weak => Arc::new(WeakFilesCache::new()),
            Self::None => Arc::new(NullFilesCache),
        }
    }
}

/// When a cached object re-queries its backend.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum CacheStrategy {
    /// Refresh on every cache hit during resolution.
    #[default]
    OnResolve,
    /// Refresh before every type-dependent call.
    OnCall,
    /// Only refresh when asked to.
    Manual,
}

/// Cache key: file system id plus name.
pub(crate) type CacheKey = (u64, FileName);

pub(crate) fn key_of(file: &FileObject) -> CacheKey {
    (file.file_system().id(), file.name().clone())
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use omnivfs_types::{CapabilitySet, NameParser, PathNameParser};

    use super::{CacheStrategy, FilesCache};
    use crate::backends::MemoryOps;
    use crate::fs::FileSystem;
    use crate::object::FileObject;
    use crate::provider::ProviderContext;

    /// A memory file system wired to `cache`, with manual refresh.
    pub fn memory_fs(cache: Arc<dyn FilesCache>) -> Arc<FileSystem> {
        let root = PathNameParser::new().parse("ram:///").unwrap();
        let ctx = ProviderContext {
            files_cache: cache,
            strategy: CacheStrategy::Manual,
        };
        Arc::new(FileSystem::new(
            root,
            Arc::new(MemoryOps::new()),
            CapabilitySet::all(),
            &ctx,
        ))
    }

    pub fn object(fs: &Arc<FileSystem>, path: &str) -> Arc<FileObject> {
        let name = PathNameParser::new()
            .parse(&format!("ram://{path}"))
            .unwrap();
        Arc::new(FileObject::new(name, fs.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{memory_fs, object};
    use super::*;

    #[test]
    fn test_clear_is_idempotent_for_every_policy() {
        for policy in [
            CachePolicy::Unbounded,
            CachePolicy::Lru,
            CachePolicy::Weak,
            CachePolicy::None,
        ] {
            let cache = policy.build(4);
            let fs = memory_fs(cache.clone());
            let file = object(&fs, "/a");
            cache.put(file.clone());

            cache.clear(&fs);
            cache.clear(&fs);
            assert!(cache.get(&fs, file.name()).is_none(), "{policy}");

            let other = memory_fs(cache.clone());
            cache.clear(&other);
            cache.close();
            cache.close();
        }
    }

    #[test]
    fn test_put_if_absent_keeps_existing() {
        for policy in [CachePolicy::Unbounded, CachePolicy::Lru, CachePolicy::Weak] {
            let cache = policy.build(4);
            let fs = memory_fs(cache.clone());
            let first = object(&fs, "/a");
            let second = object(&fs, "/a");

            assert!(cache.put_if_absent(first.clone()), "{policy}");
            assert!(!cache.put_if_absent(second.clone()), "{policy}");
            let cached = cache.get(&fs, first.name()).unwrap();
            assert!(Arc::ptr_eq(&cached, &first), "{policy}");
        }
    }

    #[test]
    fn test_entries_are_scoped_per_file_system() {
        let cache = CachePolicy::Unbounded.build(0);
        let fs_a = memory_fs(cache.clone());
        let fs_b = memory_fs(cache.clone());
        let file = object(&fs_a, "/same");
        cache.put(file.clone());

        assert!(cache.get(&fs_a, file.name()).is_some());
        assert!(cache.get(&fs_b, file.name()).is_none());

        cache.clear(&fs_b);
        assert!(cache.get(&fs_a, file.name()).is_some());
    }

    #[test]
    fn test_policy_names() {
        assert_eq!("lru".parse::<CachePolicy>().unwrap(), CachePolicy::Lru);
        assert_eq!(CacheStrategy::OnResolve.to_string(), "on-resolve");
        assert_eq!(CachePolicy::Weak.build(1).policy(), CachePolicy::Weak);
    }
}
