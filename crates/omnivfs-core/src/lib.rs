//! # omnivfs-core
//!
//! One object contract over many storage backends.
//!
//! A [`FileSystemManager`] turns URI strings into [`FileObject`]s:
//! - Each scheme is served by a [`FileProvider`], which builds one
//!   [`FileSystem`] per root and options and reuses it afterwards
//! - A [`FilesCache`] decides whether resolving the same name twice yields
//!   the same object (unbounded, LRU, weak or no caching)
//! - The `vfs:` scheme is a virtual tree assembled from junctions that
//!   graft other file systems' subtrees at mount points
//! - A [`FileMonitor`] polls watched files and turns differences into
//!   created/changed/deleted events
//!
//! Backends implement the small [`FileOps`] trait; lifecycle, type caching,
//! capability checks and events live here.

pub mod backends;
pub mod cache;
pub mod config;
pub mod content;
pub mod error;
pub mod fs;
pub mod junction;
pub mod listener;
pub mod manager;
pub mod monitor;
pub mod object;
pub mod ops;
pub mod options;
pub mod provider;
pub mod selector;
pub mod sync;

pub use backends::{LocalOps, LocalProvider, MemoryOps, MemoryProvider, MemoryStore};
pub use cache::{
    CachePolicy, CacheStrategy, FilesCache, LruFilesCache, NullFilesCache, UnboundedFilesCache,
    WeakFilesCache,
};
pub use config::{CacheConfig, MountConfig, VfsConfig};
pub use content::FileContent;
pub use error::{BackendError, BackendResult, Operation, VfsError, VfsResult};
pub use fs::FileSystem;
pub use junction::{JunctionTable, VirtualOps};
pub use listener::{ChangeKind, ChannelListener, FileChangeEvent, FileListener};
pub use manager::{FileSystemManager, VIRTUAL_SCHEME};
pub use monitor::{FileMonitor, MonitorConfig};
pub use object::{FileObject, LifecycleState};
pub use ops::FileOps;
pub use options::{FileSystemOptions, OptionValue};
pub use provider::{FileProvider, FileSystemRegistry, ProviderContext};
pub use selector::{AllFileSelector, DepthSelector, FileSelectInfo, FileSelector, FileTypeSelector};
pub use sync::{FileAccess, SynchronizedFile};

pub use omnivfs_types::{
    Capability, CapabilitySet, FileName, FileType, NameError, NameParser, NameScope,
};
