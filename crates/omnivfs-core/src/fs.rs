//! A rooted file system: the factory and identity scope for file objects.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use omnivfs_types::{Capability, CapabilitySet, FileName};

use crate::cache::{CacheStrategy, FilesCache};
use crate::error::{VfsError, VfsResult};
use crate::junction::{Delegate, JunctionTable};
use crate::listener::{ChangeKind, FileChangeEvent, FileListener};
use crate::object::FileObject;
use crate::ops::FileOps;
use crate::options::FileSystemOptions;
use crate::provider::ProviderContext;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// One rooted authority: a host and credentials pair, one local tree, one
/// in-memory store, or a virtual namespace of junctions.
///
/// Owns the backend [`FileOps`], the declared capabilities and the listener
/// registry. File objects are obtained through [`FileSystem::resolve_file`],
/// which goes through the shared [`FilesCache`].
pub struct FileSystem {
    id: u64,
    root: FileName,
    options: FileSystemOptions,
    capabilities: CapabilitySet,
    parent_layer: Option<Arc<FileObject>>,
    ops: Arc<dyn FileOps>,
    files_cache: Arc<dyn FilesCache>,
    default_strategy: CacheStrategy,
    strategy: CacheStrategy,
    listeners: DashMap<FileName, Vec<Arc<dyn FileListener>>>,
    junctions: Option<Arc<JunctionTable>>,
    delegates: DashMap<FileName, Delegate>,
    closed: AtomicBool,
}

impl FileSystem {
    pub fn new(
        root: FileName,
        ops: Arc<dyn FileOps>,
        capabilities: CapabilitySet,
        ctx: &ProviderContext,
    ) -> Self {
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            root: root.root(),
            options: FileSystemOptions::new(),
            capabilities,
            parent_layer: None,
            ops,
            files_cache: ctx.files_cache.clone(),
            default_strategy: ctx.strategy,
            strategy: ctx.strategy,
            listeners: DashMap::new(),
            junctions: None,
            delegates: DashMap::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Attach the options this file system was created with.
    ///
    /// A `cache-strategy` option overrides the manager-wide strategy.
    pub fn with_options(mut self, options: FileSystemOptions) -> Self {
        self.strategy = options.cache_strategy().unwrap_or(self.default_strategy);
        self.options = options;
        self
    }

    /// Layer this file system on top of a file in another one.
    pub fn with_parent_layer(mut self, file: Arc<FileObject>) -> Self {
        self.parent_layer = Some(file);
        self
    }

    pub(crate) fn with_junctions(mut self, junctions: Arc<JunctionTable>) -> Self {
        self.junctions = Some(junctions);
        self
    }

    /// Process-unique id, used to scope cache entries.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn root_name(&self) -> &FileName {
        &self.root
    }

    pub fn options(&self) -> &FileSystemOptions {
        &self.options
    }

    pub fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    pub fn has_capability(&self, capability: Capability) -> bool {
        self.capabilities.contains(capability)
    }

    /// The file this file system is layered on, if any.
    pub fn parent_layer(&self) -> Option<&Arc<FileObject>> {
        self.parent_layer.as_ref()
    }

    pub fn ops(&self) -> &Arc<dyn FileOps> {
        &self.ops
    }

    pub fn files_cache(&self) -> &Arc<dyn FilesCache> {
        &self.files_cache
    }

    pub fn strategy(&self) -> CacheStrategy {
        self.strategy
    }

    /// True for junction-hosting file systems.
    pub fn is_virtual(&self) -> bool {
        self.junctions.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(crate) fn ensure_open(&self) -> VfsResult<()> {
        if self.is_closed() {
            return Err(VfsError::FileSystemClosed(self.root.friendly_uri()));
        }
        Ok(())
    }

    /// The one live object for `name`, creating and caching it on a miss.
    ///
    /// Under [`CacheStrategy::OnResolve`] a cache hit is refreshed before it
    /// is returned.
    pub fn resolve_file(self: &Arc<Self>, name: &FileName) -> VfsResult<Arc<FileObject>> {
        self.ensure_open()?;
        if !name.same_root(&self.root) {
            return Err(VfsError::NotInFileSystem {
                name: name.friendly_uri(),
                root: self.root.friendly_uri(),
            });
        }

        if self.is_virtual() {
            self.delegate(name);
        }

        if let Some(file) = self.files_cache.get(self, name) {
            if self.strategy == CacheStrategy::OnResolve {
                file.refresh();
            }
            return Ok(file);
        }

        let file = Arc::new(FileObject::new(name.clone(), self.clone()));
        if self.files_cache.put_if_absent(file.clone()) {
            return Ok(file);
        }
        // Lost a race, or the cache keeps nothing.
        Ok(self.files_cache.get(self, name).unwrap_or(file))
    }

    /// Resolve a path relative to the root of this file system.
    pub fn resolve_path(self: &Arc<Self>, path: &str) -> VfsResult<Arc<FileObject>> {
        let name = self
            .root
            .resolve(path, omnivfs_types::NameScope::FileSystem)?;
        self.resolve_file(&name)
    }

    pub fn root_file(self: &Arc<Self>) -> VfsResult<Arc<FileObject>> {
        let root = self.root.clone();
        self.resolve_file(&root)
    }

    pub fn add_listener(&self, name: &FileName, listener: Arc<dyn FileListener>) {
        self.listeners.entry(name.clone()).or_default().push(listener);
    }

    /// Remove one registration of `listener` from `name`.
    pub fn remove_listener(&self, name: &FileName, listener: &Arc<dyn FileListener>) {
        let emptied = match self.listeners.get_mut(name) {
            Some(mut registered) => {
                if let Some(pos) = registered
                    .iter()
                    .position(|l| std::ptr::addr_eq(Arc::as_ptr(l), Arc::as_ptr(listener)))
                {
                    registered.remove(pos);
                }
                registered.is_empty()
            }
            None => false,
        };
        if emptied {
            self.listeners.remove_if(name, |_, registered| registered.is_empty());
        }
    }

    /// True if `listener` itself is registered on `name`.
    pub fn has_listener(&self, name: &FileName, listener: &Arc<dyn FileListener>) -> bool {
        self.listeners.get(name).is_some_and(|registered| {
            registered
                .iter()
                .any(|l| std::ptr::addr_eq(Arc::as_ptr(l), Arc::as_ptr(listener)))
        })
    }

    /// Number of listeners registered on `name`.
    pub fn listener_count(&self, name: &FileName) -> usize {
        self.listeners.get(name).map_or(0, |l| l.len())
    }

    pub fn fire_file_created(&self, name: &FileName) {
        self.fire(ChangeKind::Created, name);
    }

    pub fn fire_file_changed(&self, name: &FileName) {
        self.fire(ChangeKind::Changed, name);
    }

    pub fn fire_file_deleted(&self, name: &FileName) {
        self.fire(ChangeKind::Deleted, name);
    }

    pub(crate) fn fire(&self, kind: ChangeKind, name: &FileName) {
        // Snapshot so listeners may (un)register while being notified.
        let Some(listeners) = self.listeners.get(name).map(|l| l.clone()) else {
            return;
        };
        let event = FileChangeEvent::new(kind, name.clone());
        for listener in listeners {
            listener.notify(&event);
        }
    }

    /// Graft `target` into this virtual file system at `mount_point`.
    pub fn add_junction(&self, mount_point: &FileName, target: Arc<FileObject>) -> VfsResult<()> {
        let junctions = self.junction_table(mount_point)?;
        junctions.add(mount_point, target)?;
        tracing::debug!(mount_point = %mount_point, "added junction");
        self.refresh_lineage(mount_point);
        Ok(())
    }

    /// Returns false if nothing was mounted at `mount_point`.
    pub fn remove_junction(&self, mount_point: &FileName) -> VfsResult<bool> {
        let junctions = self.junction_table(mount_point)?;
        let removed = junctions.remove(mount_point);
        if removed {
            tracing::debug!(mount_point = %mount_point, "removed junction");
            self.delegates.retain(|name, delegate| {
                let inside = name == mount_point || mount_point.is_ancestor_of(name);
                if inside {
                    delegate.detach();
                }
                !inside
            });
            self.refresh_lineage(mount_point);
        }
        Ok(removed)
    }

    pub fn junctions(&self) -> Option<&Arc<JunctionTable>> {
        self.junctions.as_ref()
    }

    fn junction_table(&self, name: &FileName) -> VfsResult<&Arc<JunctionTable>> {
        self.junctions
            .as_ref()
            .ok_or_else(|| VfsError::capability_missing(Capability::Junctions, name))
    }

    /// The junction link for `name`, attaching one if `name` is routed into a
    /// mounted tree and is not linked to that target yet.
    pub(crate) fn delegate(self: &Arc<Self>, name: &FileName) -> Option<Delegate> {
        let routed = self.junctions.as_ref()?.route(name).ok().flatten()?;
        match self.delegates.entry(name.clone()) {
            Entry::Occupied(entry) if entry.get().targets(&routed) => Some(entry.get().clone()),
            Entry::Occupied(mut entry) => {
                let delegate = Delegate::new(self, name, routed);
                delegate.attach();
                entry.insert(delegate.clone()).detach();
                Some(delegate)
            }
            Entry::Vacant(entry) => {
                let delegate = Delegate::new(self, name, routed);
                delegate.attach();
                entry.insert(delegate.clone());
                Some(delegate)
            }
        }
    }

    /// Refresh the cached objects of `name` and each of its ancestors.
    fn refresh_lineage(&self, name: &FileName) {
        let mut current = Some(name.clone());
        while let Some(name) = current {
            if let Some(file) = self.files_cache.get(self, &name) {
                file.refresh();
            }
            current = name.parent();
        }
    }

    /// Drop cached objects and listeners. Further resolution fails.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.files_cache.clear(self);
        for entry in self.delegates.iter() {
            entry.value().detach();
        }
        self.delegates.clear();
        self.listeners.clear();
        tracing::debug!(root = %self.root, "closed file system");
    }
}

impl std::fmt::Debug for FileSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSystem")
            .field("id", &self.id)
            .field("root", &self.root)
            .field("strategy", &self.strategy)
            .field("virtual", &self.is_virtual())
            .finish()
    }
}
