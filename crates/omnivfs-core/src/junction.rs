//! Virtual file systems built from junctions.
//!
//! A junction grafts a [`FileObject`] subtree into a virtual namespace at a
//! mount point. Mount points never nest: a new one may not equal, contain,
//! or lie inside an existing one.
//!
//! [`VirtualOps`] answers the primitives of the virtual file system by
//! forwarding into the mounted target's file system. Objects resolved in
//! the virtual tree keep their virtual name and file system. Each routed
//! name also gets a [`Delegate`], which listens on the target name and
//! replays its events onto the virtual one, so changes made on either side
//! are seen on both.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Weak};
use std::time::SystemTime;

use async_trait::async_trait;
use omnivfs_types::{Capability, FileName, FileType};
use parking_lot::RwLock;

use crate::error::{BackendError, BackendResult, VfsError, VfsResult};
use crate::fs::FileSystem;
use crate::listener::{ChangeKind, FileChangeEvent, FileListener};
use crate::object::FileObject;
use crate::ops::FileOps;

/// Mount points of one virtual file system.
#[derive(Default)]
pub struct JunctionTable {
    mounts: RwLock<BTreeMap<FileName, Arc<FileObject>>>,
}

impl JunctionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mount `target` at `mount_point`. The table is unchanged on error.
    pub fn add(&self, mount_point: &FileName, target: Arc<FileObject>) -> VfsResult<()> {
        let mut mounts = self.mounts.write();
        let nested = mounts.keys().find(|existing| {
            *existing == mount_point
                || existing.is_ancestor_of(mount_point)
                || mount_point.is_ancestor_of(existing)
        });
        if let Some(existing) = nested {
            return Err(VfsError::NestedJunction {
                mount_point: mount_point.key().to_string(),
                existing: existing.key().to_string(),
            });
        }
        mounts.insert(mount_point.clone(), target);
        Ok(())
    }

    pub fn remove(&self, mount_point: &FileName) -> bool {
        self.mounts.write().remove(mount_point).is_some()
    }

    /// The junction `name` is inside of, as `(mount point, target)`.
    pub fn find(&self, name: &FileName) -> Option<(FileName, Arc<FileObject>)> {
        self.mounts
            .read()
            .iter()
            .find(|(mount, _)| *mount == name || mount.is_ancestor_of(name))
            .map(|(mount, target)| (mount.clone(), target.clone()))
    }

    /// True if some mount point lies strictly below `name`.
    pub fn has_junction_below(&self, name: &FileName) -> bool {
        self.mounts.read().keys().any(|mount| name.is_ancestor_of(mount))
    }

    /// Names of the virtual folders and mount points directly below `name`.
    pub fn child_names(&self, name: &FileName) -> Vec<String> {
        let depth = name.depth();
        let names: BTreeSet<String> = self
            .mounts
            .read()
            .keys()
            .filter(|mount| name.is_ancestor_of(mount))
            .filter_map(|mount| mount.segments().nth(depth).map(str::to_string))
            .collect();
        names.into_iter().collect()
    }

    /// Where `name` lands in the mounted tree, if it is inside a junction.
    pub(crate) fn route(&self, name: &FileName) -> BackendResult<Option<Routed>> {
        let Some((mount, target)) = self.find(name) else {
            return Ok(None);
        };
        let mut target_name = target.name().clone();
        for segment in name.segments().skip(mount.depth()) {
            target_name = target_name
                .child(segment)
                .map_err(|e| BackendError::invalid_path(e.to_string()))?;
        }
        Ok(Some(Routed {
            fs: target.file_system().clone(),
            name: target_name,
            at_mount: mount == *name,
        }))
    }

    pub fn mount_points(&self) -> Vec<FileName> {
        self.mounts.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.mounts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.mounts.read().is_empty()
    }
}

/// Where a virtual name lands once its junction is applied.
pub(crate) struct Routed {
    pub(crate) fs: Arc<FileSystem>,
    pub(crate) name: FileName,
    /// The virtual name is the mount point itself.
    pub(crate) at_mount: bool,
}

/// The link from one virtual name to the target name it is routed onto.
///
/// While attached, events fired on the target name are replayed on the
/// virtual file system under the virtual name.
#[derive(Clone)]
pub(crate) struct Delegate {
    fs: Arc<FileSystem>,
    name: FileName,
    listener: Arc<dyn FileListener>,
}

impl Delegate {
    pub(crate) fn new(virtual_fs: &Arc<FileSystem>, virtual_name: &FileName, routed: Routed) -> Self {
        Self {
            fs: routed.fs,
            name: routed.name,
            listener: Arc::new(Forwarder {
                fs: Arc::downgrade(virtual_fs),
                name: virtual_name.clone(),
            }),
        }
    }

    pub(crate) fn targets(&self, routed: &Routed) -> bool {
        Arc::ptr_eq(&self.fs, &routed.fs) && self.name == routed.name
    }

    pub(crate) fn attach(&self) {
        self.fs.add_listener(&self.name, self.listener.clone());
    }

    pub(crate) fn detach(&self) {
        self.fs.remove_listener(&self.name, &self.listener);
    }

    /// The live target object.
    pub(crate) fn target(&self) -> VfsResult<Arc<FileObject>> {
        self.fs.resolve_file(&self.name)
    }
}

/// Replays target events on a virtual file system.
struct Forwarder {
    fs: Weak<FileSystem>,
    name: FileName,
}

impl Forwarder {
    fn forward(&self, event: &FileChangeEvent) {
        let Some(fs) = self.fs.upgrade() else {
            return;
        };
        if event.kind != ChangeKind::Changed {
            if let Some(file) = fs.files_cache().get(&fs, &self.name) {
                file.refresh();
                file.invalidate_parent_listing();
            }
        }
        fs.fire(event.kind, &self.name);
    }
}

impl FileListener for Forwarder {
    fn file_created(&self, event: &FileChangeEvent) {
        self.forward(event);
    }

    fn file_changed(&self, event: &FileChangeEvent) {
        self.forward(event);
    }

    fn file_deleted(&self, event: &FileChangeEvent) {
        self.forward(event);
    }
}

/// Backend primitives of a virtual file system.
pub struct VirtualOps {
    junctions: Arc<JunctionTable>,
}

impl VirtualOps {
    pub fn new(junctions: Arc<JunctionTable>) -> Self {
        Self { junctions }
    }

    fn route(&self, name: &FileName) -> BackendResult<Option<Routed>> {
        self.junctions.route(name)
    }

    /// Route `name` and require `capability` of the target file system.
    fn route_with(&self, name: &FileName, capability: Capability) -> BackendResult<Option<Routed>> {
        match self.route(name)? {
            Some(routed) if !routed.fs.has_capability(capability) => {
                Err(BackendError::Unsupported(capability))
            }
            routed => Ok(routed),
        }
    }

    async fn target_exists(&self, routed: &Routed) -> BackendResult<bool> {
        Ok(routed.fs.ops().get_type(&routed.name).await?.exists())
    }

    /// Error for an operation on a virtual path outside every junction.
    fn outside(&self, name: &FileName, folder_error: fn(String) -> BackendError) -> BackendError {
        if name.is_root() || self.junctions.has_junction_below(name) {
            folder_error(name.path().to_string())
        } else {
            BackendError::not_found(name.path())
        }
    }
}

#[async_trait]
impl FileOps for VirtualOps {
    async fn get_type(&self, name: &FileName) -> BackendResult<FileType> {
        if let Some(routed) = self.route(name)? {
            let file_type = routed.fs.ops().get_type(&routed.name).await?;
            if routed.at_mount && file_type == FileType::Imaginary {
                return Ok(FileType::Folder);
            }
            return Ok(file_type);
        }
        if self.junctions.has_junction_below(name) {
            Ok(FileType::Folder)
        } else {
            Ok(FileType::Imaginary)
        }
    }

    async fn list_children(&self, name: &FileName) -> BackendResult<Vec<String>> {
        if let Some(routed) = self.route_with(name, Capability::ListChildren)? {
            let target_type = routed.fs.ops().get_type(&routed.name).await?;
            if routed.at_mount && target_type == FileType::Imaginary {
                return Ok(Vec::new());
            }
            return routed.fs.ops().list_children(&routed.name).await;
        }
        if self.junctions.has_junction_below(name) {
            Ok(self.junctions.child_names(name))
        } else {
            Err(BackendError::not_found(name.path()))
        }
    }

    async fn read(&self, name: &FileName, offset: u64, size: usize) -> BackendResult<Vec<u8>> {
        match self.route_with(name, Capability::ReadContent)? {
            Some(routed) => routed.fs.ops().read(&routed.name, offset, size).await,
            None => Err(self.outside(name, BackendError::IsADirectory)),
        }
    }

    async fn write(&self, name: &FileName, offset: u64, data: &[u8]) -> BackendResult<()> {
        match self.route_with(name, Capability::WriteContent)? {
            Some(routed) => routed.fs.ops().write(&routed.name, offset, data).await,
            None => Err(BackendError::permission_denied(name.path())),
        }
    }

    async fn truncate(&self, name: &FileName, size: u64) -> BackendResult<()> {
        match self.route_with(name, Capability::WriteContent)? {
            Some(routed) => routed.fs.ops().truncate(&routed.name, size).await,
            None => Err(BackendError::permission_denied(name.path())),
        }
    }

    async fn content_size(&self, name: &FileName) -> BackendResult<u64> {
        match self.route(name)? {
            Some(routed) => routed.fs.ops().content_size(&routed.name).await,
            None => Err(self.outside(name, BackendError::IsADirectory)),
        }
    }

    async fn create_folder(&self, name: &FileName) -> BackendResult<()> {
        match self.route_with(name, Capability::Create)? {
            Some(routed) => routed.fs.ops().create_folder(&routed.name).await,
            None => Err(BackendError::permission_denied(name.path())),
        }
    }

    async fn delete(&self, name: &FileName) -> BackendResult<()> {
        match self.route_with(name, Capability::Delete)? {
            Some(routed) if routed.at_mount => Err(BackendError::permission_denied(name.path())),
            Some(routed) => routed.fs.ops().delete(&routed.name).await,
            None => Err(BackendError::permission_denied(name.path())),
        }
    }

    async fn rename(&self, from: &FileName, to: &FileName) -> BackendResult<()> {
        let (Some(from), Some(to)) = (
            self.route_with(from, Capability::Rename)?,
            self.route_with(to, Capability::Rename)?,
        ) else {
            return Err(BackendError::permission_denied(from.path()));
        };
        if !Arc::ptr_eq(&from.fs, &to.fs) {
            return Err(BackendError::Unsupported(Capability::Rename));
        }
        from.fs.ops().rename(&from.name, &to.name).await
    }

    async fn last_modified(&self, name: &FileName) -> BackendResult<SystemTime> {
        match self.route_with(name, Capability::GetLastModified)? {
            Some(routed) => routed.fs.ops().last_modified(&routed.name).await,
            // Synthesized folders have no history of their own.
            None if self.junctions.has_junction_below(name) => Ok(SystemTime::UNIX_EPOCH),
            None => Err(BackendError::not_found(name.path())),
        }
    }

    async fn set_last_modified(&self, name: &FileName, time: SystemTime) -> BackendResult<()> {
        match self.route(name)? {
            Some(routed) => routed.fs.ops().set_last_modified(&routed.name, time).await,
            None => Err(BackendError::permission_denied(name.path())),
        }
    }

    async fn is_readable(&self, name: &FileName) -> BackendResult<bool> {
        let Some(routed) = self.route(name)? else {
            return Ok(true);
        };
        if routed.at_mount && !self.target_exists(&routed).await? {
            return Ok(true);
        }
        routed.fs.ops().is_readable(&routed.name).await
    }

    /// Synthesized folders are never writeable.
    async fn is_writeable(&self, name: &FileName) -> BackendResult<bool> {
        let Some(routed) = self.route(name)? else {
            return Ok(false);
        };
        if !routed.fs.has_capability(Capability::WriteContent)
            || (routed.at_mount && !self.target_exists(&routed).await?)
        {
            return Ok(false);
        }
        routed.fs.ops().is_writeable(&routed.name).await
    }

    async fn is_hidden(&self, name: &FileName) -> BackendResult<bool> {
        match self.route(name)? {
            Some(routed) if !routed.at_mount => routed.fs.ops().is_hidden(&routed.name).await,
            _ => Ok(false),
        }
    }

    async fn attributes(&self, name: &FileName) -> BackendResult<BTreeMap<String, String>> {
        match self.route_with(name, Capability::Attributes)? {
            Some(routed) => routed.fs.ops().attributes(&routed.name).await,
            None => Ok(BTreeMap::new()),
        }
    }

    async fn set_attribute(&self, name: &FileName, key: &str, value: &str) -> BackendResult<()> {
        match self.route_with(name, Capability::Attributes)? {
            Some(routed) => routed.fs.ops().set_attribute(&routed.name, key, value).await,
            None => Err(BackendError::permission_denied(name.path())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CachePolicy;
    use crate::cache::test_support::memory_fs;
    use omnivfs_types::{NameParser, PathNameParser};

    fn vfs(path: &str) -> FileName {
        PathNameParser::bare().parse(&format!("vfs:{path}")).unwrap()
    }

    #[test]
    fn test_nesting_rejected_both_ways() {
        let fs = memory_fs(CachePolicy::Unbounded.build(0));
        let target = fs.root_file().unwrap();
        let table = JunctionTable::new();

        table.add(&vfs("/a/b"), target.clone()).unwrap();
        for point in ["/a", "/a/b", "/a/b/c", "/"] {
            let err = table.add(&vfs(point), target.clone()).unwrap_err();
            assert_eq!(err.message_key(), "nested-junction", "{point}");
        }
        assert_eq!(table.len(), 1);

        table.add(&vfs("/a/c"), target).unwrap();
        assert_eq!(table.child_names(&vfs("/a")), vec!["b", "c"]);
        assert_eq!(table.child_names(&vfs("/")), vec!["a"]);
    }

    #[test]
    fn test_find_longest_mount() {
        let fs = memory_fs(CachePolicy::Unbounded.build(0));
        let table = JunctionTable::new();
        table.add(&vfs("/mnt"), fs.root_file().unwrap()).unwrap();

        let (mount, _) = table.find(&vfs("/mnt/x/y")).unwrap();
        assert_eq!(mount, vfs("/mnt"));
        assert!(table.find(&vfs("/mntx")).is_none());
        assert!(table.has_junction_below(&vfs("/")));
        assert!(!table.has_junction_below(&vfs("/mnt")));

        assert!(table.remove(&vfs("/mnt")));
        assert!(!table.remove(&vfs("/mnt")));
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_virtual_ops_route_into_target() {
        let backing = memory_fs(CachePolicy::Unbounded.build(0));
        let data = backing.resolve_path("/data").unwrap();
        data.create_folder().await.unwrap();
        let table = Arc::new(JunctionTable::new());
        table.add(&vfs("/m"), data).unwrap();
        let ops = VirtualOps::new(table);

        assert_eq!(ops.get_type(&vfs("/")).await.unwrap(), FileType::Folder);
        assert_eq!(ops.get_type(&vfs("/m")).await.unwrap(), FileType::Folder);
        assert_eq!(ops.get_type(&vfs("/m/f")).await.unwrap(), FileType::Imaginary);
        assert_eq!(ops.get_type(&vfs("/other")).await.unwrap(), FileType::Imaginary);

        ops.truncate(&vfs("/m/f"), 0).await.unwrap();
        ops.write(&vfs("/m/f"), 0, b"abc").await.unwrap();
        let backing_file = backing.resolve_path("/data/f").unwrap();
        assert!(backing_file.is_file().await.unwrap());
        assert_eq!(ops.list_children(&vfs("/")).await.unwrap(), vec!["m"]);
        assert_eq!(ops.list_children(&vfs("/m")).await.unwrap(), vec!["f"]);

        let err = ops.create_folder(&vfs("/elsewhere")).await.unwrap_err();
        assert!(matches!(err, BackendError::PermissionDenied(_)));
    }
}
