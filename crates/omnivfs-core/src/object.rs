//! File objects and their lifecycle.
//!
//! A [`FileObject`] is the one live handle for a name within a
//! [`FileSystem`]. It starts detached, attaches on the first call that
//! needs its type, and counts outstanding [`FileContent`] handles:
//!
//! ```text
//! Detached --get_type--> Attached --content()--> ContentOpen
//!     ^                     |  ^                     |
//!     +-- refresh/close ----+  +---- handle drop ----+
//! ```
//!
//! `close()` is valid from every state and forcibly invalidates any
//! content handles still outstanding.

use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use omnivfs_types::{Capability, FileName, FileType, NameScope};
use parking_lot::Mutex;
use strum::Display;

use crate::cache::CacheStrategy;
use crate::content::FileContent;
use crate::error::{Operation, VfsError, VfsResult};
use crate::fs::FileSystem;
use crate::listener::ChangeKind;
use crate::selector::{AllFileSelector, FileSelectInfo, FileSelector};

/// Observable lifecycle state of a [`FileObject`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum LifecycleState {
    Detached,
    Attached,
    ContentOpen,
}

#[derive(Debug, Default)]
struct ObjectState {
    attached: bool,
    file_type: Option<FileType>,
    /// Sorted base names of the children, once listed.
    children: Option<Vec<String>>,
    open_handles: usize,
    /// Bumped by `close()` so stale content handles know they are dead.
    generation: u64,
}

/// Stateful handle to one named resource within one file system.
pub struct FileObject {
    name: FileName,
    fs: Arc<FileSystem>,
    state: Mutex<ObjectState>,
}

impl FileObject {
    pub fn new(name: FileName, fs: Arc<FileSystem>) -> Self {
        Self {
            name,
            fs,
            state: Mutex::new(ObjectState::default()),
        }
    }

    pub fn name(&self) -> &FileName {
        &self.name
    }

    pub fn file_system(&self) -> &Arc<FileSystem> {
        &self.fs
    }

    pub fn state(&self) -> LifecycleState {
        let state = self.state.lock();
        if state.open_handles > 0 {
            LifecycleState::ContentOpen
        } else if state.attached {
            LifecycleState::Attached
        } else {
            LifecycleState::Detached
        }
    }

    pub fn is_attached(&self) -> bool {
        self.state.lock().attached
    }

    pub fn is_content_open(&self) -> bool {
        self.state.lock().open_handles > 0
    }

    /// Forget the cached type and child list. The next query re-attaches.
    pub fn refresh(&self) {
        let mut state = self.state.lock();
        state.attached = false;
        state.file_type = None;
        state.children = None;
    }

    /// Invalidate open content handles and detach. Idempotent.
    pub fn close(&self) {
        let mut state = self.state.lock();
        if state.open_handles > 0 {
            state.generation += 1;
            state.open_handles = 0;
        }
        state.attached = false;
        state.file_type = None;
        state.children = None;
    }

    /// The file's type, attaching if needed.
    pub async fn get_type(&self) -> VfsResult<FileType> {
        if self.fs.strategy() == CacheStrategy::OnCall {
            self.refresh();
        }
        let cached = self.state.lock().file_type;
        if let Some(file_type) = cached {
            return Ok(file_type);
        }
        self.attach().await
    }

    async fn attach(&self) -> VfsResult<FileType> {
        self.fs.ensure_open()?;
        if self.fs.is_virtual() {
            self.fs.delegate(&self.name);
        }
        let file_type = self
            .fs
            .ops()
            .get_type(&self.name)
            .await
            .map_err(|e| VfsError::backend(Operation::GetType, &self.name, e))?;

        let mut state = self.state.lock();
        state.attached = true;
        state.file_type = Some(file_type);
        Ok(file_type)
    }

    pub async fn exists(&self) -> VfsResult<bool> {
        Ok(self.get_type().await?.exists())
    }

    pub async fn is_file(&self) -> VfsResult<bool> {
        Ok(self.get_type().await? == FileType::File)
    }

    pub async fn is_folder(&self) -> VfsResult<bool> {
        Ok(self.get_type().await? == FileType::Folder)
    }

    /// Sorted base names of the children.
    ///
    /// Fails with `NotFound` for an imaginary file and `NotFolder` for a file.
    pub async fn child_names(&self) -> VfsResult<Vec<String>> {
        self.check_capability(Capability::ListChildren)?;
        match self.get_type().await? {
            FileType::Folder => {}
            FileType::File => return Err(VfsError::not_folder(&self.name)),
            FileType::Imaginary => return Err(VfsError::not_found(&self.name)),
        }

        let cached = self.state.lock().children.clone();
        if let Some(names) = cached {
            return Ok(names);
        }

        let mut names = self
            .fs
            .ops()
            .list_children(&self.name)
            .await
            .map_err(|e| VfsError::backend(Operation::ListChildren, &self.name, e))?;
        names.sort();
        self.state.lock().children = Some(names.clone());
        Ok(names)
    }

    pub async fn children(&self) -> VfsResult<Vec<Arc<FileObject>>> {
        self.child_names()
            .await?
            .iter()
            .map(|base| {
                let name = self.name.child(base)?;
                self.fs.resolve_file(&name)
            })
            .collect()
    }

    /// The existing child called `base`, if there is one.
    pub async fn child(&self, base: &str) -> VfsResult<Option<Arc<FileObject>>> {
        let names = self.child_names().await?;
        if !names.iter().any(|n| n == base) {
            return Ok(None);
        }
        let name = self.name.child(base)?;
        self.fs.resolve_file(&name).map(Some)
    }

    /// Resolve `path` relative to this file, within `scope`.
    pub fn resolve_file(&self, path: &str, scope: NameScope) -> VfsResult<Arc<FileObject>> {
        let name = self.name.resolve(path, scope)?;
        self.fs.resolve_file(&name)
    }

    /// The parent folder. The root of a layered file system answers with
    /// the parent of the file it is layered on.
    pub fn parent(&self) -> VfsResult<Option<Arc<FileObject>>> {
        match self.name.parent() {
            Some(parent) => self.fs.resolve_file(&parent).map(Some),
            None => match self.fs.parent_layer() {
                Some(layer) => layer.parent(),
                None => Ok(None),
            },
        }
    }

    /// Create this folder and any missing ancestors. A no-op for a folder.
    pub fn create_folder(&self) -> BoxFuture<'_, VfsResult<()>> {
        async move {
            self.check_capability(Capability::Create)?;
            match self.get_type().await? {
                FileType::Folder => return Ok(()),
                FileType::File => return Err(VfsError::not_folder(&self.name)),
                FileType::Imaginary => {}
            }

            if let Some(parent) = self.name.parent() {
                self.fs.resolve_file(&parent)?.create_folder().await?;
            }
            self.fs
                .ops()
                .create_folder(&self.name)
                .await
                .map_err(|e| VfsError::backend(Operation::CreateFolder, &self.name, e))?;
            self.handle_create(FileType::Folder);
            Ok(())
        }
        .boxed()
    }

    /// Create an empty file, and any missing ancestor folders. A no-op for a file.
    pub async fn create_file(&self) -> VfsResult<()> {
        self.check_capability(Capability::Create)?;
        self.check_capability(Capability::WriteContent)?;
        match self.get_type().await? {
            FileType::File => return Ok(()),
            FileType::Folder => return Err(VfsError::not_file(&self.name)),
            FileType::Imaginary => {}
        }

        if let Some(parent) = self.name.parent() {
            self.fs.resolve_file(&parent)?.create_folder().await?;
        }
        self.fs
            .ops()
            .truncate(&self.name, 0)
            .await
            .map_err(|e| VfsError::backend(Operation::CreateFile, &self.name, e))?;
        self.handle_create(FileType::File);
        Ok(())
    }

    /// Delete this file or empty folder.
    ///
    /// Returns false when there is nothing to delete or the folder still
    /// has children.
    pub async fn delete(&self) -> VfsResult<bool> {
        self.check_capability(Capability::Delete)?;
        match self.get_type().await? {
            FileType::Imaginary => return Ok(false),
            FileType::Folder => {
                let children = self
                    .fs
                    .ops()
                    .list_children(&self.name)
                    .await
                    .map_err(|e| VfsError::backend(Operation::ListChildren, &self.name, e))?;
                if !children.is_empty() {
                    return Ok(false);
                }
            }
            FileType::File => {}
        }

        self.fs
            .ops()
            .delete(&self.name)
            .await
            .map_err(|e| VfsError::backend(Operation::Delete, &self.name, e))?;
        self.handle_delete();
        Ok(true)
    }

    /// Delete the files `selector` picks from this tree, deepest first.
    ///
    /// A selected folder that still holds unselected files is kept.
    /// Returns the number of files and folders deleted.
    pub async fn delete_all(self: &Arc<Self>, selector: &dyn FileSelector) -> VfsResult<usize> {
        let mut deleted = 0;
        for file in self.find_files(selector, true).await? {
            if file.delete().await? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    /// The files of this tree that `selector` picks.
    ///
    /// A `depthwise` walk lists every file after its descendants; otherwise
    /// before them. Empty if this file does not exist.
    pub async fn find_files(
        self: &Arc<Self>,
        selector: &dyn FileSelector,
        depthwise: bool,
    ) -> VfsResult<Vec<Arc<FileObject>>> {
        let mut selected = Vec::new();
        if self.exists().await? {
            traverse(self, self, 0, selector, depthwise, &mut selected).await?;
        }
        Ok(selected)
    }

    /// Move this file or folder to `dest`.
    ///
    /// Within one file system that can rename this is a single backend
    /// rename; otherwise the tree is copied and the source deleted.
    pub async fn move_to(self: &Arc<Self>, dest: &Arc<FileObject>) -> VfsResult<()> {
        let file_type = self.get_type().await?;
        if !file_type.exists() {
            return Err(VfsError::not_found(&self.name));
        }
        if dest.exists().await? {
            return Err(VfsError::FileExists(dest.name.friendly_uri()));
        }

        if Arc::ptr_eq(&self.fs, &dest.fs) && self.fs.has_capability(Capability::Rename) {
            if let Some(parent) = dest.parent()? {
                parent.create_folder().await?;
            }
            self.fs
                .ops()
                .rename(&self.name, &dest.name)
                .await
                .map_err(|e| VfsError::backend(Operation::Rename, &self.name, e))?;
            self.handle_delete();
            dest.handle_create(file_type);
            return Ok(());
        }

        dest.copy_from(self, &AllFileSelector).await?;
        self.delete_all(&AllFileSelector).await?;
        Ok(())
    }

    /// Copy the files `selector` picks from the tree at `src` onto the same
    /// relative names below this one.
    ///
    /// A destination of a different type than its source is deleted first.
    pub async fn copy_from(
        self: &Arc<Self>,
        src: &Arc<FileObject>,
        selector: &dyn FileSelector,
    ) -> VfsResult<()> {
        if !src.exists().await? {
            return Err(VfsError::not_found(&src.name));
        }
        for src_file in src.find_files(selector, false).await? {
            let relative = src.name.relative_name(&src_file.name);
            let dest = self.resolve_file(&relative, NameScope::DescendentOrSelf)?;
            let src_type = src_file.get_type().await?;
            let dest_type = dest.get_type().await?;
            if dest_type.exists() && dest_type != src_type {
                dest.delete_all(&AllFileSelector).await?;
            }
            match src_type {
                FileType::File => {
                    let data = src_file.content().await?.read_to_end().await?;
                    dest.content().await?.write_all(&data).await?;
                }
                FileType::Folder => dest.create_folder().await?,
                FileType::Imaginary => {}
            }
        }
        Ok(())
    }

    /// False for a file that does not exist.
    pub async fn is_readable(&self) -> VfsResult<bool> {
        if !self.exists().await? {
            return Ok(false);
        }
        self.fs
            .ops()
            .is_readable(&self.name)
            .await
            .map_err(|e| VfsError::backend(Operation::CheckReadable, &self.name, e))
    }

    /// Whether this file may be written. A file that does not exist yet is
    /// as writeable as its nearest existing ancestor.
    pub fn is_writeable(&self) -> BoxFuture<'_, VfsResult<bool>> {
        async move {
            if self.exists().await? {
                return self
                    .fs
                    .ops()
                    .is_writeable(&self.name)
                    .await
                    .map_err(|e| VfsError::backend(Operation::CheckWriteable, &self.name, e));
            }
            match self.parent()? {
                Some(parent) => parent.is_writeable().await,
                None => Ok(true),
            }
        }
        .boxed()
    }

    /// False for a file that does not exist.
    pub async fn is_hidden(&self) -> VfsResult<bool> {
        if !self.exists().await? {
            return Ok(false);
        }
        self.fs
            .ops()
            .is_hidden(&self.name)
            .await
            .map_err(|e| VfsError::backend(Operation::CheckHidden, &self.name, e))
    }

    /// Open a content handle. The object stays content-open until the
    /// handle is dropped or this object is closed.
    pub async fn content(self: &Arc<Self>) -> VfsResult<FileContent> {
        self.get_type().await?;
        let generation = {
            let mut state = self.state.lock();
            state.open_handles += 1;
            state.generation
        };
        Ok(FileContent::new(self.clone(), generation))
    }

    pub(crate) fn check_capability(&self, capability: Capability) -> VfsResult<()> {
        if self.fs.has_capability(capability) {
            Ok(())
        } else {
            Err(VfsError::capability_missing(capability, &self.name))
        }
    }

    pub(crate) fn generation(&self) -> u64 {
        self.state.lock().generation
    }

    pub(crate) fn release_content(&self, generation: u64) {
        let mut state = self.state.lock();
        if state.generation == generation && state.open_handles > 0 {
            state.open_handles -= 1;
        }
    }

    /// The backend now holds a new `file_type` under this name.
    pub(crate) fn handle_create(&self, file_type: FileType) {
        {
            let mut state = self.state.lock();
            state.attached = true;
            state.file_type = Some(file_type);
            state.children = None;
        }
        self.invalidate_parent_listing();
        self.announce(ChangeKind::Created, file_type);
    }

    pub(crate) fn handle_delete(&self) {
        {
            let mut state = self.state.lock();
            state.attached = true;
            state.file_type = Some(FileType::Imaginary);
            state.children = None;
        }
        self.invalidate_parent_listing();
        self.announce(ChangeKind::Deleted, FileType::Imaginary);
    }

    pub(crate) fn handle_changed(&self) {
        self.announce(ChangeKind::Changed, FileType::File);
    }

    /// Fire `kind` for this name. A name routed through a junction updates
    /// the target object instead, and the event comes back to this file
    /// system through the junction's delegate.
    fn announce(&self, kind: ChangeKind, file_type: FileType) {
        let Some(delegate) = self.fs.delegate(&self.name) else {
            self.fs.fire(kind, &self.name);
            return;
        };
        match delegate.target() {
            Ok(target) => match kind {
                ChangeKind::Created => target.handle_create(file_type),
                ChangeKind::Changed => target.handle_changed(),
                ChangeKind::Deleted => target.handle_delete(),
            },
            Err(e) => {
                tracing::warn!(file = %self.name, error = %e, "junction target unavailable");
                self.fs.fire(kind, &self.name);
            }
        }
    }

    pub(crate) fn invalidate_parent_listing(&self) {
        let Some(parent) = self.name.parent() else {
            return;
        };
        if let Some(parent) = self.fs.files_cache().get(&self.fs, &parent) {
            let mut state = parent.state.lock();
            state.children = None;
            // A folder that gained a child exists whatever we last saw.
            if state.file_type == Some(FileType::Imaginary) {
                state.file_type = None;
                state.attached = false;
            }
        }
    }
}

/// Walk `file` and below, collecting what `selector` includes into `selected`.
fn traverse<'a>(
    base: &'a Arc<FileObject>,
    file: &'a Arc<FileObject>,
    depth: usize,
    selector: &'a dyn FileSelector,
    depthwise: bool,
    selected: &'a mut Vec<Arc<FileObject>>,
) -> BoxFuture<'a, VfsResult<()>> {
    async move {
        let index = selected.len();
        let info = FileSelectInfo { base, file, depth };
        if file.get_type().await? == FileType::Folder && selector.traverse_descendants(&info).await? {
            for child in file.children().await? {
                traverse(base, &child, depth + 1, selector, depthwise, selected).await?;
            }
        }
        if selector.include_file(&info).await? {
            if depthwise {
                selected.push(file.clone());
            } else {
                selected.insert(index, file.clone());
            }
        }
        Ok(())
    }
    .boxed()
}

impl std::fmt::Debug for FileObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileObject")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}
