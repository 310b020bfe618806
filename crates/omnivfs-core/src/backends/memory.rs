//! In-memory provider (`ram:`).
//!
//! Used for scratch trees and testing. All data is ephemeral.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};
use std::time::SystemTime;

use async_trait::async_trait;
use omnivfs_types::{Capability, CapabilitySet, FileName, FileType, NameParser, PathNameParser};

use crate::error::{BackendError, BackendResult, VfsResult};
use crate::fs::FileSystem;
use crate::ops::FileOps;
use crate::options::FileSystemOptions;
use crate::provider::{FileProvider, ProviderContext};

#[derive(Debug, Clone)]
enum Entry {
    File {
        data: Vec<u8>,
        modified: SystemTime,
        attributes: BTreeMap<String, String>,
    },
    Folder {
        modified: SystemTime,
        attributes: BTreeMap<String, String>,
    },
}

impl Entry {
    fn folder() -> Self {
        Entry::Folder {
            modified: SystemTime::now(),
            attributes: BTreeMap::new(),
        }
    }

    fn modified_mut(&mut self) -> &mut SystemTime {
        match self {
            Entry::File { modified, .. } | Entry::Folder { modified, .. } => modified,
        }
    }

    fn attributes(&self) -> &BTreeMap<String, String> {
        match self {
            Entry::File { attributes, .. } | Entry::Folder { attributes, .. } => attributes,
        }
    }

    fn attributes_mut(&mut self) -> &mut BTreeMap<String, String> {
        match self {
            Entry::File { attributes, .. } | Entry::Folder { attributes, .. } => attributes,
        }
    }
}

type Entries = HashMap<String, Entry>;

/// Largest file the in-memory store will grow to.
pub const MAX_FILE_SIZE: u64 = 1 << 30;

/// Byte length of a file that has to hold `len` bytes at `offset`.
fn content_end(path: &str, offset: u64, len: usize) -> BackendResult<usize> {
    offset
        .checked_add(len as u64)
        .filter(|end| *end <= MAX_FILE_SIZE)
        .and_then(|end| usize::try_from(end).ok())
        .ok_or_else(|| BackendError::invalid_path(format!("file too large: {path}")))
}

/// Parent path of a normalized absolute path.
fn parent_of(path: &str) -> Option<&str> {
    match path.rfind('/') {
        _ if path == "/" => None,
        Some(0) => Some("/"),
        Some(pos) => Some(&path[..pos]),
        None => None,
    }
}

fn is_below(path: &str, ancestor: &str) -> bool {
    if ancestor == "/" {
        return path != "/";
    }
    path.len() > ancestor.len()
        && path.starts_with(ancestor)
        && path.as_bytes()[ancestor.len()] == b'/'
}

/// The tree behind one or more memory file systems.
///
/// Keyed by normalized absolute path; the root `/` always exists. The
/// public mutators act directly on the store, bypassing any file objects,
/// which makes them handy for simulating outside changes in tests.
#[derive(Debug)]
pub struct MemoryStore {
    entries: RwLock<Entries>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let mut entries = HashMap::new();
        entries.insert("/".to_string(), Entry::folder());
        Self {
            entries: RwLock::new(entries),
        }
    }

    fn read(&self) -> BackendResult<std::sync::RwLockReadGuard<'_, Entries>> {
        self.entries
            .read()
            .map_err(|_| BackendError::other("lock poisoned"))
    }

    fn write(&self) -> BackendResult<std::sync::RwLockWriteGuard<'_, Entries>> {
        self.entries
            .write()
            .map_err(|_| BackendError::other("lock poisoned"))
    }

    /// Create folders for every missing ancestor of `path`.
    fn ensure_parents(entries: &mut Entries, path: &str) -> BackendResult<()> {
        let mut current = String::new();
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        for segment in segments.iter().take(segments.len().saturating_sub(1)) {
            current.push('/');
            current.push_str(segment);
            match entries.get(&current) {
                Some(Entry::Folder { .. }) => {}
                Some(Entry::File { .. }) => return Err(BackendError::not_a_directory(current)),
                None => {
                    entries.insert(current.clone(), Entry::folder());
                }
            }
        }
        Ok(())
    }

    fn touch_parent(entries: &mut Entries, path: &str) {
        if let Some(parent) = parent_of(path) {
            if let Some(entry) = entries.get_mut(parent) {
                *entry.modified_mut() = SystemTime::now();
            }
        }
    }

    fn require_parent_folder(entries: &Entries, path: &str) -> BackendResult<()> {
        let Some(parent) = parent_of(path) else {
            return Err(BackendError::permission_denied(path));
        };
        match entries.get(parent) {
            Some(Entry::Folder { .. }) => Ok(()),
            Some(Entry::File { .. }) => Err(BackendError::not_a_directory(parent)),
            None => Err(BackendError::not_found(parent)),
        }
    }

    /// Write a whole file, creating it and its parents as needed.
    pub fn write_file(&self, path: &str, data: impl Into<Vec<u8>>) -> BackendResult<()> {
        let mut entries = self.write()?;
        Self::ensure_parents(&mut entries, path)?;
        match entries.get_mut(path) {
            Some(Entry::Folder { .. }) => return Err(BackendError::is_a_directory(path)),
            Some(Entry::File {
                data: existing,
                modified,
                ..
            }) => {
                *existing = data.into();
                *modified = SystemTime::now();
            }
            None => {
                entries.insert(
                    path.to_string(),
                    Entry::File {
                        data: data.into(),
                        modified: SystemTime::now(),
                        attributes: BTreeMap::new(),
                    },
                );
                Self::touch_parent(&mut entries, path);
            }
        }
        Ok(())
    }

    /// Create a folder and its parents. Existing folders are left alone.
    pub fn create_dir(&self, path: &str) -> BackendResult<()> {
        let mut entries = self.write()?;
        Self::ensure_parents(&mut entries, path)?;
        match entries.get(path) {
            Some(Entry::Folder { .. }) => Ok(()),
            Some(Entry::File { .. }) => Err(BackendError::already_exists(path)),
            None => {
                entries.insert(path.to_string(), Entry::folder());
                Self::touch_parent(&mut entries, path);
                Ok(())
            }
        }
    }

    /// Remove a file or a whole folder tree. Returns false if nothing was there.
    pub fn remove(&self, path: &str) -> BackendResult<bool> {
        if path == "/" {
            return Err(BackendError::permission_denied("cannot remove root"));
        }
        let mut entries = self.write()?;
        if entries.remove(path).is_none() {
            return Ok(false);
        }
        entries.retain(|key, _| !is_below(key, path));
        Self::touch_parent(&mut entries, path);
        Ok(true)
    }

    /// Returns false if `path` does not exist.
    pub fn set_modified(&self, path: &str, time: SystemTime) -> BackendResult<bool> {
        let mut entries = self.write()?;
        Ok(match entries.get_mut(path) {
            Some(entry) => {
                *entry.modified_mut() = time;
                true
            }
            None => false,
        })
    }

    pub fn exists(&self, path: &str) -> bool {
        self.read().map(|e| e.contains_key(path)).unwrap_or(false)
    }

    pub fn read_file(&self, path: &str) -> Option<Vec<u8>> {
        match self.read().ok()?.get(path)? {
            Entry::File { data, .. } => Some(data.clone()),
            Entry::Folder { .. } => None,
        }
    }
}

/// [`FileOps`] over a [`MemoryStore`].
#[derive(Debug, Clone)]
pub struct MemoryOps {
    store: Arc<MemoryStore>,
    read_only: bool,
}

impl Default for MemoryOps {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryOps {
    /// Ops over a fresh, empty store.
    pub fn new() -> Self {
        Self::with_store(Arc::new(MemoryStore::new()))
    }

    pub fn with_store(store: Arc<MemoryStore>) -> Self {
        Self {
            store,
            read_only: false,
        }
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    fn check_writable(&self) -> BackendResult<()> {
        if self.read_only {
            Err(BackendError::ReadOnly)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl FileOps for MemoryOps {
    async fn get_type(&self, name: &FileName) -> BackendResult<FileType> {
        Ok(match self.store.read()?.get(name.path()) {
            Some(Entry::File { .. }) => FileType::File,
            Some(Entry::Folder { .. }) => FileType::Folder,
            None => FileType::Imaginary,
        })
    }

    async fn list_children(&self, name: &FileName) -> BackendResult<Vec<String>> {
        let path = name.path();
        let entries = self.store.read()?;
        match entries.get(path) {
            Some(Entry::Folder { .. }) => {}
            Some(Entry::File { .. }) => return Err(BackendError::not_a_directory(path)),
            None => return Err(BackendError::not_found(path)),
        }

        let mut children: Vec<String> = entries
            .keys()
            .filter(|key| parent_of(key) == Some(path))
            .filter_map(|key| key.rsplit('/').next().map(str::to_string))
            .collect();
        children.sort();
        Ok(children)
    }

    async fn read(&self, name: &FileName, offset: u64, size: usize) -> BackendResult<Vec<u8>> {
        let path = name.path();
        match self.store.read()?.get(path) {
            Some(Entry::File { data, .. }) => {
                let start = usize::try_from(offset).unwrap_or(usize::MAX).min(data.len());
                let end = start.saturating_add(size).min(data.len());
                Ok(data[start..end].to_vec())
            }
            Some(Entry::Folder { .. }) => Err(BackendError::is_a_directory(path)),
            None => Err(BackendError::not_found(path)),
        }
    }

    async fn write(&self, name: &FileName, offset: u64, data: &[u8]) -> BackendResult<()> {
        self.check_writable()?;
        let path = name.path();
        let mut entries = self.store.write()?;
        match entries.get_mut(path) {
            Some(Entry::File {
                data: file_data,
                modified,
                ..
            }) => {
                let end = content_end(path, offset, data.len())?;
                let start = end - data.len();
                if end > file_data.len() {
                    file_data.resize(end, 0);
                }
                file_data[start..end].copy_from_slice(data);
                *modified = SystemTime::now();
                Ok(())
            }
            Some(Entry::Folder { .. }) => Err(BackendError::is_a_directory(path)),
            None => Err(BackendError::not_found(path)),
        }
    }

    async fn truncate(&self, name: &FileName, size: u64) -> BackendResult<()> {
        self.check_writable()?;
        let path = name.path();
        let size = content_end(path, size, 0)?;
        let mut entries = self.store.write()?;
        match entries.get_mut(path) {
            Some(Entry::File { data, modified, .. }) => {
                data.resize(size, 0);
                *modified = SystemTime::now();
                Ok(())
            }
            Some(Entry::Folder { .. }) => Err(BackendError::is_a_directory(path)),
            None => {
                MemoryStore::require_parent_folder(&entries, path)?;
                entries.insert(
                    path.to_string(),
                    Entry::File {
                        data: vec![0; size],
                        modified: SystemTime::now(),
                        attributes: BTreeMap::new(),
                    },
                );
                MemoryStore::touch_parent(&mut entries, path);
                Ok(())
            }
        }
    }

    async fn content_size(&self, name: &FileName) -> BackendResult<u64> {
        let path = name.path();
        match self.store.read()?.get(path) {
            Some(Entry::File { data, .. }) => Ok(data.len() as u64),
            Some(Entry::Folder { .. }) => Err(BackendError::is_a_directory(path)),
            None => Err(BackendError::not_found(path)),
        }
    }

    async fn create_folder(&self, name: &FileName) -> BackendResult<()> {
        self.check_writable()?;
        let path = name.path();
        let mut entries = self.store.write()?;
        if entries.contains_key(path) {
            return Err(BackendError::already_exists(path));
        }
        MemoryStore::require_parent_folder(&entries, path)?;
        entries.insert(path.to_string(), Entry::folder());
        MemoryStore::touch_parent(&mut entries, path);
        Ok(())
    }

    async fn delete(&self, name: &FileName) -> BackendResult<()> {
        self.check_writable()?;
        let path = name.path();
        if name.is_root() {
            return Err(BackendError::permission_denied("cannot remove root"));
        }
        let mut entries = self.store.write()?;
        match entries.get(path) {
            Some(Entry::Folder { .. }) if entries.keys().any(|key| is_below(key, path)) => {
                return Err(BackendError::directory_not_empty(path));
            }
            Some(_) => {}
            None => return Err(BackendError::not_found(path)),
        }
        entries.remove(path);
        MemoryStore::touch_parent(&mut entries, path);
        Ok(())
    }

    async fn rename(&self, from: &FileName, to: &FileName) -> BackendResult<()> {
        self.check_writable()?;
        let (from, to) = (from.path(), to.path());
        let mut entries = self.store.write()?;
        if !entries.contains_key(from) {
            return Err(BackendError::not_found(from));
        }
        if entries.contains_key(to) {
            return Err(BackendError::already_exists(to));
        }
        if from == "/" || is_below(to, from) {
            return Err(BackendError::invalid_path(format!("cannot move {from} into {to}")));
        }
        MemoryStore::require_parent_folder(&entries, to)?;

        let moved: Vec<String> = entries
            .keys()
            .filter(|key| key.as_str() == from || is_below(key, from))
            .cloned()
            .collect();
        for old in moved {
            if let Some(entry) = entries.remove(&old) {
                let new = format!("{to}{}", &old[from.len()..]);
                entries.insert(new, entry);
            }
        }
        MemoryStore::touch_parent(&mut entries, from);
        MemoryStore::touch_parent(&mut entries, to);
        Ok(())
    }

    async fn last_modified(&self, name: &FileName) -> BackendResult<SystemTime> {
        let path = name.path();
        match self.store.read()?.get(path) {
            Some(Entry::File { modified, .. }) | Some(Entry::Folder { modified, .. }) => {
                Ok(*modified)
            }
            None => Err(BackendError::not_found(path)),
        }
    }

    async fn set_last_modified(&self, name: &FileName, time: SystemTime) -> BackendResult<()> {
        self.check_writable()?;
        if self.store.set_modified(name.path(), time)? {
            Ok(())
        } else {
            Err(BackendError::not_found(name.path()))
        }
    }

    async fn is_writeable(&self, _name: &FileName) -> BackendResult<bool> {
        Ok(!self.read_only)
    }

    async fn attributes(&self, name: &FileName) -> BackendResult<BTreeMap<String, String>> {
        let path = name.path();
        self.store
            .read()?
            .get(path)
            .map(|entry| entry.attributes().clone())
            .ok_or_else(|| BackendError::not_found(path))
    }

    async fn set_attribute(&self, name: &FileName, key: &str, value: &str) -> BackendResult<()> {
        self.check_writable()?;
        let path = name.path();
        let mut entries = self.store.write()?;
        let entry = entries
            .get_mut(path)
            .ok_or_else(|| BackendError::not_found(path))?;
        entry
            .attributes_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Provider for the `ram` scheme.
///
/// By default every file system gets its own store; [`MemoryProvider::with_store`]
/// backs them all with one shared store instead.
pub struct MemoryProvider {
    parser: PathNameParser,
    store: Option<Arc<MemoryStore>>,
}

impl Default for MemoryProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self {
            parser: PathNameParser::new(),
            store: None,
        }
    }

    pub fn with_store(store: Arc<MemoryStore>) -> Self {
        Self {
            parser: PathNameParser::new(),
            store: Some(store),
        }
    }
}

#[async_trait]
impl FileProvider for MemoryProvider {
    fn name_parser(&self) -> &dyn NameParser {
        &self.parser
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::all().without(Capability::Junctions)
    }

    async fn create_file_system(
        &self,
        root: &FileName,
        options: &FileSystemOptions,
        ctx: &ProviderContext,
    ) -> VfsResult<Arc<FileSystem>> {
        let store = self.store.clone().unwrap_or_default();
        let read_only = options.read_only();
        let capabilities = if read_only {
            CapabilitySet::read_only()
        } else {
            self.capabilities()
        };
        let ops = MemoryOps::with_store(store).read_only(read_only);
        let fs = FileSystem::new(root.clone(), Arc::new(ops), capabilities, ctx)
            .with_options(options.clone());
        Ok(Arc::new(fs))
    }
}
