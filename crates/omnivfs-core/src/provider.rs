//! Backend factories keyed by URI scheme.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use omnivfs_types::{CapabilitySet, FileName, NameParser};

use crate::cache::{CacheStrategy, FilesCache};
use crate::error::VfsResult;
use crate::fs::FileSystem;
use crate::options::FileSystemOptions;

/// Manager-wide settings handed to providers when they build a file system.
#[derive(Clone)]
pub struct ProviderContext {
    pub files_cache: Arc<dyn FilesCache>,
    pub strategy: CacheStrategy,
}

/// Creates file systems for one or more URI schemes.
#[async_trait]
pub trait FileProvider: Send + Sync {
    /// Parser for URIs of this provider's schemes.
    fn name_parser(&self) -> &dyn NameParser;

    /// Capabilities of the file systems this provider creates with default options.
    fn capabilities(&self) -> CapabilitySet;

    /// Build the file system rooted at `root`.
    async fn create_file_system(
        &self,
        root: &FileName,
        options: &FileSystemOptions,
        ctx: &ProviderContext,
    ) -> VfsResult<Arc<FileSystem>>;
}

/// File systems a provider has created, keyed by root URI and options.
#[derive(Default)]
pub struct FileSystemRegistry {
    file_systems: DashMap<(String, FileSystemOptions), Arc<FileSystem>>,
}

impl FileSystemRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The file system for `root` and `options`, creating it on first use.
    ///
    /// Concurrent first uses may both call the provider; the first one
    /// stored wins and the other is discarded.
    pub async fn get_or_create(
        &self,
        provider: &dyn FileProvider,
        root: &FileName,
        options: &FileSystemOptions,
        ctx: &ProviderContext,
    ) -> VfsResult<Arc<FileSystem>> {
        let key = (root.root_uri(), options.clone());
        let existing = self.file_systems.get(&key).map(|fs| fs.clone());
        if let Some(fs) = existing {
            return Ok(fs);
        }

        let created = provider.create_file_system(&root.root(), options, ctx).await?;
        let fs = self.file_systems.entry(key).or_insert(created).clone();
        tracing::debug!(root = %fs.root_name(), id = fs.id(), "file system ready");
        Ok(fs)
    }

    /// Forget `fs`. Returns false if it was not registered here.
    pub fn remove(&self, fs: &FileSystem) -> bool {
        let before = self.file_systems.len();
        self.file_systems.retain(|_, registered| registered.id() != fs.id());
        self.file_systems.len() != before
    }

    /// Close and forget every registered file system.
    pub fn close_all(&self) {
        for entry in self.file_systems.iter() {
            entry.value().close();
        }
        self.file_systems.clear();
    }

    pub fn len(&self) -> usize {
        self.file_systems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.file_systems.is_empty()
    }
}
