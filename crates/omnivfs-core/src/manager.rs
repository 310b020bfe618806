//! The entry point: scheme dispatch, file system reuse and junctions.

use std::collections::HashMap;
use std::sync::Arc;

use omnivfs_types::{
    CapabilitySet, FileName, MalformedReason, NameError, NameParser, NameScope, PathNameParser,
    extract_scheme,
};
use parking_lot::RwLock;

use crate::backends::{LocalProvider, MemoryProvider};
use crate::cache::{CacheStrategy, FilesCache, UnboundedFilesCache};
use crate::config::VfsConfig;
use crate::error::{VfsError, VfsResult};
use crate::fs::FileSystem;
use crate::junction::{JunctionTable, VirtualOps};
use crate::object::FileObject;
use crate::options::FileSystemOptions;
use crate::provider::{FileProvider, FileSystemRegistry, ProviderContext};

/// Scheme of the manager's built-in virtual file system.
pub const VIRTUAL_SCHEME: &str = "vfs";

struct ProviderEntry {
    provider: Arc<dyn FileProvider>,
    file_systems: FileSystemRegistry,
}

/// Resolves URIs to file objects.
///
/// Each scheme is served by a registered [`FileProvider`]; file systems are
/// created once per root and options and reused. The `vfs:` scheme is served
/// by a built-in virtual file system assembled from junctions.
pub struct FileSystemManager {
    providers: RwLock<HashMap<String, Arc<ProviderEntry>>>,
    context: ProviderContext,
    virtual_parser: PathNameParser,
    virtual_fs: Arc<FileSystem>,
    base_file: RwLock<Option<Arc<FileObject>>>,
}

impl FileSystemManager {
    /// A manager with no providers besides the virtual file system.
    pub fn new(files_cache: Arc<dyn FilesCache>, strategy: CacheStrategy) -> Self {
        let context = ProviderContext {
            files_cache,
            strategy,
        };
        let virtual_fs = Arc::new(new_virtual_fs(FileName::bare_root(VIRTUAL_SCHEME), &context));
        Self {
            providers: RwLock::new(HashMap::new()),
            context,
            virtual_parser: PathNameParser::bare(),
            virtual_fs,
            base_file: RwLock::new(None),
        }
    }

    /// A manager with the `ram` and `file` providers registered.
    pub fn standard(files_cache: Arc<dyn FilesCache>, strategy: CacheStrategy) -> Self {
        let manager = Self::new(files_cache, strategy);
        manager.insert_provider(&["ram"], Arc::new(MemoryProvider::new()));
        manager.insert_provider(&["file"], Arc::new(LocalProvider::new()));
        manager
    }

    /// A standard manager configured from `config`, with its mounts installed.
    pub async fn from_config(config: &VfsConfig) -> VfsResult<Self> {
        let cache = config.cache.policy.build(config.cache.capacity);
        let manager = Self::standard(cache, config.cache.strategy);
        for mount in &config.mount {
            let target = manager.resolve_file(&mount.target).await?;
            manager.add_junction(&mount.point, target)?;
        }
        Ok(manager)
    }

    pub fn files_cache(&self) -> &Arc<dyn FilesCache> {
        &self.context.files_cache
    }

    pub fn strategy(&self) -> CacheStrategy {
        self.context.strategy
    }

    /// Register `provider` for every scheme in `schemes`.
    ///
    /// Nothing is registered if any scheme is already taken.
    pub fn add_provider(&self, schemes: &[&str], provider: Arc<dyn FileProvider>) -> VfsResult<()> {
        let mut providers = self.providers.write();
        for scheme in schemes {
            let scheme = scheme.to_ascii_lowercase();
            if scheme == VIRTUAL_SCHEME || providers.contains_key(&scheme) {
                return Err(VfsError::DuplicateScheme(scheme));
            }
        }
        Self::register(&mut providers, schemes, provider);
        Ok(())
    }

    fn insert_provider(&self, schemes: &[&str], provider: Arc<dyn FileProvider>) {
        Self::register(&mut self.providers.write(), schemes, provider);
    }

    fn register(
        providers: &mut HashMap<String, Arc<ProviderEntry>>,
        schemes: &[&str],
        provider: Arc<dyn FileProvider>,
    ) {
        let entry = Arc::new(ProviderEntry {
            provider,
            file_systems: FileSystemRegistry::new(),
        });
        for scheme in schemes {
            providers.insert(scheme.to_ascii_lowercase(), entry.clone());
        }
    }

    pub fn has_provider(&self, scheme: &str) -> bool {
        let scheme = scheme.to_ascii_lowercase();
        scheme == VIRTUAL_SCHEME || self.providers.read().contains_key(&scheme)
    }

    /// Every resolvable scheme, sorted.
    pub fn schemes(&self) -> Vec<String> {
        let mut schemes: Vec<String> = self.providers.read().keys().cloned().collect();
        schemes.push(VIRTUAL_SCHEME.to_string());
        schemes.sort();
        schemes
    }

    /// Resolve scheme-less URIs relative to `file`.
    pub fn set_base_file(&self, file: Option<Arc<FileObject>>) {
        *self.base_file.write() = file;
    }

    pub fn base_file(&self) -> Option<Arc<FileObject>> {
        self.base_file.read().clone()
    }

    /// Parse `uri` with the parser of its scheme, without touching any backend.
    pub fn resolve_uri(&self, uri: &str) -> VfsResult<FileName> {
        let Some((scheme, _)) = extract_scheme(uri) else {
            return match self.base_file() {
                Some(base) => Ok(base.name().resolve(uri, NameScope::FileSystem)?),
                None => Err(NameError::malformed(uri, MalformedReason::MissingScheme).into()),
            };
        };
        let scheme = scheme.to_ascii_lowercase();
        if scheme == VIRTUAL_SCHEME {
            return Ok(self.virtual_parser.parse(uri)?);
        }
        let entry = self.provider_entry(&scheme)?;
        Ok(entry.provider.name_parser().parse(uri)?)
    }

    /// Resolve `path` against `base` within `scope`.
    pub fn resolve_name(&self, base: &FileName, path: &str, scope: NameScope) -> VfsResult<FileName> {
        Ok(base.resolve(path, scope)?)
    }

    /// Resolve `uri` with default options.
    pub async fn resolve_file(&self, uri: &str) -> VfsResult<Arc<FileObject>> {
        self.resolve_file_with(uri, &FileSystemOptions::new()).await
    }

    /// Resolve `uri`, creating the owning file system with `options` if needed.
    pub async fn resolve_file_with(
        &self,
        uri: &str,
        options: &FileSystemOptions,
    ) -> VfsResult<Arc<FileObject>> {
        let Some((scheme, _)) = extract_scheme(uri) else {
            let Some(base) = self.base_file() else {
                return Err(NameError::malformed(uri, MalformedReason::MissingScheme).into());
            };
            let name = base.name().resolve(uri, NameScope::FileSystem)?;
            return base.file_system().resolve_file(&name);
        };

        let scheme = scheme.to_ascii_lowercase();
        if scheme == VIRTUAL_SCHEME {
            let name = self.virtual_parser.parse(uri)?;
            return self.virtual_fs.resolve_file(&name);
        }

        let entry = self.provider_entry(&scheme)?;
        let name = entry.provider.name_parser().parse(uri)?;
        let fs = entry
            .file_systems
            .get_or_create(entry.provider.as_ref(), &name, options, &self.context)
            .await?;
        fs.resolve_file(&name)
    }

    fn provider_entry(&self, scheme: &str) -> VfsResult<Arc<ProviderEntry>> {
        self.providers
            .read()
            .get(scheme)
            .cloned()
            .ok_or_else(|| VfsError::UnknownScheme(scheme.to_string()))
    }

    /// The built-in `vfs:` file system.
    pub fn virtual_file_system(&self) -> &Arc<FileSystem> {
        &self.virtual_fs
    }

    /// Mount `target` at `mount_point` (a `/`-rooted path) in the `vfs:` tree.
    pub fn add_junction(&self, mount_point: &str, target: Arc<FileObject>) -> VfsResult<()> {
        let name = self.mount_name(mount_point)?;
        self.virtual_fs.add_junction(&name, target)
    }

    /// Returns false if nothing was mounted there.
    pub fn remove_junction(&self, mount_point: &str) -> VfsResult<bool> {
        let name = self.mount_name(mount_point)?;
        self.virtual_fs.remove_junction(&name)
    }

    fn mount_name(&self, mount_point: &str) -> VfsResult<FileName> {
        Ok(self
            .virtual_fs
            .root_name()
            .resolve(mount_point, NameScope::DescendentOrSelf)?)
    }

    /// A new virtual file system whose root is a junction onto `root_file`.
    ///
    /// Returns its root object.
    pub fn create_virtual_file_system(&self, root_file: Arc<FileObject>) -> VfsResult<Arc<FileObject>> {
        let root = FileName::bare_root(root_file.name().scheme());
        let fs = new_virtual_fs(root.clone(), &self.context)
            .with_options(root_file.file_system().options().clone())
            .with_parent_layer(root_file.clone());
        let fs = Arc::new(fs);
        fs.add_junction(&root, root_file)?;
        fs.root_file()
    }

    /// Close `fs` and forget it, so the next resolution creates a fresh one.
    pub fn close_file_system(&self, fs: &FileSystem) {
        let entries: Vec<Arc<ProviderEntry>> = self.providers.read().values().cloned().collect();
        for entry in entries {
            entry.file_systems.remove(fs);
        }
        fs.close();
    }

    /// Close every file system and empty the cache.
    pub fn close(&self) {
        let entries: Vec<Arc<ProviderEntry>> = self.providers.read().values().cloned().collect();
        for entry in entries {
            entry.file_systems.close_all();
        }
        self.files_cache().clear(&self.virtual_fs);
        self.files_cache().close();
        *self.base_file.write() = None;
    }
}

impl Default for FileSystemManager {
    fn default() -> Self {
        Self::new(Arc::new(UnboundedFilesCache::new()), CacheStrategy::default())
    }
}

fn new_virtual_fs(root: FileName, ctx: &ProviderContext) -> FileSystem {
    let junctions = Arc::new(JunctionTable::new());
    FileSystem::new(
        root,
        Arc::new(VirtualOps::new(junctions.clone())),
        CapabilitySet::all(),
        ctx,
    )
    .with_junctions(junctions)
}
