//! Local file system provider (`file:`).
//!
//! Names map onto real paths below a root directory, with path security
//! to prevent escaping it.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use omnivfs_types::{Capability, CapabilitySet, FileName, FileType, NameParser, PathNameParser};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use crate::error::{BackendError, BackendResult, VfsResult};
use crate::fs::FileSystem;
use crate::ops::FileOps;
use crate::options::FileSystemOptions;
use crate::provider::{FileProvider, ProviderContext};

/// [`FileOps`] over a directory of the host file system.
///
/// A name's path is taken relative to `root`: with a root of
/// `/home/amy/project`, `file:///src/main.rs` is
/// `/home/amy/project/src/main.rs`.
#[derive(Debug, Clone)]
pub struct LocalOps {
    root: PathBuf,
    read_only: bool,
}

impl LocalOps {
    /// The root is canonicalized up front so symlinked roots (macOS `/tmp`)
    /// compare correctly in the escape check.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root: PathBuf = root.into();
        let root = root.canonicalize().unwrap_or(root);
        Self {
            root,
            read_only: false,
        }
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a name onto a real path within the root.
    ///
    /// Names are already normalized, so only symlinks can escape; existing
    /// paths (or their existing parent) are canonicalized and checked.
    fn resolve(&self, name: &FileName) -> BackendResult<PathBuf> {
        let relative = name.path().trim_start_matches('/');
        if relative.is_empty() {
            return Ok(self.root.clone());
        }
        let full = self.root.join(relative);

        let canonical = if full.exists() {
            full.canonicalize()?
        } else {
            match (full.parent(), full.file_name()) {
                (Some(parent), Some(file_name)) if parent.exists() => {
                    parent.canonicalize()?.join(file_name)
                }
                _ => full,
            }
        };

        if !canonical.starts_with(&self.root) {
            return Err(BackendError::path_escapes_root(format!(
                "{} is not under {}",
                canonical.display(),
                self.root.display()
            )));
        }
        Ok(canonical)
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
impl FileOps for LocalOps {
    async fn get_type(&self, name: &FileName) -> BackendResult<FileType> {
        let path = self.resolve(name)?;
        match fs::metadata(&path).await {
            Ok(meta) if meta.is_dir() => Ok(FileType::Folder),
            Ok(_) => Ok(FileType::File),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(FileType::Imaginary),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_children(&self, name: &FileName) -> BackendResult<Vec<String>> {
        let path = self.resolve(name)?;
        let mut dir = fs::read_dir(&path).await?;
        let mut children = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            children.push(entry.file_name().to_string_lossy().into_owned());
        }
        children.sort();
        Ok(children)
    }

    async fn read(&self, name: &FileName, offset: u64, size: usize) -> BackendResult<Vec<u8>> {
        let path = self.resolve(name)?;
        let mut file = fs::File::open(&path).await?;
        file.seek(std::io::SeekFrom::Start(offset)).await?;

        let mut buffer = Vec::with_capacity(size.min(1 << 20));
        file.take(size as u64).read_to_end(&mut buffer).await?;
        Ok(buffer)
    }

    async fn write(&self, name: &FileName, offset: u64, data: &[u8]) -> BackendResult<()> {
        self.check_writable()?;
        let path = self.resolve(name)?;
        let mut file = fs::OpenOptions::new().write(true).open(&path).await?;
        file.seek(std::io::SeekFrom::Start(offset)).await?;
        file.write_all(data).await?;
        file.flush().await?;
        Ok(())
    }

    async fn truncate(&self, name: &FileName, size: u64) -> BackendResult<()> {
        self.check_writable()?;
        let path = self.resolve(name)?;
        let file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .await?;
        file.set_len(size).await?;
        Ok(())
    }

    async fn content_size(&self, name: &FileName) -> BackendResult<u64> {
        let path = self.resolve(name)?;
        let meta = fs::metadata(&path).await?;
        if meta.is_dir() {
            return Err(BackendError::is_a_directory(name.path()));
        }
        Ok(meta.len())
    }

    async fn create_folder(&self, name: &FileName) -> BackendResult<()> {
        self.check_writable()?;
        let path = self.resolve(name)?;
        fs::create_dir(&path).await?;
        Ok(())
    }

    async fn delete(&self, name: &FileName) -> BackendResult<()> {
        self.check_writable()?;
        if name.is_root() {
            return Err(BackendError::permission_denied("cannot remove root"));
        }
        let path = self.resolve(name)?;
        let meta = fs::symlink_metadata(&path).await?;
        if meta.is_dir() {
            fs::remove_dir(&path).await?;
        } else {
            fs::remove_file(&path).await?;
        }
        Ok(())
    }

    async fn rename(&self, from: &FileName, to: &FileName) -> BackendResult<()> {
        self.check_writable()?;
        let from_path = self.resolve(from)?;
        let to_path = self.resolve(to)?;
        fs::rename(&from_path, &to_path).await?;
        Ok(())
    }

    async fn last_modified(&self, name: &FileName) -> BackendResult<SystemTime> {
        let path = self.resolve(name)?;
        Ok(fs::metadata(&path).await?.modified()?)
    }

    async fn is_readable(&self, name: &FileName) -> BackendResult<bool> {
        let path = self.resolve(name)?;
        if fs::metadata(&path).await?.is_dir() {
            Ok(fs::read_dir(&path).await.is_ok())
        } else {
            Ok(fs::File::open(&path).await.is_ok())
        }
    }

    async fn is_writeable(&self, name: &FileName) -> BackendResult<bool> {
        if self.read_only {
            return Ok(false);
        }
        let path = self.resolve(name)?;
        Ok(!fs::metadata(&path).await?.permissions().readonly())
    }

    /// Dot files, as on Unix.
    async fn is_hidden(&self, name: &FileName) -> BackendResult<bool> {
        Ok(name.base_name().starts_with('.'))
    }

    async fn set_last_modified(&self, name: &FileName, time: SystemTime) -> BackendResult<()> {
        self.check_writable()?;
        let path = self.resolve(name)?;
        tokio::task::spawn_blocking(move || {
            std::fs::File::options()
                .write(true)
                .open(&path)
                .and_then(|file| file.set_modified(time))
        })
        .await
        .map_err(|e| BackendError::other(format!("set_modified task failed: {e}")))??;
        Ok(())
    }
}

/// Provider for the `file` scheme.
pub struct LocalProvider {
    parser: PathNameParser,
    base: PathBuf,
}

impl Default for LocalProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalProvider {
    /// Names map onto the whole host file system.
    pub fn new() -> Self {
        Self::rooted("/")
    }

    /// Names map onto paths below `base`, which acts as a sandbox.
    pub fn rooted(base: impl Into<PathBuf>) -> Self {
        Self {
            parser: PathNameParser::new(),
            base: base.into(),
        }
    }

    fn file_capabilities() -> CapabilitySet {
        [
            Capability::Create,
            Capability::Delete,
            Capability::Rename,
            Capability::GetType,
            Capability::ListChildren,
            Capability::ReadContent,
            Capability::WriteContent,
            Capability::AppendContent,
            Capability::RandomAccessRead,
            Capability::RandomAccessWrite,
            Capability::GetLastModified,
            Capability::SetLastModifiedFile,
        ]
        .into_iter()
        .collect()
    }
}

#[async_trait]
impl FileProvider for LocalProvider {
    fn name_parser(&self) -> &dyn NameParser {
        &self.parser
    }

    fn capabilities(&self) -> CapabilitySet {
        Self::file_capabilities()
    }

    async fn create_file_system(
        &self,
        root: &FileName,
        options: &FileSystemOptions,
        ctx: &ProviderContext,
    ) -> VfsResult<Arc<FileSystem>> {
        let read_only = options.read_only();
        let capabilities = if read_only {
            CapabilitySet::read_only().without(Capability::Attributes)
        } else {
            self.capabilities()
        };
        let ops = LocalOps::new(&self.base).read_only(read_only);
        let fs = FileSystem::new(root.clone(), Arc::new(ops), capabilities, ctx)
            .with_options(options.clone());
        Ok(Arc::new(fs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (LocalOps, TempDir) {
        let dir = TempDir::new().unwrap();
        let ops = LocalOps::new(dir.path());
        (ops, dir)
    }

    fn name(path: &str) -> FileName {
        PathNameParser::new().parse(&format!("file://{path}")).unwrap()
    }

    #[tokio::test]
    async fn test_create_write_read() {
        let (ops, _dir) = setup();
        ops.truncate(&name("/test.txt"), 0).await.unwrap();
        ops.write(&name("/test.txt"), 0, b"hello world").await.unwrap();

        assert_eq!(ops.read(&name("/test.txt"), 6, 5).await.unwrap(), b"world");
        assert_eq!(ops.content_size(&name("/test.txt")).await.unwrap(), 11);
        assert_eq!(ops.get_type(&name("/test.txt")).await.unwrap(), FileType::File);
        assert_eq!(ops.get_type(&name("/nope")).await.unwrap(), FileType::Imaginary);
    }

    #[tokio::test]
    async fn test_folders_and_listing() {
        let (ops, _dir) = setup();
        ops.create_folder(&name("/sub")).await.unwrap();
        ops.truncate(&name("/sub/b"), 0).await.unwrap();
        ops.truncate(&name("/sub/a"), 0).await.unwrap();

        assert_eq!(ops.get_type(&name("/sub")).await.unwrap(), FileType::Folder);
        assert_eq!(ops.list_children(&name("/sub")).await.unwrap(), vec!["a", "b"]);

        let err = ops.delete(&name("/sub")).await.unwrap_err();
        assert!(matches!(err, BackendError::DirectoryNotEmpty(_) | BackendError::Io(_)));
    }

    #[tokio::test]
    async fn test_read_only_rejects_writes() {
        let (ops, _dir) = setup();
        let ops = ops.read_only(true);
        let err = ops.truncate(&name("/x"), 0).await.unwrap_err();
        assert!(matches!(err, BackendError::ReadOnly));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_escape_blocked() {
        let (ops, dir) = setup();
        let outside = TempDir::new().unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("escape")).unwrap();

        let err = ops.get_type(&name("/escape/secret")).await.unwrap_err();
        assert!(matches!(err, BackendError::PathEscapesRoot(_)));
    }

    #[tokio::test]
    async fn test_set_last_modified() {
        let (ops, _dir) = setup();
        ops.truncate(&name("/stamp"), 0).await.unwrap();
        let when = SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(1_500_000_000);
        ops.set_last_modified(&name("/stamp"), when).await.unwrap();
        assert_eq!(ops.last_modified(&name("/stamp")).await.unwrap(), when);
    }
}
