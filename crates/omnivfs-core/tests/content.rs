//! Capability enforcement and write failure handling.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;

use async_trait::async_trait;
use omnivfs_core::{
    BackendError, BackendResult, CachePolicy, CacheStrategy, Capability, CapabilitySet, FileOps,
    FileSystem, FileSystemManager, FileSystemOptions, FileType, MemoryOps, MemoryStore,
    ProviderContext, VfsError,
};
use omnivfs_core::options::READ_ONLY;
use omnivfs_types::{FileName, NameParser, PathNameParser};

/// Memory backend whose writes always fail, and whose deletes fail on demand.
struct FailingWrites {
    inner: MemoryOps,
    fail_delete: AtomicBool,
}

#[async_trait]
impl FileOps for FailingWrites {
    async fn get_type(&self, name: &FileName) -> BackendResult<FileType> {
        self.inner.get_type(name).await
    }

    async fn list_children(&self, name: &FileName) -> BackendResult<Vec<String>> {
        self.inner.list_children(name).await
    }

    async fn read(&self, name: &FileName, offset: u64, size: usize) -> BackendResult<Vec<u8>> {
        self.inner.read(name, offset, size).await
    }

    async fn write(&self, _name: &FileName, _offset: u64, _data: &[u8]) -> BackendResult<()> {
        Err(BackendError::other("disk on fire"))
    }

    async fn truncate(&self, name: &FileName, size: u64) -> BackendResult<()> {
        self.inner.truncate(name, size).await
    }

    async fn content_size(&self, name: &FileName) -> BackendResult<u64> {
        self.inner.content_size(name).await
    }

    async fn create_folder(&self, name: &FileName) -> BackendResult<()> {
        self.inner.create_folder(name).await
    }

    async fn delete(&self, name: &FileName) -> BackendResult<()> {
        if self.fail_delete.load(Ordering::Relaxed) {
            return Err(BackendError::permission_denied(name.path()));
        }
        self.inner.delete(name).await
    }

    async fn rename(&self, from: &FileName, to: &FileName) -> BackendResult<()> {
        self.inner.rename(from, to).await
    }

    async fn last_modified(&self, name: &FileName) -> BackendResult<SystemTime> {
        self.inner.last_modified(name).await
    }

    async fn attributes(&self, name: &FileName) -> BackendResult<BTreeMap<String, String>> {
        self.inner.attributes(name).await
    }
}

fn failing_fs(fail_delete: bool) -> (Arc<FileSystem>, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let ops = FailingWrites {
        inner: MemoryOps::with_store(store.clone()),
        fail_delete: AtomicBool::new(fail_delete),
    };
    let ctx = ProviderContext {
        files_cache: CachePolicy::Unbounded.build(0),
        strategy: CacheStrategy::OnResolve,
    };
    let root = PathNameParser::new().parse("ram:///").unwrap();
    let fs = Arc::new(FileSystem::new(root, Arc::new(ops), CapabilitySet::all(), &ctx));
    (fs, store)
}

#[tokio::test]
async fn test_failed_write_removes_created_file() {
    let (fs, store) = failing_fs(false);
    let file = fs.resolve_path("/new.txt").unwrap();

    let err = file.content().await.unwrap().write_all(b"data").await.unwrap_err();
    assert_eq!(err.message_key(), "write-content");
    assert!(matches!(err, VfsError::Backend { .. }));
    assert!(!store.exists("/new.txt"));
    assert!(!file.exists().await.unwrap());
}

#[tokio::test]
async fn test_failed_cleanup_still_reports_write_error() {
    let (fs, store) = failing_fs(true);
    let file = fs.resolve_path("/stuck.txt").unwrap();

    let err = file.content().await.unwrap().write_all(b"data").await.unwrap_err();
    assert_eq!(err.message_key(), "write-content");
    // Cleanup was refused, so the empty file stays behind.
    assert_eq!(store.read_file("/stuck.txt"), Some(Vec::new()));
}

#[tokio::test]
async fn test_failed_overwrite_keeps_existing_file() {
    let (fs, store) = failing_fs(false);
    store.write_file("/old.txt", "keep").unwrap();
    let file = fs.resolve_path("/old.txt").unwrap();

    let err = file.content().await.unwrap().write_all(b"new").await.unwrap_err();
    assert_eq!(err.message_key(), "write-content");
    assert!(store.exists("/old.txt"));
}

#[tokio::test]
async fn test_read_only_file_system_refuses_mutation() {
    let manager = FileSystemManager::standard(CachePolicy::Unbounded.build(0), CacheStrategy::OnResolve);
    let options = FileSystemOptions::new().with(READ_ONLY, true);
    let file = manager.resolve_file_with("ram:///ro/file.txt", &options).await.unwrap();
    assert!(!file.file_system().has_capability(Capability::WriteContent));

    let err = file.content().await.unwrap().write_all(b"x").await.unwrap_err();
    assert!(matches!(
        err,
        VfsError::CapabilityMissing { capability: Capability::WriteContent, .. }
    ));
    let err = file.parent().unwrap().unwrap().create_folder().await.unwrap_err();
    assert_eq!(err.message_key(), "capability-missing");
    assert_eq!(file.delete().await.unwrap_err().message_key(), "capability-missing");
}

#[tokio::test]
async fn test_closing_the_object_invalidates_content() {
    let manager = FileSystemManager::standard(CachePolicy::Unbounded.build(0), CacheStrategy::OnResolve);
    let file = manager.resolve_file("ram:///c.txt").await.unwrap();
    let content = file.content().await.unwrap();
    content.write_all(b"abc").await.unwrap();

    file.close();
    assert!(!content.is_open());
    assert!(matches!(content.read_to_end().await, Err(VfsError::ContentClosed(_))));

    let fresh = file.content().await.unwrap();
    assert_eq!(fresh.read_to_end().await.unwrap(), b"abc");
}
