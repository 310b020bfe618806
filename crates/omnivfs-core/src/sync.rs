//! Serialized access to a file.
//!
//! [`FileObject`] and [`FileContent`](crate::FileContent) make no promise
//! about interleaving between concurrent callers. Callers that need one
//! wrap the file in a [`SynchronizedFile`], which implements the same
//! [`FileAccess`] surface and runs every call under a single async mutex.

use std::sync::Arc;

use async_trait::async_trait;
use omnivfs_types::{FileName, FileType};

use crate::error::VfsResult;
use crate::object::FileObject;

/// The file operations shared by plain and decorated handles.
#[async_trait]
pub trait FileAccess: Send + Sync {
    fn name(&self) -> &FileName;

    async fn get_type(&self) -> VfsResult<FileType>;

    async fn exists(&self) -> VfsResult<bool>;

    async fn children(&self) -> VfsResult<Vec<Arc<FileObject>>>;

    async fn create_folder(&self) -> VfsResult<()>;

    async fn create_file(&self) -> VfsResult<()>;

    async fn delete(&self) -> VfsResult<bool>;

    async fn refresh(&self);

    async fn read_all(&self) -> VfsResult<Vec<u8>>;

    async fn write_all(&self, data: &[u8]) -> VfsResult<()>;

    async fn append(&self, data: &[u8]) -> VfsResult<()>;

    async fn size(&self) -> VfsResult<u64>;
}

#[async_trait]
impl FileAccess for Arc<FileObject> {
    fn name(&self) -> &FileName {
        FileObject::name(self)
    }

    async fn get_type(&self) -> VfsResult<FileType> {
        FileObject::get_type(self).await
    }

    async fn exists(&self) -> VfsResult<bool> {
        FileObject::exists(self).await
    }

    async fn children(&self) -> VfsResult<Vec<Arc<FileObject>>> {
        FileObject::children(self).await
    }

    async fn create_folder(&self) -> VfsResult<()> {
        FileObject::create_folder(self).await
    }

    async fn create_file(&self) -> VfsResult<()> {
        FileObject::create_file(self).await
    }

    async fn delete(&self) -> VfsResult<bool> {
        FileObject::delete(self).await
    }

    async fn refresh(&self) {
        FileObject::refresh(self);
    }

    async fn read_all(&self) -> VfsResult<Vec<u8>> {
        self.content().await?.read_to_end().await
    }

    async fn write_all(&self, data: &[u8]) -> VfsResult<()> {
        self.content().await?.write_all(data).await
    }

    async fn append(&self, data: &[u8]) -> VfsResult<()> {
        self.content().await?.append(data).await
    }

    async fn size(&self) -> VfsResult<u64> {
        self.content().await?.size().await
    }
}

/// Runs every [`FileAccess`] call on `F` under one lock.
pub struct SynchronizedFile<F> {
    inner: F,
    lock: tokio::sync::Mutex<()>,
}

impl<F: FileAccess> SynchronizedFile<F> {
    pub fn new(inner: F) -> Self {
        Self {
            inner,
            lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn into_inner(self) -> F {
        self.inner
    }
}

#[async_trait]
impl<F: FileAccess> FileAccess for SynchronizedFile<F> {
    fn name(&self) -> &FileName {
        self.inner.name()
    }

    async fn get_type(&self) -> VfsResult<FileType> {
        let _guard = self.lock.lock().await;
        self.inner.get_type().await
    }

    async fn exists(&self) -> VfsResult<bool> {
        let _guard = self.lock.lock().await;
        self.inner.exists().await
    }

    async fn children(&self) -> VfsResult<Vec<Arc<FileObject>>> {
        let _guard = self.lock.lock().await;
        self.inner.children().await
    }

    async fn create_folder(&self) -> VfsResult<()> {
        let _guard = self.lock.lock().await;
        self.inner.create_folder().await
    }

    async fn create_file(&self) -> VfsResult<()> {
        let _guard = self.lock.lock().await;
        self.inner.create_file().await
    }

    async fn delete(&self) -> VfsResult<bool> {
        let _guard = self.lock.lock().await;
        self.inner.delete().await
    }

    async fn refresh(&self) {
        let _guard = self.lock.lock().await;
        self.inner.refresh().await;
    }

    async fn read_all(&self) -> VfsResult<Vec<u8>> {
        let _guard = self.lock.lock().await;
        self.inner.read_all().await
    }

    async fn write_all(&self, data: &[u8]) -> VfsResult<()> {
        let _guard = self.lock.lock().await;
        self.inner.write_all(data).await
    }

    async fn append(&self, data: &[u8]) -> VfsResult<()> {
        let _guard = self.lock.lock().await;
        self.inner.append(data).await
    }

    async fn size(&self) -> VfsResult<u64> {
        let _guard = self.lock.lock().await;
        self.inner.size().await
    }
}
