//! Content handles.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::SystemTime;

use omnivfs_types::{Capability, FileType};

use crate::error::{BackendError, Operation, VfsError, VfsResult};
use crate::object::FileObject;

/// An open handle on the content of a [`FileObject`].
///
/// While any handle is alive the object reports
/// [`LifecycleState::ContentOpen`](crate::LifecycleState::ContentOpen).
/// Closing the object invalidates the handle; later calls fail with
/// `ContentClosed`.
pub struct FileContent {
    file: Arc<FileObject>,
    generation: u64,
}

impl FileContent {
    pub(crate) fn new(file: Arc<FileObject>, generation: u64) -> Self {
        Self { file, generation }
    }

    pub fn file(&self) -> &Arc<FileObject> {
        &self.file
    }

    /// False once the owning object was closed underneath this handle.
    pub fn is_open(&self) -> bool {
        self.file.generation() == self.generation
    }

    fn ensure_open(&self) -> VfsResult<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(VfsError::ContentClosed(self.file.name().friendly_uri()))
        }
    }

    /// Type check shared by the read side: content only exists for files.
    async fn require_file(&self) -> VfsResult<()> {
        match self.file.get_type().await? {
            FileType::File => Ok(()),
            FileType::Folder => Err(VfsError::not_file(self.file.name())),
            FileType::Imaginary => Err(VfsError::not_found(self.file.name())),
        }
    }

    pub async fn read_to_end(&self) -> VfsResult<Vec<u8>> {
        self.ensure_open()?;
        self.file.check_capability(Capability::ReadContent)?;
        self.require_file().await?;
        let name = self.file.name();
        let ops = self.file.file_system().ops();
        let size = ops
            .content_size(name)
            .await
            .map_err(|e| VfsError::backend(Operation::ContentSize, name, e))?;
        let size = usize::try_from(size).map_err(|_| {
            VfsError::backend(Operation::ReadContent, name, BackendError::other("file too large"))
        })?;
        ops.read(name, 0, size)
            .await
            .map_err(|e| VfsError::backend(Operation::ReadContent, name, e))
    }

    /// Read up to `len` bytes at `offset`.
    pub async fn read_at(&self, offset: u64, len: usize) -> VfsResult<Vec<u8>> {
        self.ensure_open()?;
        self.file.check_capability(Capability::RandomAccessRead)?;
        self.require_file().await?;
        let name = self.file.name();
        self.file
            .file_system()
            .ops()
            .read(name, offset, len)
            .await
            .map_err(|e| VfsError::backend(Operation::ReadContent, name, e))
    }

    /// Replace the content, creating the file (and its parent folders) if needed.
    ///
    /// If the write fails on a file this call created, the file is deleted
    /// again; a failure of that cleanup is logged and the write error returned.
    pub async fn write_all(&self, data: &[u8]) -> VfsResult<()> {
        self.ensure_open()?;
        self.file.check_capability(Capability::WriteContent)?;
        let name = self.file.name();
        let created = match self.file.get_type().await? {
            FileType::File => false,
            FileType::Folder => return Err(VfsError::not_file(name)),
            FileType::Imaginary => {
                self.file.check_capability(Capability::Create)?;
                if let Some(parent) = self.file.parent()? {
                    parent.create_folder().await?;
                }
                true
            }
        };

        let ops = self.file.file_system().ops();
        let written = async {
            ops.truncate(name, 0).await?;
            ops.write(name, 0, data).await
        }
        .await;

        match written {
            Ok(()) if created => {
                self.file.handle_create(FileType::File);
                Ok(())
            }
            Ok(()) => {
                self.file.handle_changed();
                Ok(())
            }
            Err(e) => {
                if created {
                    if let Err(cleanup) = ops.delete(name).await {
                        if !cleanup.is_not_found() {
                            tracing::warn!(
                                file = %name,
                                error = %cleanup,
                                "failed to remove partially written file"
                            );
                        }
                    }
                    self.file.refresh();
                }
                Err(VfsError::backend(Operation::WriteContent, name, e))
            }
        }
    }

    /// Append to the end of the file, creating it if needed.
    pub async fn append(&self, data: &[u8]) -> VfsResult<()> {
        self.ensure_open()?;
        self.file.check_capability(Capability::AppendContent)?;
        let name = self.file.name();
        match self.file.get_type().await? {
            FileType::Imaginary => return self.write_all(data).await,
            FileType::Folder => return Err(VfsError::not_file(name)),
            FileType::File => {}
        }

        let ops = self.file.file_system().ops();
        let end = ops
            .content_size(name)
            .await
            .map_err(|e| VfsError::backend(Operation::ContentSize, name, e))?;
        ops.write(name, end, data)
            .await
            .map_err(|e| VfsError::backend(Operation::WriteContent, name, e))?;
        self.file.handle_changed();
        Ok(())
    }

    /// Overwrite bytes at `offset` of an existing file, extending it as needed.
    pub async fn write_at(&self, offset: u64, data: &[u8]) -> VfsResult<()> {
        self.ensure_open()?;
        self.file.check_capability(Capability::RandomAccessWrite)?;
        self.require_file().await?;
        let name = self.file.name();
        self.file
            .file_system()
            .ops()
            .write(name, offset, data)
            .await
            .map_err(|e| VfsError::backend(Operation::WriteContent, name, e))?;
        self.file.handle_changed();
        Ok(())
    }

    pub async fn size(&self) -> VfsResult<u64> {
        self.ensure_open()?;
        self.require_file().await?;
        let name = self.file.name();
        self.file
            .file_system()
            .ops()
            .content_size(name)
            .await
            .map_err(|e| VfsError::backend(Operation::ContentSize, name, e))
    }

    pub async fn last_modified(&self) -> VfsResult<SystemTime> {
        self.ensure_open()?;
        self.file.check_capability(Capability::GetLastModified)?;
        let name = self.file.name();
        if !self.file.exists().await? {
            return Err(VfsError::not_found(name));
        }
        self.file
            .file_system()
            .ops()
            .last_modified(name)
            .await
            .map_err(|e| VfsError::backend(Operation::GetLastModified, name, e))
    }

    pub async fn set_last_modified(&self, time: SystemTime) -> VfsResult<()> {
        self.ensure_open()?;
        let name = self.file.name();
        let capability = match self.file.get_type().await? {
            FileType::Imaginary => return Err(VfsError::not_found(name)),
            FileType::Folder => Capability::SetLastModifiedFolder,
            FileType::File => Capability::SetLastModifiedFile,
        };
        self.file.check_capability(capability)?;
        self.file
            .file_system()
            .ops()
            .set_last_modified(name, time)
            .await
            .map_err(|e| VfsError::backend(Operation::SetLastModified, name, e))
    }

    pub async fn attributes(&self) -> VfsResult<BTreeMap<String, String>> {
        self.ensure_open()?;
        self.file.check_capability(Capability::Attributes)?;
        let name = self.file.name();
        if !self.file.exists().await? {
            return Err(VfsError::not_found(name));
        }
        self.file
            .file_system()
            .ops()
            .attributes(name)
            .await
            .map_err(|e| VfsError::backend(Operation::GetAttributes, name, e))
    }

    pub async fn set_attribute(&self, key: &str, value: &str) -> VfsResult<()> {
        self.ensure_open()?;
        self.file.check_capability(Capability::Attributes)?;
        let name = self.file.name();
        if !self.file.exists().await? {
            return Err(VfsError::not_found(name));
        }
        self.file
            .file_system()
            .ops()
            .set_attribute(name, key, value)
            .await
            .map_err(|e| VfsError::backend(Operation::SetAttribute, name, e))
    }

    /// Release the handle. Equivalent to dropping it.
    pub fn close(self) {}
}

impl Drop for FileContent {
    fn drop(&mut self) {
        self.file.release_content(self.generation);
    }
}

impl std::fmt::Debug for FileContent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileContent")
            .field("file", self.file.name())
            .field("open", &self.is_open())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CachePolicy;
    use crate::cache::test_support::memory_fs;

    #[tokio::test]
    async fn test_write_read_append() {
        let fs = memory_fs(CachePolicy::Unbounded.build(0));
        let file = fs.resolve_path("/dir/log.txt").unwrap();
        let content = file.content().await.unwrap();

        content.write_all(b"hello").await.unwrap();
        content.append(b" world").await.unwrap();
        assert_eq!(content.read_to_end().await.unwrap(), b"hello world");
        assert_eq!(content.size().await.unwrap(), 11);
        assert_eq!(content.read_at(6, 100).await.unwrap(), b"world");

        content.write_at(0, b"J").await.unwrap();
        assert_eq!(content.read_to_end().await.unwrap(), b"Jello world");

        assert!(fs.resolve_path("/dir").unwrap().is_folder().await.unwrap());
    }

    #[tokio::test]
    async fn test_read_requires_a_file() {
        let fs = memory_fs(CachePolicy::Unbounded.build(0));
        let missing = fs.resolve_path("/missing").unwrap();
        let err = missing.content().await.unwrap().read_to_end().await.unwrap_err();
        assert_eq!(err.message_key(), "not-found");

        let root = fs.root_file().unwrap();
        let err = root.content().await.unwrap().read_to_end().await.unwrap_err();
        assert_eq!(err.message_key(), "not-file");
    }

    #[tokio::test]
    async fn test_attributes_and_timestamps() {
        let fs = memory_fs(CachePolicy::Unbounded.build(0));
        let file = fs.resolve_path("/tagged").unwrap();
        let content = file.content().await.unwrap();
        content.write_all(b"").await.unwrap();

        content.set_attribute("owner", "ops").await.unwrap();
        assert_eq!(
            content.attributes().await.unwrap().get("owner").map(String::as_str),
            Some("ops")
        );

        let when = SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(1_000_000);
        content.set_last_modified(when).await.unwrap();
        assert_eq!(content.last_modified().await.unwrap(), when);
    }
}
