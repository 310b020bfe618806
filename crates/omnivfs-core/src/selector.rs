//! Choosing files during a tree walk.
//!
//! [`FileObject::find_files`](crate::FileObject::find_files) walks a tree
//! from a base file and asks a [`FileSelector`] two things about each file
//! it reaches: whether to descend into it, and whether to include it.
//! `delete_all` and `copy_from` are driven by the same walk.

use std::sync::Arc;

use async_trait::async_trait;
use omnivfs_types::FileType;

use crate::error::VfsResult;
use crate::object::FileObject;

/// Where the walk currently is.
pub struct FileSelectInfo<'a> {
    /// The file the walk started from.
    pub base: &'a Arc<FileObject>,
    /// The file being considered.
    pub file: &'a Arc<FileObject>,
    /// Distance from `base`; the base itself is at depth 0.
    pub depth: usize,
}

#[async_trait]
pub trait FileSelector: Send + Sync {
    /// Should `info.file` be in the result?
    async fn include_file(&self, info: &FileSelectInfo<'_>) -> VfsResult<bool>;

    /// Should the walk descend into the folder `info.file`?
    async fn traverse_descendants(&self, info: &FileSelectInfo<'_>) -> VfsResult<bool>;
}

/// Every file in the tree, the base included.
#[derive(Clone, Copy, Debug, Default)]
pub struct AllFileSelector;

#[async_trait]
impl FileSelector for AllFileSelector {
    async fn include_file(&self, _info: &FileSelectInfo<'_>) -> VfsResult<bool> {
        Ok(true)
    }

    async fn traverse_descendants(&self, _info: &FileSelectInfo<'_>) -> VfsResult<bool> {
        Ok(true)
    }
}

/// Files whose depth lies in `min..=max`. Never descends past `max`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DepthSelector {
    pub min: usize,
    pub max: usize,
}

impl DepthSelector {
    pub const fn new(min: usize, max: usize) -> Self {
        Self { min, max }
    }

    /// Only the base file.
    pub const fn base_only() -> Self {
        Self::new(0, 0)
    }

    /// Direct children of the base.
    pub const fn children() -> Self {
        Self::new(1, 1)
    }

    /// The base and its direct children.
    pub const fn base_and_children() -> Self {
        Self::new(0, 1)
    }

    /// Everything below the base.
    pub const fn descendants() -> Self {
        Self::new(1, usize::MAX)
    }
}

#[async_trait]
impl FileSelector for DepthSelector {
    async fn include_file(&self, info: &FileSelectInfo<'_>) -> VfsResult<bool> {
        Ok((self.min..=self.max).contains(&info.depth))
    }

    async fn traverse_descendants(&self, info: &FileSelectInfo<'_>) -> VfsResult<bool> {
        Ok(info.depth < self.max)
    }
}

/// Files of one type, anywhere in the tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FileTypeSelector(pub FileType);

impl FileTypeSelector {
    pub const fn files() -> Self {
        Self(FileType::File)
    }

    pub const fn folders() -> Self {
        Self(FileType::Folder)
    }
}

#[async_trait]
impl FileSelector for FileTypeSelector {
    async fn include_file(&self, info: &FileSelectInfo<'_>) -> VfsResult<bool> {
        Ok(info.file.get_type().await? == self.0)
    }

    async fn traverse_descendants(&self, _info: &FileSelectInfo<'_>) -> VfsResult<bool> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CachePolicy;
    use crate::cache::test_support::memory_fs;

    #[tokio::test]
    async fn test_depth_selector_bounds() {
        let fs = memory_fs(CachePolicy::Unbounded.build(0));
        let base = fs.root_file().unwrap();
        let selector = DepthSelector::children();

        for (depth, included, descends) in [(0, false, true), (1, true, false), (2, false, false)] {
            let info = FileSelectInfo { base: &base, file: &base, depth };
            assert_eq!(selector.include_file(&info).await.unwrap(), included, "{depth}");
            assert_eq!(selector.traverse_descendants(&info).await.unwrap(), descends, "{depth}");
        }
    }

    #[tokio::test]
    async fn test_type_selector_queries_the_file() {
        let fs = memory_fs(CachePolicy::Unbounded.build(0));
        let base = fs.root_file().unwrap();
        let file = fs.resolve_path("/f").unwrap();
        file.create_file().await.unwrap();

        let info = FileSelectInfo { base: &base, file: &file, depth: 1 };
        assert!(FileTypeSelector::files().include_file(&info).await.unwrap());
        assert!(!FileTypeSelector::folders().include_file(&info).await.unwrap());
    }
}
