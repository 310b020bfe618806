//! File kinds and name-resolution scopes.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// What a name refers to on its backend.
///
/// Carried alongside a [`FileName`](crate::FileName) as a hint; it never takes
/// part in name equality.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    /// Holds content, no children.
    File,
    /// Holds children, no content.
    Folder,
    /// Does not exist (yet).
    Imaginary,
}

impl FileType {
    /// Returns true if this kind can have children.
    pub fn has_children(&self) -> bool {
        matches!(self, FileType::Folder)
    }

    /// Returns true if this kind can have content.
    pub fn has_content(&self) -> bool {
        matches!(self, FileType::File)
    }

    /// Returns true if this kind refers to something that exists.
    pub fn exists(&self) -> bool {
        !matches!(self, FileType::Imaginary)
    }
}

/// How far a relative name may reach from its base.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum NameScope {
    /// Anywhere under the same root.
    FileSystem,
    /// A direct child; the relative name is a single segment.
    Child,
    /// Strictly below the base.
    Descendent,
    /// The base itself or anything below it.
    DescendentOrSelf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_type() {
        assert!(FileType::Folder.has_children());
        assert!(!FileType::File.has_children());
        assert!(FileType::File.has_content());
        assert!(!FileType::Imaginary.exists());
        assert_eq!("FOLDER".parse::<FileType>().unwrap(), FileType::Folder);
    }

    #[test]
    fn test_scope_display() {
        assert_eq!(NameScope::DescendentOrSelf.to_string(), "descendent-or-self");
    }
}
