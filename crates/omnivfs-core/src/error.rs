//! VFS error types.
//!
//! Backends report [`BackendError`]s; the core wraps them into [`VfsError`]
//! together with the operation key and the offending name.

use std::io;

use omnivfs_types::{Capability, FileName, NameError};
use strum::{Display, IntoStaticStr};
use thiserror::Error;

/// Error reported by a backend primitive.
#[derive(Debug, Error)]
pub enum BackendError {
    /// File or folder not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Path already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Permission denied.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Backend is read-only.
    #[error("file system is read-only")]
    ReadOnly,

    /// Expected a folder.
    #[error("not a folder: {0}")]
    NotADirectory(String),

    /// Expected a file.
    #[error("is a folder: {0}")]
    IsADirectory(String),

    /// Folder not empty.
    #[error("folder not empty: {0}")]
    DirectoryNotEmpty(String),

    /// Path escapes the backend root.
    #[error("path escapes root: {0}")]
    PathEscapesRoot(String),

    /// Invalid path.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// The backend (or the one a junction forwards to) lacks a capability.
    #[error("unsupported: {0}")]
    Unsupported(Capability),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(io::Error),

    /// Remote error whose identifier has no local equivalent.
    #[error("{code}: {message}")]
    Remote { code: String, message: String },

    /// Other error.
    #[error("{0}")]
    Other(String),
}

type RemoteCtor = fn(String) -> BackendError;

/// Known remote error identifiers and the local variant each maps to.
static REMOTE_ERRORS: &[(&str, RemoteCtor)] = &[
    ("ENOENT", BackendError::NotFound),
    ("NotFound", BackendError::NotFound),
    ("FileNotFoundException", BackendError::NotFound),
    ("NoSuchFileException", BackendError::NotFound),
    ("EEXIST", BackendError::AlreadyExists),
    ("AlreadyExists", BackendError::AlreadyExists),
    ("FileAlreadyExistsException", BackendError::AlreadyExists),
    ("EACCES", BackendError::PermissionDenied),
    ("EPERM", BackendError::PermissionDenied),
    ("PermissionDenied", BackendError::PermissionDenied),
    ("AccessDeniedException", BackendError::PermissionDenied),
    ("EROFS", |_| BackendError::ReadOnly),
    ("ReadOnlyFileSystemException", |_| BackendError::ReadOnly),
    ("ENOTDIR", BackendError::NotADirectory),
    ("NotDirectoryException", BackendError::NotADirectory),
    ("EISDIR", BackendError::IsADirectory),
    ("ENOTEMPTY", BackendError::DirectoryNotEmpty),
    ("DirectoryNotEmptyException", BackendError::DirectoryNotEmpty),
    ("EINVAL", BackendError::InvalidPath),
    ("InvalidPathException", BackendError::InvalidPath),
];

impl BackendError {
    /// Create a NotFound error.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    /// Create an AlreadyExists error.
    pub fn already_exists(path: impl Into<String>) -> Self {
        Self::AlreadyExists(path.into())
    }

    /// Create a PermissionDenied error.
    pub fn permission_denied(path: impl Into<String>) -> Self {
        Self::PermissionDenied(path.into())
    }

    /// Create a NotADirectory error.
    pub fn not_a_directory(path: impl Into<String>) -> Self {
        Self::NotADirectory(path.into())
    }

    /// Create an IsADirectory error.
    pub fn is_a_directory(path: impl Into<String>) -> Self {
        Self::IsADirectory(path.into())
    }

    /// Create a DirectoryNotEmpty error.
    pub fn directory_not_empty(path: impl Into<String>) -> Self {
        Self::DirectoryNotEmpty(path.into())
    }

    /// Create a PathEscapesRoot error.
    pub fn path_escapes_root(path: impl Into<String>) -> Self {
        Self::PathEscapesRoot(path.into())
    }

    /// Create an InvalidPath error.
    pub fn invalid_path(path: impl Into<String>) -> Self {
        Self::InvalidPath(path.into())
    }

    /// Create an Other error.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Map an error identifier received from a remote peer onto a local variant.
    ///
    /// Unknown identifiers are kept verbatim in [`BackendError::Remote`].
    pub fn from_remote(identifier: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        match REMOTE_ERRORS.iter().find(|(id, _)| *id == identifier) {
            Some((_, ctor)) => ctor(message),
            None => Self::Remote {
                code: identifier.to_string(),
                message,
            },
        }
    }

    /// Returns true if this reports a missing path.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Io(e) => e.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

impl From<io::Error> for BackendError {
    fn from(e: io::Error) -> Self {
        let msg = e.to_string();
        match e.kind() {
            io::ErrorKind::NotFound => Self::NotFound(msg),
            io::ErrorKind::AlreadyExists => Self::AlreadyExists(msg),
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(msg),
            io::ErrorKind::ReadOnlyFilesystem => Self::ReadOnly,
            io::ErrorKind::NotADirectory => Self::NotADirectory(msg),
            io::ErrorKind::IsADirectory => Self::IsADirectory(msg),
            io::ErrorKind::DirectoryNotEmpty => Self::DirectoryNotEmpty(msg),
            io::ErrorKind::InvalidInput => Self::InvalidPath(msg),
            _ => Self::Io(e),
        }
    }
}

/// Backend result type.
pub type BackendResult<T> = Result<T, BackendError>;

/// The operation a wrapped backend error came from.
///
/// The kebab-case string is the stable message key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, IntoStaticStr)]
#[strum(serialize_all = "kebab-case")]
pub enum Operation {
    GetType,
    ListChildren,
    ReadContent,
    WriteContent,
    ContentSize,
    CreateFile,
    CreateFolder,
    Delete,
    Rename,
    GetLastModified,
    SetLastModified,
    GetAttributes,
    SetAttribute,
    CheckReadable,
    CheckWriteable,
    CheckHidden,
    CreateFileSystem,
}

/// VFS error type.
#[derive(Debug, Error)]
pub enum VfsError {
    /// A URI or relative name could not be parsed or resolved.
    #[error(transparent)]
    Name(#[from] NameError),

    /// No provider is registered for the scheme.
    #[error("unknown scheme: {0}")]
    UnknownScheme(String),

    /// A provider is already registered for the scheme.
    #[error("a provider is already registered for scheme {0}")]
    DuplicateScheme(String),

    /// A junction would nest inside (or contain, or equal) an existing one.
    #[error("junction {mount_point} nests with existing junction {existing}")]
    NestedJunction { mount_point: String, existing: String },

    /// The file system does not declare a capability the operation needs.
    #[error("{capability} is not supported by the file system of {name}")]
    CapabilityMissing { capability: Capability, name: String },

    /// A backend primitive failed.
    #[error("{op} failed for {name}: {source}")]
    Backend {
        op: Operation,
        name: String,
        #[source]
        source: BackendError,
    },

    /// The file does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The file exists but is not a folder.
    #[error("not a folder: {0}")]
    NotFolder(String),

    /// The file exists but is not a file.
    #[error("not a file: {0}")]
    NotFile(String),

    /// The destination already exists.
    #[error("already exists: {0}")]
    FileExists(String),

    /// The content handle was closed, or its file was closed underneath it.
    #[error("content closed: {0}")]
    ContentClosed(String),

    /// The name belongs to another file system.
    #[error("{name} does not belong to file system {root}")]
    NotInFileSystem { name: String, root: String },

    /// The file system was closed.
    #[error("file system closed: {0}")]
    FileSystemClosed(String),

    /// Invalid configuration.
    #[error("config error: {0}")]
    Config(String),
}

impl VfsError {
    /// Wrap a backend failure for `name`.
    ///
    /// A backend that reports a missing capability surfaces as
    /// [`VfsError::CapabilityMissing`].
    pub fn backend(op: Operation, name: &FileName, source: BackendError) -> Self {
        match source {
            BackendError::Unsupported(capability) => Self::CapabilityMissing {
                capability,
                name: name.friendly_uri(),
            },
            source => Self::Backend {
                op,
                name: name.friendly_uri(),
                source,
            },
        }
    }

    /// Create a CapabilityMissing error.
    pub fn capability_missing(capability: Capability, name: &FileName) -> Self {
        Self::CapabilityMissing {
            capability,
            name: name.friendly_uri(),
        }
    }

    /// Create a NotFound error.
    pub fn not_found(name: &FileName) -> Self {
        Self::NotFound(name.friendly_uri())
    }

    /// Create a NotFolder error.
    pub fn not_folder(name: &FileName) -> Self {
        Self::NotFolder(name.friendly_uri())
    }

    /// Create a NotFile error.
    pub fn not_file(name: &FileName) -> Self {
        Self::NotFile(name.friendly_uri())
    }

    /// Stable, machine-readable key for this error.
    pub fn message_key(&self) -> &'static str {
        match self {
            Self::Name(NameError::Malformed { reason, .. }) => reason.into(),
            Self::Name(NameError::InvalidScope { .. }) => "invalid-scope",
            Self::UnknownScheme(_) => "unknown-scheme",
            Self::DuplicateScheme(_) => "duplicate-scheme",
            Self::NestedJunction { .. } => "nested-junction",
            Self::CapabilityMissing { .. } => "capability-missing",
            Self::Backend { op, .. } => op.into(),
            Self::NotFound(_) => "not-found",
            Self::NotFolder(_) => "not-folder",
            Self::NotFile(_) => "not-file",
            Self::FileExists(_) => "file-exists",
            Self::ContentClosed(_) => "content-closed",
            Self::NotInFileSystem { .. } => "not-in-file-system",
            Self::FileSystemClosed(_) => "file-system-closed",
            Self::Config(_) => "config",
        }
    }
}

/// Convert VfsError to std::io::Error for compatibility.
impl From<VfsError> for io::Error {
    fn from(e: VfsError) -> Self {
        match e {
            VfsError::NotFound(msg) => io::Error::new(io::ErrorKind::NotFound, msg),
            VfsError::NotFolder(msg) => io::Error::new(io::ErrorKind::NotADirectory, msg),
            VfsError::NotFile(msg) => io::Error::new(io::ErrorKind::IsADirectory, msg),
            VfsError::FileExists(msg) => io::Error::new(io::ErrorKind::AlreadyExists, msg),
            VfsError::Name(e) => io::Error::new(io::ErrorKind::InvalidInput, e),
            other @ VfsError::CapabilityMissing { .. } => {
                io::Error::new(io::ErrorKind::Unsupported, other.to_string())
            }
            VfsError::Backend {
                source: BackendError::Io(inner),
                ..
            } => inner,
            other => io::Error::other(other.to_string()),
        }
    }
}

/// VFS result type.
pub type VfsResult<T> = Result<T, VfsError>;
