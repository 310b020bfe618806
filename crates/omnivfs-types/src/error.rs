//! Name parsing and resolution errors.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};
use thiserror::Error;

use crate::file_type::NameScope;

/// Why a URI was rejected by a [`NameParser`](crate::NameParser).
///
/// The kebab-case string form is the stable message key surfaced to callers.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, IntoStaticStr,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum MalformedReason {
    /// No `scheme:` prefix could be found.
    MissingScheme,
    /// The scheme was not followed by `//`.
    MissingDoubleSlashes,
    /// The authority has no host (including an empty `[]`).
    MissingHostname,
    /// A `:` was not followed by port digits.
    MissingPort,
    /// The port digits do not fit a port number.
    InvalidPort,
    /// Something other than `/` or end-of-input follows the authority.
    MissingHostnamePathSep,
    /// A `[` opened an IPv6 literal that never closed.
    UnterminatedIpv6Hostname,
    /// An authority was given to a scheme that has none.
    UnexpectedAuthority,
    /// A `%` escape is truncated, not hex, or decodes to invalid UTF-8.
    InvalidEscapeSequence,
    /// A path climbs above the root or is not absolute where it must be.
    InvalidRelativePath,
}

/// Errors produced while building [`FileName`](crate::FileName)s.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NameError {
    /// The URI is structurally invalid.
    #[error("malformed uri ({reason}): {uri}")]
    Malformed { uri: String, reason: MalformedReason },

    /// A relative name escaped the scope it was resolved under.
    #[error("{name} is not in {scope} scope of {base}")]
    InvalidScope {
        base: String,
        name: String,
        scope: NameScope,
    },
}

impl NameError {
    /// Create a Malformed error.
    pub fn malformed(uri: impl Into<String>, reason: MalformedReason) -> Self {
        Self::Malformed {
            uri: uri.into(),
            reason,
        }
    }

    /// Create an InvalidScope error.
    pub fn invalid_scope(base: impl Into<String>, name: impl Into<String>, scope: NameScope) -> Self {
        Self::InvalidScope {
            base: base.into(),
            name: name.into(),
            scope,
        }
    }

    /// The malformed reason, if this is a parse failure.
    pub fn reason(&self) -> Option<MalformedReason> {
        match self {
            Self::Malformed { reason, .. } => Some(*reason),
            Self::InvalidScope { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_reason_keys_are_kebab_case() {
        assert_eq!(MalformedReason::MissingDoubleSlashes.to_string(), "missing-double-slashes");
        assert_eq!(
            MalformedReason::UnterminatedIpv6Hostname.to_string(),
            "unterminated-ipv6-hostname"
        );
        assert_eq!(
            MalformedReason::from_str("missing-hostname-path-sep").unwrap(),
            MalformedReason::MissingHostnamePathSep
        );
    }

    #[test]
    fn test_error_message_carries_reason() {
        let err = NameError::malformed("ftp:a", MalformedReason::MissingDoubleSlashes);
        assert_eq!(err.reason(), Some(MalformedReason::MissingDoubleSlashes));
        assert!(err.to_string().contains("missing-double-slashes"));
        assert!(err.to_string().contains("ftp:a"));
    }
}
