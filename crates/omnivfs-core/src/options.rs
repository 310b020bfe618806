//! Per-resolution file system options.
//!
//! Options are passed by reference into each resolution call and become part
//! of the key under which a provider caches its file systems, so the same
//! root opened with different options yields distinct file systems.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::cache::CacheStrategy;

/// Open the file system without write capabilities.
pub const READ_ONLY: &str = "read-only";

/// Override the manager's cache strategy for one file system.
pub const CACHE_STRATEGY: &str = "cache-strategy";

/// A single option value.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Str(s) => f.write_str(s),
        }
    }
}

impl From<bool> for OptionValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for OptionValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<&str> for OptionValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

/// Typed key-value bag handed to providers when a file system is created.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileSystemOptions(BTreeMap<String, OptionValue>);

impl FileSystemOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<OptionValue>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<OptionValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&OptionValue> {
        self.0.get(key)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.0.get(key)? {
            OptionValue::Bool(b) => Some(*b),
            OptionValue::Str(s) => s.parse().ok(),
            OptionValue::Int(i) => Some(*i != 0),
        }
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        match self.0.get(key)? {
            OptionValue::Int(i) => Some(*i),
            OptionValue::Str(s) => s.parse().ok(),
            OptionValue::Bool(_) => None,
        }
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self.0.get(key)? {
            OptionValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Shorthand for the [`READ_ONLY`] flag.
    pub fn read_only(&self) -> bool {
        self.get_bool(READ_ONLY).unwrap_or(false)
    }

    /// The [`CACHE_STRATEGY`] override, if set and valid.
    pub fn cache_strategy(&self) -> Option<CacheStrategy> {
        self.get_str(CACHE_STRATEGY)?.parse().ok()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &OptionValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}
