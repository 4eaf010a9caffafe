//! Named cache generations and the stores that hold them.
//!
//! A generation is a request → response store tied to one deployment. The
//! worker keeps exactly one current generation; older ones are deleted on
//! activate. Entries are addressed by request (method + URL) and are never
//! versioned individually.
//!
//! Two stores are provided:
//! - `MemoryStorage`: process-local maps, for tests and embedders
//! - `DiskStorage`: one directory per generation with JSON metadata files

pub mod disk;
pub mod entry;
pub mod error;
pub mod memory;
pub mod storage;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use disk::{DiskStorage, GenerationStats};
pub use entry::{format_age, CachedData, CachedEntry, VaryCapture};
pub use error::StorageError;
pub use memory::MemoryStorage;
pub use storage::{add_all, CacheStorage};

/// Longest accepted generation name, in bytes.
const MAX_GENERATION_NAME_LEN: usize = 255;

/// Validated cache generation name.
///
/// Names double as directory names in `DiskStorage`, so separators, a
/// leading dot and control characters are rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GenerationName(String);

impl GenerationName {
    pub fn new(name: impl Into<String>) -> Result<Self, StorageError> {
        let name = name.into();
        Self::validate(&name)?;
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub(crate) fn validate(name: &str) -> Result<(), StorageError> {
        let invalid = |reason: &str| Err(StorageError::InvalidName(format!("{:?}: {}", name, reason)));
        if name.is_empty() {
            return invalid("empty");
        }
        if name.len() > MAX_GENERATION_NAME_LEN {
            return invalid("too long");
        }
        if name.starts_with('.') {
            return invalid("leading dot");
        }
        if name.contains(['/', '\\']) {
            return invalid("path separator");
        }
        if name.chars().any(char::is_control) {
            return invalid("control character");
        }
        Ok(())
    }
}

impl TryFrom<String> for GenerationName {
    type Error = StorageError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<GenerationName> for String {
    fn from(name: GenerationName) -> Self {
        name.0
    }
}

impl AsRef<str> for GenerationName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GenerationName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
