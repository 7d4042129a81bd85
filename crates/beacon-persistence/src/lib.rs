//! Beacon Persistence
//!
//! Durable storage for node state that has to survive restarts, such as the
//! memberships of signing groups this node belongs to.
//!
//! Records are addressed by a `(directory, name)` pair. A directory groups
//! records that share a lifecycle: when the owner of the records is retired,
//! the whole directory is archived in one step rather than deleted, so that
//! key material is never irrecoverably lost by a cleanup task.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod disk;
pub mod memory;

pub use disk::DiskHandle;
pub use memory::MemoryHandle;

/// Persistence error types
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid record name: {0:?}")]
    InvalidName(String),
    #[error("Directory not found: {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, PersistenceError>;

/// A single persisted record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataDescriptor {
    /// Directory the record belongs to
    pub directory: String,
    /// Record name, unique within the directory
    pub name: String,
    /// Raw record content
    pub content: Vec<u8>,
}

/// Storage handle shared by components persisting their state.
///
/// Implementations must make `save` durable before returning `Ok`; a failed
/// `save` must not leave a partially written record visible to `read_all`.
pub trait Handle: Send + Sync {
    /// Store `data` as record `name` in `directory`, replacing any previous content.
    fn save(&self, data: &[u8], directory: &str, name: &str) -> Result<()>;

    /// Read every record that has not been archived.
    fn read_all(&self) -> Result<Vec<DataDescriptor>>;

    /// Move the whole `directory` out of the live set.
    fn archive(&self, directory: &str) -> Result<()>;
}

/// Reject names that could escape the storage root.
pub(crate) fn validate_name(name: &str) -> Result<()> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.ends_with(disk::TMP_SUFFIX)
    {
        return Err(PersistenceError::InvalidName(name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_name() {
        assert!(validate_name("membership_1").is_ok());
        assert!(validate_name("0a1b2c").is_ok());

        assert!(validate_name("").is_err());
        assert!(validate_name("..").is_err());
        assert!(validate_name("a/b").is_err());
        assert!(validate_name("a\\b").is_err());
        assert!(validate_name("record.tmp").is_err());
    }
}
