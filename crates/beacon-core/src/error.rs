//! Error types for beacon node operations

use crate::MemberIndex;
use thiserror::Error;

/// Result type alias for beacon node operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in beacon node components
#[derive(Debug, Error)]
pub enum Error {
    /// Input has the wrong byte length
    #[error("Invalid length for {what}: expected {expected}, got {actual}")]
    InvalidLength {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Signature is neither 64 nor 65 bytes long
    #[error("Malformed signature {signature} with length {length}")]
    MalformedSignature { signature: String, length: usize },

    /// Signature did not validate against the public key
    #[error("Failed to verify signature")]
    InvalidSignature,

    /// Invalid key material
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Cryptographic operation failed
    #[error("Cryptographic error: {0}")]
    Crypto(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization error
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Durable storage failed
    #[error("Persistence error: {0}")]
    Persistence(#[from] beacon_persistence::PersistenceError),

    /// Chain interaction failed
    #[error("Chain error: {0}")]
    Chain(String),

    /// Block counter failed or was disconnected
    #[error("Block counter error: {0}")]
    BlockCounter(String),

    /// Member already holds a different membership in this group
    #[error("Member {member_index} is already registered in group {group_public_key}")]
    DuplicateMembership {
        group_public_key: String,
        member_index: MemberIndex,
    },

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
