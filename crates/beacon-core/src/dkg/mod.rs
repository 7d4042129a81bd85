//! Distributed Key Generation (DKG) result agreement
//!
//! At the end of a DKG run every member computes a [`DkgResult`], hashes it
//! the same way the chain does, and signs the hash with its operator key.
//! Members then vote on-chain for competing result hashes; the result with
//! the majority of votes determines whether a group is created and which
//! members are excluded from it.

mod messages;
mod result;

pub use messages::DkgResultHashSignatureMessage;
pub use result::{DkgResult, DkgResultHash, DkgResultHasher, DkgResultsVotes, Keccak256Hasher};
