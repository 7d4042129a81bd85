//! DKG result model

use crate::{Error, MemberIndex, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tiny_keccak::{Hasher, Keccak};

const HASH_BYTE_SIZE: usize = 32;

/// Outcome of one distributed key generation run.
///
/// If the run finishes with an acceptable number of inactive or disqualified
/// members, the group formed by the remaining members becomes a signing
/// group of the relay. Otherwise no group is created and the group public
/// key is empty.
///
/// Two results are equal iff both fields match byte for byte. Comparing
/// `Option<&DkgResult>` values treats two absent results as equal and an
/// absent result as different from any present one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DkgResult {
    /// Group public key, empty if the protocol failed
    pub group_public_key: Vec<u8>,
    /// Indices of all inactive or disqualified members, one byte each
    pub misbehaved: Vec<MemberIndex>,
}

impl DkgResult {
    /// Create a result
    pub fn new(group_public_key: Vec<u8>, misbehaved: Vec<MemberIndex>) -> Self {
        Self {
            group_public_key,
            misbehaved,
        }
    }

    /// Whether the run failed to produce a group
    pub fn is_failure(&self) -> bool {
        self.group_public_key.is_empty()
    }
}

/// 256-bit hash of a [`DkgResult`], computed the same way as on-chain
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DkgResultHash([u8; HASH_BYTE_SIZE]);

impl DkgResultHash {
    /// Parse a hash. Requires exactly 32 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let hash: [u8; HASH_BYTE_SIZE] = bytes.try_into().map_err(|_| Error::InvalidLength {
            what: "DKG result hash",
            expected: HASH_BYTE_SIZE,
            actual: bytes.len(),
        })?;
        Ok(Self(hash))
    }

    /// Raw hash bytes
    pub fn as_bytes(&self) -> &[u8; HASH_BYTE_SIZE] {
        &self.0
    }
}

impl From<[u8; HASH_BYTE_SIZE]> for DkgResultHash {
    fn from(bytes: [u8; HASH_BYTE_SIZE]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for DkgResultHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for DkgResultHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DkgResultHash({})", self)
    }
}

/// Computes result hashes.
///
/// Implementations must match the chain's own result hashing bit for bit,
/// otherwise off-chain and on-chain votes never agree.
pub trait DkgResultHasher: Send + Sync {
    /// Hash `result`
    fn hash(&self, result: &DkgResult) -> DkgResultHash;
}

/// keccak-256 over `abi.encode(bytes groupPublicKey, bytes misbehaved)`
#[derive(Debug, Clone, Copy, Default)]
pub struct Keccak256Hasher;

impl DkgResultHasher for Keccak256Hasher {
    fn hash(&self, result: &DkgResult) -> DkgResultHash {
        let encoded = abi_encode_bytes_pair(&result.group_public_key, &result.misbehaved);
        DkgResultHash(keccak256(&encoded))
    }
}

pub(crate) fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    let mut output = [0u8; 32];
    hasher.update(data);
    hasher.finalize(&mut output);
    output
}

/// Ethereum ABI encoding of two dynamic `bytes` values
fn abi_encode_bytes_pair(first: &[u8], second: &[u8]) -> Vec<u8> {
    let first_tail = 32 + padded_len(first.len());
    let mut encoded = Vec::with_capacity(64 + first_tail + 32 + padded_len(second.len()));

    encoded.extend_from_slice(&abi_word(64));
    encoded.extend_from_slice(&abi_word(64 + first_tail));
    append_bytes(&mut encoded, first);
    append_bytes(&mut encoded, second);

    encoded
}

fn append_bytes(encoded: &mut Vec<u8>, value: &[u8]) {
    encoded.extend_from_slice(&abi_word(value.len()));
    encoded.extend_from_slice(value);
    encoded.resize(encoded.len() + padded_len(value.len()) - value.len(), 0);
}

fn abi_word(value: usize) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[24..].copy_from_slice(&(value as u64).to_be_bytes());
    word
}

fn padded_len(len: usize) -> usize {
    len.div_ceil(32) * 32
}

/// Vote count for each competing DKG result
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DkgResultsVotes(HashMap<DkgResultHash, usize>);

impl DkgResultsVotes {
    /// Create an empty tally
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one vote for `hash`, returning the updated count
    pub fn add_vote(&mut self, hash: DkgResultHash) -> usize {
        let count = self.0.entry(hash).or_insert(0);
        *count += 1;
        *count
    }

    /// Votes recorded for `hash`
    pub fn votes(&self, hash: &DkgResultHash) -> usize {
        self.0.get(hash).copied().unwrap_or(0)
    }

    /// Result with strictly the most votes, or `None` if empty or tied
    pub fn leading_result(&self) -> Option<(DkgResultHash, usize)> {
        let mut leader: Option<(DkgResultHash, usize)> = None;
        let mut tied = false;

        for (hash, count) in &self.0 {
            match leader {
                Some((_, best)) if *count < best => {}
                Some((_, best)) if *count == best => tied = true,
                _ => {
                    leader = Some((*hash, *count));
                    tied = false;
                }
            }
        }

        if tied {
            None
        } else {
            leader
        }
    }

    /// Number of distinct results voted on
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no vote has been recorded
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
