//! Core types shared across beacon components

use k256::{
    elliptic_curve::{sec1::ToEncodedPoint, PrimeField},
    ProjectivePoint, Scalar,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Index of a member within a group. Group sizes never exceed 255 members.
pub type MemberIndex = u8;

/// Chain parameters the node reacts to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Number of blocks the active group has to submit a relay entry
    pub relay_entry_timeout: u64,
    /// Block time of the local chain, in milliseconds
    #[serde(default = "default_block_time_ms")]
    pub block_time_ms: u64,
}

fn default_block_time_ms() -> u64 {
    500
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            relay_entry_timeout: crate::DEFAULT_RELAY_ENTRY_TIMEOUT,
            block_time_ms: default_block_time_ms(),
        }
    }
}

/// Threshold signing capability of one member in one group, produced by DKG
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct ThresholdSigner {
    /// This member's index in the group
    member_index: MemberIndex,

    /// Group public key as published on-chain
    #[zeroize(skip)]
    group_public_key: Vec<u8>,

    /// This member's share of the group private key (big-endian scalar)
    group_private_key_share: [u8; 32],
}

impl ThresholdSigner {
    /// Create a signer from the outcome of a successful DKG run
    pub fn new(member_index: MemberIndex, group_public_key: Vec<u8>, share: &Scalar) -> Self {
        Self {
            member_index,
            group_public_key,
            group_private_key_share: share.to_bytes().into(),
        }
    }

    /// Member index within the group
    pub fn member_index(&self) -> MemberIndex {
        self.member_index
    }

    /// Group public key bytes, used as the registry key
    pub fn group_public_key_bytes(&self) -> &[u8] {
        &self.group_public_key
    }

    /// This member's private key share
    pub fn private_key_share(&self) -> crate::Result<Scalar> {
        Option::<Scalar>::from(Scalar::from_repr(self.group_private_key_share.into()))
            .ok_or_else(|| crate::Error::InvalidKey("private key share out of range".into()))
    }

    /// Compressed public counterpart of this member's key share
    pub fn public_key_share(&self) -> crate::Result<Vec<u8>> {
        let point = ProjectivePoint::GENERATOR * self.private_key_share()?;
        Ok(point.to_affine().to_encoded_point(true).as_bytes().to_vec())
    }
}

impl fmt::Debug for ThresholdSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThresholdSigner")
            .field("member_index", &self.member_index)
            .field("group_public_key", &hex::encode(&self.group_public_key))
            .finish_non_exhaustive()
    }
}
