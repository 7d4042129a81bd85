//! DKG result publication messages

use super::DkgResultHash;
use crate::operator::{self, PrivateKey, PublicKey};
use crate::{MemberIndex, Result};
use serde::{Deserialize, Serialize};

/// Broadcast by a member to declare which result it supports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DkgResultHashSignatureMessage {
    /// Sender member index
    pub sender_index: MemberIndex,
    /// Hash of the result the sender supports
    pub result_hash: DkgResultHash,
    /// Operator signature over the hash, `[R || S || V]`
    pub signature: Vec<u8>,
}

impl DkgResultHashSignatureMessage {
    /// Sign `result_hash` as member `sender_index`
    pub fn sign(
        sender_index: MemberIndex,
        result_hash: DkgResultHash,
        private_key: &PrivateKey,
    ) -> Result<Self> {
        let signature = operator::sign(result_hash.as_bytes(), private_key)?;

        Ok(Self {
            sender_index,
            result_hash,
            signature: signature.to_vec(),
        })
    }

    /// Check the signature against the sender's operator public key
    pub fn verify(&self, public_key: &PublicKey) -> Result<()> {
        operator::verify_signature(public_key, self.result_hash.as_bytes(), &self.signature)
    }
}
