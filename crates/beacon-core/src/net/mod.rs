//! Network level identity of a group member
//!
//! Peers learn each other's operator public key during the transport
//! handshake. The peer id is derived from that key, so a node cannot claim
//! an id it has no key for.

use crate::operator::{self, PublicKey};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Transport provider the identity is meant for
pub const PROVIDER_NAME: &str = "libp2p";

/// Multihash prefix: sha2-256 code followed by the digest length
const SHA256_MULTIHASH_PREFIX: [u8; 2] = [0x12, 0x20];

/// Wire form of an identity; carries only the public key
#[derive(Serialize, Deserialize)]
struct IdentityEnvelope {
    #[serde(with = "hex_bytes")]
    pub_key: Vec<u8>,
}

/// Identity of a peer on the broadcast network
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkIdentity {
    public_key: PublicKey,
    peer_id: String,
}

impl NetworkIdentity {
    /// Identity of the holder of `public_key`
    pub fn new(public_key: PublicKey) -> Self {
        let peer_id = peer_id_from_public_key(&public_key);
        Self {
            public_key,
            peer_id,
        }
    }

    /// Operator public key behind this identity
    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    /// Base58 peer id
    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    /// Name of the transport provider
    pub fn provider_name(&self) -> &'static str {
        PROVIDER_NAME
    }

    /// Encode for the handshake
    pub fn marshal(&self) -> Result<Vec<u8>> {
        let envelope = IdentityEnvelope {
            pub_key: operator::public_key_to_bytes(&self.public_key),
        };
        Ok(serde_json::to_vec(&envelope)?)
    }

    /// Decode an identity received in a handshake, re-deriving its peer id
    pub fn unmarshal(bytes: &[u8]) -> Result<Self> {
        let envelope: IdentityEnvelope = serde_json::from_slice(bytes)
            .map_err(|e| Error::Deserialization(format!("unmarshalling failed: {}", e)))?;

        let public_key = operator::public_key_from_bytes(&envelope.pub_key)?;
        Ok(Self::new(public_key))
    }
}

impl fmt::Display for NetworkIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.peer_id)
    }
}

fn peer_id_from_public_key(public_key: &PublicKey) -> String {
    let digest = Sha256::digest(operator::public_key_to_bytes(public_key));

    let mut multihash = Vec::with_capacity(SHA256_MULTIHASH_PREFIX.len() + digest.len());
    multihash.extend_from_slice(&SHA256_MULTIHASH_PREFIX);
    multihash.extend_from_slice(&digest);

    bs58::encode(multihash).into_string()
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}
