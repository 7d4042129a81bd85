//! Operator static key
//!
//! The operator key is tied to an on-chain stake. It authenticates the node
//! to its peers and makes its protocol messages attributable.

use crate::{Error, Result};
use k256::ecdsa::{signature::hazmat::PrehashVerifier, Signature, SigningKey, VerifyingKey};
use rand::{CryptoRng, RngCore};

/// Operator private key on secp256k1
pub type PrivateKey = SigningKey;

/// Operator public key on secp256k1
pub type PublicKey = VerifyingKey;

/// Length of a `[R || S || V]` signature
pub const SIGNATURE_LENGTH: usize = 65;

const HASH_LENGTH: usize = 32;

/// Generate a new random operator key pair
pub fn generate_key_pair<R: RngCore + CryptoRng>(rng: &mut R) -> (PrivateKey, PublicKey) {
    let private_key = SigningKey::random(rng);
    let public_key = *private_key.verifying_key();
    (private_key, public_key)
}

/// Restore a private key from its 32-byte big-endian scalar
pub fn private_key_from_bytes(bytes: &[u8]) -> Result<PrivateKey> {
    SigningKey::from_slice(bytes).map_err(|e| Error::InvalidKey(e.to_string()))
}

/// Parse a compressed or uncompressed SEC1 public key
pub fn public_key_from_bytes(bytes: &[u8]) -> Result<PublicKey> {
    VerifyingKey::from_sec1_bytes(bytes).map_err(|e| Error::InvalidKey(e.to_string()))
}

/// Compressed SEC1 encoding of `public_key`
pub fn public_key_to_bytes(public_key: &PublicKey) -> Vec<u8> {
    public_key.to_encoded_point(true).as_bytes().to_vec()
}

/// Sign a 32-byte hash.
///
/// Signing raw attacker-chosen values can leak information about the key, so
/// callers must only pass digests of their messages. The produced signature
/// is in the `[R || S || V]` format where `V` is 0 or 1.
pub fn sign(hash: &[u8], private_key: &PrivateKey) -> Result<[u8; SIGNATURE_LENGTH]> {
    if hash.len() != HASH_LENGTH {
        return Err(Error::InvalidLength {
            what: "hash",
            expected: HASH_LENGTH,
            actual: hash.len(),
        });
    }

    let (signature, recovery_id) = private_key
        .sign_prehash_recoverable(hash)
        .map_err(|e| Error::Crypto(e.to_string()))?;

    let mut bytes = [0u8; SIGNATURE_LENGTH];
    bytes[..64].copy_from_slice(&signature.to_bytes());
    bytes[64] = recovery_id.to_byte();
    Ok(bytes)
}

/// Check that `signature` over `hash` was produced by `public_key`.
///
/// Accepts `[R || S]` and `[R || S || V]` signatures; the recovery byte is
/// ignored.
pub fn verify_signature(public_key: &PublicKey, hash: &[u8], signature: &[u8]) -> Result<()> {
    let signature = match signature.len() {
        SIGNATURE_LENGTH => &signature[..SIGNATURE_LENGTH - 1],
        _ => signature,
    };

    if signature.len() != SIGNATURE_LENGTH - 1 {
        return Err(Error::MalformedSignature {
            signature: hex::encode(signature),
            length: signature.len(),
        });
    }

    let signature = Signature::from_slice(signature).map_err(|_| Error::InvalidSignature)?;

    public_key
        .verify_prehash(hash, &signature)
        .map_err(|_| Error::InvalidSignature)
}
