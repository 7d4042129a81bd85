//! Pedersen commitment scheme
//!
//! Lets a DKG participant commit to a secret value before revealing it, so
//! it cannot adapt the value after seeing what other participants sent.
//! The scheme is computationally binding and perfectly hiding under the
//! discrete log assumption in the order-q subgroup of `Z_p*`.
//!
//! Reference: T. P. Pedersen, "Non-Interactive and Information-Theoretic
//! Secure Verifiable Secret Sharing", CRYPTO '91.

mod params;

pub use params::Parameters;

use crate::Result;
use num_bigint::BigUint;
use rand::{rngs::OsRng, CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use tracing::debug;

/// Commitment to a secret message, safe to broadcast immediately.
///
/// The value is `(g^digest mod p) * (h^r mod p)` where the outer product is
/// not reduced modulo `p`, so it may be up to twice the bit length of `p`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commitment {
    commitment: BigUint,
}

/// Randomness needed to open a commitment. Keep it secret until the reveal phase.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecommitmentKey {
    r: BigUint,
}

impl fmt::Debug for DecommitmentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DecommitmentKey(..)")
    }
}

/// Commit to `secret` under `parameters`.
pub fn generate(parameters: &Parameters, secret: &[u8]) -> Result<(Commitment, DecommitmentKey)> {
    generate_with_rng(parameters, secret, &mut OsRng)
}

/// Commit to `secret` using randomness from `rng`.
pub fn generate_with_rng<R: RngCore + CryptoRng>(
    parameters: &Parameters,
    secret: &[u8],
    rng: &mut R,
) -> Result<(Commitment, DecommitmentKey)> {
    let r = params::random_below(parameters.q(), rng)
        .map_err(|e| crate::Error::Crypto(format!("r generation failed: {e}")))?;

    let digest = calculate_digest(secret, parameters.q());
    let commitment = calculate_commitment(parameters, &digest, &r);

    debug!(bits = commitment.bits(), "Commitment generated");

    Ok((Commitment { commitment }, DecommitmentKey { r }))
}

impl Commitment {
    /// Check the revealed `secret` and decommitment key against this commitment.
    pub fn verify(
        &self,
        parameters: &Parameters,
        decommitment_key: &DecommitmentKey,
        secret: &[u8],
    ) -> bool {
        let digest = calculate_digest(secret, parameters.q());
        let expected = calculate_commitment(parameters, &digest, &decommitment_key.r);
        expected == self.commitment
    }

    /// Big-endian encoding of the commitment value
    pub fn to_bytes_be(&self) -> Vec<u8> {
        self.commitment.to_bytes_be()
    }
}

/// `SHA-256(secret) mod q`
fn calculate_digest(secret: &[u8], q: &BigUint) -> BigUint {
    let hash = Sha256::digest(secret);
    BigUint::from_bytes_be(&hash) % q
}

/// `((g ^ digest) % p) * ((h ^ r) % p)`
fn calculate_commitment(parameters: &Parameters, digest: &BigUint, r: &BigUint) -> BigUint {
    let p = parameters.p();
    parameters.g().modpow(digest, p) * parameters.h().modpow(r, p)
}
