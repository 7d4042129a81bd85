//! Scheme parameters

use crate::{Error, Result};
use num_bigint::BigUint;
use num_traits::{One, Zero};
use rand::{rngs::OsRng, CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// 4096-bit safe prime `p = 2q + 1`
const P_HEX: &str = "c8526644a9c4739683742b7003640b2023ca42cc018a42b02a551bb825c6828f86e2e216ea5d31004c433582a3fa720459efb42e091d73fb281810e1825691f0799811be62ae57f62ab00670edd35426d108d3b9c4fd008eddc67275a0489fe132e4c31bd7069ea7884cbb8f8f9255fe7b87fc0099f246776c340912df48f7945bc2bc0bc6814978d27b7af2ebc41f458ae795186db0fd7e6151bb8a7fe2b41370f7a2848ef75d3ec88f3439022c10e78b434c2f24b2f40bd02930e6c8aadef87b0dc87cdba07dcfa86884a168bd1381a4f48be12e5d98e41f954c37aec011cc683570e8890418756ed98ace8c8e59ae1df50962c1622fe66b5409f330cad6b7c68f2e884786d9807190b89ac4a3b3507e49b2dd3f33d765ad29e2015180c8cd0258dd8bdaab17be5d74871fec04c492240c6a2692b2c9a62c9adbaac34a333f135801ff948e8dfb6bbd6212a67950fb8edd628d05d19d1b94e9be7c52ed484831d50adaa29e71de197e351878f1c40ec67ee809e824124529e27bd5ecf3054f6784153f7db27ff0c87420bb2b2754ed363fc2ba8399d49d291f342173e7619183467a9694efa243e1d41b26c13b38ca0f43bb7c9050eb966461f28436583a9d13d2c1465b78184eae360f009505ccea288a053d111988d55c12befd882a857a530efac2c0592987cd83c39844a10e058739ab1c39006a3123e7fc887845675f";

/// 4095-bit Sophie Germain prime `q`
const Q_HEX: &str = "6429332254e239cb41ba15b801b2059011e5216600c52158152a8ddc12e34147c371710b752e988026219ac151fd39022cf7da17048eb9fd940c0870c12b48f83ccc08df31572bfb1558033876e9aa13688469dce27e80476ee3393ad0244ff09972618deb834f53c4265dc7c7c92aff3dc3fe004cf9233bb61a04896fa47bca2de15e05e340a4bc693dbd7975e20fa2c573ca8c36d87ebf30a8ddc53ff15a09b87bd142477bae9f64479a1c81160873c5a1a61792597a05e814987364556f7c3d86e43e6dd03ee7d4344250b45e89c0d27a45f0972ecc720fcaa61bd76008e6341ab87444820c3ab76cc56746472cd70efa84b160b117f335aa04f998656b5be347974423c36cc038c85c4d6251d9a83f24d96e9f99ebb2d694f100a8c06466812c6ec5ed558bdf2eba438ff602624912063513495964d3164d6dd561a5199f89ac00ffca4746fdb5deb109533ca87dc76eb14682e8ce8dca74df3e2976a42418ea856d514f38ef0cbf1a8c3c78e207633f7404f412092294f13deaf67982a7b3c20a9fbed93ff8643a105d9593aa769b1fe15d41ccea4e948f9a10b9f3b0c8c1a33d4b4a77d121f0ea0d93609d9c6507a1ddbe482875cb3230f9421b2c1d4e89e960a32dbc0c27571b07804a82e6751445029e888cc46aae095f7ec41542bd29877d61602c94c3e6c1e1cc22508702c39cd58e1c80351891f3fe443c22b3af";

/// Parameters of one commitment scheme instance
///
/// `g` and `h` generate the subgroup of quadratic residues mod `p`, which has
/// prime order `q`. Nobody may know `log_g(h)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameters {
    p: BigUint,
    q: BigUint,
    g: BigUint,
    h: BigUint,
}

impl Parameters {
    /// Generate fresh parameters using the OS entropy source.
    ///
    /// The party calling this learns nothing about `log_g(h)` only if it
    /// discards the sampled roots. A committer that generates its own `g`
    /// and `h` could know the relation and break hiding; see `from_parts`
    /// for adopting parameters generated elsewhere.
    pub fn generate() -> Result<Self> {
        Self::generate_with_rng(&mut OsRng)
    }

    /// Generate fresh parameters from the given entropy source
    pub fn generate_with_rng<R: RngCore + CryptoRng>(rng: &mut R) -> Result<Self> {
        let (p, q) = fixed_primes()?;

        let g = random_quadratic_residue(&p, rng)
            .map_err(|e| Error::Crypto(format!("g generation failed: {e}")))?;
        let h = random_quadratic_residue(&p, rng)
            .map_err(|e| Error::Crypto(format!("h generation failed: {e}")))?;

        debug!(p_bits = p.bits(), q_bits = q.bits(), "Commitment parameters generated");

        Ok(Self { p, q, g, h })
    }

    /// Adopt generators produced by another party over the fixed primes
    pub fn from_parts(g: BigUint, h: BigUint) -> Result<Self> {
        let (p, q) = fixed_primes()?;

        for (name, value) in [("g", &g), ("h", &h)] {
            if !is_subgroup_generator(value, &p, &q) {
                return Err(Error::Crypto(format!(
                    "{name} is not a generator of the order-q subgroup"
                )));
            }
        }

        Ok(Self { p, q, g, h })
    }

    /// Safe prime modulus
    pub fn p(&self) -> &BigUint {
        &self.p
    }

    /// Order of the commitment subgroup
    pub fn q(&self) -> &BigUint {
        &self.q
    }

    /// First generator
    pub fn g(&self) -> &BigUint {
        &self.g
    }

    /// Second generator
    pub fn h(&self) -> &BigUint {
        &self.h
    }
}

/// Parse the embedded primes and check `p = 2q + 1`.
fn fixed_primes() -> Result<(BigUint, BigUint)> {
    let p = BigUint::parse_bytes(P_HEX.as_bytes(), 16)
        .ok_or_else(|| Error::Crypto("converting p failed".into()))?;
    let q = BigUint::parse_bytes(Q_HEX.as_bytes(), 16)
        .ok_or_else(|| Error::Crypto("converting q failed".into()))?;

    if q.clone() * 2u32 + 1u32 != p {
        return Err(Error::Crypto("p is not equal to 2q + 1".into()));
    }

    Ok((p, q))
}

/// Square a random element of `(0, p)`, landing in the order-q subgroup.
fn random_quadratic_residue<R: RngCore + CryptoRng>(p: &BigUint, rng: &mut R) -> Result<BigUint> {
    loop {
        let x = random_below(p, rng)?;
        let residue = x.modpow(&BigUint::from(2u32), p);
        // x = 1 and x = p - 1 square to the identity
        if !residue.is_one() {
            return Ok(residue);
        }
    }
}

fn is_subgroup_generator(value: &BigUint, p: &BigUint, q: &BigUint) -> bool {
    !value.is_zero() && !value.is_one() && value < p && value.modpow(q, p).is_one()
}

/// Sample uniformly from `(0, bound)`.
///
/// Uses `try_fill_bytes` so an exhausted entropy source surfaces as an error
/// instead of a panic.
pub(crate) fn random_below<R: RngCore + CryptoRng>(bound: &BigUint, rng: &mut R) -> Result<BigUint> {
    let bits = bound.bits();
    if bits < 2 {
        return Err(Error::Crypto(format!("bound {bound} is too small")));
    }

    let len = ((bits + 7) / 8) as usize;
    let excess_bits = (len as u64) * 8 - bits;
    let mut buf = vec![0u8; len];

    loop {
        rng.try_fill_bytes(&mut buf)
            .map_err(|e| Error::Crypto(format!("failed to generate random number: {e}")))?;
        buf[0] &= 0xff >> excess_bits;

        let candidate = BigUint::from_bytes_be(&buf);
        if !candidate.is_zero() && &candidate < bound {
            return Ok(candidate);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Error as RandError;

    /// Entropy source that always fails
    struct ExhaustedRng;

    impl RngCore for ExhaustedRng {
        fn next_u32(&mut self) -> u32 {
            0
        }

        fn next_u64(&mut self) -> u64 {
            0
        }

        fn fill_bytes(&mut self, dest: &mut [u8]) {
            dest.fill(0);
        }

        fn try_fill_bytes(&mut self, _dest: &mut [u8]) -> std::result::Result<(), RandError> {
            Err(RandError::new("entropy exhausted"))
        }
    }

    impl CryptoRng for ExhaustedRng {}

    #[test]
    fn test_fixed_primes() {
        let (p, q) = fixed_primes().unwrap();
        assert_eq!(p.bits(), 4096);
        assert_eq!(q.bits(), 4095);
    }

    #[test]
    fn test_generators_in_subgroup() {
        let params = Parameters::generate().unwrap();

        assert!(is_subgroup_generator(params.g(), params.p(), params.q()));
        assert!(is_subgroup_generator(params.h(), params.p(), params.q()));
        assert_ne!(params.g(), params.h());
    }

    #[test]
    fn test_from_parts() {
        let params = Parameters::generate().unwrap();

        let adopted = Parameters::from_parts(params.g().clone(), params.h().clone()).unwrap();
        assert_eq!(adopted, params);

        // 1 generates the trivial subgroup only
        assert!(Parameters::from_parts(BigUint::one(), params.h().clone()).is_err());
        // p - 1 is not a quadratic residue
        let p_minus_one = params.p().clone() - 1u32;
        assert!(Parameters::from_parts(params.g().clone(), p_minus_one).is_err());
    }

    #[test]
    fn test_exhausted_entropy() {
        let err = Parameters::generate_with_rng(&mut ExhaustedRng).unwrap_err();
        assert!(err.to_string().contains("g generation failed"));
    }

    #[test]
    fn test_random_below_range() {
        let bound = BigUint::from(5u32);
        for _ in 0..200 {
            let x = random_below(&bound, &mut OsRng).unwrap();
            assert!(!x.is_zero());
            assert!(x < bound);
        }
    }
}
