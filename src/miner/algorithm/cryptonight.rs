// src/miner/algorithm/cryptonight.rs
//! CryptoNight algorithm implementation
//!
//! Provides implementations of the CryptoNight proof-of-work algorithm variants
//! used by Monero and other CryptoNote-based cryptocurrencies:
//! - CryptoNight V7 (variant 1)
//! - CryptoNight R (variant 4)
//!
//! CryptoNight has no seed-derived dataset. Its context is a trivial marker,
//! but it still goes through the same generation lifecycle as RandomX.

use crate::miner::algorithm::{Algorithm, DigestContext, DigestHasher};
use crate::miner::job::Seed;
use crate::types::AlgorithmType;
use crate::utils::error::MinerError;
use cryptonight::cryptonight;
use std::sync::Arc;

/// CryptoNight algorithm implementation
///
/// The struct is lightweight as it only needs to track the variant type;
/// all hashing operations are handled by the underlying cryptonight library.
#[derive(Debug, Clone, Copy)]
pub struct CryptoNightAlgo {
    algorithm: AlgorithmType,
    /// Variant number understood by the cryptonight library
    variant: i32,
}

impl CryptoNightAlgo {
    /// Creates a CryptoNight instance for the given algorithm type
    ///
    /// # Errors
    /// `AlgorithmError` for types that are not CryptoNight variants
    pub fn new(algorithm: AlgorithmType) -> Result<Self, MinerError> {
        let variant = match algorithm {
            AlgorithmType::CryptoNightV7 => 1,
            AlgorithmType::CryptoNightR => 4,
            other => {
                return Err(MinerError::AlgorithmError(format!(
                    "{} is not a CryptoNight variant",
                    other
                )));
            }
        };

        Ok(Self { algorithm, variant })
    }
}

impl Algorithm for CryptoNightAlgo {
    fn build_context(&self, _seed: &Seed) -> Result<Arc<dyn DigestContext>, MinerError> {
        Ok(Arc::new(CryptoNightContext {
            variant: self.variant,
        }))
    }

    fn algorithm_type(&self) -> AlgorithmType {
        self.algorithm
    }
}

struct CryptoNightContext {
    variant: i32,
}

impl DigestContext for CryptoNightContext {
    fn hasher(&self) -> Result<Box<dyn DigestHasher>, MinerError> {
        Ok(Box::new(CryptoNightHasher {
            variant: self.variant,
        }))
    }
}

struct CryptoNightHasher {
    variant: i32,
}

impl DigestHasher for CryptoNightHasher {
    fn digest(&mut self, input: &[u8]) -> Result<[u8; 32], MinerError> {
        let hash = cryptonight(input, input.len(), self.variant);

        hash.as_slice().try_into().map_err(|_| {
            MinerError::WorkerCompute(format!("CryptoNight returned {} bytes", hash.len()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variant_mapping() {
        assert_eq!(
            CryptoNightAlgo::new(AlgorithmType::CryptoNightV7).unwrap().algorithm_type(),
            AlgorithmType::CryptoNightV7
        );
        assert_eq!(
            CryptoNightAlgo::new(AlgorithmType::CryptoNightR).unwrap().algorithm_type(),
            AlgorithmType::CryptoNightR
        );
    }

    #[test]
    fn test_randomx_is_not_a_cryptonight_variant() {
        assert!(matches!(
            CryptoNightAlgo::new(AlgorithmType::RandomX),
            Err(MinerError::AlgorithmError(_))
        ));
    }
}
