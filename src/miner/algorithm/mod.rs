// src/miner/algorithm/mod.rs
//! Mining algorithm implementations
//!
//! The engine never computes hashes itself. It goes through three layers:
//! - [`Algorithm`] turns a seed into a shared, read-only [`DigestContext`]
//! - a [`DigestContext`] hands each worker its own [`DigestHasher`]
//! - a [`DigestHasher`] maps a message to a 32-byte digest
//!
//! Currently implements:
//! - RandomX (Monero's current algorithm, seeded dataset)
//! - CryptoNight variants (for historical/alternative chains, seed-less)

/// RandomX algorithm implementation
///
/// Requires significant memory allocation for the seed-derived dataset.
pub mod randomx;

/// CryptoNight algorithm implementations
///
/// Contains variants of the original CryptoNight algorithm:
/// - CryptoNightV7 (Monero's 2018-2019 algorithm)
/// - CryptoNightR (Monero's 2019 variant)
pub mod cryptonight;

#[cfg(test)]
pub(crate) mod testing;

use crate::miner::job::Seed;
use crate::types::AlgorithmType;
use crate::utils::error::MinerError;
use std::sync::Arc;

/// Common interface for all mining algorithms
///
/// All mining algorithm implementations must provide these basic operations
/// to be compatible with the context manager.
pub trait Algorithm: Send + Sync {
    /// Build the shared digest context for a seed
    ///
    /// This is the expensive step (dataset generation). It runs once per
    /// seed generation, never per worker.
    ///
    /// # Errors
    /// `MinerError::ContextBuild` when the dataset cannot be allocated
    fn build_context(&self, seed: &Seed) -> Result<Arc<dyn DigestContext>, MinerError>;

    /// Get the algorithm type
    ///
    /// # Returns
    /// The specific algorithm variant being used
    fn algorithm_type(&self) -> AlgorithmType;
}

/// Read-only state shared by every worker of one generation
///
/// Never mutated after construction, so concurrent reads need no locking.
pub trait DigestContext: Send + Sync {
    /// Create a per-worker hashing handle bound to this context
    fn hasher(&self) -> Result<Box<dyn DigestHasher>, MinerError>;
}

/// Per-worker hashing handle
///
/// Owned by exactly one worker thread.
pub trait DigestHasher {
    /// Compute the digest of a full block template (nonce already written)
    ///
    /// # Errors
    /// `MinerError::WorkerCompute` if the backend fails for this input
    fn digest(&mut self, input: &[u8]) -> Result<[u8; 32], MinerError>;
}
