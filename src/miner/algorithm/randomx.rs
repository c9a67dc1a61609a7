// src/miner/algorithm/randomx.rs
//! RandomX algorithm implementation
//!
//! Provides the RandomX proof-of-work algorithm implementation used by Monero.
//! This module handles all RandomX-specific mining operations including:
//! - Dataset initialization per seed
//! - Per-worker virtual machines (hashers)
//!
//! The native allocator hands back a null pointer instead of failing loudly,
//! so memory is checked against the host before anything is allocated.

use crate::miner::algorithm::{Algorithm, DigestContext, DigestHasher};
use crate::miner::job::Seed;
use crate::types::AlgorithmType;
use crate::utils::error::MinerError;
use rust_randomx::{Context, Hasher};
use std::sync::Arc;
use sysinfo::System;

const MIB: u64 = 1024 * 1024;

/// Full dataset plus cache held in fast mode
const FAST_DATASET_BYTES: u64 = 2080 * MIB;

/// Cache held in light mode
const LIGHT_CACHE_BYTES: u64 = 256 * MIB;

/// Scratchpad each virtual machine allocates
const SCRATCHPAD_BYTES: u64 = 2 * MIB;

/// RandomX algorithm implementation
///
/// Only holds the mode and the number of virtual machines to budget for;
/// every seed gets its own [`RandomXContext`].
#[derive(Debug, Clone, Copy)]
pub struct RandomX {
    /// Enables fast mode when true (uses more memory but better performance)
    fast: bool,
    /// Worker threads that will each create a hasher on the context
    workers: usize,
}

impl RandomX {
    /// Creates a new RandomX algorithm handle
    ///
    /// # Arguments
    /// * `fast` - Enables fast mode when true (uses more memory but better performance)
    /// * `workers` - Number of worker threads sharing each dataset
    ///
    /// # Performance Notes
    /// - Context building is expensive (dataset generation takes several seconds)
    /// - Fast mode requires ~2080MB RAM vs ~256MB in light mode, plus ~2MB per worker
    pub fn new(fast: bool, workers: usize) -> Self {
        Self { fast, workers }
    }
}

impl Algorithm for RandomX {
    /// Builds the dataset for `seed`
    ///
    /// Fails with `ContextBuild` when the host cannot hold the dataset and
    /// one scratchpad per worker.
    fn build_context(&self, seed: &Seed) -> Result<Arc<dyn DigestContext>, MinerError> {
        check_memory(available_memory(), self.fast, self.workers).map_err(|e| match e {
            MinerError::ContextBuild(reason) => {
                MinerError::ContextBuild(format!("{} (seed {})", reason, seed))
            }
            other => other,
        })?;

        log::debug!(
            "Allocating RandomX {} dataset for seed {}",
            mode_name(self.fast),
            seed
        );
        let context = Context::new(seed.as_bytes(), self.fast);

        Ok(Arc::new(RandomXContext {
            context: Arc::new(context),
        }))
    }

    /// Returns the algorithm type (RandomX)
    fn algorithm_type(&self) -> AlgorithmType {
        AlgorithmType::RandomX
    }
}

/// Bytes needed for one context and `workers` virtual machines
pub fn required_memory(fast: bool, workers: usize) -> u64 {
    let dataset = if fast {
        FAST_DATASET_BYTES
    } else {
        LIGHT_CACHE_BYTES
    };
    dataset.saturating_add(SCRATCHPAD_BYTES.saturating_mul(workers.max(1) as u64))
}

/// Checks that `available` bytes can hold a context for `workers` threads
///
/// # Returns
/// - `Ok(())` if the allocation fits
/// - `Err(MinerError::ContextBuild)` describing the shortfall otherwise
pub fn check_memory(available: u64, fast: bool, workers: usize) -> Result<(), MinerError> {
    let required = required_memory(fast, workers);
    if available < required {
        return Err(MinerError::ContextBuild(format!(
            "RandomX {} mode needs {} MiB for {} workers but only {} MiB is available",
            mode_name(fast),
            required / MIB,
            workers.max(1),
            available / MIB
        )));
    }
    Ok(())
}

fn available_memory() -> u64 {
    let mut system = System::new();
    system.refresh_memory();
    system.available_memory()
}

fn mode_name(fast: bool) -> &'static str {
    if fast { "fast" } else { "light" }
}

/// Shared RandomX dataset for one seed generation
struct RandomXContext {
    /// The memory-intensive component shared across all worker threads
    context: Arc<Context>,
}

impl DigestContext for RandomXContext {
    fn hasher(&self) -> Result<Box<dyn DigestHasher>, MinerError> {
        let available = available_memory();
        if available < SCRATCHPAD_BYTES {
            return Err(MinerError::ContextBuild(format!(
                "no room for a RandomX scratchpad ({} KiB available)",
                available / 1024
            )));
        }

        Ok(Box::new(RandomXHasher {
            hasher: Hasher::new(Arc::clone(&self.context)),
        }))
    }
}

/// Thread-local RandomX virtual machine
struct RandomXHasher {
    hasher: Hasher,
}

impl DigestHasher for RandomXHasher {
    fn digest(&mut self, input: &[u8]) -> Result<[u8; 32], MinerError> {
        let output = self.hasher.hash(input);

        output.as_ref().try_into().map_err(|_| {
            MinerError::WorkerCompute(format!(
                "RandomX returned {} bytes instead of 32",
                output.as_ref().len()
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_memory_covers_dataset_and_scratchpads() {
        assert_eq!(required_memory(true, 4), (2080 + 8) * MIB);
        assert_eq!(required_memory(false, 4), (256 + 8) * MIB);
        // Zero workers still budgets one virtual machine
        assert_eq!(required_memory(false, 0), (256 + 2) * MIB);
    }

    #[test]
    fn test_check_memory_accepts_exact_fit() {
        assert!(check_memory(required_memory(true, 8), true, 8).is_ok());
        assert!(check_memory(u64::MAX, false, 1).is_ok());
    }

    #[test]
    fn test_check_memory_reports_shortfall_as_context_build() {
        let available = required_memory(true, 4) - 1;

        match check_memory(available, true, 4) {
            Err(MinerError::ContextBuild(reason)) => {
                assert!(reason.contains("fast"), "unexpected reason: {}", reason);
                assert!(reason.contains("2088 MiB"), "unexpected reason: {}", reason);
            }
            other => panic!("expected ContextBuild, got {:?}", other),
        }
    }

    #[test]
    fn test_light_mode_fits_where_fast_does_not() {
        let available = 1024 * MIB;

        assert!(check_memory(available, false, 16).is_ok());
        assert!(matches!(
            check_memory(available, true, 16),
            Err(MinerError::ContextBuild(_))
        ));
    }
}
