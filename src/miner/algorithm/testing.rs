// src/miner/algorithm/testing.rs
//! Deterministic backend for engine tests
//!
//! The digest echoes the nonce field into its first four bytes and is zero
//! elsewhere, so with a difficulty-1 target every nonce qualifies and the
//! share itself proves where the nonce was written.

use crate::miner::algorithm::{Algorithm, DigestContext, DigestHasher};
use crate::miner::job::{MIN_BLOB_LEN, NONCE_OFFSET, Seed};
use crate::types::AlgorithmType;
use crate::utils::error::MinerError;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Seed that makes `build_context` fail
pub(crate) const FAILING_SEED: &[u8] = b"out-of-memory";

#[derive(Clone)]
pub(crate) struct EchoNonce {
    builds: Arc<AtomicU64>,
    failures: Arc<AtomicU64>,
    hash_time: Duration,
}

impl EchoNonce {
    pub(crate) fn new() -> Self {
        Self {
            builds: Arc::new(AtomicU64::new(0)),
            failures: Arc::new(AtomicU64::new(0)),
            hash_time: Duration::from_millis(1),
        }
    }

    /// Makes the next `count` digest calls fail, across all hashers
    pub(crate) fn failing_digests(self, count: u64) -> Self {
        self.failures.store(count, Ordering::SeqCst);
        self
    }

    pub(crate) fn builds(&self) -> u64 {
        self.builds.load(Ordering::SeqCst)
    }
}

impl Algorithm for EchoNonce {
    fn build_context(&self, seed: &Seed) -> Result<Arc<dyn DigestContext>, MinerError> {
        if seed.as_bytes() == FAILING_SEED {
            return Err(MinerError::ContextBuild("test allocation failure".into()));
        }
        self.builds.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(self.clone()))
    }

    fn algorithm_type(&self) -> AlgorithmType {
        AlgorithmType::RandomX
    }
}

impl DigestContext for EchoNonce {
    fn hasher(&self) -> Result<Box<dyn DigestHasher>, MinerError> {
        Ok(Box::new(self.clone()))
    }
}

impl DigestHasher for EchoNonce {
    fn digest(&mut self, input: &[u8]) -> Result<[u8; 32], MinerError> {
        std::thread::sleep(self.hash_time);

        let failed = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failed {
            return Err(MinerError::WorkerCompute("injected failure".into()));
        }

        let mut digest = [0u8; 32];
        digest[..4].copy_from_slice(&input[NONCE_OFFSET..MIN_BLOB_LEN]);
        Ok(digest)
    }
}
