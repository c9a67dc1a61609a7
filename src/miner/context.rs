// src/miner/context.rs
//! Digest context manager
//!
//! Owns the one resident seed generation. Rebuilds only on a byte-level seed
//! change, and always releases the old dataset before allocating the next so
//! two generations are never resident together.

use crate::miner::algorithm::{Algorithm, DigestContext};
use crate::miner::job::Seed;
use crate::utils::error::MinerError;
use std::sync::Arc;
use std::time::Instant;

/// One seed generation of the shared dataset
#[derive(Clone)]
pub struct Generation {
    /// Monotonic generation number, starting at 1
    pub id: u64,
    /// Seed the dataset was derived from
    pub seed: Seed,
    /// Shared read-only context handed to every worker of this generation
    pub context: Arc<dyn DigestContext>,
}

/// Builds and retains digest contexts per seed
pub struct ContextManager {
    algorithm: Arc<dyn Algorithm>,
    current: Option<Generation>,
    last_generation: u64,
    rebuilds: u64,
}

impl ContextManager {
    /// Creates a manager with no resident generation
    pub fn new(algorithm: Arc<dyn Algorithm>) -> Self {
        ContextManager {
            algorithm,
            current: None,
            last_generation: 0,
            rebuilds: 0,
        }
    }

    /// True when `seed` differs from the retained seed, or nothing is resident
    pub fn needs_rebuild(&self, seed: &Seed) -> bool {
        self.current.as_ref().is_none_or(|generation| generation.seed != *seed)
    }

    /// Replaces the resident generation with one built from `seed`
    ///
    /// Callers must have torn down every worker bound to the old generation.
    /// On failure nothing stays resident.
    pub fn rebuild(&mut self, seed: &Seed) -> Result<&Generation, MinerError> {
        self.release();

        log::info!(
            "Building {} context for seed {}",
            self.algorithm.algorithm_type(),
            seed
        );
        let started = Instant::now();
        let context = self.algorithm.build_context(seed)?;

        self.last_generation += 1;
        self.rebuilds += 1;
        log::info!(
            "Context generation {} ready in {:.2}s",
            self.last_generation,
            started.elapsed().as_secs_f64()
        );

        Ok(self.current.insert(Generation {
            id: self.last_generation,
            seed: seed.clone(),
            context,
        }))
    }

    /// Resident generation, if any
    pub fn current(&self) -> Option<&Generation> {
        self.current.as_ref()
    }

    /// Drops the resident generation
    pub fn release(&mut self) {
        if let Some(old) = self.current.take() {
            log::debug!("Releasing context generation {}", old.id);
        }
    }

    /// Number of successful builds so far
    pub fn rebuild_count(&self) -> u64 {
        self.rebuilds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::miner::algorithm::testing::{EchoNonce, FAILING_SEED};

    #[test]
    fn test_rebuild_only_on_seed_change() {
        let algo = EchoNonce::new();
        let mut manager = ContextManager::new(Arc::new(algo.clone()));
        let s1 = Seed::new(vec![1u8; 32]);
        let s2 = Seed::new(vec![2u8; 32]);

        assert!(manager.needs_rebuild(&s1));
        assert_eq!(manager.rebuild(&s1).unwrap().id, 1);
        assert!(!manager.needs_rebuild(&s1));
        assert!(!manager.needs_rebuild(&Seed::new(vec![1u8; 32])));
        assert!(manager.needs_rebuild(&s2));

        assert_eq!(manager.rebuild(&s2).unwrap().id, 2);
        assert_eq!(manager.rebuild_count(), 2);
        assert_eq!(algo.builds(), 2);
    }

    #[test]
    fn test_old_generation_released_before_build() {
        let mut manager = ContextManager::new(Arc::new(EchoNonce::new()));
        manager.rebuild(&Seed::new(vec![1u8; 32])).unwrap();
        let old = Arc::downgrade(&manager.current().unwrap().context);

        manager.rebuild(&Seed::new(vec![2u8; 32])).unwrap();

        assert!(old.upgrade().is_none(), "old context must not outlive the rebuild");
    }

    #[test]
    fn test_failed_build_leaves_nothing_resident() {
        let mut manager = ContextManager::new(Arc::new(EchoNonce::new()));
        manager.rebuild(&Seed::new(vec![1u8; 32])).unwrap();

        let err = manager.rebuild(&Seed::new(FAILING_SEED)).err().unwrap();

        assert!(matches!(err, MinerError::ContextBuild(_)));
        assert!(manager.current().is_none());
        assert_eq!(manager.rebuild_count(), 1);
    }
}
