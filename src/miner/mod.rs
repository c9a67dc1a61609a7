// src/miner/mod.rs
//! Core mining functionality
//!
//! This module contains all components related to the mining process:
//! - Algorithm implementations (RandomX, CryptoNight)
//! - Seed-keyed digest contexts and the difficulty comparator
//! - Worker threads, job dispatch and the engine controller

/// Mining algorithm implementations
///
/// Contains implementations of supported mining algorithms:
/// - RandomX (for Monero's current algorithm)
/// - CryptoNight variants (for historical/alternative chains)
pub mod algorithm;

/// Seed-keyed digest context lifecycle
pub mod context;

/// Engine controller thread and its cloneable handle
pub mod controller;

/// Job dispatch, worker pool rebuilds and stale filtering
pub mod dispatcher;

/// Jobs, seeds and shares, plus their wire forms
pub mod job;

/// Compact/full targets and the share check
pub mod target;

/// Worker thread implementation
///
/// Contains the worker thread logic that performs actual hash computations.
/// Workers receive jobs from the dispatcher and report digests and shares.
pub mod worker;

// Re-export main components for cleaner imports
pub use self::algorithm::Algorithm;
pub use self::controller::{Miner, MinerHandle, MinerOptions};
pub use self::dispatcher::Dispatcher;
pub use self::job::{Job, JobMessage, Seed, ShareMessage, ShareSubmission};
pub use self::target::{Target, meets_target};
pub use self::worker::Worker;
