//! XMR dispatch - proof-of-work worker pool and job dispatch engine
//!
//! This crate drives a pool of hashing threads for Monero-style pool mining:
//! - Seed-keyed digest contexts shared read-only by every worker
//! - Compact and full difficulty targets
//! - Job dispatch with worker pool rebuilds on seed changes
//! - Stale-share suppression across job and generation switches
//! - Windowed hashrate and share statistics
//! - A WebSocket stratum pool client

#![warn(missing_docs)]
#![forbid(unsafe_code)]

/// Miner core: algorithms, contexts, workers, dispatcher and controller
pub mod miner;

/// Network communication components for pool connections
pub mod network;

/// Statistics collection and lifecycle tracking
pub mod stats;

/// Utility functions and error handling
pub mod utils;

/// Command-line interface definitions
pub mod cli;

/// Configuration management
pub mod config;

/// Shared type definitions
pub mod types;

// Core exports
pub use cli::Commands;
pub use config::Config;
pub use miner::{
    Algorithm, Job, JobMessage, Miner, MinerHandle, MinerOptions, Seed, ShareSubmission, Target,
    Worker,
};
pub use network::{PoolClient, PoolConfig};
pub use stats::{HardwareStats, MinerState, MiningStats};
pub use types::AlgorithmType;
pub use utils::{MinerError, init_logging};
