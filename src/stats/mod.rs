//! Statistics collection and lifecycle module
//!
//! This module provides functionality for tracking mining statistics and the
//! miner's lifecycle, including:
//! - Windowed hashrate calculation
//! - Share acceptance/rejection and stale-output tracking
//! - The Idle/Connecting/Mining/Paused/Stopped state machine
//! - Hardware monitoring (CPU, memory, temperature)

/// Hashrate windows and monotonic counters
pub mod aggregator;

/// Hardware sampling for the periodic stats line
pub mod hardware;

/// Miner state machine
pub mod lifecycle;

// Re-export main components
pub use aggregator::{MiningStats, StatsAggregator};
pub use hardware::{HardwareMonitor, HardwareStats};
pub use lifecycle::{Lifecycle, MinerState};
