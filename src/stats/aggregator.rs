// src/stats/aggregator.rs
//! Hashrate and share aggregation
//!
//! The instantaneous hashrate is windowed, not averaged: every sample divides
//! the digests seen since the previous sample by the elapsed wall-clock time
//! and then resets the window. Totals are monotonic until the next `reset`.

use crate::stats::lifecycle::MinerState;
use serde::Serialize;
use std::time::{Duration, Instant, SystemTime};

/// Snapshot of mining statistics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MiningStats {
    /// Lifecycle state at snapshot time
    pub state: MinerState,
    /// Hashrate over the last completed window (hashes per second)
    pub hashrate: f64,
    /// Total number of digests computed for current jobs
    pub total_hashes: u64,
    /// Number of shares accepted by the pool
    pub accepted_shares: u64,
    /// Number of shares rejected by the pool
    pub rejected_shares: u64,
    /// Worker output dropped because its job or generation was superseded
    pub stale_discarded: u64,
    /// Wall-clock time mining was started
    pub started_at: Option<SystemTime>,
    /// Time since start
    pub uptime: Duration,
    /// Job the workers are on
    pub current_job: Option<String>,
    /// Configured worker count
    pub threads: usize,
}

/// Folds worker reports and pool feedback into counters
#[derive(Debug)]
pub struct StatsAggregator {
    window_hashes: u64,
    window_start: Instant,
    hashrate: f64,
    total_hashes: u64,
    accepted: u64,
    rejected: u64,
    stale: u64,
    started: Option<(Instant, SystemTime)>,
}

impl StatsAggregator {
    /// Creates an aggregator whose first window opens at `now`
    pub fn new(now: Instant) -> Self {
        StatsAggregator {
            window_hashes: 0,
            window_start: now,
            hashrate: 0.0,
            total_hashes: 0,
            accepted: 0,
            rejected: 0,
            stale: 0,
            started: None,
        }
    }

    /// Clears every counter and marks `now` as the start time
    pub fn reset(&mut self, now: Instant) {
        *self = StatsAggregator::new(now);
        self.started = Some((now, SystemTime::now()));
    }

    /// Adds digests reported by a worker
    pub fn record_hashes(&mut self, count: u64) {
        self.window_hashes += count;
        self.total_hashes += count;
    }

    /// Counts a share the pool accepted
    pub fn record_accepted(&mut self) {
        self.accepted += 1;
    }

    /// Counts a share the pool rejected
    pub fn record_rejected(&mut self) {
        self.rejected += 1;
    }

    /// Counts a discarded stale result or report
    pub fn record_stale(&mut self) {
        self.stale += 1;
    }

    /// Closes the current window and returns its hashrate
    ///
    /// A zero-length window keeps the previous rate.
    pub fn sample(&mut self, now: Instant) -> f64 {
        let elapsed = now.saturating_duration_since(self.window_start).as_secs_f64();
        if elapsed > 0.0 {
            self.hashrate = self.window_hashes as f64 / elapsed;
            self.window_hashes = 0;
            self.window_start = now;
        }
        self.hashrate
    }

    /// Digests counted since the last reset
    pub fn total_hashes(&self) -> u64 {
        self.total_hashes
    }

    /// Builds a snapshot
    pub fn snapshot(
        &self,
        now: Instant,
        state: MinerState,
        current_job: Option<String>,
        threads: usize,
    ) -> MiningStats {
        MiningStats {
            state,
            hashrate: self.hashrate,
            total_hashes: self.total_hashes,
            accepted_shares: self.accepted,
            rejected_shares: self.rejected,
            stale_discarded: self.stale,
            started_at: self.started.map(|(_, wall)| wall),
            uptime: self
                .started
                .map(|(start, _)| now.saturating_duration_since(start))
                .unwrap_or_default(),
            current_job,
            threads,
        }
    }
}
