// src/stats/lifecycle.rs
//! Miner lifecycle state machine
//!
//! ```text
//! Idle -> Connecting -> Mining <-> Paused
//!            |            |          |
//!            +------------+----------+--> Stopped -> Connecting
//! ```

use crate::utils::error::MinerError;
use serde::Serialize;
use std::fmt;

/// Observable state of the miner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MinerState {
    /// Never started
    Idle,
    /// Started, waiting for the first job
    Connecting,
    /// Workers hashing the current job
    Mining,
    /// Workers hold their job but do not hash
    Paused,
    /// Workers torn down
    Stopped,
}

impl MinerState {
    /// Whether the engine holds (or is about to hold) workers
    pub fn is_running(self) -> bool {
        matches!(
            self,
            MinerState::Connecting | MinerState::Mining | MinerState::Paused
        )
    }
}

impl fmt::Display for MinerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MinerState::Idle => "idle",
            MinerState::Connecting => "connecting",
            MinerState::Mining => "mining",
            MinerState::Paused => "paused",
            MinerState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Current state plus the transition rules
#[derive(Debug)]
pub struct Lifecycle {
    state: MinerState,
}

impl Lifecycle {
    /// Starts in `Idle`
    pub fn new() -> Self {
        Lifecycle {
            state: MinerState::Idle,
        }
    }

    /// Current state
    pub fn state(&self) -> MinerState {
        self.state
    }

    /// Whether `from -> to` is a legal edge
    pub fn allows(from: MinerState, to: MinerState) -> bool {
        use MinerState::*;

        matches!(
            (from, to),
            (Idle, Connecting)
                | (Stopped, Connecting)
                | (Connecting, Mining)
                | (Mining, Paused)
                | (Paused, Mining)
                | (Connecting, Stopped)
                | (Mining, Stopped)
                | (Paused, Stopped)
        )
    }

    /// Moves to `to`
    ///
    /// # Returns
    /// - `Ok(true)` if the state changed
    /// - `Ok(false)` if already in `to`
    ///
    /// # Errors
    /// `InvalidTransition` for any edge not in the diagram
    pub fn transition(&mut self, to: MinerState) -> Result<bool, MinerError> {
        if self.state == to {
            return Ok(false);
        }
        if !Self::allows(self.state, to) {
            return Err(MinerError::InvalidTransition {
                from: self.state,
                to,
            });
        }

        log::info!("Miner state: {} -> {}", self.state, to);
        self.state = to;
        Ok(true)
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}
