// src/utils/error.rs
use crate::miner::job::ShareSubmission;
use crate::stats::lifecycle::MinerState;
use serde_json;
use std::io;
use thiserror::Error;
use tokio_tungstenite::tungstenite;
use url;

/// Main error type for the mining engine
///
/// This enum represents all possible error conditions that can occur
/// while dispatching work, talking to the pool, or loading configuration.
/// Stale results never show up here; they are dropped and counted.
#[derive(Error, Debug)]
pub enum MinerError {
    /// Errors related to mining algorithms (e.g., unsupported algorithm)
    #[error("Algorithm error: {0}")]
    AlgorithmError(String),

    /// The seed-derived dataset could not be built (usually memory exhaustion)
    ///
    /// Fatal to the current mining attempt: the engine moves to `Stopped`.
    #[error("Failed to build digest context: {0}")]
    ContextBuild(String),

    /// A single digest computation failed inside a worker
    ///
    /// Logged by the worker, which retries from a fresh nonce.
    #[error("Digest computation failed: {0}")]
    WorkerCompute(String),

    /// Target string was neither a compact nor a full encoding
    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    /// Job fields could not be turned into a dispatchable job
    #[error("Invalid job: {0}")]
    InvalidJob(String),

    /// Lifecycle command not allowed in the current state
    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition {
        /// State the engine was in
        from: MinerState,
        /// State that was requested
        to: MinerState,
    },

    /// Work was submitted while the engine is idle or stopped
    #[error("Miner is not running (state: {0})")]
    NotRunning(MinerState),

    /// The pool rejected a submitted share
    #[error("Pool rejected share: {0}")]
    PoolFeedback(String),

    /// Errors related to network connectivity
    #[error("Network connection error: {0}")]
    ConnectionError(String),

    /// Errors in protocol handling or invalid protocol messages
    #[error("Protocol violation: {0}")]
    ProtocolError(String),

    /// Standard I/O operation errors
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// URL parsing errors
    #[error("URL parse error: {0}")]
    UrlError(#[from] url::ParseError),

    /// WebSocket communication errors
    #[error("WebSocket error: {0}")]
    WsError(#[from] tungstenite::Error),

    /// Configuration file or parameter errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Thread communication channel errors
    #[error("Thread communication error: {0}")]
    ChannelError(String),

    /// Invalid user input or parameter errors
    #[error("Invalid input: {0}")]
    InputError(String),

    /// Async task execution errors
    #[error("Task execution error: {0}")]
    TaskError(String),
}

/// Converts crossbeam channel send errors for shares into MinerError
///
/// Raised when the share consumer (normally the pool client) has gone away.
impl From<crossbeam_channel::SendError<ShareSubmission>> for MinerError {
    fn from(e: crossbeam_channel::SendError<ShareSubmission>) -> Self {
        MinerError::ChannelError(format!("Share send failed: {}", e))
    }
}

/// Converts hex decoding errors into MinerError
///
/// Used when invalid hex data is encountered in job blobs, seeds or targets.
impl From<hex::FromHexError> for MinerError {
    fn from(e: hex::FromHexError) -> Self {
        MinerError::InputError(format!("Hex conversion failed: {}", e))
    }
}

/// Converts async task join errors into MinerError
///
/// Used when the blocking job hand-off spawned by the pool client fails.
impl From<tokio::task::JoinError> for MinerError {
    fn from(e: tokio::task::JoinError) -> Self {
        MinerError::TaskError(format!("Async task failed: {}", e))
    }
}
