// src/network/mod.rs
//! Network communication components
//!
//! This module handles all network interactions with mining pools.
//! `PoolClient` connects to a pool using the stratum dialect over WebSocket,
//! feeds jobs to the engine and reports share feedback back to it.

/// Mining pool client implementation
///
/// Handles communication with mining pools using the Stratum protocol.
/// Manages WebSocket connections, job hand-off, and share submission.
pub mod pool;

// Re-export main components for cleaner imports
pub use pool::{PoolClient, PoolConfig, Session};
