// src/config/config.rs
use crate::{network::pool::PoolConfig, types::AlgorithmType, utils::error::MinerError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure for the mining application
///
/// Contains all settings needed to configure mining operations,
/// including algorithm selection, worker pool sizing, stats cadence
/// and the pool connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Mining algorithm to use (e.g., "randomx", "cryptonight-v7")
    #[serde(default = "default_algorithm")]
    pub algorithm: String,

    /// Number of worker threads to use for mining
    /// (0 = number of CPU cores)
    #[serde(default)]
    pub worker_threads: usize,

    /// Digests each worker computes between throughput reports
    /// (default: 100)
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,

    /// Build the full RandomX dataset instead of the light cache
    #[serde(default = "default_fast_mode")]
    pub fast_mode: bool,

    /// Hashrate sampling window in seconds
    #[serde(default = "default_stats_window")]
    pub stats_window_secs: u64,

    /// Seconds between periodic stats log lines
    #[serde(default = "default_report_interval")]
    pub report_interval_secs: u64,

    /// Pool connection; required by `start`
    #[serde(default)]
    pub pool: Option<PoolConfig>,
}

fn default_algorithm() -> String {
    "randomx".into()
}

fn default_batch_size() -> u64 {
    100
}

fn default_fast_mode() -> bool {
    true
}

fn default_stats_window() -> u64 {
    2
}

fn default_report_interval() -> u64 {
    60
}

impl Default for Config {
    fn default() -> Self {
        Config {
            algorithm: default_algorithm(),
            worker_threads: 0,
            batch_size: default_batch_size(),
            fast_mode: default_fast_mode(),
            stats_window_secs: default_stats_window(),
            report_interval_secs: default_report_interval(),
            pool: None,
        }
    }
}

impl Config {
    /// Loads configuration from a file
    ///
    /// # Arguments
    /// * `path` - Path to the configuration file (TOML format)
    ///
    /// # Returns
    /// * `Ok(Config)` - Successfully loaded and validated configuration
    /// * `Err(MinerError)` - If file couldn't be read, parsed or validated
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, MinerError> {
        let path = path.into();
        let config_str = std::fs::read_to_string(&path).map_err(|e| {
            MinerError::ConfigError(format!(
                "Failed to read config at {}: {}",
                path.display(),
                e
            ))
        })?;

        let config = Self::parse(&config_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Parses a TOML document without validating it
    pub fn parse(config_str: &str) -> Result<Self, MinerError> {
        toml::from_str(config_str)
            .map_err(|e| MinerError::ConfigError(format!("Invalid config format: {}", e)))
    }

    /// Checks values that parse but cannot be mined with
    pub fn validate(&self) -> Result<(), MinerError> {
        self.algorithm_type()?;

        if self.batch_size == 0 {
            return Err(MinerError::ConfigError("batch_size must be at least 1".into()));
        }
        if self.stats_window_secs == 0 || self.report_interval_secs == 0 {
            return Err(MinerError::ConfigError(
                "stats_window_secs and report_interval_secs must be at least 1".into(),
            ));
        }
        if let Some(pool) = &self.pool {
            if pool.url.is_empty() || pool.user.is_empty() {
                return Err(MinerError::ConfigError("pool.url and pool.user are required".into()));
            }
        }

        Ok(())
    }

    /// Parsed `algorithm` field
    pub fn algorithm_type(&self) -> Result<AlgorithmType, MinerError> {
        self.algorithm
            .parse()
            .map_err(|_| MinerError::ConfigError(format!("Invalid algorithm: {}", self.algorithm)))
    }

    /// Worker count with 0 resolved to the number of CPU cores
    pub fn effective_threads(&self) -> usize {
        match self.worker_threads {
            0 => num_cpus::get(),
            n => n,
        }
    }

    /// Generates a configuration template string
    ///
    /// # Arguments
    /// * `pool` - Include the pool connection section
    ///
    /// # Returns
    /// String containing a commented TOML configuration template
    pub fn generate_template(pool: bool) -> String {
        let mut template = String::new();
        template.push_str("# XMR Miner Configuration\n\n");
        template.push_str("# Supported algorithms: randomx, cryptonight-v7, cryptonight-r\n");
        template.push_str("algorithm = \"randomx\"\n");
        template.push_str("# Number of worker threads (0 = auto-detect)\n");
        template.push_str("worker_threads = 0\n");
        template.push_str("# Digests per worker between throughput reports\n");
        template.push_str("batch_size = 100\n");
        template.push_str("# Full RandomX dataset (about 2 GiB) instead of the light cache\n");
        template.push_str("fast_mode = true\n");
        template.push_str("# Hashrate window and stats log interval, in seconds\n");
        template.push_str("stats_window_secs = 2\n");
        template.push_str("report_interval_secs = 60\n");

        if pool {
            template.push_str("\n# Pool connection\n");
            template.push_str("[pool]\n");
            template.push_str("url = \"wss://pool.example.com:3333\"\n");
            template.push_str("user = \"your_wallet_address\"\n");
            template.push_str("password = \"x\"\n");
            template.push_str("worker_id = \"worker01\"\n");
        }

        template
    }
}
