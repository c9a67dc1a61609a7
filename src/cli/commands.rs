// src/cli/commands.rs
use crate::types::AlgorithmType;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// XMR dispatch CLI - proof-of-work worker pool for Monero pools
#[derive(Parser, Debug)]
#[command(name = "xmr-dispatch-rs")]
#[command(version, about, long_about = None)]
pub struct Commands {
    /// The action to perform (start mining, run benchmarks, or generate config)
    #[command(subcommand)]
    pub action: Action,
}

/// Top-level commands for the miner application
#[derive(Subcommand, Debug)]
pub enum Action {
    /// Connect to the configured pool and mine
    Start(StartOptions),

    /// Run the worker pool against a synthetic job and report throughput
    Benchmark(BenchmarkOptions),

    /// Generate configuration file template
    Config(ConfigOptions),
}

/// Options for starting the mining operation
#[derive(Parser, Debug)]
pub struct StartOptions {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Number of worker threads to use (overrides config)
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Mining algorithm to use (overrides config)
    #[arg(short, long)]
    pub algorithm: Option<AlgorithmType>,
}

/// Options for running mining benchmarks
#[derive(Parser, Debug)]
pub struct BenchmarkOptions {
    /// Algorithm to benchmark
    #[arg(short, long, default_value = "randomx")]
    pub algorithm: AlgorithmType,

    /// Duration of benchmark in seconds, after the context is built
    #[arg(short, long, default_value_t = 60)]
    pub duration: u64,

    /// Number of threads to use
    #[arg(short, long, default_value_t = num_cpus::get())]
    pub threads: usize,

    /// Hex seed the dataset is derived from
    #[arg(short, long, default_value = "0000000000000000000000000000000000000000000000000000000000000000")]
    pub seed: String,

    /// Use the light RandomX cache instead of the full dataset
    #[arg(short, long)]
    pub light: bool,

    /// Digests per worker between throughput reports
    #[arg(short, long, default_value_t = 100)]
    pub batch_size: u64,
}

/// Options for generating configuration files
#[derive(Parser, Debug)]
pub struct ConfigOptions {
    /// Output file path
    #[arg(short, long, default_value = "config.toml")]
    pub output: PathBuf,

    /// Include pool connection configuration template
    #[arg(short, long)]
    pub pool: bool,
}
