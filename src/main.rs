// src/main.rs
use clap::Parser;
use crossbeam_channel::unbounded;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Runtime;
use xmr_dispatch_rs::miner::algorithm::{cryptonight::CryptoNightAlgo, randomx::RandomX};
use xmr_dispatch_rs::utils::init_bench_logging;
use xmr_dispatch_rs::*;

/// Main entry point for the miner
///
/// # Returns
/// - `Ok(())` on successful execution
/// - `Err(MinerError)` if any operation fails
fn main() -> Result<(), MinerError> {
    let cli = cli::Commands::parse();

    match cli.action {
        cli::Action::Start(opts) => start_mining(opts),
        cli::Action::Benchmark(opts) => run_benchmark(opts),
        cli::Action::Config(opts) => generate_config(opts),
    }
}

/// Starts the mining operation with given configuration options
///
/// # Operations
/// 1. Initializes logging
/// 2. Loads configuration and applies CLI overrides
/// 3. Spawns the engine and moves it to `Connecting`
/// 4. Runs the pool client until the pool goes away or Ctrl-C
/// 5. Stops the engine and logs final statistics
fn start_mining(opts: cli::StartOptions) -> Result<(), MinerError> {
    utils::init_logging();

    let mut config = config::load(&opts.config)?;
    // Apply CLI overrides
    if let Some(workers) = opts.workers {
        config.worker_threads = workers;
    }
    if let Some(algo) = opts.algorithm {
        config.algorithm = algo.to_string();
    }
    config.validate()?;

    let pool_config = config
        .pool
        .clone()
        .ok_or_else(|| MinerError::ConfigError("`start` needs a [pool] section".into()))?;

    let algorithm = create_algorithm(
        config.algorithm_type()?,
        config.fast_mode,
        config.effective_threads(),
    )?;
    let (share_sender, share_receiver) = unbounded();
    let miner = Miner::spawn(algorithm, MinerOptions::from(&config), share_sender)?;
    let handle = miner.handle();
    handle.start(config.effective_threads())?;

    let rt = Runtime::new()?;
    let result = rt.block_on(async {
        let mut pool = PoolClient::new(pool_config, handle.clone());
        pool.connect().await?;

        tokio::select! {
            result = pool.run(share_receiver) => result,
            _ = tokio::signal::ctrl_c() => {
                log::info!("Interrupted, stopping miner");
                Ok(())
            }
        }
    });

    handle.stop()?;
    let stats = handle.stats()?;
    log::info!(
        "Mined {} hashes in {:.0}s | Accepted/Rejected: {}/{}",
        stats.total_hashes,
        stats.uptime.as_secs_f64(),
        stats.accepted_shares,
        stats.rejected_shares
    );
    miner.shutdown();

    result
}

/// Runs the full engine against a synthetic job
///
/// The job's target is all zeros, so no digest ever qualifies and the run
/// measures pure hashing throughput through the worker pool.
///
/// # Operations
/// 1. Initializes benchmark-specific logging
/// 2. Builds the context for the requested seed (not timed)
/// 3. Mines for the requested duration
/// 4. Reports total and average hashrate
fn run_benchmark(opts: cli::BenchmarkOptions) -> Result<(), MinerError> {
    init_bench_logging();

    let algorithm = create_algorithm(opts.algorithm, !opts.light, opts.threads)?;
    // Kept alive so workers never see a closed share channel
    let (share_sender, _shares) = unbounded();
    let options = MinerOptions {
        batch_size: opts.batch_size.max(1),
        report_interval: Duration::from_secs(5),
        ..MinerOptions::default()
    };
    let miner = Miner::spawn(algorithm, options, share_sender)?;
    let handle = miner.handle();

    let job = Job::new(
        "benchmark",
        vec![0u8; 76],
        Target::full([0u8; 32]),
        Seed::from_hex(&opts.seed)?,
    )?;

    log::info!(
        "Starting {} benchmark on {} threads for {} seconds",
        opts.algorithm,
        opts.threads,
        opts.duration
    );
    handle.start(opts.threads)?;
    handle.submit_job(job)?;

    let started = Instant::now();
    let before = handle.stats()?.total_hashes;
    std::thread::sleep(Duration::from_secs(opts.duration));
    let stats = handle.stats()?;
    let elapsed = started.elapsed().as_secs_f64();

    handle.stop()?;
    miner.shutdown();

    let hashes = stats.total_hashes.saturating_sub(before);
    log::info!("Benchmark results:");
    log::info!("Total hashes: {}", hashes);
    log::info!("Average hashrate: {:.2} H/s", hashes as f64 / elapsed);
    log::info!("Last window: {:.2} H/s", stats.hashrate);
    log::logger().flush(); // Ensure final results appear

    Ok(())
}

/// Generates configuration template file
///
/// # Arguments
/// * `opts` - Configuration generation options
fn generate_config(opts: cli::ConfigOptions) -> Result<(), MinerError> {
    let config = config::generate_template(opts.pool);
    std::fs::write(&opts.output, config)?;
    println!("Wrote configuration template to {}", opts.output.display());
    Ok(())
}

/// Creates the hashing backend
///
/// # Arguments
/// * `algo` - Algorithm to hash with
/// * `fast` - Full RandomX dataset instead of the light cache
/// * `workers` - Worker threads that will share the context
///
/// # Returns
/// - `Ok(Arc<dyn Algorithm>)` on success
/// - `Err(MinerError)` if the algorithm is not supported
fn create_algorithm(
    algo: AlgorithmType,
    fast: bool,
    workers: usize,
) -> Result<Arc<dyn Algorithm>, MinerError> {
    match algo {
        AlgorithmType::RandomX => Ok(Arc::new(RandomX::new(fast, workers))),
        AlgorithmType::CryptoNightV7 | AlgorithmType::CryptoNightR => {
            Ok(Arc::new(CryptoNightAlgo::new(algo)?))
        }
    }
}
