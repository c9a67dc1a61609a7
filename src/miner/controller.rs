// src/miner/controller.rs
//! Mining engine controller
//!
//! One thread owns the dispatcher, the lifecycle and the stats aggregator.
//! It multiplexes lifecycle commands, worker events and two tickers (stats
//! window and report log) with `select!`, so none of that state needs a lock.
//! [`Miner`] owns the thread; [`MinerHandle`] is the cloneable front end the
//! pool client and the CLI talk to.

use crate::config::Config;
use crate::miner::algorithm::Algorithm;
use crate::miner::dispatcher::{Dispatcher, JobDispatch, WorkerOutput};
use crate::miner::job::{Job, ShareSubmission};
use crate::miner::worker::WorkerEvent;
use crate::stats::{HardwareMonitor, Lifecycle, MinerState, MiningStats, StatsAggregator};
use crate::utils::error::MinerError;
use crossbeam_channel::{Receiver, Sender, bounded, select, tick, unbounded};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Pending lifecycle commands before callers block on send
const CONTROL_QUEUE: usize = 64;

/// Engine tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MinerOptions {
    /// Digests per worker throughput report
    pub batch_size: u64,
    /// Hashrate sampling window
    pub stats_window: Duration,
    /// Interval of the periodic stats log line
    pub report_interval: Duration,
}

impl Default for MinerOptions {
    fn default() -> Self {
        MinerOptions {
            batch_size: 100,
            stats_window: Duration::from_secs(2),
            report_interval: Duration::from_secs(60),
        }
    }
}

impl From<&Config> for MinerOptions {
    fn from(config: &Config) -> Self {
        MinerOptions {
            batch_size: config.batch_size.max(1),
            stats_window: Duration::from_secs(config.stats_window_secs.max(1)),
            report_interval: Duration::from_secs(config.report_interval_secs.max(1)),
        }
    }
}

/// Requests handled on the controller thread
enum ControlMessage {
    Start {
        threads: usize,
        reply: Sender<Result<(), MinerError>>,
    },
    Stop {
        reply: Sender<()>,
    },
    Pause {
        reply: Sender<Result<(), MinerError>>,
    },
    Resume {
        reply: Sender<Result<(), MinerError>>,
    },
    SubmitJob {
        job: Job,
        reply: Sender<Result<JobDispatch, MinerError>>,
    },
    ShareAccepted,
    ShareRejected(String),
    PoolClosed(String),
    Stats {
        reply: Sender<MiningStats>,
    },
    Shutdown,
}

/// Engine state owned by the controller thread
pub struct Controller {
    lifecycle: Lifecycle,
    dispatcher: Dispatcher,
    events: Receiver<WorkerEvent>,
    stats: StatsAggregator,
    shares: Sender<ShareSubmission>,
    hardware: Option<HardwareMonitor>,
}

impl Controller {
    /// Creates an idle controller
    ///
    /// # Arguments
    /// * `algorithm` - Hashing backend for every context generation
    /// * `batch_size` - Digests per worker throughput report
    /// * `shares` - Where qualifying shares for the current job are sent
    pub fn new(
        algorithm: Arc<dyn Algorithm>,
        batch_size: u64,
        shares: Sender<ShareSubmission>,
    ) -> Self {
        let (events_tx, events) = unbounded();

        Controller {
            lifecycle: Lifecycle::new(),
            dispatcher: Dispatcher::new(algorithm, events_tx, batch_size),
            events,
            stats: StatsAggregator::new(Instant::now()),
            shares,
            hardware: None,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> MinerState {
        self.lifecycle.state()
    }

    /// `Idle`/`Stopped` -> `Connecting`; resets the counters
    ///
    /// Workers are only created when the first job names a seed.
    pub fn start(&mut self, threads: usize) -> Result<(), MinerError> {
        if self.lifecycle.transition(MinerState::Connecting)? {
            self.stats.reset(Instant::now());
            self.dispatcher.start(threads);
            log::info!("Miner starting with {} worker threads", self.dispatcher.thread_count());
        }
        Ok(())
    }

    /// Tears the pool down and moves to `Stopped`
    ///
    /// Idempotent. Returns once every worker is joined and every event they
    /// queued has been drained, so nothing is forwarded afterwards.
    pub fn stop(&mut self) {
        if !self.state().is_running() {
            return;
        }

        self.dispatcher.stop();
        self.drain_events();

        if let Err(e) = self.lifecycle.transition(MinerState::Stopped) {
            log::error!("Failed to stop miner: {}", e);
        }
    }

    /// `Mining` -> `Paused`
    pub fn pause(&mut self) -> Result<(), MinerError> {
        if self.lifecycle.transition(MinerState::Paused)? {
            self.dispatcher.pause();
        }
        Ok(())
    }

    /// `Paused` -> `Mining` on the retained job
    pub fn resume(&mut self) -> Result<(), MinerError> {
        match self.state() {
            MinerState::Mining => Ok(()),
            MinerState::Paused => {
                self.lifecycle.transition(MinerState::Mining)?;
                self.dispatcher.resume();
                Ok(())
            }
            from => Err(MinerError::InvalidTransition {
                from,
                to: MinerState::Mining,
            }),
        }
    }

    /// Dispatches a job from the pool
    ///
    /// # Errors
    /// - `NotRunning` when the miner was never started or has stopped
    /// - `ContextBuild` when the new seed cannot be built; the miner is then `Stopped`
    pub fn submit_job(&mut self, job: Job) -> Result<JobDispatch, MinerError> {
        let state = self.state();
        if !state.is_running() {
            return Err(MinerError::NotRunning(state));
        }

        let job_id = job.job_id.clone();
        let target = job.target.difficulty();
        match self.dispatcher.on_job(job) {
            Ok(dispatch) => {
                if state == MinerState::Connecting {
                    self.lifecycle.transition(MinerState::Mining)?;
                }
                log::info!(
                    "New job {} (difficulty {}, generation {}{})",
                    job_id,
                    target,
                    dispatch.generation,
                    if dispatch.rebuilt { ", rebuilt" } else { "" }
                );
                Ok(dispatch)
            }
            Err(e) => {
                log::error!("Job {} aborted mining: {}", job_id, e);
                self.drain_events();
                self.lifecycle.transition(MinerState::Stopped)?;
                Err(e)
            }
        }
    }

    /// Counts a share the pool accepted
    pub fn share_accepted(&mut self) {
        self.stats.record_accepted();
    }

    /// Counts a share the pool rejected
    pub fn share_rejected(&mut self, reason: String) {
        log::warn!("{}", MinerError::PoolFeedback(reason));
        self.stats.record_rejected();
    }

    /// The pool connection is gone; stop mining
    pub fn pool_closed(&mut self, reason: &str) {
        log::warn!("Pool connection closed: {}", reason);
        self.stop();
    }

    /// Folds one worker event into the stats and forwards shares
    pub fn on_worker_event(&mut self, event: WorkerEvent) {
        match self.dispatcher.on_worker_event(event) {
            Some(WorkerOutput::Hashes(count)) => self.stats.record_hashes(count),
            Some(WorkerOutput::Share(share)) => self.forward_share(share),
            Some(WorkerOutput::Stale) => self.stats.record_stale(),
            None => {}
        }
    }

    fn forward_share(&mut self, share: ShareSubmission) {
        if !matches!(self.state(), MinerState::Mining | MinerState::Paused) {
            self.stats.record_stale();
            return;
        }

        log::info!("Share found for job {} (nonce {:08x})", share.job_id, share.nonce);
        if let Err(e) = self.shares.send(share).map_err(MinerError::from) {
            log::error!("{}", e);
        }
    }

    fn drain_events(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            self.on_worker_event(event);
        }
    }

    /// Closes the hashrate window ending at `now`
    pub fn sample(&mut self, now: Instant) -> f64 {
        self.stats.sample(now)
    }

    /// Current statistics
    pub fn snapshot(&self) -> MiningStats {
        self.stats.snapshot(
            Instant::now(),
            self.state(),
            self.dispatcher.current_job().map(|job| job.job_id.clone()),
            self.dispatcher.thread_count(),
        )
    }

    fn report(&mut self) {
        if !self.state().is_running() {
            return;
        }

        let stats = self.snapshot();
        let hardware = self.hardware.get_or_insert_with(HardwareMonitor::new).sample();
        log::info!(
            "Hashrate: {:.2} H/s | Total: {} | Accepted/Rejected/Stale: {}/{}/{} | CPU: {:.1}% | Mem: {} MiB | Temp: {:.1}°C",
            stats.hashrate,
            stats.total_hashes,
            stats.accepted_shares,
            stats.rejected_shares,
            stats.stale_discarded,
            hardware.cpu_usage,
            hardware.memory_used / (1024 * 1024),
            hardware.temperature
        );
    }

    fn handle(&mut self, message: ControlMessage) {
        // A dropped reply receiver means the caller gave up; nothing to do
        match message {
            ControlMessage::Start { threads, reply } => {
                let _ = reply.send(self.start(threads));
            }
            ControlMessage::Stop { reply } => {
                self.stop();
                let _ = reply.send(());
            }
            ControlMessage::Pause { reply } => {
                let _ = reply.send(self.pause());
            }
            ControlMessage::Resume { reply } => {
                let _ = reply.send(self.resume());
            }
            ControlMessage::SubmitJob { job, reply } => {
                let _ = reply.send(self.submit_job(job));
            }
            ControlMessage::ShareAccepted => self.share_accepted(),
            ControlMessage::ShareRejected(reason) => self.share_rejected(reason),
            ControlMessage::PoolClosed(reason) => self.pool_closed(&reason),
            ControlMessage::Stats { reply } => {
                let _ = reply.send(self.snapshot());
            }
            ControlMessage::Shutdown => {}
        }
    }

    fn run(mut self, control: Receiver<ControlMessage>, options: MinerOptions) {
        let events = self.events.clone();
        let window = tick(options.stats_window);
        let report = tick(options.report_interval);

        loop {
            select! {
                recv(control) -> message => match message {
                    Ok(ControlMessage::Shutdown) | Err(_) => break,
                    Ok(message) => self.handle(message),
                },
                recv(events) -> event => {
                    if let Ok(event) = event {
                        self.on_worker_event(event);
                    }
                }
                recv(window) -> at => {
                    if let Ok(at) = at {
                        self.sample(at);
                    }
                }
                recv(report) -> _ => self.report(),
            }
        }

        self.stop();
        log::debug!("Controller exited");
    }
}

/// Cloneable front end to a running [`Miner`]
#[derive(Clone)]
pub struct MinerHandle {
    control: Sender<ControlMessage>,
}

impl MinerHandle {
    fn send(&self, message: ControlMessage) -> Result<(), MinerError> {
        self.control
            .send(message)
            .map_err(|_| MinerError::ChannelError("miner controller has exited".into()))
    }

    fn request<T>(&self, message: impl FnOnce(Sender<T>) -> ControlMessage) -> Result<T, MinerError> {
        let (reply, response) = bounded(1);
        self.send(message(reply))?;
        response
            .recv()
            .map_err(|_| MinerError::ChannelError("miner controller dropped the request".into()))
    }

    /// Starts mining with `threads` workers once a job arrives
    pub fn start(&self, threads: usize) -> Result<(), MinerError> {
        self.request(|reply| ControlMessage::Start { threads, reply })?
    }

    /// Stops mining; returns after every worker has exited
    pub fn stop(&self) -> Result<(), MinerError> {
        self.request(|reply| ControlMessage::Stop { reply })
    }

    /// Pauses hashing, keeping the job and context
    pub fn pause(&self) -> Result<(), MinerError> {
        self.request(|reply| ControlMessage::Pause { reply })?
    }

    /// Resumes hashing on the retained job
    pub fn resume(&self) -> Result<(), MinerError> {
        self.request(|reply| ControlMessage::Resume { reply })?
    }

    /// Dispatches a new job; may block for a full context rebuild
    pub fn submit_job(&self, job: Job) -> Result<JobDispatch, MinerError> {
        self.request(|reply| ControlMessage::SubmitJob { job, reply })?
    }

    /// Pool accepted a share
    pub fn share_accepted(&self) -> Result<(), MinerError> {
        self.send(ControlMessage::ShareAccepted)
    }

    /// Pool rejected a share
    pub fn share_rejected(&self, reason: impl Into<String>) -> Result<(), MinerError> {
        self.send(ControlMessage::ShareRejected(reason.into()))
    }

    /// Pool connection ended
    pub fn pool_closed(&self, reason: impl Into<String>) -> Result<(), MinerError> {
        self.send(ControlMessage::PoolClosed(reason.into()))
    }

    /// Snapshot of the current statistics
    pub fn stats(&self) -> Result<MiningStats, MinerError> {
        self.request(|reply| ControlMessage::Stats { reply })
    }
}

/// A running mining engine
///
/// Dropping it stops every worker and joins the controller thread.
pub struct Miner {
    handle: MinerHandle,
    thread: Option<JoinHandle<()>>,
}

impl Miner {
    /// Spawns the controller thread
    ///
    /// # Arguments
    /// * `algorithm` - Hashing backend
    /// * `options` - Batch size and ticker periods
    /// * `shares` - Receives every share found for the current job
    pub fn spawn(
        algorithm: Arc<dyn Algorithm>,
        options: MinerOptions,
        shares: Sender<ShareSubmission>,
    ) -> Result<Self, MinerError> {
        let (control_tx, control_rx) = bounded(CONTROL_QUEUE);
        let controller = Controller::new(algorithm, options.batch_size, shares);

        let thread = thread::Builder::new()
            .name("miner-controller".into())
            .spawn(move || controller.run(control_rx, options))?;

        Ok(Miner {
            handle: MinerHandle {
                control: control_tx,
            },
            thread: Some(thread),
        })
    }

    /// A new handle to this miner
    pub fn handle(&self) -> MinerHandle {
        self.handle.clone()
    }

    /// Stops mining and waits for the controller to exit
    pub fn shutdown(mut self) {
        self.join();
    }

    fn join(&mut self) {
        if let Some(thread) = self.thread.take() {
            // Err means the controller is already gone, which is the goal
            let _ = self.handle.send(ControlMessage::Shutdown);
            if thread.join().is_err() {
                log::error!("Miner controller panicked");
            }
        }
    }
}

impl Drop for Miner {
    fn drop(&mut self) {
        self.join();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::miner::algorithm::testing::{EchoNonce, FAILING_SEED};
    use crate::miner::job::Seed;
    use crate::miner::target::Target;
    use crossbeam_channel::TryRecvError;

    fn job(id: &str, seed: &[u8]) -> Job {
        Job::new(
            id,
            vec![0u8; 76],
            Target::from_hex("f33c0000").unwrap(),
            Seed::new(seed),
        )
        .unwrap()
    }

    fn controller(algo: &EchoNonce) -> (Controller, Receiver<ShareSubmission>) {
        let (tx, rx) = unbounded();
        (Controller::new(Arc::new(algo.clone()), 4, tx), rx)
    }

    /// Feeds worker events into the controller for `duration`
    fn pump(controller: &mut Controller, duration: Duration) {
        let events = controller.events.clone();
        let deadline = Instant::now() + duration;
        while Instant::now() < deadline {
            if let Ok(event) = events.recv_timeout(Duration::from_millis(10)) {
                controller.on_worker_event(event);
            }
        }
    }

    #[test]
    fn test_four_workers_mine_compact_target() {
        let algo = EchoNonce::new();
        let (mut controller, shares) = controller(&algo);

        controller.start(4).unwrap();
        assert_eq!(controller.state(), MinerState::Connecting);

        let dispatch = controller.submit_job(job("A", &[0xaa; 32])).unwrap();
        assert!(dispatch.rebuilt);
        assert_eq!(dispatch.workers, 4);
        assert_eq!(controller.state(), MinerState::Mining);

        pump(&mut controller, Duration::from_millis(300));
        controller.stop();

        let found: Vec<_> = shares.try_iter().collect();
        assert!(!found.is_empty());
        assert!(found.iter().all(|share| share.job_id == "A"));

        let stats = controller.snapshot();
        assert!(stats.total_hashes > 0);
        assert_eq!(stats.threads, 4);
        assert_eq!(stats.state, MinerState::Stopped);
        assert_eq!(algo.builds(), 1);
    }

    #[test]
    fn test_stop_is_idempotent_and_final() {
        let algo = EchoNonce::new();
        let (mut controller, shares) = controller(&algo);
        controller.start(2).unwrap();
        controller.submit_job(job("A", &[1; 32])).unwrap();
        pump(&mut controller, Duration::from_millis(100));

        controller.stop();
        controller.stop();
        assert_eq!(controller.state(), MinerState::Stopped);

        shares.try_iter().for_each(drop);
        std::thread::sleep(Duration::from_millis(50));
        pump(&mut controller, Duration::from_millis(50));
        assert_eq!(shares.try_recv(), Err(TryRecvError::Empty));
    }

    #[test]
    fn test_stop_before_start_stays_idle() {
        let (mut controller, _shares) = controller(&EchoNonce::new());
        controller.stop();
        assert_eq!(controller.state(), MinerState::Idle);
    }

    #[test]
    fn test_pause_and_resume_keep_context() {
        let algo = EchoNonce::new();
        let (mut controller, _shares) = controller(&algo);
        controller.start(2).unwrap();
        controller.submit_job(job("A", &[1; 32])).unwrap();

        controller.pause().unwrap();
        assert_eq!(controller.state(), MinerState::Paused);
        controller.pause().unwrap();

        controller.resume().unwrap();
        assert_eq!(controller.state(), MinerState::Mining);
        pump(&mut controller, Duration::from_millis(100));

        assert!(controller.snapshot().total_hashes > 0);
        assert_eq!(algo.builds(), 1);
        controller.stop();
    }

    #[test]
    fn test_resume_requires_pause() {
        let (mut controller, _shares) = controller(&EchoNonce::new());
        controller.start(1).unwrap();

        assert!(matches!(
            controller.resume(),
            Err(MinerError::InvalidTransition {
                from: MinerState::Connecting,
                to: MinerState::Mining
            })
        ));
        assert!(controller.pause().is_err());
    }

    #[test]
    fn test_context_failure_forces_stopped() {
        let (mut controller, shares) = controller(&EchoNonce::new());
        controller.start(2).unwrap();
        controller.submit_job(job("A", &[1; 32])).unwrap();

        let err = controller.submit_job(job("B", FAILING_SEED)).unwrap_err();

        assert!(matches!(err, MinerError::ContextBuild(_)));
        assert_eq!(controller.state(), MinerState::Stopped);
        shares.try_iter().for_each(drop);
        pump(&mut controller, Duration::from_millis(30));
        assert!(shares.try_recv().is_err());
    }

    #[test]
    fn test_restart_after_context_failure() {
        let algo = EchoNonce::new();
        let (mut controller, _shares) = controller(&algo);
        controller.start(1).unwrap();
        assert!(controller.submit_job(job("A", FAILING_SEED)).is_err());

        controller.start(1).unwrap();
        controller.submit_job(job("B", &[2; 32])).unwrap();

        assert_eq!(controller.state(), MinerState::Mining);
        controller.stop();
    }

    #[test]
    fn test_job_rejected_when_not_running() {
        let (mut controller, _shares) = controller(&EchoNonce::new());

        assert!(matches!(
            controller.submit_job(job("A", &[1; 32])),
            Err(MinerError::NotRunning(MinerState::Idle))
        ));
    }

    #[test]
    fn test_pool_closed_stops_mining() {
        let (mut controller, _shares) = controller(&EchoNonce::new());
        controller.start(1).unwrap();
        controller.submit_job(job("A", &[1; 32])).unwrap();

        controller.pool_closed("socket reset");

        assert_eq!(controller.state(), MinerState::Stopped);
        assert!(controller.snapshot().current_job.is_none());
    }

    #[test]
    fn test_late_result_for_superseded_job_counts_as_stale() {
        let algo = EchoNonce::new();
        let (mut controller, shares) = controller(&algo);
        controller.start(2).unwrap();
        controller.submit_job(job("A", &[5; 32])).unwrap();
        pump(&mut controller, Duration::from_millis(100));

        let dispatch = controller.submit_job(job("B", &[5; 32])).unwrap();
        assert!(!dispatch.rebuilt);
        pump(&mut controller, Duration::from_millis(50));
        shares.try_iter().for_each(drop);

        let stale_before = controller.snapshot().stale_discarded;
        let worker = controller.dispatcher.workers()[0].tag();
        controller.on_worker_event(WorkerEvent::Result {
            worker,
            share: ShareSubmission {
                job_id: "A".into(),
                nonce: 7,
                result: [0u8; 32],
            },
        });

        assert_eq!(controller.snapshot().stale_discarded, stale_before + 1);
        assert!(
            shares.try_iter().next().is_none(),
            "a result for a superseded job must never reach the pool"
        );
        controller.stop();
    }

    #[test]
    fn test_pool_feedback_counters() {
        let (mut controller, _shares) = controller(&EchoNonce::new());
        controller.start(1).unwrap();
        controller.share_accepted();
        controller.share_accepted();
        controller.share_rejected("low difficulty".into());

        let stats = controller.snapshot();
        assert_eq!(stats.accepted_shares, 2);
        assert_eq!(stats.rejected_shares, 1);
    }

    #[test]
    fn test_miner_handle_round_trip() {
        let (tx, shares) = unbounded();
        let options = MinerOptions {
            batch_size: 4,
            stats_window: Duration::from_millis(100),
            report_interval: Duration::from_secs(60),
        };
        let miner = Miner::spawn(Arc::new(EchoNonce::new()), options, tx).unwrap();
        let handle = miner.handle();

        handle.start(2).unwrap();
        handle.submit_job(job("A", &[3; 32])).unwrap();
        let share = shares.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(share.job_id, "A");

        std::thread::sleep(Duration::from_millis(250));
        let stats = handle.stats().unwrap();
        assert_eq!(stats.state, MinerState::Mining);
        assert!(stats.hashrate > 0.0);

        handle.stop().unwrap();
        assert_eq!(handle.stats().unwrap().state, MinerState::Stopped);

        miner.shutdown();
        assert!(matches!(handle.stats(), Err(MinerError::ChannelError(_))));
    }
}
