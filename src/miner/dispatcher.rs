// src/miner/dispatcher.rs
//! Mining job dispatcher implementation
//!
//! Receives jobs, decides whether the seed changed, rebuilds the worker pool
//! when it did, and broadcasts jobs to workers. It is also the single source
//! of truth for staleness: the [`JobBoard`] holds the current job, workers
//! read it before every emission, and the dispatcher checks it again when
//! their events arrive.
//!
//! The dispatcher is not thread-safe by itself; it is owned by the controller
//! thread and only mutated in response to messages.

use crate::miner::algorithm::Algorithm;
use crate::miner::context::ContextManager;
use crate::miner::job::{Job, Seed, ShareSubmission};
use crate::miner::worker::{Worker, WorkerEvent, WorkerId, WorkerTag};
use crate::utils::error::MinerError;
use arc_swap::ArcSwapOption;
use crossbeam_channel::Sender;
use std::collections::VecDeque;
use std::sync::Arc;

/// Current job, atomically swappable and readable from every worker
pub struct JobBoard {
    current: ArcSwapOption<Job>,
}

impl JobBoard {
    /// Creates an empty board
    pub fn new() -> Self {
        JobBoard {
            current: ArcSwapOption::empty(),
        }
    }

    /// Makes `job` the current job; everything else becomes stale
    pub fn publish(&self, job: Arc<Job>) {
        self.current.store(Some(job));
    }

    /// Marks every job stale
    pub fn clear(&self) {
        self.current.store(None);
    }

    /// True when `job_id` names the current job
    pub fn is_current(&self, job_id: &str) -> bool {
        match &*self.current.load() {
            Some(job) => job.job_id == job_id,
            None => false,
        }
    }
}

impl Default for JobBoard {
    fn default() -> Self {
        Self::new()
    }
}

/// Lifecycle of a worker as seen by the dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStatus {
    /// Spawned, waiting for its hasher
    Initializing,
    /// Hasher ready, can take jobs
    Ready,
    /// Hasher creation failed; the thread has exited
    Failed,
}

/// Dispatcher-side bookkeeping for one worker
pub struct WorkerHandle {
    worker: Worker,
    status: WorkerStatus,
    assigned_job: Option<String>,
}

impl WorkerHandle {
    /// Worker id and generation
    pub fn tag(&self) -> WorkerTag {
        self.worker.tag()
    }

    /// Current status
    pub fn status(&self) -> WorkerStatus {
        self.status
    }

    /// Job last sent to the worker
    pub fn assigned_job(&self) -> Option<&str> {
        self.assigned_job.as_deref()
    }

    fn assign(&mut self, job: &Arc<Job>) {
        self.worker.assign(Arc::clone(job));
        self.assigned_job = Some(job.job_id.clone());
    }
}

/// Outcome of dispatching one job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobDispatch {
    /// Whether the seed changed and the pool was rebuilt
    pub rebuilt: bool,
    /// Context generation the job runs on
    pub generation: u64,
    /// Workers the job was sent to or queued for
    pub workers: usize,
}

/// What a worker event means for the aggregator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerOutput {
    /// Digests completed for the current job
    Hashes(u64),
    /// Qualifying share for the current job
    Share(ShareSubmission),
    /// Output for a superseded job or generation, discarded
    Stale,
}

/// Coordinates jobs across worker threads
pub struct Dispatcher {
    contexts: ContextManager,
    board: Arc<JobBoard>,
    events: Sender<WorkerEvent>,
    batch_size: u64,
    thread_count: usize,
    workers: Vec<WorkerHandle>,
    /// Workers that do not hold a job yet, in creation order
    awaiting_job: VecDeque<WorkerId>,
    current_job: Option<Arc<Job>>,
    paused: bool,
}

impl Dispatcher {
    /// Creates a dispatcher with no workers
    ///
    /// # Arguments
    /// * `algorithm` - Hashing backend used to build contexts
    /// * `events` - Channel workers report on; the receiver belongs to the controller
    /// * `batch_size` - Digests per worker throughput report
    pub fn new(algorithm: Arc<dyn Algorithm>, events: Sender<WorkerEvent>, batch_size: u64) -> Self {
        Dispatcher {
            contexts: ContextManager::new(algorithm),
            board: Arc::new(JobBoard::new()),
            events,
            batch_size,
            thread_count: 1,
            workers: Vec::new(),
            awaiting_job: VecDeque::new(),
            current_job: None,
            paused: false,
        }
    }

    /// Records the pool size; workers are created once the first job names a seed
    pub fn start(&mut self, thread_count: usize) {
        self.thread_count = thread_count.max(1);
        self.paused = false;
    }

    /// Handles a job from the pool
    ///
    /// The job is published before anything else so all output for the
    /// previous job is stale from this point on.
    ///
    /// # Errors
    /// `ContextBuild` when the new seed's dataset cannot be built; the pool is
    /// left empty and the job withdrawn.
    pub fn on_job(&mut self, job: Job) -> Result<JobDispatch, MinerError> {
        let job = Arc::new(job);
        self.board.publish(Arc::clone(&job));
        self.current_job = Some(Arc::clone(&job));

        let rebuilt = self.contexts.needs_rebuild(&job.seed);
        if rebuilt {
            if let Err(e) = self.rebuild_workers(&job.seed) {
                self.stop();
                return Err(e);
            }
        }

        self.broadcast(&job);

        Ok(JobDispatch {
            rebuilt,
            generation: self.generation().unwrap_or_default(),
            workers: self.workers.len(),
        })
    }

    /// Tears down the pool and builds a fresh one for `seed`
    fn rebuild_workers(&mut self, seed: &Seed) -> Result<(), MinerError> {
        self.teardown_workers();
        let generation = self.contexts.rebuild(seed)?.clone();

        for id in 0..self.thread_count {
            let tag = WorkerTag {
                id,
                generation: generation.id,
            };
            let worker = Worker::spawn(
                tag,
                Arc::clone(&self.board),
                self.events.clone(),
                self.batch_size,
            )?;
            worker.init(Arc::clone(&generation.context));
            if self.paused {
                worker.pause();
            }

            self.workers.push(WorkerHandle {
                worker,
                status: WorkerStatus::Initializing,
                assigned_job: None,
            });
            self.awaiting_job.push_back(id);
        }

        log::info!(
            "Started {} workers on generation {}",
            self.thread_count,
            generation.id
        );
        Ok(())
    }

    /// Sends `job` to every ready worker; initializing ones get it once ready
    fn broadcast(&mut self, job: &Arc<Job>) {
        for handle in &mut self.workers {
            if handle.status == WorkerStatus::Ready {
                handle.assign(job);
            }
        }

        let workers = &self.workers;
        self.awaiting_job.retain(|id| {
            workers
                .get(*id)
                .is_some_and(|handle| handle.status == WorkerStatus::Initializing)
        });
    }

    /// Interprets a worker event
    ///
    /// Returns `None` for events that carry nothing for the aggregator.
    pub fn on_worker_event(&mut self, event: WorkerEvent) -> Option<WorkerOutput> {
        let tag = event.worker();
        let index = self.workers.iter().position(|handle| handle.tag() == tag);

        match event {
            WorkerEvent::Initialized { .. } => {
                let handle = self.workers.get_mut(index?)?;
                handle.status = WorkerStatus::Ready;

                if let Some(job) = &self.current_job {
                    handle.assign(job);
                    self.awaiting_job.retain(|id| *id != tag.id);
                }
                log::debug!("Worker {} ready", tag.id);
                None
            }
            WorkerEvent::Hashrate { job_id, count, .. } => {
                if index.is_some() && self.is_current_job(&job_id) {
                    Some(WorkerOutput::Hashes(count))
                } else {
                    Some(WorkerOutput::Stale)
                }
            }
            WorkerEvent::Result { share, .. } => {
                if index.is_some() && self.is_current_job(&share.job_id) {
                    Some(WorkerOutput::Share(share))
                } else {
                    log::debug!("Discarding stale share for job {}", share.job_id);
                    Some(WorkerOutput::Stale)
                }
            }
            WorkerEvent::Error { message, .. } => {
                let handle = self.workers.get_mut(index?)?;
                if handle.status == WorkerStatus::Initializing {
                    log::error!("Worker {} failed to initialize: {}", tag.id, message);
                    handle.status = WorkerStatus::Failed;
                    self.awaiting_job.retain(|id| *id != tag.id);
                } else {
                    log::warn!("Worker {} error: {}", tag.id, message);
                }
                None
            }
        }
    }

    /// Pauses every worker; jobs and context are kept
    pub fn pause(&mut self) {
        self.paused = true;
        for handle in &self.workers {
            handle.worker.pause();
        }
    }

    /// Resumes every worker on its retained job
    pub fn resume(&mut self) {
        self.paused = false;
        for handle in &self.workers {
            handle.worker.resume();
        }
    }

    /// Joins every worker, releases the context and withdraws the job
    ///
    /// When this returns no worker thread exists any more.
    pub fn stop(&mut self) {
        self.board.clear();
        self.current_job = None;
        self.teardown_workers();
        self.contexts.release();
        self.paused = false;
    }

    fn teardown_workers(&mut self) {
        if self.workers.is_empty() {
            return;
        }

        // Signal everyone first so the joins overlap
        for handle in &mut self.workers {
            handle.worker.signal_stop();
        }
        let count = self.workers.len();
        for mut handle in self.workers.drain(..) {
            handle.worker.stop();
        }
        self.awaiting_job.clear();
        log::debug!("Tore down {} workers", count);
    }

    fn is_current_job(&self, job_id: &str) -> bool {
        self.current_job
            .as_ref()
            .is_some_and(|job| job.job_id == job_id)
    }

    /// Current job, if any
    pub fn current_job(&self) -> Option<&Arc<Job>> {
        self.current_job.as_ref()
    }

    /// Generation of the resident context
    pub fn generation(&self) -> Option<u64> {
        self.contexts.current().map(|generation| generation.id)
    }

    /// Number of context builds so far
    pub fn rebuild_count(&self) -> u64 {
        self.contexts.rebuild_count()
    }

    /// Worker bookkeeping, in id order
    pub fn workers(&self) -> &[WorkerHandle] {
        &self.workers
    }

    /// Workers still waiting for their first job
    pub fn awaiting_job(&self) -> usize {
        self.awaiting_job.len()
    }

    /// Configured pool size
    pub fn thread_count(&self) -> usize {
        self.thread_count
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.stop();
    }
}
