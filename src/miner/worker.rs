// src/miner/worker.rs
//! Worker thread implementation
//!
//! Each worker is a dedicated OS thread that owns one hasher and iterates the
//! nonce space of its assigned job. It talks to the dispatcher only through
//! messages: commands in, events out. Between two nonces it polls its command
//! channel and re-checks the job board, which is how job switches, pauses and
//! stops cancel in-flight work without interrupting a digest.

use crate::miner::algorithm::{DigestContext, DigestHasher};
use crate::miner::dispatcher::JobBoard;
use crate::miner::job::{Job, ShareSubmission, write_nonce};
use crate::miner::target::meets_target;
use crate::utils::error::MinerError;
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Index of a worker within its generation
pub type WorkerId = usize;

/// Size of the 32-bit nonce space
const NONCE_SPACE: u64 = 1 << 32;

/// Identifies a worker and the context generation it is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkerTag {
    /// Worker index
    pub id: WorkerId,
    /// Generation of the context the worker hashes with
    pub generation: u64,
}

/// Control messages sent to a worker
pub enum WorkerCommand {
    /// Bind to the shared context of the current generation
    Init(Arc<dyn DigestContext>),
    /// Switch to a new job
    Job(Arc<Job>),
    /// Stop hashing, keep the job
    Pause,
    /// Continue hashing the retained job
    Resume,
    /// Exit the thread
    Stop,
}

/// Reports sent from a worker to the dispatcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    /// Hasher created, ready for a job
    Initialized {
        /// Reporting worker
        worker: WorkerTag,
    },
    /// Digests completed since the previous report
    Hashrate {
        /// Reporting worker
        worker: WorkerTag,
        /// Job the digests were computed for
        job_id: String,
        /// Number of digests
        count: u64,
    },
    /// A qualifying nonce
    Result {
        /// Reporting worker
        worker: WorkerTag,
        /// The share to forward
        share: ShareSubmission,
    },
    /// Initialization or digest failure
    Error {
        /// Reporting worker
        worker: WorkerTag,
        /// Human-readable failure
        message: String,
    },
}

impl WorkerEvent {
    /// Worker that produced the event
    pub fn worker(&self) -> WorkerTag {
        match self {
            WorkerEvent::Initialized { worker }
            | WorkerEvent::Hashrate { worker, .. }
            | WorkerEvent::Result { worker, .. }
            | WorkerEvent::Error { worker, .. } => *worker,
        }
    }
}

/// Handle to a running worker thread
///
/// Dropping the handle stops the thread and waits for it.
pub struct Worker {
    tag: WorkerTag,
    commands: Sender<WorkerCommand>,
    thread: Option<JoinHandle<()>>,
    stop_sent: bool,
}

impl Worker {
    /// Spawns a worker thread named `worker-<generation>-<id>`
    ///
    /// # Arguments
    /// * `tag` - Worker id and generation
    /// * `board` - Dispatcher's current-job board, read before every emission
    /// * `events` - Channel back to the dispatcher
    /// * `batch_size` - Digests per throughput report
    pub fn spawn(
        tag: WorkerTag,
        board: Arc<JobBoard>,
        events: Sender<WorkerEvent>,
        batch_size: u64,
    ) -> Result<Self, MinerError> {
        let (commands, command_rx) = crossbeam_channel::unbounded();

        let thread = thread::Builder::new()
            .name(format!("worker-{}-{}", tag.generation, tag.id))
            .spawn(move || {
                WorkerLoop {
                    tag,
                    commands: command_rx,
                    board,
                    events,
                    batch_size: batch_size.max(1),
                    hasher: None,
                    search: None,
                    paused: false,
                    pending_hashes: 0,
                }
                .run()
            })?;

        Ok(Worker {
            tag,
            commands,
            thread: Some(thread),
            stop_sent: false,
        })
    }

    /// Worker id and generation
    pub fn tag(&self) -> WorkerTag {
        self.tag
    }

    /// Hands the worker its shared context
    pub fn init(&self, context: Arc<dyn DigestContext>) {
        self.send(WorkerCommand::Init(context));
    }

    /// Assigns a job, replacing any previous one
    pub fn assign(&self, job: Arc<Job>) {
        self.send(WorkerCommand::Job(job));
    }

    /// Stops issuing digests while keeping the job
    pub fn pause(&self) {
        self.send(WorkerCommand::Pause);
    }

    /// Continues the retained job
    pub fn resume(&self) {
        self.send(WorkerCommand::Resume);
    }

    /// Asks the thread to exit without waiting for it
    pub fn signal_stop(&mut self) {
        if !self.stop_sent {
            self.stop_sent = true;
            self.send(WorkerCommand::Stop);
        }
    }

    /// Signals the thread to exit and waits until it has
    ///
    /// At most one in-progress digest delays the return.
    pub fn stop(&mut self) {
        self.signal_stop();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("Worker {} panicked", self.tag.id);
            }
        }
    }

    fn send(&self, command: WorkerCommand) {
        // A worker whose init failed has already exited; nothing to deliver
        if self.commands.send(command).is_err() {
            log::debug!("Worker {} is gone, command dropped", self.tag.id);
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Nonce search over one job
struct Search {
    job: Arc<Job>,
    /// Private copy of the template the nonce is written into
    blob: Vec<u8>,
    next_nonce: u32,
    attempts: u64,
}

impl Search {
    fn new(job: Arc<Job>) -> Self {
        Search {
            blob: job.blob.clone(),
            job,
            next_nonce: rand::random(),
            attempts: 0,
        }
    }

    /// Writes the next unexplored nonce into the blob
    ///
    /// `None` once all 2^32 nonces have been tried.
    fn advance(&mut self) -> Option<u32> {
        if self.attempts >= NONCE_SPACE {
            return None;
        }
        let nonce = self.next_nonce;
        write_nonce(&mut self.blob, nonce);
        self.next_nonce = nonce.wrapping_add(1);
        self.attempts += 1;
        Some(nonce)
    }
}

struct WorkerLoop {
    tag: WorkerTag,
    commands: Receiver<WorkerCommand>,
    board: Arc<JobBoard>,
    events: Sender<WorkerEvent>,
    batch_size: u64,
    hasher: Option<Box<dyn DigestHasher>>,
    search: Option<Search>,
    paused: bool,
    pending_hashes: u64,
}

impl WorkerLoop {
    fn run(mut self) {
        loop {
            let command = if self.is_hashing() {
                match self.commands.try_recv() {
                    Ok(command) => Some(command),
                    Err(TryRecvError::Empty) => None,
                    Err(TryRecvError::Disconnected) => break,
                }
            } else {
                match self.commands.recv() {
                    Ok(command) => Some(command),
                    Err(_) => break,
                }
            };

            match command {
                Some(command) => {
                    if !self.handle(command) {
                        break;
                    }
                }
                None => self.step(),
            }
        }

        log::debug!("Worker {} exiting", self.tag.id);
    }

    fn is_hashing(&self) -> bool {
        !self.paused && self.hasher.is_some() && self.search.is_some()
    }

    /// Applies a command; `false` ends the thread
    fn handle(&mut self, command: WorkerCommand) -> bool {
        match command {
            WorkerCommand::Init(context) => match context.hasher() {
                Ok(hasher) => {
                    self.hasher = Some(hasher);
                    self.emit(WorkerEvent::Initialized { worker: self.tag });
                    true
                }
                Err(e) => {
                    log::error!("Worker {} failed to create hasher: {}", self.tag.id, e);
                    self.emit(WorkerEvent::Error {
                        worker: self.tag,
                        message: e.to_string(),
                    });
                    false
                }
            },
            WorkerCommand::Job(job) => {
                log::trace!("Worker {} switching to job {}", self.tag.id, job.job_id);
                // Digests counted so far belong to the superseded job
                self.pending_hashes = 0;
                self.search = Some(Search::new(job));
                true
            }
            WorkerCommand::Pause => {
                self.flush_hashes();
                self.paused = true;
                true
            }
            WorkerCommand::Resume => {
                self.paused = false;
                true
            }
            WorkerCommand::Stop => false,
        }
    }

    /// Computes one digest for the next nonce
    fn step(&mut self) {
        let Some(job) = self.search.as_ref().map(|search| Arc::clone(&search.job)) else {
            return;
        };

        if !self.board.is_current(&job.job_id) {
            log::trace!("Worker {} abandoning stale job {}", self.tag.id, job.job_id);
            self.search = None;
            self.pending_hashes = 0;
            return;
        }

        let Some(search) = self.search.as_mut() else {
            return;
        };
        let Some(nonce) = search.advance() else {
            log::warn!("Worker {} exhausted the nonce space of job {}", self.tag.id, job.job_id);
            self.flush_hashes();
            self.search = None;
            return;
        };
        let Some(hasher) = self.hasher.as_mut() else {
            return;
        };

        match hasher.digest(&search.blob) {
            Ok(digest) => {
                self.pending_hashes += 1;
                if meets_target(&digest, &job.target) {
                    self.emit_for_job(
                        &job.job_id,
                        WorkerEvent::Result {
                            worker: self.tag,
                            share: ShareSubmission {
                                job_id: job.job_id.clone(),
                                nonce,
                                result: digest,
                            },
                        },
                    );
                }
            }
            // The failed nonce counts as tried; the search moves on to the next one
            Err(e) => {
                log::warn!("Worker {} digest failed at nonce {:08x}: {}", self.tag.id, nonce, e);
                self.emit(WorkerEvent::Error {
                    worker: self.tag,
                    message: e.to_string(),
                });
            }
        }

        if self.pending_hashes >= self.batch_size {
            self.flush_hashes();
        }
    }

    /// Reports pending digests for the current job, if it is still current
    fn flush_hashes(&mut self) {
        let count = std::mem::take(&mut self.pending_hashes);
        if count == 0 {
            return;
        }
        if let Some(job_id) = self.search.as_ref().map(|search| search.job.job_id.clone()) {
            self.emit_for_job(
                &job_id,
                WorkerEvent::Hashrate {
                    worker: self.tag,
                    job_id: job_id.clone(),
                    count,
                },
            );
        }
    }

    fn emit_for_job(&self, job_id: &str, event: WorkerEvent) {
        if self.board.is_current(job_id) {
            self.emit(event);
        } else {
            log::trace!("Worker {} dropped output for stale job {}", self.tag.id, job_id);
        }
    }

    fn emit(&self, event: WorkerEvent) {
        if self.events.send(event).is_err() {
            log::debug!("Worker {} event channel closed", self.tag.id);
        }
    }
}
