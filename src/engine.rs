//! Parallel password search over a [`CandidateSpace`].
//!
//! Every job builds its own rayon pool. Workers scan contiguous shards of the
//! candidate index space and share exactly two flags: the job-local stop flag,
//! raised by the first worker that finds the password or hits a hard error,
//! and the caller's [`CancelToken`].

use std::ops::Range;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use indicatif::ProgressBar;
use rayon::{ThreadPoolBuilder, prelude::*};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::candidate::CandidateSpace;
use crate::error::{EngineError, Result};

/// Answers whether a single candidate unlocks the target.
pub trait PasswordVerifier: Sync {
    /// `Ok(false)` for a wrong password; `Err` aborts the whole job.
    fn verify(&self, candidate: &str) -> Result<bool>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Idle,
    Running,
    Found,
    Exhausted,
    Cancelled,
    Failed,
}

impl JobState {
    /// True once the job can no longer change state.
    pub fn is_terminal(self) -> bool {
        !matches!(self, JobState::Idle | JobState::Running)
    }
}

/// Externally triggered stop signal, cheap to clone and share.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// A token that has not been cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Asks every job holding this token to stop.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Whether [`CancelToken::cancel`] was called.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Returns a guard that cancels the token when dropped.
    pub fn drop_guard(&self) -> CancelOnDrop {
        CancelOnDrop(self.clone())
    }
}

/// Cancels its token on drop, e.g. when an HTTP handler future is abandoned.
#[derive(Debug)]
pub struct CancelOnDrop(CancelToken);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

/// Outcome of a finished job.
#[derive(Debug, Clone, Serialize)]
pub struct CrackReport {
    pub state: JobState,
    pub password: Option<String>,
    pub attempts: u64,
    pub elapsed: Duration,
}

/// A single search request and its lifecycle.
#[derive(Debug)]
pub struct CrackJob {
    space: CandidateSpace,
    state: JobState,
    report: Option<CrackReport>,
}

impl CrackJob {
    /// An idle job over `space`.
    pub fn new(space: CandidateSpace) -> Self {
        Self {
            space,
            state: JobState::Idle,
            report: None,
        }
    }

    /// Candidates the job searches.
    pub fn space(&self) -> &CandidateSpace {
        &self.space
    }

    /// Current lifecycle state.
    pub fn state(&self) -> JobState {
        self.state
    }

    /// Outcome, once the job reached a terminal state without error.
    pub fn report(&self) -> Option<&CrackReport> {
        self.report.as_ref()
    }
}

/// Coordinates the worker pool of a crack job.
#[derive(Debug, Clone, Copy)]
pub struct CrackEngine {
    workers: usize,
    max_candidates: u64,
    shard_retries: usize,
}

impl CrackEngine {
    /// `workers == 0` selects one worker per available core.
    pub fn new(workers: usize, max_candidates: u64, shard_retries: usize) -> Self {
        let workers = if workers == 0 {
            std::thread::available_parallelism()
                .map(|p| p.get())
                .unwrap_or(4)
        } else {
            workers
        };

        Self {
            workers,
            max_candidates,
            shard_retries,
        }
    }

    /// Resolved worker count, never zero.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Largest admitted candidate space.
    pub fn max_candidates(&self) -> u64 {
        self.max_candidates
    }

    /// Rejects spaces larger than the configured ceiling before any work starts.
    pub fn admit(&self, space: &CandidateSpace) -> Result<()> {
        if space.len() > self.max_candidates {
            return Err(EngineError::ResourceExceeded(format!(
                "{} candidates exceed the limit of {}",
                space.len(),
                self.max_candidates
            )));
        }
        Ok(())
    }

    /// Runs `job` to a terminal state.
    ///
    /// Found, exhausted and cancelled searches return `Ok`; input errors,
    /// verifier errors and repeatedly crashing shards leave the job `Failed`
    /// and return the error.
    pub fn run<V: PasswordVerifier>(
        &self,
        job: &mut CrackJob,
        verifier: &V,
        cancel: &CancelToken,
        progress: Option<&ProgressBar>,
    ) -> Result<CrackReport> {
        let start = Instant::now();

        if let Err(e) = self.prepare(&job.space) {
            job.state = JobState::Failed;
            return Err(e);
        }

        let pool = match ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .thread_name(|i| format!("crack-worker-{i}"))
            .build()
        {
            Ok(pool) => pool,
            Err(e) => {
                job.state = JobState::Failed;
                return Err(EngineError::Processing(format!(
                    "failed to initialize thread pool: {e}"
                )));
            }
        };

        job.state = JobState::Running;
        let shards = job.space.shards(self.workers);
        info!(
            mode = job.space.mode(),
            candidates = job.space.len(),
            shards = shards.len(),
            workers = self.workers,
            "crack job started"
        );

        let stop = AtomicBool::new(false);
        let attempts = AtomicU64::new(0);
        let ctx = ShardContext {
            space: &job.space,
            verifier,
            cancel,
            stop: &stop,
            attempts: &attempts,
            progress,
        };

        let search = pool.install(|| {
            let scan = |shard: &Range<u64>| self.supervise(&ctx, shard.clone());
            if self.workers == 1 {
                // A lone worker keeps the declared candidate order exactly.
                shards.iter().find_map(scan)
            } else {
                shards.par_iter().find_map_any(scan)
            }
        });
        drop(pool);

        let attempts = attempts.load(Ordering::Relaxed);
        let elapsed = start.elapsed();

        let (state, password) = match search {
            Some(Ok(password)) => (JobState::Found, Some(password)),
            Some(Err(e)) => {
                warn!(error = %e, attempts, "crack job failed");
                job.state = JobState::Failed;
                return Err(e);
            }
            None if cancel.is_cancelled() => (JobState::Cancelled, None),
            None => (JobState::Exhausted, None),
        };

        info!(?state, attempts, elapsed = ?elapsed, "crack job finished");

        let report = CrackReport {
            state,
            password,
            attempts,
            elapsed,
        };
        job.state = state;
        job.report = Some(report.clone());
        Ok(report)
    }

    fn prepare(&self, space: &CandidateSpace) -> Result<()> {
        if space.is_empty() {
            return Err(EngineError::InvalidInput(
                "candidate space is empty".to_string(),
            ));
        }
        self.admit(space)
    }

    /// Scans one shard, restarting it if the worker panics.
    fn supervise<V: PasswordVerifier>(
        &self,
        ctx: &ShardContext<'_, V>,
        shard: Range<u64>,
    ) -> Option<Result<String>> {
        let mut restarts = 0;
        loop {
            debug!(start = shard.start, end = shard.end, restarts, "scanning shard");
            match panic::catch_unwind(AssertUnwindSafe(|| scan_shard(ctx, shard.clone()))) {
                Ok(outcome) => return outcome,
                Err(_) if restarts < self.shard_retries => {
                    restarts += 1;
                    warn!(
                        start = shard.start,
                        end = shard.end,
                        restarts,
                        "worker panicked, rescheduling shard"
                    );
                }
                Err(_) => {
                    ctx.stop.store(true, Ordering::Release);
                    return Some(Err(EngineError::Processing(format!(
                        "worker crashed on candidates {}..{} after {} restarts",
                        shard.start, shard.end, restarts
                    ))));
                }
            }
        }
    }
}

struct ShardContext<'a, V> {
    space: &'a CandidateSpace,
    verifier: &'a V,
    cancel: &'a CancelToken,
    stop: &'a AtomicBool,
    attempts: &'a AtomicU64,
    progress: Option<&'a ProgressBar>,
}

impl<V> ShardContext<'_, V> {
    fn should_stop(&self) -> bool {
        self.stop.load(Ordering::Acquire) || self.cancel.is_cancelled()
    }
}

/// Exhaustively tries the candidates of one shard, returning the first success.
fn scan_shard<V: PasswordVerifier>(
    ctx: &ShardContext<'_, V>,
    shard: Range<u64>,
) -> Option<Result<String>> {
    let mut buffer = String::new();

    for index in shard {
        if ctx.should_stop() {
            return None;
        }

        ctx.space.candidate_at(index, &mut buffer);
        let attempt = ctx.verifier.verify(&buffer);
        ctx.attempts.fetch_add(1, Ordering::Relaxed);
        if let Some(progress) = ctx.progress {
            progress.inc(1);
        }

        match attempt {
            Ok(true) => {
                ctx.stop.store(true, Ordering::Release);
                return Some(Ok(buffer));
            }
            Ok(false) => continue,
            Err(e) => {
                ctx.stop.store(true, Ordering::Release);
                return Some(Err(e));
            }
        }
    }

    None
}
