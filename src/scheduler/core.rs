//! Fixed-size worker pool with a reusable completion barrier.
//!
//! Tasks are submitted one at a time and run on a private rayon pool.
//! `barrier()` blocks on a condition variable until every task submitted
//! since the previous barrier has finished, then reports the first failure
//! of that cycle. A failure trips the cycle's cancel token: queued tasks are
//! skipped and running tasks can stop early, but the barrier still waits for
//! all of them, so no task from a finished cycle is ever left running.
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::error::{Error, Result};

/// Cooperative cancellation signal shared by every task of one cycle.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// `Err(Cancelled)` once the token has been tripped.
    #[inline]
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Returned by `submit`; lets the caller poll a single task.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    id: u64,
    finished: Arc<AtomicBool>,
}

impl TaskHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }
}

/// Book-keeping for the tasks submitted since the last barrier.
struct Cycle {
    pending: usize,
    first_error: Option<Error>,
    token: CancelToken,
}

struct Shared {
    cycle: Mutex<Cycle>,
    drained: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Cycle> {
        // Tasks never panic while holding the lock; recover the guard anyway.
        self.cycle.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn complete(&self, outcome: Result<()>) {
        let mut cycle = self.lock();
        if let Err(e) = outcome {
            if cycle.first_error.is_none() {
                cycle.token.cancel();
                cycle.first_error = Some(e);
            } else {
                debug!("suppressing follow-up task error: {}", e);
            }
        }
        cycle.pending -= 1;
        if cycle.pending == 0 {
            self.drained.notify_all();
        }
    }
}

pub struct TaskScheduler {
    pool: rayon::ThreadPool,
    shared: Arc<Shared>,
    next_id: AtomicU64,
}

impl TaskScheduler {
    /// Build a pool of `threads` workers; `None` sizes it to host parallelism.
    pub fn new(threads: Option<usize>) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads.unwrap_or(0))
            .thread_name(|i| format!("breachmerge-{}", i))
            .build()
            .map_err(|e| Error::InvalidConfig(format!("cannot start worker pool: {}", e)))?;
        Ok(TaskScheduler {
            pool,
            shared: Arc::new(Shared {
                cycle: Mutex::new(Cycle {
                    pending: 0,
                    first_error: None,
                    token: CancelToken::new(),
                }),
                drained: Condvar::new(),
            }),
            next_id: AtomicU64::new(0),
        })
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Queue a task for the current cycle.
    pub fn submit<F>(&self, task: F) -> TaskHandle
    where
        F: FnOnce(&CancelToken) -> Result<()> + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let finished = Arc::new(AtomicBool::new(false));
        let token = {
            let mut cycle = self.shared.lock();
            cycle.pending += 1;
            cycle.token.clone()
        };

        let shared = Arc::clone(&self.shared);
        let done = Arc::clone(&finished);
        self.pool.spawn(move || {
            let outcome = if token.is_cancelled() {
                Err(Error::Cancelled)
            } else {
                match panic::catch_unwind(AssertUnwindSafe(|| task(&token))) {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => Err(Error::TaskFailed {
                        task: id,
                        source: Box::new(e),
                    }),
                    Err(payload) => Err(Error::TaskPanicked {
                        task: id,
                        message: panic_message(payload.as_ref()),
                    }),
                }
            };
            done.store(true, Ordering::Release);
            shared.complete(outcome);
        });

        TaskHandle { id, finished }
    }

    /// Trip the cancel token of the current cycle.
    pub fn cancel(&self) {
        self.shared.lock().token.cancel();
    }

    /// Block until every task of the current cycle has finished.
    pub fn barrier(&self) -> Result<()> {
        self.wait(None)
    }

    /// Like `barrier`, but cancels the cycle once `deadline` elapses.
    /// Running tasks are still awaited after cancellation.
    pub fn barrier_timeout(&self, deadline: Duration) -> Result<()> {
        self.wait(Some(deadline))
    }

    fn wait(&self, deadline: Option<Duration>) -> Result<()> {
        let start = Instant::now();
        let mut expired = false;
        let mut cycle = self.shared.lock();

        while cycle.pending > 0 {
            match deadline {
                Some(limit) if !expired => {
                    let elapsed = start.elapsed();
                    if elapsed >= limit {
                        warn!(
                            "barrier deadline of {:?} exceeded with {} task(s) pending; cancelling",
                            limit, cycle.pending
                        );
                        expired = true;
                        cycle.token.cancel();
                        continue;
                    }
                    cycle = self
                        .shared
                        .drained
                        .wait_timeout(cycle, limit - elapsed)
                        .unwrap_or_else(|e| e.into_inner())
                        .0;
                }
                _ => {
                    cycle = self
                        .shared
                        .drained
                        .wait(cycle)
                        .unwrap_or_else(|e| e.into_inner());
                }
            }
        }

        let first_error = cycle.first_error.take();
        cycle.token = CancelToken::new();
        drop(cycle);

        match (expired, first_error, deadline) {
            (true, Some(e), Some(limit)) => {
                debug!("task error hidden by deadline: {}", e);
                Err(Error::DeadlineExceeded(limit))
            }
            (true, None, Some(limit)) => Err(Error::DeadlineExceeded(limit)),
            (_, Some(e), _) => Err(e),
            _ => Ok(()),
        }
    }
}

impl Drop for TaskScheduler {
    fn drop(&mut self) {
        // rayon detaches spawned jobs on drop; wait so no task outlives its owner.
        if let Err(e) = self.wait(None) {
            warn!("task failed during scheduler shutdown: {}", e);
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
