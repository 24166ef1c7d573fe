//! Worker pool for concurrent service calls.

use crate::error::MultiplexResult;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::{Builder, Runtime};
use tokio::sync::oneshot;

const PENDING: u8 = 0;
const STARTED: u8 = 1;
const ABANDONED: u8 = 2;

/// One unit of work for the pool.
pub struct Job<T> {
    label: String,
    work: Box<dyn FnOnce() -> Result<T, String> + Send + 'static>,
}

impl<T> Job<T> {
    /// Creates a job. `label` names the target in the outcome.
    pub fn new<F>(label: impl Into<String>, work: F) -> Self
    where
        F: FnOnce() -> Result<T, String> + Send + 'static,
    {
        Self {
            label: label.into(),
            work: Box::new(work),
        }
    }
}

/// What became of one job: exactly one of `result` and `error` is set.
#[derive(Debug, Clone, PartialEq)]
pub struct JobOutcome<T> {
    /// The job's label.
    pub label: String,
    /// The value the job produced.
    pub result: Option<T>,
    /// Why the job failed or timed out.
    pub error: Option<String>,
}

impl<T> JobOutcome<T> {
    fn success(label: String, value: T) -> Self {
        Self {
            label,
            result: Some(value),
            error: None,
        }
    }

    fn failure(label: String, error: String) -> Self {
        Self {
            label,
            result: None,
            error: Some(error),
        }
    }

    /// Returns true if the job produced a value.
    pub fn is_success(&self) -> bool {
        self.result.is_some()
    }
}

/// Runs blocking jobs on a fixed set of threads and joins them.
///
/// A job's timeout counts from the moment it gets a thread, so jobs queued
/// behind slow ones are not charged for the wait. Waiting for a thread is
/// bounded by the same timeout. A job that overruns is recorded as a
/// timeout failure; its thread is left to finish on its own and stays
/// busy until then.
pub struct WorkerPool {
    runtime: Option<Runtime>,
    timeout: Duration,
}

impl WorkerPool {
    /// Creates a pool of `workers` threads.
    pub fn new(workers: usize, timeout: Duration) -> MultiplexResult<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(workers.max(1))
            .thread_name("hostbase-multiplex")
            .enable_time()
            .build()?;
        Ok(Self {
            runtime: Some(runtime),
            timeout,
        })
    }

    /// Returns the per-job timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Runs every job concurrently and blocks until each has finished or
    /// timed out. Outcomes come back in job order.
    ///
    /// Must not be called from within an async context.
    pub fn run_all<T>(&self, jobs: Vec<Job<T>>) -> Vec<JobOutcome<T>>
    where
        T: Send + 'static,
    {
        let Some(runtime) = &self.runtime else {
            return jobs
                .into_iter()
                .map(|job| JobOutcome::failure(job.label, "worker pool shut down".into()))
                .collect();
        };
        let timeout = self.timeout;
        runtime.block_on(async move {
            let pending: Vec<_> = jobs
                .into_iter()
                .map(|job| {
                    let label = job.label;
                    let work = job.work;
                    let (started_tx, started_rx) = oneshot::channel::<()>();
                    let state = Arc::new(AtomicU8::new(PENDING));
                    let claim = Arc::clone(&state);
                    let handle = tokio::task::spawn_blocking(move || {
                        if claim
                            .compare_exchange(PENDING, STARTED, Ordering::AcqRel, Ordering::Acquire)
                            .is_err()
                        {
                            return Err("abandoned before it started".to_string());
                        }
                        let _ = started_tx.send(());
                        work()
                    });
                    let task_label = label.clone();
                    let task = tokio::spawn(async move {
                        let label = task_label;
                        let waited = tokio::time::timeout(timeout, started_rx).await;
                        // A job that got its thread meanwhile is waited for normally.
                        let abandoned = waited.is_err()
                            && state
                                .compare_exchange(
                                    PENDING,
                                    ABANDONED,
                                    Ordering::AcqRel,
                                    Ordering::Acquire,
                                )
                                .is_ok();
                        if abandoned {
                            tracing::warn!(
                                service = %label,
                                ?timeout,
                                "no worker free for service call"
                            );
                            return JobOutcome::failure(
                                label,
                                format!("not started within {timeout:?}"),
                            );
                        }
                        if let Ok(Err(_)) = waited {
                            return JobOutcome::failure(label, "worker pool shut down".into());
                        }
                        match tokio::time::timeout(timeout, handle).await {
                            Ok(Ok(Ok(value))) => JobOutcome::success(label, value),
                            Ok(Ok(Err(error))) => JobOutcome::failure(label, error),
                            Ok(Err(join_error)) => {
                                JobOutcome::failure(label, format!("worker failed: {join_error}"))
                            }
                            Err(_) => {
                                tracing::warn!(service = %label, ?timeout, "service call timed out");
                                JobOutcome::failure(label, format!("timed out after {timeout:?}"))
                            }
                        }
                    });
                    (label, task)
                })
                .collect();

            let mut outcomes = Vec::with_capacity(pending.len());
            for (label, task) in pending {
                outcomes.push(task.await.unwrap_or_else(|join_error| {
                    JobOutcome::failure(label, format!("worker failed: {join_error}"))
                }));
            }
            outcomes
        })
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
