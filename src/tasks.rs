//! Tracked background tasks
//!
//! Panels start device commands (jogs, stops) from the GUI thread without
//! waiting for them. Every such command is spawned into the panel's
//! [`TaskSet`], so closing the panel can cancel whatever is still running
//! and wait until each task has actually settled.

use crate::error::{AppResult, WavefinderError};
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::runtime::Handle;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, warn};

type TaskOutput = (String, AppResult<()>);

#[derive(Default)]
struct Inner {
    tasks: JoinSet<TaskOutput>,
    closed: bool,
}

/// An owned set of labelled tasks running on a stored runtime.
pub struct TaskSet {
    name: String,
    runtime: Handle,
    inner: Mutex<Inner>,
}

impl TaskSet {
    /// Empty set spawning onto `runtime`.
    pub fn new(name: impl Into<String>, runtime: Handle) -> Self {
        Self {
            name: name.into(),
            runtime,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Empty set spawning onto the runtime of the calling context.
    ///
    /// # Panics
    /// Panics when called outside a Tokio runtime.
    pub fn current(name: impl Into<String>) -> Self {
        Self::new(name, Handle::current())
    }

    /// Name used in logs
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Start `future` as a member of the set.
    ///
    /// # Errors
    /// Returns [`WavefinderError::TasksClosed`] once [`close`](Self::close)
    /// has been called; the future is dropped without running.
    pub fn spawn<F>(&self, label: impl Into<String>, future: F) -> AppResult<()>
    where
        F: Future<Output = AppResult<()>> + Send + 'static,
    {
        let label = label.into();
        let mut inner = self.lock();
        if inner.closed {
            return Err(WavefinderError::TasksClosed(format!("{}/{label}", self.name)));
        }
        reap(&self.name, &mut inner.tasks);

        debug!(tasks = %self.name, task = %label, "Spawning task");
        inner
            .tasks
            .spawn_on(async move { (label, future.await) }, &self.runtime);
        Ok(())
    }

    /// Number of tasks not yet finished
    pub fn len(&self) -> usize {
        let mut inner = self.lock();
        reap(&self.name, &mut inner.tasks);
        inner.tasks.len()
    }

    /// True when no task is running
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether [`close`](Self::close) has been called
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Refuse new tasks, cancel every running one and wait until all settled.
    ///
    /// Returns how many tasks were cancelled. Calling it again is a no-op
    /// returning `0`.
    pub async fn close(&self) -> usize {
        let mut tasks = {
            let mut inner = self.lock();
            inner.closed = true;
            std::mem::take(&mut inner.tasks)
        };

        tasks.abort_all();
        let mut cancelled = 0;
        while let Some(result) = tasks.join_next().await {
            match result {
                Err(e) if e.is_cancelled() => cancelled += 1,
                other => log_outcome(&self.name, other),
            }
        }

        if cancelled > 0 {
            debug!(tasks = %self.name, cancelled, "Cancelled outstanding tasks");
        }
        cancelled
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for TaskSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("TaskSet")
            .field("name", &self.name)
            .field("running", &inner.tasks.len())
            .field("closed", &inner.closed)
            .finish()
    }
}

fn reap(name: &str, tasks: &mut JoinSet<TaskOutput>) {
    while let Some(result) = tasks.try_join_next() {
        log_outcome(name, result);
    }
}

fn log_outcome(name: &str, result: Result<TaskOutput, JoinError>) {
    match result {
        Ok((_, Ok(()))) => {}
        Ok((label, Err(e))) => {
            let failure = WavefinderError::TaskFailed {
                label,
                reason: e.to_string(),
            };
            warn!(tasks = name, error = %failure, "Task failed");
        }
        Err(e) => warn!(tasks = name, error = %e, "Task ended abnormally"),
    }
}
