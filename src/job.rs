use std::fmt;
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, error};

use crate::errors::{EnhanceError, ErrorKind, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    LoadModel,
    Enhance,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LoadModel => f.write_str("load-model"),
            Self::Enhance => f.write_str("enhance"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Running,
    Completed,
    Failed,
}

/// A job error after it has crossed the job boundary and been logged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{job} failed: {message}")]
pub struct JobFailure {
    pub job: JobKind,
    pub kind: ErrorKind,
    pub message: String,
}

pub type JobResult<T> = std::result::Result<T, JobFailure>;

/// Completion side of a background job.
///
/// The result arrives over a one-shot channel; the UI thread either awaits it as
/// a future or checks it without blocking via [`JobHandle::try_finish`].
pub struct JobHandle<T> {
    kind: JobKind,
    state: Arc<Mutex<JobState>>,
    receiver: oneshot::Receiver<Result<T>>,
}

/// Run `work` on its own throwaway thread.
pub fn spawn<T, F>(kind: JobKind, work: F) -> JobHandle<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    let (sender, receiver) = oneshot::channel();
    let state = Arc::new(Mutex::new(JobState::Pending));
    let worker_state = Arc::clone(&state);

    let spawned = thread::Builder::new()
        .name(format!("job-{kind}"))
        .spawn(move || {
            *worker_state.lock() = JobState::Running;
            debug!(%kind, "job started");
            let result = work();
            *worker_state.lock() = if result.is_ok() {
                JobState::Completed
            } else {
                JobState::Failed
            };
            // The receiver may already be gone if the UI shut down.
            let _ = sender.send(result);
        });

    if let Err(e) = spawned {
        error!(%kind, error = %e, "failed to spawn job thread");
        *state.lock() = JobState::Failed;
    }

    JobHandle {
        kind,
        state,
        receiver,
    }
}

impl<T> JobHandle<T> {
    pub const fn kind(&self) -> JobKind {
        self.kind
    }

    pub fn state(&self) -> JobState {
        *self.state.lock()
    }

    pub async fn wait(self) -> JobResult<T> {
        let outcome = self.receiver.await.ok();
        settle(self.kind, &self.state, outcome)
    }

    /// Block the calling thread until the job reports. Not for the UI thread.
    pub fn blocking_wait(self) -> JobResult<T> {
        let outcome = self.receiver.blocking_recv().ok();
        settle(self.kind, &self.state, outcome)
    }

    /// Non-blocking check; `None` while the job is still pending or running.
    pub fn try_finish(&mut self) -> Option<JobResult<T>> {
        match self.receiver.try_recv() {
            Ok(outcome) => Some(settle(self.kind, &self.state, Some(outcome))),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => {
                Some(settle(self.kind, &self.state, None))
            }
        }
    }
}

fn settle<T>(
    job: JobKind,
    state: &Mutex<JobState>,
    outcome: Option<Result<T>>,
) -> JobResult<T> {
    let error = match outcome {
        Some(Ok(value)) => return Ok(value),
        Some(Err(error)) => error,
        None => {
            *state.lock() = JobState::Failed;
            EnhanceError::JobAborted {
                job: job.to_string(),
            }
        }
    };

    error!(%job, error = %error, "background job failed");
    Err(JobFailure {
        job,
        kind: error.kind(),
        message: error.to_string(),
    })
}

/// Single-occupancy slot guarding the model handle.
///
/// At most one job holds the slot; it is released when the [`SlotGuard`] drops.
#[derive(Debug, Clone, Default)]
pub struct JobSlot {
    active: Arc<Mutex<Option<JobKind>>>,
}

#[derive(Debug)]
pub struct SlotGuard {
    active: Arc<Mutex<Option<JobKind>>>,
    kind: JobKind,
}

impl JobSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the slot, or report which job currently holds it.
    pub fn try_acquire(&self, kind: JobKind) -> std::result::Result<SlotGuard, JobKind> {
        let mut active = self.active.lock();
        if let Some(busy) = *active {
            return Err(busy);
        }
        *active = Some(kind);
        Ok(SlotGuard {
            active: Arc::clone(&self.active),
            kind,
        })
    }

    pub fn active(&self) -> Option<JobKind> {
        *self.active.lock()
    }

    pub fn is_idle(&self) -> bool {
        self.active().is_none()
    }
}

impl SlotGuard {
    pub const fn kind(&self) -> JobKind {
        self.kind
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        *self.active.lock() = None;
    }
}
