//! Job management and cancellation system.
//!
//! Long-running work (gallery saves, image downloads) is cancelled
//! cooperatively: a [`CancelToken`] is checked between steps and awaited
//! alongside in-flight network operations.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tokio::sync::Notify;

use crate::utils::error::{AppError, AppResult};

/// Unique identifier for a job.
pub type JobId = u64;

#[derive(Debug, Default)]
struct TokenState {
    cancelled: AtomicBool,
    notify: Notify,
}

/// Token for checking and signaling job cancellation.
///
/// Clone this token to share cancellation state across tasks. A child token
/// observes its parent's cancellation, but cancelling the child leaves the
/// parent untouched.
#[derive(Debug, Clone)]
pub struct CancelToken {
    state: Arc<TokenState>,
    parent: Option<Box<CancelToken>>,
    job_id: JobId,
}

impl CancelToken {
    /// Create a new cancel token for the given job ID.
    pub fn new(job_id: JobId) -> Self {
        Self {
            state: Arc::new(TokenState::default()),
            parent: None,
            job_id,
        }
    }

    /// Create a token that is cancelled together with `self`.
    pub fn child_token(&self) -> Self {
        Self {
            state: Arc::new(TokenState::default()),
            parent: Some(Box::new(self.clone())),
            job_id: self.job_id,
        }
    }

    /// Check if cancellation has been requested.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::Acquire)
            || self.parent.as_ref().is_some_and(|p| p.is_cancelled())
    }

    /// Request cancellation of this job.
    pub fn cancel(&self) {
        self.state.cancelled.store(true, Ordering::Release);
        self.state.notify.notify_waiters();
    }

    /// Return `Err(AppError::Cancelled)` once cancellation was requested.
    pub fn check(&self) -> AppResult<()> {
        if self.is_cancelled() {
            Err(AppError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Get the job ID associated with this token.
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Resolve once this token or any ancestor is cancelled.
    pub fn cancelled(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            match &self.parent {
                Some(parent) => {
                    tokio::select! {
                        _ = self.own_cancelled() => {}
                        _ = parent.cancelled() => {}
                    }
                }
                None => self.own_cancelled().await,
            }
        })
    }

    async fn own_cancelled(&self) {
        loop {
            let notified = self.state.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.state.cancelled.load(Ordering::Acquire) {
                return;
            }
            notified.await;
        }
    }

    /// Run `fut` unless the token is cancelled first.
    pub async fn run<F, T>(&self, fut: F) -> AppResult<T>
    where
        F: Future<Output = AppResult<T>>,
    {
        self.check()?;
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(AppError::Cancelled),
            result = fut => result,
        }
    }
}

/// Manager for tracking and cancelling long-running jobs.
#[derive(Debug, Default)]
pub struct JobManager {
    next_id: AtomicU64,
    jobs: RwLock<HashMap<JobId, CancelToken>>,
}

impl JobManager {
    /// Create a new job manager.
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            jobs: RwLock::new(HashMap::new()),
        }
    }

    /// Start a new job and return its cancel token.
    pub fn start_job(&self) -> CancelToken {
        let job_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = CancelToken::new(job_id);

        if let Ok(mut jobs) = self.jobs.write() {
            jobs.insert(job_id, token.clone());
        }

        token
    }

    /// Cancel all running jobs.
    pub fn cancel_all(&self) {
        if let Ok(jobs) = self.jobs.read() {
            for token in jobs.values() {
                token.cancel();
            }
        }
    }

    /// Remove a completed job from tracking.
    pub fn complete_job(&self, job_id: JobId) {
        if let Ok(mut jobs) = self.jobs.write() {
            jobs.remove(&job_id);
        }
    }
}
