//! Poll-until-condition primitive
//!
//! The scanning service never pushes completion events, so both waits in the
//! workflow repeatedly fetch a fresh snapshot until a condition on it holds.
//! The interval is fixed (no backoff growth, no attempt cap). A fetch error
//! ends the wait immediately; only a not-yet-true condition is retried.
//! Cancellation and an optional deadline bound the otherwise unbounded loop.

use log::debug;
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

use crate::error::{ExportError, ExportResult};

/// Interval used by the reference workflow
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Fixed-interval poller shared by the scan and export waits
#[derive(Debug, Clone)]
pub struct Poller {
    interval: Duration,
    deadline: Option<Duration>,
    cancel: CancellationToken,
}

impl Default for Poller {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

impl Poller {
    /// Create a poller with no deadline and its own cancellation token
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            deadline: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Wait `interval` between fetches
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Give up once a single wait has run for `deadline`
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Stop waiting when `cancel` fires
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Fetch snapshots until `is_done` accepts one and return it
    ///
    /// `on_pending` sees every rejected snapshot with its 1-based attempt
    /// number before the poller suspends. Nothing is held across the sleep
    /// except the closures themselves.
    pub async fn poll_until<T, F, Fut, D, P>(
        &self,
        what: &str,
        mut fetch: F,
        is_done: D,
        mut on_pending: P,
    ) -> ExportResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ExportResult<T>>,
        D: Fn(&T) -> bool,
        P: FnMut(&T, u32),
    {
        let started = Instant::now();
        let mut attempt: u32 = 0;

        loop {
            if self.cancel.is_cancelled() {
                return Err(ExportError::Cancelled);
            }

            attempt += 1;
            let snapshot = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(ExportError::Cancelled),
                fetched = fetch() => fetched?,
            };

            if is_done(&snapshot) {
                debug!("{} reached after {} attempt(s)", what, attempt);
                return Ok(snapshot);
            }

            on_pending(&snapshot, attempt);

            if let Some(deadline) = self.deadline {
                if started.elapsed() + self.interval > deadline {
                    return Err(ExportError::TimeoutError(format!(
                        "{} not reached within {:?} ({} attempts)",
                        what, deadline, attempt
                    )));
                }
            }

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(ExportError::Cancelled),
                _ = sleep(self.interval) => {}
            }
        }
    }
}
