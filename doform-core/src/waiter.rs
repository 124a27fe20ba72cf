//! Waiter - Poll a remote object until it reaches a target status
//!
//! Long-running upstream work (actions, clusters coming online, certificates
//! being verified) is observed by polling. The waiter is a small state machine:
//! every poll outcome advances a [`Tracker`], and the driving loop only sleeps,
//! polls and checks for cancellation in between.

use std::future::Future;
use std::time::Duration;

use log::{debug, warn};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::ErrorKind;
use crate::provider::{Operation, ProviderError, ProviderResult};

/// Polling cadence shared by every waiter of a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitConfig {
    /// Delay before the first poll
    pub delay: Duration,
    /// Minimum time between two polls
    pub poll_interval: Duration,
    /// Consecutive not-found polls tolerated before giving up
    pub not_found_checks: u32,
}

impl WaitConfig {
    pub const DEFAULT_DELAY: Duration = Duration::from_secs(10);
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);
    pub const DEFAULT_NOT_FOUND_CHECKS: u32 = 60;

    /// Cadence for tests and mock upstreams
    pub fn immediate() -> Self {
        Self {
            delay: Duration::from_millis(1),
            poll_interval: Duration::from_millis(1),
            not_found_checks: 3,
        }
    }
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            delay: Self::DEFAULT_DELAY,
            poll_interval: Self::DEFAULT_POLL_INTERVAL,
            not_found_checks: Self::DEFAULT_NOT_FOUND_CHECKS,
        }
    }
}

/// Result of a single poll
#[derive(Debug)]
pub enum Poll<T> {
    /// The object was observed with this status
    Status(T, String),
    /// The object is not (yet) visible upstream
    NotFound,
}

/// What the driving loop should do after a poll
#[derive(Debug)]
pub enum Step<T> {
    Continue,
    Done(T),
    Fail(ProviderError),
}

/// Transition function of the waiter state machine
#[derive(Debug)]
pub struct Tracker<'a> {
    pending: &'a [&'a str],
    target: &'a [&'a str],
    max_not_found: u32,
    not_found: u32,
    last_status: Option<String>,
}

impl<'a> Tracker<'a> {
    pub fn new(pending: &'a [&'a str], target: &'a [&'a str], max_not_found: u32) -> Self {
        Self {
            pending,
            target,
            max_not_found,
            not_found: 0,
            last_status: None,
        }
    }

    pub fn last_status(&self) -> Option<&str> {
        self.last_status.as_deref()
    }

    pub fn advance<T>(&mut self, outcome: Poll<T>) -> Step<T> {
        match outcome {
            Poll::NotFound => {
                self.not_found += 1;
                if self.not_found > self.max_not_found {
                    Step::Fail(ProviderError::not_found(format!(
                        "couldn't find resource ({} retries)",
                        self.max_not_found
                    )))
                } else {
                    Step::Continue
                }
            }
            Poll::Status(value, status) => {
                self.not_found = 0;
                let step = if self.target.contains(&status.as_str()) {
                    Step::Done(value)
                } else if self.pending.contains(&status.as_str()) {
                    Step::Continue
                } else {
                    Step::Fail(ProviderError::new(format!(
                        "unexpected state '{}', wanted target '{}'",
                        status,
                        self.target.join(", ")
                    )))
                };
                self.last_status = Some(status);
                step
            }
        }
    }
}

/// Poll until `target` is reached, an unexpected status shows up, or `timeout` elapses
#[derive(Debug, Clone)]
pub struct StateWaiter<'a> {
    pub description: String,
    pub pending: &'a [&'a str],
    pub target: &'a [&'a str],
    pub timeout: Duration,
    pub config: WaitConfig,
    pub cancel: CancellationToken,
}

impl<'a> StateWaiter<'a> {
    pub fn new(
        description: impl Into<String>,
        pending: &'a [&'a str],
        target: &'a [&'a str],
        timeout: Duration,
        config: WaitConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            description: description.into(),
            pending,
            target,
            timeout,
            config,
            cancel,
        }
    }

    /// Drive `poll` to completion.
    ///
    /// A not-found error returned by `poll` counts as [`Poll::NotFound`];
    /// any other error ends the wait immediately.
    pub async fn wait<T, F, Fut>(&self, mut poll: F) -> ProviderResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ProviderResult<Poll<T>>>,
    {
        let deadline = Instant::now() + self.timeout;
        let mut tracker = Tracker::new(self.pending, self.target, self.config.not_found_checks);
        debug!("Waiting for {}", self.description);

        self.sleep_until_next(self.config.delay, deadline).await?;

        loop {
            if self.cancel.is_cancelled() {
                return Err(self.fail(ProviderError::canceled()));
            }

            let outcome = match poll().await {
                Ok(outcome) => outcome,
                Err(e) if e.is_not_found() => Poll::NotFound,
                Err(e) => return Err(self.fail(e)),
            };
            if matches!(outcome, Poll::NotFound) {
                warn!("{} not visible yet", self.description);
            }

            match tracker.advance(outcome) {
                Step::Done(value) => return Ok(value),
                Step::Fail(e) => return Err(self.fail(e)),
                Step::Continue => {}
            }

            let now = Instant::now();
            if now >= deadline {
                let last = tracker.last_status().unwrap_or("unknown");
                return Err(self.fail(ProviderError::with_kind(
                    ErrorKind::Timeout,
                    format!(
                        "timeout while waiting for state to become '{}' (last state: '{}', timeout: {:?})",
                        self.target.join(", "),
                        last,
                        self.timeout
                    ),
                )));
            }
            self.sleep_until_next(self.config.poll_interval, deadline)
                .await?;
        }
    }

    async fn sleep_until_next(&self, wanted: Duration, deadline: Instant) -> ProviderResult<()> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        sleep_or_cancel(wanted.min(remaining), &self.cancel)
            .await
            .map_err(|e| self.fail(e))
    }

    fn fail(&self, e: ProviderError) -> ProviderError {
        let message = format!("{}: {}", self.description, e.message);
        ProviderError {
            message,
            ..e.during(Operation::WaitingFor)
        }
    }
}

/// Sleep for `pause` unless `cancel` fires first
pub async fn sleep_or_cancel(pause: Duration, cancel: &CancellationToken) -> ProviderResult<()> {
    tokio::select! {
        _ = tokio::time::sleep(pause) => Ok(()),
        _ = cancel.cancelled() => Err(ProviderError::canceled()),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    const PENDING: &[&str] = &["new", "in-progress"];
    const TARGET: &[&str] = &["completed"];

    fn waiter(timeout: Duration, cancel: CancellationToken) -> StateWaiter<'static> {
        StateWaiter::new(
            "action 7 to complete",
            PENDING,
            TARGET,
            timeout,
            WaitConfig::immediate(),
            cancel,
        )
    }

    #[test]
    fn tracker_transitions() {
        let mut t = Tracker::new(PENDING, TARGET, 2);
        assert!(matches!(
            t.advance(Poll::Status((), "in-progress".into())),
            Step::Continue
        ));
        assert!(matches!(t.advance::<()>(Poll::NotFound), Step::Continue));
        assert!(matches!(t.advance::<()>(Poll::NotFound), Step::Continue));
        assert!(matches!(t.advance::<()>(Poll::NotFound), Step::Fail(_)));
    }

    #[test]
    fn tracker_errored_is_terminal() {
        let mut t = Tracker::new(PENDING, TARGET, 2);
        match t.advance(Poll::Status((), "errored".into())) {
            Step::Fail(e) => assert!(e.message.contains("errored")),
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[test]
    fn found_resets_not_found_counter() {
        let mut t = Tracker::new(PENDING, TARGET, 1);
        assert!(matches!(t.advance::<()>(Poll::NotFound), Step::Continue));
        assert!(matches!(
            t.advance(Poll::Status((), "new".into())),
            Step::Continue
        ));
        assert!(matches!(t.advance::<()>(Poll::NotFound), Step::Continue));
    }

    #[tokio::test]
    async fn waits_until_completed() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let result = waiter(Duration::from_secs(5), CancellationToken::new())
            .wait(|| {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    let status = match n {
                        0 => return Ok(Poll::NotFound),
                        1 | 2 => "in-progress",
                        _ => "completed",
                    };
                    Ok(Poll::Status(n, status.to_string()))
                }
            })
            .await
            .unwrap();
        assert_eq!(result, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn not_found_errors_count_as_transient() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let result = waiter(Duration::from_secs(5), CancellationToken::new())
            .wait(|| {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(ProviderError::not_found("action not found"))
                    } else {
                        Ok(Poll::Status((), "completed".to_string()))
                    }
                }
            })
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn errored_surfaces_failure() {
        let err = waiter(Duration::from_secs(5), CancellationToken::new())
            .wait(|| async { Ok(Poll::Status((), "errored".to_string())) })
            .await
            .unwrap_err();
        assert_eq!(err.operation, Some(Operation::WaitingFor));
        assert!(err.message.starts_with("action 7 to complete"));
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_within_budget() {
        let config = WaitConfig {
            delay: Duration::from_secs(10),
            poll_interval: Duration::from_secs(3),
            not_found_checks: 60,
        };
        let w = StateWaiter::new(
            "cluster to become online",
            &["creating"],
            &["online"],
            Duration::from_secs(60),
            config,
            CancellationToken::new(),
        );
        let start = Instant::now();
        let err = w
            .wait(|| async { Ok(Poll::Status((), "creating".to_string())) })
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Timeout);
        assert!(start.elapsed() <= Duration::from_secs(60) + config.poll_interval);
    }

    #[tokio::test]
    async fn cancellation_aborts_wait() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = waiter(Duration::from_secs(5), cancel)
            .wait(|| async { Ok(Poll::Status((), "in-progress".to_string())) })
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Canceled);
    }
}
