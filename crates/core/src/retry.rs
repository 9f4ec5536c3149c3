//! Retry-with-backoff wrapper shared by the snapshotter and the executor.
//!
//! Every I/O-bound step inside a cycle goes through [`retry_forever`]: on
//! failure it reports a `fail` notification, sleeps a fixed delay and runs the
//! same step again. There is no attempt limit. The only way out besides
//! success is cancellation.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::control::SyncControl;
use crate::errors::SyncError;
use crate::models::Operation;
use crate::notify::Notify;

/// Default delay between attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(3);

/// Fixed-delay retry policy plus the collaborators it reports to.
pub struct Retry<'a> {
    pub delay: Duration,
    pub notifier: &'a dyn Notify,
    pub control: &'a SyncControl,
}

impl<'a> Retry<'a> {
    pub fn new(delay: Duration, notifier: &'a dyn Notify, control: &'a SyncControl) -> Self {
        Self {
            delay,
            notifier,
            control,
        }
    }

    /// Run `step` until it succeeds. See [`retry_forever`].
    pub async fn run<T, F, Fut>(&self, what: &str, step: F) -> Result<T, SyncError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SyncError>>,
    {
        retry_forever(what, self.delay, self.notifier, self.control, step).await
    }
}

/// Run `step` until it returns `Ok`, notifying and sleeping between attempts.
///
/// A `Cancelled` error from the step, or a cancel request during the delay,
/// ends the loop with `Err(SyncError::Cancelled)`.
pub async fn retry_forever<T, F, Fut>(
    what: &str,
    delay: Duration,
    notifier: &dyn Notify,
    control: &SyncControl,
    mut step: F,
) -> Result<T, SyncError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SyncError>>,
{
    let mut attempt: u64 = 0;
    loop {
        attempt += 1;
        match step().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(what, attempt, "step succeeded after retry");
                }
                return Ok(value);
            }
            Err(SyncError::Cancelled) => return Err(SyncError::Cancelled),
            Err(e) => {
                notifier.notify(
                    Operation::Fail,
                    &format!(
                        "{} failed: {} Retrying in {}s.",
                        what,
                        e,
                        delay.as_secs_f64()
                    ),
                );
                control.sleep(delay).await?;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::MemoryNotifier;

    fn transient() -> SyncError {
        SyncError::io(
            "write",
            "/tmp/x",
            std::io::Error::new(std::io::ErrorKind::Other, "disk busy"),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_fails_twice_then_succeeds() {
        let sink = MemoryNotifier::new();
        let control = SyncControl::new();
        let mut calls = 0;

        let start = tokio::time::Instant::now();
        let value = retry_forever("Copying file", DEFAULT_RETRY_DELAY, &sink, &control, || {
            calls += 1;
            let n = calls;
            async move {
                if n <= 2 {
                    Err(transient())
                } else {
                    Ok(n)
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(value, 3);
        assert_eq!(sink.count(Operation::Fail), 2);
        assert!(start.elapsed() >= Duration::from_secs(6));
        let events = sink.events();
        assert!(events[0].1.starts_with("Copying file failed:"));
        assert!(events[0].1.ends_with("Retrying in 3s."));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff() {
        let sink = MemoryNotifier::new();
        let control = SyncControl::new();

        let canceller = control.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(10)).await;
            canceller.cancel();
        });

        let result: Result<(), SyncError> =
            retry_forever("Deleting file", DEFAULT_RETRY_DELAY, &sink, &control, || async {
                Err(transient())
            })
            .await;

        assert!(matches!(result, Err(SyncError::Cancelled)));
        // Attempts at t=0, 3, 6, 9 all fail before the cancel lands at t=10.
        assert_eq!(sink.count(Operation::Fail), 4);
    }

    #[tokio::test]
    async fn test_cancelled_step_is_not_retried() {
        let sink = MemoryNotifier::new();
        let control = SyncControl::new();
        let retry = Retry::new(DEFAULT_RETRY_DELAY, &sink, &control);

        let result: Result<(), SyncError> =
            retry.run("Scanning", || async { Err(SyncError::Cancelled) }).await;
        assert!(matches!(result, Err(SyncError::Cancelled)));
        assert!(sink.events().is_empty());
    }
}
