//! The polling primitive behind every wait

use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

use super::condition::Mismatch;
use super::source::FetchError;

/// Result of a single poll attempt
#[derive(Debug)]
pub enum PollOutcome {
    /// Stop polling, the wait succeeded
    Satisfied,
    /// Not there yet; the mismatch is kept in case this is the last attempt
    Pending(Mismatch),
    /// Stop polling, the wait failed
    Fatal(FetchError),
}

impl PollOutcome {
    /// Retryable fetch errors keep the poll going, the rest abort it
    pub fn from_fetch_error(err: FetchError) -> Self {
        if err.is_retryable() {
            Self::Pending(Mismatch::Unavailable(err.to_string()))
        } else {
            Self::Fatal(err)
        }
    }
}

#[derive(Error, Debug)]
pub enum WaitError {
    #[error("failed to fetch {resource}: {source}")]
    Fetch {
        resource: String,
        #[source]
        source: FetchError,
    },

    /// Deadline reached. Displays as the last observed mismatch.
    #[error("{mismatch}")]
    Unsatisfied { resource: String, mismatch: Mismatch },
}

impl WaitError {
    /// The last mismatch observed before the deadline, if the wait timed out
    pub fn last_mismatch(&self) -> Option<&Mismatch> {
        match self {
            Self::Unsatisfied { mismatch, .. } => Some(mismatch),
            Self::Fetch { .. } => None,
        }
    }
}

/// Poll `check` immediately and then once per `interval` until it is satisfied,
/// fails fatally, or `timeout` has elapsed.
///
/// The deadline is only checked between attempts. A slow attempt is never cancelled;
/// it just delays the next one.
pub async fn poll_until<F, Fut>(
    resource: &str,
    interval: Duration,
    timeout: Duration,
    mut check: F,
) -> Result<(), WaitError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = PollOutcome>,
{
    let deadline = Instant::now() + timeout;
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        let mismatch = match check().await {
            PollOutcome::Satisfied => {
                tracing::debug!(resource, attempt, "wait satisfied");
                return Ok(());
            }
            PollOutcome::Fatal(source) => {
                tracing::debug!(resource, attempt, error = %source, "wait aborted");
                return Err(WaitError::Fetch {
                    resource: resource.to_string(),
                    source,
                });
            }
            PollOutcome::Pending(mismatch) => mismatch,
        };

        tracing::debug!(resource, attempt, %mismatch, "not yet satisfied");

        if Instant::now() + interval > deadline {
            return Err(WaitError::Unsatisfied {
                resource: resource.to_string(),
                mismatch,
            });
        }

        tokio::time::sleep(interval).await;
    }
}

/// Wait until `exists` reports true. Errors count as "not yet".
pub async fn wait_until_exists<F, Fut, E>(
    resource: &str,
    interval: Duration,
    timeout: Duration,
    mut exists: F,
) -> Result<(), WaitError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, E>>,
    E: std::fmt::Display,
{
    poll_until(resource, interval, timeout, || {
        let fut = exists();
        async move {
            match fut.await {
                Ok(true) => PollOutcome::Satisfied,
                Ok(false) => PollOutcome::Pending(Mismatch::Other(format!(
                    "{} does not exist yet",
                    resource
                ))),
                Err(e) => PollOutcome::Pending(Mismatch::Unavailable(e.to_string())),
            }
        }
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    const INTERVAL: Duration = Duration::from_secs(5);

    #[tokio::test(start_paused = true)]
    async fn test_first_check_is_immediate() {
        let start = Instant::now();
        let result = poll_until("thing", INTERVAL, Duration::from_secs(60), || async {
            PollOutcome::Satisfied
        })
        .await;
        assert!(result.is_ok());
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_returns_last_mismatch() {
        let attempts = AtomicU32::new(0);
        let result = poll_until("thing", INTERVAL, Duration::from_secs(20), || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move { PollOutcome::Pending(Mismatch::Other(format!("attempt {}", n))) }
        })
        .await;

        let err = result.unwrap_err();
        // attempts at 0s, 5s, 10s, 15s, 20s
        assert_eq!(attempts.load(Ordering::SeqCst), 5);
        assert_eq!(err.to_string(), "attempt 4");
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_stops_immediately() {
        let attempts = AtomicU32::new(0);
        let result = poll_until("thing", INTERVAL, Duration::from_secs(60), || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { PollOutcome::Fatal(FetchError::Fatal("forbidden".to_string())) }
        })
        .await;

        assert!(matches!(result, Err(WaitError::Fetch { .. })));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_until_exists_ignores_errors() {
        let attempts = AtomicU32::new(0);
        let result = wait_until_exists("cgu/x", INTERVAL, Duration::from_secs(60), || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                match n {
                    0 => Err("connection reset".to_string()),
                    1 => Ok(false),
                    _ => Ok(true),
                }
            }
        })
        .await;

        assert!(result.is_ok());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_until_exists_timeout_message() {
        let result = wait_until_exists("cgu/x", INTERVAL, Duration::from_secs(10), || async {
            Ok::<bool, String>(false)
        })
        .await;
        assert_eq!(result.unwrap_err().to_string(), "cgu/x does not exist yet");
    }
}
