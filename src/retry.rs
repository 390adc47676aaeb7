use std::thread;
use std::time::Duration;

use tracing::warn;

use crate::error::{RvarError, Service};

/// Fixed-backoff retry of transient service failures.
///
/// `max_attempts: None` retries forever, which suits long batch runs that should
/// outlive flaky connectivity. Tests use [`RetryPolicy::bounded`] with a zero
/// backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub backoff: Duration,
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            backoff: Duration::from_secs(5),
            max_attempts: None,
        }
    }
}

impl RetryPolicy {
    pub fn unbounded(backoff: Duration) -> Self {
        Self {
            backoff,
            max_attempts: None,
        }
    }

    pub fn bounded(backoff: Duration, max_attempts: u32) -> Self {
        Self {
            backoff,
            max_attempts: Some(max_attempts.max(1)),
        }
    }

    /// Runs `op` until it succeeds, fails with a non-transient error, or attempts run out.
    pub fn run<T, F>(&self, service: Service, mut op: F) -> Result<T, RvarError>
    where
        F: FnMut() -> Result<T, RvarError>,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() => {
                    if self.max_attempts.is_some_and(|max| attempt >= max) {
                        return Err(RvarError::RetriesExhausted {
                            service,
                            attempts: attempt,
                        });
                    }
                    warn!(
                        %service,
                        attempt,
                        backoff_ms = self.backoff.as_millis() as u64,
                        error = %err,
                        "retrying url retrieval"
                    );
                    if !self.backoff.is_zero() {
                        thread::sleep(self.backoff);
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use assert_matches::assert_matches;

    use super::*;

    fn unavailable() -> RvarError {
        RvarError::ServiceUnavailable {
            service: Service::Literature,
            message: "connection refused".to_string(),
        }
    }

    #[test]
    fn retries_until_success() {
        let calls = Cell::new(0);
        let policy = RetryPolicy::unbounded(Duration::ZERO);
        let value = policy
            .run(Service::Literature, || {
                calls.set(calls.get() + 1);
                if calls.get() < 4 {
                    Err(unavailable())
                } else {
                    Ok("done")
                }
            })
            .unwrap();
        assert_eq!(value, "done");
        assert_eq!(calls.get(), 4);
    }

    #[test]
    fn bounded_policy_gives_up() {
        let calls = Cell::new(0);
        let policy = RetryPolicy::bounded(Duration::ZERO, 3);
        let err = policy
            .run(Service::Topics, || -> Result<(), RvarError> {
                calls.set(calls.get() + 1);
                Err(unavailable())
            })
            .unwrap_err();
        assert_matches!(
            err,
            RvarError::RetriesExhausted {
                service: Service::Topics,
                attempts: 3
            }
        );
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn structural_errors_are_not_retried() {
        let calls = Cell::new(0);
        let policy = RetryPolicy::unbounded(Duration::ZERO);
        let err = policy
            .run(Service::Keywords, || -> Result<(), RvarError> {
                calls.set(calls.get() + 1);
                Err(RvarError::malformed(Service::Keywords, "no markup"))
            })
            .unwrap_err();
        assert_matches!(err, RvarError::MalformedResponse { .. });
        assert_eq!(calls.get(), 1);
    }
}
