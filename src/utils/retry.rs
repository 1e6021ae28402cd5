use crate::error::{AppkgError, Result};
use crate::ui as output;
use std::thread;
use std::time::Duration;

/// Bounded retry: at most `max_attempts` tries with a fixed `delay` between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    pub fn no_delay(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO)
    }
}

/// Result of one attempt whose failure mode may be a transient race.
#[derive(Debug)]
pub enum AttemptOutcome<T> {
    /// The attempt reached a verdict; stop retrying.
    Settled(Result<T>),
    /// The detection predicate fired; the attempt should be repeated.
    Raced,
}

/// Retry any error until the policy is exhausted, returning the last error.
pub fn execute_with_retry<T, F>(policy: RetryPolicy, operation_name: &str, mut operation: F) -> Result<T>
where
    F: FnMut(u32) -> Result<T>,
{
    let mut last_error = None;

    for attempt in 1..=policy.max_attempts {
        match operation(attempt) {
            Ok(value) => return Ok(value),
            Err(e) => {
                if attempt < policy.max_attempts {
                    output::warning(&format!(
                        "{} failed (attempt {} of {}): {}",
                        operation_name, attempt, policy.max_attempts, e
                    ));
                    thread::sleep(policy.delay);
                }
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| {
        AppkgError::Other(format!(
            "{} failed after {} attempts",
            operation_name, policy.max_attempts
        ))
    }))
}

/// Repeat `attempt` while it reports [`AttemptOutcome::Raced`].
///
/// A race on the final attempt surfaces as [`AppkgError::TransientStagingRace`].
pub fn retry_on_race<T, F>(policy: RetryPolicy, race_notice: &str, mut attempt: F) -> Result<T>
where
    F: FnMut(u32) -> Result<AttemptOutcome<T>>,
{
    for n in 1..=policy.max_attempts {
        match attempt(n)? {
            AttemptOutcome::Settled(result) => return result,
            AttemptOutcome::Raced => {
                if n < policy.max_attempts {
                    output::warning(&format!(
                        "{}\nTrying again... (attempt {} of {})",
                        race_notice, n, policy.max_attempts
                    ));
                    thread::sleep(policy.delay);
                }
            }
        }
    }

    Err(AppkgError::TransientStagingRace {
        attempts: policy.max_attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_succeeds_before_max_attempts() {
        let mut attempts = 0u32;
        let result = execute_with_retry(RetryPolicy::no_delay(3), "op", |_| {
            attempts += 1;
            if attempts < 3 {
                Err(AppkgError::Other("temporary".to_string()))
            } else {
                Ok(())
            }
        });
        assert!(result.is_ok());
        assert_eq!(attempts, 3);
    }

    #[test]
    fn retry_returns_last_error_when_all_attempts_fail() {
        let mut attempts = 0u32;
        let result = execute_with_retry(RetryPolicy::no_delay(2), "op", |_| -> Result<()> {
            attempts += 1;
            Err(AppkgError::Other(format!("fail-{attempts}")))
        })
        .expect_err("should fail");

        assert_eq!(attempts, 2);
        assert!(result.to_string().contains("fail-2"));
    }

    #[test]
    fn race_retries_then_settles() {
        let mut seen = 0;
        let value = retry_on_race(RetryPolicy::no_delay(5), "raced", |n| {
            seen = n;
            if n < 3 {
                Ok(AttemptOutcome::Raced)
            } else {
                Ok(AttemptOutcome::Settled(Ok(n)))
            }
        })
        .expect("settles on third attempt");
        assert_eq!(value, 3);
        assert_eq!(seen, 3);
    }

    #[test]
    fn persistent_race_becomes_typed_error() {
        let result: Result<()> =
            retry_on_race(RetryPolicy::no_delay(5), "raced", |_| Ok(AttemptOutcome::Raced));
        match result {
            Err(AppkgError::TransientStagingRace { attempts }) => assert_eq!(attempts, 5),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn settled_failure_is_not_retried() {
        let mut calls = 0;
        let result: Result<()> = retry_on_race(RetryPolicy::no_delay(5), "raced", |_| {
            calls += 1;
            Ok(AttemptOutcome::Settled(Err(AppkgError::Other("apt broke".into()))))
        });
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }
}
