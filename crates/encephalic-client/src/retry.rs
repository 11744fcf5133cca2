use std::time::Duration;

use crate::error::ClientError;

/// Exponential backoff applied only to `NotReady` failures.
///
/// Delay before retry `i` (0-indexed) is `initial_delay * 2^i`. Any other
/// error kind propagates immediately; the UI therefore sees real data or a
/// real error rather than a flicker of startup failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.initial_delay * 2u32.saturating_pow(attempt)
    }
}

pub fn fetch_with_retry<T>(
    policy: &RetryPolicy,
    op: impl FnMut() -> Result<T, ClientError>,
) -> Result<T, ClientError> {
    fetch_with_retry_using(policy, op, std::thread::sleep)
}

/// `fetch_with_retry` with an injected sleep, so tests can record the
/// backoff schedule instead of waiting it out.
pub fn fetch_with_retry_using<T>(
    policy: &RetryPolicy,
    mut op: impl FnMut() -> Result<T, ClientError>,
    mut sleep: impl FnMut(Duration),
) -> Result<T, ClientError> {
    let mut attempt = 0u32;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(ClientError::NotReady) if attempt < policy.max_retries => {
                let delay = policy.delay_for(attempt);
                log::debug!(
                    "service warming up, retry {}/{} in {:?}",
                    attempt + 1,
                    policy.max_retries,
                    delay
                );
                sleep(delay);
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn not_ready_times<T>(
        failures: usize,
        value: T,
    ) -> impl FnMut() -> Result<T, ClientError>
    where
        T: Clone,
    {
        let mut remaining = failures;
        move || {
            if remaining > 0 {
                remaining -= 1;
                Err(ClientError::NotReady)
            } else {
                Ok(value.clone())
            }
        }
    }

    #[test]
    fn succeeds_within_budget_with_doubling_delays() {
        let policy = RetryPolicy {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
        };
        let mut delays = Vec::new();
        let result =
            fetch_with_retry_using(&policy, not_ready_times(3, 42), |d| delays.push(d));
        assert_eq!(result.unwrap(), 42);
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(400),
            ]
        );
    }

    #[test]
    fn exhausted_budget_surfaces_last_not_ready() {
        let policy = RetryPolicy {
            max_retries: 3,
            initial_delay: Duration::ZERO,
        };
        let mut attempts = 0;
        let result: Result<(), _> = fetch_with_retry_using(
            &policy,
            || {
                attempts += 1;
                Err(ClientError::NotReady)
            },
            |_| {},
        );
        // max_retries + 1 attempts total
        assert_eq!(attempts, 4);
        assert!(result.unwrap_err().is_not_ready());
    }

    #[test]
    fn other_errors_propagate_immediately() {
        let policy = RetryPolicy::default();
        let mut attempts = 0;
        let result: Result<(), _> = fetch_with_retry_using(
            &policy,
            || {
                attempts += 1;
                Err(ClientError::Timeout)
            },
            |_| panic!("no backoff expected for terminal errors"),
        );
        assert_eq!(attempts, 1);
        assert!(matches!(result.unwrap_err(), ClientError::Timeout));
    }
}
