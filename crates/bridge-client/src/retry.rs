//! Explicit retry policy for transient platform failures.

use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::ClientError;

/// Retry policy injected into the platform client.
///
/// Only errors accepted by `retryable` are retried; everything else is
/// surfaced immediately. The delay between attempts is fixed.
#[derive(Clone)]
pub struct RetryPolicy {
	pub max_attempts: u32,
	pub delay: Duration,
	pub retryable: fn(&ClientError) -> bool,
}

impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			max_attempts: 3,
			delay: Duration::from_secs(1),
			retryable: ClientError::is_retryable,
		}
	}
}

impl RetryPolicy {
	pub fn new(max_attempts: u32, delay: Duration) -> Self {
		Self {
			max_attempts: max_attempts.max(1),
			delay,
			..Self::default()
		}
	}

	/// Runs `operation` until it succeeds, a non-retryable error occurs, or
	/// the attempt budget is exhausted. The attempt number (1-based) is
	/// passed to the operation.
	pub async fn run<T, F, Fut>(&self, mut operation: F) -> Result<T, ClientError>
	where
		F: FnMut(u32) -> Fut,
		Fut: Future<Output = Result<T, ClientError>>,
	{
		let mut attempt = 1;
		loop {
			match operation(attempt).await {
				Ok(value) => return Ok(value),
				Err(e) if (self.retryable)(&e) && attempt < self.max_attempts => {
					warn!(attempt, error = %e, "transient failure, retrying");
					tokio::time::sleep(self.delay).await;
					attempt += 1;
				}
				Err(e) => return Err(e),
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicU32, Ordering};

	#[tokio::test(start_paused = true)]
	async fn retries_up_to_budget_with_fixed_spacing() {
		let attempts = AtomicU32::new(0);
		let policy = RetryPolicy::default();
		let started = tokio::time::Instant::now();

		let result: Result<(), ClientError> = policy
			.run(|_| {
				attempts.fetch_add(1, Ordering::SeqCst);
				async {
					Err(ClientError::Transient {
						status: 503,
						message: "unavailable".to_string(),
					})
				}
			})
			.await;

		assert!(result.is_err());
		assert_eq!(attempts.load(Ordering::SeqCst), 3);
		// Two sleeps of 1s between three attempts.
		assert_eq!(started.elapsed(), Duration::from_secs(2));
	}

	#[tokio::test]
	async fn succeeds_mid_budget() {
		let attempts = AtomicU32::new(0);
		let policy = RetryPolicy::default();

		let result = policy
			.run(|attempt| {
				attempts.fetch_add(1, Ordering::SeqCst);
				async move {
					if attempt < 3 {
						Err(ClientError::Timeout)
					} else {
						Ok(attempt)
					}
				}
			})
			.await
			.unwrap();

		assert_eq!(result, 3);
		assert_eq!(attempts.load(Ordering::SeqCst), 3);
	}

	#[tokio::test]
	async fn non_retryable_errors_fail_fast() {
		let attempts = AtomicU32::new(0);
		let policy = RetryPolicy::default();

		let result: Result<(), ClientError> = policy
			.run(|_| {
				attempts.fetch_add(1, Ordering::SeqCst);
				async {
					Err(ClientError::Platform {
						status: 404,
						message: "order not found".to_string(),
					})
				}
			})
			.await;

		assert!(matches!(result, Err(ClientError::Platform { .. })));
		assert_eq!(attempts.load(Ordering::SeqCst), 1);
	}
}
