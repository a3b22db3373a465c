use std::time::Duration;

use cvmweb_protocol::constants::DEFAULT_POLL_INTERVAL_MS;

/// How the bootstrapper polls for a daemon that is not there yet.
///
/// The default retries every second, forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
	/// Fixed delay between connection attempts.
	pub interval: Duration,
	/// Total connection attempts, counting the first; `None` for no limit.
	pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
			max_attempts: None,
		}
	}
}

impl RetryPolicy {
	/// Retries every `interval` without limit.
	pub fn fixed(interval: Duration) -> Self {
		Self {
			interval,
			max_attempts: None,
		}
	}

	pub fn with_max_attempts(mut self, attempts: u32) -> Self {
		self.max_attempts = Some(attempts);
		self
	}

	/// Returns true if another attempt may follow `attempts` failed ones.
	pub fn allows_another(&self, attempts: u32) -> bool {
		self.max_attempts.is_none_or(|max| attempts < max)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn default_polls_every_second_forever() {
		let policy = RetryPolicy::default();
		assert_eq!(policy.interval, Duration::from_secs(1));
		assert!(policy.allows_another(u32::MAX - 1));
	}

	#[test]
	fn bounded_policy_counts_first_attempt() {
		let policy = RetryPolicy::fixed(Duration::from_millis(10)).with_max_attempts(3);
		assert!(policy.allows_another(1));
		assert!(policy.allows_another(2));
		assert!(!policy.allows_another(3));
	}
}
