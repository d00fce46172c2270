use procwatch_core::RestartConfig;
use std::time::Duration;

/// Backoff schedule for automatic restarts: the first delay doubles on each
/// consecutive crash up to a cap. The attempt counter is managed by the
/// runner loop, which resets it after sustained Running time so a transient
/// fault recovers fast while a crash loop cannot tight-spin.
#[derive(Debug, Clone, Copy)]
pub struct RestartPolicy {
	first: Duration,
	max: Duration,
	reset_after: Duration,
}

impl RestartPolicy {
	pub fn new(config: &RestartConfig) -> Self {
		Self {
			first: Duration::from_millis(config.first_delay_ms),
			max: Duration::from_secs(config.max_delay_secs),
			reset_after: Duration::from_secs(config.reset_after_secs),
		}
	}

	/// Delay before restart attempt `attempt` (0-indexed): `first × 2^attempt`,
	/// clamped to the cap. Saturates instead of overflowing for huge counters.
	pub fn delay(&self, attempt: u32) -> Duration {
		let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
		self.first.saturating_mul(factor).min(self.max)
	}

	/// Whether `uptime` counts as sustained Running, resetting the schedule.
	pub fn sustained(&self, uptime: Duration) -> bool {
		uptime >= self.reset_after
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn policy(first_ms: u64, max_secs: u64, reset_secs: u64) -> RestartPolicy {
		RestartPolicy::new(&RestartConfig {
			first_delay_ms: first_ms,
			max_delay_secs: max_secs,
			reset_after_secs: reset_secs,
		})
	}

	#[test]
	fn delay_doubles_from_first() {
		let p = policy(500, 30, 60);
		assert_eq!(p.delay(0), Duration::from_millis(500));
		assert_eq!(p.delay(1), Duration::from_secs(1));
		assert_eq!(p.delay(2), Duration::from_secs(2));
		assert_eq!(p.delay(3), Duration::from_secs(4));
	}

	#[test]
	fn delay_is_non_decreasing_up_to_cap() {
		let p = policy(500, 30, 60);
		let mut last = Duration::ZERO;
		for attempt in 0..20 {
			let d = p.delay(attempt);
			assert!(d >= last, "attempt {} went backwards", attempt);
			assert!(d <= Duration::from_secs(30));
			last = d;
		}
		assert_eq!(p.delay(19), Duration::from_secs(30));
	}

	#[test]
	fn huge_attempt_saturates_at_cap() {
		let p = policy(500, 30, 60);
		assert_eq!(p.delay(u32::MAX), Duration::from_secs(30));
	}

	#[test]
	fn sustained_threshold() {
		let p = policy(500, 30, 60);
		assert!(!p.sustained(Duration::from_secs(59)));
		assert!(p.sustained(Duration::from_secs(60)));
	}
}
