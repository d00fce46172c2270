use serde::Deserialize;
use std::time::Duration;

/// Supervisor tunables. Every section and field has a default, so an empty
/// TOML document (or `SupervisorConfig::default()`) is a working setup.
/// The core never touches the filesystem; the embedding application reads
/// the file and hands the contents to [`SupervisorConfig::from_toml`].
#[derive(Debug, Clone, Deserialize, Default)]
pub struct SupervisorConfig {
	#[serde(default)]
	pub stop: StopConfig,
	#[serde(default)]
	pub restart: RestartConfig,
	#[serde(default)]
	pub stats: StatsConfig,
	#[serde(default)]
	pub logs: LogsConfig,
}

impl SupervisorConfig {
	pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
		toml::from_str(content)
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct StopConfig {
	/// Seconds to wait after SIGTERM before escalating to SIGKILL.
	#[serde(default = "default_grace_secs")]
	pub grace_secs: u64,
}

impl Default for StopConfig {
	fn default() -> Self {
		Self {
			grace_secs: default_grace_secs(),
		}
	}
}

impl StopConfig {
	pub fn grace(&self) -> Duration {
		Duration::from_secs(self.grace_secs)
	}
}

fn default_grace_secs() -> u64 {
	5
}

#[derive(Debug, Clone, Deserialize)]
pub struct RestartConfig {
	/// Delay before the first automatic restart attempt.
	#[serde(default = "default_first_delay_ms")]
	pub first_delay_ms: u64,
	/// Cap for the doubling delay.
	#[serde(default = "default_max_delay_secs")]
	pub max_delay_secs: u64,
	/// Sustained Running time after which the attempt counter resets.
	#[serde(default = "default_reset_after_secs")]
	pub reset_after_secs: u64,
}

impl Default for RestartConfig {
	fn default() -> Self {
		Self {
			first_delay_ms: default_first_delay_ms(),
			max_delay_secs: default_max_delay_secs(),
			reset_after_secs: default_reset_after_secs(),
		}
	}
}

fn default_first_delay_ms() -> u64 {
	500
}
fn default_max_delay_secs() -> u64 {
	30
}
fn default_reset_after_secs() -> u64 {
	60
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatsConfig {
	#[serde(default = "default_tick_secs")]
	pub tick_secs: u64,
}

impl Default for StatsConfig {
	fn default() -> Self {
		Self {
			tick_secs: default_tick_secs(),
		}
	}
}

impl StatsConfig {
	pub fn tick(&self) -> Duration {
		Duration::from_secs(self.tick_secs.max(1))
	}
}

fn default_tick_secs() -> u64 {
	2
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogsConfig {
	/// Lines retained per process; oldest dropped first.
	#[serde(default = "default_ring_capacity")]
	pub ring_capacity: usize,
	/// Per-subscriber buffer; a lagging subscriber loses oldest lines
	/// instead of stalling the producer.
	#[serde(default = "default_subscriber_buffer")]
	pub subscriber_buffer: usize,
}

impl Default for LogsConfig {
	fn default() -> Self {
		Self {
			ring_capacity: default_ring_capacity(),
			subscriber_buffer: default_subscriber_buffer(),
		}
	}
}

fn default_ring_capacity() -> usize {
	1000
}
fn default_subscriber_buffer() -> usize {
	256
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn empty_toml_is_defaults() {
		let config = SupervisorConfig::from_toml("").unwrap();
		assert_eq!(config.stop.grace_secs, 5);
		assert_eq!(config.restart.first_delay_ms, 500);
		assert_eq!(config.restart.max_delay_secs, 30);
		assert_eq!(config.stats.tick_secs, 2);
		assert_eq!(config.logs.ring_capacity, 1000);
	}

	#[test]
	fn partial_section_keeps_other_defaults() {
		let config = SupervisorConfig::from_toml(
			"[restart]\nfirst_delay_ms = 100\n\n[logs]\nring_capacity = 16\n",
		)
		.unwrap();
		assert_eq!(config.restart.first_delay_ms, 100);
		assert_eq!(config.restart.max_delay_secs, 30);
		assert_eq!(config.logs.ring_capacity, 16);
		assert_eq!(config.logs.subscriber_buffer, 256);
	}

	#[test]
	fn stats_tick_never_zero() {
		let config = SupervisorConfig::from_toml("[stats]\ntick_secs = 0\n").unwrap();
		assert_eq!(config.stats.tick(), Duration::from_secs(1));
	}
}
