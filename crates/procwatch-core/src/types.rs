use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use crate::error::{Error, Result};

/// Declarative definition of one managed process.
///
/// Immutable once registered; edits replace the whole spec. The `name` is
/// the unique key for every lifecycle operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessSpec {
	pub name: String,
	pub command: String,
	#[serde(default)]
	pub working_dir: Option<PathBuf>,
	#[serde(default)]
	pub env: HashMap<String, String>,
	#[serde(default)]
	pub auto_restart: bool,
}

impl ProcessSpec {
	pub fn validate(&self) -> Result<()> {
		if self.name.is_empty() {
			return Err(Error::InvalidSpec("name must not be empty".into()));
		}
		if self.name.chars().any(char::is_whitespace) {
			return Err(Error::InvalidSpec(format!(
				"name must not contain whitespace: {:?}",
				self.name
			)));
		}
		if self.command.trim().is_empty() {
			return Err(Error::InvalidSpec("command must not be empty".into()));
		}
		Ok(())
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessState {
	Stopped,
	Starting,
	Running,
	Stopping,
	Failed,
	Restarting,
}

impl ProcessState {
	pub fn is_running(&self) -> bool {
		matches!(self, ProcessState::Running)
	}

	/// Terminal states have no live runner; start is allowed, remove is allowed.
	pub fn is_terminal(&self) -> bool {
		matches!(self, ProcessState::Stopped | ProcessState::Failed)
	}
}

/// Attached to a process while it is Running or Stopping; cleared on the
/// transition to Stopped/Failed. Updated atomically with the state field.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RuntimeInfo {
	pub pid: u32,
	pub started_at: SystemTime,
}

impl RuntimeInfo {
	pub fn uptime(&self) -> Duration {
		self.started_at.elapsed().unwrap_or(Duration::ZERO)
	}
}

/// One row of the process list, rendered as-is by the dashboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessStatus {
	pub name: String,
	pub command: String,
	pub state: ProcessState,
	pub auto_restart: bool,
	pub pid: Option<u32>,
	pub uptime_secs: Option<u64>,
	pub last_exit_code: Option<i32>,
}

/// Point-in-time resource reading for one process. Regenerated every
/// sampling tick, never persisted. A process without a live pid still gets
/// a snapshot so the UI can always render a best-effort row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatSnapshot {
	pub state: ProcessState,
	pub pid: Option<u32>,
	pub uptime_secs: Option<u64>,
	pub cpu_percent: Option<f32>,
	pub memory_bytes: Option<u64>,
}

impl StatSnapshot {
	/// Snapshot for a process with no observable OS process, also used when
	/// a pid vanishes between the liveness check and the read.
	pub fn idle(state: ProcessState) -> Self {
		Self {
			state,
			pid: None,
			uptime_secs: None,
			cpu_percent: None,
			memory_bytes: None,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogSource {
	Stdout,
	Stderr,
}

/// One captured output line. `seq` is monotonic per process, so subscribers
/// can verify ordering across the backlog/live boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogLine {
	pub seq: u64,
	pub source: LogSource,
	pub text: String,
}

/// Full view of one process: spec plus current lifecycle state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessDetail {
	pub spec: ProcessSpec,
	pub state: ProcessState,
	pub runtime: Option<RuntimeInfo>,
	pub last_exit_code: Option<i32>,
}

/// State-change notification published on the supervisor's event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessEvent {
	pub name: String,
	pub state: ProcessState,
	pub pid: Option<u32>,
}

#[cfg(test)]
mod tests {
	use super::*;

	fn spec(name: &str, command: &str) -> ProcessSpec {
		ProcessSpec {
			name: name.into(),
			command: command.into(),
			working_dir: None,
			env: HashMap::new(),
			auto_restart: false,
		}
	}

	#[test]
	fn validate_accepts_plain_spec() {
		assert!(spec("web", "sleep 100").validate().is_ok());
	}

	#[test]
	fn validate_rejects_empty_name() {
		assert!(matches!(spec("", "ls").validate(), Err(Error::InvalidSpec(_))));
	}

	#[test]
	fn validate_rejects_whitespace_name() {
		assert!(spec("my app", "ls").validate().is_err());
	}

	#[test]
	fn validate_rejects_blank_command() {
		assert!(spec("web", "   ").validate().is_err());
	}

	#[test]
	fn state_helpers() {
		assert!(ProcessState::Running.is_running());
		assert!(!ProcessState::Restarting.is_running());
		assert!(ProcessState::Stopped.is_terminal());
		assert!(ProcessState::Failed.is_terminal());
		assert!(!ProcessState::Stopping.is_terminal());
	}
}
