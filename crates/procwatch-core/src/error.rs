use thiserror::Error;

/// Operation-level errors returned synchronously to the caller of one
/// specific operation. A failure of one process never aborts operations on
/// others; spawn and sampling failures resolve to that process's state
/// rather than crashing the supervisor.
#[derive(Debug, Error)]
pub enum Error {
	#[error("invalid spec: {0}")]
	InvalidSpec(String),

	#[error("process already exists: {0}")]
	DuplicateName(String),

	#[error("process not found: {0}")]
	NotFound(String),

	#[error("process is running: {0} (stop it first)")]
	ProcessRunning(String),

	#[error("another operation is in progress for {0}")]
	OperationInProgress(String),

	#[error("failed to spawn {name}: {source}")]
	SpawnFailed {
		name: String,
		#[source]
		source: std::io::Error,
	},
}

pub type Result<T> = std::result::Result<T, Error>;
