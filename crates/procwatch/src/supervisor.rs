use procwatch_core::{
	Error, ProcessDetail, ProcessEvent, ProcessSpec, ProcessState, ProcessStatus, Result,
	RuntimeInfo, SupervisorConfig,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::{broadcast, watch, Mutex, OwnedMutexGuard, RwLock};
use tokio::task::JoinHandle;

use crate::loghub::{LogHub, LogStream};
use crate::policy::RestartPolicy;
use crate::registry::Registry;
use crate::runner;

const EVENT_BUS_CAPACITY: usize = 256;

/// Single entry point for all lifecycle operations.
///
/// Operations targeting the same name are serialized by a per-entry
/// single-flight lock; a conflicting call is rejected with
/// `OperationInProgress` rather than queued. Operations on different names
/// never contend. State and runtime info live under one table lock and are
/// always written together, so readers never observe Running without a pid.
pub struct Supervisor {
	table: RwLock<Table>,
	config: SupervisorConfig,
	policy: RestartPolicy,
	hub: Arc<LogHub>,
	events: broadcast::Sender<ProcessEvent>,
}

struct Table {
	registry: Registry,
	entries: HashMap<String, Entry>,
}

struct Entry {
	state: ProcessState,
	runtime: Option<RuntimeInfo>,
	last_exit_code: Option<i32>,
	ops: Arc<Mutex<()>>,
	cancel: Option<watch::Sender<bool>>,
	runner: Option<JoinHandle<()>>,
}

impl Entry {
	fn new() -> Self {
		Self {
			state: ProcessState::Stopped,
			runtime: None,
			last_exit_code: None,
			ops: Arc::new(Mutex::new(())),
			cancel: None,
			runner: None,
		}
	}
}

pub(crate) struct SampleTarget {
	pub name: String,
	pub state: ProcessState,
	pub runtime: Option<RuntimeInfo>,
}

impl Supervisor {
	pub fn new(config: SupervisorConfig) -> Arc<Self> {
		let (events, _) = broadcast::channel(EVENT_BUS_CAPACITY);
		let policy = RestartPolicy::new(&config.restart);
		let hub = Arc::new(LogHub::new(
			config.logs.ring_capacity,
			config.logs.subscriber_buffer,
		));
		Arc::new(Self {
			table: RwLock::new(Table {
				registry: Registry::new(),
				entries: HashMap::new(),
			}),
			config,
			policy,
			hub,
			events,
		})
	}

	/// Registers a spec in Stopped state. Does not start it.
	pub async fn add(&self, spec: ProcessSpec) -> Result<()> {
		let name = spec.name.clone();
		{
			let mut table = self.table.write().await;
			table.registry.add(spec)?;
			table.entries.insert(name.clone(), Entry::new());
		}
		tracing::info!("{}: added", name);
		self.emit(&name, ProcessState::Stopped, None);
		Ok(())
	}

	/// Replaces an existing spec wholesale. A live runner keeps the spec it
	/// was started with; the replacement applies on the next start.
	pub async fn update(&self, spec: ProcessSpec) -> Result<()> {
		let mut table = self.table.write().await;
		table.registry.replace(spec)
	}

	/// Removes a spec. Never stops the process: a non-terminal state yields
	/// `ProcessRunning` and the caller must stop first.
	pub async fn remove(&self, name: &str) -> Result<()> {
		let ops = self.ops_handle(name).await?;
		let _guard = ops
			.try_lock_owned()
			.map_err(|_| Error::OperationInProgress(name.to_string()))?;

		{
			let mut table = self.table.write().await;
			let entry = table
				.entries
				.get(name)
				.ok_or_else(|| Error::NotFound(name.to_string()))?;
			if !entry.state.is_terminal() {
				return Err(Error::ProcessRunning(name.to_string()));
			}
			table.registry.remove(name)?;
			table.entries.remove(name);
		}
		self.hub.remove(name).await;
		tracing::info!("{}: removed", name);
		Ok(())
	}

	/// Starts a process. No-op returning the current state if it is already
	/// Running/Starting, or Restarting (a start is pending). Spawn failure
	/// resolves the process to Failed and is returned as `SpawnFailed`.
	pub async fn start(self: &Arc<Self>, name: &str) -> Result<ProcessState> {
		let _guard = self.try_op(name).await?;
		self.start_locked(name).await
	}

	/// Stops a process, returning once the OS process is confirmed dead.
	/// No-op on Stopped/Failed. A stop during Restarting cancels the pending
	/// restart before it fires.
	pub async fn stop(self: &Arc<Self>, name: &str) -> Result<ProcessState> {
		let _guard = self.try_op(name).await?;
		self.stop_locked(name).await
	}

	/// Stop followed by start under one lock acquisition, so concurrent
	/// callers observe a single combined transition.
	pub async fn restart(self: &Arc<Self>, name: &str) -> Result<ProcessState> {
		let _guard = self.try_op(name).await?;
		self.stop_locked(name).await?;
		self.start_locked(name).await
	}

	/// Stops every process, waiting (not failing) on in-flight operations.
	/// Used at daemon exit.
	pub async fn shutdown(self: &Arc<Self>) {
		let names: Vec<String> = {
			let table = self.table.read().await;
			table.registry.names().map(String::from).collect()
		};

		let mut handles = Vec::new();
		for name in names {
			let sup = Arc::clone(self);
			handles.push(tokio::spawn(async move {
				let Ok(ops) = sup.ops_handle(&name).await else {
					return;
				};
				let _guard = ops.lock_owned().await;
				if let Err(e) = sup.stop_locked(&name).await {
					tracing::warn!("{}: stop during shutdown failed: {}", name, e);
				}
			}));
		}
		for handle in handles {
			let _ = handle.await;
		}
		tracing::info!("supervisor shut down");
	}

	/// Rows for every registered process, in insertion order.
	pub async fn list(&self) -> Vec<ProcessStatus> {
		let table = self.table.read().await;
		table
			.registry
			.names()
			.filter_map(|name| {
				let spec = table.registry.get(name)?;
				let entry = table.entries.get(name)?;
				Some(ProcessStatus {
					name: name.to_string(),
					command: spec.command.clone(),
					state: entry.state,
					auto_restart: spec.auto_restart,
					pid: entry.runtime.map(|r| r.pid),
					uptime_secs: entry.runtime.map(|r| r.uptime().as_secs()),
					last_exit_code: entry.last_exit_code,
				})
			})
			.collect()
	}

	pub async fn get(&self, name: &str) -> Result<ProcessDetail> {
		let table = self.table.read().await;
		let spec = table
			.registry
			.get(name)
			.ok_or_else(|| Error::NotFound(name.to_string()))?;
		let entry = table
			.entries
			.get(name)
			.ok_or_else(|| Error::NotFound(name.to_string()))?;
		Ok(ProcessDetail {
			spec: spec.clone(),
			state: entry.state,
			runtime: entry.runtime,
			last_exit_code: entry.last_exit_code,
		})
	}

	/// Every receiver sees all state changes published after it subscribed.
	pub fn subscribe_events(&self) -> broadcast::Receiver<ProcessEvent> {
		self.events.subscribe()
	}

	/// Backlog-then-live log stream. Succeeds for any name, including one
	/// that has never started; the stream yields nothing until output
	/// appears.
	pub async fn subscribe_logs(&self, name: &str) -> LogStream {
		self.hub.subscribe(name).await
	}

	// --- internals -----------------------------------------------------

	async fn ops_handle(&self, name: &str) -> Result<Arc<Mutex<()>>> {
		let table = self.table.read().await;
		table
			.entries
			.get(name)
			.map(|e| Arc::clone(&e.ops))
			.ok_or_else(|| Error::NotFound(name.to_string()))
	}

	async fn try_op(&self, name: &str) -> Result<OwnedMutexGuard<()>> {
		let ops = self.ops_handle(name).await?;
		ops.try_lock_owned()
			.map_err(|_| Error::OperationInProgress(name.to_string()))
	}

	/// Start phase; caller holds the entry's op lock.
	async fn start_locked(self: &Arc<Self>, name: &str) -> Result<ProcessState> {
		let (spec, state) = {
			let table = self.table.read().await;
			let spec = table
				.registry
				.get(name)
				.ok_or_else(|| Error::NotFound(name.to_string()))?
				.clone();
			let entry = table
				.entries
				.get(name)
				.ok_or_else(|| Error::NotFound(name.to_string()))?;
			(spec, entry.state)
		};

		match state {
			ProcessState::Running | ProcessState::Starting | ProcessState::Restarting => {
				return Ok(state)
			}
			// A previous stop was abandoned mid-flight; its runner is still
			// winding down and will record Stopped shortly.
			ProcessState::Stopping => return Err(Error::OperationInProgress(name.to_string())),
			ProcessState::Stopped | ProcessState::Failed => {}
		}

		self.mark_starting(name).await;

		let child = match runner::spawn_child(&spec) {
			Ok(child) => child,
			Err(source) => {
				tracing::warn!("{}: spawn failed: {}", name, source);
				self.mark_finished(name, ProcessState::Failed, None).await;
				return Err(Error::SpawnFailed {
					name: name.to_string(),
					source,
				});
			}
		};

		let pid = child.id().unwrap_or(0);
		let (cancel_tx, cancel_rx) = watch::channel(false);
		{
			let mut table = self.table.write().await;
			let Some(entry) = table.entries.get_mut(name) else {
				return Err(Error::NotFound(name.to_string()));
			};
			entry.state = ProcessState::Running;
			entry.runtime = Some(RuntimeInfo {
				pid,
				started_at: SystemTime::now(),
			});
			entry.last_exit_code = None;
			entry.cancel = Some(cancel_tx);
		}
		tracing::info!("{}: started (pid {})", name, pid);
		self.emit(name, ProcessState::Running, Some(pid));

		let handle = tokio::spawn(runner::run(
			Arc::clone(self),
			name.to_string(),
			spec,
			child,
			cancel_rx,
		));
		{
			let mut table = self.table.write().await;
			if let Some(entry) = table.entries.get_mut(name) {
				// An immediately-crashing child may have finished already;
				// keep the handle only while the runner is live.
				if !entry.state.is_terminal() {
					entry.runner = Some(handle);
				}
			}
		}
		Ok(ProcessState::Running)
	}

	/// Stop phase; caller holds the entry's op lock. Waits for the runner
	/// task to reap the child before returning.
	async fn stop_locked(&self, name: &str) -> Result<ProcessState> {
		let (pid, cancel, handle) = {
			let mut table = self.table.write().await;
			let entry = table
				.entries
				.get_mut(name)
				.ok_or_else(|| Error::NotFound(name.to_string()))?;
			if entry.state.is_terminal() {
				return Ok(entry.state);
			}
			entry.state = ProcessState::Stopping;
			(
				entry.runtime.map(|r| r.pid),
				entry.cancel.take(),
				entry.runner.take(),
			)
		};
		self.emit(name, ProcessState::Stopping, pid);

		if let Some(cancel) = cancel {
			let _ = cancel.send(true);
		}
		if let Some(handle) = handle {
			if handle.await.is_err() {
				tracing::warn!("{}: runner task panicked during stop", name);
			}
		}

		// The runner normally records Stopped itself; force it if the task
		// died mid-transition so a stop always resolves to a dead process.
		let already = {
			let mut table = self.table.write().await;
			let entry = table
				.entries
				.get_mut(name)
				.ok_or_else(|| Error::NotFound(name.to_string()))?;
			let already = entry.state == ProcessState::Stopped;
			if !already {
				entry.state = ProcessState::Stopped;
				entry.runtime = None;
			}
			already
		};
		if !already {
			self.emit(name, ProcessState::Stopped, None);
		}
		tracing::info!("{}: stopped", name);
		Ok(ProcessState::Stopped)
	}

	// --- runner hooks --------------------------------------------------

	pub(crate) fn hub(&self) -> &Arc<LogHub> {
		&self.hub
	}

	pub(crate) fn restart_policy(&self) -> RestartPolicy {
		self.policy
	}

	pub(crate) fn stop_grace(&self) -> Duration {
		self.config.stop.grace()
	}

	pub(crate) async fn mark_starting(&self, name: &str) {
		{
			let mut table = self.table.write().await;
			if let Some(entry) = table.entries.get_mut(name) {
				entry.state = ProcessState::Starting;
				entry.runtime = None;
			}
		}
		self.emit(name, ProcessState::Starting, None);
	}

	pub(crate) async fn mark_running(&self, name: &str, pid: u32) {
		{
			let mut table = self.table.write().await;
			if let Some(entry) = table.entries.get_mut(name) {
				entry.state = ProcessState::Running;
				entry.runtime = Some(RuntimeInfo {
					pid,
					started_at: SystemTime::now(),
				});
			}
		}
		tracing::info!("{}: running (pid {})", name, pid);
		self.emit(name, ProcessState::Running, Some(pid));
	}

	pub(crate) async fn mark_restarting(&self, name: &str, exit_code: Option<i32>) {
		{
			let mut table = self.table.write().await;
			if let Some(entry) = table.entries.get_mut(name) {
				entry.state = ProcessState::Restarting;
				entry.runtime = None;
				if exit_code.is_some() {
					entry.last_exit_code = exit_code;
				}
			}
		}
		self.emit(name, ProcessState::Restarting, None);
	}

	/// Terminal transition from the runner: requested stop, crash without
	/// restart, or respawn failure.
	pub(crate) async fn mark_finished(
		&self,
		name: &str,
		state: ProcessState,
		exit_code: Option<i32>,
	) {
		{
			let mut table = self.table.write().await;
			if let Some(entry) = table.entries.get_mut(name) {
				entry.state = state;
				entry.runtime = None;
				if exit_code.is_some() {
					entry.last_exit_code = exit_code;
				}
				entry.cancel = None;
				entry.runner = None;
			}
		}
		self.emit(name, state, None);
	}

	pub(crate) async fn sample_targets(&self) -> Vec<SampleTarget> {
		let table = self.table.read().await;
		table
			.registry
			.names()
			.filter_map(|name| {
				let entry = table.entries.get(name)?;
				Some(SampleTarget {
					name: name.to_string(),
					state: entry.state,
					runtime: entry.runtime,
				})
			})
			.collect()
	}

	fn emit(&self, name: &str, state: ProcessState, pid: Option<u32>) {
		// No subscribers is fine.
		let _ = self.events.send(ProcessEvent {
			name: name.to_string(),
			state,
			pid,
		});
	}
}
