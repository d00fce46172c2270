use procwatch_core::{LogSource, ProcessSpec, ProcessState};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio::time::Instant;

use crate::loghub::LogHub;
use crate::supervisor::Supervisor;

/// Spawns the spec's command through `sh -c` in its own process group, so a
/// stop can signal the whole tree. Spawn success defines Running; readiness
/// is the child's own problem.
pub(crate) fn spawn_child(spec: &ProcessSpec) -> std::io::Result<Child> {
	let mut cmd = Command::new("sh");
	cmd.args(["-c", &spec.command])
		.stdout(Stdio::piped())
		.stderr(Stdio::piped())
		.process_group(0);

	if let Some(dir) = &spec.working_dir {
		cmd.current_dir(dir);
	}
	for (key, val) in &spec.env {
		cmd.env(key, val);
	}

	cmd.spawn()
}

/// Waiter loop for one started process. Owns the OS child exclusively:
/// watches for exit, applies the auto-restart policy, and performs the
/// graceful termination when the supervisor signals cancel. All state
/// transitions go back through the supervisor's table so readers never see
/// a half-applied one.
pub(crate) async fn run(
	sup: Arc<Supervisor>,
	name: String,
	spec: ProcessSpec,
	mut child: Child,
	mut cancel: watch::Receiver<bool>,
) {
	let policy = sup.restart_policy();
	let grace = sup.stop_grace();
	let mut attempt: u32 = 0;

	loop {
		let pid = child.id().unwrap_or(0);
		pipe_child_output(sup.hub(), &name, &mut child);
		let started = Instant::now();

		let exited = tokio::select! {
			status = child.wait() => Some(status),
			_ = cancel.changed() => None,
		};

		let status = match exited {
			None => {
				// Stop requested while running.
				terminate(&mut child, pid, grace).await;
				sup.mark_finished(&name, ProcessState::Stopped, None).await;
				return;
			}
			Some(status) => status,
		};

		let code = status.ok().and_then(|s| s.code());
		if policy.sustained(started.elapsed()) {
			attempt = 0;
		}

		if !spec.auto_restart {
			tracing::info!("{}: exited (code {:?})", name, code);
			sup.mark_finished(&name, ProcessState::Failed, code).await;
			return;
		}

		let delay = policy.delay(attempt);
		attempt += 1;
		tracing::info!(
			"{}: exited (code {:?}), restart attempt {} in {:?}",
			name,
			code,
			attempt,
			delay
		);
		sup.mark_restarting(&name, code).await;

		tokio::select! {
			_ = tokio::time::sleep(delay) => {}
			_ = cancel.changed() => {
				// Stop during backoff cancels the pending restart.
				sup.mark_finished(&name, ProcessState::Stopped, code).await;
				return;
			}
		}

		sup.mark_starting(&name).await;
		match spawn_child(&spec) {
			Ok(next) => {
				child = next;
				sup.mark_running(&name, child.id().unwrap_or(0)).await;
			}
			Err(e) => {
				tracing::warn!("{}: respawn failed: {}", name, e);
				sup.mark_finished(&name, ProcessState::Failed, None).await;
				return;
			}
		}
	}
}

/// SIGTERM to the process group, a bounded grace period, then SIGKILL.
/// Returns once the child is reaped.
async fn terminate(child: &mut Child, pid: u32, grace: Duration) {
	use nix::sys::signal::{killpg, Signal};
	use nix::unistd::Pid;

	if pid == 0 {
		// Already reaped or never had a pid; pgid 0 would signal ourselves.
		let _ = child.kill().await;
		return;
	}

	let pgid = Pid::from_raw(pid as i32);
	let _ = killpg(pgid, Signal::SIGTERM);

	match tokio::time::timeout(grace, child.wait()).await {
		Ok(_) => {}
		Err(_) => {
			let _ = killpg(pgid, Signal::SIGKILL);
			let _ = child.wait().await;
		}
	}
}

fn pipe_child_output(hub: &Arc<LogHub>, name: &str, child: &mut Child) {
	if let Some(stdout) = child.stdout.take() {
		let hub = Arc::clone(hub);
		let name = name.to_string();
		tokio::spawn(async move {
			pipe_lines(stdout, hub, name, LogSource::Stdout).await;
		});
	}
	if let Some(stderr) = child.stderr.take() {
		let hub = Arc::clone(hub);
		let name = name.to_string();
		tokio::spawn(async move {
			pipe_lines(stderr, hub, name, LogSource::Stderr).await;
		});
	}
}

async fn pipe_lines<R: tokio::io::AsyncRead + Unpin>(
	reader: R,
	hub: Arc<LogHub>,
	name: String,
	source: LogSource,
) {
	let mut lines = BufReader::new(reader).lines();
	while let Ok(Some(line)) = lines.next_line().await {
		hub.push(&name, source, line).await;
	}
}
