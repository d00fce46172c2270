use procwatch_core::{ProcessState, StatSnapshot, StatsConfig};
use std::collections::HashMap;
use std::sync::Arc;
use sysinfo::{Pid, ProcessesToUpdate, System};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::supervisor::Supervisor;

/// One snapshot map per tick, keyed by process name. Every registered
/// process gets a row; entries without a live pid carry status only.
pub type StatsTick = HashMap<String, StatSnapshot>;

const STATS_BUS_CAPACITY: usize = 16;

/// Periodic CPU/memory/uptime sampler for every process the supervisor has
/// a live pid for. A pid that vanishes between the table read and the
/// sysinfo read degrades that one entry; the tick itself never fails.
pub struct StatsCollector {
	tx: broadcast::Sender<StatsTick>,
	handle: JoinHandle<()>,
}

impl StatsCollector {
	pub fn spawn(sup: Arc<Supervisor>, config: StatsConfig) -> Self {
		let (tx, _) = broadcast::channel(STATS_BUS_CAPACITY);
		let sender = tx.clone();
		let tick = config.tick();
		let handle = tokio::spawn(async move {
			sample_loop(sup, tick, sender).await;
		});
		Self { tx, handle }
	}

	/// A new receiver gets every snapshot map published after this call;
	/// resubscribing after a drop simply picks up at the next tick.
	pub fn subscribe(&self) -> broadcast::Receiver<StatsTick> {
		self.tx.subscribe()
	}

	pub fn stop(&self) {
		self.handle.abort();
	}
}

impl Drop for StatsCollector {
	fn drop(&mut self) {
		self.handle.abort();
	}
}

async fn sample_loop(
	sup: Arc<Supervisor>,
	tick: std::time::Duration,
	tx: broadcast::Sender<StatsTick>,
) {
	let mut system = System::new();
	let mut interval = tokio::time::interval(tick);
	interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

	loop {
		interval.tick().await;

		let targets = sup.sample_targets().await;
		let pids: Vec<Pid> = targets
			.iter()
			.filter_map(|t| t.runtime.map(|r| Pid::from_u32(r.pid)))
			.collect();
		if !pids.is_empty() {
			system.refresh_processes(ProcessesToUpdate::Some(&pids), true);
		}

		let mut snapshot = StatsTick::with_capacity(targets.len());
		for target in targets {
			let snap = match target.runtime {
				Some(runtime) => match system.process(Pid::from_u32(runtime.pid)) {
					Some(proc) => StatSnapshot {
						state: target.state,
						pid: Some(runtime.pid),
						uptime_secs: Some(runtime.uptime().as_secs()),
						cpu_percent: Some(proc.cpu_usage()),
						memory_bytes: Some(proc.memory()),
					},
					None => {
						tracing::debug!(
							"{}: pid {} vanished during sampling",
							target.name,
							runtime.pid
						);
						StatSnapshot::idle(ProcessState::Stopped)
					}
				},
				None => StatSnapshot::idle(target.state),
			};
			snapshot.insert(target.name, snap);
		}

		// No subscribers is fine; snapshots are ephemeral.
		let _ = tx.send(snapshot);
	}
}
