use procwatch_core::{LogLine, LogSource};
use std::collections::{HashMap, VecDeque};
use tokio::sync::{broadcast, Mutex};

/// Fan-out point for captured process output.
///
/// Keeps a bounded ring of recent lines per process (oldest dropped first)
/// and a broadcast channel for live delivery. Runners only push; the hub
/// owns every buffer. Subscribing to a name that has never produced output
/// succeeds and yields nothing until output appears.
pub struct LogHub {
	ring_capacity: usize,
	subscriber_buffer: usize,
	entries: Mutex<HashMap<String, ProcessLog>>,
}

struct ProcessLog {
	ring: VecDeque<LogLine>,
	next_seq: u64,
	tx: broadcast::Sender<LogLine>,
}

impl LogHub {
	pub fn new(ring_capacity: usize, subscriber_buffer: usize) -> Self {
		Self {
			ring_capacity: ring_capacity.max(1),
			subscriber_buffer: subscriber_buffer.max(1),
			entries: Mutex::new(HashMap::new()),
		}
	}

	pub async fn push(&self, name: &str, source: LogSource, text: String) {
		let mut entries = self.entries.lock().await;
		let buffer = self.subscriber_buffer;
		let entry = entries
			.entry(name.to_string())
			.or_insert_with(|| ProcessLog::new(buffer));

		let line = LogLine {
			seq: entry.next_seq,
			source,
			text,
		};
		entry.next_seq += 1;

		if entry.ring.len() >= self.ring_capacity {
			entry.ring.pop_front();
		}
		entry.ring.push_back(line.clone());

		// No receivers is fine; the ring still records the line.
		let _ = entry.tx.send(line);
	}

	/// Backlog-then-live stream for one process. The ring snapshot and the
	/// live subscription are taken under the same lock, so a subscriber sees
	/// every buffered line before any newer line, without gaps or duplicates.
	pub async fn subscribe(&self, name: &str) -> LogStream {
		let mut entries = self.entries.lock().await;
		let buffer = self.subscriber_buffer;
		let entry = entries
			.entry(name.to_string())
			.or_insert_with(|| ProcessLog::new(buffer));
		LogStream {
			backlog: entry.ring.iter().cloned().collect(),
			rx: entry.tx.subscribe(),
		}
	}

	/// Drops the buffers for a removed process. Live streams end once they
	/// drain; new subscriptions start from an empty ring.
	pub async fn remove(&self, name: &str) {
		self.entries.lock().await.remove(name);
	}

	#[cfg(test)]
	async fn ring_len(&self, name: &str) -> usize {
		self.entries
			.lock()
			.await
			.get(name)
			.map(|e| e.ring.len())
			.unwrap_or(0)
	}
}

impl ProcessLog {
	fn new(subscriber_buffer: usize) -> Self {
		let (tx, _) = broadcast::channel(subscriber_buffer);
		Self {
			ring: VecDeque::new(),
			next_seq: 0,
			tx,
		}
	}
}

/// Handle returned by [`LogHub::subscribe`]. Dropping it unsubscribes.
pub struct LogStream {
	backlog: VecDeque<LogLine>,
	rx: broadcast::Receiver<LogLine>,
}

impl LogStream {
	/// Next line, backlog first. Waits for live output once the backlog is
	/// drained; returns `None` only after the process is removed from the
	/// hub and all buffered lines are consumed. A slow consumer skips the
	/// oldest lines it lagged past instead of blocking the producer.
	pub async fn next(&mut self) -> Option<LogLine> {
		if let Some(line) = self.backlog.pop_front() {
			return Some(line);
		}
		loop {
			match self.rx.recv().await {
				Ok(line) => return Some(line),
				Err(broadcast::error::RecvError::Lagged(skipped)) => {
					tracing::debug!("log subscriber lagged, dropped {} oldest lines", skipped);
					continue;
				}
				Err(broadcast::error::RecvError::Closed) => return None,
			}
		}
	}

	/// Non-blocking variant: whatever is immediately available.
	pub fn try_next(&mut self) -> Option<LogLine> {
		if let Some(line) = self.backlog.pop_front() {
			return Some(line);
		}
		loop {
			match self.rx.try_recv() {
				Ok(line) => return Some(line),
				Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
				Err(_) => return None,
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::time::Duration;

	#[tokio::test]
	async fn backlog_precedes_live_lines() {
		let hub = LogHub::new(100, 16);
		hub.push("web", LogSource::Stdout, "one".into()).await;
		hub.push("web", LogSource::Stdout, "two".into()).await;

		let mut stream = hub.subscribe("web").await;
		hub.push("web", LogSource::Stdout, "three".into()).await;

		let seen: Vec<String> = vec![
			stream.next().await.unwrap().text,
			stream.next().await.unwrap().text,
			stream.next().await.unwrap().text,
		];
		assert_eq!(seen, vec!["one", "two", "three"]);
	}

	#[tokio::test]
	async fn seq_is_monotonic_across_boundary() {
		let hub = LogHub::new(100, 16);
		for i in 0..5 {
			hub.push("web", LogSource::Stdout, format!("line {}", i)).await;
		}
		let mut stream = hub.subscribe("web").await;
		hub.push("web", LogSource::Stderr, "live".into()).await;

		let mut last = None;
		for _ in 0..6 {
			let line = stream.next().await.unwrap();
			if let Some(prev) = last {
				assert!(line.seq > prev, "seq {} not after {}", line.seq, prev);
			}
			last = Some(line.seq);
		}
	}

	#[tokio::test]
	async fn ring_drops_oldest_at_capacity() {
		let hub = LogHub::new(3, 16);
		for i in 0..10 {
			hub.push("web", LogSource::Stdout, format!("line {}", i)).await;
		}
		assert_eq!(hub.ring_len("web").await, 3);

		let mut stream = hub.subscribe("web").await;
		let first = stream.next().await.unwrap();
		assert_eq!(first.text, "line 7");
		assert_eq!(first.seq, 7);
	}

	#[tokio::test]
	async fn unknown_name_yields_nothing_until_output() {
		let hub = LogHub::new(100, 16);
		let mut stream = hub.subscribe("nope").await;

		let idle = tokio::time::timeout(Duration::from_millis(50), stream.next()).await;
		assert!(idle.is_err(), "expected no output yet");

		hub.push("nope", LogSource::Stdout, "hello".into()).await;
		let line = tokio::time::timeout(Duration::from_millis(200), stream.next())
			.await
			.unwrap()
			.unwrap();
		assert_eq!(line.text, "hello");
	}

	#[tokio::test]
	async fn remove_ends_drained_streams() {
		let hub = LogHub::new(100, 16);
		hub.push("web", LogSource::Stdout, "bye".into()).await;
		let mut stream = hub.subscribe("web").await;
		hub.remove("web").await;

		assert_eq!(stream.next().await.unwrap().text, "bye");
		assert!(stream.next().await.is_none());
	}

	#[tokio::test]
	async fn slow_subscriber_drops_oldest_not_producer() {
		let hub = LogHub::new(1000, 4);
		let mut stream = hub.subscribe("web").await;
		for i in 0..50 {
			hub.push("web", LogSource::Stdout, format!("line {}", i)).await;
		}
		// The stream lagged past the oldest lines; what remains is still in
		// order and ends with the newest line.
		let mut seen = Vec::new();
		while let Some(line) = stream.try_next() {
			seen.push(line.seq);
		}
		assert!(seen.len() <= 4);
		assert_eq!(*seen.last().unwrap(), 49);
		for pair in seen.windows(2) {
			assert!(pair[0] < pair[1]);
		}
	}
}
