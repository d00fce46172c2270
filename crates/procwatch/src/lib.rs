//! # procwatch
//!
//! Process supervisor core for a management dashboard: a registry of
//! declarative process specs, serialized lifecycle operations, auto-restart
//! with exponential backoff, periodic resource sampling, and fan-out log
//! streaming. Transport, UI, and persistence live in the embedding
//! application.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use procwatch::{ProcessSpec, StatsCollector, Supervisor, SupervisorConfig};
//! use std::collections::HashMap;
//!
//! # #[tokio::main]
//! # async fn main() -> procwatch::Result<()> {
//! let sup = Supervisor::new(SupervisorConfig::default());
//!
//! sup.add(ProcessSpec {
//!     name: "web".into(),
//!     command: "python -m http.server".into(),
//!     working_dir: None,
//!     env: HashMap::new(),
//!     auto_restart: true,
//! })
//! .await?;
//!
//! sup.start("web").await?;
//!
//! let stats = StatsCollector::spawn(sup.clone(), Default::default());
//! let mut ticks = stats.subscribe();
//! if let Ok(tick) = ticks.recv().await {
//!     println!("sampled {} processes", tick.len());
//! }
//!
//! let mut logs = sup.subscribe_logs("web").await;
//! while let Some(line) = logs.next().await {
//!     println!("[{}] {}", line.seq, line.text);
//! }
//! # Ok(())
//! # }
//! ```

pub mod loghub;
pub mod policy;
pub mod registry;
pub mod stats;
pub mod supervisor;

mod runner;

pub use loghub::{LogHub, LogStream};
pub use policy::RestartPolicy;
pub use registry::Registry;
pub use stats::{StatsCollector, StatsTick};
pub use supervisor::Supervisor;

pub use procwatch_core::{
	Error, LogLine, LogSource, LogsConfig, ProcessDetail, ProcessEvent, ProcessSpec, ProcessState,
	ProcessStatus, RestartConfig, Result, RuntimeInfo, StatSnapshot, StatsConfig, StopConfig,
	SupervisorConfig,
};
