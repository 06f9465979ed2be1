//! Millstone — a throughput/latency benchmarking harness for pluggable
//! storage backends.
//!
//! Millstone drives a storage adapter with a parameterised synthetic
//! workload from N concurrent workers and reports latency histograms and
//! throughput. Its value is the measurement engine between the workload
//! generators and the adapter, not any particular backend binding.
//!
//! # Architecture
//!
//! The main building blocks are:
//!
//! - [`Config`]: a flat property map with typed accessors; created once at
//!   startup, read-only afterwards.
//! - [`generator`]: the key-selection and length distributions (uniform,
//!   sequential, zipfian, scrambled-zipfian, latest, hotspot, exponential,
//!   histogram-file) plus the weighted operation picker and the
//!   acknowledged counter that keeps readers behind durable inserts.
//! - [`CoreWorkload`]: chooses and issues one operation at a time against
//!   an adapter, honouring the configured mix and key skew.
//! - [`store`]: the adapter contract, the built-in `noop`/`memory`
//!   adapters, and the measuring wrapper that records two latency samples
//!   per call (actual and intended).
//! - [`measure`]: the concurrent measurement registry — HDR histograms,
//!   bucket histograms, raw logs, time series — and the export sinks.
//! - [`Runner`]: wires everything, fans out one worker task per thread of
//!   the configured thread count, arms the status reporter and the
//!   wall-clock terminator, and exports at shutdown.
//!
//! # Example
//!
//! ```rust,no_run
//! use millstone::{Config, Runner};
//!
//! # async fn demo() -> millstone::Result<()> {
//! let mut config = Config::new();
//! config.set("workload", "core");
//! config.set("db", "noop");
//! config.set("recordcount", "1000");
//! config.set("stage", "load");
//! config.set("threadcount", "4");
//!
//! let summary = Runner::builder().config(config).build().run().await?;
//! println!("{} ops at {:.0} ops/s", summary.operations, summary.throughput);
//! # Ok(())
//! # }
//! ```
//!
//! # Design notes
//!
//! - Workers are parallel tasks with a per-task rate budget; logical
//!   workers are never multiplexed onto one task, so a worker's throttle
//!   deadlines (`start + k × tick`) are meaningful.
//! - All scheduling uses the monotonic clock; wall-clock time appears only
//!   in human-readable status output and raw-sample timestamps.
//! - Adapter failures are data (counted, measured under `-FAILED`), not
//!   errors; errors end the run.

/// Property map and typed accessors.
pub mod config;
/// Crate-wide error taxonomy.
pub mod error;
/// Distribution generators, the operation picker, the acknowledged counter.
pub mod generator;
/// Measurement registry, histograms, export sinks.
pub mod measure;
/// Orchestration of one benchmark run.
pub mod runner;
/// Status reporter and terminator tasks.
pub mod status;
/// Storage-adapter contract, built-in adapters, measuring wrapper.
pub mod store;
/// The per-thread closed-loop driver.
pub mod worker;
/// The core CRUD workload.
pub mod workload;

pub use config::{Config, Stage};
pub use error::{Error, Result};
pub use runner::{RunSummary, Runner};
pub use store::{Status, StorageAdapter};
pub use workload::CoreWorkload;
