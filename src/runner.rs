//! The orchestrator: builds the workload state, fans out workers, arms the
//! background tasks, and exports the measurements at shutdown.

use std::fs::File;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::Instant;
use typed_builder::TypedBuilder;

use crate::config::{Config, MeasurementType, Stage};
use crate::error::{Error, Result};
use crate::measure::export::{Exporter, JsonExporter, TextExporter};
use crate::measure::Measurements;
use crate::status::{terminator, StatusReporter};
use crate::store::wrapper::MeasuredStore;
use crate::store::StoreFactory;
use crate::worker::{Worker, WorkerOutcome};
use crate::workload::CoreWorkload;

/// Final run totals, also serialisable for machine consumers.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub operations: u64,
    pub runtime_ms: u64,
    pub throughput: f64,
}

/// One benchmark run: configuration in, exported measurements out.
#[derive(TypedBuilder)]
pub struct Runner {
    config: Config,
    /// Override to share in-process backends across stages (tests do this
    /// to read back what a load stage wrote).
    #[builder(default)]
    store_factory: StoreFactory,
}

impl Runner {
    pub async fn run(self) -> Result<RunSummary> {
        let config = &self.config;
        config.validate()?;
        match config.workload()? {
            "core" => {}
            other => return Err(Error::UnknownWorkload(other.to_string())),
        }

        let stage = config.stage()?;
        let measurements = Arc::new(Measurements::from_config(config)?);
        let workload = Arc::new(CoreWorkload::new(config)?);

        let total_ops = match stage {
            Stage::Load => config.insert_count()?,
            Stage::Transactions => config.operation_count()?,
        };
        let mut thread_count = config.thread_count()?.max(1);
        if total_ops > 0 && thread_count as u64 > total_ops {
            // More threads than operations would leave workers idle.
            thread_count = total_ops as usize;
        }

        let target = config.target()?;
        let thread_target_per_ms = if target > 0 {
            target as f64 / thread_count as f64 / 1000.0
        } else {
            0.0
        };

        let base_seed = match config.seed()? {
            Some(seed) => seed,
            None => rand::random(),
        };

        let (stop_tx, stop_rx) = watch::channel(false);
        let (complete_tx, complete_rx) = watch::channel(false);

        tracing::info!(
            ?stage,
            threads = thread_count,
            total_ops,
            target,
            "starting benchmark"
        );

        let mut workers = Vec::with_capacity(thread_count);
        let mut progresses = Vec::with_capacity(thread_count);
        for id in 0..thread_count {
            let adapter = self.store_factory.create(config.db(), config)?;
            let store = MeasuredStore::new(adapter, Arc::clone(&measurements));

            let mut share = total_ops / thread_count as u64;
            if (id as u64) < total_ops % thread_count as u64 {
                share += 1;
            }

            let mut worker = Worker::new(
                id,
                store,
                Arc::clone(&workload),
                stage,
                share,
                thread_target_per_ms,
                base_seed
                    .wrapping_add(id as u64)
                    .wrapping_mul(0x9E37_79B9_7F4A_7C15),
                stop_rx.clone(),
            );
            worker
                .init()
                .await
                .map_err(|err| Error::StoreInit(err.to_string()))?;
            progresses.push(worker.progress());
            workers.push(worker);
        }

        let status_handle = if config.status()? {
            let label = config.label();
            let reporter = StatusReporter::new(
                if label.is_empty() {
                    String::new()
                } else {
                    format!("{label} ")
                },
                Duration::from_secs(config.status_interval_secs()?.max(1)),
                config.measurement_type()? == MeasurementType::TimeSeries,
                config.track_runtime_stats()?,
                Arc::clone(&measurements),
                progresses,
                complete_rx.clone(),
            );
            Some(tokio::spawn(reporter.run()))
        } else {
            None
        };

        let max_execution = config.max_execution_time_secs()?;
        let terminator_handle = (max_execution > 0).then(|| {
            tokio::spawn(terminator(
                Duration::from_secs(max_execution),
                Arc::clone(&workload),
                stop_tx,
                complete_rx.clone(),
            ))
        });

        let start = Instant::now();
        let handles: Vec<_> = workers
            .into_iter()
            .map(|worker| tokio::spawn(worker.run()))
            .collect();
        let joined = join_all(handles).await;
        let runtime = start.elapsed();

        let _ = complete_tx.send(true);
        if let Some(handle) = status_handle {
            let _ = handle.await;
        }
        if let Some(handle) = terminator_handle {
            let _ = handle.await;
        }

        let mut stores = Vec::new();
        let mut operations = 0;
        let mut fatal: Option<Error> = None;
        for joined_worker in joined {
            match joined_worker {
                Ok(WorkerOutcome {
                    id,
                    store,
                    ops_done,
                    result,
                }) => {
                    operations += ops_done;
                    if let Err(err) = result {
                        tracing::error!(worker = id, %err, "worker failed");
                        fatal.get_or_insert(err);
                    }
                    stores.push(store);
                }
                Err(err) => {
                    // A panicked worker loses its adapter but must not take
                    // the rest of the run's data with it.
                    tracing::error!(%err, "worker panicked");
                }
            }
        }

        // Traces before cleanup, so draining them cannot race a closing
        // backend session.
        for store in &mut stores {
            let traces = store.traces();
            if !traces.is_empty() {
                tracing::debug!(count = traces.len(), "collected traces");
            }
        }
        for store in &mut stores {
            if let Err(err) = store.cleanup().await {
                tracing::error!(%err, "adapter cleanup failed");
            }
        }

        let summary = RunSummary {
            operations,
            runtime_ms: runtime.as_millis() as u64,
            throughput: operations as f64 * 1000.0 / (runtime.as_millis() as u64).max(1) as f64,
        };
        let mut exporter = build_exporter(config)?;
        exporter.entry("TOTAL", "", summary.operations.into(), " operations")?;
        exporter.entry("TOTAL", "runtime", summary.runtime_ms.into(), " ms")?;
        exporter.entry("TOTAL", "throughput", summary.throughput.into(), " ops/s")?;
        measurements.export(exporter.as_mut())?;
        exporter.finish()?;

        match fatal {
            Some(err) => Err(err),
            None => Ok(summary),
        }
    }
}

fn build_exporter(config: &Config) -> Result<Box<dyn Exporter>> {
    let out: Box<dyn Write + Send> = match config.export_file() {
        None => Box::new(std::io::stdout()),
        Some(path) => Box::new(std::io::BufWriter::new(File::create(path)?)),
    };
    match config.exporter() {
        "text" => Ok(Box::new(TextExporter::new(out))),
        "json" => Ok(Box::new(JsonExporter::new(out))),
        other => Err(Error::InvalidProperty {
            key: "exporter".to_string(),
            value: other.to_string(),
            reason: "expected text or json".to_string(),
        }),
    }
}
