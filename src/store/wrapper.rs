//! Wrapper around a storage adapter that measures latencies and counts
//! return codes.
//!
//! Two samples are recorded per call: the operation latency (actual start
//! to end) and the intended latency (the throttle's planned start to end).
//! Failed operations report under `<OP>-FAILED` so success and failure
//! latencies never mix.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::time::Instant;

use super::{Options, Row, Status, StorageAdapter, TraceInfo};
use crate::config::IntervalMode;
use crate::error::Result;
use crate::measure::{LocalRecorder, Measurements};

pub struct MeasuredStore {
    inner: Box<dyn StorageAdapter>,
    measurements: Arc<Measurements>,
    /// Writer-local recorders, keyed by metric name; populated on first use.
    recorders: HashMap<String, LocalRecorder>,
    intended_recorders: HashMap<String, LocalRecorder>,
}

impl MeasuredStore {
    pub fn new(inner: Box<dyn StorageAdapter>, measurements: Arc<Measurements>) -> Self {
        Self {
            inner,
            measurements,
            recorders: HashMap::new(),
            intended_recorders: HashMap::new(),
        }
    }

    pub async fn init(&mut self) -> Result<()> {
        self.inner.init().await
    }

    pub async fn cleanup(&mut self) -> Result<()> {
        let start = Instant::now();
        self.inner.cleanup().await?;
        let end = Instant::now();
        self.record("CLEANUP", Status::Ok, start, start, end);
        Ok(())
    }

    pub async fn read(
        &mut self,
        table: &str,
        key: &str,
        fields: Option<&[String]>,
        options: &Options,
        result: &mut Row,
        intended: Instant,
    ) -> Status {
        let start = Instant::now();
        let status = self.inner.read(table, key, fields, options, result).await;
        let end = Instant::now();
        self.record("READ", status, intended, start, end);
        status
    }

    pub async fn scan(
        &mut self,
        table: &str,
        start_key: &str,
        record_count: usize,
        fields: Option<&[String]>,
        result: &mut Vec<Row>,
        intended: Instant,
    ) -> Status {
        let start = Instant::now();
        let status = self
            .inner
            .scan(table, start_key, record_count, fields, result)
            .await;
        let end = Instant::now();
        self.record("SCAN", status, intended, start, end);
        status
    }

    pub async fn update(&mut self, table: &str, key: &str, values: Row, intended: Instant) -> Status {
        let start = Instant::now();
        let status = self.inner.update(table, key, values).await;
        let end = Instant::now();
        self.record("UPDATE", status, intended, start, end);
        status
    }

    pub async fn insert(
        &mut self,
        table: &str,
        key: &str,
        values: Row,
        options: &Options,
        intended: Instant,
    ) -> Status {
        let start = Instant::now();
        let status = self.inner.insert(table, key, values, options).await;
        let end = Instant::now();
        self.record("INSERT", status, intended, start, end);
        status
    }

    pub async fn delete(&mut self, table: &str, key: &str, intended: Instant) -> Status {
        let start = Instant::now();
        let status = self.inner.delete(table, key).await;
        let end = Instant::now();
        self.record("DELETE", status, intended, start, end);
        status
    }

    pub fn traces(&mut self) -> Vec<TraceInfo> {
        self.inner.traces()
    }

    fn record(&mut self, op: &str, status: Status, intended: Instant, start: Instant, end: Instant) {
        let name = if status.is_ok() {
            op.to_string()
        } else {
            format!("{op}-FAILED")
        };
        let micros = end.saturating_duration_since(start).as_micros() as u64;
        let intended_micros = end.saturating_duration_since(intended).as_micros() as u64;
        let mode = self.measurements.interval_mode();

        if mode != IntervalMode::Intended {
            Self::record_into(&self.measurements, &mut self.recorders, &name, micros, false);
        }
        if mode != IntervalMode::Op {
            Self::record_into(
                &self.measurements,
                &mut self.intended_recorders,
                &name,
                intended_micros,
                true,
            );
        }
        if let Err(err) = self.measurements.report_status(op, status) {
            tracing::warn!(op, %err, "failed to count return code");
        }
    }

    fn record_into(
        measurements: &Measurements,
        cache: &mut HashMap<String, LocalRecorder>,
        name: &str,
        micros: u64,
        intended: bool,
    ) {
        if let Some(recorder) = cache.get_mut(name) {
            recorder.record(micros);
            return;
        }
        let fetched = if intended {
            measurements.intended_recorder(name)
        } else {
            measurements.recorder(name)
        };
        match fetched {
            Ok(Some(mut recorder)) => {
                recorder.record(micros);
                cache.insert(name.to_string(), recorder);
            }
            Ok(None) => {}
            Err(err) => tracing::warn!(name, %err, "failed to create measurement"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::store::noop::NoopStore;

    fn measurements() -> Arc<Measurements> {
        let mut config = Config::new();
        config.set("workload", "core");
        Arc::new(Measurements::from_config(&config).unwrap())
    }

    #[tokio::test]
    async fn records_one_sample_per_call() {
        let registry = measurements();
        let mut store = MeasuredStore::new(Box::new(NoopStore::new()), Arc::clone(&registry));
        let options = Options::new();
        let mut row = Row::new();
        let now = Instant::now();
        for _ in 0..5 {
            store.read("t", "k", None, &options, &mut row, now).await;
        }
        drop(store);
        let summary = registry.summary();
        assert!(summary.contains("[READ: Count=5"), "{summary}");
    }

    #[tokio::test]
    async fn failures_report_separately() {
        let registry = measurements();
        let mut store = MeasuredStore::new(
            Box::new(crate::store::memory::MemoryStore::new()),
            Arc::clone(&registry),
        );
        let options = Options::new();
        let mut row = Row::new();
        let now = Instant::now();
        // Key does not exist, so the read fails.
        let status = store.read("t", "missing", None, &options, &mut row, now).await;
        assert_eq!(status, Status::NotFound);
        drop(store);
        let summary = registry.summary();
        assert!(summary.contains("[READ-FAILED: Count=1"), "{summary}");
    }
}
