//! Literal bucket-count histogram: one bucket per microsecond up to a cap,
//! plus an overflow bucket. Used when exact bucket counts matter more than
//! dynamic range.

use std::sync::Mutex;

use super::MeasureSettings;
use crate::error::Result;
use crate::measure::export::Exporter;

#[derive(Debug, Clone)]
struct BucketState {
    buckets: Vec<u64>,
    overflow: u64,
    count: u64,
    sum: u64,
    min: u64,
    max: u64,
}

impl BucketState {
    fn new(cap: u64) -> Self {
        Self {
            buckets: vec![0; cap as usize],
            overflow: 0,
            count: 0,
            sum: 0,
            min: u64::MAX,
            max: 0,
        }
    }

    fn record(&mut self, value: u64) {
        if (value as usize) < self.buckets.len() {
            self.buckets[value as usize] += 1;
        } else {
            self.overflow += 1;
        }
        self.count += 1;
        self.sum += value;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    fn subtract(&self, base: &BucketState) -> BucketState {
        let buckets = self
            .buckets
            .iter()
            .zip(&base.buckets)
            .map(|(now, then)| now - then)
            .collect();
        BucketState {
            buckets,
            overflow: self.overflow - base.overflow,
            count: self.count - base.count,
            sum: self.sum - base.sum,
            // Interval extremes are not recoverable from totals; report the
            // running ones like the bucket counts themselves.
            min: self.min,
            max: self.max,
        }
    }

    fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum as f64 / self.count as f64
        }
    }

    /// Value below which `percentile`% of the samples fall; the overflow
    /// bucket reports the cap.
    fn value_at_percentile(&self, percentile: f64) -> u64 {
        if self.count == 0 {
            return 0;
        }
        let threshold = (self.count as f64 * percentile / 100.0).ceil() as u64;
        let mut seen = 0;
        for (value, bucket) in self.buckets.iter().enumerate() {
            seen += bucket;
            if seen >= threshold {
                return value as u64;
            }
        }
        self.buckets.len() as u64
    }
}

#[derive(Debug)]
pub struct BucketMeasure {
    state: Mutex<BucketState>,
    interval_base: Mutex<BucketState>,
}

impl BucketMeasure {
    pub fn new(cap: u64) -> Self {
        Self {
            state: Mutex::new(BucketState::new(cap)),
            interval_base: Mutex::new(BucketState::new(cap)),
        }
    }

    pub fn record(&self, value: u64) {
        self.state.lock().unwrap().record(value);
    }

    pub fn summary(&self, name: &str) -> String {
        let now = self.state.lock().unwrap().clone();
        let mut base = self.interval_base.lock().unwrap();
        let interval = now.subtract(&base);
        *base = now;
        format!(
            "[{}: Count={}, Max={}, Min={}, Avg={:.2}, 90={}, 99={}, 99.9={}, 99.99={}]",
            name,
            interval.count,
            interval.max,
            if interval.min == u64::MAX { 0 } else { interval.min },
            interval.mean(),
            interval.value_at_percentile(90.0),
            interval.value_at_percentile(99.0),
            interval.value_at_percentile(99.9),
            interval.value_at_percentile(99.99),
        )
    }

    pub fn export(
        &self,
        name: &str,
        settings: &MeasureSettings,
        exporter: &mut dyn Exporter,
    ) -> Result<()> {
        let state = self.state.lock().unwrap().clone();
        exporter.entry(name, "", state.count.into(), " operations")?;
        exporter.entry(name, "avg", state.mean().into(), " us")?;
        exporter.entry(
            name,
            "min",
            (if state.min == u64::MAX { 0 } else { state.min }).into(),
            " us",
        )?;
        exporter.entry(name, "max", state.max.into(), " us")?;
        for percentile in &settings.percentiles {
            exporter.entry(
                name,
                &format!("{percentile}p"),
                state.value_at_percentile(*percentile).into(),
                " us",
            )?;
        }
        exporter.entry(name, "overflow", state.overflow.into(), " operations")?;
        Ok(())
    }
}
