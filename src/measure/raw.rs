//! Raw measurement: every sample kept and exported verbatim.
//!
//! Unbounded memory by design; meant for short runs that need offline
//! analysis of individual samples.

use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use super::MeasureSettings;
use crate::error::Result;
use crate::measure::export::Exporter;

#[derive(Debug, Clone, Copy)]
pub struct RawPoint {
    pub timestamp_ms: u64,
    pub value: u64,
}

#[derive(Debug, Default)]
pub struct RawMeasure {
    points: Mutex<Vec<RawPoint>>,
    /// Index of the first point not yet covered by a summary.
    summarised: Mutex<usize>,
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn stats(values: &mut [u64]) -> (u64, f64, u64, u64) {
    values.sort_unstable();
    let count = values.len() as u64;
    let sum: u64 = values.iter().sum();
    let avg = if count == 0 { 0.0 } else { sum as f64 / count as f64 };
    let min = values.first().copied().unwrap_or(0);
    let max = values.last().copied().unwrap_or(0);
    (count, avg, min, max)
}

fn value_at_percentile(sorted: &[u64], percentile: f64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let rank = ((sorted.len() as f64 * percentile / 100.0).ceil() as usize).max(1);
    sorted[rank.min(sorted.len()) - 1]
}

impl RawMeasure {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, value: u64) {
        self.points.lock().unwrap().push(RawPoint {
            timestamp_ms: now_ms(),
            value,
        });
    }

    pub fn summary(&self, name: &str) -> String {
        let points = self.points.lock().unwrap();
        let mut from = self.summarised.lock().unwrap();
        let mut window: Vec<u64> = points[*from..].iter().map(|p| p.value).collect();
        *from = points.len();
        drop(points);

        let (count, avg, min, max) = stats(&mut window);
        format!(
            "[{}: Count={}, Max={}, Min={}, Avg={:.2}, 90={}, 99={}, 99.9={}, 99.99={}]",
            name,
            count,
            max,
            min,
            avg,
            value_at_percentile(&window, 90.0),
            value_at_percentile(&window, 99.0),
            value_at_percentile(&window, 99.9),
            value_at_percentile(&window, 99.99),
        )
    }

    pub fn export(
        &self,
        name: &str,
        settings: &MeasureSettings,
        exporter: &mut dyn Exporter,
    ) -> Result<()> {
        let points = self.points.lock().unwrap().clone();

        let mut values: Vec<u64> = points.iter().map(|p| p.value).collect();
        let (count, avg, min, max) = stats(&mut values);
        exporter.entry(name, "", count.into(), " operations")?;
        exporter.entry(name, "avg", avg.into(), " us")?;
        exporter.entry(name, "min", min.into(), " us")?;
        exporter.entry(name, "max", max.into(), " us")?;
        for percentile in &settings.percentiles {
            exporter.entry(
                name,
                &format!("{percentile}p"),
                value_at_percentile(&values, *percentile).into(),
                " us",
            )?;
        }
        for point in &points {
            exporter.entry(name, &point.timestamp_ms.to_string(), point.value.into(), " us")?;
        }
        Ok(())
    }
}
