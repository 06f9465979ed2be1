//! High-dynamic-range latency measurement.
//!
//! Writers record microseconds through per-caller [`Recorder`] handles;
//! recording is wait-free with respect to the reader. The status reporter
//! is the only reader: it refreshes the shared histogram, derives the
//! interval since the previous refresh by subtraction, and keeps the
//! cumulative view for the final export.

use std::fs::File;
use std::io::BufWriter;
use std::sync::Mutex;
use std::time::Duration;

use hdrhistogram::sync::{Recorder, SyncHistogram};
use hdrhistogram::Histogram;

use super::MeasureSettings;
use crate::error::Result;
use crate::measure::export::Exporter;

/// Three significant digits over microseconds, auto-resizing.
const SIGNIFICANT_DIGITS: u8 = 3;

/// How long a refresh waits for idle recorders before folding what it has.
const REFRESH_TIMEOUT: Duration = Duration::from_millis(100);

pub struct HdrMeasure {
    /// Cumulative histogram. Writers touch it only long enough to mint a
    /// recorder; the reporter holds it across a refresh.
    live: Mutex<SyncHistogram<u64>>,
    /// Snapshot of `live` at the previous summary, for interval stats.
    interval_base: Mutex<Histogram<u64>>,
}

impl HdrMeasure {
    pub fn new() -> Result<Self> {
        let live = Histogram::<u64>::new(SIGNIFICANT_DIGITS)?.into_sync();
        let interval_base = Histogram::<u64>::new(SIGNIFICANT_DIGITS)?;
        Ok(Self {
            live: Mutex::new(live),
            interval_base: Mutex::new(interval_base),
        })
    }

    /// A private recording handle for one writer. Dropping the handle
    /// flushes its samples to the shared histogram.
    pub fn recorder(&self) -> Recorder<u64> {
        self.live.lock().unwrap().recorder()
    }

    /// One-off recording path for infrequent writers (runtime stats).
    pub fn record(&self, value: u64) {
        let mut recorder = self.recorder();
        let _ = recorder.record(value);
    }

    /// Fold pending samples and return `(interval, cumulative)` views.
    fn refresh(&self) -> (Histogram<u64>, Histogram<u64>) {
        let mut live = self.live.lock().unwrap();
        live.refresh_timeout(REFRESH_TIMEOUT);
        let cumulative: Histogram<u64> = (**live).clone();
        drop(live);

        let mut base = self.interval_base.lock().unwrap();
        let mut interval = cumulative.clone();
        // The base is always a prefix of the cumulative view.
        let _ = interval.subtract(&*base);
        *base = cumulative.clone();
        (interval, cumulative)
    }

    pub fn summary(&self, name: &str) -> String {
        let (interval, _) = self.refresh();
        format!(
            "[{}: Count={}, Max={}, Min={}, Avg={:.2}, 90={}, 99={}, 99.9={}, 99.99={}]",
            name,
            interval.len(),
            interval.max(),
            interval.min(),
            interval.mean(),
            interval.value_at_quantile(0.90),
            interval.value_at_quantile(0.99),
            interval.value_at_quantile(0.999),
            interval.value_at_quantile(0.9999),
        )
    }

    pub fn export(
        &self,
        name: &str,
        settings: &MeasureSettings,
        exporter: &mut dyn Exporter,
    ) -> Result<()> {
        let (_, total) = self.refresh();

        if settings.hdr_file_output {
            self.write_hdr_file(name, settings, &total)?;
        }

        exporter.entry(name, "", total.len().into(), " operations")?;
        exporter.entry(name, "avg", total.mean().into(), " us")?;
        exporter.entry(name, "min", total.min().into(), " us")?;
        exporter.entry(name, "max", total.max().into(), " us")?;
        for percentile in &settings.percentiles {
            exporter.entry(
                name,
                &format!("{percentile}p"),
                total.value_at_quantile(percentile / 100.0).into(),
                " us",
            )?;
        }
        Ok(())
    }

    fn write_hdr_file(
        &self,
        name: &str,
        settings: &MeasureSettings,
        total: &Histogram<u64>,
    ) -> Result<()> {
        use hdrhistogram::serialization::{Serializer, V2Serializer};

        let path = format!("{}{}.hdr", settings.hdr_output_path, name);
        let mut out = BufWriter::new(File::create(&path)?);
        V2Serializer::new()
            .serialize(total, &mut out)
            .map_err(|err| crate::error::Error::Histogram(err.to_string()))?;
        Ok(())
    }
}
