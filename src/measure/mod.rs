//! Concurrent measurement registry.
//!
//! Metrics are created lazily on first use and live until export. Two
//! parallel namespaces exist: plain operation latencies and the
//! `Intended-` family measured from the throttle's planned start times.
//! Which of the two records is decided by `measurement.interval`.

pub mod bucket;
pub mod export;
pub mod hdr;
pub mod raw;
pub mod series;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use crate::config::{Config, IntervalMode, MeasurementType};
use crate::error::{Error, Result};
use crate::store::Status;

use bucket::BucketMeasure;
use export::Exporter;
use hdr::HdrMeasure;
use raw::RawMeasure;
use series::SeriesMeasure;

/// Export-time knobs shared by all measurement variants.
#[derive(Debug, Clone)]
pub struct MeasureSettings {
    pub percentiles: Vec<f64>,
    pub bucket_cap: u64,
    pub granularity_ms: u64,
    pub hdr_file_output: bool,
    pub hdr_output_path: String,
}

enum MeasureKind {
    Hdr(HdrMeasure),
    Bucket(BucketMeasure),
    Raw(RawMeasure),
    Series(SeriesMeasure),
    Pair(Arc<Measure>, Arc<Measure>),
}

/// One named metric plus its return-code table.
pub struct Measure {
    name: String,
    codes: Mutex<HashMap<Status, u64>>,
    kind: MeasureKind,
}

impl Measure {
    pub fn name(&self) -> &str {
        &self.name
    }

    fn type_tag(&self) -> MeasurementType {
        match &self.kind {
            MeasureKind::Hdr(_) => MeasurementType::Hdr,
            MeasureKind::Bucket(_) => MeasurementType::Bucket,
            MeasureKind::Raw(_) => MeasurementType::Raw,
            MeasureKind::Series(_) => MeasurementType::TimeSeries,
            MeasureKind::Pair(first, _) => match first.type_tag() {
                MeasurementType::Hdr => match self.pair_second_tag() {
                    MeasurementType::Raw => MeasurementType::HdrAndRaw,
                    _ => MeasurementType::HdrAndBucket,
                },
                other => other,
            },
        }
    }

    fn pair_second_tag(&self) -> MeasurementType {
        match &self.kind {
            MeasureKind::Pair(_, second) => second.type_tag(),
            _ => MeasurementType::Hdr,
        }
    }

    /// Direct (locking) record path for infrequent writers.
    pub fn record(&self, value: u64) {
        match &self.kind {
            MeasureKind::Hdr(m) => m.record(value),
            MeasureKind::Bucket(m) => m.record(value),
            MeasureKind::Raw(m) => m.record(value),
            MeasureKind::Series(m) => m.record(value),
            MeasureKind::Pair(a, b) => {
                a.record(value);
                b.record(value);
            }
        }
    }

    /// Hot-path handle for one writer; lock-free for the HDR variant.
    pub fn local_recorder(self: &Arc<Self>) -> LocalRecorder {
        match &self.kind {
            MeasureKind::Hdr(m) => LocalRecorder::Hdr(m.recorder()),
            MeasureKind::Pair(a, b) => LocalRecorder::Pair(
                Box::new(a.local_recorder()),
                Box::new(b.local_recorder()),
            ),
            _ => LocalRecorder::Shared(Arc::clone(self)),
        }
    }

    pub fn report_status(&self, status: Status) {
        *self.codes.lock().unwrap().entry(status).or_insert(0) += 1;
    }

    pub fn summary(&self) -> String {
        match &self.kind {
            MeasureKind::Hdr(m) => m.summary(&self.name),
            MeasureKind::Bucket(m) => m.summary(&self.name),
            MeasureKind::Raw(m) => m.summary(&self.name),
            MeasureKind::Series(m) => m.summary(&self.name),
            // The first half carries the summary; the second is for export.
            MeasureKind::Pair(a, _) => a.summary(),
        }
    }

    pub fn export(&self, settings: &MeasureSettings, exporter: &mut dyn Exporter) -> Result<()> {
        match &self.kind {
            MeasureKind::Hdr(m) => m.export(&self.name, settings, exporter)?,
            MeasureKind::Bucket(m) => m.export(&self.name, settings, exporter)?,
            MeasureKind::Raw(m) => m.export(&self.name, settings, exporter)?,
            MeasureKind::Series(m) => m.export(&self.name, settings, exporter)?,
            MeasureKind::Pair(a, b) => {
                a.export(settings, exporter)?;
                b.export(settings, exporter)?;
            }
        }
        let codes = self.codes.lock().unwrap();
        let mut sorted: Vec<(&Status, &u64)> = codes.iter().collect();
        sorted.sort_by_key(|(status, _)| status.name());
        for (status, count) in sorted {
            exporter.entry(&self.name, &format!("Return={}", status.name()), (*count).into(), "")?;
        }
        Ok(())
    }
}

/// Writer-local recording handle handed out by the registry.
pub enum LocalRecorder {
    Hdr(hdrhistogram::sync::Recorder<u64>),
    Shared(Arc<Measure>),
    Pair(Box<LocalRecorder>, Box<LocalRecorder>),
}

impl LocalRecorder {
    pub fn record(&mut self, value: u64) {
        match self {
            // The histogram auto-resizes, so recording cannot fail.
            LocalRecorder::Hdr(recorder) => {
                let _ = recorder.record(value);
            }
            LocalRecorder::Shared(measure) => measure.record(value),
            LocalRecorder::Pair(a, b) => {
                a.record(value);
                b.record(value);
            }
        }
    }
}

/// The registry: metric name to measurement, created on first use.
pub struct Measurements {
    default_type: MeasurementType,
    interval_mode: IntervalMode,
    settings: MeasureSettings,
    measures: RwLock<HashMap<String, Arc<Measure>>>,
    intended: RwLock<HashMap<String, Arc<Measure>>>,
}

impl Measurements {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            default_type: config.measurement_type()?,
            interval_mode: config.interval_mode()?,
            settings: MeasureSettings {
                percentiles: config.percentiles()?,
                bucket_cap: config.histogram_buckets()?,
                granularity_ms: config.time_series_granularity_ms()?,
                hdr_file_output: config.hdr_file_output()?,
                hdr_output_path: config.hdr_output_path().to_string(),
            },
            measures: RwLock::new(HashMap::new()),
            intended: RwLock::new(HashMap::new()),
        })
    }

    pub fn interval_mode(&self) -> IntervalMode {
        self.interval_mode
    }

    fn build(&self, name: &str, kind: MeasurementType) -> Result<Measure> {
        let built = match kind {
            MeasurementType::Hdr => MeasureKind::Hdr(HdrMeasure::new()?),
            MeasurementType::Bucket => {
                MeasureKind::Bucket(BucketMeasure::new(self.settings.bucket_cap))
            }
            MeasurementType::Raw => MeasureKind::Raw(RawMeasure::new()),
            MeasurementType::TimeSeries => {
                MeasureKind::Series(SeriesMeasure::new(self.settings.granularity_ms))
            }
            MeasurementType::HdrAndBucket => MeasureKind::Pair(
                Arc::new(self.build(&format!("Hdr{name}"), MeasurementType::Hdr)?),
                Arc::new(self.build(&format!("Bucket{name}"), MeasurementType::Bucket)?),
            ),
            MeasurementType::HdrAndRaw => MeasureKind::Pair(
                Arc::new(self.build(&format!("Hdr{name}"), MeasurementType::Hdr)?),
                Arc::new(self.build(&format!("Raw{name}"), MeasurementType::Raw)?),
            ),
        };
        Ok(Measure {
            name: name.to_string(),
            codes: Mutex::new(HashMap::new()),
            kind: built,
        })
    }

    fn lookup(
        &self,
        map: &RwLock<HashMap<String, Arc<Measure>>>,
        name: &str,
        kind: MeasurementType,
    ) -> Result<Arc<Measure>> {
        if let Some(measure) = map.read().unwrap().get(name) {
            if measure.type_tag() != kind {
                return Err(Error::MeasureTypeMismatch(name.to_string()));
            }
            return Ok(Arc::clone(measure));
        }
        let mut guard = map.write().unwrap();
        if let Some(measure) = guard.get(name) {
            if measure.type_tag() != kind {
                return Err(Error::MeasureTypeMismatch(name.to_string()));
            }
            return Ok(Arc::clone(measure));
        }
        let measure = Arc::new(self.build(name, kind)?);
        guard.insert(name.to_string(), Arc::clone(&measure));
        Ok(measure)
    }

    /// Fetch or create a metric of an explicit type. Type mismatch with an
    /// existing entry is an error.
    pub fn get_or_create(&self, name: &str, kind: MeasurementType) -> Result<Arc<Measure>> {
        self.lookup(&self.measures, name, kind)
    }

    fn get_default(&self, name: &str) -> Result<Arc<Measure>> {
        self.lookup(&self.measures, name, self.default_type)
    }

    fn get_intended(&self, name: &str) -> Result<Arc<Measure>> {
        // In intended-only mode the plain name is reused, matching how the
        // single recorded family should read in reports.
        let full;
        let name = if self.interval_mode == IntervalMode::Intended {
            name
        } else {
            full = format!("Intended-{name}");
            &full
        };
        self.lookup(&self.intended, name, self.default_type)
    }

    /// Record one sample of the plain latency for `name`, in microseconds.
    pub fn measure(&self, name: &str, micros: u64) -> Result<()> {
        if self.interval_mode == IntervalMode::Intended {
            return Ok(());
        }
        self.get_default(name)?.record(micros);
        Ok(())
    }

    /// Record one sample of the intended latency for `name`.
    pub fn measure_intended(&self, name: &str, micros: u64) -> Result<()> {
        if self.interval_mode == IntervalMode::Op {
            return Ok(());
        }
        self.get_intended(name)?.record(micros);
        Ok(())
    }

    /// Writer-local recorder for the plain namespace, or `None` when the
    /// interval mode suppresses that namespace.
    pub fn recorder(&self, name: &str) -> Result<Option<LocalRecorder>> {
        if self.interval_mode == IntervalMode::Intended {
            return Ok(None);
        }
        Ok(Some(self.get_default(name)?.local_recorder()))
    }

    /// Writer-local recorder for the intended namespace.
    pub fn intended_recorder(&self, name: &str) -> Result<Option<LocalRecorder>> {
        if self.interval_mode == IntervalMode::Op {
            return Ok(None);
        }
        Ok(Some(self.get_intended(name)?.local_recorder()))
    }

    /// Count a return code for one operation.
    pub fn report_status(&self, name: &str, status: Status) -> Result<()> {
        let measure = if self.interval_mode == IntervalMode::Intended {
            self.get_intended(name)?
        } else {
            self.get_default(name)?
        };
        measure.report_status(status);
        Ok(())
    }

    fn sorted(map: &RwLock<HashMap<String, Arc<Measure>>>) -> Vec<Arc<Measure>> {
        let guard = map.read().unwrap();
        let mut entries: Vec<Arc<Measure>> = guard.values().map(Arc::clone).collect();
        entries.sort_by(|a, b| a.name().cmp(b.name()));
        entries
    }

    /// One-line interval summary across every metric.
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        for measure in Self::sorted(&self.measures)
            .into_iter()
            .chain(Self::sorted(&self.intended))
        {
            parts.push(measure.summary());
        }
        parts.join(" ")
    }

    /// Dump every metric through the exporter, plain namespace first.
    pub fn export(&self, exporter: &mut dyn Exporter) -> Result<()> {
        for measure in Self::sorted(&self.measures)
            .into_iter()
            .chain(Self::sorted(&self.intended))
        {
            measure.export(&self.settings, exporter)?;
        }
        Ok(())
    }
}
