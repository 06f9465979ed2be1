//! Run configuration: a flat `key=value` property map with typed accessors.
//!
//! Every knob the harness understands is read through an accessor that
//! applies the documented default, so call sites never see raw strings.
//! Unrecognised keys are ignored; a property file is plain `key=value`
//! lines with `#`/`!` comments.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::error::{Error, Result};

/// Which half of the benchmark to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Pure inserts, populating the key space.
    Load,
    /// The configured read/update/insert/scan mix.
    Transactions,
}

/// Request / length distributions selectable from properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Distribution {
    Constant,
    Uniform,
    Sequential,
    Zipfian,
    Latest,
    Hotspot,
    Exponential,
    Histogram,
}

impl Distribution {
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "constant" => Ok(Distribution::Constant),
            "uniform" => Ok(Distribution::Uniform),
            "sequential" => Ok(Distribution::Sequential),
            "zipfian" => Ok(Distribution::Zipfian),
            "latest" => Ok(Distribution::Latest),
            "hotspot" => Ok(Distribution::Hotspot),
            "exponential" => Ok(Distribution::Exponential),
            "histogram" => Ok(Distribution::Histogram),
            other => Err(Error::UnknownDistribution(other.to_string())),
        }
    }
}

/// How latency samples are aggregated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeasurementType {
    Hdr,
    Bucket,
    HdrAndBucket,
    HdrAndRaw,
    TimeSeries,
    Raw,
}

/// Which latency view gets recorded: operation time, intended time, or both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntervalMode {
    Op,
    Intended,
    Both,
}

/// Immutable property map, created once at startup.
#[derive(Debug, Clone, Default)]
pub struct Config {
    props: HashMap<String, String>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `key=value` lines from a properties file, overriding existing keys.
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let text = fs::read_to_string(path)?;
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                self.set(key.trim(), value.trim());
            }
        }
        Ok(())
    }

    pub fn set(&mut self, key: &str, value: &str) {
        self.props.insert(key.to_string(), value.to_string());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.props.get(key).map(String::as_str)
    }

    fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    fn parse_as<T: std::str::FromStr>(&self, key: &str, default: &str) -> Result<T> {
        let raw = self.get_or(key, default);
        raw.parse().map_err(|_| Error::InvalidProperty {
            key: key.to_string(),
            value: raw.to_string(),
            reason: format!("expected a {}", std::any::type_name::<T>()),
        })
    }

    fn parse_bool(&self, key: &str, default: bool) -> Result<bool> {
        match self.get(key) {
            None => Ok(default),
            Some("true") | Some("1") => Ok(true),
            Some("false") | Some("0") => Ok(false),
            Some(other) => Err(Error::InvalidProperty {
                key: key.to_string(),
                value: other.to_string(),
                reason: "expected true or false".to_string(),
            }),
        }
    }

    // Run shape.

    pub fn workload(&self) -> Result<&str> {
        self.get("workload").ok_or(Error::MissingProperty("workload"))
    }

    pub fn record_count(&self) -> Result<u64> {
        self.parse_as("recordcount", "0")
    }

    pub fn operation_count(&self) -> Result<u64> {
        self.parse_as("operationcount", "0")
    }

    pub fn insert_start(&self) -> Result<u64> {
        self.parse_as("insertstart", "0")
    }

    /// Number of ids this process loads; 0 means "the rest of the key space".
    pub fn insert_count(&self) -> Result<u64> {
        let count = self.parse_as("insertcount", "0")?;
        if count > 0 {
            Ok(count)
        } else {
            Ok(self.record_count()?.saturating_sub(self.insert_start()?))
        }
    }

    pub fn thread_count(&self) -> Result<usize> {
        self.parse_as("threadcount", "1")
    }

    /// Total target ops/sec across all workers; 0 disables throttling.
    pub fn target(&self) -> Result<u64> {
        self.parse_as("target", "0")
    }

    pub fn max_execution_time_secs(&self) -> Result<u64> {
        self.parse_as("maxexecutiontime", "0")
    }

    pub fn stage(&self) -> Result<Stage> {
        match self.get_or("stage", "transactions") {
            "transactions" => Ok(Stage::Transactions),
            "load" | "insert" => Ok(Stage::Load),
            other => Err(Error::InvalidProperty {
                key: "stage".to_string(),
                value: other.to_string(),
                reason: "expected load or transactions".to_string(),
            }),
        }
    }

    pub fn db(&self) -> &str {
        self.get_or("db", "noop")
    }

    pub fn label(&self) -> &str {
        self.get_or("label", "")
    }

    pub fn status(&self) -> Result<bool> {
        self.parse_bool("status", false)
    }

    pub fn status_interval_secs(&self) -> Result<u64> {
        self.parse_as("status.interval", "10")
    }

    // Record shape.

    pub fn table(&self) -> &str {
        self.get_or("table", "usertable")
    }

    pub fn field_count(&self) -> Result<u64> {
        self.parse_as("fieldcount", "10")
    }

    pub fn field_prefix(&self) -> &str {
        self.get_or("fieldprefix", "field")
    }

    pub fn field_length(&self) -> Result<u64> {
        self.parse_as("fieldlength", "100")
    }

    pub fn min_field_length(&self) -> Result<u64> {
        self.parse_as("minfieldlength", "1")
    }

    pub fn field_length_distribution(&self) -> Result<Distribution> {
        Distribution::parse(self.get_or("fieldlengthdistribution", "constant"))
    }

    pub fn field_length_histogram_file(&self) -> &str {
        self.get_or("fieldlengthhistogram", "hist.txt")
    }

    pub fn zero_padding(&self) -> Result<usize> {
        self.parse_as("zeropadding", "1")
    }

    /// `ordered` keeps raw ids in keys; `hashed` scrambles them.
    pub fn ordered_inserts(&self) -> Result<bool> {
        match self.get_or("insertorder", "hashed") {
            "ordered" => Ok(true),
            "hashed" => Ok(false),
            other => Err(Error::InvalidProperty {
                key: "insertorder".to_string(),
                value: other.to_string(),
                reason: "expected ordered or hashed".to_string(),
            }),
        }
    }

    // Operation mix.

    pub fn read_proportion(&self) -> Result<f64> {
        self.parse_as("readproportion", "0.95")
    }

    pub fn update_proportion(&self) -> Result<f64> {
        self.parse_as("updateproportion", "0.05")
    }

    pub fn insert_proportion(&self) -> Result<f64> {
        self.parse_as("insertproportion", "0.0")
    }

    pub fn scan_proportion(&self) -> Result<f64> {
        self.parse_as("scanproportion", "0.0")
    }

    pub fn read_all_fields(&self) -> Result<bool> {
        self.parse_bool("readallfields", true)
    }

    pub fn read_all_fields_by_name(&self) -> Result<bool> {
        self.parse_bool("readallfieldsbyname", false)
    }

    pub fn write_all_fields(&self) -> Result<bool> {
        self.parse_bool("writeallfields", false)
    }

    // Key selection.

    pub fn request_distribution(&self) -> Result<Distribution> {
        Distribution::parse(self.get_or("requestdistribution", "uniform"))
    }

    pub fn zipfian_constant(&self) -> Result<f64> {
        self.parse_as("zipfianconstant", "0.99")
    }

    pub fn exponential_percentile(&self) -> Result<f64> {
        self.parse_as("exponential.percentile", "95")
    }

    pub fn exponential_frac(&self) -> Result<f64> {
        self.parse_as("exponential.frac", "0.8571428571")
    }

    pub fn hotspot_data_fraction(&self) -> Result<f64> {
        self.parse_as("hotspotdatafraction", "0.2")
    }

    pub fn hotspot_opn_fraction(&self) -> Result<f64> {
        self.parse_as("hotspotopnfraction", "0.8")
    }

    pub fn min_scan_length(&self) -> Result<u64> {
        self.parse_as("minscanlength", "1")
    }

    pub fn max_scan_length(&self) -> Result<u64> {
        self.parse_as("maxscanlength", "1000")
    }

    pub fn scan_length_distribution(&self) -> Result<Distribution> {
        Distribution::parse(self.get_or("scanlengthdistribution", "uniform"))
    }

    /// Acknowledged-counter window size; must be a power of two.
    pub fn acknowledged_window(&self) -> Result<usize> {
        let size: usize = self.parse_as("acknowledgedwindow", "1048576")?;
        if size == 0 || !size.is_power_of_two() {
            return Err(Error::InvalidProperty {
                key: "acknowledgedwindow".to_string(),
                value: size.to_string(),
                reason: "expected a power of two".to_string(),
            });
        }
        Ok(size)
    }

    /// Base RNG seed; workers derive their own streams from it.
    pub fn seed(&self) -> Result<Option<u64>> {
        match self.get("seed") {
            None => Ok(None),
            Some(_) => Ok(Some(self.parse_as("seed", "0")?)),
        }
    }

    // Measurement.

    pub fn measurement_type(&self) -> Result<MeasurementType> {
        match self.get_or("measurementtype", "hdrhistogram") {
            "hdrhistogram" => Ok(MeasurementType::Hdr),
            "histogram" => Ok(MeasurementType::Bucket),
            "hdrhistogram+histogram" => Ok(MeasurementType::HdrAndBucket),
            "hdrhistogram+raw" => Ok(MeasurementType::HdrAndRaw),
            "timeseries" => Ok(MeasurementType::TimeSeries),
            "raw" => Ok(MeasurementType::Raw),
            other => Err(Error::UnknownMeasurementType(other.to_string())),
        }
    }

    pub fn interval_mode(&self) -> Result<IntervalMode> {
        match self.get_or("measurement.interval", "op") {
            "op" => Ok(IntervalMode::Op),
            "intended" => Ok(IntervalMode::Intended),
            "both" => Ok(IntervalMode::Both),
            other => Err(Error::InvalidProperty {
                key: "measurement.interval".to_string(),
                value: other.to_string(),
                reason: "expected op, intended or both".to_string(),
            }),
        }
    }

    pub fn track_runtime_stats(&self) -> Result<bool> {
        self.parse_bool("measurement.trackruntime", false)
    }

    pub fn histogram_buckets(&self) -> Result<u64> {
        self.parse_as("histogram.buckets", "1000")
    }

    pub fn time_series_granularity_ms(&self) -> Result<u64> {
        self.parse_as("timeseries.granularity", "1000")
    }

    pub fn percentiles(&self) -> Result<Vec<f64>> {
        let raw = self.get_or("hdrhistogram.percentiles", "50,75,95,99,99.9,99.99");
        let mut out = Vec::new();
        for part in raw.split(',') {
            let p: f64 = part.trim().parse().map_err(|_| Error::InvalidProperty {
                key: "hdrhistogram.percentiles".to_string(),
                value: raw.to_string(),
                reason: format!("`{part}` is not a percentile"),
            })?;
            out.push(p);
        }
        Ok(out)
    }

    pub fn hdr_file_output(&self) -> Result<bool> {
        self.parse_bool("hdrhistogram.fileoutput", false)
    }

    pub fn hdr_output_path(&self) -> &str {
        self.get_or("hdrhistogram.output.path", "")
    }

    pub fn export_file(&self) -> Option<&str> {
        self.get("exportfile")
    }

    pub fn exporter(&self) -> &str {
        self.get_or("exporter", "text")
    }

    /// Startup validation of the cross-property invariants.
    pub fn validate(&self) -> Result<()> {
        self.workload()?;
        let record_count = self.record_count()?;
        let insert_start = self.insert_start()?;
        let insert_count = self.insert_count()?;
        if insert_start + insert_count > record_count {
            return Err(Error::InsertRangeExceedsRecords {
                insert_start,
                insert_count,
                record_count,
            });
        }
        for (key, value) in [
            ("readproportion", self.read_proportion()?),
            ("updateproportion", self.update_proportion()?),
            ("insertproportion", self.insert_proportion()?),
            ("scanproportion", self.scan_proportion()?),
        ] {
            if value < 0.0 {
                return Err(Error::InvalidProperty {
                    key: key.to_string(),
                    value: value.to_string(),
                    reason: "proportions must be non-negative".to_string(),
                });
            }
        }
        self.request_distribution()?;
        self.field_length_distribution()?;
        self.scan_length_distribution()?;
        self.measurement_type()?;
        self.interval_mode()?;
        self.acknowledged_window()?;
        self.stage()?;
        Ok(())
    }
}
