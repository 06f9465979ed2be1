//! Export sinks for the final measurement dump.
//!
//! Every exported datum is one `(metric, label, value, unit)` entry. The
//! text sink renders `[METRIC] label value unit` lines; the JSON sink
//! collects entries and writes one array at the end.

use std::io::Write;

use serde::Serialize;

use crate::error::Result;

/// A value being exported; kept typed so the JSON sink does not have to
/// re-parse formatted strings.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(untagged)]
pub enum ExportValue {
    Count(u64),
    Micros(f64),
}

impl From<u64> for ExportValue {
    fn from(value: u64) -> Self {
        ExportValue::Count(value)
    }
}

impl From<f64> for ExportValue {
    fn from(value: f64) -> Self {
        ExportValue::Micros(value)
    }
}

impl std::fmt::Display for ExportValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExportValue::Count(v) => write!(f, "{v}"),
            ExportValue::Micros(v) => write!(f, "{v:.2}"),
        }
    }
}

pub trait Exporter: Send {
    fn entry(&mut self, metric: &str, label: &str, value: ExportValue, unit: &str) -> Result<()>;

    /// Flush everything; must be called exactly once, last.
    fn finish(&mut self) -> Result<()>;
}

/// Plain-text sink: one `[METRIC] label value unit` line per entry.
pub struct TextExporter {
    out: Box<dyn Write + Send>,
}

impl TextExporter {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self { out }
    }
}

impl Exporter for TextExporter {
    fn entry(&mut self, metric: &str, label: &str, value: ExportValue, unit: &str) -> Result<()> {
        if label.is_empty() {
            writeln!(self.out, "[{metric}] {value}{unit}")?;
        } else {
            writeln!(self.out, "[{metric}] {label} : {value}{unit}")?;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct JsonEntry {
    metric: String,
    label: String,
    value: ExportValue,
    #[serde(skip_serializing_if = "str::is_empty")]
    unit: &'static str,
}

/// JSON sink: buffers entries, writes a single array on `finish`.
pub struct JsonExporter {
    out: Box<dyn Write + Send>,
    entries: Vec<JsonEntry>,
}

impl JsonExporter {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out,
            entries: Vec::new(),
        }
    }
}

impl Exporter for JsonExporter {
    fn entry(&mut self, metric: &str, label: &str, value: ExportValue, unit: &str) -> Result<()> {
        self.entries.push(JsonEntry {
            metric: metric.to_string(),
            label: label.to_string(),
            value,
            unit: match unit {
                " us" => "us",
                " ms" => "ms",
                " ops/s" => "ops/s",
                " operations" => "operations",
                _ => "",
            },
        });
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        serde_json::to_writer_pretty(&mut self.out, &self.entries)
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::Other, err))?;
        writeln!(self.out)?;
        self.out.flush()?;
        Ok(())
    }
}
