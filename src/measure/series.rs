//! Time-series measurement: samples summarised per fixed-width window.

use std::sync::Mutex;
use std::time::Instant;

use super::MeasureSettings;
use crate::error::Result;
use crate::measure::export::Exporter;

#[derive(Debug, Clone, Copy)]
struct Window {
    start_ms: u64,
    count: u64,
    sum: u64,
    min: u64,
    max: u64,
}

impl Window {
    fn new(start_ms: u64) -> Self {
        Self {
            start_ms,
            count: 0,
            sum: 0,
            min: u64::MAX,
            max: 0,
        }
    }

    fn add(&mut self, value: u64) {
        self.count += 1;
        self.sum += value;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    fn avg(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum as f64 / self.count as f64
        }
    }
}

#[derive(Debug)]
struct SeriesState {
    epoch: Instant,
    current: Option<Window>,
    closed: Vec<Window>,
    total_count: u64,
    total_sum: u64,
    min: u64,
    max: u64,
}

#[derive(Debug)]
pub struct SeriesMeasure {
    granularity_ms: u64,
    state: Mutex<SeriesState>,
}

impl SeriesMeasure {
    pub fn new(granularity_ms: u64) -> Self {
        Self {
            granularity_ms: granularity_ms.max(1),
            state: Mutex::new(SeriesState {
                epoch: Instant::now(),
                current: None,
                closed: Vec::new(),
                total_count: 0,
                total_sum: 0,
                min: u64::MAX,
                max: 0,
            }),
        }
    }

    pub fn record(&self, value: u64) {
        let mut state = self.state.lock().unwrap();
        let now_ms = state.epoch.elapsed().as_millis() as u64;
        let window_start = now_ms - now_ms % self.granularity_ms;

        match &mut state.current {
            Some(window) if window.start_ms == window_start => window.add(value),
            _ => {
                if let Some(done) = state.current.take() {
                    state.closed.push(done);
                }
                let mut window = Window::new(window_start);
                window.add(value);
                state.current = Some(window);
            }
        }
        state.total_count += 1;
        state.total_sum += value;
        state.min = state.min.min(value);
        state.max = state.max.max(value);
    }

    pub fn summary(&self, name: &str) -> String {
        let state = self.state.lock().unwrap();
        let avg = if state.total_count == 0 {
            0.0
        } else {
            state.total_sum as f64 / state.total_count as f64
        };
        format!(
            "[{}: Count={}, Max={}, Min={}, Avg={:.2}]",
            name,
            state.total_count,
            state.max,
            if state.min == u64::MAX { 0 } else { state.min },
            avg,
        )
    }

    pub fn export(
        &self,
        name: &str,
        _settings: &MeasureSettings,
        exporter: &mut dyn Exporter,
    ) -> Result<()> {
        let state = self.state.lock().unwrap();
        let avg = if state.total_count == 0 {
            0.0
        } else {
            state.total_sum as f64 / state.total_count as f64
        };
        exporter.entry(name, "", state.total_count.into(), " operations")?;
        exporter.entry(name, "avg", avg.into(), " us")?;
        exporter.entry(
            name,
            "min",
            (if state.min == u64::MAX { 0 } else { state.min }).into(),
            " us",
        )?;
        exporter.entry(name, "max", state.max.into(), " us")?;
        for window in state.closed.iter().chain(state.current.iter()) {
            exporter.entry(name, &window.start_ms.to_string(), window.avg().into(), " us")?;
        }
        Ok(())
    }
}
