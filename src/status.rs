//! Background tasks: the periodic status reporter and the wall-clock
//! terminator.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::measure::Measurements;
use crate::worker::WorkerProgress;
use crate::workload::CoreWorkload;

/// Emits one progress line per interval: cumulative and interval
/// throughput, estimated completion, and the registry's summary string.
/// Lines go to stderr so they never mix with the export on stdout; the
/// time-series measurement mode mirrors them to stdout.
pub struct StatusReporter {
    label: String,
    interval: Duration,
    also_stdout: bool,
    track_runtime: bool,
    measurements: Arc<Measurements>,
    progresses: Vec<Arc<WorkerProgress>>,
    complete: watch::Receiver<bool>,
    system: sysinfo::System,
}

impl StatusReporter {
    pub fn new(
        label: String,
        interval: Duration,
        also_stdout: bool,
        track_runtime: bool,
        measurements: Arc<Measurements>,
        progresses: Vec<Arc<WorkerProgress>>,
        complete: watch::Receiver<bool>,
    ) -> Self {
        Self {
            label,
            interval,
            also_stdout,
            track_runtime,
            measurements,
            progresses,
            complete,
            system: sysinfo::System::new(),
        }
    }

    pub async fn run(mut self) {
        let start = Instant::now();
        let mut deadline = start + self.interval;
        let mut last_total: u64 = 0;
        let mut last_time = start;

        loop {
            let all_done = tokio::select! {
                _ = tokio::time::sleep_until(deadline) => false,
                // Wakes as soon as every worker has signalled completion,
                // or when the runner is torn down.
                _ = self.complete.wait_for(|done| *done) => true,
            };

            let now = Instant::now();
            last_total = self.report(start, last_time, now, last_total);
            if self.track_runtime {
                self.sample_runtime_stats();
            }
            last_time = now;
            deadline += self.interval;

            if all_done {
                break;
            }
        }
    }

    fn report(&self, start: Instant, last_time: Instant, now: Instant, last_total: u64) -> u64 {
        let total: u64 = self.progresses.iter().map(|p| p.ops_done()).sum();
        let todo: u64 = self.progresses.iter().map(|p| p.remaining()).sum();

        let elapsed = now.saturating_duration_since(start);
        let throughput = total as f64 / elapsed.as_secs_f64().max(f64::EPSILON);
        let interval = now.saturating_duration_since(last_time);
        let current = (total - last_total) as f64 / interval.as_secs_f64().max(f64::EPSILON);

        let mut line = format!(
            "{}{} sec: {} operations; ",
            self.label,
            elapsed.as_secs(),
            total
        );
        if total != 0 {
            line.push_str(&format!("{current:.2} current ops/sec; "));
        }
        if todo != 0 && throughput > 0.0 {
            let eta = Duration::from_secs_f64(todo as f64 / throughput);
            line.push_str(&format!("est completion in {} ", format_remaining(eta)));
        }
        line.push_str(&self.measurements.summary());

        eprintln!("{line}");
        if self.also_stdout {
            println!("{line}");
        }
        total
    }

    /// Process-level stats, the moral equivalent of the original's VM
    /// sampling: thread count, resident memory in MB, load average.
    fn sample_runtime_stats(&mut self) {
        let pid = sysinfo::Pid::from(std::process::id() as usize);
        if self.system.refresh_process(pid) {
            if let Some(process) = self.system.process(pid) {
                let used_mb = process.memory() / (1024 * 1024);
                self.record("USED_MEM_MB", used_mb);
            }
        }

        let load = sysinfo::System::load_average();
        if load.one >= 0.0 {
            self.record("SYS_LOAD_AVG", load.one as u64);
        }

        if let Some(threads) = process_thread_count() {
            self.record("THREAD_COUNT", threads);
        }
    }

    fn record(&self, name: &str, value: u64) {
        if let Err(err) = self.measurements.measure(name, value) {
            tracing::warn!(name, %err, "failed to record runtime stat");
        }
    }
}

#[cfg(target_os = "linux")]
fn process_thread_count() -> Option<u64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    status
        .lines()
        .find_map(|line| line.strip_prefix("Threads:"))
        .and_then(|rest| rest.trim().parse().ok())
}

#[cfg(not(target_os = "linux"))]
fn process_thread_count() -> Option<u64> {
    None
}

/// Human units for the estimated completion time.
fn format_remaining(eta: Duration) -> String {
    let mut seconds = eta.as_secs();
    let days = seconds / 86_400;
    seconds %= 86_400;
    let hours = seconds / 3_600;
    seconds %= 3_600;
    let minutes = seconds / 60;
    seconds %= 60;

    let mut out = String::new();
    if days > 0 {
        out.push_str(&format!("{days} day{} ", if days == 1 { "" } else { "s" }));
    }
    if hours > 0 {
        out.push_str(&format!("{hours} hour{} ", if hours == 1 { "" } else { "s" }));
    }
    if days == 0 && minutes > 0 {
        out.push_str(&format!(
            "{minutes} minute{} ",
            if minutes == 1 { "" } else { "s" }
        ));
    }
    if out.is_empty() {
        out.push_str(&format!("{seconds} seconds"));
    }
    out.trim_end().to_string()
}

/// Arms a wall-clock deadline; on expiry, sets the workload's stop flag
/// and fires the stop channel so parked workers wake promptly. A second
/// signal is a no-op.
pub async fn terminator(
    max_execution_time: Duration,
    workload: Arc<CoreWorkload>,
    stop_tx: watch::Sender<bool>,
    mut complete: watch::Receiver<bool>,
) {
    tokio::select! {
        _ = tokio::time::sleep(max_execution_time) => {
            tracing::info!(
                limit_secs = max_execution_time.as_secs(),
                "maximum execution time reached"
            );
            workload.request_stop();
            let _ = stop_tx.send(true);
        }
        _ = complete.wait_for(|done| *done) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remaining_formats_scale() {
        assert_eq!(format_remaining(Duration::from_secs(42)), "42 seconds");
        assert_eq!(format_remaining(Duration::from_secs(120)), "2 minutes");
        assert_eq!(format_remaining(Duration::from_secs(3_660)), "1 hour 1 minute");
        assert_eq!(format_remaining(Duration::from_secs(90_000)), "1 day 1 hour");
    }

    #[tokio::test]
    async fn terminator_sets_the_stop_flag() {
        let mut config = crate::config::Config::new();
        config.set("workload", "core");
        config.set("recordcount", "10");
        let workload = Arc::new(CoreWorkload::new(&config).unwrap());
        let (stop_tx, stop_rx) = watch::channel(false);
        let (_complete_tx, complete_rx) = watch::channel(false);

        terminator(
            Duration::from_millis(10),
            Arc::clone(&workload),
            stop_tx,
            complete_rx,
        )
        .await;

        assert!(workload.stop_requested());
        assert!(*stop_rx.borrow());
    }

    #[tokio::test]
    async fn terminator_stands_down_on_completion() {
        let mut config = crate::config::Config::new();
        config.set("workload", "core");
        config.set("recordcount", "10");
        let workload = Arc::new(CoreWorkload::new(&config).unwrap());
        let (stop_tx, stop_rx) = watch::channel(false);
        let (complete_tx, complete_rx) = watch::channel(false);

        let handle = tokio::spawn(terminator(
            Duration::from_secs(3600),
            Arc::clone(&workload),
            stop_tx,
            complete_rx,
        ));
        complete_tx.send(true).unwrap();
        handle.await.unwrap();

        assert!(!workload.stop_requested());
        assert!(!*stop_rx.borrow());
    }
}
