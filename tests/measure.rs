//! Measurement pipeline invariants: every wrapper invocation is counted
//! exactly once, and exporting is a pure read.

use std::io::Write;
use std::sync::{Arc, Mutex};

use millstone::config::{Config, MeasurementType};
use millstone::measure::export::TextExporter;
use millstone::measure::Measurements;
use millstone::store::noop::NoopStore;
use millstone::store::wrapper::MeasuredStore;
use millstone::store::{Options, Row};

#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn registry(pairs: &[(&str, &str)]) -> Arc<Measurements> {
    let mut config = Config::new();
    config.set("workload", "core");
    for (key, value) in pairs {
        config.set(key, value);
    }
    Arc::new(Measurements::from_config(&config).unwrap())
}

fn export(measurements: &Measurements) -> String {
    let buf = SharedBuf::default();
    let mut exporter = TextExporter::new(Box::new(buf.clone()));
    measurements.export(&mut exporter).unwrap();
    buf.contents()
}

#[tokio::test]
async fn export_count_matches_wrapper_invocations() {
    for kind in [
        "hdrhistogram",
        "histogram",
        "raw",
        "timeseries",
        "hdrhistogram+histogram",
        "hdrhistogram+raw",
    ] {
        let measurements = registry(&[("measurementtype", kind)]);
        let mut store =
            MeasuredStore::new(Box::new(NoopStore::new()), Arc::clone(&measurements));
        let options = Options::new();
        let mut row = Row::new();
        let now = tokio::time::Instant::now();

        let invocations = 137;
        for _ in 0..invocations {
            store.read("t", "k", None, &options, &mut row, now).await;
        }
        for _ in 0..7 {
            store.update("t", "k", Row::new(), now).await;
        }
        drop(store);

        let text = export(&measurements);
        let read_line = text
            .lines()
            .find(|line| line.contains("READ") && line.ends_with(" operations"))
            .unwrap_or_else(|| panic!("no READ count for {kind}:\n{text}"));
        assert!(
            read_line.contains(&invocations.to_string()),
            "{kind}: {read_line}"
        );
        assert!(
            text.contains("Return=OK"),
            "{kind}: missing return-code table:\n{text}"
        );
    }
}

#[tokio::test]
async fn export_is_idempotent() {
    let measurements = registry(&[]);
    let mut store = MeasuredStore::new(Box::new(NoopStore::new()), Arc::clone(&measurements));
    let options = Options::new();
    let mut row = Row::new();
    let now = tokio::time::Instant::now();
    for _ in 0..100 {
        store.read("t", "k", None, &options, &mut row, now).await;
    }
    drop(store);

    let first = export(&measurements);
    let second = export(&measurements);
    assert_eq!(first, second, "export mutated the measurements");
}

#[tokio::test]
async fn intended_latency_lives_in_its_own_namespace() {
    let measurements = registry(&[("measurement.interval", "both")]);
    let mut store = MeasuredStore::new(Box::new(NoopStore::new()), Arc::clone(&measurements));
    let options = Options::new();
    let mut row = Row::new();
    // An intended start in the past yields a larger intended latency.
    let intended = tokio::time::Instant::now() - std::time::Duration::from_millis(5);
    for _ in 0..10 {
        store.read("t", "k", None, &options, &mut row, intended).await;
    }
    drop(store);

    let text = export(&measurements);
    assert!(text.contains("[READ]"), "{text}");
    assert!(text.contains("[Intended-READ]"), "{text}");

    // The intended view includes the throttle wait, so its average cannot
    // be below the plain one.
    let avg = |metric: &str| -> f64 {
        text.lines()
            .find(|line| line.starts_with(&format!("[{metric}] avg")))
            .and_then(|line| line.split(" : ").nth(1))
            .and_then(|rest| rest.strip_suffix(" us"))
            .and_then(|value| value.parse().ok())
            .unwrap_or_else(|| panic!("no avg for {metric}:\n{text}"))
    };
    assert!(avg("Intended-READ") >= avg("READ"));
    assert!(avg("Intended-READ") >= 5_000.0);
}

#[test]
fn explicit_type_requests_are_checked() {
    let measurements = registry(&[]);
    measurements.measure("READ", 10).unwrap();
    assert!(measurements
        .get_or_create("READ", MeasurementType::Hdr)
        .is_ok());
    assert!(measurements
        .get_or_create("READ", MeasurementType::TimeSeries)
        .is_err());
}
