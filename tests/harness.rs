//! End-to-end runs of the harness against the built-in adapters.

use std::time::{Duration, Instant};

use millstone::generator::fnv_hash64;
use millstone::store::{Options, Row, StoreFactory};
use millstone::{Config, Runner, StorageAdapter};

fn base_config(pairs: &[(&str, &str)]) -> Config {
    let mut config = Config::new();
    config.set("workload", "core");
    config.set("seed", "424242");
    for (key, value) in pairs {
        config.set(key, value);
    }
    config
}

fn export_path(dir: &tempfile::TempDir, name: &str) -> String {
    dir.path().join(name).to_string_lossy().into_owned()
}

fn export_text(path: &str) -> String {
    std::fs::read_to_string(path).unwrap()
}

/// Count reported for a metric: the `[NAME] N operations` line.
fn exported_operations(text: &str, metric: &str) -> Option<u64> {
    let needle = format!("[{metric}] ");
    text.lines().find_map(|line| {
        let rest = line.strip_prefix(&needle)?;
        let count = rest.strip_suffix(" operations")?;
        count.parse().ok()
    })
}

// Deterministic load: every key present exactly once, hashed ids included.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn load_stage_inserts_every_record() {
    let dir = tempfile::tempdir().unwrap();
    let export = export_path(&dir, "load.txt");
    let config = base_config(&[
        ("stage", "load"),
        ("db", "memory"),
        ("recordcount", "1000"),
        ("threadcount", "4"),
        ("fieldcount", "3"),
        ("fieldlength", "100"),
        ("zeropadding", "8"),
        ("insertorder", "hashed"),
        ("exportfile", &export),
    ]);

    let factory = StoreFactory::new();
    let summary = Runner::builder()
        .config(config.clone())
        .store_factory(factory.clone())
        .build()
        .run()
        .await
        .unwrap();
    assert_eq!(summary.operations, 1000);

    let text = export_text(&export);
    assert_eq!(exported_operations(&text, "TOTAL"), Some(1000));
    assert_eq!(exported_operations(&text, "INSERT"), Some(1000));
    assert!(!text.contains("INSERT-FAILED"), "{text}");

    // Every hashed key is present with all three fields.
    let mut adapter = factory.create("memory", &config).unwrap();
    let options = Options::new();
    for id in 0..1000u64 {
        let key = format!("key{:0>8}", fnv_hash64(id));
        let mut row = Row::new();
        let status = adapter
            .read("usertable", &key, None, &options, &mut row)
            .await;
        assert!(status.is_ok(), "missing {key}");
        assert_eq!(row.len(), 3);
        assert!(row.values().all(|field| field.len() == 100));
    }
}

// Uniform reads after a load: every read hits an existing key.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn uniform_reads_never_miss() {
    let dir = tempfile::tempdir().unwrap();
    let factory = StoreFactory::new();

    let load = base_config(&[
        ("stage", "load"),
        ("db", "memory"),
        ("recordcount", "1000"),
        ("threadcount", "4"),
        ("fieldcount", "3"),
        ("zeropadding", "8"),
    ]);
    Runner::builder()
        .config(load)
        .store_factory(factory.clone())
        .build()
        .run()
        .await
        .unwrap();

    let export = export_path(&dir, "reads.txt");
    let transactions = base_config(&[
        ("stage", "transactions"),
        ("db", "memory"),
        ("recordcount", "1000"),
        ("operationcount", "10000"),
        ("threadcount", "4"),
        ("fieldcount", "3"),
        ("zeropadding", "8"),
        ("readproportion", "1.0"),
        ("updateproportion", "0.0"),
        ("requestdistribution", "uniform"),
        ("exportfile", &export),
    ]);
    let summary = Runner::builder()
        .config(transactions)
        .store_factory(factory)
        .build()
        .run()
        .await
        .unwrap();
    assert_eq!(summary.operations, 10_000);

    let text = export_text(&export);
    assert_eq!(exported_operations(&text, "READ"), Some(10_000));
    assert!(!text.contains("READ-FAILED"), "a read missed:\n{text}");
}

// Rate limiting: 4000 ops at a 1000 ops/s target take about four seconds.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn throttle_holds_the_target_rate() {
    let dir = tempfile::tempdir().unwrap();
    let export = export_path(&dir, "throttle.txt");
    let config = base_config(&[
        ("stage", "transactions"),
        ("db", "noop"),
        ("recordcount", "1000"),
        ("operationcount", "4000"),
        ("threadcount", "4"),
        ("target", "1000"),
        ("readproportion", "1.0"),
        ("updateproportion", "0.0"),
        ("exportfile", &export),
    ]);

    let started = Instant::now();
    let summary = Runner::builder().config(config).build().run().await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(summary.operations, 4000);
    assert!(
        elapsed >= Duration::from_millis(3700) && elapsed <= Duration::from_millis(4800),
        "elapsed = {elapsed:?}"
    );
    assert!(
        (850.0..=1080.0).contains(&summary.throughput),
        "throughput = {:.1}",
        summary.throughput
    );
}

// Insert/read interleaving: reads stay behind the acknowledged counter, so
// none of them can miss, and the window never overflows.
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn interleaved_inserts_and_reads_stay_safe() {
    let dir = tempfile::tempdir().unwrap();
    let factory = StoreFactory::new();

    let load = base_config(&[
        ("stage", "load"),
        ("db", "memory"),
        ("recordcount", "1000"),
        ("threadcount", "4"),
    ]);
    Runner::builder()
        .config(load)
        .store_factory(factory.clone())
        .build()
        .run()
        .await
        .unwrap();

    let export = export_path(&dir, "mixed.txt");
    let mixed = base_config(&[
        ("stage", "transactions"),
        ("db", "memory"),
        ("recordcount", "1000"),
        ("operationcount", "10000"),
        ("threadcount", "8"),
        ("readproportion", "0.5"),
        ("updateproportion", "0.0"),
        ("insertproportion", "0.5"),
        ("exportfile", &export),
    ]);
    let summary = Runner::builder()
        .config(mixed)
        .store_factory(factory)
        .build()
        .run()
        .await
        .expect("acknowledged window must not overflow");
    assert_eq!(summary.operations, 10_000);

    let text = export_text(&export);
    let reads = exported_operations(&text, "READ").unwrap_or(0);
    let inserts = exported_operations(&text, "INSERT").unwrap_or(0);
    assert_eq!(reads + inserts, 10_000);
    assert!(!text.contains("READ-FAILED"), "a read ran ahead:\n{text}");
    assert!(!text.contains("INSERT-FAILED"), "{text}");
}

// Max execution time: a run sized for forever stops at the deadline and
// still exports what it measured.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn terminator_cuts_the_run_short() {
    let dir = tempfile::tempdir().unwrap();
    let export = export_path(&dir, "terminated.txt");
    let config = base_config(&[
        ("stage", "transactions"),
        ("db", "noop"),
        ("recordcount", "1000"),
        ("operationcount", "1000000000"),
        ("threadcount", "2"),
        ("maxexecutiontime", "2"),
        ("readproportion", "1.0"),
        ("updateproportion", "0.0"),
        ("exportfile", &export),
    ]);

    let started = Instant::now();
    let summary = Runner::builder().config(config).build().run().await.unwrap();
    let elapsed = started.elapsed();

    assert!(elapsed <= Duration::from_millis(2800), "elapsed = {elapsed:?}");
    assert!(summary.operations > 0);
    let text = export_text(&export);
    assert_eq!(exported_operations(&text, "TOTAL"), Some(summary.operations));
    assert!(exported_operations(&text, "READ").unwrap_or(0) > 0);
}

// Scan and update paths against the ordered key space.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn scans_and_updates_run_against_ordered_keys() {
    let dir = tempfile::tempdir().unwrap();
    let factory = StoreFactory::new();

    let load = base_config(&[
        ("stage", "load"),
        ("db", "memory"),
        ("recordcount", "500"),
        ("threadcount", "2"),
        ("insertorder", "ordered"),
        ("zeropadding", "4"),
    ]);
    Runner::builder()
        .config(load)
        .store_factory(factory.clone())
        .build()
        .run()
        .await
        .unwrap();

    let export = export_path(&dir, "scan.txt");
    let mixed = base_config(&[
        ("stage", "transactions"),
        ("db", "memory"),
        ("recordcount", "500"),
        ("operationcount", "2000"),
        ("threadcount", "4"),
        ("insertorder", "ordered"),
        ("zeropadding", "4"),
        ("readproportion", "0.0"),
        ("updateproportion", "0.5"),
        ("scanproportion", "0.5"),
        ("maxscanlength", "20"),
        ("exportfile", &export),
    ]);
    let summary = Runner::builder()
        .config(mixed)
        .store_factory(factory)
        .build()
        .run()
        .await
        .unwrap();
    assert_eq!(summary.operations, 2000);

    let text = export_text(&export);
    let scans = exported_operations(&text, "SCAN").unwrap_or(0);
    let updates = exported_operations(&text, "UPDATE").unwrap_or(0);
    assert_eq!(scans + updates, 2000);
    assert!(!text.contains("SCAN-FAILED"), "{text}");
    assert!(!text.contains("UPDATE-FAILED"), "{text}");
}

// Configuration errors surface before any worker starts.
#[tokio::test]
async fn invalid_configuration_fails_fast() {
    let config = base_config(&[
        ("stage", "load"),
        ("recordcount", "100"),
        ("insertstart", "90"),
        ("insertcount", "20"),
    ]);
    assert!(Runner::builder().config(config).build().run().await.is_err());

    let config = base_config(&[("db", "nonexistent"), ("recordcount", "10")]);
    assert!(Runner::builder().config(config).build().run().await.is_err());
}
