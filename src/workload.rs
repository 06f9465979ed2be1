//! The core benchmark workload: CRUD operations over a synthetic key
//! space, with every knob (operation mix, key skew, record shape) driven
//! by configuration.
//!
//! One instance is shared by all workers. Generators with mutable state
//! sit behind locks; the hot counters are atomic. A worker brings its own
//! RNG so a seeded run draws identical streams.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::rngs::SmallRng;
use rand::{Rng, RngCore};
use tokio::time::Instant;

use crate::config::{Config, Distribution};
use crate::error::{Error, Result};
use crate::generator::acknowledged::AcknowledgedCounter;
use crate::generator::discrete::{DiscreteGenerator, Operation};
use crate::generator::zipfian::{ScrambledZipfianGenerator, ZipfianGenerator};
use crate::generator::{
    latest_selector, ConstantGenerator, CounterGenerator, ExponentialGenerator,
    HistogramFileGenerator, HotspotGenerator, KeySelector, LengthGenerator, SequentialGenerator,
    UniformGenerator,
};
use crate::store::wrapper::MeasuredStore;
use crate::store::{Options, Row, Status};

/// Load-stage inserts retry this many times before giving up on a key.
const INSERT_RETRY_LIMIT: u32 = 5;
/// Base backoff between load-insert retries; jittered by U[0.8, 1.2].
const INSERT_RETRY_BASE: Duration = Duration::from_secs(3);

pub struct CoreWorkload {
    table: String,
    field_names: Vec<String>,
    field_length: Mutex<LengthGenerator>,
    field_chooser: UniformGenerator,
    read_all_fields: bool,
    read_all_fields_by_name: bool,
    write_all_fields: bool,

    load_counter: CounterGenerator,
    insert_counter: Arc<AcknowledgedCounter>,
    key_selector: Mutex<KeySelector>,
    op_selector: DiscreteGenerator,
    scan_length: Mutex<LengthGenerator>,

    zero_padding: usize,
    ordered_inserts: bool,

    stop: AtomicBool,
}

impl CoreWorkload {
    pub fn new(config: &Config) -> Result<Self> {
        let field_count = config.field_count()?;
        let field_prefix = config.field_prefix();
        let field_names: Vec<String> = (0..field_count)
            .map(|i| format!("{field_prefix}{i}"))
            .collect();

        let record_count = config.record_count()?;
        let insert_start = config.insert_start()?;
        let insert_count = config.insert_count()?;
        let insert_end = insert_start + insert_count;

        let insert_counter = Arc::new(AcknowledgedCounter::new(
            record_count,
            config.acknowledged_window()?,
        ));

        let key_selector = Self::build_key_selector(
            config,
            insert_start,
            insert_end,
            record_count,
            Arc::clone(&insert_counter),
        )?;

        let op_selector = DiscreteGenerator::new(&[
            (config.read_proportion()?, Operation::Read),
            (config.update_proportion()?, Operation::Update),
            (config.insert_proportion()?, Operation::Insert),
            (config.scan_proportion()?, Operation::Scan),
        ])?;

        Ok(Self {
            table: config.table().to_string(),
            field_length: Mutex::new(Self::build_field_length(config)?),
            field_chooser: UniformGenerator::new(0, field_count.saturating_sub(1))?,
            field_names,
            read_all_fields: config.read_all_fields()?,
            read_all_fields_by_name: config.read_all_fields_by_name()?,
            write_all_fields: config.write_all_fields()?,
            load_counter: CounterGenerator::new(insert_start),
            insert_counter,
            key_selector: Mutex::new(key_selector),
            op_selector,
            scan_length: Mutex::new(Self::build_scan_length(config)?),
            zero_padding: config.zero_padding()?,
            ordered_inserts: config.ordered_inserts()?,
            stop: AtomicBool::new(false),
        })
    }

    fn build_field_length(config: &Config) -> Result<LengthGenerator> {
        let length = config.field_length()?;
        Ok(match config.field_length_distribution()? {
            Distribution::Constant => LengthGenerator::Constant(ConstantGenerator::new(length)),
            Distribution::Uniform => LengthGenerator::Uniform(UniformGenerator::new(
                config.min_field_length()?,
                length,
            )?),
            Distribution::Zipfian => {
                LengthGenerator::Zipfian(ZipfianGenerator::new(1, length)?)
            }
            Distribution::Histogram => LengthGenerator::Histogram(HistogramFileGenerator::from_file(
                config.field_length_histogram_file(),
            )?),
            other => {
                return Err(Error::InvalidProperty {
                    key: "fieldlengthdistribution".to_string(),
                    value: format!("{other:?}").to_lowercase(),
                    reason: "not usable as a field-length distribution".to_string(),
                })
            }
        })
    }

    fn build_scan_length(config: &Config) -> Result<LengthGenerator> {
        let min = config.min_scan_length()?;
        let max = config.max_scan_length()?;
        Ok(match config.scan_length_distribution()? {
            Distribution::Uniform => LengthGenerator::Uniform(UniformGenerator::new(min, max)?),
            Distribution::Zipfian => LengthGenerator::Zipfian(ZipfianGenerator::new(min, max)?),
            other => {
                return Err(Error::InvalidProperty {
                    key: "scanlengthdistribution".to_string(),
                    value: format!("{other:?}").to_lowercase(),
                    reason: "not usable as a scan-length distribution".to_string(),
                })
            }
        })
    }

    fn build_key_selector(
        config: &Config,
        insert_start: u64,
        insert_end: u64,
        record_count: u64,
        counter: Arc<AcknowledgedCounter>,
    ) -> Result<KeySelector> {
        let hi = insert_end.saturating_sub(1).max(insert_start);
        Ok(match config.request_distribution()? {
            Distribution::Uniform => {
                KeySelector::Uniform(UniformGenerator::new(insert_start, hi)?)
            }
            Distribution::Sequential => {
                KeySelector::Sequential(SequentialGenerator::new(insert_start, hi)?)
            }
            // The scrambled range extends one past the loaded keys so that
            // ids inserted during the run keep the same skew profile; the
            // acknowledged clamp rejects ids that are not readable yet.
            Distribution::Zipfian => {
                KeySelector::Zipfian(ScrambledZipfianGenerator::new(insert_start, insert_end)?)
            }
            Distribution::Latest => latest_selector(counter)?,
            Distribution::Hotspot => KeySelector::Hotspot(HotspotGenerator::new(
                insert_start,
                hi,
                config.hotspot_data_fraction()?,
                config.hotspot_opn_fraction()?,
            )?),
            Distribution::Exponential => KeySelector::Exponential(ExponentialGenerator::new(
                config.exponential_percentile()?,
                record_count as f64 * config.exponential_frac()?,
            )),
            other => {
                return Err(Error::InvalidProperty {
                    key: "requestdistribution".to_string(),
                    value: format!("{other:?}").to_lowercase(),
                    reason: "not usable as a request distribution".to_string(),
                })
            }
        })
    }

    /// Cooperative stop; checked by workers at the top of each iteration.
    pub fn request_stop(&self) {
        if !self.stop.swap(true, Ordering::SeqCst) {
            tracing::info!("stop requested");
        }
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    pub fn acknowledged_counter(&self) -> &AcknowledgedCounter {
        &self.insert_counter
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// `key` + zero-padded decimal of the raw or hashed id.
    pub fn build_key(&self, id: u64) -> String {
        let id = if self.ordered_inserts {
            id
        } else {
            crate::generator::fnv_hash64(id)
        };
        format!("key{id:0>width$}", width = self.zero_padding)
    }

    /// Decode a key back to its numeric part. Test support for read-safety
    /// checks; inverse of [`build_key`](Self::build_key) up to hashing.
    pub fn key_number(key: &str) -> Option<u64> {
        key.strip_prefix("key")?.parse().ok()
    }

    fn random_bytes(rng: &mut SmallRng, len: usize) -> Vec<u8> {
        let mut bytes = vec![0u8; len];
        rng.fill_bytes(&mut bytes);
        bytes
    }

    /// Fresh values for every field, sizes drawn per field.
    fn build_values(&self, rng: &mut SmallRng) -> Row {
        let mut field_length = self.field_length.lock().unwrap();
        self.field_names
            .iter()
            .map(|name| {
                let len = field_length.next(rng) as usize;
                (name.clone(), Self::random_bytes(rng, len))
            })
            .collect()
    }

    /// A single random field's worth of fresh data.
    fn build_single_value(&self, rng: &mut SmallRng) -> Row {
        let index = self.field_chooser.next(rng) as usize;
        let name = self.field_names[index].clone();
        let len = self.field_length.lock().unwrap().next(rng) as usize;
        [(name, Self::random_bytes(rng, len))].into_iter().collect()
    }

    /// Field set for reads and scans: all, all-by-name, or one random field.
    fn read_fields(&self, rng: &mut SmallRng) -> Option<Vec<String>> {
        if self.read_all_fields {
            if self.read_all_fields_by_name {
                Some(self.field_names.clone())
            } else {
                None
            }
        } else {
            let index = self.field_chooser.next(rng) as usize;
            Some(vec![self.field_names[index].clone()])
        }
    }

    /// Draw a transaction key id, clamped to the acknowledged range.
    ///
    /// The exponential selector draws an offset below the newest
    /// acknowledged id; every other selector draws absolute ids and
    /// rejects those not yet acknowledged.
    fn next_transaction_id(&self, rng: &mut SmallRng) -> u64 {
        let mut selector = self.key_selector.lock().unwrap();
        if selector.is_offset_based() {
            loop {
                let offset = selector.next(rng) as i64;
                let id = self.insert_counter.last_value() - offset;
                if id >= 0 {
                    return id as u64;
                }
            }
        } else {
            loop {
                let id = selector.next(rng);
                if id as i64 <= self.insert_counter.last_value() {
                    return id;
                }
            }
        }
    }

    /// One load-stage insert, with bounded retries on non-OK status.
    pub async fn do_insert(
        &self,
        db: &mut MeasuredStore,
        rng: &mut SmallRng,
        intended: Instant,
    ) -> Result<bool> {
        let id = self.load_counter.next();
        let key = self.build_key(id);
        let values = self.build_values(rng);
        let mut options = Options::new();
        options.insert("profile".to_string(), "load".into());

        let mut retries = 0;
        loop {
            let status = db
                .insert(&self.table, &key, values.clone(), &options, intended)
                .await;
            if status.is_ok() {
                return Ok(true);
            }

            retries += 1;
            if retries > INSERT_RETRY_LIMIT || self.stop_requested() {
                tracing::error!(key, retries, "giving up on load insert");
                return Ok(false);
            }
            let jitter = 0.8 + 0.4 * rng.random::<f64>();
            tokio::time::sleep(INSERT_RETRY_BASE.mul_f64(jitter)).await;
            if self.stop_requested() {
                return Ok(false);
            }
        }
    }

    /// One transaction: pick an operation and dispatch.
    pub async fn do_transaction(
        &self,
        db: &mut MeasuredStore,
        rng: &mut SmallRng,
        intended: Instant,
    ) -> Result<bool> {
        match self.op_selector.next(rng) {
            Operation::Read => self.transaction_read(db, rng, intended).await,
            Operation::Update => self.transaction_update(db, rng, intended).await,
            Operation::Insert => self.transaction_insert(db, rng, intended).await?,
            Operation::Scan => self.transaction_scan(db, rng, intended).await,
        }
        Ok(true)
    }

    async fn transaction_read(&self, db: &mut MeasuredStore, rng: &mut SmallRng, intended: Instant) {
        let id = self.next_transaction_id(rng);
        let key = self.build_key(id);
        let fields = self.read_fields(rng);
        let mut options = Options::new();
        options.insert("profile".to_string(), "read".into());
        let mut result = Row::new();
        db.read(
            &self.table,
            &key,
            fields.as_deref(),
            &options,
            &mut result,
            intended,
        )
        .await;
    }

    async fn transaction_update(
        &self,
        db: &mut MeasuredStore,
        rng: &mut SmallRng,
        intended: Instant,
    ) {
        let id = self.next_transaction_id(rng);
        let key = self.build_key(id);
        let values = if self.write_all_fields {
            self.build_values(rng)
        } else {
            self.build_single_value(rng)
        };
        db.update(&self.table, &key, values, intended).await;
    }

    async fn transaction_scan(&self, db: &mut MeasuredStore, rng: &mut SmallRng, intended: Instant) {
        let id = self.next_transaction_id(rng);
        let start_key = self.build_key(id);
        let len = self.scan_length.lock().unwrap().next(rng) as usize;
        let fields = self.read_fields(rng);
        let mut result = Vec::new();
        db.scan(
            &self.table,
            &start_key,
            len,
            fields.as_deref(),
            &mut result,
            intended,
        )
        .await;
    }

    /// Transaction-stage insert. The id is acknowledged on every outcome —
    /// a failed insert must not strand its window slot.
    async fn transaction_insert(
        &self,
        db: &mut MeasuredStore,
        rng: &mut SmallRng,
        intended: Instant,
    ) -> Result<()> {
        let id = self.insert_counter.next();
        let key = self.build_key(id);
        let values = self.build_values(rng);
        let mut options = Options::new();
        options.insert("profile".to_string(), "insert".into());
        let status = db
            .insert(&self.table, &key, values, &options, intended)
            .await;
        if !status.is_ok() {
            tracing::debug!(key, status = status.name(), "transaction insert failed");
        }
        self.insert_counter.acknowledge(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn config() -> Config {
        let mut config = Config::new();
        config.set("workload", "core");
        config.set("recordcount", "1000");
        config.set("fieldcount", "3");
        config.set("fieldlength", "16");
        config
    }

    #[test]
    fn keys_are_padded_and_hashed() {
        let mut cfg = config();
        cfg.set("zeropadding", "8");
        cfg.set("insertorder", "ordered");
        let workload = CoreWorkload::new(&cfg).unwrap();
        assert_eq!(workload.build_key(42), "key00000042");
        assert_eq!(CoreWorkload::key_number("key00000042"), Some(42));

        cfg.set("insertorder", "hashed");
        let workload = CoreWorkload::new(&cfg).unwrap();
        let key = workload.build_key(42);
        assert!(key.starts_with("key"));
        assert_ne!(key, "key00000042");
        // Same id, same key, every time.
        assert_eq!(key, workload.build_key(42));
    }

    #[test]
    fn values_cover_every_field() {
        let workload = CoreWorkload::new(&config()).unwrap();
        let mut rng = SmallRng::seed_from_u64(3);
        let row = workload.build_values(&mut rng);
        assert_eq!(row.len(), 3);
        for name in ["field0", "field1", "field2"] {
            assert_eq!(row[name].len(), 16);
        }
        let single = workload.build_single_value(&mut rng);
        assert_eq!(single.len(), 1);
    }

    #[test]
    fn transaction_ids_respect_the_acknowledged_limit() {
        let workload = CoreWorkload::new(&config()).unwrap();
        let mut rng = SmallRng::seed_from_u64(11);
        // recordcount = 1000, so ids 0..=999 count as acknowledged from the
        // start (the counter begins at recordcount).
        for _ in 0..10_000 {
            let id = workload.next_transaction_id(&mut rng);
            assert!(id <= 999, "id = {id}");
        }
    }

    #[test]
    fn exponential_ids_stay_non_negative() {
        let mut cfg = config();
        cfg.set("requestdistribution", "exponential");
        let workload = CoreWorkload::new(&cfg).unwrap();
        let mut rng = SmallRng::seed_from_u64(17);
        for _ in 0..10_000 {
            let id = workload.next_transaction_id(&mut rng);
            assert!(id <= 999, "id = {id}");
        }
    }

    #[test]
    fn stop_flag_flips_once() {
        let workload = CoreWorkload::new(&config()).unwrap();
        assert!(!workload.stop_requested());
        workload.request_stop();
        workload.request_stop();
        assert!(workload.stop_requested());
    }

    #[tokio::test]
    async fn failed_transaction_insert_still_acknowledges() {
        use crate::measure::Measurements;
        use crate::store::noop::NoopStore;

        struct FailingStore;
        #[async_trait::async_trait]
        impl crate::store::StorageAdapter for FailingStore {
            async fn init(&mut self) -> crate::error::Result<()> {
                Ok(())
            }
            async fn cleanup(&mut self) -> crate::error::Result<()> {
                Ok(())
            }
            async fn read(
                &mut self,
                _: &str,
                _: &str,
                _: Option<&[String]>,
                _: &Options,
                _: &mut Row,
            ) -> Status {
                Status::Error
            }
            async fn scan(
                &mut self,
                _: &str,
                _: &str,
                _: usize,
                _: Option<&[String]>,
                _: &mut Vec<Row>,
            ) -> Status {
                Status::Error
            }
            async fn update(&mut self, _: &str, _: &str, _: Row) -> Status {
                Status::Error
            }
            async fn insert(&mut self, _: &str, _: &str, _: Row, _: &Options) -> Status {
                Status::Error
            }
            async fn delete(&mut self, _: &str, _: &str) -> Status {
                Status::Error
            }
        }

        let cfg = config();
        let workload = CoreWorkload::new(&cfg).unwrap();
        let measurements = Arc::new(Measurements::from_config(&cfg).unwrap());
        let mut rng = SmallRng::seed_from_u64(5);

        let mut failing = MeasuredStore::new(Box::new(FailingStore), Arc::clone(&measurements));
        let before = workload.insert_counter.last_value();
        workload
            .transaction_insert(&mut failing, &mut rng, Instant::now())
            .await
            .unwrap();
        assert_eq!(workload.insert_counter.last_value(), before + 1);

        // And the same through a store that succeeds.
        let mut ok = MeasuredStore::new(Box::new(NoopStore::new()), measurements);
        workload
            .transaction_insert(&mut ok, &mut rng, Instant::now())
            .await
            .unwrap();
        assert_eq!(workload.insert_counter.last_value(), before + 2);
    }
}
