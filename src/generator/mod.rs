//! Synthetic value generators: key ids, field lengths, scan lengths.
//!
//! Each generator produces a lazy, infinite sequence of 64-bit values.
//! Construction can fail (empty ranges, zero item counts); drawing never
//! does. Shared generators ([`CounterGenerator`], [`SequentialGenerator`],
//! the acknowledged counter) keep their state in atomics; the rest take an
//! explicit `&mut SmallRng` so a worker's stream stays reproducible under a
//! fixed seed.

pub mod acknowledged;
pub mod discrete;
pub mod zipfian;

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rand::rngs::SmallRng;
use rand::Rng;

use crate::error::{Error, Result};
use acknowledged::AcknowledgedCounter;
use zipfian::{ScrambledZipfianGenerator, SkewedLatestGenerator, ZipfianGenerator};

const FNV_OFFSET_BASIS_64: u64 = 0xCBF2_9CE4_8422_2325;
const FNV_PRIME_64: u64 = 1_099_511_628_211;

/// FNV-64 mix over the eight octets of `value`, least significant first.
///
/// Used to scramble insert ids into keys so that popularity is decoupled
/// from insertion order while staying identical across runs.
pub fn fnv_hash64(value: u64) -> u64 {
    let mut hash = FNV_OFFSET_BASIS_64;
    let mut v = value;
    for _ in 0..8 {
        let octet = v & 0xff;
        v >>= 8;
        hash ^= octet;
        hash = hash.wrapping_mul(FNV_PRIME_64);
    }
    hash
}

/// Always returns the configured value.
#[derive(Debug, Clone)]
pub struct ConstantGenerator {
    value: u64,
}

impl ConstantGenerator {
    pub fn new(value: u64) -> Self {
        Self { value }
    }

    pub fn next(&self) -> u64 {
        self.value
    }
}

/// Monotonic counter shared across workers.
#[derive(Debug)]
pub struct CounterGenerator {
    counter: AtomicU64,
}

impl CounterGenerator {
    pub fn new(start: u64) -> Self {
        Self {
            counter: AtomicU64::new(start),
        }
    }

    pub fn next(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::Relaxed)
    }

    /// The most recently handed-out value.
    pub fn last(&self) -> u64 {
        self.counter.load(Ordering::Relaxed).wrapping_sub(1)
    }
}

/// Counter over `[lo, hi]` that wraps back to `lo` past the end.
#[derive(Debug)]
pub struct SequentialGenerator {
    lo: u64,
    span: u64,
    counter: AtomicU64,
}

impl SequentialGenerator {
    pub fn new(lo: u64, hi: u64) -> Result<Self> {
        if lo > hi {
            return Err(Error::EmptyRange {
                lo: lo as i64,
                hi: hi as i64,
            });
        }
        Ok(Self {
            lo,
            span: hi - lo + 1,
            counter: AtomicU64::new(0),
        })
    }

    pub fn next(&self) -> u64 {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        self.lo + n % self.span
    }
}

/// Inclusive integer uniform over `[lo, hi]`.
#[derive(Debug, Clone)]
pub struct UniformGenerator {
    lo: u64,
    hi: u64,
}

impl UniformGenerator {
    pub fn new(lo: u64, hi: u64) -> Result<Self> {
        if lo > hi {
            return Err(Error::EmptyRange {
                lo: lo as i64,
                hi: hi as i64,
            });
        }
        Ok(Self { lo, hi })
    }

    pub fn next(&self, rng: &mut SmallRng) -> u64 {
        rng.random_range(self.lo..=self.hi)
    }
}

/// Continuous exponential whose `percentile`-th value equals `range`.
///
/// Biases draws toward small offsets; the workload subtracts the draw from
/// the newest acknowledged id to favour recent records.
#[derive(Debug, Clone)]
pub struct ExponentialGenerator {
    gamma: f64,
}

impl ExponentialGenerator {
    pub fn new(percentile: f64, range: f64) -> Self {
        let gamma = -(1.0 - percentile / 100.0).ln() / range;
        Self { gamma }
    }

    pub fn next(&self, rng: &mut SmallRng) -> u64 {
        let u: f64 = rng.random();
        (-u.ln() / self.gamma) as u64
    }

    pub fn mean(&self) -> f64 {
        1.0 / self.gamma
    }
}

/// With probability `opn_fraction`, draws uniformly from the first
/// `data_fraction` of `[lo, hi]`; otherwise from the remainder.
#[derive(Debug, Clone)]
pub struct HotspotGenerator {
    lo: u64,
    hot_interval: u64,
    cold_interval: u64,
    opn_fraction: f64,
}

impl HotspotGenerator {
    pub fn new(lo: u64, hi: u64, data_fraction: f64, opn_fraction: f64) -> Result<Self> {
        if lo > hi {
            return Err(Error::EmptyRange {
                lo: lo as i64,
                hi: hi as i64,
            });
        }
        let data_fraction = clamp_fraction("hotspotdatafraction", data_fraction);
        let opn_fraction = clamp_fraction("hotspotopnfraction", opn_fraction);
        let interval = hi - lo + 1;
        let hot_interval = ((interval as f64) * data_fraction) as u64;
        Ok(Self {
            lo,
            hot_interval,
            cold_interval: interval - hot_interval,
            opn_fraction,
        })
    }

    pub fn next(&self, rng: &mut SmallRng) -> u64 {
        let hot = rng.random::<f64>() < self.opn_fraction;
        if hot && self.hot_interval > 0 {
            self.lo + rng.random_range(0..self.hot_interval)
        } else if self.cold_interval > 0 {
            self.lo + self.hot_interval + rng.random_range(0..self.cold_interval)
        } else {
            self.lo + rng.random_range(0..self.hot_interval.max(1))
        }
    }
}

fn clamp_fraction(name: &str, value: f64) -> f64 {
    if !(0.0..=1.0).contains(&value) {
        tracing::warn!(name, value, "fraction outside [0, 1], clamping");
        value.clamp(0.0, 1.0)
    } else {
        value
    }
}

/// Empirical distribution read once from a file of bucket counts.
///
/// File format: an optional `BlockSize: n` header, then one
/// `bucket<TAB>count` line per non-empty bucket.
#[derive(Debug, Clone)]
pub struct HistogramFileGenerator {
    block_size: u64,
    buckets: Vec<u64>,
    area: u64,
}

impl HistogramFileGenerator {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(&path)?;
        let mut block_size = 1;
        let mut buckets: Vec<u64> = Vec::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(rest) = line.strip_prefix("BlockSize:") {
                block_size = parse_histogram_number(line, rest)?;
                continue;
            }
            let (bucket, count) = line.split_once(['\t', ' ']).ok_or_else(|| {
                Error::InvalidProperty {
                    key: "fieldlengthhistogram".to_string(),
                    value: line.to_string(),
                    reason: "expected `bucket<TAB>count`".to_string(),
                }
            })?;
            let bucket = parse_histogram_number(line, bucket)? as usize;
            let count = parse_histogram_number(line, count)?;
            if buckets.len() <= bucket {
                buckets.resize(bucket + 1, 0);
            }
            buckets[bucket] = count;
        }
        Self::from_buckets(block_size, buckets)
    }

    pub fn from_buckets(block_size: u64, buckets: Vec<u64>) -> Result<Self> {
        let area: u64 = buckets.iter().sum();
        if area == 0 {
            return Err(Error::NoPositiveWeights);
        }
        Ok(Self {
            block_size,
            buckets,
            area,
        })
    }

    pub fn next(&self, rng: &mut SmallRng) -> u64 {
        let mut number = rng.random_range(0..self.area) as i64;
        for (i, count) in self.buckets.iter().enumerate() {
            number -= *count as i64;
            if number < 0 {
                return (i as u64 + 1) * self.block_size;
            }
        }
        self.buckets.len() as u64 * self.block_size
    }
}

fn parse_histogram_number(line: &str, raw: &str) -> Result<u64> {
    raw.trim().parse().map_err(|_| Error::InvalidProperty {
        key: "fieldlengthhistogram".to_string(),
        value: line.to_string(),
        reason: format!("`{}` is not a number", raw.trim()),
    })
}

/// Closed set of length distributions (field lengths, scan lengths).
#[derive(Debug)]
pub enum LengthGenerator {
    Constant(ConstantGenerator),
    Uniform(UniformGenerator),
    Zipfian(ZipfianGenerator),
    Histogram(HistogramFileGenerator),
}

impl LengthGenerator {
    pub fn next(&mut self, rng: &mut SmallRng) -> u64 {
        match self {
            LengthGenerator::Constant(g) => g.next(),
            LengthGenerator::Uniform(g) => g.next(rng),
            LengthGenerator::Zipfian(g) => g.next(rng),
            LengthGenerator::Histogram(g) => g.next(rng),
        }
    }
}

/// Closed set of transaction-key distributions.
///
/// The workload guards the selector with a lock; the zipfian variants carry
/// mutable ζ state that must not be raced.
#[derive(Debug)]
pub enum KeySelector {
    Uniform(UniformGenerator),
    Sequential(SequentialGenerator),
    Zipfian(ScrambledZipfianGenerator),
    Latest(SkewedLatestGenerator),
    Hotspot(HotspotGenerator),
    Exponential(ExponentialGenerator),
}

impl KeySelector {
    pub fn next(&mut self, rng: &mut SmallRng) -> u64 {
        match self {
            KeySelector::Uniform(g) => g.next(rng),
            KeySelector::Sequential(g) => g.next(),
            KeySelector::Zipfian(g) => g.next(rng),
            KeySelector::Latest(g) => g.next(rng),
            KeySelector::Hotspot(g) => g.next(rng),
            KeySelector::Exponential(g) => g.next(rng),
        }
    }

    /// True for the distribution whose draws are offsets from the newest
    /// acknowledged id rather than absolute ids.
    pub fn is_offset_based(&self) -> bool {
        matches!(self, KeySelector::Exponential(_))
    }
}

/// Builds a [`KeySelector::Latest`] bound to the shared acknowledged counter.
pub fn latest_selector(counter: Arc<AcknowledgedCounter>) -> Result<KeySelector> {
    Ok(KeySelector::Latest(SkewedLatestGenerator::new(counter)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn rng() -> SmallRng {
        SmallRng::seed_from_u64(0x5eed)
    }

    #[test]
    fn fnv_hash_is_deterministic_and_spreads() {
        assert_eq!(fnv_hash64(0), fnv_hash64(0));
        assert_ne!(fnv_hash64(0), fnv_hash64(1));
        assert_ne!(fnv_hash64(1), fnv_hash64(2));
        // Nearby ids land far apart.
        let a = fnv_hash64(100) % 1000;
        let b = fnv_hash64(101) % 1000;
        assert_ne!(a, b);
    }

    #[test]
    fn counter_counts_from_start() {
        let counter = CounterGenerator::new(10);
        assert_eq!(counter.next(), 10);
        assert_eq!(counter.next(), 11);
        assert_eq!(counter.last(), 11);
    }

    #[test]
    fn sequential_wraps() {
        let seq = SequentialGenerator::new(5, 7).unwrap();
        let drawn: Vec<u64> = (0..7).map(|_| seq.next()).collect();
        assert_eq!(drawn, vec![5, 6, 7, 5, 6, 7, 5]);
    }

    #[test]
    fn uniform_stays_in_bounds() {
        let gen = UniformGenerator::new(10, 20).unwrap();
        let mut rng = rng();
        for _ in 0..10_000 {
            let v = gen.next(&mut rng);
            assert!((10..=20).contains(&v));
        }
    }

    #[test]
    fn empty_ranges_fail_construction() {
        assert!(UniformGenerator::new(5, 4).is_err());
        assert!(SequentialGenerator::new(5, 4).is_err());
        assert!(HotspotGenerator::new(5, 4, 0.2, 0.8).is_err());
    }

    #[test]
    fn exponential_percentile_lands_on_range() {
        let gen = ExponentialGenerator::new(90.0, 100.0);
        let mut rng = rng();
        let n = 200_000;
        let below = (0..n).filter(|_| gen.next(&mut rng) <= 100).count();
        let frac = below as f64 / n as f64;
        assert!((frac - 0.90).abs() < 0.01, "frac = {frac}");
    }

    #[test]
    fn hotspot_hits_hot_set_at_configured_rate() {
        let gen = HotspotGenerator::new(0, 99, 0.2, 0.8).unwrap();
        let mut rng = rng();
        let n = 100_000;
        let mut hot = 0;
        for _ in 0..n {
            let v = gen.next(&mut rng);
            assert!(v <= 99);
            if v < 20 {
                hot += 1;
            }
        }
        let frac = hot as f64 / n as f64;
        assert!((frac - 0.8).abs() < 0.02, "frac = {frac}");
    }

    #[test]
    fn hotspot_clamps_fractions() {
        let gen = HotspotGenerator::new(0, 9, 1.5, -0.5).unwrap();
        let mut rng = rng();
        for _ in 0..100 {
            assert!(gen.next(&mut rng) <= 9);
        }
    }

    #[test]
    fn histogram_file_follows_bucket_weights() {
        let gen = HistogramFileGenerator::from_buckets(10, vec![0, 3, 0, 1]).unwrap();
        let mut rng = rng();
        let n = 40_000;
        let mut at_20 = 0;
        for _ in 0..n {
            let v = gen.next(&mut rng);
            assert!(v == 20 || v == 40, "v = {v}");
            if v == 20 {
                at_20 += 1;
            }
        }
        let frac = at_20 as f64 / n as f64;
        assert!((frac - 0.75).abs() < 0.02, "frac = {frac}");
    }

    #[test]
    fn histogram_file_parses() {
        use std::io::Write;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lengths.txt");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "BlockSize: 100").unwrap();
        writeln!(file, "0\t5").unwrap();
        writeln!(file, "2\t5").unwrap();
        drop(file);

        let gen = HistogramFileGenerator::from_file(&path).unwrap();
        let mut rng = rng();
        for _ in 0..100 {
            let v = gen.next(&mut rng);
            assert!(v == 100 || v == 300, "v = {v}");
        }
    }

    #[test]
    fn empty_histogram_is_rejected() {
        assert!(HistogramFileGenerator::from_buckets(1, vec![0, 0]).is_err());
    }
}
