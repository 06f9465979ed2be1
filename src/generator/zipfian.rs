//! Zipf-skewed key generators.
//!
//! [`ZipfianGenerator`] reproduces the classical inversion-sampling
//! recurrence over the generalised harmonic numbers, so a fixed seed yields
//! the same sequence as other implementations of the same recurrence. The
//! scrambled variant maps zipfian draws over a large virtual universe
//! through an FNV hash, keeping the skew profile while decorrelating
//! popularity from id order.

use std::sync::Arc;

use rand::rngs::SmallRng;
use rand::Rng;

use super::acknowledged::AcknowledgedCounter;
use super::fnv_hash64;
use crate::error::{Error, Result};

/// Default skew; ~top-1% of a million-key range takes half the draws.
pub const ZIPFIAN_CONSTANT: f64 = 0.99;

/// Virtual universe for the scrambled variant.
const SCRAMBLED_ITEM_COUNT: u64 = 10_000_000_000;
/// ζ(10^10, 0.99), precomputed so startup does not walk ten billion terms.
const SCRAMBLED_ZETAN: f64 = 26.469_028_201_783_02;

/// Zipf(θ) over `[base, base + items)`, favouring small indices.
#[derive(Debug, Clone)]
pub struct ZipfianGenerator {
    items: u64,
    base: u64,
    theta: f64,
    alpha: f64,
    zeta_2: f64,
    zeta_n: f64,
    count_for_zeta: u64,
    eta: f64,
}

impl ZipfianGenerator {
    /// Zipfian over `[lo, hi]` with the default constant.
    pub fn new(lo: u64, hi: u64) -> Result<Self> {
        Self::with_constant(lo, hi, ZIPFIAN_CONSTANT)
    }

    pub fn with_constant(lo: u64, hi: u64, theta: f64) -> Result<Self> {
        if lo > hi {
            return Err(Error::EmptyRange {
                lo: lo as i64,
                hi: hi as i64,
            });
        }
        let items = hi - lo + 1;
        let zeta_n = Self::zeta_static(0, items, theta, 0.0);
        Self::with_zetan(lo, hi, theta, zeta_n)
    }

    /// Constructor for callers that precomputed ζ(n, θ).
    pub fn with_zetan(lo: u64, hi: u64, theta: f64, zeta_n: f64) -> Result<Self> {
        if lo > hi {
            return Err(Error::EmptyRange {
                lo: lo as i64,
                hi: hi as i64,
            });
        }
        let items = hi - lo + 1;
        if items == 0 {
            return Err(Error::ZeroItems);
        }
        let zeta_2 = Self::zeta_static(0, 2, theta, 0.0);
        let mut gen = Self {
            items,
            base: lo,
            theta,
            alpha: 1.0 / (1.0 - theta),
            zeta_2,
            zeta_n,
            count_for_zeta: items,
            eta: 0.0,
        };
        gen.eta = gen.compute_eta(items);
        Ok(gen)
    }

    /// Incremental generalised harmonic number: extends a partial sum over
    /// `[st, n)` of `1 / (i + 1)^θ`.
    fn zeta_static(st: u64, n: u64, theta: f64, initial_sum: f64) -> f64 {
        let mut sum = initial_sum;
        for i in st..n {
            sum += 1.0 / ((i + 1) as f64).powf(theta);
        }
        sum
    }

    fn compute_eta(&self, items: u64) -> f64 {
        (1.0 - (2.0 / items as f64).powf(1.0 - self.theta)) / (1.0 - self.zeta_2 / self.zeta_n)
    }

    pub fn next(&mut self, rng: &mut SmallRng) -> u64 {
        self.next_with_items(rng, self.items)
    }

    /// Draw over the first `items` values, extending ζ incrementally when
    /// the item count has grown since the last draw.
    pub fn next_with_items(&mut self, rng: &mut SmallRng, items: u64) -> u64 {
        if items != self.count_for_zeta {
            if items > self.count_for_zeta {
                self.zeta_n = Self::zeta_static(self.count_for_zeta, items, self.theta, self.zeta_n);
            } else {
                // Shrinking item counts force a recompute from scratch.
                tracing::warn!(
                    items,
                    count_for_zeta = self.count_for_zeta,
                    "zipfian item count decreased, recomputing zeta"
                );
                self.zeta_n = Self::zeta_static(0, items, self.theta, 0.0);
            }
            self.count_for_zeta = items;
            self.eta = self.compute_eta(items);
        }

        let u: f64 = rng.random();
        let uz = u * self.zeta_n;

        if uz < 1.0 {
            return self.base;
        }
        if uz < 1.0 + 0.5f64.powf(self.theta) {
            return self.base + 1;
        }
        self.base + ((items as f64) * (self.eta * u - self.eta + 1.0).powf(self.alpha)) as u64
    }

    pub fn items(&self) -> u64 {
        self.items
    }
}

/// Zipfian draws over a ten-billion-item virtual universe, hashed into
/// `[lo, hi]`.
///
/// Popular items stay popular as the key space grows, but which concrete
/// ids are popular is decided by the hash, not by insertion order.
#[derive(Debug, Clone)]
pub struct ScrambledZipfianGenerator {
    lo: u64,
    item_count: u64,
    zipfian: ZipfianGenerator,
}

impl ScrambledZipfianGenerator {
    pub fn new(lo: u64, hi: u64) -> Result<Self> {
        if lo > hi {
            return Err(Error::EmptyRange {
                lo: lo as i64,
                hi: hi as i64,
            });
        }
        let zipfian = ZipfianGenerator::with_zetan(
            0,
            SCRAMBLED_ITEM_COUNT - 1,
            ZIPFIAN_CONSTANT,
            SCRAMBLED_ZETAN,
        )?;
        Ok(Self {
            lo,
            item_count: hi - lo + 1,
            zipfian,
        })
    }

    pub fn next(&mut self, rng: &mut SmallRng) -> u64 {
        let z = self.zipfian.next(rng);
        self.lo + fnv_hash64(z) % self.item_count
    }
}

/// Zipf-skewed draws biased toward the newest acknowledged insert ids.
#[derive(Debug)]
pub struct SkewedLatestGenerator {
    counter: Arc<AcknowledgedCounter>,
    zipfian: ZipfianGenerator,
}

impl SkewedLatestGenerator {
    pub fn new(counter: Arc<AcknowledgedCounter>) -> Result<Self> {
        let max = counter.last_value().max(1) as u64;
        // Item count tracks the counter on every draw; the initial value
        // only seeds the zeta cache.
        let zipfian = ZipfianGenerator::new(0, max - 1)?;
        Ok(Self { counter, zipfian })
    }

    pub fn next(&mut self, rng: &mut SmallRng) -> u64 {
        let max = self.counter.last_value().max(0) as u64;
        if max == 0 {
            return 0;
        }
        let offset = self.zipfian.next_with_items(rng, max);
        max - offset
    }
}

/// Zipfian index into a fixed list of values.
#[derive(Debug, Clone)]
pub struct ListZipfianGenerator {
    values: Vec<u64>,
    zipfian: ZipfianGenerator,
}

impl ListZipfianGenerator {
    pub fn new(values: Vec<u64>, theta: f64) -> Result<Self> {
        if values.is_empty() {
            return Err(Error::ZeroItems);
        }
        let zipfian = ZipfianGenerator::with_constant(0, values.len() as u64 - 1, theta)?;
        Ok(Self { values, zipfian })
    }

    pub fn next(&mut self, rng: &mut SmallRng) -> u64 {
        let index = self.zipfian.next(rng) as usize;
        self.values[index.min(self.values.len() - 1)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use std::collections::HashMap;

    fn rng() -> SmallRng {
        SmallRng::seed_from_u64(0xbad_cafe)
    }

    #[test]
    fn zero_items_rejected() {
        assert!(ZipfianGenerator::new(1, 0).is_err());
    }

    #[test]
    fn draws_stay_in_range() {
        let mut gen = ZipfianGenerator::new(10, 109).unwrap();
        let mut rng = rng();
        for _ in 0..50_000 {
            let v = gen.next(&mut rng);
            assert!((10..=109).contains(&v), "v = {v}");
        }
    }

    #[test]
    fn fixed_seed_reproduces_sequence() {
        let mut a = ZipfianGenerator::new(0, 999).unwrap();
        let mut b = ZipfianGenerator::new(0, 999).unwrap();
        let mut rng_a = SmallRng::seed_from_u64(7);
        let mut rng_b = SmallRng::seed_from_u64(7);
        for _ in 0..1000 {
            assert_eq!(a.next(&mut rng_a), b.next(&mut rng_b));
        }
    }

    #[test]
    fn small_indices_dominate() {
        let mut gen = ZipfianGenerator::new(0, 9999).unwrap();
        let mut rng = rng();
        let n = 100_000;
        let head = (0..n).filter(|_| gen.next(&mut rng) < 100).count();
        // The first 1% of the range takes well over a third of the draws at
        // theta = 0.99.
        assert!(head as f64 / n as f64 > 0.35, "head = {head}");
    }

    #[test]
    fn growing_item_count_extends_zeta() {
        let mut gen = ZipfianGenerator::new(0, 99).unwrap();
        let mut rng = rng();
        for _ in 0..100 {
            let v = gen.next_with_items(&mut rng, 1000);
            assert!(v < 1000);
        }
        assert_eq!(gen.count_for_zeta, 1000);
    }

    #[test]
    fn scrambled_covers_range_with_skew() {
        let mut gen = ScrambledZipfianGenerator::new(0, 999).unwrap();
        let mut rng = rng();
        let n = 200_000;
        let mut counts: HashMap<u64, u64> = HashMap::new();
        for _ in 0..n {
            let v = gen.next(&mut rng);
            assert!(v < 1000);
            *counts.entry(v).or_default() += 1;
        }
        let mut by_count: Vec<u64> = counts.values().copied().collect();
        by_count.sort_unstable_by(|a, b| b.cmp(a));
        let top10: u64 = by_count.iter().take(10).sum();
        // 1% of the keys draw a disproportionate share.
        assert!(top10 as f64 / n as f64 > 0.2, "top10 = {top10}");
    }

    #[test]
    fn list_zipfian_returns_listed_values() {
        let values = vec![1000, 2000, 4000, 8000];
        let mut gen = ListZipfianGenerator::new(values.clone(), 1.5).unwrap();
        let mut rng = rng();
        for _ in 0..1000 {
            assert!(values.contains(&gen.next(&mut rng)));
        }
    }

    #[test]
    fn skewed_latest_tracks_counter() {
        let counter = Arc::new(AcknowledgedCounter::new(0, 1 << 10));
        for _ in 0..100 {
            let id = counter.next();
            counter.acknowledge(id).unwrap();
        }
        let mut gen = SkewedLatestGenerator::new(Arc::clone(&counter)).unwrap();
        let mut rng = rng();
        let mut newest_half = 0;
        let n = 20_000;
        for _ in 0..n {
            let v = gen.next(&mut rng);
            assert!(v <= 99);
            if v >= 50 {
                newest_half += 1;
            }
        }
        // Latest-skew favours the newest ids heavily.
        assert!(newest_half as f64 / n as f64 > 0.7);
    }
}
