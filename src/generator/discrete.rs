//! Weighted choice of the next database operation.

use rand::distr::weighted::WeightedIndex;
use rand::distr::Distribution;
use rand::rngs::SmallRng;

use crate::error::{Error, Result};

/// One database call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Read,
    Update,
    Insert,
    Scan,
}

impl Operation {
    /// Metric name prefix for this operation.
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Read => "READ",
            Operation::Update => "UPDATE",
            Operation::Insert => "INSERT",
            Operation::Scan => "SCAN",
        }
    }
}

/// Returns a label with probability proportional to its weight.
///
/// Labels with non-positive weight are dropped at construction; an empty
/// remainder is a configuration error.
#[derive(Debug, Clone)]
pub struct DiscreteGenerator {
    labels: Vec<Operation>,
    weights: WeightedIndex<f64>,
}

impl DiscreteGenerator {
    pub fn new(pairs: &[(f64, Operation)]) -> Result<Self> {
        let kept: Vec<(f64, Operation)> = pairs
            .iter()
            .copied()
            .filter(|(weight, _)| *weight > 0.0)
            .collect();
        if kept.is_empty() {
            return Err(Error::NoPositiveWeights);
        }
        let weights = WeightedIndex::new(kept.iter().map(|(weight, _)| *weight))
            .map_err(|_| Error::NoPositiveWeights)?;
        Ok(Self {
            labels: kept.into_iter().map(|(_, op)| op).collect(),
            weights,
        })
    }

    pub fn next(&self, rng: &mut SmallRng) -> Operation {
        self.labels[self.weights.sample(rng)]
    }
}
