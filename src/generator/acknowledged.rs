//! A counter whose published value lags the highest generated value and
//! advances only over contiguously acknowledged ids.
//!
//! Producers draw ids with [`AcknowledgedCounter::next`]; once an insert is
//! durable they call [`AcknowledgedCounter::acknowledge`]. Readers consult
//! [`AcknowledgedCounter::last_value`], which never exposes an id that has
//! a gap below it, so a transaction key drawn at or below it is always
//! safe to read.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Mutex;

use crate::error::{Error, Result};

/// Default window size for pending acknowledgements: 2^20 slots.
pub const DEFAULT_WINDOW_SIZE: usize = 1 << 20;

#[derive(Debug)]
pub struct AcknowledgedCounter {
    counter: AtomicU64,
    /// Largest id `L` such that every id in `[start, L]` is acknowledged.
    /// `start - 1` until the first acknowledgement.
    limit: AtomicI64,
    window: Box<[AtomicBool]>,
    mask: u64,
    advance: Mutex<()>,
}

impl AcknowledgedCounter {
    /// `window_size` must be a power of two; in-flight inserts must never
    /// exceed `window_size - 1` or acknowledgement fails fatally.
    pub fn new(start: u64, window_size: usize) -> Self {
        debug_assert!(window_size.is_power_of_two());
        let window = (0..window_size)
            .map(|_| AtomicBool::new(false))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            counter: AtomicU64::new(start),
            limit: AtomicI64::new(start as i64 - 1),
            window,
            mask: window_size as u64 - 1,
            advance: Mutex::new(()),
        }
    }

    /// Draw the next insert id. Never blocks.
    pub fn next(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::Relaxed)
    }

    /// Highest contiguously acknowledged id. Readers tolerate staleness by
    /// rejecting draws above it.
    pub fn last_value(&self) -> i64 {
        self.limit.load(Ordering::Acquire)
    }

    /// Mark `value` as durable. Errors when the window slot is still
    /// occupied, meaning more than `window - 1` inserts are in flight; the
    /// run cannot continue because ids would be conflated.
    pub fn acknowledge(&self, value: u64) -> Result<()> {
        let slot = (value & self.mask) as usize;
        if self.window[slot].swap(true, Ordering::AcqRel) {
            return Err(Error::AckWindowOverflow(value));
        }

        // One advancing thread at a time; everyone else has done their part
        // by marking the slot.
        let Ok(_guard) = self.advance.try_lock() else {
            return Ok(());
        };

        let mut index = self.limit.load(Ordering::Relaxed) + 1;
        let first = index;
        // At most one full revolution of the window.
        while (index - first) < self.window.len() as i64 {
            let slot = (index as u64 & self.mask) as usize;
            if !self.window[slot].load(Ordering::Acquire) {
                break;
            }
            self.window[slot].store(false, Ordering::Release);
            index += 1;
        }
        self.limit.store(index - 1, Ordering::Release);
        Ok(())
    }
}
