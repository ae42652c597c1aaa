//! Magnetic declination: a single-writer, many-reader cell updated by the
//! mapping system whenever it reloads a chart, read by the filter on every
//! sample (`set_declination`/`declination_` in the source).

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Declination {
    bits: AtomicU64,
}

impl Declination {
    pub fn new(degrees: f64) -> Self {
        Declination { bits: AtomicU64::new(degrees.to_bits()) }
    }

    pub fn set(&self, degrees: f64) {
        self.bits.store(degrees.to_bits(), Ordering::Release);
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }
}
