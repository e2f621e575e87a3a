use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Source of simulated utilization figures.
///
/// Implementations return a whole percentage in `[min, max]` inclusive.
pub trait UsageSampler: Send + Sync {
    fn sample(&self, min: u32, max: u32) -> f64;
}

/// Draws from the thread-local RNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRngSampler;

impl UsageSampler for ThreadRngSampler {
    fn sample(&self, min: u32, max: u32) -> f64 {
        if min >= max {
            return min as f64;
        }
        rand::thread_rng().gen_range(min..=max) as f64
    }
}

/// Reproducible sequence from a fixed seed.
#[derive(Debug)]
pub struct SeededSampler {
    rng: Mutex<StdRng>,
}

impl SeededSampler {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl UsageSampler for SeededSampler {
    fn sample(&self, min: u32, max: u32) -> f64 {
        if min >= max {
            return min as f64;
        }
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        rng.gen_range(min..=max) as f64
    }
}

/// Always the same value, pulled into the requested range.
#[derive(Debug, Clone, Copy)]
pub struct FixedSampler(pub f64);

impl UsageSampler for FixedSampler {
    fn sample(&self, min: u32, max: u32) -> f64 {
        self.0.clamp(min as f64, max.max(min) as f64)
    }
}
