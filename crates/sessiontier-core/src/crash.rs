//! Fault injection for local memory.
//!
//! Crashes arrive as a Poisson process: the delay until the next one is
//! exponentially distributed with mean `mttf`. The generator is seeded so
//! that repeated runs see the same crash schedule.

use std::time::Duration;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Seed of the default crash schedule.
pub const CRASH_SEED: u64 = 5_754_853_343;

/// Uniform draws below this are discarded; they would produce delays of
/// many multiples of the mean.
const MIN_UNIFORM: f64 = 1e-3;

#[derive(Debug)]
pub struct CrashGenerator {
    mttf_secs: f64,
    rng: Mutex<StdRng>,
}

impl CrashGenerator {
    /// Returns `None` when `mttf_secs` is not positive: local memory never fails.
    #[must_use]
    pub fn new(mttf_secs: f64) -> Option<Self> {
        Self::with_seed(mttf_secs, CRASH_SEED)
    }

    #[must_use]
    pub fn with_seed(mttf_secs: f64, seed: u64) -> Option<Self> {
        (mttf_secs > 0.0 && mttf_secs.is_finite()).then(|| Self {
            mttf_secs,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        })
    }

    #[must_use]
    pub fn mttf_secs(&self) -> f64 {
        self.mttf_secs
    }

    /// Time until the next crash.
    pub fn next_delay(&self) -> Duration {
        let mut rng = self.rng.lock();
        let uniform = loop {
            let u: f64 = rng.random();
            if u >= MIN_UNIFORM {
                break u;
            }
        };
        Duration::from_secs_f64(-uniform.ln() * self.mttf_secs)
    }
}
