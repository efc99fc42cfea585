//! Shared random source.
//!
//! Dropout masks and initialisers may be sampled from many operators at
//! once, so the generator lives behind a `parking_lot::Mutex`. Seeding it
//! explicitly makes every mask reproducible.

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// A thread-safe, seedable random number generator.
#[derive(Debug)]
pub struct SharedRng {
    inner: Mutex<StdRng>,
}

impl SharedRng {
    /// Generator with a fixed seed.
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self {
            inner: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Generator seeded from the operating system.
    #[must_use]
    pub fn from_os() -> Self {
        Self {
            inner: Mutex::new(StdRng::from_os_rng()),
        }
    }

    /// Uniform sample in `[0, 1)`.
    pub fn next_f32(&self) -> f32 {
        self.inner.lock().random::<f32>()
    }

    /// Uniform sample in `[lo, hi)`.
    pub fn uniform(&self, lo: f32, hi: f32) -> f32 {
        lo + (hi - lo) * self.next_f32()
    }

    /// Fills `out` with uniform samples in `[lo, hi)` while holding the lock once.
    pub fn fill_uniform(&self, out: &mut [f32], lo: f32, hi: f32) {
        let mut rng = self.inner.lock();
        for v in out {
            *v = lo + (hi - lo) * rng.random::<f32>();
        }
    }

    /// Fills `out` with a Bernoulli mask: `1.0` with probability `keep`, else `0.0`.
    pub fn fill_bernoulli(&self, out: &mut [f32], keep: f32) {
        let mut rng = self.inner.lock();
        for v in out {
            *v = if rng.random::<f32>() < keep { 1.0 } else { 0.0 };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_stream() {
        let a = SharedRng::seeded(7);
        let b = SharedRng::seeded(7);
        for _ in 0..16 {
            assert_eq!(a.next_f32(), b.next_f32());
        }
    }

    #[test]
    fn uniform_stays_in_range() {
        let rng = SharedRng::seeded(1);
        let mut buf = [0.0; 256];
        rng.fill_uniform(&mut buf, -0.5, 0.5);
        assert!(buf.iter().all(|&v| (-0.5..0.5).contains(&v)));
    }

    #[test]
    fn bernoulli_extremes() {
        let rng = SharedRng::seeded(3);
        let mut buf = [0.5; 32];
        rng.fill_bernoulli(&mut buf, 1.0);
        assert!(buf.iter().all(|&v| v == 1.0));
        rng.fill_bernoulli(&mut buf, 0.0);
        assert!(buf.iter().all(|&v| v == 0.0));
    }
}
