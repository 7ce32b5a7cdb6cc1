use serde::{Deserialize, Serialize};

/// Replacement for a zero seed, which would lock xorshift at zero forever.
const ZERO_SEED_REPLACEMENT: u32 = 0x9E37_79B9;

/// Deterministic xorshift32 generator.
///
/// The same seed and the same call sequence always produce the same values.
/// Install one per simulation as a resource and fetch it through the
/// `ResourceMap`, so independent simulations never share RNG state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeededRng {
    state: u32,
}

impl SeededRng {
    pub fn new(seed: u32) -> Self {
        let state = if seed == 0 {
            ZERO_SEED_REPLACEMENT
        } else {
            seed
        };
        Self { state }
    }

    pub fn reseed(&mut self, seed: u32) {
        *self = Self::new(seed);
    }

    pub fn state(&self) -> u32 {
        self.state
    }

    pub fn next_u32(&mut self) -> u32 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.state = x;
        x
    }

    /// Uniform in `[0, 1)`.
    pub fn next_f64(&mut self) -> f64 {
        f64::from(self.next_u32()) / (f64::from(u32::MAX) + 1.0)
    }

    /// Uniform in `[min, max)`.
    pub fn range_f64(&mut self, min: f64, max: f64) -> f64 {
        min + (max - min) * self.next_f64()
    }

    /// Uniform in `[min, max)`. Returns `min` when the range is empty.
    pub fn range_u32(&mut self, min: u32, max: u32) -> u32 {
        if max <= min {
            return min;
        }
        min + self.next_u32() % (max - min)
    }

    /// True with probability `p`.
    pub fn chance(&mut self, p: f64) -> bool {
        self.next_f64() < p
    }

    pub fn pick<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        if items.is_empty() {
            return None;
        }
        let index = self.range_u32(0, items.len() as u32) as usize;
        items.get(index)
    }

    /// Fisher-Yates shuffle in place.
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        for i in (1..items.len()).rev() {
            let j = self.range_u32(0, i as u32 + 1) as usize;
            items.swap(i, j);
        }
    }
}

impl Default for SeededRng {
    fn default() -> Self {
        Self::new(ZERO_SEED_REPLACEMENT)
    }
}
