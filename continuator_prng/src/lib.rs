// Deterministic, portable pseudo-random number generator for the continuator.
//
// Implements xoshiro256++ (Blackman & Vigna, 2019) with SplitMix64 seeding.
// Every random decision the engine makes (tie-breaks between matching tree
// nodes, the draw among a node's continuations, the random fallback over the
// whole continuation index) goes through one `ContinuatorRng`, so a session
// started with a fixed seed replays its continuations exactly.
//
// **Critical constraint: determinism.** Given the same seed and the same
// sequence of calls, every method must return identical values on every
// platform. Do not introduce floating-point arithmetic into the core
// generator or any OS entropy source other than `from_clock`.

use std::time::{SystemTime, UNIX_EPOCH};

/// Xoshiro256++ PRNG, the engine's sole source of randomness.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContinuatorRng {
    s: [u64; 4],
}

impl ContinuatorRng {
    /// Create a new PRNG seeded from a `u64`.
    ///
    /// Uses SplitMix64 to expand the seed into the 256-bit internal state.
    /// Two instances created with the same seed produce identical streams.
    pub fn new(seed: u64) -> Self {
        let mut sm = seed;
        Self {
            s: [
                splitmix64(&mut sm),
                splitmix64(&mut sm),
                splitmix64(&mut sm),
                splitmix64(&mut sm),
            ],
        }
    }

    /// Seed from the wall clock. Used by live sessions that were not given
    /// an explicit seed; the seed is returned so it can be logged and the
    /// session replayed later.
    pub fn from_clock() -> (Self, u64) {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0x5eed);
        (Self::new(seed), seed)
    }

    /// Generate the next `u64` in the sequence.
    pub fn next_u64(&mut self) -> u64 {
        let result = (self.s[0].wrapping_add(self.s[3]))
            .rotate_left(23)
            .wrapping_add(self.s[0]);

        let t = self.s[1] << 17;

        self.s[2] ^= self.s[0];
        self.s[3] ^= self.s[1];
        self.s[1] ^= self.s[2];
        self.s[0] ^= self.s[3];

        self.s[2] ^= t;
        self.s[3] = self.s[3].rotate_left(45);

        result
    }

    /// Generate a uniform `f64` in [0, 1) from the upper 53 bits.
    pub fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Generate a uniform random integer in `[low, high)`.
    ///
    /// Uses rejection sampling to avoid modulo bias.
    /// Panics if `low >= high`.
    pub fn range_u64(&mut self, low: u64, high: u64) -> u64 {
        assert!(low < high, "range_u64: low must be less than high");
        let range = high - low;
        if range.is_power_of_two() {
            return low + (self.next_u64() & (range - 1));
        }
        let threshold = range.wrapping_neg() % range; // = (2^64 - range) % range
        loop {
            let r = self.next_u64();
            if r >= threshold {
                return low + (r % range);
            }
        }
    }

    /// Generate a uniform random `usize` in `[low, high)`.
    ///
    /// Panics if `low >= high`.
    pub fn range_usize(&mut self, low: usize, high: usize) -> usize {
        self.range_u64(low as u64, high as u64) as usize
    }

    /// Pick one element uniformly at random. `None` only for an empty slice.
    ///
    /// Duplicated elements are not collapsed: a value present `k` times is
    /// `k` times as likely to be drawn.
    pub fn choose<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        if items.is_empty() {
            return None;
        }
        let i = self.range_usize(0, items.len());
        items.get(i)
    }
}

/// SplitMix64, used only for seeding xoshiro256++ from a single `u64`.
fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn determinism_same_seed_same_output() {
        let mut a = ContinuatorRng::new(42);
        let mut b = ContinuatorRng::new(42);
        for _ in 0..1000 {
            assert_eq!(a.next_u64(), b.next_u64());
        }
    }

    #[test]
    fn different_seeds_different_output() {
        let mut a = ContinuatorRng::new(42);
        let mut b = ContinuatorRng::new(43);
        assert_ne!(a.next_u64(), b.next_u64());
    }

    #[test]
    fn f64_in_unit_range() {
        let mut rng = ContinuatorRng::new(12345);
        for _ in 0..10_000 {
            let v = rng.next_f64();
            assert!((0.0..1.0).contains(&v), "f64 out of range: {v}");
        }
    }

    #[test]
    fn range_usize_within_bounds() {
        let mut rng = ContinuatorRng::new(555);
        for _ in 0..10_000 {
            let v = rng.range_usize(5, 15);
            assert!((5..15).contains(&v), "range_usize out of range: {v}");
        }
    }

    #[test]
    fn choose_empty_is_none() {
        let mut rng = ContinuatorRng::new(1);
        let empty: [u8; 0] = [];
        assert_eq!(rng.choose(&empty), None);
    }

    #[test]
    fn choose_single_is_deterministic_across_seeds() {
        for seed in 0..50 {
            let mut rng = ContinuatorRng::new(seed);
            assert_eq!(rng.choose(&[7u8]), Some(&7));
        }
    }

    #[test]
    fn choose_weights_duplicates() {
        // 'a' appears three times, 'b' once: expect roughly 75% / 25%.
        let items = ['a', 'a', 'a', 'b'];
        let mut rng = ContinuatorRng::new(2024);
        let n = 20_000;
        let a_count = (0..n)
            .filter(|_| rng.choose(&items) == Some(&'a'))
            .count();
        let pct = a_count as f64 / n as f64;
        assert!(
            (0.72..0.78).contains(&pct),
            "expected ~75% 'a', got {:.1}%",
            pct * 100.0
        );
    }

    #[test]
    fn choose_reaches_every_element() {
        let items = [1u8, 2, 3, 4, 5];
        let mut rng = ContinuatorRng::new(9);
        let mut seen = [false; 5];
        for _ in 0..1000 {
            let v = *rng.choose(&items).unwrap();
            seen[(v - 1) as usize] = true;
        }
        assert!(seen.iter().all(|&s| s), "not all elements drawn: {seen:?}");
    }

    #[test]
    fn clone_continues_identically() {
        let mut rng = ContinuatorRng::new(42);
        for _ in 0..100 {
            rng.next_u64();
        }
        let mut forked = rng.clone();
        for _ in 0..100 {
            assert_eq!(rng.next_u64(), forked.next_u64());
        }
    }

    #[test]
    fn from_clock_reports_its_seed() {
        let (mut rng, seed) = ContinuatorRng::from_clock();
        let mut replay = ContinuatorRng::new(seed);
        assert_eq!(rng.next_u64(), replay.next_u64());
    }
}
