use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

const SEED_MIX: u64 = 0x9E37_79B9_7F4A_7C15;

/// Per-list source of random tower heights.
///
/// Draws follow the classic geometric distribution: a tower keeps climbing
/// past each level with probability one half, capped at the list's maximum
/// level. The generator is a xorshift over shared atomic state, so
/// concurrent inserters can draw without locking.
pub(crate) struct LevelGenerator {
    max_level: usize,
    state: AtomicU64,
}

impl LevelGenerator {
    pub(crate) fn new(max_level: usize) -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("Time went backwards")
            .as_nanos() as u64;
        LevelGenerator::with_seed(max_level, nanos ^ SEED_MIX)
    }

    /// Fixed-seed constructor for reproducible draws in tests.
    pub(crate) fn with_seed(max_level: usize, seed: u64) -> Self {
        // Zero is a fixed point of xorshift, so keep the state nonzero.
        LevelGenerator {
            max_level,
            state: AtomicU64::new(seed.max(1)),
        }
    }

    /// Draw a tower height in `0..=max_level`. Each bit of one xorshift
    /// output is an independent fair coin.
    pub(crate) fn random_level(&self) -> usize {
        let bits = self.next();
        let mut level = 0;
        while level < self.max_level && (bits >> level) & 1 == 1 {
            level += 1;
        }
        level
    }

    fn next(&self) -> u64 {
        let mut current = self.state.load(Ordering::Relaxed);
        loop {
            let next = xorshift64(current);
            match self.state.compare_exchange_weak(
                current,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return next,
                Err(observed) => current = observed,
            }
        }
    }
}

fn xorshift64(mut x: u64) -> u64 {
    x ^= x << 13;
    x ^= x >> 7;
    x ^= x << 17;
    x
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_draws_are_deterministic() {
        let a = LevelGenerator::with_seed(8, 12345);
        let b = LevelGenerator::with_seed(8, 12345);
        let draws_a: Vec<usize> = (0..64).map(|_| a.random_level()).collect();
        let draws_b: Vec<usize> = (0..64).map(|_| b.random_level()).collect();
        assert_eq!(draws_a, draws_b);
    }

    #[test]
    fn draws_never_exceed_max_level() {
        let gen_cap = LevelGenerator::with_seed(3, 99);
        for _ in 0..10_000 {
            assert!(gen_cap.random_level() <= 3);
        }
    }

    #[test]
    fn zero_max_level_pins_every_draw_to_base() {
        let flat = LevelGenerator::with_seed(0, 7);
        for _ in 0..100 {
            assert_eq!(flat.random_level(), 0);
        }
    }

    #[test]
    fn distribution_is_geometric_shaped() {
        let source = LevelGenerator::with_seed(31, 42);
        let draws = 10_000;
        let mut ground = 0usize;
        let mut tall = 0usize;
        for _ in 0..draws {
            let level = source.random_level();
            if level == 0 {
                ground += 1;
            }
            if level >= 2 {
                tall += 1;
            }
        }
        // Expect about one half at level 0 and one quarter at 2 or above;
        // bounds are loose enough to never flake on a fixed seed.
        assert!(ground > draws * 2 / 5, "too few base-level draws: {}", ground);
        assert!(ground < draws * 3 / 5, "too many base-level draws: {}", ground);
        assert!(tall > draws / 7, "too few tall towers: {}", tall);
        assert!(tall < draws * 2 / 5, "too many tall towers: {}", tall);
    }
}
