//! Random draw capability.
//!
//! Decisions compare a uniform draw in [0, 1) against a probability. The
//! source is injected so runs can be replayed from a seed.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

pub trait Draw: Send + Sync {
    /// Uniform value in [0, 1).
    fn draw(&self) -> f64;
}

/// Seedable pseudo-random source.
pub struct SeededDraw {
    rng: Mutex<StdRng>,
}

impl SeededDraw {
    pub fn seed_from_u64(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }
}

impl Draw for SeededDraw {
    fn draw(&self) -> f64 {
        self.rng
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .gen::<f64>()
    }
}

/// Always returns the same value.
#[derive(Debug, Clone, Copy)]
pub struct FixedDraw(pub f64);

impl Draw for FixedDraw {
    fn draw(&self) -> f64 {
        self.0
    }
}

/// Replays a script of values, then repeats the fallback.
pub struct ScriptedDraw {
    values: Mutex<VecDeque<f64>>,
    fallback: f64,
}

impl ScriptedDraw {
    pub fn new(values: impl IntoIterator<Item = f64>, fallback: f64) -> Self {
        Self {
            values: Mutex::new(values.into_iter().collect()),
            fallback,
        }
    }
}

impl Draw for ScriptedDraw {
    fn draw(&self) -> f64 {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or(self.fallback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_draw_is_reproducible() {
        let a = SeededDraw::seed_from_u64(7);
        let b = SeededDraw::seed_from_u64(7);
        for _ in 0..16 {
            let (x, y) = (a.draw(), b.draw());
            assert_eq!(x, y);
            assert!((0.0..1.0).contains(&x));
        }
    }

    #[test]
    fn test_scripted_draw_falls_back() {
        let d = ScriptedDraw::new([0.1, 0.2], 0.9);
        assert_eq!(d.draw(), 0.1);
        assert_eq!(d.draw(), 0.2);
        assert_eq!(d.draw(), 0.9);
    }
}
