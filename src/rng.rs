// src/rng.rs
//! Brownian Increment Generation for Market-Model Simulations
//!
//! # Design Philosophy
//!
//! A market-model path consumes one vector of independent N(0,1) draws per
//! evolution step, of length equal to the number of factors. The generator
//! must provide:
//! 1. **Reproducibility**: Same seed → same results
//! 2. **Parallel safety**: Every path owns an independent substream
//! 3. **Thread-count independence**: Path `i` draws the same numbers whether it
//!    runs on one worker or on sixteen
//!
//! # Substreams
//!
//! Path `i` is mapped to its own `StdRng` seeded from `base_seed + i`. The
//! mapping is stateless, so any worker can position itself on any path with
//! [`BrownianGenerator::seek_path`] before drawing.
//!
//! # Antithetic Pairs
//!
//! With antithetic sampling enabled, paths `2k` and `2k+1` share substream `k`;
//! the odd path negates every draw.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, StandardNormal};

/// RNG factory for reproducible parallel simulations
#[derive(Debug, Clone, Copy)]
pub struct RngFactory {
    base_seed: u64,
}

impl RngFactory {
    pub fn new(base_seed: u64) -> Self {
        Self { base_seed }
    }

    pub fn base_seed(&self) -> u64 {
        self.base_seed
    }

    /// Create a standard RNG for a specific substream
    pub fn create_std_rng(&self, stream_id: u64) -> StdRng {
        StdRng::seed_from_u64(self.base_seed.wrapping_add(stream_id))
    }
}

pub fn get_normal_draw<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    StandardNormal.sample(rng)
}

/// Builds [`BrownianGenerator`]s with a fixed seed and sampling scheme
#[derive(Debug, Clone, Copy)]
pub struct BrownianGeneratorFactory {
    rngs: RngFactory,
    antithetic: bool,
}

impl BrownianGeneratorFactory {
    pub fn new(seed: u64) -> Self {
        Self {
            rngs: RngFactory::new(seed),
            antithetic: false,
        }
    }

    pub fn antithetic(seed: u64) -> Self {
        Self {
            rngs: RngFactory::new(seed),
            antithetic: true,
        }
    }

    pub fn is_antithetic(&self) -> bool {
        self.antithetic
    }

    pub fn create(&self, factors: usize, steps: usize) -> BrownianGenerator {
        BrownianGenerator {
            rngs: self.rngs,
            antithetic: self.antithetic,
            factors,
            steps,
            next_path_index: 0,
            current_path: None,
            rng: self.rngs.create_std_rng(0),
            sign: 1.0,
            current_step: 0,
        }
    }
}

/// Per-path source of independent Gaussian factor increments
#[derive(Debug, Clone)]
pub struct BrownianGenerator {
    rngs: RngFactory,
    antithetic: bool,
    factors: usize,
    steps: usize,
    next_path_index: u64,
    current_path: Option<u64>,
    rng: StdRng,
    sign: f64,
    current_step: usize,
}

impl BrownianGenerator {
    pub fn number_of_factors(&self) -> usize {
        self.factors
    }

    pub fn number_of_steps(&self) -> usize {
        self.steps
    }

    pub fn is_antithetic(&self) -> bool {
        self.antithetic
    }

    /// Index of the path currently being drawn, if any
    pub fn current_path(&self) -> Option<u64> {
        self.current_path
    }

    /// Position the generator so the next call to `next_path` starts `path_index`
    pub fn seek_path(&mut self, path_index: u64) {
        self.next_path_index = path_index;
    }

    /// Start the next path and return its weight
    pub fn next_path(&mut self) -> f64 {
        let path = self.next_path_index;
        self.next_path_index = self.next_path_index.wrapping_add(1);
        let (stream, sign) = if self.antithetic {
            (path / 2, if path % 2 == 0 { 1.0 } else { -1.0 })
        } else {
            (path, 1.0)
        };
        self.rng = self.rngs.create_std_rng(stream);
        self.sign = sign;
        self.current_path = Some(path);
        self.current_step = 0;
        1.0
    }

    /// Fill `output` with one step of draws and return the step weight
    ///
    /// Draws past the configured number of steps are still served; evolvers
    /// guard their own step count.
    pub fn next_step(&mut self, output: &mut [f64]) -> f64 {
        debug_assert_eq!(output.len(), self.factors);
        for z in output.iter_mut() {
            *z = self.sign * get_normal_draw(&mut self.rng);
        }
        self.current_step += 1;
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seek_reproduces_path() {
        let factory = BrownianGeneratorFactory::new(42);
        let mut g1 = factory.create(3, 2);
        let mut g2 = factory.create(3, 2);

        let mut a = vec![0.0; 3];
        let mut b = vec![0.0; 3];

        for _ in 0..5 {
            g1.next_path();
        }
        g1.next_step(&mut a);

        g2.seek_path(4);
        g2.next_path();
        g2.next_step(&mut b);

        assert_eq!(a, b);
        assert_eq!(g1.current_path(), Some(4));
    }

    #[test]
    fn test_different_paths_differ() {
        let factory = BrownianGeneratorFactory::new(42);
        let mut g = factory.create(4, 1);
        let mut a = vec![0.0; 4];
        let mut b = vec![0.0; 4];
        g.next_path();
        g.next_step(&mut a);
        g.next_path();
        g.next_step(&mut b);
        assert_ne!(a, b);
    }

    #[test]
    fn test_antithetic_pairs_negate() {
        let factory = BrownianGeneratorFactory::antithetic(7);
        let mut g = factory.create(2, 3);
        let mut even = vec![vec![0.0; 2]; 3];
        let mut odd = vec![vec![0.0; 2]; 3];

        g.seek_path(10);
        g.next_path();
        for step in even.iter_mut() {
            g.next_step(step);
        }
        g.next_path();
        for step in odd.iter_mut() {
            g.next_step(step);
        }

        for (e, o) in even.iter().flatten().zip(odd.iter().flatten()) {
            assert_eq!(*e, -*o);
        }
    }

    #[test]
    fn test_normal_distribution() {
        let factory = BrownianGeneratorFactory::new(42);
        let mut g = factory.create(1, 1);
        let mut z = [0.0];
        let samples: Vec<f64> = (0..10_000)
            .map(|_| {
                g.next_path();
                g.next_step(&mut z);
                z[0]
            })
            .collect();

        let mean = samples.iter().sum::<f64>() / samples.len() as f64;
        let variance =
            samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / samples.len() as f64;

        assert!(mean.abs() < 0.05, "Mean should be close to 0, got {}", mean);
        assert!(
            (variance - 1.0).abs() < 0.05,
            "Variance should be close to 1, got {}",
            variance
        );
    }
}
