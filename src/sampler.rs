use crate::config::ModelConfig;
use anyhow::Result;
use rand::prelude::*;
use rand_distr::Gamma;

/// Sampler of heterogeneous agent tolerances.
///
/// Draws from a Beta(alpha, beta) distribution, built as the ratio `x / (x + y)`
/// of two unit-scale Gamma variates, and rescales it into `[epsilon_min, epsilon_max]`
/// (Lorenz, 2010).
pub struct EpsilonSampler {
    gamma_x: Gamma<f64>,
    gamma_y: Gamma<f64>,
    epsilon_min: f64,
    epsilon_max: f64,
}

impl EpsilonSampler {
    pub fn new(cfg: &ModelConfig) -> Result<Self> {
        Ok(Self {
            gamma_x: Gamma::new(cfg.alpha, 1.0)?,
            gamma_y: Gamma::new(cfg.beta, 1.0)?,
            epsilon_min: cfg.epsilon_min,
            epsilon_max: cfg.epsilon_max,
        })
    }

    pub fn sample<R: Rng>(&self, rng: &mut R) -> f64 {
        let x = self.gamma_x.sample(rng);
        let y = self.gamma_y.sample(rng);
        let beta_sample = x / (x + y);
        let epsilon = self.epsilon_min + beta_sample * (self.epsilon_max - self.epsilon_min);
        // Rounding may overshoot the interval by an ulp.
        epsilon.clamp(self.epsilon_min, self.epsilon_max)
    }
}
