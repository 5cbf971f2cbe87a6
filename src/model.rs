//! Agents and population of the bounded confidence model.

use crate::config::check_num;
use anyhow::{Context, Result};
use rand::prelude::*;
use rand_distr::Uniform;
use serde::{Deserialize, Serialize};

/// Agent of the simulation.
///
/// Each agent holds an opinion and a fixed tolerance (`epsilon`), both in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    id: usize,
    opinion: f64,
    epsilon: f64,
}

impl Agent {
    /// Create a new agent.
    ///
    /// # Errors
    /// Returns an [`InvalidParameterError`](crate::config::InvalidParameterError)
    /// if the opinion or the tolerance lies outside `[0, 1]`.
    pub fn new(id: usize, opinion: f64, epsilon: f64) -> Result<Self> {
        check_num("opinion", opinion, 0.0..=1.0)?;
        check_num("epsilon", epsilon, 0.0..=1.0)?;
        Ok(Self {
            id,
            opinion,
            epsilon,
        })
    }

    pub fn opinion(&self) -> f64 {
        self.opinion
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    /// Compute the opinion this agent adopts given everybody's opinions (indexed by id).
    ///
    /// The result is the mean over the other agents strictly closer than `epsilon`,
    /// or the current opinion if there are none.
    pub fn update(&self, opinions: &[f64]) -> f64 {
        let mut sum = 0.0;
        let mut n_infl = 0;
        for (id, &other) in opinions.iter().enumerate() {
            if id != self.id && (other - self.opinion).abs() < self.epsilon {
                sum += other;
                n_infl += 1;
            }
        }
        if n_infl == 0 {
            return self.opinion;
        }
        sum / n_infl as f64
    }

    /// With probability `mu` replace the opinion with a fresh uniform draw.
    pub fn perturb<R: Rng>(&mut self, mu: f64, unit_dist: &Uniform<f64>, rng: &mut R) {
        if unit_dist.sample(rng) < mu {
            self.opinion = unit_dist.sample(rng);
        }
    }

    /// Update then perturb, once.
    pub fn tick<R: Rng>(
        &mut self,
        opinions: &[f64],
        mu: f64,
        unit_dist: &Uniform<f64>,
        rng: &mut R,
    ) {
        self.opinion = self.update(opinions);
        self.perturb(mu, unit_dist, rng);
    }
}

/// Fixed-size collection of agents whose ids match their indices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Population {
    agt_vec: Vec<Agent>,
}

impl Population {
    /// Build a population from `(opinion, epsilon)` pairs, assigning ids in order.
    pub fn from_values<I>(values: I) -> Result<Self>
    where
        I: IntoIterator<Item = (f64, f64)>,
    {
        let agt_vec = values
            .into_iter()
            .enumerate()
            .map(|(id, (opinion, epsilon))| {
                Agent::new(id, opinion, epsilon).with_context(|| format!("invalid agent {id}"))
            })
            .collect::<Result<_>>()?;
        Ok(Self { agt_vec })
    }

    pub fn len(&self) -> usize {
        self.agt_vec.len()
    }

    pub(crate) fn agent_mut(&mut self, id: usize) -> Option<&mut Agent> {
        self.agt_vec.get_mut(id)
    }

    /// Current opinions, indexed by agent id.
    pub fn opinions(&self) -> Vec<f64> {
        self.agt_vec.iter().map(Agent::opinion).collect()
    }

    /// Tolerances, indexed by agent id.
    pub fn epsilons(&self) -> Vec<f64> {
        self.agt_vec.iter().map(Agent::epsilon).collect()
    }

    /// Write a fresh random traversal order of all agent ids into `order`.
    pub fn shuffled_order<R: Rng>(&self, order: &mut Vec<usize>, rng: &mut R) {
        order.clear();
        order.extend(0..self.agt_vec.len());
        order.shuffle(rng);
    }
}
