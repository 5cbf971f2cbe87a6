use crate::config::{Config, UpdateScheme};
use crate::model::Population;
use crate::recorder::{Recorder, TrajectoryWriter};
use crate::sampler::EpsilonSampler;
use anyhow::{Context, Result};
use rand::prelude::*;
use rand_chacha::ChaCha12Rng;
use rand_distr::Uniform;
use rmp_serde::{decode, encode};
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, BufWriter},
    path::Path,
};

/// Simulation engine.
///
/// Holds the configuration, the population, the number of ticks performed so far
/// and the single random number generator every draw comes from.
#[derive(Serialize, Deserialize)]
pub struct Engine {
    cfg: Config,
    pop: Population,
    tick: usize,
    rng: ChaCha12Rng,
}

impl Engine {
    /// Create a new `Engine` with the given configuration and a random initial population.
    ///
    /// Each agent draws its opinion uniformly in `[0, 1]` and then its tolerance
    /// from an [`EpsilonSampler`].
    pub fn generate_initial_condition(cfg: Config) -> Result<Self> {
        cfg.validate().context("failed to validate config")?;

        let mut rng = match cfg.init.seed {
            Some(seed) => ChaCha12Rng::seed_from_u64(seed),
            None => ChaCha12Rng::try_from_os_rng()?,
        };

        let opinion_dist = Uniform::new_inclusive(0.0, 1.0)?;
        let epsilon_sampler = EpsilonSampler::new(&cfg.model)?;
        let mut values = Vec::with_capacity(cfg.init.num_agents);
        for _ in 0..cfg.init.num_agents {
            let opinion = opinion_dist.sample(&mut rng);
            let epsilon = epsilon_sampler.sample(&mut rng);
            values.push((opinion, epsilon));
        }
        let pop = Population::from_values(values).context("failed to create population")?;

        Ok(Self {
            cfg,
            pop,
            tick: 0,
            rng,
        })
    }

    #[cfg(test)]
    pub(crate) fn with_population(cfg: Config, pop: Population) -> Self {
        let seed = cfg.init.seed.unwrap_or_default();
        Self {
            cfg,
            pop,
            tick: 0,
            rng: ChaCha12Rng::seed_from_u64(seed),
        }
    }

    pub fn cfg(&self) -> &Config {
        &self.cfg
    }

    pub fn pop(&self) -> &Population {
        &self.pop
    }

    pub fn tick(&self) -> usize {
        self.tick
    }

    /// Perform `num_runs` ticks, handing the population to `recorder` after each one.
    pub fn step<R: Recorder + ?Sized>(&mut self, recorder: &mut R) -> Result<()> {
        let num_runs = self.cfg.output.num_runs;
        let unit_dist = Uniform::new(0.0, 1.0)?;
        let mut order = Vec::with_capacity(self.pop.len());
        let log_interval = (num_runs / 10).max(1);

        for i_run in 0..num_runs {
            self.perform_tick(&unit_dist, &mut order)
                .context("failed to perform tick")?;

            recorder
                .collect(self.tick, &self.pop, self.cfg.model.mu)
                .context("failed to record population")?;

            if (i_run + 1) % log_interval == 0 {
                let progress = 100.0 * (i_run + 1) as f64 / num_runs as f64;
                log::info!("completed {progress:06.2}%");
            }
        }

        Ok(())
    }

    /// Perform the ticks of one run and save the resulting records to a binary file.
    pub fn perform_simulation<P: AsRef<Path>>(&mut self, file: P) -> Result<()> {
        let mut writer = TrajectoryWriter::create(file)?;
        self.step(&mut writer)?;
        log::info!("recorded {} ticks", writer.n_records());
        writer.finish()
    }

    /// Save a checkpoint of the entire engine state.
    ///
    /// Can be used to resume the simulation later.
    pub fn save_checkpoint<P: AsRef<Path>>(&self, file: P) -> Result<()> {
        let file = file.as_ref();
        let file = File::create(file).with_context(|| format!("failed to create {file:?}"))?;
        let mut writer = BufWriter::new(file);
        encode::write(&mut writer, &self).context("failed to serialize engine")?;
        Ok(())
    }

    /// Load a previously saved engine checkpoint.
    pub fn load_checkpoint<P: AsRef<Path>>(file: P) -> Result<Self> {
        let file = file.as_ref();
        let file = File::open(file).with_context(|| format!("failed to open {file:?}"))?;
        let mut reader = BufReader::new(file);
        let engine = decode::from_read(&mut reader).context("failed to deserialize engine")?;
        Ok(engine)
    }

    fn perform_tick(&mut self, unit_dist: &Uniform<f64>, order: &mut Vec<usize>) -> Result<()> {
        let mu = self.cfg.model.mu;
        let scheme = self.cfg.model.update;

        // Opinions as of the start of the tick.
        let mut opinions = self.pop.opinions();

        self.pop.shuffled_order(order, &mut self.rng);
        for &id in order.iter() {
            let agt = self
                .pop
                .agent_mut(id)
                .with_context(|| format!("agent {id} is missing"))?;
            agt.tick(&opinions, mu, unit_dist, &mut self.rng);
            if scheme == UpdateScheme::Sequential {
                opinions[id] = agt.opinion();
            }
        }

        self.tick += 1;
        log::debug!("tick {} done", self.tick);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use crate::recorder::Record;
    use tempfile::tempdir;

    fn run(engine: &mut Engine) -> Vec<Record> {
        let mut records = Vec::new();
        engine.step(&mut records).unwrap();
        records
    }

    #[test]
    fn values_stay_in_unit_interval() {
        let mut cfg = test_config(200, 100, 1);
        cfg.model.epsilon_min = 0.0;
        cfg.model.epsilon_max = 1.0;
        cfg.model.mu = 0.1;
        let mut engine = Engine::generate_initial_condition(cfg).unwrap();
        let records = run(&mut engine);

        assert_eq!(records.len(), 100);
        for record in &records {
            assert!(record.opinions.iter().all(|o| (0.0..=1.0).contains(o)));
            assert!(record.epsilons.iter().all(|e| (0.0..=1.0).contains(e)));
        }
        assert_eq!(engine.tick(), 100);
    }

    #[test]
    fn zero_runs_record_nothing() {
        let mut engine = Engine::generate_initial_condition(test_config(10, 0, 1)).unwrap();
        let before = engine.pop().clone();
        assert!(run(&mut engine).is_empty());
        assert_eq!(engine.pop(), &before);
        assert_eq!(engine.tick(), 0);
    }

    #[test]
    fn same_seed_reproduces_statistics() {
        let summarize = |records: Vec<Record>| -> Vec<(f64, f64)> {
            records
                .iter()
                .map(|r| (r.mean_opinion, r.median_opinion))
                .collect()
        };
        let mut engine_a = Engine::generate_initial_condition(test_config(100, 50, 9)).unwrap();
        let mut engine_b = Engine::generate_initial_condition(test_config(100, 50, 9)).unwrap();
        let mut engine_c = Engine::generate_initial_condition(test_config(100, 50, 10)).unwrap();

        let stats_a = summarize(run(&mut engine_a));
        assert_eq!(stats_a, summarize(run(&mut engine_b)));
        assert_ne!(stats_a, summarize(run(&mut engine_c)));
    }

    #[test]
    fn no_perturbation_without_mu() {
        let mut cfg = test_config(50, 20, 4);
        cfg.model.epsilon_min = 0.0;
        cfg.model.epsilon_max = 0.0;
        cfg.model.mu = 0.0;
        let mut engine = Engine::generate_initial_condition(cfg).unwrap();
        let before = engine.pop().opinions();
        let records = run(&mut engine);
        assert!(records.iter().all(|r| r.opinions == before));
    }

    #[test]
    fn full_perturbation_redraws_every_opinion() {
        let mut cfg = test_config(50, 20, 4);
        cfg.model.epsilon_min = 1.0;
        cfg.model.epsilon_max = 1.0;
        cfg.model.mu = 1.0;
        let mut engine = Engine::generate_initial_condition(cfg).unwrap();
        let records = run(&mut engine);
        for pair in records.windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);
            let averaged: Vec<f64> = (0..prev.opinions.len())
                .map(|id| {
                    let sum: f64 = prev.opinions.iter().sum::<f64>() - prev.opinions[id];
                    sum / (prev.opinions.len() - 1) as f64
                })
                .collect();
            for (id, &opinion) in next.opinions.iter().enumerate() {
                assert_ne!(opinion, prev.opinions[id]);
                assert!((opinion - averaged[id]).abs() > 1e-12);
            }
        }
    }

    #[test]
    fn full_tolerance_reaches_consensus() {
        let mut cfg = test_config(3, 1, 0);
        cfg.model.mu = 0.0;
        let pop = Population::from_values([(0.1, 1.0), (0.5, 1.0), (0.8, 1.0)]).unwrap();
        let mut engine = Engine::with_population(cfg, pop);

        let records = run(&mut engine);
        assert_eq!(records[0].opinions, vec![0.65, 0.45, 0.3]);

        let mut n_ticks = 1;
        loop {
            let opinions = engine.pop().opinions();
            let spread = opinions.iter().cloned().fold(f64::MIN, f64::max)
                - opinions.iter().cloned().fold(f64::MAX, f64::min);
            if spread < 1e-9 {
                assert!((opinions[0] - 1.4 / 3.0).abs() < 1e-9);
                break;
            }
            assert!(n_ticks < 64, "no consensus after {n_ticks} ticks");
            run(&mut engine);
            n_ticks += 1;
        }
    }

    #[test]
    fn sequential_scheme_reads_live_opinions() {
        let mut cfg = test_config(3, 1, 0);
        cfg.model.mu = 0.0;
        let values = [(0.1, 1.0), (0.5, 1.0), (0.8, 1.0)];

        let pop = Population::from_values(values).unwrap();

        let mut sync = Engine::with_population(cfg.clone(), pop.clone());
        cfg.model.update = UpdateScheme::Sequential;
        let mut seq = Engine::with_population(cfg, pop);

        let sync_opinions = run(&mut sync).remove(0).opinions;
        let seq_opinions = run(&mut seq).remove(0).opinions;
        assert_ne!(sync_opinions, seq_opinions);

        // The first agent in the shuffled order only sees start-of-tick opinions.
        assert!(
            sync_opinions
                .iter()
                .zip(&seq_opinions)
                .any(|(a, b)| a == b)
        );
    }

    #[test]
    fn checkpoint_resumes_same_trajectory() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("checkpoint.msgpack");

        let mut straight = Engine::generate_initial_condition(test_config(30, 10, 2)).unwrap();
        run(&mut straight);
        let expected = run(&mut straight);

        let mut first = Engine::generate_initial_condition(test_config(30, 10, 2)).unwrap();
        run(&mut first);
        first.save_checkpoint(&file).unwrap();
        let mut resumed = Engine::load_checkpoint(&file).unwrap();
        assert_eq!(resumed.cfg(), first.cfg());
        assert_eq!(resumed.tick(), 10);
        assert_eq!(run(&mut resumed), expected);
    }
}
