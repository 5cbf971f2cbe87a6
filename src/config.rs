use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fmt::Debug,
    fs,
    ops::{Bound, RangeBounds},
    path::Path,
};
use thiserror::Error;

/// A parameter value outside of its allowed range.
#[derive(Debug, Error)]
#[error("{name} must be in the range {range}, but is {value}")]
pub struct InvalidParameterError {
    pub name: String,
    pub value: String,
    pub range: String,
}

/// How agents read the opinions of others within a tick.
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateScheme {
    /// Every agent reads the opinions as of the start of the tick.
    #[default]
    Synchronous,
    /// Every agent reads the live opinions, including updates made earlier in the same tick.
    Sequential,
}

/// Model parameters.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Lower bound of the tolerance interval.
    pub epsilon_min: f64,
    /// Upper bound of the tolerance interval.
    pub epsilon_max: f64,

    /// First shape parameter of the tolerance Beta distribution.
    pub alpha: f64,
    /// Second shape parameter of the tolerance Beta distribution.
    pub beta: f64,

    /// Probability of a random opinion jump per agent and tick.
    pub mu: f64,

    #[serde(default)]
    pub update: UpdateScheme,
}

/// Initial condition parameters.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct InitConfig {
    /// Number of agents.
    pub num_agents: usize,

    /// Seed of the random number generator (drawn from the OS if absent).
    #[serde(default)]
    pub seed: Option<u64>,
}

/// Output parameters.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Number of ticks performed per run invocation.
    pub num_runs: usize,

    /// Maximum gap between neighboring opinions of the same cluster.
    #[serde(default = "default_cluster_tol")]
    pub cluster_tol: f64,
}

fn default_cluster_tol() -> f64 {
    0.01
}

/// Simulation configuration.
///
/// Loaded from a TOML file and validated before use.
/// See [`Config::from_file`] for loading.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Config {
    pub model: ModelConfig,
    pub init: InitConfig,
    pub output: OutputConfig,
}

impl Config {
    /// Load a [`Config`] from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, deserialized,
    /// or if the configuration values are invalid.
    pub fn from_file<P: AsRef<Path>>(file: P) -> Result<Self> {
        let file = file.as_ref();
        let contents =
            fs::read_to_string(file).with_context(|| format!("failed to read {file:?}"))?;
        Self::from_toml(&contents)
    }

    /// Parse and validate a [`Config`] from a TOML string.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents).context("failed to deserialize config")?;

        config.validate().context("failed to validate config")?;

        Ok(config)
    }

    /// Check every parameter against its allowed range.
    pub fn validate(&self) -> Result<()> {
        let model = &self.model;
        check_num("epsilon_min", model.epsilon_min, 0.0..=1.0)?;
        check_num("epsilon_max", model.epsilon_max, model.epsilon_min..=1.0)?;
        check_num("alpha", model.alpha, (Bound::Excluded(0.0), Bound::Unbounded))?;
        check_num("beta", model.beta, (Bound::Excluded(0.0), Bound::Unbounded))?;
        check_num("mu", model.mu, 0.0..=1.0)?;

        check_num("num_agents", self.init.num_agents, 1..)?;

        check_num("cluster_tol", self.output.cluster_tol, 0.0..=1.0)?;

        Ok(())
    }
}

/// Fail with an [`InvalidParameterError`] unless `num` lies within `range`.
pub fn check_num<T, R>(name: &str, num: T, range: R) -> Result<(), InvalidParameterError>
where
    T: PartialOrd + Debug,
    R: RangeBounds<T> + Debug,
{
    if !range.contains(&num) {
        return Err(InvalidParameterError {
            name: name.to_owned(),
            value: format!("{num:?}"),
            range: format!("{range:?}"),
        });
    }
    Ok(())
}

#[cfg(test)]
pub(crate) fn test_config(num_agents: usize, num_runs: usize, seed: u64) -> Config {
    Config {
        model: ModelConfig {
            epsilon_min: 0.1,
            epsilon_max: 0.4,
            alpha: 2.0,
            beta: 2.0,
            mu: 0.01,
            update: UpdateScheme::Synchronous,
        },
        init: InitConfig {
            num_agents,
            seed: Some(seed),
        },
        output: OutputConfig {
            num_runs,
            cluster_tol: 0.01,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"
[model]
epsilon_min = 0.1
epsilon_max = 0.4
alpha = 2.0
beta = 3.0
mu = 0.01

[init]
num_agents = 100
seed = 7

[output]
num_runs = 50
"#;

    fn invalid_name(err: &anyhow::Error) -> String {
        err.downcast_ref::<InvalidParameterError>()
            .expect("error should be an InvalidParameterError")
            .name
            .clone()
    }

    #[test]
    fn parses_valid_config_with_defaults() {
        let cfg = Config::from_toml(VALID).unwrap();
        assert_eq!(cfg.model.beta, 3.0);
        assert_eq!(cfg.model.update, UpdateScheme::Synchronous);
        assert_eq!(cfg.init.seed, Some(7));
        assert_eq!(cfg.output.num_runs, 50);
        assert_eq!(cfg.output.cluster_tol, 0.01);
    }

    #[test]
    fn parses_sequential_scheme() {
        let contents = VALID.replace("mu = 0.01", "mu = 0.01\nupdate = \"sequential\"");
        let cfg = Config::from_toml(&contents).unwrap();
        assert_eq!(cfg.model.update, UpdateScheme::Sequential);
    }

    #[test]
    fn rejects_inverted_epsilon_interval() {
        let mut cfg = test_config(10, 1, 0);
        cfg.model.epsilon_min = 0.5;
        cfg.model.epsilon_max = 0.4;
        let err = cfg.validate().unwrap_err();
        assert_eq!(invalid_name(&err), "epsilon_max");
    }

    #[test]
    fn rejects_non_positive_shapes() {
        let mut cfg = test_config(10, 1, 0);
        cfg.model.alpha = 0.0;
        assert_eq!(invalid_name(&cfg.validate().unwrap_err()), "alpha");

        let mut cfg = test_config(10, 1, 0);
        cfg.model.beta = -1.0;
        assert_eq!(invalid_name(&cfg.validate().unwrap_err()), "beta");
    }

    #[test]
    fn rejects_empty_population_and_bad_mu() {
        let cfg = test_config(0, 1, 0);
        assert_eq!(invalid_name(&cfg.validate().unwrap_err()), "num_agents");

        let mut cfg = test_config(10, 1, 0);
        cfg.model.mu = 1.5;
        assert_eq!(invalid_name(&cfg.validate().unwrap_err()), "mu");

        let mut cfg = test_config(10, 1, 0);
        cfg.model.mu = f64::NAN;
        assert_eq!(invalid_name(&cfg.validate().unwrap_err()), "mu");
    }

    #[test]
    fn rejects_negative_counts_at_parse_time() {
        for contents in [
            VALID.replace("num_agents = 100", "num_agents = -5"),
            VALID.replace("num_runs = 50", "num_runs = -1"),
        ] {
            let err = Config::from_toml(&contents).unwrap_err();
            assert!(err.chain().any(|cause| cause.is::<toml::de::Error>()));
        }
    }

    #[test]
    fn from_toml_wraps_validation_error() {
        let contents = VALID.replace("num_agents = 100", "num_agents = 0");
        let err = Config::from_toml(&contents).unwrap_err();
        assert!(err.chain().any(|cause| cause.is::<InvalidParameterError>()));
    }
}
