use crate::config::Config;
use crate::recorder::{Record, read_trajectory};
use crate::stats::{Accumulator, TimeSeries, TimeSeriesReport, compute_spread, count_clusters};
use anyhow::{Context, Result};
use rmp_serde::encode;
use serde::{Deserialize, Serialize};
use serde_value::Value;
use std::{collections::BTreeMap, fs::File, io::BufWriter, path::Path};

/// Emergent population-level state.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// A single shared opinion.
    Consensus,
    /// Two opinion clusters.
    Polarization,
    /// More than two opinion clusters.
    Fragmentation,
}

impl Outcome {
    pub fn from_n_clusters(n_clusters: usize) -> Self {
        match n_clusters {
            0 | 1 => Outcome::Consensus,
            2 => Outcome::Polarization,
            _ => Outcome::Fragmentation,
        }
    }
}

pub trait Obs {
    fn update(&mut self, record: &Record) -> Result<()>;
    fn name(&self) -> &'static str;
    fn report(&self) -> Result<Value>;
}

fn to_value<T: Serialize>(report: &T) -> Result<Value> {
    serde_value::to_value(report).context("failed to convert report")
}

/// Time series of a scalar extracted from each record.
pub struct ScalarObs {
    name: &'static str,
    extract: fn(&Record) -> f64,
    time_series: TimeSeries,
}

impl ScalarObs {
    pub fn new(name: &'static str, extract: fn(&Record) -> f64) -> Self {
        Self {
            name,
            extract,
            time_series: TimeSeries::default(),
        }
    }
}

impl Obs for ScalarObs {
    fn update(&mut self, record: &Record) -> Result<()> {
        self.time_series.push((self.extract)(record));
        Ok(())
    }

    fn name(&self) -> &'static str {
        self.name
    }

    fn report(&self) -> Result<Value> {
        to_value(&self.time_series.report())
    }
}

/// Number of opinion clusters per tick and the outcome of the last tick.
pub struct Clusters {
    tol: f64,
    time_series: TimeSeries,
    last_n_clusters: Option<usize>,
}

#[derive(Debug, Serialize)]
struct ClustersReport {
    n_clusters: TimeSeriesReport,
    outcome: Option<Outcome>,
}

impl Clusters {
    pub fn new(tol: f64) -> Self {
        Self {
            tol,
            time_series: TimeSeries::default(),
            last_n_clusters: None,
        }
    }

    pub fn outcome(&self) -> Option<Outcome> {
        self.last_n_clusters.map(Outcome::from_n_clusters)
    }
}

impl Obs for Clusters {
    fn update(&mut self, record: &Record) -> Result<()> {
        let n_clusters = count_clusters(&record.opinions, self.tol);
        self.time_series.push(n_clusters as f64);
        self.last_n_clusters = Some(n_clusters);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "clusters"
    }

    fn report(&self) -> Result<Value> {
        to_value(&ClustersReport {
            n_clusters: self.time_series.report(),
            outcome: self.outcome(),
        })
    }
}

/// Distribution of agent tolerances, which stay fixed during a run.
#[derive(Default)]
pub struct Epsilons {
    acc: Accumulator,
}

impl Obs for Epsilons {
    fn update(&mut self, record: &Record) -> Result<()> {
        if self.acc.n_vals() == 0 {
            for &epsilon in &record.epsilons {
                self.acc.add(epsilon);
            }
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "epsilon"
    }

    fn report(&self) -> Result<Value> {
        to_value(&self.acc.report())
    }
}

pub struct Analyzer {
    obs_ptr_vec: Vec<Box<dyn Obs>>,
    n_records: usize,
}

impl Analyzer {
    pub fn new(cfg: &Config) -> Self {
        let obs_ptr_vec: Vec<Box<dyn Obs>> = vec![
            Box::new(ScalarObs::new("mean_opinion", |r| r.mean_opinion)),
            Box::new(ScalarObs::new("median_opinion", |r| r.median_opinion)),
            Box::new(ScalarObs::new("opinion_spread", |r| {
                compute_spread(&r.opinions)
            })),
            Box::new(Clusters::new(cfg.output.cluster_tol)),
            Box::new(Epsilons::default()),
        ];
        Self {
            obs_ptr_vec,
            n_records: 0,
        }
    }

    pub fn add_record(&mut self, record: &Record) -> Result<()> {
        for obs in &mut self.obs_ptr_vec {
            obs.update(record)
                .with_context(|| format!("failed to update {}", obs.name()))?;
        }
        self.n_records += 1;
        Ok(())
    }

    pub fn add_file<P: AsRef<Path>>(&mut self, file: P) -> Result<()> {
        for record in read_trajectory(file)? {
            self.add_record(&record)?;
        }
        Ok(())
    }

    pub fn n_records(&self) -> usize {
        self.n_records
    }

    pub fn report(&self) -> Result<BTreeMap<&'static str, Value>> {
        self.obs_ptr_vec
            .iter()
            .map(|obs| Ok((obs.name(), obs.report()?)))
            .collect()
    }

    pub fn save_results<P: AsRef<Path>>(&self, file: P) -> Result<()> {
        let file = file.as_ref();
        let file = File::create(file).with_context(|| format!("failed to create {file:?}"))?;
        let mut writer = BufWriter::new(file);

        let report = self.report()?;
        encode::write_named(&mut writer, &report).context("failed to serialize results")?;
        Ok(())
    }
}
