//! Per-tick recording of the population state.

use crate::model::Population;
use crate::stats::{compute_mean, compute_median};
use anyhow::{Context, Result};
use rmp_serde::{decode, encode};
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufRead, BufReader, BufWriter, ErrorKind, Read, Write},
    path::Path,
};

/// Record of the population at the end of a tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Number of ticks performed since the initial condition.
    pub tick: usize,

    pub mean_opinion: f64,
    pub median_opinion: f64,

    /// Opinions, indexed by agent id.
    pub opinions: Vec<f64>,

    /// Perturbation probability.
    pub mu: f64,

    /// Tolerances, indexed by agent id.
    pub epsilons: Vec<f64>,
}

impl Record {
    pub fn new(tick: usize, pop: &Population, mu: f64) -> Self {
        let opinions = pop.opinions();
        Self {
            tick,
            mean_opinion: compute_mean(&opinions),
            median_opinion: compute_median(&opinions),
            opinions,
            mu,
            epsilons: pop.epsilons(),
        }
    }
}

/// Sink for the population state, invoked once after every tick.
pub trait Recorder {
    fn collect(&mut self, tick: usize, pop: &Population, mu: f64) -> Result<()>;
}

impl Recorder for Vec<Record> {
    fn collect(&mut self, tick: usize, pop: &Population, mu: f64) -> Result<()> {
        self.push(Record::new(tick, pop, mu));
        Ok(())
    }
}

/// Recorder streaming MessagePack-encoded records to a file.
pub struct TrajectoryWriter {
    writer: BufWriter<File>,
    n_records: usize,
}

impl TrajectoryWriter {
    pub fn create<P: AsRef<Path>>(file: P) -> Result<Self> {
        let file = file.as_ref();
        let file = File::create(file).with_context(|| format!("failed to create {file:?}"))?;
        Ok(Self {
            writer: BufWriter::new(file),
            n_records: 0,
        })
    }

    pub fn n_records(&self) -> usize {
        self.n_records
    }

    pub fn finish(mut self) -> Result<()> {
        self.writer
            .flush()
            .context("failed to flush writer stream")?;
        Ok(())
    }
}

impl Recorder for TrajectoryWriter {
    fn collect(&mut self, tick: usize, pop: &Population, mu: f64) -> Result<()> {
        let record = Record::new(tick, pop, mu);
        encode::write(&mut self.writer, &record).context("failed to serialize record")?;
        self.n_records += 1;
        Ok(())
    }
}

/// Read every record of a trajectory file.
pub fn read_trajectory<P: AsRef<Path>>(file: P) -> Result<Vec<Record>> {
    let file = file.as_ref();
    let file = File::open(file).with_context(|| format!("failed to open {file:?}"))?;
    let mut reader = BufReader::new(file);

    let mut records = Vec::new();
    while !at_eof(&mut reader)? {
        let record = decode::from_read(&mut reader).context("failed to deserialize record")?;
        records.push(record);
    }
    Ok(records)
}

fn at_eof<R: Read>(reader: &mut BufReader<R>) -> Result<bool> {
    match reader.fill_buf() {
        Ok(buf) => Ok(buf.is_empty()),
        Err(error) if error.kind() == ErrorKind::Interrupted => at_eof(reader),
        Err(error) => Err(error).context("failed to read trajectory"),
    }
}
