use serde::{Deserialize, Serialize};

/// Running mean and variance (Welford).
#[derive(Default)]
pub struct Accumulator {
    n_vals: usize,
    mean: f64,
    diff_2_sum: f64,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct AccumulatorReport {
    pub mean: f64,
    pub std_dev: f64,
}

impl Accumulator {
    pub fn add(&mut self, val: f64) {
        self.n_vals += 1;

        let diff_a = val - self.mean;
        self.mean += diff_a / self.n_vals as f64;

        let diff_b = val - self.mean;
        self.diff_2_sum += diff_a * diff_b;
    }

    pub fn n_vals(&self) -> usize {
        self.n_vals
    }

    pub fn report(&self) -> AccumulatorReport {
        AccumulatorReport {
            mean: if self.n_vals > 0 { self.mean } else { f64::NAN },
            std_dev: if self.n_vals > 1 {
                (self.diff_2_sum / (self.n_vals as f64 - 1.0)).sqrt()
            } else {
                f64::NAN
            },
        }
    }
}

/// Per-tick observable whose statistics are computed after discarding the transient.
#[derive(Default)]
pub struct TimeSeries {
    vals: Vec<f64>,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesReport {
    pub mean: f64,
    pub std_dev: f64,
    pub sem: f64,
    pub is_equil: bool,
    pub last: f64,
}

impl TimeSeries {
    pub fn push(&mut self, val: f64) {
        self.vals.push(val);
    }

    pub fn report(&self) -> TimeSeriesReport {
        let last = self.vals.last().copied().unwrap_or(f64::NAN);
        if self.vals.is_empty() {
            return TimeSeriesReport {
                mean: f64::NAN,
                std_dev: f64::NAN,
                sem: f64::NAN,
                is_equil: false,
                last,
            };
        }
        let i_equil = compute_opt_i_equil(&self.vals);
        let equil_vals = &self.vals[i_equil..];
        TimeSeriesReport {
            mean: compute_mean(equil_vals),
            std_dev: compute_var(equil_vals).sqrt(),
            sem: compute_sem(equil_vals),
            is_equil: i_equil != self.vals.len() / 2,
            last,
        }
    }
}

pub fn compute_mean(vals: &[f64]) -> f64 {
    if vals.is_empty() {
        return f64::NAN;
    }
    vals.iter().sum::<f64>() / vals.len() as f64
}

/// Median, averaging the two middle values for even lengths.
pub fn compute_median(vals: &[f64]) -> f64 {
    if vals.is_empty() {
        return f64::NAN;
    }
    let mut sorted = vals.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

fn compute_var(vals: &[f64]) -> f64 {
    let n_vals = vals.len();
    if n_vals < 2 {
        return f64::NAN;
    }
    let mean = compute_mean(vals);
    vals.iter().map(|&val| (val - mean).powi(2)).sum::<f64>() / (n_vals - 1) as f64
}

/// Sample standard deviation of a set of values (zero for fewer than two).
pub fn compute_spread(vals: &[f64]) -> f64 {
    if vals.len() < 2 {
        return 0.0;
    }
    compute_var(vals).sqrt()
}

/// Standard error of the mean by Flyvbjerg-Petersen blocking.
fn compute_sem(vals: &[f64]) -> f64 {
    let mut blk_vals = vals.to_vec();
    let mut n_vals = blk_vals.len();
    let mut sem2_ests = Vec::new();
    let mut sem2_errs = Vec::new();

    while n_vals >= 2 {
        let sem2_est = compute_var(&blk_vals) / n_vals as f64;
        let sem2_err = sem2_est * (2.0 / (n_vals as f64 - 1.0)).sqrt();
        sem2_ests.push(sem2_est);
        sem2_errs.push(sem2_err);

        blk_vals = blk_vals
            .chunks_exact(2)
            .map(|pair| (pair[0] + pair[1]) / 2.0)
            .collect();
        n_vals = blk_vals.len();
    }

    for (idx, &sem2_est) in sem2_ests.iter().enumerate() {
        let max_low = sem2_ests[idx..]
            .iter()
            .zip(&sem2_errs[idx..])
            .map(|(s, e)| s - e)
            .fold(f64::NEG_INFINITY, f64::max);

        if sem2_est > max_low {
            return sem2_est.sqrt();
        }
    }

    sem2_ests.last().copied().unwrap_or(f64::NAN).sqrt()
}

/// Equilibration index minimizing the marginal standard error.
fn compute_opt_i_equil(vals: &[f64]) -> usize {
    let n_vals = vals.len();
    let mut opt_i_equil = n_vals / 2;
    if n_vals < 2 {
        return opt_i_equil;
    }
    let mut min_mse = f64::INFINITY;
    let n_idxs = n_vals.ilog2() + 1;

    for idx in 0..n_idxs {
        let i_equil = n_vals / 2_usize.pow(n_idxs - idx);
        let tail = &vals[i_equil..];
        let n_tail = tail.len();

        let mse = compute_var(tail) * (n_tail - 1) as f64 / n_tail.pow(2) as f64;
        if mse < min_mse {
            min_mse = mse;
            opt_i_equil = i_equil;
        }
    }

    opt_i_equil
}

/// Number of opinion clusters: maximal runs of sorted values whose gaps are at most `tol`.
pub fn count_clusters(vals: &[f64], tol: f64) -> usize {
    if vals.is_empty() {
        return 0;
    }
    let mut sorted = vals.to_vec();
    sorted.sort_by(f64::total_cmp);
    1 + sorted.windows(2).filter(|pair| pair[1] - pair[0] > tol).count()
}
