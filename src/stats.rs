//! Chain diagnostics and posterior summaries.
//!
//! Covers the running per-chain statistics shown on progress bars, the potential
//! scale reduction factor across chains, autocorrelation, batch-means variance
//! estimation and percentile-based credible intervals.

use std::collections::VecDeque;

use ndarray::prelude::*;
use ndarray_stats::QuantileExt;
use num_traits::{FromPrimitive, Num, ToPrimitive};
use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

use crate::error::{McmcError, Result};

/// Width of the rolling window used for the acceptance estimate.
const ACCEPT_WINDOW: usize = 100;

#[derive(Debug, Clone, PartialEq)]
pub struct ChainTracker<T> {
    n_params: usize,
    n: u64,
    n_accepted: usize,
    mean: Array1<f64>,    // n_params
    mean_sq: Array1<f64>, // n_params
    last_state: Vec<T>,
    accept_queue: VecDeque<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChainStats {
    pub n: u64,
    /// Share of the last [`ACCEPT_WINDOW`] steps that moved the chain.
    pub p_accept: f64,
    pub mean: Array1<f64>, // n_params
    pub sm2: Array1<f64>,  // n_params
}

impl<T: Clone + PartialEq + ToPrimitive> ChainTracker<T> {
    pub fn new(n_params: usize, initial_state: &[T]) -> Self {
        Self {
            n_params,
            n: 0,
            n_accepted: 0,
            mean: Array1::zeros(n_params),
            mean_sq: Array1::zeros(n_params),
            last_state: initial_state.to_vec(),
            accept_queue: VecDeque::with_capacity(ACCEPT_WINDOW + 1),
        }
    }

    /// Folds the chain's newest state into the running statistics.
    pub fn step(&mut self, x: &[T]) -> Result<()> {
        if x.len() != self.n_params {
            return Err(McmcError::InvalidInput(format!(
                "tracker expects {} parameters, got {}",
                self.n_params,
                x.len()
            )));
        }
        self.n += 1;

        let accepted = self.last_state.as_slice() != x;
        self.accept_queue.push_back(accepted);
        self.n_accepted += accepted as usize;
        if self.accept_queue.len() > ACCEPT_WINDOW {
            if let Some(true) = self.accept_queue.pop_front() {
                self.n_accepted -= 1;
            }
        }
        self.last_state.clone_from_slice(x);

        let n = self.n as f64;
        let x_arr: Array1<f64> = x
            .iter()
            .map(|v| v.to_f64().unwrap_or(f64::NAN))
            .collect();

        self.mean = (&self.mean * (n - 1.0) + &x_arr) / n;
        self.mean_sq = (&self.mean_sq * (n - 1.0) + x_arr.pow2()) / n;

        Ok(())
    }

    pub fn p_accept(&self) -> f64 {
        if self.accept_queue.is_empty() {
            return 0.0;
        }
        self.n_accepted as f64 / self.accept_queue.len() as f64
    }

    /// Unbiased running variance estimate per parameter.
    pub fn sm2(&self) -> Array1<f64> {
        let n = self.n as f64;
        (&self.mean_sq - self.mean.pow2()) * n / (n - 1.0)
    }

    pub fn stats(&self) -> ChainStats {
        ChainStats {
            n: self.n,
            p_accept: self.p_accept(),
            mean: self.mean.clone(),
            sm2: self.sm2(),
        }
    }
}

/// Streaming potential scale reduction factor (R-hat) over several chains.
#[derive(Debug, Clone, PartialEq)]
pub struct RhatMulti {
    n: usize,
    mean: Array2<f64>,    // n_chains x n_params
    mean_sq: Array2<f64>, // n_chains x n_params
    n_chains: usize,
    n_params: usize,
}

impl RhatMulti {
    pub fn new(n_chains: usize, n_params: usize) -> Self {
        Self {
            n: 0,
            mean: Array2::<f64>::zeros((n_chains, n_params)),
            mean_sq: Array2::<f64>::zeros((n_chains, n_params)),
            n_chains,
            n_params,
        }
    }

    /// Adds one draw per chain; `x` is laid out chains-major (`n_chains × n_params`).
    pub fn step<T>(&mut self, x: &[T]) -> Result<()>
    where
        T: Num + ToPrimitive + FromPrimitive + Clone + PartialOrd,
    {
        self.n += 1;

        let n = self.n as f64;
        let x_arr = ArrayView2::<T>::from_shape((self.n_chains, self.n_params), x)?
            .mapv(|x| x.to_f64().unwrap_or(f64::NAN));

        self.mean = (&self.mean * (n - 1.0) + &x_arr) / n;
        self.mean_sq = (&self.mean_sq * (n - 1.0) + x_arr.pow2()) / n;
        Ok(())
    }

    pub fn all(&self) -> Result<Array1<f64>> {
        let mean_chain = self.mean.mean_axis(Axis(0)).ok_or_else(|| {
            McmcError::InvalidInput("R-hat needs at least one chain".to_string())
        })?;
        let n_chains = self.n_chains as f64;
        let n = self.n as f64;
        let fac = n / (n_chains - 1.0);
        let between = (&self.mean - &mean_chain.insert_axis(Axis(0)))
            .pow2()
            .sum_axis(Axis(0))
            * fac;
        let sm2 = (&self.mean_sq - self.mean.pow2()) * n / (n - 1.0);
        let within = sm2.mean_axis(Axis(0)).ok_or_else(|| {
            McmcError::InvalidInput("R-hat needs at least one chain".to_string())
        })?;
        let var = &within * ((n - 1.0) / n) + between * (1.0 / n);
        Ok((var / within).sqrt())
    }

    pub fn max(&self) -> Result<f64> {
        let all = self.all()?;
        Ok(*all.max()?)
    }
}

/// R-hat per parameter for draws shaped `chains × samples × params`.
pub fn rhat(samples: &Array3<f64>) -> Result<Array1<f64>> {
    let (n_chains, n_samples, n_params) = samples.dim();
    if n_chains < 2 || n_samples < 2 {
        return Err(McmcError::InvalidInput(format!(
            "R-hat needs at least 2 chains of 2 draws, got {n_chains} chains of {n_samples}"
        )));
    }
    let mut psr = RhatMulti::new(n_chains, n_params);
    for draw in samples.axis_iter(Axis(1)) {
        let flat: Vec<f64> = draw.iter().copied().collect();
        psr.step(&flat)?;
    }
    psr.all()
}

/// Fraction of successive draws that differ, i.e. the observed acceptance rate of
/// a Metropolis–Hastings chain.
pub fn acceptance_rate(samples: &[f64]) -> Result<f64> {
    if samples.len() < 2 {
        return Err(McmcError::InvalidInput(
            "acceptance rate needs at least two draws".to_string(),
        ));
    }
    let moves = samples.windows(2).filter(|w| w[1] != w[0]).count();
    Ok(moves as f64 / (samples.len() - 1) as f64)
}

/// Means of the `floor(n / b)` consecutive full batches of length `b`.
pub fn batch_means(x: &[f64], b: usize) -> Result<Array1<f64>> {
    if b == 0 || x.len() < b {
        return Err(McmcError::InvalidInput(format!(
            "batch length {b} does not fit {} draws",
            x.len()
        )));
    }
    Ok(x.chunks_exact(b)
        .map(|batch| batch.iter().sum::<f64>() / b as f64)
        .collect())
}

/// Batch-means estimate of the asymptotic variance: `b` times the sample variance
/// of the batch means.
pub fn batch_means_variance(x: &[f64], b: usize) -> Result<f64> {
    let means = batch_means(x, b)?;
    if means.len() < 2 {
        return Err(McmcError::InvalidInput(format!(
            "batch length {b} leaves fewer than two batches"
        )));
    }
    Ok(b as f64 * means.var(1.0))
}

/// Normalized autocorrelation for lags `0..=max_lag`, computed with an FFT.
pub fn autocorrelation(x: &[f64], max_lag: usize) -> Result<Array1<f64>> {
    let n = x.len();
    if n < 2 || max_lag >= n {
        return Err(McmcError::InvalidInput(format!(
            "lag {max_lag} needs more than {n} draws"
        )));
    }
    let mean = x.iter().sum::<f64>() / n as f64;
    let size = (2 * n).next_power_of_two();

    let mut buf: Vec<Complex<f64>> = x
        .iter()
        .map(|v| Complex::new(v - mean, 0.0))
        .chain(std::iter::repeat(Complex::new(0.0, 0.0)))
        .take(size)
        .collect();

    let mut planner = FftPlanner::<f64>::new();
    planner.plan_fft_forward(size).process(&mut buf);
    buf.iter_mut()
        .for_each(|c| *c = Complex::new(c.norm_sqr(), 0.0));
    planner.plan_fft_inverse(size).process(&mut buf);

    let c0 = buf[0].re;
    if c0 <= f64::EPSILON * size as f64 {
        return Err(McmcError::InvalidInput(
            "autocorrelation of a constant series is undefined".to_string(),
        ));
    }
    Ok((0..=max_lag).map(|k| buf[k].re / c0).collect())
}

/// `q`-th percentile (0..=100) with linear interpolation between order statistics.
pub fn percentile(x: &[f64], q: f64) -> Result<f64> {
    if x.is_empty() {
        return Err(McmcError::InvalidInput(
            "percentile of an empty sample".to_string(),
        ));
    }
    if !(0.0..=100.0).contains(&q) {
        return Err(McmcError::InvalidInput(format!(
            "percentile {q} outside [0, 100]"
        )));
    }
    let mut sorted = x.to_vec();
    sorted.sort_unstable_by(f64::total_cmp);

    let pos = q / 100.0 * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    Ok(sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64))
}

/// Posterior mean and equal-tailed credible interval of a set of draws.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PosteriorSummary {
    pub mean: f64,
    pub lower: f64,
    pub upper: f64,
    pub level: f64,
}

impl PosteriorSummary {
    /// Summarizes `draws` with a `level` (e.g. `0.9`) credible interval.
    pub fn from_draws(draws: &[f64], level: f64) -> Result<Self> {
        if !(level > 0.0 && level < 1.0) {
            return Err(McmcError::InvalidInput(format!(
                "credible level {level} outside (0, 1)"
            )));
        }
        let tail = 50.0 * (1.0 - level);
        let lower = percentile(draws, tail)?;
        let upper = percentile(draws, 100.0 - tail)?;
        Ok(Self {
            mean: draws.iter().sum::<f64>() / draws.len() as f64,
            lower,
            upper,
            level,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::f64;

    use super::*;
    use approx::assert_abs_diff_eq;

    fn run_rhat_test_generic<T>(data0: Array2<T>, data1: Array2<T>, expected: Array1<f64>, tol: f64)
    where
        T: ndarray::NdFloat + num_traits::FromPrimitive,
    {
        let mut psr = RhatMulti::new(3, 4);
        psr.step(data0.as_slice().unwrap()).unwrap();
        psr.step(data1.as_slice().unwrap()).unwrap();
        let rhat = psr.all().unwrap();
        let diff = *(rhat.clone() - expected.clone()).abs().max().unwrap();
        assert!(
            diff < tol,
            "Mismatch in Rhat. Got {:?}, expected {:?}, diff = {:?}",
            rhat,
            expected,
            diff
        );
    }

    #[test]
    fn test_rhat_f64_1() {
        let data_step_0 = arr2(&[
            [0.0, 1.0, 0.0, 1.0], // chain 0
            [1.0, 2.0, 0.0, 2.0], // chain 1
            [0.0, 0.0, 0.0, 2.0], // chain 2
        ]);
        let data_step_1 = arr2(&[
            [1.0, 2.0, 2.0, 0.0], // chain 0
            [1.0, 1.0, 1.0, 1.0], // chain 1
            [0.0, 1.0, 0.0, 0.0], // chain 2
        ]);
        let expected = array![f64::consts::SQRT_2, 1.08012345, 0.89442719, 0.8660254];
        run_rhat_test_generic(data_step_0, data_step_1, expected, 1e-7);
    }

    #[test]
    fn test_rhat_f32_data() {
        let data_step_0 = arr2(&[
            [1.0f32, 0.0, 0.0, 1.0],
            [1.0, 0.0, 0.0, 1.0],
            [0.0, 1.0, 0.0, 2.0],
        ]);
        let data_step_1 = arr2(&[
            [1.0f32, 2.0, 0.0, 2.0],
            [1.0, 2.0, 0.0, 0.0],
            [2.0, 0.0, 1.0, 2.0],
        ]);
        let expected = array![f64::consts::FRAC_1_SQRT_2, 0.74535599, 1.0, 1.5];
        run_rhat_test_generic(data_step_0, data_step_1, expected, 1e-6);
    }

    #[test]
    fn rhat_from_array3_matches_streaming() {
        // chains × samples × params, same numbers as test_rhat_f64_1
        let samples = Array3::from_shape_fn((3, 2, 4), |(c, s, p)| {
            let steps = [
                [[0.0, 1.0, 0.0, 1.0], [1.0, 2.0, 0.0, 2.0], [0.0, 0.0, 0.0, 2.0]],
                [[1.0, 2.0, 2.0, 0.0], [1.0, 1.0, 1.0, 1.0], [0.0, 1.0, 0.0, 0.0]],
            ];
            steps[s][c][p]
        });
        let r = rhat(&samples).unwrap();
        assert_abs_diff_eq!(r[0], f64::consts::SQRT_2, epsilon = 1e-7);
        assert_abs_diff_eq!(r[3], 0.8660254, epsilon = 1e-7);
    }

    #[test]
    fn rhat_needs_two_chains() {
        let samples = Array3::<f64>::zeros((1, 10, 2));
        assert!(rhat(&samples).is_err());
    }

    #[test]
    fn tracker_counts_moves_as_accepts() {
        let mut tracker = ChainTracker::new(1, &[0.0]);
        tracker.step(&[1.0]).unwrap();
        tracker.step(&[1.0]).unwrap();
        tracker.step(&[2.0]).unwrap();
        tracker.step(&[2.0]).unwrap();
        let stats = tracker.stats();
        assert_eq!(stats.n, 4);
        assert_abs_diff_eq!(stats.p_accept, 0.5);
        assert_abs_diff_eq!(stats.mean[0], 1.5);
        // sample variance of [1, 1, 2, 2]
        assert_abs_diff_eq!(stats.sm2[0], 1.0 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn tracker_window_forgets_old_moves() {
        let mut tracker = ChainTracker::new(1, &[0.0]);
        for i in 0..ACCEPT_WINDOW {
            tracker.step(&[i as f64 + 1.0]).unwrap();
        }
        assert_abs_diff_eq!(tracker.p_accept(), 1.0);
        for _ in 0..ACCEPT_WINDOW {
            tracker.step(&[-1.0]).unwrap();
        }
        // Only the first step of the second run moved.
        assert_abs_diff_eq!(tracker.p_accept(), 1.0 / ACCEPT_WINDOW as f64);
    }

    #[test]
    fn tracker_rejects_wrong_width() {
        let mut tracker = ChainTracker::new(2, &[0.0, 0.0]);
        assert!(tracker.step(&[1.0]).is_err());
    }

    #[test]
    fn acceptance_rate_counts_changes() {
        let rate = acceptance_rate(&[0.0, 0.0, 1.0, 1.0, 2.0]).unwrap();
        assert_abs_diff_eq!(rate, 0.5);
        assert!(acceptance_rate(&[1.0]).is_err());
    }

    #[test]
    fn batch_means_drop_the_ragged_tail() {
        let x: Vec<f64> = (0..9).map(|i| i as f64).collect();
        let means = batch_means(&x, 2).unwrap();
        assert_eq!(means, array![0.5, 2.5, 4.5, 6.5]);
        // deviations -3, -1, 1, 3 -> variance 20 / 3
        assert_abs_diff_eq!(
            batch_means_variance(&x, 2).unwrap(),
            2.0 * 20.0 / 3.0,
            epsilon = 1e-12
        );
        assert!(batch_means_variance(&x, 5).is_err());
        assert!(batch_means(&x, 0).is_err());
    }

    #[test]
    fn autocorrelation_of_alternating_series() {
        let x: Vec<f64> = (0..100).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        let acf = autocorrelation(&x, 2).unwrap();
        assert_abs_diff_eq!(acf[0], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(acf[1], -0.99, epsilon = 1e-10);
        assert_abs_diff_eq!(acf[2], 0.98, epsilon = 1e-10);
    }

    #[test]
    fn autocorrelation_rejects_constant_series() {
        assert!(autocorrelation(&[3.0; 20], 5).is_err());
        assert!(autocorrelation(&[1.0, 2.0], 2).is_err());
    }

    #[test]
    fn percentile_interpolates_linearly() {
        let x = [4.0, 1.0, 3.0, 2.0, 5.0];
        assert_abs_diff_eq!(percentile(&x, 0.0).unwrap(), 1.0);
        assert_abs_diff_eq!(percentile(&x, 50.0).unwrap(), 3.0);
        assert_abs_diff_eq!(percentile(&x, 100.0).unwrap(), 5.0);
        assert_abs_diff_eq!(percentile(&x, 5.0).unwrap(), 1.2, epsilon = 1e-12);
        assert!(percentile(&x, 101.0).is_err());
        assert!(percentile(&[], 50.0).is_err());
    }

    #[test]
    fn posterior_summary_uses_equal_tails() {
        let draws: Vec<f64> = (0..=100).map(|i| i as f64).collect();
        let summary = PosteriorSummary::from_draws(&draws, 0.9).unwrap();
        assert_abs_diff_eq!(summary.mean, 50.0);
        assert_abs_diff_eq!(summary.lower, 5.0, epsilon = 1e-12);
        assert_abs_diff_eq!(summary.upper, 95.0, epsilon = 1e-12);
        assert!(PosteriorSummary::from_draws(&draws, 1.0).is_err());
    }
}
