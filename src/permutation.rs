/*!
Permutation and randomization tests.

A two-sample permutation test pools both samples, reshuffles the pooled values
`n_perm` times and recomputes the statistic on each relabelled split. A
randomization test keeps `x` fixed and shuffles `y`, which breaks any pairing
between them. Both report the one-sided p-value

`p = (1 + #{null statistic ≥ observed}) / (n_perm + 1)`,

counting the observed statistic as one member of the null set.

```rust
use recapture_mcmc::permutation::{mean_difference, permutation_test};

let treated = [24.0, 43.0, 58.0, 71.0, 61.0, 44.0];
let control = [42.0, 43.0, 55.0, 26.0, 33.0, 41.0];
let result = permutation_test(&treated, &control, mean_difference, 999, 42).unwrap();
assert_eq!(result.null_distribution.len(), 999);
assert!(result.p_value >= 1.0 / 1000.0 && result.p_value <= 1.0);
```
*/

use ndarray::ArrayView1;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::error::{McmcError, Result};

/// Outcome of a permutation or randomization test.
#[derive(Debug, Clone, PartialEq)]
pub struct PermutationResult {
    /// Statistic on the data as observed.
    pub observed: f64,
    /// Statistic on each reshuffled data set.
    pub null_distribution: Vec<f64>,
    /// One-sided p-value for "at least as large as observed".
    pub p_value: f64,
}

impl PermutationResult {
    fn from_null(observed: f64, null_distribution: Vec<f64>) -> Self {
        let exceed = null_distribution.iter().filter(|&&s| s >= observed).count();
        let p_value = (1 + exceed) as f64 / (null_distribution.len() + 1) as f64;
        Self {
            observed,
            null_distribution,
            p_value,
        }
    }
}

fn check_replicates(n_perm: usize) -> Result<()> {
    if n_perm == 0 {
        return Err(McmcError::InvalidInput(
            "number of permutations must be at least 1".to_string(),
        ));
    }
    Ok(())
}

fn check_observed(observed: f64) -> Result<f64> {
    if !observed.is_finite() {
        return Err(McmcError::InvalidInput(format!(
            "observed statistic is {observed}"
        )));
    }
    Ok(observed)
}

/// Two-sample permutation test of `statistic(x, y)` against random relabelling of
/// the pooled values.
pub fn permutation_test<F>(
    x: &[f64],
    y: &[f64],
    statistic: F,
    n_perm: usize,
    seed: u64,
) -> Result<PermutationResult>
where
    F: Fn(&[f64], &[f64]) -> f64,
{
    if x.is_empty() || y.is_empty() {
        return Err(McmcError::InvalidInput(format!(
            "samples of sizes {} and {}; both must be non-empty",
            x.len(),
            y.len()
        )));
    }
    check_replicates(n_perm)?;
    let observed = check_observed(statistic(x, y))?;

    let mut rng = SmallRng::seed_from_u64(seed);
    let mut pooled = [x, y].concat();
    let null_distribution = (0..n_perm)
        .map(|_| {
            pooled.shuffle(&mut rng);
            let (new_x, new_y) = pooled.split_at(x.len());
            statistic(new_x, new_y)
        })
        .collect();
    Ok(PermutationResult::from_null(observed, null_distribution))
}

/// Randomization test of `statistic(x, y)` for paired data: `x` stays fixed while
/// `y` is shuffled.
pub fn randomization_test<F>(
    x: &[f64],
    y: &[f64],
    statistic: F,
    n_perm: usize,
    seed: u64,
) -> Result<PermutationResult>
where
    F: Fn(&[f64], &[f64]) -> f64,
{
    if x.is_empty() || x.len() != y.len() {
        return Err(McmcError::InvalidInput(format!(
            "paired samples of sizes {} and {}",
            x.len(),
            y.len()
        )));
    }
    check_replicates(n_perm)?;
    let observed = check_observed(statistic(x, y))?;

    let mut rng = SmallRng::seed_from_u64(seed);
    let mut shuffled = y.to_vec();
    let null_distribution = (0..n_perm)
        .map(|_| {
            shuffled.shuffle(&mut rng);
            statistic(x, &shuffled)
        })
        .collect();
    Ok(PermutationResult::from_null(observed, null_distribution))
}

fn mean(x: &[f64]) -> f64 {
    ArrayView1::from(x).mean().unwrap_or(f64::NAN)
}

fn sample_variance(x: &[f64]) -> f64 {
    if x.len() < 2 {
        return f64::NAN;
    }
    ArrayView1::from(x).var(1.0)
}

/// `mean(x) - mean(y)`.
pub fn mean_difference(x: &[f64], y: &[f64]) -> f64 {
    mean(x) - mean(y)
}

/// Welch's unequal-variance t statistic. NaN when either sample has fewer than
/// two values.
pub fn welch_t(x: &[f64], y: &[f64]) -> f64 {
    let se2 = sample_variance(x) / x.len() as f64 + sample_variance(y) / y.len() as f64;
    mean_difference(x, y) / se2.sqrt()
}

/// Two-sample Kolmogorov–Smirnov statistic `sup |F_x - F_y|`.
pub fn ks_statistic(x: &[f64], y: &[f64]) -> f64 {
    if x.is_empty() || y.is_empty() {
        return f64::NAN;
    }
    let mut a = x.to_vec();
    let mut b = y.to_vec();
    a.sort_by(f64::total_cmp);
    b.sort_by(f64::total_cmp);
    let (na, nb) = (a.len() as f64, b.len() as f64);

    let (mut i, mut j) = (0, 0);
    let mut d = 0.0_f64;
    while i < a.len() && j < b.len() {
        let v = a[i].min(b[j]);
        while i < a.len() && a[i] <= v {
            i += 1;
        }
        while j < b.len() && b[j] <= v {
            j += 1;
        }
        d = d.max((i as f64 / na - j as f64 / nb).abs());
    }
    d
}

/// Pearson correlation of paired samples.
pub fn pearson_correlation(x: &[f64], y: &[f64]) -> f64 {
    if x.len() != y.len() || x.len() < 2 {
        return f64::NAN;
    }
    let (mx, my) = (mean(x), mean(y));
    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (&a, &b) in x.iter().zip(y) {
        sxy += (a - mx) * (b - my);
        sxx += (a - mx) * (a - mx);
        syy += (b - my) * (b - my);
    }
    sxy / (sxx * syy).sqrt()
}
