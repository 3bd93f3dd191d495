/*!
Targets, full conditionals and the count distribution used by the samplers.

- [`LogTarget`]: an unnormalized log-density on the real line. Any `Fn(f64) -> f64`
  is a target, so a closure can be handed straight to the Metropolis–Hastings chain.
- [`Conditional`]: per-coordinate full conditionals for Gibbs sweeps.
- [`NegativeBinomial`]: number of failures before the `r`-th success.

# Examples

```rust
use recapture_mcmc::distributions::{GaussianMixture, LogTarget, NormalTarget};

let standard = NormalTarget::new(0.0, 1.0).unwrap();
assert_eq!(standard.log_density(0.0), 0.0);

let closure = |x: f64| -x * x / 2.0;
assert_eq!(closure.log_density(2.0), -2.0);

let bimodal = GaussianMixture::course_bimodal();
assert!(bimodal.log_density(3.0) > bimodal.log_density(-3.0));
```
*/

use rand::Rng;
use rand_distr::{Distribution, Gamma, Poisson};
use std::f64::consts::PI;

use crate::error::{McmcError, Result};

/// An unnormalized log-density over the reals.
///
/// Returning `f64::NEG_INFINITY` marks a point outside the support. Returning NaN
/// for finite input is a contract violation; the sampler treats it as a rejection.
pub trait LogTarget {
    fn log_density(&self, x: f64) -> f64;
}

impl<F> LogTarget for F
where
    F: Fn(f64) -> f64,
{
    fn log_density(&self, x: f64) -> f64 {
        self(x)
    }
}

/// Full conditional distributions of a multi-coordinate state.
pub trait Conditional<S> {
    /// Draws coordinate `i` given the rest of the state in `given`.
    fn sample<R: Rng + ?Sized>(&self, i: usize, given: &[S], rng: &mut R) -> Result<S>;
}

/// Normal log-density without its normalizing constant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalTarget {
    pub mean: f64,
    pub sd: f64,
}

impl NormalTarget {
    pub fn new(mean: f64, sd: f64) -> Result<Self> {
        if !(sd > 0.0 && sd.is_finite()) || !mean.is_finite() {
            return Err(McmcError::domain(
                "Normal",
                format!("mean {mean}, sd {sd}"),
            ));
        }
        Ok(Self { mean, sd })
    }
}

impl LogTarget for NormalTarget {
    fn log_density(&self, x: f64) -> f64 {
        let z = (x - self.mean) / self.sd;
        -0.5 * z * z
    }
}

/// A weighted mixture of normals, evaluated with log-sum-exp so that points far
/// in the tails do not underflow to `-inf`.
#[derive(Debug, Clone, PartialEq)]
pub struct GaussianMixture {
    /// `(weight, mean, sd)` per component; weights sum to one.
    components: Vec<(f64, f64, f64)>,
}

impl GaussianMixture {
    /// Builds a mixture from `(weight, mean, sd)` triples. Weights are normalized.
    pub fn new(components: Vec<(f64, f64, f64)>) -> Result<Self> {
        if components.is_empty() {
            return Err(McmcError::InvalidInput(
                "mixture needs at least one component".to_string(),
            ));
        }
        let mut total = 0.0;
        for &(w, mean, sd) in &components {
            if !(w > 0.0 && w.is_finite()) {
                return Err(McmcError::domain("GaussianMixture", format!("weight {w}")));
            }
            NormalTarget::new(mean, sd)?;
            total += w;
        }
        Ok(Self {
            components: components
                .into_iter()
                .map(|(w, mean, sd)| (w / total, mean, sd))
                .collect(),
        })
    }

    /// `0.3 N(-3, 1) + 0.7 N(3, 1)`.
    pub fn course_bimodal() -> Self {
        Self {
            components: vec![(0.3, -3.0, 1.0), (0.7, 3.0, 1.0)],
        }
    }

    /// Mixture mean.
    pub fn mean(&self) -> f64 {
        self.components.iter().map(|&(w, m, _)| w * m).sum()
    }

    pub fn components(&self) -> &[(f64, f64, f64)] {
        &self.components
    }
}

impl LogTarget for GaussianMixture {
    fn log_density(&self, x: f64) -> f64 {
        let terms: Vec<f64> = self
            .components
            .iter()
            .map(|&(w, mean, sd)| {
                let z = (x - mean) / sd;
                w.ln() - 0.5 * z * z - sd.ln() - 0.5 * (2.0 * PI).ln()
            })
            .collect();
        let max = terms.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if max == f64::NEG_INFINITY {
            return max;
        }
        max + terms.iter().map(|t| (t - max).exp()).sum::<f64>().ln()
    }
}

/// `u64::MAX` rounded up to `2^64` as an `f64`.
const COUNT_LIMIT: f64 = u64::MAX as f64;

/// Negative binomial counting failures before the `r`-th success, with success
/// probability `p`.
///
/// Drawn as a Gamma–Poisson mixture: `λ ~ Gamma(r, (1 - p) / p)`, then
/// `Poisson(λ)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NegativeBinomial {
    r: f64,
    p: f64,
}

impl NegativeBinomial {
    pub fn new(r: f64, p: f64) -> Result<Self> {
        if !(r > 0.0 && r.is_finite()) {
            return Err(McmcError::domain("NegativeBinomial", format!("r = {r}")));
        }
        if !(p > 0.0 && p <= 1.0) {
            return Err(McmcError::domain("NegativeBinomial", format!("p = {p}")));
        }
        Ok(Self { r, p })
    }

    pub fn mean(&self) -> f64 {
        self.r * (1.0 - self.p) / self.p
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<u64> {
        if self.p == 1.0 {
            return Ok(0);
        }
        let scale = (1.0 - self.p) / self.p;
        let gamma =
            Gamma::new(self.r, scale).map_err(|e| McmcError::domain("Gamma", e))?;
        let lambda = gamma.sample(rng);
        if lambda <= 0.0 {
            return Ok(0);
        }
        if !(lambda < COUNT_LIMIT) {
            return Err(McmcError::domain(
                "NegativeBinomial",
                format!("Poisson rate {lambda} exceeds the u64 count range (p = {})", self.p),
            ));
        }
        let poisson = Poisson::new(lambda).map_err(|e| McmcError::domain("Poisson", e))?;
        let draw: f64 = poisson.sample(rng);
        if !(draw.is_finite() && draw < COUNT_LIMIT) {
            return Err(McmcError::domain(
                "NegativeBinomial",
                format!("draw {draw} from Poisson({lambda}) does not fit a u64 count"),
            ));
        }
        Ok(draw as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    #[test]
    fn closures_are_targets() {
        let target = |x: f64| -x * x / 2.0;
        assert_abs_diff_eq!(target.log_density(1.0), -0.5);
    }

    #[test]
    fn normal_target_is_unnormalized() {
        let target = NormalTarget::new(1.0, 2.0).unwrap();
        assert_abs_diff_eq!(target.log_density(1.0), 0.0);
        assert_abs_diff_eq!(target.log_density(5.0), -2.0);
        assert!(NormalTarget::new(0.0, 0.0).is_err());
        assert!(NormalTarget::new(0.0, -1.0).is_err());
    }

    #[test]
    fn mixture_matches_direct_density() {
        let mixture = GaussianMixture::course_bimodal();
        let pdf = |x: f64, m: f64| (-(x - m).powi(2) / 2.0).exp() / (2.0 * PI).sqrt();
        for x in [-4.0, -3.0, 0.0, 1.5, 3.0] {
            let direct = (0.3 * pdf(x, -3.0) + 0.7 * pdf(x, 3.0)).ln();
            assert_abs_diff_eq!(mixture.log_density(x), direct, epsilon = 1e-12);
        }
        assert_abs_diff_eq!(mixture.mean(), 1.2, epsilon = 1e-12);
    }

    #[test]
    fn mixture_stays_finite_far_in_the_tails() {
        let mixture = GaussianMixture::course_bimodal();
        let lp = mixture.log_density(60.0);
        assert!(lp.is_finite());
        assert!(lp < -1000.0);
    }

    #[test]
    fn mixture_normalizes_weights() {
        let mixture = GaussianMixture::new(vec![(3.0, -3.0, 1.0), (7.0, 3.0, 1.0)]).unwrap();
        assert_eq!(mixture, GaussianMixture::course_bimodal());
        assert!(GaussianMixture::new(vec![]).is_err());
        assert!(GaussianMixture::new(vec![(0.0, 0.0, 1.0)]).is_err());
    }

    #[test]
    fn negative_binomial_rejects_bad_parameters() {
        assert!(NegativeBinomial::new(0.0, 0.5).is_err());
        assert!(NegativeBinomial::new(5.0, 0.0).is_err());
        assert!(NegativeBinomial::new(5.0, 1.5).is_err());
        assert!(NegativeBinomial::new(5.0, f64::NAN).is_err());
    }

    #[test]
    fn negative_binomial_certain_success_has_no_failures() {
        let nb = NegativeBinomial::new(105.0, 1.0).unwrap();
        let mut rng = SmallRng::seed_from_u64(1);
        for _ in 0..10 {
            assert_eq!(nb.sample(&mut rng).unwrap(), 0);
        }
    }

    #[test]
    fn negative_binomial_rejects_counts_beyond_u64() {
        let nb = NegativeBinomial::new(1_000.0, 1e-30).unwrap();
        let mut rng = SmallRng::seed_from_u64(9);
        let err = nb.sample(&mut rng).unwrap_err();
        assert!(matches!(
            err,
            McmcError::ParameterDomain {
                distribution: "NegativeBinomial",
                ..
            }
        ));
    }

    #[test]
    fn negative_binomial_sample_mean() {
        let nb = NegativeBinomial::new(105.0, 0.9).unwrap();
        let mut rng = SmallRng::seed_from_u64(42);
        let n = 20_000;
        let total: u64 = (0..n).map(|_| nb.sample(&mut rng).unwrap()).sum();
        let mean = total as f64 / n as f64;
        // mean = 105 * 0.1 / 0.9 ≈ 11.67, sd of the average ≈ 0.027
        assert_abs_diff_eq!(mean, nb.mean(), epsilon = 0.2);
    }
}
