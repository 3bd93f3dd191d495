/*!
Closed-form conjugate updates: Beta prior with a binomial likelihood, and a normal
prior on the mean of normal data with known variance.

```rust
use recapture_mcmc::conjugate::BetaBinomial;

// Beta(2, 2) prior, 13 heads in 20 tosses.
let posterior = BetaBinomial::new(2.0, 2.0).unwrap().update(20, 13).unwrap();
assert_eq!((posterior.alpha, posterior.beta), (15.0, 9.0));
assert!((posterior.mean() - 0.625).abs() < 1e-12);
```
*/

use rand::Rng;
use rand_distr::{Beta, Distribution};
use statrs::distribution::{Beta as BetaLaw, ContinuousCDF, Normal};

use crate::error::{McmcError, Result};

/// Rejects a credible level outside `(0, 1)` and returns the mass left in each tail.
fn tail_mass(level: f64) -> Result<f64> {
    if !(level > 0.0 && level < 1.0) {
        return Err(McmcError::InvalidInput(format!(
            "credible level {level} outside (0, 1)"
        )));
    }
    Ok(0.5 * (1.0 - level))
}

/// A Beta(alpha, beta) distribution over a success probability.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BetaBinomial {
    pub alpha: f64,
    pub beta: f64,
}

impl BetaBinomial {
    pub fn new(alpha: f64, beta: f64) -> Result<Self> {
        if !(alpha > 0.0 && beta > 0.0 && alpha.is_finite() && beta.is_finite()) {
            return Err(McmcError::domain(
                "Beta",
                format!("alpha = {alpha}, beta = {beta}"),
            ));
        }
        Ok(Self { alpha, beta })
    }

    /// Posterior after `successes` out of `trials`: `Beta(x + α, n - x + β)`.
    pub fn update(&self, trials: u64, successes: u64) -> Result<Self> {
        if successes > trials {
            return Err(McmcError::InvalidInput(format!(
                "{successes} successes out of {trials} trials"
            )));
        }
        Self::new(
            self.alpha + successes as f64,
            self.beta + (trials - successes) as f64,
        )
    }

    pub fn mean(&self) -> f64 {
        self.alpha / (self.alpha + self.beta)
    }

    pub fn variance(&self) -> f64 {
        let s = self.alpha + self.beta;
        self.alpha * self.beta / (s * s * (s + 1.0))
    }

    fn law(&self) -> Result<BetaLaw> {
        BetaLaw::new(self.alpha, self.beta).map_err(|e| McmcError::domain("Beta", e))
    }

    pub fn cdf(&self, x: f64) -> Result<f64> {
        Ok(self.law()?.cdf(x))
    }

    /// Inverse CDF.
    pub fn quantile(&self, p: f64) -> Result<f64> {
        if !(0.0..=1.0).contains(&p) {
            return Err(McmcError::InvalidInput(format!(
                "probability {p} outside [0, 1]"
            )));
        }
        Ok(self.law()?.inverse_cdf(p))
    }

    /// Equal-tailed interval holding `level` of the probability mass.
    pub fn credible_interval(&self, level: f64) -> Result<(f64, f64)> {
        let tail = tail_mass(level)?;
        let law = self.law()?;
        Ok((law.inverse_cdf(tail), law.inverse_cdf(1.0 - tail)))
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<f64> {
        let beta = Beta::new(self.alpha, self.beta).map_err(|e| McmcError::domain("Beta", e))?;
        Ok(beta.sample(rng))
    }
}

/// Normal prior `N(prior_mean, prior_var)` on the mean of normal data with known
/// variance `sigma2`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalNormal {
    pub prior_mean: f64,
    pub prior_var: f64,
    pub sigma2: f64,
}

/// Normal posterior for the mean.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalPosterior {
    pub mean: f64,
    pub var: f64,
}

impl NormalNormal {
    pub fn new(prior_mean: f64, prior_var: f64, sigma2: f64) -> Result<Self> {
        if !(prior_var > 0.0 && sigma2 > 0.0) || !prior_mean.is_finite() {
            return Err(McmcError::domain(
                "Normal",
                format!("prior N({prior_mean}, {prior_var}), data variance {sigma2}"),
            ));
        }
        Ok(Self {
            prior_mean,
            prior_var,
            sigma2,
        })
    }

    /// Precision-weighted combination of the prior and the sample mean of `data`.
    pub fn update(&self, data: &[f64]) -> Result<NormalPosterior> {
        if data.is_empty() {
            return Err(McmcError::InvalidInput(
                "no observations to update on".to_string(),
            ));
        }
        let n = data.len() as f64;
        let xbar = data.iter().sum::<f64>() / n;
        let precision = 1.0 / self.prior_var + n / self.sigma2;
        Ok(NormalPosterior {
            mean: (self.prior_mean / self.prior_var + n * xbar / self.sigma2) / precision,
            var: 1.0 / precision,
        })
    }
}

impl NormalPosterior {
    pub fn sd(&self) -> f64 {
        self.var.sqrt()
    }

    /// Equal-tailed interval of the normal posterior holding `level` of its mass.
    pub fn credible_interval(&self, level: f64) -> Result<(f64, f64)> {
        let tail = tail_mass(level)?;
        let law = Normal::new(self.mean, self.sd()).map_err(|e| McmcError::domain("Normal", e))?;
        Ok((law.inverse_cdf(tail), law.inverse_cdf(1.0 - tail)))
    }

    /// `mean ± 1.96 sd`.
    pub fn credible_interval_95(&self) -> Result<(f64, f64)> {
        self.credible_interval(0.95)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    #[test]
    fn uniform_cdf_is_identity() {
        let uniform = BetaBinomial::new(1.0, 1.0).unwrap();
        for x in [0.1, 0.25, 0.5, 0.9] {
            assert_abs_diff_eq!(uniform.cdf(x).unwrap(), x, epsilon = 1e-10);
        }
    }

    #[test]
    fn power_law_quantile() {
        // Beta(3, 1) has CDF x^3.
        let d = BetaBinomial::new(3.0, 1.0).unwrap();
        assert_abs_diff_eq!(d.cdf(0.5).unwrap(), 0.125, epsilon = 1e-10);
        assert_abs_diff_eq!(d.quantile(0.125).unwrap(), 0.5, epsilon = 1e-4);
        assert!(d.quantile(1.5).is_err());
    }

    #[test]
    fn symmetric_interval() {
        let d = BetaBinomial::new(15.0, 15.0).unwrap();
        let (lo, hi) = d.credible_interval(0.95).unwrap();
        assert_abs_diff_eq!(lo + hi, 1.0, epsilon = 1e-4);
        assert!(lo < 0.5 && hi > 0.5);
        assert_abs_diff_eq!(d.cdf(hi).unwrap() - d.cdf(lo).unwrap(), 0.95, epsilon = 1e-3);
        assert!(d.credible_interval(1.0).is_err());
    }

    #[test]
    fn out_of_domain_fields_surface_as_errors() {
        let d = BetaBinomial {
            alpha: -1.0,
            beta: 2.0,
        };
        assert!(matches!(
            d.cdf(0.5),
            Err(McmcError::ParameterDomain {
                distribution: "Beta",
                ..
            })
        ));
    }

    #[test]
    fn coin_example_posterior() {
        let posterior = BetaBinomial::new(2.0, 2.0).unwrap().update(20, 13).unwrap();
        assert_eq!(posterior, BetaBinomial { alpha: 15.0, beta: 9.0 });
        assert_abs_diff_eq!(posterior.mean(), 0.625, epsilon = 1e-12);
        let (lo, hi) = posterior.credible_interval(0.95).unwrap();
        assert!(lo < posterior.mean() && posterior.mean() < hi);
        assert!(BetaBinomial::new(2.0, 2.0).unwrap().update(5, 6).is_err());
    }

    #[test]
    fn beta_draws_match_mean() {
        let d = BetaBinomial::new(15.0, 9.0).unwrap();
        let mut rng = SmallRng::seed_from_u64(5);
        let n = 20_000;
        let mean = (0..n).map(|_| d.sample(&mut rng).unwrap()).sum::<f64>() / n as f64;
        assert_abs_diff_eq!(mean, d.mean(), epsilon = 0.005);
    }

    #[test]
    fn normal_normal_update() {
        let prior = NormalNormal::new(0.0, 1.0, 4.0).unwrap();
        let data = [2.0; 30];
        let post = prior.update(&data).unwrap();
        // precision = 1 + 30 / 4 = 8.5
        assert_abs_diff_eq!(post.var, 1.0 / 8.5, epsilon = 1e-12);
        assert_abs_diff_eq!(post.mean, 15.0 / 8.5, epsilon = 1e-12);
        let (lo, hi) = post.credible_interval_95().unwrap();
        assert_abs_diff_eq!(hi - lo, 2.0 * 1.959_963_984_540_054 * post.sd(), epsilon = 1e-9);
        assert_abs_diff_eq!(lo + hi, 2.0 * post.mean, epsilon = 1e-9);
        assert!(post.credible_interval(0.0).is_err());
        assert!(prior.update(&[]).is_err());
        assert!(NormalNormal::new(0.0, 0.0, 1.0).is_err());
    }
}
