/*!
# Random-walk Metropolis–Hastings on the real line

Draws from any unnormalized log-density ([`LogTarget`]) with a symmetric
`Normal(0, prop_sd)` random-walk proposal, so the proposal densities cancel and
only `log p(candidate) - log p(current)` decides acceptance. Working in log space
means the target never has to be normalized and tiny densities do not underflow.

A candidate is accepted when `ln(u) < log_ratio` with `u ~ Uniform(0, 1)`. If both
log-densities are `-inf` the ratio is NaN, the comparison is false and the move is
rejected, so NaN never enters the output.

## Example

```rust
use recapture_mcmc::metropolis_hastings::metropolis_hastings;

let draws = metropolis_hastings(5, 0.0, 1.0, |x: f64| -x * x / 2.0, 42).unwrap();
assert_eq!(draws.len(), 5);
assert_eq!(draws[0], 0.0);
assert!(draws.iter().all(|x| x.is_finite()));
```

Several independent chains run in parallel through [`MetropolisHastings`] and
[`crate::core::ChainRunner`]; chain `i` gets the seed `seed + i`.
*/

use rand::prelude::*;
use rand_distr::Normal;

use crate::core::{HasChains, MarkovChain};
use crate::distributions::LogTarget;
use crate::error::{McmcError, Result};

/// The Metropolis–Hastings sampler: `n_chains` independent chains over the same
/// target and proposal scale.
#[derive(Debug, Clone)]
pub struct MetropolisHastings<D: Clone> {
    /// The target distribution we want to sample from.
    pub target: D,
    /// The vector of independent Markov chains.
    pub chains: Vec<MHMarkovChain<D>>,
    /// The global random seed.
    pub seed: u64,
}

/// A single scalar Metropolis–Hastings chain.
///
/// Owns its target, its current value and a chain-specific random number
/// generator; the log-density of the current value is cached between steps.
#[derive(Debug, Clone)]
pub struct MHMarkovChain<D> {
    /// The target distribution to sample from.
    pub target: D,
    /// Standard deviation of the random-walk proposal.
    pub prop_sd: f64,
    current_state: Vec<f64>,
    /// The chain-specific random seed.
    pub seed: u64,
    /// The random number generator for this chain.
    pub rng: SmallRng,
    proposal: Normal<f64>,
    current_log_density: f64,
    n_proposed: u64,
    n_accepted: u64,
}

impl<D> MetropolisHastings<D>
where
    D: LogTarget + Clone,
{
    /**
    Constructs a sampler with `n_chains` chains, each starting at `x0`.

    # Examples

    ```rust
    use recapture_mcmc::distributions::NormalTarget;
    use recapture_mcmc::metropolis_hastings::MetropolisHastings;

    let target = NormalTarget::new(0.0, 1.0).unwrap();
    let mh = MetropolisHastings::new(target, 0.0, 1.0, 2).unwrap().set_seed(42);
    assert_eq!(mh.chains[0].seed, 42);
    assert_eq!(mh.chains[1].seed, 43);
    ```
    */
    pub fn new(target: D, x0: f64, prop_sd: f64, n_chains: usize) -> Result<Self> {
        let chains = (0..n_chains)
            .map(|_| MHMarkovChain::new(target.clone(), x0, prop_sd))
            .collect::<Result<Vec<_>>>()?;
        let seed = thread_rng().gen::<u64>();

        Ok(Self {
            target,
            chains,
            seed,
        })
    }

    /// Sets a new global seed; chain `i` is reseeded with `seed + i`.
    pub fn set_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        for (i, chain) in self.chains.iter_mut().enumerate() {
            let chain_seed = seed.wrapping_add(i as u64);
            chain.seed = chain_seed;
            chain.rng = SmallRng::seed_from_u64(chain_seed);
        }
        self
    }
}

impl<D> HasChains<f64> for MetropolisHastings<D>
where
    D: LogTarget + Clone + Send,
{
    type Chain = MHMarkovChain<D>;

    fn chains_mut(&mut self) -> &mut Vec<Self::Chain> {
        &mut self.chains
    }
}

impl<D: LogTarget> MHMarkovChain<D> {
    /// Creates a chain at `x0` with a `Normal(0, prop_sd)` random-walk proposal.
    ///
    /// Rejects a non-finite start and any `prop_sd` that is not strictly positive.
    pub fn new(target: D, x0: f64, prop_sd: f64) -> Result<Self> {
        if !(prop_sd > 0.0 && prop_sd.is_finite()) {
            return Err(McmcError::InvalidInput(format!(
                "proposal standard deviation must be positive, got {prop_sd}"
            )));
        }
        if !x0.is_finite() {
            return Err(McmcError::InvalidInput(format!(
                "starting value must be finite, got {x0}"
            )));
        }
        let proposal = Normal::new(0.0, prop_sd).map_err(|e| McmcError::domain("Normal", e))?;
        let current_log_density = target.log_density(x0);
        let seed = thread_rng().gen::<u64>();
        Ok(Self {
            target,
            prop_sd,
            current_state: vec![x0],
            seed,
            rng: SmallRng::seed_from_u64(seed),
            proposal,
            current_log_density,
            n_proposed: 0,
            n_accepted: 0,
        })
    }

    pub fn set_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self.rng = SmallRng::seed_from_u64(seed);
        self
    }

    pub fn current_value(&self) -> f64 {
        self.current_state[0]
    }

    /// Moves the chain to `x` and re-evaluates the cached log-density there.
    pub fn set_current_value(&mut self, x: f64) -> Result<()> {
        if !x.is_finite() {
            return Err(McmcError::InvalidInput(format!(
                "state must be finite, got {x}"
            )));
        }
        self.current_state[0] = x;
        self.current_log_density = self.target.log_density(x);
        Ok(())
    }

    /// Share of proposals accepted so far; `0.0` before the first step.
    pub fn acceptance_rate(&self) -> f64 {
        if self.n_proposed == 0 {
            return 0.0;
        }
        self.n_accepted as f64 / self.n_proposed as f64
    }

    /// Proposes one move and accepts or rejects it. Returns whether it was accepted.
    fn transition(&mut self) -> bool {
        let current = self.current_state[0];
        let candidate = current + self.proposal.sample(&mut self.rng);
        let candidate_log_density = self.target.log_density(candidate);
        let log_accept_ratio = candidate_log_density - self.current_log_density;

        let u: f64 = self.rng.gen();
        self.n_proposed += 1;
        // NaN compares false, so a degenerate ratio rejects.
        if u.ln() < log_accept_ratio {
            self.current_state[0] = candidate;
            self.current_log_density = candidate_log_density;
            self.n_accepted += 1;
            true
        } else {
            false
        }
    }

    /// Returns `n_iterations` values: the current value followed by
    /// `n_iterations - 1` transitions.
    pub fn sample(&mut self, n_iterations: usize) -> Result<Vec<f64>> {
        if n_iterations == 0 {
            return Err(McmcError::InvalidInput(
                "number of iterations must be at least 1".to_string(),
            ));
        }
        let mut out = Vec::with_capacity(n_iterations);
        out.push(self.current_value());
        for _ in 1..n_iterations {
            self.transition();
            out.push(self.current_value());
        }
        Ok(out)
    }
}

impl<D: LogTarget> MarkovChain<f64> for MHMarkovChain<D> {
    /// Performs one Metropolis–Hastings update and returns the (possibly
    /// unchanged) state.
    fn step(&mut self) -> Result<&[f64]> {
        self.transition();
        Ok(&self.current_state)
    }

    fn current_state(&self) -> &[f64] {
        &self.current_state
    }
}

/// Runs a single seeded chain from `x0` and returns `n_iterations` draws, the first
/// of which is `x0` itself.
pub fn metropolis_hastings<D: LogTarget>(
    n_iterations: usize,
    x0: f64,
    prop_sd: f64,
    log_target: D,
    seed: u64,
) -> Result<Vec<f64>> {
    MHMarkovChain::new(log_target, x0, prop_sd)?
        .set_seed(seed)
        .sample(n_iterations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{run_chain, ChainRunner};
    use crate::distributions::{GaussianMixture, NormalTarget};
    use crate::stats::acceptance_rate;
    use approx::assert_abs_diff_eq;
    use ndarray::Axis;

    fn standard_normal(x: f64) -> f64 {
        -x * x / 2.0
    }

    #[test]
    fn first_draw_is_the_start() {
        let draws = metropolis_hastings(10, 2.5, 1.0, standard_normal, 1).unwrap();
        assert_eq!(draws.len(), 10);
        assert_eq!(draws[0], 2.5);
    }

    #[test]
    fn single_iteration_is_just_the_start() {
        let draws = metropolis_hastings(1, -1.0, 1.0, standard_normal, 1).unwrap();
        assert_eq!(draws, vec![-1.0]);
    }

    #[test]
    fn invalid_inputs_are_rejected_up_front() {
        assert!(metropolis_hastings(0, 0.0, 1.0, standard_normal, 1).is_err());
        assert!(metropolis_hastings(10, 0.0, 0.0, standard_normal, 1).is_err());
        assert!(metropolis_hastings(10, 0.0, -2.0, standard_normal, 1).is_err());
        assert!(metropolis_hastings(10, f64::NAN, 1.0, standard_normal, 1).is_err());
    }

    #[test]
    fn zero_density_everywhere_never_moves() {
        let nowhere = |_x: f64| f64::NEG_INFINITY;
        let mut chain = MHMarkovChain::new(nowhere, 0.5, 1.0).unwrap().set_seed(3);
        let draws = chain.sample(200).unwrap();
        assert!(draws.iter().all(|&x| x == 0.5));
        assert_eq!(chain.acceptance_rate(), 0.0);
    }

    #[test]
    fn support_restriction_is_respected() {
        let half_normal = |x: f64| if x < 0.0 { f64::NEG_INFINITY } else { -x * x / 2.0 };
        let draws = metropolis_hastings(5_000, 1.0, 1.0, half_normal, 9).unwrap();
        assert!(draws.iter().all(|&x| x >= 0.0 && x.is_finite()));
    }

    #[test]
    fn leaves_a_zero_density_start() {
        let positive = |x: f64| if x <= 0.0 { f64::NEG_INFINITY } else { -x };
        let draws = metropolis_hastings(2_000, -0.1, 1.0, positive, 5).unwrap();
        assert!(draws.last().is_some_and(|&x| x > 0.0));
    }

    #[test]
    fn same_seed_same_chain() {
        let target = NormalTarget::new(0.0, 1.0).unwrap();
        let a = metropolis_hastings(1_000, 0.0, 1.0, target, 77).unwrap();
        let b = metropolis_hastings(1_000, 0.0, 1.0, target, 77).unwrap();
        let c = metropolis_hastings(1_000, 0.0, 1.0, target, 78).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn tracked_acceptance_matches_observed_moves() {
        let mut chain = MHMarkovChain::new(standard_normal, 0.0, 1.0)
            .unwrap()
            .set_seed(21);
        let draws = chain.sample(10_001).unwrap();
        let observed = acceptance_rate(&draws).unwrap();
        assert_abs_diff_eq!(chain.acceptance_rate(), observed, epsilon = 1e-12);
        // Random walk on N(0, 1) with step sd s accepts (2 / pi) atan(2 / s) on average.
        let expected = 2.0 / std::f64::consts::PI * 2.0_f64.atan();
        assert_abs_diff_eq!(observed, expected, epsilon = 0.03);
    }

    #[test]
    fn chain_steps_through_the_common_runner() {
        let mut chain = MHMarkovChain::new(standard_normal, 0.0, 1.0)
            .unwrap()
            .set_seed(4);
        let out = run_chain(&mut chain, 100).unwrap();
        assert_eq!(out.shape(), &[100, 1]);
        assert_eq!(out[[99, 0]], chain.current_value());
    }

    #[test]
    fn bimodal_target_mean() {
        let target = GaussianMixture::course_bimodal();
        let mut mh = MetropolisHastings::new(target.clone(), 0.0, 4.0, 4)
            .unwrap()
            .set_seed(2024);
        let samples = mh.run(30_000, 2_000).unwrap();
        assert_eq!(samples.shape(), &[4, 28_000, 1]);
        let mean = samples.mean_axis(Axis(0)).and_then(|m| m.mean()).unwrap();
        assert_abs_diff_eq!(mean, target.mean(), epsilon = 0.3);
    }

    #[test]
    fn relocated_chain_uses_the_new_log_density() {
        let mut chain = MHMarkovChain::new(standard_normal, 0.0, 1.0)
            .unwrap()
            .set_seed(8);
        chain.set_current_value(50.0).unwrap();
        let draws = chain.sample(200).unwrap();
        assert_eq!(draws[0], 50.0);
        // A cache still holding log p(0) would reject every move near 50.
        assert!(chain.current_value() < 45.0);
        assert!(chain.set_current_value(f64::NAN).is_err());
    }

    #[test]
    fn readme_test() {
        let target = NormalTarget::new(0.0, 1.0).unwrap();
        let mut mh = MetropolisHastings::new(target, 0.0, 1.0, 4).unwrap();

        // Run the sampler for 1100 steps, discarding the first 100 as burn-in
        let samples = mh.run(1100, 100).unwrap();

        assert_eq!(samples.shape()[0], 4);
        assert_eq!(samples.shape()[1], 1000);
    }
}
