/*!
# Gibbs sampling for the capture–recapture (Schnabel census) model

The state of a chain is `[N, α_1, …, α_k]`: the population size followed by one
capture probability per occasion. A sweep draws each coordinate from its full
conditional given the rest:

- `N | α  = R + NegBin(R + 1, 1 - ∏(1 - α_i))` where `R` is the number of
  distinct individuals ever caught,
- `α_i | N ~ Beta(c_i + 0.5, N - c_i + 0.5)`, the Jeffreys prior updated with
  `c_i` captures out of `N` on occasion `i`.

```rust
use recapture_mcmc::gibbs::{gibbs_chain, CaptureRecapture};

let model = CaptureRecapture::schnabel_reference();
let draws = gibbs_chain(&model, 500, 200, None, 42).unwrap();
assert_eq!(draws.shape(), &[500, 8]);
assert!(draws.column(0).iter().all(|&n| n >= 104.0));
```
*/

use ndarray::Array2;
use num_traits::Zero;
use rand::rngs::SmallRng;
use rand::{thread_rng, Rng, SeedableRng};
use rand_distr::{Beta, Distribution};

use crate::core::{run_chain, HasChains, MarkovChain};
use crate::distributions::{Conditional, NegativeBinomial};
use crate::error::{McmcError, Result};

/// Capture probability every occasion starts from when none is supplied.
pub const DEFAULT_CAPTURE_PROBABILITY: f64 = 0.5;

/// Half a pseudo-observation on each side: the Beta(0.5, 0.5) prior.
const JEFFREYS: f64 = 0.5;

/// Observed capture history of a multi-occasion census.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureRecapture {
    captured: Vec<u64>,
    new_captures: Vec<u64>,
    total_unique: u64,
}

impl CaptureRecapture {
    /// `captured[i]` individuals were caught on occasion `i`, `new_captures[i]` of
    /// which had never been marked before.
    pub fn new(captured: Vec<u64>, new_captures: Vec<u64>) -> Result<Self> {
        if captured.is_empty() {
            return Err(McmcError::InvalidInput(
                "capture history has no occasions".to_string(),
            ));
        }
        if captured.len() != new_captures.len() {
            return Err(McmcError::InvalidInput(format!(
                "{} capture counts but {} new-capture counts",
                captured.len(),
                new_captures.len()
            )));
        }
        let total_unique = new_captures.iter().sum();
        Ok(Self {
            captured,
            new_captures,
            total_unique,
        })
    }

    /// The seven-occasion census analysed in the course (104 distinct animals).
    pub fn schnabel_reference() -> Self {
        let captured = vec![30, 22, 29, 26, 31, 32, 35];
        let new_captures = vec![30, 8, 17, 7, 9, 8, 5];
        Self {
            total_unique: new_captures.iter().sum(),
            captured,
            new_captures,
        }
    }

    pub fn n_occasions(&self) -> usize {
        self.captured.len()
    }

    /// Number of distinct individuals caught at least once; a hard lower bound on `N`.
    pub fn total_unique_captured(&self) -> u64 {
        self.total_unique
    }

    pub fn captured(&self) -> &[u64] {
        &self.captured
    }

    pub fn new_captures(&self) -> &[u64] {
        &self.new_captures
    }

    /// Builds the chain state `[N, α_1, …, α_k]`.
    ///
    /// Any `n_start` satisfying the state invariant `N ≥ R` is accepted, including
    /// `N = R`, so a chain can be restarted from any row it produced.
    /// `alpha_start` defaults to [`DEFAULT_CAPTURE_PROBABILITY`] on every occasion.
    pub fn initial_state(&self, n_start: u64, alpha_start: Option<&[f64]>) -> Result<Vec<f64>> {
        if n_start < self.total_unique {
            return Err(McmcError::InvalidInput(format!(
                "starting population {n_start} is below the {} individuals observed",
                self.total_unique
            )));
        }
        let k = self.n_occasions();
        let alphas = match alpha_start {
            Some(alphas) if alphas.len() != k => {
                return Err(McmcError::InvalidInput(format!(
                    "{} starting capture probabilities for {k} occasions",
                    alphas.len()
                )))
            }
            Some(alphas) => alphas.to_vec(),
            None => vec![DEFAULT_CAPTURE_PROBABILITY; k],
        };
        if let Some(bad) = alphas.iter().find(|&&a| !(a > 0.0 && a < 1.0)) {
            return Err(McmcError::InvalidInput(format!(
                "starting capture probability {bad} outside (0, 1)"
            )));
        }

        let mut state = Vec::with_capacity(k + 1);
        state.push(n_start as f64);
        state.extend(alphas);
        Ok(state)
    }

    /// Draws `N` given the current capture probabilities.
    pub fn sample_population_size<R: Rng + ?Sized>(
        &self,
        alphas: &[f64],
        rng: &mut R,
    ) -> Result<u64> {
        let p_never = alphas.iter().map(|a| 1.0 - a).product::<f64>();
        let p_at_least_once = 1.0 - p_never;
        let unobserved =
            NegativeBinomial::new(self.total_unique as f64 + 1.0, p_at_least_once)?.sample(rng)?;
        self.total_unique.checked_add(unobserved).ok_or_else(|| {
            McmcError::domain(
                "NegativeBinomial",
                format!(
                    "{unobserved} unobserved individuals overflow the population count (p = {p_at_least_once})"
                ),
            )
        })
    }

    /// Draws `α_occasion` given the population size.
    pub fn sample_capture_probability<R: Rng + ?Sized>(
        &self,
        occasion: usize,
        population_size: f64,
        rng: &mut R,
    ) -> Result<f64> {
        let caught = *self.captured.get(occasion).ok_or_else(|| {
            McmcError::InvalidInput(format!(
                "occasion {occasion} out of range for {} occasions",
                self.n_occasions()
            ))
        })? as f64;
        let a = caught + JEFFREYS;
        let b = population_size - caught + JEFFREYS;
        if !(b > 0.0) {
            return Err(McmcError::domain(
                "Beta",
                format!(
                    "population {population_size} is smaller than the {caught} caught on occasion {occasion}"
                ),
            ));
        }
        let beta = Beta::new(a, b).map_err(|e| McmcError::domain("Beta", e))?;
        let alpha = beta.sample(rng);
        if !(alpha > 0.0 && alpha < 1.0) {
            return Err(McmcError::domain(
                "Beta",
                format!("Beta({a}, {b}) draw {alpha} fell outside (0, 1)"),
            ));
        }
        Ok(alpha)
    }
}

impl Conditional<f64> for CaptureRecapture {
    /// Coordinate 0 is `N`, coordinate `i ≥ 1` is the capture probability of
    /// occasion `i - 1`.
    fn sample<R: Rng + ?Sized>(&self, i: usize, given: &[f64], rng: &mut R) -> Result<f64> {
        if given.len() != self.n_occasions() + 1 {
            return Err(McmcError::InvalidInput(format!(
                "state of length {} for {} occasions",
                given.len(),
                self.n_occasions()
            )));
        }
        match i {
            0 => Ok(self.sample_population_size(&given[1..], rng)? as f64),
            i if i <= self.n_occasions() => self.sample_capture_probability(i - 1, given[0], rng),
            _ => Err(McmcError::InvalidInput(format!(
                "coordinate {i} out of range for {} occasions",
                self.n_occasions()
            ))),
        }
    }
}

pub struct GibbsMarkovChain<S, D>
where
    D: Conditional<S>,
{
    /// The distribution that provides conditional samples.
    pub target: D,

    /// Current state of the Markov chain.
    pub current_state: Vec<S>,

    /// Random seed for reproducibility.
    pub seed: u64,

    /// RNG for this chain.
    pub rng: SmallRng,
}

impl<S, D> GibbsMarkovChain<S, D>
where
    D: Conditional<S>,
    S: Clone,
{
    /// Creates a new chain with a given target distribution and initial state.
    pub fn new(target: D, initial_state: &[S]) -> Self {
        let seed = thread_rng().gen::<u64>();
        Self {
            target,
            current_state: initial_state.to_vec(),
            seed,
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    /// Reseeds the chain's generator.
    pub fn set_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self.rng = SmallRng::seed_from_u64(seed);
        self
    }
}

impl<S, D: Conditional<S>> MarkovChain<S> for GibbsMarkovChain<S, D> {
    /// Performs one full Gibbs sweep: for each coordinate `i` in `0..dim`, sample
    /// coordinate `i` conditional on the others.
    ///
    /// A failed draw leaves the coordinates already updated in place; the chain
    /// should not be stepped again after an error.
    fn step(&mut self) -> Result<&[S]> {
        for i in 0..self.current_state.len() {
            let next = self.target.sample(i, &self.current_state, &mut self.rng)?;
            self.current_state[i] = next;
        }
        Ok(&self.current_state)
    }

    fn current_state(&self) -> &[S] {
        &self.current_state
    }
}

/// Several independent Gibbs chains over the same target.
pub struct GibbsSampler<S, D: Conditional<S>> {
    pub target: D,
    pub chains: Vec<GibbsMarkovChain<S, D>>,
    pub seed: u64,
}

impl<S, D> GibbsSampler<S, D>
where
    D: Conditional<S> + Clone,
    S: Clone,
{
    /// Creates a new Gibbs sampler with `n_chains` chains, all starting from
    /// `initial_state`.
    pub fn new(target: D, initial_state: &[S], n_chains: usize) -> Self {
        let seed = thread_rng().gen::<u64>();
        let chains = (0..n_chains)
            .map(|_| GibbsMarkovChain::new(target.clone(), initial_state))
            .collect();

        Self {
            target,
            chains,
            seed,
        }
    }

    /// Sets a new seed; chain `i` is reseeded with `seed + i`.
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

impl<S, D> HasChains<S> for GibbsSampler<S, D>
where
    D: Conditional<S> + Send,
    S: Send,
{
    type Chain = GibbsMarkovChain<S, D>;

    fn chains_mut(&mut self) -> &mut Vec<Self::Chain> {
        &mut self.chains
    }
}

/// Runs one seeded capture–recapture chain for `n_iterations` sweeps.
///
/// Returns an `n_iterations × (1 + k)` array: column 0 holds the `N` draws, the
/// remaining columns the per-occasion capture probabilities.
pub fn gibbs_chain(
    model: &CaptureRecapture,
    n_iterations: usize,
    n_start: u64,
    alpha_start: Option<&[f64]>,
    seed: u64,
) -> Result<Array2<f64>> {
    let initial_state = model.initial_state(n_start, alpha_start)?;
    let mut chain = GibbsMarkovChain::new(model.clone(), &initial_state).set_seed(seed);
    run_chain(&mut chain, n_iterations)
}

/// Continues a run from its last row and returns both runs stacked.
pub fn continue_chain(
    model: &CaptureRecapture,
    previous: &Array2<f64>,
    n_iterations: usize,
    seed: u64,
) -> Result<Array2<f64>> {
    let last = previous.nrows().checked_sub(1).ok_or_else(|| {
        McmcError::InvalidInput("cannot continue from an empty run".to_string())
    })?;
    let row = previous.row(last).to_vec();
    let (&n_last, alphas) = row.split_first().ok_or_else(|| {
        McmcError::InvalidInput("previous run has no columns".to_string())
    })?;
    if !(n_last >= 0.0 && n_last.fract().is_zero()) {
        return Err(McmcError::InvalidInput(format!(
            "last population draw {n_last} is not a count"
        )));
    }
    let more = gibbs_chain(model, n_iterations, n_last as u64, Some(alphas), seed)?;
    Ok(ndarray::concatenate(
        ndarray::Axis(0),
        &[previous.view(), more.view()],
    )?)
}
