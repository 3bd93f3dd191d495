//! Gaussian AR(1) chains, `x_{t+1} = ρ x_t + N(0, τ²)`.
//!
//! A chain with a known stationary law: its asymptotic variance is
//! `τ² / (1 - ρ)²`, which makes it a reference for batch-means estimates.

use rand::rngs::SmallRng;
use rand::{thread_rng, Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

use crate::core::MarkovChain;
use crate::error::{McmcError, Result};

/// One AR(1) transition from `m`.
pub fn ar1_step<R: Rng + ?Sized>(m: f64, rho: f64, tau: f64, rng: &mut R) -> Result<f64> {
    let noise = Normal::new(0.0, tau).map_err(|e| McmcError::domain("Normal", e))?;
    Ok(rho * m + noise.sample(rng))
}

pub struct Ar1Chain {
    pub rho: f64,
    pub tau: f64,
    pub current_state: Vec<f64>,
    pub seed: u64,
    pub rng: SmallRng,
    noise: Normal<f64>,
}

impl Ar1Chain {
    pub fn new(x0: f64, rho: f64, tau: f64) -> Result<Self> {
        if !(tau > 0.0 && tau.is_finite()) {
            return Err(McmcError::InvalidInput(format!(
                "innovation sd must be positive, got {tau}"
            )));
        }
        let noise = Normal::new(0.0, tau).map_err(|e| McmcError::domain("Normal", e))?;
        let seed = thread_rng().gen::<u64>();
        Ok(Self {
            rho,
            tau,
            current_state: vec![x0],
            seed,
            rng: SmallRng::seed_from_u64(seed),
            noise,
        })
    }

    pub fn set_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self.rng = SmallRng::seed_from_u64(seed);
        self
    }

    /// `τ² / (1 - ρ)²`, the variance in the CLT for the chain's running mean.
    pub fn asymptotic_variance(&self) -> f64 {
        self.tau * self.tau / (1.0 - self.rho).powi(2)
    }
}

impl MarkovChain<f64> for Ar1Chain {
    fn step(&mut self) -> Result<&[f64]> {
        self.current_state[0] = self.rho * self.current_state[0] + self.noise.sample(&mut self.rng);
        Ok(&self.current_state)
    }

    fn current_state(&self) -> &[f64] {
        &self.current_state
    }
}

/// Appends `p` AR(1) steps to `x0`, returning `p + 1` values.
pub fn ar1_chain(x0: f64, p: usize, rho: f64, tau: f64, seed: u64) -> Result<Vec<f64>> {
    let mut chain = Ar1Chain::new(x0, rho, tau)?.set_seed(seed);
    let mut out = Vec::with_capacity(p + 1);
    out.push(x0);
    for _ in 0..p {
        out.push(chain.step()?[0]);
    }
    Ok(out)
}
