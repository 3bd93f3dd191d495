//! Markov chain Monte Carlo for small Bayesian models.
//!
//! - [`gibbs`]: Gibbs sampler for capture–recapture population estimation.
//! - [`metropolis_hastings`]: random-walk Metropolis–Hastings for any
//!   unnormalized log-density on the real line.
//! - [`core`]: the chain abstraction and the parallel multi-chain runner.
//! - [`stats`]: R-hat, autocorrelation, batch means and posterior summaries.
//! - [`conjugate`]: closed-form Beta–binomial and normal–normal updates.
//! - [`permutation`]: permutation and randomization tests.
//!
//! Every chain owns its random number generator, so independent chains can run
//! on separate threads and a fixed seed reproduces a run bit for bit.

pub mod ar1;
pub mod conjugate;
pub mod core;
pub mod distributions;
pub mod error;
pub mod gibbs;
pub mod metropolis_hastings;
pub mod permutation;
pub mod stats;

pub use error::{McmcError, Result};
