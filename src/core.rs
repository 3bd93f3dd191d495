//! Chain-running machinery shared by the Gibbs, Metropolis–Hastings and AR(1) chains.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use ndarray::{s, Array2, Array3, ArrayView1, ArrayView2, Axis};
use num_traits::{ToPrimitive, Zero};
use rayon::prelude::*;

use crate::error::{McmcError, Result};
use crate::stats::ChainTracker;

const UPDATE_INTERVAL: Duration = Duration::from_millis(500);

pub trait MarkovChain<S> {
    /// Does one iteration of the chain, returning the new current state.
    fn step(&mut self) -> Result<&[S]>;

    /// Get the current state without stepping.
    fn current_state(&self) -> &[S];
}

fn check_steps(n_steps: usize) -> Result<()> {
    if n_steps == 0 {
        return Err(McmcError::InvalidInput(
            "number of iterations must be at least 1".to_string(),
        ));
    }
    Ok(())
}

/// Runs `chain` for `n_steps` iterations and returns one row per iteration.
pub fn run_chain<S, M>(chain: &mut M, n_steps: usize) -> Result<Array2<S>>
where
    M: MarkovChain<S>,
    S: Clone + Zero,
{
    check_steps(n_steps)?;
    let dim = chain.current_state().len();
    let mut out = Array2::<S>::zeros((n_steps, dim));

    for i in 0..n_steps {
        let state = chain.step()?;
        out.row_mut(i).assign(&ArrayView1::from(state));
    }

    Ok(out)
}

/// Like [`run_chain`], but checks `cancel` once per iteration.
///
/// When cancellation is observed the rows completed so far are returned, so the
/// result may have fewer than `n_steps` rows.
pub fn run_chain_cancellable<S, M>(
    chain: &mut M,
    n_steps: usize,
    cancel: &AtomicBool,
) -> Result<Array2<S>>
where
    M: MarkovChain<S>,
    S: Clone + Zero,
{
    check_steps(n_steps)?;
    let dim = chain.current_state().len();
    let mut out = Array2::<S>::zeros((n_steps, dim));

    let mut done = 0;
    while done < n_steps && !cancel.load(Ordering::Relaxed) {
        let state = chain.step()?;
        out.row_mut(done).assign(&ArrayView1::from(state));
        done += 1;
    }

    Ok(out.slice(s![..done, ..]).to_owned())
}

/// Runs `chain` while reporting progress, acceptance rate and the running mean of
/// the first coordinate on `pb`.
pub fn run_chain_with_progress<S, M>(
    chain: &mut M,
    n_steps: usize,
    pb: &ProgressBar,
) -> Result<Array2<S>>
where
    M: MarkovChain<S>,
    S: Clone + Zero + PartialEq + ToPrimitive,
{
    check_steps(n_steps)?;
    let dim = chain.current_state().len();
    let mut out = Array2::<S>::zeros((n_steps, dim));
    let mut tracker = ChainTracker::new(dim, chain.current_state());
    let mut last_update = Instant::now();

    pb.set_length(n_steps as u64);

    for i in 0..n_steps {
        let state = chain.step()?;
        tracker.step(state)?;
        out.row_mut(i).assign(&ArrayView1::from(state));

        if last_update.elapsed() >= UPDATE_INTERVAL || i + 1 == n_steps {
            let stats = tracker.stats();
            pb.set_position(i as u64 + 1);
            pb.set_message(format!(
                "p(accept)≈{:.2} mean[0]={:.3}",
                stats.p_accept,
                stats.mean.get(0).copied().unwrap_or(f64::NAN)
            ));
            last_update = Instant::now();
        }
    }

    Ok(out)
}

/// Anything that owns multiple independent Markov chains.
pub trait HasChains<S> {
    type Chain: MarkovChain<S> + Send;

    fn chains_mut(&mut self) -> &mut Vec<Self::Chain>;
}

fn discard_burnin<S: Clone>(runs: Vec<Array2<S>>, discard: usize) -> Result<Array3<S>> {
    let kept: Vec<ArrayView2<S>> = runs
        .iter()
        .map(|samples| samples.slice(s![discard.., ..]))
        .collect();
    if kept.is_empty() {
        return Err(McmcError::InvalidInput(
            "sampler owns no chains".to_string(),
        ));
    }
    Ok(ndarray::stack(Axis(0), &kept)?)
}

fn check_discard(n_steps: usize, discard: usize) -> Result<()> {
    check_steps(n_steps)?;
    if discard >= n_steps {
        return Err(McmcError::InvalidInput(format!(
            "burn-in of {discard} leaves no draws out of {n_steps}"
        )));
    }
    Ok(())
}

pub trait ChainRunner<S>: HasChains<S>
where
    S: Clone + Zero + PartialEq + ToPrimitive + Send + Sync + 'static,
{
    /// Runs the chains in parallel and discards the first `discard` draws of each.
    ///
    /// Returns an array shaped `chains × (n_steps - discard) × dim`.
    fn run(&mut self, n_steps: usize, discard: usize) -> Result<Array3<S>> {
        check_discard(n_steps, discard)?;
        let runs = self
            .chains_mut()
            .par_iter_mut()
            .map(|chain| run_chain(chain, n_steps))
            .collect::<Result<Vec<_>>>()?;
        discard_burnin(runs, discard)
    }

    /// Same as [`ChainRunner::run`] with one progress bar per chain.
    fn run_progress(&mut self, n_steps: usize, discard: usize) -> Result<Array3<S>> {
        check_discard(n_steps, discard)?;
        let multi = MultiProgress::new();
        let pb_style = ProgressStyle::default_bar()
            .template("{prefix} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")?
            .progress_chars("##-");

        let runs = self
            .chains_mut()
            .par_iter_mut()
            .enumerate()
            .map(|(i, chain)| {
                let pb = multi.add(ProgressBar::new(n_steps as u64));
                pb.set_prefix(format!("Chain {i}"));
                pb.set_style(pb_style.clone());

                let samples = run_chain_with_progress(chain, n_steps, &pb)?;

                pb.finish_with_message("Done!");
                Ok(samples)
            })
            .collect::<Result<Vec<_>>>()?;

        discard_burnin(runs, discard)
    }
}

impl<S, T> ChainRunner<S> for T
where
    S: Clone + Zero + PartialEq + ToPrimitive + Send + Sync + 'static,
    T: HasChains<S>,
{
}
