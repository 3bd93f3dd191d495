//! Replays the capture–recapture and Metropolis–Hastings session: trial and full
//! Gibbs runs with posterior summaries, a continuation, parallel chains with
//! R-hat, a bimodal Metropolis–Hastings run, AR(1) batch means, two conjugate
//! updates and permutation tests.

use ndarray::{s, Axis};
use rand::rngs::SmallRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use std::error::Error;

use recapture_mcmc::ar1::ar1_chain;
use recapture_mcmc::conjugate::{BetaBinomial, NormalNormal};
use recapture_mcmc::core::ChainRunner;
use recapture_mcmc::distributions::GaussianMixture;
use recapture_mcmc::gibbs::{continue_chain, gibbs_chain, CaptureRecapture, GibbsSampler};
use recapture_mcmc::metropolis_hastings::metropolis_hastings;
use recapture_mcmc::permutation::{ks_statistic, mean_difference, permutation_test, welch_t};
use recapture_mcmc::stats::{
    acceptance_rate, autocorrelation, batch_means_variance, rhat, PosteriorSummary,
};

fn main() -> Result<(), Box<dyn Error>> {
    const TRIAL_ITERATIONS: usize = 1_000;
    const ITERATIONS: usize = 10_000;
    const BURNIN: usize = 1_000;
    const N_START: u64 = 200;
    const N_CHAINS: usize = 4;
    const SEED: u64 = 20;

    let model = CaptureRecapture::schnabel_reference();
    println!(
        "Total unique individuals captured (R): {}",
        model.total_unique_captured()
    );

    println!("\nPreliminary run ({TRIAL_ITERATIONS} iterations)");
    let trial = gibbs_chain(&model, TRIAL_ITERATIONS, N_START, None, SEED)?;
    for (j, column) in trial.axis_iter(Axis(1)).enumerate() {
        let name = if j == 0 { "N".to_string() } else { format!("alpha_{j}") };
        let acf = autocorrelation(&column.to_vec(), 50)?;
        println!(
            "  ACF {name:>8}: lag1={:.3} lag5={:.3} lag10={:.3} lag50={:.3}",
            acf[1], acf[5], acf[10], acf[50]
        );
    }

    println!("\nComplete run ({ITERATIONS} iterations, burn-in {BURNIN})");
    let sim = gibbs_chain(&model, ITERATIONS, N_START, None, SEED + 1)?;
    let n_final = sim.slice(s![BURNIN.., 0]).to_vec();
    let alpha1_final = sim.slice(s![BURNIN.., 1]).to_vec();
    let n_summary = PosteriorSummary::from_draws(&n_final, 0.9)?;
    let alpha1_summary = PosteriorSummary::from_draws(&alpha1_final, 0.9)?;
    println!("  Posterior mean for N: {:.2}", n_summary.mean);
    println!(
        "  90% credible interval for N: ({:.0}, {:.0})",
        n_summary.lower, n_summary.upper
    );
    println!("  Posterior mean for alpha_1: {:.4}", alpha1_summary.mean);
    println!(
        "  90% credible interval for alpha_1: ({:.4}, {:.4})",
        alpha1_summary.lower, alpha1_summary.upper
    );

    println!("\nContinuing for a further {ITERATIONS} iterations");
    let sim_full = continue_chain(&model, &sim, ITERATIONS, SEED + 2)?;
    let n_big = sim_full.slice(s![BURNIN.., 0]).to_vec();
    let big_summary = PosteriorSummary::from_draws(&n_big, 0.9)?;
    println!(
        "  N over {} draws: mean {:.2}, 90% CI ({:.0}, {:.0})",
        n_big.len(),
        big_summary.mean,
        big_summary.lower,
        big_summary.upper
    );

    println!("\n{N_CHAINS} parallel chains");
    let initial_state = model.initial_state(N_START, None)?;
    let mut sampler = GibbsSampler::new(model, &initial_state, N_CHAINS).set_seed(SEED);
    let chains = sampler.run_progress(ITERATIONS, BURNIN)?;
    let r = rhat(&chains)?;
    println!("  R-hat N: {:.4}, max over all: {:.4}", r[0], r.fold(0.0_f64, |a, &b| a.max(b)));

    println!("\nMetropolis–Hastings on 0.3 N(-3, 1) + 0.7 N(3, 1)");
    let target = GaussianMixture::course_bimodal();
    let samps = metropolis_hastings(ITERATIONS, 0.0, 1.0, target.clone(), SEED)?;
    println!("  Acceptance rate: {:.3}", acceptance_rate(&samps)?);
    let mh_summary = PosteriorSummary::from_draws(&samps[BURNIN..], 0.9)?;
    println!(
        "  Sample mean {:.3} (target {:.3}), 90% interval ({:.2}, {:.2})",
        mh_summary.mean,
        target.mean(),
        mh_summary.lower,
        mh_summary.upper
    );

    println!("\nAR(1) with rho = 0.95, tau = 1");
    let ar = ar1_chain(0.0, 1_000, 0.95, 1.0, SEED)?;
    println!(
        "  Batch-means asymptotic variance (b = 50): {:.2} (true {:.2})",
        batch_means_variance(&ar, 50)?,
        1.0 / (1.0 - 0.95_f64).powi(2)
    );

    println!("\nBeta–binomial: Beta(2, 2) prior, 13 heads in 20 tosses");
    let coin = BetaBinomial::new(2.0, 2.0)?.update(20, 13)?;
    let (lo, hi) = coin.credible_interval(0.95)?;
    println!("  Posterior Beta({}, {})", coin.alpha, coin.beta);
    println!("  Posterior mean: {:.3}", coin.mean());
    println!("  95% credible interval: [{lo:.3}, {hi:.3}]");

    println!("\nNormal–normal: N(0, 1) prior, 30 draws from N(2, 4)");
    let mut rng = SmallRng::seed_from_u64(123);
    let normal = Normal::new(2.0, 2.0)?;
    let data: Vec<f64> = normal.sample_iter(&mut rng).take(30).collect();
    let post = NormalNormal::new(0.0, 1.0, 4.0)?.update(&data)?;
    let (lo, hi) = post.credible_interval_95()?;
    println!("  Posterior mean: {:.3}", post.mean);
    println!("  Posterior sd: {:.3}", post.sd());
    println!("  95% credible interval: [{lo:.3}, {hi:.3}]");

    println!("\nPermutation tests");
    let treated = [
        24.0, 43.0, 58.0, 71.0, 61.0, 44.0, 67.0, 49.0, 59.0, 52.0, 62.0, 54.0, 46.0, 43.0, 57.0,
        43.0, 57.0, 56.0, 53.0, 49.0, 33.0,
    ];
    let control = [
        42.0, 43.0, 55.0, 26.0, 33.0, 41.0, 19.0, 54.0, 46.0, 10.0, 17.0, 60.0, 37.0, 42.0, 55.0,
        28.0, 62.0, 53.0, 37.0, 42.0, 20.0, 48.0, 85.0,
    ];
    let reading = permutation_test(&treated, &control, mean_difference, 1_000, SEED)?;
    println!(
        "  Reading scores, difference in means {:.3}: p = {:.4}",
        reading.observed, reading.p_value
    );
    let soybean = [
        227.0, 215.0, 223.0, 197.0, 207.0, 246.0, 230.0, 234.0, 213.0, 227.0, 239.0, 238.0, 248.0,
        250.0,
    ];
    let linseed = [
        141.0, 169.0, 213.0, 243.0, 249.0, 221.0, 232.0, 247.0, 217.0, 252.0, 277.0, 280.0,
    ];
    let t = permutation_test(&soybean, &linseed, welch_t, 999, SEED)?;
    println!("  Chick weights, Welch t {:.3}: p = {:.4}", t.observed, t.p_value);
    let ks = permutation_test(&soybean, &linseed, ks_statistic, 999, SEED)?;
    println!("  Chick weights, K-S D {:.3}: p = {:.4}", ks.observed, ks.p_value);

    Ok(())
}
