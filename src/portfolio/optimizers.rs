//! # Portfolio Optimizers
//!
//! $$
//! \max_{\mathbf w\in\Delta^{N-1}} S(\mathbf w)=\frac{\mu^\top\mathbf w-r_f}{\sqrt{\mathbf w^\top\Sigma\mathbf w}},
//! \qquad \mathbf w=\operatorname{softmax}(\mathbf x)
//! $$
//!
//! Long-only, fully invested Sharpe maximization. Gradient solvers work on the
//! unconstrained logits `x`; the Monte Carlo search samples the simplex
//! directly. Every evaluated candidate is recorded into a shared
//! [`PortfolioCollection`].

use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use argmin::core::CostFunction;
use argmin::core::Executor;
use argmin::core::Gradient;
use argmin::core::State;
use argmin::core::TerminationReason;
use argmin::solver::linesearch::MoreThuenteLineSearch;
use argmin::solver::neldermead::NelderMead;
use argmin::solver::quasinewton::LBFGS;
use ndarray::Array1;
use ndarray::ArrayView1;
use rand::Rng;
use rayon::prelude::*;
use tracing::debug;
use tracing::warn;

use super::collection::PortfolioCollection;
use super::returns::ReturnStatistics;
use super::types::GradientSolver;
use super::types::Portfolio;
use super::types::SolverKind;
use super::types::SolverOutcome;
use super::types::Weights;
use super::types::MONTE_CARLO_TAG;
use crate::config::DEFAULT_MONTE_CARLO_ITERS;
use crate::error::DataError;
use crate::error::NumericalError;
use crate::error::PortfolioError;
use crate::error::Result;
use crate::rng::base_seed;
use crate::rng::stream_rng;

/// Monte Carlo candidates drawn from one RNG stream.
const MONTE_CARLO_BLOCK: usize = 256;
/// L-BFGS history length.
const LBFGS_MEMORY: usize = 10;

/// Sharpe ratio with the zero-volatility convention.
///
/// At `vol == 0` the ratio is the signed infinity of `ret`; `0 / 0` is
/// [`NumericalError::UndefinedSharpe`].
pub fn sharpe_ratio(ret: f64, vol: f64) -> Result<f64> {
  if vol > 0.0 {
    return Ok(ret / vol);
  }
  if ret > 0.0 {
    Ok(f64::INFINITY)
  } else if ret < 0.0 {
    Ok(f64::NEG_INFINITY)
  } else {
    Err(NumericalError::UndefinedSharpe.into())
  }
}

fn softmax(x: &[f64]) -> Vec<f64> {
  if x.is_empty() {
    return Vec::new();
  }

  let max_x = x.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
  let exps: Vec<f64> = x.iter().map(|&v| (v - max_x).exp()).collect();
  let sum: f64 = exps.iter().sum();

  if !(sum.is_finite() && sum > 1e-15) {
    vec![1.0 / x.len() as f64; x.len()]
  } else {
    exps.iter().map(|&e| e / sum).collect()
  }
}

/// Scale non-negative draws onto the simplex.
fn normalize(raw: Vec<f64>) -> Vec<f64> {
  let sum: f64 = raw.iter().sum();
  if sum > 0.0 {
    raw.into_iter().map(|v| v / sum).collect()
  } else {
    vec![1.0 / raw.len() as f64; raw.len()]
  }
}

/// Initial simplex around the uniform allocation `x = 0`.
fn unit_simplex(n: usize) -> Vec<Vec<f64>> {
  let x0 = vec![0.0; n];
  let mut simplex = Vec::with_capacity(n + 1);
  simplex.push(x0.clone());
  for i in 0..n {
    let mut point = x0.clone();
    point[i] = 1.0;
    simplex.push(point);
  }
  simplex
}

/// Sharpe-maximizing search over long-only weights for one set of return
/// statistics.
#[derive(Clone, Debug)]
pub struct PortfolioOptimizer<'a> {
  stats: &'a ReturnStatistics,
  risk_free: f64,
  max_iters: u64,
  monte_carlo_iters: usize,
  fail_on_nonconvergence: bool,
  seed: Option<u64>,
}

impl<'a> PortfolioOptimizer<'a> {
  pub fn new(stats: &'a ReturnStatistics, risk_free: f64) -> Self {
    Self {
      stats,
      risk_free,
      max_iters: 1_000,
      monte_carlo_iters: DEFAULT_MONTE_CARLO_ITERS,
      fail_on_nonconvergence: false,
      seed: None,
    }
  }

  pub fn with_max_iters(mut self, max_iters: u64) -> Self {
    self.max_iters = max_iters;
    self
  }

  pub fn with_monte_carlo_iters(mut self, iters: usize) -> Self {
    self.monte_carlo_iters = iters;
    self
  }

  pub fn with_seed(mut self, seed: Option<u64>) -> Self {
    self.seed = seed;
    self
  }

  /// Turn soft-accepted non-convergence into [`NumericalError::NotConverged`].
  pub fn fail_on_nonconvergence(mut self, fail: bool) -> Self {
    self.fail_on_nonconvergence = fail;
    self
  }

  pub fn stats(&self) -> &ReturnStatistics {
    self.stats
  }

  /// `(return, volatility, sharpe)` of a weight vector aligned with the
  /// statistics' symbols.
  pub fn score(&self, weights: &[f64]) -> Result<(f64, f64, f64)> {
    let expected = self.stats.n_assets();
    if weights.len() != expected {
      return Err(
        DataError::WeightLength {
          expected,
          got: weights.len(),
        }
        .into(),
      );
    }
    let w = ArrayView1::from(weights);
    let ret = self.stats.mean.dot(&w) - self.risk_free;
    let vol = w.dot(&self.stats.cov.dot(&w)).max(0.0).sqrt();
    Ok((ret, vol, sharpe_ratio(ret, vol)?))
  }

  /// Score `weights` into a [`Portfolio`] tagged with `solver`.
  pub fn evaluate(&self, solver: &str, weights: &[f64]) -> Result<Portfolio> {
    let (expected_return, volatility, sharpe) = self.score(weights)?;
    let weights: Weights = self
      .stats
      .symbols
      .iter()
      .cloned()
      .zip(weights.iter().copied())
      .collect();

    Ok(Portfolio {
      solver: solver.to_string(),
      expected_return,
      volatility,
      sharpe,
      weights,
    })
  }

  /// Run every solver identifier in order into `collection`.
  ///
  /// All identifiers are parsed before any work starts, so an unsupported
  /// solver leaves the collection untouched.
  pub fn optimize_with_solvers(
    &self,
    solvers: &[String],
    collection: &PortfolioCollection,
  ) -> Result<Vec<SolverOutcome>> {
    let kinds = solvers
      .iter()
      .map(|s| s.parse::<SolverKind>())
      .collect::<Result<Vec<_>>>()?;
    kinds.into_iter().map(|k| self.run(k, collection)).collect()
  }

  /// Run one solver identifier into `collection`.
  pub fn optimize(&self, solver: &str, collection: &PortfolioCollection) -> Result<SolverOutcome> {
    self.run(solver.parse()?, collection)
  }

  pub fn run(&self, solver: SolverKind, collection: &PortfolioCollection) -> Result<SolverOutcome> {
    match solver {
      SolverKind::Gradient(g) => self.optimize_gradient(g, collection),
      SolverKind::MonteCarlo => self.optimize_monte_carlo(collection),
    }
  }

  /// Constrained Sharpe maximization with an `argmin` solver, starting from
  /// the uniform allocation.
  pub fn optimize_gradient(
    &self,
    solver: GradientSolver,
    collection: &PortfolioCollection,
  ) -> Result<SolverOutcome> {
    let n = self.stats.n_assets();
    if n == 0 {
      return Err(crate::error::DataError::EmptyReturns { rows: 0, cols: 0 }.into());
    }

    let tag = solver.tag();
    let evaluations = AtomicUsize::new(0);
    let problem = SharpeProblem {
      optimizer: self,
      solver: tag,
      collection,
      evaluations: &evaluations,
    };
    let solver_error = |e: argmin::core::Error| -> PortfolioError {
      NumericalError::Solver {
        solver: tag.to_string(),
        reason: e.to_string(),
      }
      .into()
    };

    let run = match solver {
      GradientSolver::Lbfgs => {
        let linesearch = MoreThuenteLineSearch::new()
          .with_c(1e-4, 0.9)
          .map_err(solver_error)?;
        let lbfgs = LBFGS::new(linesearch, LBFGS_MEMORY);
        Executor::new(problem, lbfgs)
          .configure(|state| state.param(vec![0.0; n]).max_iters(self.max_iters))
          .run()
          .map(|res| {
            let state = res.state();
            (state.get_iter(), converged(state.get_termination_reason()), termination(state.get_termination_reason()))
          })
      }
      GradientSolver::NelderMead => {
        let nm = NelderMead::new(unit_simplex(n))
          .with_sd_tolerance(1e-12)
          .map_err(solver_error)?;
        Executor::new(problem, nm)
          .configure(|state| state.max_iters(self.max_iters))
          .run()
          .map(|res| {
            let state = res.state();
            (state.get_iter(), converged(state.get_termination_reason()), termination(state.get_termination_reason()))
          })
      }
    };

    let evaluations = evaluations.load(Ordering::Relaxed);
    let outcome = match run {
      Ok((iterations, converged, termination)) => SolverOutcome {
        solver: tag.to_string(),
        iterations,
        evaluations,
        converged,
        termination,
      },
      Err(err) => {
        if let Some(e) = err.chain().find_map(|e| e.downcast_ref::<PortfolioError>()) {
          return Err(e.clone());
        }
        SolverOutcome {
          solver: tag.to_string(),
          iterations: 0,
          evaluations,
          converged: false,
          termination: err.to_string(),
        }
      }
    };

    if outcome.converged {
      debug!(
        solver = tag,
        iterations = outcome.iterations,
        evaluations = outcome.evaluations,
        "solver converged"
      );
    } else if self.fail_on_nonconvergence {
      return Err(
        NumericalError::NotConverged {
          solver: outcome.solver,
          iterations: outcome.iterations,
          termination: outcome.termination,
        }
        .into(),
      );
    } else {
      warn!(
        solver = tag,
        iterations = outcome.iterations,
        termination = %outcome.termination,
        "solver did not converge; keeping recorded iterates"
      );
    }

    Ok(outcome)
  }

  /// Score `monte_carlo_iters` uniformly drawn allocations.
  ///
  /// Candidates are generated in fixed blocks, each from its own stream of
  /// the base seed, and appended in draw order.
  pub fn optimize_monte_carlo(&self, collection: &PortfolioCollection) -> Result<SolverOutcome> {
    let n = self.stats.n_assets();
    let n_iters = self.monte_carlo_iters;
    let seed = base_seed(self.seed);
    let n_blocks = n_iters.div_ceil(MONTE_CARLO_BLOCK);

    let blocks = (0..n_blocks)
      .into_par_iter()
      .map(|b| {
        let mut rng = stream_rng(seed, b as u64);
        let len = MONTE_CARLO_BLOCK.min(n_iters - b * MONTE_CARLO_BLOCK);
        (0..len)
          .map(|_| {
            let raw: Vec<f64> = (0..n).map(|_| rng.gen::<f64>()).collect();
            self.evaluate(MONTE_CARLO_TAG, &normalize(raw))
          })
          .collect::<Result<Vec<_>>>()
      })
      .collect::<Result<Vec<_>>>()?;

    collection.extend(blocks.into_iter().flatten());
    debug!(candidates = n_iters, seed, "monte carlo search done");

    Ok(SolverOutcome {
      solver: MONTE_CARLO_TAG.to_string(),
      iterations: n_iters as u64,
      evaluations: n_iters,
      converged: true,
      termination: "sampling complete".to_string(),
    })
  }

  /// Negative Sharpe gradient with respect to the logits.
  ///
  /// $$
  /// \nabla_w S = \frac{\mu}{\sigma} - \frac{(\mu^\top w - r_f)\,\Sigma w}{\sigma^3},\qquad
  /// \frac{\partial \mathcal L}{\partial x_j} = w_j\left(g_j - w^\top g\right)
  /// $$
  fn logit_gradient(&self, x: &[f64]) -> Vec<f64> {
    let w = Array1::from(softmax(x));
    let sigma_w = self.stats.cov.dot(&w);
    let var = w.dot(&sigma_w);
    if var <= 0.0 {
      return vec![0.0; x.len()];
    }

    let vol = var.sqrt();
    let ret = self.stats.mean.dot(&w) - self.risk_free;
    let g = -(&self.stats.mean / vol - &sigma_w * (ret / (vol * var)));
    let wg = w.dot(&g);
    w.iter().zip(g.iter()).map(|(wj, gj)| wj * (gj - wg)).collect()
  }
}

fn converged(reason: Option<&TerminationReason>) -> bool {
  matches!(reason, Some(TerminationReason::SolverConverged))
}

fn termination(reason: Option<&TerminationReason>) -> String {
  reason.map_or_else(|| "not terminated".to_string(), |r| r.to_string())
}

/// Negative Sharpe ratio in logit space; records every cost evaluation.
struct SharpeProblem<'o, 'a> {
  optimizer: &'o PortfolioOptimizer<'a>,
  solver: &'static str,
  collection: &'o PortfolioCollection,
  evaluations: &'o AtomicUsize,
}

impl CostFunction for SharpeProblem<'_, '_> {
  type Param = Vec<f64>;
  type Output = f64;

  fn cost(&self, x: &Self::Param) -> std::result::Result<Self::Output, argmin::core::Error> {
    let portfolio = self.optimizer.evaluate(self.solver, &softmax(x))?;
    let cost = -portfolio.sharpe;
    self.collection.append(portfolio);
    self.evaluations.fetch_add(1, Ordering::Relaxed);
    Ok(cost)
  }
}

impl Gradient for SharpeProblem<'_, '_> {
  type Param = Vec<f64>;
  type Gradient = Vec<f64>;

  fn gradient(&self, x: &Self::Param) -> std::result::Result<Self::Gradient, argmin::core::Error> {
    Ok(self.optimizer.logit_gradient(x))
  }
}
