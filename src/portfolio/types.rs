//! # Portfolio Types
//!
//! $$
//! \mathbf{w}^\*=\arg\max_{\mathbf{w}\in\Delta^{N-1}} \frac{\mathbf w^\top\mu-r_f}{\sqrt{\mathbf w^\top\Sigma\mathbf w}}
//! $$
//!
//! Shared enums and records for portfolio optimization.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::str::FromStr;

use serde::Serialize;

use crate::error::ConfigurationError;
use crate::error::PortfolioError;

/// Asset symbol to allocation weight.
pub type Weights = BTreeMap<String, f64>;

/// Solver tag of Monte Carlo search records.
pub const MONTE_CARLO_TAG: &str = "monte carlo";

/// Gradient-based constrained solvers, all run through `argmin`.
#[derive(Default, Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub enum GradientSolver {
  /// L-BFGS with More-Thuente line search on the analytic Sharpe gradient.
  #[default]
  Lbfgs,
  /// Derivative-free Nelder-Mead simplex.
  NelderMead,
}

impl GradientSolver {
  /// Identifier stored on every [`Portfolio`] the solver produces.
  pub fn tag(&self) -> &'static str {
    match self {
      GradientSolver::Lbfgs => "lbfgs",
      GradientSolver::NelderMead => "nelder-mead",
    }
  }
}

/// One entry of the solver list of a request.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub enum SolverKind {
  Gradient(GradientSolver),
  MonteCarlo,
}

impl SolverKind {
  pub fn tag(&self) -> &'static str {
    match self {
      SolverKind::Gradient(solver) => solver.tag(),
      SolverKind::MonteCarlo => MONTE_CARLO_TAG,
    }
  }
}

impl FromStr for SolverKind {
  type Err = PortfolioError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_lowercase().as_str() {
      "lbfgs" | "l-bfgs" | "slsqp" => Ok(Self::Gradient(GradientSolver::Lbfgs)),
      "nelder-mead" | "neldermead" => Ok(Self::Gradient(GradientSolver::NelderMead)),
      "monte carlo" | "monte-carlo" | "montecarlo" => Ok(Self::MonteCarlo),
      _ => Err(ConfigurationError::UnsupportedSolver(s.to_string()).into()),
    }
  }
}

impl Display for SolverKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.tag())
  }
}

/// One evaluated candidate portfolio.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Portfolio {
  /// Identifier of the solver that evaluated this candidate.
  pub solver: String,
  /// Annualized expected return, net of the risk-free rate when it is subtracted.
  pub expected_return: f64,
  /// Annualized volatility `sqrt(w' Σ w)`.
  pub volatility: f64,
  /// `expected_return / volatility`; signed infinity at zero volatility.
  pub sharpe: f64,
  pub weights: Weights,
}

impl Portfolio {
  /// Weights strictly above `min_weight`.
  pub fn pruned_weights(&self, min_weight: f64) -> Weights {
    self
      .weights
      .iter()
      .filter(|(_, w)| **w > min_weight)
      .map(|(s, &w)| (s.clone(), w))
      .collect()
  }

  pub fn weight_sum(&self) -> f64 {
    self.weights.values().sum()
  }
}

/// How a gradient-based run ended.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SolverOutcome {
  pub solver: String,
  pub iterations: u64,
  /// Objective evaluations recorded into the collection.
  pub evaluations: usize,
  pub converged: bool,
  pub termination: String,
}
