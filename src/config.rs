//! # Configuration
//!
//! $$
//! \mu_{ann} = k\,\bar r,\qquad \Sigma_{ann} = k\,\hat\Sigma,\qquad k\in\{252, 52, 12, 1\}
//! $$
//!
//! Trading-period constants and the explicit run configuration of the engine.

use std::fmt::Display;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;

use crate::error::ConfigurationError;
use crate::error::PortfolioError;
use crate::error::Result;
use crate::portfolio::types::SolverKind;

/// Default annual risk-free rate (10y treasury, Feb 21 2024).
pub const RISK_FREE_RATE: f64 = 0.0432;
/// Weights at or below this are treated as numerical noise.
pub const DEFAULT_MIN_WEIGHT: f64 = 1e-4;
/// Default number of Monte Carlo weight candidates.
pub const DEFAULT_MONTE_CARLO_ITERS: usize = 20_000;

/// Sampling frequency of the price data.
#[derive(Default, Clone, Copy, PartialEq, Eq, Debug, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradingPeriod {
  #[default]
  Daily,
  Weekly,
  Monthly,
  Yearly,
}

impl TradingPeriod {
  pub const ALL: [TradingPeriod; 4] = [
    TradingPeriod::Daily,
    TradingPeriod::Weekly,
    TradingPeriod::Monthly,
    TradingPeriod::Yearly,
  ];

  /// Number of trading periods in one year.
  pub fn periods_per_year(&self) -> f64 {
    match self {
      TradingPeriod::Daily => 252.0,
      TradingPeriod::Weekly => 52.0,
      TradingPeriod::Monthly => 12.0,
      TradingPeriod::Yearly => 1.0,
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      TradingPeriod::Daily => "daily",
      TradingPeriod::Weekly => "weekly",
      TradingPeriod::Monthly => "monthly",
      TradingPeriod::Yearly => "yearly",
    }
  }
}

impl FromStr for TradingPeriod {
  type Err = PortfolioError;

  fn from_str(s: &str) -> Result<Self> {
    match s.trim().to_lowercase().as_str() {
      "daily" => Ok(Self::Daily),
      "weekly" => Ok(Self::Weekly),
      "monthly" => Ok(Self::Monthly),
      "yearly" => Ok(Self::Yearly),
      _ => Err(ConfigurationError::UnknownPeriod(s.to_string()).into()),
    }
  }
}

impl Display for TradingPeriod {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

/// Runtime configuration for [`crate::PortfolioEngine`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizationConfig {
  /// Annual risk-free rate subtracted from portfolio returns.
  pub risk_free_rate: f64,
  /// Sampling frequency of the prices, drives annualization.
  pub period: TradingPeriod,
  /// Price column the returns are computed on.
  pub price_field: String,
  /// Solver identifiers run into one shared collection.
  pub solvers: Vec<String>,
  /// Candidates drawn by the Monte Carlo search.
  pub monte_carlo_iters: usize,
  /// Iteration cap of the gradient-based solvers.
  pub max_iters: u64,
  /// Use `risk_free_rate` (true) or zero (false) in Sharpe ratios.
  pub subtract_risk_free: bool,
  /// Escalate gradient-solver non-convergence to an error.
  pub fail_on_nonconvergence: bool,
  /// Pruning threshold for the best-portfolio weights view.
  pub min_weight: f64,
  /// Number of simulated return paths.
  pub num_sims: usize,
  /// Simulation horizon in periods.
  pub horizon: usize,
  /// Portfolio value at t = 0.
  pub initial_investment: f64,
  /// Tail probabilities for VaR / CVaR.
  pub alphas: Vec<f64>,
  /// Base seed; `None` draws one from entropy.
  pub seed: Option<u64>,
}

impl Default for OptimizationConfig {
  fn default() -> Self {
    Self {
      risk_free_rate: RISK_FREE_RATE,
      period: TradingPeriod::Daily,
      price_field: "Adj Close".to_string(),
      solvers: vec!["lbfgs".to_string(), "monte carlo".to_string()],
      monte_carlo_iters: DEFAULT_MONTE_CARLO_ITERS,
      max_iters: 1_000,
      subtract_risk_free: true,
      fail_on_nonconvergence: false,
      min_weight: DEFAULT_MIN_WEIGHT,
      num_sims: 400,
      horizon: 90,
      initial_investment: 10_000.0,
      alphas: vec![0.01, 0.05, 0.1],
      seed: None,
    }
  }
}

impl OptimizationConfig {
  /// Parse a (possibly partial) JSON document; missing keys take defaults.
  pub fn from_json_str(json: &str) -> anyhow::Result<Self> {
    let config: Self = serde_json::from_str(json)?;
    config.validate()?;
    Ok(config)
  }

  pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
    let raw = fs::read_to_string(path.as_ref())?;
    Self::from_json_str(&raw)
  }

  /// Effective risk-free rate used in Sharpe ratios.
  pub fn effective_risk_free(&self) -> f64 {
    if self.subtract_risk_free {
      self.risk_free_rate
    } else {
      0.0
    }
  }

  /// Parsed solver list.
  pub fn solver_kinds(&self) -> Result<Vec<SolverKind>> {
    self.solvers.iter().map(|s| s.parse()).collect()
  }

  pub fn validate(&self) -> Result<()> {
    if !self.risk_free_rate.is_finite() {
      return Err(invalid("risk_free_rate", "must be finite"));
    }
    if self.solvers.is_empty() {
      return Err(invalid("solvers", "at least one solver is required"));
    }
    self.solver_kinds()?;
    if self.monte_carlo_iters == 0 {
      return Err(invalid("monte_carlo_iters", "must be > 0"));
    }
    if self.max_iters == 0 {
      return Err(invalid("max_iters", "must be > 0"));
    }
    if !(0.0..1.0).contains(&self.min_weight) {
      return Err(invalid("min_weight", "must be in [0, 1)"));
    }
    if self.num_sims == 0 {
      return Err(invalid("num_sims", "must be > 0"));
    }
    if self.horizon == 0 {
      return Err(invalid("horizon", "must be > 0"));
    }
    if !(self.initial_investment.is_finite() && self.initial_investment > 0.0) {
      return Err(invalid("initial_investment", "must be positive and finite"));
    }
    crate::risk::metrics::validate_alphas(&self.alphas)?;
    Ok(())
  }
}

pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> PortfolioError {
  ConfigurationError::InvalidParameter {
    name,
    reason: reason.into(),
  }
  .into()
}
