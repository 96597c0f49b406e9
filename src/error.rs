//! # Errors
//!
//! $$
//! \text{PortfolioError} = \text{Configuration} \sqcup \text{Data} \sqcup \text{Numerical}
//! $$
//!
//! Every failure raised by the engine falls in one of three families so callers
//! can react to each kind separately.

use chrono::NaiveDate;
use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, PortfolioError>;

/// Invalid caller-supplied parameters.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
  #[error("{0}: unknown trading period; choose from daily, weekly, monthly, yearly")]
  UnknownPeriod(String),
  #[error("{0}: alpha must satisfy 0 < alpha < 1")]
  InvalidAlpha(f64),
  #[error("at least one alpha is required")]
  NoAlphas,
  #[error("VaR keys {var_keys:?} do not match requested alphas {alphas:?}")]
  MismatchedAlphas {
    var_keys: Vec<f64>,
    alphas: Vec<f64>,
  },
  #[error("{0}: unsupported solver")]
  UnsupportedSolver(String),
  #[error("invalid parameter `{name}`: {reason}")]
  InvalidParameter {
    name: &'static str,
    reason: String,
  },
}

/// Empty, malformed or inconsistent input data.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DataError {
  #[error("return frame is empty ({rows} rows x {cols} columns)")]
  EmptyReturns { rows: usize, cols: usize },
  #[error("{observations} return observation(s); at least 2 are required")]
  InsufficientObservations { observations: usize },
  #[error("{symbol}: dates must be strictly ascending (offending date {date})")]
  UnsortedDates { symbol: String, date: NaiveDate },
  #[error("{symbol}: no price on aligned date {date}")]
  MisalignedSeries { symbol: String, date: NaiveDate },
  #[error("{symbol}: invalid price {price} on {date}")]
  InvalidPrice {
    symbol: String,
    date: NaiveDate,
    price: f64,
  },
  #[error("{symbol}: missing field `{field}`")]
  MissingField { symbol: String, field: String },
  #[error("{symbol}: column length {len} does not match {dates} dates")]
  ColumnLength {
    symbol: String,
    len: usize,
    dates: usize,
  },
  #[error("price matrix is {rows}x{cols}, expected {dates} dates x {symbols} symbols")]
  FrameShape {
    rows: usize,
    cols: usize,
    dates: usize,
    symbols: usize,
  },
  #[error("{expected} weight(s) expected, got {got}")]
  WeightLength { expected: usize, got: usize },
  #[error("{0}: asset not present in price data")]
  UnknownAsset(String),
  #[error("no weights to simulate")]
  EmptyWeights,
  #[error("portfolio collection is empty")]
  EmptyCollection,
  #[error("sample is empty")]
  EmptySample,
}

/// Failures of the numeric core itself.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NumericalError {
  #[error("covariance matrix of {0} asset(s) is not positive definite; Cholesky factorization failed")]
  CholeskyFailed(usize),
  #[error("Sharpe ratio undefined: zero excess return over zero volatility")]
  UndefinedSharpe,
  #[error("{solver} did not converge after {iterations} iteration(s): {termination}")]
  NotConverged {
    solver: String,
    iterations: u64,
    termination: String,
  },
  #[error("{solver} failed: {reason}")]
  Solver { solver: String, reason: String },
}

/// Top-level error type of the crate.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PortfolioError {
  #[error(transparent)]
  Configuration(#[from] ConfigurationError),
  #[error(transparent)]
  Data(#[from] DataError),
  #[error(transparent)]
  Numerical(#[from] NumericalError),
}

impl PortfolioError {
  pub fn is_configuration(&self) -> bool {
    matches!(self, Self::Configuration(_))
  }

  pub fn is_data(&self) -> bool {
    matches!(self, Self::Data(_))
  }

  pub fn is_numerical(&self) -> bool {
    matches!(self, Self::Numerical(_))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn families_are_distinguishable() {
    let err: PortfolioError = ConfigurationError::InvalidAlpha(1.5).into();
    assert!(err.is_configuration());
    assert!(!err.is_data());

    let err: PortfolioError = NumericalError::CholeskyFailed(2).into();
    assert!(err.is_numerical());
    assert!(err.to_string().contains("Cholesky"));
  }
}
