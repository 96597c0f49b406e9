//! # Return Simulation
//!
//! $$
//! \Sigma = LL^\top,\qquad r_t = \mu + L z_t,\ z_t\sim\mathcal N(0, I),\qquad
//! V_t = I\prod_{s\le t}\left(1 + \mathbf w^\top r_s\right)
//! $$
//!
//! Multi-period Monte Carlo paths of a fixed-weight portfolio under
//! multivariate normal periodic returns.

use impl_new_derive::ImplNew;
use nalgebra::DMatrix;
use ndarray::Array1;
use ndarray::Array2;
use ndarray::Axis;
use ndarray_rand::RandomExt;
use rand_distr::StandardNormal;
use rayon::prelude::*;
use tracing::debug;

use crate::config::invalid;
use crate::error::DataError;
use crate::error::NumericalError;
use crate::error::Result;
use crate::portfolio::returns::ReturnFrame;
use crate::portfolio::returns::ReturnStatistics;
use crate::portfolio::types::Weights;
use crate::rng::base_seed;
use crate::rng::stream_rng;
use crate::stats::describe;
use crate::stats::SummaryStatistics;

/// Simulates portfolio value paths from periodic return statistics.
#[derive(ImplNew, Clone, Debug, PartialEq)]
pub struct ReturnSimulator {
  /// Number of paths `M`.
  pub num_simulations: usize,
  /// Periods per path `T`.
  pub horizon: usize,
  pub initial_investment: f64,
  /// Base seed; path `m` uses stream `m`.
  pub seed: Option<u64>,
}

impl Default for ReturnSimulator {
  fn default() -> Self {
    Self::new(400, 90, 10_000.0, None)
  }
}

impl ReturnSimulator {
  fn validate(&self) -> Result<()> {
    if self.num_simulations == 0 {
      return Err(invalid("num_simulations", "must be > 0"));
    }
    if self.horizon == 0 {
      return Err(invalid("horizon", "must be > 0"));
    }
    if !(self.initial_investment.is_finite() && self.initial_investment > 0.0) {
      return Err(invalid("initial_investment", "must be positive and finite"));
    }
    Ok(())
  }

  /// Simulate the assets with positive weight in `weights`, estimating their
  /// unannualized moments from `returns`.
  pub fn simulate(&self, returns: &ReturnFrame, weights: &Weights) -> Result<SimulationResult> {
    self.validate()?;
    let held = held_symbols(weights)?;
    let stats = ReturnStatistics::periodic(returns)?.subset(&held)?;
    self.simulate_with_stats(&stats, weights)
  }

  /// Simulate from precomputed periodic statistics.
  ///
  /// Weights are applied as given, without renormalization.
  pub fn simulate_with_stats(
    &self,
    stats: &ReturnStatistics,
    weights: &Weights,
  ) -> Result<SimulationResult> {
    self.validate()?;
    let held = held_symbols(weights)?;
    let stats = stats.subset(&held)?;
    let n = held.len();
    let w: Array1<f64> = held.iter().map(|s| weights[s]).collect();

    let cov = DMatrix::from_fn(n, n, |i, j| stats.cov[[i, j]]);
    let chol = cov.cholesky().ok_or(NumericalError::CholeskyFailed(n))?;
    let l = chol.l();
    let l_t = Array2::from_shape_fn((n, n), |(i, j)| l[(j, i)]);

    let seed = base_seed(self.seed);
    let (t, m) = (self.horizon, self.num_simulations);
    let paths: Vec<Array1<f64>> = (0..m)
      .into_par_iter()
      .map(|path| {
        let mut rng = stream_rng(seed, path as u64);
        let z = Array2::<f64>::random_using((t, n), StandardNormal, &mut rng);
        let correlated = z.dot(&l_t) + &stats.mean;
        let portfolio = correlated.dot(&w);

        let mut value = self.initial_investment;
        let mut out = Array1::zeros(t);
        for (v, r) in out.iter_mut().zip(portfolio.iter()) {
          value *= 1.0 + r;
          *v = value;
        }
        out
      })
      .collect();

    let values = Array2::from_shape_fn((t, m), |(i, j)| paths[j][i]);
    debug!(assets = n, horizon = t, paths = m, seed, "simulated portfolio paths");

    Ok(SimulationResult {
      values,
      initial_investment: self.initial_investment,
      weights: held.into_iter().zip(w.iter().copied()).collect(),
      seed,
    })
  }
}

fn held_symbols(weights: &Weights) -> Result<Vec<String>> {
  let held: Vec<String> = weights
    .iter()
    .filter(|(_, w)| **w > 0.0)
    .map(|(s, _)| s.clone())
    .collect();
  if held.is_empty() {
    return Err(DataError::EmptyWeights.into());
  }
  Ok(held)
}

/// Simulated portfolio values, one column per path.
#[derive(Clone, Debug, PartialEq)]
pub struct SimulationResult {
  /// `T × M` portfolio values after each period.
  pub values: Array2<f64>,
  pub initial_investment: f64,
  /// Weights of the simulated assets.
  pub weights: Weights,
  /// Resolved base seed, for reproduction.
  pub seed: u64,
}

impl SimulationResult {
  pub fn horizon(&self) -> usize {
    self.values.nrows()
  }

  pub fn num_simulations(&self) -> usize {
    self.values.ncols()
  }

  pub fn terminal_values(&self) -> Array1<f64> {
    self.values.row(self.horizon() - 1).to_owned()
  }

  /// Terminal gain or loss of every path relative to the initial investment.
  pub fn terminal_gains(&self) -> Vec<f64> {
    self
      .terminal_values()
      .iter()
      .map(|v| v - self.initial_investment)
      .collect()
  }

  /// Cross-path mean value at every period.
  pub fn mean_path(&self) -> Array1<f64> {
    self
      .values
      .mean_axis(Axis(1))
      .unwrap_or_else(|| Array1::zeros(self.horizon()))
  }

  pub fn gains_summary(&self) -> Result<SummaryStatistics> {
    describe(&self.terminal_gains())
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_relative_eq;
  use ndarray::array;

  use super::*;
  use crate::error::ConfigurationError;
  use crate::error::PortfolioError;
  use crate::portfolio::data::tests::series;
  use crate::portfolio::data::PriceFrame;

  fn daily_stats() -> ReturnStatistics {
    let (s1, s2, rho) = (0.01, 0.008, 0.3);
    ReturnStatistics {
      symbols: vec!["AAA".to_string(), "BBB".to_string()],
      mean: array![0.0005, 0.0003],
      cov: array![[s1 * s1, rho * s1 * s2], [rho * s1 * s2, s2 * s2]],
      periods_per_year: 1.0,
    }
  }

  fn weights(pairs: &[(&str, f64)]) -> Weights {
    pairs.iter().map(|(s, w)| (s.to_string(), *w)).collect()
  }

  #[test]
  fn terminal_mean_matches_compounded_expectation() {
    let stats = daily_stats();
    let w = weights(&[("AAA", 0.6), ("BBB", 0.4)]);
    let sim = ReturnSimulator::new(400, 90, 10_000.0, Some(42))
      .simulate_with_stats(&stats, &w)
      .unwrap();

    assert_eq!(sim.values.dim(), (90, 400));
    let growth: f64 = 1.0 + 0.6 * 0.0005 + 0.4 * 0.0003;
    let expected = 10_000.0 * growth.powi(90);
    let mean = sim.terminal_values().mean().unwrap();
    assert_relative_eq!(mean, expected, max_relative = 0.02);
    assert_relative_eq!(sim.mean_path()[89], mean, max_relative = 1e-12);
  }

  #[test]
  fn paths_are_reproducible_for_a_seed() {
    let stats = daily_stats();
    let w = weights(&[("AAA", 0.5), ("BBB", 0.5)]);
    let a = ReturnSimulator::new(50, 20, 1_000.0, Some(9))
      .simulate_with_stats(&stats, &w)
      .unwrap();
    let b = ReturnSimulator::new(50, 20, 1_000.0, Some(9))
      .simulate_with_stats(&stats, &w)
      .unwrap();
    let c = ReturnSimulator::new(50, 20, 1_000.0, Some(10))
      .simulate_with_stats(&stats, &w)
      .unwrap();

    assert_eq!(a, b);
    assert_ne!(a.values, c.values);
  }

  #[test]
  fn only_positively_weighted_assets_are_simulated() {
    let stats = daily_stats();
    let w = weights(&[("AAA", 1.0), ("BBB", 0.0)]);
    let sim = ReturnSimulator::new(10, 5, 100.0, Some(1))
      .simulate_with_stats(&stats, &w)
      .unwrap();
    assert_eq!(sim.weights.len(), 1);
    assert_eq!(sim.weights["AAA"], 1.0);
    assert_eq!(sim.terminal_gains().len(), 10);
  }

  #[test]
  fn non_positive_definite_covariance_fails() {
    let stats = ReturnStatistics {
      symbols: vec!["AAA".to_string(), "BBB".to_string()],
      mean: array![0.0, 0.0],
      cov: array![[1.0, 2.0], [2.0, 1.0]],
      periods_per_year: 1.0,
    };
    let err = ReturnSimulator::default()
      .simulate_with_stats(&stats, &weights(&[("AAA", 0.5), ("BBB", 0.5)]))
      .unwrap_err();
    assert_eq!(err, NumericalError::CholeskyFailed(2).into());
  }

  #[test]
  fn inputs_are_validated() {
    let stats = daily_stats();
    let w = weights(&[("AAA", 1.0)]);

    let err = ReturnSimulator::new(0, 90, 10_000.0, None)
      .simulate_with_stats(&stats, &w)
      .unwrap_err();
    assert!(matches!(
      err,
      PortfolioError::Configuration(ConfigurationError::InvalidParameter {
        name: "num_simulations",
        ..
      })
    ));

    let err = ReturnSimulator::default()
      .simulate_with_stats(&stats, &weights(&[("ZZZ", 1.0)]))
      .unwrap_err();
    assert_eq!(err, DataError::UnknownAsset("ZZZ".to_string()).into());

    let err = ReturnSimulator::default()
      .simulate_with_stats(&stats, &Weights::new())
      .unwrap_err();
    assert_eq!(err, DataError::EmptyWeights.into());
  }

  #[test]
  fn simulates_from_a_return_frame() {
    let prices = PriceFrame::from_series(&[
      series("AAA", &[100.0, 101.0, 99.5, 102.0, 103.0, 101.5]),
      series("BBB", &[50.0, 49.0, 50.5, 50.0, 51.5, 52.0]),
    ])
    .unwrap();
    let returns = ReturnFrame::from_prices(&prices).unwrap();
    let sim = ReturnSimulator::new(25, 12, 500.0, Some(5))
      .simulate(&returns, &weights(&[("AAA", 0.7), ("BBB", 0.3)]))
      .unwrap();

    assert_eq!(sim.horizon(), 12);
    assert_eq!(sim.num_simulations(), 25);
    assert!(sim.values.iter().all(|v| v.is_finite() && *v > 0.0));
    assert_eq!(sim.gains_summary().unwrap().count, 25);
  }
}
