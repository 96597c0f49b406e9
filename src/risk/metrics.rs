//! # Value at Risk
//!
//! $$
//! \operatorname{VaR}_\alpha = Q_G(\alpha),\qquad
//! \operatorname{CVaR}_\alpha = \mathbb E\left[G \mid G \le \operatorname{VaR}_\alpha\right]
//! $$
//!
//! Historical VaR and expected shortfall of a sample of gains and losses.
//! Both are reported as gains, so losses are negative.

use std::collections::BTreeMap;

use ordered_float::OrderedFloat;
use tracing::info;

use super::simulation::SimulationResult;
use crate::error::ConfigurationError;
use crate::error::DataError;
use crate::error::Result;
use crate::stats::describe;
use crate::stats::percentile_sorted;
use crate::stats::sorted;
use crate::stats::SummaryStatistics;

/// Risk measure keyed by tail probability α.
pub type RiskMap = BTreeMap<OrderedFloat<f64>, f64>;

/// Every α must lie strictly inside `(0, 1)`; at least one is required.
pub fn validate_alphas(alphas: &[f64]) -> Result<()> {
  if alphas.is_empty() {
    return Err(ConfigurationError::NoAlphas.into());
  }
  match alphas.iter().find(|a| !(**a > 0.0 && **a < 1.0)) {
    Some(&a) => Err(ConfigurationError::InvalidAlpha(a).into()),
    None => Ok(()),
  }
}

fn check_alpha(alpha: f64) -> Result<()> {
  validate_alphas(&[alpha])
}

fn check_sample(gains: &[f64]) -> Result<()> {
  if gains.is_empty() {
    return Err(DataError::EmptySample.into());
  }
  Ok(())
}

/// Linear-interpolation α-percentile of `gains`.
pub fn value_at_risk(gains: &[f64], alpha: f64) -> Result<f64> {
  check_alpha(alpha)?;
  check_sample(gains)?;
  Ok(percentile_sorted(&sorted(gains), alpha))
}

/// Mean of the observations at or below `var`.
pub fn conditional_value_at_risk(gains: &[f64], alpha: f64, var: f64) -> Result<f64> {
  check_alpha(alpha)?;
  check_sample(gains)?;
  Ok(tail_mean(gains, var))
}

fn tail_mean(gains: &[f64], var: f64) -> f64 {
  let (sum, count) = gains
    .iter()
    .filter(|g| **g <= var)
    .fold((0.0, 0usize), |(s, c), g| (s + g, c + 1));
  // VaR never undercuts the sample minimum, so the tail is empty only for NaN input.
  if count == 0 {
    var
  } else {
    sum / count as f64
  }
}

/// VaR at every α, sorting the sample once.
pub fn value_at_risk_for_alphas(gains: &[f64], alphas: &[f64]) -> Result<RiskMap> {
  validate_alphas(alphas)?;
  check_sample(gains)?;
  let s = sorted(gains);
  Ok(
    alphas
      .iter()
      .map(|&a| (OrderedFloat(a), percentile_sorted(&s, a)))
      .collect(),
  )
}

/// CVaR at every α of a VaR map computed for the same α list.
pub fn conditional_value_at_risk_for_alphas(
  gains: &[f64],
  alphas: &[f64],
  var: &RiskMap,
) -> Result<RiskMap> {
  validate_alphas(alphas)?;
  let requested: Vec<OrderedFloat<f64>> = {
    let mut keys: Vec<_> = alphas.iter().copied().map(OrderedFloat).collect();
    keys.sort();
    keys.dedup();
    keys
  };
  if !var.keys().eq(requested.iter()) {
    return Err(
      ConfigurationError::MismatchedAlphas {
        var_keys: var.keys().map(|k| k.0).collect(),
        alphas: alphas.to_vec(),
      }
      .into(),
    );
  }
  check_sample(gains)?;

  Ok(
    var
      .iter()
      .map(|(a, v)| (*a, tail_mean(gains, *v)))
      .collect(),
  )
}

/// VaR and CVaR maps plus a summary of the underlying gains.
#[derive(Clone, Debug, PartialEq)]
pub struct RiskReport {
  pub var: RiskMap,
  pub cvar: RiskMap,
  pub summary: SummaryStatistics,
}

/// Evaluates tail risk of simulated terminal gains at a fixed α family.
#[derive(Clone, Debug, PartialEq)]
pub struct RiskEvaluator {
  alphas: Vec<f64>,
}

impl RiskEvaluator {
  pub fn new(alphas: Vec<f64>) -> Result<Self> {
    validate_alphas(&alphas)?;
    Ok(Self { alphas })
  }

  pub fn alphas(&self) -> &[f64] {
    &self.alphas
  }

  pub fn evaluate(&self, simulation: &SimulationResult) -> Result<RiskReport> {
    let report = self.evaluate_gains(&simulation.terminal_gains())?;
    for (a, v) in &report.var {
      info!(alpha = a.0, var = *v, cvar = report.cvar[a], "tail risk");
    }
    Ok(report)
  }

  pub fn evaluate_gains(&self, gains: &[f64]) -> Result<RiskReport> {
    let var = value_at_risk_for_alphas(gains, &self.alphas)?;
    let cvar = conditional_value_at_risk_for_alphas(gains, &self.alphas, &var)?;
    Ok(RiskReport {
      var,
      cvar,
      summary: describe(gains)?,
    })
  }
}

impl Default for RiskEvaluator {
  fn default() -> Self {
    Self {
      alphas: vec![0.01, 0.05, 0.1],
    }
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_relative_eq;
  use ndarray::Array1;
  use ndarray_rand::RandomExt;
  use rand::rngs::StdRng;
  use rand::SeedableRng;
  use rand_distr::StandardNormal;
  use statrs::distribution::Continuous;
  use statrs::distribution::ContinuousCDF;
  use statrs::distribution::Normal;

  use super::*;
  use crate::error::PortfolioError;

  fn normal_sample(n: usize) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(2024);
    Array1::<f64>::random_using(n, StandardNormal, &mut rng).to_vec()
  }

  #[test]
  fn matches_closed_form_normal_tail() {
    let gains = normal_sample(400_000);
    let n = Normal::new(0.0, 1.0).unwrap();

    for alpha in [0.05, 0.1] {
      let z = n.inverse_cdf(alpha);
      let var = value_at_risk(&gains, alpha).unwrap();
      let cvar = conditional_value_at_risk(&gains, alpha, var).unwrap();
      assert_relative_eq!(var, z, max_relative = 0.01);
      assert_relative_eq!(cvar, -n.pdf(z) / alpha, max_relative = 0.01);
    }
  }

  #[test]
  fn cvar_never_exceeds_var() {
    let gains = normal_sample(5_000);
    let alphas = [0.01, 0.05, 0.1, 0.5, 0.9];
    let report = RiskEvaluator::new(alphas.to_vec())
      .unwrap()
      .evaluate_gains(&gains)
      .unwrap();

    assert_eq!(report.var.len(), 5);
    assert!(report.var.keys().eq(report.cvar.keys()));
    for (a, v) in &report.var {
      assert!(report.cvar[a] <= *v, "alpha {}", a.0);
    }
    assert_eq!(report.summary.count, 5_000);
  }

  #[test]
  fn percentile_interpolates_between_observations() {
    let gains = [-10.0, -5.0, 0.0, 5.0, 10.0];
    let var = value_at_risk(&gains, 0.1).unwrap();
    assert_relative_eq!(var, -8.0);
    assert_relative_eq!(conditional_value_at_risk(&gains, 0.1, var).unwrap(), -10.0);
  }

  #[test]
  fn invalid_alphas_are_rejected_before_computation() {
    for bad in [0.0, 1.0, -0.1, 1.5, f64::NAN] {
      let err = value_at_risk(&[], bad).unwrap_err();
      assert!(err.is_configuration(), "{bad}");
    }
    assert_eq!(
      RiskEvaluator::new(vec![]).unwrap_err(),
      ConfigurationError::NoAlphas.into()
    );
    assert_eq!(
      value_at_risk(&[], 0.05).unwrap_err(),
      DataError::EmptySample.into()
    );
  }

  #[test]
  fn mismatched_var_keys_are_rejected() {
    let gains = normal_sample(100);
    let var = value_at_risk_for_alphas(&gains, &[0.01, 0.05]).unwrap();
    let err = conditional_value_at_risk_for_alphas(&gains, &[0.01, 0.1], &var).unwrap_err();
    assert!(matches!(
      err,
      PortfolioError::Configuration(ConfigurationError::MismatchedAlphas { .. })
    ));
  }
}
