//! # Portfolio Collection
//!
//! $$
//! \mathcal C_{n+1} = \mathcal C_n \,\Vert\, (s, \mu_p, \sigma_p, S_p, \mathbf w)
//! $$
//!
//! Append-only ledger of every candidate evaluated by any solver run.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use serde::Serialize;
use statrs::statistics::Statistics;

use super::types::Portfolio;

/// Ordered, append-only sequence of [`Portfolio`] records.
///
/// Appends go through an internal lock, so several solver runs may share one
/// collection by reference, also across threads. Records are never mutated or
/// removed.
#[derive(Debug, Default)]
pub struct PortfolioCollection {
  records: Mutex<Vec<Portfolio>>,
}

impl Clone for PortfolioCollection {
  fn clone(&self) -> Self {
    Self {
      records: Mutex::new(self.snapshot()),
    }
  }
}

impl PortfolioCollection {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> MutexGuard<'_, Vec<Portfolio>> {
    self.records.lock().unwrap_or_else(PoisonError::into_inner)
  }

  pub fn append(&self, portfolio: Portfolio) {
    self.lock().push(portfolio);
  }

  /// Append a batch contiguously, keeping its order.
  pub fn extend<I: IntoIterator<Item = Portfolio>>(&self, portfolios: I) {
    self.lock().extend(portfolios);
  }

  pub fn len(&self) -> usize {
    self.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.lock().is_empty()
  }

  /// Copy of all records in insertion order.
  pub fn snapshot(&self) -> Vec<Portfolio> {
    self.lock().clone()
  }

  /// Run `f` over the records without copying them.
  pub fn with_records<R>(&self, f: impl FnOnce(&[Portfolio]) -> R) -> R {
    f(&self.lock())
  }

  pub fn into_records(self) -> Vec<Portfolio> {
    self.records.into_inner().unwrap_or_else(PoisonError::into_inner)
  }

  /// Solver tags in order of first appearance.
  pub fn solvers(&self) -> Vec<String> {
    self.with_records(|records| {
      let mut out: Vec<String> = Vec::new();
      for p in records {
        if !out.contains(&p.solver) {
          out.push(p.solver.clone());
        }
      }
      out
    })
  }

  /// Records produced by `solver`, in insertion order.
  pub fn for_solver(&self, solver: &str) -> Vec<Portfolio> {
    self.with_records(|records| {
      records
        .iter()
        .filter(|p| p.solver == solver)
        .cloned()
        .collect()
    })
  }

  /// Records of `solver` sorted by Sharpe ratio, descending (stable).
  pub fn ranked_for_solver(&self, solver: &str) -> Vec<Portfolio> {
    let mut out = self.for_solver(solver);
    out.sort_by(|a, b| b.sharpe.total_cmp(&a.sharpe));
    out
  }

  /// Mean, std, min and max of return, volatility and Sharpe per solver.
  pub fn stats_by_solver(&self) -> BTreeMap<String, SolverStatistics> {
    self.with_records(|records| {
      let mut grouped: BTreeMap<String, Vec<&Portfolio>> = BTreeMap::new();
      for p in records {
        grouped.entry(p.solver.clone()).or_default().push(p);
      }
      grouped
        .into_iter()
        .map(|(solver, ps)| {
          let stats = SolverStatistics {
            count: ps.len(),
            expected_return: ColumnStatistics::of(ps.iter().map(|p| p.expected_return)),
            volatility: ColumnStatistics::of(ps.iter().map(|p| p.volatility)),
            sharpe: ColumnStatistics::of(ps.iter().map(|p| p.sharpe)),
          };
          (solver, stats)
        })
        .collect()
    })
  }
}

impl FromIterator<Portfolio> for PortfolioCollection {
  fn from_iter<I: IntoIterator<Item = Portfolio>>(iter: I) -> Self {
    Self {
      records: Mutex::new(iter.into_iter().collect()),
    }
  }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct ColumnStatistics {
  pub mean: f64,
  pub std: f64,
  pub min: f64,
  pub max: f64,
}

impl ColumnStatistics {
  fn of(values: impl Iterator<Item = f64>) -> Self {
    let xs: Vec<f64> = values.collect();
    Self {
      mean: xs.iter().mean(),
      std: xs.iter().std_dev(),
      min: Statistics::min(&xs),
      max: Statistics::max(&xs),
    }
  }
}

/// Per-solver summary of a collection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct SolverStatistics {
  pub count: usize,
  pub expected_return: ColumnStatistics,
  pub volatility: ColumnStatistics,
  pub sharpe: ColumnStatistics,
}

#[cfg(test)]
pub(crate) mod tests {
  use rayon::prelude::*;

  use super::*;
  use crate::portfolio::types::Weights;

  pub(crate) fn record(solver: &str, sharpe: f64, w_a: f64) -> Portfolio {
    Portfolio {
      solver: solver.to_string(),
      expected_return: sharpe * 0.1,
      volatility: 0.1,
      sharpe,
      weights: Weights::from([("AAA".to_string(), w_a), ("BBB".to_string(), 1.0 - w_a)]),
    }
  }

  #[test]
  fn appends_preserve_insertion_order() {
    let c = PortfolioCollection::new();
    c.append(record("lbfgs", 1.0, 0.5));
    c.extend([record("monte carlo", 0.5, 0.2), record("lbfgs", 2.0, 0.7)]);

    let sharpes: Vec<f64> = c.snapshot().iter().map(|p| p.sharpe).collect();
    assert_eq!(sharpes, vec![1.0, 0.5, 2.0]);
    assert_eq!(c.solvers(), vec!["lbfgs".to_string(), "monte carlo".to_string()]);
    assert_eq!(c.for_solver("lbfgs").len(), 2);
    assert_eq!(c.ranked_for_solver("lbfgs")[0].sharpe, 2.0);
  }

  #[test]
  fn concurrent_appends_are_serialized() {
    let c = PortfolioCollection::new();
    (0..8).into_par_iter().for_each(|k| {
      for i in 0..250 {
        c.append(record(&format!("worker-{k}"), i as f64, 0.5));
      }
    });

    assert_eq!(c.len(), 2000);
    for k in 0..8 {
      let own: Vec<f64> = c
        .for_solver(&format!("worker-{k}"))
        .iter()
        .map(|p| p.sharpe)
        .collect();
      assert_eq!(own, (0..250).map(|i| i as f64).collect::<Vec<_>>());
    }
  }

  #[test]
  fn stats_group_by_solver() {
    let c: PortfolioCollection = [
      record("monte carlo", 1.0, 0.1),
      record("monte carlo", 3.0, 0.2),
      record("lbfgs", 2.0, 0.3),
    ]
    .into_iter()
    .collect();

    let stats = c.stats_by_solver();
    let mc = stats["monte carlo"];
    assert_eq!(mc.count, 2);
    assert_eq!(mc.sharpe.mean, 2.0);
    assert_eq!((mc.sharpe.min, mc.sharpe.max), (1.0, 3.0));
    assert!((mc.sharpe.std - 2.0_f64.sqrt()).abs() < 1e-12);
    assert_eq!(stats["lbfgs"].count, 1);
  }
}
