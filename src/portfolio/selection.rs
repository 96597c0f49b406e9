//! # Best Portfolio Selection
//!
//! $$
//! p^\* = \arg\max_{p\in\mathcal C} S_p,\qquad
//! \mathbf w^\*=\{(s, w_s) : w_s > w_{\min}\}
//! $$

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use super::collection::PortfolioCollection;
use super::types::Portfolio;
use super::types::Weights;
use crate::config::DEFAULT_MIN_WEIGHT;
use crate::error::DataError;
use crate::error::Result;

/// Ranking criterion of the selector.
#[derive(Default, Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMetric {
  #[default]
  Sharpe,
  Return,
  MinVolatility,
}

impl SelectionMetric {
  /// Whether `a` ranks strictly ahead of `b`.
  fn beats(&self, a: &Portfolio, b: &Portfolio) -> bool {
    match self {
      SelectionMetric::Sharpe => a.sharpe > b.sharpe,
      SelectionMetric::Return => a.expected_return > b.expected_return,
      SelectionMetric::MinVolatility => a.volatility < b.volatility,
    }
  }
}

/// Picks the top portfolio of a collection and prunes negligible weights.
#[derive(Clone, Copy, Debug)]
pub struct BestPortfolioSelector {
  pub min_weight: f64,
  pub metric: SelectionMetric,
}

impl Default for BestPortfolioSelector {
  fn default() -> Self {
    Self {
      min_weight: DEFAULT_MIN_WEIGHT,
      metric: SelectionMetric::Sharpe,
    }
  }
}

impl BestPortfolioSelector {
  pub fn new(min_weight: f64, metric: SelectionMetric) -> Self {
    Self { min_weight, metric }
  }

  /// First-inserted record with the best metric.
  pub fn best_portfolio(&self, collection: &PortfolioCollection) -> Result<Portfolio> {
    collection.with_records(|records| self.best_of(records).cloned())
  }

  /// Pruned weights of [`Self::best_portfolio`]. The collection is unchanged.
  pub fn best_weights(&self, collection: &PortfolioCollection) -> Result<Weights> {
    Ok(self.best_portfolio(collection)?.pruned_weights(self.min_weight))
  }

  /// Best record of every solver present in the collection.
  pub fn best_by_solver(&self, collection: &PortfolioCollection) -> BTreeMap<String, Portfolio> {
    collection.with_records(|records| {
      let mut best: BTreeMap<String, &Portfolio> = BTreeMap::new();
      for p in records {
        match best.get(&p.solver) {
          Some(current) if !self.metric.beats(p, current) => {}
          _ => {
            best.insert(p.solver.clone(), p);
          }
        }
      }
      best.into_iter().map(|(k, p)| (k, p.clone())).collect()
    })
  }

  fn best_of<'p>(&self, records: &'p [Portfolio]) -> Result<&'p Portfolio> {
    let mut iter = records.iter();
    let mut best = iter.next().ok_or(DataError::EmptyCollection)?;
    for p in iter {
      if self.metric.beats(p, best) {
        best = p;
      }
    }
    Ok(best)
  }
}
