//! # Stats
//!
//! $$
//! Q(p) = x_{(\lfloor h\rfloor)} + (h-\lfloor h\rfloor)\,(x_{(\lfloor h\rfloor+1)}-x_{(\lfloor h\rfloor)}),\quad h=p\,(n-1)
//! $$
//!
//! Sample statistics shared by the return builder, the collection and the risk
//! evaluator.

use serde::Serialize;
use statrs::statistics::Statistics;

use crate::error::DataError;
use crate::error::Result;

/// Sorted copy of a sample, NaN last.
pub fn sorted(xs: &[f64]) -> Vec<f64> {
  let mut out = xs.to_vec();
  out.sort_by(|a, b| a.total_cmp(b));
  out
}

/// Linear-interpolation percentile of an ascending sample, `p` in `[0, 1]`.
pub fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
  let n = sorted.len();
  if n == 0 {
    return f64::NAN;
  }
  if n == 1 {
    return sorted[0];
  }

  let h = p.clamp(0.0, 1.0) * (n - 1) as f64;
  let lo = h.floor() as usize;
  let hi = (lo + 1).min(n - 1);
  let frac = h - lo as f64;
  sorted[lo] + frac * (sorted[hi] - sorted[lo])
}

/// Linear-interpolation percentile of an unsorted sample.
pub fn percentile(xs: &[f64], p: f64) -> Result<f64> {
  if xs.is_empty() {
    return Err(DataError::EmptySample.into());
  }
  Ok(percentile_sorted(&sorted(xs), p))
}

/// Summary of a sample in the shape of a `describe()` table.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct SummaryStatistics {
  pub count: usize,
  pub mean: f64,
  /// Sample standard deviation (n - 1), NaN for a single observation.
  pub std: f64,
  pub min: f64,
  pub p25: f64,
  pub median: f64,
  pub p75: f64,
  pub max: f64,
}

pub fn describe(xs: &[f64]) -> Result<SummaryStatistics> {
  if xs.is_empty() {
    return Err(DataError::EmptySample.into());
  }

  let s = sorted(xs);
  Ok(SummaryStatistics {
    count: xs.len(),
    mean: xs.mean(),
    std: xs.std_dev(),
    min: s[0],
    p25: percentile_sorted(&s, 0.25),
    median: percentile_sorted(&s, 0.5),
    p75: percentile_sorted(&s, 0.75),
    max: s[s.len() - 1],
  })
}
