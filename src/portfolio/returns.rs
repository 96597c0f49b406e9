//! # Return Statistics
//!
//! $$
//! r_{t,i}=\frac{P_{t,i}}{P_{t-1,i}}-1,\qquad
//! \mu = k\,\bar r,\qquad \Sigma = \frac{k}{T-1}\sum_t (r_t-\bar r)(r_t-\bar r)^\top
//! $$
//!
//! Periodic returns and their (optionally annualized) first two moments.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use ndarray::Array1;
use ndarray::Array2;
use ndarray::Axis;
use ndarray::s;
use ndarray_stats::CorrelationExt;
use tracing::debug;

use super::data::AssetHistory;
use super::data::PriceFrame;
use crate::config::TradingPeriod;
use crate::error::DataError;
use crate::error::Result;

/// Simple periodic returns, rows are dates (first price date dropped).
#[derive(Clone, Debug, PartialEq)]
pub struct ReturnFrame {
  dates: Vec<NaiveDate>,
  symbols: Vec<String>,
  returns: Array2<f64>,
}

impl ReturnFrame {
  /// Percentage change of every column.
  pub fn from_prices(prices: &PriceFrame) -> Result<Self> {
    let p = prices.prices();
    let (rows, cols) = p.dim();
    if rows < 2 || cols == 0 {
      return Err(
        DataError::EmptyReturns {
          rows: rows.saturating_sub(1),
          cols,
        }
        .into(),
      );
    }

    let prev = p.slice(s![..-1, ..]);
    let next = p.slice(s![1.., ..]);
    let returns = &next / &prev - 1.0;

    Ok(Self {
      dates: prices.dates()[1..].to_vec(),
      symbols: prices.symbols().to_vec(),
      returns,
    })
  }

  pub fn dates(&self) -> &[NaiveDate] {
    &self.dates
  }

  pub fn symbols(&self) -> &[String] {
    &self.symbols
  }

  pub fn returns(&self) -> &Array2<f64> {
    &self.returns
  }

  pub fn n_observations(&self) -> usize {
    self.returns.nrows()
  }

  /// Continuously compounded returns `ln(1 + r)`.
  pub fn log_returns(&self) -> Array2<f64> {
    self.returns.mapv(f64::ln_1p)
  }
}

/// Mean vector and covariance matrix aligned with `symbols`.
#[derive(Clone, Debug, PartialEq)]
pub struct ReturnStatistics {
  pub symbols: Vec<String>,
  pub mean: Array1<f64>,
  pub cov: Array2<f64>,
  /// Factor the periodic moments were multiplied by (1 when unannualized).
  pub periods_per_year: f64,
}

impl ReturnStatistics {
  /// Sample moments at the native sampling frequency.
  pub fn periodic(frame: &ReturnFrame) -> Result<Self> {
    Self::scaled(frame, 1.0)
  }

  /// Sample moments scaled to a yearly basis.
  pub fn annualized(frame: &ReturnFrame, period: TradingPeriod) -> Result<Self> {
    Self::scaled(frame, period.periods_per_year())
  }

  fn scaled(frame: &ReturnFrame, k: f64) -> Result<Self> {
    let (rows, cols) = frame.returns.dim();
    if rows == 0 || cols == 0 {
      return Err(DataError::EmptyReturns { rows, cols }.into());
    }
    if rows < 2 {
      return Err(DataError::InsufficientObservations { observations: rows }.into());
    }

    let mean = frame
      .returns
      .mean_axis(Axis(0))
      .ok_or(DataError::EmptyReturns { rows, cols })?;
    let cov = frame
      .returns
      .t()
      .cov(1.0)
      .map_err(|_| DataError::EmptyReturns { rows, cols })?;

    Ok(Self {
      symbols: frame.symbols.clone(),
      mean: mean * k,
      cov: cov * k,
      periods_per_year: k,
    })
  }

  pub fn n_assets(&self) -> usize {
    self.symbols.len()
  }

  /// Per-asset volatility `sqrt(diag(Σ))`.
  pub fn volatilities(&self) -> Array1<f64> {
    self.cov.diag().mapv(|v| v.max(0.0).sqrt())
  }

  /// Pearson correlation implied by the covariance; zero-variance assets get
  /// zero off-diagonal correlation.
  pub fn correlation(&self) -> Array2<f64> {
    let sd = self.volatilities();
    let n = sd.len();
    Array2::from_shape_fn((n, n), |(i, j)| {
      if i == j {
        1.0
      } else {
        let denom = sd[i] * sd[j];
        if denom > 1e-15 {
          (self.cov[[i, j]] / denom).clamp(-1.0, 1.0)
        } else {
          0.0
        }
      }
    })
  }

  /// Restrict to `symbols`, in that order.
  pub fn subset(&self, symbols: &[String]) -> Result<Self> {
    let idx = symbols
      .iter()
      .map(|s| {
        self
          .symbols
          .iter()
          .position(|x| x == s)
          .ok_or_else(|| DataError::UnknownAsset(s.clone()).into())
      })
      .collect::<Result<Vec<_>>>()?;

    Ok(Self {
      symbols: symbols.to_vec(),
      mean: self.mean.select(Axis(0), &idx),
      cov: self.cov.select(Axis(0), &idx).select(Axis(1), &idx),
      periods_per_year: self.periods_per_year,
    })
  }
}

/// Builds aligned return frames and annualized moments from price histories.
#[derive(Clone, Copy, Debug, Default)]
pub struct ReturnSeriesBuilder {
  period: TradingPeriod,
}

impl ReturnSeriesBuilder {
  pub fn new(period: TradingPeriod) -> Self {
    Self { period }
  }

  /// Builder for a textual period key (`daily`, `weekly`, `monthly`, `yearly`).
  pub fn from_key(period: &str) -> Result<Self> {
    Ok(Self::new(period.parse()?))
  }

  pub fn period(&self) -> TradingPeriod {
    self.period
  }

  /// Returns and annualized moments of an already aligned price frame.
  pub fn build_from_frame(&self, prices: &PriceFrame) -> Result<(ReturnFrame, ReturnStatistics)> {
    let frame = ReturnFrame::from_prices(prices)?;
    let stats = ReturnStatistics::annualized(&frame, self.period)?;
    debug!(
      assets = stats.n_assets(),
      observations = frame.n_observations(),
      period = %self.period,
      "built return statistics"
    );
    Ok((frame, stats))
  }

  /// Align `field` of every history, then build returns and moments.
  pub fn build(
    &self,
    histories: &BTreeMap<String, AssetHistory>,
    field: &str,
  ) -> Result<(ReturnFrame, ReturnStatistics)> {
    let prices = PriceFrame::from_histories(histories.values(), field)?;
    self.build_from_frame(&prices)
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use approx::assert_relative_eq;

  use super::*;
  use crate::error::ConfigurationError;
  use crate::portfolio::data::tests::day;
  use crate::portfolio::data::tests::series;

  fn compounding(r: f64, n: usize) -> Vec<f64> {
    (0..n).map(|i| 100.0 * (1.0 + r).powi(i as i32)).collect()
  }

  #[test]
  fn constant_return_annualizes_exactly() {
    let r = 0.001;
    let frame = PriceFrame::from_series(&[series("AAA", &compounding(r, 30))]).unwrap();

    for period in TradingPeriod::ALL {
      let (_, stats) = ReturnSeriesBuilder::new(period).build_from_frame(&frame).unwrap();
      assert_relative_eq!(
        stats.mean[0],
        r * period.periods_per_year(),
        max_relative = 1e-9
      );
      assert_abs_diff_eq!(stats.cov[[0, 0]], 0.0, epsilon = 1e-18);
    }
  }

  #[test]
  fn covariance_scales_with_period_constant() {
    let frame = PriceFrame::from_series(&[
      series("AAA", &[100.0, 101.0, 99.5, 102.0, 103.0]),
      series("BBB", &[50.0, 49.0, 50.5, 50.0, 51.5]),
    ])
    .unwrap();
    let returns = ReturnFrame::from_prices(&frame).unwrap();
    let daily = ReturnStatistics::periodic(&returns).unwrap();
    let weekly = ReturnStatistics::annualized(&returns, TradingPeriod::Weekly).unwrap();

    assert_eq!(returns.dates()[0], day(1));
    assert_eq!(returns.n_observations(), 4);
    assert_relative_eq!(weekly.cov[[0, 1]], daily.cov[[0, 1]] * 52.0, max_relative = 1e-12);
    assert_relative_eq!(daily.cov[[0, 1]], daily.cov[[1, 0]]);

    let a = returns.returns().column(0).to_owned();
    let mean = a.mean().unwrap();
    let var = a.mapv(|x| (x - mean).powi(2)).sum() / 3.0;
    assert_relative_eq!(daily.cov[[0, 0]], var, max_relative = 1e-12);
  }

  #[test]
  fn empty_and_short_frames_are_data_errors() {
    let one = PriceFrame::from_series(&[series("AAA", &[100.0])]).unwrap();
    assert!(matches!(
      ReturnFrame::from_prices(&one).unwrap_err(),
      crate::error::PortfolioError::Data(DataError::EmptyReturns { rows: 0, cols: 1 })
    ));

    let two = PriceFrame::from_series(&[series("AAA", &[100.0, 101.0])]).unwrap();
    let frame = ReturnFrame::from_prices(&two).unwrap();
    assert_eq!(
      ReturnStatistics::periodic(&frame).unwrap_err(),
      DataError::InsufficientObservations { observations: 1 }.into()
    );
  }

  #[test]
  fn unknown_period_key_is_rejected() {
    assert_eq!(
      ReturnSeriesBuilder::from_key("quarterly").unwrap_err(),
      ConfigurationError::UnknownPeriod("quarterly".to_string()).into()
    );
    assert_eq!(
      ReturnSeriesBuilder::from_key("monthly").unwrap().period(),
      TradingPeriod::Monthly
    );
  }

  #[test]
  fn builder_reads_histories_by_field() {
    let histories: BTreeMap<String, AssetHistory> = ["AAA", "BBB"]
      .iter()
      .enumerate()
      .map(|(k, s)| {
        let points = (0..5)
          .map(|i| (day(i), 10.0 + (k as f64 + 1.0) * (i as f64) + (i % 2) as f64))
          .collect();
        (s.to_string(), AssetHistory::single(*s, "Close", points).unwrap())
      })
      .collect();

    let (frame, stats) = ReturnSeriesBuilder::default().build(&histories, "Close").unwrap();
    assert_eq!(frame.symbols(), stats.symbols.as_slice());
    assert_eq!(stats.cov.dim(), (2, 2));
    assert_eq!(stats.periods_per_year, 252.0);

    let corr = stats.correlation();
    assert_abs_diff_eq!(corr[[0, 0]], 1.0);
    assert!(corr[[0, 1]].abs() <= 1.0);

    let sub = stats.subset(&["BBB".to_string()]).unwrap();
    assert_eq!(sub.mean[0], stats.mean[1]);
    assert_eq!(sub.cov[[0, 0]], stats.cov[[1, 1]]);
  }

  #[test]
  fn log_returns_match_ln_one_plus_r() {
    let frame = PriceFrame::from_series(&[series("AAA", &[100.0, 110.0])]).unwrap();
    let returns = ReturnFrame::from_prices(&frame).unwrap();
    assert_relative_eq!(returns.log_returns()[[0, 0]], 1.1_f64.ln(), max_relative = 1e-12);
  }
}
