//! # Portfolio Data
//!
//! $$
//! P\in\mathbb R^{T\times N},\qquad P_{t,i} = \text{price of asset } i \text{ on date } t
//! $$
//!
//! Per-asset price histories, lazily materialized price sources and the
//! date-aligned price frame the rest of the engine works on.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::OnceLock;

use chrono::NaiveDate;
use ndarray::Array1;
use ndarray::Array2;
use ndarray::Axis;
use ndarray_rand::RandomExt;
use rand_distr::Normal;
use serde::Serialize;

use crate::error::DataError;
use crate::error::Result;
use crate::rng::stream_rng;
use crate::stats::describe;
use crate::stats::SummaryStatistics;

fn check_ascending(symbol: &str, dates: &[NaiveDate]) -> Result<()> {
  for pair in dates.windows(2) {
    if pair[1] <= pair[0] {
      return Err(
        DataError::UnsortedDates {
          symbol: symbol.to_string(),
          date: pair[1],
        }
        .into(),
      );
    }
  }
  Ok(())
}

/// Single priced field of one asset.
#[derive(Clone, Debug, PartialEq)]
pub struct AssetSeries {
  symbol: String,
  points: Vec<(NaiveDate, f64)>,
}

impl AssetSeries {
  /// Build a series; dates must be strictly ascending.
  pub fn new(symbol: impl Into<String>, points: Vec<(NaiveDate, f64)>) -> Result<Self> {
    let symbol = symbol.into();
    let dates: Vec<NaiveDate> = points.iter().map(|(d, _)| *d).collect();
    check_ascending(&symbol, &dates)?;
    Ok(Self { symbol, points })
  }

  pub fn symbol(&self) -> &str {
    &self.symbol
  }

  pub fn points(&self) -> &[(NaiveDate, f64)] {
    &self.points
  }

  pub fn len(&self) -> usize {
    self.points.len()
  }

  pub fn is_empty(&self) -> bool {
    self.points.is_empty()
  }

  /// Simple returns `p[t] / p[t-1] - 1`, first date dropped.
  pub fn simple_returns(&self) -> Vec<(NaiveDate, f64)> {
    self
      .points
      .windows(2)
      .map(|w| (w[1].0, w[1].1 / w[0].1 - 1.0))
      .collect()
  }
}

/// Price history of one asset with several named columns (e.g. `Close`, `Adj Close`).
#[derive(Clone, Debug, PartialEq)]
pub struct AssetHistory {
  symbol: String,
  dates: Vec<NaiveDate>,
  columns: BTreeMap<String, Vec<f64>>,
}

impl AssetHistory {
  pub fn new(
    symbol: impl Into<String>,
    dates: Vec<NaiveDate>,
    columns: BTreeMap<String, Vec<f64>>,
  ) -> Result<Self> {
    let symbol = symbol.into();
    check_ascending(&symbol, &dates)?;
    for values in columns.values() {
      if values.len() != dates.len() {
        return Err(
          DataError::ColumnLength {
            symbol,
            len: values.len(),
            dates: dates.len(),
          }
          .into(),
        );
      }
    }
    Ok(Self {
      symbol,
      dates,
      columns,
    })
  }

  /// History holding a single named column.
  pub fn single(
    symbol: impl Into<String>,
    field: impl Into<String>,
    points: Vec<(NaiveDate, f64)>,
  ) -> Result<Self> {
    let (dates, values): (Vec<NaiveDate>, Vec<f64>) = points.into_iter().unzip();
    Self::new(symbol, dates, BTreeMap::from([(field.into(), values)]))
  }

  pub fn symbol(&self) -> &str {
    &self.symbol
  }

  pub fn dates(&self) -> &[NaiveDate] {
    &self.dates
  }

  pub fn fields(&self) -> impl Iterator<Item = &str> {
    self.columns.keys().map(String::as_str)
  }

  /// Select one price column.
  pub fn field(&self, field: &str) -> Result<AssetSeries> {
    let values = self.columns.get(field).ok_or_else(|| DataError::MissingField {
      symbol: self.symbol.clone(),
      field: field.to_string(),
    })?;
    Ok(AssetSeries {
      symbol: self.symbol.clone(),
      points: self.dates.iter().copied().zip(values.iter().copied()).collect(),
    })
  }
}

/// Provider of per-asset price histories.
///
/// Implementations may fetch eagerly or defer loading until [`PriceSource::load`]
/// is called; by the time a [`PriceFrame`] is built all requested histories must
/// be materializable.
pub trait PriceSource {
  fn symbols(&self) -> Vec<String>;

  fn load(&self, symbol: &str) -> Result<AssetHistory>;
}

impl PriceSource for BTreeMap<String, AssetHistory> {
  fn symbols(&self) -> Vec<String> {
    self.keys().cloned().collect()
  }

  fn load(&self, symbol: &str) -> Result<AssetHistory> {
    self
      .get(symbol)
      .cloned()
      .ok_or_else(|| DataError::UnknownAsset(symbol.to_string()).into())
  }
}

type Loader = Box<dyn Fn() -> Result<AssetHistory> + Send + Sync>;

struct LazyEntry {
  loader: Loader,
  cell: OnceLock<Result<AssetHistory>>,
}

/// Price source that runs each loader on first access and caches the outcome.
#[derive(Default)]
pub struct LazyPriceSource {
  entries: BTreeMap<String, LazyEntry>,
}

impl LazyPriceSource {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register a deferred loader for `symbol`.
  pub fn insert<F>(&mut self, symbol: impl Into<String>, loader: F)
  where
    F: Fn() -> Result<AssetHistory> + Send + Sync + 'static,
  {
    self.entries.insert(
      symbol.into(),
      LazyEntry {
        loader: Box::new(loader),
        cell: OnceLock::new(),
      },
    );
  }

  /// Whether the history of `symbol` has already been materialized.
  pub fn is_loaded(&self, symbol: &str) -> bool {
    self
      .entries
      .get(symbol)
      .is_some_and(|e| e.cell.get().is_some())
  }
}

impl PriceSource for LazyPriceSource {
  fn symbols(&self) -> Vec<String> {
    self.entries.keys().cloned().collect()
  }

  fn load(&self, symbol: &str) -> Result<AssetHistory> {
    let entry = self
      .entries
      .get(symbol)
      .ok_or_else(|| DataError::UnknownAsset(symbol.to_string()))?;
    entry.cell.get_or_init(|| (entry.loader)()).clone()
  }
}

/// Date-aligned prices: rows are dates, columns are assets.
#[derive(Clone, Debug, PartialEq)]
pub struct PriceFrame {
  dates: Vec<NaiveDate>,
  symbols: Vec<String>,
  prices: Array2<f64>,
}

impl PriceFrame {
  /// Build a frame from raw parts; `prices` must be `dates.len() x symbols.len()`.
  pub fn new(dates: Vec<NaiveDate>, symbols: Vec<String>, prices: Array2<f64>) -> Result<Self> {
    check_ascending("<frame>", &dates)?;
    if prices.nrows() != dates.len() || prices.ncols() != symbols.len() {
      return Err(
        DataError::FrameShape {
          rows: prices.nrows(),
          cols: prices.ncols(),
          dates: dates.len(),
          symbols: symbols.len(),
        }
        .into(),
      );
    }
    let frame = Self {
      dates,
      symbols,
      prices,
    };
    frame.check_prices()?;
    Ok(frame)
  }

  /// Outer-align series on their date union. Every series must cover every date.
  pub fn from_series(series: &[AssetSeries]) -> Result<Self> {
    let dates: Vec<NaiveDate> = series
      .iter()
      .flat_map(|s| s.points.iter().map(|(d, _)| *d))
      .collect::<BTreeSet<_>>()
      .into_iter()
      .collect();

    let mut prices = Array2::<f64>::zeros((dates.len(), series.len()));
    for (j, s) in series.iter().enumerate() {
      let by_date: BTreeMap<NaiveDate, f64> = s.points.iter().copied().collect();
      for (i, date) in dates.iter().enumerate() {
        prices[[i, j]] = *by_date.get(date).ok_or_else(|| DataError::MisalignedSeries {
          symbol: s.symbol.clone(),
          date: *date,
        })?;
      }
    }

    let frame = Self {
      dates,
      symbols: series.iter().map(|s| s.symbol.clone()).collect(),
      prices,
    };
    frame.check_prices()?;
    Ok(frame)
  }

  /// Select `field` from every history and align.
  pub fn from_histories<'a, I>(histories: I, field: &str) -> Result<Self>
  where
    I: IntoIterator<Item = &'a AssetHistory>,
  {
    let series = histories
      .into_iter()
      .map(|h| h.field(field))
      .collect::<Result<Vec<_>>>()?;
    Self::from_series(&series)
  }

  /// Pull every symbol of `source` and align on `field`.
  pub fn from_source(source: &dyn PriceSource, field: &str) -> Result<Self> {
    let histories = source
      .symbols()
      .iter()
      .map(|s| source.load(s))
      .collect::<Result<Vec<_>>>()?;
    Self::from_histories(&histories, field)
  }

  fn check_prices(&self) -> Result<()> {
    for ((i, j), &p) in self.prices.indexed_iter() {
      if !(p.is_finite() && p > 0.0) {
        return Err(
          DataError::InvalidPrice {
            symbol: self.symbols[j].clone(),
            date: self.dates[i],
            price: p,
          }
          .into(),
        );
      }
    }
    Ok(())
  }

  pub fn dates(&self) -> &[NaiveDate] {
    &self.dates
  }

  pub fn symbols(&self) -> &[String] {
    &self.symbols
  }

  pub fn prices(&self) -> &Array2<f64> {
    &self.prices
  }

  pub fn column_index(&self, symbol: &str) -> Option<usize> {
    self.symbols.iter().position(|s| s == symbol)
  }

  /// Prices of one asset.
  pub fn column(&self, symbol: &str) -> Result<Array1<f64>> {
    let j = self
      .column_index(symbol)
      .ok_or_else(|| DataError::UnknownAsset(symbol.to_string()))?;
    Ok(self.prices.column(j).to_owned())
  }

  /// Restrict the frame to `symbols`, in that order.
  pub fn select(&self, symbols: &[String]) -> Result<Self> {
    let idx = symbols
      .iter()
      .map(|s| {
        self
          .column_index(s)
          .ok_or_else(|| DataError::UnknownAsset(s.clone()).into())
      })
      .collect::<Result<Vec<_>>>()?;
    Ok(Self {
      dates: self.dates.clone(),
      symbols: symbols.to_vec(),
      prices: self.prices.select(Axis(1), &idx),
    })
  }

  /// Every column divided by its first price.
  pub fn normalized(&self) -> Self {
    let mut prices = self.prices.clone();
    if prices.nrows() > 0 {
      let first = prices.row(0).to_owned();
      prices /= &first;
    }
    Self {
      dates: self.dates.clone(),
      symbols: self.symbols.clone(),
      prices,
    }
  }

  /// Daily geometric Brownian motion prices starting at 100, one stream per
  /// asset. Drift and volatility grow with the column index.
  ///
  /// $$
  /// P_{t+1} = P_t \exp\left((\mu_i - \tfrac12\sigma_i^2) + \sigma_i Z_t\right)
  /// $$
  pub fn synthetic(symbols: &[String], n_days: usize, seed: u64) -> Result<Self> {
    let start = NaiveDate::from_ymd_opt(2020, 1, 1).ok_or(DataError::EmptySample)?;
    let dates: Vec<NaiveDate> = start.iter_days().take(n_days).collect();
    let mut prices = Array2::<f64>::zeros((n_days, symbols.len()));

    for (j, mut col) in prices.axis_iter_mut(Axis(1)).enumerate() {
      let mu = 0.0002 + 0.0001 * j as f64;
      let sigma = 0.008 + 0.004 * (j % 4) as f64;
      let noise = Normal::new(mu - 0.5 * sigma * sigma, sigma)
        .map_err(|e| crate::config::invalid("sigma", e.to_string()))?;
      let mut rng = stream_rng(seed, j as u64);
      let steps = Array1::random_using(n_days, noise, &mut rng);

      let mut log_growth = 0.0;
      for (i, p) in col.iter_mut().enumerate() {
        if i > 0 {
          log_growth += steps[i];
        }
        *p = 100.0 * f64::exp(log_growth);
      }
    }

    Self::new(dates, symbols.to_vec(), prices)
  }

  /// Date range and per-asset price statistics.
  pub fn summary(&self) -> Result<PriceSummary> {
    let (start, end) = match (self.dates.first(), self.dates.last()) {
      (Some(s), Some(e)) => (*s, *e),
      _ => return Err(DataError::EmptySample.into()),
    };

    let stats = self
      .symbols
      .iter()
      .zip(self.prices.axis_iter(Axis(1)))
      .map(|(s, col)| Ok((s.clone(), describe(&col.to_vec())?)))
      .collect::<Result<BTreeMap<_, _>>>()?;

    Ok(PriceSummary {
      start_date: start,
      end_date: end,
      stats,
    })
  }
}

/// Output of [`PriceFrame::summary`].
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PriceSummary {
  pub start_date: NaiveDate,
  pub end_date: NaiveDate,
  pub stats: BTreeMap<String, SummaryStatistics>,
}
