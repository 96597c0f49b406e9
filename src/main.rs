use std::path::Path;
use std::path::PathBuf;

use anyhow::bail;
use anyhow::Context;
use chrono::NaiveDate;
use clap::Parser;
use csv::ReaderBuilder;
use csv::Trim;
use portfolio_rs::portfolio::AnalysisReport;
use portfolio_rs::portfolio::AssetSeries;
use portfolio_rs::portfolio::PriceFrame;
use portfolio_rs::OptimizationConfig;
use portfolio_rs::PortfolioEngine;
use prettytable::row;
use prettytable::Table;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
  version,
  about = "Mean-variance portfolio optimization with Monte Carlo VaR / CVaR",
  after_help = "EXAMPLES:
    # Synthetic prices for 5 assets
    portfolio-rs --assets 5 --seed 42

    # Wide CSV (Date,SYM1,SYM2,...) with a JSON config
    portfolio-rs --config config.json --prices prices.csv"
)]
struct Args {
  /// JSON configuration; missing keys take their defaults
  #[arg(long)]
  config: Option<PathBuf>,

  /// Wide price CSV with a `Date` column (YYYY-MM-DD) and one column per asset
  #[arg(long)]
  prices: Option<PathBuf>,

  /// Number of synthetic assets when no CSV is given
  #[arg(long, default_value_t = 4)]
  assets: usize,

  /// Number of synthetic daily prices when no CSV is given
  #[arg(long, default_value_t = 756)]
  days: usize,

  /// Base seed, overrides the configuration
  #[arg(long)]
  seed: Option<u64>,
}

fn main() -> anyhow::Result<()> {
  let env_filter =
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("portfolio_rs=info"));
  tracing_subscriber::fmt().with_env_filter(env_filter).init();

  let args = Args::parse();
  let mut config = match &args.config {
    Some(path) => OptimizationConfig::from_json_file(path)
      .with_context(|| format!("loading config {}", path.display()))?,
    None => OptimizationConfig::default(),
  };
  if args.seed.is_some() {
    config.seed = args.seed;
  }

  let prices = match &args.prices {
    Some(path) => read_price_csv(path)?,
    None => {
      let symbols: Vec<String> = (0..args.assets).map(|i| format!("ASSET{}", i + 1)).collect();
      let seed = config.seed.unwrap_or(0);
      info!(assets = args.assets, days = args.days, seed, "using synthetic prices");
      PriceFrame::synthetic(&symbols, args.days, seed)?
    }
  };

  let engine = PortfolioEngine::new(config)?;
  let report = engine.run(&prices)?;
  print_report(&report);
  Ok(())
}

fn read_price_csv(path: &Path) -> anyhow::Result<PriceFrame> {
  let mut reader = ReaderBuilder::new()
    .has_headers(true)
    .flexible(true)
    .trim(Trim::All)
    .from_path(path)
    .with_context(|| format!("reading {}", path.display()))?;

  let header = reader.headers().context("price CSV is empty")?.clone();
  let symbols: Vec<String> = header.iter().skip(1).map(str::to_string).collect();
  if symbols.is_empty() {
    bail!("price CSV needs a Date column and at least one asset column");
  }

  let mut points: Vec<Vec<(NaiveDate, f64)>> = vec![Vec::new(); symbols.len()];
  for record in reader.records() {
    let record = record.with_context(|| format!("reading {}", path.display()))?;
    let line = record.position().map_or(0, |p| p.line());
    let date_cell = record.get(0).unwrap_or_default();
    let date = NaiveDate::parse_from_str(date_cell, "%Y-%m-%d")
      .with_context(|| format!("line {line}: bad date `{date_cell}`"))?;
    for (j, cell) in record.iter().skip(1).enumerate().take(symbols.len()) {
      if cell.is_empty() {
        continue;
      }
      let price: f64 = cell
        .parse()
        .with_context(|| format!("line {line}: bad price `{cell}` for {}", symbols[j]))?;
      points[j].push((date, price));
    }
  }

  let series = symbols
    .into_iter()
    .zip(points)
    .map(|(s, p)| AssetSeries::new(s, p))
    .collect::<portfolio_rs::Result<Vec<_>>>()?;
  Ok(PriceFrame::from_series(&series)?)
}

fn print_report(report: &AnalysisReport) {
  let summary = &report.price_summary;
  println!("\nPrices {} .. {}", summary.start_date, summary.end_date);
  let mut table = Table::new();
  table.set_titles(row!["asset", "mean", "std", "min", "max"]);
  for (symbol, s) in &summary.stats {
    table.add_row(row![
      symbol,
      format!("{:.2}", s.mean),
      format!("{:.2}", s.std),
      format!("{:.2}", s.min),
      format!("{:.2}", s.max)
    ]);
  }
  table.printstd();

  println!("\nReturn correlation");
  let mut table = Table::new();
  let mut titles = row![""];
  for symbol in &report.statistics.symbols {
    titles.add_cell(prettytable::Cell::new(symbol));
  }
  table.set_titles(titles);
  for (i, symbol) in report.statistics.symbols.iter().enumerate() {
    let mut r = row![symbol];
    for v in report.correlation.row(i) {
      r.add_cell(prettytable::Cell::new(&format!("{v:.3}")));
    }
    table.add_row(r);
  }
  table.printstd();

  println!("\nSolvers");
  let mut table = Table::new();
  table.set_titles(row![
    "solver",
    "evaluations",
    "converged",
    "mean sharpe",
    "max sharpe",
    "termination"
  ]);
  for o in &report.outcomes {
    let (mean, max) = report
      .solver_stats
      .get(&o.solver)
      .map_or((f64::NAN, f64::NAN), |s| (s.sharpe.mean, s.sharpe.max));
    table.add_row(row![
      o.solver,
      o.evaluations,
      o.converged,
      format!("{mean:.4}"),
      format!("{max:.4}"),
      o.termination
    ]);
  }
  table.printstd();

  let best = &report.best;
  println!(
    "\nBest portfolio ({}): return {:.4}, volatility {:.4}, sharpe {:.4}",
    best.solver, best.expected_return, best.volatility, best.sharpe
  );
  let mut table = Table::new();
  table.set_titles(row!["asset", "weight"]);
  for (symbol, w) in &report.weights {
    table.add_row(row![symbol, format!("{w:.4}")]);
  }
  table.printstd();

  let gains = &report.risk.summary;
  println!(
    "\nSimulated {} paths x {} periods (seed {}); terminal gain mean {:.2}, std {:.2}",
    report.simulation.num_simulations(),
    report.simulation.horizon(),
    report.seed,
    gains.mean,
    gains.std
  );
  let mut table = Table::new();
  table.set_titles(row!["alpha", "VaR", "CVaR"]);
  for (alpha, var) in &report.risk.var {
    let cvar = report.risk.cvar.get(alpha).copied().unwrap_or(f64::NAN);
    table.add_row(row![alpha.0, format!("{var:.2}"), format!("{cvar:.2}")]);
  }
  table.printstd();
}

#[cfg(test)]
mod tests {
  use std::fs::File;
  use std::io::Write;

  use portfolio_rs::error::DataError;
  use portfolio_rs::PortfolioError;
  use tempfile::tempdir;

  use super::*;

  fn load(contents: &str) -> anyhow::Result<PriceFrame> {
    let dir = tempdir()?;
    let path = dir.path().join("prices.csv");
    let mut file = File::create(&path)?;
    write!(file, "{contents}")?;
    read_price_csv(&path)
  }

  #[test]
  fn reads_quoted_fields_and_headers() {
    let frame = load(
      "\"Date\",\"AAA\",\"BBB, Inc\"\n\
       \"2024-01-02\",\"100.0\",\"50.0\"\n\
       \"2024-01-03\",\"101.5\",\"49.5\"\n\
       \n\
       2024-01-04, 102.0 ,51.0\n",
    )
    .unwrap();

    assert_eq!(frame.symbols(), ["AAA".to_string(), "BBB, Inc".to_string()]);
    assert_eq!(frame.dates().len(), 3);
    assert_eq!(frame.prices()[[1, 0]], 101.5);
    assert_eq!(frame.prices()[[2, 1]], 51.0);
  }

  #[test]
  fn blank_cell_leaves_a_gap() {
    let err = load(
      "Date,AAA,BBB\n\
       2024-01-02,100.0,50.0\n\
       2024-01-03,101.0,\n\
       2024-01-04,102.0,51.0\n",
    )
    .unwrap_err();

    let date = NaiveDate::from_ymd_opt(2024, 1, 3).unwrap();
    assert_eq!(
      err.downcast_ref::<PortfolioError>(),
      Some(&PortfolioError::Data(DataError::MisalignedSeries {
        symbol: "BBB".to_string(),
        date
      }))
    );
  }

  #[test]
  fn bad_cells_report_their_line() {
    let err = load("Date,AAA\n2024-01-02,100.0\n2024-13-01,101.0\n").unwrap_err();
    assert_eq!(err.to_string(), "line 3: bad date `2024-13-01`");

    let err = load("Date,AAA\n2024-01-02,100.0\n2024-01-03,n/a\n").unwrap_err();
    assert_eq!(err.to_string(), "line 3: bad price `n/a` for AAA");
  }

  #[test]
  fn header_needs_an_asset_column() {
    let err = load("Date\n2024-01-02\n").unwrap_err();
    assert!(err.to_string().contains("at least one asset column"));
  }
}
