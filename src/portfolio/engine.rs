//! # Portfolio Engine
//!
//! $$
//! P \to (\mu, \Sigma) \to \mathbf w^\* \to V_{T\times M} \to (\operatorname{VaR}_\alpha, \operatorname{CVaR}_\alpha)
//! $$
//!
//! High-level orchestration of the optimize, select, simulate and evaluate
//! stages under one [`OptimizationConfig`].

use std::collections::BTreeMap;

use ndarray::Array2;
use tracing::info;

use super::collection::PortfolioCollection;
use super::collection::SolverStatistics;
use super::data::PriceFrame;
use super::data::PriceSource;
use super::data::PriceSummary;
use super::optimizers::PortfolioOptimizer;
use super::returns::ReturnFrame;
use super::returns::ReturnSeriesBuilder;
use super::returns::ReturnStatistics;
use super::selection::BestPortfolioSelector;
use super::types::Portfolio;
use super::types::SolverOutcome;
use super::types::Weights;
use crate::config::OptimizationConfig;
use crate::error::Result;
use crate::risk::metrics::RiskEvaluator;
use crate::risk::metrics::RiskReport;
use crate::risk::simulation::ReturnSimulator;
use crate::risk::simulation::SimulationResult;
use crate::rng::base_seed;
use crate::rng::derive_seed;

/// Everything one engine run produced.
#[derive(Clone, Debug)]
pub struct AnalysisReport {
  pub price_summary: PriceSummary,
  /// Annualized return statistics the optimizer ran on.
  pub statistics: ReturnStatistics,
  pub correlation: Array2<f64>,
  pub outcomes: Vec<SolverOutcome>,
  pub collection: PortfolioCollection,
  pub solver_stats: BTreeMap<String, SolverStatistics>,
  pub best: Portfolio,
  /// Pruned weights of `best`.
  pub weights: Weights,
  pub simulation: SimulationResult,
  pub risk: RiskReport,
  /// Resolved base seed of the run.
  pub seed: u64,
}

/// Single entry-point engine for the optimization and risk workflow.
#[derive(Clone, Debug, Default)]
pub struct PortfolioEngine {
  config: OptimizationConfig,
}

impl PortfolioEngine {
  /// Construct a new engine with a validated configuration.
  pub fn new(config: OptimizationConfig) -> Result<Self> {
    config.validate()?;
    Ok(Self { config })
  }

  pub fn config(&self) -> &OptimizationConfig {
    &self.config
  }

  /// Periodic returns and annualized moments of `prices`.
  pub fn returns(&self, prices: &PriceFrame) -> Result<(ReturnFrame, ReturnStatistics)> {
    ReturnSeriesBuilder::new(self.config.period).build_from_frame(prices)
  }

  /// Run every configured solver into `collection`.
  pub fn optimize(
    &self,
    stats: &ReturnStatistics,
    collection: &PortfolioCollection,
    seed: Option<u64>,
  ) -> Result<Vec<SolverOutcome>> {
    let outcomes = PortfolioOptimizer::new(stats, self.config.effective_risk_free())
      .with_max_iters(self.config.max_iters)
      .with_monte_carlo_iters(self.config.monte_carlo_iters)
      .with_seed(seed)
      .fail_on_nonconvergence(self.config.fail_on_nonconvergence)
      .optimize_with_solvers(&self.config.solvers, collection)?;

    for o in &outcomes {
      info!(
        solver = %o.solver,
        evaluations = o.evaluations,
        converged = o.converged,
        "optimizer finished"
      );
    }
    Ok(outcomes)
  }

  /// Max-Sharpe record and its pruned weights.
  pub fn select(&self, collection: &PortfolioCollection) -> Result<(Portfolio, Weights)> {
    let selector = BestPortfolioSelector {
      min_weight: self.config.min_weight,
      ..Default::default()
    };
    let best = selector.best_portfolio(collection)?;
    let weights = best.pruned_weights(self.config.min_weight);
    info!(
      solver = %best.solver,
      sharpe = best.sharpe,
      expected_return = best.expected_return,
      volatility = best.volatility,
      assets = weights.len(),
      "best portfolio"
    );
    Ok((best, weights))
  }

  pub fn simulate(
    &self,
    returns: &ReturnFrame,
    weights: &Weights,
    seed: Option<u64>,
  ) -> Result<SimulationResult> {
    ReturnSimulator::new(
      self.config.num_sims,
      self.config.horizon,
      self.config.initial_investment,
      seed,
    )
    .simulate(returns, weights)
  }

  pub fn evaluate(&self, simulation: &SimulationResult) -> Result<RiskReport> {
    RiskEvaluator::new(self.config.alphas.clone())?.evaluate(simulation)
  }

  /// Full pipeline on an aligned price frame.
  pub fn run(&self, prices: &PriceFrame) -> Result<AnalysisReport> {
    let seed = base_seed(self.config.seed);
    let (returns, statistics) = self.returns(prices)?;
    info!(
      assets = statistics.n_assets(),
      observations = returns.n_observations(),
      period = %self.config.period,
      seed,
      "return statistics ready"
    );

    let collection = PortfolioCollection::new();
    let outcomes = self.optimize(&statistics, &collection, Some(derive_seed(seed, 0)))?;
    let (best, weights) = self.select(&collection)?;
    let simulation = self.simulate(&returns, &weights, Some(derive_seed(seed, 1)))?;
    let risk = self.evaluate(&simulation)?;

    Ok(AnalysisReport {
      price_summary: prices.summary()?,
      correlation: statistics.correlation(),
      solver_stats: collection.stats_by_solver(),
      statistics,
      outcomes,
      collection,
      best,
      weights,
      simulation,
      risk,
      seed,
    })
  }

  /// Load `price_field` of every asset of `source`, then [`Self::run`].
  pub fn run_from_source(&self, source: &dyn PriceSource) -> Result<AnalysisReport> {
    let prices = PriceFrame::from_source(source, &self.config.price_field)?;
    self.run(&prices)
  }
}

#[cfg(test)]
mod tests {
  use ordered_float::OrderedFloat;
  use tracing_test::traced_test;

  use super::*;
  use crate::error::DataError;
  use crate::portfolio::data::AssetHistory;
  use crate::portfolio::data::LazyPriceSource;

  fn symbols(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("S{i}")).collect()
  }

  fn config() -> OptimizationConfig {
    OptimizationConfig {
      solvers: vec!["lbfgs".to_string(), "monte carlo".to_string()],
      monte_carlo_iters: 2_000,
      num_sims: 200,
      horizon: 30,
      seed: Some(17),
      ..Default::default()
    }
  }

  #[test]
  #[traced_test]
  fn pipeline_produces_consistent_report() {
    let prices = PriceFrame::synthetic(&symbols(4), 260, 5).unwrap();
    let report = PortfolioEngine::new(config()).unwrap().run(&prices).unwrap();

    assert_eq!(report.outcomes.len(), 2);
    assert_eq!(report.solver_stats["monte carlo"].count, 2_000);
    assert_eq!(report.collection.len(), 2_000 + report.outcomes[0].evaluations);
    assert_eq!(report.statistics.n_assets(), 4);
    assert_eq!(report.correlation.dim(), (4, 4));

    assert!(report.weights.values().all(|w| *w > 1e-4));
    assert!((report.best.weight_sum() - 1.0).abs() < 1e-6);
    assert_eq!(report.simulation.values.dim(), (30, 200));
    assert_eq!(
      report.risk.var.keys().copied().collect::<Vec<_>>(),
      vec![OrderedFloat(0.01), OrderedFloat(0.05), OrderedFloat(0.1)]
    );
    for (a, var) in &report.risk.var {
      assert!(report.risk.cvar[a] <= *var);
    }

    assert!(logs_contain("best portfolio"));
    assert!(logs_contain("optimizer finished"));
  }

  #[test]
  fn runs_are_reproducible_for_a_seed() {
    let prices = PriceFrame::synthetic(&symbols(3), 200, 8).unwrap();
    let engine = PortfolioEngine::new(config()).unwrap();
    let a = engine.run(&prices).unwrap();
    let b = engine.run(&prices).unwrap();

    assert_eq!(a.collection.snapshot(), b.collection.snapshot());
    assert_eq!(a.weights, b.weights);
    assert_eq!(a.simulation, b.simulation);
    assert_eq!(a.risk, b.risk);
  }

  #[test]
  fn best_sharpe_dominates_every_record() {
    let prices = PriceFrame::synthetic(&symbols(3), 200, 21).unwrap();
    let report = PortfolioEngine::new(config()).unwrap().run(&prices).unwrap();
    report.collection.with_records(|records| {
      assert!(records.iter().all(|p| p.sharpe <= report.best.sharpe));
    });
  }

  #[test]
  fn runs_from_a_lazy_source_on_the_configured_field() {
    let frame = PriceFrame::synthetic(&symbols(2), 120, 2).unwrap();
    let mut source = LazyPriceSource::new();
    for symbol in frame.symbols() {
      let points: Vec<_> = frame
        .dates()
        .iter()
        .copied()
        .zip(frame.column(symbol).unwrap().to_vec())
        .collect();
      let symbol = symbol.clone();
      source.insert(symbol.clone(), move || {
        AssetHistory::single(symbol.as_str(), "Adj Close", points.clone())
      });
    }

    let report = PortfolioEngine::new(config())
      .unwrap()
      .run_from_source(&source)
      .unwrap();
    assert_eq!(report.price_summary.stats.len(), 2);

    let closing = OptimizationConfig {
      price_field: "Close".to_string(),
      ..config()
    };
    let err = PortfolioEngine::new(closing)
      .unwrap()
      .run_from_source(&source)
      .unwrap_err();
    assert!(matches!(
      err,
      crate::error::PortfolioError::Data(DataError::MissingField { .. })
    ));
  }

  #[test]
  fn invalid_configuration_is_rejected_up_front() {
    let err = PortfolioEngine::new(OptimizationConfig {
      solvers: vec!["simplex".to_string()],
      ..Default::default()
    })
    .unwrap_err();
    assert!(err.is_configuration());
  }
}
