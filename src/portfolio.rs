//! # Portfolio
//!
//! $$
//! \sigma_p^2 = \mathbf{w}^\top \Sigma \mathbf{w}
//! $$
//!
//! Return statistics, Sharpe-maximizing optimizers and best-portfolio
//! selection.

pub mod collection;
pub mod data;
pub mod engine;
pub mod optimizers;
pub mod returns;
pub mod selection;
pub mod types;

pub use collection::ColumnStatistics;
pub use collection::PortfolioCollection;
pub use collection::SolverStatistics;
pub use data::AssetHistory;
pub use data::AssetSeries;
pub use data::LazyPriceSource;
pub use data::PriceFrame;
pub use data::PriceSource;
pub use data::PriceSummary;
pub use engine::AnalysisReport;
pub use engine::PortfolioEngine;
pub use optimizers::PortfolioOptimizer;
pub use optimizers::sharpe_ratio;
pub use returns::ReturnFrame;
pub use returns::ReturnSeriesBuilder;
pub use returns::ReturnStatistics;
pub use selection::BestPortfolioSelector;
pub use selection::SelectionMetric;
pub use types::GradientSolver;
pub use types::MONTE_CARLO_TAG;
pub use types::Portfolio;
pub use types::SolverKind;
pub use types::SolverOutcome;
pub use types::Weights;
