//! # portfolio-rs
//!
//! $$
//! \mathbf w^\* = \arg\max_{\mathbf w\in\Delta^{N-1}} \frac{\mu^\top\mathbf w - r_f}{\sqrt{\mathbf w^\top\Sigma\mathbf w}}
//! $$
//!
//! Mean-variance portfolio optimization from historical prices and Monte Carlo
//! VaR / CVaR of the chosen allocation.
//!
//! - [`portfolio`]: price alignment, return statistics, optimizers, the
//!   candidate collection and best-portfolio selection.
//! - [`risk`]: correlated path simulation and tail-risk measures.
//! - [`PortfolioEngine`]: the whole flow driven by one [`OptimizationConfig`].

pub mod config;
pub mod error;
pub mod portfolio;
pub mod risk;
pub mod rng;
pub mod stats;

pub use config::OptimizationConfig;
pub use config::TradingPeriod;
pub use error::ConfigurationError;
pub use error::DataError;
pub use error::NumericalError;
pub use error::PortfolioError;
pub use error::Result;
pub use portfolio::PortfolioEngine;
