//! # Risk
//!
//! $$
//! \operatorname{CVaR}_\alpha \le \operatorname{VaR}_\alpha
//! $$
//!
//! Monte Carlo simulation of portfolio value paths and tail-risk measures of
//! the simulated terminal gains.

pub mod metrics;
pub mod simulation;

pub use metrics::RiskEvaluator;
pub use metrics::RiskMap;
pub use metrics::RiskReport;
pub use metrics::conditional_value_at_risk;
pub use metrics::conditional_value_at_risk_for_alphas;
pub use metrics::validate_alphas;
pub use metrics::value_at_risk;
pub use metrics::value_at_risk_for_alphas;
pub use simulation::ReturnSimulator;
pub use simulation::SimulationResult;
