pub mod alerts;
pub mod cascade;
pub mod level;
pub mod monitor;
pub mod service;

pub use alerts::{AlertCallback, RiskAlert};
pub use cascade::{LiquidationAudit, LiquidationEntry};
pub use level::{classify_risk_level, RiskLevel};
pub use monitor::{AccountRiskState, CascadeSummary, MarginRiskMonitor, RiskCheckReport};
