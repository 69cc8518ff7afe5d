//! Risk alert types and the process-wide alert callback.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use capital_engine_core::error::Result;

use crate::level::RiskLevel;

/// Alert raised by the margin risk monitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RiskAlert {
    /// The risk level changed between checks.
    LevelChanged {
        from: Option<RiskLevel>,
        to: RiskLevel,
        risk_ratio: f64,
        timestamp: DateTime<Utc>,
    },
    /// margin_used / total_assets exceeded the static cap.
    MarginCapBreached {
        margin_ratio: f64,
        cap: f64,
        timestamp: DateTime<Utc>,
    },
    /// A forced-liquidation cascade finished.
    CascadeCompleted {
        attempted: usize,
        succeeded: usize,
        failed: usize,
        final_risk_ratio: f64,
        timestamp: DateTime<Utc>,
    },
}

/// Alert delivery callback. Errors are caught and logged by the monitor and
/// never interrupt a check.
pub type AlertCallback = Arc<dyn Fn(&RiskAlert) -> Result<()> + Send + Sync>;
