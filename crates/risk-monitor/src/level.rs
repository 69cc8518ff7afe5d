//! Risk level classification on the risk ratio.
//!
//! Levels are ordered by strictly increasing thresholds; for a fixed
//! configuration classification is idempotent and monotone in the ratio.

use serde::{Deserialize, Serialize};

use capital_engine_core::config::RiskMonitorConfig;

/// Account risk level, ordered from calm to forced-deleveraging.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Safe,
    Warning,
    Danger,
    Critical,
}

impl RiskLevel {
    /// Ordinal rank, 0 (Safe) through 3 (Critical).
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::Safe => 0,
            Self::Warning => 1,
            Self::Danger => 2,
            Self::Critical => 3,
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Safe => write!(f, "safe"),
            Self::Warning => write!(f, "warning"),
            Self::Danger => write!(f, "danger"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Classifies a risk ratio against the configured thresholds.
#[must_use]
pub fn classify_risk_level(risk_ratio: f64, config: &RiskMonitorConfig) -> RiskLevel {
    if risk_ratio >= config.critical_ratio {
        RiskLevel::Critical
    } else if risk_ratio >= config.danger_ratio {
        RiskLevel::Danger
    } else if risk_ratio >= config.warning_ratio {
        RiskLevel::Warning
    } else {
        RiskLevel::Safe
    }
}
