//! Capital tier and operating mode classification.
//!
//! Tiers are six contiguous closed-open AUM bands partitioning [0, ∞);
//! operating modes are a coarser 3-way split on an independently configured
//! threshold pair. Both classifiers are pure, O(1), and deterministic.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::config::TieringConfig;
use crate::error::{EngineError, Result};

/// Capital-size band. Bands are ordered; `rank()` is strictly increasing
/// with AUM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Micro,
    Small,
    Medium,
    Large,
    Million,
    TenMillion,
}

impl Tier {
    /// Ordinal rank of the tier, 1 (smallest) through 6.
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::Micro => 1,
            Self::Small => 2,
            Self::Medium => 3,
            Self::Large => 4,
            Self::Million => 5,
            Self::TenMillion => 6,
        }
    }

    const fn slug(self) -> &'static str {
        match self {
            Self::Micro => "micro",
            Self::Small => "small",
            Self::Medium => "medium",
            Self::Large => "large",
            Self::Million => "million",
            Self::TenMillion => "ten_million",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tier{}_{}", self.rank(), self.slug())
    }
}

/// Coarse behavioral profile derived from AUM, independent of `Tier`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatingMode {
    /// Small capital: concentrated, short-horizon, high risk tolerance.
    Aggressive,
    /// Mid-size capital: diversified, medium horizon.
    Balanced,
    /// Large capital: broad diversification, long horizon, low tolerance.
    Conservative,
}

/// Static behavioral characteristics of an operating mode.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ModeCharacteristics {
    /// Maximum single-position share of the portfolio (0.0-1.0).
    pub max_position_pct: f64,
    /// Typical holding horizon in trading days.
    pub holding_horizon_days: u32,
    /// Liquidity requirement for tradable instruments.
    pub liquidity: LiquidityTag,
    /// Number of strategies the allocator should target.
    pub target_strategy_count: usize,
    pub risk_tolerance: RiskTolerance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiquidityTag {
    High,
    Medium,
    Flexible,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTolerance {
    Low,
    Moderate,
    High,
}

const AGGRESSIVE: ModeCharacteristics = ModeCharacteristics {
    max_position_pct: 0.30,
    holding_horizon_days: 5,
    liquidity: LiquidityTag::High,
    target_strategy_count: 2,
    risk_tolerance: RiskTolerance::High,
};

const BALANCED: ModeCharacteristics = ModeCharacteristics {
    max_position_pct: 0.20,
    holding_horizon_days: 20,
    liquidity: LiquidityTag::Medium,
    target_strategy_count: 3,
    risk_tolerance: RiskTolerance::Moderate,
};

const CONSERVATIVE: ModeCharacteristics = ModeCharacteristics {
    max_position_pct: 0.10,
    holding_horizon_days: 60,
    liquidity: LiquidityTag::Flexible,
    target_strategy_count: 5,
    risk_tolerance: RiskTolerance::Low,
};

/// Static characteristics lookup for an operating mode.
#[must_use]
pub const fn mode_characteristics(mode: OperatingMode) -> &'static ModeCharacteristics {
    match mode {
        OperatingMode::Aggressive => &AGGRESSIVE,
        OperatingMode::Balanced => &BALANCED,
        OperatingMode::Conservative => &CONSERVATIVE,
    }
}

/// Classifies AUM into its capital tier.
///
/// Balances below the first boundary fall into the lowest tier, so the six
/// bands partition the whole non-negative axis.
///
/// # Errors
/// Returns `EngineError::InvalidInput` if `aum` is negative.
pub fn classify(aum: Decimal, config: &TieringConfig) -> Result<Tier> {
    if aum < Decimal::ZERO {
        return Err(EngineError::invalid_input(format!(
            "AUM must be non-negative, got {aum}"
        )));
    }

    let bounds = &config.tier_bounds;
    let tier = if aum < bounds.small {
        Tier::Micro
    } else if aum < bounds.medium {
        Tier::Small
    } else if aum < bounds.large {
        Tier::Medium
    } else if aum < bounds.million {
        Tier::Large
    } else if aum < bounds.ten_million {
        Tier::Million
    } else {
        Tier::TenMillion
    };

    Ok(tier)
}

/// Classifies AUM into its operating mode.
///
/// The mode thresholds are configured independently of the tier bounds; the
/// defaults nearly coincide at 1e5/1e6 but either set can be tuned alone.
///
/// # Errors
/// Returns `EngineError::InvalidInput` if `aum` is negative.
pub fn classify_mode(aum: Decimal, config: &TieringConfig) -> Result<OperatingMode> {
    if aum < Decimal::ZERO {
        return Err(EngineError::invalid_input(format!(
            "AUM must be non-negative, got {aum}"
        )));
    }

    let bounds = &config.mode_bounds;
    let mode = if aum < bounds.balanced {
        OperatingMode::Aggressive
    } else if aum < bounds.conservative {
        OperatingMode::Balanced
    } else {
        OperatingMode::Conservative
    };

    Ok(mode)
}
