use std::path::PathBuf;

use chrono::NaiveTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::types::{MarketRegime, SafeAsset, SafeAssetKind, StrategyType};

/// Top-level engine configuration, one section per component.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub tiering: TieringConfig,
    pub tracker: TrackerConfig,
    pub selector: SelectorConfig,
    pub allocator: AllocatorConfig,
    pub risk: RiskMonitorConfig,
    pub lockbox: LockBoxConfig,
}

/// Lower inclusive AUM edge of each tier above the first.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TierBounds {
    pub small: Decimal,
    pub medium: Decimal,
    pub large: Decimal,
    pub million: Decimal,
    pub ten_million: Decimal,
}

impl Default for TierBounds {
    fn default() -> Self {
        Self {
            small: Decimal::from(10_000),
            medium: Decimal::from(100_000),
            large: Decimal::from(500_000),
            million: Decimal::from(1_000_000),
            ten_million: Decimal::from(10_000_000),
        }
    }
}

/// AUM thresholds for the 3-way operating mode split.
///
/// Configured independently of `TierBounds`; the defaults nearly coincide at
/// 1e5/1e6 but the two sets tune separately.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModeBounds {
    pub balanced: Decimal,
    pub conservative: Decimal,
}

impl Default for ModeBounds {
    fn default() -> Self {
        Self {
            balanced: Decimal::from(100_000),
            conservative: Decimal::from(1_000_000),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TieringConfig {
    pub tier_bounds: TierBounds,
    pub mode_bounds: ModeBounds,
}

impl TieringConfig {
    /// Checks both threshold sets are strictly increasing.
    ///
    /// # Errors
    /// Returns `EngineError::InvalidInput` on a misordered set.
    pub fn validate(&self) -> Result<()> {
        let b = &self.tier_bounds;
        let ladder = [b.small, b.medium, b.large, b.million, b.ten_million];
        if ladder.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(EngineError::invalid_input(
                "tier bounds must be strictly increasing",
            ));
        }
        if self.mode_bounds.balanced >= self.mode_bounds.conservative {
            return Err(EngineError::invalid_input(
                "mode bounds must be strictly increasing",
            ));
        }
        Ok(())
    }
}

/// AUM polling configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// How often to poll AUM (seconds).
    pub poll_interval_secs: u64,
    /// Relative AUM change that triggers tier re-evaluation (0.05 = 5%).
    pub change_threshold: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 60,
            change_threshold: 0.05,
        }
    }
}

/// Score multiplier for one (regime, strategy type) pairing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeBoost {
    pub regime: MarketRegime,
    pub strategy_type: StrategyType,
    pub multiplier: f64,
}

/// Strategy selection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    /// How many strategies to keep after ranking.
    pub top_n: usize,
    pub min_weight: f64,
    pub max_weight: f64,
    /// Regime multipliers; pairings not listed default to 1.0.
    pub regime_boosts: Vec<RegimeBoost>,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        use MarketRegime::{Bear, Bull, Sideways, Volatile};
        use StrategyType::{Arbitrage, MeanReversion, Momentum, TrendFollowing};

        let boost = |regime, strategy_type, multiplier| RegimeBoost {
            regime,
            strategy_type,
            multiplier,
        };
        Self {
            top_n: 5,
            min_weight: 0.05,
            max_weight: 0.40,
            regime_boosts: vec![
                boost(Bull, Momentum, 1.2),
                boost(Bull, TrendFollowing, 1.1),
                boost(Bear, MeanReversion, 1.15),
                boost(Bear, Momentum, 0.8),
                boost(Sideways, MeanReversion, 1.2),
                boost(Sideways, Arbitrage, 1.05),
                boost(Volatile, Arbitrage, 1.2),
                boost(Volatile, Momentum, 0.85),
            ],
        }
    }
}

/// Reallocation orchestrator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocatorConfig {
    /// Decision history capacity (FIFO eviction beyond this).
    pub history_cap: usize,
    /// Optional JSON file the decision history persists to.
    pub history_path: Option<PathBuf>,
    /// Incremental reweighting rate; clamped into [0.05, 0.2] at use.
    pub adjust_rate: f64,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            history_cap: 1000,
            history_path: None,
            adjust_rate: 0.1,
        }
    }
}

/// Margin risk monitoring configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskMonitorConfig {
    /// Risk-ratio threshold where Warning begins.
    pub warning_ratio: f64,
    /// Risk-ratio threshold where Danger begins.
    pub danger_ratio: f64,
    /// Risk-ratio threshold where Critical begins.
    pub critical_ratio: f64,
    /// Static cap on margin_used / total_assets.
    pub margin_ratio_cap: f64,
    /// Whether breaching Critical triggers the liquidation cascade.
    pub auto_liquidation: bool,
    /// How often the risk poller checks the account (seconds).
    pub poll_interval_secs: u64,
    /// Liquidation audit history capacity.
    pub audit_cap: usize,
    /// Optional JSON file the audit history persists to.
    pub audit_path: Option<PathBuf>,
}

impl Default for RiskMonitorConfig {
    fn default() -> Self {
        Self {
            warning_ratio: 0.50,
            danger_ratio: 0.70,
            critical_ratio: 0.85,
            margin_ratio_cap: 0.30,
            auto_liquidation: true,
            poll_interval_secs: 30,
            audit_cap: 500,
            audit_path: None,
        }
    }
}

impl RiskMonitorConfig {
    /// Checks the level thresholds are strictly increasing and in (0, 1].
    ///
    /// # Errors
    /// Returns `EngineError::InvalidInput` on a misordered or out-of-range
    /// threshold set.
    pub fn validate(&self) -> Result<()> {
        let ladder = [self.warning_ratio, self.danger_ratio, self.critical_ratio];
        if ladder.iter().any(|t| *t <= 0.0 || *t > 1.0) {
            return Err(EngineError::invalid_input(
                "risk thresholds must be in (0, 1]",
            ));
        }
        if ladder.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(EngineError::invalid_input(
                "risk thresholds must be strictly increasing",
            ));
        }
        if self.margin_ratio_cap <= 0.0 || self.margin_ratio_cap > 1.0 {
            return Err(EngineError::invalid_input(
                "margin ratio cap must be in (0, 1]",
            ));
        }
        Ok(())
    }
}

/// Profit lockbox configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LockBoxConfig {
    /// Share of positive daily P&L to segregate.
    pub lock_ratio: Decimal,
    /// Targets below this amount are skipped.
    pub min_lock_amount: Decimal,
    /// Cap on total locked capital as a share of total assets.
    pub max_lock_ratio: Decimal,
    /// Whether `auto_check` may execute locks.
    pub auto_lock: bool,
    /// Local time of day after which `auto_check` fires.
    pub trigger_time: NaiveTime,
    pub primary_asset: SafeAsset,
    pub fallback_asset: SafeAsset,
    /// Lock history capacity.
    pub history_cap: usize,
    /// Optional JSON file the lock history persists to.
    pub history_path: Option<PathBuf>,
}

impl Default for LockBoxConfig {
    fn default() -> Self {
        Self {
            lock_ratio: Decimal::new(30, 2),
            min_lock_amount: Decimal::from(10_000),
            max_lock_ratio: Decimal::new(50, 2),
            auto_lock: false,
            trigger_time: NaiveTime::from_hms_opt(14, 45, 0).unwrap(),
            primary_asset: SafeAsset::new(SafeAssetKind::ShortTermRepo, "204001"),
            fallback_asset: SafeAsset::new(SafeAssetKind::MoneyMarketEtf, "511990"),
            history_cap: 1000,
            history_path: None,
        }
    }
}
