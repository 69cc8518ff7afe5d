use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::tiering::Tier;
use crate::weighting::WeightVector;

/// Point-in-time view of total managed capital.
///
/// Owned by the AUM tracker and replaced wholesale on every poll; other
/// components only ever see clones.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapitalSnapshot {
    pub aum: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// Per-tier backtest metrics for a strategy candidate.
///
/// `max_drawdown` is a negative fraction (e.g. -0.15 for a 15% drawdown).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TierMetrics {
    pub sharpe: f64,
    pub annual_return: f64,
    pub max_drawdown: f64,
    pub win_rate: f64,
}

/// Broad behavioral family of a strategy, used for regime adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyType {
    Momentum,
    MeanReversion,
    TrendFollowing,
    Arbitrage,
}

/// Market regime tag supplied by an external classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketRegime {
    Bull,
    Bear,
    Sideways,
    Volatile,
}

/// A strategy produced by the mining pipeline, as one tagged record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyCandidate {
    pub id: String,
    pub name: String,
    pub certified: bool,
    pub strategy_type: StrategyType,
    /// Whether the strategy is validated across multiple capital tiers.
    pub multi_tier: bool,
    /// The tier this strategy performed best in.
    pub best_tier: Tier,
    pub tier_metrics: HashMap<Tier, TierMetrics>,
}

impl StrategyCandidate {
    /// Metrics recorded for the given tier, if any.
    #[must_use]
    pub fn metrics_for(&self, tier: Tier) -> Option<&TierMetrics> {
        self.tier_metrics.get(&tier)
    }
}

/// Kind of leveraged derivative position, in liquidation priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionKind {
    Option,
    Futures,
    MarginStock,
}

impl PositionKind {
    /// Liquidation priority; lower liquidates first.
    #[must_use]
    pub const fn priority(self) -> u8 {
        match self {
            Self::Option => 0,
            Self::Futures => 1,
            Self::MarginStock => 2,
        }
    }
}

/// One leveraged derivative position held on margin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarginPosition {
    pub symbol: String,
    pub kind: PositionKind,
    pub quantity: Decimal,
    pub margin_required: Decimal,
    pub market_value: Decimal,
    pub unrealized_pnl: Decimal,
    /// Share of total account risk attributed to this position (0.0-1.0).
    pub risk_contribution: f64,
}

/// Account-level margin snapshot from the account data provider.
///
/// Refreshed wholesale on each risk check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub total_assets: Decimal,
    pub margin_used: Decimal,
    pub margin_available: Decimal,
    pub positions: Vec<MarginPosition>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderAction {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderKind {
    Market,
    Limit,
}

/// Order handed to the execution engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub action: OrderAction,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
    pub kind: OrderKind,
}

/// Execution engine acknowledgement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderAck {
    pub success: bool,
    pub order_id: Option<String>,
    pub message: Option<String>,
}

/// Family of low-risk instrument used to park locked profit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafeAssetKind {
    ShortTermRepo,
    MoneyMarketEtf,
    BondEtf,
}

/// A concrete safe asset: kind plus the tradable symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafeAsset {
    pub kind: SafeAssetKind,
    pub symbol: String,
}

impl SafeAsset {
    #[must_use]
    pub fn new(kind: SafeAssetKind, symbol: impl Into<String>) -> Self {
        Self {
            kind,
            symbol: symbol.into(),
        }
    }
}

/// One reallocation decision, kept in the bounded decision history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub tier: Tier,
    pub aum: Decimal,
    pub strategy_ids: Vec<String>,
    pub weights: WeightVector,
    pub timestamp: DateTime<Utc>,
}
