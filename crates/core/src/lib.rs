pub mod config;
pub mod config_loader;
pub mod error;
pub mod events;
pub mod history;
pub mod tiering;
pub mod traits;
pub mod types;
pub mod weighting;

pub use config::{
    AllocatorConfig, EngineConfig, LockBoxConfig, RiskMonitorConfig, SelectorConfig,
    TieringConfig, TrackerConfig,
};
pub use config_loader::ConfigLoader;
pub use error::{EngineError, Result};
pub use events::{TierChangeCallback, TierChangeEvent};
pub use history::HistoryStore;
pub use tiering::{classify, classify_mode, mode_characteristics, OperatingMode, Tier};
pub use traits::{AccountDataProvider, AssetPriceProvider, CapitalDataProvider, ExecutionEngine};
pub use types::{
    AccountSnapshot, CapitalSnapshot, DecisionRecord, MarginPosition, MarketRegime, OrderAck,
    OrderAction, OrderKind, OrderRequest, PositionKind, SafeAsset, SafeAssetKind,
    StrategyCandidate, StrategyType, TierMetrics,
};
pub use weighting::{adjust_incremental, allocate, WeightBounds, WeightVector};
