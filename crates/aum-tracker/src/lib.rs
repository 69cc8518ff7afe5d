pub mod tracker;

pub use capital_engine_core::events::TierChangeCallback;
pub use tracker::AumTracker;
