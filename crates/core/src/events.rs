use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::tiering::Tier;

/// Emitted when the classified capital tier changes.
///
/// `old_tier` is `None` on the first classification after startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierChangeEvent {
    pub old_tier: Option<Tier>,
    pub new_tier: Tier,
    pub aum: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// Synchronous tier-change listener. Errors are logged by the emitter and
/// never interrupt the other listeners.
pub type TierChangeCallback = Arc<dyn Fn(&TierChangeEvent) -> Result<()> + Send + Sync>;
