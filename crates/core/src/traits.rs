use crate::error::Result;
use crate::types::{AccountSnapshot, OrderAck, OrderRequest};
use async_trait::async_trait;
use rust_decimal::Decimal;

/// Source of the total AUM figure. May fail; callers keep a
/// last-known-good cache.
#[async_trait]
pub trait CapitalDataProvider: Send + Sync {
    async fn current_aum(&self) -> Result<Decimal>;
}

/// Source of the account margin snapshot.
#[async_trait]
pub trait AccountDataProvider: Send + Sync {
    async fn account_snapshot(&self) -> Result<AccountSnapshot>;
}

/// Order placement seam; the broker integration lives behind it.
#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    async fn place_order(&self, order: &OrderRequest) -> Result<OrderAck>;
}

/// Unit price lookup for safe assets.
#[async_trait]
pub trait AssetPriceProvider: Send + Sync {
    async fn price(&self, symbol: &str) -> Result<Decimal>;
}
