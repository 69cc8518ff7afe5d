//! Profit lockbox — computes and executes segregation of realized profit
//! into low-risk assets.
//!
//! Short-term repos quantize down to 1000-unit lots and only trade inside
//! the exchange windows; money-market and bond ETFs quantize down to
//! 100-share lots at the fetched unit price. A failure on the primary asset
//! triggers exactly one retry against the configured fallback before the
//! failure surfaces.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Local, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};

use capital_engine_core::config::LockBoxConfig;
use capital_engine_core::error::{EngineError, Result};
use capital_engine_core::history::HistoryStore;
use capital_engine_core::traits::{AssetPriceProvider, ExecutionEngine};
use capital_engine_core::types::{
    OrderAction, OrderKind, OrderRequest, SafeAsset, SafeAssetKind,
};

/// Portfolio figures the lockbox decides from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioSummary {
    pub total_assets: Decimal,
    pub daily_pnl: Decimal,
}

/// One executed lock, kept in the append-only history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockRecord {
    pub asset: SafeAsset,
    /// Capital actually locked after quantization.
    pub amount: Decimal,
    /// Units (repo) or shares (ETF) bought.
    pub quantity: Decimal,
    pub price: Option<Decimal>,
    pub order_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Snapshot of cumulative lockbox state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockBoxState {
    pub total_locked: Decimal,
    /// Locked capital per asset symbol.
    pub ledger: BTreeMap<String, Decimal>,
    pub locks_executed: usize,
}

struct LockBoxInner {
    total_locked: Decimal,
    ledger: BTreeMap<String, Decimal>,
    history: HistoryStore<LockRecord>,
}

/// Computes lockable profit and executes locks against safe assets.
pub struct ProfitLockBox {
    execution: Arc<dyn ExecutionEngine>,
    prices: Arc<dyn AssetPriceProvider>,
    config: LockBoxConfig,
    inner: Mutex<LockBoxInner>,
}

impl ProfitLockBox {
    #[must_use]
    pub fn new(
        execution: Arc<dyn ExecutionEngine>,
        prices: Arc<dyn AssetPriceProvider>,
        config: LockBoxConfig,
    ) -> Self {
        let history: HistoryStore<LockRecord> = match &config.history_path {
            Some(path) => HistoryStore::with_file(config.history_cap, path.clone()),
            None => HistoryStore::new(config.history_cap),
        };
        let mut total_locked = Decimal::ZERO;
        let mut ledger = BTreeMap::new();
        for record in history.entries() {
            total_locked += record.amount;
            *ledger.entry(record.asset.symbol.clone()).or_default() += record.amount;
        }
        Self {
            execution,
            prices,
            config,
            inner: Mutex::new(LockBoxInner {
                total_locked,
                ledger,
                history,
            }),
        }
    }

    /// Cumulative state snapshot.
    pub async fn state(&self) -> LockBoxState {
        let inner = self.inner.lock().await;
        LockBoxState {
            total_locked: inner.total_locked,
            ledger: inner.ledger.clone(),
            locks_executed: inner.history.len(),
        }
    }

    /// Lock history snapshot, oldest first.
    pub async fn lock_history(&self) -> Vec<LockRecord> {
        self.inner.lock().await.history.entries()
    }

    /// How much of today's profit should be locked.
    ///
    /// Zero when the day is flat/negative, when the target falls below the
    /// minimum lot worth locking, or when the cumulative cap is reached;
    /// otherwise min(target, remaining capacity).
    pub async fn calculate_lockable(&self, portfolio: &PortfolioSummary) -> Decimal {
        if portfolio.daily_pnl <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        let target = portfolio.daily_pnl * self.config.lock_ratio;
        if target < self.config.min_lock_amount {
            return Decimal::ZERO;
        }
        let already_locked = self.inner.lock().await.total_locked;
        let max_lockable = portfolio.total_assets * self.config.max_lock_ratio - already_locked;
        if max_lockable <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        target.min(max_lockable)
    }

    /// Locks `amount` into the given asset (default: the configured
    /// primary). A primary-path failure is retried exactly once against the
    /// configured fallback asset.
    ///
    /// # Errors
    /// Surfaces the final failure after the fallback retry: sub-lot
    /// amounts, a closed trading window, a missing price, or a rejected
    /// order.
    pub async fn execute_lock(
        &self,
        amount: Decimal,
        asset: Option<&SafeAsset>,
    ) -> Result<LockRecord> {
        self.execute_lock_at(amount, asset, Local::now().time()).await
    }

    /// Window-checkable variant of [`ProfitLockBox::execute_lock`].
    pub async fn execute_lock_at(
        &self,
        amount: Decimal,
        asset: Option<&SafeAsset>,
        now: NaiveTime,
    ) -> Result<LockRecord> {
        if amount <= Decimal::ZERO {
            return Err(EngineError::invalid_input(format!(
                "lock amount must be positive, got {amount}"
            )));
        }

        let primary = asset.unwrap_or(&self.config.primary_asset);
        match self.lock_once(amount, primary, now).await {
            Ok(record) => Ok(record),
            Err(primary_err) => {
                let fallback = &self.config.fallback_asset;
                if fallback == primary {
                    return Err(primary_err);
                }
                warn!(
                    error = %primary_err,
                    primary = primary.symbol,
                    fallback = fallback.symbol,
                    "primary lock failed, retrying once with fallback asset"
                );
                self.lock_once(amount, fallback, now).await
            }
        }
    }

    /// End-of-day hook: no-op unless auto-lock is enabled and local time has
    /// passed the trigger; then computes and, if positive, executes.
    ///
    /// # Errors
    /// Propagates lock execution failures.
    pub async fn auto_check(&self, portfolio: &PortfolioSummary) -> Result<Option<LockRecord>> {
        self.auto_check_at(portfolio, Local::now().time()).await
    }

    /// Window-checkable variant of [`ProfitLockBox::auto_check`].
    pub async fn auto_check_at(
        &self,
        portfolio: &PortfolioSummary,
        now: NaiveTime,
    ) -> Result<Option<LockRecord>> {
        if !self.config.auto_lock || now < self.config.trigger_time {
            return Ok(None);
        }
        let amount = self.calculate_lockable(portfolio).await;
        if amount.is_zero() {
            return Ok(None);
        }
        info!(%amount, "auto-lock triggered");
        self.execute_lock_at(amount, None, now).await.map(Some)
    }

    /// Single lock attempt against one asset, no fallback.
    async fn lock_once(
        &self,
        amount: Decimal,
        asset: &SafeAsset,
        now: NaiveTime,
    ) -> Result<LockRecord> {
        let (order, locked_amount, price) = match asset.kind {
            SafeAssetKind::ShortTermRepo => {
                let lot = Decimal::from(1000);
                let quantity = (amount / lot).floor() * lot;
                if quantity.is_zero() {
                    return Err(EngineError::invalid_input(format!(
                        "amount {amount} is below one 1000-unit repo lot"
                    )));
                }
                if !within_trading_window(now) {
                    return Err(EngineError::LockWindowClosed {
                        symbol: asset.symbol.clone(),
                        local_time: now.format("%H:%M:%S").to_string(),
                    });
                }
                // Exchange reverse repos are lent by selling the repo code.
                let order = OrderRequest {
                    symbol: asset.symbol.clone(),
                    action: OrderAction::Sell,
                    quantity,
                    price: None,
                    kind: OrderKind::Market,
                };
                (order, quantity, None)
            }
            SafeAssetKind::MoneyMarketEtf | SafeAssetKind::BondEtf => {
                let price = self
                    .prices
                    .price(&asset.symbol)
                    .await
                    .map_err(|e| {
                        warn!(symbol = asset.symbol, error = %e, "price lookup failed");
                        EngineError::price_unavailable(asset.symbol.clone())
                    })?;
                if price <= Decimal::ZERO {
                    return Err(EngineError::price_unavailable(asset.symbol.clone()));
                }
                let lot = Decimal::from(100);
                let shares = (amount / price / lot).floor() * lot;
                if shares < lot {
                    return Err(EngineError::invalid_input(format!(
                        "amount {amount} buys fewer than 100 shares of {} at {price}",
                        asset.symbol
                    )));
                }
                let order = OrderRequest {
                    symbol: asset.symbol.clone(),
                    action: OrderAction::Buy,
                    quantity: shares,
                    price: Some(price),
                    kind: OrderKind::Limit,
                };
                (order, shares * price, Some(price))
            }
        };

        let ack = self.execution.place_order(&order).await?;
        if !ack.success {
            return Err(EngineError::order_rejected(
                ack.message
                    .unwrap_or_else(|| format!("lock order for {} rejected", asset.symbol)),
            ));
        }

        let record = LockRecord {
            asset: asset.clone(),
            amount: locked_amount,
            quantity: order.quantity,
            price,
            order_id: ack.order_id,
            timestamp: Utc::now(),
        };

        let mut inner = self.inner.lock().await;
        inner.total_locked += record.amount;
        *inner
            .ledger
            .entry(record.asset.symbol.clone())
            .or_default() += record.amount;
        inner.history.push(record.clone());
        drop(inner);

        info!(
            symbol = record.asset.symbol,
            amount = %record.amount,
            quantity = %record.quantity,
            "profit locked"
        );
        Ok(record)
    }
}

/// Exchange repo trading windows: 09:30-11:30 and 13:00-15:30 local.
#[must_use]
pub fn within_trading_window(now: NaiveTime) -> bool {
    let morning_open = NaiveTime::from_hms_opt(9, 30, 0).unwrap();
    let morning_close = NaiveTime::from_hms_opt(11, 30, 0).unwrap();
    let afternoon_open = NaiveTime::from_hms_opt(13, 0, 0).unwrap();
    let afternoon_close = NaiveTime::from_hms_opt(15, 30, 0).unwrap();
    (now >= morning_open && now <= morning_close)
        || (now >= afternoon_open && now <= afternoon_close)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use capital_engine_core::types::OrderAck;
    use rust_decimal_macros::dec;
    use std::sync::Mutex as StdMutex;

    struct RecordingEngine {
        orders: StdMutex<Vec<OrderRequest>>,
        reject: bool,
    }

    impl RecordingEngine {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                orders: StdMutex::new(Vec::new()),
                reject: false,
            })
        }

        fn rejecting() -> Arc<Self> {
            Arc::new(Self {
                orders: StdMutex::new(Vec::new()),
                reject: true,
            })
        }

        fn orders(&self) -> Vec<OrderRequest> {
            self.orders.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ExecutionEngine for RecordingEngine {
        async fn place_order(&self, order: &OrderRequest) -> Result<OrderAck> {
            self.orders.lock().unwrap().push(order.clone());
            if self.reject {
                return Ok(OrderAck {
                    success: false,
                    order_id: None,
                    message: Some("venue rejected".to_string()),
                });
            }
            Ok(OrderAck {
                success: true,
                order_id: Some(format!("lock-{}", order.symbol)),
                message: None,
            })
        }
    }

    struct StaticPrices {
        price: Option<Decimal>,
    }

    #[async_trait]
    impl AssetPriceProvider for StaticPrices {
        async fn price(&self, symbol: &str) -> Result<Decimal> {
            self.price
                .ok_or_else(|| EngineError::price_unavailable(symbol.to_string()))
        }
    }

    fn lockbox_with(
        engine: Arc<RecordingEngine>,
        price: Option<Decimal>,
        config: LockBoxConfig,
    ) -> ProfitLockBox {
        ProfitLockBox::new(engine, Arc::new(StaticPrices { price }), config)
    }

    fn in_window() -> NaiveTime {
        NaiveTime::from_hms_opt(10, 0, 0).unwrap()
    }

    fn portfolio(total_assets: Decimal, daily_pnl: Decimal) -> PortfolioSummary {
        PortfolioSummary {
            total_assets,
            daily_pnl,
        }
    }

    #[tokio::test]
    async fn lockable_profit_follows_the_ratio() {
        let lockbox = lockbox_with(
            RecordingEngine::new(),
            Some(dec!(1)),
            LockBoxConfig::default(),
        );
        // 100k pnl x 0.3 = 30k, within the 500k cap.
        let amount = lockbox
            .calculate_lockable(&portfolio(dec!(1000000), dec!(100000)))
            .await;
        assert_eq!(amount, dec!(30000));
    }

    #[tokio::test]
    async fn small_targets_below_minimum_lock_nothing() {
        let lockbox = lockbox_with(
            RecordingEngine::new(),
            Some(dec!(1)),
            LockBoxConfig::default(),
        );
        // 20k pnl x 0.3 = 6k < 10k minimum.
        let amount = lockbox
            .calculate_lockable(&portfolio(dec!(1000000), dec!(20000)))
            .await;
        assert_eq!(amount, dec!(0));
    }

    #[tokio::test]
    async fn flat_or_losing_days_lock_nothing() {
        let lockbox = lockbox_with(
            RecordingEngine::new(),
            Some(dec!(1)),
            LockBoxConfig::default(),
        );
        assert_eq!(
            lockbox
                .calculate_lockable(&portfolio(dec!(1000000), dec!(0)))
                .await,
            dec!(0)
        );
        assert_eq!(
            lockbox
                .calculate_lockable(&portfolio(dec!(1000000), dec!(-50000)))
                .await,
            dec!(0)
        );
    }

    #[tokio::test]
    async fn cumulative_cap_limits_the_lock() {
        let engine = RecordingEngine::new();
        let lockbox = lockbox_with(engine, Some(dec!(1)), LockBoxConfig::default());

        // Lock 30k first; cap for 100k assets is 50k, leaving 20k capacity.
        lockbox
            .execute_lock_at(dec!(30000), None, in_window())
            .await
            .unwrap();
        let amount = lockbox
            .calculate_lockable(&portfolio(dec!(100000), dec!(100000)))
            .await;
        assert_eq!(amount, dec!(20000));

        // Exhausted capacity locks nothing.
        lockbox
            .execute_lock_at(dec!(20000), None, in_window())
            .await
            .unwrap();
        let amount = lockbox
            .calculate_lockable(&portfolio(dec!(100000), dec!(100000)))
            .await;
        assert_eq!(amount, dec!(0));
    }

    #[tokio::test]
    async fn repo_lock_quantizes_to_thousand_unit_lots() {
        let engine = RecordingEngine::new();
        let lockbox = lockbox_with(engine.clone(), Some(dec!(1)), LockBoxConfig::default());

        let record = lockbox
            .execute_lock_at(dec!(30500), None, in_window())
            .await
            .unwrap();

        assert_eq!(record.quantity, dec!(30000));
        assert_eq!(record.amount, dec!(30000));
        assert_eq!(record.asset.kind, SafeAssetKind::ShortTermRepo);

        let orders = engine.orders();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].action, OrderAction::Sell);
        assert_eq!(orders[0].quantity, dec!(30000));

        let state = lockbox.state().await;
        assert_eq!(state.total_locked, dec!(30000));
        assert_eq!(state.ledger.get("204001"), Some(&dec!(30000)));
        assert_eq!(state.locks_executed, 1);
    }

    #[tokio::test]
    async fn closed_window_falls_back_to_the_etf_once() {
        let engine = RecordingEngine::new();
        let lockbox = lockbox_with(engine.clone(), Some(dec!(100)), LockBoxConfig::default());

        let noon = NaiveTime::from_hms_opt(12, 0, 0).unwrap();
        let record = lockbox
            .execute_lock_at(dec!(50000), None, noon)
            .await
            .unwrap();

        // Repo attempt never reached the engine; the ETF did.
        let orders = engine.orders();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].symbol, "511990");
        assert_eq!(orders[0].action, OrderAction::Buy);
        // 50000 / 100 = 500 shares, already on a 100-share lot.
        assert_eq!(record.quantity, dec!(500));
        assert_eq!(record.amount, dec!(50000));
    }

    #[tokio::test]
    async fn fallback_failure_surfaces_after_exactly_one_retry() {
        // Repo window closed AND no ETF price: both paths fail.
        let engine = RecordingEngine::new();
        let lockbox = lockbox_with(engine.clone(), None, LockBoxConfig::default());

        let noon = NaiveTime::from_hms_opt(12, 0, 0).unwrap();
        let err = lockbox
            .execute_lock_at(dec!(50000), None, noon)
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::PriceUnavailable { .. }));
        assert!(engine.orders().is_empty());
        assert_eq!(lockbox.state().await.total_locked, dec!(0));
    }

    #[tokio::test]
    async fn etf_lock_requires_a_hundred_share_lot() {
        let engine = RecordingEngine::new();
        let config = LockBoxConfig {
            primary_asset: SafeAsset::new(SafeAssetKind::BondEtf, "511010"),
            fallback_asset: SafeAsset::new(SafeAssetKind::BondEtf, "511010"),
            ..LockBoxConfig::default()
        };
        let lockbox = lockbox_with(engine.clone(), Some(dec!(120)), config);

        // 11000 / 120 = 91.6 shares, below one lot.
        let err = lockbox
            .execute_lock_at(dec!(11000), None, in_window())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)));
        assert!(engine.orders().is_empty());
    }

    #[tokio::test]
    async fn rejected_orders_do_not_touch_the_ledger() {
        let engine = RecordingEngine::rejecting();
        let lockbox = lockbox_with(engine, None, LockBoxConfig::default());

        let err = lockbox
            .execute_lock_at(dec!(30000), None, in_window())
            .await
            .unwrap_err();
        // Primary rejected, fallback has no price.
        assert!(matches!(err, EngineError::PriceUnavailable { .. }));
        assert_eq!(lockbox.state().await.total_locked, dec!(0));
        assert!(lockbox.lock_history().await.is_empty());
    }

    #[tokio::test]
    async fn auto_check_honors_the_gate_and_trigger_time() {
        let engine = RecordingEngine::new();
        let mut config = LockBoxConfig::default();
        config.auto_lock = true;
        let lockbox = lockbox_with(engine.clone(), Some(dec!(1)), config);
        let p = portfolio(dec!(1000000), dec!(100000));

        // Before the trigger: no-op.
        let early = NaiveTime::from_hms_opt(10, 0, 0).unwrap();
        assert!(lockbox.auto_check_at(&p, early).await.unwrap().is_none());

        // After the trigger (14:45 default, inside the afternoon window).
        let late = NaiveTime::from_hms_opt(14, 50, 0).unwrap();
        let record = lockbox.auto_check_at(&p, late).await.unwrap().unwrap();
        assert_eq!(record.amount, dec!(30000));
        assert_eq!(engine.orders().len(), 1);
    }

    #[tokio::test]
    async fn auto_check_disabled_is_a_noop() {
        let engine = RecordingEngine::new();
        let lockbox = lockbox_with(engine.clone(), Some(dec!(1)), LockBoxConfig::default());
        let p = portfolio(dec!(1000000), dec!(100000));

        let late = NaiveTime::from_hms_opt(14, 50, 0).unwrap();
        assert!(lockbox.auto_check_at(&p, late).await.unwrap().is_none());
        assert!(engine.orders().is_empty());
    }

    #[tokio::test]
    async fn lock_history_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("locks.json");
        let config = LockBoxConfig {
            history_path: Some(path.clone()),
            ..LockBoxConfig::default()
        };

        let lockbox = lockbox_with(RecordingEngine::new(), Some(dec!(1)), config.clone());
        lockbox
            .execute_lock_at(dec!(30000), None, in_window())
            .await
            .unwrap();

        // A fresh instance over the same file restores the ledger.
        let restored = lockbox_with(RecordingEngine::new(), Some(dec!(1)), config);
        let state = restored.state().await;
        assert_eq!(state.total_locked, dec!(30000));
        assert_eq!(state.ledger.get("204001"), Some(&dec!(30000)));
        assert_eq!(restored.lock_history().await.len(), 1);
    }

    #[test]
    fn trading_window_boundaries() {
        let t = |h, m| NaiveTime::from_hms_opt(h, m, 0).unwrap();
        assert!(!within_trading_window(t(9, 29)));
        assert!(within_trading_window(t(9, 30)));
        assert!(within_trading_window(t(11, 30)));
        assert!(!within_trading_window(t(11, 31)));
        assert!(!within_trading_window(t(12, 59)));
        assert!(within_trading_window(t(13, 0)));
        assert!(within_trading_window(t(15, 30)));
        assert!(!within_trading_window(t(15, 31)));
    }
}
