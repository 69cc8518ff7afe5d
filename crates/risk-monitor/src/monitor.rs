//! Margin risk monitoring — ratio computation, level reclassification,
//! alerting, and the critical-level cascade trigger.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use capital_engine_core::config::RiskMonitorConfig;
use capital_engine_core::error::{EngineError, Result};
use capital_engine_core::history::HistoryStore;
use capital_engine_core::traits::{AccountDataProvider, ExecutionEngine};
use capital_engine_core::types::{AccountSnapshot, MarginPosition};

use crate::alerts::{AlertCallback, RiskAlert};
use crate::cascade::{self, LiquidationAudit};
use crate::level::{classify_risk_level, RiskLevel};

/// Computed account risk state. Replaced wholesale on every check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountRiskState {
    pub total_assets: Decimal,
    pub margin_used: Decimal,
    pub margin_available: Decimal,
    /// margin_used / total_assets.
    pub margin_ratio: f64,
    /// margin_used / (margin_used + margin_available).
    pub risk_ratio: f64,
    pub risk_level: RiskLevel,
    pub positions: Vec<MarginPosition>,
    pub timestamp: DateTime<Utc>,
}

impl AccountRiskState {
    /// Builds the state from raw account figures.
    #[must_use]
    pub fn compute(
        total_assets: Decimal,
        margin_used: Decimal,
        margin_available: Decimal,
        positions: Vec<MarginPosition>,
        config: &RiskMonitorConfig,
    ) -> Self {
        let margin_ratio = ratio(margin_used, total_assets);
        let risk_ratio = ratio(margin_used, margin_used + margin_available);
        Self {
            total_assets,
            margin_used,
            margin_available,
            margin_ratio,
            risk_ratio,
            risk_level: classify_risk_level(risk_ratio, config),
            positions,
            timestamp: Utc::now(),
        }
    }

    /// Releases a liquidated position's margin back to available and drops
    /// it from the position list.
    pub(crate) fn release_margin(&mut self, position: &MarginPosition) {
        self.margin_used -= position.margin_required;
        self.margin_available += position.margin_required;
        self.margin_ratio = ratio(self.margin_used, self.total_assets);
        self.risk_ratio = ratio(self.margin_used, self.margin_used + self.margin_available);
        self.positions.retain(|p| p.symbol != position.symbol);
    }
}

fn ratio(numerator: Decimal, denominator: Decimal) -> f64 {
    if denominator.is_zero() {
        return 0.0;
    }
    (numerator / denominator).try_into().unwrap_or(0.0)
}

/// Cascade counts carried in a check report.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CascadeSummary {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub final_risk_ratio: f64,
}

impl From<&LiquidationAudit> for CascadeSummary {
    fn from(audit: &LiquidationAudit) -> Self {
        Self {
            attempted: audit.attempted,
            succeeded: audit.succeeded,
            failed: audit.failed,
            final_risk_ratio: audit.end_risk_ratio,
        }
    }
}

/// Structured result of one risk check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskCheckReport {
    pub margin_ratio: f64,
    pub risk_ratio: f64,
    pub risk_level: RiskLevel,
    pub positions_count: usize,
    /// Present when this check triggered a liquidation cascade.
    pub cascade: Option<CascadeSummary>,
}

/// Classifies account risk and runs the forced-liquidation cascade on a
/// Critical breach.
pub struct MarginRiskMonitor {
    account: Arc<dyn AccountDataProvider>,
    execution: Arc<dyn ExecutionEngine>,
    config: RiskMonitorConfig,
    state: RwLock<Option<AccountRiskState>>,
    alert_callback: RwLock<Option<AlertCallback>>,
    audits: Mutex<HistoryStore<LiquidationAudit>>,
    monitoring: AtomicBool,
}

impl MarginRiskMonitor {
    /// # Errors
    /// Returns `EngineError::InvalidInput` if the threshold configuration is
    /// misordered.
    pub fn new(
        account: Arc<dyn AccountDataProvider>,
        execution: Arc<dyn ExecutionEngine>,
        config: RiskMonitorConfig,
    ) -> Result<Self> {
        config.validate()?;
        let audits = match &config.audit_path {
            Some(path) => HistoryStore::with_file(config.audit_cap, path.clone()),
            None => HistoryStore::new(config.audit_cap),
        };
        Ok(Self {
            account,
            execution,
            config,
            state: RwLock::new(None),
            alert_callback: RwLock::new(None),
            audits: Mutex::new(audits),
            monitoring: AtomicBool::new(false),
        })
    }

    #[must_use]
    pub fn config(&self) -> &RiskMonitorConfig {
        &self.config
    }

    /// Sets the process-wide alert callback.
    pub async fn register_alert_callback(&self, callback: AlertCallback) {
        *self.alert_callback.write().await = Some(callback);
    }

    /// The last computed risk state, if any check has run.
    pub async fn risk_state(&self) -> Option<AccountRiskState> {
        self.state.read().await.clone()
    }

    /// Snapshot of the liquidation audit history, oldest first.
    pub async fn liquidation_audits(&self) -> Vec<LiquidationAudit> {
        self.audits.lock().await.entries()
    }

    /// True while the poll loop is running.
    #[must_use]
    pub fn is_monitoring(&self) -> bool {
        self.monitoring.load(Ordering::SeqCst)
    }

    pub(crate) fn set_monitoring(&self, on: bool) {
        self.monitoring.store(on, Ordering::SeqCst);
    }

    /// Runs one risk check, fetching the account snapshot when none is
    /// given. Level changes and margin-cap breaches raise alerts; a
    /// Critical risk ratio with auto-remediation enabled runs the
    /// liquidation cascade.
    ///
    /// # Errors
    /// `EngineError::InvalidInput` on a zero-asset snapshot;
    /// `EngineError::ServiceUnavailable` when the account fetch fails.
    pub async fn check(&self, snapshot: Option<AccountSnapshot>) -> Result<RiskCheckReport> {
        let snapshot = match snapshot {
            Some(snapshot) => snapshot,
            None => self.account.account_snapshot().await?,
        };
        if snapshot.total_assets.is_zero() {
            return Err(EngineError::invalid_input(
                "account snapshot reports zero total assets",
            ));
        }

        let mut state = AccountRiskState::compute(
            snapshot.total_assets,
            snapshot.margin_used,
            snapshot.margin_available,
            snapshot.positions,
            &self.config,
        );

        let previous_level = self.state.read().await.as_ref().map(|s| s.risk_level);
        if previous_level != Some(state.risk_level) {
            info!(
                from = ?previous_level,
                to = %state.risk_level,
                risk_ratio = state.risk_ratio,
                "risk level changed"
            );
            self.emit_alert(&RiskAlert::LevelChanged {
                from: previous_level,
                to: state.risk_level,
                risk_ratio: state.risk_ratio,
                timestamp: state.timestamp,
            })
            .await;
        }

        if state.margin_ratio > self.config.margin_ratio_cap {
            warn!(
                margin_ratio = state.margin_ratio,
                cap = self.config.margin_ratio_cap,
                "margin ratio cap breached"
            );
            self.emit_alert(&RiskAlert::MarginCapBreached {
                margin_ratio: state.margin_ratio,
                cap: self.config.margin_ratio_cap,
                timestamp: state.timestamp,
            })
            .await;
        }

        let mut cascade_summary = None;
        if state.risk_level == RiskLevel::Critical && self.config.auto_liquidation {
            let audit = cascade::run(&*self.execution, &mut state, &self.config).await;
            state.risk_level = classify_risk_level(state.risk_ratio, &self.config);
            let summary = CascadeSummary::from(&audit);
            self.emit_alert(&RiskAlert::CascadeCompleted {
                attempted: summary.attempted,
                succeeded: summary.succeeded,
                failed: summary.failed,
                final_risk_ratio: summary.final_risk_ratio,
                timestamp: Utc::now(),
            })
            .await;
            self.audits.lock().await.push(audit);
            cascade_summary = Some(summary);
        }

        let report = RiskCheckReport {
            margin_ratio: state.margin_ratio,
            risk_ratio: state.risk_ratio,
            risk_level: state.risk_level,
            positions_count: state.positions.len(),
            cascade: cascade_summary,
        };
        *self.state.write().await = Some(state);
        Ok(report)
    }

    /// Delivers an alert to the registered callback; failures are logged and
    /// never interrupt monitoring.
    async fn emit_alert(&self, alert: &RiskAlert) {
        let callback = self.alert_callback.read().await.clone();
        if let Some(callback) = callback {
            if let Err(e) = callback(alert) {
                warn!(error = %e, "alert callback failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use capital_engine_core::types::{OrderAck, OrderRequest, PositionKind};
    use rust_decimal_macros::dec;
    use std::sync::Mutex as StdMutex;

    struct StaticAccount {
        snapshot: Option<AccountSnapshot>,
    }

    #[async_trait]
    impl AccountDataProvider for StaticAccount {
        async fn account_snapshot(&self) -> Result<AccountSnapshot> {
            self.snapshot
                .clone()
                .ok_or_else(|| EngineError::service_unavailable("account feed down"))
        }
    }

    struct CountingEngine {
        orders: StdMutex<Vec<OrderRequest>>,
    }

    impl CountingEngine {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                orders: StdMutex::new(Vec::new()),
            })
        }

        fn count(&self) -> usize {
            self.orders.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ExecutionEngine for CountingEngine {
        async fn place_order(&self, order: &OrderRequest) -> Result<OrderAck> {
            self.orders.lock().unwrap().push(order.clone());
            Ok(OrderAck {
                success: true,
                order_id: Some("oid-1".to_string()),
                message: None,
            })
        }
    }

    fn position(symbol: &str, margin_required: Decimal) -> MarginPosition {
        MarginPosition {
            symbol: symbol.to_string(),
            kind: PositionKind::Option,
            quantity: dec!(5),
            margin_required,
            market_value: margin_required * dec!(2),
            unrealized_pnl: dec!(0),
            risk_contribution: 0.5,
        }
    }

    fn snapshot(
        total_assets: Decimal,
        margin_used: Decimal,
        margin_available: Decimal,
        positions: Vec<MarginPosition>,
    ) -> AccountSnapshot {
        AccountSnapshot {
            total_assets,
            margin_used,
            margin_available,
            positions,
        }
    }

    fn monitor(
        account: Option<AccountSnapshot>,
        engine: Arc<CountingEngine>,
        config: RiskMonitorConfig,
    ) -> MarginRiskMonitor {
        MarginRiskMonitor::new(Arc::new(StaticAccount { snapshot: account }), engine, config)
            .unwrap()
    }

    #[tokio::test]
    async fn check_computes_both_ratios() {
        let engine = CountingEngine::new();
        let m = monitor(None, engine, RiskMonitorConfig::default());

        let report = m
            .check(Some(snapshot(
                dec!(1000000),
                dec!(300000),
                dec!(700000),
                vec![position("OPT1", dec!(100000))],
            )))
            .await
            .unwrap();

        assert!((report.margin_ratio - 0.30).abs() < 1e-9);
        assert!((report.risk_ratio - 0.30).abs() < 1e-9);
        assert_eq!(report.risk_level, RiskLevel::Safe);
        assert_eq!(report.positions_count, 1);
        assert!(report.cascade.is_none());
        assert!(m.risk_state().await.is_some());
    }

    #[tokio::test]
    async fn zero_total_assets_is_a_reported_failure() {
        let engine = CountingEngine::new();
        let m = monitor(None, engine, RiskMonitorConfig::default());

        let err = m
            .check(Some(snapshot(dec!(0), dec!(0), dec!(0), Vec::new())))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn level_change_and_margin_cap_raise_separate_alerts() {
        let engine = CountingEngine::new();
        let m = monitor(None, engine, RiskMonitorConfig::default());

        let alerts: Arc<StdMutex<Vec<RiskAlert>>> = Arc::new(StdMutex::new(Vec::new()));
        let sink = alerts.clone();
        m.register_alert_callback(Arc::new(move |alert| {
            sink.lock().unwrap().push(alert.clone());
            Ok(())
        }))
        .await;

        // margin_ratio 0.35 breaches the 0.30 cap; risk_ratio 0.35 is Safe.
        m.check(Some(snapshot(
            dec!(1000000),
            dec!(350000),
            dec!(650000),
            Vec::new(),
        )))
        .await
        .unwrap();

        let alerts = alerts.lock().unwrap();
        assert_eq!(alerts.len(), 2);
        assert!(matches!(
            alerts[0],
            RiskAlert::LevelChanged {
                from: None,
                to: RiskLevel::Safe,
                ..
            }
        ));
        assert!(matches!(alerts[1], RiskAlert::MarginCapBreached { .. }));
    }

    #[tokio::test]
    async fn repeated_level_does_not_realert() {
        let engine = CountingEngine::new();
        let m = monitor(None, engine, RiskMonitorConfig::default());

        let alerts: Arc<StdMutex<Vec<RiskAlert>>> = Arc::new(StdMutex::new(Vec::new()));
        let sink = alerts.clone();
        m.register_alert_callback(Arc::new(move |alert| {
            sink.lock().unwrap().push(alert.clone());
            Ok(())
        }))
        .await;

        let s = snapshot(dec!(1000000), dec!(200000), dec!(800000), Vec::new());
        m.check(Some(s.clone())).await.unwrap();
        m.check(Some(s)).await.unwrap();

        // One LevelChanged (None -> Safe) from the first check only.
        assert_eq!(alerts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn critical_with_auto_liquidation_runs_the_cascade() {
        let engine = CountingEngine::new();
        let m = monitor(None, engine.clone(), RiskMonitorConfig::default());

        let alerts: Arc<StdMutex<Vec<RiskAlert>>> = Arc::new(StdMutex::new(Vec::new()));
        let sink = alerts.clone();
        m.register_alert_callback(Arc::new(move |alert| {
            sink.lock().unwrap().push(alert.clone());
            Ok(())
        }))
        .await;

        // risk_ratio 0.9 -> Critical.
        let report = m
            .check(Some(snapshot(
                dec!(2000000),
                dec!(900000),
                dec!(100000),
                vec![position("OPT1", dec!(400000))],
            )))
            .await
            .unwrap();

        assert!(engine.count() >= 1);
        let cascade = report.cascade.expect("cascade summary");
        assert_eq!(cascade.attempted, 1);
        assert_eq!(cascade.succeeded, 1);
        assert!(cascade.final_risk_ratio < 0.7);
        // Post-cascade state reflects the released margin.
        assert_eq!(report.risk_level, RiskLevel::Safe);
        assert_eq!(m.liquidation_audits().await.len(), 1);
        assert!(alerts
            .lock()
            .unwrap()
            .iter()
            .any(|a| matches!(a, RiskAlert::CascadeCompleted { .. })));
    }

    #[tokio::test]
    async fn critical_without_auto_liquidation_places_no_orders() {
        let engine = CountingEngine::new();
        let m = monitor(
            None,
            engine.clone(),
            RiskMonitorConfig {
                auto_liquidation: false,
                ..RiskMonitorConfig::default()
            },
        );

        let report = m
            .check(Some(snapshot(
                dec!(2000000),
                dec!(900000),
                dec!(100000),
                vec![position("OPT1", dec!(400000))],
            )))
            .await
            .unwrap();

        assert_eq!(report.risk_level, RiskLevel::Critical);
        assert_eq!(engine.count(), 0);
        assert!(report.cascade.is_none());
    }

    #[tokio::test]
    async fn alert_callback_failure_never_fails_the_check() {
        let engine = CountingEngine::new();
        let m = monitor(None, engine, RiskMonitorConfig::default());
        m.register_alert_callback(Arc::new(|_alert| {
            Err(EngineError::service_unavailable("alert sink down"))
        }))
        .await;

        let report = m
            .check(Some(snapshot(
                dec!(1000000),
                dec!(200000),
                dec!(800000),
                Vec::new(),
            )))
            .await;
        assert!(report.is_ok());
    }

    #[tokio::test]
    async fn provided_snapshot_bypasses_the_provider() {
        // Provider would fail, but the caller supplies the snapshot.
        let engine = CountingEngine::new();
        let m = monitor(None, engine, RiskMonitorConfig::default());

        assert!(m
            .check(Some(snapshot(
                dec!(500000),
                dec!(100000),
                dec!(400000),
                Vec::new(),
            )))
            .await
            .is_ok());

        // Without a snapshot the fetch failure surfaces.
        let err = m.check(None).await.unwrap_err();
        assert!(matches!(err, EngineError::ServiceUnavailable(_)));
    }
}
