//! Forced-liquidation cascade.
//!
//! Positions liquidate one at a time in priority order (options first, then
//! futures, then margin stock; highest risk contribution first within a
//! kind) until the risk ratio drops below the Danger threshold or positions
//! run out. One failed liquidation is recorded and the cascade moves on; the
//! whole run produces a single audit entry.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use capital_engine_core::config::RiskMonitorConfig;
use capital_engine_core::traits::ExecutionEngine;
use capital_engine_core::types::{
    MarginPosition, OrderAction, OrderKind, OrderRequest, PositionKind,
};

use crate::monitor::AccountRiskState;

/// Outcome of one liquidation attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidationEntry {
    pub symbol: String,
    pub kind: PositionKind,
    pub quantity: Decimal,
    pub margin_released: Decimal,
    pub success: bool,
    pub message: Option<String>,
}

/// Audit record for one cascade run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidationAudit {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub start_risk_ratio: f64,
    pub end_risk_ratio: f64,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub entries: Vec<LiquidationEntry>,
}

/// Runs the cascade against the account state, mutating its margin figures
/// and position list as liquidations fill.
pub async fn run(
    execution: &dyn ExecutionEngine,
    state: &mut AccountRiskState,
    config: &RiskMonitorConfig,
) -> LiquidationAudit {
    let started_at = Utc::now();
    let start_risk_ratio = state.risk_ratio;

    let mut queue = state.positions.clone();
    queue.sort_by(|a, b| {
        a.kind.priority().cmp(&b.kind.priority()).then(
            b.risk_contribution
                .partial_cmp(&a.risk_contribution)
                .unwrap_or(std::cmp::Ordering::Equal),
        )
    });

    warn!(
        risk_ratio = start_risk_ratio,
        positions = queue.len(),
        "starting forced-liquidation cascade"
    );

    let mut entries = Vec::new();
    for position in &queue {
        if state.risk_ratio < config.danger_ratio {
            break;
        }
        let entry = liquidate_one(execution, state, position).await;
        entries.push(entry);
    }

    let succeeded = entries.iter().filter(|e| e.success).count();
    let failed = entries.len() - succeeded;
    let audit = LiquidationAudit {
        started_at,
        finished_at: Utc::now(),
        start_risk_ratio,
        end_risk_ratio: state.risk_ratio,
        attempted: entries.len(),
        succeeded,
        failed,
        entries,
    };

    info!(
        attempted = audit.attempted,
        succeeded = audit.succeeded,
        failed = audit.failed,
        end_risk_ratio = audit.end_risk_ratio,
        "liquidation cascade finished"
    );
    audit
}

async fn liquidate_one(
    execution: &dyn ExecutionEngine,
    state: &mut AccountRiskState,
    position: &MarginPosition,
) -> LiquidationEntry {
    let order = OrderRequest {
        symbol: position.symbol.clone(),
        action: OrderAction::Sell,
        quantity: position.quantity,
        price: None,
        kind: OrderKind::Market,
    };

    let (success, message) = match execution.place_order(&order).await {
        Ok(ack) if ack.success => (true, ack.message),
        Ok(ack) => (
            false,
            Some(ack.message.unwrap_or_else(|| "order rejected".to_string())),
        ),
        Err(e) => (false, Some(e.to_string())),
    };

    if success {
        state.release_margin(position);
        info!(
            symbol = position.symbol,
            margin_released = %position.margin_required,
            risk_ratio = state.risk_ratio,
            "position liquidated"
        );
    } else {
        error!(
            symbol = position.symbol,
            message = message.as_deref().unwrap_or(""),
            "liquidation failed, continuing with next position"
        );
    }

    LiquidationEntry {
        symbol: position.symbol.clone(),
        kind: position.kind,
        quantity: position.quantity,
        margin_released: if success {
            position.margin_required
        } else {
            Decimal::ZERO
        },
        success,
        message,
    }
}
