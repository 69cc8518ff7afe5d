//! Periodic risk monitoring loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info};

use crate::monitor::MarginRiskMonitor;

/// Runs the risk poller until the shutdown channel signals (or its sender
/// drops). Every per-tick failure is logged and contained, so this poller
/// never takes down its sibling tasks. The monitoring flag is cleared on
/// every exit path.
pub async fn run(monitor: Arc<MarginRiskMonitor>, mut shutdown: watch::Receiver<bool>) {
    monitor.set_monitoring(true);
    info!(
        interval_secs = monitor.config().poll_interval_secs,
        "margin risk monitor started"
    );

    let mut interval =
        tokio::time::interval(Duration::from_secs(monitor.config().poll_interval_secs));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                match monitor.check(None).await {
                    Ok(report) => {
                        tracing::debug!(
                            risk_ratio = report.risk_ratio,
                            level = %report.risk_level,
                            positions = report.positions_count,
                            "risk check complete"
                        );
                    }
                    Err(e) => {
                        error!(error = %e, "risk check failed, retrying next cycle");
                    }
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    monitor.set_monitoring(false);
    info!("margin risk monitor stopped");
}
