//! AUM polling with last-known-good caching and tier-change notification.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::{watch, RwLock};
use tracing::{error, info, warn};

use capital_engine_core::config::{TieringConfig, TrackerConfig};
use capital_engine_core::error::{EngineError, Result};
use capital_engine_core::events::{TierChangeCallback, TierChangeEvent};
use capital_engine_core::tiering::{classify, Tier};
use capital_engine_core::traits::CapitalDataProvider;
use capital_engine_core::types::CapitalSnapshot;

/// Polls the capital data provider, caches the last good snapshot, and
/// notifies subscribers when the classified tier changes.
pub struct AumTracker {
    provider: Arc<dyn CapitalDataProvider>,
    tiering: TieringConfig,
    config: TrackerConfig,
    snapshot: RwLock<Option<CapitalSnapshot>>,
    monitoring: AtomicBool,
    subscribers: RwLock<Vec<TierChangeCallback>>,
}

impl AumTracker {
    #[must_use]
    pub fn new(
        provider: Arc<dyn CapitalDataProvider>,
        tiering: TieringConfig,
        config: TrackerConfig,
    ) -> Self {
        Self {
            provider,
            tiering,
            config,
            snapshot: RwLock::new(None),
            monitoring: AtomicBool::new(false),
            subscribers: RwLock::new(Vec::new()),
        }
    }

    /// Registers a tier-change subscriber.
    pub async fn subscribe(&self, callback: TierChangeCallback) {
        self.subscribers.write().await.push(callback);
    }

    /// True while the monitor loop is running.
    #[must_use]
    pub fn is_monitoring(&self) -> bool {
        self.monitoring.load(Ordering::SeqCst)
    }

    /// The last good snapshot, if any poll has succeeded.
    pub async fn snapshot(&self) -> Option<CapitalSnapshot> {
        self.snapshot.read().await.clone()
    }

    /// Current AUM: a fresh fetch when the provider answers, otherwise the
    /// cached value.
    ///
    /// # Errors
    /// Returns `EngineError::ServiceUnavailable` if the fetch fails and no
    /// cached value exists.
    pub async fn get_current(&self) -> Result<Decimal> {
        match self.refresh().await {
            Ok(aum) => Ok(aum),
            Err(e) => {
                let cached = self.snapshot.read().await.clone();
                match cached {
                    Some(snapshot) => {
                        warn!(error = %e, aum = %snapshot.aum, "AUM fetch failed, serving cached value");
                        Ok(snapshot.aum)
                    }
                    None => Err(EngineError::service_unavailable(format!(
                        "AUM fetch failed with no cached value: {e}"
                    ))),
                }
            }
        }
    }

    /// Fetches from the provider and replaces the cached snapshot.
    async fn refresh(&self) -> Result<Decimal> {
        let aum = self.provider.current_aum().await?;
        let mut snapshot = self.snapshot.write().await;
        *snapshot = Some(CapitalSnapshot {
            aum,
            timestamp: Utc::now(),
        });
        Ok(aum)
    }

    /// Poll loop. Runs until the shutdown channel signals (or its sender
    /// drops); transient fetch errors are logged and the loop continues.
    /// The monitoring flag is cleared on every exit path.
    pub async fn monitor(&self, mut shutdown: watch::Receiver<bool>) {
        self.monitoring.store(true, Ordering::SeqCst);
        info!(
            interval_secs = self.config.poll_interval_secs,
            change_threshold = self.config.change_threshold,
            "AUM monitor started"
        );

        let mut interval =
            tokio::time::interval(Duration::from_secs(self.config.poll_interval_secs));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        // Baseline of the last tier evaluation, so small drifts accumulate
        // across cycles instead of resetting every poll.
        let mut reference_aum: Option<Decimal> = None;
        let mut last_tier: Option<Tier> = None;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let aum = match self.refresh().await {
                        Ok(aum) => aum,
                        Err(e) => {
                            error!(error = %e, "AUM fetch failed, retrying next cycle");
                            continue;
                        }
                    };

                    let Some(reference) = reference_aum else {
                        reference_aum = Some(aum);
                        last_tier = classify(aum, &self.tiering).ok();
                        continue;
                    };

                    if !Self::exceeds_threshold(reference, aum, self.config.change_threshold) {
                        continue;
                    }
                    reference_aum = Some(aum);

                    let tier = match classify(aum, &self.tiering) {
                        Ok(tier) => tier,
                        Err(e) => {
                            warn!(error = %e, %aum, "tier classification failed");
                            continue;
                        }
                    };
                    if last_tier != Some(tier) {
                        let event = TierChangeEvent {
                            old_tier: last_tier,
                            new_tier: tier,
                            aum,
                            timestamp: Utc::now(),
                        };
                        info!(old_tier = ?event.old_tier, new_tier = %tier, %aum, "capital tier changed");
                        self.notify(&event).await;
                        last_tier = Some(tier);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        self.monitoring.store(false, Ordering::SeqCst);
        info!("AUM monitor stopped");
    }

    /// Invokes every subscriber; one failure never blocks the rest.
    async fn notify(&self, event: &TierChangeEvent) {
        let subscribers = self.subscribers.read().await.clone();
        for (index, callback) in subscribers.iter().enumerate() {
            if let Err(e) = callback(event) {
                warn!(subscriber = index, error = %e, "tier-change subscriber failed");
            }
        }
    }

    fn exceeds_threshold(reference: Decimal, current: Decimal, threshold: f64) -> bool {
        if reference == Decimal::ZERO {
            return current != Decimal::ZERO;
        }
        let relative: f64 = ((current - reference) / reference)
            .abs()
            .try_into()
            .unwrap_or(f64::MAX);
        relative >= threshold
    }
}

#[async_trait]
impl CapitalDataProvider for AumTracker {
    /// Delegates to [`AumTracker::get_current`], so downstream consumers get
    /// the cache fallback for free.
    async fn current_aum(&self) -> Result<Decimal> {
        self.get_current().await
    }
}
