//! Reallocation orchestrator.
//!
//! Composes the capital data provider, tier classification, strategy
//! selection, and bounded weighting into one pipeline, and owns the bounded
//! decision history. All mutation serializes through a single mutex so
//! concurrent calls preserve FIFO eviction and event ordering.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, warn};

use capital_engine_core::config::{AllocatorConfig, TieringConfig};
use capital_engine_core::error::{EngineError, Result};
use capital_engine_core::events::{TierChangeCallback, TierChangeEvent};
use capital_engine_core::history::HistoryStore;
use capital_engine_core::tiering::{classify, Tier};
use capital_engine_core::traits::CapitalDataProvider;
use capital_engine_core::types::{DecisionRecord, MarketRegime, StrategyCandidate};
use capital_engine_core::weighting::{self, WeightBounds, WeightVector};
use capital_engine_strategy_selector::{RankedStrategy, SelectedStrategy, StrategySelector};

/// Result of one reallocation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationOutcome {
    pub tier: Tier,
    pub strategies: Vec<SelectedStrategy>,
    pub weights: WeightVector,
    pub timestamp: DateTime<Utc>,
}

struct AllocatorState {
    current_tier: Option<Tier>,
    history: HistoryStore<DecisionRecord>,
}

/// Orchestrates the fetch → classify → select → weight → record pipeline.
pub struct CapitalAllocator {
    capital: Arc<dyn CapitalDataProvider>,
    selector: StrategySelector,
    tiering: TieringConfig,
    config: AllocatorConfig,
    candidates: RwLock<Vec<StrategyCandidate>>,
    regime: RwLock<Option<MarketRegime>>,
    state: Mutex<AllocatorState>,
    callbacks: RwLock<Vec<TierChangeCallback>>,
}

impl CapitalAllocator {
    #[must_use]
    pub fn new(
        capital: Arc<dyn CapitalDataProvider>,
        selector: StrategySelector,
        tiering: TieringConfig,
        config: AllocatorConfig,
    ) -> Self {
        let history = match &config.history_path {
            Some(path) => HistoryStore::with_file(config.history_cap, path.clone()),
            None => HistoryStore::new(config.history_cap),
        };
        Self {
            capital,
            selector,
            tiering,
            config,
            candidates: RwLock::new(Vec::new()),
            regime: RwLock::new(None),
            state: Mutex::new(AllocatorState {
                current_tier: None,
                history,
            }),
            callbacks: RwLock::new(Vec::new()),
        }
    }

    /// Replaces the candidate universe (fed by the mining pipeline).
    pub async fn update_candidates(&self, candidates: Vec<StrategyCandidate>) {
        *self.candidates.write().await = candidates;
    }

    /// Sets the market regime used for score adjustment.
    pub async fn set_regime(&self, regime: Option<MarketRegime>) {
        *self.regime.write().await = regime;
    }

    /// Registers a tier-change listener. Notification is best effort.
    pub async fn register_tier_change_callback(&self, callback: TierChangeCallback) {
        self.callbacks.write().await.push(callback);
    }

    pub async fn current_tier(&self) -> Option<Tier> {
        self.state.lock().await.current_tier
    }

    /// Snapshot of the bounded decision history, oldest first.
    pub async fn decision_history(&self) -> Vec<DecisionRecord> {
        self.state.lock().await.history.entries()
    }

    /// Re-classifies the tier for the given AUM. On a change, appends a
    /// decision record and notifies listeners; notification failures are
    /// logged, never fatal.
    ///
    /// # Errors
    /// Returns `EngineError::InvalidInput` for negative AUM.
    pub async fn reevaluate_tier(&self, aum: Decimal) -> Result<Tier> {
        let tier = classify(aum, &self.tiering)?;

        let mut state = self.state.lock().await;
        if state.current_tier != Some(tier) {
            let event = TierChangeEvent {
                old_tier: state.current_tier,
                new_tier: tier,
                aum,
                timestamp: Utc::now(),
            };
            state.current_tier = Some(tier);
            state.history.push(DecisionRecord {
                tier,
                aum,
                strategy_ids: Vec::new(),
                weights: WeightVector::new(),
                timestamp: event.timestamp,
            });
            info!(old_tier = ?event.old_tier, new_tier = %tier, %aum, "tier re-evaluated");
            self.notify_tier_change(&event).await;
        }
        Ok(tier)
    }

    /// Runs the full reallocation pipeline.
    ///
    /// Zero eligible strategies yields an outcome with empty weights. A
    /// weighting failure falls back to equal weighting across the selected
    /// strategies instead of propagating.
    ///
    /// # Errors
    /// Only unrecoverable conditions surface: an AUM fetch with no cached
    /// value, or invalid AUM.
    pub async fn reallocate(&self) -> Result<AllocationOutcome> {
        let aum = self.capital.current_aum().await?;
        let tier = classify(aum, &self.tiering)?;

        let candidates = self.candidates.read().await.clone();
        let regime = *self.regime.read().await;
        let ranked = self.selector.rank(&candidates, tier, regime);

        let strategies = if ranked.is_empty() {
            info!(%tier, %aum, "no eligible strategies, returning empty allocation");
            Vec::new()
        } else {
            match self.selector.weigh(&ranked) {
                Ok(selected) => selected,
                Err(e) => {
                    warn!(error = %e, count = ranked.len(), "bounded weighting failed, using equal weights");
                    equal_weight_fallback(&ranked)
                }
            }
        };

        let mut weights = WeightVector::new();
        for s in &strategies {
            weights.set(s.id.clone(), s.weight);
        }
        let timestamp = Utc::now();

        let mut state = self.state.lock().await;
        let old_tier = state.current_tier;
        state.current_tier = Some(tier);
        state.history.push(DecisionRecord {
            tier,
            aum,
            strategy_ids: strategies.iter().map(|s| s.id.clone()).collect(),
            weights: weights.clone(),
            timestamp,
        });
        if old_tier != Some(tier) {
            let event = TierChangeEvent {
                old_tier,
                new_tier: tier,
                aum,
                timestamp,
            };
            self.notify_tier_change(&event).await;
        }
        drop(state);

        info!(%tier, strategies = strategies.len(), "reallocation complete");
        Ok(AllocationOutcome {
            tier,
            strategies,
            weights,
            timestamp,
        })
    }

    /// Incrementally reweights the latest decision by per-strategy
    /// performance scores and records the adjusted vector as a new decision.
    ///
    /// # Errors
    /// `EngineError::InvalidInput` when there is no prior decision or a
    /// score is non-finite; `EngineError::WeightConstraintViolation` when
    /// the adjusted weights cannot satisfy the bounds.
    pub async fn adjust_weights(&self, scores: &HashMap<String, f64>) -> Result<WeightVector> {
        let mut state = self.state.lock().await;
        let Some(last) = state.history.last() else {
            return Err(EngineError::invalid_input(
                "no prior allocation decision to adjust",
            ));
        };
        if last.weights.is_empty() {
            return Err(EngineError::invalid_input(
                "latest decision holds no weights to adjust",
            ));
        }

        let bounds = WeightBounds::new(
            self.selector.config().min_weight,
            self.selector.config().max_weight,
        );
        let adjusted =
            weighting::adjust_incremental(&last.weights, scores, self.config.adjust_rate, bounds)?;

        let record = DecisionRecord {
            tier: last.tier,
            aum: last.aum,
            strategy_ids: adjusted.iter().map(|(id, _)| id.clone()).collect(),
            weights: adjusted.clone(),
            timestamp: Utc::now(),
        };
        state.history.push(record);
        Ok(adjusted)
    }

    /// Invokes every registered callback; failures are logged and contained.
    async fn notify_tier_change(&self, event: &TierChangeEvent) {
        let callbacks = self.callbacks.read().await.clone();
        for (index, callback) in callbacks.iter().enumerate() {
            if let Err(e) = callback(event) {
                error!(listener = index, error = %e, "tier-change notification failed");
            }
        }
    }
}

/// Equal weighting across the ranked strategies, used when bounded
/// weighting cannot be satisfied.
fn equal_weight_fallback(ranked: &[RankedStrategy]) -> Vec<SelectedStrategy> {
    let weight = 1.0 / ranked.len() as f64;
    ranked
        .iter()
        .map(|r| SelectedStrategy {
            id: r.id.clone(),
            name: r.name.clone(),
            strategy_type: r.strategy_type,
            weight,
            score: r.adjusted_score,
            metrics: r.metrics,
            reason: format!(
                "equal weight fallback across {} strategies (bounded weighting infeasible)",
                ranked.len()
            ),
        })
        .collect()
}
