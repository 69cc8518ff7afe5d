use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use capital_engine_core::config::SelectorConfig;
use capital_engine_core::error::Result;
use capital_engine_core::tiering::Tier;
use capital_engine_core::types::{MarketRegime, StrategyCandidate, StrategyType, TierMetrics};
use capital_engine_core::weighting::{self, WeightBounds};

/// A candidate that survived filtering, with its composite and
/// regime-adjusted scores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedStrategy {
    pub id: String,
    pub name: String,
    pub strategy_type: StrategyType,
    pub score: f64,
    pub adjusted_score: f64,
    pub metrics: TierMetrics,
}

/// Final selection entry: a ranked strategy with its portfolio weight and a
/// human-readable reason.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectedStrategy {
    pub id: String,
    pub name: String,
    pub strategy_type: StrategyType,
    pub weight: f64,
    pub score: f64,
    pub metrics: TierMetrics,
    pub reason: String,
}

/// Filters, scores, ranks, and weights strategy candidates for a tier.
pub struct StrategySelector {
    config: SelectorConfig,
}

impl StrategySelector {
    #[must_use]
    pub const fn new(config: SelectorConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &SelectorConfig {
        &self.config
    }

    /// Filters and ranks candidates for the tier, best first, truncated to
    /// the configured top-N. An empty result at any stage is normal.
    #[must_use]
    pub fn rank(
        &self,
        candidates: &[StrategyCandidate],
        tier: Tier,
        regime: Option<MarketRegime>,
    ) -> Vec<RankedStrategy> {
        let mut ranked: Vec<RankedStrategy> = Vec::new();

        for candidate in candidates {
            if !candidate.certified {
                debug!(id = candidate.id, "skipping uncertified candidate");
                continue;
            }
            if !candidate.multi_tier && candidate.best_tier != tier {
                debug!(id = candidate.id, %tier, "candidate not compatible with tier");
                continue;
            }
            let Some(metrics) = candidate.metrics_for(tier) else {
                warn!(id = candidate.id, %tier, "eligible candidate has no metrics for tier, skipping");
                continue;
            };

            let score = composite_score(metrics);
            let adjusted_score = match regime {
                Some(regime) => score * self.regime_multiplier(regime, candidate.strategy_type),
                None => score,
            };
            ranked.push(RankedStrategy {
                id: candidate.id.clone(),
                name: candidate.name.clone(),
                strategy_type: candidate.strategy_type,
                score,
                adjusted_score,
                metrics: *metrics,
            });
        }

        ranked.sort_by(|a, b| {
            b.adjusted_score
                .partial_cmp(&a.adjusted_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        ranked.truncate(self.config.top_n);

        info!(
            %tier,
            eligible = ranked.len(),
            total = candidates.len(),
            "strategy ranking complete"
        );
        ranked
    }

    /// Assigns bounded weights proportional to adjusted score² and wraps
    /// each entry with its metrics and reason.
    ///
    /// # Errors
    /// Returns `EngineError::WeightConstraintViolation` when the configured
    /// bounds cannot be satisfied for the ranked set; callers are expected
    /// to fall back to equal weighting.
    pub fn weigh(&self, ranked: &[RankedStrategy]) -> Result<Vec<SelectedStrategy>> {
        if ranked.is_empty() {
            return Ok(Vec::new());
        }

        let bounds = WeightBounds::new(self.config.min_weight, self.config.max_weight);
        let pairs: Vec<(String, f64)> = ranked
            .iter()
            .map(|r| (r.id.clone(), r.adjusted_score * r.adjusted_score))
            .collect();
        let weights = weighting::allocate(&pairs, bounds)?;

        Ok(ranked
            .iter()
            .enumerate()
            .map(|(position, r)| {
                let weight = weights.get(&r.id).unwrap_or(0.0);
                SelectedStrategy {
                    id: r.id.clone(),
                    name: r.name.clone(),
                    strategy_type: r.strategy_type,
                    weight,
                    score: r.adjusted_score,
                    metrics: r.metrics,
                    reason: format!(
                        "rank {} of {}: sharpe {:.2}, annual return {:.1}%, max drawdown {:.1}%, win rate {:.0}% -> weight {:.1}%",
                        position + 1,
                        ranked.len(),
                        r.metrics.sharpe,
                        r.metrics.annual_return * 100.0,
                        r.metrics.max_drawdown * 100.0,
                        r.metrics.win_rate * 100.0,
                        weight * 100.0,
                    ),
                }
            })
            .collect())
    }

    /// Full selection pipeline: rank then weigh.
    ///
    /// # Errors
    /// Propagates weighting failures; zero eligible candidates is `Ok` with
    /// an empty vector, not an error.
    pub fn select(
        &self,
        candidates: &[StrategyCandidate],
        tier: Tier,
        regime: Option<MarketRegime>,
    ) -> Result<Vec<SelectedStrategy>> {
        let ranked = self.rank(candidates, tier, regime);
        self.weigh(&ranked)
    }

    fn regime_multiplier(&self, regime: MarketRegime, strategy_type: StrategyType) -> f64 {
        self.config
            .regime_boosts
            .iter()
            .find(|b| b.regime == regime && b.strategy_type == strategy_type)
            .map_or(1.0, |b| b.multiplier)
    }
}

/// Composite performance score in [0, 1]:
/// 0.40·sharpe + 0.30·return + 0.20·drawdown + 0.10·win rate, each metric
/// normalized into [0, 1] first. Drawdown is a negative fraction, so
/// `1 + dd/0.3` maps 0 → 1.0 and -30% → 0.0.
#[must_use]
pub fn composite_score(metrics: &TierMetrics) -> f64 {
    let sharpe = (metrics.sharpe / 3.0).clamp(0.0, 1.0);
    let annual_return = (metrics.annual_return / 0.5).clamp(0.0, 1.0);
    let drawdown = (1.0 + metrics.max_drawdown / 0.3).clamp(0.0, 1.0);
    0.40 * sharpe + 0.30 * annual_return + 0.20 * drawdown + 0.10 * metrics.win_rate
}

#[cfg(test)]
mod tests {
    use super::*;
    use capital_engine_core::weighting::SUM_TOLERANCE;
    use std::collections::HashMap;

    fn metrics(sharpe: f64, annual_return: f64, max_drawdown: f64, win_rate: f64) -> TierMetrics {
        TierMetrics {
            sharpe,
            annual_return,
            max_drawdown,
            win_rate,
        }
    }

    fn candidate(
        id: &str,
        strategy_type: StrategyType,
        tier: Tier,
        m: TierMetrics,
    ) -> StrategyCandidate {
        let mut tier_metrics = HashMap::new();
        tier_metrics.insert(tier, m);
        StrategyCandidate {
            id: id.to_string(),
            name: id.to_uppercase(),
            certified: true,
            strategy_type,
            multi_tier: false,
            best_tier: tier,
            tier_metrics,
        }
    }

    fn selector() -> StrategySelector {
        StrategySelector::new(SelectorConfig::default())
    }

    #[test]
    fn uncertified_candidates_are_filtered() {
        let mut c = candidate(
            "momo",
            StrategyType::Momentum,
            Tier::Small,
            metrics(2.0, 0.3, -0.1, 0.6),
        );
        c.certified = false;
        assert!(selector().rank(&[c], Tier::Small, None).is_empty());
    }

    #[test]
    fn tier_incompatible_candidates_are_filtered() {
        let c = candidate(
            "momo",
            StrategyType::Momentum,
            Tier::Large,
            metrics(2.0, 0.3, -0.1, 0.6),
        );
        assert!(selector().rank(&[c], Tier::Small, None).is_empty());
    }

    #[test]
    fn multi_tier_candidate_passes_with_metrics_for_tier() {
        let mut c = candidate(
            "momo",
            StrategyType::Momentum,
            Tier::Small,
            metrics(2.0, 0.3, -0.1, 0.6),
        );
        c.multi_tier = true;
        c.best_tier = Tier::Large;
        assert_eq!(selector().rank(&[c], Tier::Small, None).len(), 1);
    }

    #[test]
    fn missing_tier_metrics_skips_with_warning_not_error() {
        let mut c = candidate(
            "momo",
            StrategyType::Momentum,
            Tier::Large,
            metrics(2.0, 0.3, -0.1, 0.6),
        );
        // Eligible by flags for Small, but only has Large metrics.
        c.multi_tier = true;
        assert!(selector().rank(&[c], Tier::Small, None).is_empty());
    }

    #[test]
    fn ranking_orders_by_score_and_truncates_to_top_n() {
        let tier = Tier::Medium;
        let mut candidates = Vec::new();
        for i in 0..7 {
            let sharpe = 0.5 + 0.3 * f64::from(i);
            candidates.push(candidate(
                &format!("s{i}"),
                StrategyType::Momentum,
                tier,
                metrics(sharpe, 0.2, -0.1, 0.5),
            ));
        }

        let ranked = selector().rank(&candidates, tier, None);
        assert_eq!(ranked.len(), 5);
        // Highest sharpe first.
        assert_eq!(ranked[0].id, "s6");
        assert!(ranked.windows(2).all(|w| w[0].adjusted_score >= w[1].adjusted_score));
    }

    #[test]
    fn regime_boost_reorders_close_scores() {
        let tier = Tier::Medium;
        let momo = candidate(
            "momo",
            StrategyType::Momentum,
            tier,
            metrics(1.5, 0.25, -0.1, 0.55),
        );
        let revert = candidate(
            "revert",
            StrategyType::MeanReversion,
            tier,
            metrics(1.6, 0.25, -0.1, 0.55),
        );

        let no_regime = selector().rank(&[momo.clone(), revert.clone()], tier, None);
        assert_eq!(no_regime[0].id, "revert");

        // Bull boosts momentum 1.2x, overtaking the slightly better sharpe.
        let bull = selector().rank(&[momo, revert], tier, Some(MarketRegime::Bull));
        assert_eq!(bull[0].id, "momo");
    }

    #[test]
    fn selection_weights_satisfy_bounds_and_sum() {
        let tier = Tier::Medium;
        let candidates = vec![
            candidate("a", StrategyType::Momentum, tier, metrics(3.0, 0.5, 0.0, 0.9)),
            candidate("b", StrategyType::MeanReversion, tier, metrics(1.5, 0.25, -0.15, 0.5)),
            candidate("c", StrategyType::Arbitrage, tier, metrics(0.3, 0.05, -0.28, 0.1)),
        ];

        let selected = selector().select(&candidates, tier, None).unwrap();
        assert_eq!(selected.len(), 3);

        let sum: f64 = selected.iter().map(|s| s.weight).sum();
        assert!((sum - 1.0).abs() <= SUM_TOLERANCE, "sum = {sum}");
        for s in &selected {
            assert!(s.weight >= 0.05 - SUM_TOLERANCE && s.weight <= 0.40 + SUM_TOLERANCE);
            assert!(s.reason.contains("sharpe"));
        }
        // Strongest candidate carries the most weight.
        assert!(selected[0].weight >= selected[1].weight);
        assert!(selected[1].weight >= selected[2].weight);
    }

    #[test]
    fn empty_universe_selects_nothing() {
        let selected = selector().select(&[], Tier::Small, None).unwrap();
        assert!(selected.is_empty());
    }

    #[test]
    fn infeasible_bounds_surface_for_caller_fallback() {
        // Two entries cannot reach a 1.0 sum with max weight 0.40.
        let tier = Tier::Small;
        let candidates = vec![
            candidate("a", StrategyType::Momentum, tier, metrics(2.0, 0.3, -0.1, 0.6)),
            candidate("b", StrategyType::Arbitrage, tier, metrics(1.0, 0.2, -0.1, 0.5)),
        ];
        assert!(selector().select(&candidates, tier, None).is_err());
    }

    #[test]
    fn composite_score_normalizes_each_component() {
        // All components at their caps score 1.0.
        let perfect = metrics(3.0, 0.5, 0.0, 1.0);
        assert!((composite_score(&perfect) - 1.0).abs() < 1e-9);

        // A 30% drawdown zeroes the drawdown component.
        let deep = metrics(3.0, 0.5, -0.30, 1.0);
        assert!((composite_score(&deep) - 0.8).abs() < 1e-9);

        // Sharpe above the normalization cap does not overweight.
        let capped = composite_score(&metrics(9.0, 0.1, -0.1, 0.5));
        let at_cap = composite_score(&metrics(3.0, 0.1, -0.1, 0.5));
        assert!((capped - at_cap).abs() < 1e-9);
    }
}
