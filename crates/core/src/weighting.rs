//! Generic bounded weight normalization.
//!
//! Given raw (id, weight) pairs and per-entry bounds, produces a weight
//! vector that sums to 1.0 with every entry inside the bounds. Clamping an
//! entry at a bound shifts the sum, so the shifted amount is redistributed
//! across the entries that still have room — proportionally to their
//! remaining headroom (or slack), which guarantees no entry is ever pushed
//! across a bound. The same fitting pass also powers incremental
//! performance-based reweighting.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Tolerance on the Σ = 1.0 invariant and the per-entry bound checks.
pub const SUM_TOLERANCE: f64 = 1e-3;

/// Default incremental adjustment rate.
pub const DEFAULT_ADJUST_RATE: f64 = 0.1;

/// Bounds the incremental adjustment rate is clamped into.
pub const ADJUST_RATE_MIN: f64 = 0.05;
pub const ADJUST_RATE_MAX: f64 = 0.2;

const CONVERGENCE_EPS: f64 = 1e-9;

/// Per-entry weight bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightBounds {
    pub min: f64,
    pub max: f64,
}

impl WeightBounds {
    #[must_use]
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Checks that `n` entries can satisfy these bounds:
    /// min·n ≤ 1.0 ≤ max·n.
    ///
    /// # Errors
    /// Returns `EngineError::WeightConstraintViolation` when infeasible.
    pub fn validate_for(&self, n: usize) -> Result<()> {
        if !(0.0..=1.0).contains(&self.min) || self.max < self.min {
            return Err(EngineError::weight_constraint(format!(
                "inconsistent bounds [{}, {}]",
                self.min, self.max
            )));
        }
        let n_f = n as f64;
        if self.min * n_f > 1.0 + SUM_TOLERANCE || self.max * n_f < 1.0 - SUM_TOLERANCE {
            return Err(EngineError::weight_constraint(format!(
                "{n} entries cannot satisfy bounds [{}, {}]",
                self.min, self.max
            )));
        }
        Ok(())
    }
}

/// Strategy id → weight mapping. Recomputed wholesale on every allocation,
/// never patched in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeightVector(BTreeMap<String, f64>);

impl WeightVector {
    #[must_use]
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Equal weighting across the given ids (the orchestrator fallback).
    #[must_use]
    pub fn equal(ids: &[String]) -> Self {
        if ids.is_empty() {
            return Self::new();
        }
        let w = 1.0 / ids.len() as f64;
        Self(ids.iter().map(|id| (id.clone(), w)).collect())
    }

    pub fn set(&mut self, id: impl Into<String>, weight: f64) {
        self.0.insert(id.into(), weight);
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<f64> {
        self.0.get(id).copied()
    }

    #[must_use]
    pub fn sum(&self) -> f64 {
        self.0.values().sum()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, f64)> {
        self.0.iter().map(|(id, w)| (id, *w))
    }
}

/// Normalizes raw weights into a bounded weight vector.
///
/// Steps: normalize to Σ = 1.0, clamp into the bounds, redistribute the
/// clamping drift across entries with remaining room, then validate the
/// Σ = 1.0 ± 1e-3 and per-entry bound invariants.
///
/// # Errors
/// `EngineError::WeightConstraintViolation` if the bounds are infeasible for
/// the entry count or the invariants cannot be restored;
/// `EngineError::InvalidInput` on negative/non-finite raw weights or
/// duplicate ids.
pub fn allocate(pairs: &[(String, f64)], bounds: WeightBounds) -> Result<WeightVector> {
    bounds.validate_for(pairs.len())?;

    let mut seen = HashSet::new();
    for (id, raw) in pairs {
        if !raw.is_finite() || *raw < 0.0 {
            return Err(EngineError::invalid_input(format!(
                "raw weight for '{id}' must be finite and non-negative, got {raw}"
            )));
        }
        if !seen.insert(id.as_str()) {
            return Err(EngineError::invalid_input(format!("duplicate id '{id}'")));
        }
    }

    let raw_sum: f64 = pairs.iter().map(|(_, raw)| raw).sum();
    if raw_sum <= 0.0 {
        return Err(EngineError::weight_constraint(
            "raw weights must sum to a positive value",
        ));
    }

    let mut weights: Vec<f64> = pairs.iter().map(|(_, raw)| raw / raw_sum).collect();
    fit_to_bounds(&mut weights, bounds);
    validate(&weights, bounds)?;

    let mut vector = WeightVector::new();
    for ((id, _), weight) in pairs.iter().zip(weights) {
        vector.set(id.clone(), weight);
    }
    Ok(vector)
}

/// Adjusts current weights by per-id performance scores, then re-fits.
///
/// Scores are clamped into [-1, 1] and the rate into [0.05, 0.2] rather than
/// trusting callers; ids without a score keep their weight. new = w·(1 +
/// rate·score), followed by the same clamp/redistribute/validate pass as
/// [`allocate`].
///
/// # Errors
/// `EngineError::InvalidInput` on non-finite scores;
/// `EngineError::WeightConstraintViolation` if the invariants cannot be
/// restored.
pub fn adjust_incremental(
    current: &WeightVector,
    scores: &std::collections::HashMap<String, f64>,
    rate: f64,
    bounds: WeightBounds,
) -> Result<WeightVector> {
    bounds.validate_for(current.len())?;
    let rate = rate.clamp(ADJUST_RATE_MIN, ADJUST_RATE_MAX);

    let mut ids = Vec::with_capacity(current.len());
    let mut weights = Vec::with_capacity(current.len());
    for (id, weight) in current.iter() {
        let score = match scores.get(id) {
            Some(s) if !s.is_finite() => {
                return Err(EngineError::invalid_input(format!(
                    "performance score for '{id}' must be finite, got {s}"
                )));
            }
            Some(s) => s.clamp(-1.0, 1.0),
            None => 0.0,
        };
        ids.push(id.clone());
        weights.push(weight * (1.0 + rate * score));
    }

    fit_to_bounds(&mut weights, bounds);
    validate(&weights, bounds)?;

    let mut vector = WeightVector::new();
    for (id, weight) in ids.into_iter().zip(weights) {
        vector.set(id, weight);
    }
    Ok(vector)
}

/// Clamps every entry into the bounds, then moves the resulting drift back
/// onto entries with room left. Each pass either restores Σ = 1.0 or pins at
/// least one more entry at a bound, so `n + 1` passes always suffice.
fn fit_to_bounds(weights: &mut [f64], bounds: WeightBounds) {
    for _ in 0..=weights.len() {
        for w in weights.iter_mut() {
            *w = w.clamp(bounds.min, bounds.max);
        }
        let sum: f64 = weights.iter().sum();
        let drift = 1.0 - sum;
        if drift.abs() <= CONVERGENCE_EPS {
            return;
        }
        if drift > 0.0 {
            // Upper clamping removed weight; hand it back proportionally to
            // headroom below max so no entry crosses the upper bound.
            let headroom: f64 = weights.iter().map(|w| bounds.max - w).sum();
            if headroom <= f64::EPSILON {
                break;
            }
            for w in weights.iter_mut() {
                *w += drift * (bounds.max - *w) / headroom;
            }
        } else {
            // Lower pinning added weight; take the surplus back
            // proportionally to slack above min.
            let slack: f64 = weights.iter().map(|w| *w - bounds.min).sum();
            if slack <= f64::EPSILON {
                break;
            }
            for w in weights.iter_mut() {
                *w -= (-drift) * (*w - bounds.min) / slack;
            }
        }
    }

    // Residual drift after the passes: one last renormalization, checked by
    // the caller's validation.
    let sum: f64 = weights.iter().sum();
    if sum > 0.0 && (sum - 1.0).abs() > SUM_TOLERANCE {
        for w in weights.iter_mut() {
            *w /= sum;
        }
    }
}

fn validate(weights: &[f64], bounds: WeightBounds) -> Result<()> {
    let sum: f64 = weights.iter().sum();
    if (sum - 1.0).abs() > SUM_TOLERANCE {
        return Err(EngineError::weight_constraint(format!(
            "weights sum to {sum:.6}, expected 1.0 ± {SUM_TOLERANCE}"
        )));
    }
    for w in weights {
        if *w < bounds.min - SUM_TOLERANCE || *w > bounds.max + SUM_TOLERANCE {
            return Err(EngineError::weight_constraint(format!(
                "weight {w:.6} outside bounds [{}, {}]",
                bounds.min, bounds.max
            )));
        }
    }
    Ok(())
}
