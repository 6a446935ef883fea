// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of ThermION.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

//! Priority weights and per-cycle confidence.
//!
//! Weights are renormalized when they are set, never when they are read.
//! Confidence only shapes the *effective* weights computed by the fuser.

use crate::action::CategoryValues;
use crate::error::ValidationError;
use serde::{Deserialize, Serialize};

/// Static priority of each decision category, always summing to 1.0
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawPriorityWeights")]
pub struct PriorityWeights {
    comfort: f64,
    efficiency: f64,
    cost: f64,
    thermal: f64,
}

/// Unnormalized weights as written in configuration or sent by the UI
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawPriorityWeights {
    pub comfort: f64,
    pub efficiency: f64,
    pub cost: f64,
    pub thermal: f64,
}

impl PriorityWeights {
    /// Validate and renormalize raw weights.
    ///
    /// Fails on negative or non-finite values and when every weight is zero.
    pub fn new(
        comfort: f64,
        efficiency: f64,
        cost: f64,
        thermal: f64,
    ) -> Result<Self, ValidationError> {
        for (field, value) in [
            ("priorities.comfort", comfort),
            ("priorities.efficiency", efficiency),
            ("priorities.cost", cost),
            ("priorities.thermal", thermal),
        ] {
            if !value.is_finite() {
                return Err(ValidationError::NotFinite { field, value });
            }
            if value < 0.0 {
                return Err(ValidationError::Negative { field, value });
            }
        }

        let normalized = CategoryValues::new(comfort, efficiency, cost, thermal)
            .normalized()
            .ok_or(ValidationError::AllWeightsZero)?;

        Ok(Self {
            comfort: normalized.comfort,
            efficiency: normalized.efficiency,
            cost: normalized.cost,
            thermal: normalized.thermal,
        })
    }

    pub fn comfort(&self) -> f64 {
        self.comfort
    }

    pub fn efficiency(&self) -> f64 {
        self.efficiency
    }

    pub fn cost(&self) -> f64 {
        self.cost
    }

    pub fn thermal(&self) -> f64 {
        self.thermal
    }

    pub fn as_values(&self) -> CategoryValues {
        CategoryValues::new(self.comfort, self.efficiency, self.cost, self.thermal)
    }
}

impl Default for PriorityWeights {
    fn default() -> Self {
        Self {
            comfort: 0.5,
            efficiency: 0.2,
            cost: 0.15,
            thermal: 0.15,
        }
    }
}

impl TryFrom<RawPriorityWeights> for PriorityWeights {
    type Error = ValidationError;

    fn try_from(raw: RawPriorityWeights) -> Result<Self, Self::Error> {
        Self::new(raw.comfort, raw.efficiency, raw.cost, raw.thermal)
    }
}

impl From<PriorityWeights> for RawPriorityWeights {
    fn from(weights: PriorityWeights) -> Self {
        Self {
            comfort: weights.comfort,
            efficiency: weights.efficiency,
            cost: weights.cost,
            thermal: weights.thermal,
        }
    }
}

/// Per-cycle trust in each input source
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceMetrics {
    /// Confidence in COP learning, [0, 1]
    pub cop_learning: f64,

    /// Confidence in the building thermal model, [0, 1]
    pub building_model: f64,

    /// Whether a price exists for the current hour
    pub price_data_available: bool,
}

impl ConfidenceMetrics {
    /// Build metrics with both scalars clamped to [0, 1]; NaN counts as 0
    pub fn new(cop_learning: f64, building_model: f64, price_data_available: bool) -> Self {
        Self {
            cop_learning: clamp_unit(cop_learning),
            building_model: clamp_unit(building_model),
            price_data_available,
        }
    }

    /// Full trust in every source
    pub fn full() -> Self {
        Self::new(1.0, 1.0, true)
    }

    /// Confidence multiplier per category.
    ///
    /// Comfort is always 1.0, thermal follows the building model,
    /// efficiency the COP learning and cost the price availability flag.
    pub fn category_confidence(&self) -> CategoryValues {
        CategoryValues::new(
            1.0,
            self.cop_learning,
            if self.price_data_available { 1.0 } else { 0.0 },
            self.building_model,
        )
    }
}

impl Default for ConfidenceMetrics {
    fn default() -> Self {
        Self::full()
    }
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weights_renormalized_on_set() {
        let inputs = [
            (1.0, 1.0, 1.0, 1.0),
            (60.0, 25.0, 15.0, 0.0),
            (0.0, 0.0, 0.0, 3.0),
            (0.001, 7.0, 0.3, 12.5),
        ];

        for (c, e, k, t) in inputs {
            let weights = PriorityWeights::new(c, e, k, t).unwrap();
            let sum = weights.comfort() + weights.efficiency() + weights.cost() + weights.thermal();
            assert!((sum - 1.0).abs() < 1e-9, "sum was {sum} for {:?}", (c, e, k, t));
        }
    }

    #[test]
    fn test_weights_reject_negative_and_zero() {
        assert!(matches!(
            PriorityWeights::new(0.5, -0.1, 0.3, 0.3),
            Err(ValidationError::Negative { .. })
        ));
        assert_eq!(
            PriorityWeights::new(0.0, 0.0, 0.0, 0.0),
            Err(ValidationError::AllWeightsZero)
        );
        assert!(PriorityWeights::new(f64::INFINITY, 0.0, 0.0, 0.0).is_err());
    }

    #[test]
    fn test_weights_deserialize_normalizes() {
        let weights: PriorityWeights = serde_json::from_str(
            r#"{"comfort": 6.0, "efficiency": 2.5, "cost": 1.5, "thermal": 0.0}"#,
        )
        .unwrap();
        assert!((weights.comfort() - 0.6).abs() < 1e-12);
        assert!((weights.efficiency() - 0.25).abs() < 1e-12);

        let invalid = serde_json::from_str::<PriorityWeights>(
            r#"{"comfort": -1.0, "efficiency": 2.5, "cost": 1.5, "thermal": 0.0}"#,
        );
        assert!(invalid.is_err());
    }

    #[test]
    fn test_default_weights_sum_to_one() {
        assert!((PriorityWeights::default().as_values().sum() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_confidence_clamped() {
        let metrics = ConfidenceMetrics::new(1.4, f64::NAN, false);
        assert_eq!(metrics.cop_learning, 1.0);
        assert_eq!(metrics.building_model, 0.0);
        assert_eq!(metrics.category_confidence().cost, 0.0);
        assert_eq!(metrics.category_confidence().comfort, 1.0);
    }
}
