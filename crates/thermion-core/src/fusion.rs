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

//! Decision fusion: one setpoint adjustment from all advisors.

use thermion_types::{
    ActionCategory, ActionPriority, CategoryValues, CombinedAction, ConfidenceMetrics,
    ControllerAction, PriorityWeights,
};
use tracing::debug;

/// Advisor outputs of one cycle; `None` means no contribution
#[derive(Debug, Clone, Copy, Default)]
pub struct AdvisorOutputs<'a> {
    pub comfort: Option<&'a ControllerAction>,
    pub efficiency: Option<&'a ControllerAction>,
    pub cost: Option<&'a ControllerAction>,
    pub thermal: Option<&'a ControllerAction>,
}

impl<'a> AdvisorOutputs<'a> {
    fn get(&self, category: ActionCategory) -> Option<&'a ControllerAction> {
        match category {
            ActionCategory::Comfort => self.comfort,
            ActionCategory::Efficiency => self.efficiency,
            ActionCategory::Cost => self.cost,
            ActionCategory::Thermal => self.thermal,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DecisionFuser {
    weights: PriorityWeights,
}

impl DecisionFuser {
    pub fn new(weights: PriorityWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> PriorityWeights {
        self.weights
    }

    /// Weights arrive validated and normalized
    pub fn set_weights(&mut self, weights: PriorityWeights) {
        self.weights = weights;
    }

    /// Static priorities scaled by per-category confidence and renormalized.
    /// Falls back to the static priorities when nothing is trusted.
    pub fn effective_weights(&self, confidence: &ConfidenceMetrics) -> CategoryValues {
        let base = self.weights.as_values();
        let trust = confidence.category_confidence();
        let mut scaled = CategoryValues::default();
        for category in ActionCategory::ALL {
            scaled.set(category, base.get(category) * trust.get(category));
        }
        scaled.normalized().unwrap_or(base)
    }

    pub fn fuse(
        &self,
        outputs: AdvisorOutputs<'_>,
        confidence: &ConfidenceMetrics,
    ) -> CombinedAction {
        let effective_weights = self.effective_weights(confidence);

        let mut breakdown = CategoryValues::default();
        let mut reasoning = Vec::new();
        let mut priority = ActionPriority::Low;

        for category in ActionCategory::ALL {
            let Some(action) = outputs.get(category) else {
                continue;
            };
            breakdown.set(
                category,
                action.signed_adjustment_c() * effective_weights.get(category),
            );

            if action.is_maintain() {
                continue;
            }
            reasoning.push(action.reason().to_owned());
            if let Some(p) = action.priority() {
                priority = priority.max(p);
            }
        }

        let final_adjustment_c = breakdown.sum();
        debug!(
            "Fused adjustment {:+.3}°C (comfort {:+.3}, efficiency {:+.3}, cost {:+.3}, thermal {:+.3})",
            final_adjustment_c,
            breakdown.comfort,
            breakdown.efficiency,
            breakdown.cost,
            breakdown.thermal
        );

        CombinedAction {
            final_adjustment_c,
            breakdown,
            effective_weights,
            reasoning,
            priority,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use thermion_types::{CostDirection, EfficiencyDirection};

    fn comfort(adjustment_c: f64) -> ControllerAction {
        ControllerAction::Comfort {
            adjustment_c,
            reason: "comfort".to_owned(),
            priority: ActionPriority::Medium,
        }
    }

    fn reduce(magnitude_c: f64) -> ControllerAction {
        ControllerAction::Cost {
            action: CostDirection::Reduce,
            magnitude_c,
            priority: ActionPriority::High,
            reason: "expensive".to_owned(),
        }
    }

    fn maintain_efficiency() -> ControllerAction {
        ControllerAction::Efficiency {
            action: EfficiencyDirection::Maintain,
            magnitude_c: 0.0,
            priority: ActionPriority::Low,
            reason: "fine".to_owned(),
        }
    }

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "{a} != {b}");
    }

    #[test]
    fn test_full_confidence_uses_static_weights() {
        let fuser = DecisionFuser::new(PriorityWeights::new(0.6, 0.25, 0.15, 0.0).unwrap());
        let comfort = comfort(3.0);
        let cost = reduce(1.0);
        let efficiency = maintain_efficiency();

        let combined = fuser.fuse(
            AdvisorOutputs {
                comfort: Some(&comfort),
                efficiency: Some(&efficiency),
                cost: Some(&cost),
                thermal: None,
            },
            &ConfidenceMetrics::full(),
        );

        assert_close(combined.final_adjustment_c, 0.6 * 3.0 - 0.15);
        assert_close(combined.breakdown.cost, -0.15);
        assert_eq!(combined.priority, ActionPriority::High);
        assert_eq!(combined.reasoning, vec!["comfort".to_owned(), "expensive".to_owned()]);
    }

    #[test]
    fn test_zero_confidence_restricts_to_comfort_and_thermal() {
        let fuser = DecisionFuser::new(PriorityWeights::default());
        let weights = fuser.effective_weights(&ConfidenceMetrics::new(0.0, 1.0, false));

        assert_close(weights.comfort, 0.5 / 0.65);
        assert_close(weights.thermal, 0.15 / 0.65);
        assert_eq!(weights.efficiency, 0.0);
        assert_eq!(weights.cost, 0.0);
        assert_close(weights.sum(), 1.0);
    }

    #[test]
    fn test_all_zero_falls_back_to_static() {
        let fuser = DecisionFuser::new(PriorityWeights::new(0.0, 0.5, 0.5, 0.0).unwrap());
        let weights = fuser.effective_weights(&ConfidenceMetrics::new(0.0, 0.0, false));
        assert_eq!(weights, fuser.weights().as_values());
    }

    #[test]
    fn test_empty_inputs() {
        let fuser = DecisionFuser::new(PriorityWeights::default());
        let combined = fuser.fuse(AdvisorOutputs::default(), &ConfidenceMetrics::full());
        assert_eq!(combined.final_adjustment_c, 0.0);
        assert_eq!(combined.priority, ActionPriority::Low);
        assert!(combined.reasoning.is_empty());
    }

    #[test]
    fn test_thermal_has_no_priority() {
        let fuser = DecisionFuser::new(PriorityWeights::default());
        let thermal = ControllerAction::Thermal {
            adjustment_c: 1.0,
            reason: "wind".to_owned(),
        };
        let combined = fuser.fuse(
            AdvisorOutputs {
                thermal: Some(&thermal),
                ..AdvisorOutputs::default()
            },
            &ConfidenceMetrics::full(),
        );
        assert_close(combined.final_adjustment_c, 0.15);
        assert_eq!(combined.priority, ActionPriority::Low);
        assert_eq!(combined.reasoning, vec!["wind".to_owned()]);
    }
}
