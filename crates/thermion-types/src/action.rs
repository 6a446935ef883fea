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

//! Advisor outputs and the fused decision.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Urgency of an advisor recommendation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionPriority {
    #[default]
    Low,
    Medium,
    High,
}

impl fmt::Display for ActionPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        };
        f.write_str(name)
    }
}

/// Direction requested by the efficiency advisor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EfficiencyDirection {
    Increase,
    Decrease,
    Maintain,
}

/// Direction requested by the price advisor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CostDirection {
    Preheat,
    Reduce,
    Maintain,
}

/// Decision category, one per advisor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionCategory {
    Comfort,
    Efficiency,
    Cost,
    Thermal,
}

impl ActionCategory {
    /// Fusion order; comfort first
    pub const ALL: [ActionCategory; 4] = [
        ActionCategory::Comfort,
        ActionCategory::Efficiency,
        ActionCategory::Cost,
        ActionCategory::Thermal,
    ];
}

/// One advisor's recommendation for this cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ControllerAction {
    Comfort {
        adjustment_c: f64,
        reason: String,
        priority: ActionPriority,
    },
    Efficiency {
        action: EfficiencyDirection,
        magnitude_c: f64,
        priority: ActionPriority,
        reason: String,
    },
    Cost {
        action: CostDirection,
        magnitude_c: f64,
        priority: ActionPriority,
        reason: String,
    },
    Thermal {
        adjustment_c: f64,
        reason: String,
    },
}

impl ControllerAction {
    pub fn category(&self) -> ActionCategory {
        match self {
            Self::Comfort { .. } => ActionCategory::Comfort,
            Self::Efficiency { .. } => ActionCategory::Efficiency,
            Self::Cost { .. } => ActionCategory::Cost,
            Self::Thermal { .. } => ActionCategory::Thermal,
        }
    }

    /// Signed setpoint adjustment in °C.
    ///
    /// Maintain is zero, decrease/reduce is negative, increase/preheat positive.
    pub fn signed_adjustment_c(&self) -> f64 {
        match self {
            Self::Comfort { adjustment_c, .. } | Self::Thermal { adjustment_c, .. } => {
                *adjustment_c
            }
            Self::Efficiency {
                action,
                magnitude_c,
                ..
            } => match action {
                EfficiencyDirection::Increase => magnitude_c.abs(),
                EfficiencyDirection::Decrease => -magnitude_c.abs(),
                EfficiencyDirection::Maintain => 0.0,
            },
            Self::Cost {
                action,
                magnitude_c,
                ..
            } => match action {
                CostDirection::Preheat => magnitude_c.abs(),
                CostDirection::Reduce => -magnitude_c.abs(),
                CostDirection::Maintain => 0.0,
            },
        }
    }

    pub fn is_maintain(&self) -> bool {
        match self {
            Self::Efficiency { action, .. } => *action == EfficiencyDirection::Maintain,
            Self::Cost { action, .. } => *action == CostDirection::Maintain,
            Self::Comfort { .. } | Self::Thermal { .. } => false,
        }
    }

    /// Priority of the action; thermal actions carry none
    pub fn priority(&self) -> Option<ActionPriority> {
        match self {
            Self::Comfort { priority, .. }
            | Self::Efficiency { priority, .. }
            | Self::Cost { priority, .. } => Some(*priority),
            Self::Thermal { .. } => None,
        }
    }

    pub fn reason(&self) -> &str {
        match self {
            Self::Comfort { reason, .. }
            | Self::Efficiency { reason, .. }
            | Self::Cost { reason, .. }
            | Self::Thermal { reason, .. } => reason,
        }
    }
}

/// One float per decision category
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CategoryValues {
    pub comfort: f64,
    pub efficiency: f64,
    pub cost: f64,
    pub thermal: f64,
}

impl CategoryValues {
    pub fn new(comfort: f64, efficiency: f64, cost: f64, thermal: f64) -> Self {
        Self {
            comfort,
            efficiency,
            cost,
            thermal,
        }
    }

    pub fn get(&self, category: ActionCategory) -> f64 {
        match category {
            ActionCategory::Comfort => self.comfort,
            ActionCategory::Efficiency => self.efficiency,
            ActionCategory::Cost => self.cost,
            ActionCategory::Thermal => self.thermal,
        }
    }

    pub fn set(&mut self, category: ActionCategory, value: f64) {
        match category {
            ActionCategory::Comfort => self.comfort = value,
            ActionCategory::Efficiency => self.efficiency = value,
            ActionCategory::Cost => self.cost = value,
            ActionCategory::Thermal => self.thermal = value,
        }
    }

    pub fn sum(&self) -> f64 {
        self.comfort + self.efficiency + self.cost + self.thermal
    }

    /// Scale so the values sum to 1.0; `None` when the sum is not positive
    pub fn normalized(&self) -> Option<Self> {
        let total = self.sum();
        if !total.is_finite() || total <= 0.0 {
            return None;
        }
        Some(Self::new(
            self.comfort / total,
            self.efficiency / total,
            self.cost / total,
            self.thermal / total,
        ))
    }
}

/// Output of the decision fuser
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinedAction {
    /// Weighted sum of all contributions (°C, unbounded)
    pub final_adjustment_c: f64,

    /// Contribution of each category (adjustment × effective weight)
    pub breakdown: CategoryValues,

    /// Priority × confidence weights, renormalized
    pub effective_weights: CategoryValues,

    /// Reasons of non-maintain actions, comfort first
    pub reasoning: Vec<String>,

    /// Highest priority among contributing actions
    pub priority: ActionPriority,
}
