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

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::action::CombinedAction;
use crate::config::PiParameters;
use crate::learning::{LearnerSummary, WindAlphaState, WindCorrection};
use crate::pricing::PriceBand;
use crate::weights::PriorityWeights;

/// Controller lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlState {
    #[default]
    Disabled,
    Enabled,
}

/// Fractional setpoint adjustment carried across cycles
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AccumulatorState {
    pub accumulated_adjustment: f64,
    pub last_adjustment_at: Option<DateTime<Utc>>,
}

/// Why a cycle ended before reaching a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    MissingIndoorTemperature,
    StaleIndoorTemperature,
    MissingTargetTemperature,
    MissingSetpoint,
}

/// Result of one control cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CycleOutcome {
    /// Required input missing; nothing was mutated
    Skipped { reason: SkipReason },

    /// Nothing to do; the recommended setpoint was re-synced
    Idle,

    /// Adjustment stored but below one integer step
    Accumulating { accumulated_c: f64 },

    /// A step is due but the minimum wait has not elapsed
    Throttled {
        accumulated_c: f64,
        remaining_secs: i64,
    },

    /// A new setpoint was emitted
    Applied {
        previous_setpoint_c: f64,
        new_setpoint_c: f64,
        requested_delta_c: f64,
        applied_delta_c: f64,
        simulated: bool,
    },
}

impl CycleOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

/// Wind learning view for status output
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindStatus {
    pub learning: WindAlphaState,
    pub last_wind_speed_kmh: Option<f64>,
    pub last_correction: Option<WindCorrection>,
}

/// Snapshot returned by `get_status`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerStatus {
    pub state: ControlState,
    pub auto_apply: bool,
    pub connected: bool,
    pub accumulator: AccumulatorState,
    pub priorities: PriorityWeights,
    pub pi: PiParameters,
    pub last_cycle_at: Option<DateTime<Utc>>,
    pub last_outcome: Option<CycleOutcome>,
    pub last_action: Option<CombinedAction>,
    pub efficiency_learning: LearnerSummary,
    pub defrost_learning: LearnerSummary,
    pub wind: WindStatus,
    pub price_points: usize,
    pub current_price_band: Option<PriceBand>,
}
