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

/// Per-cycle sensor view of the heat pump and the house.
///
/// Built fresh by the control loop at the top of every cycle and never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorSnapshot {
    /// When the snapshot was assembled
    pub taken_at: DateTime<Utc>,

    /// Measured indoor temperature (°C)
    pub indoor_temp_c: f64,

    /// Desired indoor temperature (°C)
    pub target_indoor_temp_c: f64,

    /// Current supply-temperature setpoint (°C)
    pub current_setpoint_c: f64,

    /// Outdoor temperature (°C)
    pub outdoor_temp_c: Option<f64>,

    /// Compressor frequency (Hz), 0 when the compressor is off
    pub compressor_frequency_hz: Option<f64>,

    /// Instantaneous COP from the external COP calculator
    pub cop: Option<f64>,

    /// Rolling daily COP
    pub daily_cop: Option<f64>,

    /// Confidence tag emitted together with the COP measurement
    #[serde(default)]
    pub cop_confidence: CopConfidence,

    /// Relative humidity outdoors (%)
    pub humidity_percent: Option<f64>,

    /// Measured heat output delivered to the house (kW)
    pub heat_output_kw: Option<f64>,
}

impl SensorSnapshot {
    /// Indoor temperature error, positive when the house is too cold
    pub fn comfort_error_c(&self) -> f64 {
        self.target_indoor_temp_c - self.indoor_temp_c
    }

    /// Whether the compressor is running
    pub fn compressor_running(&self) -> bool {
        self.compressor_frequency_hz.is_some_and(|f| f > 0.0)
    }
}

/// Quality tag of a COP measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CopConfidence {
    #[default]
    None,
    Low,
    Medium,
    High,
}

impl CopConfidence {
    /// Map a numeric confidence score in [0, 1] to a tag
    pub fn from_score(score: f64) -> Self {
        if !score.is_finite() || score <= 0.0 {
            Self::None
        } else if score >= 0.75 {
            Self::High
        } else if score >= 0.5 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    /// Weight used when blending into the COP learning confidence
    pub fn weight(self) -> f64 {
        match self {
            Self::None => 0.0,
            Self::Low => 0.4,
            Self::Medium => 0.7,
            Self::High => 1.0,
        }
    }
}
