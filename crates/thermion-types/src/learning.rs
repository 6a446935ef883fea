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

//! Persistent learning state: bucketed learners and the wind coefficient.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============= Bucketed Learners =============

/// Trust level of a bucket, from its sample count
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceTier {
    Low,
    Medium,
    High,
}

impl ConfidenceTier {
    pub fn weight(self) -> f64 {
        match self {
            Self::Low => 0.4,
            Self::Medium => 0.7,
            Self::High => 1.0,
        }
    }
}

/// Aggregate of all history samples sharing one rounded control value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningBucket<S> {
    /// Rounded control value (e.g. outdoor temperature to the nearest 2 °C)
    pub center: f64,
    pub sample_count: usize,
    pub statistic: S,
    pub confidence: ConfidenceTier,
}

/// How a lookup result was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LookupMethod {
    Exact,
    Interpolated,
    Extrapolated,
}

impl LookupMethod {
    /// Discount applied to bucket confidence for derived values
    pub fn confidence_factor(self) -> f64 {
        match self {
            Self::Exact => 1.0,
            Self::Interpolated => 0.8,
            Self::Extrapolated => 0.6,
        }
    }
}

/// Statistic returned by a learner lookup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LookupResult<S> {
    pub statistic: S,
    pub method: LookupMethod,
    /// Confidence in [0, 1]
    pub confidence: f64,
}

/// Full learner state: bounded FIFO history plus the bucket map rebuilt from it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(
    serialize = "O: Serialize, S: Serialize",
    deserialize = "O: Deserialize<'de>, S: Deserialize<'de>"
))]
pub struct LearnerState<O, S> {
    pub history: Vec<O>,
    pub buckets: BTreeMap<i64, LearningBucket<S>>,
}

impl<O, S> Default for LearnerState<O, S> {
    fn default() -> Self {
        Self {
            history: Vec::new(),
            buckets: BTreeMap::new(),
        }
    }
}

/// Compact view of a learner for status output
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LearnerSummary {
    pub total_samples: usize,
    pub buckets: usize,
    pub qualifying_buckets: usize,
    /// Qualifying bucket range (min, max) of the control variable
    pub range: Option<(f64, f64)>,
}

/// One efficiency training observation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EfficiencySample {
    pub outdoor_temp_c: f64,
    pub supply_temp_c: f64,
    pub cop: f64,
    pub compressor_frequency_hz: f64,
    pub recorded_at: DateTime<Utc>,
}

/// Learned COP behaviour for one outdoor temperature bucket
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CopBucketStats {
    pub mean_cop: f64,
    /// Supply temperature with the best mean COP
    pub optimal_supply_temp_c: f64,
    pub best_cop: f64,
    pub mean_frequency_hz: f64,
}

/// One operational hour of defrost bookkeeping
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DefrostObservation {
    pub outdoor_temp_c: f64,
    pub defrost_minutes: f64,
    pub operational_hours: f64,
    pub humidity_percent: Option<f64>,
    pub recorded_at: DateTime<Utc>,
}

// ============= Wind Learning =============

/// Learned wind sensitivity coefficient
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindAlphaState {
    pub alpha: f64,
    pub sample_count: u32,
}

/// Where the alpha used for a correction came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlphaSource {
    Manual,
    Learned,
    Default,
}

/// Wind heat-loss correction for the supply setpoint
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindCorrection {
    pub correction_c: f64,
    pub capped: bool,
    pub alpha: f64,
    pub alpha_source: AlphaSource,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_learner_state_roundtrip_with_integer_keys() {
        let mut state: LearnerState<f64, f64> = LearnerState::default();
        state.history = vec![1.0, 2.0];
        state.buckets.insert(
            -2,
            LearningBucket {
                center: -4.0,
                sample_count: 2,
                statistic: 0.93,
                confidence: ConfidenceTier::Low,
            },
        );

        let json = serde_json::to_string(&state).unwrap();
        let back: LearnerState<f64, f64> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn test_tier_order() {
        assert!(ConfidenceTier::High > ConfidenceTier::Low);
        assert!(LookupMethod::Exact.confidence_factor() > LookupMethod::Extrapolated.confidence_factor());
    }
}
