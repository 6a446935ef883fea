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

//! Defrost penalty learner.
//!
//! The statistic is a COP penalty factor: `1 - defrost minutes per
//! operational hour / 60`, floored at the configured minimum. Without
//! learned data a tent function over outdoor temperature, scaled by
//! humidity, estimates how much frosting to expect.

use serde::{Deserialize, Serialize};
use thermion_types::{DefrostConfig, DefrostObservation, LookupMethod};

use super::bucketed::{BucketModel, BucketedLearner};

pub type DefrostPenaltyLearner = BucketedLearner<DefrostModel>;

#[derive(Debug, Clone)]
pub struct DefrostModel {
    config: DefrostConfig,
}

impl DefrostModel {
    pub fn new(config: DefrostConfig) -> Self {
        Self { config }
    }

    fn clamp_factor(&self, factor: f64) -> f64 {
        factor.clamp(self.config.min_penalty_factor, 1.0)
    }

    /// Analytic estimate: frosting peaks just above freezing in humid air
    pub fn fallback_penalty(&self, outdoor_temp_c: f64, humidity_percent: Option<f64>) -> f64 {
        let half_width = self.config.fallback_half_width_c.max(f64::EPSILON);
        let tent =
            (1.0 - (outdoor_temp_c - self.config.fallback_peak_temp_c).abs() / half_width).max(0.0);
        let humidity = humidity_percent
            .filter(|h| h.is_finite())
            .unwrap_or(self.config.default_humidity_percent);
        let humidity_factor = ((humidity - 50.0) / 40.0).clamp(0.25, 1.0);
        self.clamp_factor(1.0 - self.config.fallback_max_penalty * tent * humidity_factor)
    }
}

impl BucketModel for DefrostModel {
    type Observation = DefrostObservation;
    type Statistic = f64;

    const NAME: &'static str = "Defrost learner";

    fn control_value(observation: &DefrostObservation) -> f64 {
        observation.outdoor_temp_c
    }

    fn validate(&self, observation: &DefrostObservation) -> Result<(), String> {
        let hours = observation.operational_hours;
        let minutes = observation.defrost_minutes;
        if !hours.is_finite() || hours <= 0.0 {
            return Err(format!("no operational time ({hours:.2}h)"));
        }
        if !minutes.is_finite() || minutes < 0.0 || minutes > hours * 60.0 {
            return Err(format!(
                "defrost time {minutes:.1}min impossible in {hours:.2}h"
            ));
        }
        Ok(())
    }

    fn aggregate(&self, samples: &[&DefrostObservation]) -> f64 {
        let hours: f64 = samples.iter().map(|s| s.operational_hours).sum();
        let minutes: f64 = samples.iter().map(|s| s.defrost_minutes).sum();
        if hours <= 0.0 {
            return 1.0;
        }
        self.clamp_factor(1.0 - (minutes / hours) / 60.0)
    }

    fn lerp(&self, lower: &f64, upper: &f64, fraction: f64) -> f64 {
        lower + (upper - lower) * fraction
    }

    fn clamp(&self, statistic: f64) -> f64 {
        self.clamp_factor(statistic)
    }
}

/// Where a penalty factor came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PenaltySource {
    Learned(LookupMethod),
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PenaltyEstimate {
    /// Multiplier on expected COP, in [min penalty, 1.0]
    pub factor: f64,
    pub source: PenaltySource,
    pub confidence: f64,
}

impl DefrostPenaltyLearner {
    /// Penalty for this outdoor temperature, learned or analytic
    pub fn penalty_factor(
        &self,
        outdoor_temp_c: f64,
        humidity_percent: Option<f64>,
    ) -> PenaltyEstimate {
        match self.lookup(outdoor_temp_c) {
            Some(result) => PenaltyEstimate {
                factor: result.statistic,
                source: PenaltySource::Learned(result.method),
                confidence: result.confidence,
            },
            None => PenaltyEstimate {
                factor: self
                    .model()
                    .fallback_penalty(outdoor_temp_c, humidity_percent),
                source: PenaltySource::Fallback,
                confidence: 0.0,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use thermion_types::LearnerConfig;

    fn learner() -> DefrostPenaltyLearner {
        DefrostPenaltyLearner::new(
            DefrostModel::new(DefrostConfig::default()),
            LearnerConfig {
                bucket_width: 2.0,
                history_cap: 200,
                min_samples: 5,
                high_confidence_samples: 15,
            },
        )
    }

    fn hour(outdoor: f64, defrost_minutes: f64) -> DefrostObservation {
        DefrostObservation {
            outdoor_temp_c: outdoor,
            defrost_minutes,
            operational_hours: 1.0,
            humidity_percent: Some(85.0),
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn test_three_layer_lookup_and_domain_clamp() {
        let mut learner = learner();
        for _ in 0..5 {
            assert!(learner.add_observation(hour(0.0, 3.0)));
            assert!(learner.add_observation(hour(10.0, 9.0)));
        }

        let exact = learner.lookup(0.0).unwrap();
        assert_eq!(exact.method, LookupMethod::Exact);
        assert!((exact.statistic - 0.95).abs() < 1e-9);

        let mid = learner.lookup(5.0).unwrap();
        assert_eq!(mid.method, LookupMethod::Interpolated);
        assert!((mid.statistic - 0.90).abs() < 1e-9);

        let cold = learner.lookup(-10.0).unwrap();
        assert_eq!(cold.method, LookupMethod::Extrapolated);
        assert_eq!(cold.statistic, 1.0);

        let warm = learner.lookup(20.0).unwrap();
        assert_eq!(warm.method, LookupMethod::Extrapolated);
        assert_eq!(warm.statistic, 0.80);
    }

    #[test]
    fn test_bucket_penalty_is_floored() {
        let mut learner = learner();
        for _ in 0..5 {
            learner.add_observation(hour(2.0, 30.0));
        }
        assert_eq!(learner.lookup(2.0).unwrap().statistic, 0.80);
    }

    #[test]
    fn test_fallback_tent() {
        let learner = learner();

        let peak = learner.penalty_factor(1.0, Some(90.0));
        assert_eq!(peak.source, PenaltySource::Fallback);
        assert!((peak.factor - 0.85).abs() < 1e-9);

        // dry air frosts less
        let dry = learner.penalty_factor(1.0, Some(40.0));
        assert!((dry.factor - (1.0 - 0.15 * 0.25)).abs() < 1e-9);

        // outside the tent there is no penalty
        assert_eq!(learner.penalty_factor(-12.0, None).factor, 1.0);
        assert_eq!(learner.penalty_factor(15.0, None).factor, 1.0);

        // default humidity 80% gives a factor of 0.75 at the peak
        let default_humidity = learner.penalty_factor(1.0, None);
        assert!((default_humidity.factor - (1.0 - 0.15 * 0.75)).abs() < 1e-9);
    }

    #[test]
    fn test_learned_overrides_fallback() {
        let mut learner = learner();
        for _ in 0..5 {
            learner.add_observation(hour(0.0, 6.0));
        }
        let estimate = learner.penalty_factor(0.0, Some(90.0));
        assert_eq!(estimate.source, PenaltySource::Learned(LookupMethod::Exact));
        assert!((estimate.factor - 0.90).abs() < 1e-9);
        assert!((estimate.confidence - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_impossible_observations_dropped() {
        let mut learner = learner();
        assert!(!learner.add_observation(hour(0.0, 75.0)));
        assert!(!learner.add_observation(hour(0.0, -1.0)));
        let mut idle = hour(0.0, 0.0);
        idle.operational_hours = 0.0;
        assert!(!learner.add_observation(idle));
    }
}
