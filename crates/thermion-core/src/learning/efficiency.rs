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

//! COP learner: which supply temperature works best at which outdoor temperature.
//!
//! Fallback without learned data lives in the efficiency advisor: lower
//! supply temperatures raise COP, so it steps the setpoint down.

use std::collections::BTreeMap;

use thermion_types::{CopBucketStats, EfficiencySample, LookupResult};

use super::bucketed::{BucketModel, BucketedLearner};

const COP_FLOOR: f64 = 1.0;
const COP_CEILING: f64 = 8.0;

pub type EfficiencyLearner = BucketedLearner<EfficiencyModel>;

#[derive(Debug, Clone, Copy)]
pub struct EfficiencyModel {
    pub max_plausible_cop: f64,
    pub min_supply_temp_c: f64,
    pub max_supply_temp_c: f64,
}

impl BucketModel for EfficiencyModel {
    type Observation = EfficiencySample;
    type Statistic = CopBucketStats;

    const NAME: &'static str = "Efficiency learner";

    fn control_value(observation: &EfficiencySample) -> f64 {
        observation.outdoor_temp_c
    }

    fn validate(&self, sample: &EfficiencySample) -> Result<(), String> {
        if !sample.cop.is_finite() || sample.cop <= 0.0 || sample.cop > self.max_plausible_cop {
            return Err(format!("implausible COP {:.2}", sample.cop));
        }
        if !sample.compressor_frequency_hz.is_finite() || sample.compressor_frequency_hz <= 0.0 {
            return Err("compressor not running".to_owned());
        }
        if !sample.supply_temp_c.is_finite() {
            return Err("supply temperature not finite".to_owned());
        }
        Ok(())
    }

    fn aggregate(&self, samples: &[&EfficiencySample]) -> CopBucketStats {
        let count = samples.len().max(1) as f64;
        let mean_cop = samples.iter().map(|s| s.cop).sum::<f64>() / count;
        let mean_frequency_hz =
            samples.iter().map(|s| s.compressor_frequency_hz).sum::<f64>() / count;
        let best_cop = samples.iter().map(|s| s.cop).fold(0.0, f64::max);

        // Mean COP per whole-degree supply temperature; ties go to the lower supply
        let mut by_supply: BTreeMap<i64, (f64, usize)> = BTreeMap::new();
        for sample in samples {
            let entry = by_supply
                .entry(sample.supply_temp_c.round() as i64)
                .or_insert((0.0, 0));
            entry.0 += sample.cop;
            entry.1 += 1;
        }
        let optimal_supply_temp_c = by_supply
            .iter()
            .map(|(supply, (sum, n))| (*supply, sum / *n as f64))
            .fold(None, |best: Option<(i64, f64)>, (supply, cop)| match best {
                Some((_, best_cop)) if best_cop >= cop => best,
                _ => Some((supply, cop)),
            })
            .map_or(self.min_supply_temp_c, |(supply, _)| supply as f64);

        CopBucketStats {
            mean_cop,
            optimal_supply_temp_c,
            best_cop,
            mean_frequency_hz,
        }
    }

    fn lerp(
        &self,
        lower: &CopBucketStats,
        upper: &CopBucketStats,
        fraction: f64,
    ) -> CopBucketStats {
        let mix = |a: f64, b: f64| a + (b - a) * fraction;
        CopBucketStats {
            mean_cop: mix(lower.mean_cop, upper.mean_cop),
            optimal_supply_temp_c: mix(lower.optimal_supply_temp_c, upper.optimal_supply_temp_c),
            best_cop: mix(lower.best_cop, upper.best_cop),
            mean_frequency_hz: mix(lower.mean_frequency_hz, upper.mean_frequency_hz),
        }
    }

    fn clamp(&self, stats: CopBucketStats) -> CopBucketStats {
        CopBucketStats {
            mean_cop: stats.mean_cop.clamp(COP_FLOOR, COP_CEILING),
            optimal_supply_temp_c: stats
                .optimal_supply_temp_c
                .clamp(self.min_supply_temp_c, self.max_supply_temp_c),
            best_cop: stats.best_cop.clamp(COP_FLOOR, COP_CEILING),
            mean_frequency_hz: stats.mean_frequency_hz.max(0.0),
        }
    }
}

impl EfficiencyLearner {
    /// Learned optimum for this outdoor temperature, if any
    pub fn optimal_supply_temp(&self, outdoor_temp_c: f64) -> Option<LookupResult<f64>> {
        self.lookup(outdoor_temp_c).map(|r| LookupResult {
            statistic: r.statistic.optimal_supply_temp_c,
            method: r.method,
            confidence: r.confidence,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use thermion_types::{LearnerConfig, LookupMethod};

    fn model() -> EfficiencyModel {
        EfficiencyModel {
            max_plausible_cop: 8.0,
            min_supply_temp_c: 25.0,
            max_supply_temp_c: 65.0,
        }
    }

    fn config() -> LearnerConfig {
        LearnerConfig {
            bucket_width: 2.0,
            history_cap: 500,
            min_samples: 5,
            high_confidence_samples: 15,
        }
    }

    fn sample(outdoor: f64, supply: f64, cop: f64) -> EfficiencySample {
        EfficiencySample {
            outdoor_temp_c: outdoor,
            supply_temp_c: supply,
            cop,
            compressor_frequency_hz: 45.0,
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn test_optimal_supply_is_best_mean_cop() {
        let mut learner = EfficiencyLearner::new(model(), config());
        for _ in 0..3 {
            learner.add_observation(sample(0.0, 40.0, 3.6));
            learner.add_observation(sample(0.0, 45.0, 3.1));
        }

        let stats = &learner.buckets()[&0].statistic;
        assert_eq!(stats.optimal_supply_temp_c, 40.0);
        assert!((stats.mean_cop - 3.35).abs() < 1e-9);
        assert_eq!(stats.best_cop, 3.6);

        let optimum = learner.optimal_supply_temp(0.4).unwrap();
        assert_eq!(optimum.method, LookupMethod::Exact);
        assert_eq!(optimum.statistic, 40.0);
    }

    #[test]
    fn test_interpolated_optimum() {
        let mut learner = EfficiencyLearner::new(model(), config());
        for _ in 0..5 {
            learner.add_observation(sample(-10.0, 50.0, 2.4));
            learner.add_observation(sample(10.0, 34.0, 4.2));
        }
        let optimum = learner.optimal_supply_temp(0.0).unwrap();
        assert_eq!(optimum.method, LookupMethod::Interpolated);
        assert!((optimum.statistic - 42.0).abs() < 1e-9);

        // far outside the range the supply clamp applies
        let cold = learner.optimal_supply_temp(-60.0).unwrap();
        assert_eq!(cold.statistic, 65.0);
    }

    #[test]
    fn test_implausible_samples_dropped() {
        let mut learner = EfficiencyLearner::new(model(), config());
        assert!(!learner.add_observation(sample(0.0, 40.0, 0.0)));
        assert!(!learner.add_observation(sample(0.0, 40.0, 12.0)));
        let mut idle = sample(0.0, 40.0, 3.0);
        idle.compressor_frequency_hz = 0.0;
        assert!(!learner.add_observation(idle));
        assert_eq!(learner.sample_count(), 0);
    }
}
