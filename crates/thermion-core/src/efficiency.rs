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

//! Efficiency advisor: steer the supply temperature towards good COP.

use thermion_types::{
    ActionPriority, ControlConfig, ControllerAction, CopConfidence, EfficiencyConfig,
    EfficiencyDirection, EfficiencySample, LearnerConfig, OptimizationStrategy, SensorSnapshot,
};
use tracing::debug;

use crate::error::{Result, ensure_finite};
use crate::learning::{EfficiencyLearner, EfficiencyModel};

#[derive(Debug)]
pub struct EfficiencyAdvisor {
    config: EfficiencyConfig,
    learner: EfficiencyLearner,
    unsaved_samples: bool,
}

impl EfficiencyAdvisor {
    pub fn new(config: &EfficiencyConfig, learner: LearnerConfig, control: &ControlConfig) -> Self {
        let model = EfficiencyModel {
            max_plausible_cop: config.max_plausible_cop,
            min_supply_temp_c: control.min_setpoint_c,
            max_supply_temp_c: control.max_setpoint_c,
        };
        Self {
            config: config.clone(),
            learner: EfficiencyLearner::new(model, learner),
            unsaved_samples: false,
        }
    }

    pub fn learner(&self) -> &EfficiencyLearner {
        &self.learner
    }

    pub fn learner_mut(&mut self) -> &mut EfficiencyLearner {
        &mut self.learner
    }

    /// Feed a running-compressor measurement into the learner.
    /// Returns whether it was accepted.
    pub fn record_measurement(&mut self, snapshot: &SensorSnapshot) -> bool {
        let (Some(cop), Some(frequency), Some(outdoor)) = (
            snapshot.cop,
            snapshot.compressor_frequency_hz,
            snapshot.outdoor_temp_c,
        ) else {
            return false;
        };
        if cop <= 0.0 || frequency <= 0.0 {
            return false;
        }

        let accepted = self.learner.add_observation(EfficiencySample {
            outdoor_temp_c: outdoor,
            supply_temp_c: snapshot.current_setpoint_c,
            cop,
            compressor_frequency_hz: frequency,
            recorded_at: snapshot.taken_at,
        });
        self.unsaved_samples |= accepted;
        accepted
    }

    /// Whether the learner changed since the last call
    pub fn take_unsaved_samples(&mut self) -> bool {
        std::mem::take(&mut self.unsaved_samples)
    }

    /// COP-learning confidence: mean of the measurement tag and the learner
    pub fn learning_confidence(&self, outdoor_temp_c: Option<f64>, tag: CopConfidence) -> f64 {
        let learned = outdoor_temp_c.map_or(0.0, |t| self.learner.confidence_at(t));
        f64::midpoint(tag.weight(), learned)
    }

    fn fallback_step_c(&self) -> f64 {
        match self.config.strategy {
            OptimizationStrategy::Aggressive => self.config.aggressive_fallback_step_c,
            OptimizationStrategy::Conservative | OptimizationStrategy::Balanced => {
                self.config.fallback_step_c
            }
        }
    }

    /// Recommendation for this cycle; `None` without a COP reading.
    ///
    /// `defrost_penalty` scales the minimum acceptable COP so that dips
    /// expected from defrosting are not mistaken for a bad setpoint.
    pub fn evaluate(
        &mut self,
        snapshot: &SensorSnapshot,
        defrost_penalty: f64,
    ) -> Result<Option<ControllerAction>> {
        let Some(cop) = snapshot.cop else {
            return Ok(None);
        };
        ensure_finite("efficiency", "COP", cop)?;
        ensure_finite("efficiency", "setpoint", snapshot.current_setpoint_c)?;
        ensure_finite("efficiency", "defrost penalty", defrost_penalty)?;

        self.record_measurement(snapshot);

        let setpoint = snapshot.current_setpoint_c;
        let min_acceptable = self.config.min_acceptable_cop * defrost_penalty.clamp(0.0, 1.0);
        let target = self.config.target_cop;
        let optimum = snapshot
            .outdoor_temp_c
            .and_then(|t| self.learner.optimal_supply_temp(t))
            .map(|r| r.statistic);

        let action = if cop < min_acceptable {
            match optimum {
                Some(optimum) if (optimum - setpoint).abs() > self.config.low_cop_deviation_c => {
                    self.step_towards(
                        setpoint,
                        optimum,
                        ActionPriority::High,
                        format!(
                            "COP {cop:.2} below {min_acceptable:.2}: moving towards learned optimum {optimum:.1}°C"
                        ),
                    )
                }
                Some(optimum) => maintain(format!(
                    "COP {cop:.2} low but supply already near learned optimum {optimum:.1}°C"
                )),
                None => {
                    let step = self.fallback_step_c();
                    efficiency(
                        EfficiencyDirection::Decrease,
                        step,
                        ActionPriority::High,
                        format!(
                            "COP {cop:.2} below {min_acceptable:.2}, no learned data: lowering supply by {step:.1}°C"
                        ),
                    )
                }
            }
        } else {
            let daily = snapshot.daily_cop.filter(|d| d.is_finite()).unwrap_or(cop);
            let below_target = |value: f64| value >= min_acceptable && value < target;

            match optimum {
                Some(optimum)
                    if below_target(cop)
                        && below_target(daily)
                        && (optimum - setpoint).abs() > self.config.near_target_deviation_c =>
                {
                    self.step_towards(
                        setpoint,
                        optimum,
                        ActionPriority::Medium,
                        format!(
                            "COP {cop:.2} (daily {daily:.2}) below target {target:.2}: moving towards learned optimum {optimum:.1}°C"
                        ),
                    )
                }
                _ => maintain(format!("COP {cop:.2} acceptable")),
            }
        };

        debug!("Efficiency advisor: {}", action.reason());
        Ok(Some(action))
    }

    /// Bounded step towards the optimum at the strategy's rate
    fn step_towards(
        &self,
        setpoint: f64,
        optimum: f64,
        priority: ActionPriority,
        reason: String,
    ) -> ControllerAction {
        let rate = self.config.strategy.max_rate_c();
        let step = (optimum - setpoint).clamp(-rate, rate);
        let direction = if step > 0.0 {
            EfficiencyDirection::Increase
        } else {
            EfficiencyDirection::Decrease
        };
        efficiency(direction, step.abs(), priority, reason)
    }
}

fn efficiency(
    action: EfficiencyDirection,
    magnitude_c: f64,
    priority: ActionPriority,
    reason: String,
) -> ControllerAction {
    ControllerAction::Efficiency {
        action,
        magnitude_c,
        priority,
        reason,
    }
}

fn maintain(reason: String) -> ControllerAction {
    efficiency(EfficiencyDirection::Maintain, 0.0, ActionPriority::Low, reason)
}
