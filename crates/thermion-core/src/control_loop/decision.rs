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

//! Synchronous decision state of the control loop.
//!
//! Everything here runs under one lock and never awaits. The async shell in
//! `mod.rs` reads the sensors, calls [`ControllerCore::decide`], then
//! performs the writes the returned [`CyclePlan`] asks for.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thermion_types::{
    AccumulatorState, CombinedAction, ConfidenceMetrics, ControlState, ControllerAction,
    ControllerConfig, ControllerStatus, CopBucketStats, CycleOutcome, DefrostObservation,
    EfficiencySample, LearnerState, PiParameters, PriceAnalytics, PriceDataPoint, PriceSample,
    PriorityWeights, SensorSnapshot, ValidationError, WindAlphaState,
};
use tracing::{debug, info, warn};

use crate::comfort::ComfortController;
use crate::efficiency::EfficiencyAdvisor;
use crate::fusion::{AdvisorOutputs, DecisionFuser};
use crate::learning::{DefrostModel, DefrostPenaltyLearner};
use crate::persistence::keys;
use crate::pricing::{PriceAdvisor, PriceClassifier};
use crate::traits::{Channel, ThermalRecommendation};
use crate::wind::{WindLossEstimator, WindLossSample};

/// Building model outputs and the external thermal advice for one cycle
#[derive(Debug, Clone, Default)]
pub(crate) struct ModelInputs {
    pub tau_hours: Option<f64>,
    pub ua_kw_per_c: Option<f64>,
    pub confidence: Option<f64>,
    pub predicted_loss_kw: Option<f64>,
    pub external_thermal: Option<ThermalRecommendation>,
}

/// What the async shell has to do after a decision
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CyclePlan {
    pub outcome: CycleOutcome,
    /// Value for the recommended-setpoint channel
    pub recommended_setpoint_c: Option<f64>,
    /// Setpoint write: the real channel or the simulated mirror
    pub setpoint_write: Option<(Channel, f64)>,
}

#[derive(Debug, Clone, Copy, Default)]
struct DirtyState {
    pi_history: bool,
    accumulator: bool,
    efficiency: bool,
    defrost: bool,
    prices: bool,
    wind: bool,
}

/// Operational time and defrost time collected towards one observation
#[derive(Debug, Clone, Copy, Default)]
struct DefrostWindow {
    operational_minutes: f64,
    defrost_minutes: f64,
    outdoor_sum: f64,
    outdoor_count: u32,
    humidity_sum: f64,
    humidity_count: u32,
}

impl DefrostWindow {
    fn add_outdoor(&mut self, outdoor_temp_c: f64, humidity_percent: Option<f64>) {
        self.outdoor_sum += outdoor_temp_c;
        self.outdoor_count += 1;
        if let Some(h) = humidity_percent.filter(|h| h.is_finite()) {
            self.humidity_sum += h;
            self.humidity_count += 1;
        }
    }

    fn observation(&self, now: DateTime<Utc>) -> Option<DefrostObservation> {
        if self.outdoor_count == 0 {
            return None;
        }
        Some(DefrostObservation {
            outdoor_temp_c: self.outdoor_sum / f64::from(self.outdoor_count),
            defrost_minutes: self.defrost_minutes,
            operational_hours: self.operational_minutes / 60.0,
            humidity_percent: (self.humidity_count > 0)
                .then(|| self.humidity_sum / f64::from(self.humidity_count)),
            recorded_at: now,
        })
    }
}

#[derive(Debug)]
pub(crate) struct ControllerCore {
    config: ControllerConfig,
    comfort: ComfortController,
    efficiency: EfficiencyAdvisor,
    defrost: DefrostPenaltyLearner,
    defrost_window: DefrostWindow,
    wind: WindLossEstimator,
    prices: PriceClassifier,
    price_advisor: PriceAdvisor,
    fuser: DecisionFuser,
    accumulator: AccumulatorState,
    connected: bool,
    last_cycle_at: Option<DateTime<Utc>>,
    last_outcome: Option<CycleOutcome>,
    last_action: Option<CombinedAction>,
    dirty: DirtyState,
}

impl ControllerCore {
    pub fn new(config: ControllerConfig) -> Result<Self, ValidationError> {
        config.validate()?;

        let comfort = ComfortController::new(&config.comfort)?;
        let efficiency = EfficiencyAdvisor::new(
            &config.efficiency,
            config.learning.efficiency,
            &config.control,
        );
        let defrost = DefrostPenaltyLearner::new(
            DefrostModel::new(config.defrost.clone()),
            config.learning.defrost,
        );

        Ok(Self {
            comfort,
            efficiency,
            defrost,
            defrost_window: DefrostWindow::default(),
            wind: WindLossEstimator::new(config.wind.clone()),
            prices: PriceClassifier::new(&config.price),
            price_advisor: PriceAdvisor::new(&config.price),
            fuser: DecisionFuser::new(config.priorities),
            accumulator: AccumulatorState::default(),
            connected: true,
            last_cycle_at: None,
            last_outcome: None,
            last_action: None,
            dirty: DirtyState::default(),
            config,
        })
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    // ============= Cycle =============

    /// Record a cycle that ended before any decision
    pub fn record_skip(&mut self, outcome: CycleOutcome, now: DateTime<Utc>) {
        self.last_cycle_at = Some(now);
        self.last_outcome = Some(outcome);
    }

    /// Run every advisor, fuse, and settle the accumulator
    pub fn decide(
        &mut self,
        snapshot: &SensorSnapshot,
        model: ModelInputs,
        now: DateTime<Utc>,
    ) -> CyclePlan {
        self.track_defrost_window(snapshot, now);
        self.learn_wind(snapshot, &model);

        let comfort = match self.comfort.compute_action(
            snapshot.indoor_temp_c,
            snapshot.target_indoor_temp_c,
            model.tau_hours,
            model.ua_kw_per_c,
        ) {
            Ok(action) => action,
            Err(e) => {
                warn!("⚠️  Comfort controller failed, no contribution: {}", e);
                None
            }
        };
        self.dirty.pi_history |= self.comfort.take_unsaved_history();

        let efficiency = self.efficiency_action(snapshot);
        let cost = self.cost_action(snapshot, now);
        let thermal = self.thermal_action(snapshot, model.external_thermal);

        let confidence = ConfidenceMetrics::new(
            self.efficiency
                .learning_confidence(snapshot.outdoor_temp_c, snapshot.cop_confidence),
            model.confidence.unwrap_or(1.0),
            self.prices.has_current_data(now),
        );

        let combined = self.fuser.fuse(
            AdvisorOutputs {
                comfort: comfort.as_ref(),
                efficiency: efficiency.as_ref(),
                cost: cost.as_ref(),
                thermal: thermal.as_ref(),
            },
            &confidence,
        );

        let plan = self.settle(snapshot, comfort.is_some(), combined.final_adjustment_c, now);

        self.last_action = Some(combined);
        self.last_cycle_at = Some(now);
        self.last_outcome = Some(plan.outcome.clone());
        plan
    }

    fn efficiency_action(&mut self, snapshot: &SensorSnapshot) -> Option<ControllerAction> {
        if !self.config.efficiency.enabled {
            return None;
        }

        let penalty = snapshot.outdoor_temp_c.map_or(1.0, |outdoor| {
            self.defrost
                .penalty_factor(outdoor, snapshot.humidity_percent)
                .factor
        });
        let result = self.efficiency.evaluate(snapshot, penalty);
        self.dirty.efficiency |= self.efficiency.take_unsaved_samples();

        result.unwrap_or_else(|e| {
            warn!("⚠️  Efficiency advisor failed, no contribution: {}", e);
            None
        })
    }

    fn cost_action(
        &self,
        snapshot: &SensorSnapshot,
        now: DateTime<Utc>,
    ) -> Option<ControllerAction> {
        if !self.config.price.enabled {
            return None;
        }
        let band = self.prices.current_band(now)?;
        self.price_advisor
            .recommend(snapshot.indoor_temp_c, snapshot.target_indoor_temp_c, band)
            .map_err(|e| warn!("⚠️  Price advisor failed, no contribution: {}", e))
            .ok()
    }

    /// External thermal advice plus the wind correction
    fn thermal_action(
        &mut self,
        snapshot: &SensorSnapshot,
        external: Option<ThermalRecommendation>,
    ) -> Option<ControllerAction> {
        let wind = match (self.wind.wind_speed(), snapshot.outdoor_temp_c) {
            (Some(speed), Some(outdoor)) if self.wind.is_enabled() => {
                self.wind
                    .correction(speed, snapshot.indoor_temp_c, outdoor)
            }
            _ => None,
        };

        let mut adjustment_c = 0.0;
        let mut reasons = Vec::new();
        if let Some(rec) = external.filter(|r| r.adjustment_c.is_finite()) {
            adjustment_c += rec.adjustment_c;
            reasons.push(rec.reason);
        }
        if let Some(correction) = wind
            && correction.correction_c > 0.0
        {
            adjustment_c += correction.correction_c;
            reasons.push(format!(
                "Wind correction {:+.2}°C (alpha {:.3}, {:?}{})",
                correction.correction_c,
                correction.alpha,
                correction.alpha_source,
                if correction.capped { ", capped" } else { "" }
            ));
        }

        if reasons.is_empty() {
            return None;
        }
        Some(ControllerAction::Thermal {
            adjustment_c,
            reason: reasons.join("; "),
        })
    }

    fn learn_wind(&mut self, snapshot: &SensorSnapshot, model: &ModelInputs) {
        if !self.wind.is_enabled() {
            return;
        }
        let (Some(wind_speed_kmh), Some(outdoor_temp_c), Some(actual_loss_kw)) = (
            self.wind.wind_speed(),
            snapshot.outdoor_temp_c,
            snapshot.heat_output_kw,
        ) else {
            return;
        };
        let (Some(predicted_loss_kw), Some(ua_kw_per_c)) =
            (model.predicted_loss_kw, model.ua_kw_per_c)
        else {
            return;
        };

        let learned = self.wind.learn(&WindLossSample {
            wind_speed_kmh,
            indoor_temp_c: snapshot.indoor_temp_c,
            outdoor_temp_c,
            predicted_loss_kw,
            actual_loss_kw,
            ua_kw_per_c,
        });
        self.dirty.wind |= learned;
    }

    fn track_defrost_window(&mut self, snapshot: &SensorSnapshot, now: DateTime<Utc>) {
        if !snapshot.compressor_running() {
            return;
        }
        let Some(outdoor) = snapshot.outdoor_temp_c else {
            return;
        };

        self.defrost_window.operational_minutes += self.config.control.interval_secs as f64 / 60.0;
        self.defrost_window
            .add_outdoor(outdoor, snapshot.humidity_percent);

        if self.defrost_window.operational_minutes < self.config.defrost.window_hours * 60.0 {
            return;
        }

        if let Some(observation) = self.defrost_window.observation(now)
            && self.defrost.add_observation(observation)
        {
            self.dirty.defrost = true;
            debug!(
                "Defrost window closed: {:.1} min defrost in {:.2} h at {:.1}°C",
                observation.defrost_minutes,
                observation.operational_hours,
                observation.outdoor_temp_c
            );
        }
        self.defrost_window = DefrostWindow::default();
    }

    /// Accumulate, round, throttle, clamp and reconcile
    fn settle(
        &mut self,
        snapshot: &SensorSnapshot,
        comfort_active: bool,
        final_adjustment_c: f64,
        now: DateTime<Utc>,
    ) -> CyclePlan {
        let current = snapshot.current_setpoint_c;

        if !comfort_active && final_adjustment_c.abs() < self.config.control.idle_threshold_c {
            debug!("Idle cycle, recommended setpoint synced to {:.1}°C", current);
            return CyclePlan {
                outcome: CycleOutcome::Idle,
                recommended_setpoint_c: Some(current),
                setpoint_write: None,
            };
        }

        self.accumulator.accumulated_adjustment += final_adjustment_c;
        self.dirty.accumulator = true;
        let accumulated = self.accumulator.accumulated_adjustment;
        let rounded = whole_step(accumulated);

        if rounded.abs() < 0.5 {
            debug!("Accumulating {:+.3}°C, below one step", accumulated);
            return CyclePlan {
                outcome: CycleOutcome::Accumulating {
                    accumulated_c: accumulated,
                },
                recommended_setpoint_c: None,
                setpoint_write: None,
            };
        }

        let min_wait = self.config.control.min_adjustment_interval();
        if let Some(last) = self.accumulator.last_adjustment_at
            && now - last < min_wait
        {
            let remaining_secs = (last + min_wait - now).num_seconds();
            debug!(
                "Throttled: {:+.0}°C pending, {}s until the next change is allowed",
                rounded, remaining_secs
            );
            return CyclePlan {
                outcome: CycleOutcome::Throttled {
                    accumulated_c: accumulated,
                    remaining_secs,
                },
                recommended_setpoint_c: None,
                setpoint_write: None,
            };
        }

        let control = &self.config.control;
        let new_setpoint =
            (current + rounded).clamp(control.min_setpoint_c, control.max_setpoint_c);
        let applied = new_setpoint - current;
        let simulated = !control.auto_apply;

        let outcome = CycleOutcome::Applied {
            previous_setpoint_c: current,
            new_setpoint_c: new_setpoint,
            requested_delta_c: rounded,
            applied_delta_c: applied,
            simulated,
        };

        if applied.abs() < f64::EPSILON {
            warn!(
                "⚠️  Setpoint {:.1}°C already at safety limit, {:+.0}°C not applied",
                current, rounded
            );
            return CyclePlan {
                outcome,
                recommended_setpoint_c: Some(current),
                setpoint_write: None,
            };
        }

        self.accumulator.accumulated_adjustment -= applied;
        self.accumulator.last_adjustment_at = Some(now);

        let channel = if simulated {
            info!(
                "🔍 Recommend-only: would change setpoint {:.1}°C → {:.1}°C",
                current, new_setpoint
            );
            Channel::SimulatedSetpoint
        } else {
            info!(
                "✅ Changing setpoint {:.1}°C → {:.1}°C (requested {:+.0}°C)",
                current, new_setpoint, rounded
            );
            Channel::Setpoint
        };

        CyclePlan {
            outcome,
            recommended_setpoint_c: Some(new_setpoint),
            setpoint_write: Some((channel, new_setpoint)),
        }
    }

    // ============= External inputs =============

    pub fn update_priorities(&mut self, weights: PriorityWeights) {
        self.fuser.set_weights(weights);
        self.config.priorities = weights;
    }

    pub fn update_pi_parameters(
        &mut self,
        kp: f64,
        ki: f64,
        deadband_c: f64,
    ) -> Result<PiParameters, ValidationError> {
        self.comfort.update_parameters(kp, ki, deadband_c)?;
        let params = self.comfort.parameters();
        self.config.comfort.kp = params.kp;
        self.config.comfort.ki = params.ki;
        self.config.comfort.deadband_c = params.deadband_c;
        Ok(params)
    }

    pub fn receive_prices(&mut self, samples: Vec<PriceSample>) -> usize {
        let kept = self.prices.replace_series(samples);
        self.dirty.prices = true;
        kept
    }

    pub fn receive_wind_speed(&mut self, wind_speed_kmh: f64) -> bool {
        self.wind.receive_wind_speed(wind_speed_kmh)
    }

    /// Add a defrost event to the open window. Returns false if dropped.
    pub fn record_defrost_event(
        &mut self,
        outdoor_temp_c: f64,
        duration_secs: f64,
        humidity_percent: Option<f64>,
    ) -> bool {
        let defrost = &self.config.defrost;
        if !duration_secs.is_finite()
            || duration_secs < defrost.min_event_secs
            || duration_secs > defrost.max_event_secs
        {
            debug!(
                "Defrost event of {}s outside [{}, {}]s, dropped",
                duration_secs, defrost.min_event_secs, defrost.max_event_secs
            );
            return false;
        }
        if !outdoor_temp_c.is_finite() {
            debug!("Defrost event without a valid outdoor temperature, dropped");
            return false;
        }

        self.defrost_window.defrost_minutes += duration_secs / 60.0;
        self.defrost_window
            .add_outdoor(outdoor_temp_c, humidity_percent);
        true
    }

    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }

    // ============= State =============

    pub fn accumulator(&self) -> AccumulatorState {
        self.accumulator
    }

    pub fn restore_accumulator(&mut self, accumulator: AccumulatorState) {
        if accumulator.accumulated_adjustment.is_finite() {
            self.accumulator = accumulator;
        } else {
            warn!("⚠️  Persisted accumulator is not finite, starting from zero");
            self.accumulator = AccumulatorState::default();
        }
    }

    /// Drop the in-memory accumulator (stop); learned data stays
    pub fn reset_runtime(&mut self) {
        self.accumulator = AccumulatorState::default();
        self.defrost_window = DefrostWindow::default();
        self.dirty.accumulator = false;
    }

    pub fn restore_pi_history(&mut self, history: Vec<f64>) {
        self.comfort.restore_history(history);
    }

    pub fn restore_efficiency(&mut self, state: LearnerState<EfficiencySample, CopBucketStats>) {
        self.efficiency.learner_mut().restore_state(state);
    }

    pub fn restore_defrost(&mut self, state: LearnerState<DefrostObservation, f64>) {
        self.defrost.restore_state(state);
    }

    pub fn restore_prices(&mut self, points: Vec<PriceDataPoint>) {
        self.prices.restore_points(points);
    }

    pub fn restore_wind(&mut self, state: WindAlphaState) {
        self.wind.restore_state(state);
    }

    /// Serialized values changed since the last call
    pub fn take_pending_writes(&mut self) -> Vec<(&'static str, serde_json::Value)> {
        let dirty = std::mem::take(&mut self.dirty);
        let mut writes = Vec::new();

        if dirty.pi_history {
            push_value(&mut writes, keys::PI_ERROR_HISTORY, &self.comfort.error_history());
        }
        if dirty.accumulator {
            push_value(&mut writes, keys::ACCUMULATOR, &self.accumulator);
        }
        if dirty.efficiency {
            push_value(
                &mut writes,
                keys::EFFICIENCY_LEARNER,
                &self.efficiency.learner().get_state(),
            );
        }
        if dirty.defrost {
            push_value(&mut writes, keys::DEFROST_LEARNER, &self.defrost.get_state());
        }
        if dirty.prices {
            push_value(&mut writes, keys::PRICE_SERIES, self.prices.points());
        }
        if dirty.wind {
            push_value(&mut writes, keys::WIND_LEARNING, &self.wind.state());
        }
        writes
    }

    /// Every persisted value, regardless of changes (used on stop)
    pub fn all_state_writes(&mut self) -> Vec<(&'static str, serde_json::Value)> {
        self.dirty = DirtyState {
            pi_history: true,
            accumulator: true,
            efficiency: true,
            defrost: true,
            prices: true,
            wind: true,
        };
        self.take_pending_writes()
    }

    /// Forget everything learned (destroy)
    pub fn clear_all(&mut self) {
        self.comfort.clear_history();
        self.efficiency.learner_mut().clear();
        self.defrost.clear();
        self.wind.clear();
        self.prices.clear();
        self.reset_runtime();
        self.last_outcome = None;
        self.last_action = None;
        self.dirty = DirtyState::default();
    }

    pub fn status(&self, state: ControlState, now: DateTime<Utc>) -> ControllerStatus {
        ControllerStatus {
            state,
            auto_apply: self.config.control.auto_apply,
            connected: self.connected,
            accumulator: self.accumulator,
            priorities: self.fuser.weights(),
            pi: self.comfort.parameters(),
            last_cycle_at: self.last_cycle_at,
            last_outcome: self.last_outcome.clone(),
            last_action: self.last_action.clone(),
            efficiency_learning: self.efficiency.learner().summary(),
            defrost_learning: self.defrost.summary(),
            wind: self.wind.status(),
            price_points: self.prices.len(),
            current_price_band: self.prices.current_band(now),
        }
    }

    pub fn price_analytics(&self, now: DateTime<Utc>, forecast_hours: usize) -> PriceAnalytics {
        self.prices.analytics(now, forecast_hours)
    }
}

/// Whole-degree step for an accumulated adjustment.
///
/// Halves round away from zero, so +0.5 and -0.5 both produce a step and
/// heating and cooling behave symmetrically.
fn whole_step(accumulated: f64) -> f64 {
    accumulated.round()
}

fn push_value<T: Serialize + ?Sized>(
    writes: &mut Vec<(&'static str, serde_json::Value)>,
    key: &'static str,
    value: &T,
) {
    match serde_json::to_value(value) {
        Ok(json) => writes.push((key, json)),
        Err(e) => warn!("⚠️  Failed to serialize '{}': {}", key, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use thermion_types::{ComfortConfig, CopConfidence};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 15, 6, 0, 0).unwrap()
    }

    fn snapshot(indoor: f64, target: f64, setpoint: f64) -> SensorSnapshot {
        SensorSnapshot {
            taken_at: now(),
            indoor_temp_c: indoor,
            target_indoor_temp_c: target,
            current_setpoint_c: setpoint,
            outdoor_temp_c: None,
            compressor_frequency_hz: None,
            cop: None,
            daily_cop: None,
            cop_confidence: CopConfidence::None,
            humidity_percent: None,
            heat_output_kw: None,
        }
    }

    fn core() -> ControllerCore {
        ControllerCore::new(ControllerConfig::default()).unwrap()
    }

    /// Comfort weight with efficiency and cost untrusted: 0.5 / 0.65
    const COMFORT_SHARE: f64 = 0.5 / 0.65;

    #[test]
    fn test_clamped_step_reconciles_accumulator() {
        let mut core = core();
        let plan = core.decide(&snapshot(11.0, 21.0, 64.0), ModelInputs::default(), now());

        let requested = 3.0 * COMFORT_SHARE;
        match plan.outcome {
            CycleOutcome::Applied {
                new_setpoint_c,
                requested_delta_c,
                applied_delta_c,
                simulated,
                ..
            } => {
                assert_eq!(new_setpoint_c, 65.0);
                assert_eq!(requested_delta_c, 2.0);
                assert_eq!(applied_delta_c, 1.0);
                assert!(simulated);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(plan.setpoint_write, Some((Channel::SimulatedSetpoint, 65.0)));
        assert_eq!(plan.recommended_setpoint_c, Some(65.0));

        let accumulator = core.accumulator();
        assert!((accumulator.accumulated_adjustment - (requested - 1.0)).abs() < 1e-9);
        assert_eq!(accumulator.last_adjustment_at, Some(now()));
    }

    #[test]
    fn test_throttle_keeps_accumulator() {
        let mut core = core();
        core.decide(&snapshot(11.0, 21.0, 40.0), ModelInputs::default(), now());
        let before = core.accumulator().accumulated_adjustment;

        let later = now() + Duration::minutes(5);
        let plan = core.decide(&snapshot(11.0, 21.0, 42.0), ModelInputs::default(), later);
        match plan.outcome {
            CycleOutcome::Throttled {
                accumulated_c,
                remaining_secs,
            } => {
                assert!((accumulated_c - (before + 3.0 * COMFORT_SHARE)).abs() < 1e-9);
                assert_eq!(remaining_secs, 600);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert!(plan.setpoint_write.is_none());

        let after_wait = now() + Duration::minutes(15);
        let plan = core.decide(&snapshot(11.0, 21.0, 42.0), ModelInputs::default(), after_wait);
        assert!(plan.outcome.is_applied());
    }

    #[test]
    fn test_idle_syncs_recommended_setpoint() {
        let mut core = core();
        let plan = core.decide(&snapshot(21.0, 21.0, 38.0), ModelInputs::default(), now());
        assert_eq!(plan.outcome, CycleOutcome::Idle);
        assert_eq!(plan.recommended_setpoint_c, Some(38.0));
        assert_eq!(core.accumulator(), AccumulatorState::default());
    }

    #[test]
    fn test_small_adjustments_accumulate() {
        let config = ControllerConfig {
            comfort: ComfortConfig {
                kp: 0.15,
                ki: 0.1,
                ..ComfortConfig::default()
            },
            ..ControllerConfig::default()
        };
        let mut core = ControllerCore::new(config).unwrap();

        let plan = core.decide(&snapshot(20.0, 21.0, 38.0), ModelInputs::default(), now());
        let expected = 0.25 * COMFORT_SHARE;
        match plan.outcome {
            CycleOutcome::Accumulating { accumulated_c } => {
                assert!((accumulated_c - expected).abs() < 1e-9);
            }
            other => panic!("unexpected outcome {other:?}"),
        }

        let keys: Vec<&str> = core.take_pending_writes().iter().map(|(k, _)| *k).collect();
        assert!(keys.contains(&keys::ACCUMULATOR));
        assert!(keys.contains(&keys::PI_ERROR_HISTORY));
        assert!(core.take_pending_writes().is_empty());
    }

    #[test]
    fn test_history_change_without_action_is_persisted() {
        let config = ControllerConfig {
            comfort: ComfortConfig {
                kp: 0.1,
                ki: 0.1,
                deadband_c: 0.1,
                ..ComfortConfig::default()
            },
            ..ControllerConfig::default()
        };
        let mut core = ControllerCore::new(config).unwrap();

        let plan = core.decide(&snapshot(20.6, 21.0, 38.0), ModelInputs::default(), now());
        assert_eq!(plan.outcome, CycleOutcome::Idle);

        let writes = core.take_pending_writes();
        let (key, value) = writes
            .iter()
            .find(|(k, _)| *k == keys::PI_ERROR_HISTORY)
            .unwrap();
        assert_eq!(*key, keys::PI_ERROR_HISTORY);
        let history: Vec<f64> = serde_json::from_value(value.clone()).unwrap();
        assert_eq!(history.len(), 1);
        assert!((history[0] - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_config_rejects_overflowing_minutes() {
        let mut config = ControllerConfig::default();
        config.control.min_adjustment_interval_minutes = i64::MAX;
        assert!(ControllerCore::new(config).is_err());
    }

    #[test]
    fn test_half_steps_round_away_from_zero() {
        assert_eq!(whole_step(0.5), 1.0);
        assert_eq!(whole_step(-0.5), -1.0);
        assert_eq!(whole_step(0.49), 0.0);
        assert_eq!(whole_step(-0.49), 0.0);
        assert_eq!(whole_step(-1.5), -2.0);
    }

    #[test]
    fn test_safety_limit_applies_nothing() {
        let mut core = core();
        let plan = core.decide(&snapshot(11.0, 21.0, 65.0), ModelInputs::default(), now());
        match plan.outcome {
            CycleOutcome::Applied {
                applied_delta_c, ..
            } => assert_eq!(applied_delta_c, 0.0),
            other => panic!("unexpected outcome {other:?}"),
        }
        assert!(plan.setpoint_write.is_none());
        assert!((core.accumulator().accumulated_adjustment - 3.0 * COMFORT_SHARE).abs() < 1e-9);
        assert!(core.accumulator().last_adjustment_at.is_none());
    }

    #[test]
    fn test_defrost_window_records_observation() {
        let mut core = core();
        assert!(!core.record_defrost_event(0.0, 10.0, None));
        assert!(!core.record_defrost_event(0.0, 2000.0, None));
        assert!(core.record_defrost_event(0.0, 180.0, Some(85.0)));

        let mut running = snapshot(21.0, 21.0, 38.0);
        running.outdoor_temp_c = Some(0.0);
        running.compressor_frequency_hz = Some(40.0);

        // 12 cycles of 5 minutes close a one-hour window
        for cycle in 0..12 {
            let at = now() + Duration::minutes(5 * cycle);
            core.decide(&running, ModelInputs::default(), at);
        }

        let status = core.status(ControlState::Enabled, now());
        assert_eq!(status.defrost_learning.total_samples, 1);
        let keys: Vec<&str> = core.take_pending_writes().iter().map(|(k, _)| *k).collect();
        assert!(keys.contains(&keys::DEFROST_LEARNER));
    }

    #[test]
    fn test_thermal_combines_external_and_wind() {
        let mut core = core();
        assert!(core.receive_wind_speed(30.0));

        let mut cold = snapshot(21.0, 21.0, 38.0);
        cold.outdoor_temp_c = Some(1.0);
        let model = ModelInputs {
            external_thermal: Some(ThermalRecommendation {
                adjustment_c: 0.5,
                reason: "slab is cooling".to_owned(),
            }),
            ..ModelInputs::default()
        };

        core.decide(&cold, model, now());
        let status = core.status(ControlState::Enabled, now());
        let action = status.last_action.unwrap();
        // 0.5 external + 0.05 * 30 * 20 / 100 wind
        let thermal_share = 0.15 / 0.65;
        assert!((action.breakdown.thermal - 0.8 * thermal_share).abs() < 1e-9);
        assert_eq!(action.reasoning.len(), 1);
        assert!(action.reasoning[0].starts_with("slab is cooling; Wind correction"));
    }
}
