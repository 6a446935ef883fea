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

//! Control loop orchestrator.
//!
//! Owns every advisor and learner, drives them from a fixed-period timer and
//! talks to the outside world only through the collaborator traits. One cycle:
//!
//! 1. read the sensor snapshot (skip silently when required input is missing)
//! 2. run comfort, efficiency, price and thermal advisors
//! 3. fuse their actions into one adjustment
//! 4. accumulate, round to whole degrees, throttle and clamp
//! 5. persist, then write the setpoint (or its simulated mirror)

mod decision;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use thermion_types::{
    AccumulatorState, ControlState, ControllerConfig, ControllerStatus, CopBucketStats,
    CopConfidence, CycleOutcome, DefrostObservation, EfficiencySample, LearnerState,
    PiParameters, PriceAnalytics, PriceDataPoint, PriceSample, PriorityWeights, SensorSnapshot, SkipReason,
    WindAlphaState,
};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::persistence::{keys, load_or_none, remove_best_effort, save_best_effort};
use crate::traits::{
    BuildingModel, Channel, SetpointIo, StateStore, ThermalAdvisor, read_value, write_value,
};

use decision::{ControllerCore, ModelInputs};

/// External collaborators of the control loop
#[derive(Clone)]
pub struct Collaborators {
    pub io: Arc<dyn SetpointIo>,
    pub store: Arc<dyn StateStore>,
    pub building_model: Option<Arc<dyn BuildingModel>>,
    pub thermal_advisor: Option<Arc<dyn ThermalAdvisor>>,
}

impl Collaborators {
    pub fn new(io: Arc<dyn SetpointIo>, store: Arc<dyn StateStore>) -> Self {
        Self {
            io,
            store,
            building_model: None,
            thermal_advisor: None,
        }
    }

    #[must_use]
    pub fn with_building_model(mut self, model: Arc<dyn BuildingModel>) -> Self {
        self.building_model = Some(model);
        self
    }

    #[must_use]
    pub fn with_thermal_advisor(mut self, advisor: Arc<dyn ThermalAdvisor>) -> Self {
        self.thermal_advisor = Some(advisor);
        self
    }
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators")
            .field("io", &self.io.name())
            .field("building_model", &self.building_model.is_some())
            .field("thermal_advisor", &self.thermal_advisor.is_some())
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
enum LoopState {
    Disabled,
    Enabled {
        handle: JoinHandle<()>,
        shutdown: Arc<Notify>,
    },
}

#[derive(Debug)]
struct Shared {
    core: Mutex<ControllerCore>,
    /// Held for the whole of a cycle and of every lifecycle transition
    cycle_guard: tokio::sync::Mutex<()>,
    collaborators: Collaborators,
}

/// Heat pump controller: advisors, learners and the timer that drives them
#[derive(Debug)]
pub struct ControlLoop {
    shared: Arc<Shared>,
    state: Mutex<LoopState>,
}

impl ControlLoop {
    /// Build a disabled controller. Fails on an invalid configuration.
    pub fn new(config: ControllerConfig, collaborators: Collaborators) -> Result<Self> {
        let core = ControllerCore::new(config)?;
        info!(
            "✅ Controller created for '{}' (auto-apply: {})",
            collaborators.io.name(),
            core.config().control.auto_apply
        );
        Ok(Self {
            shared: Arc::new(Shared {
                core: Mutex::new(core),
                cycle_guard: tokio::sync::Mutex::new(()),
                collaborators,
            }),
            state: Mutex::new(LoopState::Disabled),
        })
    }

    /// Load persisted learning state. Returns the persisted enabled flag so
    /// the caller can resume a controller that was running.
    pub async fn restore_state(&self) -> bool {
        let _cycle = self.shared.cycle_guard.lock().await;
        let store = self.shared.collaborators.store.as_ref();

        let pi_history: Option<Vec<f64>> = load_or_none(store, keys::PI_ERROR_HISTORY).await;
        let accumulator: Option<AccumulatorState> = load_or_none(store, keys::ACCUMULATOR).await;
        let efficiency: Option<LearnerState<EfficiencySample, CopBucketStats>> =
            load_or_none(store, keys::EFFICIENCY_LEARNER).await;
        let defrost: Option<LearnerState<DefrostObservation, f64>> =
            load_or_none(store, keys::DEFROST_LEARNER).await;
        let prices: Option<Vec<PriceDataPoint>> = load_or_none(store, keys::PRICE_SERIES).await;
        let wind: Option<WindAlphaState> = load_or_none(store, keys::WIND_LEARNING).await;
        let enabled: Option<bool> = load_or_none(store, keys::ENABLED).await;

        let mut core = self.shared.core.lock();
        if let Some(history) = pi_history {
            core.restore_pi_history(history);
        }
        if let Some(accumulator) = accumulator {
            core.restore_accumulator(accumulator);
        }
        if let Some(state) = efficiency {
            core.restore_efficiency(state);
        }
        if let Some(state) = defrost {
            core.restore_defrost(state);
        }
        if let Some(points) = prices {
            core.restore_prices(points);
        }
        if let Some(state) = wind {
            core.restore_wind(state);
        }

        let status = core.status(ControlState::Disabled, Utc::now());
        info!(
            "✅ Controller state restored: {} efficiency samples, {} defrost samples, {} price points",
            status.efficiency_learning.total_samples,
            status.defrost_learning.total_samples,
            status.price_points
        );
        enabled.unwrap_or(false)
    }

    pub fn is_running(&self) -> bool {
        matches!(*self.state.lock(), LoopState::Enabled { .. })
    }

    /// `disabled -> enabled`: reload the accumulator and start the timer.
    /// Returns false if already running.
    pub async fn start(&self) -> bool {
        let _cycle = self.shared.cycle_guard.lock().await;
        if self.is_running() {
            warn!("⚠️  Controller already running");
            return false;
        }

        let store = self.shared.collaborators.store.as_ref();
        if let Some(accumulator) = load_or_none::<AccumulatorState>(store, keys::ACCUMULATOR).await
        {
            self.shared.core.lock().restore_accumulator(accumulator);
        }
        save_best_effort(store, keys::ENABLED, &true).await;

        let shutdown = Arc::new(Notify::new());
        let handle = tokio::spawn(Arc::clone(&self.shared).run_timer(Arc::clone(&shutdown)));
        *self.state.lock() = LoopState::Enabled { handle, shutdown };

        info!("✅ Controller started");
        true
    }

    /// `enabled -> disabled`: cancel the timer, let an in-flight cycle
    /// finish, persist everything and drop the in-memory accumulator.
    /// Learned data is kept. Returns false if not running.
    pub async fn stop(&self) -> bool {
        let previous = std::mem::replace(&mut *self.state.lock(), LoopState::Disabled);
        let LoopState::Enabled { handle, shutdown } = previous else {
            debug!("Controller not running, nothing to stop");
            return false;
        };

        shutdown.notify_one();
        if let Err(e) = handle.await {
            error!("❌ Control loop task ended abnormally: {}", e);
        }

        let _cycle = self.shared.cycle_guard.lock().await;
        let writes = self.shared.core.lock().all_state_writes();
        let store = self.shared.collaborators.store.as_ref();
        for (key, value) in writes {
            save_best_effort(store, key, &value).await;
        }
        save_best_effort(store, keys::ENABLED, &false).await;
        self.shared.core.lock().reset_runtime();

        info!("Controller stopped");
        true
    }

    /// Stop and forget everything learned, including persisted state
    pub async fn destroy(&self) {
        self.stop().await;

        let _cycle = self.shared.cycle_guard.lock().await;
        self.shared.core.lock().clear_all();
        let store = self.shared.collaborators.store.as_ref();
        for key in keys::ALL {
            remove_best_effort(store, key).await;
        }
        info!("Controller destroyed, learned state cleared");
    }

    /// Run one cycle now
    pub async fn run_cycle(&self) -> CycleOutcome {
        self.shared.run_cycle_at(Utc::now()).await
    }

    /// Run one cycle as if the current time were `now`
    pub async fn run_cycle_at(&self, now: DateTime<Utc>) -> CycleOutcome {
        self.shared.run_cycle_at(now).await
    }

    pub fn get_status(&self) -> ControllerStatus {
        let state = if self.is_running() {
            ControlState::Enabled
        } else {
            ControlState::Disabled
        };
        self.shared.core.lock().status(state, Utc::now())
    }

    /// Price statistics, blocks, trend and a forecast of `forecast_hours`
    /// hours as seen at `now`
    pub fn price_analytics(&self, now: DateTime<Utc>, forecast_hours: usize) -> PriceAnalytics {
        self.shared.core.lock().price_analytics(now, forecast_hours)
    }

    /// Set new priority weights; they are renormalized to sum to 1.0.
    /// Invalid weights leave the current ones in place.
    pub fn update_priorities(
        &self,
        comfort: f64,
        efficiency: f64,
        cost: f64,
        thermal: f64,
    ) -> Result<PriorityWeights> {
        let weights = PriorityWeights::new(comfort, efficiency, cost, thermal)?;
        self.shared.core.lock().update_priorities(weights);
        info!(
            "✅ Priorities updated: comfort {:.2}, efficiency {:.2}, cost {:.2}, thermal {:.2}",
            weights.comfort(),
            weights.efficiency(),
            weights.cost(),
            weights.thermal()
        );
        Ok(weights)
    }

    pub fn update_pi_parameters(&self, kp: f64, ki: f64, deadband_c: f64) -> Result<PiParameters> {
        Ok(self
            .shared
            .core
            .lock()
            .update_pi_parameters(kp, ki, deadband_c)?)
    }

    /// Replace the price series and persist it. Returns the points kept.
    pub async fn receive_external_price(&self, samples: Vec<PriceSample>) -> usize {
        let (kept, writes) = {
            let mut core = self.shared.core.lock();
            let kept = core.receive_prices(samples);
            (kept, core.take_pending_writes())
        };
        let store = self.shared.collaborators.store.as_ref();
        for (key, value) in writes {
            save_best_effort(store, key, &value).await;
        }
        kept
    }

    pub fn receive_external_wind_speed(&self, wind_speed_kmh: f64) -> bool {
        self.shared.core.lock().receive_wind_speed(wind_speed_kmh)
    }

    /// Record one defrost event. Events shorter or longer than the
    /// configured bounds are dropped and false is returned.
    pub fn record_defrost_event(
        &self,
        outdoor_temp_c: f64,
        duration_secs: f64,
        humidity_percent: Option<f64>,
    ) -> bool {
        self.shared
            .core
            .lock()
            .record_defrost_event(outdoor_temp_c, duration_secs, humidity_percent)
    }

    /// Connectivity notification from the Setpoint I/O side
    pub fn on_connection_changed(&self, connected: bool) {
        if connected {
            info!("✅ Heat pump connection restored");
        } else {
            warn!("⚠️  Heat pump connection lost");
        }
        self.shared.core.lock().set_connected(connected);
    }
}

impl Shared {
    async fn run_timer(self: Arc<Self>, shutdown: Arc<Notify>) {
        let period = Duration::from_secs(self.core.lock().config().control.interval_secs.max(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = shutdown.notified() => {
                    debug!("Control loop timer cancelled");
                    break;
                }
                _ = ticker.tick() => {}
            }

            self.run_cycle_at(Utc::now()).await;
        }
    }

    async fn run_cycle_at(&self, now: DateTime<Utc>) -> CycleOutcome {
        let _cycle = self.cycle_guard.lock().await;

        let snapshot = match self.read_snapshot(now).await {
            Ok(snapshot) => snapshot,
            Err(reason) => {
                debug!("Cycle skipped: {:?}", reason);
                let outcome = CycleOutcome::Skipped { reason };
                self.core.lock().record_skip(outcome.clone(), now);
                return outcome;
            }
        };

        let model = self.model_inputs(&snapshot).await;

        let (plan, writes) = {
            let mut core = self.core.lock();
            let plan = core.decide(&snapshot, model, now);
            (plan, core.take_pending_writes())
        };

        let store = self.collaborators.store.as_ref();
        for (key, value) in writes {
            save_best_effort(store, key, &value).await;
        }

        if let Some((channel, value)) = plan.setpoint_write {
            self.write_channel(channel, value).await;
        }
        if let Some(value) = plan.recommended_setpoint_c {
            self.write_channel(Channel::RecommendedSetpoint, value).await;
        }

        plan.outcome
    }

    async fn read_channel(&self, channel: Channel) -> Option<f64> {
        let io = self.collaborators.io.as_ref();
        read_value(io, channel).await.unwrap_or_else(|e| {
            warn!("⚠️  Read failed on {}: {}", io.name(), e);
            None
        })
    }

    async fn write_channel(&self, channel: Channel, value: f64) {
        let io = self.collaborators.io.as_ref();
        if let Err(e) = write_value(io, channel, value).await {
            error!("❌ Failed to write {:.1} to {}: {}", value, io.name(), e);
        }
    }

    async fn read_snapshot(
        &self,
        now: DateTime<Utc>,
    ) -> std::result::Result<SensorSnapshot, SkipReason> {
        let indoor = self
            .read_channel(Channel::IndoorTemperature)
            .await
            .ok_or(SkipReason::MissingIndoorTemperature)?;

        let max_age = self.core.lock().config().control.max_sensor_age();
        match self.collaborators.io.last_updated(Channel::IndoorTemperature).await {
            Some(updated) if now - updated <= max_age => {}
            _ => return Err(SkipReason::StaleIndoorTemperature),
        }

        let target = self
            .read_channel(Channel::TargetIndoorTemperature)
            .await
            .ok_or(SkipReason::MissingTargetTemperature)?;
        let setpoint = self
            .read_channel(Channel::Setpoint)
            .await
            .ok_or(SkipReason::MissingSetpoint)?;

        Ok(SensorSnapshot {
            taken_at: now,
            indoor_temp_c: indoor,
            target_indoor_temp_c: target,
            current_setpoint_c: setpoint,
            outdoor_temp_c: self.read_channel(Channel::OutdoorTemperature).await,
            compressor_frequency_hz: self.read_channel(Channel::CompressorFrequency).await,
            cop: self.read_channel(Channel::Cop).await,
            daily_cop: self.read_channel(Channel::DailyCop).await,
            cop_confidence: self
                .read_channel(Channel::CopConfidence)
                .await
                .map_or(CopConfidence::None, CopConfidence::from_score),
            humidity_percent: self.read_channel(Channel::Humidity).await,
            heat_output_kw: self.read_channel(Channel::HeatOutput).await,
        })
    }

    async fn model_inputs(&self, snapshot: &SensorSnapshot) -> ModelInputs {
        let mut inputs = ModelInputs::default();

        if let Some(model) = &self.collaborators.building_model {
            inputs.tau_hours = model.tau_hours().filter(|t| t.is_finite() && *t > 0.0);
            inputs.ua_kw_per_c = model.ua_kw_per_c().filter(|ua| ua.is_finite() && *ua > 0.0);
            inputs.confidence = Some(model.confidence());
            inputs.predicted_loss_kw = snapshot
                .outdoor_temp_c
                .and_then(|outdoor| model.predicted_heat_loss_kw(snapshot.indoor_temp_c, outdoor));
        }

        if let Some(advisor) = &self.collaborators.thermal_advisor {
            inputs.external_thermal = match advisor.recommend(snapshot).await {
                Ok(recommendation) => recommendation,
                Err(e) => {
                    warn!("⚠️  Thermal advisor failed, no contribution: {:#}", e);
                    None
                }
            };
        }

        inputs
    }
}
