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

//! Wind heat-loss estimator.
//!
//! Learns one coefficient `alpha` relating wind speed to the extra heat loss
//! the building model does not predict, and turns it into a supply
//! temperature correction.

use thermion_types::{AlphaSource, WindAlphaState, WindConfig, WindCorrection, WindStatus};
use tracing::{debug, info, trace};

/// Measurements for one learning step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindLossSample {
    pub wind_speed_kmh: f64,
    pub indoor_temp_c: f64,
    pub outdoor_temp_c: f64,
    /// Heat loss predicted by the building model (kW)
    pub predicted_loss_kw: f64,
    /// Heat actually delivered (kW)
    pub actual_loss_kw: f64,
    pub ua_kw_per_c: f64,
}

#[derive(Debug, Clone)]
pub struct WindLossEstimator {
    config: WindConfig,
    state: WindAlphaState,
    last_wind_speed_kmh: Option<f64>,
    last_correction: Option<WindCorrection>,
}

impl WindLossEstimator {
    pub fn new(config: WindConfig) -> Self {
        let state = WindAlphaState {
            alpha: config.default_alpha,
            sample_count: 0,
        };
        Self {
            config,
            state,
            last_wind_speed_kmh: None,
            last_correction: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Store the latest externally supplied wind speed. Returns false if rejected.
    pub fn receive_wind_speed(&mut self, wind_speed_kmh: f64) -> bool {
        if !wind_speed_kmh.is_finite() || wind_speed_kmh < 0.0 {
            debug!("Wind: ignoring invalid wind speed {}", wind_speed_kmh);
            return false;
        }
        self.last_wind_speed_kmh = Some(wind_speed_kmh);
        true
    }

    pub fn wind_speed(&self) -> Option<f64> {
        self.last_wind_speed_kmh
    }

    /// One EMA step. Only under-prediction in real wind teaches anything;
    /// returns whether alpha moved.
    pub fn learn(&mut self, sample: &WindLossSample) -> bool {
        let delta_t = sample.indoor_temp_c - sample.outdoor_temp_c;
        if sample.wind_speed_kmh < self.config.min_wind_kmh
            || delta_t < self.config.min_delta_t_c
            || !sample.ua_kw_per_c.is_finite()
            || sample.ua_kw_per_c <= 0.0
        {
            return false;
        }

        let residual = sample.actual_loss_kw - sample.predicted_loss_kw;
        if !residual.is_finite() || residual <= 0.0 {
            trace!("Wind: residual {:.3}kW not positive, skipping", residual);
            return false;
        }

        let implied =
            residual * self.config.scale / (sample.wind_speed_kmh * delta_t * sample.ua_kw_per_c);
        if !(self.config.alpha_min..=self.config.alpha_max).contains(&implied) {
            debug!(
                "Wind: implied alpha {:.4} outside [{}, {}], dropped",
                implied, self.config.alpha_min, self.config.alpha_max
            );
            return false;
        }

        let rate = self.config.learning_rate;
        self.state.alpha = (1.0 - rate) * self.state.alpha + rate * implied;
        self.state.sample_count = self.state.sample_count.saturating_add(1);

        if self.state.sample_count == self.config.min_learned_samples {
            info!(
                "✅ Wind: learned alpha {:.4} now active after {} samples",
                self.state.alpha, self.state.sample_count
            );
        }
        true
    }

    /// Alpha in use: manual override, then learned, then default
    pub fn current_alpha(&self) -> (f64, AlphaSource) {
        if let Some(manual) = self.config.manual_alpha
            && manual.is_finite()
            && manual >= 0.0
        {
            return (manual, AlphaSource::Manual);
        }
        if self.state.sample_count >= self.config.min_learned_samples {
            (self.state.alpha, AlphaSource::Learned)
        } else {
            (self.config.default_alpha, AlphaSource::Default)
        }
    }

    /// Supply temperature correction for the given conditions, capped
    pub fn correction(
        &mut self,
        wind_speed_kmh: f64,
        indoor_temp_c: f64,
        outdoor_temp_c: f64,
    ) -> Option<WindCorrection> {
        let delta_t = indoor_temp_c - outdoor_temp_c;
        if !self.config.enabled
            || !wind_speed_kmh.is_finite()
            || !delta_t.is_finite()
            || wind_speed_kmh < self.config.min_wind_kmh
            || delta_t <= 0.0
        {
            self.last_correction = None;
            return None;
        }

        let (alpha, alpha_source) = self.current_alpha();
        let raw = alpha * wind_speed_kmh * delta_t / self.config.scale;
        let capped = raw > self.config.max_correction_c;
        let correction = WindCorrection {
            correction_c: raw.min(self.config.max_correction_c),
            capped,
            alpha,
            alpha_source,
        };
        self.last_correction = Some(correction);
        Some(correction)
    }

    pub fn state(&self) -> WindAlphaState {
        self.state
    }

    /// Restore persisted learning; out-of-band values fall back to the default
    pub fn restore_state(&mut self, state: WindAlphaState) {
        if state.alpha.is_finite()
            && (self.config.alpha_min..=self.config.alpha_max).contains(&state.alpha)
        {
            self.state = state;
        } else {
            debug!("Wind: persisted alpha {} out of band, using default", state.alpha);
            self.clear();
        }
    }

    pub fn clear(&mut self) {
        self.state = WindAlphaState {
            alpha: self.config.default_alpha,
            sample_count: 0,
        };
        self.last_correction = None;
    }

    pub fn status(&self) -> WindStatus {
        WindStatus {
            learning: self.state,
            last_wind_speed_kmh: self.last_wind_speed_kmh,
            last_correction: self.last_correction,
        }
    }
}
