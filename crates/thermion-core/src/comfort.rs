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

//! Comfort loop: PI control on indoor temperature error.

use std::collections::VecDeque;

use thermion_types::{
    ActionPriority, ComfortConfig, ControllerAction, PiParameters, ValidationError,
};
use tracing::{debug, info, trace};

use crate::error::{Result, ensure_finite};

/// Upper bound of the widened deadband when the building's UA is known
const MAX_ADAPTIVE_DEADBAND_C: f64 = 0.8;

/// Errors at or above this are urgent; below it the overshoot window applies
const HIGH_PRIORITY_ERROR_C: f64 = 2.0;

const LOW_PRIORITY_ERROR_C: f64 = 0.5;

#[derive(Debug, Clone)]
pub struct ComfortController {
    params: PiParameters,
    config: ComfortConfig,
    error_history: VecDeque<f64>,
    unsaved_history: bool,
}

impl ComfortController {
    pub fn new(config: &ComfortConfig) -> std::result::Result<Self, ValidationError> {
        let params = PiParameters::new(config.kp, config.ki, config.deadband_c)?;
        Ok(Self {
            params,
            config: config.clone(),
            error_history: VecDeque::with_capacity(config.history_len),
            unsaved_history: false,
        })
    }

    pub fn parameters(&self) -> PiParameters {
        self.params
    }

    /// Replace the PI parameters. On error the previous parameters stay.
    pub fn update_parameters(
        &mut self,
        kp: f64,
        ki: f64,
        deadband_c: f64,
    ) -> std::result::Result<(), ValidationError> {
        self.params = PiParameters::new(kp, ki, deadband_c)?;
        info!(
            "✅ PI parameters updated: Kp={:.2}, Ki={:.2}, deadband={:.2}°C",
            kp, ki, deadband_c
        );
        Ok(())
    }

    /// Static deadband, widened for leaky buildings when UA is known
    pub fn effective_deadband(&self, ua_kw_per_c: Option<f64>) -> f64 {
        match ua_kw_per_c {
            Some(ua) if ua.is_finite() && ua > 0.0 => self
                .params
                .deadband_c
                .max(MAX_ADAPTIVE_DEADBAND_C.min(ua * 0.5 + 0.25)),
            _ => self.params.deadband_c,
        }
    }

    /// Compute the comfort action for this cycle.
    ///
    /// Returns `Ok(None)` inside the deadband, inside the overshoot margin,
    /// or when the PI output is too small to matter. Only the PI path
    /// appends the error to the integral history.
    pub fn compute_action(
        &mut self,
        indoor_temp_c: f64,
        target_temp_c: f64,
        thermal_inertia_hours: Option<f64>,
        ua_kw_per_c: Option<f64>,
    ) -> Result<Option<ControllerAction>> {
        ensure_finite("comfort", "indoor temperature", indoor_temp_c)?;
        ensure_finite("comfort", "target temperature", target_temp_c)?;

        let error = target_temp_c - indoor_temp_c;

        if let Some(tau) = thermal_inertia_hours
            && tau.is_finite()
            && tau > 0.0
            && error > 0.0
            && error < HIGH_PRIORITY_ERROR_C
        {
            let margin = tau * self.config.heating_rate_c_per_h * self.config.overshoot_factor;
            if error <= margin {
                debug!(
                    "Comfort: error {:.2}°C within overshoot margin {:.2}°C (tau {:.1}h), holding",
                    error, margin, tau
                );
                return Ok(None);
            }
        }

        let deadband = self.effective_deadband(ua_kw_per_c);
        if error.abs() < deadband {
            trace!(
                "Comfort: error {:.2}°C inside deadband {:.2}°C",
                error, deadband
            );
            return Ok(None);
        }

        self.error_history.push_back(error);
        self.unsaved_history = true;
        while self.error_history.len() > self.config.history_len.max(1) {
            self.error_history.pop_front();
        }

        let p_term = self.params.kp * error;
        let i_term = self.params.ki * self.mean_error();
        let limit = self.config.max_adjustment_c;
        let adjustment = (p_term + i_term).clamp(-limit, limit);

        if adjustment.abs() < self.config.min_adjustment_c {
            debug!(
                "Comfort: PI output {:+.3}°C below minimum step, no action",
                adjustment
            );
            return Ok(None);
        }

        let priority = priority_for_error(error);
        let reason = format!(
            "Indoor {indoor_temp_c:.1}°C vs target {target_temp_c:.1}°C (error {error:+.2}°C): P={p_term:+.2}, I={i_term:+.2}"
        );
        debug!(
            "🌡️  Comfort: {:+.2}°C ({}) {}",
            adjustment, priority, reason
        );

        Ok(Some(ControllerAction::Comfort {
            adjustment_c: adjustment,
            reason,
            priority,
        }))
    }

    fn mean_error(&self) -> f64 {
        if self.error_history.is_empty() {
            return 0.0;
        }
        self.error_history.iter().sum::<f64>() / self.error_history.len() as f64
    }

    /// Whether the error history changed since the last call
    pub fn take_unsaved_history(&mut self) -> bool {
        std::mem::take(&mut self.unsaved_history)
    }

    pub fn error_history(&self) -> Vec<f64> {
        self.error_history.iter().copied().collect()
    }

    /// Restore persisted history, keeping the newest samples that fit
    pub fn restore_history(&mut self, history: Vec<f64>) {
        let cap = self.config.history_len.max(1);
        let skip = history.len().saturating_sub(cap);
        self.error_history = history
            .into_iter()
            .skip(skip)
            .filter(|e| e.is_finite())
            .collect();
    }

    pub fn clear_history(&mut self) {
        self.error_history.clear();
        self.unsaved_history = false;
    }
}

pub(crate) fn priority_for_error(error: f64) -> ActionPriority {
    let magnitude = error.abs();
    if magnitude >= HIGH_PRIORITY_ERROR_C {
        ActionPriority::High
    } else if magnitude < LOW_PRIORITY_ERROR_C {
        ActionPriority::Low
    } else {
        ActionPriority::Medium
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> ComfortController {
        ComfortController::new(&ComfortConfig::default()).unwrap()
    }

    fn adjustment(action: &ControllerAction) -> f64 {
        action.signed_adjustment_c()
    }

    #[test]
    fn test_deadband_boundary() {
        let mut comfort = controller();
        assert!(comfort.compute_action(20.8, 21.0, None, None).unwrap().is_none());
        assert!(comfort.error_history().is_empty());

        let action = comfort.compute_action(20.69, 21.0, None, None).unwrap();
        assert!(action.is_some());
        assert_eq!(comfort.error_history().len(), 1);
    }

    #[test]
    fn test_pi_output_clamped() {
        let mut comfort = controller();
        let action = comfort.compute_action(11.0, 21.0, None, None).unwrap().unwrap();
        assert_eq!(adjustment(&action), 3.0);
        assert_eq!(action.priority(), Some(ActionPriority::High));

        let action = comfort.compute_action(31.0, 21.0, None, None).unwrap().unwrap();
        assert_eq!(adjustment(&action), -3.0);
    }

    #[test]
    fn test_integral_uses_history_mean() {
        let mut comfort = controller();
        comfort.restore_history(vec![0.2, 0.2]);
        let action = comfort.compute_action(20.6, 21.0, None, None).unwrap().unwrap();
        // P = 3 * 0.4, I = 1.5 * mean(0.2, 0.2, 0.4)
        let expected = 1.2 + 1.5 * (0.8 / 3.0);
        assert!((adjustment(&action) - expected).abs() < 1e-9);
        assert_eq!(action.priority(), Some(ActionPriority::Low));
    }

    #[test]
    fn test_overshoot_suppression() {
        let mut comfort = controller();
        // margin = 10h * 0.3 * 0.2 = 0.6
        assert!(comfort.compute_action(20.5, 21.0, Some(10.0), None).unwrap().is_none());
        assert!(comfort.compute_action(20.0, 21.0, Some(10.0), None).unwrap().is_some());
        // cooling side is never suppressed
        assert!(comfort.compute_action(21.5, 21.0, Some(10.0), None).unwrap().is_some());
        // at 2.0°C the window no longer applies
        assert!(comfort.compute_action(19.0, 21.0, Some(40.0), None).unwrap().is_some());
    }

    #[test]
    fn test_effective_deadband_widens_with_ua() {
        let comfort = controller();
        assert_eq!(comfort.effective_deadband(None), 0.3);
        assert!((comfort.effective_deadband(Some(0.5)) - 0.5).abs() < 1e-9);
        assert_eq!(comfort.effective_deadband(Some(5.0)), 0.8);
        assert_eq!(comfort.effective_deadband(Some(0.01)), 0.3);
    }

    #[test]
    fn test_priority_bands() {
        assert_eq!(priority_for_error(2.0), ActionPriority::High);
        assert_eq!(priority_for_error(-2.5), ActionPriority::High);
        assert_eq!(priority_for_error(1.0), ActionPriority::Medium);
        assert_eq!(priority_for_error(0.4), ActionPriority::Low);
    }

    #[test]
    fn test_invalid_update_keeps_previous() {
        let mut comfort = controller();
        assert!(comfort.update_parameters(12.0, 1.0, 0.3).is_err());
        assert!(comfort.update_parameters(2.0, 1.0, 0.05).is_err());
        assert_eq!(comfort.parameters(), ComfortConfig::default().pi());

        comfort.update_parameters(2.0, 1.0, 0.5).unwrap();
        assert_eq!(comfort.parameters().kp, 2.0);
        assert!(comfort.compute_action(20.6, 21.0, None, None).unwrap().is_none());
    }

    #[test]
    fn test_history_capped() {
        let mut comfort = controller();
        for _ in 0..40 {
            comfort.compute_action(20.0, 21.0, None, None).unwrap();
        }
        assert_eq!(comfort.error_history().len(), 24);

        comfort.restore_history((0..30).map(f64::from).collect());
        let history = comfort.error_history();
        assert_eq!(history.len(), 24);
        assert_eq!(history[0], 6.0);
    }

    #[test]
    fn test_sub_minimum_output_still_marks_history() {
        let config = ComfortConfig {
            kp: 0.1,
            ki: 0.1,
            deadband_c: 0.1,
            ..ComfortConfig::default()
        };
        let mut comfort = ComfortController::new(&config).unwrap();

        // 0.04 P + 0.04 I is below the 0.1 minimum step
        assert!(comfort.compute_action(20.6, 21.0, None, None).unwrap().is_none());
        assert_eq!(comfort.error_history().len(), 1);
        assert!(comfort.take_unsaved_history());
        assert!(!comfort.take_unsaved_history());

        // deadband hits leave the history alone
        assert!(comfort.compute_action(21.0, 21.0, None, None).unwrap().is_none());
        assert!(!comfort.take_unsaved_history());
    }

    #[test]
    fn test_non_finite_input_rejected() {
        let mut comfort = controller();
        assert!(comfort.compute_action(f64::NAN, 21.0, None, None).is_err());
        assert!(comfort.error_history().is_empty());
    }
}
