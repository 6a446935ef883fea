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

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use crate::error::{ValidationError, ensure_in_range};
use crate::pricing::PriceThresholds;
use crate::validation::ValidationResult;
use crate::weights::PriorityWeights;

// ============= Controller Configuration =============

/// Complete configuration of one heat-pump controller instance
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ControllerConfig {
    #[serde(default)]
    pub comfort: ComfortConfig,
    #[serde(default)]
    pub efficiency: EfficiencyConfig,
    #[serde(default)]
    pub price: PriceConfig,
    #[serde(default)]
    pub learning: LearningConfig,
    #[serde(default)]
    pub defrost: DefrostConfig,
    #[serde(default)]
    pub wind: WindConfig,
    #[serde(default)]
    pub control: ControlConfig,
    #[serde(default)]
    pub priorities: PriorityWeights,
}

impl ControllerConfig {
    /// Parse a TOML document and validate it
    pub fn from_toml_str(source: &str) -> Result<Self, ValidationError> {
        let config: Self =
            toml::from_str(source).map_err(|e| ValidationError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize back to TOML
    pub fn to_toml_string(&self) -> Result<String, ValidationError> {
        toml::to_string_pretty(self).map_err(|e| ValidationError::Parse(e.to_string()))
    }

    /// Validate and return the first error, if any
    pub fn validate(&self) -> Result<(), ValidationError> {
        let result = self.validate_detailed();
        match result.errors.into_iter().next() {
            Some(issue) => Err(ValidationError::Config {
                field: issue.field,
                message: issue.message,
            }),
            None => Ok(()),
        }
    }

    /// Validate every section, collecting all errors and warnings
    pub fn validate_detailed(&self) -> ValidationResult {
        let mut result = ValidationResult::success();

        let c = &self.comfort;
        result.check_range("comfort.kp", c.kp, PiParameters::GAIN_MIN, PiParameters::GAIN_MAX);
        result.check_range("comfort.ki", c.ki, PiParameters::GAIN_MIN, PiParameters::GAIN_MAX);
        result.check_range(
            "comfort.deadband_c",
            c.deadband_c,
            PiParameters::DEADBAND_MIN,
            PiParameters::DEADBAND_MAX,
        );
        if c.history_len == 0 {
            result.add_error("comfort.history_len", "must be at least 1");
        }
        result.check_range("comfort.max_adjustment_c", c.max_adjustment_c, 0.1, 10.0);
        result.check_range("comfort.min_adjustment_c", c.min_adjustment_c, 0.0, c.max_adjustment_c);

        let e = &self.efficiency;
        result.check_range("efficiency.min_acceptable_cop", e.min_acceptable_cop, 1.0, 8.0);
        result.check_range("efficiency.target_cop", e.target_cop, 1.0, 10.0);
        if e.target_cop <= e.min_acceptable_cop {
            result.add_error(
                "efficiency.target_cop",
                "must be greater than efficiency.min_acceptable_cop",
            );
        }
        result.check_range("efficiency.low_cop_deviation_c", e.low_cop_deviation_c, 0.0, 20.0);
        result.check_range(
            "efficiency.near_target_deviation_c",
            e.near_target_deviation_c,
            0.0,
            20.0,
        );

        let p = &self.price;
        if let Err(ValidationError::Config { field, message }) = p.thresholds.validate() {
            result.add_error(field, message);
        }
        result.check_range("price.max_preheat_offset_c", p.max_preheat_offset_c, 0.0, 10.0);
        result.check_range("price.max_reduce_offset_c", p.max_reduce_offset_c, 0.0, 10.0);
        if p.block_hours == 0 {
            result.add_error("price.block_hours", "must be at least 1");
        }
        if p.trend_hours < 2 {
            result.add_error("price.trend_hours", "must be at least 2");
        }

        for (name, learner) in [
            ("learning.efficiency", &self.learning.efficiency),
            ("learning.defrost", &self.learning.defrost),
        ] {
            result.check_range(&format!("{name}.bucket_width"), learner.bucket_width, 0.1, 20.0);
            if learner.history_cap == 0 {
                result.add_error(format!("{name}.history_cap"), "must be at least 1");
            }
            if learner.min_samples == 0 {
                result.add_error(format!("{name}.min_samples"), "must be at least 1");
            }
            if learner.high_confidence_samples < learner.min_samples {
                result.add_warning(
                    format!("{name}.high_confidence_samples"),
                    "lower than min_samples; every qualifying bucket will be high confidence",
                );
            }
        }

        let d = &self.defrost;
        if d.min_event_secs >= d.max_event_secs {
            result.add_error("defrost.min_event_secs", "must be below defrost.max_event_secs");
        }
        result.check_range("defrost.min_penalty_factor", d.min_penalty_factor, 0.5, 1.0);
        result.check_range("defrost.window_hours", d.window_hours, 0.25, 24.0);

        let w = &self.wind;
        if w.alpha_min >= w.alpha_max {
            result.add_error("wind.alpha_min", "must be below wind.alpha_max");
        }
        result.check_range("wind.default_alpha", w.default_alpha, w.alpha_min, w.alpha_max);
        result.check_range("wind.learning_rate", w.learning_rate, 0.0, 1.0);
        if w.scale <= 0.0 {
            result.add_error("wind.scale", "must be positive");
        }
        if let Some(manual) = w.manual_alpha {
            result.check_range("wind.manual_alpha", manual, 0.0, w.alpha_max);
        }

        let ctl = &self.control;
        if ctl.interval_secs == 0 {
            result.add_error("control.interval_secs", "must be at least 1");
        }
        if !(0..=MAX_CONTROL_MINUTES).contains(&ctl.min_adjustment_interval_minutes) {
            result.add_error(
                "control.min_adjustment_interval_minutes",
                format!("must be within [0, {MAX_CONTROL_MINUTES}]"),
            );
        }
        if !(1..=MAX_CONTROL_MINUTES).contains(&ctl.max_sensor_age_minutes) {
            result.add_error(
                "control.max_sensor_age_minutes",
                format!("must be within [1, {MAX_CONTROL_MINUTES}]"),
            );
        }
        if ctl.min_setpoint_c >= ctl.max_setpoint_c {
            result.add_error("control.min_setpoint_c", "must be below control.max_setpoint_c");
        }
        if !ctl.auto_apply {
            result.add_warning(
                "control.auto_apply",
                "recommend-only mode, adjustments go to the simulated setpoint",
            );
        }

        result
    }
}

// ============= Comfort (PI loop) =============

/// Tunable PI parameters, validated as a unit
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PiParameters {
    pub kp: f64,
    pub ki: f64,
    pub deadband_c: f64,
}

impl PiParameters {
    pub const GAIN_MIN: f64 = 0.1;
    pub const GAIN_MAX: f64 = 10.0;
    pub const DEADBAND_MIN: f64 = 0.1;
    pub const DEADBAND_MAX: f64 = 2.0;

    /// Validate gains in [0.1, 10] and deadband in [0.1, 2.0]
    pub fn new(kp: f64, ki: f64, deadband_c: f64) -> Result<Self, ValidationError> {
        ensure_in_range("kp", kp, Self::GAIN_MIN, Self::GAIN_MAX)?;
        ensure_in_range("ki", ki, Self::GAIN_MIN, Self::GAIN_MAX)?;
        ensure_in_range(
            "deadband",
            deadband_c,
            Self::DEADBAND_MIN,
            Self::DEADBAND_MAX,
        )?;
        Ok(Self { kp, ki, deadband_c })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ComfortConfig {
    /// Proportional gain
    pub kp: f64,
    /// Integral gain
    pub ki: f64,
    /// Static deadband on indoor temperature error (°C)
    pub deadband_c: f64,
    /// Error samples kept for the integral term
    pub history_len: usize,
    /// Output clamp (± °C)
    pub max_adjustment_c: f64,
    /// Outputs smaller than this are dropped (°C)
    pub min_adjustment_c: f64,
    /// Assumed indoor heating rate for overshoot prediction (°C/h)
    pub heating_rate_c_per_h: f64,
    /// Share of the inertia-driven rise counted as overshoot margin
    pub overshoot_factor: f64,
}

impl ComfortConfig {
    pub fn pi(&self) -> PiParameters {
        PiParameters {
            kp: self.kp,
            ki: self.ki,
            deadband_c: self.deadband_c,
        }
    }
}

impl Default for ComfortConfig {
    fn default() -> Self {
        Self {
            kp: 3.0,
            ki: 1.5,
            deadband_c: 0.3,
            history_len: 24,
            max_adjustment_c: 3.0,
            min_adjustment_c: 0.1,
            heating_rate_c_per_h: 0.3,
            overshoot_factor: 0.2,
        }
    }
}

// ============= Efficiency (COP optimization) =============

/// How fast the efficiency advisor may move the supply temperature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizationStrategy {
    Conservative,
    #[default]
    Balanced,
    Aggressive,
}

impl OptimizationStrategy {
    /// Maximum supply-temperature change per cycle (°C)
    pub fn max_rate_c(self) -> f64 {
        match self {
            Self::Conservative => 1.0,
            Self::Balanced => 2.0,
            Self::Aggressive => 3.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EfficiencyConfig {
    pub enabled: bool,
    pub strategy: OptimizationStrategy,
    /// Below this COP the advisor acts with high priority
    pub min_acceptable_cop: f64,
    /// COP the advisor aims for
    pub target_cop: f64,
    /// Minimum distance to the learned optimum before acting on low COP (°C)
    pub low_cop_deviation_c: f64,
    /// Minimum distance to the learned optimum before acting near target (°C)
    pub near_target_deviation_c: f64,
    /// Heuristic supply reduction without learned data (°C)
    pub fallback_step_c: f64,
    /// Heuristic supply reduction without learned data, aggressive strategy (°C)
    pub aggressive_fallback_step_c: f64,
    /// COP readings above this are treated as sensor noise
    pub max_plausible_cop: f64,
}

impl Default for EfficiencyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            strategy: OptimizationStrategy::Balanced,
            min_acceptable_cop: 2.5,
            target_cop: 3.5,
            low_cop_deviation_c: 2.0,
            near_target_deviation_c: 3.0,
            fallback_step_c: 2.0,
            aggressive_fallback_step_c: 3.0,
            max_plausible_cop: 10.0,
        }
    }
}

// ============= Price =============

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PriceConfig {
    pub enabled: bool,
    /// Indoor headroom used for preheating in the cheapest band (°C)
    pub max_preheat_offset_c: f64,
    /// Indoor headroom given up in the most expensive band (°C)
    pub max_reduce_offset_c: f64,
    /// Length of the cheapest / most expensive block search (hours)
    pub block_hours: usize,
    /// Hours ahead used for the trend regression
    pub trend_hours: usize,
    /// Trend is reported only above this R²
    pub trend_min_confidence: f64,
    /// Slopes below this magnitude are reported as stable (per hour)
    pub trend_stable_slope: f64,
    /// Relative deviation from the daily average considered significant
    pub daily_deviation_tolerance: f64,
    /// Band thresholds (per kWh)
    pub thresholds: PriceThresholds,
}

impl Default for PriceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_preheat_offset_c: 1.5,
            max_reduce_offset_c: 1.0,
            block_hours: 3,
            trend_hours: 6,
            trend_min_confidence: 0.5,
            trend_stable_slope: 0.005,
            daily_deviation_tolerance: 0.2,
            thresholds: PriceThresholds::default(),
        }
    }
}

// ============= Learning =============

/// Shape of one bucketed learner
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LearnerConfig {
    /// Width of a control-variable bucket
    pub bucket_width: f64,
    /// FIFO history length
    pub history_cap: usize,
    /// Samples before a bucket qualifies for lookup
    pub min_samples: usize,
    /// Samples for a high confidence bucket
    pub high_confidence_samples: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningConfig {
    pub efficiency: LearnerConfig,
    pub defrost: LearnerConfig,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            efficiency: LearnerConfig {
                bucket_width: 2.0,
                history_cap: 500,
                min_samples: 5,
                high_confidence_samples: 15,
            },
            defrost: LearnerConfig {
                bucket_width: 2.0,
                history_cap: 200,
                min_samples: 5,
                high_confidence_samples: 15,
            },
        }
    }
}

// ============= Defrost =============

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DefrostConfig {
    /// Shorter events are dropped as sensor glitches (seconds)
    pub min_event_secs: f64,
    /// Longer events are dropped as implausible (seconds)
    pub max_event_secs: f64,
    /// Operational time per recorded observation (hours)
    pub window_hours: f64,
    /// Lowest COP penalty factor (1.0 = no penalty)
    pub min_penalty_factor: f64,
    /// Peak penalty of the analytic fallback
    pub fallback_max_penalty: f64,
    /// Outdoor temperature where frosting peaks (°C)
    pub fallback_peak_temp_c: f64,
    /// Half width of the frosting tent (°C)
    pub fallback_half_width_c: f64,
    /// Humidity assumed when no sensor is available (%)
    pub default_humidity_percent: f64,
}

impl Default for DefrostConfig {
    fn default() -> Self {
        Self {
            min_event_secs: 30.0,
            max_event_secs: 1800.0,
            window_hours: 1.0,
            min_penalty_factor: 0.80,
            fallback_max_penalty: 0.15,
            fallback_peak_temp_c: 1.0,
            fallback_half_width_c: 8.0,
            default_humidity_percent: 80.0,
        }
    }
}

// ============= Wind =============

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindConfig {
    pub enabled: bool,
    /// Minimum wind speed for learning (km/h)
    pub min_wind_kmh: f64,
    /// Minimum indoor-outdoor difference for learning (°C)
    pub min_delta_t_c: f64,
    /// Normalisation constant of the wind model
    pub scale: f64,
    pub default_alpha: f64,
    /// EMA learning rate
    pub learning_rate: f64,
    /// Implied alpha sanity band
    pub alpha_min: f64,
    pub alpha_max: f64,
    /// Samples before the learned alpha replaces the default
    pub min_learned_samples: u32,
    /// Correction cap (°C)
    pub max_correction_c: f64,
    /// User override, takes precedence over learned and default alpha
    pub manual_alpha: Option<f64>,
}

impl Default for WindConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_wind_kmh: 5.0,
            min_delta_t_c: 5.0,
            scale: 100.0,
            default_alpha: 0.05,
            learning_rate: 0.05,
            alpha_min: 0.001,
            alpha_max: 0.5,
            min_learned_samples: 10,
            max_correction_c: 2.0,
            manual_alpha: None,
        }
    }
}

// ============= Control Loop =============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlConfig {
    /// Cycle period (seconds)
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Minimum time between two applied adjustments (minutes)
    #[serde(default = "default_min_adjustment_interval_minutes")]
    pub min_adjustment_interval_minutes: i64,

    /// Hard safety range of the supply setpoint (°C)
    #[serde(default = "default_min_setpoint")]
    pub min_setpoint_c: f64,
    #[serde(default = "default_max_setpoint")]
    pub max_setpoint_c: f64,

    /// Write to the real setpoint; otherwise only the simulated mirror is written
    #[serde(default)]
    pub auto_apply: bool,

    /// Indoor readings older than this abort the cycle (minutes)
    #[serde(default = "default_max_sensor_age_minutes")]
    pub max_sensor_age_minutes: i64,

    /// Fused adjustments below this are ignored when comfort is idle (°C)
    #[serde(default = "default_idle_threshold")]
    pub idle_threshold_c: f64,
}

/// Upper bound for the minute-valued control settings (one day)
pub const MAX_CONTROL_MINUTES: i64 = 24 * 60;

fn default_interval_secs() -> u64 {
    300
}
fn default_min_adjustment_interval_minutes() -> i64 {
    15
}
fn default_min_setpoint() -> f64 {
    25.0
}
fn default_max_setpoint() -> f64 {
    65.0
}
fn default_max_sensor_age_minutes() -> i64 {
    15
}
fn default_idle_threshold() -> f64 {
    0.1
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            min_adjustment_interval_minutes: default_min_adjustment_interval_minutes(),
            min_setpoint_c: default_min_setpoint(),
            max_setpoint_c: default_max_setpoint(),
            auto_apply: false,
            max_sensor_age_minutes: default_max_sensor_age_minutes(),
            idle_threshold_c: default_idle_threshold(),
        }
    }
}

impl ControlConfig {
    /// Minimum wait between applied adjustments; out-of-range values fall back to the default
    pub fn min_adjustment_interval(&self) -> TimeDelta {
        minutes_or_default(
            self.min_adjustment_interval_minutes,
            default_min_adjustment_interval_minutes(),
        )
    }

    /// Maximum indoor reading age; out-of-range values fall back to the default
    pub fn max_sensor_age(&self) -> TimeDelta {
        minutes_or_default(self.max_sensor_age_minutes, default_max_sensor_age_minutes())
    }
}

fn minutes_or_default(minutes: i64, default: i64) -> TimeDelta {
    if (0..=MAX_CONTROL_MINUTES).contains(&minutes)
        && let Some(delta) = TimeDelta::try_minutes(minutes)
    {
        return delta;
    }
    TimeDelta::try_minutes(default).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ControllerConfig::default();
        let result = config.validate_detailed();
        assert!(result.valid, "errors: {:?}", result.errors);
        // Recommend-only mode is the default and is flagged
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_from_toml_partial_sections() {
        let config = ControllerConfig::from_toml_str(
            r#"
            [comfort]
            kp = 2.0

            [control]
            auto_apply = true
            interval_secs = 120

            [priorities]
            comfort = 6.0
            efficiency = 2.5
            cost = 1.5
            thermal = 0.0
            "#,
        )
        .unwrap();

        assert_eq!(config.comfort.kp, 2.0);
        assert_eq!(config.comfort.ki, 1.5);
        assert!(config.control.auto_apply);
        assert_eq!(config.control.interval_secs, 120);
        assert_eq!(config.control.min_setpoint_c, 25.0);
        assert!((config.priorities.comfort() - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_minute_settings_are_bounded() {
        let mut config = ControllerConfig::default();
        config.control.min_adjustment_interval_minutes = i64::MAX;
        config.control.max_sensor_age_minutes = -5;

        let result = config.validate_detailed();
        let fields: Vec<&str> = result.errors.iter().map(|e| e.field.as_str()).collect();
        assert!(fields.contains(&"control.min_adjustment_interval_minutes"));
        assert!(fields.contains(&"control.max_sensor_age_minutes"));
        assert!(config.validate().is_err());

        // accessors never overflow, even on a config that skipped validation
        assert_eq!(config.control.min_adjustment_interval(), TimeDelta::minutes(15));
        assert_eq!(config.control.max_sensor_age(), TimeDelta::minutes(15));

        config.control.min_adjustment_interval_minutes = 0;
        assert_eq!(config.control.min_adjustment_interval(), TimeDelta::zero());
    }

    #[test]
    fn test_from_toml_rejects_invalid_gain() {
        let err = ControllerConfig::from_toml_str("[comfort]\nkp = 42.0\n").unwrap_err();
        match err {
            ValidationError::Config { field, .. } => assert_eq!(field, "comfort.kp"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = ControllerConfig::default();
        let toml_str = config.to_toml_string().unwrap();
        let back = ControllerConfig::from_toml_str(&toml_str).unwrap();
        assert_eq!(back.comfort.kp, config.comfort.kp);
        assert_eq!(back.priorities, config.priorities);
        assert_eq!(back.price.thresholds, config.price.thresholds);
    }

    #[test]
    fn test_pi_parameters_validation() {
        assert!(PiParameters::new(3.0, 1.5, 0.3).is_ok());
        assert!(PiParameters::new(0.05, 1.5, 0.3).is_err());
        assert!(PiParameters::new(3.0, 11.0, 0.3).is_err());
        assert!(PiParameters::new(3.0, 1.5, 2.5).is_err());
    }

    #[test]
    fn test_strategy_rates() {
        assert_eq!(OptimizationStrategy::Conservative.max_rate_c(), 1.0);
        assert_eq!(OptimizationStrategy::Balanced.max_rate_c(), 2.0);
        assert_eq!(OptimizationStrategy::Aggressive.max_rate_c(), 3.0);
    }
}
