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

//! Collaborator seams of the controller.
//!
//! The core never talks to a device, a database or a thermal-model estimator
//! directly. Everything outside the control math sits behind these traits.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ControllerError;

/// Logical value channels exposed by the heat pump integration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    IndoorTemperature,
    TargetIndoorTemperature,
    /// Supply (flow) temperature setpoint, the actuated value
    Setpoint,
    OutdoorTemperature,
    CompressorFrequency,
    Cop,
    DailyCop,
    /// COP confidence score in [0, 1]
    CopConfidence,
    Humidity,
    /// Measured heat output (kW)
    HeatOutput,
    /// Setpoint the controller currently recommends
    RecommendedSetpoint,
    /// Mirror written instead of `Setpoint` in recommend-only mode
    SimulatedSetpoint,
}

impl Channel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::IndoorTemperature => "indoor_temperature",
            Self::TargetIndoorTemperature => "target_indoor_temperature",
            Self::Setpoint => "setpoint",
            Self::OutdoorTemperature => "outdoor_temperature",
            Self::CompressorFrequency => "compressor_frequency",
            Self::Cop => "cop",
            Self::DailyCop => "daily_cop",
            Self::CopConfidence => "cop_confidence",
            Self::Humidity => "humidity",
            Self::HeatOutput => "heat_output",
            Self::RecommendedSetpoint => "recommended_setpoint",
            Self::SimulatedSetpoint => "simulated_setpoint",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read/write access to the heat pump's values
#[async_trait]
pub trait SetpointIo: Send + Sync {
    /// Current value of a channel, `None` when the device does not provide it
    async fn get_value(&self, channel: Channel) -> Result<Option<f64>>;

    /// Write a value to a channel
    async fn set_value(&self, channel: Channel, value: f64) -> Result<()>;

    /// When the channel last reported a value (health check)
    async fn last_updated(&self, channel: Channel) -> Option<DateTime<Utc>>;

    /// Name for logging
    fn name(&self) -> &str;
}

/// Read a channel; non-finite values count as missing
pub async fn read_value(
    io: &dyn SetpointIo,
    channel: Channel,
) -> crate::error::Result<Option<f64>> {
    io.get_value(channel)
        .await
        .map(|value| value.filter(|v| v.is_finite()))
        .map_err(|source| ControllerError::SetpointIo { channel, source })
}

pub async fn write_value(
    io: &dyn SetpointIo,
    channel: Channel,
    value: f64,
) -> crate::error::Result<()> {
    io.set_value(channel, value)
        .await
        .map_err(|source| ControllerError::SetpointIo { channel, source })
}

/// Abstract key/value persistence
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>>;

    async fn set(&self, key: &str, value: serde_json::Value) -> Result<()>;

    async fn remove(&self, key: &str) -> Result<()>;
}

/// Output of the external building thermal model
pub trait BuildingModel: Send + Sync {
    /// Thermal time constant (hours)
    fn tau_hours(&self) -> Option<f64>;

    /// Heat loss coefficient (kW/°C)
    fn ua_kw_per_c(&self) -> Option<f64>;

    /// Confidence of the identified model, [0, 1]
    fn confidence(&self) -> f64;

    /// Heat loss the model predicts for the given temperatures (kW)
    fn predicted_heat_loss_kw(&self, indoor_temp_c: f64, outdoor_temp_c: f64) -> Option<f64> {
        self.ua_kw_per_c()
            .map(|ua| ua * (indoor_temp_c - outdoor_temp_c).max(0.0))
    }
}

/// Recommendation of the external thermal advisor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThermalRecommendation {
    pub adjustment_c: f64,
    pub reason: String,
}

/// External thermal-model advisor, passed through into fusion
#[async_trait]
pub trait ThermalAdvisor: Send + Sync {
    async fn recommend(
        &self,
        snapshot: &thermion_types::SensorSnapshot,
    ) -> Result<Option<ThermalRecommendation>>;
}

/// Building model with fixed parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StaticBuildingModel {
    pub tau_hours: Option<f64>,
    pub ua_kw_per_c: Option<f64>,
    pub confidence: f64,
}

impl BuildingModel for StaticBuildingModel {
    fn tau_hours(&self) -> Option<f64> {
        self.tau_hours
    }

    fn ua_kw_per_c(&self) -> Option<f64> {
        self.ua_kw_per_c
    }

    fn confidence(&self) -> f64 {
        self.confidence
    }
}
