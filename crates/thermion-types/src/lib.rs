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

//! Shared data model of the ThermION heat-pump controller.
//!
//! Everything here is plain data: sensor snapshots, advisor actions, weights,
//! price series, learner state, status and configuration. No I/O.

pub mod action;
pub mod config;
pub mod error;
pub mod learning;
pub mod pricing;
pub mod sensors;
pub mod status;
pub mod validation;
pub mod weights;

pub use action::{
    ActionCategory, ActionPriority, CategoryValues, CombinedAction, ControllerAction,
    CostDirection, EfficiencyDirection,
};
pub use config::{
    ComfortConfig, ControlConfig, ControllerConfig, DefrostConfig, EfficiencyConfig,
    LearnerConfig, LearningConfig, OptimizationStrategy, PiParameters, PriceConfig, WindConfig,
};
pub use error::ValidationError;
pub use learning::{
    AlphaSource, ConfidenceTier, CopBucketStats, DefrostObservation, EfficiencySample,
    LearnerState, LearnerSummary, LearningBucket, LookupMethod, LookupResult, WindAlphaState,
    WindCorrection,
};
pub use pricing::{
    DailyDeviation, PriceAnalytics, PriceBand, PriceBlock, PriceDataPoint, PriceSample,
    PriceStatistics, PriceThresholds, PriceTrend, TrendDirection, hour_start,
};
pub use sensors::{CopConfidence, SensorSnapshot};
pub use status::{
    AccumulatorState, ControlState, ControllerStatus, CycleOutcome, SkipReason, WindStatus,
};
pub use validation::{ValidationIssue, ValidationResult, ValidationSeverity};
pub use weights::{ConfidenceMetrics, PriorityWeights, RawPriorityWeights};
