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


//! Adaptive supply-temperature controller for heat pumps.
//!
//! [`ControlLoop`] owns the advisors (comfort PI, efficiency, price, thermal),
//! the learners behind them, and the accumulator that turns fused fractional
//! adjustments into integer setpoint steps.

pub mod comfort;
pub mod control_loop;
pub mod efficiency;
pub mod error;
pub mod fusion;
pub mod learning;
pub mod persistence;
pub mod pricing;
pub mod traits;
pub mod wind;

pub use comfort::ComfortController;
pub use control_loop::{Collaborators, ControlLoop};
pub use efficiency::EfficiencyAdvisor;
pub use error::{ControllerError, Result};
pub use fusion::{AdvisorOutputs, DecisionFuser};
pub use learning::{
    BucketModel, BucketedLearner, DefrostModel, DefrostPenaltyLearner, EfficiencyLearner,
    EfficiencyModel, PenaltyEstimate, PenaltySource,
};
pub use persistence::{JsonFileStore, MemoryStore};
pub use pricing::{PriceAdvisor, PriceClassifier};
pub use traits::{
    BuildingModel, Channel, SetpointIo, StateStore, StaticBuildingModel, ThermalAdvisor,
    ThermalRecommendation,
};
pub use wind::{WindLossEstimator, WindLossSample};

pub use thermion_types;
