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

//! Online learners binned by outdoor temperature

pub mod bucketed;
pub mod defrost;
pub mod efficiency;

pub use bucketed::{BucketModel, BucketedLearner};
pub use defrost::{DefrostModel, DefrostPenaltyLearner, PenaltyEstimate, PenaltySource};
pub use efficiency::{EfficiencyLearner, EfficiencyModel};
