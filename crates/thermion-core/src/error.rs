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

//! Error types for the controller core

use thermion_types::ValidationError;
use thiserror::Error;

use crate::traits::Channel;

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("invalid input for {advisor}: {message}")]
    InvalidInput {
        advisor: &'static str,
        message: String,
    },

    #[error("persistence error for key '{key}': {source}")]
    Persistence {
        key: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("state serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("setpoint I/O error on {channel}: {source}")]
    SetpointIo {
        channel: Channel,
        #[source]
        source: anyhow::Error,
    },
}

pub type Result<T> = std::result::Result<T, ControllerError>;

/// Reject non-finite advisor inputs with a descriptive error
pub(crate) fn ensure_finite(advisor: &'static str, name: &str, value: f64) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ControllerError::InvalidInput {
            advisor,
            message: format!("{name} is not finite ({value})"),
        })
    }
}
