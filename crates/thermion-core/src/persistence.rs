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

//! Persistence of controller state through the abstract [`StateStore`].
//!
//! Failures never abort a control cycle: loads fall back to a fresh state and
//! saves are best effort. Both are logged here so callers stay simple.

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::ControllerError;
use crate::traits::StateStore;

/// Keys used in the state store
pub mod keys {
    pub const PI_ERROR_HISTORY: &str = "pi_error_history";
    pub const ACCUMULATOR: &str = "accumulator";
    pub const ENABLED: &str = "enabled";
    pub const EFFICIENCY_LEARNER: &str = "efficiency_learner";
    pub const DEFROST_LEARNER: &str = "defrost_learner";
    pub const PRICE_SERIES: &str = "price_series";
    pub const WIND_LEARNING: &str = "wind_learning";

    pub const ALL: [&str; 7] = [
        PI_ERROR_HISTORY,
        ACCUMULATOR,
        ENABLED,
        EFFICIENCY_LEARNER,
        DEFROST_LEARNER,
        PRICE_SERIES,
        WIND_LEARNING,
    ];
}

/// Load and deserialize a value
pub async fn load_state<T: DeserializeOwned>(
    store: &dyn StateStore,
    key: &str,
) -> crate::error::Result<Option<T>> {
    let value = store.get(key).await.map_err(|source| ControllerError::Persistence {
        key: key.to_owned(),
        source,
    })?;
    match value {
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
        None => Ok(None),
    }
}

/// Serialize and store a value
pub async fn save_state<T: Serialize + ?Sized>(
    store: &dyn StateStore,
    key: &str,
    value: &T,
) -> crate::error::Result<()> {
    let json = serde_json::to_value(value)?;
    store
        .set(key, json)
        .await
        .map_err(|source| ControllerError::Persistence {
            key: key.to_owned(),
            source,
        })
}

/// [`load_state`] where any failure is logged and yields `None`
pub async fn load_or_none<T: DeserializeOwned>(store: &dyn StateStore, key: &str) -> Option<T> {
    match load_state(store, key).await {
        Ok(Some(value)) => Some(value),
        Ok(None) => {
            debug!("No persisted state for '{}', starting fresh", key);
            None
        }
        Err(e) => {
            warn!("⚠️  Could not load '{}', starting fresh: {}", key, e);
            None
        }
    }
}

/// [`save_state`] that logs failures; returns whether it was written
pub async fn save_best_effort<T: Serialize + ?Sized>(
    store: &dyn StateStore,
    key: &str,
    value: &T,
) -> bool {
    match save_state(store, key, value).await {
        Ok(()) => true,
        Err(e) => {
            warn!("⚠️  Could not persist '{}', continuing: {}", key, e);
            false
        }
    }
}

/// Remove a key; failures are logged
pub async fn remove_best_effort(store: &dyn StateStore, key: &str) {
    if let Err(source) = store.remove(key).await {
        let e = ControllerError::Persistence {
            key: key.to_owned(),
            source,
        };
        warn!("⚠️  {}", e);
    }
}

// ============= In-memory store =============

/// Process-local store, used in tests and when no persistence is configured
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, serde_json::Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>> {
        Ok(self.values.read().get(key).cloned())
    }

    async fn set(&self, key: &str, value: serde_json::Value) -> Result<()> {
        self.values.write().insert(key.to_owned(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.values.write().remove(key);
        Ok(())
    }
}

// ============= JSON file store =============

/// All keys in one JSON document on disk.
///
/// Writes go through a temp file and a rename so a crash never leaves a
/// truncated document behind.
#[derive(Debug)]
pub struct JsonFileStore {
    state_path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonFileStore {
    pub fn new(state_path: impl Into<PathBuf>) -> Self {
        Self {
            state_path: state_path.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.state_path
    }

    async fn read_document(&self) -> Result<serde_json::Map<String, serde_json::Value>> {
        if !tokio::fs::try_exists(&self.state_path)
            .await
            .unwrap_or(false)
        {
            return Ok(serde_json::Map::new());
        }

        let contents = tokio::fs::read_to_string(&self.state_path)
            .await
            .with_context(|| format!("Failed to read state from {}", self.state_path.display()))?;

        if contents.trim().is_empty() {
            return Ok(serde_json::Map::new());
        }

        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse state from {}", self.state_path.display()))
    }

    async fn write_document(
        &self,
        document: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<()> {
        if let Some(parent) = self.state_path.parent()
            && !parent.as_os_str().is_empty()
            && !tokio::fs::try_exists(parent).await.unwrap_or(false)
        {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let json = serde_json::to_string_pretty(document).context("Failed to serialize state")?;

        let temp_path = self.state_path.with_extension("tmp");
        tokio::fs::write(&temp_path, &json)
            .await
            .with_context(|| format!("Failed to write temp file {}", temp_path.display()))?;
        tokio::fs::rename(&temp_path, &self.state_path)
            .await
            .with_context(|| {
                format!(
                    "Failed to rename temp file to {}",
                    self.state_path.display()
                )
            })?;

        Ok(())
    }
}

#[async_trait]
impl StateStore for JsonFileStore {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let document = self.read_document().await?;
        Ok(document.get(key).cloned())
    }

    async fn set(&self, key: &str, value: serde_json::Value) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut document = self.read_document().await?;
        document.insert(key.to_owned(), value);
        self.write_document(&document).await?;
        debug!("Saved '{}' to {}", key, self.state_path.display());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut document = self.read_document().await?;
        if document.remove(key).is_some() {
            self.write_document(&document).await?;
            info!("Removed '{}' from {}", key, self.state_path.display());
        }
        Ok(())
    }
}
