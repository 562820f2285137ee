use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{bail, Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::sync::SyncMode;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SyncStrategy {
    #[default]
    Notify,
    Poll,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SyncSettings {
    pub strategy: SyncStrategy,
    pub poll_interval_ms: u64,
    pub fetch_timeout_ms: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            strategy: SyncStrategy::Notify,
            poll_interval_ms: 2_000,
            fetch_timeout_ms: 5_000,
        }
    }
}

/// What happens to an item a guest posts themselves.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum GuestGiftPolicy {
    /// Created available; anyone (the poster included) may claim it.
    #[default]
    LeaveOpen,
    /// Created and immediately claimed for the poster.
    ClaimBySubmitter,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RegistryConfig {
    pub database_path: PathBuf,
    pub device_state_path: PathBuf,
    pub busy_timeout_ms: u64,
    pub sync: SyncSettings,
    pub guest_gifts: GuestGiftPolicy,
    pub anonymous_name: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("registry.sqlite3"),
            device_state_path: PathBuf::from("device-state.json"),
            busy_timeout_ms: 5_000,
            sync: SyncSettings::default(),
            guest_gifts: GuestGiftPolicy::LeaveOpen,
            anonymous_name: "Anonymous".into(),
        }
    }
}

impl RegistryConfig {
    /// Defaults, then the JSON file if it exists, then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) if path.exists() => {
                let contents = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config from {}", path.display()))?;
                serde_json::from_str(&contents)
                    .with_context(|| format!("Invalid config file {}", path.display()))?
            }
            Some(path) => {
                warn!("Config file {} not found; using defaults", path.display());
                Self::default()
            }
            None => Self::default(),
        };

        config.apply_overrides(|name| env::var(name).ok())?;
        Ok(config)
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("WEDDING_REGISTRY_DB") {
            self.database_path = PathBuf::from(path);
        }
        if let Some(path) = lookup("WEDDING_REGISTRY_DEVICE_STATE") {
            self.device_state_path = PathBuf::from(path);
        }
        if let Some(strategy) = lookup("WEDDING_REGISTRY_SYNC") {
            self.sync.strategy = match strategy.to_ascii_lowercase().as_str() {
                "notify" => SyncStrategy::Notify,
                "poll" => SyncStrategy::Poll,
                other => bail!("WEDDING_REGISTRY_SYNC must be notify or poll, got {other}"),
            };
        }
        if let Some(interval) = lookup("WEDDING_REGISTRY_POLL_MS") {
            self.sync.poll_interval_ms = interval
                .parse()
                .with_context(|| format!("WEDDING_REGISTRY_POLL_MS is not a number: {interval}"))?;
        }
        Ok(())
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.sync.fetch_timeout_ms)
    }

    pub fn sync_mode(&self) -> SyncMode {
        match self.sync.strategy {
            SyncStrategy::Notify => SyncMode::Notify,
            SyncStrategy::Poll => self.poll_mode(),
        }
    }

    /// Poll mode at the configured interval, whatever the strategy says.
    pub fn poll_mode(&self) -> SyncMode {
        // A zero interval would spin.
        SyncMode::Poll {
            interval: Duration::from_millis(self.sync.poll_interval_ms.max(100)),
        }
    }
}
