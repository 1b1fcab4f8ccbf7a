use std::{
    fs,
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
};

use serde::{Deserialize, Serialize};

use crate::utils;

pub const DEFAULT_LOG_FILTER: &str = "info,crio_lib=debug";
pub const DEFAULT_VIP_DISCOUNT_RATE: f64 = 0.15;
pub const DEFAULT_VIP_PERIOD_MONTHS: u32 = 1;
pub const DEFAULT_MAX_EVENT_CATEGORIES: usize = 3;
pub const MAX_VIP_PERIOD_MONTHS: u32 = 120;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub log_filter: String,
    pub vip_discount_rate: f64,
    pub vip_period_months: u32,
    /// Seed the event list from the bundled fixtures when nothing is stored yet.
    pub seed_fixtures: bool,
    pub max_event_categories: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            vip_discount_rate: DEFAULT_VIP_DISCOUNT_RATE,
            vip_period_months: DEFAULT_VIP_PERIOD_MONTHS,
            seed_fixtures: true,
            max_event_categories: DEFAULT_MAX_EVENT_CATEGORIES,
        }
    }
}

impl AppConfig {
    /// Pulls hand-edited values back into range.
    pub fn sanitized(mut self) -> Self {
        self.vip_period_months = self.vip_period_months.clamp(1, MAX_VIP_PERIOD_MONTHS);
        self.vip_discount_rate = if self.vip_discount_rate.is_finite() {
            self.vip_discount_rate.clamp(0.0, 1.0)
        } else {
            DEFAULT_VIP_DISCOUNT_RATE
        };
        self.max_event_categories = self.max_event_categories.max(1);
        self
    }
}

pub struct ConfigStore {
    path: PathBuf,
    data: Mutex<AppConfig>,
}

impl ConfigStore {
    pub fn load() -> Self {
        Self::load_from(utils::config_path())
    }

    pub fn load_from(path: PathBuf) -> Self {
        let data = match read_config(&path) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!(path = ?path, "unreadable config, using defaults: {err}");
                AppConfig::default()
            }
        };
        Self::with_config(path, data)
    }

    /// Starts from `config` without reading `path`; `update` still writes there.
    pub fn with_config(path: PathBuf, config: AppConfig) -> Self {
        let data = config.clone().sanitized();
        if data != config {
            tracing::warn!(path = ?path, "config values out of range, clamped");
        }
        Self {
            path,
            data: Mutex::new(data),
        }
    }

    pub fn read(&self) -> AppConfig {
        self.data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn update<F>(&self, transform: F) -> Result<AppConfig, String>
    where
        F: FnOnce(&mut AppConfig),
    {
        let mut guard = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        transform(&mut guard);
        *guard = guard.clone().sanitized();
        write_config(&self.path, &guard)?;
        tracing::debug!(path = ?self.path, "config written");
        Ok(guard.clone())
    }
}

fn read_config(path: &Path) -> Result<AppConfig, String> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let contents = fs::read_to_string(path).map_err(|err| err.to_string())?;
    serde_json::from_str(&contents).map_err(|err| err.to_string())
}

fn write_config(path: &Path, config: &AppConfig) -> Result<(), String> {
    utils::ensure_parent(path);
    let contents = serde_json::to_string_pretty(config).map_err(|err| err.to_string())?;
    fs::write(path, contents).map_err(|err| err.to_string())
}
