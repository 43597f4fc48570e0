//! Configuration loading.
//!
//! Precedence: CLI flags > config file > defaults. The config file is TOML,
//! found at `<config-dir>/musebox/config.toml` unless an explicit path is
//! given. A missing file is not an error; an unreadable or invalid explicit
//! file is.

use std::fs;
use std::io::ErrorKind;
use std::time::Duration;

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use musebox_limiter::LimiterConfig;
use musebox_supply::SupplyConfig;
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub remote: RemoteSection,
    pub storage: StorageSection,
    pub supply: SupplySection,
    pub limiter: LimiterSection,
    pub history: HistorySection,
    /// Optional external idea generator; absent means not available.
    pub muse: Option<MuseSection>,
}

/// Where content packs come from.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RemoteSection {
    pub base_url: String,
    /// Pack file downloaded synchronously on first run.
    pub starter_pack: String,
}

impl Default for RemoteSection {
    fn default() -> Self {
        Self {
            base_url: "https://musebox.dev/packs".to_string(),
            starter_pack: "starter.json".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    /// Directory for persisted state; defaults to the platform data dir.
    pub data_dir: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SupplySection {
    /// Replenish in the background once fewer ideas than this remain.
    pub low_water: usize,
}

impl Default for SupplySection {
    fn default() -> Self {
        Self { low_water: 10 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimiterSection {
    pub limit: u32,
    pub window_secs: u64,
    pub crash_threshold: u32,
}

impl Default for LimiterSection {
    fn default() -> Self {
        Self {
            limit: 10,
            window_secs: 4 * 60 * 60,
            crash_threshold: 20,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HistorySection {
    pub max_entries: usize,
}

impl Default for HistorySection {
    fn default() -> Self {
        Self { max_entries: 50 }
    }
}

/// Local command invoked as the external idea generator.
#[derive(Debug, Clone, Deserialize)]
pub struct MuseSection {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "MuseSection::default_timeout_secs")]
    pub timeout_secs: u64,
}

impl MuseSection {
    fn default_timeout_secs() -> u64 {
        20
    }
}

impl Config {
    /// Load configuration from `explicit` if given, else from the
    /// discovered default location, else defaults.
    ///
    /// # Errors
    ///
    /// Fails when an explicit file cannot be read, or when any present file
    /// is not valid TOML.
    pub fn load(explicit: Option<&Utf8Path>) -> Result<Self> {
        if let Some(path) = explicit {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("cannot read config file {path}"))?;
            return toml::from_str(&raw).with_context(|| format!("invalid config file {path}"));
        }
        let Some(path) = Self::default_path() else {
            return Ok(Self::default());
        };
        match fs::read_to_string(&path) {
            Ok(raw) => toml::from_str(&raw).with_context(|| format!("invalid config file {path}")),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(err).with_context(|| format!("cannot read config file {path}")),
        }
    }

    fn default_path() -> Option<Utf8PathBuf> {
        let dir = Utf8PathBuf::from_path_buf(dirs::config_dir()?).ok()?;
        Some(dir.join("musebox").join("config.toml"))
    }

    /// Directory that backs the persistent store.
    #[must_use]
    pub fn data_dir(&self) -> Utf8PathBuf {
        if let Some(dir) = &self.storage.data_dir {
            return Utf8PathBuf::from(dir);
        }
        dirs::data_dir()
            .and_then(|dir| Utf8PathBuf::from_path_buf(dir).ok())
            .map(|dir| dir.join("musebox"))
            .unwrap_or_else(|| Utf8PathBuf::from(".musebox"))
    }

    #[must_use]
    pub fn limiter_config(&self) -> LimiterConfig {
        LimiterConfig {
            window: Duration::from_secs(self.limiter.window_secs),
            limit: self.limiter.limit,
            crash_threshold: self.limiter.crash_threshold,
        }
    }

    #[must_use]
    pub fn supply_config(&self) -> SupplyConfig {
        SupplyConfig {
            low_water: self.supply.low_water,
            starter_pack: self.remote.starter_pack.clone(),
        }
    }
}
