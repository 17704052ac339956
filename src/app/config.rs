//! Configuration for the appliance
//!
//! Timing constants and geometry live here rather than being scattered as
//! literals. Every section has defaults, so a partial JSON file only
//! overrides what it names.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::terminal::{SCROLLBACK_LINES, TERM_COLS, TERM_ROWS, TERM_TYPE};

/// Environment variable naming the config file
pub const CONFIG_ENV: &str = "INKDECK_CONFIG";

/// Appliance configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Terminal width in cells
    pub cols: usize,
    /// Terminal height in cells
    pub rows: usize,
    /// Scrollback ring size
    pub scrollback_lines: usize,
    /// TERM announced in the PTY request
    pub term_type: String,
    pub display: DisplayConfig,
    pub input: InputConfig,
    pub touch: TouchConfig,
    pub wifi: WifiConfig,
    pub ssh: SshConfig,
    pub ota: OtaConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cols: TERM_COLS,
            rows: TERM_ROWS,
            scrollback_lines: SCROLLBACK_LINES,
            term_type: TERM_TYPE.to_string(),
            display: DisplayConfig::default(),
            input: InputConfig::default(),
            touch: TouchConfig::default(),
            wifi: WifiConfig::default(),
            ssh: SshConfig::default(),
            ota: OtaConfig::default(),
        }
    }
}

/// E-ink refresh tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Minimum spacing between partial refreshes
    pub update_interval_ms: u64,
    /// Partial refreshes allowed before a full refresh clears ghosting
    pub full_refresh_every: u32,
    /// Status-bar redraw cadence while charging
    pub charging_animation_ms: u64,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            update_interval_ms: 200,
            full_refresh_every: 50,
            charging_animation_ms: 1000,
        }
    }
}

/// Keyboard and side-button tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Keys drained per terminal tick
    pub key_batch: usize,
    /// Capacity of the keyboard FIFO
    pub key_fifo_depth: usize,
    /// Mic hold that raises Help
    pub help_hold_ms: u64,
    /// Side-button hold that raises Sleep
    pub sleep_hold_ms: u64,
    /// Matrix controller bring-up attempts
    pub init_retries: u32,
    /// Delay between bring-up attempts
    pub init_retry_delay_ms: u64,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            key_batch: 5,
            key_fifo_depth: 32,
            help_hold_ms: 800,
            sleep_hold_ms: 1000,
            init_retries: 5,
            init_retry_delay_ms: 500,
        }
    }
}

/// Touch gesture thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TouchConfig {
    pub poll_interval_ms: u64,
    pub swipe_min_distance: i32,
    pub tap_max_ms: u64,
    pub swipe_max_ms: u64,
    pub release_debounce_ms: u64,
    pub inactivity_timeout_ms: u64,
}

impl Default for TouchConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 20,
            swipe_min_distance: 20,
            tap_max_ms: 600,
            swipe_max_ms: 3000,
            release_debounce_ms: 150,
            inactivity_timeout_ms: 5000,
        }
    }
}

/// Wi-Fi behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WifiConfig {
    pub associate_timeout_ms: u64,
    /// Countdown before auto-connecting to the last network
    pub auto_connect_delay_ms: u64,
    pub max_saved_networks: usize,
}

impl Default for WifiConfig {
    fn default() -> Self {
        Self {
            associate_timeout_ms: 15_000,
            auto_connect_delay_ms: 3000,
            max_saved_networks: 5,
        }
    }
}

/// SSH I/O loop sizing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SshConfig {
    /// Bytes per non-blocking read
    pub read_chunk: usize,
    /// Upper bound on bytes read per tick
    pub read_budget: usize,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            read_chunk: 1024,
            read_budget: 8192,
        }
    }
}

/// Firmware update source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OtaConfig {
    pub manifest_url: String,
}

impl Default for OtaConfig {
    fn default() -> Self {
        Self {
            manifest_url: "https://updates.inkdeck.invalid/firmware.json".to_string(),
        }
    }
}

impl DisplayConfig {
    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms)
    }

    pub fn charging_animation(&self) -> Duration {
        Duration::from_millis(self.charging_animation_ms)
    }
}

impl InputConfig {
    pub fn help_hold(&self) -> Duration {
        Duration::from_millis(self.help_hold_ms)
    }

    pub fn sleep_hold(&self) -> Duration {
        Duration::from_millis(self.sleep_hold_ms)
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load from `$INKDECK_CONFIG` or the default location, falling back to defaults
    pub fn load_or_default() -> Self {
        let Some(path) = default_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        match Self::load(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable config");
                Self::default()
            },
        }
    }

    /// Reject values the rest of the system cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cols == 0 || self.rows == 0 {
            return Err(ConfigError::Invalid("terminal dimensions must be non-zero"));
        }
        if self.input.key_batch == 0 || self.input.key_fifo_depth == 0 {
            return Err(ConfigError::Invalid("key batch and FIFO depth must be non-zero"));
        }
        if self.ssh.read_chunk == 0 || self.ssh.read_budget < self.ssh.read_chunk {
            return Err(ConfigError::Invalid("SSH read budget must cover one chunk"));
        }
        if self.display.full_refresh_every == 0 {
            return Err(ConfigError::Invalid("full refresh cadence must be non-zero"));
        }
        Ok(())
    }
}

/// Config file location: `$INKDECK_CONFIG`, else `~/.config/inkdeck/config.json`
pub fn default_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        return Some(PathBuf::from(path));
    }
    std::env::var("HOME").ok().map(|home| {
        PathBuf::from(home)
            .join(".config")
            .join("inkdeck")
            .join("config.json")
    })
}

/// Configuration error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(&'static str),
}
