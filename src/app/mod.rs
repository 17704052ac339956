//! Application glue module
//!
//! Configuration and logging setup shared by the binaries.

mod config;
mod logging;

pub use config::{
    default_path, Config, ConfigError, DisplayConfig, InputConfig, OtaConfig, SshConfig,
    TouchConfig, WifiConfig, CONFIG_ENV,
};
pub use logging::init_logging;
