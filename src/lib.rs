//! Inkdeck: core of a handheld e-ink SSH terminal
//!
//! A 40x30 terminal on a 1-bit panel, driven by a matrix keyboard, a touch
//! panel and one side button. This crate holds everything above the
//! hardware capabilities:
//!
//! - `core`: screen model, cells, cursor, scrollback, dirty rows
//! - `parser`: escape sequence parser
//! - `terminal`: parser plus screen behind one lock
//! - `render`: dirty-row composition and the e-ink refresh scheduler
//! - `input`: keyboard, side button and touch producers, key encoding
//! - `ssh`: background connect and the non-blocking session I/O
//! - `menu`: dialog stack and wizards
//! - `runtime`: the Locked / Menu / Terminal state machine and its flows
//! - `services`: credentials, servers, scripts, Wi-Fi, power, OTA, USB
//! - `bus`: shared I2C and SPI guards

pub mod app;
pub mod bus;
pub mod core;
pub mod error;
pub mod input;
pub mod menu;
pub mod parser;
pub mod render;
pub mod runtime;
pub mod services;
pub mod ssh;
pub mod terminal;

pub use error::{InkdeckError, Result};
pub use terminal::{SharedTerminal, Terminal};

/// Running firmware version, shown in System Info and matched against the
/// update manifest
pub const FIRMWARE_VERSION: &str = env!("CARGO_PKG_VERSION");
