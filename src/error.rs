//! Error taxonomy
//!
//! Each subsystem has its own error enum; `InkdeckError` gathers them into
//! the user-facing kinds the state runtime reacts to. Recoverable kinds
//! become dialogs or banners at the state that owns the flow. Fatal kinds
//! stop the runtime.

use crate::app::ConfigError;
use crate::bus::BusError;
use crate::render::PanelError;
use crate::services::{CredentialError, OtaError, StoreError};
use crate::ssh::TransportError;

/// Top-level error
#[derive(Debug, thiserror::Error)]
pub enum InkdeckError {
    /// Display or keyboard could not be brought up at boot
    #[error("hardware init failed: {0}")]
    HardwareInitFailure(String),

    /// PIN did not unlock the credential store
    #[error("access denied")]
    AuthDenied,

    /// Wi-Fi is not associated but the action needs the network
    #[error("no network connection")]
    NetworkUnavailable,

    /// Every SSH authentication method was refused
    #[error("SSH authentication failed: {0}")]
    SshAuthFailed(String),

    /// Transport failed or hit EOF
    #[error("SSH transport error: {0}")]
    SshTransportError(TransportError),

    /// The key/value store refused a write
    #[error("persistence failure: {0}")]
    PersistenceFailure(#[from] StoreError),

    /// Firmware update failed
    #[error("update failed: {0}")]
    OtaFailure(#[from] OtaError),

    /// Encryption at rest failed
    #[error("credential error: {0}")]
    Credential(#[from] CredentialError),

    /// The panel rejected a refresh
    #[error("display error: {0}")]
    Display(#[from] PanelError),

    /// A shared bus could not be acquired
    #[error("bus error: {0}")]
    Bus(#[from] BusError),

    /// Persistent storage is unreadable
    #[error("storage corrupted: {0}")]
    StorageCorrupted(String),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

impl From<TransportError> for InkdeckError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::AuthDenied(detail) => InkdeckError::SshAuthFailed(detail),
            other => InkdeckError::SshTransportError(other),
        }
    }
}

impl InkdeckError {
    /// Fatal errors halt the state runtime
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            InkdeckError::HardwareInitFailure(_) | InkdeckError::StorageCorrupted(_)
        )
    }

    /// Short text shown to the user
    pub fn banner(&self) -> &'static str {
        match self {
            InkdeckError::HardwareInitFailure(_) => "Hardware Error",
            InkdeckError::AuthDenied => "Access Denied",
            InkdeckError::NetworkUnavailable => "No WiFi Connection",
            InkdeckError::SshAuthFailed(_) => "SSH Failed",
            InkdeckError::SshTransportError(_) => "Session Ended",
            InkdeckError::PersistenceFailure(_) => "Save Failed",
            InkdeckError::OtaFailure(_) => "Update Failed",
            InkdeckError::Credential(_) => "Crypto Error",
            InkdeckError::Display(_) => "Display Error",
            InkdeckError::Bus(_) => "Bus Error",
            InkdeckError::StorageCorrupted(_) => "Storage Corrupted",
            InkdeckError::Config(_) => "Config Error",
        }
    }
}

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, InkdeckError>;
