//! Collaborators the runtime consumes
//!
//! Each service is a trait the menu flows call through, with an
//! implementation over a narrower hardware capability so the flows can be
//! driven by fakes in tests.

pub mod credentials;
pub mod ota;
pub mod power;
pub mod scripts;
pub mod servers;
pub mod store;
pub mod usb;
pub mod wifi;

pub use credentials::{CredentialError, CredentialStore, PinVault, VaultSnapshot};
pub use ota::{FirmwareUpdater, FlashWriter, HttpFetch, HttpResponse, Manifest, OtaError, OtaService, VersionEntry};
pub use power::{
    BatteryStatus, CachedGauge, ChargerRegister, FuelGauge, GaugeRegister, PowerControl, PowerGauge,
    PowerSource,
};
pub use scripts::{Script, ScriptStore};
pub use servers::{ServerRecord, ServerStore, StoredServers, DEFAULT_SSH_PORT};
pub use store::{JsonFileStore, KeyValueStore, MemoryStore, StoreError};
pub use usb::{is_pem_key, KeyImport, RamDisk, SdCard, UsbMassStorage, SD_KEY_PATH};
pub use wifi::{ScanResult, SavedNetworks, WifiControl, WifiManager, WifiRadio};
