//! Key import: USB mass storage and the SD card
//!
//! In USB mode the device exposes a RAM disk to the host. The user copies a
//! private key onto it and ejects; the disk is then scanned for the first
//! PEM-framed file.

use std::io;

use tracing::{info, warn};

use crate::bus::{SpiBus, SpiDevice};
use crate::error::Result;

/// Default key file on the SD card
pub const SD_KEY_PATH: &str = "/id_rsa";

/// RAM disk exposed over USB
pub trait RamDisk: Send {
    /// Present the disk to the host
    fn attach(&mut self) -> io::Result<()>;

    fn detach(&mut self);

    /// The host ejected the disk
    fn eject_requested(&self) -> bool;

    fn clear_eject(&mut self);

    /// Every file on the disk with its contents
    fn files(&self) -> io::Result<Vec<(String, Vec<u8>)>>;
}

/// SD card file access
pub trait SdCard: Send {
    fn read_file(&mut self, path: &str) -> io::Result<Vec<u8>>;
}

/// Key import capability consumed by the settings flow
pub trait UsbMassStorage: Send {
    fn start_usb_mode(&mut self) -> bool;

    fn stop_usb_mode(&mut self);

    fn is_active(&self) -> bool;

    fn is_eject_requested(&self) -> bool;

    fn clear_eject_request(&mut self);

    /// First PEM-framed file on the RAM disk
    fn scan_for_key(&self) -> Option<String>;

    /// PEM key from the SD card
    fn read_sd_key(&mut self, path: &str) -> Result<Option<String>>;
}

/// Whether `content` looks like a PEM private key
pub fn is_pem_key(content: &str) -> bool {
    content.len() > 20
        && content.starts_with("-----BEGIN")
        && content.lines().any(|line| line.starts_with("-----END"))
}

/// `UsbMassStorage` over a RAM disk and an optional SD card
pub struct KeyImport {
    disk: Box<dyn RamDisk>,
    sd: Option<Box<dyn SdCard>>,
    spi: SpiBus,
    active: bool,
}

impl KeyImport {
    pub fn new(disk: Box<dyn RamDisk>, spi: SpiBus) -> Self {
        Self {
            disk,
            sd: None,
            spi,
            active: false,
        }
    }

    pub fn with_sd_card(mut self, sd: Box<dyn SdCard>) -> Self {
        self.sd = Some(sd);
        self
    }
}

impl UsbMassStorage for KeyImport {
    fn start_usb_mode(&mut self) -> bool {
        if self.active {
            return true;
        }
        match self.disk.attach() {
            Ok(()) => {
                self.disk.clear_eject();
                self.active = true;
                info!("USB mass storage active");
                true
            },
            Err(e) => {
                warn!(error = %e, "USB mass storage failed to start");
                false
            },
        }
    }

    fn stop_usb_mode(&mut self) {
        if self.active {
            self.disk.detach();
            self.active = false;
            info!("USB mass storage stopped");
        }
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn is_eject_requested(&self) -> bool {
        self.active && self.disk.eject_requested()
    }

    fn clear_eject_request(&mut self) {
        self.disk.clear_eject();
    }

    fn scan_for_key(&self) -> Option<String> {
        let files = match self.disk.files() {
            Ok(files) => files,
            Err(e) => {
                warn!(error = %e, "RAM disk unreadable");
                return None;
            },
        };
        files.into_iter().find_map(|(name, content)| {
            let text = String::from_utf8(content).ok()?;
            is_pem_key(&text).then(|| {
                info!(file = %name, "key found on RAM disk");
                text
            })
        })
    }

    fn read_sd_key(&mut self, path: &str) -> Result<Option<String>> {
        let Some(sd) = self.sd.as_mut() else {
            return Ok(None);
        };
        let _select = self.spi.select(SpiDevice::SdCard)?;
        let content = match sd.read_file(path) {
            Ok(content) => content,
            Err(e) => {
                warn!(path, error = %e, "SD key unreadable");
                return Ok(None);
            },
        };
        Ok(String::from_utf8(content).ok().filter(|text| is_pem_key(text)))
    }
}

impl std::fmt::Debug for KeyImport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyImport")
            .field("active", &self.active)
            .field("sd", &self.sd.is_some())
            .finish()
    }
}
