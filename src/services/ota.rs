//! Firmware updates over HTTP
//!
//! The manifest is a small JSON document listing released images. An
//! image is downloaded whole, checked against its size bound and optional
//! SHA-256, and only then streamed into the inactive flash slot.

use std::io::{self, Read};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

/// Bytes handed to the flash writer per call
const WRITE_CHUNK: usize = 4096;

/// Update errors
#[derive(Debug, thiserror::Error)]
pub enum OtaError {
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("image size {size} does not fit {capacity} bytes")]
    Size { size: usize, capacity: usize },
    #[error("flash write failed: {0}")]
    Write(String),
    #[error("image checksum mismatch")]
    Signature,
    #[error("bad manifest: {0}")]
    Manifest(String),
}

/// One released image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionEntry {
    pub version: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    /// Hex SHA-256 of the image
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

/// Release manifest
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub latest: String,
    #[serde(default)]
    pub versions: Vec<VersionEntry>,
}

impl Manifest {
    pub fn parse(json: &str) -> Result<Self, OtaError> {
        if json.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(json).map_err(|e| OtaError::Manifest(e.to_string()))
    }

    /// List labels: ` (Curr)` marks the running version, ` *` the latest
    pub fn labels(&self, current: &str) -> Vec<String> {
        self.versions
            .iter()
            .map(|entry| {
                let mut label = entry.version.clone();
                if entry.version == current {
                    label.push_str(" (Curr)");
                }
                if entry.version == self.latest {
                    label.push_str(" *");
                }
                label
            })
            .collect()
    }
}

/// HTTP response from the fetch capability
pub struct HttpResponse {
    pub status: u16,
    pub content_length: Option<usize>,
    pub body: Box<dyn Read + Send>,
}

impl HttpResponse {
    /// 200 response with an in-memory body
    pub fn ok(body: Vec<u8>) -> Self {
        Self {
            status: 200,
            content_length: Some(body.len()),
            body: Box::new(io::Cursor::new(body)),
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            content_length: Some(0),
            body: Box::new(io::empty()),
        }
    }
}

impl std::fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .field("content_length", &self.content_length)
            .finish()
    }
}

/// HTTP GET capability
pub trait HttpFetch: Send {
    fn get(&mut self, url: &str) -> io::Result<HttpResponse>;
}

/// Inactive firmware slot
pub trait FlashWriter: Send {
    /// Largest image the slot holds
    fn capacity(&self) -> usize;

    fn begin(&mut self, size: usize) -> io::Result<()>;

    /// Bytes accepted, possibly fewer than offered
    fn write(&mut self, chunk: &[u8]) -> io::Result<usize>;

    /// Validate and mark the slot bootable
    fn finish(&mut self) -> io::Result<()>;

    fn abort(&mut self);
}

/// Update capability consumed by the settings flow
pub trait OtaService: Send {
    /// A missing manifest yields no versions rather than an error
    fn fetch_manifest(&mut self, url: &str) -> Result<Manifest, OtaError>;

    /// Download and flash, returning the bytes written
    fn update_from_url(&mut self, url: &str, sha256: Option<&str>) -> Result<usize, OtaError>;
}

/// `OtaService` over an HTTP client and a flash slot
pub struct FirmwareUpdater {
    http: Box<dyn HttpFetch>,
    flash: Box<dyn FlashWriter>,
}

impl FirmwareUpdater {
    pub fn new(http: Box<dyn HttpFetch>, flash: Box<dyn FlashWriter>) -> Self {
        Self { http, flash }
    }

    fn download(&mut self, url: &str) -> Result<Vec<u8>, OtaError> {
        let response = self
            .http
            .get(url)
            .map_err(|e| OtaError::Http(e.to_string()))?;
        if response.status != 200 {
            return Err(OtaError::Http(format!("status {}", response.status)));
        }
        let capacity = self.flash.capacity();
        match response.content_length {
            Some(0) | None => return Err(OtaError::Http("missing content length".into())),
            Some(size) if size > capacity => return Err(OtaError::Size { size, capacity }),
            Some(_) => {},
        }
        let mut image = Vec::new();
        response
            .body
            .take(capacity as u64 + 1)
            .read_to_end(&mut image)
            .map_err(|e| OtaError::Http(e.to_string()))?;
        if image.len() > capacity {
            return Err(OtaError::Size {
                size: image.len(),
                capacity,
            });
        }
        if let Some(expected) = response.content_length {
            if image.len() != expected {
                return Err(OtaError::Http(format!(
                    "short body: {} of {} bytes",
                    image.len(),
                    expected
                )));
            }
        }
        Ok(image)
    }

    fn write_image(&mut self, image: &[u8]) -> Result<(), OtaError> {
        self.flash
            .begin(image.len())
            .map_err(|e| OtaError::Write(e.to_string()))?;
        let mut written = 0;
        let mut last_decile = 0;
        for chunk in image.chunks(WRITE_CHUNK) {
            let accepted = self
                .flash
                .write(chunk)
                .map_err(|e| OtaError::Write(e.to_string()))?;
            written += accepted;
            if accepted != chunk.len() {
                return Err(OtaError::Write(format!(
                    "wrote {written} of {} bytes",
                    image.len()
                )));
            }
            let decile = written * 10 / image.len();
            if decile != last_decile {
                last_decile = decile;
                debug!(percent = decile * 10, "flashing");
            }
        }
        self.flash
            .finish()
            .map_err(|e| OtaError::Write(e.to_string()))
    }
}

impl OtaService for FirmwareUpdater {
    fn fetch_manifest(&mut self, url: &str) -> Result<Manifest, OtaError> {
        let response = self
            .http
            .get(url)
            .map_err(|e| OtaError::Http(e.to_string()))?;
        if response.status == 404 {
            info!(url, "no manifest published");
            return Ok(Manifest::default());
        }
        if response.status != 200 {
            return Err(OtaError::Http(format!("status {}", response.status)));
        }
        let mut body = String::new();
        response
            .body
            .take(64 * 1024)
            .read_to_string(&mut body)
            .map_err(|e| OtaError::Manifest(e.to_string()))?;
        let manifest = Manifest::parse(&body)?;
        info!(latest = %manifest.latest, versions = manifest.versions.len(), "manifest fetched");
        Ok(manifest)
    }

    fn update_from_url(&mut self, url: &str, sha256: Option<&str>) -> Result<usize, OtaError> {
        info!(url, "starting update");
        let image = self.download(url)?;
        if let Some(expected) = sha256 {
            let actual = hex(&Sha256::digest(&image));
            if !actual.eq_ignore_ascii_case(expected.trim()) {
                warn!(%actual, expected, "image checksum mismatch");
                return Err(OtaError::Signature);
            }
        }
        if let Err(e) = self.write_image(&image) {
            warn!(error = %e, "flashing failed");
            self.flash.abort();
            return Err(e);
        }
        info!(bytes = image.len(), "update written");
        Ok(image.len())
    }
}

impl std::fmt::Debug for FirmwareUpdater {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirmwareUpdater")
            .field("capacity", &self.flash.capacity())
            .finish()
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    struct FakeHttp {
        routes: HashMap<String, (u16, Vec<u8>)>,
    }

    impl HttpFetch for FakeHttp {
        fn get(&mut self, url: &str) -> io::Result<HttpResponse> {
            match self.routes.get(url) {
                Some((200, body)) => Ok(HttpResponse::ok(body.clone())),
                Some((status, _)) => Ok(HttpResponse::status(*status)),
                None => Err(io::Error::new(io::ErrorKind::ConnectionRefused, "unreachable")),
            }
        }
    }

    #[derive(Clone, Default)]
    struct FakeFlash {
        written: Arc<Mutex<Vec<u8>>>,
        finished: Arc<Mutex<bool>>,
        aborted: Arc<Mutex<bool>>,
        short_write: bool,
    }

    impl FlashWriter for FakeFlash {
        fn capacity(&self) -> usize {
            10_000
        }

        fn begin(&mut self, _size: usize) -> io::Result<()> {
            self.written.lock().unwrap().clear();
            Ok(())
        }

        fn write(&mut self, chunk: &[u8]) -> io::Result<usize> {
            let n = if self.short_write { chunk.len() / 2 } else { chunk.len() };
            self.written.lock().unwrap().extend_from_slice(&chunk[..n]);
            Ok(n)
        }

        fn finish(&mut self) -> io::Result<()> {
            *self.finished.lock().unwrap() = true;
            Ok(())
        }

        fn abort(&mut self) {
            *self.aborted.lock().unwrap() = true;
        }
    }

    fn updater(routes: &[(&str, u16, Vec<u8>)], flash: FakeFlash) -> FirmwareUpdater {
        let routes = routes
            .iter()
            .map(|(url, status, body)| (url.to_string(), (*status, body.clone())))
            .collect();
        FirmwareUpdater::new(Box::new(FakeHttp { routes }), Box::new(flash))
    }

    #[test]
    fn test_manifest_parse_and_labels() {
        let manifest = Manifest::parse(
            r#"{"name":"fw","latest":"v1.3","versions":[
                {"version":"v1.3","url":"u3","date":"2026-01-02"},
                {"version":"v1.2","url":"u2"}]}"#,
        )
        .unwrap();
        assert_eq!(manifest.labels("v1.2"), ["v1.3 *", "v1.2 (Curr)"]);
    }

    #[test]
    fn test_manifest_without_versions_is_empty() {
        assert!(Manifest::parse(r#"{"latest":"v1"}"#).unwrap().versions.is_empty());
        assert!(Manifest::parse("").unwrap().versions.is_empty());
        assert!(matches!(Manifest::parse("{"), Err(OtaError::Manifest(_))));
    }

    #[test]
    fn test_missing_manifest_is_not_an_error() {
        let mut ota = updater(&[("m", 404, vec![])], FakeFlash::default());
        assert_eq!(ota.fetch_manifest("m").unwrap(), Manifest::default());
        assert!(matches!(ota.fetch_manifest("other"), Err(OtaError::Http(_))));
    }

    #[test]
    fn test_update_writes_image() {
        let image = vec![0xA5; 9000];
        let digest = hex(&Sha256::digest(&image));
        let flash = FakeFlash::default();
        let mut ota = updater(&[("fw.bin", 200, image.clone())], flash.clone());
        assert_eq!(ota.update_from_url("fw.bin", Some(digest.as_str())).unwrap(), 9000);
        assert_eq!(*flash.written.lock().unwrap(), image);
        assert!(*flash.finished.lock().unwrap());
    }

    #[test]
    fn test_checksum_mismatch_writes_nothing() {
        let flash = FakeFlash::default();
        let mut ota = updater(&[("fw.bin", 200, vec![1, 2, 3])], flash.clone());
        assert!(matches!(
            ota.update_from_url("fw.bin", Some("00")),
            Err(OtaError::Signature)
        ));
        assert!(flash.written.lock().unwrap().is_empty());
    }

    #[test]
    fn test_oversized_image_rejected() {
        let mut ota = updater(&[("fw.bin", 200, vec![0; 20_000])], FakeFlash::default());
        assert!(matches!(
            ota.update_from_url("fw.bin", None),
            Err(OtaError::Size { size: 20_000, capacity: 10_000 })
        ));
    }

    #[test]
    fn test_short_write_aborts() {
        let flash = FakeFlash {
            short_write: true,
            ..FakeFlash::default()
        };
        let mut ota = updater(&[("fw.bin", 200, vec![7; 100])], flash.clone());
        assert!(matches!(ota.update_from_url("fw.bin", None), Err(OtaError::Write(_))));
        assert!(*flash.aborted.lock().unwrap());
        assert!(!*flash.finished.lock().unwrap());
    }

    #[test]
    fn test_http_error_status() {
        let mut ota = updater(&[("fw.bin", 500, vec![])], FakeFlash::default());
        assert!(matches!(ota.update_from_url("fw.bin", None), Err(OtaError::Http(_))));
    }
}
