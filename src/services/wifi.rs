//! Wi-Fi association and saved networks
//!
//! Layout: `count`, `ssid{i}`, `pass{i}` (sealed) and `last_index`, which
//! is `-1` when no network has connected yet.

use std::io;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::credentials::{looks_sealed, CredentialStore};
use super::store::{commit_list, KeyValueStore, StoreError};
use crate::app::WifiConfig;
use crate::error::{InkdeckError, Result};

/// One access point seen by a scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanResult {
    pub ssid: String,
    pub rssi: i32,
    pub secure: bool,
}

impl ScanResult {
    /// `ssid (rssi)`, with ` *` for networks that need a password
    pub fn label(&self) -> String {
        let lock = if self.secure { " *" } else { "" };
        format!("{} ({}){}", self.ssid, self.rssi, lock)
    }
}

/// Radio hardware capability
pub trait WifiRadio: Send {
    /// Raw scan, possibly with duplicate and hidden entries
    fn scan(&mut self) -> io::Result<Vec<ScanResult>>;

    /// Start associating; completion is observed through `is_connected`
    fn begin(&mut self, ssid: &str, password: &str) -> io::Result<()>;

    fn is_connected(&self) -> bool;

    fn disconnect(&mut self);

    fn ssid(&self) -> Option<String>;

    fn ip(&self) -> Option<String>;
}

/// Network control as seen by the menu flows
pub trait WifiControl: Send {
    fn is_connected(&self) -> bool;

    fn ssid(&self) -> Option<String>;

    fn ip(&self) -> Option<String>;

    /// SSID auto-connect will try first
    fn last_used(&self) -> Option<String>;

    /// Best-effort auto-connect: the last-used network, then the rest
    fn connect(&mut self) -> bool;

    /// Visible networks, strongest first, one entry per SSID
    fn scan(&mut self) -> Result<Vec<ScanResult>>;

    /// Associate within the configured timeout
    fn connect_to(&mut self, ssid: &str, password: &str) -> bool;

    /// Remember a network, updating the password of a known SSID
    fn save(&mut self, creds: &dyn CredentialStore, ssid: &str, password: &str) -> Result<()>;

    fn forget(&mut self, creds: &dyn CredentialStore, index: usize) -> Result<()>;

    /// Saved SSIDs in slot order
    fn saved_networks(&self) -> Vec<String>;

    fn saved_password(&self, ssid: &str) -> Option<String>;

    /// Read the saved networks once the vault is unlocked
    fn load(&mut self, creds: &dyn CredentialStore);

    fn re_encrypt_all(&mut self, creds: &dyn CredentialStore) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct SavedNetwork {
    ssid: String,
    password: String,
}

/// Persisted network list
pub struct SavedNetworks {
    store: Box<dyn KeyValueStore>,
    networks: Vec<SavedNetwork>,
    last_index: Option<usize>,
    max: usize,
}

impl SavedNetworks {
    pub fn new(store: Box<dyn KeyValueStore>, max: usize) -> Self {
        Self {
            store,
            networks: Vec::new(),
            last_index: None,
            max: max.max(1),
        }
    }

    fn load(&mut self, creds: &dyn CredentialStore) {
        let count = self.store.get_usize("count").unwrap_or(0).min(self.max);
        self.networks = (0..count)
            .map(|i| {
                let sealed = self.store.get(&format!("pass{i}")).unwrap_or_default();
                let password = if sealed.is_empty() {
                    String::new()
                } else {
                    creds.decrypt(&sealed).unwrap_or_else(|e| {
                        if looks_sealed(&sealed) {
                            warn!(index = i, error = %e, "saved password sealed under another PIN, dropped");
                            return String::new();
                        }
                        warn!(index = i, error = %e, "saved password did not decrypt, treating as plaintext");
                        sealed.clone()
                    })
                };
                SavedNetwork {
                    ssid: self.store.get(&format!("ssid{i}")).unwrap_or_default(),
                    password,
                }
            })
            .collect();
        self.last_index = self
            .store
            .get("last_index")
            .and_then(|v| v.parse::<i64>().ok())
            .and_then(|i| usize::try_from(i).ok())
            .filter(|&i| i < self.networks.len());
        debug!(count = self.networks.len(), last = ?self.last_index, "saved networks loaded");
    }

    fn position(&self, ssid: &str) -> Option<usize> {
        self.networks.iter().position(|n| n.ssid == ssid)
    }

    fn commit(&mut self, creds: &dyn CredentialStore, next: Vec<SavedNetwork>) -> Result<()> {
        let store = &mut self.store;
        let last_index = self.last_index;
        commit_list(&mut self.networks, next, |networks| {
            write_all(store.as_mut(), creds, networks, last_index)
        })
    }

    fn mark_used(&mut self, ssid: &str) {
        let Some(index) = self.position(ssid) else {
            return;
        };
        self.last_index = Some(index);
        let written = self
            .store
            .set("last_index", &index.to_string())
            .and_then(|()| self.store.flush());
        if let Err(e) = written {
            warn!(error = %e, "could not record last-used network");
        }
    }
}

fn write_all(
    store: &mut dyn KeyValueStore,
    creds: &dyn CredentialStore,
    networks: &[SavedNetwork],
    last_index: Option<usize>,
) -> Result<()> {
    let sealed = networks
        .iter()
        .map(|n| {
            if n.password.is_empty() {
                Ok(String::new())
            } else {
                creds.encrypt(&n.password)
            }
        })
        .collect::<std::result::Result<Vec<_>, _>>()?;

    store.clear()?;
    store.set("count", &networks.len().to_string())?;
    for (i, (network, pass)) in networks.iter().zip(&sealed).enumerate() {
        store.set(&format!("ssid{i}"), &network.ssid)?;
        store.set(&format!("pass{i}"), pass)?;
    }
    let last = match last_index {
        Some(i) if i < networks.len() => i as i64,
        _ => -1,
    };
    store.set("last_index", &last.to_string())?;
    store.flush()?;
    Ok(())
}

/// `WifiControl` over a radio and the saved list
pub struct WifiManager {
    radio: Box<dyn WifiRadio>,
    saved: SavedNetworks,
    timeout: Duration,
    poll: Duration,
}

impl WifiManager {
    pub fn new(radio: Box<dyn WifiRadio>, store: Box<dyn KeyValueStore>, config: &WifiConfig) -> Self {
        Self {
            radio,
            saved: SavedNetworks::new(store, config.max_saved_networks),
            timeout: Duration::from_millis(config.associate_timeout_ms),
            poll: Duration::from_millis(100),
        }
    }

    /// Status poll spacing while associating
    pub fn with_poll_interval(mut self, poll: Duration) -> Self {
        self.poll = poll;
        self
    }
}

impl WifiControl for WifiManager {
    fn is_connected(&self) -> bool {
        self.radio.is_connected()
    }

    fn ssid(&self) -> Option<String> {
        self.radio.ssid()
    }

    fn ip(&self) -> Option<String> {
        self.radio.ip()
    }

    fn last_used(&self) -> Option<String> {
        self.saved
            .last_index
            .and_then(|i| self.saved.networks.get(i))
            .map(|n| n.ssid.clone())
    }

    fn connect(&mut self) -> bool {
        if self.radio.is_connected() {
            return true;
        }
        let mut order: Vec<usize> = (0..self.saved.networks.len()).collect();
        if let Some(last) = self.saved.last_index {
            order.retain(|&i| i != last);
            order.insert(0, last);
        }
        for index in order {
            let network = self.saved.networks[index].clone();
            if network.ssid.is_empty() {
                continue;
            }
            if self.connect_to(&network.ssid, &network.password) {
                return true;
            }
        }
        false
    }

    fn scan(&mut self) -> Result<Vec<ScanResult>> {
        let raw = self.radio.scan().map_err(|e| {
            warn!(error = %e, "scan failed");
            InkdeckError::NetworkUnavailable
        })?;
        let mut results: Vec<ScanResult> = Vec::new();
        for entry in raw.into_iter().filter(|r| !r.ssid.is_empty()) {
            match results.iter_mut().find(|r| r.ssid == entry.ssid) {
                Some(known) => known.rssi = known.rssi.max(entry.rssi),
                None => results.push(entry),
            }
        }
        results.sort_by(|a, b| b.rssi.cmp(&a.rssi));
        info!(count = results.len(), "scan complete");
        Ok(results)
    }

    fn connect_to(&mut self, ssid: &str, password: &str) -> bool {
        info!(ssid, "associating");
        if let Err(e) = self.radio.begin(ssid, password) {
            warn!(ssid, error = %e, "association could not start");
            return false;
        }
        let deadline = Instant::now() + self.timeout;
        while !self.radio.is_connected() {
            if Instant::now() >= deadline {
                warn!(ssid, timeout = ?self.timeout, "association timed out");
                self.radio.disconnect();
                return false;
            }
            thread::sleep(self.poll);
        }
        info!(ssid, ip = ?self.radio.ip(), "connected");
        self.saved.mark_used(ssid);
        true
    }

    fn save(&mut self, creds: &dyn CredentialStore, ssid: &str, password: &str) -> Result<()> {
        let mut next = self.saved.networks.clone();
        let entry = SavedNetwork {
            ssid: ssid.to_string(),
            password: password.to_string(),
        };
        match self.saved.position(ssid) {
            Some(index) => next[index] = entry,
            // A full list gives up its last slot
            None if next.len() >= self.saved.max => {
                if let Some(last) = next.last_mut() {
                    *last = entry;
                }
            },
            None => next.push(entry),
        }
        self.saved.commit(creds, next)?;
        if self.radio.is_connected() && self.radio.ssid().as_deref() == Some(ssid) {
            self.saved.mark_used(ssid);
        }
        Ok(())
    }

    fn forget(&mut self, creds: &dyn CredentialStore, index: usize) -> Result<()> {
        if index >= self.saved.networks.len() {
            return Err(StoreError::Missing(format!("ssid{index}")).into());
        }
        let mut next = self.saved.networks.clone();
        next.remove(index);
        let previous_last = self.saved.last_index;
        self.saved.last_index = match previous_last {
            Some(last) if last == index => None,
            Some(last) if last > index => Some(last - 1),
            other => other,
        };
        if let Err(e) = self.saved.commit(creds, next) {
            self.saved.last_index = previous_last;
            return Err(e);
        }
        Ok(())
    }

    fn saved_networks(&self) -> Vec<String> {
        self.saved.networks.iter().map(|n| n.ssid.clone()).collect()
    }

    fn saved_password(&self, ssid: &str) -> Option<String> {
        self.saved
            .position(ssid)
            .map(|i| self.saved.networks[i].password.clone())
    }

    fn load(&mut self, creds: &dyn CredentialStore) {
        self.saved.load(creds);
    }

    fn re_encrypt_all(&mut self, creds: &dyn CredentialStore) -> Result<()> {
        write_all(
            self.saved.store.as_mut(),
            creds,
            &self.saved.networks,
            self.saved.last_index,
        )
    }
}

impl std::fmt::Debug for WifiManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WifiManager")
            .field("saved", &self.saved.networks.len())
            .field("connected", &self.radio.is_connected())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::credentials::PinVault;
    use crate::services::store::MemoryStore;
    use std::sync::{Arc, Mutex};

    /// Radio that accepts one password per SSID
    #[derive(Clone, Default)]
    struct FakeRadio {
        state: Arc<Mutex<FakeState>>,
    }

    #[derive(Default)]
    struct FakeState {
        networks: Vec<(ScanResult, String)>,
        connected: Option<String>,
        attempts: Vec<String>,
    }

    impl FakeRadio {
        fn with(networks: &[(&str, i32, &str)]) -> Self {
            let radio = Self::default();
            radio.state.lock().unwrap().networks = networks
                .iter()
                .map(|(ssid, rssi, pass)| {
                    (
                        ScanResult {
                            ssid: ssid.to_string(),
                            rssi: *rssi,
                            secure: !pass.is_empty(),
                        },
                        pass.to_string(),
                    )
                })
                .collect();
            radio
        }

        fn attempts(&self) -> Vec<String> {
            self.state.lock().unwrap().attempts.clone()
        }
    }

    impl WifiRadio for FakeRadio {
        fn scan(&mut self) -> io::Result<Vec<ScanResult>> {
            Ok(self.state.lock().unwrap().networks.iter().map(|(r, _)| r.clone()).collect())
        }

        fn begin(&mut self, ssid: &str, password: &str) -> io::Result<()> {
            let mut state = self.state.lock().unwrap();
            state.attempts.push(ssid.to_string());
            let ok = state
                .networks
                .iter()
                .any(|(r, p)| r.ssid == ssid && p == password);
            state.connected = ok.then(|| ssid.to_string());
            Ok(())
        }

        fn is_connected(&self) -> bool {
            self.state.lock().unwrap().connected.is_some()
        }

        fn disconnect(&mut self) {
            self.state.lock().unwrap().connected = None;
        }

        fn ssid(&self) -> Option<String> {
            self.state.lock().unwrap().connected.clone()
        }

        fn ip(&self) -> Option<String> {
            self.is_connected().then(|| "192.168.1.20".to_string())
        }
    }

    fn vault() -> PinVault {
        let mut vault = PinVault::new(Box::new(MemoryStore::new()));
        vault.authenticate("1234").unwrap();
        vault
    }

    fn manager(radio: &FakeRadio, store: &MemoryStore) -> WifiManager {
        let config = WifiConfig {
            associate_timeout_ms: 30,
            ..WifiConfig::default()
        };
        WifiManager::new(Box::new(radio.clone()), Box::new(store.clone()), &config)
            .with_poll_interval(Duration::from_millis(5))
    }

    #[test]
    fn test_scan_dedups_and_sorts() {
        let radio = FakeRadio::with(&[("home", -70, "pw"), ("cafe", -50, ""), ("home", -40, "pw"), ("", -30, "")]);
        let mut wifi = manager(&radio, &MemoryStore::new());
        let results = wifi.scan().unwrap();
        let ssids: Vec<_> = results.iter().map(|r| r.ssid.as_str()).collect();
        assert_eq!(ssids, ["home", "cafe"]);
        assert_eq!(results[0].rssi, -40);
        assert_eq!(results[0].label(), "home (-40) *");
        assert_eq!(results[1].label(), "cafe (-50)");
    }

    #[test]
    fn test_connect_prefers_last_used() {
        let radio = FakeRadio::with(&[("a", -50, "pa"), ("b", -60, "pb")]);
        let store = MemoryStore::new();
        let vault = vault();
        let mut wifi = manager(&radio, &store);
        wifi.save(&vault, "a", "pa").unwrap();
        wifi.save(&vault, "b", "pb").unwrap();
        assert!(wifi.connect_to("b", "pb"));
        assert_eq!(store.entries()["last_index"], "1");

        let radio2 = FakeRadio::with(&[("a", -50, "pa"), ("b", -60, "pb")]);
        let mut again = manager(&radio2, &store);
        again.load(&vault);
        assert_eq!(again.last_used().as_deref(), Some("b"));
        assert!(again.connect());
        assert_eq!(radio2.attempts(), ["b"]);
    }

    #[test]
    fn test_connect_falls_back_to_other_networks() {
        let radio = FakeRadio::with(&[("b", -60, "pb")]);
        let store = MemoryStore::new();
        let vault = vault();
        let mut wifi = manager(&radio, &store);
        wifi.save(&vault, "a", "wrong").unwrap();
        wifi.save(&vault, "b", "pb").unwrap();
        assert!(wifi.connect());
        assert_eq!(radio.attempts(), ["a", "b"]);
        assert_eq!(wifi.ssid().as_deref(), Some("b"));
    }

    #[test]
    fn test_connect_to_times_out() {
        let radio = FakeRadio::with(&[("a", -50, "pa")]);
        let mut wifi = manager(&radio, &MemoryStore::new());
        assert!(!wifi.connect_to("a", "nope"));
        assert!(!wifi.is_connected());
    }

    #[test]
    fn test_save_limits_and_updates() {
        let radio = FakeRadio::default();
        let store = MemoryStore::new();
        let vault = vault();
        let mut wifi = manager(&radio, &store);
        for i in 0..6 {
            wifi.save(&vault, &format!("net{i}"), "pw").unwrap();
        }
        assert_eq!(wifi.saved_networks(), ["net0", "net1", "net2", "net3", "net5"]);

        wifi.save(&vault, "net1", "newpw").unwrap();
        assert_eq!(wifi.saved_password("net1").as_deref(), Some("newpw"));
        assert!(store.entries().values().all(|v| !v.contains("newpw")));
    }

    #[test]
    fn test_forget_shifts_last_index() {
        let radio = FakeRadio::with(&[("c", -50, "pc")]);
        let store = MemoryStore::new();
        let vault = vault();
        let mut wifi = manager(&radio, &store);
        for ssid in ["a", "b", "c"] {
            wifi.save(&vault, ssid, &format!("p{ssid}")).unwrap();
        }
        assert!(wifi.connect_to("c", "pc"));
        wifi.forget(&vault, 0).unwrap();
        assert_eq!(wifi.last_used().as_deref(), Some("c"));
        assert_eq!(store.entries()["last_index"], "1");
        wifi.forget(&vault, 1).unwrap();
        assert_eq!(wifi.last_used(), None);
        assert_eq!(store.entries()["last_index"], "-1");
    }
}
