//! Saved SSH servers
//!
//! Layout: `count`, then `s{i}_name`, `s{i}_host`, `s{i}_port`, `s{i}_user`
//! and `s{i}_pass` for each index. Passwords are sealed by the vault; a
//! value that does not open is taken as a legacy plaintext entry and is
//! sealed on the next write.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::credentials::{looks_sealed, CredentialStore};
use super::store::{commit_list, KeyValueStore, StoreError};
use crate::error::{InkdeckError, Result};

pub const DEFAULT_SSH_PORT: u16 = 22;

/// One saved server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerRecord {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
}

impl ServerRecord {
    pub fn new(name: &str, host: &str, port: u16, user: &str, password: &str) -> Self {
        Self {
            name: name.to_string(),
            host: host.to_string(),
            port,
            user: user.to_string(),
            password: password.to_string(),
        }
    }

    /// Label shown in lists: the name, else `user@host`
    pub fn label(&self) -> String {
        if self.name.is_empty() {
            format!("{}@{}", self.user, self.host)
        } else {
            self.name.clone()
        }
    }
}

/// Server list capability
pub trait ServerStore: Send {
    fn list(&self) -> &[ServerRecord];

    fn get(&self, index: usize) -> Option<&ServerRecord> {
        self.list().get(index)
    }

    /// Append a server, returning its index
    fn add(&mut self, creds: &dyn CredentialStore, record: ServerRecord) -> Result<usize>;

    fn update(&mut self, creds: &dyn CredentialStore, index: usize, record: ServerRecord) -> Result<()>;

    fn remove(&mut self, creds: &dyn CredentialStore, index: usize) -> Result<()>;

    /// Seal every password again under the vault's current key
    fn re_encrypt_all(&mut self, creds: &dyn CredentialStore) -> Result<()>;
}

/// `ServerStore` over a key/value store
pub struct StoredServers {
    store: Box<dyn KeyValueStore>,
    records: Vec<ServerRecord>,
}

impl StoredServers {
    /// Empty list; call `load` once the vault is unlocked
    pub fn new(store: Box<dyn KeyValueStore>) -> Self {
        Self {
            store,
            records: Vec::new(),
        }
    }

    /// Read every record, opening passwords with `creds`
    pub fn load(&mut self, creds: &dyn CredentialStore) {
        let count = self.store.get_usize("count").unwrap_or(0);
        let mut records = Vec::with_capacity(count);
        for i in 0..count {
            let field = |name: &str| self.store.get(&format!("s{i}_{name}")).unwrap_or_default();
            let sealed = field("pass");
            let password = if sealed.is_empty() {
                String::new()
            } else {
                creds.decrypt(&sealed).unwrap_or_else(|e| {
                    if looks_sealed(&sealed) {
                        warn!(index = i, error = %e, "password sealed under another PIN, dropped");
                        return String::new();
                    }
                    warn!(index = i, error = %e, "password did not decrypt, treating as plaintext");
                    sealed.clone()
                })
            };
            records.push(ServerRecord {
                name: field("name"),
                host: field("host"),
                port: field("port").parse().unwrap_or(DEFAULT_SSH_PORT),
                user: field("user"),
                password,
            });
        }
        info!(count = records.len(), "servers loaded");
        self.records = records;
    }

    fn commit(&mut self, creds: &dyn CredentialStore, next: Vec<ServerRecord>) -> Result<()> {
        let store = &mut self.store;
        commit_list(&mut self.records, next, |records| write_all(store.as_mut(), creds, records))
    }
}

fn write_all(
    store: &mut dyn KeyValueStore,
    creds: &dyn CredentialStore,
    records: &[ServerRecord],
) -> Result<()> {
    // Seal first so a locked vault leaves the store untouched
    let sealed = records
        .iter()
        .map(|r| {
            if r.password.is_empty() {
                Ok(String::new())
            } else {
                creds.encrypt(&r.password)
            }
        })
        .collect::<std::result::Result<Vec<_>, _>>()?;

    store.clear()?;
    store.set("count", &records.len().to_string())?;
    for (i, (record, pass)) in records.iter().zip(&sealed).enumerate() {
        store.set(&format!("s{i}_name"), &record.name)?;
        store.set(&format!("s{i}_host"), &record.host)?;
        store.set(&format!("s{i}_port"), &record.port.to_string())?;
        store.set(&format!("s{i}_user"), &record.user)?;
        store.set(&format!("s{i}_pass"), pass)?;
    }
    store.flush()?;
    Ok(())
}

fn missing(index: usize) -> InkdeckError {
    StoreError::Missing(format!("s{index}")).into()
}

impl ServerStore for StoredServers {
    fn list(&self) -> &[ServerRecord] {
        &self.records
    }

    fn add(&mut self, creds: &dyn CredentialStore, record: ServerRecord) -> Result<usize> {
        let mut next = self.records.clone();
        next.push(record);
        self.commit(creds, next)?;
        Ok(self.records.len() - 1)
    }

    fn update(&mut self, creds: &dyn CredentialStore, index: usize, record: ServerRecord) -> Result<()> {
        if index >= self.records.len() {
            return Err(missing(index));
        }
        let mut next = self.records.clone();
        next[index] = record;
        self.commit(creds, next)
    }

    fn remove(&mut self, creds: &dyn CredentialStore, index: usize) -> Result<()> {
        if index >= self.records.len() {
            return Err(missing(index));
        }
        let mut next = self.records.clone();
        next.remove(index);
        self.commit(creds, next)
    }

    fn re_encrypt_all(&mut self, creds: &dyn CredentialStore) -> Result<()> {
        write_all(self.store.as_mut(), creds, &self.records)?;
        info!(count = self.records.len(), "server passwords re-encrypted");
        Ok(())
    }
}

impl std::fmt::Debug for StoredServers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredServers")
            .field("count", &self.records.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::credentials::PinVault;
    use crate::services::store::MemoryStore;

    fn setup() -> (StoredServers, MemoryStore, PinVault) {
        let mut vault = PinVault::new(Box::new(MemoryStore::new()));
        vault.authenticate("1234").unwrap();
        let store = MemoryStore::new();
        (StoredServers::new(Box::new(store.clone())), store, vault)
    }

    #[test]
    fn test_add_persists_sealed_password() {
        let (mut servers, store, vault) = setup();
        let index = servers
            .add(&vault, ServerRecord::new("box", "10.0.0.2", 22, "pi", "raspberry"))
            .unwrap();
        assert_eq!(index, 0);

        let entries = store.entries();
        assert_eq!(entries["count"], "1");
        assert_eq!(entries["s0_host"], "10.0.0.2");
        assert_ne!(entries["s0_pass"], "raspberry");
        assert!(entries.values().all(|v| !v.contains("raspberry")));

        let mut reloaded = StoredServers::new(Box::new(store));
        reloaded.load(&vault);
        assert_eq!(reloaded.list(), servers.list());
    }

    #[test]
    fn test_remove_compacts_indices() {
        let (mut servers, store, vault) = setup();
        for name in ["a", "b", "c"] {
            servers.add(&vault, ServerRecord::new(name, name, 22, "u", "p")).unwrap();
        }
        servers.remove(&vault, 1).unwrap();
        let entries = store.entries();
        assert_eq!(entries["count"], "2");
        assert_eq!(entries["s1_name"], "c");
        assert!(!entries.contains_key("s2_name"));
    }

    #[test]
    fn test_refused_write_rolls_back() {
        let (mut servers, store, vault) = setup();
        servers.add(&vault, ServerRecord::new("a", "h", 22, "u", "p")).unwrap();
        store.refuse_writes("flash full");
        let err = servers
            .add(&vault, ServerRecord::new("b", "h", 22, "u", "p"))
            .unwrap_err();
        assert!(matches!(err, InkdeckError::PersistenceFailure(StoreError::Refused(_))));
        assert_eq!(servers.list().len(), 1);
        assert_eq!(servers.list()[0].name, "a");
    }

    #[test]
    fn test_update_out_of_range() {
        let (mut servers, _, vault) = setup();
        let err = servers
            .update(&vault, 3, ServerRecord::new("a", "h", 22, "u", "p"))
            .unwrap_err();
        assert!(matches!(err, InkdeckError::PersistenceFailure(StoreError::Missing(_))));
    }

    #[test]
    fn test_legacy_plaintext_password_loads() {
        let (_, store, vault) = setup();
        let mut raw = store.clone();
        raw.set("count", "1").unwrap();
        raw.set("s0_name", "old").unwrap();
        raw.set("s0_host", "h").unwrap();
        raw.set("s0_port", "2222").unwrap();
        raw.set("s0_user", "u").unwrap();
        raw.set("s0_pass", "plain").unwrap();

        let mut servers = StoredServers::new(Box::new(store));
        servers.load(&vault);
        assert_eq!(servers.list()[0].password, "plain");
        assert_eq!(servers.list()[0].port, 2222);
    }

    #[test]
    fn test_foreign_ciphertext_not_taken_as_password() {
        let (mut servers, store, vault) = setup();
        let mut other = PinVault::new(Box::new(MemoryStore::new()));
        other.authenticate("0000").unwrap();
        servers.add(&other, ServerRecord::new("a", "h", 22, "u", "secret")).unwrap();
        let sealed = store.entries()["s0_pass"].clone();

        let mut reloaded = StoredServers::new(Box::new(store));
        reloaded.load(&vault);
        assert_eq!(reloaded.list()[0].password, "");
        assert_ne!(reloaded.list()[0].password, sealed);
    }

    #[test]
    fn test_re_encrypt_after_pin_change() {
        let (mut servers, store, mut vault) = setup();
        servers.add(&vault, ServerRecord::new("a", "h", 22, "u", "secret")).unwrap();
        vault.change_pin("9999").unwrap();
        servers.re_encrypt_all(&vault).unwrap();

        let mut reloaded = StoredServers::new(Box::new(store));
        reloaded.load(&vault);
        assert_eq!(reloaded.list()[0].password, "secret");
    }
}
