//! PIN-derived encryption at rest
//!
//! The key is SHA-256 over the per-device salt and the PIN. Ciphertexts are
//! `base64(iv ‖ AES-256-CBC(plain, PKCS#7))` with a fresh random IV, so the
//! same plaintext never encrypts twice to the same string. The stored
//! validator is the encryption of `VALID`: decrypting it is how a PIN is
//! checked without ever storing the PIN.

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use rand::RngCore;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use super::store::{KeyValueStore, StoreError};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

const CHALLENGE_KEY: &str = "challenge";
const SALT_KEY: &str = "salt";
const SSH_KEY: &str = "ssh_priv_key";
const CHALLENGE: &str = "VALID";

const IV_LEN: usize = 16;
const SALT_LEN: usize = 16;
const BLOCK: usize = 16;

/// Credential errors
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    /// No PIN entered, or the vault is still locked
    #[error("no PIN")]
    NoPin,
    #[error("wrong PIN")]
    BadPin,
    #[error("cipher error: {0}")]
    Cipher(&'static str),
    #[error("encoding error: {0}")]
    Encoding(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Encryption-at-rest capability consumed by the other stores
pub trait CredentialStore: Send {
    /// A PIN has been set on this device
    fn is_provisioned(&self) -> bool;

    /// A PIN has been entered this session
    fn is_unlocked(&self) -> bool;

    /// Check `pin`, or set it when none exists yet
    fn authenticate(&mut self, pin: &str) -> Result<(), CredentialError>;

    /// Replace the PIN, re-encrypting what the vault itself holds
    fn change_pin(&mut self, pin: &str) -> Result<(), CredentialError>;

    fn encrypt(&self, plain: &str) -> Result<String, CredentialError>;

    fn decrypt(&self, cipher: &str) -> Result<String, CredentialError>;

    fn save_ssh_key(&mut self, pem: &str) -> Result<(), CredentialError>;

    /// Stored private key, if any
    fn ssh_key(&self) -> Result<Option<String>, CredentialError>;

    /// Forget the session key
    fn lock(&mut self);
}

/// `CredentialStore` over a key/value store
pub struct PinVault {
    store: Box<dyn KeyValueStore>,
    key: Option<[u8; 32]>,
}

impl PinVault {
    pub fn new(store: Box<dyn KeyValueStore>) -> Self {
        Self { store, key: None }
    }

    /// Flush the backing store
    pub fn flush(&mut self) -> Result<(), StoreError> {
        self.store.flush()
    }

    fn salt(&self) -> Result<Vec<u8>, CredentialError> {
        match self.store.get(SALT_KEY) {
            Some(encoded) => STANDARD
                .decode(encoded)
                .map_err(|e| CredentialError::Encoding(e.to_string())),
            None => Ok(Vec::new()),
        }
    }

    fn session_key(&self) -> Result<&[u8; 32], CredentialError> {
        self.key.as_ref().ok_or(CredentialError::NoPin)
    }

    fn provision(&mut self, pin: &str) -> Result<(), CredentialError> {
        let mut salt = [0u8; SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt);
        let key = derive_key(&salt, pin);
        let challenge = seal(&key, CHALLENGE);
        self.store.set(SALT_KEY, &STANDARD.encode(salt))?;
        self.store.set(CHALLENGE_KEY, &challenge)?;
        self.store.flush()?;
        self.key = Some(key);
        info!("PIN set");
        Ok(())
    }

    /// Current salt, validator, sealed SSH key and session key
    pub fn snapshot(&self) -> VaultSnapshot {
        VaultSnapshot {
            salt: self.store.get(SALT_KEY),
            challenge: self.store.get(CHALLENGE_KEY),
            ssh_key: self.store.get(SSH_KEY),
            key: self.key,
        }
    }

    /// Put back a snapshot taken before a PIN change
    ///
    /// The session key is restored even when the store refuses the write.
    pub fn restore(&mut self, snapshot: VaultSnapshot) -> Result<(), CredentialError> {
        self.key = snapshot.key;
        for (name, value) in [
            (SALT_KEY, snapshot.salt),
            (CHALLENGE_KEY, snapshot.challenge),
            (SSH_KEY, snapshot.ssh_key),
        ] {
            match value {
                Some(value) => self.store.set(name, &value)?,
                None => self.store.remove(name)?,
            }
        }
        self.store.flush()?;
        info!("previous PIN restored");
        Ok(())
    }
}

/// Raw vault entries captured by [`PinVault::snapshot`]
#[derive(Clone)]
pub struct VaultSnapshot {
    salt: Option<String>,
    challenge: Option<String>,
    ssh_key: Option<String>,
    key: Option<[u8; 32]>,
}

impl CredentialStore for PinVault {
    fn is_provisioned(&self) -> bool {
        self.store.get(CHALLENGE_KEY).is_some()
    }

    fn is_unlocked(&self) -> bool {
        self.key.is_some()
    }

    fn authenticate(&mut self, pin: &str) -> Result<(), CredentialError> {
        if pin.is_empty() {
            return Err(CredentialError::NoPin);
        }
        let Some(challenge) = self.store.get(CHALLENGE_KEY) else {
            return self.provision(pin);
        };
        let key = derive_key(&self.salt()?, pin);
        match open(&key, &challenge) {
            Ok(plain) if plain == CHALLENGE => {
                self.key = Some(key);
                debug!("vault unlocked");
                Ok(())
            },
            _ => {
                warn!("PIN rejected");
                Err(CredentialError::BadPin)
            },
        }
    }

    fn change_pin(&mut self, pin: &str) -> Result<(), CredentialError> {
        if pin.is_empty() {
            return Err(CredentialError::NoPin);
        }
        let ssh_key = self.ssh_key()?;

        let mut salt = self.salt()?;
        if salt.is_empty() {
            salt = vec![0u8; SALT_LEN];
            rand::thread_rng().fill_bytes(&mut salt);
            self.store.set(SALT_KEY, &STANDARD.encode(&salt))?;
        }
        let key = derive_key(&salt, pin);
        self.store.set(CHALLENGE_KEY, &seal(&key, CHALLENGE))?;
        if let Some(pem) = ssh_key {
            self.store.set(SSH_KEY, &seal(&key, &pem))?;
        }
        self.store.flush()?;
        self.key = Some(key);
        info!("PIN changed");
        Ok(())
    }

    fn encrypt(&self, plain: &str) -> Result<String, CredentialError> {
        Ok(seal(self.session_key()?, plain))
    }

    fn decrypt(&self, cipher: &str) -> Result<String, CredentialError> {
        open(self.session_key()?, cipher)
    }

    fn save_ssh_key(&mut self, pem: &str) -> Result<(), CredentialError> {
        let sealed = self.encrypt(pem)?;
        self.store.set(SSH_KEY, &sealed)?;
        self.store.flush()?;
        info!(bytes = pem.len(), "SSH key stored");
        Ok(())
    }

    fn ssh_key(&self) -> Result<Option<String>, CredentialError> {
        match self.store.get(SSH_KEY) {
            Some(sealed) if !sealed.is_empty() => self.decrypt(&sealed).map(Some),
            _ => Ok(None),
        }
    }

    fn lock(&mut self) {
        self.key = None;
    }
}

impl std::fmt::Debug for PinVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PinVault")
            .field("provisioned", &self.is_provisioned())
            .field("unlocked", &self.is_unlocked())
            .finish()
    }
}

fn derive_key(salt: &[u8], pin: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(pin.as_bytes());
    hasher.finalize().into()
}

fn seal(key: &[u8; 32], plain: &str) -> String {
    let mut iv = [0u8; IV_LEN];
    rand::thread_rng().fill_bytes(&mut iv);
    let body = Aes256CbcEnc::new(key.into(), &iv.into())
        .encrypt_padded_vec_mut::<Pkcs7>(plain.as_bytes());
    let mut framed = Vec::with_capacity(IV_LEN + body.len());
    framed.extend_from_slice(&iv);
    framed.extend_from_slice(&body);
    STANDARD.encode(framed)
}

/// `text` is framed like a ciphertext, whatever key sealed it
pub fn looks_sealed(text: &str) -> bool {
    STANDARD
        .decode(text.trim())
        .map_or(false, |framed| well_framed(&framed))
}

fn well_framed(framed: &[u8]) -> bool {
    framed.len() >= IV_LEN + BLOCK && (framed.len() - IV_LEN) % BLOCK == 0
}

fn open(key: &[u8; 32], sealed: &str) -> Result<String, CredentialError> {
    let framed = STANDARD
        .decode(sealed.trim())
        .map_err(|e| CredentialError::Encoding(e.to_string()))?;
    if !well_framed(&framed) {
        return Err(CredentialError::Cipher("truncated ciphertext"));
    }
    let (iv, body) = framed.split_at(IV_LEN);
    let mut iv_block = [0u8; IV_LEN];
    iv_block.copy_from_slice(iv);
    let plain = Aes256CbcDec::new(key.into(), &iv_block.into())
        .decrypt_padded_vec_mut::<Pkcs7>(body)
        .map_err(|_| CredentialError::Cipher("bad padding"))?;
    String::from_utf8(plain).map_err(|e| CredentialError::Encoding(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::store::MemoryStore;

    fn unlocked(pin: &str) -> (PinVault, MemoryStore) {
        let store = MemoryStore::new();
        let mut vault = PinVault::new(Box::new(store.clone()));
        vault.authenticate(pin).unwrap();
        (vault, store)
    }

    #[test]
    fn test_first_pin_provisions() {
        let (vault, store) = unlocked("1234");
        assert!(vault.is_provisioned());
        let entries = store.entries();
        assert!(entries.contains_key("challenge"));
        assert!(entries.contains_key("salt"));
    }

    #[test]
    fn test_empty_pin_refused_on_first_boot() {
        let mut vault = PinVault::new(Box::new(MemoryStore::new()));
        assert!(matches!(vault.authenticate(""), Err(CredentialError::NoPin)));
        assert!(!vault.is_provisioned());
    }

    #[test]
    fn test_wrong_pin_rejected() {
        let (mut vault, store) = unlocked("1234");
        let mut other = PinVault::new(Box::new(store));
        assert!(matches!(other.authenticate("9999"), Err(CredentialError::BadPin)));
        assert!(!other.is_unlocked());
        vault.lock();
        assert!(vault.authenticate("1234").is_ok());
    }

    #[test]
    fn test_encrypt_round_trip_uses_fresh_iv() {
        let (vault, _) = unlocked("1234");
        let a = vault.encrypt("hunter2").unwrap();
        let b = vault.encrypt("hunter2").unwrap();
        assert_ne!(a, b);
        assert_eq!(vault.decrypt(&a).unwrap(), "hunter2");
        assert_eq!(vault.decrypt(&b).unwrap(), "hunter2");
    }

    #[test]
    fn test_locked_vault_cannot_encrypt() {
        let (mut vault, _) = unlocked("1234");
        vault.lock();
        assert!(matches!(vault.encrypt("x"), Err(CredentialError::NoPin)));
    }

    #[test]
    fn test_garbage_ciphertext_errors() {
        let (vault, _) = unlocked("1234");
        assert!(matches!(vault.decrypt("not base64!"), Err(CredentialError::Encoding(_))));
        assert!(matches!(vault.decrypt("AAAA"), Err(CredentialError::Cipher(_))));
    }

    #[test]
    fn test_change_pin_keeps_ssh_key() {
        let (mut vault, store) = unlocked("1234");
        let pem = "-----BEGIN KEY-----\nabc\n-----END KEY-----\n";
        vault.save_ssh_key(pem).unwrap();
        let old = vault.encrypt("secret").unwrap();

        vault.change_pin("5678").unwrap();
        assert_eq!(vault.ssh_key().unwrap().as_deref(), Some(pem));
        assert_ne!(vault.decrypt(&old).ok().as_deref(), Some("secret"));

        let mut reopened = PinVault::new(Box::new(store));
        assert!(reopened.authenticate("1234").is_err());
        reopened.authenticate("5678").unwrap();
        assert_eq!(reopened.ssh_key().unwrap().as_deref(), Some(pem));
    }

    #[test]
    fn test_ssh_key_never_stored_in_plaintext() {
        let (mut vault, store) = unlocked("1234");
        vault.save_ssh_key("-----BEGIN KEY-----").unwrap();
        let stored = store.entries()["ssh_priv_key"].clone();
        assert!(!stored.contains("BEGIN"));
    }

    #[test]
    fn test_restore_undoes_pin_change() {
        let (mut vault, store) = unlocked("1234");
        let pem = "-----BEGIN KEY-----\nabc\n-----END KEY-----\n";
        vault.save_ssh_key(pem).unwrap();
        let sealed = vault.encrypt("secret").unwrap();

        let snapshot = vault.snapshot();
        vault.change_pin("5678").unwrap();
        vault.restore(snapshot).unwrap();

        assert_eq!(vault.decrypt(&sealed).unwrap(), "secret");
        let mut reopened = PinVault::new(Box::new(store));
        assert!(matches!(reopened.authenticate("5678"), Err(CredentialError::BadPin)));
        reopened.authenticate("1234").unwrap();
        assert_eq!(reopened.ssh_key().unwrap().as_deref(), Some(pem));
    }

    #[test]
    fn test_restore_keeps_session_key_when_store_refuses() {
        let (mut vault, store) = unlocked("1234");
        let sealed = vault.encrypt("secret").unwrap();
        let snapshot = vault.snapshot();
        vault.change_pin("5678").unwrap();

        store.refuse_writes("full");
        assert!(matches!(vault.restore(snapshot), Err(CredentialError::Store(_))));
        assert_eq!(vault.decrypt(&sealed).unwrap(), "secret");
    }

    #[test]
    fn test_looks_sealed() {
        let (vault, _) = unlocked("1234");
        assert!(looks_sealed(&vault.encrypt("hunter2").unwrap()));
        assert!(!looks_sealed("hunter2"));
        assert!(!looks_sealed("AAAA"));
        assert!(!looks_sealed(""));
    }

    #[test]
    fn test_refused_store_surfaces_error() {
        let store = MemoryStore::new();
        store.refuse_writes("read-only");
        let mut vault = PinVault::new(Box::new(store));
        assert!(matches!(vault.authenticate("1234"), Err(CredentialError::Store(_))));
        assert!(!vault.is_unlocked());
    }
}
