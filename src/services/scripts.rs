//! Saved command scripts
//!
//! Layout: `script_count`, then `sc{i}_name` and `sc{i}_cmd`.

use serde::{Deserialize, Serialize};
use tracing::info;

use super::store::{commit_list, KeyValueStore, StoreError};

/// A named command sent to a server once the session is up
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Script {
    pub name: String,
    pub command: String,
}

impl Script {
    pub fn new(name: &str, command: &str) -> Self {
        Self {
            name: name.to_string(),
            command: command.to_string(),
        }
    }
}

/// Script list over a key/value store
pub struct ScriptStore {
    store: Box<dyn KeyValueStore>,
    scripts: Vec<Script>,
}

impl ScriptStore {
    /// Open and read every script
    pub fn open(store: Box<dyn KeyValueStore>) -> Self {
        let count = store.get_usize("script_count").unwrap_or(0);
        let scripts = (0..count)
            .map(|i| Script {
                name: store.get(&format!("sc{i}_name")).unwrap_or_default(),
                command: store.get(&format!("sc{i}_cmd")).unwrap_or_default(),
            })
            .collect::<Vec<_>>();
        info!(count = scripts.len(), "scripts loaded");
        Self { store, scripts }
    }

    pub fn list(&self) -> &[Script] {
        &self.scripts
    }

    pub fn get(&self, index: usize) -> Option<&Script> {
        self.scripts.get(index)
    }

    pub fn add(&mut self, script: Script) -> Result<usize, StoreError> {
        let mut next = self.scripts.clone();
        next.push(script);
        self.commit(next)?;
        Ok(self.scripts.len() - 1)
    }

    pub fn update(&mut self, index: usize, script: Script) -> Result<(), StoreError> {
        let mut next = self.scripts.clone();
        let slot = next
            .get_mut(index)
            .ok_or_else(|| StoreError::Missing(format!("sc{index}")))?;
        *slot = script;
        self.commit(next)
    }

    pub fn remove(&mut self, index: usize) -> Result<(), StoreError> {
        if index >= self.scripts.len() {
            return Err(StoreError::Missing(format!("sc{index}")));
        }
        let mut next = self.scripts.clone();
        next.remove(index);
        self.commit(next)
    }

    fn commit(&mut self, next: Vec<Script>) -> Result<(), StoreError> {
        let store = &mut self.store;
        commit_list(&mut self.scripts, next, |scripts| {
            store.clear()?;
            store.set("script_count", &scripts.len().to_string())?;
            for (i, script) in scripts.iter().enumerate() {
                store.set(&format!("sc{i}_name"), &script.name)?;
                store.set(&format!("sc{i}_cmd"), &script.command)?;
            }
            store.flush()
        })
    }
}

impl std::fmt::Debug for ScriptStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptStore")
            .field("count", &self.scripts.len())
            .finish()
    }
}
