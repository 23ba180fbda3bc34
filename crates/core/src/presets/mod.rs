use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{ReactiveError, Result, StateSnapshot};

/// Named snapshot storage. The engine treats it as synchronous and always
/// available; the medium behind it is up to the host.
pub trait PresetStore {
    fn save(&mut self, name: &str, snapshot: StateSnapshot);
    fn load(&self, name: &str) -> Option<StateSnapshot>;
    /// Returns whether a preset was removed.
    fn delete(&mut self, name: &str) -> bool;
    fn list(&self) -> Vec<String>;

    fn contains(&self, name: &str) -> bool {
        self.load(name).is_some()
    }
}

/// In-memory store, listed in name order.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemoryPresetStore {
    presets: BTreeMap<String, StateSnapshot>,
}

impl MemoryPresetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.presets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.presets.is_empty()
    }

    pub fn export_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Merges presets from a JSON export, overwriting existing names.
    /// Returns how many presets were imported.
    pub fn import_json(&mut self, text: &str) -> Result<usize> {
        let imported: MemoryPresetStore = serde_json::from_str(text)?;
        let count = imported.presets.len();
        self.presets.extend(imported.presets);
        tracing::info!(count, "imported presets");
        Ok(count)
    }
}

impl PresetStore for MemoryPresetStore {
    fn save(&mut self, name: &str, snapshot: StateSnapshot) {
        self.presets.insert(name.to_string(), snapshot);
    }

    fn load(&self, name: &str) -> Option<StateSnapshot> {
        self.presets.get(name).cloned()
    }

    fn delete(&mut self, name: &str) -> bool {
        self.presets.remove(name).is_some()
    }

    fn list(&self) -> Vec<String> {
        self.presets.keys().cloned().collect()
    }

    fn contains(&self, name: &str) -> bool {
        self.presets.contains_key(name)
    }
}

/// A saved chain: which presets to visit and how.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainDefinition {
    pub presets: Vec<String>,
    pub duration_ms: f64,
    #[serde(rename = "loop", default)]
    pub loop_chain: bool,
    #[serde(default)]
    pub shuffle: bool,
}

/// Registry of saved chain definitions.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainLibrary {
    chains: BTreeMap<String, ChainDefinition>,
}

impl ChainLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn save(&mut self, name: &str, chain: ChainDefinition) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ReactiveError::invalid("chain name is empty"));
        }
        validate_chain(&chain)?;
        self.chains.insert(name.to_string(), chain);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ChainDefinition> {
        self.chains.get(name)
    }

    pub fn delete(&mut self, name: &str) -> bool {
        self.chains.remove(name).is_some()
    }

    pub fn list(&self) -> Vec<String> {
        self.chains.keys().cloned().collect()
    }

    pub fn export_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Merges chains from a JSON export. Invalid entries reject the whole
    /// import so the library is never left half-updated.
    pub fn import_json(&mut self, text: &str) -> Result<usize> {
        let imported: ChainLibrary = serde_json::from_str(text)?;
        for (name, chain) in &imported.chains {
            validate_chain(chain)
                .map_err(|err| ReactiveError::invalid(format!("chain `{name}`: {err}")))?;
        }
        let count = imported.chains.len();
        self.chains.extend(imported.chains);
        Ok(count)
    }
}

fn validate_chain(chain: &ChainDefinition) -> Result<()> {
    if chain.presets.len() < 2 {
        return Err(ReactiveError::invalid("a chain needs at least two presets"));
    }
    if !(chain.duration_ms > 0.0 && chain.duration_ms.is_finite()) {
        return Err(ReactiveError::invalid("chain step duration must be positive"));
    }
    Ok(())
}
