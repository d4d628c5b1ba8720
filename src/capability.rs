use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An MCP tool: name, description, and input JSON schema.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: Value,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PromptArgument {
    pub name: String,
    pub description: Option<String>,
    pub required: bool,
}

/// An MCP prompt: name, description, and an ordered sequence of arguments.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Prompt {
    pub name: String,
    pub description: Option<String>,
    pub arguments: Vec<PromptArgument>,
}

/// An MCP resource, addressed by URI.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Resource {
    pub uri: String,
    pub title: Option<String>,
    pub description: Option<String>,
}

/// Sets of keys added / removed / unchanged between a catalog's previous and
/// current contents. Iteration order matches insertion order of the
/// *current* entries so the diff is stable.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CapabilityChange<K> {
    pub added: Vec<K>,
    pub removed: Vec<K>,
    pub unchanged: Vec<K>,
}

/// Insertion-order-preserving string-keyed index, used for each of the
/// three capability catalogs. A plain `HashMap` doesn't preserve insertion
/// order, so a parallel key list is kept alongside it rather than pulling in
/// an ordered-map crate for one invariant.
#[derive(Clone, Debug, Default)]
pub struct OrderedIndex<T> {
    keys: Vec<String>,
    map: HashMap<String, T>,
}

impl<T> OrderedIndex<T> {
    pub fn new() -> Self {
        Self {
            keys: Vec::new(),
            map: HashMap::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&T> {
        self.map.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.keys
            .iter()
            .map(move |k| (k.as_str(), self.map.get(k).expect("index key/map out of sync")))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(String::as_str)
    }

    /// Atomically replaces the whole index. Later entries in `entries`
    /// overwrite earlier ones under the same key; keys are ordered by first
    /// appearance. Returns the diff against the previous contents.
    pub fn replace_all(&mut self, entries: Vec<(String, T)>) -> CapabilityChange<String> {
        let previous_keys: HashSet<String> = self.keys.iter().cloned().collect();

        let mut new_keys: Vec<String> = Vec::new();
        let mut new_map: HashMap<String, T> = HashMap::new();
        for (key, value) in entries {
            if !new_map.contains_key(&key) {
                new_keys.push(key.clone());
            }
            new_map.insert(key, value);
        }

        let current_keys: HashSet<String> = new_keys.iter().cloned().collect();
        let added: Vec<String> = new_keys
            .iter()
            .filter(|k| !previous_keys.contains(*k))
            .cloned()
            .collect();
        let removed: Vec<String> = self
            .keys
            .iter()
            .filter(|k| !current_keys.contains(*k))
            .cloned()
            .collect();
        let unchanged: Vec<String> = new_keys
            .iter()
            .filter(|k| previous_keys.contains(*k))
            .cloned()
            .collect();

        self.keys = new_keys;
        self.map = new_map;

        CapabilityChange {
            added,
            removed,
            unchanged,
        }
    }
}
