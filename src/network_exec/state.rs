// Network conversational state: a key-value map with soft TTL expiry.
// Expiry is lazy — a read past its TTL is treated as absent, nothing
// proactively sweeps the map (mirrors `NetworkStateConfig.ttl`'s doc).

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde_json::Value;

struct Entry {
    value: Value,
    inserted_at: Instant,
}

#[derive(Default)]
pub struct NetworkState {
    entries: HashMap<String, Entry>,
    ttl: Option<Duration>,
}

impl NetworkState {
    pub fn new(ttl: Option<Duration>) -> Self {
        Self { entries: HashMap::new(), ttl }
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.entries.insert(key.into(), Entry { value, inserted_at: Instant::now() });
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        let entry = self.entries.get(key)?;
        if let Some(ttl) = self.ttl {
            if entry.inserted_at.elapsed() >= ttl {
                return None;
            }
        }
        Some(entry.value.clone())
    }

    /// A snapshot of every key not past its TTL, used to build the context
    /// handed to router/agent capabilities.
    pub fn snapshot(&self) -> HashMap<String, Value> {
        self.entries
            .iter()
            .filter(|(_, e)| self.ttl.map(|ttl| e.inserted_at.elapsed() < ttl).unwrap_or(true))
            .map(|(k, e)| (k.clone(), e.value.clone()))
            .collect()
    }
}
