//! # Relay configuration
//!
//! A minimal configuration store based on string keys and values. The
//! binary layers values however it likes; library crates only read typed
//! values out of a [`RelayConfigSnapshot`].
//!
//! ```rust
//! use relay_core::RelayConfig;
//! let mut config = RelayConfig::new();
//!
//! config.set("http.port", "3030");
//! config.set("relay.chunk_timeout_secs", "30");
//!
//! let snapshot = config.snapshot();
//! assert_eq!(snapshot.get_u64("relay.chunk_timeout_secs"), Some(30));
//! ```
//!
//! ## Environment overrides
//!
//! [`RelayConfig::load_env`] maps prefixed variables onto dotted keys:
//!
//! ```bash
//! export RELAY__HTTP__PORT=8080          # http.port
//! export RELAY__STORAGE__BUCKET=audio    # storage.bucket
//! ```

use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Default)]
pub struct RelayConfig {
    values: HashMap<String, String>,
}

impl RelayConfig {
    /// Create an empty config store.
    pub fn new() -> Self {
        Self {
            values: HashMap::new(),
        }
    }

    /// Set a configuration key to a string value.
    pub fn set<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.values.insert(key.into(), value.into());
    }

    /// Set a key only if nothing has set it yet.
    pub fn set_default<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.values.entry(key.into()).or_insert_with(|| value.into());
    }

    /// Get a configuration value by key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|s| s.as_str())
    }

    /// Check whether a key is present.
    pub fn has(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Load every `{prefix}A__B` environment variable as key `a.b`.
    ///
    /// Returns the number of keys loaded.
    pub fn load_env(&mut self, prefix: &str) -> usize {
        self.load_vars(prefix, std::env::vars())
    }

    /// Same as [`load_env`](Self::load_env) over an explicit variable list.
    pub fn load_vars<I>(&mut self, prefix: &str, vars: I) -> usize
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut loaded = 0;
        for (key, value) in vars {
            if let Some(stripped) = key.strip_prefix(prefix) {
                if stripped.is_empty() {
                    continue;
                }
                let normalized = stripped.to_lowercase().replace("__", ".");
                self.set(normalized, value);
                loaded += 1;
            }
        }
        loaded
    }

    pub fn snapshot(&self) -> RelayConfigSnapshot {
        RelayConfigSnapshot::new(self.values.clone())
    }
}

#[derive(Debug, Clone, Default)]
pub struct RelayConfigSnapshot {
    map: HashMap<String, String>,
}

impl RelayConfigSnapshot {
    pub(crate) fn new(map: HashMap<String, String>) -> Self {
        Self { map }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(|s| s.as_str())
    }

    /// Non-empty string value.
    pub fn get_string(&self, key: &str) -> Option<String> {
        self.get(key)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(|v| v.trim().parse::<u64>().ok())
    }

    /// Whole seconds; `0` means "disabled" and reads as `None`.
    pub fn get_duration_secs(&self, key: &str) -> Option<Duration> {
        self.get_u64(key)
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}
