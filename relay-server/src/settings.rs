//! Typed view over the relay's string configuration.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use relay_core::{RelayConfig, RelayConfigSnapshot};
use relay_pipe::MediaKind;

/// Defaults applied before environment overrides.
pub fn default_config() -> RelayConfig {
    let mut config = RelayConfig::new();
    config.set_default("http.host", "127.0.0.1");
    config.set_default("http.port", "3030");
    config.set_default("http.path", "/");
    config.set_default("storage.backend", "memory");
    config.set_default("relay.chunk_timeout_secs", "60");
    config.set_default("relay.request_timeout_secs", "0");
    config.set_default("select.kind", "audio_only");
    config
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    S3,
    Memory,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageSettings {
    pub backend: StorageBackend,
    pub bucket: Option<String>,
    pub key_prefix: Option<String>,
    pub public_base_url: Option<String>,
    pub part_size: Option<u64>,
    pub max_object_bytes: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub path: String,
    pub api_key: Option<String>,
    pub catalog_base_url: String,
    pub storage: StorageSettings,
    pub chunk_timeout: Option<Duration>,
    pub request_timeout: Option<Duration>,
    pub kind: MediaKind,
}

impl ServerSettings {
    pub fn from_snapshot(config: &RelayConfigSnapshot) -> Result<Self> {
        let port = config
            .get_string("http.port")
            .unwrap_or_else(|| "3030".to_string());
        let port: u16 = port
            .parse()
            .with_context(|| format!("http.port is not a valid port: {}", port))?;

        let catalog_base_url = config
            .get_string("catalog.base_url")
            .context("catalog.base_url is required")?;

        let backend = match config
            .get_string("storage.backend")
            .unwrap_or_else(|| "memory".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "s3" => StorageBackend::S3,
            "memory" => StorageBackend::Memory,
            other => bail!("unknown storage.backend: {}", other),
        };

        let bucket = config.get_string("storage.bucket");
        if backend == StorageBackend::S3 && bucket.is_none() {
            bail!("storage.bucket is required for the s3 backend");
        }

        let kind = match config.get_string("select.kind") {
            Some(raw) => raw.parse::<MediaKind>().map_err(anyhow::Error::msg)?,
            None => MediaKind::default(),
        };

        Ok(Self {
            host: config
                .get_string("http.host")
                .unwrap_or_else(|| "127.0.0.1".to_string()),
            port,
            path: config.get_string("http.path").unwrap_or_else(|| "/".to_string()),
            api_key: config.get_string("auth.api_key"),
            catalog_base_url,
            storage: StorageSettings {
                backend,
                bucket,
                key_prefix: config.get_string("storage.key_prefix"),
                public_base_url: config.get_string("storage.public_base_url"),
                part_size: config.get_u64("storage.part_size"),
                max_object_bytes: config.get_u64("storage.max_object_bytes"),
            },
            chunk_timeout: config.get_duration_secs("relay.chunk_timeout_secs"),
            request_timeout: config.get_duration_secs("relay.request_timeout_secs"),
            kind,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(vars: &[(&str, &str)]) -> RelayConfigSnapshot {
        let mut config = default_config();
        config.load_vars(
            "RELAY__",
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())),
        );
        config.snapshot()
    }

    #[test]
    fn defaults_with_env_overrides() {
        let settings = ServerSettings::from_snapshot(&config(&[
            ("RELAY__CATALOG__BASE_URL", "http://catalog.local"),
            ("RELAY__HTTP__PORT", "8080"),
            ("RELAY__AUTH__API_KEY", "k"),
            ("UNRELATED", "x"),
        ]))
        .unwrap();

        assert_eq!(settings.addr(), "127.0.0.1:8080");
        assert_eq!(settings.path, "/");
        assert_eq!(settings.api_key.as_deref(), Some("k"));
        assert_eq!(settings.storage.backend, StorageBackend::Memory);
        assert_eq!(settings.chunk_timeout, Some(Duration::from_secs(60)));
        assert_eq!(settings.request_timeout, None);
        assert_eq!(settings.kind, MediaKind::AudioOnly);
    }

    #[test]
    fn catalog_url_is_required() {
        assert!(ServerSettings::from_snapshot(&config(&[])).is_err());
    }

    #[test]
    fn s3_needs_a_bucket() {
        let err = ServerSettings::from_snapshot(&config(&[
            ("RELAY__CATALOG__BASE_URL", "http://catalog.local"),
            ("RELAY__STORAGE__BACKEND", "s3"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("storage.bucket"));
    }

    #[test]
    fn rejects_bad_values() {
        assert!(ServerSettings::from_snapshot(&config(&[
            ("RELAY__CATALOG__BASE_URL", "http://catalog.local"),
            ("RELAY__HTTP__PORT", "eighty"),
        ]))
        .is_err());

        assert!(ServerSettings::from_snapshot(&config(&[
            ("RELAY__CATALOG__BASE_URL", "http://catalog.local"),
            ("RELAY__SELECT__KIND", "podcast"),
        ]))
        .is_err());
    }
}
