pub mod http_catalog;
pub mod settings;

use std::sync::Arc;

use anyhow::Result;
use relay_axum::AxumApp;
use relay_blob::{
    BlobAdapter, BlobConfig, BlobStore, MemoryBlobStore, PrefixedKeyStrategy, S3CompatibleStore,
    S3Config,
};
use relay_pipe::{CoordinatorConfig, PipelineConfig, RelayPipeline, RequestCoordinator, SelectionPolicy};
use tracing::{info, warn};

use crate::http_catalog::{HttpCatalog, HttpSourceFactory};
use crate::settings::{ServerSettings, StorageBackend, StorageSettings};

async fn build_store(storage: &StorageSettings) -> Result<Arc<dyn BlobStore>> {
    match storage.backend {
        StorageBackend::Memory => {
            warn!("using in-memory storage; objects are lost on restart");
            Ok(Arc::new(MemoryBlobStore::default()))
        }
        StorageBackend::S3 => {
            let bucket = storage
                .bucket
                .clone()
                .ok_or_else(|| anyhow::anyhow!("storage.bucket is required for the s3 backend"))?;
            let mut config = S3Config::from_env(bucket)?;
            if let Some(part_size) = storage.part_size {
                config = config.with_part_size(part_size);
            }
            Ok(Arc::new(S3CompatibleStore::new(config).await?))
        }
    }
}

fn blob_config(storage: &StorageSettings) -> BlobConfig {
    let mut config = BlobConfig::default();
    if let Some(max) = storage.max_object_bytes {
        config = config.with_max_blob_bytes(max);
    }
    if let Some(base) = &storage.public_base_url {
        config = config.with_public_base_url(base.clone());
    }
    config
}

/// Wire every collaborator from settings and return the HTTP app.
pub async fn build(settings: &ServerSettings) -> Result<AxumApp> {
    let store = build_store(&settings.storage).await?;
    info!(backend = store.backend(), "storage ready");

    let mut blobs = BlobAdapter::from_arc(store, blob_config(&settings.storage));
    if let Some(prefix) = &settings.storage.key_prefix {
        blobs = blobs.with_key_strategy(PrefixedKeyStrategy::new(prefix.clone()));
    }

    let client = reqwest::Client::builder()
        .user_agent(concat!("relay-server/", env!("CARGO_PKG_VERSION")))
        .build()?;

    let catalog = HttpCatalog::new(client.clone(), &settings.catalog_base_url)?;
    let sources = HttpSourceFactory::new(client);

    if settings.api_key.is_none() {
        warn!("auth.api_key is not set; the transfer endpoint accepts every caller");
    }

    let mut coordinator_config =
        CoordinatorConfig::default().with_policy(SelectionPolicy::new(settings.kind));
    if let Some(key) = &settings.api_key {
        coordinator_config = coordinator_config.with_api_key(key.clone());
    }
    if let Some(timeout) = settings.request_timeout {
        coordinator_config = coordinator_config.with_request_timeout(timeout);
    }

    let mut pipeline_config = PipelineConfig::default();
    if let Some(timeout) = settings.chunk_timeout {
        pipeline_config = pipeline_config.with_chunk_timeout(timeout);
    }

    let coordinator = RequestCoordinator::new(
        Arc::new(catalog),
        Arc::new(sources),
        blobs,
        coordinator_config,
    )
    .with_pipeline(RelayPipeline::new(pipeline_config));

    Ok(AxumApp::with_path(coordinator, &settings.path))
}
