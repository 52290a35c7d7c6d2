use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_s3::primitives::ByteStream as AwsByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart, ObjectCannedAcl};
use aws_sdk_s3::Client;
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use std::env;

use crate::config::MIN_PART_SIZE;
use crate::{
    BlobError, BlobResult, BlobSink, BlobStore, ObjectMetadata, PartialDisposition, SinkReceipt,
};

/// S3-compatible storage configuration
#[derive(Debug, Clone)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    /// Custom endpoint for S3-compatible providers (MinIO, RustFS, GCS interop)
    pub endpoint_url: Option<String>,
    pub part_size: u64,
}

impl S3Config {
    /// Read `S3_REGION`, `S3_ACCESS_KEY_ID`, `S3_SECRET_ACCESS_KEY` and
    /// `S3_ENDPOINT_URL`. Without explicit keys the default AWS credential
    /// chain is used.
    pub fn from_env<S: Into<String>>(bucket: S) -> BlobResult<Self> {
        fn optional_env(key: &str) -> Option<String> {
            env::var(key).ok().filter(|v| !v.trim().is_empty())
        }

        let region = optional_env("S3_REGION")
            .or_else(|| optional_env("AWS_REGION"))
            .ok_or_else(|| BlobError::invalid("S3_REGION or AWS_REGION environment variable required"))?;

        Ok(Self {
            bucket: bucket.into(),
            region,
            access_key_id: optional_env("S3_ACCESS_KEY_ID"),
            secret_access_key: optional_env("S3_SECRET_ACCESS_KEY"),
            endpoint_url: optional_env("S3_ENDPOINT_URL"),
            part_size: 8 * 1024 * 1024,
        })
    }

    pub fn with_part_size(mut self, bytes: u64) -> Self {
        self.part_size = bytes.max(MIN_PART_SIZE);
        self
    }
}

/// S3-compatible store using the AWS SDK.
///
/// Sinks stream into a multipart upload, buffering at most one part in
/// memory. Objects smaller than one part are written with a single
/// `put_object` on finish.
#[derive(Clone)]
pub struct S3CompatibleStore {
    client: Client,
    bucket: String,
    region: String,
    endpoint_url: Option<String>,
    part_size: usize,
}

impl S3CompatibleStore {
    pub async fn new(config: S3Config) -> BlobResult<Self> {
        if config.bucket.trim().is_empty() {
            return Err(BlobError::invalid("S3 bucket must not be empty"));
        }

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()));

        if let (Some(access_key_id), Some(secret_access_key)) =
            (config.access_key_id.clone(), config.secret_access_key.clone())
        {
            let credentials =
                Credentials::new(access_key_id, secret_access_key, None, None, "relay");
            loader = loader.credentials_provider(credentials);
        }
        if let Some(endpoint) = &config.endpoint_url {
            loader = loader.endpoint_url(endpoint.clone());
        }

        let aws_config = loader.load().await;
        let client = Client::from_conf(
            aws_sdk_s3::config::Builder::from(&aws_config)
                // Path-style keeps custom endpoints working
                .force_path_style(config.endpoint_url.is_some())
                .build(),
        );

        Ok(Self {
            client,
            bucket: config.bucket,
            region: config.region,
            endpoint_url: config.endpoint_url,
            part_size: config.part_size.max(MIN_PART_SIZE) as usize,
        })
    }

    fn map_aws_error(err: impl std::error::Error + Send + Sync + 'static) -> BlobError {
        BlobError::backend(err)
    }
}

#[async_trait]
impl BlobStore for S3CompatibleStore {
    async fn create_write_sink(
        &self,
        key: &str,
        content_type: &str,
    ) -> BlobResult<Box<dyn BlobSink>> {
        Ok(Box::new(S3Sink {
            client: self.client.clone(),
            bucket: self.bucket.clone(),
            key: key.to_string(),
            content_type: content_type.to_string(),
            part_size: self.part_size,
            buffer: BytesMut::with_capacity(self.part_size),
            upload_id: None,
            parts: Vec::new(),
            written: 0,
            closed: false,
        }))
    }

    async fn make_public(&self, key: &str) -> BlobResult<()> {
        self.client
            .put_object_acl()
            .bucket(&self.bucket)
            .key(key)
            .acl(ObjectCannedAcl::PublicRead)
            .send()
            .await
            .map_err(Self::map_aws_error)?;

        tracing::debug!(bucket = %self.bucket, key = %key, "S3 object made public");
        Ok(())
    }

    /// Path-style for custom endpoints, virtual-hosted style for AWS.
    fn public_url(&self, key: &str) -> String {
        match &self.endpoint_url {
            Some(endpoint) => format!(
                "{}/{}/{}",
                endpoint.trim_end_matches('/'),
                self.bucket,
                key
            ),
            None => format!(
                "https://{}.s3.{}.amazonaws.com/{}",
                self.bucket, self.region, key
            ),
        }
    }

    async fn metadata(&self, key: &str) -> BlobResult<ObjectMetadata> {
        let result = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| {
                if err
                    .as_service_error()
                    .map_or(false, |service| service.is_not_found())
                {
                    BlobError::not_found(key)
                } else {
                    Self::map_aws_error(err)
                }
            })?;

        let updated_at = result
            .last_modified()
            .and_then(|dt| DateTime::<Utc>::from_timestamp(dt.secs(), dt.subsec_nanos()));

        let mut metadata = ObjectMetadata::new(key)
            .with_bucket(self.bucket.clone())
            // S3 has no separate creation time; objects are immutable once written
            .with_timestamps(updated_at, updated_at);

        if let Some(size) = result.content_length().filter(|len| *len >= 0) {
            metadata = metadata.with_size(size as u64);
        }
        if let Some(etag) = result.e_tag() {
            metadata = metadata.with_hash(etag.trim_matches('"'));
        }
        if let Some(content_type) = result.content_type() {
            metadata = metadata.with_content_type(content_type);
        }

        Ok(metadata)
    }

    fn backend(&self) -> &'static str {
        "s3"
    }
}

struct S3Sink {
    client: Client,
    bucket: String,
    key: String,
    content_type: String,
    part_size: usize,
    buffer: BytesMut,
    upload_id: Option<String>,
    parts: Vec<CompletedPart>,
    written: u64,
    closed: bool,
}

impl S3Sink {
    async fn ensure_upload(&mut self) -> BlobResult<String> {
        if let Some(upload_id) = &self.upload_id {
            return Ok(upload_id.clone());
        }

        let created = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(&self.key)
            .content_type(&self.content_type)
            .send()
            .await
            .map_err(S3CompatibleStore::map_aws_error)?;

        let upload_id = created
            .upload_id()
            .map(str::to_string)
            .ok_or_else(|| BlobError::write_failed("S3 returned no multipart upload id"))?;

        tracing::debug!(bucket = %self.bucket, key = %self.key, upload_id = %upload_id, "S3 multipart upload started");
        self.upload_id = Some(upload_id.clone());
        Ok(upload_id)
    }

    async fn upload_part(&mut self, body: Bytes) -> BlobResult<()> {
        let upload_id = self.ensure_upload().await?;
        let part_number = self.parts.len() as i32 + 1;
        let size = body.len();

        let uploaded = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(&self.key)
            .upload_id(upload_id)
            .part_number(part_number)
            .body(AwsByteStream::from(body))
            .send()
            .await
            .map_err(S3CompatibleStore::map_aws_error)?;

        self.parts.push(
            CompletedPart::builder()
                .set_e_tag(uploaded.e_tag().map(str::to_string))
                .part_number(part_number)
                .build(),
        );

        tracing::debug!(key = %self.key, part_number, size, "S3 part uploaded");
        Ok(())
    }

    async fn put_single(&mut self, body: Bytes) -> BlobResult<Option<String>> {
        let result = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(&self.key)
            .content_type(&self.content_type)
            .body(AwsByteStream::from(body))
            .send()
            .await
            .map_err(S3CompatibleStore::map_aws_error)?;

        Ok(result.e_tag().map(str::to_string))
    }

    async fn complete(&mut self, upload_id: String) -> BlobResult<Option<String>> {
        let upload = CompletedMultipartUpload::builder()
            .set_parts(Some(std::mem::take(&mut self.parts)))
            .build();

        let result = self
            .client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(&self.key)
            .upload_id(upload_id)
            .multipart_upload(upload)
            .send()
            .await
            .map_err(S3CompatibleStore::map_aws_error)?;

        Ok(result.e_tag().map(str::to_string))
    }
}

#[async_trait]
impl BlobSink for S3Sink {
    async fn write(&mut self, chunk: Bytes) -> BlobResult<()> {
        if self.closed {
            return Err(BlobError::SinkClosed);
        }

        self.written += chunk.len() as u64;
        self.buffer.extend_from_slice(&chunk);

        while self.buffer.len() >= self.part_size {
            let part = self.buffer.split_to(self.part_size).freeze();
            self.upload_part(part).await?;
        }
        Ok(())
    }

    async fn finish(&mut self) -> BlobResult<SinkReceipt> {
        if self.closed {
            return Err(BlobError::SinkClosed);
        }
        self.closed = true;

        let rest = std::mem::take(&mut self.buffer).freeze();
        let etag = match self.upload_id.clone() {
            None => self.put_single(rest).await?,
            Some(upload_id) => {
                if !rest.is_empty() {
                    self.upload_part(rest).await?;
                }
                self.complete(upload_id).await?
            }
        };

        let mut receipt = SinkReceipt::new(self.key.clone(), self.written);
        if let Some(etag) = etag {
            receipt = receipt.with_etag(etag.trim_matches('"'));
        }
        Ok(receipt)
    }

    async fn abort(&mut self) -> BlobResult<PartialDisposition> {
        if self.closed {
            return Err(BlobError::SinkClosed);
        }
        self.closed = true;
        self.buffer.clear();

        let Some(upload_id) = self.upload_id.take() else {
            return Ok(PartialDisposition::RolledBack);
        };

        match self
            .client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(&self.key)
            .upload_id(&upload_id)
            .send()
            .await
        {
            Ok(_) => Ok(PartialDisposition::RolledBack),
            Err(err) => {
                tracing::warn!(key = %self.key, upload_id = %upload_id, error = %err, "S3 multipart abort failed");
                Err(S3CompatibleStore::map_aws_error(err))
            }
        }
    }
}
