/// Configuration for blob operations
#[derive(Debug, Clone)]
pub struct BlobConfig {
    /// Absolute max size allowed for a single object (safety guard)
    pub max_blob_bytes: u64,

    /// Overrides the backend's public URL: `{public_base_url}/{key}`
    pub public_base_url: Option<String>,
}

/// S3 rejects non-final multipart parts below 5 MiB.
pub const MIN_PART_SIZE: u64 = 5 * 1024 * 1024;

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            max_blob_bytes: 5 * 1024 * 1024 * 1024, // 5GB
            public_base_url: None,
        }
    }
}

impl BlobConfig {
    /// Create a new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set max blob size
    pub fn with_max_blob_bytes(mut self, bytes: u64) -> Self {
        self.max_blob_bytes = bytes;
        self
    }

    /// Serve public URLs from a CDN or custom domain
    pub fn with_public_base_url<S: Into<String>>(mut self, url: S) -> Self {
        let url: String = url.into();
        self.public_base_url = Some(url.trim_end_matches('/').to_string());
        self
    }
}
