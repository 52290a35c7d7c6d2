//! HTTP adapters for the catalog and the media source.
//!
//! The catalog answers `GET {base}/assets/{id}` with JSON:
//!
//! ```json
//! {
//!   "title": "Some talk",
//!   "lengthSeconds": "212",
//!   "variants": [
//!     { "url": "https://media.example/abc123/251", "container": "webm",
//!       "mimeType": "audio/webm; codecs=\"opus\"", "audioBitrate": 160,
//!       "contentLength": "3480191", "hasAudio": true, "hasVideo": false }
//!   ]
//! }
//! ```
//!
//! Numbers may arrive as strings. Track flags default from the MIME type.

use async_trait::async_trait;
use futures::StreamExt;
use relay_blob::ByteStream;
use relay_pipe::{AssetCatalog, Catalog, CatalogError, SourceError, SourceFactory, StreamVariant};
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Deserializer};
use tracing::{debug, instrument};

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(u64),
    Text(String),
}

fn lenient_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<NumberOrString>::deserialize(deserializer)? {
        Some(NumberOrString::Number(n)) => Some(n),
        Some(NumberOrString::Text(s)) => s.trim().parse().ok(),
        None => None,
    })
}

#[derive(Debug, Deserialize)]
struct WireVariant {
    #[serde(alias = "handle")]
    url: String,
    container: String,
    #[serde(alias = "mimeType")]
    mime_type: String,
    #[serde(default, alias = "audioBitrate", deserialize_with = "lenient_u64")]
    bitrate: Option<u64>,
    #[serde(default, alias = "contentLength", deserialize_with = "lenient_u64")]
    content_length: Option<u64>,
    #[serde(default, alias = "hasAudio")]
    has_audio: Option<bool>,
    #[serde(default, alias = "hasVideo")]
    has_video: Option<bool>,
}

impl WireVariant {
    fn into_variant(self) -> StreamVariant {
        let mime = self.mime_type.to_ascii_lowercase();
        StreamVariant {
            has_audio: self.has_audio.unwrap_or_else(|| mime.starts_with("audio/")),
            has_video: self.has_video.unwrap_or_else(|| mime.starts_with("video/")),
            bitrate: self.bitrate.map(|b| u32::try_from(b).unwrap_or(u32::MAX)),
            content_length: self.content_length,
            handle: self.url,
            container: self.container,
            mime_type: self.mime_type,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireCatalog {
    #[serde(default)]
    title: Option<String>,
    #[serde(default, alias = "lengthSeconds", deserialize_with = "lenient_u64")]
    length_seconds: Option<u64>,
    #[serde(default, alias = "formats")]
    variants: Vec<WireVariant>,
}

pub(crate) fn parse_catalog(asset_id: &str, body: &[u8]) -> Result<AssetCatalog, CatalogError> {
    let wire: WireCatalog = serde_json::from_slice(body)
        .map_err(|err| CatalogError::Unavailable(format!("invalid catalog response: {}", err)))?;

    Ok(AssetCatalog {
        asset_id: asset_id.to_string(),
        title: wire.title,
        length_seconds: wire.length_seconds,
        variants: wire.variants.into_iter().map(WireVariant::into_variant).collect(),
    })
}

pub struct HttpCatalog {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpCatalog {
    pub fn new(client: reqwest::Client, base_url: &str) -> anyhow::Result<Self> {
        let base_url = Url::parse(base_url)?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("catalog.base_url cannot be a base URL: {}", base_url);
        }
        Ok(Self { client, base_url })
    }

    fn asset_url(&self, asset_id: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(["assets", asset_id]);
        }
        url
    }
}

#[async_trait]
impl Catalog for HttpCatalog {
    #[instrument(skip(self))]
    async fn list_variants(&self, asset_id: &str) -> Result<AssetCatalog, CatalogError> {
        let url = self.asset_url(asset_id);
        debug!(%url, "catalog lookup");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| CatalogError::Unavailable(err.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => return Err(CatalogError::NotFound(asset_id.to_string())),
            status if !status.is_success() => {
                return Err(CatalogError::Unavailable(format!(
                    "catalog answered {}",
                    status
                )))
            }
            _ => {}
        }

        let body = response
            .bytes()
            .await
            .map_err(|err| CatalogError::Unavailable(err.to_string()))?;
        parse_catalog(asset_id, &body)
    }
}

/// Streams a variant by treating its handle as a URL.
pub struct HttpSourceFactory {
    client: reqwest::Client,
}

impl HttpSourceFactory {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SourceFactory for HttpSourceFactory {
    async fn open(&self, variant: &StreamVariant) -> Result<ByteStream, SourceError> {
        let url = Url::parse(&variant.handle)
            .map_err(|err| SourceError::Rejected(format!("{}: {}", variant.handle, err)))?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| SourceError::Unavailable(err.to_string()))?
            .error_for_status()
            .map_err(|err| SourceError::Rejected(err.to_string()))?;

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(std::io::Error::other));
        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_catalog_with_string_numbers() {
        let body = br#"{
            "title": "Talk",
            "lengthSeconds": "212",
            "formats": [
                {"url": "https://m/1", "container": "webm", "mimeType": "audio/webm; codecs=\"opus\"",
                 "audioBitrate": 160, "contentLength": "3480191"},
                {"url": "https://m/2", "container": "mp4", "mimeType": "video/mp4",
                 "hasAudio": true}
            ]
        }"#;

        let catalog = parse_catalog("abc123", body).unwrap();
        assert_eq!(catalog.asset_id, "abc123");
        assert_eq!(catalog.length_seconds, Some(212));
        assert_eq!(catalog.variants.len(), 2);

        let audio = &catalog.variants[0];
        assert_eq!(audio.bitrate, Some(160));
        assert_eq!(audio.content_length, Some(3_480_191));
        assert!(audio.has_audio && !audio.has_video);

        let muxed = &catalog.variants[1];
        assert!(muxed.has_audio && muxed.has_video);
        assert_eq!(muxed.bitrate, None);
    }

    #[test]
    fn invalid_json_is_unavailable() {
        assert!(matches!(
            parse_catalog("abc123", b"<html>"),
            Err(CatalogError::Unavailable(_))
        ));
    }

    #[test]
    fn asset_ids_are_path_encoded() {
        let catalog = HttpCatalog::new(reqwest::Client::new(), "http://catalog.local/api/").unwrap();
        assert_eq!(
            catalog.asset_url("a b/c").as_str(),
            "http://catalog.local/api/assets/a%20b%2Fc"
        );
    }
}
