use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Which kind of rendition a request wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    /// Audio track without video
    #[default]
    AudioOnly,
    /// Video track without audio
    VideoOnly,
    /// Muxed audio and video
    AudioVideo,
    /// No filtering
    Any,
}

impl MediaKind {
    pub fn matches(&self, variant: &StreamVariant) -> bool {
        match self {
            MediaKind::AudioOnly => variant.has_audio && !variant.has_video,
            MediaKind::VideoOnly => variant.has_video && !variant.has_audio,
            MediaKind::AudioVideo => variant.has_audio && variant.has_video,
            MediaKind::Any => true,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::AudioOnly => "audio_only",
            MediaKind::VideoOnly => "video_only",
            MediaKind::AudioVideo => "audio_video",
            MediaKind::Any => "any",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "audio_only" | "audioonly" | "audio" => Ok(MediaKind::AudioOnly),
            "video_only" | "videoonly" | "video" => Ok(MediaKind::VideoOnly),
            "audio_video" | "audioandvideo" | "both" => Ok(MediaKind::AudioVideo),
            "any" => Ok(MediaKind::Any),
            other => Err(format!("unknown media kind: {}", other)),
        }
    }
}

/// One retrievable encoding of an asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamVariant {
    /// Opaque handle the source factory uses to open the byte stream
    pub handle: String,
    /// Container / file extension tag (`webm`, `mp4`, ...)
    pub container: String,
    pub mime_type: String,
    /// Kilobits per second; absent or zero means unknown
    #[serde(default)]
    pub bitrate: Option<u32>,
    /// Expected total byte length; absent means unknown
    #[serde(default)]
    pub content_length: Option<u64>,
    #[serde(default)]
    pub has_audio: bool,
    #[serde(default)]
    pub has_video: bool,
}

impl StreamVariant {
    /// An audio-only variant
    pub fn audio<H, C, M>(handle: H, container: C, mime_type: M) -> Self
    where
        H: Into<String>,
        C: Into<String>,
        M: Into<String>,
    {
        Self {
            handle: handle.into(),
            container: container.into(),
            mime_type: mime_type.into(),
            bitrate: None,
            content_length: None,
            has_audio: true,
            has_video: false,
        }
    }

    pub fn with_bitrate(mut self, bitrate: u32) -> Self {
        self.bitrate = Some(bitrate);
        self
    }

    pub fn with_content_length(mut self, length: u64) -> Self {
        self.content_length = Some(length);
        self
    }

    pub fn with_video(mut self) -> Self {
        self.has_video = true;
        self
    }

    pub fn without_audio(mut self) -> Self {
        self.has_audio = false;
        self
    }

    /// Bitrate used for ordering; unknown counts as zero.
    pub fn effective_bitrate(&self) -> u32 {
        self.bitrate.unwrap_or(0)
    }

    /// Expected length if known and non-zero.
    pub fn expected_length(&self) -> Option<u64> {
        self.content_length.filter(|len| *len > 0)
    }

    /// `audio` or `video`, the family used in the response `type`.
    pub fn media_family(&self) -> &'static str {
        if self.has_video {
            "video"
        } else {
            "audio"
        }
    }
}

/// Everything the catalog knows about one asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetCatalog {
    pub asset_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub length_seconds: Option<u64>,
    /// In catalog order
    #[serde(default)]
    pub variants: Vec<StreamVariant>,
}

impl AssetCatalog {
    pub fn new<S: Into<String>>(asset_id: S, variants: Vec<StreamVariant>) -> Self {
        Self {
            asset_id: asset_id.into(),
            title: None,
            length_seconds: None,
            variants,
        }
    }

    pub fn with_length_seconds(mut self, seconds: u64) -> Self {
        self.length_seconds = Some(seconds);
        self
    }
}
