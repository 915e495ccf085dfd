/// Domain models shared across all Tubeproxy crates.
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

// ====== STREAM IDENTIFIERS ======

/// Opaque identifier of one format variant (YouTube itag, yt-dlp format_id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamTag(String);

impl StreamTag {
    /// Build a tag from user input. Returns `None` for empty or blank input.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StreamTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a stream carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    /// Audio and video muxed together.
    Progressive,
    AudioOnly,
    VideoOnly,
}

// ====== RESOLVER OUTPUT ======

/// One downloadable variant as reported by the resolver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamDescriptor {
    pub tag: StreamTag,
    pub kind: StreamKind,
    /// File extension used for the download filename.
    pub ext: String,
    pub mime_type: String,
    /// Vertical resolution in pixels.
    pub height: Option<u32>,
    /// Average audio bitrate in kbps.
    pub abr: Option<f64>,
    /// Direct upstream URL.
    pub url: String,
    /// Headers the upstream expects on the fetch.
    #[serde(default)]
    pub http_headers: BTreeMap<String, String>,
    /// Declared size in bytes, when known.
    pub filesize: Option<u64>,
    pub filename: String,
}

impl StreamDescriptor {
    /// Container name, taken from the MIME subtype (`audio/mp4` -> `mp4`).
    pub fn container(&self) -> &str {
        self.mime_type
            .split('/')
            .nth(1)
            .and_then(|s| s.split(';').next())
            .map(str::trim)
            .unwrap_or("")
    }

    /// Resolution label such as `720p`.
    pub fn resolution_label(&self) -> String {
        match self.height {
            Some(h) => format!("{}p", h),
            None => "unknown".to_string(),
        }
    }

    /// Bitrate label such as `128kbps`.
    pub fn abr_label(&self) -> String {
        match self.abr {
            Some(abr) => format!("{}kbps", abr.round() as u64),
            None => "unknown".to_string(),
        }
    }
}

/// Everything the resolver knows about one video.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedVideo {
    pub title: String,
    pub thumbnail_url: Option<String>,
    pub duration: Option<u64>,
    pub view_count: Option<u64>,
    pub streams: Vec<StreamDescriptor>,
}

impl ResolvedVideo {
    /// Look up a stream by exact tag.
    pub fn find_stream(&self, tag: &StreamTag) -> Option<&StreamDescriptor> {
        self.streams.iter().find(|s| &s.tag == tag)
    }

    /// Progressive streams in `container`, best resolution first.
    pub fn video_qualities(&self, container: &str) -> Vec<VideoQuality> {
        let mut streams: Vec<&StreamDescriptor> = self
            .streams
            .iter()
            .filter(|s| s.kind == StreamKind::Progressive && s.container() == container)
            .collect();
        streams.sort_by(|a, b| b.height.cmp(&a.height));
        streams.into_iter().map(VideoQuality::from).collect()
    }

    /// Audio-only streams in `container`, highest bitrate first.
    pub fn audio_qualities(&self, container: &str) -> Vec<AudioQuality> {
        let mut streams: Vec<&StreamDescriptor> = self
            .streams
            .iter()
            .filter(|s| s.kind == StreamKind::AudioOnly && s.container() == container)
            .collect();
        streams.sort_by(|a, b| b.abr.partial_cmp(&a.abr).unwrap_or(Ordering::Equal));
        streams.into_iter().map(AudioQuality::from).collect()
    }

    /// Client-facing metadata, with quality lists filtered by `container`.
    pub fn to_video_info(&self, container: &str) -> VideoInfo {
        VideoInfo {
            title: self.title.clone(),
            thumbnail_url: self.thumbnail_url.clone(),
            duration: self.duration,
            view_count: self.view_count,
            video_qualities: self.video_qualities(container),
            audio_qualities: self.audio_qualities(container),
        }
    }

    /// Flat format listing served on `/api/video-info`: every progressive
    /// stream regardless of container, then the three best audio-only streams.
    pub fn to_format_listing(&self) -> FormatListing {
        let mut video: Vec<&StreamDescriptor> = self
            .streams
            .iter()
            .filter(|s| s.kind == StreamKind::Progressive)
            .collect();
        video.sort_by(|a, b| b.height.cmp(&a.height));

        let mut audio: Vec<&StreamDescriptor> = self
            .streams
            .iter()
            .filter(|s| s.kind == StreamKind::AudioOnly)
            .collect();
        audio.sort_by(|a, b| b.abr.partial_cmp(&a.abr).unwrap_or(Ordering::Equal));

        let formats = video
            .into_iter()
            .map(|s| ListedFormat::new(s, s.resolution_label(), false))
            .chain(
                audio
                    .into_iter()
                    .take(LISTED_AUDIO_FORMATS)
                    .map(|s| ListedFormat::new(s, "Audio only".to_string(), true)),
            )
            .collect();

        FormatListing {
            title: self.title.clone(),
            thumbnail: self.thumbnail_url.clone(),
            formats,
            duration: self.duration,
            view_count: self.view_count,
        }
    }
}

/// Audio-only entries kept in a [`FormatListing`].
const LISTED_AUDIO_FORMATS: usize = 3;

// ====== CLIENT-FACING METADATA ======

/// Metadata returned by the info endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoInfo {
    pub title: String,
    pub thumbnail_url: Option<String>,
    pub duration: Option<u64>,
    pub view_count: Option<u64>,
    pub video_qualities: Vec<VideoQuality>,
    pub audio_qualities: Vec<AudioQuality>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VideoQuality {
    pub itag: StreamTag,
    pub resolution: String,
    pub url: String,
    pub filename: Option<String>,
}

impl From<&StreamDescriptor> for VideoQuality {
    fn from(s: &StreamDescriptor) -> Self {
        Self {
            itag: s.tag.clone(),
            resolution: s.resolution_label(),
            url: s.url.clone(),
            filename: Some(s.filename.clone()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AudioQuality {
    pub itag: StreamTag,
    pub abr: String,
    pub url: String,
    pub filename: Option<String>,
}

impl From<&StreamDescriptor> for AudioQuality {
    fn from(s: &StreamDescriptor) -> Self {
        Self {
            itag: s.tag.clone(),
            abr: s.abr_label(),
            url: s.url.clone(),
            filename: Some(s.filename.clone()),
        }
    }
}

/// Single-list metadata shape used by the bundled web frontend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormatListing {
    pub title: String,
    pub thumbnail: Option<String>,
    pub formats: Vec<ListedFormat>,
    pub duration: Option<u64>,
    pub view_count: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ListedFormat {
    pub quality: String,
    pub itag: StreamTag,
    pub container: String,
    pub url: String,
    pub audio_only: bool,
}

impl ListedFormat {
    fn new(s: &StreamDescriptor, quality: String, audio_only: bool) -> Self {
        Self {
            quality,
            itag: s.tag.clone(),
            container: s.container().to_string(),
            url: s.url.clone(),
            audio_only,
        }
    }
}

/// Query of the download endpoint. Fields are optional so that missing
/// parameters can be reported as a 400 instead of a rejection.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DownloadRequest {
    pub url: Option<String>,
    pub itag: Option<String>,
    pub progress_id: Option<String>,
}

// ====== HELPERS ======

/// MIME type for a stream given its kind and file extension.
pub fn mime_type_for(kind: StreamKind, ext: &str) -> String {
    let ext = ext.to_ascii_lowercase();
    match kind {
        StreamKind::AudioOnly => match ext.as_str() {
            "m4a" | "mp4" | "aac" => "audio/mp4".to_string(),
            "mp3" => "audio/mpeg".to_string(),
            "opus" | "ogg" => "audio/ogg".to_string(),
            "" => "application/octet-stream".to_string(),
            other => format!("audio/{}", other),
        },
        StreamKind::Progressive | StreamKind::VideoOnly => match ext.as_str() {
            "3gp" => "video/3gpp".to_string(),
            "mkv" => "video/x-matroska".to_string(),
            "" => "application/octet-stream".to_string(),
            other => format!("video/{}", other),
        },
    }
}

/// Download filename built from the video title.
///
/// Keeps ASCII word characters, whitespace and `-`, so the name is always a
/// valid header value; falls back to the stream tag when nothing is left.
pub fn download_filename(title: &str, ext: &str, tag: &StreamTag) -> String {
    let cleaned: String = title
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || c.is_whitespace() || *c == '-')
        .collect();
    let cleaned = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    let stem = if cleaned.is_empty() { tag.as_str() } else { cleaned.as_str() };
    if ext.is_empty() {
        stem.to_string()
    } else {
        format!("{}.{}", stem, ext)
    }
}
