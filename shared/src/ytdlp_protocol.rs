/// yt-dlp protocol types.
///
/// yt-dlp is invoked with `--dump-json` and prints a single JSON document per
/// video on stdout. Only the fields the service consumes are modelled here.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::{download_filename, mime_type_for, ResolvedVideo, StreamDescriptor, StreamKind, StreamTag};

// ====== REQUEST (Rust -> yt-dlp) ======

/// Command-line arguments for a metadata lookup.
pub fn dump_json_args(url: &str) -> Vec<String> {
    vec![
        "--dump-json".to_string(),
        "--no-download".to_string(),
        "--no-warnings".to_string(),
        "--no-playlist".to_string(),
        "--".to_string(),
        url.to_string(),
    ]
}

// ====== RESPONSE (yt-dlp -> Rust) ======

/// Top-level document printed by `yt-dlp --dump-json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DumpJson {
    pub title: String,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub view_count: Option<u64>,
    #[serde(default)]
    pub formats: Vec<DumpFormat>,
}

/// One entry of the `formats` array.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DumpFormat {
    pub format_id: String,
    #[serde(default)]
    pub ext: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub protocol: Option<String>,
    #[serde(default)]
    pub vcodec: Option<String>,
    #[serde(default)]
    pub acodec: Option<String>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub abr: Option<f64>,
    #[serde(default)]
    pub filesize: Option<u64>,
    #[serde(default)]
    pub filesize_approx: Option<u64>,
    #[serde(default)]
    pub http_headers: BTreeMap<String, String>,
}

impl DumpJson {
    /// Parse the stdout of a yt-dlp run.
    pub fn from_json(stdout: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(stdout.trim())
    }

    /// Convert into the resolver's domain type, dropping formats that cannot
    /// be relayed as a single HTTP body.
    pub fn into_resolved(self) -> ResolvedVideo {
        let title = self.title;
        let streams = self
            .formats
            .into_iter()
            .filter_map(|f| f.into_descriptor(&title))
            .collect();

        ResolvedVideo {
            title,
            thumbnail_url: self.thumbnail,
            duration: self.duration.map(|d| d.max(0.0).round() as u64),
            view_count: self.view_count,
            streams,
        }
    }
}

impl DumpFormat {
    /// Stream kind from the codec fields. `"none"` means the track is absent;
    /// a missing field means yt-dlp could not tell, which is treated as present.
    pub fn kind(&self) -> Option<StreamKind> {
        let has_video = self.vcodec.as_deref() != Some("none");
        let has_audio = self.acodec.as_deref() != Some("none");
        match (has_video, has_audio) {
            (true, true) => Some(StreamKind::Progressive),
            (false, true) => Some(StreamKind::AudioOnly),
            (true, false) => Some(StreamKind::VideoOnly),
            (false, false) => None,
        }
    }

    /// Whether the format is a plain HTTP(S) body rather than a manifest.
    pub fn is_direct(&self) -> bool {
        match self.protocol.as_deref() {
            None => true,
            Some(p) => p == "https" || p == "http",
        }
    }

    fn into_descriptor(self, title: &str) -> Option<StreamDescriptor> {
        if !self.is_direct() {
            return None;
        }
        let kind = self.kind()?;
        let url = self.url?;
        let tag = StreamTag::parse(&self.format_id)?;

        Some(StreamDescriptor {
            filename: download_filename(title, &self.ext, &tag),
            mime_type: mime_type_for(kind, &self.ext),
            tag,
            kind,
            ext: self.ext,
            height: self.height,
            abr: self.abr,
            url,
            http_headers: self.http_headers,
            filesize: self.filesize.or(self.filesize_approx),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "id": "dQw4w9WgXcQ",
        "title": "Never Gonna Give You Up",
        "thumbnail": "https://i.ytimg.com/vi/dQw4w9WgXcQ/maxresdefault.jpg",
        "duration": 212.0,
        "view_count": 1500000000,
        "formats": [
            {"format_id": "sb0", "ext": "mhtml", "protocol": "mhtml", "vcodec": "none", "acodec": "none", "url": "https://i.ytimg.com/sb/0"},
            {"format_id": "140", "ext": "m4a", "protocol": "https", "vcodec": "none", "acodec": "mp4a.40.2", "abr": 129.478, "filesize": 3435742, "url": "https://rr1.googlevideo.com/140", "http_headers": {"User-Agent": "Mozilla/5.0"}},
            {"format_id": "18", "ext": "mp4", "protocol": "https", "vcodec": "avc1.42001E", "acodec": "mp4a.40.2", "height": 360, "filesize_approx": 11000000, "url": "https://rr1.googlevideo.com/18"},
            {"format_id": "137", "ext": "mp4", "protocol": "https", "vcodec": "avc1.640028", "acodec": "none", "height": 1080, "url": "https://rr1.googlevideo.com/137"},
            {"format_id": "96", "ext": "mp4", "protocol": "m3u8_native", "vcodec": "avc1", "acodec": "mp4a", "height": 1080, "url": "https://manifest.googlevideo.com/96"}
        ]
    }"#;

    #[test]
    fn test_dump_json_args() {
        let args = dump_json_args("https://youtu.be/dQw4w9WgXcQ");
        assert!(args.contains(&"--dump-json".to_string()));
        assert!(args.contains(&"--no-playlist".to_string()));
        assert_eq!(args.last().unwrap(), "https://youtu.be/dQw4w9WgXcQ");
    }

    #[test]
    fn test_parse_sample() {
        let dump = DumpJson::from_json(SAMPLE).unwrap();
        assert_eq!(dump.title, "Never Gonna Give You Up");
        assert_eq!(dump.formats.len(), 5);
    }

    #[test]
    fn test_into_resolved_drops_manifests_and_storyboards() {
        let video = DumpJson::from_json(SAMPLE).unwrap().into_resolved();
        let tags: Vec<&str> = video.streams.iter().map(|s| s.tag.as_str()).collect();
        assert_eq!(tags, vec!["140", "18", "137"]);
        assert_eq!(video.duration, Some(212));
        assert_eq!(video.view_count, Some(1_500_000_000));
    }

    #[test]
    fn test_stream_kinds_and_metadata() {
        let video = DumpJson::from_json(SAMPLE).unwrap().into_resolved();

        let audio = &video.streams[0];
        assert_eq!(audio.kind, StreamKind::AudioOnly);
        assert_eq!(audio.mime_type, "audio/mp4");
        assert_eq!(audio.filesize, Some(3435742));
        assert_eq!(audio.filename, "Never Gonna Give You Up.m4a");
        assert_eq!(audio.http_headers.get("User-Agent").map(String::as_str), Some("Mozilla/5.0"));

        let progressive = &video.streams[1];
        assert_eq!(progressive.kind, StreamKind::Progressive);
        assert_eq!(progressive.height, Some(360));
        assert_eq!(progressive.filesize, Some(11000000));

        assert_eq!(video.streams[2].kind, StreamKind::VideoOnly);
    }

    #[test]
    fn test_missing_codecs_treated_as_progressive() {
        let json = r#"{"title": "direct", "formats": [{"format_id": "0", "ext": "mp4", "url": "https://example.com/a.mp4"}]}"#;
        let video = DumpJson::from_json(json).unwrap().into_resolved();
        assert_eq!(video.streams.len(), 1);
        assert_eq!(video.streams[0].kind, StreamKind::Progressive);
        assert!(video.thumbnail_url.is_none());
    }

    #[test]
    fn test_invalid_output() {
        assert!(DumpJson::from_json("ERROR: nope").is_err());
        assert!(DumpJson::from_json(r#"{"formats": []}"#).is_err());
    }
}
