/// Runtime configuration read from the environment.
use std::path::PathBuf;

use tubeproxy_downloader::transfer::{DEFAULT_CHUNK_SIZE, MIN_CHUNK_SIZE};

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Explicit yt-dlp binary; discovered when unset.
    pub ytdlp_path: Option<PathBuf>,
    pub resolve_timeout_secs: u64,
    /// Upper bound on relay chunk size in bytes.
    pub chunk_size: usize,
    /// Container the quality lists are filtered by.
    pub container: String,
}

impl Config {
    /// Read from process environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read from an arbitrary key lookup. Unparsable values fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = lookup("API_HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port: u16 = lookup("API_PORT")
            .or_else(|| lookup("PORT"))
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(3001);
        let ytdlp_path = lookup("YTDLP_PATH")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);
        let resolve_timeout_secs: u64 = lookup("RESOLVE_TIMEOUT_SECS")
            .and_then(|v| v.trim().parse().ok())
            .filter(|v| *v > 0)
            .unwrap_or(60);
        let chunk_size: usize = lookup("DOWNLOAD_CHUNK_SIZE")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(DEFAULT_CHUNK_SIZE)
            .max(MIN_CHUNK_SIZE);
        let container = lookup("STREAM_CONTAINER")
            .map(|v| v.trim().to_ascii_lowercase())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| "mp4".to_string());

        Self {
            host,
            port,
            ytdlp_path,
            resolve_timeout_secs,
            chunk_size,
            container,
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
