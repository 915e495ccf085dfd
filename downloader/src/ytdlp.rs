/// yt-dlp backed [`Resolver`].
///
/// Runs `yt-dlp --dump-json` as a child process per lookup, parses stdout,
/// and forwards stderr lines to tracing. Stream bodies are fetched directly
/// over HTTP with the headers yt-dlp reports.
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, error, info, warn};

use tubeproxy_shared::errors::{ResolveError, ResolveResult};
use tubeproxy_shared::models::{ResolvedVideo, StreamDescriptor};
use tubeproxy_shared::ytdlp_protocol::{dump_json_args, DumpJson};

use crate::resolver::{validate_url, Resolver, StreamBody};
use crate::transfer::HttpFetcher;

fn binary_name() -> &'static str {
    if cfg!(target_os = "windows") {
        "yt-dlp.exe"
    } else {
        "yt-dlp"
    }
}

/// Locate the yt-dlp executable.
///
/// Checks the explicit path first, then every `PATH` entry, then common
/// install locations.
pub fn find_ytdlp(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        if path.is_file() {
            return Some(path.to_path_buf());
        }
        warn!("Configured yt-dlp path {:?} does not exist", path);
    }

    let name = binary_name();

    if let Some(path_var) = std::env::var_os("PATH") {
        for dir in std::env::split_paths(&path_var) {
            let candidate = dir.join(name);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
    }

    let mut common: Vec<PathBuf> = Vec::new();
    if cfg!(target_os = "windows") {
        if let Ok(local_app) = std::env::var("LOCALAPPDATA") {
            common.push(PathBuf::from(local_app).join("Microsoft").join("WinGet").join("Links"));
        }
        common.push(PathBuf::from(r"C:\yt-dlp"));
    } else {
        for dir in ["/usr/local/bin", "/usr/bin", "/opt/homebrew/bin", "/snap/bin"] {
            common.push(PathBuf::from(dir));
        }
        if let Ok(home) = std::env::var("HOME") {
            common.push(PathBuf::from(home).join(".local").join("bin"));
        }
    }

    common
        .into_iter()
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

/// Condense yt-dlp stderr into a one-line cause.
///
/// Prefers the `ERROR:` lines yt-dlp prints; falls back to the last
/// non-empty line.
pub fn error_summary(stderr: &str) -> Option<String> {
    let errors: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|l| l.starts_with("ERROR:"))
        .collect();
    if !errors.is_empty() {
        return Some(errors.join("; "));
    }
    stderr
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(String::from)
}

/// Resolver that shells out to yt-dlp.
pub struct YtDlpResolver {
    ytdlp_path: PathBuf,
    timeout_secs: u64,
    fetcher: HttpFetcher,
}

impl YtDlpResolver {
    pub fn new(ytdlp_path: PathBuf, timeout_secs: u64) -> Self {
        Self {
            ytdlp_path,
            timeout_secs,
            fetcher: HttpFetcher::new(),
        }
    }

    /// Build a resolver from an optional configured path, searching the
    /// usual locations when it is absent.
    pub fn discover(explicit: Option<&Path>, timeout_secs: u64) -> ResolveResult<Self> {
        match find_ytdlp(explicit) {
            Some(path) => {
                info!("Using yt-dlp at {}", path.display());
                Ok(Self::new(path, timeout_secs))
            }
            None => {
                error!("yt-dlp not found in configured path, PATH, or common locations");
                Err(ResolveError::ToolMissing)
            }
        }
    }
}

#[async_trait]
impl Resolver for YtDlpResolver {
    fn id(&self) -> &'static str {
        "yt-dlp"
    }

    async fn resolve(&self, url: &str) -> ResolveResult<ResolvedVideo> {
        let url = validate_url(url)?;
        debug!("Resolving {}", url);

        let child = Command::new(&self.ytdlp_path)
            .args(dump_json_args(url.as_str()))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => ResolveError::ToolMissing,
                _ => ResolveError::Spawn(format!("{}: {}", self.ytdlp_path.display(), e)),
            })?;

        // Dropping the future on timeout drops the child, which kills it.
        let output = tokio::time::timeout(Duration::from_secs(self.timeout_secs), child.wait_with_output())
            .await
            .map_err(|_| {
                warn!("yt-dlp timed out after {}s for {}", self.timeout_secs, url);
                ResolveError::Timeout(self.timeout_secs)
            })?
            .map_err(|e| ResolveError::Spawn(e.to_string()))?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        for line in stderr.lines() {
            debug!(target: "ytdlp", "{}", line);
        }

        if !output.status.success() {
            let cause = error_summary(&stderr)
                .unwrap_or_else(|| format!("yt-dlp exited with {}", output.status));
            warn!("yt-dlp failed for {}: {}", url, cause);
            return Err(ResolveError::Unavailable(cause));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let video = DumpJson::from_json(&stdout)?.into_resolved();
        info!("Resolved \"{}\" with {} direct streams", video.title, video.streams.len());
        Ok(video)
    }

    async fn open(&self, stream: &StreamDescriptor) -> ResolveResult<StreamBody> {
        self.fetcher.open(stream).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VIDEO_URL: &str = "https://www.youtube.com/watch?v=dQw4w9WgXcQ";

    #[test]
    fn test_error_summary_prefers_error_lines() {
        let stderr = "[youtube] abc: Downloading webpage\nERROR: [youtube] abc: Video unavailable\n";
        assert_eq!(error_summary(stderr).unwrap(), "ERROR: [youtube] abc: Video unavailable");
    }

    #[test]
    fn test_error_summary_falls_back_to_last_line() {
        assert_eq!(error_summary("first\n\nTraceback: boom\n\n").unwrap(), "Traceback: boom");
        assert!(error_summary("  \n").is_none());
    }

    #[test]
    fn test_find_ytdlp_explicit_path() {
        let exe = std::env::current_exe().unwrap();
        assert_eq!(find_ytdlp(Some(exe.as_path())), Some(exe.clone()));
    }

    #[test]
    fn test_discover_with_explicit_path() {
        let exe = std::env::current_exe().unwrap();
        let resolver = YtDlpResolver::discover(Some(exe.as_path()), 30).unwrap();
        assert_eq!(resolver.ytdlp_path, exe);
        assert_eq!(resolver.id(), "yt-dlp");
    }

    #[tokio::test]
    async fn test_resolve_rejects_invalid_url_without_spawning() {
        let resolver = YtDlpResolver::new(PathBuf::from("/nonexistent/yt-dlp"), 5);
        let err = resolver.resolve("not a url").await.unwrap_err();
        assert!(matches!(err, ResolveError::InvalidUrl(_)));
    }

    #[tokio::test]
    async fn test_resolve_missing_binary_is_infrastructure() {
        let resolver = YtDlpResolver::new(PathBuf::from("/nonexistent/yt-dlp"), 5);
        let err = resolver.resolve(VIDEO_URL).await.unwrap_err();
        assert!(err.is_infrastructure());
    }

    // Shell scripts stand in for the yt-dlp binary.
    #[cfg(unix)]
    mod subprocess {
        use super::*;
        use std::os::unix::fs::PermissionsExt;
        use tempfile::TempDir;

        /// Write an executable shell script standing in for yt-dlp.
        fn fake_ytdlp(dir: &TempDir, body: &str) -> PathBuf {
            let path = dir.path().join("yt-dlp");
            std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        #[tokio::test]
        async fn test_resolve_parses_tool_output() {
            let dir = TempDir::new().unwrap();
            let script = fake_ytdlp(
                &dir,
                r#"echo '{"title": "Clip", "duration": 12.4, "view_count": 7, "formats": [{"format_id": "18", "ext": "mp4", "url": "https://cdn.example/18", "protocol": "https", "vcodec": "avc1", "acodec": "mp4a", "height": 360}]}'"#,
            );
            let resolver = YtDlpResolver::new(script, 5);
            let video = resolver.resolve(VIDEO_URL).await.unwrap();
            assert_eq!(video.title, "Clip");
            assert_eq!(video.duration, Some(12));
            assert_eq!(video.streams.len(), 1);
            assert_eq!(video.streams[0].tag.as_str(), "18");
        }

        #[tokio::test]
        async fn test_resolve_times_out() {
            let dir = TempDir::new().unwrap();
            let script = fake_ytdlp(&dir, "exec sleep 10");
            let resolver = YtDlpResolver::new(script, 1);

            let started = std::time::Instant::now();
            let err = resolver.resolve(VIDEO_URL).await.unwrap_err();
            assert!(matches!(err, ResolveError::Timeout(1)));
            assert!(started.elapsed() < Duration::from_secs(5));
            assert!(!err.is_infrastructure());
        }

        #[tokio::test]
        async fn test_resolve_nonzero_exit_is_unavailable() {
            let dir = TempDir::new().unwrap();
            let script = fake_ytdlp(
                &dir,
                "echo '[youtube] x: Downloading webpage' >&2\necho 'ERROR: [youtube] x: Private video' >&2\nexit 1",
            );
            let resolver = YtDlpResolver::new(script, 5);
            match resolver.resolve(VIDEO_URL).await.unwrap_err() {
                ResolveError::Unavailable(cause) => assert_eq!(cause, "ERROR: [youtube] x: Private video"),
                other => panic!("unexpected error: {:?}", other),
            }
        }

        #[tokio::test]
        async fn test_resolve_silent_failure_reports_exit_status() {
            let dir = TempDir::new().unwrap();
            let script = fake_ytdlp(&dir, "exit 3");
            let resolver = YtDlpResolver::new(script, 5);
            match resolver.resolve(VIDEO_URL).await.unwrap_err() {
                ResolveError::Unavailable(cause) => assert!(cause.starts_with("yt-dlp exited with")),
                other => panic!("unexpected error: {:?}", other),
            }
        }

        #[tokio::test]
        async fn test_resolve_junk_output_is_malformed() {
            let dir = TempDir::new().unwrap();
            let script = fake_ytdlp(&dir, "echo 'this is not json'");
            let resolver = YtDlpResolver::new(script, 5);
            let err = resolver.resolve(VIDEO_URL).await.unwrap_err();
            assert!(matches!(err, ResolveError::Malformed(_)));
        }
    }
}
