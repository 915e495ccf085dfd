/// Shared types for the Tubeproxy workspace.
///
/// Domain models, the resolver error type, and the yt-dlp JSON protocol.
pub mod errors;
pub mod models;
pub mod ytdlp_protocol;
