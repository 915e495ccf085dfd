/// Tubeproxy stream resolution and relay engine.
///
/// Wraps yt-dlp behind the [`resolver::Resolver`] trait, relays upstream
/// bodies in bounded chunks, and publishes transfer progress.
pub mod progress;
pub mod resolver;
pub mod transfer;
pub mod ytdlp;

pub use resolver::{ByteStream, Resolver, StreamBody};
pub use ytdlp::YtDlpResolver;
