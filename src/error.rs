use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("video not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("unsupported video format: {}", .0.display())]
    UnsupportedFormat(PathBuf),

    #[error("stream url must start with http(s)://, rtsp:// or rtmp://: {0}")]
    InvalidStreamUrl(String),

    #[error("cannot open stream {url}: {reason}")]
    SourceUnreachable { url: String, reason: String },

    #[error("frame decode error: {0}")]
    Decode(String),

    #[error("detector error: {0}")]
    Detector(String),

    #[error("ocr error: {0}")]
    Ocr(String),

    #[error("failed to parse config {}: {source}", path.display())]
    Config {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "sqlite")]
    #[error("plate store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("plate store error: {0}")]
    Storage(String),
}
