use std::io;
use std::path::Path;

/// Canonical result type for Packship code
pub type Result<T> = std::result::Result<T, PackshipError>;

/// Common error type for Packship operations
#[derive(Debug, thiserror::Error)]
pub enum PackshipError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Manifest error: {0}")]
    Manifest(String),

    #[error("Exports error: {0}")]
    Exports(String),

    #[error("Git error: {0}")]
    Git(String),

    #[error("Command error: {0}")]
    Command(String),

    #[error("GitHub error: {0}")]
    GitHub(String),

    #[error("Registry error: {0}")]
    Registry(String),

    #[error("Publish error: {0}")]
    Publish(String),

    #[error("Release error: {0}")]
    Release(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

/// Helper to create an IO error with file path context
pub fn io_error_with_path<P: AsRef<Path>>(error: io::Error, path: P) -> io::Error {
    io::Error::new(
        error.kind(),
        format!("{}: {}", path.as_ref().display(), error),
    )
}
