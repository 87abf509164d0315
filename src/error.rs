use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The core file could not be loaded for module enumeration.
    /// Callers degrade to zero discovered modules instead of failing.
    #[error("introspection unavailable: {0}")]
    Introspection(String),

    #[error("remote service error: {0}")]
    Remote(String),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
