use thiserror::Error;

/// The relay's error taxonomy. Variant names match the "kind" column of the
/// error table in the design doc, not the call sites that produce them.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed frame: {0}")]
    Malformed(String),

    #[error("invalid: {0}")]
    Validation(String),

    #[error("restricted: {0}")]
    Restricted(String),

    #[error("rate-limited")]
    RateLimited,

    #[error("error: busy")]
    Transient,

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
