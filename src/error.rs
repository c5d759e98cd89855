//! Error types for batchq.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// An explicit request key violated the key rules (too long, or
    /// contains a path separator).
    #[error("illegal request key: {0}")]
    InvalidKey(String),

    /// A persisted status string did not match any known status.
    #[error("unrecognized status: {0}")]
    InvalidStatus(String),

    /// Operation is declared in the queue contract but not built yet.
    #[error("operation not implemented: {0}")]
    Unimplemented(&'static str),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("store error: {0}")]
    Db(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
