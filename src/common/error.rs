//! Error types for btreedb.

use thiserror::Error;

/// Convenient Result type alias.
///
/// Instead of writing `Result<T, Error>` everywhere, we can write `Result<T>`.
pub type Result<T> = std::result::Result<T, Error>;

/// All possible errors in btreedb.
///
/// `KeyNotFound` and `KeyExists` are ordinary outcomes of normal use.
/// `Corruption`, `Io` and `InvalidConfig` are fatal to the handle that
/// reported them: close it and reopen or rebuild the file.
#[derive(Debug, Error)]
pub enum Error {
    /// The key is not in the tree (delete of an absent key).
    #[error("key not found")]
    KeyNotFound,

    /// The key is already in the tree (put of a present key).
    #[error("key already exists")]
    KeyExists,

    /// A page failed a structural check: bad checksum, unknown tag,
    /// out-of-order keys, occupancy out of bounds, or a dangling page id.
    #[error("corruption: {0}")]
    Corruption(String),

    /// A size limit was exceeded: key/value too long, node does not fit a
    /// page, or the page-id space is used up.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// I/O error from disk operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Options are invalid or do not match the file being opened.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Whether the handle that produced this error should be discarded.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Corruption(_) | Error::Io(_) | Error::InvalidConfig(_)
        )
    }

    pub(crate) fn corruption(msg: impl Into<String>) -> Self {
        Error::Corruption(msg.into())
    }
}
