//! Error types for the SAVIME client.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Primary error type for client operations.
///
/// Connection- and handle-level variants abort the whole query; the
/// per-element import variants are recoverable at block granularity (the
/// affected block is dropped and the protocol loop continues).
#[derive(Debug, Error)]
pub enum Error {
    /// Lifecycle misuse (double open/close) or a transport handle that
    /// reports an invalid state.
    #[error("connection failure: {0}")]
    ConnectionFailure(String),

    /// The result handle reports the query as not executed. Authoritative;
    /// checked before any textual heuristic.
    #[error("query handle failure: {0}")]
    QueryHandleFailure(String),

    /// The response text carries the server's error marker even though the
    /// handle reports success. Surfaced only in strict mode.
    #[error("silently failed query: {0}")]
    SilentQueryError(String),

    /// Payload length inspection failed for a required element.
    #[error("buffer import failed for element '{element}': {source}")]
    BufferImportFailed {
        element: String,
        #[source]
        source: std::io::Error,
    },

    /// Read-only mapping of an element payload failed.
    #[error("mmap failed for element '{element}': {source}")]
    MMapFailed {
        element: String,
        #[source]
        source: std::io::Error,
    },

    /// The native client library could not be loaded or resolved.
    #[error("client runtime unavailable: {0}")]
    Runtime(String),

    /// Data variables cannot form a consistent block.
    #[error("incompatible block: {0}")]
    IncompatibleBlock(String),
}

impl Error {
    /// True for failures that drop a single block without aborting the
    /// surrounding protocol loop.
    pub fn is_block_recoverable(&self) -> bool {
        matches!(
            self,
            Error::BufferImportFailed { .. } | Error::MMapFailed { .. } | Error::IncompatibleBlock(_)
        )
    }
}
