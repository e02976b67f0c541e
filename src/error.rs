// Error types for sonde
//
// Data-quality problems found while parsing are not errors here; they are
// collected as diagnostics on the metadata record. `Error` covers transport
// failures and API misuse.

use std::io;
use thiserror::Error;

/// Result type for sonde operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for sonde operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Integer width not supported by the requested decoding mode.
    #[error("unsupported integer width: {width} bytes (signed: {signed})")]
    UnsupportedWidth { width: usize, signed: bool },

    /// Synchsafe integers carry no sign bit.
    #[error("synchsafe integers cannot be signed")]
    SignedSynchsafe,

    /// Value cannot be represented in the requested width.
    #[error("value {value} does not fit in {width} bytes")]
    ValueOutOfRange { value: i128, width: usize },

    /// Structure declares more bytes than are available.
    #[error("truncated {what}: need {need} bytes, have {have}")]
    Truncated {
        what: &'static str,
        need: usize,
        have: usize,
    },

    /// Structurally invalid data.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Input does not start with the FLAC stream marker.
    #[error("not a native FLAC stream")]
    NotFlac,

    /// Metadata block payload exceeds the 24-bit length field.
    #[error("metadata block too large: {0} bytes")]
    BlockTooLarge(usize),

    /// Options file could not be parsed.
    #[error("invalid options: {0}")]
    Options(#[from] serde_json::Error),
}

impl Error {
    /// Create an invalid data error.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidData(msg.into())
    }

    pub(crate) fn truncated(what: &'static str, need: usize, have: usize) -> Self {
        Self::Truncated { what, need, have }
    }
}
