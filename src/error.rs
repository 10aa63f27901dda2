//! Crate-wide error type.
//!
//! Every fallible operation in `abf` returns [`Result<T>`], an alias over
//! [`Error`]. The five variants correspond to the error kinds named in the
//! format specification: I/O failure, structural malformation, an
//! unsupported dialect, an out-of-range index, and invalid writer input.

use std::io;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Underlying file read/write failure.
    #[error("I/O error at offset {offset:?}: {source}")]
    Io {
        offset: Option<u64>,
        #[source]
        source: io::Error,
    },

    /// Signature mismatch, truncated section, or inconsistent section map.
    #[error("malformed ABF data at offset {offset}: {message}")]
    Format { offset: u64, message: String },

    /// ABF version >= 3, or a data format this crate does not decode (e.g. float64).
    #[error("unsupported ABF dialect: {0}")]
    UnsupportedDialect(String),

    /// A sweep, channel, or digital-bit index outside the recording's dimensions.
    #[error("{kind} index {index} out of range (0..{bound})")]
    OutOfRange {
        kind: &'static str,
        index: usize,
        bound: usize,
    },

    /// Writer arguments that are internally inconsistent.
    #[error("invalid writer input: {0}")]
    InvalidInput(String),
}

impl From<io::Error> for Error {
    fn from(source: io::Error) -> Self {
        Error::Io {
            offset: None,
            source,
        }
    }
}

impl Error {
    pub(crate) fn io_at(offset: u64, source: io::Error) -> Self {
        Error::Io {
            offset: Some(offset),
            source,
        }
    }

    pub(crate) fn format(offset: u64, message: impl Into<String>) -> Self {
        Error::Format {
            offset,
            message: message.into(),
        }
    }

    pub(crate) fn out_of_range(kind: &'static str, index: usize, bound: usize) -> Self {
        Error::OutOfRange { kind, index, bound }
    }
}
