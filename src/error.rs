//! Error types for Mach-O patching operations.
//!
//! The error set is deliberately flat: every failure maps onto one of the
//! process exit codes documented in the CLI, and patching aborts on the first
//! error rather than attempting recovery.

use std::path::PathBuf;

use thiserror::Error;

/// The main error type for patching operations.
#[derive(Error, Debug)]
pub enum Error {
    /// The input file could not be opened read/write.
    #[error("failed to open '{path}': {source}")]
    OpenFailed {
        /// Path of the file that could not be opened.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A short read or other I/O failure while reading file content.
    #[error("read failed: {0}")]
    ReadFailed(String),

    /// The file violates the Mach-O, coverage-map, or DWARF format.
    #[error("invalid file: {0}")]
    InvalidFile(String),

    /// A section or fat-arch buffer could not be allocated.
    #[error("out of memory allocating {needed} bytes")]
    OutOfMemory {
        /// Number of bytes that could not be allocated.
        needed: usize,
    },

    /// The input requires functionality that is intentionally unsupported.
    #[error("not implemented: {0}")]
    NotImplemented(String),

    /// Writing to the file, or to a non-existent section, failed.
    #[error("write failed: {0}")]
    WriteFailed(String),
}

/// A specialized Result type for patching operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Creates an invalid-file error with a formatted reason.
    #[inline]
    pub fn invalid(reason: impl Into<String>) -> Self {
        Error::InvalidFile(reason.into())
    }

    /// Returns the process exit code associated with this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            Error::OpenFailed { .. } => 10,
            Error::ReadFailed(_) => 11,
            Error::InvalidFile(_) => 12,
            Error::OutOfMemory { .. } => 13,
            Error::NotImplemented(_) => 14,
            Error::WriteFailed(_) => 20,
        }
    }
}

/// Outcome of a section write request.
///
/// A size-preserving write is applied to the file immediately; a
/// size-changing write is queued and applied when the owning slice is
/// serialized. Both are success states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStatus {
    /// The data was written to the file in place.
    Applied,
    /// The write was queued as a deferred section replacement.
    Deferred,
}
