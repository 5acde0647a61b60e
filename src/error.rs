//! Error types for braid
//!
//! Provides a unified error type for all operations.

use std::fmt;
use std::io;

use thiserror::Error;

/// Result type alias using BraidError
pub type Result<T> = std::result::Result<T, BraidError>;

/// Why a stitch or seam operation was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StitchErrorReason {
    /// Slice offset lies beyond the end of the range
    OffsetOutOfBounds,

    /// Slice offset + count runs past the end of the range
    CountTooLong,

    /// Two stitches in one seam overlap
    Collision,
}

impl fmt::Display for StitchErrorReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StitchErrorReason::OffsetOutOfBounds => f.write_str("offset out of bounds"),
            StitchErrorReason::CountTooLong => f.write_str("count too long"),
            StitchErrorReason::Collision => f.write_str("stitches collide"),
        }
    }
}

/// Unified error type for braid operations
#[derive(Debug, Error)]
pub enum BraidError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Unexpected end of medium")]
    EndOfMedium,

    // -------------------------------------------------------------------------
    // Format Errors
    // -------------------------------------------------------------------------
    #[error("Not a valid braid: {0}")]
    NotValid(String),

    #[error("Encoding error: {0}")]
    Encoding(String),

    // -------------------------------------------------------------------------
    // Range Arithmetic Errors
    // -------------------------------------------------------------------------
    #[error("Stitch error: {0}")]
    Stitch(StitchErrorReason),

    // -------------------------------------------------------------------------
    // Usage Errors
    // -------------------------------------------------------------------------
    #[error("Strand id 0 is reserved")]
    InvalidStrandId,

    #[error("Unknown strand: {0}")]
    UnknownStrand(u32),

    #[error("Braid is closed")]
    Closed,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Task produced {actual}, expected {expected}")]
    WrongTaskOutput {
        expected: &'static str,
        actual: &'static str,
    },

    // -------------------------------------------------------------------------
    // Internal Consistency Errors
    // -------------------------------------------------------------------------
    #[error("Header size changed: expected {expected} bytes, got {actual}")]
    HeaderSizeChanged { expected: u64, actual: u64 },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<StitchErrorReason> for BraidError {
    fn from(reason: StitchErrorReason) -> Self {
        BraidError::Stitch(reason)
    }
}

impl From<bincode::Error> for BraidError {
    fn from(err: bincode::Error) -> Self {
        BraidError::Encoding(err.to_string())
    }
}

impl From<BraidError> for io::Error {
    fn from(err: BraidError) -> Self {
        match err {
            BraidError::Io(e) => e,
            BraidError::EndOfMedium => io::Error::new(io::ErrorKind::UnexpectedEof, err),
            BraidError::Closed => io::Error::new(io::ErrorKind::BrokenPipe, err),
            BraidError::InvalidArgument(_) | BraidError::InvalidStrandId => {
                io::Error::new(io::ErrorKind::InvalidInput, err)
            }
            BraidError::UnknownStrand(_) => io::Error::new(io::ErrorKind::NotFound, err),
            BraidError::NotValid(_) | BraidError::Encoding(_) => {
                io::Error::new(io::ErrorKind::InvalidData, err)
            }
            other => io::Error::new(io::ErrorKind::Other, other),
        }
    }
}
