//! Error types for AFS2 archive parsing

use thiserror::Error;

/// AFS2 error types
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid AFS2 signature
    #[error("Invalid AFS2 signature: expected [65, 70, 83, 50], got {0:?}")]
    InvalidMagic([u8; 4]),

    /// File count exceeds the 16-bit cue id space
    #[error("File count exceeds max file entries: {0}")]
    TooManyEntries(i32),

    /// Offset field size outside the 1..=4 range encoded by the version word
    #[error("Invalid offset field size: {0}")]
    InvalidOffsetFieldSize(u8),

    /// Byte alignment of zero cannot be used for offset rounding
    #[error("Invalid byte alignment: {0}")]
    InvalidAlignment(u32),

    /// Directory offsets must be non-decreasing in physical order
    #[error("Directory offsets are not monotonic at cue {0}")]
    NonMonotonicOffsets(u16),

    /// Cue id not present in the directory
    #[error("Cue id not found: {0}")]
    CueNotFound(u16),
}
