//! Error types for HCA parsing and decoding

use thiserror::Error;

/// HCA error types
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid HCA signature
    #[error("Invalid HCA signature: expected [72, 67, 65, 0], got {0:?}")]
    InvalidMagic([u8; 4]),

    /// Malformed or out-of-range header field
    #[error("Invalid HCA header: {0}")]
    InvalidHeader(String),

    /// CRC-16 residue over a block (or the header prologue) was non-zero
    #[error("Checksum mismatch: residue {residue:#06x}")]
    ChecksumMismatch {
        /// CRC residue; a valid block folds to zero.
        residue: u16,
    },

    /// Block read came up short against the declared block size
    #[error("Truncated block {index}: expected {expected} bytes, got {actual}")]
    TruncatedBlock {
        /// Index of the block being fetched.
        index: u32,
        /// Declared block size.
        expected: usize,
        /// Bytes actually available.
        actual: usize,
    },

    /// Block did not start with the 0xFFFF sync word after deciphering
    #[error("Invalid block sync word: {0:#06x}")]
    InvalidSyncWord(u32),

    /// Bit reader ran past the end of the block buffer
    #[error("Bit stream overrun: {requested} bits requested at bit {position} of {size}")]
    BitstreamOverrun {
        /// Current bit position.
        position: usize,
        /// Bits requested.
        requested: usize,
        /// Total bits in the buffer.
        size: usize,
    },

    /// Channels-per-track value outside the stereo-expansion layout table
    #[error("Unsupported channel layout: {channels_per_track} channels per track")]
    UnsupportedChannelLayout {
        /// `channel_count / comp_r03`.
        channels_per_track: u32,
    },

    /// Looping was enabled with a loop count of zero
    #[error("Loop count must be at least 1 when looping is enabled")]
    InvalidLoopCount,

    /// ATH table type is not 0 or 1
    #[error("Unsupported ATH type: {0}")]
    UnsupportedAthType(u16),

    /// Cipher initialization error from hca-crypto
    #[error("Cipher error: {0}")]
    Crypto(#[from] hca_crypto::CryptoError),
}
