//! Error types for hca-crypto operations.

use thiserror::Error;

/// Errors that can occur during cipher initialization.
#[derive(Error, Debug)]
pub enum CryptoError {
    /// Cipher type is not 0, 1, or 56.
    #[error("unsupported cipher type: {0}")]
    UnsupportedCipherType(u16),
}
