//! Descrambling support for HCA audio streams.
//!
//! HCA obfuscates compressed blocks with a 256-entry byte-substitution
//! cipher. Three table constructions exist:
//!
//! - **Type 0** — identity (no obfuscation)
//! - **Type 1** — a fixed scramble shared by every stream
//! - **Type 56** — keyed by a 64-bit value, optionally rescaled by the
//!   16-bit modifier carried in the enclosing AFS2 archive
//!
//! Substitution is independent per byte; there is no chaining, so blocks can
//! be deciphered in any order.

pub mod cipher;
pub mod error;

pub use cipher::{Cipher, CipherConfig, CipherType};
pub use error::CryptoError;

/// Result type for crypto operations.
pub type Result<T> = std::result::Result<T, CryptoError>;
