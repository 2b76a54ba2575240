//! AFS2 (AWB) audio archive directory parsing.
//!
//! AFS2 is a simple indexed container used by game audio middleware to pack
//! one or more payload blobs (usually HCA streams) into a single file, keyed
//! by a 16-bit *cue id*. This crate parses the directory at the front of an
//! archive into an ordered table of `(cue id → byte range)` records; payload
//! decoding is out of scope and handled by the `hca` crate.
//!
//! The directory layout is:
//!
//! ```text
//! +0   4  "AFS2"
//! +4   4  version (u32 LE); byte (version >> 8) & 0xff = offset field size
//! +8   4  file count (i32 LE)
//! +12  4  low 16 bits = byte alignment, high 16 bits = HCA key modifier
//! +16     file_count * u16 LE cue ids
//! +..     (file_count + 1) * offset-field-size LE offsets (the extra entry
//!         is a sentinel marking the end of the last payload)
//! ```
//!
//! Payload offsets are relative to the archive base and rounded up to the
//! archive's byte alignment before use.

pub mod archive;
pub mod error;

pub use archive::{Afs2Archive, Afs2FileRecord, AFS2_SIGNATURE};
pub use error::Error;

/// Result type for AFS2 operations
pub type Result<T> = std::result::Result<T, Error>;
