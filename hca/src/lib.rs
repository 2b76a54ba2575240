//! HCA (High-Compression Audio) block decoder and random-access reader.
//!
//! HCA is a block-structured lossy audio codec used in game audio
//! distribution, usually embedded in AFS2 archives. Every block is
//! independently decodable: it carries a CRC-16, an optional
//! byte-substitution obfuscation layer, and eight MDCT sub-frames of 128
//! samples per channel.
//!
//! The central type is [`HcaDecoder`], which presents the decoded stream as
//! a seekable byte source (`std::io::Read + Seek`) whose logical content is
//! a synthesized RIFF/WAVE header followed by PCM audio. Decoded blocks are
//! memoized in a pluggable [`BlockCache`], and a marked loop region can be
//! virtually repeated a configured number of times within the seekable
//! output.
//!
//! ```no_run
//! use std::fs::File;
//! use std::io::Read;
//!
//! let file = File::open("bgm.hca").unwrap();
//! let mut decoder = hca::HcaDecoder::new(file).unwrap();
//! let mut wav = Vec::new();
//! decoder.read_to_end(&mut wav).unwrap();
//! ```

mod ath;
mod bitstream;
mod channel;
mod dsp;
mod wave;

pub mod cache;
pub mod checksum;
pub mod decoder;
pub mod error;
pub mod header;

pub use cache::{BlockCache, UnboundedBlockCache};
pub use decoder::{DecoderConfig, HcaDecoder, SampleFormat};
pub use error::Error;
pub use header::HcaInfo;

pub use hca_crypto::{CipherConfig, CipherType};

/// Result type for HCA operations
pub type Result<T> = std::result::Result<T, Error>;

/// Samples produced by one sub-frame, per channel.
pub const SAMPLES_PER_SUBFRAME: usize = 0x80;

/// Sub-frames in one compressed block.
pub const SUBFRAMES_PER_BLOCK: usize = 8;

/// Samples produced by one compressed block, per channel.
pub const SAMPLES_PER_BLOCK: usize = SAMPLES_PER_SUBFRAME * SUBFRAMES_PER_BLOCK;
