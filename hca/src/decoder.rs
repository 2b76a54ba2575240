//! The HCA random-access reader.
//!
//! [`HcaDecoder`] wraps a seekable byte stream holding an HCA file and
//! presents the decoded result as another seekable byte stream whose logical
//! content is `[ optional WAVE header ][ PCM audio, looped if requested ]`.
//!
//! Blocks are fetched, checked, deciphered, and synthesized on demand; the
//! resulting PCM blocks are memoized in a [`BlockCache`] so backward seeks
//! and loop playback never decode twice.

use std::io::{self, Read, Seek, SeekFrom};
use tracing::{debug, trace};

use hca_crypto::{Cipher, CipherConfig, CipherType};

use crate::ath::AthTable;
use crate::bitstream::BitReader;
use crate::cache::{BlockCache, UnboundedBlockCache};
use crate::channel::{Channel, STEREO_PRIMARY, STEREO_SECONDARY};
use crate::checksum;
use crate::dsp::Imdct;
use crate::header::HcaInfo;
use crate::wave;
use crate::{Error, Result, SAMPLES_PER_BLOCK, SAMPLES_PER_SUBFRAME, SUBFRAMES_PER_BLOCK};

/// PCM sample encoding used for the decoded stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SampleFormat {
    /// Signed 16-bit little-endian integers.
    #[default]
    Pcm16,
    /// IEEE 754 32-bit little-endian floats.
    Float32,
}

impl SampleFormat {
    /// Bits per sample in the decoded stream.
    pub const fn bit_depth(self) -> u16 {
        match self {
            Self::Pcm16 => 16,
            Self::Float32 => 32,
        }
    }

    /// WAVE format tag: 1 for integer PCM, 3 for IEEE float.
    pub const fn format_tag(self) -> u16 {
        match self {
            Self::Pcm16 => 1,
            Self::Float32 => 3,
        }
    }

    /// Bytes per sample in the decoded stream.
    pub const fn bytes_per_sample(self) -> usize {
        self.bit_depth() as usize / 8
    }

    /// Append one clamped sample to the PCM buffer.
    fn write_sample(self, sample: f32, out: &mut Vec<u8>) {
        match self {
            Self::Pcm16 => {
                out.extend_from_slice(&((sample * 32767.0) as i16).to_le_bytes());
            }
            Self::Float32 => out.extend_from_slice(&sample.to_le_bytes()),
        }
    }
}

/// Decoder behavior switches.
#[derive(Debug, Clone, Copy)]
pub struct DecoderConfig {
    /// Cipher key material, plus an optional cipher-type override.
    pub cipher: CipherConfig,

    /// Repeat the stream's loop region inside the seekable output.
    pub loop_enabled: bool,

    /// Additional repetitions of the loop region; must be at least 1 when
    /// `loop_enabled` is set and the stream declares a loop.
    pub loop_count: u32,

    /// Prepend the synthesized WAVE header to the output.
    pub wave_header_enabled: bool,

    /// Suppress the `smpl` chunk and advertise a whole-stream loop instead,
    /// for players that handle looping themselves.
    pub soft_loop: bool,

    /// PCM sample encoding.
    pub sample_format: SampleFormat,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            cipher: CipherConfig::default(),
            loop_enabled: false,
            loop_count: 0,
            wave_header_enabled: true,
            soft_loop: false,
            sample_format: SampleFormat::default(),
        }
    }
}

/// Random-access reader over a decoded HCA stream.
///
/// Implements [`Read`] and [`Seek`] over the logical WAVE output. A reader
/// instance is single-threaded: its position, block cache, and lazily built
/// header buffer are all mutable state.
pub struct HcaDecoder<R> {
    stream: R,
    /// Stream offset where the HCA prologue began.
    base_offset: u64,
    info: HcaInfo,
    config: DecoderConfig,
    cipher: Cipher,
    ath: AthTable,
    channels: Vec<Channel>,
    imdct: Imdct,
    /// Compressed-block scratch, reused across fetches.
    block_buffer: Vec<u8>,
    cache: Box<dyn BlockCache>,
    wave_header: Option<Vec<u8>>,
    position: u64,
}

impl<R: Read + Seek> HcaDecoder<R> {
    /// Open a decoder with default configuration.
    pub fn new(stream: R) -> Result<Self> {
        Self::with_config(stream, DecoderConfig::default())
    }

    /// Open a decoder with explicit configuration.
    pub fn with_config(stream: R, config: DecoderConfig) -> Result<Self> {
        Self::with_cache(stream, config, Box::new(UnboundedBlockCache::default()))
    }

    /// Open a decoder with a caller-supplied block cache policy.
    pub fn with_cache(
        mut stream: R,
        config: DecoderConfig,
        cache: Box<dyn BlockCache>,
    ) -> Result<Self> {
        let base_offset = stream.stream_position()?;
        let info = HcaInfo::parse(&mut stream)?;

        let ath = AthTable::new(info.ath_type, info.sampling_rate)?;
        let cipher_type = match config.cipher.cipher_type {
            Some(forced) => forced,
            None => CipherType::from_u16(info.cipher_type)?,
        };
        let cipher = Cipher::new(cipher_type, config.cipher.effective_key());

        let roles = channel_roles(&info)?;
        let hfr_base = usize::from(info.comp_r06) + usize::from(info.comp_r07);
        let channels = (0..info.channel_count as usize)
            .map(|i| {
                let role = roles[i];
                let count = usize::from(info.comp_r06)
                    + if role == STEREO_SECONDARY {
                        0
                    } else {
                        usize::from(info.comp_r07)
                    };
                Channel::new(role, hfr_base, count)
            })
            .collect();

        debug!(
            channels = info.channel_count,
            rate = info.sampling_rate,
            blocks = info.block_count,
            ?cipher_type,
            "opened HCA decoder"
        );

        let block_buffer = vec![0u8; usize::from(info.block_size)];
        Ok(Self {
            stream,
            base_offset,
            info,
            config,
            cipher,
            ath,
            channels,
            imdct: Imdct::new(),
            block_buffer,
            cache,
            wave_header: None,
            position: 0,
        })
    }

    /// The parsed stream descriptor.
    pub fn info(&self) -> &HcaInfo {
        &self.info
    }

    /// Current linear position in the logical output stream.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Set the linear position. Positions past the end are allowed and yield
    /// empty reads.
    pub fn set_position(&mut self, position: u64) {
        self.position = position;
    }

    /// Size in bytes of one decoded PCM block.
    pub fn wave_block_size(&self) -> usize {
        SAMPLES_PER_BLOCK * self.config.sample_format.bytes_per_sample()
            * self.info.channel_count as usize
    }

    /// Size in bytes of the synthesized WAVE header.
    pub fn wave_header_size(&self) -> u32 {
        wave::header_size(&self.info, &self.config)
    }

    /// Total length of the logical output stream.
    ///
    /// Fails with [`Error::InvalidLoopCount`] if looping is enabled with a
    /// zero loop count.
    pub fn length(&self) -> Result<u64> {
        let header = u64::from(self.effective_header_size());
        let wbs = self.wave_block_size() as u64;
        if self.info.loop_exists && self.config.loop_enabled {
            if self.config.loop_count == 0 {
                return Err(Error::InvalidLoopCount);
            }
            let before = u64::from(self.info.loop_start.saturating_sub(1));
            let after = u64::from(self.info.block_count - 1 - self.info.loop_end);
            let in_loop = u64::from(self.info.loop_end - self.info.loop_start + 1);
            Ok(header
                + (before + after) * wbs
                + in_loop * u64::from(self.config.loop_count) * wbs)
        } else {
            Ok(header + wbs * u64::from(self.info.block_count))
        }
    }

    /// Consume the decoder and return the underlying stream.
    pub fn into_inner(self) -> R {
        self.stream
    }

    fn effective_header_size(&self) -> u32 {
        if self.config.wave_header_enabled {
            self.wave_header_size()
        } else {
            0
        }
    }

    fn wave_header(&mut self) -> Result<&[u8]> {
        if self.wave_header.is_none() {
            debug!("synthesizing WAVE header");
            let mut header = Vec::with_capacity(self.wave_header_size() as usize);
            wave::generate(&mut header, &self.info, &self.config)?;
            self.wave_header = Some(header);
        }
        Ok(self.wave_header.as_deref().expect("header just generated"))
    }

    /// Map a linear output position to a physical one.
    ///
    /// Positions in the header or before the end of the first loop pass map
    /// to themselves. Beyond that, completed loop repetitions are subtracted
    /// along with the header size, so the result directly addresses audio
    /// bytes (`block index = value / wave_block_size`).
    pub fn map_looped_position(&self, linear: u64) -> Result<u64> {
        if !self.info.loop_exists || !self.config.loop_enabled {
            return Ok(linear);
        }
        let header = u64::from(self.effective_header_size());
        let wbs = self.wave_block_size() as u64;
        let before = u64::from(self.info.loop_start.saturating_sub(1));
        let in_loop = u64::from(self.info.loop_end - self.info.loop_start + 1);
        if linear <= header + (before + in_loop) * wbs {
            return Ok(linear);
        }
        if self.config.loop_count == 0 {
            return Err(Error::InvalidLoopCount);
        }
        let repeats = ((linear - header - before * wbs) / (in_loop * wbs))
            .min(u64::from(self.config.loop_count));
        Ok(linear - repeats * in_loop * wbs - header)
    }

    /// Decode block `block_index`, consulting the cache first.
    ///
    /// A failed decode leaves the cache untouched; the caller may seek
    /// elsewhere and keep reading.
    pub fn decode_block(&mut self, block_index: u32) -> Result<&[u8]> {
        if self.cache.get(block_index).is_none() {
            let pcm = self.decode_block_uncached(block_index)?;
            self.cache.insert(block_index, pcm);
        }
        Ok(self.cache.get(block_index).expect("block cached on decode"))
    }

    fn decode_block_uncached(&mut self, block_index: u32) -> Result<Vec<u8>> {
        let block_size = usize::from(self.info.block_size);
        let offset = self.base_offset
            + u64::from(self.info.data_offset)
            + u64::from(self.info.block_size) * u64::from(block_index);
        self.stream.seek(SeekFrom::Start(offset))?;

        let mut filled = 0;
        while filled < block_size {
            let n = self.stream.read(&mut self.block_buffer[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        if filled < block_size {
            return Err(Error::TruncatedBlock {
                index: block_index,
                expected: block_size,
                actual: filled,
            });
        }

        trace!(block_index, "decoding block");

        let residue = checksum::compute(&self.block_buffer);
        if residue != 0 {
            return Err(Error::ChecksumMismatch { residue });
        }

        self.cipher.decrypt(&mut self.block_buffer);

        decode_audio(
            &self.block_buffer,
            &self.info,
            &self.ath,
            &mut self.channels,
            &self.imdct,
        )?;

        Ok(emit_pcm(&self.channels, &self.info, self.config.sample_format))
    }

    fn read_inner(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let total = self.length()?;
        let header = u64::from(self.effective_header_size());
        let mut position = self.position;
        let mut written = 0usize;

        // The header region maps to itself, so it can be served in one copy.
        if position < header {
            let available = (header - position) as usize;
            let n = available.min(buf.len());
            let header_buf = self.wave_header()?;
            buf[..n].copy_from_slice(&header_buf[position as usize..position as usize + n]);
            position += n as u64;
            written += n;
        }

        while written < buf.len() && position < total {
            let mapped = self.map_looped_position(position)?;
            // Inside the first loop pass the mapping is the identity and the
            // value still counts the header; afterwards it is already an
            // audio byte address.
            let audio = if mapped == position {
                mapped - header
            } else {
                mapped
            };
            let wbs = self.wave_block_size() as u64;
            let block_index = (audio / wbs) as u32;
            let intra = (audio % wbs) as usize;

            let chunk = (wbs - audio % wbs)
                .min((buf.len() - written) as u64)
                .min(total - position) as usize;
            let block = self.decode_block(block_index)?;
            buf[written..written + chunk].copy_from_slice(&block[intra..intra + chunk]);
            position += chunk as u64;
            written += chunk;
        }

        self.position = position;
        Ok(written)
    }
}

impl<R: Read + Seek> Read for HcaDecoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_inner(buf).map_err(|e| match e {
            Error::Io(io) => io,
            other => io::Error::other(other),
        })
    }
}

impl<R: Read + Seek> Seek for HcaDecoder<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(p) => i128::from(p),
            SeekFrom::End(offset) => {
                let length = self.length().map_err(io::Error::other)?;
                i128::from(length) + i128::from(offset)
            }
            SeekFrom::Current(offset) => i128::from(self.position) + i128::from(offset),
        };
        if target < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before the start of the stream",
            ));
        }
        self.position = target as u64;
        Ok(self.position)
    }
}

/// Stereo-expansion layout: assign primary/secondary roles within each track
/// of `channel_count / comp_r03` channels.
fn channel_roles(info: &HcaInfo) -> Result<[u8; 16]> {
    let mut roles = [0u8; 16];
    let tracks = u32::from(info.comp_r03);
    let per_track = info.channel_count / tracks;
    if info.comp_r07 == 0 || per_track <= 1 {
        return Ok(roles);
    }
    for track in 0..tracks as usize {
        let group = &mut roles[track * per_track as usize..];
        match per_track {
            2 | 3 => {
                group[0] = STEREO_PRIMARY;
                group[1] = STEREO_SECONDARY;
            }
            4 => {
                group[0] = STEREO_PRIMARY;
                group[1] = STEREO_SECONDARY;
                if info.comp_r04 == 0 {
                    group[2] = STEREO_PRIMARY;
                    group[3] = STEREO_SECONDARY;
                }
            }
            5 => {
                group[0] = STEREO_PRIMARY;
                group[1] = STEREO_SECONDARY;
                if info.comp_r04 <= 2 {
                    group[3] = STEREO_PRIMARY;
                    group[4] = STEREO_SECONDARY;
                }
            }
            6 | 7 => {
                group[0] = STEREO_PRIMARY;
                group[1] = STEREO_SECONDARY;
                group[4] = STEREO_PRIMARY;
                group[5] = STEREO_SECONDARY;
                group[6] = STEREO_PRIMARY;
                group[7] = STEREO_SECONDARY;
            }
            8 => {
                group[6] = STEREO_PRIMARY;
                group[7] = STEREO_SECONDARY;
            }
            other => {
                return Err(Error::UnsupportedChannelLayout {
                    channels_per_track: other,
                });
            }
        }
    }
    Ok(roles)
}

/// Bit-unpack and synthesize one deciphered block into the channels' wave
/// matrices.
///
/// Within each sub-frame every stage runs across all channels before the
/// next stage starts; intensity-stereo recovery reads the neighbor channel's
/// dequantized spectra.
fn decode_audio(
    buffer: &[u8],
    info: &HcaInfo,
    ath: &AthTable,
    channels: &mut [Channel],
    imdct: &Imdct,
) -> Result<()> {
    let mut bits = BitReader::new(buffer);

    let sync = bits.read(16)?;
    if sync != 0xFFFF {
        return Err(Error::InvalidSyncWord(sync));
    }

    let packed_noise_level = ((bits.read(9)? as i32) << 8) - bits.read(7)? as i32;
    let hfr_groups = usize::from(info.comp_r09);
    for channel in channels.iter_mut() {
        channel.unpack_scalefactors(&mut bits, hfr_groups, packed_noise_level, ath.table())?;
    }

    let base_bands = usize::from(info.comp_r06) + usize::from(info.comp_r07);
    let total_bands = usize::from(info.comp_r05);
    for subframe in 0..SUBFRAMES_PER_BLOCK {
        for channel in channels.iter_mut() {
            channel.read_spectra(&mut bits)?;
        }
        for channel in channels.iter_mut() {
            channel.reconstruct_high_frequency(
                hfr_groups,
                usize::from(info.comp_r08),
                base_bands,
                total_bands,
            );
        }
        for pair in 0..channels.len().saturating_sub(1) {
            let (left, right) = channels.split_at_mut(pair + 1);
            Channel::apply_intensity_stereo(
                &mut left[pair],
                &mut right[0],
                subframe,
                total_bands - usize::from(info.comp_r06),
                usize::from(info.comp_r06),
                usize::from(info.comp_r07),
            );
        }
        for channel in channels.iter_mut() {
            channel.synthesize(subframe, imdct);
        }
    }
    Ok(())
}

/// Interleave the synthesized wave matrices into one PCM block:
/// sub-frame-major, then sample, then channel.
fn emit_pcm(channels: &[Channel], info: &HcaInfo, format: SampleFormat) -> Vec<u8> {
    let mut out =
        Vec::with_capacity(SAMPLES_PER_BLOCK * format.bytes_per_sample() * channels.len());
    for subframe in 0..SUBFRAMES_PER_BLOCK {
        for sample in 0..SAMPLES_PER_SUBFRAME {
            for channel in channels {
                let value = (channel.wave[subframe][sample] * info.rva_volume).clamp(-1.0, 1.0);
                format.write_sample(value, &mut out);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout_info(channels: u32, r03: u8, r04: u8, r07: u8) -> HcaInfo {
        HcaInfo {
            version: 0x0200,
            data_offset: 0x60,
            channel_count: channels,
            sampling_rate: 44100,
            block_count: 4,
            block_size: 0x60,
            fmt_r01: 0,
            fmt_r02: 0,
            comp_r01: 1,
            comp_r02: 15,
            comp_r03: r03,
            comp_r04: r04,
            comp_r05: 128,
            comp_r06: 120,
            comp_r07: r07,
            comp_r08: 0,
            comp_r09: 0,
            vbr_r01: 0,
            vbr_r02: 0,
            ath_type: 0,
            loop_exists: false,
            loop_start: 0,
            loop_end: 0,
            loop_r01: 0,
            loop_r02: 0x400,
            cipher_type: 0,
            rva_volume: 1.0,
            comment: Vec::new(),
        }
    }

    #[test]
    fn test_mono_has_no_stereo_pair() {
        let roles = channel_roles(&layout_info(1, 1, 0, 8)).unwrap();
        assert_eq!(&roles[..1], &[0]);
    }

    #[test]
    fn test_stereo_pair_assigned() {
        let roles = channel_roles(&layout_info(2, 1, 0, 8)).unwrap();
        assert_eq!(&roles[..2], &[STEREO_PRIMARY, STEREO_SECONDARY]);
    }

    #[test]
    fn test_no_stereo_bands_means_discrete() {
        let roles = channel_roles(&layout_info(2, 1, 0, 0)).unwrap();
        assert_eq!(&roles[..2], &[0, 0]);
    }

    #[test]
    fn test_quad_layout_depends_on_r04() {
        let paired = channel_roles(&layout_info(4, 1, 0, 8)).unwrap();
        assert_eq!(
            &paired[..4],
            &[
                STEREO_PRIMARY,
                STEREO_SECONDARY,
                STEREO_PRIMARY,
                STEREO_SECONDARY
            ]
        );

        let partial = channel_roles(&layout_info(4, 1, 1, 8)).unwrap();
        assert_eq!(&partial[..4], &[STEREO_PRIMARY, STEREO_SECONDARY, 0, 0]);
    }

    #[test]
    fn test_two_track_stereo() {
        let roles = channel_roles(&layout_info(4, 2, 0, 8)).unwrap();
        assert_eq!(
            &roles[..4],
            &[
                STEREO_PRIMARY,
                STEREO_SECONDARY,
                STEREO_PRIMARY,
                STEREO_SECONDARY
            ]
        );
    }

    #[test]
    fn test_unsupported_group_size() {
        let err = channel_roles(&layout_info(9, 1, 0, 8)).unwrap_err();
        assert!(matches!(
            err,
            Error::UnsupportedChannelLayout {
                channels_per_track: 9
            }
        ));
    }

    #[test]
    fn test_sample_format_constants() {
        assert_eq!(SampleFormat::Pcm16.bit_depth(), 16);
        assert_eq!(SampleFormat::Pcm16.format_tag(), 1);
        assert_eq!(SampleFormat::Pcm16.bytes_per_sample(), 2);
        assert_eq!(SampleFormat::Float32.bit_depth(), 32);
        assert_eq!(SampleFormat::Float32.format_tag(), 3);
        assert_eq!(SampleFormat::Float32.bytes_per_sample(), 4);
    }

    #[test]
    fn test_sample_conversion() {
        let mut out = Vec::new();
        SampleFormat::Pcm16.write_sample(1.0, &mut out);
        SampleFormat::Pcm16.write_sample(-1.0, &mut out);
        SampleFormat::Pcm16.write_sample(0.0, &mut out);
        assert_eq!(out, [0xFF, 0x7F, 0x01, 0x80, 0x00, 0x00]);

        let mut out = Vec::new();
        SampleFormat::Float32.write_sample(0.5, &mut out);
        assert_eq!(out, 0.5f32.to_le_bytes());
    }
}
