//! RIFF/WAVE header synthesis.
//!
//! The reader exposes decoded audio as a WAVE file, so a header describing
//! the PCM stream is fabricated once and served byte-for-byte from the start
//! of the logical stream. Sections, in order: `RIFF`/`WAVE`/`fmt `, an
//! optional `smpl` loop description, an optional `note` chunk carrying the
//! stream comment, and the `data` chunk header.

use byteorder::{LittleEndian, WriteBytesExt};
use std::io::Write;

use crate::decoder::DecoderConfig;
use crate::header::HcaInfo;
use crate::{Result, SAMPLES_PER_BLOCK};

/// RIFF + WAVE + `fmt ` section: 12-byte RIFF intro, 8-byte chunk header,
/// 16-byte PCM format payload.
const RIFF_SECTION_SIZE: u32 = 36;

/// `smpl` chunk with one sample loop.
const SMPL_SECTION_SIZE: u32 = 8 + 0x3C;

/// `data` chunk header.
const DATA_SECTION_SIZE: u32 = 8;

pub(crate) fn header_size(info: &HcaInfo, config: &DecoderConfig) -> u32 {
    let mut size = RIFF_SECTION_SIZE;
    if info.loop_exists && !config.soft_loop {
        size += SMPL_SECTION_SIZE;
    }
    if !info.comment.is_empty() {
        size += 8 + note_payload_size(info);
    }
    size + DATA_SECTION_SIZE
}

/// `note` payload: 4-byte id + comment + NUL, padded to a 4-byte boundary.
fn note_payload_size(info: &HcaInfo) -> u32 {
    let unpadded = 4 + info.comment.len() as u32 + 1;
    unpadded.next_multiple_of(4)
}

/// WAVE loop points in samples. Declared loops are block-aligned, offset at
/// the start by the stream's trailing-mute sample count; a soft loop spans
/// the whole stream.
fn loop_points(info: &HcaInfo, config: &DecoderConfig) -> (u32, u32) {
    if info.loop_exists {
        (
            info.loop_start * SAMPLES_PER_BLOCK as u32 + u32::from(info.fmt_r02),
            info.loop_end * SAMPLES_PER_BLOCK as u32,
        )
    } else if config.soft_loop {
        (0, info.block_count * SAMPLES_PER_BLOCK as u32)
    } else {
        (0, 0)
    }
}

/// Size of the `data` chunk payload: the whole stream plus the loop region
/// repeated `loop_count` more times.
fn data_size(info: &HcaInfo, config: &DecoderConfig) -> u32 {
    let (loop_start, loop_end) = loop_points(info, config);
    let samples =
        info.block_count * SAMPLES_PER_BLOCK as u32 + loop_end.saturating_sub(loop_start) * config.loop_count;
    u32::from(sampling_size(info, config)) * samples
}

/// Bytes per sample frame across all channels.
fn sampling_size(info: &HcaInfo, config: &DecoderConfig) -> u16 {
    config.sample_format.bit_depth() / 8 * info.channel_count as u16
}

/// Write the header to `out`, section by section.
pub(crate) fn generate<W: Write>(out: &mut W, info: &HcaInfo, config: &DecoderConfig) -> Result<()> {
    let sampling_size = sampling_size(info, config);
    let data_size = data_size(info, config);
    let (loop_start, loop_end) = loop_points(info, config);
    let emit_smpl = info.loop_exists && !config.soft_loop;
    let emit_note = !info.comment.is_empty();

    let riff_size = 0x1C
        + if emit_smpl { SMPL_SECTION_SIZE } else { 0 }
        + if emit_note {
            8 + note_payload_size(info)
        } else {
            0
        }
        + DATA_SECTION_SIZE
        + data_size;

    out.write_all(b"RIFF")?;
    out.write_u32::<LittleEndian>(riff_size)?;
    out.write_all(b"WAVE")?;
    out.write_all(b"fmt ")?;
    out.write_u32::<LittleEndian>(0x10)?;
    out.write_u16::<LittleEndian>(config.sample_format.format_tag())?;
    out.write_u16::<LittleEndian>(info.channel_count as u16)?;
    out.write_u32::<LittleEndian>(info.sampling_rate)?;
    out.write_u32::<LittleEndian>(info.sampling_rate * u32::from(sampling_size))?;
    out.write_u16::<LittleEndian>(sampling_size)?;
    out.write_u16::<LittleEndian>(config.sample_format.bit_depth())?;

    if emit_smpl {
        let sample_period = (1.0 / f64::from(info.sampling_rate) * 1_000_000_000.0) as u32;
        let play_count = if info.loop_r01 == 0x80 {
            0
        } else {
            u32::from(info.loop_r01)
        };
        out.write_all(b"smpl")?;
        out.write_u32::<LittleEndian>(0x3C)?;
        out.write_u32::<LittleEndian>(0)?; // manufacturer
        out.write_u32::<LittleEndian>(0)?; // product
        out.write_u32::<LittleEndian>(sample_period)?;
        out.write_u32::<LittleEndian>(0x3C)?; // MIDI unity note
        out.write_u32::<LittleEndian>(0)?; // MIDI pitch fraction
        out.write_u32::<LittleEndian>(0)?; // SMPTE format
        out.write_u32::<LittleEndian>(0)?; // SMPTE offset
        out.write_u32::<LittleEndian>(1)?; // sample loop count
        out.write_u32::<LittleEndian>(0x18)?; // sampler data
        out.write_u32::<LittleEndian>(0)?; // loop id
        out.write_u32::<LittleEndian>(0)?; // loop type (forward)
        out.write_u32::<LittleEndian>(loop_start)?;
        out.write_u32::<LittleEndian>(loop_end)?;
        out.write_u32::<LittleEndian>(0)?; // fraction
        out.write_u32::<LittleEndian>(play_count)?;
    }

    if emit_note {
        let payload = note_payload_size(info);
        out.write_all(b"note")?;
        out.write_u32::<LittleEndian>(payload)?;
        out.write_u32::<LittleEndian>(0)?; // note id
        out.write_all(&info.comment)?;
        let pad = payload as usize - 4 - info.comment.len();
        out.write_all(&vec![0u8; pad])?;
    }

    out.write_all(b"data")?;
    out.write_u32::<LittleEndian>(data_size)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::SampleFormat;

    fn base_info() -> HcaInfo {
        HcaInfo {
            version: 0x0200,
            data_offset: 0x60,
            channel_count: 2,
            sampling_rate: 44100,
            block_count: 16,
            block_size: 0x60,
            fmt_r01: 0,
            fmt_r02: 0,
            comp_r01: 1,
            comp_r02: 15,
            comp_r03: 1,
            comp_r04: 1,
            comp_r05: 128,
            comp_r06: 128,
            comp_r07: 0,
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

    fn generate_vec(info: &HcaInfo, config: &DecoderConfig) -> Vec<u8> {
        let mut out = Vec::new();
        generate(&mut out, info, config).unwrap();
        out
    }

    fn read_u32(buf: &[u8], at: usize) -> u32 {
        u32::from_le_bytes(buf[at..at + 4].try_into().unwrap())
    }

    fn read_u16(buf: &[u8], at: usize) -> u16 {
        u16::from_le_bytes(buf[at..at + 2].try_into().unwrap())
    }

    #[test]
    fn test_plain_header_layout() {
        let info = base_info();
        let config = DecoderConfig::default();
        let header = generate_vec(&info, &config);

        assert_eq!(header.len(), 44);
        assert_eq!(header.len() as u32, header_size(&info, &config));
        assert_eq!(&header[0..4], b"RIFF");
        assert_eq!(&header[8..12], b"WAVE");
        assert_eq!(&header[12..16], b"fmt ");
        assert_eq!(read_u16(&header, 20), 1); // PCM
        assert_eq!(read_u16(&header, 22), 2); // channels
        assert_eq!(read_u32(&header, 24), 44100);
        assert_eq!(read_u32(&header, 28), 44100 * 4); // byte rate
        assert_eq!(read_u16(&header, 32), 4); // frame size
        assert_eq!(read_u16(&header, 34), 16); // bit depth
        assert_eq!(&header[36..40], b"data");

        let data_size = read_u32(&header, 40);
        assert_eq!(data_size, 4 * 16 * SAMPLES_PER_BLOCK as u32);
        assert_eq!(read_u32(&header, 4), 0x1C + 8 + data_size);
    }

    #[test]
    fn test_float_format_header() {
        let info = base_info();
        let config = DecoderConfig {
            sample_format: SampleFormat::Float32,
            ..DecoderConfig::default()
        };
        let header = generate_vec(&info, &config);
        assert_eq!(read_u16(&header, 20), 3); // IEEE float
        assert_eq!(read_u16(&header, 34), 32);
        assert_eq!(read_u16(&header, 32), 8);
    }

    #[test]
    fn test_loop_header_has_smpl() {
        let mut info = base_info();
        info.loop_exists = true;
        info.loop_start = 2;
        info.loop_end = 9;
        info.loop_r01 = 0x80;
        info.fmt_r02 = 0x60;
        let config = DecoderConfig {
            loop_enabled: true,
            loop_count: 3,
            ..DecoderConfig::default()
        };
        let header = generate_vec(&info, &config);
        assert_eq!(header.len(), 44 + 68);
        assert_eq!(&header[36..40], b"smpl");

        let loop_start = read_u32(&header, 36 + 8 + 11 * 4);
        let loop_end = read_u32(&header, 36 + 8 + 12 * 4);
        assert_eq!(loop_start, 2 * 1024 + 0x60);
        assert_eq!(loop_end, 9 * 1024);
        // Raw play count 0x80 publishes as "infinite".
        let play_count = read_u32(&header, 36 + 8 + 14 * 4);
        assert_eq!(play_count, 0);

        // The loop region is counted loop_count more times in data size.
        let data_size = read_u32(&header, 36 + 68 + 4);
        assert_eq!(
            data_size,
            4 * (16 * 1024 + (loop_end - loop_start) * 3)
        );
    }

    #[test]
    fn test_soft_loop_suppresses_smpl() {
        let mut info = base_info();
        info.loop_exists = true;
        info.loop_end = 9;
        let config = DecoderConfig {
            soft_loop: true,
            ..DecoderConfig::default()
        };
        let header = generate_vec(&info, &config);
        assert_eq!(header.len(), 44);
        assert_eq!(&header[36..40], b"data");
    }

    #[test]
    fn test_note_chunk_padded() {
        let mut info = base_info();
        info.comment = b"looped bgm".to_vec();
        let config = DecoderConfig::default();
        let header = generate_vec(&info, &config);

        // 4 + 10 + 1 = 15, padded to 16.
        assert_eq!(note_payload_size(&info), 16);
        assert_eq!(header.len() as u32, 36 + 8 + 16 + 8);
        assert_eq!(&header[36..40], b"note");
        assert_eq!(&header[44..48], &[0u8; 4]);
        assert_eq!(&header[48..58], b"looped bgm");
        assert_eq!(header[58], 0);
        assert_eq!(&header[60..64], b"data");
    }
}
