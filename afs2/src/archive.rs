//! Parsing the AFS2 directory into a cue-id-keyed table.

use byteorder::{LittleEndian, ReadBytesExt};
use std::collections::BTreeMap;
use std::io::{Read, Seek, SeekFrom};
use tracing::debug;

use crate::{Error, Result};

/// AFS2 archive signature
pub const AFS2_SIGNATURE: [u8; 4] = [b'A', b'F', b'S', b'2'];

/// A single payload record in the archive directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Afs2FileRecord {
    /// 16-bit key identifying the payload within the archive.
    pub cue_id: u16,

    /// Absolute byte offset of the payload, before alignment.
    pub offset_raw: u64,

    /// `offset_raw` rounded up to the archive's byte alignment.
    pub offset_aligned: u64,

    /// Payload size in bytes, measured from the aligned offset.
    pub size: u64,
}

/// An AFS2 archive directory bound to its backing stream.
///
/// Constructed from a seekable stream and the byte offset where the archive
/// begins (archives are frequently embedded inside a larger host file). The
/// directory is parsed eagerly and is immutable afterwards.
///
/// Pass an owned reader to let the archive manage the stream's lifetime, or
/// `&mut R` to keep ownership at the call site.
#[derive(Debug)]
pub struct Afs2Archive<R> {
    stream: R,
    stream_offset: u64,
    name: Option<String>,
    version: u32,
    byte_alignment: u32,
    hca_key_modifier: u16,
    files: BTreeMap<u16, Afs2FileRecord>,
}

impl<R: Read + Seek> Afs2Archive<R> {
    /// Parse the archive directory starting at `offset`.
    pub fn parse(stream: R, offset: u64) -> Result<Self> {
        Self::parse_inner(stream, offset, None)
    }

    /// Parse the archive directory, attaching an advisory name (usually the
    /// host file name) for diagnostics.
    pub fn parse_named(stream: R, offset: u64, name: impl Into<String>) -> Result<Self> {
        Self::parse_inner(stream, offset, Some(name.into()))
    }

    /// Check whether `stream` holds an AFS2 signature at `offset`.
    ///
    /// The stream position is restored before returning.
    pub fn is_afs2(stream: &mut R, offset: u64) -> Result<bool> {
        let saved = stream.stream_position()?;
        stream.seek(SeekFrom::Start(offset))?;
        let mut signature = [0u8; 4];
        let matched = match stream.read_exact(&mut signature) {
            Ok(()) => signature == AFS2_SIGNATURE,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => false,
            Err(e) => {
                stream.seek(SeekFrom::Start(saved))?;
                return Err(e.into());
            }
        };
        stream.seek(SeekFrom::Start(saved))?;
        Ok(matched)
    }

    fn parse_inner(mut stream: R, offset: u64, name: Option<String>) -> Result<Self> {
        stream.seek(SeekFrom::Start(offset))?;

        let mut signature = [0u8; 4];
        stream.read_exact(&mut signature)?;
        if signature != AFS2_SIGNATURE {
            return Err(Error::InvalidMagic(signature));
        }

        let version = stream.read_u32::<LittleEndian>()?;
        let offset_field_size = ((version >> 8) & 0xff) as u8;
        if !(1..=4).contains(&offset_field_size) {
            return Err(Error::InvalidOffsetFieldSize(offset_field_size));
        }

        let file_count = stream.read_i32::<LittleEndian>()?;
        if file_count > i32::from(u16::MAX) || file_count < 0 {
            return Err(Error::TooManyEntries(file_count));
        }
        let file_count = file_count as usize;

        let alignment_word = stream.read_u32::<LittleEndian>()?;
        let byte_alignment = alignment_word & 0xffff;
        let hca_key_modifier = (alignment_word >> 16) as u16;
        if byte_alignment == 0 {
            return Err(Error::InvalidAlignment(byte_alignment));
        }

        debug!(
            version = format_args!("{version:#010x}"),
            file_count, byte_alignment, "parsing AFS2 directory"
        );

        let mut cue_ids = Vec::with_capacity(file_count);
        for _ in 0..file_count {
            cue_ids.push(stream.read_u16::<LittleEndian>()?);
        }

        // The offset table carries one extra sentinel entry marking the end
        // of the last payload. Entries are stored in 1-4 bytes each.
        let mut offsets = Vec::with_capacity(file_count + 1);
        for _ in 0..=file_count {
            let mut raw = [0u8; 4];
            stream.read_exact(&mut raw[..offset_field_size as usize])?;
            offsets.push(u64::from(u32::from_le_bytes(raw)) + offset);
        }

        let mut files: BTreeMap<u16, Afs2FileRecord> = BTreeMap::new();
        let mut prev_cue_id: Option<u16> = None;
        for (i, &cue_id) in cue_ids.iter().enumerate() {
            let offset_raw = offsets[i];
            let offset_aligned = round_up(offset_raw, u64::from(byte_alignment));

            let mut record = Afs2FileRecord {
                cue_id,
                offset_raw,
                offset_aligned,
                size: 0,
            };

            if i == file_count - 1 {
                record.size = offsets[file_count]
                    .checked_sub(offset_aligned)
                    .ok_or(Error::NonMonotonicOffsets(cue_id))?;
            }

            // Each payload runs up to the next entry's raw offset; the size
            // of the previous record is only known once this one is read.
            if let Some(prev) = prev_cue_id {
                let prev_record = files
                    .get_mut(&prev)
                    .expect("previous record was just inserted");
                prev_record.size = offset_raw
                    .checked_sub(prev_record.offset_aligned)
                    .ok_or(Error::NonMonotonicOffsets(cue_id))?;
            }

            files.insert(cue_id, record);
            prev_cue_id = Some(cue_id);
        }

        Ok(Self {
            stream,
            stream_offset: offset,
            name,
            version,
            byte_alignment,
            hca_key_modifier,
            files,
        })
    }

    /// Read the payload bytes for `cue_id` from the backing stream.
    pub fn read_file(&mut self, cue_id: u16) -> Result<Vec<u8>> {
        let record = *self.files.get(&cue_id).ok_or(Error::CueNotFound(cue_id))?;
        self.stream.seek(SeekFrom::Start(record.offset_aligned))?;
        let mut data = vec![0u8; record.size as usize];
        self.stream.read_exact(&mut data)?;
        Ok(data)
    }

    /// The parsed directory, keyed by cue id.
    pub fn files(&self) -> &BTreeMap<u16, Afs2FileRecord> {
        &self.files
    }

    /// Archive format version word.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Alignment applied to payload offsets, in bytes.
    pub fn byte_alignment(&self) -> u32 {
        self.byte_alignment
    }

    /// Key modifier for keyed HCA payloads, from the high half of the
    /// alignment word.
    pub fn hca_key_modifier(&self) -> u16 {
        self.hca_key_modifier
    }

    /// Byte offset where the archive begins inside the backing stream.
    pub fn stream_offset(&self) -> u64 {
        self.stream_offset
    }

    /// Advisory archive name, if one was attached at construction.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Borrow the backing stream.
    pub fn stream(&mut self) -> &mut R {
        &mut self.stream
    }

    /// Consume the archive and return the backing stream.
    pub fn into_inner(self) -> R {
        self.stream
    }
}

fn round_up(value: u64, alignment: u64) -> u64 {
    value.div_ceil(alignment) * alignment
}
