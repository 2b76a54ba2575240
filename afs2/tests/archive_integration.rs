//! End-to-end AFS2 directory parsing against hand-built archive images.

use afs2::{Afs2Archive, Error};
use std::io::Cursor;

/// Build an archive image: directory plus payload bytes laid out at the
/// given raw offsets (relative to the archive base).
fn build_archive(
    base: u64,
    alignment: u16,
    key_modifier: u16,
    entries: &[(u16, u32, &[u8])],
) -> Vec<u8> {
    let mut data = vec![0u8; base as usize];
    data.extend_from_slice(b"AFS2");
    data.extend_from_slice(&0x0002_0400u32.to_le_bytes()); // 4-byte offsets
    data.extend_from_slice(&(entries.len() as i32).to_le_bytes());
    data.extend_from_slice(&(u32::from(alignment) | (u32::from(key_modifier) << 16)).to_le_bytes());
    for &(cue_id, _, _) in entries {
        data.extend_from_slice(&cue_id.to_le_bytes());
    }
    for &(_, offset, _) in entries {
        data.extend_from_slice(&offset.to_le_bytes());
    }
    // The sentinel marks the end of the last payload, relative to the base.
    let align = usize::from(alignment.max(1));
    let end = entries
        .last()
        .map(|&(_, offset, payload)| ((offset as usize).next_multiple_of(align) + payload.len()) as u32)
        .unwrap_or(0x10);
    data.extend_from_slice(&end.to_le_bytes());

    for &(_, offset, payload) in entries {
        let aligned = base as usize + (offset as usize).next_multiple_of(align);
        if data.len() < aligned + payload.len() {
            data.resize(aligned, 0);
            data.extend_from_slice(payload);
        } else {
            data[aligned..aligned + payload.len()].copy_from_slice(payload);
        }
    }
    data
}

#[test]
fn test_three_file_directory() {
    // Three payloads at raw offsets 0x100/0x120/0x160 with 32-byte
    // alignment: the first two sizes span to the next raw offset, the last
    // comes from the sentinel.
    let payloads: [&[u8]; 3] = [&[0xAA; 10], &[0xBB; 40], &[0xCC; 7]];
    let data = build_archive(
        0,
        32,
        0,
        &[
            (0, 0x100, payloads[0]),
            (1, 0x120, payloads[1]),
            (2, 0x160, payloads[2]),
        ],
    );

    let mut archive = Afs2Archive::parse(Cursor::new(data), 0).unwrap();
    assert_eq!(archive.files().len(), 3);

    let first = archive.files()[&0];
    assert_eq!(first.offset_aligned, 0x100);
    assert_eq!(first.size, 0x20);

    let second = archive.files()[&1];
    assert_eq!(second.offset_aligned, 0x120);
    assert_eq!(second.size, 0x40);

    let third = archive.files()[&2];
    assert_eq!(third.offset_aligned, 0x160);
    assert_eq!(third.size, 7);

    // Adjacent records tile the payload region exactly.
    let records: Vec<_> = archive.files().values().copied().collect();
    for pair in records.windows(2) {
        assert_eq!(pair[0].offset_aligned + pair[0].size, pair[1].offset_raw);
    }

    assert_eq!(archive.read_file(2).unwrap(), payloads[2]);
}

#[test]
fn test_archive_at_nonzero_base() {
    let payload: &[u8] = &[0x5A; 16];
    let base = 0x40;
    let data = build_archive(base, 16, 0, &[(9, 0x30, payload)]);

    let mut cursor = Cursor::new(data);
    assert!(Afs2Archive::<_>::is_afs2(&mut cursor, base).unwrap());

    let mut archive = Afs2Archive::parse_named(cursor, base, "voices.awb").unwrap();
    assert_eq!(archive.name(), Some("voices.awb"));

    let record = archive.files()[&9];
    // Stored offsets are relative to the archive base.
    assert_eq!(record.offset_raw, base + 0x30);
    assert_eq!(record.offset_aligned, base + 0x30);
    assert_eq!(archive.read_file(9).unwrap(), payload);
}

#[test]
fn test_unaligned_offsets_round_up() {
    let payload: &[u8] = &[1, 2, 3];
    let data = build_archive(0, 32, 0, &[(1, 0x101, payload)]);
    let archive = Afs2Archive::parse(Cursor::new(data), 0).unwrap();
    let record = archive.files()[&1];
    assert_eq!(record.offset_raw, 0x101);
    assert_eq!(record.offset_aligned, 0x120);
}

#[test]
fn test_missing_cue() {
    let data = build_archive(0, 32, 0, &[(1, 0x100, &[0; 4])]);
    let mut archive = Afs2Archive::parse(Cursor::new(data), 0).unwrap();
    assert!(matches!(archive.read_file(2), Err(Error::CueNotFound(2))));
}
