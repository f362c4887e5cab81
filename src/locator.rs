//! Finding and indexing the archive appended to an executable image.
//!
//! The trailer sits at most [`TRAILER_SCAN_WINDOW`] bytes before end-of-file
//! (its own size plus a maximum-length comment). The scan reads the file
//! backward in chunks, carrying partial signature matches across chunk
//! boundaries, and treats a signature hit as the trailer only when the
//! record's declared comment length puts its end exactly at end-of-file.
//! Compressed entry bodies (or the native code itself, for tiny prefixes)
//! can contain the signature bytes by coincidence; the end-position test
//! skips those and keeps scanning backward.
//!
//! Once a record passes that test it is *the* trailer, and every later
//! validation failure is [`CorruptTrailer`](crate::ErrorKind::CorruptTrailer)
//! rather than a reason to keep scanning: a damaged directory must never be
//! silently ignored in favor of an older-looking one.

use crate::errors::{Error, ErrorKind};
use crate::format::{
    DirectoryRecord, TrailerRecord, FORMAT_VERSION, TRAILER_SCAN_WINDOW, TRAILER_SIGNATURE_BYTES,
};
use crate::index::ArchiveIndex;
use crate::read_at::ReadAt;
use std::io::{Seek, SeekFrom};

const SCAN_CHUNK: usize = 8 * 1024;

/// Locates the trailer in `reader` and builds the archive index.
///
/// `Err(TrailerNotFound)` means the file carries no archive at all (the
/// caller may treat that as development mode); `Err(CorruptTrailer)` means a
/// trailer exists but cannot be trusted and must be treated as fatal.
pub fn load_index<R: ReadAt + Seek>(reader: &mut R) -> Result<ArchiveIndex, Error> {
    let file_len = reader.seek(SeekFrom::End(0)).map_err(Error::io)?;
    let (trailer, trailer_pos) = find_trailer(reader, file_len)?;
    build_index(reader, file_len, &trailer, trailer_pos)
}

/// [`load_index`] over an in-memory buffer, for tests and tooling.
pub fn index_from_slice(data: &[u8]) -> Result<ArchiveIndex, Error> {
    load_index(&mut std::io::Cursor::new(data))
}

/// Scans backward for the last signature occurrence that passes the
/// end-position test. Returns the parsed fixed record and its absolute
/// position.
fn find_trailer<R: ReadAt>(reader: &R, file_len: u64) -> Result<(TrailerRecord, u64), Error> {
    if file_len < TrailerRecord::SIZE as u64 {
        return Err(Error::from(ErrorKind::TrailerNotFound));
    }

    let window_start = file_len.saturating_sub(TRAILER_SCAN_WINDOW);
    let mut buffer = vec![0u8; SCAN_CHUNK];
    let mut offset = file_len;
    let mut remaining = file_len - window_start;
    let mut carry_over = 0usize;

    loop {
        let read_size = (buffer.len() - carry_over).min(remaining as usize);
        offset -= read_size as u64;
        reader
            .read_exact_at(&mut buffer[..read_size], offset)
            .map_err(Error::io)?;
        remaining -= read_size as u64;

        let mut search_end = read_size + carry_over;
        while let Some(i) = backwards_find(&buffer[..search_end], &TRAILER_SIGNATURE_BYTES) {
            let candidate_pos = offset + i as u64;
            if let Some(trailer) = parse_candidate(reader, candidate_pos, file_len)? {
                return Ok((trailer, candidate_pos));
            }
            // Re-examine all but the first byte of the failed match; the
            // signature cannot overlap itself, so nothing is missed.
            search_end = i + TRAILER_SIGNATURE_BYTES.len() - 1;
        }

        if remaining == 0 {
            return Err(Error::from(ErrorKind::TrailerNotFound));
        }

        // A signature may straddle the chunk boundary: keep however much of
        // the buffer's head matches the signature's tail.
        carry_over = match buffer[..] {
            [b0, b1, b2, ..] if [b0, b1, b2] == TRAILER_SIGNATURE_BYTES[1..4] => 3,
            [b0, b1, ..] if [b0, b1] == TRAILER_SIGNATURE_BYTES[2..4] => 2,
            [b0, ..] if b0 == TRAILER_SIGNATURE_BYTES[3] => 1,
            _ => 0,
        };
        if carry_over > 0 {
            let dest = (buffer.len() - carry_over).min(remaining as usize);
            buffer.copy_within(..carry_over, dest);
        }
    }
}

/// Reads the fixed record at `pos` and applies the end-position test.
/// `Ok(None)` means "coincidental signature bytes, keep scanning".
fn parse_candidate<R: ReadAt>(
    reader: &R,
    pos: u64,
    file_len: u64,
) -> Result<Option<TrailerRecord>, Error> {
    if pos + TrailerRecord::SIZE as u64 > file_len {
        return Ok(None);
    }

    let mut fixed = [0u8; TrailerRecord::SIZE];
    reader.read_exact_at(&mut fixed, pos).map_err(Error::io)?;
    let trailer = match TrailerRecord::parse(&fixed) {
        Ok(trailer) => trailer,
        Err(_) => return Ok(None),
    };

    let declared_end = pos + TrailerRecord::SIZE as u64 + u64::from(trailer.comment_len);
    if declared_end != file_len {
        return Ok(None);
    }
    Ok(Some(trailer))
}

fn backwards_find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .rposition(|window| window == needle)
}

/// Validates the located trailer and parses the directory table.
fn build_index<R: ReadAt>(
    reader: &R,
    file_len: u64,
    trailer: &TrailerRecord,
    trailer_pos: u64,
) -> Result<ArchiveIndex, Error> {
    if trailer.version > FORMAT_VERSION {
        return Err(Error::corrupt(format!(
            "format version {} is newer than this build understands",
            trailer.version
        )));
    }

    let archive_len = trailer
        .dir_offset
        .checked_add(trailer.dir_size)
        .and_then(|n| n.checked_add(TrailerRecord::SIZE as u64))
        .and_then(|n| n.checked_add(u64::from(trailer.comment_len)))
        .ok_or_else(|| Error::corrupt("archive region length overflows"))?;
    if archive_len > file_len {
        return Err(Error::corrupt(format!(
            "declared archive region ({} bytes) exceeds the file ({} bytes)",
            archive_len, file_len
        )));
    }
    let prefix_len = file_len - archive_len;

    let mut directory = vec![0u8; trailer.dir_size as usize];
    reader
        .read_exact_at(&mut directory, prefix_len + trailer.dir_offset)
        .map_err(Error::io)?;

    let actual_crc = crc32fast::hash(&directory);
    if actual_crc != trailer.dir_crc {
        return Err(Error::corrupt(format!(
            "directory checksum mismatch: expected 0x{:08x}, got 0x{:08x}",
            trailer.dir_crc, actual_crc
        )));
    }

    let mut records = Vec::new();
    let mut pos = 0usize;
    while pos < directory.len() {
        let (record, used) = DirectoryRecord::parse(&directory[pos..])
            .map_err(|e| Error::corrupt(format!("bad directory record: {}", e)))?;
        records.push(record);
        pos += used;
    }

    let mut comment = vec![0u8; usize::from(trailer.comment_len)];
    reader
        .read_exact_at(&mut comment, trailer_pos + TrailerRecord::SIZE as u64)
        .map_err(Error::io)?;

    log::debug!(
        "archive trailer at {}, native prefix {} bytes, {} entries",
        trailer_pos,
        prefix_len,
        trailer.entry_count
    );

    ArchiveIndex::from_records(
        records,
        u64::from(trailer.entry_count),
        prefix_len,
        trailer.dir_offset,
        comment,
    )
}
