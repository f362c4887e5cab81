//! On-disk records of the appended-archive format.
//!
//! The archive region laid down after the native code is, in order: one
//! local header + body per entry, the entry-directory table (one
//! [`DirectoryRecord`] per entry, the source of truth), the fixed-size
//! [`TrailerRecord`], and an optional comment. Everything is little-endian.
//!
//! Every offset stored in the directory and the trailer is measured from the
//! start of the archive region, never from the start of the file. The prefix
//! length is whatever the assembly step concatenated in front, and only the
//! locator ever learns it. This keeps the built archive byte-identical no
//! matter which native binary it is appended to.

use crate::errors::{Error, ErrorKind};
use std::io::{self, Write};

pub(crate) const LOCAL_ENTRY_SIGNATURE: u32 = 0x0403_4650; // "PF\x03\x04"
pub(crate) const DIRECTORY_SIGNATURE: u32 = 0x0201_4650; // "PF\x01\x02"
pub(crate) const TRAILER_SIGNATURE: u32 = 0x0605_4650; // "PF\x05\x06"

pub(crate) const TRAILER_SIGNATURE_BYTES: [u8; 4] = TRAILER_SIGNATURE.to_le_bytes();

/// Version written into every trailer; the locator refuses anything newer.
pub const FORMAT_VERSION: u16 = 1;

/// Maximum length of the trailing archive comment.
pub const MAX_COMMENT_LEN: usize = u16::MAX as usize;

/// Maximum number of entries the directory table can address.
pub(crate) const MAX_ENTRY_COUNT: u64 = u32::MAX as u64;

/// Maximum length of a stored entry path.
pub(crate) const MAX_PATH_LEN: usize = u16::MAX as usize;

/// How far back from end-of-file the trailer signature can legitimately sit:
/// the trailer itself plus a maximum-length comment after it.
pub(crate) const TRAILER_SCAN_WINDOW: u64 = (TrailerRecord::SIZE + MAX_COMMENT_LEN) as u64;

#[inline(always)]
fn le_u16(d: &[u8]) -> u16 {
    u16::from_le_bytes([d[0], d[1]])
}

#[inline(always)]
fn le_u32(d: &[u8]) -> u32 {
    u32::from_le_bytes([d[0], d[1], d[2], d[3]])
}

#[inline(always)]
fn le_u64(d: &[u8]) -> u64 {
    u64::from_le_bytes([d[0], d[1], d[2], d[3], d[4], d[5], d[6], d[7]])
}

/// How an entry's body bytes are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    Store,
    Deflate,
    Unknown(u16),
}

impl CompressionMethod {
    pub(crate) fn as_id(self) -> u16 {
        match self {
            CompressionMethod::Store => 0,
            CompressionMethod::Deflate => 8,
            CompressionMethod::Unknown(id) => id,
        }
    }

    pub(crate) fn from_id(id: u16) -> CompressionMethod {
        match id {
            0 => CompressionMethod::Store,
            8 => CompressionMethod::Deflate,
            other => CompressionMethod::Unknown(other),
        }
    }
}

/// The summary record closing the archive region.
///
/// Found by scanning backward from end-of-file within
/// [`TRAILER_SCAN_WINDOW`]. `dir_offset` and `dir_size` bound the directory
/// table; `dir_crc` is the CRC-32 of the table's raw bytes, the structural
/// sanity check that catches a damaged directory before it is trusted.
#[derive(Debug, Clone)]
pub(crate) struct TrailerRecord {
    pub(crate) version: u16,
    pub(crate) entry_count: u32,
    pub(crate) dir_size: u64,
    pub(crate) dir_offset: u64,
    pub(crate) dir_crc: u32,
    pub(crate) comment_len: u16,
}

impl TrailerRecord {
    pub(crate) const SIZE: usize = 32;

    pub(crate) fn parse(data: &[u8]) -> Result<TrailerRecord, Error> {
        if data.len() < Self::SIZE {
            return Err(Error::from(ErrorKind::Eof));
        }

        let signature = le_u32(&data[0..4]);
        if signature != TRAILER_SIGNATURE {
            return Err(Error::from(ErrorKind::InvalidSignature {
                expected: TRAILER_SIGNATURE,
                actual: signature,
            }));
        }

        Ok(TrailerRecord {
            version: le_u16(&data[4..6]),
            entry_count: le_u32(&data[6..10]),
            dir_size: le_u64(&data[10..18]),
            dir_offset: le_u64(&data[18..26]),
            dir_crc: le_u32(&data[26..30]),
            comment_len: le_u16(&data[30..32]),
        })
    }

    pub(crate) fn write<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&TRAILER_SIGNATURE_BYTES)?;
        writer.write_all(&self.version.to_le_bytes())?;
        writer.write_all(&self.entry_count.to_le_bytes())?;
        writer.write_all(&self.dir_size.to_le_bytes())?;
        writer.write_all(&self.dir_offset.to_le_bytes())?;
        writer.write_all(&self.dir_crc.to_le_bytes())?;
        writer.write_all(&self.comment_len.to_le_bytes())
    }
}

/// One directory-table record. The path bytes follow the fixed part.
#[derive(Debug, Clone)]
pub(crate) struct DirectoryRecord {
    pub(crate) method: CompressionMethod,
    pub(crate) crc: u32,
    pub(crate) compressed_size: u64,
    pub(crate) uncompressed_size: u64,
    pub(crate) local_offset: u64,
    pub(crate) path: String,
}

impl DirectoryRecord {
    pub(crate) const FIXED_SIZE: usize = 36;

    /// Parses one record off the front of `data`, returning it and the number
    /// of bytes it occupied.
    pub(crate) fn parse(data: &[u8]) -> Result<(DirectoryRecord, usize), Error> {
        if data.len() < Self::FIXED_SIZE {
            return Err(Error::from(ErrorKind::Eof));
        }

        let signature = le_u32(&data[0..4]);
        if signature != DIRECTORY_SIGNATURE {
            return Err(Error::from(ErrorKind::InvalidSignature {
                expected: DIRECTORY_SIGNATURE,
                actual: signature,
            }));
        }

        let method = CompressionMethod::from_id(le_u16(&data[4..6]));
        let path_len = le_u16(&data[6..8]) as usize;
        let crc = le_u32(&data[8..12]);
        let compressed_size = le_u64(&data[12..20]);
        let uncompressed_size = le_u64(&data[20..28]);
        let local_offset = le_u64(&data[28..36]);

        let total = Self::FIXED_SIZE + path_len;
        if data.len() < total {
            return Err(Error::from(ErrorKind::Eof));
        }
        let path = std::str::from_utf8(&data[Self::FIXED_SIZE..total])?.to_string();

        Ok((
            DirectoryRecord {
                method,
                crc,
                compressed_size,
                uncompressed_size,
                local_offset,
                path,
            },
            total,
        ))
    }

    pub(crate) fn write<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&DIRECTORY_SIGNATURE.to_le_bytes())?;
        writer.write_all(&self.method.as_id().to_le_bytes())?;
        writer.write_all(&(self.path.len() as u16).to_le_bytes())?;
        writer.write_all(&self.crc.to_le_bytes())?;
        writer.write_all(&self.compressed_size.to_le_bytes())?;
        writer.write_all(&self.uncompressed_size.to_le_bytes())?;
        writer.write_all(&self.local_offset.to_le_bytes())?;
        writer.write_all(self.path.as_bytes())
    }
}

/// The header written in front of each entry's body.
///
/// Echoes the directory record so a damaged directory cannot silently remap
/// bodies; the directory stays the source of truth and readers only check
/// that the two agree.
#[derive(Debug, Clone)]
pub(crate) struct LocalEntryHeader {
    pub(crate) method: CompressionMethod,
    pub(crate) path_len: u16,
    pub(crate) crc: u32,
    pub(crate) compressed_size: u64,
    pub(crate) uncompressed_size: u64,
}

impl LocalEntryHeader {
    pub(crate) const SIZE: usize = 28;

    pub(crate) fn parse(data: &[u8]) -> Result<LocalEntryHeader, Error> {
        if data.len() < Self::SIZE {
            return Err(Error::from(ErrorKind::Eof));
        }

        let signature = le_u32(&data[0..4]);
        if signature != LOCAL_ENTRY_SIGNATURE {
            return Err(Error::from(ErrorKind::InvalidSignature {
                expected: LOCAL_ENTRY_SIGNATURE,
                actual: signature,
            }));
        }

        Ok(LocalEntryHeader {
            method: CompressionMethod::from_id(le_u16(&data[4..6])),
            path_len: le_u16(&data[6..8]),
            crc: le_u32(&data[8..12]),
            compressed_size: le_u64(&data[12..20]),
            uncompressed_size: le_u64(&data[20..28]),
        })
    }

    pub(crate) fn write<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&LOCAL_ENTRY_SIGNATURE.to_le_bytes())?;
        writer.write_all(&self.method.as_id().to_le_bytes())?;
        writer.write_all(&self.path_len.to_le_bytes())?;
        writer.write_all(&self.crc.to_le_bytes())?;
        writer.write_all(&self.compressed_size.to_le_bytes())?;
        writer.write_all(&self.uncompressed_size.to_le_bytes())
    }
}
