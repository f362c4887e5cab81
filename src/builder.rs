//! Build-time archive construction.
//!
//! [`ArchiveWriter`] is the low-level layer: it streams entries into any
//! [`Write`] sink and closes with the directory table and trailer.
//! [`build_archive`] is the tool-facing layer: it walks a source tree in
//! sorted order and feeds every regular file through an `ArchiveWriter`.
//!
//! All offsets the writer records are relative to its own first byte, so the
//! produced archive can be concatenated after any native binary without a
//! rebuild.

use crate::errors::{Error, ErrorKind};
use crate::format::{
    CompressionMethod, DirectoryRecord, LocalEntryHeader, TrailerRecord, FORMAT_VERSION,
    MAX_COMMENT_LEN, MAX_ENTRY_COUNT, MAX_PATH_LEN,
};
use crate::path;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use std::collections::HashSet;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// DEFLATE effort, 0 through 9. Level 0 stores entries verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionLevel(u8);

impl CompressionLevel {
    pub const STORE: CompressionLevel = CompressionLevel(0);
    pub const BEST: CompressionLevel = CompressionLevel(9);

    /// Returns `None` when `level` is outside `0..=9`.
    pub fn new(level: u8) -> Option<CompressionLevel> {
        (level <= 9).then_some(CompressionLevel(level))
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl Default for CompressionLevel {
    fn default() -> Self {
        CompressionLevel(6)
    }
}

#[derive(Debug)]
struct CountWriter<W> {
    writer: W,
    count: u64,
}

impl<W> CountWriter<W> {
    fn new(writer: W) -> Self {
        CountWriter { writer, count: 0 }
    }

    fn count(&self) -> u64 {
        self.count
    }
}

impl<W: Write> Write for CountWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.writer.write(buf)?;
        self.count += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

/// Streams archive entries into a writer.
///
/// ```rust
/// let mut out = Vec::new();
/// let mut writer = packfs::ArchiveWriter::new(&mut out, packfs::CompressionLevel::default());
/// writer.add_entry("app/main.txt", &mut &b"hello"[..]).unwrap();
/// writer.finish().unwrap();
/// ```
#[derive(Debug)]
pub struct ArchiveWriter<W> {
    writer: CountWriter<W>,
    entries: Vec<DirectoryRecord>,
    seen: HashSet<String>,
    level: CompressionLevel,
    comment: Vec<u8>,
}

impl<W: Write> ArchiveWriter<W> {
    pub fn new(writer: W, level: CompressionLevel) -> Self {
        ArchiveWriter {
            writer: CountWriter::new(writer),
            entries: Vec::new(),
            seen: HashSet::new(),
            level,
            comment: Vec::new(),
        }
    }

    /// Sets the trailing archive comment.
    pub fn set_comment(&mut self, comment: impl Into<Vec<u8>>) -> Result<(), Error> {
        let comment = comment.into();
        if comment.len() > MAX_COMMENT_LEN {
            return Err(Error::from(ErrorKind::CommentTooLong {
                len: comment.len(),
            }));
        }
        self.comment = comment;
        Ok(())
    }

    /// Reads `reader` to its end and appends it as one entry.
    ///
    /// `logical_path` must already be in normalized form. Each entry is
    /// compressed independently, so readers never need context from earlier
    /// entries. When DEFLATE fails to shrink the data (already-compressed
    /// inputs, tiny files), the entry is stored verbatim instead.
    pub fn add_entry(&mut self, logical_path: &str, reader: &mut impl Read) -> Result<(), Error> {
        if !path::is_normalized(logical_path) {
            return Err(Error::from(ErrorKind::PathEscape {
                path: logical_path.to_string(),
            }));
        }
        if logical_path.len() > MAX_PATH_LEN {
            return Err(Error::from(ErrorKind::PathTooLong {
                len: logical_path.len(),
            }));
        }
        if !self.seen.insert(logical_path.to_string()) {
            return Err(Error::from(ErrorKind::DuplicatePath {
                path: logical_path.to_string(),
            }));
        }
        if self.entries.len() as u64 >= MAX_ENTRY_COUNT {
            return Err(Error::from(ErrorKind::TooManyEntries));
        }

        let mut data = Vec::new();
        reader.read_to_end(&mut data).map_err(Error::io)?;
        let crc = crc32fast::hash(&data);

        let (method, body) = self.encode(&data)?;
        let local_offset = self.writer.count();

        let header = LocalEntryHeader {
            method,
            path_len: logical_path.len() as u16,
            crc,
            compressed_size: body.len() as u64,
            uncompressed_size: data.len() as u64,
        };
        header.write(&mut self.writer).map_err(Error::io)?;
        self.writer
            .write_all(logical_path.as_bytes())
            .map_err(Error::io)?;
        self.writer.write_all(&body).map_err(Error::io)?;

        self.entries.push(DirectoryRecord {
            method,
            crc,
            compressed_size: body.len() as u64,
            uncompressed_size: data.len() as u64,
            local_offset,
            path: logical_path.to_string(),
        });

        log::debug!(
            "packed {} ({} -> {} bytes, {:?})",
            logical_path,
            data.len(),
            body.len(),
            method
        );
        Ok(())
    }

    fn encode(&self, data: &[u8]) -> Result<(CompressionMethod, Vec<u8>), Error> {
        if self.level.get() == 0 {
            return Ok((CompressionMethod::Store, data.to_vec()));
        }

        let mut encoder = DeflateEncoder::new(
            Vec::with_capacity(data.len() / 2),
            Compression::new(u32::from(self.level.get())),
        );
        encoder.write_all(data).map_err(Error::io)?;
        let compressed = encoder.finish().map_err(Error::io)?;

        if compressed.len() < data.len() {
            Ok((CompressionMethod::Deflate, compressed))
        } else {
            Ok((CompressionMethod::Store, data.to_vec()))
        }
    }

    /// Writes the directory table and trailer, returning the inner writer.
    pub fn finish(mut self) -> Result<W, Error> {
        let dir_offset = self.writer.count();
        let mut dir_hasher = crc32fast::Hasher::new();
        let mut scratch = Vec::new();

        for record in &self.entries {
            scratch.clear();
            record.write(&mut scratch).map_err(Error::io)?;
            dir_hasher.update(&scratch);
            self.writer.write_all(&scratch).map_err(Error::io)?;
        }

        let trailer = TrailerRecord {
            version: FORMAT_VERSION,
            entry_count: self.entries.len() as u32,
            dir_size: self.writer.count() - dir_offset,
            dir_offset,
            dir_crc: dir_hasher.finalize(),
            comment_len: self.comment.len() as u16,
        };
        trailer.write(&mut self.writer).map_err(Error::io)?;
        self.writer.write_all(&self.comment).map_err(Error::io)?;
        self.writer.flush().map_err(Error::io)?;
        Ok(self.writer.writer)
    }
}

/// What [`build_archive`] did.
#[derive(Debug, Clone, Copy)]
pub struct BuildSummary {
    pub entries: u64,
    pub uncompressed_bytes: u64,
    pub archive_bytes: u64,
}

/// Walks `source_root` and writes a complete archive to `output_path`.
///
/// Every regular file becomes one entry keyed by
/// `<logical_root>/<path relative to source_root>`. Directories are implicit.
/// Symlinks are followed; anything that resolves to a device, socket, or
/// FIFO aborts the build. Traversal is sorted lexicographically by relative
/// logical path, so identical trees always produce byte-identical archives.
///
/// On any failure the partially written output is removed; an incomplete
/// archive is never left behind to be published.
pub fn build_archive(
    source_root: &Path,
    output_path: &Path,
    logical_root: &str,
    level: CompressionLevel,
    comment: Option<&[u8]>,
) -> Result<BuildSummary, Error> {
    let result = build_archive_inner(source_root, output_path, logical_root, level, comment);
    if result.is_err() {
        if let Err(remove_err) = std::fs::remove_file(output_path) {
            if remove_err.kind() != io::ErrorKind::NotFound {
                log::warn!(
                    "failed to remove partial archive {:?}: {}",
                    output_path,
                    remove_err
                );
            }
        }
    }
    result
}

fn build_archive_inner(
    source_root: &Path,
    output_path: &Path,
    logical_root: &str,
    level: CompressionLevel,
    comment: Option<&[u8]>,
) -> Result<BuildSummary, Error> {
    let meta = std::fs::metadata(source_root).map_err(Error::io)?;
    if !meta.is_dir() {
        return Err(Error::from(ErrorKind::UnsupportedSource {
            path: source_root.to_path_buf(),
        }));
    }

    let root = path::normalize(logical_root)?;
    let files = collect_files(source_root, &root)?;

    let output = File::create(output_path).map_err(Error::io)?;
    let mut writer = ArchiveWriter::new(io::BufWriter::new(output), level);
    if let Some(comment) = comment {
        writer.set_comment(comment)?;
    }

    let mut uncompressed_bytes = 0u64;
    for (logical, real) in &files {
        let mut file = File::open(real).map_err(Error::io)?;
        uncompressed_bytes += file.metadata().map_err(Error::io)?.len();
        writer.add_entry(logical, &mut file)?;
    }

    let output = writer
        .finish()?
        .into_inner()
        .map_err(|e| Error::io(e.into_error()))?;
    output.sync_all().map_err(Error::io)?;
    let archive_bytes = output.metadata().map_err(Error::io)?.len();

    Ok(BuildSummary {
        entries: files.len() as u64,
        uncompressed_bytes,
        archive_bytes,
    })
}

/// Collects `(logical path, real path)` pairs, sorted by logical path.
fn collect_files(source_root: &Path, logical_root: &str) -> Result<Vec<(String, PathBuf)>, Error> {
    let mut files = Vec::new();

    for entry in WalkDir::new(source_root).follow_links(true) {
        let entry = entry.map_err(|e| Error::io(e.into()))?;
        let file_type = entry.file_type();
        if file_type.is_dir() {
            continue;
        }
        let real = entry.into_path();
        if !file_type.is_file() {
            return Err(Error::from(ErrorKind::UnsupportedSource { path: real }));
        }

        let relative = real
            .strip_prefix(source_root)
            .expect("walked path is under the source root");
        let mut logical = String::from(logical_root);
        for component in relative.components() {
            let Some(part) = component.as_os_str().to_str() else {
                return Err(Error::from(ErrorKind::UnsupportedSource {
                    path: real.clone(),
                }));
            };
            if !logical.is_empty() {
                logical.push('/');
            }
            logical.push_str(part);
        }
        let logical = path::normalize(&logical)?;

        files.push((logical, real));
    }

    files.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(files)
}
