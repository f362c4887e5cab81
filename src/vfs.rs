//! The layered virtual filesystem served to the embedded runtime.
//!
//! One [`Vfs`] is created at process startup and threaded into the
//! interpreter's module and library loader hooks. It owns the archive index,
//! the positional reader over the executable image, the optional
//! real-filesystem fallback root, and the extraction cache. Nothing here is
//! ambient or global, so tests build the whole stack from an in-memory
//! buffer.
//!
//! Resolution order is fixed: the archive namespace first, then the fallback
//! root. The two are never merged at the same path; packaged contents always
//! shadow same-named external files, and the archive side is read-only.

use crate::errors::{Error, ErrorKind};
use crate::extract::ExtractionCache;
use crate::format::{CompressionMethod, LocalEntryHeader};
use crate::index::{ArchiveIndex, VirtualFileEntry};
use crate::locator;
use crate::path;
use crate::read_at::{ExeReader, ReadAt};
use std::collections::BTreeSet;
use std::io::Read;
use std::path::{Path, PathBuf};

/// The embedded filesystem: archive namespace over optional fallback root.
#[derive(Debug)]
pub struct Vfs<R = ExeReader> {
    archive: Option<(ArchiveIndex, R)>,
    fallback: Option<PathBuf>,
    cache: ExtractionCache,
}

impl Vfs<ExeReader> {
    /// Opens the running process's own executable and indexes the archive
    /// appended to it.
    ///
    /// `TrailerNotFound` is surfaced as-is: the embedding program decides
    /// whether an unpackaged binary is a development-mode run (see
    /// [`Vfs::unpackaged`]) or a fatal deployment error.
    pub fn load_self() -> Result<Vfs<ExeReader>, Error> {
        let exe = std::env::current_exe().map_err(Error::io)?;
        Vfs::load_image(&exe)
    }

    /// Indexes the archive appended to an arbitrary executable image.
    pub fn load_image(image_path: &Path) -> Result<Vfs<ExeReader>, Error> {
        let file = std::fs::File::open(image_path).map_err(Error::io)?;
        let mut reader = ExeReader::from(file);
        let index = locator::load_index(&mut reader)?;
        Ok(Vfs {
            archive: Some((index, reader)),
            fallback: None,
            cache: ExtractionCache::new(),
        })
    }

    /// A `Vfs` with no archive at all: every lookup goes to `base_dir`.
    /// This is the development-mode counterpart of [`Vfs::load_self`].
    pub fn unpackaged(base_dir: impl Into<PathBuf>) -> Vfs<ExeReader> {
        Vfs {
            archive: None,
            fallback: Some(base_dir.into()),
            cache: ExtractionCache::new(),
        }
    }
}

impl<'a> Vfs<std::io::Cursor<&'a [u8]>> {
    /// Indexes an archive held in memory. Test-facing; lets every property
    /// of the resolver be exercised without a packaged executable on disk.
    pub fn from_slice(data: &'a [u8]) -> Result<Vfs<std::io::Cursor<&'a [u8]>>, Error> {
        Vfs::from_reader(std::io::Cursor::new(data))
    }
}

impl<R: ReadAt + std::io::Seek> Vfs<R> {
    /// Indexes the archive appended to any positional reader.
    pub fn from_reader(mut reader: R) -> Result<Vfs<R>, Error> {
        let index = locator::load_index(&mut reader)?;
        Ok(Vfs {
            archive: Some((index, reader)),
            fallback: None,
            cache: ExtractionCache::new(),
        })
    }
}

impl<R: ReadAt> Vfs<R> {
    /// Routes lookups that miss the archive to a real directory.
    pub fn with_fallback(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.fallback = Some(base_dir.into());
        self
    }

    /// The archive index, when this process is packaged.
    pub fn index(&self) -> Option<&ArchiveIndex> {
        self.archive.as_ref().map(|(index, _)| index)
    }

    /// True when `logical_path` names a file or directory in either
    /// namespace.
    pub fn exists(&self, logical_path: &str) -> bool {
        let Ok(logical) = path::normalize(logical_path) else {
            return false;
        };
        if let Some((index, _)) = &self.archive {
            if index.get(&logical).is_some() || index.is_dir(&logical) {
                return true;
            }
        }
        match self.fallback_path(&logical) {
            Some(real) => real.exists(),
            None => false,
        }
    }

    /// True when `logical_path` names a directory. A same-named archive
    /// *file* shadows any fallback directory.
    pub fn is_dir(&self, logical_path: &str) -> bool {
        let Ok(logical) = path::normalize(logical_path) else {
            return false;
        };
        if let Some((index, _)) = &self.archive {
            if index.is_dir(&logical) {
                return true;
            }
            if index.get(&logical).is_some() {
                return false;
            }
        }
        match self.fallback_path(&logical) {
            Some(real) => real.is_dir(),
            None => false,
        }
    }

    /// Reads a file's entire contents, archive first, fallback second.
    ///
    /// Archive bodies are decompressed and checksum-verified on every read;
    /// a mismatch surfaces as an error rather than as silently wrong bytes.
    pub fn read(&self, logical_path: &str) -> Result<Vec<u8>, Error> {
        let logical = path::normalize(logical_path)?;
        if let Some((index, reader)) = &self.archive {
            if let Some(entry) = index.get(&logical) {
                return read_entry(reader, &logical, entry);
            }
            if index.is_dir(&logical) {
                return Err(Error::from(ErrorKind::IsADirectory));
            }
        }

        let Some(real) = self.fallback_path(&logical) else {
            return Err(Error::from(ErrorKind::NotFound));
        };
        match std::fs::read(&real) {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::from(ErrorKind::NotFound))
            }
            Err(e) => {
                if real.is_dir() {
                    Err(Error::from(ErrorKind::IsADirectory))
                } else {
                    Err(Error::io(e))
                }
            }
        }
    }

    /// Immediate child names of a logical directory, both namespaces
    /// unioned. Archive files shadow fallback entries name-by-name, which a
    /// set union gives for free.
    pub fn list_dir(&self, logical_path: &str) -> Result<BTreeSet<String>, Error> {
        let logical = path::normalize(logical_path)?;
        let mut names: Option<BTreeSet<String>> = None;

        if let Some((index, _)) = &self.archive {
            if let Some(children) = index.children(&logical) {
                names = Some(children.clone());
            } else if index.get(&logical).is_some() {
                return Err(Error::from(ErrorKind::NotADirectory));
            }
        }

        if let Some(real) = self.fallback_path(&logical) {
            match std::fs::read_dir(&real) {
                Ok(iter) => {
                    let names = names.get_or_insert_with(BTreeSet::new);
                    for dir_entry in iter {
                        let dir_entry = dir_entry.map_err(Error::io)?;
                        if let Ok(name) = dir_entry.file_name().into_string() {
                            names.insert(name);
                        }
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    if names.is_none() {
                        if real.is_file() {
                            return Err(Error::from(ErrorKind::NotADirectory));
                        }
                        return Err(Error::io(e));
                    }
                    // Archive listing stands on its own when the fallback
                    // side is unreadable.
                    log::debug!("fallback listing failed for {:?}: {}", real, e);
                }
            }
        }

        names.ok_or_else(|| Error::from(ErrorKind::NotFound))
    }

    /// Hands back a real filesystem path for `logical_path`, extracting the
    /// archive entry on first use.
    ///
    /// This exists for the one consumer the in-memory namespace cannot
    /// serve: the OS dynamic-library loader, which only opens real files. A
    /// fallback hit is already a real file and is returned directly.
    pub fn materialize(&self, logical_path: &str) -> Result<PathBuf, Error> {
        let logical = path::normalize(logical_path)?;
        if let Some((index, reader)) = &self.archive {
            if let Some(entry) = index.get(&logical) {
                return self
                    .cache
                    .materialize(&logical, entry.crc, || read_entry(reader, &logical, entry));
            }
            if index.is_dir(&logical) {
                return Err(Error::from(ErrorKind::IsADirectory));
            }
        }

        let Some(real) = self.fallback_path(&logical) else {
            return Err(Error::from(ErrorKind::NotFound));
        };
        match real.metadata() {
            Ok(meta) if meta.is_dir() => Err(Error::from(ErrorKind::IsADirectory)),
            Ok(_) => Ok(real),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::from(ErrorKind::NotFound))
            }
            Err(e) => Err(Error::io(e)),
        }
    }

    fn fallback_path(&self, logical: &str) -> Option<PathBuf> {
        let base = self.fallback.as_ref()?;
        let mut real = base.clone();
        for component in logical.split('/').filter(|c| !c.is_empty()) {
            real.push(component);
        }
        Some(real)
    }
}

/// Reads, decompresses, and verifies one archive entry body.
fn read_entry<R: ReadAt>(
    reader: &R,
    logical: &str,
    entry: &VirtualFileEntry,
) -> Result<Vec<u8>, Error> {
    let mut header_buf = [0u8; LocalEntryHeader::SIZE];
    reader
        .read_exact_at(&mut header_buf, entry.local_header_offset)
        .map_err(Error::io)?;
    let header = LocalEntryHeader::parse(&header_buf)?;

    // The directory is the source of truth; the local header only has to
    // agree on where the body starts.
    if usize::from(header.path_len) != logical.len() {
        return Err(Error::from(ErrorKind::InvalidSize {
            expected: logical.len() as u64,
            actual: u64::from(header.path_len),
        }));
    }

    let body_offset =
        entry.local_header_offset + (LocalEntryHeader::SIZE + logical.len()) as u64;
    let mut body = vec![0u8; entry.compressed_size as usize];
    reader
        .read_exact_at(&mut body, body_offset)
        .map_err(Error::io)?;

    let data = match entry.method {
        CompressionMethod::Store => body,
        CompressionMethod::Deflate => {
            let mut decoder = flate2::read::DeflateDecoder::new(body.as_slice());
            let mut data = Vec::with_capacity(entry.uncompressed_size as usize);
            decoder.read_to_end(&mut data).map_err(Error::io)?;
            data
        }
        CompressionMethod::Unknown(id) => {
            return Err(Error::from(ErrorKind::UnsupportedMethod { method: id }));
        }
    };

    if data.len() as u64 != entry.uncompressed_size {
        return Err(Error::from(ErrorKind::InvalidSize {
            expected: entry.uncompressed_size,
            actual: data.len() as u64,
        }));
    }
    let crc = crc32fast::hash(&data);
    if crc != entry.crc {
        return Err(Error::from(ErrorKind::InvalidChecksum {
            expected: entry.crc,
            actual: crc,
        }));
    }

    Ok(data)
}
