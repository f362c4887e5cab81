//! The in-memory archive index.
//!
//! Built once by the locator, immutable afterward. Lookups and listings
//! never touch the disk; only entry-body reads go back to the executable
//! image.

use crate::errors::Error;
use crate::format::{CompressionMethod, DirectoryRecord, LocalEntryHeader};
use crate::path;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// One file inside the archive namespace.
#[derive(Debug, Clone)]
pub struct VirtualFileEntry {
    pub(crate) method: CompressionMethod,
    pub(crate) crc: u32,
    pub(crate) compressed_size: u64,
    pub(crate) uncompressed_size: u64,
    /// Absolute file offset of the entry's local header (prefix applied).
    pub(crate) local_header_offset: u64,
}

impl VirtualFileEntry {
    pub fn method(&self) -> CompressionMethod {
        self.method
    }

    pub fn crc32(&self) -> u32 {
        self.crc
    }

    pub fn compressed_size(&self) -> u64 {
        self.compressed_size
    }

    pub fn uncompressed_size(&self) -> u64 {
        self.uncompressed_size
    }
}

/// Path → entry mapping plus the derived directory tree.
///
/// The directory tree is never stored in the archive; it is rebuilt here
/// from the flat entry paths so `list_dir` can answer without scanning.
/// Shared read-only across threads for the process lifetime.
#[derive(Debug)]
pub struct ArchiveIndex {
    entries: HashMap<String, VirtualFileEntry>,
    children: BTreeMap<String, BTreeSet<String>>,
    prefix_len: u64,
    comment: Vec<u8>,
}

impl ArchiveIndex {
    /// Validates parsed directory records and assembles the index.
    ///
    /// `data_end` is the archive-relative offset where entry bodies must
    /// stop (the start of the directory table). Every structural violation
    /// is corruption: serving a partially trusted index would hand wrong
    /// bytes to the interpreter.
    pub(crate) fn from_records(
        records: Vec<DirectoryRecord>,
        declared_count: u64,
        prefix_len: u64,
        data_end: u64,
        comment: Vec<u8>,
    ) -> Result<ArchiveIndex, Error> {
        if records.len() as u64 != declared_count {
            return Err(Error::corrupt(format!(
                "directory table holds {} records, trailer declares {}",
                records.len(),
                declared_count
            )));
        }

        let mut entries = HashMap::with_capacity(records.len());
        let mut children: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

        for record in records {
            if !path::is_normalized(&record.path) {
                return Err(Error::corrupt(format!(
                    "entry path is not in normalized form: {:?}",
                    record.path
                )));
            }

            let header_len = (LocalEntryHeader::SIZE + record.path.len()) as u64;
            let end = record
                .local_offset
                .checked_add(header_len)
                .and_then(|n| n.checked_add(record.compressed_size));
            match end {
                Some(end) if end <= data_end => {}
                _ => {
                    return Err(Error::corrupt(format!(
                        "entry {:?} extends outside the archive data region",
                        record.path
                    )));
                }
            }

            let entry = VirtualFileEntry {
                method: record.method,
                crc: record.crc,
                compressed_size: record.compressed_size,
                uncompressed_size: record.uncompressed_size,
                local_header_offset: prefix_len + record.local_offset,
            };
            if entries.insert(record.path.clone(), entry).is_some() {
                return Err(Error::corrupt(format!(
                    "duplicate entry path: {:?}",
                    record.path
                )));
            }

            let mut dir = record.path.as_str();
            let mut child = path::file_name(dir);
            loop {
                dir = path::parent(dir);
                children
                    .entry(dir.to_string())
                    .or_default()
                    .insert(child.to_string());
                if dir.is_empty() {
                    break;
                }
                child = path::file_name(dir);
            }
        }

        // A path cannot name both a file and a directory.
        for dir in children.keys() {
            if entries.contains_key(dir) {
                return Err(Error::corrupt(format!(
                    "path is both a file and a directory: {:?}",
                    dir
                )));
            }
        }

        log::debug!(
            "archive index built: {} entries, prefix length {}",
            entries.len(),
            prefix_len
        );

        Ok(ArchiveIndex {
            entries,
            children,
            prefix_len,
            comment,
        })
    }

    /// Looks up a file entry by normalized logical path.
    pub fn get(&self, logical_path: &str) -> Option<&VirtualFileEntry> {
        self.entries.get(logical_path)
    }

    /// Immediate child names of a logical directory, if the path is one.
    /// The empty string names the logical root.
    pub fn children(&self, logical_path: &str) -> Option<&BTreeSet<String>> {
        self.children.get(logical_path)
    }

    /// True when the normalized path names a directory in the archive.
    pub fn is_dir(&self, logical_path: &str) -> bool {
        self.children.contains_key(logical_path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entry paths, in no particular order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// The discovered native-code prefix length.
    pub fn prefix_len(&self) -> u64 {
        self.prefix_len
    }

    /// The archive comment, possibly empty.
    pub fn comment(&self) -> &[u8] {
        &self.comment
    }
}
