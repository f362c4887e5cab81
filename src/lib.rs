#![doc = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/README.md"))]
#![forbid(unsafe_code)]

mod builder;
mod errors;
mod extract;
mod format;
mod index;
mod locator;
pub mod path;
mod read_at;
mod vfs;

pub use builder::{build_archive, ArchiveWriter, BuildSummary, CompressionLevel};
pub use errors::{Error, ErrorKind};
pub use format::{CompressionMethod, FORMAT_VERSION, MAX_COMMENT_LEN};
pub use index::{ArchiveIndex, VirtualFileEntry};
pub use locator::{index_from_slice, load_index};
pub use read_at::{ExeReader, ReadAt};
pub use vfs::Vfs;
