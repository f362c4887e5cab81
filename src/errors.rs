/// The error type for every fallible operation in this crate.
///
/// Opaque; inspect the failure through [`Error::kind`].
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
}

impl Error {
    /// The kind of failure this error represents.
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub(crate) fn io(err: std::io::Error) -> Error {
        Error::from(ErrorKind::IO(err))
    }

    pub(crate) fn corrupt(reason: impl Into<String>) -> Error {
        Error::from(ErrorKind::CorruptTrailer {
            reason: reason.into(),
        })
    }
}

#[derive(Debug)]
pub enum ErrorKind {
    /// No valid archive trailer exists in the scanned file. The caller decides
    /// whether this means "unpackaged/development mode" or is fatal.
    TrailerNotFound,
    /// A trailer-like record was found but failed structural validation.
    /// Always fatal: a partially trusted index could silently serve wrong
    /// bytes.
    CorruptTrailer { reason: String },
    /// The logical path is absent from the archive and the fallback
    /// filesystem. An ordinary lookup miss, not a failure of the resolver.
    NotFound,
    /// A directory operation was attempted on a file entry.
    NotADirectory,
    /// A file operation was attempted on a directory.
    IsADirectory,
    /// The source tree holds more files than the directory table can address.
    TooManyEntries,
    /// A logical path resolved outside the archive root.
    PathEscape { path: String },
    /// The same logical path was added twice.
    DuplicatePath { path: String },
    /// An entry path does not fit the format's length field.
    PathTooLong { len: usize },
    /// The archive comment exceeds the format maximum.
    CommentTooLong { len: usize },
    /// The source tree contains something other than regular files,
    /// directories, and symlinks to those (device node, socket, FIFO).
    UnsupportedSource { path: std::path::PathBuf },
    /// An entry was compressed with a method this build does not understand.
    UnsupportedMethod { method: u16 },
    InvalidSignature { expected: u32, actual: u32 },
    InvalidChecksum { expected: u32, actual: u32 },
    InvalidSize { expected: u64, actual: u64 },
    InvalidUtf8(std::str::Utf8Error),
    Eof,
    IO(std::io::Error),
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.kind)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match *self {
            ErrorKind::TrailerNotFound => {
                write!(f, "No archive trailer found")
            }
            ErrorKind::CorruptTrailer { ref reason } => {
                write!(f, "Corrupt archive trailer: {}", reason)
            }
            ErrorKind::NotFound => {
                write!(f, "Path not found")
            }
            ErrorKind::NotADirectory => {
                write!(f, "Not a directory")
            }
            ErrorKind::IsADirectory => {
                write!(f, "Is a directory")
            }
            ErrorKind::TooManyEntries => {
                write!(f, "Too many entries for the directory table")
            }
            ErrorKind::PathEscape { ref path } => {
                write!(f, "Path escapes the archive root: {:?}", path)
            }
            ErrorKind::DuplicatePath { ref path } => {
                write!(f, "Duplicate entry path: {:?}", path)
            }
            ErrorKind::PathTooLong { len } => {
                write!(f, "Path too long: {} bytes", len)
            }
            ErrorKind::CommentTooLong { len } => {
                write!(f, "Archive comment too long: {} bytes", len)
            }
            ErrorKind::UnsupportedSource { ref path } => {
                write!(f, "Unsupported file type in source tree: {:?}", path)
            }
            ErrorKind::UnsupportedMethod { method } => {
                write!(f, "Unsupported compression method: {}", method)
            }
            ErrorKind::InvalidSignature { expected, actual } => {
                write!(
                    f,
                    "Invalid signature: expected 0x{:08x}, got 0x{:08x}",
                    expected, actual
                )
            }
            ErrorKind::InvalidChecksum { expected, actual } => {
                write!(
                    f,
                    "Invalid checksum: expected 0x{:08x}, got 0x{:08x}",
                    expected, actual
                )
            }
            ErrorKind::InvalidSize { expected, actual } => {
                write!(f, "Invalid size: expected {}, got {}", expected, actual)
            }
            ErrorKind::InvalidUtf8(ref err) => {
                write!(f, "Invalid UTF-8: {}", err)
            }
            ErrorKind::Eof => {
                write!(f, "Unexpected end of file")
            }
            ErrorKind::IO(ref err) => err.fmt(f),
        }
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Error {
        Error { kind }
    }
}

impl From<std::str::Utf8Error> for Error {
    fn from(err: std::str::Utf8Error) -> Error {
        Error::from(ErrorKind::InvalidUtf8(err))
    }
}
