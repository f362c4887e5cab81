#[cfg(unix)]
use std::os::unix::fs::FileExt;

/// Reading bytes at an explicit offset.
///
/// Like [`std::io::Read`] with an offset parameter and without `&mut self`,
/// so any number of threads can pull entry bodies out of the one executable
/// image without sharing seek state. Modelled after Go's `io.ReaderAt`, the
/// same shape its zip reader is built on.
pub trait ReadAt {
    /// Read bytes starting at `offset` from the beginning of the data.
    fn read_at(&self, buf: &mut [u8], offset: u64) -> std::io::Result<usize>;

    /// Sibling to [`read_exact`](std::io::Read::read_exact), but at an offset.
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> std::io::Result<()> {
        let mut read = 0;
        while read < buf.len() {
            let n = self.read_at(&mut buf[read..], offset + read as u64)?;
            if n == 0 {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "failed to fill whole buffer",
                ));
            }
            read += n;
        }
        Ok(())
    }
}

/// The executable image opened for positional reads.
///
/// On unix this is a thin wrapper over [`FileExt::read_at`]. Elsewhere the
/// offset read is emulated by seeking under a mutex, the same strategy Go
/// uses for `io.ReaderAt` on files where no pread equivalent exists.
#[cfg(unix)]
pub struct ExeReader(std::fs::File);

#[cfg(not(unix))]
pub struct ExeReader(std::sync::Mutex<std::fs::File>);

#[cfg(unix)]
impl ReadAt for ExeReader {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> std::io::Result<usize> {
        self.0.read_at(buf, offset)
    }
}

#[cfg(not(unix))]
impl ReadAt for ExeReader {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> std::io::Result<usize> {
        use std::io::{Read, Seek, SeekFrom};
        let mut file = match self.0.lock() {
            Ok(file) => file,
            Err(poisoned) => poisoned.into_inner(),
        };
        let original = file.stream_position()?;
        file.seek(SeekFrom::Start(offset))?;
        let result = file.read(buf);
        file.seek(SeekFrom::Start(original))?;
        result
    }
}

impl std::io::Seek for ExeReader {
    #[cfg(unix)]
    fn seek(&mut self, pos: std::io::SeekFrom) -> std::io::Result<u64> {
        std::io::Seek::seek(&mut self.0, pos)
    }

    #[cfg(not(unix))]
    fn seek(&mut self, pos: std::io::SeekFrom) -> std::io::Result<u64> {
        use std::io::Seek;
        match self.0.lock() {
            Ok(mut file) => file.seek(pos),
            Err(poisoned) => poisoned.into_inner().seek(pos),
        }
    }
}

impl From<std::fs::File> for ExeReader {
    #[cfg(unix)]
    fn from(file: std::fs::File) -> Self {
        Self(file)
    }

    #[cfg(not(unix))]
    fn from(file: std::fs::File) -> Self {
        Self(std::sync::Mutex::new(file))
    }
}

impl ReadAt for &[u8] {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> std::io::Result<usize> {
        let skip = self.len().min(offset as usize);
        let data = &self[skip..];
        let len = data.len().min(buf.len());
        buf[..len].copy_from_slice(&data[..len]);
        Ok(len)
    }
}

impl<R> ReadAt for std::io::Cursor<R>
where
    R: AsRef<[u8]>,
{
    fn read_at(&self, buf: &mut [u8], offset: u64) -> std::io::Result<usize> {
        self.get_ref().as_ref().read_at(buf, offset)
    }
}

impl<T: ReadAt> ReadAt for &'_ T {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> std::io::Result<usize> {
        (*self).read_at(buf, offset)
    }
}
