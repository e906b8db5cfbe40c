use std::{
    cell::RefCell,
    io::{self, Read, Seek, SeekFrom, Write},
    rc::Rc,
};

/// Seekable 64-bit-addressable byte source/sink backing one or more bands.
///
/// A short [RawStream::read_fully] means end of file was reached; no
/// retry beyond `Interrupted` is attempted. Implementations come for free
/// for anything `Read + Write + Seek` (files, in-memory cursors).
pub trait RawStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64>;
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;
    fn flush(&mut self) -> io::Result<()>;

    /// Last chance to commit state before the owning band drops the
    /// handle.
    fn close(&mut self) -> io::Result<()> {
        self.flush()
    }

    /// Reads until `buf` is full or the stream ends; returns bytes read.
    fn read_fully(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut total = 0;
        while total < buf.len() {
            match self.read(&mut buf[total..]) {
                Ok(0) => break,
                Ok(n) => total += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(total)
    }

    /// Writes until `buf` is drained or the stream stops accepting bytes;
    /// returns bytes written.
    fn write_fully(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut total = 0;
        while total < buf.len() {
            match self.write(&buf[total..]) {
                Ok(0) => break,
                Ok(n) => total += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(total)
    }
}

impl<S: Read + Write + Seek> RawStream for S {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        Seek::seek(self, pos)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Read::read(self, buf)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Write::write(self, buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Write::flush(self)
    }
}

/// Stream handle shared by the bands of one dataset.
///
/// Bands of a dataset share one seek cursor, so access is single-threaded
/// by construction; every seek is paired with its read or write without
/// yielding in between.
pub type SharedStream = Rc<RefCell<dyn RawStream>>;

/// Wraps a stream for sharing between bands.
pub fn shared(stream: impl RawStream + 'static) -> SharedStream {
    Rc::new(RefCell::new(stream))
}

/// Whether a band may write through its stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    ReadOnly,
    Update,
}

/// Whether dropping the band closes the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOwnership {
    Owned,
    Borrowed,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn read_fully_reports_eof_as_short_count() {
        let mut cursor = Cursor::new(vec![1u8, 2, 3]);
        let mut buf = [0u8; 8];
        let n = RawStream::read_fully(&mut cursor, &mut buf).unwrap();
        assert_eq!(n, 3);
        assert_eq!(&buf[..3], [1, 2, 3]);
    }

    #[test]
    fn write_fully_extends_cursor() {
        let mut cursor = Cursor::new(Vec::new());
        let n = RawStream::write_fully(&mut cursor, &[9u8; 5]).unwrap();
        assert_eq!(n, 5);
        assert_eq!(cursor.into_inner(), [9u8; 5]);
    }
}
