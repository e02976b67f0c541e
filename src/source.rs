// Seekable byte source with a narrowable data window
//
// Every format handler reads through a `ByteSource`. The window
// [data_start, data_end) excludes prefixes and trailers such as ID3 tags,
// and the cursor never leaves it. Reads that run into data_end return short
// instead of failing.

use std::io::{self, Cursor, Read, Seek, SeekFrom};
use tracing::debug;

/// Random-access reader with `data_start <= cursor <= data_end <= total_len`.
#[derive(Debug)]
pub struct ByteSource<R> {
    inner: R,
    total_len: u64,
    data_start: u64,
    data_end: u64,
    cursor: u64,
}

impl ByteSource<Cursor<Vec<u8>>> {
    /// In-memory source over a materialised buffer, used for embedded streams.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let total_len = bytes.len() as u64;
        Self {
            inner: Cursor::new(bytes),
            total_len,
            data_start: 0,
            data_end: total_len,
            cursor: 0,
        }
    }
}

impl<R: Read + Seek> ByteSource<R> {
    /// Wrap `reader`. Without a length hint the length is found by seeking to the end.
    pub fn new(mut reader: R, length_hint: Option<u64>) -> io::Result<Self> {
        let total_len = match length_hint {
            Some(len) => len,
            None => reader.seek(SeekFrom::End(0))?,
        };
        reader.seek(SeekFrom::Start(0))?;
        Ok(Self {
            inner: reader,
            total_len,
            data_start: 0,
            data_end: total_len,
            cursor: 0,
        })
    }

    pub fn total_len(&self) -> u64 {
        self.total_len
    }

    pub fn data_start(&self) -> u64 {
        self.data_start
    }

    pub fn data_end(&self) -> u64 {
        self.data_end
    }

    pub fn position(&self) -> u64 {
        self.cursor
    }

    /// Bytes left between the cursor and `data_end`.
    pub fn remaining(&self) -> u64 {
        self.data_end - self.cursor
    }

    /// Narrow the data window. Bounds are clamped so the invariant holds.
    pub fn narrow(&mut self, start: u64, end: u64) {
        self.data_end = end.min(self.total_len);
        self.data_start = start.min(self.data_end);
        self.cursor = self.cursor.clamp(self.data_start, self.data_end);
    }

    /// Move the cursor, clamped into the data window. Returns the new position.
    pub fn seek(&mut self, offset: u64) -> u64 {
        self.cursor = offset.clamp(self.data_start, self.data_end);
        self.cursor
    }

    /// Advance the cursor by `count` bytes, stopping at `data_end`.
    pub fn skip(&mut self, count: u64) -> u64 {
        self.seek(self.cursor.saturating_add(count))
    }

    /// Read up to `count` bytes; fewer only when `data_end` is reached.
    pub fn read(&mut self, count: usize) -> io::Result<Vec<u8>> {
        let wanted = (count as u64).min(self.remaining());
        let mut buffer = Vec::new();
        if wanted == 0 {
            return Ok(buffer);
        }
        self.inner.seek(SeekFrom::Start(self.cursor))?;
        (&mut self.inner).take(wanted).read_to_end(&mut buffer)?;
        self.cursor += buffer.len() as u64;
        if (buffer.len() as u64) < wanted {
            self.truncate()?;
        }
        Ok(buffer)
    }

    /// The reader ended before the length we were told. Pull the window in
    /// to its real end so later reads are short only at `data_end`.
    fn truncate(&mut self) -> io::Result<()> {
        let end = self.inner.seek(SeekFrom::End(0))?.min(self.cursor);
        debug!(expected = self.total_len, actual = end, "input shorter than its length");
        self.total_len = end;
        self.data_end = self.data_end.min(end);
        self.data_start = self.data_start.min(self.data_end);
        self.cursor = self.cursor.min(self.data_end);
        Ok(())
    }

    /// Seek to `offset` and read up to `count` bytes.
    pub fn read_at(&mut self, offset: u64, count: usize) -> io::Result<Vec<u8>> {
        self.seek(offset);
        self.read(count)
    }

    /// Read without moving the cursor.
    pub fn peek(&mut self, count: usize) -> io::Result<Vec<u8>> {
        let start = self.cursor;
        let bytes = self.read(count);
        self.cursor = start.min(self.data_end);
        bytes
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read + Seek> Read for ByteSource<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let wanted = (buf.len() as u64).min(self.remaining()) as usize;
        if wanted == 0 {
            return Ok(0);
        }
        self.inner.seek(SeekFrom::Start(self.cursor))?;
        let read = self.inner.read(&mut buf[..wanted])?;
        self.cursor += read as u64;
        if read == 0 {
            self.truncate()?;
        }
        Ok(read)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::io::read_u8;

    fn source() -> ByteSource<Cursor<Vec<u8>>> {
        ByteSource::from_bytes((0u8..100).collect())
    }

    #[test]
    fn test_short_read_at_end() {
        let mut src = source();
        src.seek(95);
        assert_eq!(src.read(10).unwrap(), vec![95, 96, 97, 98, 99]);
        assert_eq!(src.position(), 100);
        assert!(src.read(10).unwrap().is_empty());
        assert_eq!(src.remaining(), 0);
    }

    #[test]
    fn test_narrowed_window() {
        let mut src = source();
        src.narrow(10, 20);
        assert_eq!(src.position(), 10);
        assert_eq!(src.seek(5), 10);
        assert_eq!(src.seek(50), 20);
        assert_eq!(src.read_at(18, 10).unwrap(), vec![18, 19]);
        assert_eq!(src.skip(100), 20);
    }

    #[test]
    fn test_narrow_clamps() {
        let mut src = source();
        src.narrow(80, 500);
        assert_eq!(src.data_end(), 100);
        src.narrow(90, 40);
        assert_eq!((src.data_start(), src.data_end()), (40, 40));
        assert_eq!(src.position(), 40);
    }

    #[test]
    fn test_peek_keeps_cursor() {
        let mut src = source();
        src.seek(3);
        assert_eq!(src.peek(2).unwrap(), vec![3, 4]);
        assert_eq!(src.position(), 3);
    }

    #[test]
    fn test_length_hint_and_read_trait() {
        let mut src = ByteSource::new(Cursor::new(vec![0x12, 0x34, 0x56]), Some(2)).unwrap();
        assert_eq!(src.total_len(), 2);
        assert_eq!(read_u8(&mut src).unwrap(), 0x12);
        assert_eq!(read_u8(&mut src).unwrap(), 0x34);
        assert!(read_u8(&mut src).is_err());
    }

    #[test]
    fn test_overlong_hint_pulls_in_data_end() {
        let mut src = ByteSource::new(Cursor::new(vec![7u8; 10]), Some(50)).unwrap();
        assert_eq!(src.data_end(), 50);
        assert_eq!(src.read_at(4, 20).unwrap().len(), 6);
        assert_eq!((src.total_len(), src.data_end()), (10, 10));
        assert_eq!(src.remaining(), 0);
        assert_eq!(src.seek(30), 10);
    }

    #[test]
    fn test_read_past_real_end_finds_true_length() {
        let mut src = ByteSource::new(Cursor::new(vec![1u8; 10]), Some(200)).unwrap();
        assert!(src.read_at(72, 128).unwrap().is_empty());
        assert_eq!(src.total_len(), 10);
        assert_eq!(src.read_at(0, 64).unwrap(), vec![1u8; 10]);
    }

    #[test]
    fn test_discovered_length() {
        let src = ByteSource::new(Cursor::new(vec![0u8; 42]), None).unwrap();
        assert_eq!(src.total_len(), 42);
        assert_eq!(src.data_end(), 42);
    }
}
