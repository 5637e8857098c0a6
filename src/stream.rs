//! Byte source and sink abstractions
//!
//! The pipeline never touches files directly. It reads from anything that is
//! `Read + Seek` through [`ByteSource`] and writes through a [`ByteSink`],
//! which counts what it forwards and can be materialized into a `Vec<u8>`.

use crate::{
    error::{Error, Result},
    segment::{ByteRange, MAX_SEGMENT_SIZE},
};
use std::io::{self, Read, Seek, SeekFrom, Write};

/// A readable byte stream with a known total length
///
/// Implemented for every `Read + Seek` type.
pub trait ByteSource: Read + Seek {
    /// Total length of the stream; the read position is left unchanged
    fn total_len(&mut self) -> Result<u64> {
        let position = self.stream_position()?;
        let len = self.seek(SeekFrom::End(0))?;
        if position != len {
            self.seek(SeekFrom::Start(position))?;
        }
        Ok(len)
    }

    /// Current read position
    fn position(&mut self) -> Result<u64> {
        Ok(self.stream_position()?)
    }

    /// Read exactly the bytes of `range`
    fn read_range(&mut self, range: ByteRange) -> Result<Vec<u8>> {
        // Validate size to prevent DOS attacks
        if range.size > MAX_SEGMENT_SIZE {
            return Err(Error::DataTooLarge {
                size: range.size as usize,
                max: MAX_SEGMENT_SIZE as usize,
            });
        }

        self.seek(SeekFrom::Start(range.offset))?;
        let mut buffer = vec![0u8; range.size as usize];
        self.read_exact(&mut buffer).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => Error::malformed(
                range.offset,
                format!("range of {} bytes runs past end of stream", range.size),
            ),
            _ => Error::Io(e),
        })?;
        Ok(buffer)
    }

    /// Copy `range` verbatim into `writer`
    fn copy_range<W: Write + ?Sized>(&mut self, range: ByteRange, writer: &mut W) -> Result<()> {
        self.seek(SeekFrom::Start(range.offset))?;
        let mut limited = (&mut *self).take(range.size);
        let copied = io::copy(&mut limited, writer)?;
        if copied != range.size {
            return Err(Error::malformed(
                range.offset + copied,
                "source ended while copying segment",
            ));
        }
        Ok(())
    }
}

impl<T: Read + Seek + ?Sized> ByteSource for T {}

/// Append-only byte sink
///
/// Wraps any writer and tracks how many bytes went through it.
///
/// # Example
///
/// ```
/// use metadata_io::ByteSink;
/// use std::io::Write;
///
/// let mut sink = ByteSink::memory();
/// sink.write_all(b"\xFF\xD8")?;
/// assert_eq!(sink.bytes_written(), 2);
/// assert_eq!(sink.into_bytes(), vec![0xFF, 0xD8]);
/// # Ok::<(), std::io::Error>(())
/// ```
pub struct ByteSink<W: Write> {
    writer: W,
    written: u64,
}

impl<W: Write> ByteSink<W> {
    /// Wrap a writer
    pub fn new(writer: W) -> Self {
        Self { writer, written: 0 }
    }

    /// Number of bytes forwarded so far
    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    /// Get a reference to the underlying writer
    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    /// Consume the wrapper and return the underlying writer
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl ByteSink<Vec<u8>> {
    /// An in-memory sink
    pub fn memory() -> Self {
        Self::new(Vec::new())
    }

    /// Materialize the written bytes
    pub fn into_bytes(self) -> Vec<u8> {
        self.writer
    }
}

impl<W: Write> Write for ByteSink<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.writer.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.writer.write_all(buf)?;
        self.written += buf.len() as u64;
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}
