//! JPEG container I/O
//!
//! [`SegmentScanner`] walks the marker segments of a JPEG stream lazily and
//! classifies them. [`write_with_exif`] reassembles a stream from a scanned
//! [`Structure`], copying every segment verbatim except the EXIF one.

use crate::{
    error::{Error, Result},
    segment::{ByteRange, Segment, SegmentKind, SegmentMetadata},
    stream::ByteSource,
    structure::Structure,
    tiff::EXIF_SIGNATURE,
};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Seek, SeekFrom, Write};

// JPEG markers
const TEM: u8 = 0x01; // Temporary (arithmetic coding), no length
const SOI: u8 = 0xD8; // Start of Image
const EOI: u8 = 0xD9; // End of Image
const SOS: u8 = 0xDA; // Start of Scan (image data follows)
const APP0: u8 = 0xE0; // JFIF
const APP1: u8 = 0xE1; // XMP / EXIF

// Special markers without length
const RST0: u8 = 0xD0;
const RST7: u8 = 0xD7;

const XMP_SIGNATURE: &[u8] = b"http://ns.adobe.com/xap/1.0/\0";
const XMP_EXTENDED_SIGNATURE: &[u8] = b"http://ns.adobe.com/xmp/extension/\0";

/// Largest value of a segment length field
const MAX_MARKER_SIZE: usize = 0xFFFF;

/// Frame headers (SOFn); C4, C8 and CC share the range but are not frames
fn is_frame_marker(marker: u8) -> bool {
    matches!(marker, 0xC0..=0xCF) && !matches!(marker, 0xC4 | 0xC8 | 0xCC)
}

/// Where a [`SegmentScanner`] is in the stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    /// Nothing read yet; SOI expected
    AtStart,
    /// Between marker segments
    Scanning,
    /// EOI emitted; anything left is trailer
    AfterEoi,
    /// Whole stream covered
    AtEnd,
    /// An error was returned; nothing more will be produced
    Failed,
}

/// Lazy iterator over the segments of a JPEG stream
///
/// Segments are produced in stream order and cover the stream without gaps
/// or overlaps: fill bytes before a marker belong to that marker's segment,
/// and bytes after EOI form a [`SegmentKind::Trailer`] segment.
///
/// After an error the iterator is fused and yields `None`.
///
/// # Example
///
/// ```
/// use metadata_io::{formats::jpeg_io::SegmentScanner, SegmentKind};
/// use std::io::Cursor;
///
/// let mut source = Cursor::new(vec![0xFF, 0xD8, 0xFF, 0xD9]);
/// let kinds: Vec<_> = SegmentScanner::new(&mut source)?
///     .map(|segment| segment.map(|s| s.kind))
///     .collect::<Result<_, _>>()?;
/// assert_eq!(kinds, vec![SegmentKind::Header, SegmentKind::Other]);
/// # Ok::<(), metadata_io::Error>(())
/// ```
pub struct SegmentScanner<'a, R: ByteSource + ?Sized> {
    source: &'a mut R,
    total_len: u64,
    offset: u64,
    state: ScanState,
}

impl<'a, R: ByteSource + ?Sized> SegmentScanner<'a, R> {
    /// Start scanning `source` from its first byte
    pub fn new(source: &'a mut R) -> Result<Self> {
        let total_len = source.total_len()?;
        Ok(Self {
            source,
            total_len,
            offset: 0,
            state: ScanState::AtStart,
        })
    }

    /// Total length of the stream being scanned
    pub fn total_len(&self) -> u64 {
        self.total_len
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    fn read_u8_at(&mut self, position: u64) -> Result<u8> {
        if position >= self.total_len {
            return Err(Error::malformed(position, "stream ended before EOI"));
        }
        self.source.seek(SeekFrom::Start(position))?;
        Ok(self.source.read_u8()?)
    }

    fn next_segment(&mut self) -> Result<Option<Segment>> {
        match self.state {
            ScanState::AtStart => self.read_header().map(Some),
            ScanState::Scanning => self.read_marker_segment().map(Some),
            ScanState::AfterEoi => {
                self.state = ScanState::AtEnd;
                if self.offset < self.total_len {
                    let trailer = ByteRange::new(self.offset, self.total_len - self.offset);
                    log::debug!("{} bytes of trailer after EOI", trailer.size);
                    self.offset = self.total_len;
                    Ok(Some(Segment::new(trailer, SegmentKind::Trailer, None)))
                } else {
                    Ok(None)
                }
            }
            ScanState::AtEnd | ScanState::Failed => Ok(None),
        }
    }

    fn read_header(&mut self) -> Result<Segment> {
        if self.total_len < 2 {
            return Err(Error::malformed(0, "stream too short for SOI"));
        }
        self.source.seek(SeekFrom::Start(0))?;
        if self.source.read_u8()? != 0xFF || self.source.read_u8()? != SOI {
            return Err(Error::malformed(0, "Not a JPEG file (missing SOI)"));
        }
        self.offset = 2;
        self.state = ScanState::Scanning;
        Ok(Segment::new(ByteRange::new(0, 2), SegmentKind::Header, Some(SOI)))
    }

    fn read_marker_segment(&mut self) -> Result<Segment> {
        let start = self.offset;

        let prefix = self.read_u8_at(start)?;
        if prefix != 0xFF {
            return Err(Error::malformed(
                start,
                format!("Expected 0xFF, got 0x{:02X}", prefix),
            ));
        }

        // Handle padding bytes
        let mut marker_at = start + 1;
        let mut marker = self.read_u8_at(marker_at)?;
        while marker == 0xFF {
            marker_at += 1;
            marker = self.read_u8_at(marker_at)?;
        }
        let after_marker = marker_at + 1;

        match marker {
            EOI => {
                self.offset = after_marker;
                self.state = ScanState::AfterEoi;
                Ok(Segment::new(
                    ByteRange::new(start, after_marker - start),
                    SegmentKind::Other,
                    Some(EOI),
                ))
            }

            // RST and TEM markers have no length
            RST0..=RST7 | TEM => {
                self.offset = after_marker;
                Ok(Segment::new(
                    ByteRange::new(start, after_marker - start),
                    SegmentKind::Other,
                    Some(marker),
                ))
            }

            SOI => Err(Error::malformed(marker_at - 1, "unexpected second SOI")),

            0x00 | 0x02..=0xBF => Err(Error::malformed(
                marker_at - 1,
                format!("reserved marker 0xFF{:02X}", marker),
            )),

            _ => self.read_length_segment(start, marker, after_marker),
        }
    }

    fn read_length_segment(&mut self, start: u64, marker: u8, length_at: u64) -> Result<Segment> {
        if length_at + 2 > self.total_len {
            return Err(Error::malformed(length_at, "truncated segment length"));
        }
        self.source.seek(SeekFrom::Start(length_at))?;
        let length = u64::from(self.source.read_u16::<BigEndian>()?);
        if length < 2 {
            return Err(Error::malformed(
                length_at,
                format!("segment length {} is below 2", length),
            ));
        }

        let end = length_at + length;
        if end > self.total_len {
            return Err(Error::malformed(
                length_at,
                format!(
                    "segment of {} bytes runs past end of stream ({} bytes)",
                    length, self.total_len
                ),
            ));
        }
        let payload = ByteRange::new(length_at + 2, length - 2);

        if marker == SOS {
            // ImageData includes SOS marker + header + compressed data
            // This makes writing easier - just copy the whole thing
            self.source.seek(SeekFrom::Start(end))?;
            let eoi_at = find_eoi(&mut *self.source)?;
            self.offset = eoi_at;
            return Ok(Segment::new(
                ByteRange::new(start, eoi_at - start),
                SegmentKind::ImageData,
                Some(SOS),
            )
            .with_payload(payload));
        }

        self.offset = end;
        let location = ByteRange::new(start, end - start);

        let kind = if marker == APP1 {
            self.classify_app1(payload)?
        } else {
            SegmentKind::Other
        };
        let mut segment = Segment::new(location, kind, Some(marker)).with_payload(payload);

        if is_frame_marker(marker) && payload.size >= 5 {
            // precision (1), height (2), width (2)
            self.source.seek(SeekFrom::Start(payload.offset + 1))?;
            let height = self.source.read_u16::<BigEndian>()?;
            let width = self.source.read_u16::<BigEndian>()?;
            segment = segment.with_metadata(SegmentMetadata::Frame { width, height });
        }

        Ok(segment)
    }

    fn classify_app1(&mut self, payload: ByteRange) -> Result<SegmentKind> {
        // Read enough bytes to check both standard and extended XMP signatures
        let sig_len = XMP_EXTENDED_SIGNATURE.len().max(XMP_SIGNATURE.len());
        let bytes_to_read = (sig_len as u64).min(payload.size);
        let signature = self
            .source
            .read_range(ByteRange::new(payload.offset, bytes_to_read))?;

        let kind = if signature.starts_with(EXIF_SIGNATURE) {
            SegmentKind::Exif
        } else if signature.starts_with(XMP_SIGNATURE)
            || signature.starts_with(XMP_EXTENDED_SIGNATURE)
        {
            SegmentKind::Xmp
        } else {
            SegmentKind::Other
        };
        Ok(kind)
    }
}

impl<R: ByteSource + ?Sized> Iterator for SegmentScanner<'_, R> {
    type Item = Result<Segment>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_segment() {
            Ok(Some(segment)) => Some(Ok(segment)),
            Ok(None) => {
                if self.state != ScanState::Failed {
                    self.state = ScanState::AtEnd;
                }
                None
            }
            Err(e) => {
                self.state = ScanState::Failed;
                Some(Err(e))
            }
        }
    }
}

impl<R: ByteSource + ?Sized> std::iter::FusedIterator for SegmentScanner<'_, R> {}

/// Find End of Image marker (FFD9)
/// Properly handles byte stuffing in JPEG compressed data
///
/// Returns the position of the `0xFF` that starts EOI.
fn find_eoi<R: Read + Seek + ?Sized>(source: &mut R) -> Result<u64> {
    const BUFFER_SIZE: usize = 8192;
    let mut buffer = vec![0u8; BUFFER_SIZE];
    let mut prev_was_ff = false;
    let start_pos = source.stream_position()?;
    let mut total_read = 0u64;

    loop {
        let n = source.read(&mut buffer)?;
        if n == 0 {
            return Err(Error::malformed(
                start_pos + total_read,
                "stream ended before EOI",
            ));
        }

        for (i, &byte) in buffer[..n].iter().enumerate() {
            if prev_was_ff {
                if byte == EOI {
                    // Found EOI! Return position of the FF
                    let eoi_pos = start_pos + total_read + i as u64 - 1;
                    return Ok(eoi_pos);
                } else if byte == 0xFF {
                    // Multiple FF bytes (padding) - stay in FF state
                    prev_was_ff = true;
                } else {
                    // Stuffed 0x00, RST or another scan's marker - keep scanning
                    prev_was_ff = false;
                }
            } else if byte == 0xFF {
                prev_was_ff = true;
            }
        }

        total_read += n as u64;
    }
}

/// Index after which a new EXIF segment goes: SOI plus any APP0 directly after it
pub(crate) fn exif_insert_index(structure: &Structure) -> usize {
    let segments = structure.segments();
    let mut index = 1;
    while index < segments.len() && segments[index].marker == Some(APP0) {
        index += 1;
    }
    index
}

/// Write an APP1 segment holding `payload` (which starts with `Exif\0\0`)
fn write_app1<W: Write + ?Sized>(writer: &mut W, payload: &[u8]) -> Result<()> {
    let length = payload.len() + 2;
    if length > MAX_MARKER_SIZE {
        return Err(Error::DataTooLarge {
            size: length,
            max: MAX_MARKER_SIZE,
        });
    }
    writer.write_u8(0xFF)?;
    writer.write_u8(APP1)?;
    writer.write_u16::<BigEndian>(length as u16)?;
    writer.write_all(payload)?;
    Ok(())
}

/// Copy `source` to `writer`, substituting the EXIF segment
///
/// The first EXIF segment is replaced with an APP1 segment holding
/// `exif_payload`; without one, the new segment is inserted after SOI and
/// any APP0 segments directly following it. Every other segment, including
/// further EXIF segments, is copied byte-for-byte.
pub fn write_with_exif<R, W>(
    structure: &Structure,
    source: &mut R,
    writer: &mut W,
    exif_payload: &[u8],
) -> Result<()>
where
    R: ByteSource + ?Sized,
    W: Write + ?Sized,
{
    if exif_payload.len() + 2 > MAX_MARKER_SIZE {
        return Err(Error::DataTooLarge {
            size: exif_payload.len() + 2,
            max: MAX_MARKER_SIZE,
        });
    }

    let replace_at = structure.exif_index();
    let insert_at = match replace_at {
        Some(_) => None,
        None => Some(exif_insert_index(structure)),
    };

    for (index, segment) in structure.segments().iter().enumerate() {
        if insert_at == Some(index) {
            write_app1(writer, exif_payload)?;
        }
        if replace_at == Some(index) {
            // keep fill bytes in front of the replaced marker
            if let Some(payload) = segment.payload {
                let marker_at = payload.offset.saturating_sub(4);
                if marker_at > segment.location.offset {
                    let fill = ByteRange::new(
                        segment.location.offset,
                        marker_at - segment.location.offset,
                    );
                    source.copy_range(fill, writer)?;
                }
            }
            write_app1(writer, exif_payload)?;
            continue;
        }
        source.copy_range(segment.location, writer)?;
    }

    // a stream that is only SOI
    if insert_at == Some(structure.segments().len()) {
        write_app1(writer, exif_payload)?;
    }
    Ok(())
}
