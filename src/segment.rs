//! Segment types and location tracking

/// A byte range in a file (offset and size)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    /// Offset from start of file
    pub offset: u64,
    /// Size in bytes
    pub size: u64,
}

impl ByteRange {
    /// Create a new byte range
    pub fn new(offset: u64, size: u64) -> Self {
        Self { offset, size }
    }

    /// Get the end offset of this range
    pub fn end_offset(&self) -> u64 {
        self.offset + self.size
    }

    /// Check if this range is immediately followed by another (contiguous)
    pub fn is_contiguous_with(&self, other: &ByteRange) -> bool {
        self.end_offset() == other.offset
    }
}

/// Maximum size for a single range read into memory (256 MB)
///
/// This prevents malicious files from requesting multi-GB allocations.
/// Marker segments are capped at 64 KB by the JPEG length field, so only
/// image data ever comes close to this.
pub const MAX_SEGMENT_SIZE: u64 = 256 * 1024 * 1024;

/// Logical classification of a segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SegmentKind {
    /// File signature (SOI)
    Header,
    /// EXIF metadata (APP1 with `Exif\0\0`)
    Exif,
    /// XMP metadata (APP1 with the XMP namespace)
    Xmp,
    /// Scan header plus entropy-coded image data
    ImageData,
    /// Bytes following the end-of-image marker
    Trailer,
    /// Any other marker segment
    Other,
}

impl SegmentKind {
    /// Get a string representation of this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Header => "header",
            Self::Exif => "exif",
            Self::Xmp => "xmp",
            Self::ImageData => "image_data",
            Self::Trailer => "trailer",
            Self::Other => "other",
        }
    }

    /// Whether this segment carries metadata
    pub fn is_metadata(&self) -> bool {
        matches!(self, Self::Exif | Self::Xmp)
    }
}

impl std::fmt::Display for SegmentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Format-specific metadata for segments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentMetadata {
    /// Frame header (SOFn) dimensions
    Frame {
        /// Width in pixels
        width: u16,
        /// Height in pixels
        height: u16,
    },
}

/// A contiguous, classified byte range of a container
///
/// # Examples
///
/// ```
/// use metadata_io::{ByteRange, Segment, SegmentKind};
///
/// let header = Segment::new(ByteRange::new(0, 2), SegmentKind::Header, Some(0xD8));
/// assert_eq!(header.label(), "SOI");
/// assert!(header.payload.is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Where the segment lives in the source, including marker and fill bytes
    pub location: ByteRange,

    /// Logical classification
    pub kind: SegmentKind,

    /// The marker byte following `0xFF`, if the segment starts with a marker
    pub marker: Option<u8>,

    /// Bytes after the two-byte length field, for segments that have one
    pub payload: Option<ByteRange>,

    /// Optional format-specific metadata
    pub metadata: Option<SegmentMetadata>,
}

impl Segment {
    /// Create a segment without payload or metadata
    pub fn new(location: ByteRange, kind: SegmentKind, marker: Option<u8>) -> Self {
        Self {
            location,
            kind,
            marker,
            payload: None,
            metadata: None,
        }
    }

    /// Attach the payload range
    pub fn with_payload(mut self, payload: ByteRange) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Add metadata to this segment
    pub fn with_metadata(mut self, metadata: SegmentMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Human-readable marker name ("APP1", "SOS", ...)
    pub fn label(&self) -> &'static str {
        match (self.kind, self.marker) {
            (SegmentKind::Trailer, _) => "TRAILER",
            (_, Some(marker)) => marker_label(marker),
            (_, None) => "OTHER",
        }
    }

    /// Check if this is an EXIF segment
    pub fn is_exif(&self) -> bool {
        self.kind == SegmentKind::Exif
    }

    /// Check if this is image data
    pub fn is_image_data(&self) -> bool {
        self.kind == SegmentKind::ImageData
    }
}

/// Get human-readable label for a JPEG marker
pub(crate) fn marker_label(marker: u8) -> &'static str {
    match marker {
        0x01 => "TEM",
        0xC0 => "SOF0",
        0xC1 => "SOF1",
        0xC2 => "SOF2",
        0xC3 => "SOF3",
        0xC4 => "DHT",
        0xC5 => "SOF5",
        0xC6 => "SOF6",
        0xC7 => "SOF7",
        0xC8 => "JPG",
        0xC9 => "SOF9",
        0xCA => "SOF10",
        0xCB => "SOF11",
        0xCC => "DAC",
        0xCD => "SOF13",
        0xCE => "SOF14",
        0xCF => "SOF15",
        0xD0..=0xD7 => "RST",
        0xD8 => "SOI",
        0xD9 => "EOI",
        0xDA => "SOS",
        0xDB => "DQT",
        0xDC => "DNL",
        0xDD => "DRI",
        0xDE => "DHP",
        0xDF => "EXP",
        0xE0 => "APP0",
        0xE1 => "APP1",
        0xE2 => "APP2",
        0xE3 => "APP3",
        0xE4 => "APP4",
        0xE5 => "APP5",
        0xE6 => "APP6",
        0xE7 => "APP7",
        0xE8 => "APP8",
        0xE9 => "APP9",
        0xEA => "APP10",
        0xEB => "APP11",
        0xEC => "APP12",
        0xED => "APP13",
        0xEE => "APP14",
        0xEF => "APP15",
        0xF0..=0xFD => "JPGn",
        0xFE => "COM",
        _ => "OTHER",
    }
}
