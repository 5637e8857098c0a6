//! Structure representation for scanned JPEG streams

use crate::{
    error::Result,
    formats::jpeg_io::SegmentScanner,
    segment::{ByteRange, Segment, SegmentMetadata},
    stream::ByteSource,
};

/// The discovered segment layout of a JPEG stream
///
/// This structure works with any `Read + Seek` source (files, buffers, streams).
/// Segments are stored in stream order; concatenating their ranges gives back
/// the source exactly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Structure {
    /// All segments in the stream
    segments: Vec<Segment>,

    /// Total stream size
    pub total_size: u64,

    /// Quick lookup: index of the first EXIF segment (if any)
    exif_index: Option<usize>,

    /// Dimensions from the first frame header
    image_size: Option<(u16, u16)>,
}

impl Structure {
    /// Create an empty structure for a stream of `total_size` bytes
    pub fn new(total_size: u64) -> Self {
        Self {
            segments: Vec::new(),
            total_size,
            exif_index: None,
            image_size: None,
        }
    }

    /// Scan `source` to the end
    ///
    /// Any scanner failure is returned as-is; there is no partial result.
    pub fn scan<R: ByteSource + ?Sized>(source: &mut R) -> Result<Self> {
        let scanner = SegmentScanner::new(source)?;
        let mut structure = Self::new(scanner.total_len());
        for segment in scanner {
            structure.add_segment(segment?);
        }
        log::debug!(
            "scanned {} segments over {} bytes (exif: {:?})",
            structure.segments.len(),
            structure.total_size,
            structure.exif_index
        );
        Ok(structure)
    }

    /// Add a segment and update indices
    pub fn add_segment(&mut self, segment: Segment) {
        let index = self.segments.len();

        if segment.is_exif() && self.exif_index.is_none() {
            self.exif_index = Some(index);
        }
        if let (None, Some(SegmentMetadata::Frame { width, height })) =
            (self.image_size, segment.metadata)
        {
            self.image_size = Some((width, height));
        }

        self.segments.push(segment);
    }

    /// Get reference to segments
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Index of the first EXIF segment
    pub fn exif_index(&self) -> Option<usize> {
        self.exif_index
    }

    /// The first EXIF segment
    pub fn exif_segment(&self) -> Option<&Segment> {
        self.exif_index.map(|index| &self.segments[index])
    }

    /// `(width, height)` from the first `SOFn` segment
    pub fn image_size(&self) -> Option<(u16, u16)> {
        self.image_size
    }

    /// Total stream size
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Get the byte range of the main image data
    pub fn image_data_range(&self) -> Option<ByteRange> {
        self.segments
            .iter()
            .find(|seg| seg.is_image_data())
            .map(|seg| seg.location)
    }
}
