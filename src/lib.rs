//! Lossless EXIF metadata reading and single-field updates for JPEG files.
//!
//! This crate scans JPEG marker segments, decodes the EXIF (TIFF) payload of
//! the `APP1` segment into a typed model and writes a new stream in which one
//! logical metadata field has changed. Everything outside the EXIF segment is
//! copied byte-for-byte.
//!
//! # Design Principles
//!
//! - **Streaming**: Segments are located by seeking; only the EXIF payload is
//!   read into memory
//! - **Lossless**: Unknown tags, unknown field types and the embedded thumbnail
//!   survive a rewrite
//! - **Idempotent**: An update that changes nothing returns the input unchanged
//!
//! # Quick Start
//!
//! ```
//! use metadata_io::{read_metadata, update, test_utils::JpegBuilder, MetadataUpdate, Orientation};
//!
//! # fn main() -> metadata_io::Result<()> {
//! let jpeg = JpegBuilder::new().jfif().build();
//!
//! let rotated = update(&jpeg, &MetadataUpdate::Orientation(Orientation::RotateRight))?;
//! let metadata = read_metadata(&rotated)?;
//! assert_eq!(metadata.orientation(), Some(Orientation::RotateRight));
//!
//! // applying the same update again changes nothing
//! let again = update(&rotated, &MetadataUpdate::Orientation(Orientation::RotateRight))?;
//! assert_eq!(again, rotated);
//! # Ok(())
//! # }
//! ```
//!
//! # Asset API
//!
//! For files and other seekable streams, use [`Asset`]:
//!
//! ```no_run
//! use metadata_io::{Asset, MetadataUpdate, Options};
//! use chrono::FixedOffset;
//!
//! # fn main() -> metadata_io::Result<()> {
//! let mut asset = Asset::open("image.jpg")?;
//! println!("{}", asset.metadata()?);
//!
//! let options = Options::new().with_time_offset(FixedOffset::east_opt(3600).unwrap());
//! let update = MetadataUpdate::TakenDate(Some(1_700_000_000_000));
//! asset.write_to("output.jpg", &update, &options)?;
//! # Ok(())
//! # }
//! ```

mod asset;
mod engine;
mod error;
pub mod exif_date;
pub mod formats;
mod metadata;
mod model;
mod segment;
mod stream;
mod structure;
pub mod tiff;
mod updates;

pub use asset::Asset;
pub use engine::apply;
pub use error::{Error, Result};
pub use formats::jpeg_io::{ScanState, SegmentScanner};
pub use metadata::{
    Directory, DirectoryKind, ImageMetadata, MetadataEntry, Rational, SRational, TagValue,
};
pub use model::{GpsCoordinates, Orientation, PhotoRating};
pub use segment::{ByteRange, Segment, SegmentKind, SegmentMetadata, MAX_SEGMENT_SIZE};
pub use stream::{ByteSink, ByteSource};
pub use structure::Structure;
pub use updates::{MetadataUpdate, Options};

// Test utilities - only compiled for tests or when explicitly enabled
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

use std::io::Cursor;

/// Scan the segment layout of a JPEG stream
///
/// Fails with `MalformedContainer` if the stream is not a well-formed
/// sequence of marker segments ending in `EOI`.
pub fn scan<R: ByteSource + ?Sized>(source: &mut R) -> Result<Structure> {
    Structure::scan(source)
}

/// Read the EXIF metadata of a JPEG held in memory
///
/// A missing or undecodable EXIF segment yields empty metadata; only a
/// malformed container is an error.
pub fn read_metadata(data: &[u8]) -> Result<ImageMetadata> {
    Asset::from_source(Cursor::new(data))?.metadata()
}

/// Apply one update with default [`Options`]
///
/// See [`update_with_options`].
pub fn update(data: &[u8], update: &MetadataUpdate) -> Result<Vec<u8>> {
    update_with_options(data, update, &Options::default())
}

/// Apply one update and return the complete new JPEG
///
/// If the update leaves the metadata unchanged, the result equals `data`.
///
/// # Errors
/// - `MalformedContainer`: `data` is not a well-formed JPEG
/// - `UnsupportedMetadataFormat`: the existing EXIF segment cannot be decoded
/// - `UnsupportedUpdate`: the update cannot be represented in EXIF
/// - `DataTooLarge`: the new EXIF payload does not fit into one segment
pub fn update_with_options(
    data: &[u8],
    update: &MetadataUpdate,
    options: &Options,
) -> Result<Vec<u8>> {
    let mut asset = Asset::from_source(Cursor::new(data))?;
    let mut sink = ByteSink::memory();
    asset.write(&mut sink, update, options)?;
    log::debug!(
        "{} update: {} bytes in, {} bytes out",
        update.name(),
        data.len(),
        sink.bytes_written()
    );
    Ok(sink.into_bytes())
}
