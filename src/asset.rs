//! JPEG asset handling
//!
//! An [`Asset`] owns a byte source and its scanned [`Structure`]. Metadata
//! is decoded lazily; writing produces a complete new stream with one
//! metadata field changed.

use crate::{
    engine,
    error::Result,
    formats::jpeg_io,
    metadata::ImageMetadata,
    segment::ByteRange,
    stream::ByteSource as _,
    structure::Structure,
    tiff::{self, EXIF_SIGNATURE},
    updates::{MetadataUpdate, Options},
};
use std::fs::File;
use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// A scanned JPEG stream
///
/// # Example
///
/// ```no_run
/// use metadata_io::{Asset, MetadataUpdate, Options, Orientation};
///
/// # fn main() -> metadata_io::Result<()> {
/// let mut asset = Asset::open("image.jpg")?;
///
/// // Read metadata
/// println!("{}", asset.metadata()?);
///
/// // Change one field and write a new file
/// let update = MetadataUpdate::Orientation(Orientation::RotateRight);
/// asset.write_to("output.jpg", &update, &Options::default())?;
/// # Ok(())
/// # }
/// ```
pub struct Asset<R: Read + Seek> {
    reader: R,
    structure: Structure,
}

impl Asset<File> {
    /// Open a JPEG file from a path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_source(file)
    }
}

impl Asset<Cursor<Vec<u8>>> {
    /// Create an Asset over an in-memory buffer
    pub fn from_bytes(data: impl Into<Vec<u8>>) -> Result<Self> {
        Self::from_source(Cursor::new(data.into()))
    }
}

impl<R: Read + Seek> Asset<R> {
    /// Create an Asset from any seekable reader
    ///
    /// The whole stream is scanned up front; a malformed container fails
    /// here with `MalformedContainer`.
    pub fn from_source(mut reader: R) -> Result<Self> {
        reader.seek(SeekFrom::Start(0))?;
        let structure = Structure::scan(&mut reader)?;
        Ok(Asset { reader, structure })
    }

    /// Get the scanned structure
    pub fn structure(&self) -> &Structure {
        &self.structure
    }

    /// Get a mutable reference to the reader
    pub fn reader_mut(&mut self) -> &mut R {
        &mut self.reader
    }

    /// Give back the reader
    pub fn into_inner(self) -> R {
        self.reader
    }

    /// The TIFF payload of the first EXIF segment (without `Exif\0\0`)
    pub fn exif_bytes(&mut self) -> Result<Option<Vec<u8>>> {
        let Some(payload) = self.structure.exif_segment().and_then(|s| s.payload) else {
            return Ok(None);
        };
        let skip = EXIF_SIGNATURE.len() as u64;
        let tiff = ByteRange::new(payload.offset + skip, payload.size.saturating_sub(skip));
        self.reader.read_range(tiff).map(Some)
    }

    /// Decode the EXIF metadata
    ///
    /// Returns `Ok(None)` if there is no EXIF segment, and
    /// `UnsupportedMetadataFormat` if there is one that cannot be decoded.
    pub fn try_metadata(&mut self) -> Result<Option<ImageMetadata>> {
        match self.exif_bytes()? {
            Some(data) => tiff::decode(&data).map(Some),
            None => Ok(None),
        }
    }

    /// Decode the EXIF metadata, treating anything undecodable as absent
    pub fn metadata(&mut self) -> Result<ImageMetadata> {
        match self.try_metadata() {
            Ok(metadata) => Ok(metadata.unwrap_or_default()),
            Err(e) if e.is_recoverable() => {
                log::warn!("Ignoring EXIF segment: {}", e);
                Ok(ImageMetadata::default())
            }
            Err(e) => Err(e),
        }
    }

    /// Work out the new APP1 payload; `None` means the stream stays as is
    fn prepare(&mut self, update: &MetadataUpdate, options: &Options) -> Result<Option<Vec<u8>>> {
        let existing = self.exif_bytes()?;
        let Some(tiff) = engine::plan(existing.as_deref(), update, options)? else {
            return Ok(None);
        };

        let mut payload = Vec::with_capacity(EXIF_SIGNATURE.len() + tiff.len());
        payload.extend_from_slice(EXIF_SIGNATURE);
        payload.extend_from_slice(&tiff);
        Ok(Some(payload))
    }

    fn emit<W: Write + ?Sized>(&mut self, payload: Option<&[u8]>, writer: &mut W) -> Result<()> {
        match payload {
            Some(payload) => {
                jpeg_io::write_with_exif(&self.structure, &mut self.reader, writer, payload)
            }
            None => {
                let whole = ByteRange::new(0, self.structure.total_size());
                self.reader.copy_range(whole, writer)
            }
        }
    }

    /// Write the stream with `update` applied
    ///
    /// Nothing is written unless the update could be applied. If it leaves
    /// the metadata unchanged, the source is copied unchanged.
    pub fn write<W: Write + ?Sized>(
        &mut self,
        writer: &mut W,
        update: &MetadataUpdate,
        options: &Options,
    ) -> Result<()> {
        let payload = self.prepare(update, options)?;
        self.emit(payload.as_deref(), writer)
    }

    /// Write to a new file with `update` applied
    ///
    /// The file is only created once the update has been prepared.
    pub fn write_to<P: AsRef<Path>>(
        &mut self,
        path: P,
        update: &MetadataUpdate,
        options: &Options,
    ) -> Result<()> {
        let payload = self.prepare(update, options)?;
        let mut output = File::create(path)?;
        self.emit(payload.as_deref(), &mut output)?;
        output.flush()?;
        Ok(())
    }
}
