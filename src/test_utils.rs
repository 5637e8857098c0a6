//! Test utilities for building and locating JPEG files.
//!
//! This module provides:
//! - [`JpegBuilder`]: synthetic JPEG streams with chosen marker segments
//! - [`TiffBuilder`]: handcrafted EXIF/TIFF payloads, independent of the encoder
//! - File-based fixtures from `tests/fixtures/` and from a custom directory
//!   (via the `METADATA_IO_TEST_FIXTURES` env var)
//!
//! # Usage
//!
//! ```
//! use metadata_io::test_utils::{JpegBuilder, TiffBuilder};
//! use metadata_io::tiff::ByteOrder;
//!
//! let tiff = TiffBuilder::new(ByteOrder::BigEndian)
//!     .ascii(0x010F, "Canon")
//!     .build();
//! let jpeg = JpegBuilder::new().jfif().exif(&tiff).build();
//! assert_eq!(&jpeg[0..2], &[0xFF, 0xD8]);
//! ```

use std::{fs, path::PathBuf};

use crate::{
    tiff::{tags, types, ByteOrder, EXIF_SIGNATURE},
    DirectoryKind, Error, Result,
};

/// Environment variable naming a directory with extra JPEG fixtures
pub const FIXTURES_ENV: &str = "METADATA_IO_TEST_FIXTURES";

/// XMP namespace that opens an XMP APP1 payload
pub const XMP_SIGNATURE: &[u8] = b"http://ns.adobe.com/xap/1.0/\0";

/// Encode a marker segment with its length field
pub fn segment_bytes(marker: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = vec![0xFF, marker];
    out.extend_from_slice(&((payload.len() + 2) as u16).to_be_bytes());
    out.extend_from_slice(payload);
    out
}

/// Builder for small but structurally complete JPEG streams
///
/// Segments added with the builder methods appear between `SOI` and the
/// quantization table, in the order they were added.
#[derive(Debug, Clone)]
pub struct JpegBuilder {
    leading: Vec<Vec<u8>>,
    width: u16,
    height: u16,
    scan_data: Vec<u8>,
    trailer: Vec<u8>,
}

impl Default for JpegBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl JpegBuilder {
    pub fn new() -> Self {
        Self {
            leading: Vec::new(),
            width: 16,
            height: 8,
            // a stuffed 0xFF00 and an RST0 marker inside the entropy data
            scan_data: vec![0x12, 0xFF, 0x00, 0x34, 0xFF, 0xD0, 0x56, 0x78, 0x9A],
            trailer: Vec::new(),
        }
    }

    /// Add a JFIF APP0 segment
    pub fn jfif(self) -> Self {
        self.segment(
            0xE0,
            &[b'J', b'F', b'I', b'F', 0, 1, 1, 0, 0, 1, 0, 1, 0, 0],
        )
    }

    /// Add an EXIF APP1 segment holding `tiff`
    pub fn exif(self, tiff: &[u8]) -> Self {
        let mut payload = EXIF_SIGNATURE.to_vec();
        payload.extend_from_slice(tiff);
        self.segment(0xE1, &payload)
    }

    /// Add an XMP APP1 segment
    pub fn xmp(self, packet: &str) -> Self {
        let mut payload = XMP_SIGNATURE.to_vec();
        payload.extend_from_slice(packet.as_bytes());
        self.segment(0xE1, &payload)
    }

    /// Add a COM segment
    pub fn comment(self, text: &str) -> Self {
        self.segment(0xFE, text.as_bytes())
    }

    /// Add an arbitrary marker segment
    pub fn segment(mut self, marker: u8, payload: &[u8]) -> Self {
        self.leading.push(segment_bytes(marker, payload));
        self
    }

    /// Add raw bytes verbatim (fill bytes, broken segments, ...)
    pub fn raw(mut self, bytes: &[u8]) -> Self {
        self.leading.push(bytes.to_vec());
        self
    }

    pub fn size(mut self, width: u16, height: u16) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Replace the entropy-coded data following SOS
    pub fn scan_data(mut self, data: &[u8]) -> Self {
        self.scan_data = data.to_vec();
        self
    }

    /// Bytes appended after EOI
    pub fn trailer(mut self, data: &[u8]) -> Self {
        self.trailer = data.to_vec();
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut out = vec![0xFF, 0xD8];
        for segment in &self.leading {
            out.extend_from_slice(segment);
        }

        // DQT: one table of 64 ones
        let mut dqt = vec![0x00];
        dqt.extend_from_slice(&[1; 64]);
        out.extend(segment_bytes(0xDB, &dqt));

        // SOF0: 8-bit, one component
        let mut sof = vec![8];
        sof.extend_from_slice(&self.height.to_be_bytes());
        sof.extend_from_slice(&self.width.to_be_bytes());
        sof.extend_from_slice(&[1, 1, 0x11, 0]);
        out.extend(segment_bytes(0xC0, &sof));

        // DHT: an (empty) DC table
        let mut dht = vec![0x00];
        dht.extend_from_slice(&[0; 16]);
        out.extend(segment_bytes(0xC4, &dht));

        out.extend(segment_bytes(0xDA, &[1, 1, 0x00, 0, 63, 0]));
        out.extend_from_slice(&self.scan_data);
        out.extend_from_slice(&[0xFF, 0xD9]);
        out.extend_from_slice(&self.trailer);
        out
    }
}

#[derive(Debug, Clone)]
struct RawEntry {
    tag: u16,
    field_type: u16,
    count: u32,
    data: Vec<u8>,
}

/// Builder for handcrafted TIFF payloads
///
/// Writes IFD0, the EXIF and GPS sub-IFDs and IFD1 with their values
/// directly after each directory. It shares no code with the crate's
/// encoder, so decoder tests do not depend on it.
#[derive(Debug, Clone)]
pub struct TiffBuilder {
    order: ByteOrder,
    ifd0: Vec<RawEntry>,
    exif: Vec<RawEntry>,
    gps: Vec<RawEntry>,
    ifd1: Vec<RawEntry>,
    thumbnail: Option<Vec<u8>>,
}

impl TiffBuilder {
    pub fn new(order: ByteOrder) -> Self {
        Self {
            order,
            ifd0: Vec::new(),
            exif: Vec::new(),
            gps: Vec::new(),
            ifd1: Vec::new(),
            thumbnail: None,
        }
    }

    fn u16_bytes(&self, values: &[u16]) -> Vec<u8> {
        let mut out = Vec::new();
        values.iter().for_each(|&v| self.order.write_u16(&mut out, v));
        out
    }

    fn u32_bytes(&self, values: &[u32]) -> Vec<u8> {
        let mut out = Vec::new();
        values.iter().for_each(|&v| self.order.write_u32(&mut out, v));
        out
    }

    fn ascii_entry(tag: u16, text: &str) -> RawEntry {
        let mut data = text.as_bytes().to_vec();
        data.push(0);
        RawEntry {
            tag,
            field_type: types::ASCII,
            count: data.len() as u32,
            data,
        }
    }

    fn rational_entry(&self, tag: u16, values: &[(u32, u32)]) -> RawEntry {
        let flat: Vec<u32> = values.iter().flat_map(|&(n, d)| [n, d]).collect();
        RawEntry {
            tag,
            field_type: types::RATIONAL,
            count: values.len() as u32,
            data: self.u32_bytes(&flat),
        }
    }

    /// Any entry in IFD0, with `data` already in the builder's byte order
    pub fn entry(mut self, tag: u16, field_type: u16, count: u32, data: &[u8]) -> Self {
        self.ifd0.push(RawEntry {
            tag,
            field_type,
            count,
            data: data.to_vec(),
        });
        self
    }

    /// Any entry in IFD1
    pub fn ifd1_entry(mut self, tag: u16, field_type: u16, count: u32, data: &[u8]) -> Self {
        self.ifd1.push(RawEntry {
            tag,
            field_type,
            count,
            data: data.to_vec(),
        });
        self
    }

    pub fn ascii(mut self, tag: u16, text: &str) -> Self {
        self.ifd0.push(Self::ascii_entry(tag, text));
        self
    }

    pub fn short(mut self, tag: u16, value: u16) -> Self {
        let data = self.u16_bytes(&[value]);
        self.ifd0.push(RawEntry {
            tag,
            field_type: types::SHORT,
            count: 1,
            data,
        });
        self
    }

    pub fn rational(mut self, tag: u16, values: &[(u32, u32)]) -> Self {
        let entry = self.rational_entry(tag, values);
        self.ifd0.push(entry);
        self
    }

    pub fn exif_ascii(mut self, tag: u16, text: &str) -> Self {
        self.exif.push(Self::ascii_entry(tag, text));
        self
    }

    pub fn exif_undefined(mut self, tag: u16, data: &[u8]) -> Self {
        self.exif.push(RawEntry {
            tag,
            field_type: types::UNDEFINED,
            count: data.len() as u32,
            data: data.to_vec(),
        });
        self
    }

    pub fn gps_ascii(mut self, tag: u16, text: &str) -> Self {
        self.gps.push(Self::ascii_entry(tag, text));
        self
    }

    pub fn gps_rational(mut self, tag: u16, values: &[(u32, u32)]) -> Self {
        let entry = self.rational_entry(tag, values);
        self.gps.push(entry);
        self
    }

    /// Embed a thumbnail referenced from IFD1
    pub fn thumbnail(mut self, jpeg: &[u8]) -> Self {
        self.thumbnail = Some(jpeg.to_vec());
        self
    }

    /// IFD1 thumbnail tags with arbitrary (possibly broken) values
    pub fn raw_thumbnail_pointer(mut self, offset: u32, length: u32) -> Self {
        let offset = self.u32_bytes(&[offset]);
        let length = self.u32_bytes(&[length]);
        self.ifd1.push(RawEntry {
            tag: tags::JPEG_INTERCHANGE_FORMAT,
            field_type: types::LONG,
            count: 1,
            data: offset,
        });
        self.ifd1.push(RawEntry {
            tag: tags::JPEG_INTERCHANGE_FORMAT_LENGTH,
            field_type: types::LONG,
            count: 1,
            data: length,
        });
        self
    }

    fn block_size(entries: &[RawEntry]) -> usize {
        let values: usize = entries
            .iter()
            .filter(|e| e.data.len() > 4)
            .map(|e| e.data.len())
            .sum();
        2 + entries.len() * 12 + 4 + values
    }

    fn pointer(&self, tag: u16, offset: usize) -> RawEntry {
        RawEntry {
            tag,
            field_type: types::LONG,
            count: 1,
            data: self.u32_bytes(&[offset as u32]),
        }
    }

    fn write_block(&self, out: &mut Vec<u8>, entries: &[RawEntry], next: usize) {
        let mut entries = entries.to_vec();
        entries.sort_by_key(|e| e.tag);

        let mut value_offset = out.len() + 2 + entries.len() * 12 + 4;
        let mut values = Vec::new();
        self.order.write_u16(out, entries.len() as u16);
        for entry in &entries {
            self.order.write_u16(out, entry.tag);
            self.order.write_u16(out, entry.field_type);
            self.order.write_u32(out, entry.count);
            if entry.data.len() <= 4 {
                let mut inline = entry.data.clone();
                inline.resize(4, 0);
                out.extend_from_slice(&inline);
            } else {
                self.order.write_u32(out, value_offset as u32);
                value_offset += entry.data.len();
                values.extend_from_slice(&entry.data);
            }
        }
        self.order.write_u32(out, next as u32);
        out.extend_from_slice(&values);
    }

    /// The TIFF payload (what follows `Exif\0\0`)
    pub fn build(self) -> Vec<u8> {
        let has_exif = !self.exif.is_empty();
        let has_gps = !self.gps.is_empty();

        let mut ifd1 = self.ifd1.clone();
        if let Some(thumbnail) = &self.thumbnail {
            let length = self.u32_bytes(&[thumbnail.len() as u32]);
            ifd1.push(RawEntry {
                tag: tags::JPEG_INTERCHANGE_FORMAT_LENGTH,
                field_type: types::LONG,
                count: 1,
                data: length,
            });
            // offset placeholder, fixed below
            ifd1.push(self.pointer(tags::JPEG_INTERCHANGE_FORMAT, 0));
        }
        let has_ifd1 = !ifd1.is_empty();

        // pointer entries take the same space whatever their value
        let mut ifd0 = self.ifd0.clone();
        if has_exif {
            ifd0.push(self.pointer(tags::EXIF_IFD_POINTER, 0));
        }
        if has_gps {
            ifd0.push(self.pointer(tags::GPS_IFD_POINTER, 0));
        }

        let ifd0_at = 8;
        let exif_at = ifd0_at + Self::block_size(&ifd0);
        let gps_at = exif_at + if has_exif { Self::block_size(&self.exif) } else { 0 };
        let ifd1_at = gps_at + if has_gps { Self::block_size(&self.gps) } else { 0 };
        let thumbnail_at = ifd1_at + Self::block_size(&ifd1);

        for entry in ifd0.iter_mut() {
            match entry.tag {
                tags::EXIF_IFD_POINTER if has_exif => *entry = self.pointer(entry.tag, exif_at),
                tags::GPS_IFD_POINTER if has_gps => *entry = self.pointer(entry.tag, gps_at),
                _ => {}
            }
        }
        if self.thumbnail.is_some() {
            if let Some(entry) = ifd1
                .iter_mut()
                .rev()
                .find(|e| e.tag == tags::JPEG_INTERCHANGE_FORMAT)
            {
                *entry = self.pointer(tags::JPEG_INTERCHANGE_FORMAT, thumbnail_at);
            }
        }

        let mut out = self.order.marker().to_vec();
        self.order.write_u16(&mut out, 0x002A);
        self.order.write_u32(&mut out, ifd0_at as u32);

        self.write_block(&mut out, &ifd0, if has_ifd1 { ifd1_at } else { 0 });
        if has_exif {
            self.write_block(&mut out, &self.exif, 0);
        }
        if has_gps {
            self.write_block(&mut out, &self.gps, 0);
        }
        if has_ifd1 {
            self.write_block(&mut out, &ifd1, 0);
        }
        if let Some(thumbnail) = &self.thumbnail {
            out.extend_from_slice(thumbnail);
        }
        out
    }
}

/// Field type, count and value/offset field of an entry as stored
///
/// Reads the 12 raw bytes of the entry, so it shows where an out-of-line
/// value actually sits rather than what it decodes to.
pub fn raw_entry(tiff: &[u8], kind: DirectoryKind, tag: u16) -> Option<(u16, u32, u32)> {
    let (metadata, layout) = crate::tiff::reader::decode_with_layout(tiff).ok()?;
    let bytes = layout.entries.get(&(kind, tag))?.bytes;
    let order = metadata.byte_order;
    Some((
        order.read_u16(&bytes[2..4]),
        order.read_u32(&bytes[4..8]),
        order.read_u32(&bytes[8..12]),
    ))
}

/// Get path to a fixture file
///
/// Search order:
/// 1. METADATA_IO_TEST_FIXTURES env var (for extended test sets)
/// 2. Default tests/fixtures directory
pub fn fixture_path(file_name: &str) -> PathBuf {
    if let Ok(custom_dir) = std::env::var(FIXTURES_ENV) {
        let path = PathBuf::from(custom_dir).join(file_name);
        if path.exists() {
            return path;
        }
    }

    // Default to tests/fixtures (relative to project root)
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests/fixtures");
    path.push(file_name);
    path
}

/// Read a fixture into memory
pub fn fixture_bytes(name: &str) -> Result<Vec<u8>> {
    fs::read(fixture_path(name)).map_err(Error::Io)
}

fn is_jpeg(path: &std::path::Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| matches!(ext.to_ascii_lowercase().as_str(), "jpg" | "jpeg"))
        .unwrap_or(false)
}

/// List all JPEG fixtures available on disk
///
/// This will list files from `tests/fixtures/` and, if
/// METADATA_IO_TEST_FIXTURES is set, from that directory too.
pub fn list_fixtures() -> Result<Vec<String>> {
    let mut dirs = vec![PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")];
    if let Ok(custom_dir) = std::env::var(FIXTURES_ENV) {
        dirs.push(PathBuf::from(custom_dir));
    }

    let mut fixtures = Vec::new();
    for dir in dirs.into_iter().filter(|dir| dir.is_dir()) {
        for entry in fs::read_dir(dir).map_err(Error::Io)? {
            let path = entry.map_err(Error::Io)?.path();
            if !path.is_file() || !is_jpeg(&path) {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                // Only add if not already listed
                if !fixtures.iter().any(|f| f == name) {
                    fixtures.push(name.to_string());
                }
            }
        }
    }

    fixtures.sort();
    Ok(fixtures)
}
