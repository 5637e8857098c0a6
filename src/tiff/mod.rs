//! TIFF structure inside EXIF segments
//!
//! TIFF Structure:
//! - Header: byte order (II/MM), magic (0x002A), IFD0 offset
//! - IFD (Image File Directory): tag count, entries (12 bytes each), next IFD offset
//! - Entry: tag ID (2), field type (2), count (4), value or offset (4)
//!
//! All offsets are relative to the start of the TIFF header, which is the
//! first byte after the `Exif\0\0` signature.

pub mod reader;
pub mod tags;
pub mod writer;

pub use reader::decode;
pub use writer::{encode, encode_lossless};

use byteorder::{ByteOrder as _, BE, LE};

/// Signature that opens an EXIF APP1 payload
pub const EXIF_SIGNATURE: &[u8; 6] = b"Exif\0\0";

/// Maximum number of entries in an IFD (prevents DOS attacks)
pub const MAX_IFD_TAGS: u16 = 1000;

/// Largest TIFF payload that fits into one APP1 segment
///
/// The segment length field covers itself (2 bytes) and the EXIF signature
/// (6 bytes), so 65535 - 8 bytes remain.
pub const MAX_TIFF_SIZE: usize = 0xFFFF - 2 - EXIF_SIGNATURE.len();

pub(crate) const TIFF_MAGIC: u16 = 0x002A;
pub(crate) const HEADER_SIZE: usize = 8;
pub(crate) const ENTRY_SIZE: usize = 12;

/// TIFF field types
pub mod types {
    pub const BYTE: u16 = 1;
    pub const ASCII: u16 = 2;
    pub const SHORT: u16 = 3;
    pub const LONG: u16 = 4;
    pub const RATIONAL: u16 = 5;
    pub const SBYTE: u16 = 6;
    pub const UNDEFINED: u16 = 7;
    pub const SSHORT: u16 = 8;
    pub const SLONG: u16 = 9;
    pub const SRATIONAL: u16 = 10;
    pub const FLOAT: u16 = 11;
    pub const DOUBLE: u16 = 12;
    /// Offset of a sub-IFD (TIFF 6.0 supplement)
    pub const IFD: u16 = 13;
    /// BigTIFF 64-bit types
    pub const LONG8: u16 = 16;
    pub const SLONG8: u16 = 17;
    pub const IFD8: u16 = 18;

    /// Size in bytes of one value of a field type, `None` if unknown
    pub fn size_of(field_type: u16) -> Option<usize> {
        match field_type {
            BYTE | ASCII | SBYTE | UNDEFINED => Some(1),
            SHORT | SSHORT => Some(2),
            LONG | SLONG | FLOAT | IFD => Some(4),
            RATIONAL | SRATIONAL | DOUBLE | LONG8 | SLONG8 | IFD8 => Some(8),
            _ => None,
        }
    }

    /// Values of this type are offsets into the payload
    pub fn is_offset(field_type: u16) -> bool {
        matches!(field_type, IFD | IFD8)
    }
}

/// Byte order of a TIFF structure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ByteOrder {
    /// "II", Intel
    LittleEndian,
    /// "MM", Motorola; what most cameras write
    #[default]
    BigEndian,
}

impl ByteOrder {
    /// Detect the byte order from the first two header bytes
    pub fn from_marker(marker: &[u8]) -> Option<Self> {
        match marker {
            b"II" => Some(Self::LittleEndian),
            b"MM" => Some(Self::BigEndian),
            _ => None,
        }
    }

    /// The two-byte header marker
    pub fn marker(&self) -> &'static [u8; 2] {
        match self {
            Self::LittleEndian => b"II",
            Self::BigEndian => b"MM",
        }
    }

    pub(crate) fn read_u16(&self, data: &[u8]) -> u16 {
        match self {
            Self::LittleEndian => LE::read_u16(data),
            Self::BigEndian => BE::read_u16(data),
        }
    }

    pub(crate) fn read_u32(&self, data: &[u8]) -> u32 {
        match self {
            Self::LittleEndian => LE::read_u32(data),
            Self::BigEndian => BE::read_u32(data),
        }
    }

    pub(crate) fn read_u64(&self, data: &[u8]) -> u64 {
        match self {
            Self::LittleEndian => LE::read_u64(data),
            Self::BigEndian => BE::read_u64(data),
        }
    }

    pub(crate) fn write_u16(&self, out: &mut Vec<u8>, value: u16) {
        let mut buf = [0u8; 2];
        match self {
            Self::LittleEndian => LE::write_u16(&mut buf, value),
            Self::BigEndian => BE::write_u16(&mut buf, value),
        }
        out.extend_from_slice(&buf);
    }

    pub(crate) fn write_u32(&self, out: &mut Vec<u8>, value: u32) {
        let mut buf = [0u8; 4];
        match self {
            Self::LittleEndian => LE::write_u32(&mut buf, value),
            Self::BigEndian => BE::write_u32(&mut buf, value),
        }
        out.extend_from_slice(&buf);
    }

    pub(crate) fn write_u64(&self, out: &mut Vec<u8>, value: u64) {
        let mut buf = [0u8; 8];
        match self {
            Self::LittleEndian => LE::write_u64(&mut buf, value),
            Self::BigEndian => BE::write_u64(&mut buf, value),
        }
        out.extend_from_slice(&buf);
    }

    /// Overwrite a u32 at `position` in an already written buffer
    pub(crate) fn patch_u32(&self, out: &mut [u8], position: usize, value: u32) {
        let slot = &mut out[position..position + 4];
        match self {
            Self::LittleEndian => LE::write_u32(slot, value),
            Self::BigEndian => BE::write_u32(slot, value),
        }
    }
}

impl std::fmt::Display for ByteOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LittleEndian => write!(f, "little-endian (II)"),
            Self::BigEndian => write!(f, "big-endian (MM)"),
        }
    }
}
