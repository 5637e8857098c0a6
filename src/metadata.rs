//! Decoded EXIF metadata
//!
//! [`ImageMetadata`] mirrors the TIFF directory tree of an EXIF segment:
//! a byte order, an ordered list of [`Directory`] values and the embedded
//! thumbnail. Offsets are not part of the model; they are recomputed when
//! the tree is encoded again, so any value here can change size freely.
//!
//! Pointer tags (EXIF/GPS/Interop sub-IFD offsets and the thumbnail
//! offset/length in IFD1) never appear as entries. The tree shape replaces
//! them.

use crate::{
    exif_date,
    model::{GpsCoordinates, Orientation, PhotoRating},
    tiff::{tags, types, ByteOrder},
};
use chrono::{FixedOffset, NaiveDateTime};
use std::collections::BTreeMap;

/// Unsigned fraction (TIFF RATIONAL)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rational {
    pub numerator: u32,
    pub denominator: u32,
}

impl Rational {
    pub fn new(numerator: u32, denominator: u32) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    /// Value as float, `None` for a zero denominator
    pub fn to_f64(&self) -> Option<f64> {
        (self.denominator != 0).then(|| f64::from(self.numerator) / f64::from(self.denominator))
    }
}

impl std::fmt::Display for Rational {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

/// Signed fraction (TIFF SRATIONAL)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SRational {
    pub numerator: i32,
    pub denominator: i32,
}

impl SRational {
    pub fn new(numerator: i32, denominator: i32) -> Self {
        Self {
            numerator,
            denominator,
        }
    }
}

impl std::fmt::Display for SRational {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

/// Typed value of a directory entry
///
/// Equality compares floating point values bit for bit, so a stored NaN
/// equals itself.
#[derive(Debug, Clone)]
pub enum TagValue {
    Byte(Vec<u8>),
    /// Text without the trailing NUL
    Ascii(String),
    Short(Vec<u16>),
    Long(Vec<u32>),
    Rational(Vec<Rational>),
    SByte(Vec<i8>),
    Undefined(Vec<u8>),
    SShort(Vec<i16>),
    SLong(Vec<i32>),
    SRational(Vec<SRational>),
    Float(Vec<f32>),
    Double(Vec<f64>),
    /// An ASCII date tag holding a well-formed `YYYY:MM:DD HH:MM:SS`
    DateTime(NaiveDateTime),
    /// Anything that cannot be typed safely, kept as stored
    Opaque {
        field_type: u16,
        count: u32,
        /// Raw value bytes in the directory's byte order
        data: Vec<u8>,
    },
}

impl PartialEq for TagValue {
    fn eq(&self, other: &Self) -> bool {
        fn same_bits<T: Copy, B: PartialEq>(a: &[T], b: &[T], bits: impl Fn(T) -> B) -> bool {
            a.len() == b.len() && a.iter().zip(b).all(|(&x, &y)| bits(x) == bits(y))
        }

        match (self, other) {
            (Self::Byte(a), Self::Byte(b)) => a == b,
            (Self::Ascii(a), Self::Ascii(b)) => a == b,
            (Self::Short(a), Self::Short(b)) => a == b,
            (Self::Long(a), Self::Long(b)) => a == b,
            (Self::Rational(a), Self::Rational(b)) => a == b,
            (Self::SByte(a), Self::SByte(b)) => a == b,
            (Self::Undefined(a), Self::Undefined(b)) => a == b,
            (Self::SShort(a), Self::SShort(b)) => a == b,
            (Self::SLong(a), Self::SLong(b)) => a == b,
            (Self::SRational(a), Self::SRational(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => same_bits(a, b, f32::to_bits),
            (Self::Double(a), Self::Double(b)) => same_bits(a, b, f64::to_bits),
            (Self::DateTime(a), Self::DateTime(b)) => a == b,
            (
                Self::Opaque {
                    field_type: a_type,
                    count: a_count,
                    data: a_data,
                },
                Self::Opaque {
                    field_type: b_type,
                    count: b_count,
                    data: b_data,
                },
            ) => a_type == b_type && a_count == b_count && a_data == b_data,
            _ => false,
        }
    }
}

impl Eq for TagValue {}

impl TagValue {
    /// TIFF field type this value is written as
    pub fn field_type(&self) -> u16 {
        match self {
            Self::Byte(_) => types::BYTE,
            Self::Ascii(_) | Self::DateTime(_) => types::ASCII,
            Self::Short(_) => types::SHORT,
            Self::Long(_) => types::LONG,
            Self::Rational(_) => types::RATIONAL,
            Self::SByte(_) => types::SBYTE,
            Self::Undefined(_) => types::UNDEFINED,
            Self::SShort(_) => types::SSHORT,
            Self::SLong(_) => types::SLONG,
            Self::SRational(_) => types::SRATIONAL,
            Self::Float(_) => types::FLOAT,
            Self::Double(_) => types::DOUBLE,
            Self::Opaque { field_type, .. } => *field_type,
        }
    }

    /// Number of values, as written in the entry's count field
    pub fn count(&self) -> u32 {
        let count = match self {
            Self::Byte(v) | Self::Undefined(v) => v.len(),
            // NUL terminator
            Self::Ascii(s) => s.len() + 1,
            Self::DateTime(_) => 20,
            Self::Short(v) => v.len(),
            Self::Long(v) => v.len(),
            Self::Rational(v) => v.len(),
            Self::SByte(v) => v.len(),
            Self::SShort(v) => v.len(),
            Self::SLong(v) => v.len(),
            Self::SRational(v) => v.len(),
            Self::Float(v) => v.len(),
            Self::Double(v) => v.len(),
            Self::Opaque { count, .. } => return *count,
        };
        count as u32
    }

    /// Text of an ASCII value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Ascii(s) => Some(s),
            _ => None,
        }
    }

    /// First value of an unsigned integer field
    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Self::Byte(v) => v.first().map(|&b| u32::from(b)),
            Self::Short(v) => v.first().map(|&s| u32::from(s)),
            Self::Long(v) => v.first().copied(),
            _ => None,
        }
    }

    /// Wall-clock time of a date value, lenient about vendor variants
    pub fn as_date_time(&self) -> Option<NaiveDateTime> {
        match self {
            Self::DateTime(date) => Some(*date),
            Self::Ascii(s) => exif_date::parse_exif_date(s),
            _ => None,
        }
    }
}

fn write_list<T: std::fmt::Display>(f: &mut std::fmt::Formatter<'_>, values: &[T]) -> std::fmt::Result {
    match values {
        [single] => write!(f, "{}", single),
        _ => {
            write!(f, "[")?;
            for (i, value) in values.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", value)?;
            }
            write!(f, "]")
        }
    }
}

fn write_bytes(f: &mut std::fmt::Formatter<'_>, bytes: &[u8]) -> std::fmt::Result {
    if bytes.len() > 16 {
        return write!(f, "<{} bytes>", bytes.len());
    }
    for (i, byte) in bytes.iter().enumerate() {
        if i > 0 {
            write!(f, " ")?;
        }
        write!(f, "{:02X}", byte)?;
    }
    Ok(())
}

impl std::fmt::Display for TagValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Byte(v) => write_list(f, v),
            Self::Ascii(s) => write!(f, "'{}'", s),
            Self::Short(v) => write_list(f, v),
            Self::Long(v) => write_list(f, v),
            Self::Rational(v) => write_list(f, v),
            Self::SByte(v) => write_list(f, v),
            Self::Undefined(v) => write_bytes(f, v),
            Self::SShort(v) => write_list(f, v),
            Self::SLong(v) => write_list(f, v),
            Self::SRational(v) => write_list(f, v),
            Self::Float(v) => write_list(f, v),
            Self::Double(v) => write_list(f, v),
            Self::DateTime(date) => write!(f, "'{}'", exif_date::format_exif_date(date)),
            Self::Opaque {
                field_type,
                count,
                data,
            } => {
                write!(f, "<type {} x{}> ", field_type, count)?;
                write_bytes(f, data)
            }
        }
    }
}

/// A tag and its value
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataEntry {
    pub tag: u16,
    pub value: TagValue,
}

/// Which directory of the TIFF tree a [`Directory`] is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DirectoryKind {
    /// Main image (first IFD)
    Ifd0,
    /// EXIF sub-IFD
    Exif,
    /// GPS sub-IFD
    Gps,
    /// Interoperability sub-IFD (child of the EXIF IFD)
    Interop,
    /// Thumbnail (second IFD)
    Ifd1,
    /// Further IFDs in the chain, numbered from 2
    Ifd(u16),
}

impl DirectoryKind {
    /// Kind of the IFD at `index` in the main chain
    pub fn chained(index: u16) -> Self {
        match index {
            0 => Self::Ifd0,
            1 => Self::Ifd1,
            n => Self::Ifd(n),
        }
    }

    /// Whether this IFD is linked through the next-IFD offsets
    pub fn is_chained(&self) -> bool {
        matches!(self, Self::Ifd0 | Self::Ifd1 | Self::Ifd(_))
    }
}

impl std::fmt::Display for DirectoryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ifd0 => write!(f, "IFD0"),
            Self::Exif => write!(f, "ExifIFD"),
            Self::Gps => write!(f, "GPS"),
            Self::Interop => write!(f, "Interop"),
            Self::Ifd1 => write!(f, "IFD1"),
            Self::Ifd(n) => write!(f, "IFD{}", n),
        }
    }
}

/// One IFD: entries keyed by tag, unique and in ascending order
#[derive(Debug, Clone, PartialEq)]
pub struct Directory {
    pub kind: DirectoryKind,
    entries: BTreeMap<u16, MetadataEntry>,
}

impl Directory {
    pub fn new(kind: DirectoryKind) -> Self {
        Self {
            kind,
            entries: BTreeMap::new(),
        }
    }

    pub fn get(&self, tag: u16) -> Option<&TagValue> {
        self.entries.get(&tag).map(|entry| &entry.value)
    }

    /// Set a tag, returning the previous value
    pub fn insert(&mut self, tag: u16, value: TagValue) -> Option<TagValue> {
        self.entries
            .insert(tag, MetadataEntry { tag, value })
            .map(|old| old.value)
    }

    pub fn remove(&mut self, tag: u16) -> Option<TagValue> {
        self.entries.remove(&tag).map(|entry| entry.value)
    }

    /// Entries in ascending tag order
    pub fn entries(&self) -> impl Iterator<Item = &MetadataEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The decoded metadata of one image
///
/// # Example
///
/// ```
/// use metadata_io::{DirectoryKind, ImageMetadata, Orientation, TagValue};
///
/// let mut metadata = ImageMetadata::default();
/// metadata
///     .directory_or_insert(DirectoryKind::Ifd0)
///     .insert(0x0112, TagValue::Short(vec![6]));
/// assert_eq!(metadata.orientation(), Some(Orientation::RotateRight));
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ImageMetadata {
    pub byte_order: ByteOrder,
    directories: Vec<Directory>,
    /// JPEG thumbnail referenced from IFD1
    pub thumbnail: Option<Vec<u8>>,
}

impl ImageMetadata {
    pub fn new(byte_order: ByteOrder) -> Self {
        Self {
            byte_order,
            directories: Vec::new(),
            thumbnail: None,
        }
    }

    /// No entries in any directory and no thumbnail
    pub fn is_empty(&self) -> bool {
        self.thumbnail.is_none() && self.directories.iter().all(Directory::is_empty)
    }

    /// Directories in canonical order (IFD0, EXIF, GPS, Interop, IFD1, ...)
    pub fn directories(&self) -> &[Directory] {
        &self.directories
    }

    pub fn directory(&self, kind: DirectoryKind) -> Option<&Directory> {
        self.directories.iter().find(|dir| dir.kind == kind)
    }

    pub fn directory_mut(&mut self, kind: DirectoryKind) -> Option<&mut Directory> {
        self.directories.iter_mut().find(|dir| dir.kind == kind)
    }

    /// Get a directory, creating an empty one at its canonical position
    pub fn directory_or_insert(&mut self, kind: DirectoryKind) -> &mut Directory {
        let index = match self.directories.binary_search_by(|dir| dir.kind.cmp(&kind)) {
            Ok(index) => index,
            Err(index) => {
                self.directories.insert(index, Directory::new(kind));
                index
            }
        };
        &mut self.directories[index]
    }

    /// Add a fully decoded directory, replacing one of the same kind
    pub(crate) fn push_directory(&mut self, directory: Directory) {
        match self
            .directories
            .binary_search_by(|dir| dir.kind.cmp(&directory.kind))
        {
            Ok(index) => self.directories[index] = directory,
            Err(index) => self.directories.insert(index, directory),
        }
    }

    /// Value of `tag` in the directory `kind`
    pub fn get(&self, kind: DirectoryKind, tag: u16) -> Option<&TagValue> {
        self.directory(kind).and_then(|dir| dir.get(tag))
    }

    pub fn camera_make(&self) -> Option<&str> {
        self.get(DirectoryKind::Ifd0, tags::MAKE)?.as_str()
    }

    pub fn camera_model(&self) -> Option<&str> {
        self.get(DirectoryKind::Ifd0, tags::MODEL)?.as_str()
    }

    pub fn orientation(&self) -> Option<Orientation> {
        let value = self.get(DirectoryKind::Ifd0, tags::ORIENTATION)?.as_u32()?;
        Orientation::from_value(u16::try_from(value).ok()?)
    }

    /// Star rating from the Windows rating tags
    pub fn rating(&self) -> Option<PhotoRating> {
        if let Some(value) = self.get(DirectoryKind::Ifd0, tags::RATING) {
            let stars = match value {
                TagValue::Short(v) => i32::from(*v.first()?),
                TagValue::SShort(v) => i32::from(*v.first()?),
                TagValue::Long(v) => i32::try_from(*v.first()?).ok()?,
                _ => return None,
            };
            return PhotoRating::from_value(stars);
        }
        let percent = self
            .get(DirectoryKind::Ifd0, tags::RATING_PERCENT)?
            .as_u32()?;
        Some(PhotoRating::from_percent(u16::try_from(percent).ok()?))
    }

    /// Local wall-clock capture time with milliseconds and stored offset
    ///
    /// Looks at `DateTimeOriginal`, then `DateTimeDigitized`, then the IFD0
    /// `DateTime`; placeholder dates count as absent.
    pub fn taken_date_local(&self) -> Option<(NaiveDateTime, u32, Option<FixedOffset>)> {
        const SOURCES: [(DirectoryKind, u16, u16, u16); 3] = [
            (
                DirectoryKind::Exif,
                tags::DATE_TIME_ORIGINAL,
                tags::SUB_SEC_TIME_ORIGINAL,
                tags::OFFSET_TIME_ORIGINAL,
            ),
            (
                DirectoryKind::Exif,
                tags::DATE_TIME_DIGITIZED,
                tags::SUB_SEC_TIME_DIGITIZED,
                tags::OFFSET_TIME_DIGITIZED,
            ),
            (
                DirectoryKind::Ifd0,
                tags::DATE_TIME,
                tags::SUB_SEC_TIME,
                tags::OFFSET_TIME,
            ),
        ];

        SOURCES.iter().find_map(|&(kind, date_tag, sub_sec_tag, offset_tag)| {
            let date = self.get(kind, date_tag)?.as_date_time()?;
            // sub-second and offset companions always live in the EXIF IFD
            let millis = self
                .get(DirectoryKind::Exif, sub_sec_tag)
                .and_then(TagValue::as_str)
                .and_then(exif_date::parse_sub_sec)
                .unwrap_or(0);
            let offset = self
                .get(DirectoryKind::Exif, offset_tag)
                .and_then(TagValue::as_str)
                .and_then(exif_date::parse_offset);
            Some((date, millis, offset))
        })
    }

    /// Capture time as epoch milliseconds
    ///
    /// `default_offset` is assumed when no `OffsetTime*` tag is stored.
    pub fn taken_date(&self, default_offset: &FixedOffset) -> Option<i64> {
        let (date, millis, offset) = self.taken_date_local()?;
        exif_date::to_epoch_millis(&date, millis, &offset.unwrap_or(*default_offset))
    }

    /// Decimal coordinates from the GPS IFD
    pub fn gps_coordinates(&self) -> Option<GpsCoordinates> {
        let gps = self.directory(DirectoryKind::Gps)?;

        let latitude_ref = gps.get(tags::GPS_LATITUDE_REF)?.as_str()?;
        let longitude_ref = gps.get(tags::GPS_LONGITUDE_REF)?.as_str()?;

        // some apps blank the refs instead of removing the GPS tags
        if latitude_ref.is_empty() || longitude_ref.is_empty() {
            return None;
        }

        let latitude = degrees(gps.get(tags::GPS_LATITUDE)?)?;
        let longitude = degrees(gps.get(tags::GPS_LONGITUDE)?)?;

        let latitude = match latitude_ref {
            "N" => latitude,
            "S" => -latitude,
            _ => return None,
        };
        let longitude = match longitude_ref {
            "E" => longitude,
            "W" => -longitude,
            _ => return None,
        };

        Some(GpsCoordinates::new(latitude, longitude))
    }
}

/// Degrees/minutes/seconds rationals to decimal degrees
fn degrees(value: &TagValue) -> Option<f64> {
    let TagValue::Rational(parts) = value else {
        return None;
    };
    let [d, m, s] = parts.as_slice() else {
        return None;
    };
    Some(d.to_f64()? + m.to_f64()? / 60.0 + s.to_f64()? / 3600.0)
}

impl std::fmt::Display for ImageMetadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return write!(f, "(no metadata)");
        }

        for directory in &self.directories {
            writeln!(f, "---- {} ----", directory.kind)?;
            for entry in directory.entries() {
                let name = tags::tag_name(directory.kind, entry.tag).unwrap_or("Unknown");
                writeln!(f, "{} (0x{:04X}) = {}", name, entry.tag, entry.value)?;
            }
        }

        if let Some(thumbnail) = &self.thumbnail {
            writeln!(f, "---- Thumbnail ----")?;
            writeln!(f, "JPEG, {} bytes", thumbnail.len())?;
        }
        Ok(())
    }
}
