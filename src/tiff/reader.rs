//! TIFF decoding: payload bytes to [`ImageMetadata`]

use super::{tags, types, ByteOrder, ENTRY_SIZE, HEADER_SIZE, MAX_IFD_TAGS, TIFF_MAGIC};
use crate::{
    error::{Error, Result},
    exif_date,
    metadata::{Directory, DirectoryKind, ImageMetadata, Rational, SRational, TagValue},
};
use chrono::NaiveDateTime;
use std::collections::{HashMap, HashSet};
use std::ops::Range;

/// Decode a TIFF structure
///
/// `data` starts at the TIFF header, i.e. right after `Exif\0\0`. Every
/// offset is checked against `data`; anything pointing outside of it, a
/// directory visited twice or a directory with more than
/// [`MAX_IFD_TAGS`] entries fails with `UnsupportedMetadataFormat`.
///
/// An IFD1 thumbnail whose bytes cannot be cut out is not extracted; its
/// offset and length tags stay in IFD1 as ordinary entries instead.
pub fn decode(data: &[u8]) -> Result<ImageMetadata> {
    decode_with_layout(data).map(|(metadata, _)| metadata)
}

/// Where the parts of a decoded payload live
#[derive(Debug, Default)]
pub(crate) struct Layout {
    /// Directory tables, from the entry count to the next-IFD offset
    pub tables: Vec<Range<usize>>,
    /// Entries as stored, by directory and tag
    pub entries: HashMap<(DirectoryKind, u16), RawEntry>,
    pub thumbnail: Option<Range<usize>>,
}

#[derive(Debug, Clone)]
pub(crate) struct RawEntry {
    pub bytes: [u8; ENTRY_SIZE],
    /// Out-of-line value; `None` when inline or of unknown size
    pub value: Option<Range<usize>>,
}

/// Decode and report where every directory, entry and the thumbnail sit
pub(crate) fn decode_with_layout(data: &[u8]) -> Result<(ImageMetadata, Layout)> {
    if data.len() < HEADER_SIZE {
        return Err(Error::unsupported_format(format!(
            "TIFF header needs {} bytes, got {}",
            HEADER_SIZE,
            data.len()
        )));
    }

    // Byte order: "II" (0x4949) = little endian, "MM" (0x4D4D) = big endian
    let byte_order = ByteOrder::from_marker(&data[0..2])
        .ok_or_else(|| Error::unsupported_format("missing TIFF byte order marker"))?;

    let magic = byte_order.read_u16(&data[2..4]);
    if magic != TIFF_MAGIC {
        return Err(Error::unsupported_format(format!(
            "bad TIFF magic 0x{:04X}",
            magic
        )));
    }

    let mut reader = IfdReader {
        data,
        byte_order,
        visited: HashSet::new(),
        layout: Layout::default(),
    };
    let mut metadata = ImageMetadata::new(byte_order);

    let mut next = byte_order.read_u32(&data[4..8]);
    if (next as usize) < HEADER_SIZE {
        return Err(Error::unsupported_format(format!(
            "IFD0 offset {} points into the TIFF header",
            next
        )));
    }

    let mut index: u16 = 0;
    while next != 0 {
        let kind = DirectoryKind::chained(index);
        let mut raw = reader.read_ifd(next, kind)?;

        for (tag, target) in &raw.pointers {
            match (kind, *tag) {
                (DirectoryKind::Ifd0, tags::EXIF_IFD_POINTER) => {
                    reader.read_sub_ifd(&mut metadata, DirectoryKind::Exif, *target)?
                }
                (DirectoryKind::Ifd0, tags::GPS_IFD_POINTER) => {
                    reader.read_sub_ifd(&mut metadata, DirectoryKind::Gps, *target)?
                }
                _ => {}
            }
        }

        if kind == DirectoryKind::Ifd1 {
            match reader.thumbnail(&raw.pointers) {
                Some((thumbnail, range)) => {
                    metadata.thumbnail = Some(thumbnail);
                    reader.layout.thumbnail = Some(range);
                }
                None => {
                    for (tag, value) in raw.structural_values.drain(..) {
                        raw.directory.insert(tag, value);
                    }
                }
            }
        }

        metadata.push_directory(raw.directory);
        next = raw.next;
        index = index.saturating_add(1);
    }

    Ok((metadata, reader.layout))
}

/// Position of the inline value of a single-valued IFD0 entry
///
/// Returns the offset within `data` of the entry's value field when IFD0
/// holds `tag` with `field_type` and a count of one, so the value can be
/// overwritten without re-encoding. Returns `None` for anything else.
pub(crate) fn find_ifd0_value(data: &[u8], tag: u16, field_type: u16) -> Option<usize> {
    let byte_order = ByteOrder::from_marker(data.get(0..2)?)?;
    let ifd0 = byte_order.read_u32(data.get(4..8)?) as usize;
    if ifd0 < HEADER_SIZE {
        return None;
    }

    let tag_count = byte_order.read_u16(data.get(ifd0..ifd0 + 2)?) as usize;
    let entries_start = ifd0 + 2;
    let entries = data.get(entries_start..entries_start + tag_count * ENTRY_SIZE)?;

    entries
        .chunks_exact(ENTRY_SIZE)
        .position(|entry| {
            byte_order.read_u16(&entry[0..2]) == tag
                && byte_order.read_u16(&entry[2..4]) == field_type
                && byte_order.read_u32(&entry[4..8]) == 1
        })
        .map(|index| entries_start + index * ENTRY_SIZE + 8)
}

/// An IFD as read, before pointers are followed
struct RawIfd {
    directory: Directory,
    /// Structural tags pulled out of the entries: (tag, offset or length)
    pointers: Vec<(u16, u32)>,
    /// The same entries as decoded, for when they cannot be followed
    structural_values: Vec<(u16, TagValue)>,
    next: u32,
}

struct IfdReader<'a> {
    data: &'a [u8],
    byte_order: ByteOrder,
    visited: HashSet<u32>,
    layout: Layout,
}

/// Tags that describe the tree shape in a given directory
fn structural_tags(kind: DirectoryKind) -> &'static [u16] {
    match kind {
        DirectoryKind::Ifd0 => &[tags::EXIF_IFD_POINTER, tags::GPS_IFD_POINTER],
        DirectoryKind::Exif => &[tags::INTEROP_IFD_POINTER],
        DirectoryKind::Ifd1 => &[
            tags::JPEG_INTERCHANGE_FORMAT,
            tags::JPEG_INTERCHANGE_FORMAT_LENGTH,
        ],
        _ => &[],
    }
}

impl<'a> IfdReader<'a> {
    fn slice(&self, offset: u64, len: u64, what: &str) -> Result<&'a [u8]> {
        let end = offset.checked_add(len).filter(|&end| end <= self.data.len() as u64);
        match end {
            Some(end) => Ok(&self.data[offset as usize..end as usize]),
            None => Err(Error::unsupported_format(format!(
                "{} at offset {} ({} bytes) lies outside the TIFF data ({} bytes)",
                what,
                offset,
                len,
                self.data.len()
            ))),
        }
    }

    fn read_sub_ifd(
        &mut self,
        metadata: &mut ImageMetadata,
        kind: DirectoryKind,
        offset: u32,
    ) -> Result<()> {
        if offset == 0 {
            log::debug!("{} pointer is zero, skipping", kind);
            return Ok(());
        }

        let raw = self.read_ifd(offset, kind)?;
        for (tag, target) in &raw.pointers {
            if kind == DirectoryKind::Exif && *tag == tags::INTEROP_IFD_POINTER {
                self.read_sub_ifd(metadata, DirectoryKind::Interop, *target)?;
            }
        }
        metadata.push_directory(raw.directory);
        Ok(())
    }

    fn read_ifd(&mut self, offset: u32, kind: DirectoryKind) -> Result<RawIfd> {
        if !self.visited.insert(offset) {
            return Err(Error::unsupported_format(format!(
                "{} at offset {} was already visited (IFD loop)",
                kind, offset
            )));
        }

        let count_bytes = self.slice(u64::from(offset), 2, "IFD entry count")?;
        let tag_count = self.byte_order.read_u16(count_bytes);

        // Validate tag count to prevent DOS attacks
        if tag_count > MAX_IFD_TAGS {
            return Err(Error::unsupported_format(format!(
                "{} declares {} entries (max {})",
                kind, tag_count, MAX_IFD_TAGS
            )));
        }

        let entries_start = u64::from(offset) + 2;
        let entries_len = u64::from(tag_count) * ENTRY_SIZE as u64;
        let entries = self.slice(entries_start, entries_len, "IFD entries")?;

        let structural = structural_tags(kind);
        let mut directory = Directory::new(kind);
        let mut pointers = Vec::new();
        let mut structural_values = Vec::new();

        for entry in entries.chunks_exact(ENTRY_SIZE) {
            let tag = self.byte_order.read_u16(&entry[0..2]);
            let (value, value_range) = self.read_value(tag, entry)?;

            let mut bytes = [0u8; ENTRY_SIZE];
            bytes.copy_from_slice(entry);
            self.layout.entries.insert(
                (kind, tag),
                RawEntry {
                    bytes,
                    value: value_range,
                },
            );

            if structural.contains(&tag) && value.count() == 1 {
                if let Some(target) = value.as_u32() {
                    pointers.push((tag, target));
                    structural_values.push((tag, value));
                    continue;
                }
            }

            if directory.insert(tag, value).is_some() {
                log::debug!("{} holds tag 0x{:04X} twice, keeping the last", kind, tag);
            }
        }

        // a few writers end the data right after the last entry
        let entries_end = (entries_start + entries_len) as usize;
        let (next, table_end) = match self.slice(entries_start + entries_len, 4, "next IFD offset") {
            Ok(bytes) => (self.byte_order.read_u32(bytes), entries_end + 4),
            Err(_) => {
                log::debug!("{} has no next-IFD offset, ending chain", kind);
                (0, entries_end)
            }
        };
        self.layout.tables.push(offset as usize..table_end);

        Ok(RawIfd {
            directory,
            pointers,
            structural_values,
            next,
        })
    }

    /// Decode one entry's value, with the range it occupies when stored
    /// out of line
    fn read_value(&self, tag: u16, entry: &[u8]) -> Result<(TagValue, Option<Range<usize>>)> {
        let order = self.byte_order;
        let field_type = order.read_u16(&entry[2..4]);
        let count = order.read_u32(&entry[4..8]);
        let value_field = &entry[8..12];

        let Some(size) = types::size_of(field_type) else {
            // unknown type: the length is unknown too, keep the raw field
            let value = TagValue::Opaque {
                field_type,
                count,
                data: value_field.to_vec(),
            };
            return Ok((value, None));
        };

        let total = u64::from(count) * size as u64;
        let (bytes, range) = if total <= 4 {
            (&value_field[..total as usize], None)
        } else {
            let offset = order.read_u32(value_field);
            let bytes = self.slice(u64::from(offset), total, "tag value")?;
            let start = offset as usize;
            (bytes, Some(start..start + bytes.len()))
        };

        let value = match field_type {
            types::BYTE => TagValue::Byte(bytes.to_vec()),
            types::ASCII => ascii_value(tag, count, bytes),
            types::SHORT => TagValue::Short(bytes.chunks_exact(2).map(|c| order.read_u16(c)).collect()),
            types::LONG => TagValue::Long(bytes.chunks_exact(4).map(|c| order.read_u32(c)).collect()),
            types::RATIONAL => TagValue::Rational(
                bytes
                    .chunks_exact(8)
                    .map(|c| Rational::new(order.read_u32(&c[0..4]), order.read_u32(&c[4..8])))
                    .collect(),
            ),
            types::SBYTE => TagValue::SByte(bytes.iter().map(|&b| b as i8).collect()),
            types::UNDEFINED => TagValue::Undefined(bytes.to_vec()),
            types::SSHORT => {
                TagValue::SShort(bytes.chunks_exact(2).map(|c| order.read_u16(c) as i16).collect())
            }
            types::SLONG => {
                TagValue::SLong(bytes.chunks_exact(4).map(|c| order.read_u32(c) as i32).collect())
            }
            types::SRATIONAL => TagValue::SRational(
                bytes
                    .chunks_exact(8)
                    .map(|c| {
                        SRational::new(order.read_u32(&c[0..4]) as i32, order.read_u32(&c[4..8]) as i32)
                    })
                    .collect(),
            ),
            types::FLOAT => TagValue::Float(
                bytes
                    .chunks_exact(4)
                    .map(|c| f32::from_bits(order.read_u32(c)))
                    .collect(),
            ),
            types::DOUBLE => TagValue::Double(
                bytes
                    .chunks_exact(8)
                    .map(|c| f64::from_bits(order.read_u64(c)))
                    .collect(),
            ),
            // sized but untyped (IFD, BigTIFF): the full value bytes
            _ => TagValue::Opaque {
                field_type,
                count,
                data: bytes.to_vec(),
            },
        };
        Ok((value, range))
    }

    /// Cut the IFD1 thumbnail out of the payload
    fn thumbnail(&self, pointers: &[(u16, u32)]) -> Option<(Vec<u8>, Range<usize>)> {
        let find = |wanted: u16| {
            pointers
                .iter()
                .find(|(tag, _)| *tag == wanted)
                .map(|(_, value)| *value)
        };
        let offset = find(tags::JPEG_INTERCHANGE_FORMAT)?;
        let Some(length) = find(tags::JPEG_INTERCHANGE_FORMAT_LENGTH) else {
            log::warn!("Thumbnail at offset {} has no length, keeping the tag as is", offset);
            return None;
        };

        match self.slice(u64::from(offset), u64::from(length), "thumbnail") {
            Ok(bytes) => {
                let start = offset as usize;
                Some((bytes.to_vec(), start..start + bytes.len()))
            }
            Err(e) => {
                log::warn!("Not extracting thumbnail, keeping its tags as is: {}", e);
                None
            }
        }
    }
}

/// Type an ASCII field
///
/// Only clean text (valid UTF-8, exactly one NUL at the end) becomes
/// `Ascii`; a date tag whose text is a canonical EXIF date becomes
/// `DateTime`. Everything else stays raw so it is written back unchanged.
fn ascii_value(tag: u16, count: u32, bytes: &[u8]) -> TagValue {
    let opaque = || TagValue::Opaque {
        field_type: types::ASCII,
        count,
        data: bytes.to_vec(),
    };

    let Some((&0, body)) = bytes.split_last() else {
        return opaque();
    };
    if body.contains(&0) {
        return opaque();
    }
    let Ok(text) = std::str::from_utf8(body) else {
        return opaque();
    };

    if tags::is_date_tag(tag) {
        if let Ok(date) = NaiveDateTime::parse_from_str(text, exif_date::EXIF_DATE_FORMAT) {
            if exif_date::format_exif_date(&date) == text {
                return TagValue::DateTime(date);
            }
        }
    }
    TagValue::Ascii(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TiffBuilder;

    #[test]
    fn test_rejects_bad_header() {
        assert!(matches!(
            decode(b"XX\x00\x2A\x00\x00\x00\x08"),
            Err(Error::UnsupportedMetadataFormat(_))
        ));
        assert!(matches!(
            decode(b"MM\x00\x2B\x00\x00\x00\x08"),
            Err(Error::UnsupportedMetadataFormat(_))
        ));
        assert!(matches!(decode(b"MM"), Err(Error::UnsupportedMetadataFormat(_))));
    }

    #[test]
    fn test_reads_ifd0_and_exif() {
        for order in [ByteOrder::BigEndian, ByteOrder::LittleEndian] {
            let data = TiffBuilder::new(order)
                .ascii(tags::MAKE, "Canon")
                .short(tags::ORIENTATION, 6)
                .exif_ascii(tags::DATE_TIME_ORIGINAL, "2023:05:12 18:04:00")
                .build();

            let metadata = decode(&data).unwrap();
            assert_eq!(metadata.byte_order, order);
            assert_eq!(metadata.camera_make(), Some("Canon"));
            assert_eq!(metadata.orientation().map(|o| o.value()), Some(6));
            assert!(matches!(
                metadata.get(DirectoryKind::Exif, tags::DATE_TIME_ORIGINAL),
                Some(TagValue::DateTime(_))
            ));
            // pointer tags are structure, not entries
            assert!(metadata
                .get(DirectoryKind::Ifd0, tags::EXIF_IFD_POINTER)
                .is_none());
        }
    }

    #[test]
    fn test_ifd_loop_is_rejected() {
        // IFD0 at 8 with zero entries whose next pointer points back to 8
        let data = b"MM\x00\x2A\x00\x00\x00\x08\x00\x00\x00\x00\x00\x08";
        let err = decode(data).unwrap_err();
        assert!(matches!(err, Error::UnsupportedMetadataFormat(ref m) if m.contains("loop")));
    }

    #[test]
    fn test_value_outside_payload() {
        // one ASCII entry of 100 bytes at offset 0x1000
        let mut data = b"II\x2A\x00\x08\x00\x00\x00\x01\x00".to_vec();
        data.extend_from_slice(&[0x0F, 0x01, 0x02, 0x00, 100, 0, 0, 0, 0x00, 0x10, 0, 0]);
        data.extend_from_slice(&[0, 0, 0, 0]);
        assert!(matches!(
            decode(&data),
            Err(Error::UnsupportedMetadataFormat(_))
        ));
    }

    #[test]
    fn test_too_many_tags() {
        let mut data = b"MM\x00\x2A\x00\x00\x00\x08".to_vec();
        data.extend_from_slice(&(MAX_IFD_TAGS + 1).to_be_bytes());
        data.resize(data.len() + 12 * 1001 + 4, 0);
        let err = decode(&data).unwrap_err();
        assert!(matches!(err, Error::UnsupportedMetadataFormat(ref m) if m.contains("entries")));
    }

    #[test]
    fn test_unclean_ascii_stays_opaque() {
        assert!(matches!(
            ascii_value(tags::MAKE, 3, b"AB\0"),
            TagValue::Ascii(ref s) if s == "AB"
        ));
        assert!(matches!(
            ascii_value(tags::MAKE, 3, b"ABC"),
            TagValue::Opaque { field_type: types::ASCII, .. }
        ));
        assert!(matches!(
            ascii_value(tags::MAKE, 4, b"A\0B\0"),
            TagValue::Opaque { .. }
        ));
        // blank seconds are not a canonical date, keep the text
        assert!(matches!(
            ascii_value(tags::DATE_TIME, 20, b"2023:05:12 18:04:  \0"),
            TagValue::Ascii(_)
        ));
    }

    #[test]
    fn test_unreadable_thumbnail_keeps_its_tags() {
        let data = TiffBuilder::new(ByteOrder::BigEndian)
            .ascii(tags::MAKE, "Canon")
            .raw_thumbnail_pointer(0xFFFF, 10)
            .build();
        let metadata = decode(&data).unwrap();
        assert!(metadata.thumbnail.is_none());
        assert_eq!(
            metadata.get(DirectoryKind::Ifd1, tags::JPEG_INTERCHANGE_FORMAT),
            Some(&TagValue::Long(vec![0xFFFF]))
        );
        assert_eq!(
            metadata.get(DirectoryKind::Ifd1, tags::JPEG_INTERCHANGE_FORMAT_LENGTH),
            Some(&TagValue::Long(vec![10]))
        );
    }

    #[test]
    fn test_thumbnail_without_length_keeps_its_offset() {
        let mut offset = Vec::new();
        ByteOrder::LittleEndian.write_u32(&mut offset, 0x40);
        let data = TiffBuilder::new(ByteOrder::LittleEndian)
            .ascii(tags::MAKE, "Canon")
            .ifd1_entry(tags::JPEG_INTERCHANGE_FORMAT, types::LONG, 1, &offset)
            .build();
        let metadata = decode(&data).unwrap();
        assert!(metadata.thumbnail.is_none());
        assert_eq!(
            metadata.get(DirectoryKind::Ifd1, tags::JPEG_INTERCHANGE_FORMAT),
            Some(&TagValue::Long(vec![0x40]))
        );
    }

    #[test]
    fn test_sized_unknown_types_read_full_value() {
        let data = TiffBuilder::new(ByteOrder::BigEndian)
            .entry(0xC7A0, types::LONG8, 2, b"0123456789ABCDEF")
            .entry(0xC7A1, 0x99, 16, &[0, 0, 0, 0x2C])
            .build();
        let (metadata, layout) = decode_with_layout(&data).unwrap();

        assert_eq!(
            metadata.get(DirectoryKind::Ifd0, 0xC7A0),
            Some(&TagValue::Opaque {
                field_type: types::LONG8,
                count: 2,
                data: b"0123456789ABCDEF".to_vec(),
            })
        );
        let range = layout.entries[&(DirectoryKind::Ifd0, 0xC7A0)]
            .value
            .clone()
            .unwrap();
        assert_eq!(&data[range], b"0123456789ABCDEF");

        // size unknown: only the raw field, and no known range
        assert_eq!(
            metadata.get(DirectoryKind::Ifd0, 0xC7A1),
            Some(&TagValue::Opaque {
                field_type: 0x99,
                count: 16,
                data: vec![0, 0, 0, 0x2C],
            })
        );
        assert!(layout.entries[&(DirectoryKind::Ifd0, 0xC7A1)].value.is_none());
    }

    #[test]
    fn test_layout_records_tables_and_thumbnail() {
        let data = TiffBuilder::new(ByteOrder::BigEndian)
            .ascii(tags::MAKE, "Canon")
            .exif_ascii(tags::LENS_MODEL, "RF50mm F1.8 STM")
            .thumbnail(&[0xFF, 0xD8, 0xFF, 0xD9])
            .build();
        let (_, layout) = decode_with_layout(&data).unwrap();

        // IFD0 with Make and the EXIF pointer
        assert_eq!(layout.tables[0], 8..8 + 2 + 2 * ENTRY_SIZE + 4);
        assert_eq!(layout.tables.len(), 3);
        let thumbnail = layout.thumbnail.unwrap();
        assert_eq!(&data[thumbnail], &[0xFF, 0xD8, 0xFF, 0xD9]);
    }

    #[test]
    fn test_find_ifd0_value() {
        for order in [ByteOrder::BigEndian, ByteOrder::LittleEndian] {
            let data = TiffBuilder::new(order)
                .ascii(tags::MAKE, "Canon")
                .short(tags::ORIENTATION, 3)
                .build();
            let position = find_ifd0_value(&data, tags::ORIENTATION, types::SHORT).unwrap();
            assert_eq!(order.read_u16(&data[position..position + 2]), 3);

            assert!(find_ifd0_value(&data, tags::ORIENTATION, types::LONG).is_none());
            assert!(find_ifd0_value(&data, tags::RATING, types::SHORT).is_none());
        }
        assert!(find_ifd0_value(b"MM\x00\x2A", tags::ORIENTATION, types::SHORT).is_none());
    }
}
