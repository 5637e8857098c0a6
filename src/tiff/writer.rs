//! TIFF encoding: [`ImageMetadata`] to payload bytes
//!
//! [`encode`] lays a model out from scratch:
//!
//! ```text
//! header | IFD0 | EXIF | Interop | GPS | IFD1 + thumbnail | IFD2...
//! ```
//!
//! Each IFD table is followed by its out-of-line values, every value padded
//! to an even length. Pointer tags and the thumbnail offset/length are
//! generated here and patched once every block's position is known.
//!
//! [`encode_lossless`] edits an existing payload instead. Entries whose
//! value did not change keep their original 12 bytes, so whatever they point
//! at (maker notes, values of unknown types, image data) stays where it was.
//! Directory tables and changed values go into space released by the old
//! layout, or after its end.

use super::{
    reader, tags, types, ByteOrder, ENTRY_SIZE, HEADER_SIZE, MAX_TIFF_SIZE, TIFF_MAGIC,
};
use crate::{
    error::{Error, Result},
    exif_date,
    metadata::{Directory, DirectoryKind, ImageMetadata, TagValue},
};
use std::collections::HashMap;
use std::ops::Range;

/// Raw entries carried over verbatim, by directory and tag
type KeptEntries = HashMap<(DirectoryKind, u16), [u8; ENTRY_SIZE]>;

/// Encode a model into a TIFF payload (the bytes that follow `Exif\0\0`)
///
/// Fails with `DataTooLarge` if the result does not fit into one APP1
/// segment, and with `UnsupportedUpdate` if an entry refers to other data
/// by offset (strip or tile offsets, maker notes, values of unknown size),
/// since every value moves.
pub fn encode(metadata: &ImageMetadata) -> Result<Vec<u8>> {
    let kept = KeptEntries::new();
    check_relocatable(metadata, &kept)?;

    let order = metadata.byte_order;
    let mut header = Vec::with_capacity(4096);
    header.extend_from_slice(order.marker());
    order.write_u16(&mut header, TIFF_MAGIC);
    // IFD0 offset, patched in finish()
    order.write_u32(&mut header, 0);

    let mut writer = TiffWriter::new(order, header, Vec::new());
    writer.write_directories(metadata, &kept, None)?;
    writer.finish()
}

/// Encode a model as an edit of `original`, the payload it was decoded from
///
/// Every entry that still holds the value it was decoded with is written
/// back as its original 12 bytes, so its out-of-line value is neither moved
/// nor rewritten. The thumbnail stays in place too if unchanged. The old
/// directory tables and the values of changed or removed entries are
/// zeroed and reused for the new tables and values; what does not fit is
/// appended.
///
/// Fails like [`encode`], except that offset-bearing entries are fine as
/// long as they are unchanged.
pub fn encode_lossless(metadata: &ImageMetadata, original: &[u8]) -> Result<Vec<u8>> {
    let (old, layout) = reader::decode_with_layout(original)?;
    if old.byte_order != metadata.byte_order {
        log::debug!("byte order changed, laying out from scratch");
        return encode(metadata);
    }

    let mut kept = KeptEntries::new();
    let mut protected = vec![0..HEADER_SIZE];
    for directory in metadata.directories() {
        for entry in directory.entries() {
            let key = (directory.kind, entry.tag);
            let Some(raw) = layout.entries.get(&key) else {
                continue;
            };
            if old.get(directory.kind, entry.tag) == Some(&entry.value) {
                kept.insert(key, raw.bytes);
                protected.extend(raw.value.clone());
            }
        }
    }
    check_relocatable(metadata, &kept)?;

    let kept_thumbnail = match (&layout.thumbnail, &metadata.thumbnail) {
        (Some(range), Some(thumbnail)) if old.thumbnail.as_ref() == Some(thumbnail) => {
            protected.push(range.clone());
            Some(range.start)
        }
        _ => None,
    };

    let mut released = layout.tables.clone();
    released.extend(
        layout
            .entries
            .iter()
            .filter(|(key, _)| !kept.contains_key(*key))
            .filter_map(|(_, raw)| raw.value.clone()),
    );
    if kept_thumbnail.is_none() {
        released.extend(layout.thumbnail.clone());
    }
    let free = subtract(released, &protected);

    let mut out = original.to_vec();
    for range in &free {
        out[range.clone()].fill(0);
    }
    log::debug!(
        "rewriting TIFF in place: {} entries kept, {} bytes released",
        kept.len(),
        free.iter().map(|r| r.len()).sum::<usize>()
    );

    let mut writer = TiffWriter::new(metadata.byte_order, out, free);
    writer.write_directories(metadata, &kept, kept_thumbnail)?;
    writer.finish()
}

/// Fail on entries that point into the payload and would have to move
fn check_relocatable(metadata: &ImageMetadata, kept: &KeptEntries) -> Result<()> {
    for directory in metadata.directories() {
        for entry in directory.entries() {
            if kept.contains_key(&(directory.kind, entry.tag)) {
                continue;
            }
            let unsized_type = match &entry.value {
                TagValue::Opaque { field_type, .. } => {
                    types::size_of(*field_type).is_none() || types::is_offset(*field_type)
                }
                _ => false,
            };
            if unsized_type || tags::RELOCATION_SENSITIVE.contains(&entry.tag) {
                return Err(Error::UnsupportedUpdate(format!(
                    "{} tag 0x{:04X} refers to data by offset and cannot be relocated",
                    directory.kind, entry.tag
                )));
            }
        }
    }
    Ok(())
}

/// `released` minus `protected`, sorted and merged
fn subtract(mut released: Vec<Range<usize>>, protected: &[Range<usize>]) -> Vec<Range<usize>> {
    for hole in protected {
        released = released
            .into_iter()
            .flat_map(|r| [r.start..r.end.min(hole.start), r.start.max(hole.end)..r.end])
            .filter(|r| !r.is_empty())
            .collect();
    }
    released.sort_by_key(|r| r.start);

    let mut merged: Vec<Range<usize>> = Vec::with_capacity(released.len());
    for range in released {
        match merged.last_mut() {
            Some(last) if range.start <= last.end => last.end = last.end.max(range.end),
            _ => merged.push(range),
        }
    }
    merged
}

/// Where a patched offset points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Target {
    Ifd(DirectoryKind),
    Thumbnail,
}

enum FieldData {
    Bytes(Vec<u8>),
    Offset(Target),
    /// Value field copied from the original entry
    Raw([u8; 4]),
}

struct Field {
    tag: u16,
    field_type: u16,
    count: u32,
    data: FieldData,
}

impl Field {
    fn pointer(tag: u16, target: Target) -> Self {
        Self {
            tag,
            field_type: types::LONG,
            count: 1,
            data: FieldData::Offset(target),
        }
    }

    fn long(tag: u16, value: u32, order: ByteOrder) -> Self {
        let mut bytes = Vec::with_capacity(4);
        order.write_u32(&mut bytes, value);
        Self {
            tag,
            field_type: types::LONG,
            count: 1,
            data: FieldData::Bytes(bytes),
        }
    }

    fn raw(entry: &[u8; ENTRY_SIZE], order: ByteOrder) -> Self {
        let mut value = [0u8; 4];
        value.copy_from_slice(&entry[8..12]);
        Self {
            tag: order.read_u16(&entry[0..2]),
            field_type: order.read_u16(&entry[2..4]),
            count: order.read_u32(&entry[4..8]),
            data: FieldData::Raw(value),
        }
    }
}

fn offset32(position: usize) -> Result<u32> {
    u32::try_from(position).map_err(|_| Error::DataTooLarge {
        size: position,
        max: MAX_TIFF_SIZE,
    })
}

/// Serialize a value in `order`
fn value_bytes(value: &TagValue, order: ByteOrder) -> Vec<u8> {
    let mut out = Vec::new();
    match value {
        TagValue::Byte(v) | TagValue::Undefined(v) => out.extend_from_slice(v),
        TagValue::Ascii(s) => {
            out.extend_from_slice(s.as_bytes());
            out.push(0);
        }
        TagValue::DateTime(date) => {
            out.extend_from_slice(exif_date::format_exif_date(date).as_bytes());
            out.push(0);
        }
        TagValue::Short(v) => v.iter().for_each(|&x| order.write_u16(&mut out, x)),
        TagValue::Long(v) => v.iter().for_each(|&x| order.write_u32(&mut out, x)),
        TagValue::Rational(v) => v.iter().for_each(|r| {
            order.write_u32(&mut out, r.numerator);
            order.write_u32(&mut out, r.denominator);
        }),
        TagValue::SByte(v) => out.extend(v.iter().map(|&x| x as u8)),
        TagValue::SShort(v) => v.iter().for_each(|&x| order.write_u16(&mut out, x as u16)),
        TagValue::SLong(v) => v.iter().for_each(|&x| order.write_u32(&mut out, x as u32)),
        TagValue::SRational(v) => v.iter().for_each(|r| {
            order.write_u32(&mut out, r.numerator as u32);
            order.write_u32(&mut out, r.denominator as u32);
        }),
        TagValue::Float(v) => v.iter().for_each(|&x| order.write_u32(&mut out, x.to_bits())),
        TagValue::Double(v) => v.iter().for_each(|&x| order.write_u64(&mut out, x.to_bits())),
        TagValue::Opaque { data, .. } => out.extend_from_slice(data),
    }
    out
}

struct TiffWriter {
    order: ByteOrder,
    out: Vec<u8>,
    /// Unused ranges inside `out`, sorted
    free: Vec<Range<usize>>,
    positions: HashMap<Target, u32>,
    patches: Vec<(usize, Target)>,
}

impl TiffWriter {
    fn new(order: ByteOrder, out: Vec<u8>, free: Vec<Range<usize>>) -> Self {
        Self {
            order,
            out,
            free,
            positions: HashMap::new(),
            patches: Vec::new(),
        }
    }

    /// Reserve `len` bytes (rounded up to even) at an even offset
    ///
    /// First fit among the free ranges, otherwise at the end.
    fn allocate(&mut self, len: usize) -> usize {
        let len = len + len % 2;
        for i in 0..self.free.len() {
            let range = self.free[i].clone();
            let start = range.start + range.start % 2;
            if start + len <= range.end {
                if start + len == range.end {
                    self.free.remove(i);
                } else {
                    self.free[i] = start + len..range.end;
                }
                return start;
            }
        }

        let start = self.out.len() + self.out.len() % 2;
        self.out.resize(start + len, 0);
        start
    }

    fn place(&mut self, bytes: &[u8]) -> usize {
        let position = self.allocate(bytes.len());
        self.out[position..position + bytes.len()].copy_from_slice(bytes);
        position
    }

    fn write_directories(
        &mut self,
        metadata: &ImageMetadata,
        kept: &KeptEntries,
        kept_thumbnail: Option<usize>,
    ) -> Result<()> {
        let placeholders = [
            Directory::new(DirectoryKind::Ifd0),
            Directory::new(DirectoryKind::Exif),
            Directory::new(DirectoryKind::Ifd1),
        ];

        // directories that only carry a pointer still have to exist
        let ifd0 = metadata
            .directory(DirectoryKind::Ifd0)
            .unwrap_or(&placeholders[0]);
        let interop = metadata.directory(DirectoryKind::Interop);
        let exif = metadata
            .directory(DirectoryKind::Exif)
            .or(interop.map(|_| &placeholders[1]));
        let gps = metadata.directory(DirectoryKind::Gps);
        let ifd1 = metadata
            .directory(DirectoryKind::Ifd1)
            .or(metadata.thumbnail.as_ref().map(|_| &placeholders[2]));
        let further: Vec<&Directory> = metadata
            .directories()
            .iter()
            .filter(|dir| matches!(dir.kind, DirectoryKind::Ifd(_)))
            .collect();

        let chain: Vec<DirectoryKind> = std::iter::once(ifd0)
            .chain(ifd1)
            .chain(further.iter().copied())
            .map(|dir| dir.kind)
            .collect();

        let layout = [Some(ifd0), exif, interop, gps, ifd1]
            .into_iter()
            .flatten()
            .chain(further.iter().copied());

        for directory in layout {
            let mut generated = Vec::new();
            match directory.kind {
                DirectoryKind::Ifd0 => {
                    if exif.is_some() {
                        generated.push(Field::pointer(
                            tags::EXIF_IFD_POINTER,
                            Target::Ifd(DirectoryKind::Exif),
                        ));
                    }
                    if gps.is_some() {
                        generated.push(Field::pointer(
                            tags::GPS_IFD_POINTER,
                            Target::Ifd(DirectoryKind::Gps),
                        ));
                    }
                }
                DirectoryKind::Exif if interop.is_some() => {
                    generated.push(Field::pointer(
                        tags::INTEROP_IFD_POINTER,
                        Target::Ifd(DirectoryKind::Interop),
                    ));
                }
                DirectoryKind::Ifd1 => {
                    if let Some(thumbnail) = &metadata.thumbnail {
                        generated.push(Field::pointer(
                            tags::JPEG_INTERCHANGE_FORMAT,
                            Target::Thumbnail,
                        ));
                        generated.push(Field::long(
                            tags::JPEG_INTERCHANGE_FORMAT_LENGTH,
                            offset32(thumbnail.len())?,
                            self.order,
                        ));
                    }
                }
                _ => {}
            }

            let next = chain
                .iter()
                .position(|&kind| kind == directory.kind)
                .and_then(|i| chain.get(i + 1))
                .copied();

            self.write_ifd(directory, generated, next, kept)?;

            if directory.kind == DirectoryKind::Ifd1 {
                if let Some(thumbnail) = &metadata.thumbnail {
                    let position = match kept_thumbnail {
                        Some(position) => position,
                        None => self.place(thumbnail),
                    };
                    self.positions
                        .insert(Target::Thumbnail, offset32(position)?);
                }
            }
        }
        Ok(())
    }

    fn write_ifd(
        &mut self,
        directory: &Directory,
        generated: Vec<Field>,
        next: Option<DirectoryKind>,
        kept: &KeptEntries,
    ) -> Result<()> {
        let order = self.order;
        let mut fields: Vec<Field> = directory
            .entries()
            .filter(|entry| !generated.iter().any(|g| g.tag == entry.tag))
            .map(|entry| match kept.get(&(directory.kind, entry.tag)) {
                Some(raw) => Field::raw(raw, order),
                None => Field {
                    tag: entry.tag,
                    field_type: entry.value.field_type(),
                    count: entry.value.count(),
                    data: FieldData::Bytes(value_bytes(&entry.value, order)),
                },
            })
            .collect();
        fields.extend(generated);
        fields.sort_by_key(|field| field.tag);

        let entry_count = u16::try_from(fields.len()).map_err(|_| Error::DataTooLarge {
            size: fields.len(),
            max: usize::from(u16::MAX),
        })?;

        let table_len = 2 + fields.len() * ENTRY_SIZE + 4;
        let start = self.allocate(table_len);
        self.positions
            .insert(Target::Ifd(directory.kind), offset32(start)?);

        let mut table = Vec::with_capacity(table_len);
        order.write_u16(&mut table, entry_count);
        for field in fields {
            order.write_u16(&mut table, field.tag);
            order.write_u16(&mut table, field.field_type);
            order.write_u32(&mut table, field.count);

            match field.data {
                FieldData::Offset(target) => {
                    self.patches.push((start + table.len(), target));
                    order.write_u32(&mut table, 0);
                }
                FieldData::Raw(value) => table.extend_from_slice(&value),
                FieldData::Bytes(bytes) if bytes.len() <= 4 => {
                    let mut inline = [0u8; 4];
                    inline[..bytes.len()].copy_from_slice(&bytes);
                    table.extend_from_slice(&inline);
                }
                FieldData::Bytes(bytes) => {
                    let position = self.place(&bytes);
                    order.write_u32(&mut table, offset32(position)?);
                }
            }
        }

        if let Some(kind) = next {
            self.patches.push((start + table.len(), Target::Ifd(kind)));
        }
        order.write_u32(&mut table, 0);

        self.out[start..start + table_len].copy_from_slice(&table);
        Ok(())
    }

    fn finish(mut self) -> Result<Vec<u8>> {
        for (position, target) in &self.patches {
            if let Some(&offset) = self.positions.get(target) {
                self.order.patch_u32(&mut self.out, *position, offset);
            }
        }
        if let Some(&ifd0) = self.positions.get(&Target::Ifd(DirectoryKind::Ifd0)) {
            self.order.patch_u32(&mut self.out, 4, ifd0);
        }

        // released space left over at the end is dropped
        if let Some(last) = self.free.last() {
            if last.end == self.out.len() {
                self.out.truncate(last.start);
            }
        }

        if self.out.len() > MAX_TIFF_SIZE {
            return Err(Error::DataTooLarge {
                size: self.out.len(),
                max: MAX_TIFF_SIZE,
            });
        }
        Ok(self.out)
    }
}
