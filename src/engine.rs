//! Applying a [`MetadataUpdate`] to EXIF data
//!
//! The engine works on the TIFF payload only. It decodes the current
//! metadata, derives the updated model and either reports that nothing
//! changed or hands back the new payload. An existing payload is edited
//! rather than laid out again, so entries the update does not touch keep
//! their bytes and offsets. Reassembly of the surrounding JPEG is left to
//! the caller.

use crate::{
    error::{Error, Result},
    exif_date,
    metadata::{Directory, DirectoryKind, ImageMetadata, Rational, TagValue},
    model::{GpsCoordinates, PhotoRating},
    tiff::{self, tags, types, ByteOrder},
    updates::{MetadataUpdate, Options},
};

/// Version written when the EXIF IFD has to be created
const EXIF_VERSION: &[u8; 4] = b"0232";

/// Version written when the GPS IFD has to be created
const GPS_VERSION: [u8; 4] = [2, 3, 0, 0];

/// Seconds are stored with micro-arcsecond precision
const GPS_SECONDS_DENOMINATOR: u32 = 1_000_000;

const SUB_SEC_TAGS: [u16; 3] = [
    tags::SUB_SEC_TIME,
    tags::SUB_SEC_TIME_ORIGINAL,
    tags::SUB_SEC_TIME_DIGITIZED,
];

const OFFSET_TAGS: [u16; 3] = [
    tags::OFFSET_TIME,
    tags::OFFSET_TIME_ORIGINAL,
    tags::OFFSET_TIME_DIGITIZED,
];

/// Compute the TIFF payload that results from `update`
///
/// `existing` is the current payload (after `Exif\0\0`), if the image has
/// one. Returns `Ok(None)` when the update leaves the metadata unchanged.
///
/// An existing payload that cannot be decoded fails with
/// `UnsupportedMetadataFormat` instead of being replaced.
pub(crate) fn plan(
    existing: Option<&[u8]>,
    update: &MetadataUpdate,
    options: &Options,
) -> Result<Option<Vec<u8>>> {
    let current = match existing {
        Some(data) => tiff::decode(data)?,
        None => ImageMetadata::default(),
    };

    let mut updated = current.clone();
    apply(&mut updated, update, options)?;

    if updated == current {
        log::debug!("{} update leaves metadata unchanged", update.name());
        return Ok(None);
    }

    if let (MetadataUpdate::Orientation(orientation), Some(data)) = (update, existing) {
        if options.in_place_orientation && has_single_short(&current, tags::ORIENTATION) {
            if let Some(position) =
                tiff::reader::find_ifd0_value(data, tags::ORIENTATION, types::SHORT)
            {
                log::debug!(
                    "patching orientation in place at TIFF offset {}",
                    position
                );
                let mut patched = data.to_vec();
                write_u16_at(current.byte_order, &mut patched, position, orientation.value());
                return Ok(Some(patched));
            }
        }
    }

    match existing {
        Some(data) => tiff::encode_lossless(&updated, data).map(Some),
        None => tiff::encode(&updated).map(Some),
    }
}

/// Apply `update` to `metadata`
///
/// Directories are created as needed when a value is set, never when one
/// is removed.
pub fn apply(metadata: &mut ImageMetadata, update: &MetadataUpdate, options: &Options) -> Result<()> {
    match update {
        MetadataUpdate::TakenDate(Some(millis)) => set_taken_date(metadata, *millis, options),
        MetadataUpdate::TakenDate(None) => {
            remove_taken_date(metadata);
            Ok(())
        }
        MetadataUpdate::Orientation(orientation) => {
            metadata
                .directory_or_insert(DirectoryKind::Ifd0)
                .insert(tags::ORIENTATION, TagValue::Short(vec![orientation.value()]));
            Ok(())
        }
        MetadataUpdate::GpsCoordinates(Some(coordinates)) => set_gps(metadata, coordinates),
        MetadataUpdate::GpsCoordinates(None) => {
            if let Some(gps) = metadata.directory_mut(DirectoryKind::Gps) {
                for tag in [
                    tags::GPS_VERSION_ID,
                    tags::GPS_LATITUDE_REF,
                    tags::GPS_LATITUDE,
                    tags::GPS_LONGITUDE_REF,
                    tags::GPS_LONGITUDE,
                ] {
                    gps.remove(tag);
                }
            }
            Ok(())
        }
        MetadataUpdate::Rating(rating) => set_rating(metadata, *rating),
    }
}

fn has_single_short(metadata: &ImageMetadata, tag: u16) -> bool {
    matches!(metadata.get(DirectoryKind::Ifd0, tag), Some(TagValue::Short(v)) if v.len() == 1)
}

fn write_u16_at(order: ByteOrder, data: &mut [u8], position: usize, value: u16) {
    let mut bytes = Vec::with_capacity(2);
    order.write_u16(&mut bytes, value);
    data[position..position + 2].copy_from_slice(&bytes);
}

/// The EXIF IFD, created with its version tag if missing
fn exif_directory(metadata: &mut ImageMetadata) -> &mut Directory {
    let created = metadata.directory(DirectoryKind::Exif).is_none();
    let exif = metadata.directory_or_insert(DirectoryKind::Exif);
    if created {
        exif.insert(tags::EXIF_VERSION, TagValue::Undefined(EXIF_VERSION.to_vec()));
    }
    exif
}

fn set_taken_date(metadata: &mut ImageMetadata, epoch_millis: i64, options: &Options) -> Result<()> {
    let (date, millis) = exif_date::to_local(epoch_millis, &options.time_offset)?;

    metadata
        .directory_or_insert(DirectoryKind::Ifd0)
        .insert(tags::DATE_TIME, TagValue::DateTime(date));

    let exif = exif_directory(metadata);
    exif.insert(tags::DATE_TIME_ORIGINAL, TagValue::DateTime(date));
    exif.insert(tags::DATE_TIME_DIGITIZED, TagValue::DateTime(date));

    for tag in SUB_SEC_TAGS {
        if millis == 0 {
            exif.remove(tag);
        } else {
            exif.insert(tag, TagValue::Ascii(exif_date::format_sub_sec(millis)));
        }
    }

    let offset = exif_date::format_offset(&options.time_offset);
    for tag in OFFSET_TAGS {
        if options.write_offset_time {
            exif.insert(tag, TagValue::Ascii(offset.clone()));
        } else {
            exif.remove(tag);
        }
    }
    Ok(())
}

fn remove_taken_date(metadata: &mut ImageMetadata) {
    if let Some(ifd0) = metadata.directory_mut(DirectoryKind::Ifd0) {
        ifd0.remove(tags::DATE_TIME);
    }
    if let Some(exif) = metadata.directory_mut(DirectoryKind::Exif) {
        exif.remove(tags::DATE_TIME_ORIGINAL);
        exif.remove(tags::DATE_TIME_DIGITIZED);
        for tag in SUB_SEC_TAGS.into_iter().chain(OFFSET_TAGS) {
            exif.remove(tag);
        }
    }
}

/// Split decimal degrees into degree, minute and second rationals
fn to_dms(value: f64) -> TagValue {
    const MICROS_PER_MINUTE: u64 = 60 * GPS_SECONDS_DENOMINATOR as u64;
    const MICROS_PER_DEGREE: u64 = 60 * MICROS_PER_MINUTE;

    let total = (value.abs() * MICROS_PER_DEGREE as f64).round() as u64;
    let degrees = total / MICROS_PER_DEGREE;
    let minutes = (total % MICROS_PER_DEGREE) / MICROS_PER_MINUTE;
    let seconds = total % MICROS_PER_MINUTE;

    TagValue::Rational(vec![
        Rational::new(degrees as u32, 1),
        Rational::new(minutes as u32, 1),
        Rational::new(seconds as u32, GPS_SECONDS_DENOMINATOR),
    ])
}

fn set_gps(metadata: &mut ImageMetadata, coordinates: &GpsCoordinates) -> Result<()> {
    if !coordinates.is_valid() {
        return Err(Error::UnsupportedUpdate(format!(
            "coordinates {} are out of range",
            coordinates
        )));
    }

    let created = metadata.directory(DirectoryKind::Gps).is_none();
    let gps = metadata.directory_or_insert(DirectoryKind::Gps);
    if created || gps.get(tags::GPS_VERSION_ID).is_none() {
        gps.insert(tags::GPS_VERSION_ID, TagValue::Byte(GPS_VERSION.to_vec()));
    }

    let latitude_ref = if coordinates.latitude < 0.0 { "S" } else { "N" };
    let longitude_ref = if coordinates.longitude < 0.0 { "W" } else { "E" };
    gps.insert(tags::GPS_LATITUDE_REF, TagValue::Ascii(latitude_ref.to_string()));
    gps.insert(tags::GPS_LATITUDE, to_dms(coordinates.latitude));
    gps.insert(tags::GPS_LONGITUDE_REF, TagValue::Ascii(longitude_ref.to_string()));
    gps.insert(tags::GPS_LONGITUDE, to_dms(coordinates.longitude));
    Ok(())
}

fn set_rating(metadata: &mut ImageMetadata, rating: PhotoRating) -> Result<()> {
    match rating {
        PhotoRating::Rejected => Err(Error::UnsupportedUpdate(
            "the rejected rating cannot be stored in EXIF".to_string(),
        )),
        PhotoRating::Unrated => {
            if let Some(ifd0) = metadata.directory_mut(DirectoryKind::Ifd0) {
                ifd0.remove(tags::RATING);
                ifd0.remove(tags::RATING_PERCENT);
            }
            Ok(())
        }
        _ => {
            let ifd0 = metadata.directory_or_insert(DirectoryKind::Ifd0);
            ifd0.insert(tags::RATING, TagValue::Short(vec![rating.value() as u16]));
            if let Some(percent) = rating.percent() {
                ifd0.insert(tags::RATING_PERCENT, TagValue::Short(vec![percent]));
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        model::Orientation,
        test_utils::{raw_entry, TiffBuilder},
    };
    use chrono::{FixedOffset, NaiveDate};

    fn decode_plan(existing: Option<&[u8]>, update: MetadataUpdate) -> ImageMetadata {
        let data = plan(existing, &update, &Options::default())
            .unwrap()
            .expect("update should change the metadata");
        tiff::decode(&data).unwrap()
    }

    #[test]
    fn test_taken_date_on_empty_metadata() {
        let metadata = decode_plan(None, MetadataUpdate::TakenDate(Some(1_700_000_000_000)));

        let expected = NaiveDate::from_ymd_opt(2023, 11, 14)
            .unwrap()
            .and_hms_opt(22, 13, 20)
            .unwrap();
        for (kind, tag) in [
            (DirectoryKind::Ifd0, tags::DATE_TIME),
            (DirectoryKind::Exif, tags::DATE_TIME_ORIGINAL),
            (DirectoryKind::Exif, tags::DATE_TIME_DIGITIZED),
        ] {
            assert_eq!(metadata.get(kind, tag), Some(&TagValue::DateTime(expected)));
        }
        assert_eq!(
            metadata.get(DirectoryKind::Exif, tags::EXIF_VERSION),
            Some(&TagValue::Undefined(b"0232".to_vec()))
        );
        assert_eq!(
            metadata.get(DirectoryKind::Exif, tags::OFFSET_TIME_ORIGINAL),
            Some(&TagValue::Ascii("+00:00".to_string()))
        );
        assert!(metadata.get(DirectoryKind::Exif, tags::SUB_SEC_TIME).is_none());
        assert_eq!(
            metadata.taken_date(&FixedOffset::east_opt(0).unwrap()),
            Some(1_700_000_000_000)
        );
    }

    #[test]
    fn test_taken_date_with_millis_and_offset() {
        let offset = FixedOffset::east_opt(-7 * 3600).unwrap();
        let options = Options::new().with_time_offset(offset);
        let update = MetadataUpdate::TakenDate(Some(1_700_000_000_250));

        let data = plan(None, &update, &options).unwrap().unwrap();
        let metadata = tiff::decode(&data).unwrap();

        assert_eq!(
            metadata.get(DirectoryKind::Exif, tags::SUB_SEC_TIME_ORIGINAL),
            Some(&TagValue::Ascii("25".to_string()))
        );
        assert_eq!(
            metadata.get(DirectoryKind::Exif, tags::OFFSET_TIME),
            Some(&TagValue::Ascii("-07:00".to_string()))
        );
        // the stored offset wins over the caller's default
        assert_eq!(
            metadata.taken_date(&FixedOffset::east_opt(0).unwrap()),
            Some(1_700_000_000_250)
        );
    }

    #[test]
    fn test_stale_sub_sec_and_offset_are_removed() {
        let existing = TiffBuilder::new(ByteOrder::LittleEndian)
            .exif_ascii(tags::DATE_TIME_ORIGINAL, "2020:01:01 10:00:00")
            .exif_ascii(tags::SUB_SEC_TIME_ORIGINAL, "999")
            .exif_ascii(tags::OFFSET_TIME_ORIGINAL, "+09:00")
            .build();
        let options = Options::new().write_offset_time(false);
        let update = MetadataUpdate::TakenDate(Some(1_600_000_000_000));

        let data = plan(Some(&existing), &update, &options).unwrap().unwrap();
        let metadata = tiff::decode(&data).unwrap();
        let exif = metadata.directory(DirectoryKind::Exif).unwrap();
        assert!(exif.get(tags::SUB_SEC_TIME_ORIGINAL).is_none());
        assert!(exif.get(tags::OFFSET_TIME_ORIGINAL).is_none());
        // the existing EXIF IFD is reused, not given a version
        assert!(exif.get(tags::EXIF_VERSION).is_none());
        assert_eq!(metadata.byte_order, ByteOrder::LittleEndian);
    }

    #[test]
    fn test_remove_taken_date() {
        let existing = TiffBuilder::new(ByteOrder::BigEndian)
            .ascii(tags::MAKE, "Canon")
            .ascii(tags::DATE_TIME, "2020:01:01 10:00:00")
            .exif_ascii(tags::DATE_TIME_ORIGINAL, "2020:01:01 10:00:00")
            .build();
        let metadata = decode_plan(Some(&existing), MetadataUpdate::TakenDate(None));
        assert!(metadata.taken_date_local().is_none());
        assert_eq!(metadata.camera_make(), Some("Canon"));
    }

    #[test]
    fn test_removal_without_metadata_is_noop() {
        let options = Options::default();
        for update in [
            MetadataUpdate::TakenDate(None),
            MetadataUpdate::GpsCoordinates(None),
            MetadataUpdate::Rating(PhotoRating::Unrated),
        ] {
            assert_eq!(plan(None, &update, &options).unwrap(), None);
        }

        // nothing to remove from an EXIF IFD that lacks the tags
        let existing = TiffBuilder::new(ByteOrder::BigEndian)
            .ascii(tags::MAKE, "Canon")
            .build();
        assert_eq!(
            plan(Some(&existing), &MetadataUpdate::TakenDate(None), &options).unwrap(),
            None
        );
    }

    #[test]
    fn test_same_value_is_noop() {
        let existing = TiffBuilder::new(ByteOrder::BigEndian)
            .short(tags::ORIENTATION, 6)
            .build();
        let update = MetadataUpdate::Orientation(Orientation::RotateRight);
        assert_eq!(plan(Some(&existing), &update, &Options::default()).unwrap(), None);
    }

    #[test]
    fn test_orientation_in_place() {
        let existing = TiffBuilder::new(ByteOrder::LittleEndian)
            .ascii(tags::MAKE, "Canon")
            .short(tags::ORIENTATION, 1)
            .build();
        let update = MetadataUpdate::Orientation(Orientation::RotateLeft);

        let patched = plan(Some(&existing), &update, &Options::default())
            .unwrap()
            .unwrap();
        assert_eq!(patched.len(), existing.len());
        let differing = existing
            .iter()
            .zip(&patched)
            .filter(|(a, b)| a != b)
            .count();
        assert_eq!(differing, 1);
        assert_eq!(
            tiff::decode(&patched).unwrap().orientation(),
            Some(Orientation::RotateLeft)
        );

        // re-encoded when patching is off
        let options = Options::new().in_place_orientation(false);
        let encoded = plan(Some(&existing), &update, &options).unwrap().unwrap();
        assert_eq!(
            tiff::decode(&encoded).unwrap(),
            tiff::decode(&patched).unwrap()
        );
    }

    #[test]
    fn test_gps_set_and_remove() {
        let coordinates = GpsCoordinates::new(-33.8567844, 151.213108);
        let metadata = decode_plan(None, MetadataUpdate::GpsCoordinates(Some(coordinates)));

        let read = metadata.gps_coordinates().unwrap();
        assert!((read.latitude - coordinates.latitude).abs() < 1e-6);
        assert!((read.longitude - coordinates.longitude).abs() < 1e-6);
        assert_eq!(
            metadata.get(DirectoryKind::Gps, tags::GPS_VERSION_ID),
            Some(&TagValue::Byte(vec![2, 3, 0, 0]))
        );
        assert_eq!(
            metadata.get(DirectoryKind::Gps, tags::GPS_LATITUDE_REF),
            Some(&TagValue::Ascii("S".to_string()))
        );

        let encoded = tiff::encode(&metadata).unwrap();
        let removed = decode_plan(Some(&encoded), MetadataUpdate::GpsCoordinates(None));
        assert!(removed.gps_coordinates().is_none());
    }

    #[test]
    fn test_dms_split() {
        let TagValue::Rational(parts) = to_dms(12.5125) else {
            panic!("expected rationals");
        };
        assert_eq!(parts[0], Rational::new(12, 1));
        assert_eq!(parts[1], Rational::new(30, 1));
        assert_eq!(parts[2], Rational::new(45_000_000, GPS_SECONDS_DENOMINATOR));
    }

    #[test]
    fn test_rating() {
        let metadata = decode_plan(None, MetadataUpdate::Rating(PhotoRating::FourStars));
        assert_eq!(metadata.rating(), Some(PhotoRating::FourStars));
        assert_eq!(
            metadata.get(DirectoryKind::Ifd0, tags::RATING_PERCENT),
            Some(&TagValue::Short(vec![75]))
        );

        let encoded = tiff::encode(&metadata).unwrap();
        let cleared = decode_plan(Some(&encoded), MetadataUpdate::Rating(PhotoRating::Unrated));
        assert_eq!(cleared.rating(), None);
    }

    #[test]
    fn test_unsupported_updates() {
        let options = Options::default();
        for update in [
            MetadataUpdate::Rating(PhotoRating::Rejected),
            MetadataUpdate::GpsCoordinates(Some(GpsCoordinates::new(91.0, 0.0))),
            MetadataUpdate::TakenDate(Some(i64::MAX)),
            // year 10000
            MetadataUpdate::TakenDate(Some(253_402_300_800_000)),
        ] {
            assert!(
                matches!(plan(None, &update, &options), Err(Error::UnsupportedUpdate(_))),
                "{:?}",
                update
            );
        }
    }

    #[test]
    fn test_undecodable_exif_is_not_overwritten() {
        let update = MetadataUpdate::Orientation(Orientation::Standard);
        let err = plan(Some(b"garbage!"), &update, &Options::default()).unwrap_err();
        assert!(matches!(err, Error::UnsupportedMetadataFormat(_)));
    }

    #[test]
    fn test_nan_value_does_not_defeat_noop() {
        let mut nan = Vec::new();
        ByteOrder::BigEndian.write_u32(&mut nan, f32::NAN.to_bits());
        let existing = TiffBuilder::new(ByteOrder::BigEndian)
            .entry(0xC000, types::FLOAT, 1, &nan)
            .short(tags::STRIP_OFFSETS, 0)
            .build();
        assert_eq!(
            plan(Some(&existing), &MetadataUpdate::TakenDate(None), &Options::default()).unwrap(),
            None
        );
    }

    #[test]
    fn test_untouched_entries_keep_their_bytes() {
        let existing = TiffBuilder::new(ByteOrder::BigEndian)
            .ascii(tags::MAKE, "Canon")
            .short(tags::STRIP_OFFSETS, 0x0400)
            .exif_undefined(tags::MAKER_NOTE, &[0x5A; 30])
            .build();
        let update = MetadataUpdate::TakenDate(Some(1_700_000_000_000));
        let data = plan(Some(&existing), &update, &Options::default())
            .unwrap()
            .unwrap();

        for (kind, tag) in [
            (DirectoryKind::Ifd0, tags::MAKE),
            (DirectoryKind::Ifd0, tags::STRIP_OFFSETS),
            (DirectoryKind::Exif, tags::MAKER_NOTE),
        ] {
            assert_eq!(
                raw_entry(&data, kind, tag),
                raw_entry(&existing, kind, tag),
                "0x{:04X}",
                tag
            );
        }
        assert_eq!(
            tiff::decode(&data).unwrap().taken_date(&FixedOffset::east_opt(0).unwrap()),
            Some(1_700_000_000_000)
        );
    }
}
