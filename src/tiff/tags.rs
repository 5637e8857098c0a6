//! TIFF/EXIF tag IDs and display names

use crate::metadata::DirectoryKind;

// IFD0 (main image) tags
pub const IMAGE_WIDTH: u16 = 0x0100;
pub const IMAGE_LENGTH: u16 = 0x0101;
pub const IMAGE_DESCRIPTION: u16 = 0x010E;
pub const MAKE: u16 = 0x010F;
pub const MODEL: u16 = 0x0110;
pub const STRIP_OFFSETS: u16 = 0x0111;
pub const ORIENTATION: u16 = 0x0112;
pub const X_RESOLUTION: u16 = 0x011A;
pub const Y_RESOLUTION: u16 = 0x011B;
pub const RESOLUTION_UNIT: u16 = 0x0128;
pub const SOFTWARE: u16 = 0x0131;
pub const DATE_TIME: u16 = 0x0132;
pub const ARTIST: u16 = 0x013B;
pub const TILE_OFFSETS: u16 = 0x0144;
pub const SUB_IFDS: u16 = 0x014A;
pub const YCBCR_POSITIONING: u16 = 0x0213;
pub const RATING: u16 = 0x4746;
pub const RATING_PERCENT: u16 = 0x4749;
pub const COPYRIGHT: u16 = 0x8298;
pub const EXIF_IFD_POINTER: u16 = 0x8769;
pub const GPS_IFD_POINTER: u16 = 0x8825;

// IFD1 (thumbnail) tags
pub const JPEG_INTERCHANGE_FORMAT: u16 = 0x0201;
pub const JPEG_INTERCHANGE_FORMAT_LENGTH: u16 = 0x0202;

// EXIF sub-IFD tags
pub const EXPOSURE_TIME: u16 = 0x829A;
pub const F_NUMBER: u16 = 0x829D;
pub const ISO_SPEED: u16 = 0x8827;
pub const EXIF_VERSION: u16 = 0x9000;
pub const DATE_TIME_ORIGINAL: u16 = 0x9003;
pub const DATE_TIME_DIGITIZED: u16 = 0x9004;
pub const OFFSET_TIME: u16 = 0x9010;
pub const OFFSET_TIME_ORIGINAL: u16 = 0x9011;
pub const OFFSET_TIME_DIGITIZED: u16 = 0x9012;
pub const FOCAL_LENGTH: u16 = 0x920A;
pub const MAKER_NOTE: u16 = 0x927C;
pub const USER_COMMENT: u16 = 0x9286;
pub const SUB_SEC_TIME: u16 = 0x9290;
pub const SUB_SEC_TIME_ORIGINAL: u16 = 0x9291;
pub const SUB_SEC_TIME_DIGITIZED: u16 = 0x9292;
pub const COLOR_SPACE: u16 = 0xA001;
pub const PIXEL_X_DIMENSION: u16 = 0xA002;
pub const PIXEL_Y_DIMENSION: u16 = 0xA003;
pub const INTEROP_IFD_POINTER: u16 = 0xA005;
pub const LENS_MODEL: u16 = 0xA434;

// GPS sub-IFD tags
pub const GPS_VERSION_ID: u16 = 0x0000;
pub const GPS_LATITUDE_REF: u16 = 0x0001;
pub const GPS_LATITUDE: u16 = 0x0002;
pub const GPS_LONGITUDE_REF: u16 = 0x0003;
pub const GPS_LONGITUDE: u16 = 0x0004;
pub const GPS_ALTITUDE_REF: u16 = 0x0005;
pub const GPS_ALTITUDE: u16 = 0x0006;
pub const GPS_TIME_STAMP: u16 = 0x0007;
pub const GPS_MAP_DATUM: u16 = 0x0012;
pub const GPS_DATE_STAMP: u16 = 0x001D;

// Interoperability sub-IFD tags
pub const INTEROP_INDEX: u16 = 0x0001;
pub const INTEROP_VERSION: u16 = 0x0002;

/// Tags whose values are byte offsets into the TIFF payload, or refer to
/// data that does
///
/// An entry holding one of these can only be written back unchanged at its
/// original place. Maker notes are included because most vendor formats
/// store absolute offsets inside them.
pub(crate) const RELOCATION_SENSITIVE: &[u16] = &[
    STRIP_OFFSETS,
    TILE_OFFSETS,
    SUB_IFDS,
    JPEG_INTERCHANGE_FORMAT,
    JPEG_INTERCHANGE_FORMAT_LENGTH,
    MAKER_NOTE,
];

/// Display name of a tag within a directory
///
/// GPS and Interop tags reuse low numbers, so the directory decides which
/// table applies.
pub fn tag_name(kind: DirectoryKind, tag: u16) -> Option<&'static str> {
    match kind {
        DirectoryKind::Gps => gps_tag_name(tag),
        DirectoryKind::Interop => match tag {
            INTEROP_INDEX => Some("InteropIndex"),
            INTEROP_VERSION => Some("InteropVersion"),
            _ => None,
        },
        _ => tiff_tag_name(tag),
    }
}

fn gps_tag_name(tag: u16) -> Option<&'static str> {
    let name = match tag {
        GPS_VERSION_ID => "GPSVersionID",
        GPS_LATITUDE_REF => "GPSLatitudeRef",
        GPS_LATITUDE => "GPSLatitude",
        GPS_LONGITUDE_REF => "GPSLongitudeRef",
        GPS_LONGITUDE => "GPSLongitude",
        GPS_ALTITUDE_REF => "GPSAltitudeRef",
        GPS_ALTITUDE => "GPSAltitude",
        GPS_TIME_STAMP => "GPSTimeStamp",
        GPS_MAP_DATUM => "GPSMapDatum",
        GPS_DATE_STAMP => "GPSDateStamp",
        _ => return None,
    };
    Some(name)
}

fn tiff_tag_name(tag: u16) -> Option<&'static str> {
    let name = match tag {
        IMAGE_WIDTH => "ImageWidth",
        IMAGE_LENGTH => "ImageLength",
        IMAGE_DESCRIPTION => "ImageDescription",
        MAKE => "Make",
        MODEL => "Model",
        STRIP_OFFSETS => "StripOffsets",
        ORIENTATION => "Orientation",
        X_RESOLUTION => "XResolution",
        Y_RESOLUTION => "YResolution",
        RESOLUTION_UNIT => "ResolutionUnit",
        SOFTWARE => "Software",
        DATE_TIME => "DateTime",
        ARTIST => "Artist",
        TILE_OFFSETS => "TileOffsets",
        SUB_IFDS => "SubIFDs",
        JPEG_INTERCHANGE_FORMAT => "JPEGInterchangeFormat",
        JPEG_INTERCHANGE_FORMAT_LENGTH => "JPEGInterchangeFormatLength",
        YCBCR_POSITIONING => "YCbCrPositioning",
        RATING => "Rating",
        RATING_PERCENT => "RatingPercent",
        COPYRIGHT => "Copyright",
        EXPOSURE_TIME => "ExposureTime",
        F_NUMBER => "FNumber",
        EXIF_IFD_POINTER => "ExifOffset",
        ISO_SPEED => "ISOSpeedRatings",
        GPS_IFD_POINTER => "GPSInfo",
        EXIF_VERSION => "ExifVersion",
        DATE_TIME_ORIGINAL => "DateTimeOriginal",
        DATE_TIME_DIGITIZED => "DateTimeDigitized",
        OFFSET_TIME => "OffsetTime",
        OFFSET_TIME_ORIGINAL => "OffsetTimeOriginal",
        OFFSET_TIME_DIGITIZED => "OffsetTimeDigitized",
        FOCAL_LENGTH => "FocalLength",
        MAKER_NOTE => "MakerNote",
        USER_COMMENT => "UserComment",
        SUB_SEC_TIME => "SubSecTime",
        SUB_SEC_TIME_ORIGINAL => "SubSecTimeOriginal",
        SUB_SEC_TIME_DIGITIZED => "SubSecTimeDigitized",
        COLOR_SPACE => "ColorSpace",
        PIXEL_X_DIMENSION => "PixelXDimension",
        PIXEL_Y_DIMENSION => "PixelYDimension",
        INTEROP_IFD_POINTER => "InteropOffset",
        LENS_MODEL => "LensModel",
        _ => return None,
    };
    Some(name)
}

/// Whether an ASCII tag holds an EXIF date string
pub(crate) fn is_date_tag(tag: u16) -> bool {
    matches!(tag, DATE_TIME | DATE_TIME_ORIGINAL | DATE_TIME_DIGITIZED)
}
