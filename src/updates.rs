//! Metadata update requests and options

use crate::model::{GpsCoordinates, Orientation, PhotoRating};
use chrono::{FixedOffset, Offset, Utc};

/// One logical metadata field to change
///
/// Each variant touches every tag that represents the field, so the tags
/// never contradict each other afterwards.
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataUpdate {
    /// Capture time as epoch milliseconds; `None` removes it
    TakenDate(Option<i64>),
    /// Display orientation of the main image
    Orientation(Orientation),
    /// Capture location; `None` removes it
    GpsCoordinates(Option<GpsCoordinates>),
    /// Star rating in the Windows rating tags
    Rating(PhotoRating),
}

impl MetadataUpdate {
    /// Short name for log messages
    pub fn name(&self) -> &'static str {
        match self {
            Self::TakenDate(_) => "taken date",
            Self::Orientation(_) => "orientation",
            Self::GpsCoordinates(_) => "GPS coordinates",
            Self::Rating(_) => "rating",
        }
    }

    /// Whether this update only deletes tags
    pub fn is_removal(&self) -> bool {
        matches!(
            self,
            Self::TakenDate(None) | Self::GpsCoordinates(None) | Self::Rating(PhotoRating::Unrated)
        )
    }
}

/// Options controlling how updates are written
///
/// The default renders dates in UTC, writes `OffsetTime*` tags and patches
/// an existing orientation value in place.
///
/// # Example
///
/// ```
/// use chrono::FixedOffset;
/// use metadata_io::Options;
///
/// let offset = FixedOffset::east_opt(2 * 3600).unwrap();
/// let options = Options::new()
///     .with_time_offset(offset)
///     .write_offset_time(false);
/// assert_eq!(options.time_offset(), offset);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    pub(crate) time_offset: FixedOffset,
    pub(crate) write_offset_time: bool,
    pub(crate) in_place_orientation: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            time_offset: Utc.fix(),
            write_offset_time: true,
            in_place_orientation: true,
        }
    }
}

impl Options {
    /// Create options with the defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Offset used to turn epoch milliseconds into EXIF wall-clock time
    pub fn with_time_offset(mut self, offset: FixedOffset) -> Self {
        self.time_offset = offset;
        self
    }

    /// Write `OffsetTime`, `OffsetTimeOriginal` and `OffsetTimeDigitized`
    pub fn write_offset_time(mut self, enabled: bool) -> Self {
        self.write_offset_time = enabled;
        self
    }

    /// Allow orientation updates to overwrite the stored value without
    /// re-encoding the EXIF segment
    pub fn in_place_orientation(mut self, enabled: bool) -> Self {
        self.in_place_orientation = enabled;
        self
    }

    pub fn time_offset(&self) -> FixedOffset {
        self.time_offset
    }
}
