//! Typed values behind the updatable metadata fields

/// EXIF orientation (tag 0x0112)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Orientation {
    /// Default orientation
    Standard = 1,
    /// Mirrored horizontally
    MirrorHorizontal = 2,
    /// Rotated 180 degrees
    UpsideDown = 3,
    /// Mirrored vertically
    MirrorVertical = 4,
    /// Mirrored horizontally and rotated to the right
    MirrorHorizontalRotateRight = 5,
    /// Rotated to the right
    RotateRight = 6,
    /// Mirrored vertically and rotated to the right
    MirrorVerticalRotateRight = 7,
    /// Rotated to the left
    RotateLeft = 8,
}

impl Orientation {
    /// Look up an orientation by its stored value
    pub fn from_value(value: u16) -> Option<Self> {
        let orientation = match value {
            1 => Self::Standard,
            2 => Self::MirrorHorizontal,
            3 => Self::UpsideDown,
            4 => Self::MirrorVertical,
            5 => Self::MirrorHorizontalRotateRight,
            6 => Self::RotateRight,
            7 => Self::MirrorVerticalRotateRight,
            8 => Self::RotateLeft,
            _ => return None,
        };
        Some(orientation)
    }

    /// The value stored in the orientation tag
    pub fn value(self) -> u16 {
        self as u16
    }

    /// Orientation after rotating the image to the left
    pub fn rotate_left(self) -> Self {
        match self {
            Self::Standard => Self::RotateLeft,
            Self::RotateLeft => Self::UpsideDown,
            Self::UpsideDown => Self::RotateRight,
            Self::RotateRight => Self::Standard,
            Self::MirrorHorizontal => Self::MirrorHorizontalRotateRight,
            Self::MirrorHorizontalRotateRight => Self::MirrorVertical,
            Self::MirrorVertical => Self::MirrorVerticalRotateRight,
            Self::MirrorVerticalRotateRight => Self::MirrorHorizontal,
        }
    }

    /// Orientation after rotating the image to the right
    pub fn rotate_right(self) -> Self {
        match self {
            Self::Standard => Self::RotateRight,
            Self::RotateRight => Self::UpsideDown,
            Self::UpsideDown => Self::RotateLeft,
            Self::RotateLeft => Self::Standard,
            Self::MirrorHorizontal => Self::MirrorVerticalRotateRight,
            Self::MirrorVerticalRotateRight => Self::MirrorVertical,
            Self::MirrorVertical => Self::MirrorHorizontalRotateRight,
            Self::MirrorHorizontalRotateRight => Self::MirrorHorizontal,
        }
    }

    /// Orientation after flipping the image horizontally
    pub fn flip_horizontally(self) -> Self {
        match self {
            Self::Standard => Self::MirrorHorizontal,
            Self::MirrorHorizontal => Self::Standard,
            Self::UpsideDown => Self::MirrorVertical,
            Self::MirrorVertical => Self::UpsideDown,
            Self::RotateLeft => Self::MirrorVerticalRotateRight,
            Self::MirrorVerticalRotateRight => Self::RotateLeft,
            Self::RotateRight => Self::MirrorHorizontalRotateRight,
            Self::MirrorHorizontalRotateRight => Self::RotateRight,
        }
    }

    /// Orientation after flipping the image vertically
    pub fn flip_vertically(self) -> Self {
        self.flip_horizontally().rotate_right().rotate_right()
    }
}

impl std::fmt::Display for Orientation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Standard => "standard",
            Self::MirrorHorizontal => "mirror horizontal",
            Self::UpsideDown => "upside down",
            Self::MirrorVertical => "mirror vertical",
            Self::MirrorHorizontalRotateRight => "mirror horizontal and rotate right",
            Self::RotateRight => "rotate right",
            Self::MirrorVerticalRotateRight => "mirror vertical and rotate right",
            Self::RotateLeft => "rotate left",
        };
        write!(f, "{} ({})", name, self.value())
    }
}

/// Star rating of a photo
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PhotoRating {
    Rejected,
    Unrated,
    OneStar,
    TwoStars,
    ThreeStars,
    FourStars,
    FiveStars,
}

impl PhotoRating {
    /// Look up a rating by its numeric value (-1 to 5)
    pub fn from_value(value: i32) -> Option<Self> {
        let rating = match value {
            -1 => Self::Rejected,
            0 => Self::Unrated,
            1 => Self::OneStar,
            2 => Self::TwoStars,
            3 => Self::ThreeStars,
            4 => Self::FourStars,
            5 => Self::FiveStars,
            _ => return None,
        };
        Some(rating)
    }

    /// Numeric value, -1 for rejected
    pub fn value(self) -> i32 {
        match self {
            Self::Rejected => -1,
            Self::Unrated => 0,
            Self::OneStar => 1,
            Self::TwoStars => 2,
            Self::ThreeStars => 3,
            Self::FourStars => 4,
            Self::FiveStars => 5,
        }
    }

    /// Stars as text, e.g. "★★★☆☆"
    pub fn as_stars(self) -> &'static str {
        match self {
            Self::Rejected => "-----",
            Self::Unrated => "☆☆☆☆☆",
            Self::OneStar => "★☆☆☆☆",
            Self::TwoStars => "★★☆☆☆",
            Self::ThreeStars => "★★★☆☆",
            Self::FourStars => "★★★★☆",
            Self::FiveStars => "★★★★★",
        }
    }

    /// Value of the Windows `RatingPercent` tag for this rating
    pub(crate) fn percent(self) -> Option<u16> {
        match self {
            Self::OneStar => Some(1),
            Self::TwoStars => Some(25),
            Self::ThreeStars => Some(50),
            Self::FourStars => Some(75),
            Self::FiveStars => Some(99),
            Self::Rejected | Self::Unrated => None,
        }
    }

    /// Rating for a `RatingPercent` value
    pub(crate) fn from_percent(percent: u16) -> Self {
        match percent {
            0 => Self::Unrated,
            1..=12 => Self::OneStar,
            13..=37 => Self::TwoStars,
            38..=62 => Self::ThreeStars,
            63..=87 => Self::FourStars,
            _ => Self::FiveStars,
        }
    }
}

impl std::fmt::Display for PhotoRating {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_stars())
    }
}

const MAX_LATITUDE: f64 = 90.0;
const MAX_LONGITUDE: f64 = 180.0;

/// Decimal GPS position; south and west are negative
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GpsCoordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl GpsCoordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Both values are finite and within ±90 / ±180
    pub fn is_valid(&self) -> bool {
        (-MAX_LATITUDE..=MAX_LATITUDE).contains(&self.latitude)
            && (-MAX_LONGITUDE..=MAX_LONGITUDE).contains(&self.longitude)
    }

    /// 0,0 is what broken devices write when they have no fix
    pub fn is_null_island(&self) -> bool {
        self.latitude == 0.0 && self.longitude == 0.0
    }
}

impl std::fmt::Display for GpsCoordinates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "GPS: {:.5}, {:.5}", self.latitude, self.longitude)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orientation_values() {
        for value in 1..=8 {
            let orientation = Orientation::from_value(value).unwrap();
            assert_eq!(orientation.value(), value);
        }
        assert_eq!(Orientation::from_value(0), None);
        assert_eq!(Orientation::from_value(9), None);
    }

    #[test]
    fn test_orientation_transforms() {
        let o = Orientation::Standard;
        assert_eq!(o.rotate_right(), Orientation::RotateRight);
        assert_eq!(o.rotate_left(), Orientation::RotateLeft);
        assert_eq!(o.rotate_left().rotate_right(), o);
        assert_eq!(o.flip_horizontally(), Orientation::MirrorHorizontal);
        assert_eq!(o.flip_vertically(), Orientation::MirrorVertical);
        assert_eq!(
            Orientation::RotateRight.flip_vertically(),
            Orientation::MirrorVerticalRotateRight
        );

        for value in 1..=8 {
            let o = Orientation::from_value(value).unwrap();
            assert_eq!(o.flip_horizontally().flip_horizontally(), o);
            assert_eq!(o.flip_vertically().flip_vertically(), o);
            assert_eq!(o.rotate_right().rotate_right().rotate_right().rotate_right(), o);
        }
    }

    #[test]
    fn test_rating() {
        assert_eq!(PhotoRating::from_value(3), Some(PhotoRating::ThreeStars));
        assert_eq!(PhotoRating::from_value(6), None);
        assert_eq!(PhotoRating::Rejected.value(), -1);
        assert_eq!(PhotoRating::FourStars.to_string(), "★★★★☆");
        for rating in [
            PhotoRating::OneStar,
            PhotoRating::TwoStars,
            PhotoRating::ThreeStars,
            PhotoRating::FourStars,
            PhotoRating::FiveStars,
        ] {
            assert_eq!(PhotoRating::from_percent(rating.percent().unwrap()), rating);
        }
    }

    #[test]
    fn test_gps_validity() {
        assert!(GpsCoordinates::new(53.2193, 6.5665).is_valid());
        assert!(GpsCoordinates::new(-90.0, 180.0).is_valid());
        assert!(!GpsCoordinates::new(90.1, 0.0).is_valid());
        assert!(!GpsCoordinates::new(0.0, -180.5).is_valid());
        assert!(!GpsCoordinates::new(f64::NAN, 0.0).is_valid());
        assert!(GpsCoordinates::new(0.0, 0.0).is_null_island());
    }
}
