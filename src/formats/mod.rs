//! Container-specific I/O
//!
//! Only JPEG / JFIF marker-segment streams are handled.

pub mod jpeg_io;

pub use jpeg_io::{write_with_exif, ScanState, SegmentScanner};
