#![no_main]

use libfuzzer_sys::fuzz_target;
use metadata_io::{update, GpsCoordinates, MetadataUpdate, Orientation, PhotoRating};

fuzz_target!(|data: &[u8]| {
    let updates = [
        MetadataUpdate::TakenDate(Some(1_700_000_000_123)),
        MetadataUpdate::TakenDate(None),
        MetadataUpdate::Orientation(Orientation::MirrorVertical),
        MetadataUpdate::GpsCoordinates(Some(GpsCoordinates::new(48.8584, 2.2945))),
        MetadataUpdate::GpsCoordinates(None),
        MetadataUpdate::Rating(PhotoRating::ThreeStars),
    ];

    for u in &updates {
        // Applying an update twice must give the same bytes as applying it once
        if let Ok(once) = update(data, u) {
            let twice = update(&once, u).expect("updated output is readable");
            assert_eq!(once, twice);
        }
    }
});
