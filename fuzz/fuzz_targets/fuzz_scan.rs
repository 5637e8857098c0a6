#![no_main]

use libfuzzer_sys::fuzz_target;
use metadata_io::{tiff, Asset};
use std::io::Cursor;

fuzz_target!(|data: &[u8]| {
    // Scanning and decoding must only ever return errors, never panic
    if let Ok(mut asset) = Asset::from_source(Cursor::new(data)) {
        let total: u64 = asset
            .structure()
            .segments()
            .iter()
            .map(|s| s.location.size)
            .sum();
        assert_eq!(total, data.len() as u64);

        let _ = asset.try_metadata();
        if let Ok(metadata) = asset.metadata() {
            let _ = metadata.to_string();
        }
    }

    // The raw input as a TIFF payload
    if let Ok(metadata) = tiff::decode(data) {
        if let Ok(encoded) = tiff::encode(&metadata) {
            let decoded = tiff::decode(&encoded).expect("encoder output decodes");
            assert_eq!(decoded, metadata);
        }
        if let Ok(edited) = tiff::encode_lossless(&metadata, data) {
            let decoded = tiff::decode(&edited).expect("lossless output decodes");
            assert_eq!(decoded, metadata);
        }
    }
});
