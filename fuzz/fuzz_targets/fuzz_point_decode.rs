#![no_main]

use libfuzzer_sys::fuzz_target;
use keyward_hd::algebra::{points_equal, CompressedPoint, UncompressedPoint};

fuzz_target!(|data: &[u8]| {
    // Point decoding rejects garbage without panicking
    if let Ok(point) = CompressedPoint::from_slice(data) {
        // Anything that validated must survive a full round trip
        let uncompressed = point.decompress().unwrap();
        let back = uncompressed.compress().unwrap();
        assert_eq!(point, back);
        assert!(points_equal(point.as_bytes(), uncompressed.as_bytes()).unwrap());
    }

    let _ = UncompressedPoint::from_slice(data);
});
