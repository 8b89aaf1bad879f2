#![no_main]

use libfuzzer_sys::fuzz_target;
use keyward_core::DerivationPath;

fuzz_target!(|data: &[u8]| {
    // Parsing arbitrary strings must never panic
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(path) = s.parse::<DerivationPath>() {
            // Round-trip through the display form
            let rendered = path.to_string();
            let reparsed: DerivationPath = rendered.parse().unwrap();
            assert_eq!(path, reparsed);
            assert!(rendered == "m" || rendered.starts_with("m/"));
        }
    }
});
