#![no_main]

use libfuzzer_sys::fuzz_target;
use shiguredo_multipart::{Boundary, Settings};

fuzz_target!(|data: &str| {
    // パニックしなければ OK
    if let Ok(boundary) = Boundary::from_content_type(data) {
        assert!(!boundary.is_empty());
        assert_eq!(boundary.trailer_len(), boundary.len() + 4);
        let _ = Settings::default().validate(&boundary);
    }
});
