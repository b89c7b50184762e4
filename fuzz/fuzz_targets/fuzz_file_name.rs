#![no_main]

use libfuzzer_sys::fuzz_target;
use shiguredo_multipart::{PathResolver, Settings, parse_file_name};

fuzz_target!(|data: &[u8]| {
    let Ok(file_name) = parse_file_name(data) else {
        return;
    };

    // 自動命名の候補は常に出力先ディレクトリの直下
    let settings = Settings::new().with_output_directory("out");
    let resolver = PathResolver::new(&settings);
    if let Ok(candidates) = resolver.candidates(&file_name) {
        for candidate in candidates.take(3) {
            assert_eq!(candidate.parent(), Some(std::path::Path::new("out")));
        }
    }
});
