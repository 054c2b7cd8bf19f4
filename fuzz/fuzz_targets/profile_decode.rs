#![no_main]

use libfuzzer_sys::fuzz_target;
use v8scope::profile::CpuProfile;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        if let Ok(profile) = CpuProfile::from_json(input) {
            let _ = profile.hot_paths(0.0);
            let _ = profile.call_tree(None, 64);
        }
    }
});
