#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(source) = std::str::from_utf8(data) {
        // The full parse + optimize + assign + lower pipeline should never
        // panic; every rejection must surface as an error.
        let _ = grebe_lower::hlo_text_to_lir(source, "generic", true);
    }
});
