#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(unit) = casegen_syntax::parse(s) {
            let _ = casegen_ir::compile(&unit, s);
        }
        let _ = casegen_syntax::parse_expression(s);
    }
});
