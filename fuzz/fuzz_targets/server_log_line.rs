#![no_main]

use killfeed_ingest::parser::ServerLogParser;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(line) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(parser) = ServerLogParser::with_defaults() else {
        return;
    };
    let _ = parser.parse(line);
});
