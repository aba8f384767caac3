#![no_main]

use killfeed_ingest::lines::{complete_lines, decode_line};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let lines = complete_lines(data, true);

    let mut prev_end = 0;
    for line in &lines {
        // 오프셋은 단조 증가하고 버퍼를 넘지 않음
        assert!(line.end > prev_end);
        assert!(line.end <= data.len());
        prev_end = line.end;

        if let Some(text) = decode_line(line.bytes).text() {
            assert!(!text.contains('\n'));
        }
    }
});
