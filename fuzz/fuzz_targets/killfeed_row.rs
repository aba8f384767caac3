#![no_main]

use killfeed_ingest::EmptyNamePolicy;
use killfeed_ingest::normalize::{classify, normalize};
use killfeed_ingest::parser::{KillRowOutcome, KillfeedParser};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(line) = std::str::from_utf8(data) else {
        return;
    };

    for policy in [EmptyNamePolicy::Malformed, EmptyNamePolicy::FillFromCounterpart] {
        let parser = KillfeedParser::new(policy);
        if let KillRowOutcome::Parsed(row) = parser.parse(line) {
            let event = normalize(row);
            // 정규화된 이벤트는 항상 이름이 있어야 함
            assert!(!event.killer_name.is_empty());
            assert!(!event.victim_name.is_empty());
            assert!(event.distance_meters.is_finite() && event.distance_meters >= 0.0);
            // 정규화 결과를 다시 판정해도 그대로
            let again = classify(&event.killer_name, &event.victim_name, &event.weapon);
            assert_eq!(again, (event.weapon.clone(), event.is_suicide));
        }
    }
});
