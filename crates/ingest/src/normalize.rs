//! 킬 이벤트 정규화
//!
//! 자살 판정 규칙:
//! - 가해자 이름 == 피해자 이름 이면 자살 (무기 표기는 그대로)
//! - 알려진 자기 사망 원인이면 자살이며 표기를 고정 레이블로 바꿈
//!   - 재배치 자살 (`suicide_by_relocation`) → `Menu Suicide`
//!   - 낙사 (`falling`) → `Falling`
//!
//! 그 외 무기/원인 문자열은 그대로 통과합니다. 정규화는 순수 함수이며 멱등입니다.

use killfeed_core::types::KillEvent;

use crate::parser::killfeed::KillRow;

/// 재배치(메뉴) 자살 레이블
pub const MENU_SUICIDE: &str = "Menu Suicide";
/// 낙사 레이블
pub const FALLING: &str = "Falling";

/// 자기 사망 원인 표기 → 고정 레이블
const SELF_TERMINATION_CAUSES: &[(&str, &str)] = &[
    ("suicide_by_relocation", MENU_SUICIDE),
    ("menu suicide", MENU_SUICIDE),
    ("falling", FALLING),
];

/// 무기 표기를 정규화하고 자살 여부를 판정합니다.
pub fn classify(killer_name: &str, victim_name: &str, weapon: &str) -> (String, bool) {
    let marker = SELF_TERMINATION_CAUSES
        .iter()
        .find(|(raw, _)| weapon.trim().eq_ignore_ascii_case(raw))
        .map(|(_, label)| *label);

    match marker {
        Some(label) => (label.to_owned(), true),
        None => (weapon.to_owned(), killer_name == victim_name),
    }
}

/// 파싱된 행을 킬 이벤트로 만듭니다.
pub fn normalize(row: KillRow) -> KillEvent {
    let (weapon, is_suicide) = classify(&row.killer_name, &row.victim_name, &row.weapon);
    KillEvent {
        timestamp: row.timestamp,
        killer_id: row.killer_id,
        killer_name: row.killer_name,
        victim_id: row.victim_id,
        victim_name: row.victim_name,
        weapon,
        distance_meters: coerce_distance(row.distance_meters),
        killer_platform: row.killer_platform,
        victim_platform: row.victim_platform,
        is_suicide,
    }
}

fn coerce_distance(distance: f64) -> f64 {
    if distance.is_finite() && distance >= 0.0 {
        distance
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};

    use super::*;

    fn row(killer: &str, victim: &str, weapon: &str) -> KillRow {
        KillRow {
            timestamp: DateTime::<Utc>::UNIX_EPOCH,
            killer_name: killer.to_owned(),
            killer_id: "1".to_owned(),
            victim_name: victim.to_owned(),
            victim_id: "2".to_owned(),
            weapon: weapon.to_owned(),
            distance_meters: 10.0,
            killer_platform: "STEAM".to_owned(),
            victim_platform: "STEAM".to_owned(),
        }
    }

    #[test]
    fn same_name_is_suicide_with_weapon_unchanged() {
        let event = normalize(row("A", "A", "anything"));
        assert!(event.is_suicide);
        assert_eq!(event.weapon, "anything");
    }

    #[test]
    fn relocation_marker_becomes_menu_suicide() {
        let event = normalize(row("A", "B", "suicide_by_relocation"));
        assert!(event.is_suicide);
        assert_eq!(event.weapon, "Menu Suicide");
    }

    #[test]
    fn pvp_kill_passes_through() {
        let event = normalize(row("A", "B", "AK-74"));
        assert!(!event.is_suicide);
        assert_eq!(event.weapon, "AK-74");
    }

    #[test]
    fn falling_is_a_suicide() {
        for raw in ["falling", "Falling", "FALLING"] {
            let event = normalize(row("A", "B", raw));
            assert!(event.is_suicide, "{raw}");
            assert_eq!(event.weapon, "Falling");
        }
    }

    #[test]
    fn same_name_with_marker_uses_label() {
        let event = normalize(row("Carol", "Carol", "suicide_by_relocation"));
        assert!(event.is_suicide);
        assert_eq!(event.weapon, "Menu Suicide");
    }

    fn renormalize(event: &KillEvent) -> KillEvent {
        let (weapon, is_suicide) =
            classify(&event.killer_name, &event.victim_name, &event.weapon);
        KillEvent {
            weapon,
            is_suicide,
            distance_meters: coerce_distance(event.distance_meters),
            ..event.clone()
        }
    }

    #[test]
    fn normalization_is_idempotent() {
        for (killer, victim, weapon) in [
            ("A", "B", "AK-74"),
            ("A", "A", "M4"),
            ("A", "B", "suicide_by_relocation"),
            ("A", "B", "falling"),
        ] {
            let once = normalize(row(killer, victim, weapon));
            assert_eq!(renormalize(&once), once, "{weapon}");
        }
    }

    #[test]
    fn invalid_distance_is_coerced() {
        let mut raw = row("A", "B", "SKS");
        raw.distance_meters = f64::NAN;
        assert_eq!(normalize(raw).distance_meters, 0.0);
    }
}
