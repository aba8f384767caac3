//! 킬피드 CSV 행 파서
//!
//! # 행 형식
//! ```text
//! timestamp;killerName;killerId;victimName;victimId;weaponOrCause;distance;killerPlatform;victimPlatform
//! ```
//!
//! - 세미콜론 구분, 헤더 없음. 9개 미만이면 잘못된 행입니다 (초과 필드는 무시).
//! - 타임스탬프는 `YYYY.MM.DD-HH.MM.SS` (UTC), 실패하면 ISO-8601을 시도합니다.
//! - 거리는 숫자가 아니면 0.0으로 강제 변환합니다.
//!
//! 잘못된 행은 에러가 아니라 [`KillRowOutcome::Malformed`] 값으로 돌려주므로
//! 배치의 나머지 행 처리에 영향을 주지 않습니다.

use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::config::EmptyNamePolicy;

/// 킬피드 행의 필드 수
pub const KILL_ROW_FIELDS: usize = 9;

const PRIMARY_TIMESTAMP_FORMAT: &str = "%Y.%m.%d-%H.%M.%S";
const ISO_NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// 정규화 전의 킬피드 행
#[derive(Debug, Clone, PartialEq)]
pub struct KillRow {
    pub timestamp: DateTime<Utc>,
    pub killer_name: String,
    pub killer_id: String,
    pub victim_name: String,
    pub victim_id: String,
    pub weapon: String,
    pub distance_meters: f64,
    pub killer_platform: String,
    pub victim_platform: String,
}

/// 잘못된 행 사유
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MalformedRow {
    /// 필드 수 부족
    FieldCount { found: usize },
    /// 타임스탬프 해석 실패
    Timestamp { value: String },
    /// 가해자 또는 피해자 이름이 비어 있음
    EmptyName,
}

impl MalformedRow {
    /// 메트릭 레이블
    pub fn label(&self) -> &'static str {
        match self {
            Self::FieldCount { .. } => "field_count",
            Self::Timestamp { .. } => "timestamp",
            Self::EmptyName => "empty_name",
        }
    }
}

impl fmt::Display for MalformedRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FieldCount { found } => {
                write!(f, "expected {KILL_ROW_FIELDS} fields, found {found}")
            }
            Self::Timestamp { value } => write!(f, "unparseable timestamp '{value}'"),
            Self::EmptyName => f.write_str("empty killer or victim name"),
        }
    }
}

/// 행 파싱 결과
#[derive(Debug, Clone, PartialEq)]
pub enum KillRowOutcome {
    Parsed(KillRow),
    Malformed(MalformedRow),
}

impl KillRowOutcome {
    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::Malformed(_))
    }
}

/// 킬피드 행 파서
#[derive(Debug, Clone, Copy, Default)]
pub struct KillfeedParser {
    empty_name_policy: EmptyNamePolicy,
}

impl KillfeedParser {
    pub fn new(empty_name_policy: EmptyNamePolicy) -> Self {
        Self { empty_name_policy }
    }

    /// 한 행을 파싱합니다.
    pub fn parse(&self, line: &str) -> KillRowOutcome {
        let fields: Vec<&str> = line.trim().split(';').map(str::trim).collect();
        if fields.len() < KILL_ROW_FIELDS {
            return KillRowOutcome::Malformed(MalformedRow::FieldCount {
                found: fields.len(),
            });
        }

        let Some(timestamp) = parse_timestamp(fields[0]) else {
            return KillRowOutcome::Malformed(MalformedRow::Timestamp {
                value: fields[0].to_owned(),
            });
        };

        let (killer_name, victim_name) =
            match self.resolve_names(fields[1], fields[2], fields[3], fields[4]) {
                Some(names) => names,
                None => return KillRowOutcome::Malformed(MalformedRow::EmptyName),
            };

        KillRowOutcome::Parsed(KillRow {
            timestamp,
            killer_name,
            killer_id: fields[2].to_owned(),
            victim_name,
            victim_id: fields[4].to_owned(),
            weapon: fields[5].to_owned(),
            distance_meters: parse_distance(fields[6]),
            killer_platform: fields[7].to_owned(),
            victim_platform: fields[8].to_owned(),
        })
    }

    /// 빈 이름 정책을 적용합니다. 행을 버려야 하면 `None`.
    fn resolve_names(
        &self,
        killer_name: &str,
        killer_id: &str,
        victim_name: &str,
        victim_id: &str,
    ) -> Option<(String, String)> {
        match (killer_name.is_empty(), victim_name.is_empty()) {
            (false, false) => Some((killer_name.to_owned(), victim_name.to_owned())),
            (true, true) => None,
            (killer_empty, _) => {
                let self_inflicted = !killer_id.is_empty() && killer_id == victim_id;
                if self.empty_name_policy != EmptyNamePolicy::FillFromCounterpart
                    || !self_inflicted
                {
                    return None;
                }
                let known = if killer_empty { victim_name } else { killer_name };
                Some((known.to_owned(), known.to_owned()))
            }
        }
    }
}

/// 킬피드 타임스탬프를 UTC로 해석합니다.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, PRIMARY_TIMESTAMP_FORMAT) {
        return Some(naive.and_utc());
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    ISO_NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// 거리 필드. 숫자가 아니거나 음수, 무한대이면 0.0입니다.
pub fn parse_distance(value: &str) -> f64 {
    value
        .parse::<f64>()
        .ok()
        .filter(|d| d.is_finite() && *d >= 0.0)
        .unwrap_or(0.0)
}
