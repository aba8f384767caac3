//! 서버 로그 줄 파서
//!
//! 모든 구조적 줄은 `[YYYY.MM.DD-HH.MM.SS:mmm]` 타임스탬프로 시작하며,
//! 엔진이 붙이는 프레임 번호(`[123]`)가 뒤따를 수 있습니다. 타임스탬프 뒤의 본문에
//! 등록된 [`LinePattern`]을 순서대로 적용하여 처음 성공한 결과를 돌려줍니다.
//!
//! 캡처 값 변환(좌표, 숫자)에 실패한 패턴은 그 패턴만 실패한 것으로 보고 다음 패턴으로
//! 넘어갑니다. 어떤 패턴에도 맞지 않는 줄은 조용히 무시합니다.
//!
//! # 사용 예시
//! ```ignore
//! use killfeed_ingest::parser::ServerLogParser;
//!
//! let parser = ServerLogParser::with_defaults()?;
//! let event = parser.parse("[2025.05.17-14.30.00:001] Server startup with playersmaxcount=50");
//! ```

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use killfeed_core::types::{Coordinates, LogEvent, LogEventKind};
use regex::{Captures, Regex};
use tracing::trace;

use crate::error::IngestError;

const TIMESTAMP_PATTERN: &str = r"^\s*\[(\d{4})\.(\d{2})\.(\d{2})-(\d{2})\.(\d{2})\.(\d{2}):(\d{3})\](?:\[\s*\d+\])?\s*(.*)$";

/// 본문 캡처에서 이벤트를 만드는 함수. 변환에 실패하면 `None`.
pub type BuildFn = fn(&Captures<'_>) -> Option<LogEventKind>;

/// `(패턴, 생성자)` 한 쌍
pub struct LinePattern {
    name: &'static str,
    regex: Regex,
    build: BuildFn,
}

impl LinePattern {
    /// 패턴을 컴파일합니다.
    pub fn new(name: &'static str, pattern: &str, build: BuildFn) -> Result<Self, IngestError> {
        Ok(Self {
            name,
            regex: Regex::new(pattern)?,
            build,
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    fn apply(&self, body: &str) -> Option<LogEventKind> {
        let caps = self.regex.captures(body)?;
        (self.build)(&caps)
    }
}

impl fmt::Debug for LinePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinePattern")
            .field("name", &self.name)
            .field("regex", &self.regex.as_str())
            .finish()
    }
}

/// 서버 로그 파서
#[derive(Debug)]
pub struct ServerLogParser {
    timestamp: Regex,
    patterns: Vec<LinePattern>,
}

impl ServerLogParser {
    /// 패턴이 없는 파서를 만듭니다.
    pub fn new() -> Result<Self, IngestError> {
        Ok(Self {
            timestamp: Regex::new(TIMESTAMP_PATTERN)?,
            patterns: Vec::new(),
        })
    }

    /// 기본 문법 전체를 등록한 파서를 만듭니다.
    pub fn with_defaults() -> Result<Self, IngestError> {
        let mut parser = Self::new()?;
        parser.patterns = default_patterns()?;
        Ok(parser)
    }

    /// 패턴을 목록 끝에 추가합니다.
    pub fn register(mut self, pattern: LinePattern) -> Self {
        self.patterns.push(pattern);
        self
    }

    /// 등록 순서대로 패턴 이름을 돌려줍니다.
    pub fn pattern_names(&self) -> Vec<&'static str> {
        self.patterns.iter().map(LinePattern::name).collect()
    }

    /// 한 줄을 파싱합니다. 맞는 패턴이 없으면 `None`.
    pub fn parse(&self, line: &str) -> Option<LogEvent> {
        let caps = self.timestamp.captures(line)?;
        let timestamp = timestamp_from(&caps)?;
        let body = caps.get(8).map_or("", |m| m.as_str()).trim_end();

        self.patterns.iter().find_map(|pattern| {
            let kind = pattern.apply(body)?;
            trace!(pattern = pattern.name, event = kind.name(), "log line matched");
            Some(LogEvent::new(timestamp, kind))
        })
    }
}

fn timestamp_from(caps: &Captures<'_>) -> Option<DateTime<Utc>> {
    let num = |idx: usize| caps.get(idx)?.as_str().parse::<u32>().ok();
    let year = i32::try_from(num(1)?).ok()?;
    NaiveDate::from_ymd_opt(year, num(2)?, num(3)?)?
        .and_hms_milli_opt(num(4)?, num(5)?, num(6)?, num(7)?)
        .map(|naive| naive.and_utc())
}

fn text(caps: &Captures<'_>, name: &str) -> Option<String> {
    let value = caps.name(name)?.as_str().trim();
    (!value.is_empty()).then(|| value.to_owned())
}

fn number(caps: &Captures<'_>, name: &str) -> Option<u32> {
    caps.name(name)?.as_str().parse().ok()
}

/// 좌표 쌍. 둘 다 없으면 `Some(None)`, 있는데 해석할 수 없으면 `None`.
fn optional_coordinates(caps: &Captures<'_>) -> Option<Option<Coordinates>> {
    match (caps.name("x"), caps.name("y")) {
        (Some(x), Some(y)) => {
            let x = x.as_str().parse::<f64>().ok().filter(|v| v.is_finite())?;
            let y = y.as_str().parse::<f64>().ok().filter(|v| v.is_finite())?;
            Some(Some(Coordinates { x, y }))
        }
        (None, None) => Some(None),
        _ => None,
    }
}

fn coordinates(caps: &Captures<'_>) -> Option<Coordinates> {
    optional_coordinates(caps).flatten()
}

/// 약어로 표기하는 단어
const ACRONYMS: &[&str] = &["vip"];

/// `convoy_escort` 같은 내부 이름을 표시용 이름(`Convoy Escort`)으로 바꿉니다.
pub fn display_name(raw: &str) -> String {
    raw.split(|c: char| c == '_' || c.is_whitespace())
        .filter(|word| !word.is_empty())
        .map(|word| {
            let lower = word.to_lowercase();
            if ACRONYMS.contains(&lower.as_str()) {
                return lower.to_uppercase();
            }
            let mut chars = lower.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

const COORDS: &str = r"X=(?P<x>-?[0-9.]+)\s*,?\s*Y=(?P<y>-?[0-9.]+)";

fn default_patterns() -> Result<Vec<LinePattern>, IngestError> {
    Ok(vec![
        LinePattern::new(
            "player_joined",
            r"LogOnline:\s*Login:\s*UniqueId:\s*(?P<player>[^,]+?)\s*,\s*PlatformId:\s*(?P<platform>[^\s,]+)",
            |caps| {
                Some(LogEventKind::PlayerJoined {
                    player: text(caps, "player")?,
                    platform_id: text(caps, "platform")?,
                })
            },
        )?,
        LinePattern::new(
            "player_disconnected",
            r"LogOnline:\s*Logout:\s*UniqueId:\s*(?P<player>[^,]+?)\s*(?:,|$)",
            |caps| {
                Some(LogEventKind::PlayerDisconnected {
                    player: text(caps, "player")?,
                })
            },
        )?,
        LinePattern::new(
            "player_queued",
            r"\bPlayer\s+(?P<player>\S+)\s+queued at position\s+(?P<position>\d+)",
            |caps| {
                Some(LogEventKind::PlayerQueued {
                    player: text(caps, "player")?,
                    position: number(caps, "position")?,
                })
            },
        )?,
        LinePattern::new(
            "player_join_failed",
            r"(?i)\bPlayer\s+(?P<player>\S+)\s+connection\s+(?:failed|timeout|timed\s*out)",
            |caps| {
                Some(LogEventKind::PlayerJoinFailed {
                    player: text(caps, "player")?,
                })
            },
        )?,
        LinePattern::new(
            "max_capacity",
            r"(?i)playersmaxcount\s*=\s*(?P<max>\d+)",
            |caps| {
                Some(LogEventKind::MaxCapacityReport {
                    max_players: number(caps, "max")?,
                })
            },
        )?,
        LinePattern::new(
            "queue_size",
            r"(?i)\bqueue\s+size\s*[:=]?\s*(?P<size>\d+)",
            |caps| {
                Some(LogEventKind::QueueSizeReport {
                    size: number(caps, "size")?,
                })
            },
        )?,
        LinePattern::new(
            "airdrop_flying",
            &format!(r"(?i)Airdrop:?\s+Flying\s+to\s+location\s+{COORDS}"),
            |caps| {
                Some(LogEventKind::AirdropFlying {
                    location: coordinates(caps)?,
                })
            },
        )?,
        LinePattern::new(
            "mission_started",
            &format!(
                r"Mission:\s*(?P<kind>[A-Za-z0-9_]+)\s+Level\s+(?P<level>\d+)\s+started(?:\s+at\s+coordinates\s+{COORDS})?"
            ),
            |caps| {
                Some(LogEventKind::MissionStarted {
                    mission: display_name(&text(caps, "kind")?),
                    level: number(caps, "level")?,
                    location: optional_coordinates(caps)?,
                })
            },
        )?,
        LinePattern::new(
            "trader_spawned",
            &format!(r"Trader:\s*(?P<kind>[A-Za-z0-9_]+)\s+spawned(?:\s+at\s+location\s+{COORDS})?"),
            |caps| {
                Some(LogEventKind::TraderSpawned {
                    trader: display_name(&text(caps, "kind")?),
                    location: optional_coordinates(caps)?,
                })
            },
        )?,
        LinePattern::new(
            "helicopter_crash",
            &format!(r"(?i)Helicopter\s+crash.*?{COORDS}"),
            |caps| {
                Some(LogEventKind::HelicopterCrash {
                    location: coordinates(caps)?,
                })
            },
        )?,
        LinePattern::new(
            "server_fatal_error",
            r"(?i)(?P<message>(?:Fatal error|Assertion failed|Access violation).*)$",
            |caps| {
                Some(LogEventKind::ServerFatalError {
                    message: text(caps, "message")?,
                })
            },
        )?,
        LinePattern::new(
            "server_restart",
            r"(?i)(?P<message>\bServer\b.*\b(?:restart|restarting|shutdown|shutting down)\b.*)$",
            |caps| {
                Some(LogEventKind::ServerRestart {
                    message: text(caps, "message")?,
                })
            },
        )?,
    ])
}
