//! 줄 파서: 킬피드 CSV 행과 서버 로그 줄의 두 가지 문법
//!
//! 두 파서 모두 줄 하나의 실패가 배치 전체를 멈추지 않도록 결과를 값으로 돌려줍니다.
//! - [`KillfeedParser`]: 위치 기반 세미콜론 구분 필드 → [`KillRowOutcome`]
//! - [`ServerLogParser`]: 순서가 있는 `(패턴, 생성자)` 목록 → `Option<LogEvent>`

pub mod killfeed;
pub mod server_log;

pub use killfeed::{KillRow, KillRowOutcome, KillfeedParser, MalformedRow};
pub use server_log::{LinePattern, ServerLogParser};
