//! 접속 현황 추적기
//!
//! 서버 로그 이벤트만으로 소스별 접속/대기 플레이어 집합과 최대 인원을 유지합니다.
//!
//! | 이벤트 | 전이 |
//! |---|---|
//! | `PlayerQueued` | 대기열에 추가 |
//! | `PlayerJoined` | 대기열에서 제거, 접속 집합에 추가 (새 접속이면 플레이 세션 시작) |
//! | `PlayerDisconnected` | 접속/대기열에서 제거 (접속 중이었으면 플레이 세션 종료) |
//! | `PlayerJoinFailed` | 대기열에서만 제거 |
//! | `MaxCapacityReport` | 최대 인원 덮어쓰기 |
//!
//! 변경 후 스냅샷이 직전에 방출한 것과 다를 때만 방출합니다.
//! 모든 전이는 집합 연산이므로 같은 줄을 다시 적용해도 상태가 같습니다.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use killfeed_core::types::{LogEvent, LogEventKind, PlaytimeSession, PresenceSnapshot, SourceId};

/// 이벤트 하나를 적용한 결과
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresenceUpdate {
    /// 바뀐 스냅샷 (바뀌지 않았으면 `None`)
    pub snapshot: Option<PresenceSnapshot>,
    /// 플레이 세션 경계
    pub playtime: Option<PlaytimeSession>,
}

/// 소스 하나의 접속 현황
#[derive(Debug, Clone)]
pub struct PresenceState {
    max_capacity: u32,
    online: HashMap<String, DateTime<Utc>>,
    queued: BTreeSet<String>,
    last_emitted: Option<PresenceSnapshot>,
}

impl PresenceState {
    pub fn new(default_max: u32) -> Self {
        Self {
            max_capacity: default_max,
            online: HashMap::new(),
            queued: BTreeSet::new(),
            last_emitted: None,
        }
    }

    pub fn snapshot(&self) -> PresenceSnapshot {
        PresenceSnapshot {
            current: self.online.len(),
            max: self.max_capacity,
            queued: self.queued.len(),
        }
    }

    #[cfg(test)]
    fn is_online(&self, player: &str) -> bool {
        self.online.contains_key(player)
    }

    #[cfg(test)]
    fn is_queued(&self, player: &str) -> bool {
        self.queued.contains(player)
    }

    /// 로그 이벤트 하나를 적용합니다.
    pub fn apply(&mut self, event: &LogEvent) -> PresenceUpdate {
        let at = event.timestamp;
        let playtime = match &event.kind {
            LogEventKind::PlayerQueued { player, .. } => {
                self.queued.insert(player.clone());
                None
            }
            LogEventKind::PlayerJoined { player, .. } => {
                self.queued.remove(player);
                if self.online.contains_key(player) {
                    None
                } else {
                    self.online.insert(player.clone(), at);
                    Some(PlaytimeSession::Started {
                        player: player.clone(),
                        at,
                    })
                }
            }
            LogEventKind::PlayerDisconnected { player } => {
                self.queued.remove(player);
                self.online
                    .remove(player)
                    .map(|joined_at| PlaytimeSession::Ended {
                        player: player.clone(),
                        joined_at,
                        at,
                    })
            }
            LogEventKind::PlayerJoinFailed { player } => {
                self.queued.remove(player);
                None
            }
            LogEventKind::MaxCapacityReport { max_players } => {
                self.max_capacity = *max_players;
                None
            }
            _ => return PresenceUpdate::default(),
        };

        let snapshot = self.snapshot();
        let changed = self.last_emitted != Some(snapshot);
        if changed {
            self.last_emitted = Some(snapshot);
        }
        PresenceUpdate {
            snapshot: changed.then_some(snapshot),
            playtime,
        }
    }
}

/// 소스별 접속 현황 추적기
#[derive(Debug)]
pub struct PresenceTracker {
    default_max: u32,
    states: Mutex<HashMap<SourceId, PresenceState>>,
}

impl PresenceTracker {
    pub fn new(default_max: u32) -> Self {
        Self {
            default_max,
            states: Mutex::new(HashMap::new()),
        }
    }

    /// 소스의 상태에 로그 이벤트를 적용합니다.
    pub fn apply(&self, source: &SourceId, event: &LogEvent) -> PresenceUpdate {
        if !event.kind.affects_presence() {
            return PresenceUpdate::default();
        }
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(source.clone())
            .or_insert_with(|| PresenceState::new(self.default_max))
            .apply(event)
    }

    /// 현재 스냅샷 (이벤트를 한 번도 받지 않은 소스는 `None`)
    pub fn snapshot(&self, source: &SourceId) -> Option<PresenceSnapshot> {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(source)
            .map(PresenceState::snapshot)
    }

    /// 직전 방출 기록을 지웁니다. 싱크가 스냅샷을 받지 못했을 때 다음 변경에서 다시 방출되게 합니다.
    pub fn invalidate_emitted(&self, source: &SourceId) {
        if let Some(state) = self
            .states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(source)
        {
            state.last_emitted = None;
        }
    }

    pub fn forget(&self, source: &SourceId) {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(source);
    }
}
