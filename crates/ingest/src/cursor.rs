//! 커서 저장소: 소스별 읽기 위치와 중복 제거 상태
//!
//! - [`OffsetCursor`]: 서버 로그 tail 용 바이트 오프셋 + 마지막으로 본 파일 크기
//! - [`LineSetCursor`]: 킬피드 CSV 용 처리된 줄 식별자 집합
//!
//! 커서는 `(소스, 아티팩트)`마다 하나이며, 오케스트레이터가 싱크에 이벤트를 넘긴 뒤에만
//! 커밋합니다. 같은 키에 대한 동시 변경은 오케스트레이터의 스텝 잠금이 막아 주므로
//! 여기서는 맵 접근만 짧게 보호합니다.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use killfeed_core::types::SourceId;
use xxhash_rust::xxh3::xxh3_64;

use crate::locator::FileCandidate;

/// 킬피드 줄 식별자 (앞뒤 공백을 제거한 줄의 xxh3 해시)
pub fn line_id(line: &str) -> u64 {
    xxh3_64(line.trim().as_bytes())
}

/// 이번 스텝에서 읽을 바이트 구간
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadWindow {
    /// 시작 오프셋 (포함)
    pub start: u64,
    /// 끝 오프셋 (제외)
    pub end: u64,
    /// 로테이션으로 오프셋을 0으로 되돌렸는지
    pub rotated: bool,
    /// 파일 끝까지 읽지 못하고 한도에서 잘렸는지
    pub truncated: bool,
}

impl ReadWindow {
    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 서버 로그 오프셋 커서
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OffsetCursor {
    pub byte_offset: u64,
    pub last_known_size: u64,
}

impl OffsetCursor {
    /// 후보 파일에 대해 읽을 구간을 계산합니다.
    ///
    /// 파일이 마지막으로 본 크기보다 작아졌거나 오프셋이 파일 끝을 넘으면
    /// 로테이션으로 보고 0부터 읽습니다. 한 번에 `max_read` 바이트까지만 읽습니다.
    pub fn window_for(&self, candidate: &FileCandidate, max_read: usize) -> ReadWindow {
        let rotated =
            candidate.size < self.last_known_size || self.byte_offset > candidate.size;
        let start = if rotated { 0 } else { self.byte_offset };
        let end = candidate.size.min(start.saturating_add(max_read as u64));
        ReadWindow {
            start,
            end,
            rotated,
            truncated: end < candidate.size,
        }
    }

    /// 구간 중 `consumed` 바이트를 처리했을 때의 새 커서
    pub fn advanced(window: &ReadWindow, consumed: u64, candidate: &FileCandidate) -> Self {
        Self {
            byte_offset: window.start + consumed.min(window.len()),
            last_known_size: candidate.size,
        }
    }
}

/// 킬피드 줄 식별자 커서
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineSetCursor {
    processed: HashSet<u64>,
    newest_read: Option<DateTime<Utc>>,
}

impl LineSetCursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.processed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processed.is_empty()
    }

    pub fn contains(&self, id: u64) -> bool {
        self.processed.contains(&id)
    }

    /// 마지막으로 읽은 파일 중 가장 늦은 수정 시각
    pub fn newest_read(&self) -> Option<DateTime<Utc>> {
        self.newest_read
    }

    /// 아직 처리하지 않은 항목만 남깁니다. 배치 안의 중복도 첫 항목만 남깁니다.
    pub fn unseen<T>(&self, items: Vec<(u64, T)>) -> Vec<(u64, T)> {
        let mut batch = HashSet::new();
        items
            .into_iter()
            .filter(|(id, _)| !self.processed.contains(id) && batch.insert(*id))
            .collect()
    }

    /// 처리한 식별자를 기록합니다.
    pub fn commit(&mut self, ids: impl IntoIterator<Item = u64>) {
        self.processed.extend(ids);
    }

    /// 읽은 파일의 수정 시각을 기록합니다.
    pub fn mark_read(&mut self, modified: DateTime<Utc>) {
        if self.newest_read.is_none_or(|newest| modified > newest) {
            self.newest_read = Some(modified);
        }
    }

    /// 증분 스윕에서 읽을 파일을 고릅니다 (`candidates`는 수정 시각 오름차순).
    ///
    /// 가장 최근 파일은 항상 포함하고, 이전에 읽은 적이 있으면 그 뒤로 수정된
    /// 파일도 함께 고릅니다. 처음이면 가장 최근 파일만 읽습니다.
    pub fn select_files(&self, candidates: &[FileCandidate]) -> Vec<FileCandidate> {
        let Some(latest) = candidates.last() else {
            return Vec::new();
        };
        match self.newest_read {
            None => vec![latest.clone()],
            Some(mark) => candidates
                .iter()
                .enumerate()
                .filter(|(idx, c)| c.modified >= mark || *idx == candidates.len() - 1)
                .map(|(_, c)| c.clone())
                .collect(),
        }
    }

    /// 다른 커서의 식별자와 수정 시각 표시를 합칩니다.
    pub fn merge(&mut self, other: LineSetCursor) {
        self.processed.extend(other.processed);
        if let Some(mark) = other.newest_read {
            self.mark_read(mark);
        }
    }

    /// 집합이 `max`를 넘으면 `keep`에 있는 식별자만 남깁니다.
    ///
    /// 반환값은 제거된 식별자 수입니다.
    pub fn prune(&mut self, keep: &HashSet<u64>, max: usize) -> usize {
        if self.processed.len() <= max {
            return 0;
        }
        let before = self.processed.len();
        self.processed.retain(|id| keep.contains(id));
        before - self.processed.len()
    }
}

/// 소스별 커서 저장소 (인메모리)
#[derive(Debug, Default)]
pub struct CursorStore {
    offsets: Mutex<HashMap<SourceId, OffsetCursor>>,
    line_sets: Mutex<HashMap<SourceId, LineSetCursor>>,
}

impl CursorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 서버 로그 커서 (없으면 처음부터)
    pub fn offset(&self, source: &SourceId) -> OffsetCursor {
        self.offsets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(source)
            .copied()
            .unwrap_or_default()
    }

    /// 서버 로그 커서를 커밋합니다.
    pub fn commit_offset(&self, source: &SourceId, cursor: OffsetCursor) {
        self.offsets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(source.clone(), cursor);
    }

    /// 킬피드 커서 기준으로 읽을 파일을 고릅니다.
    pub fn select_killfeed_files(
        &self,
        source: &SourceId,
        candidates: &[FileCandidate],
    ) -> Vec<FileCandidate> {
        let line_sets = self.line_sets.lock().unwrap_or_else(PoisonError::into_inner);
        match line_sets.get(source) {
            Some(cursor) => cursor.select_files(candidates),
            None => LineSetCursor::new().select_files(candidates),
        }
    }

    /// 아직 처리하지 않은 줄만 남깁니다.
    pub fn unseen_lines<T>(&self, source: &SourceId, items: Vec<(u64, T)>) -> Vec<(u64, T)> {
        let line_sets = self.line_sets.lock().unwrap_or_else(PoisonError::into_inner);
        match line_sets.get(source) {
            Some(cursor) => cursor.unseen(items),
            None => LineSetCursor::new().unseen(items),
        }
    }

    /// 처리한 줄 식별자를 커밋합니다.
    pub fn commit_lines(&self, source: &SourceId, ids: impl IntoIterator<Item = u64>) {
        self.line_sets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(source.clone())
            .or_default()
            .commit(ids);
    }

    /// 완전히 처리한 파일의 수정 시각을 기록합니다.
    pub fn mark_killfeed_read(&self, source: &SourceId, modified: DateTime<Utc>) {
        self.line_sets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(source.clone())
            .or_default()
            .mark_read(modified);
    }

    /// 킬피드 커서 크기를 제한합니다.
    pub fn prune_lines(&self, source: &SourceId, keep: &HashSet<u64>, max: usize) -> usize {
        self.line_sets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(source)
            .map_or(0, |cursor| cursor.prune(keep, max))
    }

    /// 처리된 킬피드 줄 수
    pub fn tracked_lines(&self, source: &SourceId) -> usize {
        self.line_sets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(source)
            .map_or(0, LineSetCursor::len)
    }

    /// 킬피드 커서를 지웁니다 (리플레이 시작).
    pub fn reset_killfeed(&self, source: &SourceId) {
        self.line_sets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(source);
    }

    /// 킬피드 커서를 통째로 교체합니다 (리플레이 종료).
    pub fn install_killfeed(&self, source: &SourceId, cursor: LineSetCursor) {
        self.line_sets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(source.clone(), cursor);
    }

    /// 기존 킬피드 커서에 합칩니다 (실패한 리플레이).
    pub fn merge_killfeed(&self, source: &SourceId, cursor: LineSetCursor) {
        self.line_sets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(source.clone())
            .or_default()
            .merge(cursor);
    }

    /// 소스의 모든 커서를 제거합니다.
    pub fn forget(&self, source: &SourceId) {
        self.offsets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(source);
        self.reset_killfeed(source);
    }
}
