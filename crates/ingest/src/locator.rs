//! 소스 위치 해석: 원격 경로 템플릿과 후보 파일 목록
//!
//! 경로 규칙 (변경 불가):
//! - 서버 로그: `./<host>_<server_id>/Logs/<log_file_name>`
//! - 킬피드: `./<host>_<server_id>/<killfeed_subpath>/**/*.csv`
//!
//! 경로가 없거나 권한이 없으면 "후보 없음"으로 처리하고,
//! 세션 자체의 장애(연결 끊김 등)만 에러로 돌려줍니다.

use std::collections::HashMap;
use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use killfeed_core::config::SourceConfig;
use killfeed_core::types::ArtifactKind;
use tracing::{debug, trace};

use crate::config::SweepConfig;
use crate::error::SessionError;
use crate::session::RemoteSession;

/// 스윕마다 새로 만들어지는 후보 파일
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileCandidate {
    /// 원격 경로
    pub path: String,
    /// 크기 (바이트)
    pub size: u64,
    /// 수정 시각 (서버가 알려 주지 않으면 UNIX epoch)
    pub modified: DateTime<Utc>,
}

impl FileCandidate {
    /// 경로의 마지막 구성 요소
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

/// 원격 경로 해석기
#[derive(Debug, Clone)]
pub struct SourceLocator {
    log_file_name: String,
    killfeed_subpath: String,
    max_scan_depth: usize,
}

impl SourceLocator {
    pub fn new(
        log_file_name: impl Into<String>,
        killfeed_subpath: impl Into<String>,
        max_scan_depth: usize,
    ) -> Self {
        Self {
            log_file_name: log_file_name.into(),
            killfeed_subpath: killfeed_subpath.into().trim_matches('/').to_owned(),
            max_scan_depth,
        }
    }

    pub fn from_config(config: &SweepConfig) -> Self {
        Self::new(
            config.log_file_name.clone(),
            config.killfeed_subpath.clone(),
            config.max_scan_depth,
        )
    }

    /// 서버 로그 경로 `./<host>_<server_id>/Logs/<file>`
    pub fn log_path(&self, source: &SourceConfig) -> String {
        format!("{}/Logs/{}", source.remote_root(), self.log_file_name)
    }

    /// 킬피드 탐색 기준 디렉토리 `./<host>_<server_id>/<subpath>`
    pub fn killfeed_root(&self, source: &SourceConfig) -> String {
        format!("{}/{}", source.remote_root(), self.killfeed_subpath)
    }

    /// 아티팩트 종류별 후보 파일을 나열합니다.
    ///
    /// 킬피드 후보는 파일 이름으로 중복 제거되고 수정 시각 오름차순으로 정렬됩니다.
    pub async fn list_candidates<S: RemoteSession>(
        &self,
        session: &S,
        source: &SourceConfig,
        kind: ArtifactKind,
    ) -> Result<Vec<FileCandidate>, SessionError> {
        match kind {
            ArtifactKind::ServerLog => self.stat_log(session, source).await,
            ArtifactKind::Killfeed => self.scan_killfeed(session, source).await,
        }
    }

    async fn stat_log<S: RemoteSession>(
        &self,
        session: &S,
        source: &SourceConfig,
    ) -> Result<Vec<FileCandidate>, SessionError> {
        let path = self.log_path(source);
        match session.stat(&path).await {
            Ok(stat) if stat.is_dir => {
                debug!(source = %source.id, path = %path, "log path is a directory, ignoring");
                Ok(Vec::new())
            }
            Ok(stat) => Ok(vec![FileCandidate {
                path,
                size: stat.size,
                modified: stat.modified.unwrap_or(DateTime::UNIX_EPOCH),
            }]),
            Err(err) if err.is_missing() => {
                debug!(source = %source.id, path = %path, error = %err, "server log not available");
                Ok(Vec::new())
            }
            Err(err) => Err(err),
        }
    }

    async fn scan_killfeed<S: RemoteSession>(
        &self,
        session: &S,
        source: &SourceConfig,
    ) -> Result<Vec<FileCandidate>, SessionError> {
        let root = self.killfeed_root(source);
        let mut pending = VecDeque::from([(root, 0usize)]);
        let mut by_name: HashMap<String, FileCandidate> = HashMap::new();

        while let Some((dir, depth)) = pending.pop_front() {
            let entries = match session.read_dir(&dir).await {
                Ok(entries) => entries,
                Err(err) if err.is_missing() => {
                    debug!(source = %source.id, dir = %dir, error = %err, "killfeed directory not available");
                    continue;
                }
                Err(err) => return Err(err),
            };

            for entry in entries {
                if entry.stat.is_dir {
                    if depth + 1 < self.max_scan_depth {
                        pending.push_back((entry.path, depth + 1));
                    } else {
                        trace!(source = %source.id, dir = %entry.path, "scan depth limit reached");
                    }
                    continue;
                }
                if !is_csv(entry.file_name()) {
                    continue;
                }

                let candidate = FileCandidate {
                    size: entry.stat.size,
                    modified: entry.stat.modified.unwrap_or(DateTime::UNIX_EPOCH),
                    path: entry.path,
                };
                let name = candidate.file_name().to_owned();
                match by_name.get(&name) {
                    Some(existing) if existing.modified >= candidate.modified => {
                        trace!(
                            source = %source.id,
                            kept = %existing.path,
                            dropped = %candidate.path,
                            "duplicate killfeed file name"
                        );
                    }
                    _ => {
                        by_name.insert(name, candidate);
                    }
                }
            }
        }

        let mut candidates: Vec<FileCandidate> = by_name.into_values().collect();
        sort_by_modified(&mut candidates);
        Ok(candidates)
    }
}

fn is_csv(name: &str) -> bool {
    name.len() > 4
        && name
            .get(name.len() - 4..)
            .is_some_and(|ext| ext.eq_ignore_ascii_case(".csv"))
}

/// 수정 시각 오름차순 (같으면 경로순)으로 정렬합니다.
pub fn sort_by_modified(candidates: &mut [FileCandidate]) {
    candidates.sort_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.path.cmp(&b.path)));
}
