//! 채널 싱크: 수집 결과를 `tokio::mpsc` 채널로 내보냅니다.
//!
//! 모든 이벤트는 [`IngestEvent`] 봉투에 담기며, 가장 최근에 시작된 스윕의
//! 추적 ID를 공유합니다. 채널은 bounded이므로 소비자가 느리면 수집기가 기다립니다.

use std::sync::{PoisonError, RwLock};

use killfeed_core::error::SinkError;
use killfeed_core::event::{EventPayload, IngestEvent};
use killfeed_core::pipeline::EventSink;
use killfeed_core::types::{KillEvent, LogEvent, PlaytimeSession, PresenceSnapshot, SourceId};
use tokio::sync::mpsc;

/// `mpsc` 채널로 이벤트를 보내는 싱크
#[derive(Debug)]
pub struct ChannelSink {
    tx: mpsc::Sender<IngestEvent>,
    trace_id: RwLock<Option<String>>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<IngestEvent>) -> Self {
        Self {
            tx,
            trace_id: RwLock::new(None),
        }
    }

    /// 용량 `capacity`의 채널과 함께 싱크를 만듭니다.
    pub fn with_capacity(capacity: usize) -> (Self, mpsc::Receiver<IngestEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    async fn send(&self, source: &SourceId, payload: EventPayload) -> Result<(), SinkError> {
        let trace_id = self
            .trace_id
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let event = match trace_id {
            Some(trace_id) => IngestEvent::with_trace(source.clone(), payload, trace_id),
            None => IngestEvent::new(source.clone(), payload),
        };
        self.tx.send(event).await.map_err(|_| SinkError::Closed)
    }
}

impl EventSink for ChannelSink {
    fn on_sweep_started(&self, trace_id: &str) {
        *self.trace_id.write().unwrap_or_else(PoisonError::into_inner) = Some(trace_id.to_owned());
    }

    async fn on_kill_event(&self, source: &SourceId, event: KillEvent) -> Result<(), SinkError> {
        self.send(source, EventPayload::Kill(event)).await
    }

    async fn on_log_event(&self, source: &SourceId, event: LogEvent) -> Result<(), SinkError> {
        self.send(source, EventPayload::Log(event)).await
    }

    async fn on_presence_changed(
        &self,
        source: &SourceId,
        snapshot: PresenceSnapshot,
    ) -> Result<(), SinkError> {
        self.send(source, EventPayload::Presence(snapshot)).await
    }

    async fn on_playtime_session(
        &self,
        source: &SourceId,
        session: PlaytimeSession,
    ) -> Result<(), SinkError> {
        self.send(source, EventPayload::Playtime(session)).await
    }
}
