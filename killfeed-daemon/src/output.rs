//! JSON-lines event output.
//!
//! Drains the ingest service's event channel and writes one JSON object per
//! event to a writer (stdout in production). On shutdown the events already
//! queued in the channel are written before the task exits, so a sweep that
//! finished before the signal is never half-reported.

use std::io::Write;

use anyhow::Result;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use killfeed_core::event::{Event, IngestEvent};

/// Spawn the event writer task.
///
/// The task ends when the shutdown signal arrives (after draining), when the
/// channel closes, or on the first write error. Dropping the receiver on a
/// write error makes the sink report `Closed`, which stops further sweeps.
///
/// Returns the number of events written.
pub fn spawn_event_writer<W>(
    mut event_rx: mpsc::Receiver<IngestEvent>,
    mut writer: W,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> JoinHandle<u64>
where
    W: Write + Send + 'static,
{
    tokio::spawn(async move {
        let mut written = 0u64;

        loop {
            tokio::select! {
                event = event_rx.recv() => {
                    let Some(event) = event else {
                        tracing::debug!("event channel closed, exiting writer");
                        break;
                    };
                    if let Err(e) = write_event(&mut writer, &event) {
                        tracing::error!(event_id = %event.event_id(), error = %e, "failed to write event, stopping output");
                        return written;
                    }
                    written += 1;
                }
                _ = shutdown_rx.recv() => {
                    while let Ok(event) = event_rx.try_recv() {
                        if let Err(e) = write_event(&mut writer, &event) {
                            tracing::error!(error = %e, "failed to write event during drain");
                            break;
                        }
                        written += 1;
                    }
                    tracing::debug!(written, "event writer shutting down");
                    break;
                }
            }
        }

        if let Err(e) = writer.flush() {
            tracing::warn!(error = %e, "failed to flush event output");
        }
        written
    })
}

/// Serialize one event as a single JSON line.
pub fn write_event<W: Write>(writer: &mut W, event: &IngestEvent) -> Result<()> {
    serde_json::to_writer(&mut *writer, event)?;
    writer.write_all(b"\n")?;
    tracing::trace!(event_id = %event.event_id(), event_type = event.event_type(), "event written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use killfeed_core::event::EventPayload;
    use killfeed_core::types::{PresenceSnapshot, SourceId};

    use super::*;

    /// Cloneable in-memory writer.
    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl SharedBuf {
        fn lines(&self) -> Vec<String> {
            String::from_utf8(self.0.lock().unwrap().clone())
                .unwrap()
                .lines()
                .map(str::to_owned)
                .collect()
        }
    }

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
            Err(std::io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn presence(current: usize) -> IngestEvent {
        IngestEvent::new(
            SourceId::from("eu-1"),
            EventPayload::Presence(PresenceSnapshot {
                current,
                max: 50,
                queued: 0,
            }),
        )
    }

    #[tokio::test]
    async fn writes_one_json_object_per_line() {
        // Given
        let (tx, rx) = mpsc::channel(8);
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let buf = SharedBuf::default();
        let task = spawn_event_writer(rx, buf.clone(), shutdown_rx);

        // When
        tx.send(presence(1)).await.unwrap();
        tx.send(presence(2)).await.unwrap();
        drop(tx);
        let written = task.await.unwrap();

        // Then
        assert_eq!(written, 2);
        let lines = buf.lines();
        assert_eq!(lines.len(), 2);
        let first: IngestEvent = serde_json::from_str(&lines[0]).unwrap();
        assert!(matches!(first.payload, EventPayload::Presence(s) if s.current == 1));
    }

    #[tokio::test]
    async fn shutdown_drains_queued_events() {
        // Given: events queued before the writer ever runs
        let (tx, rx) = mpsc::channel(8);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        for i in 0..3 {
            tx.send(presence(i)).await.unwrap();
        }
        shutdown_tx.send(()).unwrap();
        let buf = SharedBuf::default();

        // When
        let task = spawn_event_writer(rx, buf.clone(), shutdown_rx);
        let written = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();

        // Then
        assert_eq!(written, 3);
        assert_eq!(buf.lines().len(), 3);
    }

    #[tokio::test]
    async fn write_error_closes_the_channel() {
        let (tx, rx) = mpsc::channel(8);
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let task = spawn_event_writer(rx, BrokenPipe, shutdown_rx);

        tx.send(presence(1)).await.unwrap();
        let written = task.await.unwrap();

        assert_eq!(written, 0);
        assert!(tx.is_closed());
    }
}
