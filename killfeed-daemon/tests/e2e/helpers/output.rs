//! Capturing the JSON-lines output.

use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use killfeed_core::event::{EventPayload, IngestEvent};
use killfeed_core::types::KillEvent;

/// In-memory writer shared between the daemon's writer task and the test.
#[derive(Clone, Default)]
pub struct CapturedOutput(Arc<Mutex<Vec<u8>>>);

impl CapturedOutput {
    /// Every complete line written so far, parsed as an event.
    pub fn events(&self) -> Vec<IngestEvent> {
        let mut bytes = self.0.lock().unwrap_or_else(PoisonError::into_inner).clone();
        // the writer task may be mid-line
        let complete = bytes.iter().rposition(|&b| b == b'\n').map_or(0, |i| i + 1);
        bytes.truncate(complete);
        String::from_utf8(bytes)
            .expect("output should be UTF-8")
            .lines()
            .map(|line| serde_json::from_str(line).expect("each line should be one event"))
            .collect()
    }

    pub fn kills(&self) -> Vec<KillEvent> {
        self.events()
            .into_iter()
            .filter_map(|e| match e.payload {
                EventPayload::Kill(kill) => Some(kill),
                _ => None,
            })
            .collect()
    }

    /// Poll until `predicate` holds for the captured events.
    pub async fn wait_for<F>(&self, timeout: Duration, predicate: F) -> Vec<IngestEvent>
    where
        F: Fn(&[IngestEvent]) -> bool,
    {
        tokio::time::timeout(timeout, async {
            loop {
                let events = self.events();
                if predicate(&events) {
                    return events;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("expected events did not arrive in time")
    }
}

impl Write for CapturedOutput {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
