//! Host-side buffer receiving captured steps

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::RecplayResult;
use crate::session::{now_millis, CapturedAction, Step};

#[derive(Debug)]
struct BufferState {
    session_id: String,
    steps: Vec<Step>,
}

/// Append-only step buffer shared between the recording controller and the
/// bridge that delivers in-page events.
///
/// Every append happens under one lock: the step's index, timestamp and
/// screenshot name are assigned and the step pushed in a single critical
/// section, so concurrent bridge calls never interleave and timestamps are
/// non-decreasing in buffer order.
#[derive(Debug, Clone)]
pub struct StepBuffer {
    inner: Arc<Mutex<BufferState>>,
}

impl StepBuffer {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(BufferState {
                session_id: session_id.into(),
                steps: Vec::new(),
            })),
        }
    }

    /// Append an action stamped with the current time
    pub fn push(&self, action: CapturedAction) -> Step {
        self.push_at(action, now_millis())
    }

    /// Append an action with an explicit capture time. A time earlier than the
    /// previous step is raised to the previous step's time.
    pub fn push_at(&self, action: CapturedAction, timestamp: i64) -> Step {
        let mut state = self.inner.lock();
        let timestamp = state
            .steps
            .last()
            .map(|last| timestamp.max(last.timestamp))
            .unwrap_or(timestamp);
        let index = state.steps.len() + 1;
        let step = action.into_step(&state.session_id, index, timestamp);
        state.steps.push(step.clone());
        drop(state);

        debug!("Captured step {}: {}", index, step.label());
        step
    }

    /// Append a raw bridge payload
    pub fn push_payload(&self, payload: serde_json::Value) -> RecplayResult<Step> {
        let action: CapturedAction = serde_json::from_value(payload).map_err(|e| {
            warn!("Dropping malformed bridge payload: {}", e);
            e
        })?;
        Ok(self.push(action))
    }

    pub fn len(&self) -> usize {
        self.inner.lock().steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the steps captured so far
    pub fn snapshot(&self) -> Vec<Step> {
        self.inner.lock().steps.clone()
    }

    /// Take every buffered step, leaving the buffer empty
    pub fn drain(&self) -> Vec<Step> {
        std::mem::take(&mut self.inner.lock().steps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::StepKind;

    fn click(selector: &str) -> CapturedAction {
        CapturedAction::Click {
            selector: selector.to_string(),
            text: None,
        }
    }

    #[test]
    fn test_push_assigns_index_and_screenshot() {
        let buffer = StepBuffer::new("s1");
        buffer.push(click("#a"));
        let second = buffer.push(CapturedAction::Navigation {
            url: "https://example.com/next".to_string(),
        });

        assert_eq!(buffer.len(), 2);
        assert_eq!(second.kind, StepKind::Navigation);
        assert_eq!(second.screenshot.as_deref(), Some("s1_step2_nav.png"));
    }

    #[test]
    fn test_timestamps_never_go_backwards() {
        let buffer = StepBuffer::new("s1");
        buffer.push_at(click("#a"), 2_000);
        let late = buffer.push_at(click("#b"), 1_500);
        assert_eq!(late.timestamp, 2_000);
    }

    #[test]
    fn test_concurrent_pushes_are_serialized() {
        let buffer = StepBuffer::new("burst");
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let buffer = buffer.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        buffer.push(click(&format!("#t{}-{}", t, i)));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let steps = buffer.snapshot();
        assert_eq!(steps.len(), 400);
        for (i, pair) in steps.windows(2).enumerate() {
            assert!(pair[0].timestamp <= pair[1].timestamp);
            assert_eq!(
                pair[0].screenshot.as_deref(),
                Some(format!("burst_step{}_click.png", i + 1).as_str())
            );
        }
    }

    #[test]
    fn test_push_payload() {
        let buffer = StepBuffer::new("s1");
        let step = buffer
            .push_payload(serde_json::json!({"type": "input", "selector": "#user", "value": "alice"}))
            .unwrap();
        assert_eq!(step.value.as_deref(), Some("alice"));

        assert!(buffer
            .push_payload(serde_json::json!({"type": "scroll"}))
            .is_err());
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_drain_empties_buffer() {
        let buffer = StepBuffer::new("s1");
        buffer.push(click("#a"));
        assert_eq!(buffer.drain().len(), 1);
        assert!(buffer.is_empty());
    }
}
