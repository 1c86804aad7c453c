//! Link frames and the simulated backend state.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// One text frame on the link, in either direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl Frame {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrainingState {
    Idle,
    Training,
}

#[derive(Debug)]
pub struct Backend {
    pub stream_available: bool,
    pub training: TrainingState,
    pub trials: u32,
}

impl Default for Backend {
    fn default() -> Self {
        Self {
            stream_available: true,
            training: TrainingState::Idle,
            trials: 0,
        }
    }
}

impl Backend {
    /// Apply one inbound frame; returns the frames to send back.
    pub fn handle(&mut self, frame: &Frame) -> Vec<Frame> {
        match frame.event.as_str() {
            "req:eeg-stream-availability" => vec![self.availability()],
            "set-training-btn-state" => {
                let next = match training_value(&frame.data) {
                    Some("start") => TrainingState::Training,
                    Some("stop") => TrainingState::Idle,
                    _ => return Vec::new(),
                };
                if next == TrainingState::Training && self.training == TrainingState::Idle {
                    self.trials += 1;
                }
                self.training = next;
                vec![self.training_status()]
            }
            other => {
                tracing::debug!("Unhandled event {}", other);
                Vec::new()
            }
        }
    }

    pub fn availability(&self) -> Frame {
        Frame::new(
            "eeg-stream-availability-updated",
            json!({ "value": self.stream_available }),
        )
    }

    pub fn training_status(&self) -> Frame {
        Frame::new(
            "training-status-changed",
            json!({ "state": self.training, "trials": self.trials }),
        )
    }
}

/// The UI sends either a bare string or `{"value": ...}`.
fn training_value(data: &Value) -> Option<&str> {
    data.as_str()
        .or_else(|| data.get("value").and_then(Value::as_str))
        .or_else(|| data.get("state").and_then(Value::as_str))
}
