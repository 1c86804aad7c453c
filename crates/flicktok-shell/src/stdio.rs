//! Line-oriented driver for the headless toolkit.
//!
//! Each stdin line is a JSON envelope sent by a surface's UI layer. An
//! optional `"origin"` field names the sending surface (`host` when absent).
//! Two pseudo ids stand in for window events: `resize` with
//! `{"width", "height"}` and `close`. Messages the shell posts to a surface
//! are printed to stdout as `{"surface", "id", "data"}` lines.

use crate::backend::Posted;
use crate::event::{EventSender, ShellEvent};
use flicktok_core::{ContentSize, SurfaceKind};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

const RESIZE: &str = "resize";
const CLOSE: &str = "close";

#[derive(Deserialize)]
struct Resize {
    width: u32,
    height: u32,
}

/// Turn one input line into a shell event. Blank and unreadable lines give
/// `None`.
pub fn parse_line(line: &str) -> Option<ShellEvent> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let mut value: Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!("Ignoring unreadable input line: {}", e);
            return None;
        }
    };

    let origin = match value.as_object_mut().and_then(|o| o.remove("origin")) {
        None => SurfaceKind::Host,
        Some(origin) => match serde_json::from_value(origin) {
            Ok(origin) => origin,
            Err(e) => {
                tracing::warn!("Ignoring input with unknown origin: {}", e);
                return None;
            }
        },
    };

    match value.get("id").and_then(Value::as_str) {
        Some(RESIZE) => {
            let data = value.get("data").cloned().unwrap_or(Value::Null);
            match serde_json::from_value::<Resize>(data) {
                Ok(r) => Some(ShellEvent::Resized(ContentSize::new(r.width, r.height))),
                Err(e) => {
                    tracing::warn!("Ignoring malformed resize: {}", e);
                    None
                }
            }
        }
        Some(CLOSE) => Some(ShellEvent::HostClosed),
        _ => Some(ShellEvent::Surface {
            origin,
            payload: value,
        }),
    }
}

/// Feed stdin into the shell loop. End of input closes the host window.
pub async fn pump_stdin(events: EventSender) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if let Some(event) = parse_line(&line) {
                    if events.send(event).is_err() {
                        return;
                    }
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::warn!("stdin read failed: {}", e);
                break;
            }
        }
    }
    let _ = events.send(ShellEvent::HostClosed);
}

pub fn render(posted: &Posted) -> String {
    json!({
        "surface": posted.surface,
        "id": posted.message.id,
        "data": posted.message.data,
    })
    .to_string()
}

/// Print everything the headless toolkit posts.
pub async fn print_posted(mut posted: mpsc::UnboundedReceiver<Posted>) {
    let mut out = tokio::io::stdout();
    while let Some(p) = posted.recv().await {
        let mut line = render(&p);
        line.push('\n');
        if out.write_all(line.as_bytes()).await.is_err() || out.flush().await.is_err() {
            break;
        }
    }
}
