//! Events processed by the shell's coordination loop.

use crate::backend::NativeId;
use crate::view::SurfaceId;
use flicktok_client::LinkEvent;
use flicktok_core::{ContentSize, SurfaceKind};
use serde_json::Value;
use tokio::sync::mpsc;

/// Everything that can wake the coordination loop.
///
/// All sources (native toolkit, backend link, timers) feed one channel, so
/// events from a single source are handled in the order they were sent.
#[derive(Debug, Clone, PartialEq)]
pub enum ShellEvent {
    /// A raw envelope sent by the UI layer of a surface. Validated by the router.
    Surface { origin: SurfaceKind, payload: Value },
    /// Traffic or a state transition on the backend link.
    Link(LinkEvent),
    /// The host window's content area changed size.
    Resized(ContentSize),
    /// A native window or view finished loading and is ready to show.
    Loaded(NativeId),
    /// A native window or view failed to load its content.
    LoadFailed { native: NativeId, reason: String },
    /// Retry loading a surface after an earlier failure.
    Reload(SurfaceId),
    /// Retry loading the host window after an earlier failure.
    ReloadHost,
    /// The host window was closed by the user.
    HostClosed,
}

pub type EventSender = mpsc::UnboundedSender<ShellEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<ShellEvent>;

pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}
