//! Core types for the FlickTok control plane.
//!
//! This crate provides the routing envelope and the shared vocabulary of the
//! shell: which surfaces exist, what state the backend link and the readiness
//! barrier are in, and where embedded surfaces sit inside the host window.

mod geometry;
mod message;

pub use geometry::{ContentSize, Layout, LayoutError, Rect};
pub use message::{BACKEND_ORIGIN, EnvelopeError, IdKind, IdParseError, Message, MessageId};

use serde::{Deserialize, Serialize};
use std::fmt;

/// A content area the shell can address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SurfaceKind {
    /// The top-level application window running the primary UI.
    Host,
    /// The embedded third-party content page.
    External,
    /// Transient feedback drawn above the external content.
    Overlay,
}

impl SurfaceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SurfaceKind::Host => "host",
            SurfaceKind::External => "external",
            SurfaceKind::Overlay => "overlay",
        }
    }
}

impl fmt::Display for SurfaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Backend link session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connected,
}

/// Readiness barrier state. Moves from `Waiting` to `Ready` once, never back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadinessState {
    #[default]
    Waiting,
    Ready,
}
