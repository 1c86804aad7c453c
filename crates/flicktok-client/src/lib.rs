//! Network collaborators of the FlickTok shell.
//!
//! - [`ReadinessGate`] holds the window back until the backend and the
//!   content server answer.
//! - [`ExternalLink`] keeps the real-time connection to the backend alive
//!   and turns its traffic into [`LinkEvent`]s.

mod link;
mod readiness;

pub use link::{
    Backoff, CONNECT, DISCONNECT, ExternalLink, Handler, LinkError, LinkEvent, LinkHandle,
    LinkSender,
};
pub use readiness::{ConfigurationError, Endpoint, Ready, ReadinessGate};
