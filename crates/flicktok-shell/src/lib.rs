//! View orchestration and message routing for the FlickTok desktop shell.
//!
//! The shell owns one host window and, inside it, an optional external
//! content view and an overlay view. UI messages are routed either to local
//! handlers or to the backend over the link from `flicktok-client`; backend
//! events are fanned out to the surfaces that subscribe to them.

pub mod backend;
pub mod config;
pub mod event;
pub mod orchestrator;
pub mod router;
pub mod stdio;
pub mod view;

pub use backend::{BackendError, HeadlessBackend, NativeId, Posted, SurfaceBackend, WindowSpec};
pub use config::{Config, ConfigError};
pub use event::{EventReceiver, EventSender, ShellEvent};
pub use orchestrator::{Orchestrator, StartupError};
pub use router::{DispatchTable, LocalRoute, MessageRouter};
pub use view::{BroadcastPolicy, EXTERNAL_ACTIVE, ShowOutcome, SurfaceId, ViewError, ViewManager};
