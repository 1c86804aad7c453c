//! Persistent link to the backend service.
//!
//! One WebSocket connection carries named events both ways as JSON text
//! frames `{"event": name, "data": value}`. The link reconnects on its own
//! with exponential backoff and reports each connect and disconnect
//! transition as a synthesized event, so consumers can treat connection
//! state like any other event.

use flicktok_core::ConnectionState;
use futures_util::{SinkExt, StreamExt};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::AbortHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

/// Name under which the connect transition is dispatched.
pub const CONNECT: &str = "connect";
/// Name under which the disconnect transition is dispatched.
pub const DISCONNECT: &str = "disconnect";

/// Reconnect delay policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    multiplier: f64,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(500),
            max: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

impl Backoff {
    /// A multiplier below 1 is treated as 1 (fixed delay).
    pub fn new(initial: Duration, max: Duration, multiplier: f64) -> Self {
        Self {
            initial,
            max: max.max(initial),
            multiplier: if multiplier.is_finite() { multiplier.max(1.0) } else { 1.0 },
        }
    }

    /// A fixed delay between attempts.
    pub fn fixed(delay: Duration) -> Self {
        Self::new(delay, delay, 1.0)
    }

    /// Delay before reconnect attempt `attempt` (zero-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt.min(64) as i32);
        let millis = (self.initial.as_millis() as f64 * factor).min(self.max.as_millis() as f64);
        Duration::from_millis(millis as u64)
    }
}

/// Something that happened on the link.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    Connected,
    Disconnected,
    /// A named event sent by the backend.
    Event { name: String, data: Value },
}

impl LinkEvent {
    /// The name handlers are registered under.
    pub fn name(&self) -> &str {
        match self {
            LinkEvent::Connected => CONNECT,
            LinkEvent::Disconnected => DISCONNECT,
            LinkEvent::Event { name, .. } => name,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Frame {
    event: String,
    #[serde(default)]
    data: Value,
}

impl Frame {
    fn into_event(self) -> LinkEvent {
        let data = match self.data {
            Value::Null => Value::Object(Map::new()),
            data => data,
        };
        LinkEvent::Event {
            name: self.event,
            data,
        }
    }
}

/// Callback for link events.
pub type Handler = Box<dyn FnMut(&LinkEvent) + Send + 'static>;

#[derive(Default)]
struct Handlers {
    named: HashMap<String, Vec<Handler>>,
    any: Vec<Handler>,
}

impl Handlers {
    fn dispatch(&mut self, event: &LinkEvent) {
        if let Some(handlers) = self.named.get_mut(event.name()) {
            for handler in handlers {
                handler(event);
            }
        }
        for handler in &mut self.any {
            handler(event);
        }
    }
}

/// An unstarted link. Register handlers, then [`spawn`](Self::spawn) it.
pub struct ExternalLink {
    url: Url,
    backoff: Backoff,
    handlers: Handlers,
}

impl ExternalLink {
    /// Create a link to a `ws` or `wss` URL.
    pub fn new(url: &str, backoff: Backoff) -> Result<Self, LinkError> {
        let parsed = Url::parse(url).map_err(|e| LinkError::Malformed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        match parsed.scheme() {
            "ws" | "wss" => Ok(Self {
                url: parsed,
                backoff,
                handlers: Handlers::default(),
            }),
            other => Err(LinkError::UnsupportedScheme {
                url: url.to_string(),
                scheme: other.to_string(),
            }),
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Register a handler for one event name. Use [`CONNECT`] and
    /// [`DISCONNECT`] for the connection transitions.
    pub fn on<F>(&mut self, event: impl Into<String>, handler: F) -> &mut Self
    where
        F: FnMut(&LinkEvent) + Send + 'static,
    {
        self.handlers
            .named
            .entry(event.into())
            .or_default()
            .push(Box::new(handler));
        self
    }

    /// Register a handler that sees every event, named or not.
    pub fn on_any<F>(&mut self, handler: F) -> &mut Self
    where
        F: FnMut(&LinkEvent) + Send + 'static,
    {
        self.handlers.any.push(Box::new(handler));
        self
    }

    /// Start the connection task. Must be called inside a Tokio runtime.
    pub fn spawn(self) -> LinkHandle {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);

        let task = tokio::spawn(run(
            self.url,
            self.backoff,
            self.handlers,
            outbound_rx,
            state_tx,
        ));

        LinkHandle {
            outbound: outbound_tx,
            state: state_rx,
            task: task.abort_handle(),
        }
    }
}

/// Sending side of the backend link, as seen by the router.
pub trait LinkSender {
    /// Fire-and-forget send. Returns whether the frame went to a live
    /// connection.
    fn send(&self, event: &str, data: Value) -> bool;

    fn is_connected(&self) -> bool;
}

/// Handle to a running link.
#[derive(Debug, Clone)]
pub struct LinkHandle {
    outbound: mpsc::UnboundedSender<Frame>,
    state: watch::Receiver<ConnectionState>,
    task: AbortHandle,
}

impl LinkHandle {
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Stop the connection task. No disconnect event is dispatched.
    pub fn shutdown(&self) {
        self.task.abort();
    }
}

impl LinkSender for LinkHandle {
    fn send(&self, event: &str, data: Value) -> bool {
        if self.state() != ConnectionState::Connected {
            tracing::debug!("Backend link down, dropping {}", event);
            return false;
        }
        self.outbound
            .send(Frame {
                event: event.to_string(),
                data,
            })
            .is_ok()
    }

    fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }
}

enum SessionEnd {
    Lost,
    Shutdown,
}

async fn run(
    url: Url,
    backoff: Backoff,
    mut handlers: Handlers,
    mut outbound: mpsc::UnboundedReceiver<Frame>,
    state: watch::Sender<ConnectionState>,
) {
    let mut attempt = 0u32;

    loop {
        match tokio_tungstenite::connect_async(url.as_str()).await {
            Ok((ws, _)) => {
                attempt = 0;
                tracing::info!("Connected to backend at {}", url);

                // Frames issued before this session have nowhere to go.
                while outbound.try_recv().is_ok() {}

                state.send_replace(ConnectionState::Connected);
                handlers.dispatch(&LinkEvent::Connected);

                let end = session(ws, &mut handlers, &mut outbound).await;

                state.send_replace(ConnectionState::Disconnected);
                if let SessionEnd::Shutdown = end {
                    return;
                }
                tracing::warn!("Backend link lost");
                handlers.dispatch(&LinkEvent::Disconnected);
            }
            Err(e) => {
                tracing::debug!("Backend at {} unavailable: {}", url, e);
            }
        }

        let delay = backoff.delay(attempt);
        attempt = attempt.saturating_add(1);
        tokio::time::sleep(delay).await;
    }
}

async fn session(
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    handlers: &mut Handlers,
    outbound: &mut mpsc::UnboundedReceiver<Frame>,
) -> SessionEnd {
    let (mut sink, mut stream) = ws.split();

    loop {
        tokio::select! {
            msg = stream.next() => {
                let msg = match msg {
                    Some(Ok(msg)) => msg,
                    Some(Err(e)) => {
                        tracing::debug!("WebSocket error: {}", e);
                        return SessionEnd::Lost;
                    }
                    None => return SessionEnd::Lost,
                };

                match msg {
                    Message::Text(text) => match serde_json::from_str::<Frame>(&text) {
                        Ok(frame) => handlers.dispatch(&frame.into_event()),
                        Err(e) => tracing::warn!("Invalid backend frame: {}", e),
                    },
                    Message::Close(_) => return SessionEnd::Lost,
                    _ => {}
                }
            }

            frame = outbound.recv() => {
                let Some(frame) = frame else {
                    let _ = sink.close().await;
                    return SessionEnd::Shutdown;
                };

                let text = match serde_json::to_string(&frame) {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::warn!("Cannot encode {}: {}", frame.event, e);
                        continue;
                    }
                };
                if let Err(e) = sink.send(Message::Text(text.into())).await {
                    tracing::debug!("WebSocket send failed: {}", e);
                    return SessionEnd::Lost;
                }
            }
        }
    }
}

/// Invalid link configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LinkError {
    #[error("malformed link url {url}: {reason}")]
    Malformed { url: String, reason: String },
    #[error("link url {url} must use ws or wss, got {scheme}")]
    UnsupportedScheme { url: String, scheme: String },
}
