//! The seam to the native windowing toolkit.
//!
//! [`SurfaceBackend`] is the only place native window and view handles are
//! touched. The shell ships [`HeadlessBackend`], an in-process toolkit that
//! keeps every native object in memory; it drives the stdio mode of the
//! binary and the tests.

use crate::event::{EventSender, ShellEvent};
use flicktok_core::{ContentSize, Message, Rect, SurfaceKind};
use std::collections::BTreeMap;
use std::fmt;
use tokio::sync::mpsc;

/// Opaque handle to a native window or view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NativeId(u64);

impl fmt::Display for NativeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// How the host window is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowSpec {
    pub title: String,
    pub size: ContentSize,
    pub min_size: ContentSize,
    pub max_size: ContentSize,
    /// Created hidden; shown once the UI is ready.
    pub visible: bool,
}

/// Native toolkit operations the view manager relies on.
///
/// Operations on a handle the toolkit no longer knows are errors or no-ops
/// on the toolkit side; the view manager never issues them on purpose.
pub trait SurfaceBackend {
    fn create_window(&mut self, spec: &WindowSpec) -> Result<NativeId, BackendError>;

    /// Create an embedded view inside `window`, on top of its siblings.
    fn create_view(
        &mut self,
        window: NativeId,
        kind: SurfaceKind,
        bounds: Rect,
    ) -> Result<NativeId, BackendError>;

    /// Start loading `url`. Completion comes back as [`ShellEvent::Loaded`],
    /// failure as [`ShellEvent::LoadFailed`].
    fn load_url(&mut self, id: NativeId, url: &str) -> Result<(), BackendError>;

    fn set_bounds(&mut self, id: NativeId, bounds: Rect);

    fn set_visible(&mut self, id: NativeId, visible: bool);

    /// Move a view above its siblings.
    fn raise(&mut self, id: NativeId);

    fn destroy(&mut self, id: NativeId);

    /// Deliver a message to the page loaded in a window or view.
    fn post(&mut self, id: NativeId, message: &Message) -> Result<(), BackendError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("unknown native handle {0}")]
    UnknownHandle(NativeId),
    #[error("native toolkit failure: {0}")]
    Toolkit(String),
}

/// A message the headless toolkit delivered to a page.
#[derive(Debug, Clone, PartialEq)]
pub struct Posted {
    pub surface: SurfaceKind,
    pub message: Message,
}

/// A native object as the headless toolkit sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct NativeObject {
    pub kind: SurfaceKind,
    pub parent: Option<NativeId>,
    pub bounds: Rect,
    pub visible: bool,
    pub url: Option<String>,
    pub inbox: Vec<Message>,
}

/// In-memory toolkit.
#[derive(Debug, Default)]
pub struct HeadlessBackend {
    next_id: u64,
    objects: BTreeMap<NativeId, NativeObject>,
    /// Views bottom to top.
    stack: Vec<NativeId>,
    destroyed: usize,
    stale_calls: usize,
    output: Option<mpsc::UnboundedSender<Posted>>,
    events: Option<EventSender>,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mirror every posted message to `output`.
    pub fn with_output(mut self, output: mpsc::UnboundedSender<Posted>) -> Self {
        self.output = Some(output);
        self
    }

    /// Report load completions and failures to the shell loop.
    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }

    pub fn object(&self, id: NativeId) -> Option<&NativeObject> {
        self.objects.get(&id)
    }

    /// The live object of a given kind, if any.
    pub fn find(&self, kind: SurfaceKind) -> Option<(NativeId, &NativeObject)> {
        self.objects
            .iter()
            .find(|(_, o)| o.kind == kind)
            .map(|(id, o)| (*id, o))
    }

    pub fn inbox(&self, kind: SurfaceKind) -> &[Message] {
        self.find(kind).map(|(_, o)| o.inbox.as_slice()).unwrap_or(&[])
    }

    /// View kinds bottom to top.
    pub fn stacking(&self) -> Vec<SurfaceKind> {
        self.stack
            .iter()
            .filter_map(|id| self.objects.get(id).map(|o| o.kind))
            .collect()
    }

    pub fn live_count(&self) -> usize {
        self.objects.len()
    }

    pub fn destroyed_count(&self) -> usize {
        self.destroyed
    }

    /// Calls made against handles that no longer exist.
    pub fn stale_calls(&self) -> usize {
        self.stale_calls
    }

    fn insert(&mut self, object: NativeObject) -> NativeId {
        self.next_id += 1;
        let id = NativeId(self.next_id);
        self.objects.insert(id, object);
        id
    }

    fn get_mut(&mut self, id: NativeId) -> Option<&mut NativeObject> {
        let found = self.objects.get_mut(&id);
        if found.is_none() {
            self.stale_calls += 1;
            tracing::debug!("Headless toolkit: stale handle {}", id);
        }
        found
    }
}

impl SurfaceBackend for HeadlessBackend {
    fn create_window(&mut self, spec: &WindowSpec) -> Result<NativeId, BackendError> {
        let id = self.insert(NativeObject {
            kind: SurfaceKind::Host,
            parent: None,
            bounds: Rect::new(0, 0, spec.size.width, spec.size.height),
            visible: spec.visible,
            url: None,
            inbox: Vec::new(),
        });
        tracing::debug!("Headless toolkit: window {} '{}'", id, spec.title);
        Ok(id)
    }

    fn create_view(
        &mut self,
        window: NativeId,
        kind: SurfaceKind,
        bounds: Rect,
    ) -> Result<NativeId, BackendError> {
        if !self.objects.contains_key(&window) {
            self.stale_calls += 1;
            return Err(BackendError::UnknownHandle(window));
        }
        let id = self.insert(NativeObject {
            kind,
            parent: Some(window),
            bounds,
            visible: true,
            url: None,
            inbox: Vec::new(),
        });
        self.stack.push(id);
        Ok(id)
    }

    fn load_url(&mut self, id: NativeId, url: &str) -> Result<(), BackendError> {
        let events = self.events.clone();
        let object = self.get_mut(id).ok_or(BackendError::UnknownHandle(id))?;
        object.url = Some(url.to_string());

        if let Some(events) = events {
            let event = if url.contains("://") {
                ShellEvent::Loaded(id)
            } else {
                ShellEvent::LoadFailed {
                    native: id,
                    reason: format!("cannot resolve {url}"),
                }
            };
            let _ = events.send(event);
        }
        Ok(())
    }

    fn set_bounds(&mut self, id: NativeId, bounds: Rect) {
        if let Some(object) = self.get_mut(id) {
            object.bounds = bounds;
        }
    }

    fn set_visible(&mut self, id: NativeId, visible: bool) {
        if let Some(object) = self.get_mut(id) {
            object.visible = visible;
        }
    }

    fn raise(&mut self, id: NativeId) {
        if self.get_mut(id).is_some() {
            self.stack.retain(|v| *v != id);
            self.stack.push(id);
        }
    }

    fn destroy(&mut self, id: NativeId) {
        if self.objects.remove(&id).is_some() {
            self.stack.retain(|v| *v != id);
            self.destroyed += 1;
        } else {
            self.stale_calls += 1;
        }
    }

    fn post(&mut self, id: NativeId, message: &Message) -> Result<(), BackendError> {
        let output = self.output.clone();
        let object = self.get_mut(id).ok_or(BackendError::UnknownHandle(id))?;
        object.inbox.push(message.clone());

        if let Some(output) = output {
            let _ = output.send(Posted {
                surface: object.kind,
                message: message.clone(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event;

    fn spec() -> WindowSpec {
        WindowSpec {
            title: "test".into(),
            size: ContentSize::new(800, 600),
            min_size: ContentSize::new(400, 300),
            max_size: ContentSize::new(800, 600),
            visible: false,
        }
    }

    #[test]
    fn loads_report_completion_or_failure() {
        let (events, mut inbox) = event::channel();
        let mut backend = HeadlessBackend::new().with_events(events);
        let window = backend.create_window(&spec()).unwrap();

        backend.load_url(window, "http://localhost:8001/").unwrap();
        assert_eq!(inbox.try_recv().unwrap(), ShellEvent::Loaded(window));

        backend.load_url(window, "localhost:8001").unwrap();
        assert!(matches!(
            inbox.try_recv().unwrap(),
            ShellEvent::LoadFailed { native, .. } if native == window
        ));
        assert!(inbox.try_recv().is_err());
    }

    #[test]
    fn stale_handles_are_counted() {
        let mut backend = HeadlessBackend::new();
        let window = backend.create_window(&spec()).unwrap();
        backend.destroy(window);

        assert!(matches!(
            backend.load_url(window, "http://localhost:8001/"),
            Err(BackendError::UnknownHandle(_))
        ));
        backend.set_visible(window, true);
        assert_eq!(backend.stale_calls(), 2);
        assert_eq!(backend.destroyed_count(), 1);
    }
}
