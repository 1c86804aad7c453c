//! Lifecycle, stacking and geometry of the host window and its surfaces.
//!
//! The view manager is the only writer of surface state. Handles are kept in
//! `Option`s and taken out before the native object is destroyed, so nothing
//! issued afterwards can reach a freed view. Every surface also carries a
//! [`SurfaceId`] generation; continuations scheduled against an older
//! generation (reloads, load failures) are ignored.

use crate::backend::{BackendError, NativeId, SurfaceBackend, WindowSpec};
use flicktok_core::{ContentSize, Layout, Message, Rect, SurfaceKind};
use serde_json::json;
use std::fmt;

/// Sent to the host whenever the external surface appears or goes away.
pub const EXTERNAL_ACTIVE: &str = "info:is-external-active";

/// Identity of one incarnation of an embedded surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceId {
    kind: SurfaceKind,
    generation: u64,
}

impl SurfaceId {
    pub fn kind(&self) -> SurfaceKind {
        self.kind
    }
}

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.generation)
    }
}

/// Which embedded surfaces get backend broadcasts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastPolicy {
    pub external: bool,
    pub overlay: bool,
}

impl Default for BroadcastPolicy {
    fn default() -> Self {
        Self {
            external: true,
            overlay: false,
        }
    }
}

/// Result of asking for the external surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShowOutcome {
    Created(SurfaceId),
    /// One is already live; the request was rejected.
    AlreadyLive(SurfaceId),
}

struct Host {
    native: NativeId,
    size: ContentSize,
    visible: bool,
    url: Option<String>,
}

struct Surface {
    id: SurfaceId,
    native: NativeId,
    url: String,
    visible: bool,
}

pub struct ViewManager<B> {
    backend: B,
    layout: Layout,
    broadcasts: BroadcastPolicy,
    host: Option<Host>,
    external: Option<Surface>,
    overlay: Option<Surface>,
    generation: u64,
}

impl<B: SurfaceBackend> ViewManager<B> {
    pub fn new(backend: B, layout: Layout, broadcasts: BroadcastPolicy) -> Self {
        Self {
            backend,
            layout,
            broadcasts,
            host: None,
            external: None,
            overlay: None,
            generation: 0,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Create the host window. Only one may ever exist at a time.
    pub fn create_host_window(&mut self, spec: &WindowSpec) -> Result<NativeId, ViewError> {
        if self.host.is_some() {
            return Err(ViewError::HostExists);
        }
        let native = self.backend.create_window(spec)?;
        self.host = Some(Host {
            native,
            size: spec.size,
            visible: spec.visible,
            url: None,
        });
        tracing::debug!("Host window {} created", native);
        Ok(native)
    }

    pub fn load_host(&mut self, url: &str) -> Result<(), ViewError> {
        let host = self.host.as_mut().ok_or(ViewError::NoHost)?;
        host.url = Some(url.to_string());
        self.backend.load_url(host.native, url)?;
        tracing::info!("Host window loading {}", url);
        Ok(())
    }

    /// Load the host's page again after a failure.
    pub fn reload_host(&mut self) -> bool {
        let Some((native, url)) = self
            .host
            .as_ref()
            .and_then(|h| h.url.clone().map(|url| (h.native, url)))
        else {
            tracing::debug!("No host page to reload");
            return false;
        };
        match self.backend.load_url(native, &url) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Reload of host window failed: {}", e);
                false
            }
        }
    }

    pub fn is_host(&self, native: NativeId) -> bool {
        self.host.as_ref().is_some_and(|h| h.native == native)
    }

    pub fn show_host(&mut self) -> Result<(), ViewError> {
        let host = self.host.as_mut().ok_or(ViewError::NoHost)?;
        self.backend.set_visible(host.native, true);
        host.visible = true;
        Ok(())
    }

    pub fn host_visible(&self) -> bool {
        self.host.as_ref().is_some_and(|h| h.visible)
    }

    /// The host window is gone: drop it and everything embedded in it.
    pub fn host_closed(&mut self) {
        self.hide_external_surface();
        if let Some(overlay) = self.overlay.take() {
            self.backend.destroy(overlay.native);
        }
        if let Some(host) = self.host.take() {
            self.backend.destroy(host.native);
        }
    }

    /// Create the external content surface and load `url` into it.
    ///
    /// Rejected if one is already live. Placed below the overlay.
    pub fn show_external_surface(&mut self, url: &str) -> Result<ShowOutcome, ViewError> {
        if let Some(existing) = &self.external {
            tracing::warn!(
                "External surface already showing {}, ignoring {}",
                existing.url,
                url
            );
            return Ok(ShowOutcome::AlreadyLive(existing.id));
        }

        let host = self.host.as_ref().ok_or(ViewError::NoHost)?;
        let bounds = self.layout.external_bounds(host.size);
        let native = self
            .backend
            .create_view(host.native, SurfaceKind::External, bounds)?;

        if let Err(e) = self.backend.load_url(native, url) {
            self.backend.destroy(native);
            return Err(e.into());
        }

        let id = self.next_id(SurfaceKind::External);
        self.external = Some(Surface {
            id,
            native,
            url: url.to_string(),
            visible: true,
        });

        if let Some(overlay) = &self.overlay {
            self.backend.raise(overlay.native);
        }

        self.notify_external_active(true);
        tracing::info!("External surface {} loading {}", id, url);
        Ok(ShowOutcome::Created(id))
    }

    /// Tear down the external surface and hide the overlay that decorates it.
    ///
    /// Returns whether anything was torn down; a second call is a no-op.
    pub fn hide_external_surface(&mut self) -> bool {
        let Some(surface) = self.external.take() else {
            return false;
        };
        self.backend.destroy(surface.native);
        self.hide_overlay();
        self.notify_external_active(false);
        tracing::info!("External surface {} removed", surface.id);
        true
    }

    /// Create the overlay once, hidden, above everything else.
    pub fn ensure_overlay(&mut self, url: &str) -> Result<SurfaceId, ViewError> {
        if let Some(overlay) = &self.overlay {
            return Ok(overlay.id);
        }

        let host = self.host.as_ref().ok_or(ViewError::NoHost)?;
        let bounds = self.layout.overlay_bounds(host.size);
        let native = self
            .backend
            .create_view(host.native, SurfaceKind::Overlay, bounds)?;
        self.backend.set_visible(native, false);

        if let Err(e) = self.backend.load_url(native, url) {
            self.backend.destroy(native);
            return Err(e.into());
        }
        self.backend.raise(native);

        let id = self.next_id(SurfaceKind::Overlay);
        self.overlay = Some(Surface {
            id,
            native,
            url: url.to_string(),
            visible: false,
        });
        Ok(id)
    }

    /// Reveal the overlay and hand it the message so it can render itself.
    pub fn show_overlay(&mut self, message: &Message) -> bool {
        let Some(overlay) = self.overlay.as_mut() else {
            tracing::warn!("No overlay surface, dropping {}", message.id);
            return false;
        };
        if !overlay.visible {
            self.backend.set_visible(overlay.native, true);
            self.backend.raise(overlay.native);
            overlay.visible = true;
        }
        if let Err(e) = self.backend.post(overlay.native, message) {
            tracing::warn!("Overlay did not take {}: {}", message.id, e);
        }
        true
    }

    /// Hide the overlay without destroying it. Returns whether it was visible.
    pub fn hide_overlay(&mut self) -> bool {
        match self.overlay.as_mut() {
            Some(overlay) if overlay.visible => {
                self.backend.set_visible(overlay.native, false);
                overlay.visible = false;
                true
            }
            _ => false,
        }
    }

    pub fn overlay_visible(&self) -> bool {
        self.overlay.as_ref().is_some_and(|o| o.visible)
    }

    /// Recompute bounds of every live surface for a new content size.
    pub fn on_host_resize(&mut self, size: ContentSize) {
        let Some(host) = self.host.as_mut() else {
            return;
        };
        host.size = size;

        if let Some(external) = &self.external {
            self.backend
                .set_bounds(external.native, self.layout.external_bounds(size));
        }
        if let Some(overlay) = &self.overlay {
            self.backend
                .set_bounds(overlay.native, self.layout.overlay_bounds(size));
        }
    }

    /// Current bounds a surface would be given, if it is live.
    pub fn bounds(&self, kind: SurfaceKind) -> Option<Rect> {
        let size = self.host.as_ref()?.size;
        match kind {
            SurfaceKind::Host => Some(Rect::new(0, 0, size.width, size.height)),
            SurfaceKind::External => self
                .external
                .as_ref()
                .map(|_| self.layout.external_bounds(size)),
            SurfaceKind::Overlay => self
                .overlay
                .as_ref()
                .map(|_| self.layout.overlay_bounds(size)),
        }
    }

    /// Map a native load failure to the live surface it belongs to.
    pub fn surface_load_failed(&self, native: NativeId) -> Option<SurfaceId> {
        [&self.external, &self.overlay]
            .into_iter()
            .flatten()
            .find(|s| s.native == native)
            .map(|s| s.id)
    }

    /// Load the surface's URL again if that incarnation is still live.
    pub fn reload(&mut self, id: SurfaceId) -> bool {
        let Some(surface) = self.surface(id.kind).filter(|s| s.id == id) else {
            tracing::debug!("Skipping reload of stale surface {}", id);
            return false;
        };
        let (native, url) = (surface.native, surface.url.clone());
        match self.backend.load_url(native, &url) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Reload of {} failed: {}", id, e);
                false
            }
        }
    }

    pub fn is_live(&self, kind: SurfaceKind) -> bool {
        match kind {
            SurfaceKind::Host => self.host.is_some(),
            other => self.surface(other).is_some(),
        }
    }

    pub fn external_id(&self) -> Option<SurfaceId> {
        self.external.as_ref().map(|s| s.id)
    }

    /// Embedded surfaces that currently exist, bottom to top.
    pub fn live_surfaces(&self) -> Vec<SurfaceKind> {
        [&self.external, &self.overlay]
            .into_iter()
            .flatten()
            .map(|s| s.id.kind)
            .collect()
    }

    pub fn receives_broadcasts(&self, kind: SurfaceKind) -> bool {
        match kind {
            SurfaceKind::Host => true,
            SurfaceKind::External => self.broadcasts.external,
            SurfaceKind::Overlay => self.broadcasts.overlay,
        }
    }

    /// Deliver a message to a surface if it is live. Returns whether it was
    /// handed to the toolkit.
    pub fn post(&mut self, kind: SurfaceKind, message: &Message) -> bool {
        let native = match kind {
            SurfaceKind::Host => self.host.as_ref().map(|h| h.native),
            other => self.surface(other).map(|s| s.native),
        };
        let Some(native) = native else {
            tracing::debug!("{} not live, dropping {}", kind, message.id);
            return false;
        };
        match self.backend.post(native, message) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Failed to post {} to {}: {}", message.id, kind, e);
                false
            }
        }
    }

    fn surface(&self, kind: SurfaceKind) -> Option<&Surface> {
        match kind {
            SurfaceKind::Host => None,
            SurfaceKind::External => self.external.as_ref(),
            SurfaceKind::Overlay => self.overlay.as_ref(),
        }
    }

    fn notify_external_active(&mut self, value: bool) {
        let message = Message::new(EXTERNAL_ACTIVE, json!({ "value": value }));
        self.post(SurfaceKind::Host, &message);
    }

    fn next_id(&mut self, kind: SurfaceKind) -> SurfaceId {
        self.generation += 1;
        SurfaceId {
            kind,
            generation: self.generation,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ViewError {
    #[error("host window already exists")]
    HostExists,
    #[error("host window has not been created")]
    NoHost,
    #[error(transparent)]
    Backend(#[from] BackendError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::HeadlessBackend;
    use serde_json::{Value, json};

    fn spec() -> WindowSpec {
        WindowSpec {
            title: "test".into(),
            size: ContentSize::new(800, 600),
            min_size: ContentSize::new(400, 300),
            max_size: ContentSize::new(800, 600),
            visible: false,
        }
    }

    fn manager() -> ViewManager<HeadlessBackend> {
        let mut views =
            ViewManager::new(HeadlessBackend::new(), Layout::default(), BroadcastPolicy::default());
        views.create_host_window(&spec()).unwrap();
        views
    }

    #[test]
    fn host_is_created_once() {
        let mut views = manager();
        assert!(matches!(
            views.create_host_window(&spec()),
            Err(ViewError::HostExists)
        ));
        assert!(!views.host_visible());
        views.show_host().unwrap();
        assert!(views.host_visible());
    }

    #[test]
    fn host_page_can_be_reloaded() {
        let mut views = manager();
        assert!(!views.reload_host());

        views.load_host("http://localhost:8001/").unwrap();
        let (native, _) = views.backend().find(SurfaceKind::Host).unwrap();
        assert!(views.is_host(native));
        assert!(views.reload_host());

        let (_, host) = views.backend().find(SurfaceKind::Host).unwrap();
        assert_eq!(host.url.as_deref(), Some("http://localhost:8001/"));
        assert!(!host.visible);

        views.host_closed();
        assert!(!views.is_host(native));
        assert!(!views.reload_host());
        assert_eq!(views.backend().stale_calls(), 0);
    }

    #[test]
    fn surfaces_need_a_host() {
        let mut views =
            ViewManager::new(HeadlessBackend::new(), Layout::default(), BroadcastPolicy::default());
        assert!(matches!(
            views.show_external_surface("https://youtube.com/shorts"),
            Err(ViewError::NoHost)
        ));
        assert!(matches!(views.show_host(), Err(ViewError::NoHost)));
    }

    #[test]
    fn external_surface_uses_default_rectangle() {
        let mut views = manager();
        let outcome = views.show_external_surface("https://youtube.com/shorts").unwrap();
        assert!(matches!(outcome, ShowOutcome::Created(_)));

        let (_, object) = views.backend().find(SurfaceKind::External).unwrap();
        assert_eq!(object.bounds, Rect::new(80, 60, 640, 480));
        assert_eq!(object.url.as_deref(), Some("https://youtube.com/shorts"));
    }

    #[test]
    fn second_external_surface_is_rejected() {
        let mut views = manager();
        let first = views.show_external_surface("https://youtube.com/shorts").unwrap();
        let second = views.show_external_surface("https://instagram.com/reels").unwrap();

        let ShowOutcome::Created(id) = first else {
            panic!("first show should create");
        };
        assert_eq!(second, ShowOutcome::AlreadyLive(id));

        let (_, object) = views.backend().find(SurfaceKind::External).unwrap();
        assert_eq!(object.url.as_deref(), Some("https://youtube.com/shorts"));
    }

    #[test]
    fn show_hide_cycles_do_not_leak() {
        let mut views = manager();
        for _ in 0..5 {
            views.show_external_surface("https://youtube.com/shorts").unwrap();
            assert!(views.is_live(SurfaceKind::External));
            assert!(views.hide_external_surface());
            assert!(!views.is_live(SurfaceKind::External));
            assert!(views.backend().find(SurfaceKind::External).is_none());
        }
        assert_eq!(views.backend().live_count(), 1);
        assert_eq!(views.backend().stale_calls(), 0);
    }

    #[test]
    fn hide_twice_is_a_no_op() {
        let mut views = manager();
        views.show_external_surface("https://youtube.com/shorts").unwrap();
        assert!(views.hide_external_surface());
        assert!(!views.hide_external_surface());
        assert_eq!(views.backend().destroyed_count(), 1);
        assert_eq!(views.backend().stale_calls(), 0);

        let notices: Vec<&Value> = views
            .backend()
            .inbox(SurfaceKind::Host)
            .iter()
            .filter(|m| m.id == EXTERNAL_ACTIVE)
            .map(|m| &m.data["value"])
            .collect();
        assert_eq!(notices, vec![&json!(true), &json!(false)]);
    }

    #[test]
    fn overlay_stays_above_external() {
        let mut views = manager();
        views.ensure_overlay("http://localhost:8001/overlay").unwrap();
        views.show_external_surface("https://youtube.com/shorts").unwrap();
        assert_eq!(
            views.backend().stacking(),
            vec![SurfaceKind::External, SurfaceKind::Overlay]
        );
    }

    #[test]
    fn overlay_is_created_once_and_toggled() {
        let mut views = manager();
        let id = views.ensure_overlay("http://localhost:8001/overlay").unwrap();
        assert_eq!(views.ensure_overlay("http://localhost:8001/overlay").unwrap(), id);
        assert!(!views.overlay_visible());

        let msg = Message::new("req:load-overlay", json!({"imgSrc": "/images/left.png"}));
        assert!(views.show_overlay(&msg));
        assert!(views.overlay_visible());
        assert_eq!(views.backend().inbox(SurfaceKind::Overlay), &[msg]);

        assert!(views.hide_overlay());
        assert!(!views.hide_overlay());
        assert!(views.is_live(SurfaceKind::Overlay));
    }

    #[test]
    fn hiding_external_hides_overlay() {
        let mut views = manager();
        views.ensure_overlay("http://localhost:8001/overlay").unwrap();
        views.show_external_surface("https://youtube.com/shorts").unwrap();
        views.show_overlay(&Message::bare("req:load-overlay"));

        views.hide_external_surface();
        assert!(!views.overlay_visible());
        let (_, overlay) = views.backend().find(SurfaceKind::Overlay).unwrap();
        assert!(!overlay.visible);
    }

    #[test]
    fn resize_recomputes_every_live_surface() {
        let mut views = manager();
        views.ensure_overlay("http://localhost:8001/overlay").unwrap();
        views.show_external_surface("https://youtube.com/shorts").unwrap();

        let size = ContentSize::new(400, 300);
        views.on_host_resize(size);

        let layout = Layout::default();
        let (_, external) = views.backend().find(SurfaceKind::External).unwrap();
        let (_, overlay) = views.backend().find(SurfaceKind::Overlay).unwrap();
        assert_eq!(external.bounds, layout.external_bounds(size));
        assert_eq!(overlay.bounds, layout.overlay_bounds(size));
        assert_eq!(external.bounds, Rect::new(40, 30, 320, 240));
        assert!(external.bounds.fits(size));
        assert!(overlay.bounds.fits(size));
    }

    #[test]
    fn resize_after_teardown_touches_nothing_stale() {
        let mut views = manager();
        views.show_external_surface("https://youtube.com/shorts").unwrap();
        views.hide_external_surface();
        views.on_host_resize(ContentSize::new(640, 480));
        assert_eq!(views.backend().stale_calls(), 0);
    }

    #[test]
    fn stale_reload_is_ignored() {
        let mut views = manager();
        let ShowOutcome::Created(old) =
            views.show_external_surface("https://youtube.com/shorts").unwrap()
        else {
            panic!("expected a new surface");
        };
        views.hide_external_surface();
        views.show_external_surface("https://youtube.com/shorts").unwrap();

        assert!(!views.reload(old));
        assert!(views.reload(views.external_id().unwrap()));
        assert_eq!(views.backend().stale_calls(), 0);
    }

    #[test]
    fn load_failures_map_to_live_surfaces_only() {
        let mut views = manager();
        views.show_external_surface("https://youtube.com/shorts").unwrap();
        let (native, _) = views.backend().find(SurfaceKind::External).unwrap();
        assert_eq!(views.surface_load_failed(native), views.external_id());

        views.hide_external_surface();
        assert_eq!(views.surface_load_failed(native), None);
    }

    #[test]
    fn posting_to_absent_surface_is_dropped() {
        let mut views = manager();
        assert!(!views.post(SurfaceKind::External, &Message::bare("py:x")));
        assert!(views.post(SurfaceKind::Host, &Message::bare("py:x")));
    }

    #[test]
    fn closing_host_releases_everything() {
        let mut views = manager();
        views.ensure_overlay("http://localhost:8001/overlay").unwrap();
        views.show_external_surface("https://youtube.com/shorts").unwrap();
        views.host_closed();
        assert_eq!(views.backend().live_count(), 0);
        assert!(!views.is_live(SurfaceKind::Host));
        assert_eq!(views.backend().stale_calls(), 0);
    }
}
