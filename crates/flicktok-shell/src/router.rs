//! Message addressing and dispatch.
//!
//! Inbound envelopes from any surface are either handled here (ids in the
//! [`DispatchTable`]) or forwarded verbatim to the backend link with a
//! `re:<id>` acknowledgement to the sender. Backend events are stamped with
//! the backend origin prefix and fanned out to the host window and to the
//! live surfaces that take broadcasts.
//!
//! The router never owns a surface. It looks surfaces up by kind through the
//! [`ViewManager`] and changes them only through its operations.

use crate::backend::SurfaceBackend;
use crate::view::{ShowOutcome, ViewManager};
use flicktok_client::{LinkEvent, LinkSender};
use flicktok_core::{Message, MessageId, SurfaceKind};
use serde_json::{Value, json};
use std::collections::HashMap;

/// Local behaviours a message id can be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalRoute {
    /// Answer `re:ping` with `{msg: "pong"}`.
    Ping,
    /// Answer `re:init` with a snapshot of shell state.
    Init,
    /// Remember the UI route the host navigated to.
    NavigatedTo,
    /// Create the external surface from `data.socialMediaURL`.
    LoadSocialMedia,
    /// Tear the external surface down.
    UnloadSocialMedia,
    /// Show the overlay and hand it the message.
    LoadOverlay,
    UnloadOverlay,
    /// Relay playback state between the external surface and the host.
    VideoPlaying,
}

/// Ids handled inside the shell instead of going to the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchTable {
    routes: HashMap<String, LocalRoute>,
}

impl Default for DispatchTable {
    fn default() -> Self {
        Self::standard()
    }
}

impl DispatchTable {
    /// A table with no local routes: everything is forwarded.
    pub fn empty() -> Self {
        Self {
            routes: HashMap::new(),
        }
    }

    pub fn standard() -> Self {
        let mut table = Self::empty();
        table
            .insert("ping", LocalRoute::Ping)
            .insert("init", LocalRoute::Init)
            .insert("info:navigated-to", LocalRoute::NavigatedTo)
            .insert("req:load-social-media", LocalRoute::LoadSocialMedia)
            .insert("req:unload-social-media", LocalRoute::UnloadSocialMedia)
            .insert("req:load-overlay", LocalRoute::LoadOverlay)
            .insert("req:unload-overlay", LocalRoute::UnloadOverlay)
            .insert("info:video-playing", LocalRoute::VideoPlaying);
        table
    }

    pub fn insert(&mut self, id: impl Into<String>, route: LocalRoute) -> &mut Self {
        self.routes.insert(id.into(), route);
        self
    }

    pub fn get(&self, id: &str) -> Option<LocalRoute> {
        self.routes.get(id).copied()
    }
}

pub struct MessageRouter<L> {
    link: L,
    table: DispatchTable,
    ui_route: Option<String>,
}

impl<L: LinkSender> MessageRouter<L> {
    pub fn new(link: L, table: DispatchTable) -> Self {
        Self {
            link,
            table,
            ui_route: None,
        }
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    /// Last route the host UI reported via `info:navigated-to`.
    pub fn ui_route(&self) -> Option<&str> {
        self.ui_route.as_deref()
    }

    /// Route a raw value. Values that are not envelopes are logged and dropped.
    pub fn route_value<B: SurfaceBackend>(
        &mut self,
        payload: Value,
        origin: SurfaceKind,
        views: &mut ViewManager<B>,
    ) {
        match Message::from_value(payload) {
            Ok(message) => self.route(message, origin, views),
            Err(e) => tracing::warn!("Dropping message from {}: {}", origin, e),
        }
    }

    pub fn route<B: SurfaceBackend>(
        &mut self,
        message: Message,
        origin: SurfaceKind,
        views: &mut ViewManager<B>,
    ) {
        let id = match message.parse_id() {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!("Dropping message from {}: {}", origin, e);
                return;
            }
        };

        match self.table.get(&message.id) {
            Some(route) => self.handle_local(route, message, origin, views),
            None => self.forward(&id, message, origin, views),
        }
    }

    /// Fan a backend event out to the host and the live surfaces.
    ///
    /// Connection transitions go to every live surface; named events only to
    /// surfaces that take broadcasts. Surfaces that are not live miss the
    /// event; nothing is replayed.
    pub fn broadcast<B: SurfaceBackend>(&mut self, event: LinkEvent, views: &mut ViewManager<B>) {
        let (message, everyone) = match event {
            LinkEvent::Connected => (Message::bare("info:connect"), true),
            LinkEvent::Disconnected => (Message::bare("info:disconnect"), true),
            LinkEvent::Event { name, data } => {
                (Message::new(MessageId::from_backend(name).to_string(), data), false)
            }
        };

        views.post(SurfaceKind::Host, &message);
        for kind in views.live_surfaces() {
            if everyone || views.receives_broadcasts(kind) {
                views.post(kind, &message);
            }
        }
    }

    fn forward<B: SurfaceBackend>(
        &mut self,
        id: &MessageId,
        message: Message,
        origin: SurfaceKind,
        views: &mut ViewManager<B>,
    ) {
        let ack = message.ack(json!({ "msg": format!("Sent {id} to backend") }));
        if !self.link.send(&message.id, message.data) {
            tracing::debug!("{} from {} not delivered, link down", id, origin);
        }
        views.post(origin, &ack);
    }

    fn handle_local<B: SurfaceBackend>(
        &mut self,
        route: LocalRoute,
        message: Message,
        origin: SurfaceKind,
        views: &mut ViewManager<B>,
    ) {
        match route {
            LocalRoute::Ping => {
                views.post(origin, &message.ack(json!({ "msg": "pong" })));
            }

            LocalRoute::Init => {
                let snapshot = json!({
                    "externalActive": views.is_live(SurfaceKind::External),
                    "overlayVisible": views.overlay_visible(),
                    "linkConnected": self.link.is_connected(),
                    "route": self.ui_route,
                });
                views.post(origin, &message.ack(snapshot));
            }

            LocalRoute::NavigatedTo => match message.data.get("url").and_then(Value::as_str) {
                Some(url) => {
                    tracing::debug!("UI navigated to {}", url);
                    self.ui_route = Some(url.to_string());
                }
                None => tracing::warn!("{} without a url, ignoring", message.id),
            },

            LocalRoute::LoadSocialMedia => {
                let Some(url) = message.data.get("socialMediaURL").and_then(Value::as_str) else {
                    tracing::warn!("{} without socialMediaURL, ignoring", message.id);
                    return;
                };
                let reply = match views.show_external_surface(url) {
                    Ok(ShowOutcome::Created(_)) => json!({ "accepted": true }),
                    Ok(ShowOutcome::AlreadyLive(_)) => {
                        json!({ "accepted": false, "reason": "already-loaded" })
                    }
                    Err(e) => {
                        tracing::warn!("Cannot show external surface: {}", e);
                        json!({ "accepted": false, "reason": e.to_string() })
                    }
                };
                views.post(origin, &message.ack(reply));
            }

            LocalRoute::UnloadSocialMedia => {
                if views.hide_external_surface() {
                    let stopped = Message::new("info:video-playing", json!({ "value": false }));
                    views.post(SurfaceKind::Host, &stopped);
                }
            }

            LocalRoute::LoadOverlay => {
                views.show_overlay(&message);
            }

            LocalRoute::UnloadOverlay => {
                views.hide_overlay();
            }

            LocalRoute::VideoPlaying => {
                let target = match origin {
                    SurfaceKind::External => SurfaceKind::Host,
                    SurfaceKind::Host => SurfaceKind::External,
                    SurfaceKind::Overlay => return,
                };
                views.post(target, &message);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{HeadlessBackend, WindowSpec};
    use crate::view::BroadcastPolicy;
    use flicktok_core::{ContentSize, Layout, Rect};
    use std::cell::{Cell, RefCell};

    /// Records what would have gone over the backend link.
    #[derive(Default)]
    struct RecordingLink {
        sent: RefCell<Vec<(String, Value)>>,
        connected: Cell<bool>,
    }

    impl LinkSender for &RecordingLink {
        fn send(&self, event: &str, data: Value) -> bool {
            self.sent.borrow_mut().push((event.to_string(), data));
            self.connected.get()
        }

        fn is_connected(&self) -> bool {
            self.connected.get()
        }
    }

    fn views() -> ViewManager<HeadlessBackend> {
        let mut views =
            ViewManager::new(HeadlessBackend::new(), Layout::default(), BroadcastPolicy::default());
        views
            .create_host_window(&WindowSpec {
                title: "test".into(),
                size: ContentSize::new(800, 600),
                min_size: ContentSize::new(400, 300),
                max_size: ContentSize::new(800, 600),
                visible: true,
            })
            .unwrap();
        views.ensure_overlay("http://localhost:8001/overlay").unwrap();
        views
    }

    fn host_ids(views: &ViewManager<HeadlessBackend>) -> Vec<String> {
        views
            .backend()
            .inbox(SurfaceKind::Host)
            .iter()
            .map(|m| m.id.clone())
            .collect()
    }

    fn load(url: &str) -> Value {
        json!({ "id": "req:load-social-media", "data": { "socialMediaURL": url } })
    }

    #[test]
    fn unknown_ids_are_forwarded_once_and_acked_once() {
        let link = RecordingLink::default();
        let mut router = MessageRouter::new(&link, DispatchTable::standard());
        let mut views = views();

        router.route_value(
            json!({ "id": "set-training-btn-state", "data": "start" }),
            SurfaceKind::Host,
            &mut views,
        );

        assert_eq!(
            *link.sent.borrow(),
            vec![("set-training-btn-state".to_string(), json!("start"))]
        );
        let inbox = views.backend().inbox(SurfaceKind::Host);
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].id, "re:set-training-btn-state");
    }

    #[test]
    fn ack_is_sent_even_when_link_is_down() {
        let link = RecordingLink::default();
        let mut router = MessageRouter::new(&link, DispatchTable::standard());
        let mut views = views();

        router.route(Message::bare("req:eeg-stream-availability"), SurfaceKind::Host, &mut views);
        assert_eq!(link.sent.borrow().len(), 1);
        assert_eq!(host_ids(&views), vec!["re:req:eeg-stream-availability"]);
    }

    #[test]
    fn ack_goes_back_to_the_origin() {
        let link = RecordingLink::default();
        let mut router = MessageRouter::new(&link, DispatchTable::standard());
        let mut views = views();
        router.route_value(load("https://youtube.com/shorts"), SurfaceKind::Host, &mut views);

        router.route(Message::bare("reel-info"), SurfaceKind::External, &mut views);

        let external = views.backend().inbox(SurfaceKind::External);
        assert_eq!(external.len(), 1);
        assert_eq!(external[0].id, "re:reel-info");
    }

    #[test]
    fn malformed_messages_are_dropped() {
        let link = RecordingLink::default();
        let mut router = MessageRouter::new(&link, DispatchTable::standard());
        let mut views = views();

        router.route_value(json!("ping"), SurfaceKind::Host, &mut views);
        router.route_value(json!({ "data": {} }), SurfaceKind::Host, &mut views);
        router.route_value(json!({ "id": "req:" }), SurfaceKind::Host, &mut views);
        router.route_value(json!({ "id": "req:load-social-media" }), SurfaceKind::Host, &mut views);

        assert!(link.sent.borrow().is_empty());
        assert!(views.backend().inbox(SurfaceKind::Host).is_empty());
        assert!(!views.is_live(SurfaceKind::External));
    }

    #[test]
    fn ping_is_answered_locally() {
        let link = RecordingLink::default();
        let mut router = MessageRouter::new(&link, DispatchTable::standard());
        let mut views = views();

        router.route(Message::bare("ping"), SurfaceKind::Host, &mut views);

        assert!(link.sent.borrow().is_empty());
        assert_eq!(
            views.backend().inbox(SurfaceKind::Host),
            &[Message::new("re:ping", json!({ "msg": "pong" }))]
        );
    }

    #[test]
    fn init_reports_state() {
        let link = RecordingLink::default();
        link.connected.set(true);
        let mut router = MessageRouter::new(&link, DispatchTable::standard());
        let mut views = views();

        router.route_value(
            json!({ "id": "info:navigated-to", "data": { "url": "/train" } }),
            SurfaceKind::Host,
            &mut views,
        );
        router.route_value(load("https://youtube.com/shorts"), SurfaceKind::Host, &mut views);
        router.route(Message::bare("init"), SurfaceKind::Host, &mut views);

        let last = views.backend().inbox(SurfaceKind::Host).last().unwrap().clone();
        assert_eq!(last.id, "re:init");
        assert_eq!(
            last.data,
            json!({
                "externalActive": true,
                "overlayVisible": false,
                "linkConnected": true,
                "route": "/train",
            })
        );
        assert_eq!(router.ui_route(), Some("/train"));
    }

    #[test]
    fn load_then_unload_social_media() {
        let link = RecordingLink::default();
        let mut router = MessageRouter::new(&link, DispatchTable::standard());
        let mut views = views();

        router.route_value(load("https://youtube.com/shorts"), SurfaceKind::Host, &mut views);
        let (_, external) = views.backend().find(SurfaceKind::External).unwrap();
        assert_eq!(external.url.as_deref(), Some("https://youtube.com/shorts"));
        assert_eq!(external.bounds, Rect::new(80, 60, 640, 480));

        router.route_value(
            json!({ "id": "req:load-overlay", "data": { "imgSrc": "/images/left.png" } }),
            SurfaceKind::Host,
            &mut views,
        );
        assert!(views.overlay_visible());

        router.route_value(json!({ "id": "req:unload-social-media" }), SurfaceKind::Host, &mut views);

        assert!(!views.is_live(SurfaceKind::External));
        assert!(!views.overlay_visible());
        assert!(link.sent.borrow().is_empty());

        let inbox = views.backend().inbox(SurfaceKind::Host);
        assert_eq!(
            inbox.last(),
            Some(&Message::new("info:video-playing", json!({ "value": false })))
        );
    }

    #[test]
    fn unload_twice_notifies_once() {
        let link = RecordingLink::default();
        let mut router = MessageRouter::new(&link, DispatchTable::standard());
        let mut views = views();

        router.route_value(load("https://youtube.com/shorts"), SurfaceKind::Host, &mut views);
        router.route(Message::bare("req:unload-social-media"), SurfaceKind::Host, &mut views);
        router.route(Message::bare("req:unload-social-media"), SurfaceKind::Host, &mut views);

        let stops = host_ids(&views)
            .into_iter()
            .filter(|id| id == "info:video-playing")
            .count();
        assert_eq!(stops, 1);
    }

    #[test]
    fn second_load_is_rejected() {
        let link = RecordingLink::default();
        let mut router = MessageRouter::new(&link, DispatchTable::standard());
        let mut views = views();

        router.route_value(load("https://youtube.com/shorts"), SurfaceKind::Host, &mut views);
        router.route_value(load("https://instagram.com/reels"), SurfaceKind::Host, &mut views);

        let acks: Vec<Value> = views
            .backend()
            .inbox(SurfaceKind::Host)
            .iter()
            .filter(|m| m.id == "re:req:load-social-media")
            .map(|m| m.data["accepted"].clone())
            .collect();
        assert_eq!(acks, vec![json!(true), json!(false)]);

        let (_, external) = views.backend().find(SurfaceKind::External).unwrap();
        assert_eq!(external.url.as_deref(), Some("https://youtube.com/shorts"));
    }

    #[test]
    fn overlay_receives_its_payload() {
        let link = RecordingLink::default();
        let mut router = MessageRouter::new(&link, DispatchTable::standard());
        let mut views = views();

        let msg = Message::new("req:load-overlay", json!({ "imgSrc": "/images/right.png" }));
        router.route(msg.clone(), SurfaceKind::Host, &mut views);
        assert_eq!(views.backend().inbox(SurfaceKind::Overlay), &[msg]);

        router.route(Message::bare("req:unload-overlay"), SurfaceKind::Host, &mut views);
        assert!(!views.overlay_visible());
    }

    #[test]
    fn video_playing_is_relayed_to_the_host() {
        let link = RecordingLink::default();
        let mut router = MessageRouter::new(&link, DispatchTable::standard());
        let mut views = views();
        router.route_value(load("https://youtube.com/shorts"), SurfaceKind::Host, &mut views);

        let playing = Message::new("info:video-playing", json!({ "value": true }));
        router.route(playing.clone(), SurfaceKind::External, &mut views);

        assert_eq!(views.backend().inbox(SurfaceKind::Host).last(), Some(&playing));
        assert!(link.sent.borrow().is_empty());
    }

    #[test]
    fn backend_events_are_namespaced_and_fanned_out() {
        let link = RecordingLink::default();
        let mut router = MessageRouter::new(&link, DispatchTable::standard());
        let mut views = views();
        router.route_value(load("https://youtube.com/shorts"), SurfaceKind::Host, &mut views);

        router.broadcast(
            LinkEvent::Event {
                name: "action-detected".into(),
                data: json!({}),
            },
            &mut views,
        );

        let expected = Message::new("py:action-detected", json!({}));
        assert_eq!(views.backend().inbox(SurfaceKind::Host).last(), Some(&expected));
        assert_eq!(views.backend().inbox(SurfaceKind::External), &[expected]);
        // The overlay does not subscribe to backend events by default.
        assert!(views.backend().inbox(SurfaceKind::Overlay).is_empty());
    }

    #[test]
    fn backend_events_skip_surfaces_that_are_not_live() {
        let link = RecordingLink::default();
        let mut router = MessageRouter::new(&link, DispatchTable::standard());
        let mut views = views();

        router.broadcast(
            LinkEvent::Event {
                name: "action-detected".into(),
                data: json!({}),
            },
            &mut views,
        );
        router.route_value(load("https://youtube.com/shorts"), SurfaceKind::Host, &mut views);

        assert!(views.backend().inbox(SurfaceKind::External).is_empty());
        assert_eq!(views.backend().stale_calls(), 0);
    }

    #[test]
    fn connection_transitions_reach_every_live_surface_once() {
        let link = RecordingLink::default();
        let mut router = MessageRouter::new(&link, DispatchTable::standard());
        let mut views = views();
        router.route_value(load("https://youtube.com/shorts"), SurfaceKind::Host, &mut views);

        router.broadcast(LinkEvent::Disconnected, &mut views);
        router.broadcast(LinkEvent::Connected, &mut views);

        for kind in [SurfaceKind::External, SurfaceKind::Overlay] {
            let ids: Vec<&str> = views
                .backend()
                .inbox(kind)
                .iter()
                .map(|m| m.id.as_str())
                .collect();
            assert_eq!(ids, vec!["info:disconnect", "info:connect"], "{kind}");
        }
        let host = host_ids(&views);
        assert_eq!(host.iter().filter(|id| *id == "info:disconnect").count(), 1);
        assert_eq!(host.iter().filter(|id| *id == "info:connect").count(), 1);
    }

    #[test]
    fn custom_tables_extend_local_handling() {
        let link = RecordingLink::default();
        let mut table = DispatchTable::empty();
        table.insert("req:show-reels", LocalRoute::LoadSocialMedia);
        let mut router = MessageRouter::new(&link, table);
        let mut views = views();

        router.route_value(
            json!({ "id": "req:show-reels", "data": { "socialMediaURL": "https://instagram.com/reels" } }),
            SurfaceKind::Host,
            &mut views,
        );
        router.route(Message::bare("ping"), SurfaceKind::Host, &mut views);

        assert!(views.is_live(SurfaceKind::External));
        assert_eq!(*link.sent.borrow(), vec![("ping".to_string(), json!({}))]);
    }
}
