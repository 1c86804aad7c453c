//! Startup wiring and the coordination loop.
//!
//! Startup: create the host window hidden, start the backend link, wait for
//! the backend and the UI server to answer, then load the host page and
//! create the overlay. The host is revealed once its page reports loaded.
//! A single loop drains [`ShellEvent`]s in arrival order; nothing else
//! mutates views.

use crate::backend::SurfaceBackend;
use crate::config::{Config, ConfigError};
use crate::event::{EventReceiver, EventSender, ShellEvent};
use crate::router::{DispatchTable, MessageRouter};
use crate::view::{ViewError, ViewManager};
use flicktok_client::{ConfigurationError, ExternalLink, LinkError, LinkEvent, LinkSender, ReadinessGate};
use std::ops::ControlFlow;
use std::time::Duration;

pub struct Orchestrator<B> {
    config: Config,
    views: ViewManager<B>,
    events: EventSender,
    inbox: EventReceiver,
}

impl<B: SurfaceBackend> Orchestrator<B> {
    /// `channel` is the loop's event channel; the backend may already hold
    /// clones of its sender.
    pub fn new(
        config: Config,
        backend: B,
        (events, inbox): (EventSender, EventReceiver),
    ) -> Result<Self, StartupError> {
        config.validate()?;
        let views = ViewManager::new(backend, config.layout()?, config.broadcast_policy());
        Ok(Self {
            config,
            views,
            events,
            inbox,
        })
    }

    pub fn events(&self) -> EventSender {
        self.events.clone()
    }

    /// Run until the host window closes or the process is interrupted.
    ///
    /// Only configuration problems are returned; connectivity problems are
    /// retried for as long as it takes.
    pub async fn run(self) -> Result<(), StartupError> {
        let Self {
            config,
            mut views,
            events,
            mut inbox,
        } = self;

        let gate = ReadinessGate::from_urls(
            [config.health_url(), config.client_url()],
            config.poll_interval(),
        )?;
        let mut link = ExternalLink::new(&config.link_url(), config.backoff())?;

        views.create_host_window(&config.window_spec())?;

        let link_events = events.clone();
        link.on_any(move |event| {
            let _ = link_events.send(ShellEvent::Link(event.clone()));
        });
        let link = link.spawn();

        let interrupted = tokio::signal::ctrl_c();
        tokio::pin!(interrupted);

        tokio::select! {
            _ = gate.wait_ready() => {}
            _ = &mut interrupted => {
                tracing::info!("Interrupted before services were ready");
                link.shutdown();
                views.host_closed();
                return Ok(());
            }
        }

        views.load_host(&config.client_url())?;
        views.ensure_overlay(&config.overlay_url())?;

        let mut shell = Shell {
            views,
            router: MessageRouter::new(link.clone(), DispatchTable::standard()),
            events,
            reload_delay: config.reload_delay(),
        };

        loop {
            tokio::select! {
                event = inbox.recv() => {
                    let Some(event) = event else { break };
                    if shell.handle(event).is_break() {
                        break;
                    }
                }
                _ = &mut interrupted => {
                    tracing::info!("Interrupted");
                    break;
                }
            }
        }

        link.shutdown();
        shell.views.host_closed();
        tracing::info!("Shell stopped");
        Ok(())
    }
}

/// State owned by the coordination loop once the host is up.
struct Shell<B, L> {
    views: ViewManager<B>,
    router: MessageRouter<L>,
    events: EventSender,
    reload_delay: Duration,
}

impl<B: SurfaceBackend, L: LinkSender> Shell<B, L> {
    fn handle(&mut self, event: ShellEvent) -> ControlFlow<()> {
        match event {
            ShellEvent::Surface { origin, payload } => {
                self.router.route_value(payload, origin, &mut self.views);
            }

            ShellEvent::Link(event) => {
                match &event {
                    LinkEvent::Connected => tracing::info!("Backend connected"),
                    LinkEvent::Disconnected => tracing::warn!("Backend disconnected"),
                    LinkEvent::Event { name, .. } => tracing::debug!("Backend event {}", name),
                }
                self.router.broadcast(event, &mut self.views);
            }

            ShellEvent::Resized(size) => self.views.on_host_resize(size),

            ShellEvent::Loaded(native) => {
                if self.views.is_host(native) && !self.views.host_visible() {
                    match self.views.show_host() {
                        Ok(()) => tracing::info!("Host window shown"),
                        Err(e) => tracing::warn!("Cannot show host window: {}", e),
                    }
                }
            }

            ShellEvent::LoadFailed { native, reason } => {
                if self.views.is_host(native) {
                    tracing::warn!(
                        "Host window failed to load ({}), retrying in {:?}",
                        reason,
                        self.reload_delay
                    );
                    self.schedule(ShellEvent::ReloadHost);
                } else if let Some(id) = self.views.surface_load_failed(native) {
                    tracing::warn!(
                        "Surface {} failed to load ({}), retrying in {:?}",
                        id,
                        reason,
                        self.reload_delay
                    );
                    self.schedule(ShellEvent::Reload(id));
                } else {
                    tracing::debug!("Ignoring load failure of released view {}", native);
                }
            }

            ShellEvent::Reload(id) => {
                self.views.reload(id);
            }

            ShellEvent::ReloadHost => {
                self.views.reload_host();
            }

            ShellEvent::HostClosed => {
                tracing::info!("Host window closed");
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    /// Feed `event` back into the loop after the reload delay.
    fn schedule(&self, event: ShellEvent) {
        let events = self.events.clone();
        let delay = self.reload_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(event);
        });
    }
}

/// Problems that stop the shell before the host window is shown.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Readiness(#[from] ConfigurationError),
    #[error(transparent)]
    Link(#[from] LinkError),
    #[error(transparent)]
    View(#[from] ViewError),
}
