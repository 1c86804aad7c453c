//! HTTP and link servers.

use crate::protocol::{Backend, Frame};
use axum::{
    Json, Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::{Html, Response},
    routing::get,
};
use serde_json::{Value, json};
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, broadcast};

#[derive(Clone)]
struct AppState {
    backend: Arc<Mutex<Backend>>,
    actions: broadcast::Sender<Frame>,
}

pub async fn run(port: u16, client_port: u16, action_every: u64) -> anyhow::Result<()> {
    let (actions, _) = broadcast::channel::<Frame>(16);

    // Periodic gesture detections
    let tick_actions = actions.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(action_every.max(1)));
        interval.tick().await;
        loop {
            interval.tick().await;
            let _ = tick_actions.send(Frame::new("action-detected", json!({})));
        }
    });

    let state = AppState {
        backend: Arc::new(Mutex::new(Backend::default())),
        actions,
    };

    let backend_app = Router::new()
        .route("/api/healthcheck", get(healthcheck))
        .route("/ws", get(link))
        .with_state(state);

    let pages = Router::new()
        .route("/", get(|| async { Html(HOST_PAGE) }))
        .route("/overlay", get(|| async { Html(OVERLAY_PAGE) }));

    let backend_addr: SocketAddr = ([127, 0, 0, 1], port).into();
    let pages_addr: SocketAddr = ([127, 0, 0, 1], client_port).into();
    let backend_listener = tokio::net::TcpListener::bind(backend_addr).await?;
    let pages_listener = tokio::net::TcpListener::bind(pages_addr).await?;
    tracing::info!("Backend listening on http://{}", backend_addr);
    tracing::info!("UI pages listening on http://{}", pages_addr);

    tokio::try_join!(
        axum::serve(backend_listener, backend_app).into_future(),
        axum::serve(pages_listener, pages).into_future(),
    )?;
    Ok(())
}

async fn healthcheck() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn link(upgrade: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    upgrade.on_upgrade(move |socket| async move {
        if let Err(e) = session(socket, state).await {
            tracing::warn!("Link session error: {}", e);
        }
    })
}

async fn session(mut socket: WebSocket, state: AppState) -> anyhow::Result<()> {
    tracing::info!("Shell connected");
    let mut actions = state.actions.subscribe();

    loop {
        tokio::select! {
            msg = socket.recv() => {
                let Some(msg) = msg else { break };
                let Message::Text(text) = msg? else { continue };
                let frame: Frame = match serde_json::from_str(text.as_str()) {
                    Ok(frame) => frame,
                    Err(e) => {
                        tracing::warn!("Bad frame: {}", e);
                        continue;
                    }
                };
                tracing::info!("<- {}", frame.event);
                let replies = state.backend.lock().await.handle(&frame);
                for reply in replies {
                    send(&mut socket, &reply).await?;
                }
            }
            action = actions.recv() => match action {
                Ok(frame) => send(&mut socket, &frame).await?,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::debug!("Skipped {} actions", n);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    tracing::info!("Shell disconnected");
    Ok(())
}

async fn send(socket: &mut WebSocket, frame: &Frame) -> anyhow::Result<()> {
    tracing::info!("-> {}", frame.event);
    socket
        .send(Message::Text(serde_json::to_string(frame)?.into()))
        .await?;
    Ok(())
}

const HOST_PAGE: &str = "<!doctype html>\n<title>FlickTok</title>\n<h1>FlickTok</h1>\n";
const OVERLAY_PAGE: &str = "<!doctype html>\n<title>FlickTok overlay</title>\n";
