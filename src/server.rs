//! HTTP/WebSocket adapter.
//!
//! Thin plumbing over the session manager: a version banner, a synchronous
//! snapshot endpoint, the observer WebSocket, and the static UI bundle.
//! No protocol logic lives here; everything routes through
//! [`SessionHandle`].

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{Result, VescError};
use crate::messages::{parse_command, OutboundMessage};
use crate::session::{ObserverSession, SessionEvent, SessionHandle};

/// Shared state behind every route.
pub struct AppState {
    /// Session manager handle
    pub session: SessionHandle,
    /// Loaded configuration (profiles endpoint)
    pub config: Config,
}

/// Build the application router.
pub fn router(state: Arc<AppState>) -> Router {
    let static_dir = state.config.static_dir.clone();
    Router::new()
        .route("/", get(version_handler))
        .route("/telemetry", get(telemetry_handler))
        .route("/profiles", get(profiles_handler))
        .route("/ws", get(upgrade_handler))
        .nest_service("/app", tower_http::services::ServeDir::new(static_dir))
        .with_state(state)
}

/// Handle for the running server.
pub struct ServerHandle {
    address: SocketAddr,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ServerHandle {
    /// The bound listening address.
    pub fn local_addr(&self) -> SocketAddr {
        self.address
    }

    /// Trigger graceful shutdown and wait for the server to exit.
    pub async fn shutdown(self) -> Result<()> {
        let _ = self.shutdown.send(true);
        self.task
            .await
            .map_err(|e| VescError::Config(format!("server task panicked: {e}")))
    }
}

/// Bind and spawn the server.
pub async fn spawn(listen: SocketAddr, state: Arc<AppState>) -> Result<ServerHandle> {
    let listener = TcpListener::bind(listen).await?;
    let address = listener.local_addr()?;
    info!(%address, "http server listening");

    let app = router(state);
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(async move {
        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            let _ = shutdown_rx.changed().await;
        });
        if let Err(err) = server.await {
            warn!(error = %err, "http server exited with error");
        }
    });

    Ok(ServerHandle {
        address,
        shutdown: shutdown_tx,
        task,
    })
}

async fn version_handler() -> Json<serde_json::Value> {
    Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "message": "Running",
    }))
}

async fn telemetry_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.session.snapshot().await {
        Some(snapshot) => Json(OutboundMessage::info(snapshot)).into_response(),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"error": "no telemetry available"})),
        )
            .into_response(),
    }
}

async fn profiles_handler(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!(state.config.profiles))
}

async fn upgrade_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    let observer = state.session.attach();
    ws.on_upgrade(move |socket| observer_loop(socket, observer))
}

/// One attached observer: forward broadcasts out, route commands in.
/// Replies to commands go to this socket only. The loop ends (detaching
/// the observer) on disconnect or any send failure.
async fn observer_loop(mut socket: WebSocket, mut observer: ObserverSession) {
    loop {
        tokio::select! {
            event = observer.events.recv() => {
                let message = match event {
                    Ok(SessionEvent::Snapshot(snapshot)) => {
                        OutboundMessage::broadcast(Some(snapshot))
                    }
                    Ok(SessionEvent::NoData) => OutboundMessage::broadcast(None),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "observer lagged behind; dropping events");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                if send_json(&mut socket, &message).await.is_err() {
                    break;
                }
            }
            message = socket.recv() => {
                let Some(Ok(message)) = message else {
                    break;
                };
                match message {
                    Message::Text(text) => {
                        let reply = match parse_command(&text) {
                            Ok(command) => observer.request(command).await,
                            Err(VescError::MalformedRequest(reason)) => {
                                OutboundMessage::Error { error: reason }
                            }
                            Err(err) => OutboundMessage::error(err),
                        };
                        if send_json(&mut socket, &reply).await.is_err() {
                            break;
                        }
                    }
                    Message::Binary(_) => {
                        let reply = OutboundMessage::Error {
                            error: "binary unsupported".into(),
                        };
                        if send_json(&mut socket, &reply).await.is_err() {
                            break;
                        }
                    }
                    Message::Ping(payload) => {
                        if socket.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Message::Pong(_) => {}
                    Message::Close(_) => break,
                }
            }
        }
    }
}

async fn send_json(socket: &mut WebSocket, message: &OutboundMessage) -> std::io::Result<()> {
    let Ok(text) = message.to_json() else {
        warn!("failed to serialize outbound message");
        return Ok(());
    };
    socket
        .send(Message::Text(text))
        .await
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::BrokenPipe, "socket closed"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::VescClient;
    use crate::dispatcher::Dispatcher;
    use crate::session::SessionManager;
    use futures_util::{SinkExt, StreamExt};
    use std::time::Duration;
    use tokio_tungstenite::{connect_async, tungstenite::protocol::Message as WsMessage};

    async fn offline_server() -> (ServerHandle, watch::Sender<bool>) {
        let client = VescClient::new(Dispatcher::spawn(None));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (session, _task) =
            SessionManager::spawn(client, Duration::from_millis(20), shutdown_rx);
        let state = Arc::new(AppState {
            session,
            config: Config::default(),
        });
        let server = spawn("127.0.0.1:0".parse().unwrap(), state).await.unwrap();
        (server, shutdown_tx)
    }

    #[tokio::test]
    async fn observer_gets_no_data_broadcasts_and_command_replies() {
        let (handle, _shutdown) = offline_server().await;
        let url = format!("ws://{}/ws", handle.local_addr());
        let (mut socket, _response) = connect_async(&url).await.unwrap();

        // The offline link yields explicit no-data events on every tick.
        let first = socket.next().await.unwrap().unwrap();
        let value: serde_json::Value = match first {
            WsMessage::Text(text) => serde_json::from_str(&text).unwrap(),
            other => panic!("unexpected message: {other:?}"),
        };
        assert_eq!(value["event"], "vesc_data_received");
        assert_eq!(value["data"], serde_json::Value::Null);

        // An unknown command is answered to this observer, connection open.
        socket
            .send(WsMessage::Text(r#"{"command": "WARP_DRIVE"}"#.into()))
            .await
            .unwrap();
        let reply = wait_for_key(&mut socket, "error").await;
        assert_eq!(reply["error"], "Unknown command");

        // A recognized command against the offline link reports failure.
        socket
            .send(WsMessage::Text(r#"{"command": "SET_PARKED"}"#.into()))
            .await
            .unwrap();
        let reply = wait_for_key(&mut socket, "parked").await;
        assert_eq!(reply["parked"], false);

        handle.shutdown().await.unwrap();
    }

    /// Skip broadcast frames until a reply carrying `key` arrives.
    async fn wait_for_key(
        socket: &mut (impl StreamExt<Item = std::result::Result<WsMessage, tokio_tungstenite::tungstenite::Error>>
                  + Unpin),
        key: &str,
    ) -> serde_json::Value {
        for _ in 0..50 {
            let message = socket.next().await.unwrap().unwrap();
            if let WsMessage::Text(text) = message {
                let value: serde_json::Value = serde_json::from_str(&text).unwrap();
                if value.get(key).is_some() {
                    return value;
                }
            }
        }
        panic!("no reply carrying {key:?}");
    }
}
