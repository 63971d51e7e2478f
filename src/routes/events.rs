//! Match-changed websocket feed.
//!
//! Each connection receives every [`MatchEvent`](crate::events::MatchEvent)
//! as a JSON text message. A client that lags behind the bus gets a single
//! `{"kind":"resync"}` message and should refetch what it shows.

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::state::AppState;

pub const RESYNC_MESSAGE: &str = r#"{"kind":"resync"}"#;

/// `GET /api/events`
pub async fn handle_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| run_ws(socket, state))
}

async fn run_ws(mut socket: WebSocket, state: AppState) {
    let mut rx = state.events.subscribe();
    info!(subscribers = state.events.subscriber_count(), "event stream connected");

    loop {
        tokio::select! {
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(error = %e, "event stream receive failed");
                    break;
                }
            },
            event = rx.recv() => {
                let text = match event {
                    Ok(event) => match serde_json::to_string(&event) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!(error = %e, "match event serialize failed");
                            continue;
                        }
                    },
                    Err(RecvError::Lagged(missed)) => {
                        warn!(missed, "event stream lagged; asking client to resync");
                        RESYNC_MESSAGE.to_string()
                    }
                    Err(RecvError::Closed) => break,
                };
                if socket.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
        }
    }

    info!("event stream closed");
}
