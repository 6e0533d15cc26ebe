//! WebSocket upgrade and connection handling.

use std::sync::atomic::Ordering;

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use tokio::sync::broadcast;

use crate::web::config::MAX_WS_CONNECTIONS;
use crate::web::state::SharedState;
use crate::web::utils::api_error;

#[derive(Deserialize)]
pub struct WsQuery {
    /// When set, only this conversation's events are forwarded.
    conversation_id: Option<String>,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsQuery>,
    State(state): State<SharedState>,
) -> Response {
    // Check connection limit before upgrading
    let ws_count = {
        let st = state.lock().await;
        st.ws_connection_count.clone()
    };

    let current = ws_count.load(Ordering::Relaxed);
    if current >= MAX_WS_CONNECTIONS {
        return api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            format!("too many WebSocket connections (max {})", MAX_WS_CONNECTIONS),
        );
    }

    ws.on_upgrade(move |socket| ws_connection(socket, state, params.conversation_id))
        .into_response()
}

async fn ws_connection(mut socket: WebSocket, state: SharedState, filter: Option<String>) {
    // Subscribe to the event stream and increment connection count
    let (mut rx, ws_count) = {
        let st = state.lock().await;
        let count = st.ws_connection_count.clone();
        count.fetch_add(1, Ordering::Relaxed);
        (st.notifier.subscribe_all(), count)
    };

    loop {
        tokio::select! {
            // Forward events to the WebSocket client
            result = rx.recv() => {
                match result {
                    Ok(event) => {
                        if let Some(ref wanted) = filter {
                            if event.conversation_id() != wanted {
                                continue;
                            }
                        }
                        if let Ok(json) = serde_json::to_string(&event) {
                            if socket.send(WsMessage::Text(json)).await.is_err() {
                                break; // client disconnected
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        crate::qlog!("ws client lagged, skipped {n} events");
                        // Notify client so it can refresh from the message log
                        let lag_msg = serde_json::json!({
                            "type": "events_missed",
                            "count": n,
                        });
                        if let Ok(json) = serde_json::to_string(&lag_msg) {
                            if socket.send(WsMessage::Text(json)).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            // Handle incoming frames from the client
            msg = socket.recv() => {
                match msg {
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Ok(WsMessage::Ping(data))) => {
                        let _ = socket.send(WsMessage::Pong(data)).await;
                    }
                    _ => {} // clients have nothing else to say on this socket
                }
            }
        }
    }

    // Decrement connection count on disconnect
    ws_count.fetch_sub(1, Ordering::Relaxed);
}
