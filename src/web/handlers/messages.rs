//! Message sending and read-state handlers.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::directory::ProfileDirectory;
use crate::message_log::MessageLog;
use crate::read_state::ReadStateTracker;
use crate::web::state::SharedState;
use crate::web::utils::{error_response, message_to_json};

// -- Send message --

#[derive(Deserialize)]
pub struct SendMessageRequest {
    sender_id: String,
    content: String,
}

pub async fn send_message_handler(
    State(state): State<SharedState>,
    Path(conversation_id): Path<String>,
    axum::Json(req): axum::Json<SendMessageRequest>,
) -> Response {
    let st = state.lock().await;
    let log = MessageLog::new(&st.storage);

    let message = match log.send(&conversation_id, &req.sender_id, &req.content) {
        Ok(m) => m,
        Err(e) => return error_response(&e),
    };

    // Fan out to live subscribers; consumers dedup by message id.
    st.notifier.message_appended(&message);

    let directory = ProfileDirectory::new(&st.storage);
    let profiles = match directory.get_profiles([message.sender_id.as_str()]) {
        Ok(p) => p,
        Err(e) => return error_response(&e),
    };

    (
        StatusCode::CREATED,
        axum::Json(message_to_json(&message, &profiles)),
    )
        .into_response()
}

// -- Mark conversation read --

#[derive(Deserialize)]
pub struct MarkReadRequest {
    user_id: String,
}

pub async fn mark_read_handler(
    State(state): State<SharedState>,
    Path(conversation_id): Path<String>,
    axum::Json(req): axum::Json<MarkReadRequest>,
) -> Response {
    let st = state.lock().await;
    let tracker = ReadStateTracker::new(&st.storage);

    match tracker.mark_read(&conversation_id, &req.user_id) {
        Ok(marked) => {
            if marked > 0 {
                st.notifier
                    .conversation_read(&conversation_id, &req.user_id, marked);
            }
            let json = serde_json::json!({ "status": "ok", "marked": marked });
            (StatusCode::OK, axum::Json(json)).into_response()
        }
        Err(e) => error_response(&e),
    }
}

// -- Unread count --

#[derive(Deserialize)]
pub struct UnreadQuery {
    user_id: String,
}

pub async fn unread_count_handler(
    State(state): State<SharedState>,
    Path(conversation_id): Path<String>,
    Query(params): Query<UnreadQuery>,
) -> Response {
    let st = state.lock().await;
    let tracker = ReadStateTracker::new(&st.storage);

    match tracker.unread_count(&conversation_id, &params.user_id) {
        Ok(count) => {
            let json = serde_json::json!({ "count": count });
            (StatusCode::OK, axum::Json(json)).into_response()
        }
        Err(e) => error_response(&e),
    }
}
