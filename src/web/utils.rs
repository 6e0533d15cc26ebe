//! Shared utility functions for the web server.

use std::collections::HashMap;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::directory::ProfileInfo;
use crate::error::MessagingError;
use crate::storage::MessageRow;

/// Build a standard JSON error response.
pub fn api_error(status: StatusCode, message: impl Into<String>) -> Response {
    let body = serde_json::json!({ "error": message.into() });
    (status, axum::Json(body)).into_response()
}

/// Map a messaging error to its HTTP response.
pub fn error_response(err: &MessagingError) -> Response {
    let status = match err {
        MessagingError::InvalidParticipants(_)
        | MessagingError::InvalidName
        | MessagingError::EmptyMessage => StatusCode::BAD_REQUEST,
        MessagingError::NotAParticipant { .. } => StatusCode::FORBIDDEN,
        MessagingError::NotFound(_) => StatusCode::NOT_FOUND,
        MessagingError::ParticipantLinkFailed { .. } | MessagingError::StoreUnavailable(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    api_error(status, err.to_string())
}

/// Build the JSON representation of a message, with the sender decorated
/// from the profile directory.
pub fn message_to_json(
    m: &MessageRow,
    profiles: &HashMap<String, ProfileInfo>,
) -> serde_json::Value {
    let sender = profiles.get(&m.sender_id).map(|p| {
        serde_json::json!({
            "id": p.user_id,
            "name": p.name,
            "avatar_url": p.avatar_url,
        })
    });

    serde_json::json!({
        "message_id": m.message_id,
        "seq": m.seq,
        "conversation_id": m.conversation_id,
        "sender_id": m.sender_id,
        "content": m.content,
        "created_at": m.created_at,
        "is_read": m.is_read,
        "sender": sender,
    })
}
