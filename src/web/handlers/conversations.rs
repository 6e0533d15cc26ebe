//! Conversation listing, resolution, and creation handlers.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::directory::ProfileDirectory;
use crate::message_log::{Cursor, MessageLog};
use crate::resolver::ConversationResolver;
use crate::web::config::DEFAULT_PAGE_LIMIT;
use crate::web::state::SharedState;
use crate::web::utils::{api_error, error_response, message_to_json};

#[derive(Deserialize)]
pub struct ViewerQuery {
    user_id: String,
}

/// List the viewer's conversations with participants, the latest message,
/// and their unread count, most recent activity first.
pub async fn list_conversations_handler(
    State(state): State<SharedState>,
    Query(params): Query<ViewerQuery>,
) -> Response {
    let st = state.lock().await;
    let directory = ProfileDirectory::new(&st.storage);

    let summaries = match st.storage.list_conversation_summaries(&params.user_id) {
        Ok(s) => s,
        Err(e) => return api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };

    let mut json = Vec::with_capacity(summaries.len());
    for summary in &summaries {
        let participants = st
            .storage
            .list_participants(&summary.conversation_id)
            .unwrap_or_default();
        let ids: Vec<&str> = participants.iter().map(|p| p.user_id.as_str()).collect();
        let profiles = match directory.get_profiles(ids) {
            Ok(p) => p,
            Err(e) => return error_response(&e),
        };

        // Direct conversations display as the other participant.
        let display_name = match summary.kind.as_str() {
            "direct" => participants
                .iter()
                .find(|p| p.user_id != params.user_id)
                .and_then(|p| profiles.get(&p.user_id))
                .map(|p| p.name.clone()),
            _ => summary.name.clone(),
        };

        let participant_json: Vec<serde_json::Value> = participants
            .iter()
            .filter_map(|p| profiles.get(&p.user_id))
            .map(|p| {
                serde_json::json!({
                    "id": p.user_id,
                    "name": p.name,
                    "avatar_url": p.avatar_url,
                })
            })
            .collect();

        json.push(serde_json::json!({
            "conversation_id": summary.conversation_id,
            "kind": summary.kind,
            "name": display_name,
            "created_at": summary.created_at,
            "participants": participant_json,
            "last_message": summary.last_content.as_ref().map(|content| {
                serde_json::json!({
                    "content": content,
                    "sender_id": summary.last_sender_id,
                    "created_at": summary.last_timestamp,
                })
            }),
            "unread_count": summary.unread_count,
        }));
    }

    (StatusCode::OK, axum::Json(serde_json::json!(json))).into_response()
}

// -- Ensure direct conversation --

#[derive(Deserialize)]
pub struct EnsureDirectRequest {
    user_id: String,
    other_user_id: String,
}

pub async fn ensure_direct_handler(
    State(state): State<SharedState>,
    axum::Json(req): axum::Json<EnsureDirectRequest>,
) -> Response {
    let st = state.lock().await;
    let resolver = ConversationResolver::new(&st.storage);

    match resolver.ensure_direct_conversation(&req.user_id, &req.other_user_id) {
        Ok(resolved) => {
            let status = if resolved.existing {
                StatusCode::OK
            } else {
                StatusCode::CREATED
            };
            let json = serde_json::json!({
                "conversation_id": resolved.conversation.conversation_id,
                "kind": resolved.conversation.kind,
                "created_at": resolved.conversation.created_at,
                "existing": resolved.existing,
            });
            (status, axum::Json(json)).into_response()
        }
        Err(e) => error_response(&e),
    }
}

// -- Create group / course channel --

#[derive(Deserialize)]
pub struct CreateGroupRequest {
    creator_id: String,
    name: String,
    member_ids: Vec<String>,
    /// "group" (default) or "course_channel"
    kind: Option<String>,
}

pub async fn create_group_handler(
    State(state): State<SharedState>,
    axum::Json(req): axum::Json<CreateGroupRequest>,
) -> Response {
    let st = state.lock().await;
    let resolver = ConversationResolver::new(&st.storage);

    let result = match req.kind.as_deref() {
        None | Some("group") => {
            resolver.create_group_conversation(&req.creator_id, &req.name, &req.member_ids)
        }
        Some("course_channel") => {
            resolver.create_course_channel(&req.creator_id, &req.name, &req.member_ids)
        }
        Some(other) => {
            return api_error(
                StatusCode::BAD_REQUEST,
                format!("unknown conversation kind: {other}"),
            )
        }
    };

    match result {
        Ok(conversation) => {
            let json = serde_json::json!({
                "conversation_id": conversation.conversation_id,
                "kind": conversation.kind,
                "name": conversation.name,
                "created_at": conversation.created_at,
            });
            (StatusCode::CREATED, axum::Json(json)).into_response()
        }
        Err(e) => error_response(&e),
    }
}

// -- Conversation detail --

pub async fn get_conversation_handler(
    State(state): State<SharedState>,
    Path(conversation_id): Path<String>,
) -> Response {
    let st = state.lock().await;
    let directory = ProfileDirectory::new(&st.storage);

    let conversation = match st.storage.get_conversation(&conversation_id) {
        Ok(Some(c)) => c,
        Ok(None) => return api_error(StatusCode::NOT_FOUND, "conversation not found"),
        Err(e) => return api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };

    let participants = st
        .storage
        .list_participants(&conversation_id)
        .unwrap_or_default();
    let ids: Vec<&str> = participants.iter().map(|p| p.user_id.as_str()).collect();
    let profiles = match directory.get_profiles(ids) {
        Ok(p) => p,
        Err(e) => return error_response(&e),
    };
    let participant_json: Vec<serde_json::Value> = participants
        .iter()
        .filter_map(|p| profiles.get(&p.user_id))
        .map(|p| {
            serde_json::json!({
                "id": p.user_id,
                "name": p.name,
                "avatar_url": p.avatar_url,
            })
        })
        .collect();

    let json = serde_json::json!({
        "conversation_id": conversation.conversation_id,
        "kind": conversation.kind,
        "name": conversation.name,
        "created_at": conversation.created_at,
        "participants": participant_json,
    });
    (StatusCode::OK, axum::Json(json)).into_response()
}

// -- Message listing --

#[derive(Deserialize)]
pub struct ListMessagesQuery {
    before_ts: Option<u64>,
    before_seq: Option<i64>,
    limit: Option<u32>,
}

pub async fn list_messages_handler(
    State(state): State<SharedState>,
    Path(conversation_id): Path<String>,
    Query(params): Query<ListMessagesQuery>,
) -> Response {
    let st = state.lock().await;
    let log = MessageLog::new(&st.storage);
    let directory = ProfileDirectory::new(&st.storage);

    let before = match (params.before_ts, params.before_seq) {
        (Some(created_at), Some(seq)) => Some(Cursor { created_at, seq }),
        (None, None) => None,
        _ => {
            return api_error(
                StatusCode::BAD_REQUEST,
                "before_ts and before_seq must be passed together",
            )
        }
    };
    let limit = params.limit.unwrap_or(DEFAULT_PAGE_LIMIT);

    let messages = match log.list(&conversation_id, before, limit) {
        Ok(m) => m,
        Err(e) => return error_response(&e),
    };

    let sender_ids: Vec<&str> = messages.iter().map(|m| m.sender_id.as_str()).collect();
    let profiles = match directory.get_profiles(sender_ids) {
        Ok(p) => p,
        Err(e) => return error_response(&e),
    };

    let json: Vec<serde_json::Value> = messages
        .iter()
        .map(|m| message_to_json(m, &profiles))
        .collect();
    (StatusCode::OK, axum::Json(serde_json::json!(json))).into_response()
}
