//! Axum router construction.

use axum::routing::{get, post};
use axum::Router;

use crate::web::handlers;
use crate::web::state::SharedState;

/// Build the complete Axum router with all API routes.
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        // Health
        .route("/api/health", get(handlers::health::health_handler))
        // Conversations API
        .route(
            "/api/conversations",
            get(handlers::conversations::list_conversations_handler),
        )
        .route(
            "/api/conversations/direct",
            post(handlers::conversations::ensure_direct_handler),
        )
        .route(
            "/api/conversations/group",
            post(handlers::conversations::create_group_handler),
        )
        .route(
            "/api/conversations/:conversation_id",
            get(handlers::conversations::get_conversation_handler),
        )
        .route(
            "/api/conversations/:conversation_id/messages",
            get(handlers::conversations::list_messages_handler)
                .post(handlers::messages::send_message_handler),
        )
        .route(
            "/api/conversations/:conversation_id/read",
            post(handlers::messages::mark_read_handler),
        )
        .route(
            "/api/conversations/:conversation_id/unread",
            get(handlers::messages::unread_count_handler),
        )
        // Users API
        .route(
            "/api/users/search",
            get(handlers::users::search_users_handler),
        )
        .route(
            "/api/users/:user_id/profile",
            get(handlers::users::get_profile_handler).put(handlers::users::update_profile_handler),
        )
        // WebSocket
        .route("/api/ws", get(handlers::websocket::ws_handler))
        .with_state(state)
}
