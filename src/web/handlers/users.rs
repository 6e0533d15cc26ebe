//! People search and profile handlers.

use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::directory::ProfileDirectory;
use crate::storage::ProfileRow;
use crate::web::config::SEARCH_LIMIT;
use crate::web::state::SharedState;
use crate::web::utils::{api_error, error_response};

#[derive(Deserialize)]
pub struct SearchQuery {
    q: String,
    user_id: String,
}

/// Search people to start a conversation with. The searching user is
/// excluded from results.
pub async fn search_users_handler(
    State(state): State<SharedState>,
    Query(params): Query<SearchQuery>,
) -> Response {
    let st = state.lock().await;
    let directory = ProfileDirectory::new(&st.storage);

    match directory.search(&params.q, &params.user_id, SEARCH_LIMIT) {
        Ok(profiles) => {
            let json: Vec<serde_json::Value> = profiles
                .iter()
                .map(|p| {
                    serde_json::json!({
                        "id": p.user_id,
                        "name": p.name,
                        "avatar_url": p.avatar_url,
                        "major": p.major,
                        "year": p.year,
                    })
                })
                .collect();
            (StatusCode::OK, axum::Json(serde_json::json!(json))).into_response()
        }
        Err(e) => error_response(&e),
    }
}

pub async fn get_profile_handler(
    State(state): State<SharedState>,
    Path(user_id): Path<String>,
) -> Response {
    let st = state.lock().await;
    let directory = ProfileDirectory::new(&st.storage);

    match directory.get_profile(&user_id) {
        Ok(profile) => {
            let json = serde_json::json!({
                "id": profile.user_id,
                "name": profile.name,
                "avatar_url": profile.avatar_url,
            });
            (StatusCode::OK, axum::Json(json)).into_response()
        }
        Err(e) => error_response(&e),
    }
}

#[derive(Deserialize)]
pub struct UpdateProfileRequest {
    name: String,
    avatar_url: Option<String>,
    major: Option<String>,
    year: Option<String>,
}

/// Seed or refresh a profile. Profiles are owned by the identity platform;
/// this endpoint exists for provisioning and tests.
pub async fn update_profile_handler(
    State(state): State<SharedState>,
    Path(user_id): Path<String>,
    axum::Json(req): axum::Json<UpdateProfileRequest>,
) -> Response {
    if req.name.trim().is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "name cannot be empty");
    }

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();

    let st = state.lock().await;
    let directory = ProfileDirectory::new(&st.storage);
    let row = ProfileRow {
        user_id: user_id.clone(),
        name: req.name.trim().to_string(),
        avatar_url: req.avatar_url,
        major: req.major,
        year: req.year,
        updated_at: now,
    };

    match directory.upsert(&row) {
        Ok(()) => {
            let json = serde_json::json!({ "status": "ok", "user_id": user_id });
            (StatusCode::OK, axum::Json(json)).into_response()
        }
        Err(e) => error_response(&e),
    }
}
