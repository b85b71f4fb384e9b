//! HTTP routes — group directory, message history, news posting.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::Deserialize;

use crate::services::chat::{self, Actor, ChatError};
use crate::services::groups::{self, GroupError, NEWS_GROUP_ID};
use crate::state::AppState;
use crate::store::{ChatMessage, Group, HistoryFilter};

/// Author shown on posts to the news group.
pub const NEWS_AUTHOR: &str = "Новости";

#[derive(Deserialize)]
pub struct CreateGroupBody {
    #[serde(default)]
    pub name: String,
}

#[derive(Deserialize)]
pub struct GroupHistoryQuery {
    pub group_id: Option<String>,
}

#[derive(Deserialize)]
pub struct PrivateHistoryQuery {
    #[serde(default)]
    pub me: String,
    #[serde(default)]
    pub with: String,
}

#[derive(Deserialize)]
pub struct TokenQuery {
    #[serde(default)]
    pub token: String,
}

#[derive(Deserialize)]
pub struct NewsBody {
    #[serde(default)]
    pub text: String,
}

/// `GET /api/groups` — list groups, news first.
pub async fn list_groups(State(state): State<AppState>) -> Json<Vec<Group>> {
    Json(groups::list(&state).await)
}

/// `POST /api/groups` — create a group and announce it on every socket.
pub async fn create_group(
    State(state): State<AppState>,
    Json(body): Json<CreateGroupBody>,
) -> Result<(StatusCode, Json<Group>), StatusCode> {
    let group = groups::create_group(&state, &body.name).await.map_err(group_error_to_status)?;
    Ok((StatusCode::CREATED, Json(group)))
}

/// `GET /api/messages?group_id=` — group history, all groups when unset.
pub async fn group_history(
    State(state): State<AppState>,
    Query(query): Query<GroupHistoryQuery>,
) -> Result<Json<Vec<ChatMessage>>, StatusCode> {
    let group_id = query.group_id.filter(|id| !id.is_empty());
    let messages = state
        .store
        .query(&HistoryFilter::Group(group_id))
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "group history query failed");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
    Ok(Json(messages))
}

/// `GET /api/private?me=&with=` — direct history between two names.
pub async fn private_history(
    State(state): State<AppState>,
    Query(query): Query<PrivateHistoryQuery>,
) -> Result<Json<Vec<ChatMessage>>, StatusCode> {
    let me = query.me.trim();
    let with = query.with.trim();
    if me.is_empty() || with.is_empty() {
        return Ok(Json(Vec::new()));
    }
    let messages = state
        .store
        .query(&HistoryFilter::Pair(me.to_owned(), with.to_owned()))
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "private history query failed");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
    Ok(Json(messages))
}

/// `POST /api/admin/news?token=` — post to the read-only news group.
pub async fn post_news(
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
    Json(body): Json<NewsBody>,
) -> Result<Json<ChatMessage>, StatusCode> {
    if query.token.is_empty() || query.token != state.config.admin_news_token {
        return Err(StatusCode::UNAUTHORIZED);
    }
    let actor = Actor::System(NEWS_AUTHOR.to_owned());
    let posted = chat::send_group(&state, None, NEWS_GROUP_ID, &actor, body.text.trim())
        .await
        .map_err(chat_error_to_status)?;
    posted.map(Json).ok_or(StatusCode::FORBIDDEN)
}

pub(crate) fn group_error_to_status(err: GroupError) -> StatusCode {
    match err {
        GroupError::InvalidName => StatusCode::BAD_REQUEST,
    }
}

pub(crate) fn chat_error_to_status(err: ChatError) -> StatusCode {
    match err {
        ChatError::InvalidTarget(_) => StatusCode::NOT_FOUND,
        ChatError::EmptyTarget => StatusCode::BAD_REQUEST,
    }
}

#[cfg(test)]
#[path = "api_test.rs"]
mod tests;
