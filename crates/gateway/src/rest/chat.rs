//! Chat lifecycle endpoints.

use crate::{auth::CurrentUser, error::GatewayResult, state::GatewayState};
use axum::{
    extract::{Path, State},
    Json,
};
use parley_database::entities::Chat;
use parley_realtime::MembershipOutcome;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct AccessChatRequest {
    pub user_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateGroupRequest {
    pub name: String,
    pub user_ids: Vec<i64>,
}

#[derive(Debug, Deserialize)]
pub struct RenameRequest {
    pub chat_id: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct MembershipRequest {
    pub chat_id: String,
    pub user_id: i64,
}

#[derive(Debug, Serialize)]
pub struct LeaveResponse {
    pub deleted: bool,
    pub new_admin: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct RemoveMemberResponse {
    pub deleted: bool,
    pub chat: Option<Chat>,
}

/// `POST /api/chats`: open (or create) the direct chat with another user.
pub async fn access_chat(
    State(state): State<GatewayState>,
    CurrentUser(user): CurrentUser,
    Json(request): Json<AccessChatRequest>,
) -> GatewayResult<Json<Chat>> {
    let chat = state.lifecycle.access_or_create(user.id, request.user_id).await?;
    Ok(Json(chat))
}

/// `GET /api/chats`: the caller's chats, most recently active first.
pub async fn list_chats(
    State(state): State<GatewayState>,
    CurrentUser(user): CurrentUser,
) -> GatewayResult<Json<Vec<Chat>>> {
    let chats = state.lifecycle.list_for_user(user.id).await?;
    Ok(Json(chats))
}

/// `POST /api/chats/group`: create a group chat with the caller as admin.
pub async fn create_group(
    State(state): State<GatewayState>,
    CurrentUser(user): CurrentUser,
    Json(request): Json<CreateGroupRequest>,
) -> GatewayResult<Json<Chat>> {
    let chat = state
        .lifecycle
        .create_group(user.id, &request.name, &request.user_ids)
        .await?;
    Ok(Json(chat))
}

/// `GET /api/chats/group/:chat_id`: fetch one chat the caller belongs to.
pub async fn get_chat(
    State(state): State<GatewayState>,
    CurrentUser(user): CurrentUser,
    Path(chat_id): Path<String>,
) -> GatewayResult<Json<Chat>> {
    let chat = state.lifecycle.chat_for_member(user.id, &chat_id).await?;
    Ok(Json(chat))
}

/// `PUT /api/chats/rename`: rename a group; any member may.
pub async fn rename_chat(
    State(state): State<GatewayState>,
    CurrentUser(user): CurrentUser,
    Json(request): Json<RenameRequest>,
) -> GatewayResult<Json<Chat>> {
    let chat = state
        .lifecycle
        .rename(user.id, &request.chat_id, &request.name)
        .await?;
    Ok(Json(chat))
}

/// `PUT /api/chats/group/add`: admin adds a member.
pub async fn add_member(
    State(state): State<GatewayState>,
    CurrentUser(user): CurrentUser,
    Json(request): Json<MembershipRequest>,
) -> GatewayResult<Json<Chat>> {
    let chat = state
        .lifecycle
        .add_member(user.id, &request.chat_id, request.user_id)
        .await?;
    Ok(Json(chat))
}

/// `PUT /api/chats/group/remove`: the admin removes any member; everyone
/// else may only remove themself.
pub async fn remove_member(
    State(state): State<GatewayState>,
    CurrentUser(user): CurrentUser,
    Json(request): Json<MembershipRequest>,
) -> GatewayResult<Json<RemoveMemberResponse>> {
    let chat = state
        .lifecycle
        .remove_member(user.id, &request.chat_id, request.user_id)
        .await?;
    Ok(Json(RemoveMemberResponse {
        deleted: chat.is_none(),
        chat,
    }))
}

/// `PUT /api/chats/leave/:chat_id`: leave a chat; the last member out
/// deletes it.
pub async fn leave_chat(
    State(state): State<GatewayState>,
    CurrentUser(user): CurrentUser,
    Path(chat_id): Path<String>,
) -> GatewayResult<Json<LeaveResponse>> {
    let outcome = state.lifecycle.leave(user.id, &chat_id).await?;
    let response = match outcome {
        MembershipOutcome::Updated { new_admin } => LeaveResponse {
            deleted: false,
            new_admin,
        },
        MembershipOutcome::ChatDeleted => LeaveResponse {
            deleted: true,
            new_admin: None,
        },
    };
    Ok(Json(response))
}
