//! Unread notification endpoints.

use crate::{auth::CurrentUser, error::GatewayResult, state::GatewayState};
use axum::{extract::State, Json};
use parley_database::entities::Notification;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct MarkReadResponse {
    pub cleared: u64,
}

/// `GET /api/notifications`: the caller's unread notifications, newest
/// first.
pub async fn list_notifications(
    State(state): State<GatewayState>,
    CurrentUser(user): CurrentUser,
) -> GatewayResult<Json<Vec<Notification>>> {
    let notifications = state.notifications.list_unread(user.id).await?;
    Ok(Json(notifications))
}

/// `PUT /api/notifications/read`: mark all of the caller's notifications
/// read.
pub async fn mark_all_read(
    State(state): State<GatewayState>,
    CurrentUser(user): CurrentUser,
) -> GatewayResult<Json<MarkReadResponse>> {
    let cleared = state.notifications.mark_all_read(user.id).await?;
    Ok(Json(MarkReadResponse { cleared }))
}
