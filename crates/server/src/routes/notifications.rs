use axum::{
    extract::{Path, Query, State},
    Json,
};

use userhub_api::{db, ListNotificationsResponse, NotificationListQuery, NotificationResponse, OkResponse};

use crate::error::ApiErr;
use crate::routes::auth::AuthUser;
use crate::storage::{sq_execute, sq_query_all};
use crate::{notify, AppState};

const NOTIFICATION_PAGE: u64 = 100;

pub async fn list(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<NotificationListQuery>,
) -> Result<Json<ListNotificationsResponse>, ApiErr> {
    // Flush queued entries first so the caller sees them.
    notify::flush(&state.notifications, &state.db);

    let conn = state.db.conn();
    let notifications = sq_query_all(
        &conn,
        db::notifications::list_for_user(&user.user_id, query.unread_only, NOTIFICATION_PAGE),
        |row| {
            Ok(NotificationResponse {
                id: row.get(0)?,
                kind: row.get(1)?,
                title: row.get(2)?,
                body: row.get(3)?,
                read: row.get(4)?,
                created_at: row.get(5)?,
            })
        },
    )
    .map_err(ApiErr::from_db("notifications: list"))?;
    Ok(Json(ListNotificationsResponse { notifications }))
}

pub async fn mark_read(
    State(state): State<AppState>,
    user: AuthUser,
    Path(notification_id): Path<String>,
) -> Result<Json<OkResponse>, ApiErr> {
    let conn = state.db.conn();
    let updated = sq_execute(
        &conn,
        db::notifications::mark_read(&notification_id, &user.user_id),
    )
    .map_err(ApiErr::from_db("notifications: mark read"))?;
    if updated == 0 {
        return Err(ApiErr::not_found("notification not found"));
    }
    Ok(Json(OkResponse { ok: true }))
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<OkResponse>, ApiErr> {
    notify::flush(&state.notifications, &state.db);
    let conn = state.db.conn();
    sq_execute(&conn, db::notifications::mark_all_read(&user.user_id))
        .map_err(ApiErr::from_db("notifications: mark all"))?;
    Ok(Json(OkResponse { ok: true }))
}
