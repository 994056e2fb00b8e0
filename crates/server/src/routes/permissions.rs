use axum::{
    extract::{Query, State},
    Json,
};

use userhub_api::{PermissionCheckQuery, PermissionCheckResponse};
use userhub_core::Action;

use crate::error::ApiErr;
use crate::routes::auth::AuthUser;
use crate::AppState;

pub async fn check(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<PermissionCheckQuery>,
) -> Result<Json<PermissionCheckResponse>, ApiErr> {
    if query.resource.trim().is_empty() {
        return Err(ApiErr::bad_request("resource is required"));
    }
    let action = Action::parse(&query.action)
        .ok_or_else(|| ApiErr::bad_request(format!("unknown action: {}", query.action)))?;

    let conn = state.db.conn();
    let allowed = state
        .perms
        .check(&conn, &user.user_id, &query.resource, action)
        .map_err(ApiErr::from_db("permission check"))?;
    Ok(Json(PermissionCheckResponse { allowed }))
}
