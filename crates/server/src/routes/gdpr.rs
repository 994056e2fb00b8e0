use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use userhub_api::{
    db, service, DeletionRequestResponse, EventKind, ExportDetailResponse, ExportResponse,
    OkResponse,
};
use userhub_core::DomainEvent;

use crate::error::ApiErr;
use crate::routes::auth::{now_unix, AuthUser};
use crate::storage::{sq_execute, sq_query_all, sq_query_row, team_from_row};
use crate::{audit, AppState};

/// Days between a deletion request and its execution.
const DELETION_GRACE_DAYS: i64 = 30;

const EXPORT_AUDIT_LIMIT: u64 = 1000;

fn deletion_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DeletionRequestResponse> {
    Ok(DeletionRequestResponse {
        id: row.get(0)?,
        status: row.get(1)?,
        requested_at: row.get(2)?,
        grace_until: row.get(3)?,
    })
}

pub async fn request_deletion(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<(StatusCode, Json<DeletionRequestResponse>), ApiErr> {
    let id = Uuid::new_v4().to_string();
    let grace_until = service::datetime_in_days(now_unix(), DELETION_GRACE_DAYS)?;

    let response = {
        let conn = state.db.conn();
        let existing = sq_query_row(
            &conn,
            db::gdpr::pending_for_user(&user.user_id),
            deletion_from_row,
        );
        match existing {
            Ok(_) => return Err(ApiErr::conflict("a deletion request is already pending")),
            Err(rusqlite::Error::QueryReturnedNoRows) => {}
            Err(e) => return Err(ApiErr::from_db("gdpr: pending check")(e)),
        }

        sq_execute(
            &conn,
            db::gdpr::insert_deletion_request(&id, &user.user_id, &grace_until),
        )
        .map_err(ApiErr::from_db("gdpr: request"))?;
        sq_query_row(
            &conn,
            db::gdpr::pending_for_user(&user.user_id),
            deletion_from_row,
        )
        .map_err(ApiErr::from_db("gdpr: reread"))?
    };

    state.notifications.push(
        &user.user_id,
        "gdpr.deletion_requested",
        "Account deletion scheduled",
        Some(format!("Your account will be deleted after {grace_until}")),
    );
    audit::log_user_action(&state.db, &user.user_id, "gdpr.request_deletion", Some(&id), None);
    state.webhooks.dispatch(DomainEvent::new(
        EventKind::GdprDeletionRequested,
        serde_json::json!({"user_id": user.user_id, "grace_until": grace_until}),
    ));

    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn get_deletion_request(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<DeletionRequestResponse>, ApiErr> {
    let conn = state.db.conn();
    match sq_query_row(
        &conn,
        db::gdpr::pending_for_user(&user.user_id),
        deletion_from_row,
    ) {
        Ok(r) => Ok(Json(r)),
        Err(rusqlite::Error::QueryReturnedNoRows) => {
            Err(ApiErr::not_found("no pending deletion request"))
        }
        Err(e) => Err(ApiErr::from_db("gdpr: get")(e)),
    }
}

pub async fn cancel_deletion(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<OkResponse>, ApiErr> {
    let request_id = {
        let conn = state.db.conn();
        let request_id: String = match sq_query_row(
            &conn,
            db::gdpr::pending_for_user(&user.user_id),
            |row| row.get(0),
        ) {
            Ok(id) => id,
            Err(rusqlite::Error::QueryReturnedNoRows) => {
                return Err(ApiErr::not_found("no pending deletion request"))
            }
            Err(e) => return Err(ApiErr::from_db("gdpr: cancel lookup")(e)),
        };
        sq_execute(&conn, db::gdpr::update_status(&request_id, "cancelled"))
            .map_err(ApiErr::from_db("gdpr: cancel"))?;
        request_id
    };

    audit::log_user_action(
        &state.db,
        &user.user_id,
        "gdpr.cancel_deletion",
        Some(&request_id),
        None,
    );
    Ok(Json(OkResponse { ok: true }))
}

// ---------------------------------------------------------------------------
// Data export
// ---------------------------------------------------------------------------

pub async fn create_export(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<(StatusCode, Json<ExportResponse>), ApiErr> {
    let id = Uuid::new_v4().to_string();

    let created_at = {
        let conn = state.db.conn();

        let account = sq_query_row(&conn, db::users::get_by_id(&user.user_id), |row| {
            Ok(serde_json::json!({
                "id": row.get::<_, String>(0)?,
                "email": row.get::<_, String>(1)?,
                "nickname": row.get::<_, String>(2)?,
                "email_verified": row.get::<_, bool>(3)?,
                "created_at": row.get::<_, String>(5)?,
            }))
        })
        .map_err(ApiErr::from_db("export: user"))?;

        let profile = sq_query_row(&conn, db::profiles::get(&user.user_id), |row| {
            Ok(serde_json::json!({
                "display_name": row.get::<_, Option<String>>(0)?,
                "bio": row.get::<_, Option<String>>(1)?,
                "locale": row.get::<_, Option<String>>(2)?,
                "avatar_url": row.get::<_, Option<String>>(3)?,
            }))
        })
        .unwrap_or(serde_json::Value::Null);

        let teams = sq_query_all(&conn, db::teams::list_for_user(&user.user_id), team_from_row)
            .map_err(ApiErr::from_db("export: teams"))?;

        let webhooks: Vec<serde_json::Value> =
            sq_query_all(&conn, db::webhooks::list_for_user(&user.user_id), |row| {
                Ok(serde_json::json!({
                    "id": row.get::<_, String>(0)?,
                    "url": row.get::<_, String>(1)?,
                    "created_at": row.get::<_, String>(4)?,
                }))
            })
            .map_err(ApiErr::from_db("export: webhooks"))?;

        let audit_trail: Vec<serde_json::Value> = sq_query_all(
            &conn,
            db::audit::list_for_actor(&user.user_id, EXPORT_AUDIT_LIMIT),
            |row| {
                Ok(serde_json::json!({
                    "action": row.get::<_, String>(0)?,
                    "target_id": row.get::<_, Option<String>>(1)?,
                    "detail": row.get::<_, Option<String>>(2)?,
                    "created_at": row.get::<_, String>(3)?,
                }))
            },
        )
        .map_err(ApiErr::from_db("export: audit"))?;

        let document = serde_json::json!({
            "account": account,
            "profile": profile,
            "teams": teams,
            "webhooks": webhooks,
            "audit_trail": audit_trail,
        });
        let data =
            serde_json::to_string(&document).map_err(ApiErr::from_db("export: serialize"))?;

        sq_execute(&conn, db::gdpr::insert_export(&id, &user.user_id, "ready", &data))
            .map_err(ApiErr::from_db("export: insert"))?;
        sq_query_row(&conn, db::gdpr::get_export(&id, &user.user_id), |row| {
            row.get::<_, String>(1)
        })
        .map_err(ApiErr::from_db("export: reread"))?
    };

    state.notifications.push(
        &user.user_id,
        "gdpr.export_ready",
        "Your data export is ready",
        None,
    );
    audit::log_user_action(&state.db, &user.user_id, "gdpr.export", Some(&id), None);
    state.webhooks.dispatch(DomainEvent::new(
        EventKind::GdprExportReady,
        serde_json::json!({"user_id": user.user_id, "export_id": id}),
    ));

    Ok((
        StatusCode::CREATED,
        Json(ExportResponse {
            id,
            status: "ready".into(),
            created_at,
        }),
    ))
}

pub async fn get_export(
    State(state): State<AppState>,
    user: AuthUser,
    Path(export_id): Path<String>,
) -> Result<Json<ExportDetailResponse>, ApiErr> {
    let conn = state.db.conn();
    let (status, created_at, data) = match sq_query_row(
        &conn,
        db::gdpr::get_export(&export_id, &user.user_id),
        |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        },
    ) {
        Ok(row) => row,
        Err(rusqlite::Error::QueryReturnedNoRows) => {
            return Err(ApiErr::not_found("export not found"))
        }
        Err(e) => return Err(ApiErr::from_db("export: get")(e)),
    };

    let data: serde_json::Value =
        serde_json::from_str(&data).map_err(ApiErr::from_db("export: stored parse"))?;
    Ok(Json(ExportDetailResponse {
        id: export_id,
        status,
        created_at,
        data,
    }))
}
