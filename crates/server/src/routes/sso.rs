use axum::{
    extract::{Path, State},
    Json,
};
use rusqlite::Connection;
use uuid::Uuid;

use userhub_api::{
    db,
    service::{self, IdpType},
    OkResponse, PutSsoConfigRequest, SsoConfigResponse,
};

use crate::error::ApiErr;
use crate::routes::auth::AuthUser;
use crate::storage::{sq_execute, sq_query_row};
use crate::{audit, perms, AppState};

/// SSO configuration is restricted to admins and owners of the
/// organization (team).
fn require_sso_admin(conn: &Connection, org_id: &str, user_id: &str) -> Result<(), ApiErr> {
    let role = perms::team_role(conn, org_id, user_id)
        .ok_or_else(|| ApiErr::forbidden("not a member of this organization"))?;
    if !role.can_manage_members() {
        return Err(ApiErr::forbidden("admin role required"));
    }
    Ok(())
}

pub async fn get_config(
    State(state): State<AppState>,
    user: AuthUser,
    Path((org_id, idp_type)): Path<(String, String)>,
) -> Result<Json<SsoConfigResponse>, ApiErr> {
    let idp = IdpType::parse(&idp_type)?;

    let conn = state.db.conn();
    require_sso_admin(&conn, &org_id, &user.user_id)?;

    let (enabled, config_json, updated_at) =
        match sq_query_row(&conn, db::sso::get(&org_id, idp.as_str()), |row| {
            Ok((
                row.get::<_, bool>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        }) {
            Ok(row) => row,
            Err(rusqlite::Error::QueryReturnedNoRows) => {
                return Err(ApiErr::not_found("no SSO configuration for this provider"))
            }
            Err(e) => return Err(ApiErr::from_db("sso: get")(e)),
        };

    let config: serde_json::Value = serde_json::from_str(&config_json)
        .map_err(ApiErr::from_db("sso: stored config parse"))?;

    Ok(Json(SsoConfigResponse {
        org_id,
        idp_type: idp.as_str().to_string(),
        enabled,
        config: service::redact_sso_config(idp, &config),
        updated_at,
    }))
}

pub async fn put_config(
    State(state): State<AppState>,
    user: AuthUser,
    Path((org_id, idp_type)): Path<(String, String)>,
    Json(req): Json<PutSsoConfigRequest>,
) -> Result<Json<SsoConfigResponse>, ApiErr> {
    let idp = IdpType::parse(&idp_type)?;
    service::validate_sso_config(idp, &req.config)?;
    let config_json = serde_json::to_string(&req.config)
        .map_err(ApiErr::from_db("sso: config serialize"))?;

    {
        let conn = state.db.conn();
        require_sso_admin(&conn, &org_id, &user.user_id)?;
        sq_execute(
            &conn,
            db::sso::upsert(
                &Uuid::new_v4().to_string(),
                &org_id,
                idp.as_str(),
                req.enabled,
                &config_json,
            ),
        )
        .map_err(ApiErr::from_db("sso: upsert"))?;
    }

    audit::log_user_action(
        &state.db,
        &user.user_id,
        "sso.configure",
        Some(&org_id),
        Some(idp.as_str()),
    );

    let conn = state.db.conn();
    let updated_at: String = sq_query_row(&conn, db::sso::get(&org_id, idp.as_str()), |row| {
        row.get(2)
    })
    .map_err(ApiErr::from_db("sso: reread"))?;

    Ok(Json(SsoConfigResponse {
        org_id,
        idp_type: idp.as_str().to_string(),
        enabled: req.enabled,
        config: service::redact_sso_config(idp, &req.config),
        updated_at,
    }))
}

pub async fn delete_config(
    State(state): State<AppState>,
    user: AuthUser,
    Path((org_id, idp_type)): Path<(String, String)>,
) -> Result<Json<OkResponse>, ApiErr> {
    let idp = IdpType::parse(&idp_type)?;

    let removed = {
        let conn = state.db.conn();
        require_sso_admin(&conn, &org_id, &user.user_id)?;
        sq_execute(&conn, db::sso::delete(&org_id, idp.as_str()))
            .map_err(ApiErr::from_db("sso: delete"))?
    };
    if removed == 0 {
        return Err(ApiErr::not_found("no SSO configuration for this provider"));
    }

    audit::log_user_action(
        &state.db,
        &user.user_id,
        "sso.delete",
        Some(&org_id),
        Some(idp.as_str()),
    );
    Ok(Json(OkResponse { ok: true }))
}
