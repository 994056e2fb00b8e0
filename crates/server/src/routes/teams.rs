use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use rusqlite::Connection;
use uuid::Uuid;

use userhub_api::{
    db, service, AcceptInvitationResponse, AddMemberRequest, CreateTeamRequest, EventKind,
    InvitationResponse, InviteRequest, ListInvitationsResponse, ListMembersResponse,
    ListTeamsResponse, OkResponse, TeamDetailResponse, TeamResponse, TeamRole, UpdateTeamRequest,
};
use userhub_core::{Action, DomainEvent};

use crate::error::ApiErr;
use crate::routes::auth::{now_unix, AuthUser};
use crate::storage::{
    invitation_from_row, member_from_row, sq_execute, sq_query_all, sq_query_row, team_from_row,
};
use crate::{audit, perms, AppState};

/// Team existence + caller membership in one shot. Missing team → 404,
/// non-member → 403.
fn require_member(conn: &Connection, team_id: &str, user_id: &str) -> Result<TeamRole, ApiErr> {
    let exists: bool = sq_query_row(conn, db::teams::exists(team_id), |row| row.get(0))
        .map_err(ApiErr::from_db("team lookup"))?;
    if !exists {
        return Err(ApiErr::not_found("team not found"));
    }
    perms::team_role(conn, team_id, user_id)
        .ok_or_else(|| ApiErr::forbidden("not a member of this team"))
}

/// Role of the member about to be removed. Missing member → 404; removing
/// the last owner → 400.
fn removable_role(conn: &Connection, team_id: &str, target_id: &str) -> Result<TeamRole, ApiErr> {
    let target_role = perms::team_role(conn, team_id, target_id)
        .ok_or_else(|| ApiErr::not_found("member not found"))?;

    if target_role == TeamRole::Owner {
        let owners: i64 = sq_query_row(conn, db::teams::owner_count(team_id), |row| row.get(0))
            .map_err(ApiErr::from_db("remove member: owners"))?;
        if owners <= 1 {
            return Err(ApiErr::bad_request("cannot remove the last owner"));
        }
    }
    Ok(target_role)
}

/// Reject an invitation when a pending one already exists for the email
/// or the invitee is already a member.
fn ensure_invitable(conn: &Connection, team_id: &str, email: &str) -> Result<(), ApiErr> {
    let pending: i64 = sq_query_row(conn, db::invitations::dup_check(team_id, email), |row| {
        row.get(0)
    })
    .map_err(ApiErr::from_db("invite: dup check"))?;
    if pending > 0 {
        return Err(ApiErr::conflict("a pending invitation already exists"));
    }

    // Already a member? No point inviting.
    if let Ok(invitee) = sq_query_row(conn, db::users::get_by_email_for_login(email), |row| {
        row.get::<_, String>(0)
    }) {
        let already: bool =
            sq_query_row(conn, db::teams::member_exists(team_id, &invitee), |row| {
                row.get(0)
            })
            .map_err(ApiErr::from_db("invite: member check"))?;
        if already {
            return Err(ApiErr::conflict("user is already a member"));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Team CRUD
// ---------------------------------------------------------------------------

pub async fn create_team(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<CreateTeamRequest>,
) -> Result<(StatusCode, Json<TeamResponse>), ApiErr> {
    let name = service::validate_team_name(&req.name)?;
    let team_id = Uuid::new_v4().to_string();

    let team = {
        let conn = state.db.conn();
        sq_execute(
            &conn,
            db::teams::insert(&team_id, &name, req.description.as_deref(), &user.user_id),
        )
        .map_err(ApiErr::from_db("create team"))?;
        sq_execute(&conn, db::teams::insert_member(&team_id, &user.user_id, "owner"))
            .map_err(ApiErr::from_db("create team: owner member"))?;
        sq_execute(&conn, db::grants::upsert(&user.user_id, &team_id, "owner"))
            .map_err(ApiErr::from_db("create team: grant"))?;
        state.perms.invalidate_resource(&conn, &team_id);
        sq_query_row(&conn, db::teams::get(&team_id), team_from_row)
            .map_err(ApiErr::from_db("create team: reread"))?
    };

    audit::log_user_action(&state.db, &user.user_id, "team.create", Some(&team_id), None);
    state.webhooks.dispatch(DomainEvent::new(
        EventKind::TeamCreated,
        serde_json::json!({"team_id": team_id, "created_by": user.user_id}),
    ));

    Ok((StatusCode::CREATED, Json(team)))
}

pub async fn list_my_teams(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<ListTeamsResponse>, ApiErr> {
    let conn = state.db.conn();
    let teams = sq_query_all(&conn, db::teams::list_for_user(&user.user_id), team_from_row)
        .map_err(ApiErr::from_db("list teams"))?;
    Ok(Json(ListTeamsResponse { teams }))
}

pub async fn get_team(
    State(state): State<AppState>,
    user: AuthUser,
    Path(team_id): Path<String>,
) -> Result<Json<TeamDetailResponse>, ApiErr> {
    let conn = state.db.conn();
    let my_role = perms::team_role(&conn, &team_id, &user.user_id);
    if my_role.is_none() {
        // Ancestor grants (e.g. on a parent org) may still allow viewing.
        let allowed = state
            .perms
            .check(&conn, &user.user_id, &team_id, Action::View)
            .map_err(ApiErr::from_db("get team: permission"))?;
        if !allowed {
            return Err(ApiErr::forbidden("not a member of this team"));
        }
    }

    let team = match sq_query_row(&conn, db::teams::get(&team_id), team_from_row) {
        Ok(t) => t,
        Err(rusqlite::Error::QueryReturnedNoRows) => {
            return Err(ApiErr::not_found("team not found"))
        }
        Err(e) => return Err(ApiErr::from_db("get team")(e)),
    };
    let member_count: i64 = sq_query_row(&conn, db::teams::member_count(&team_id), |row| {
        row.get(0)
    })
    .map_err(ApiErr::from_db("get team: count"))?;

    Ok(Json(TeamDetailResponse {
        team,
        member_count,
        my_role: my_role.map(|r| r.as_str().to_string()),
    }))
}

pub async fn update_team(
    State(state): State<AppState>,
    user: AuthUser,
    Path(team_id): Path<String>,
    Json(req): Json<UpdateTeamRequest>,
) -> Result<Json<TeamResponse>, ApiErr> {
    let conn = state.db.conn();
    let role = require_member(&conn, &team_id, &user.user_id)?;
    if !role.can_manage_members() {
        return Err(ApiErr::forbidden("admin role required"));
    }

    if let Some(name) = &req.name {
        let name = service::validate_team_name(name)?;
        sq_execute(&conn, db::teams::update_name(&team_id, &name))
            .map_err(ApiErr::from_db("update team: name"))?;
    }
    if let Some(description) = &req.description {
        sq_execute(&conn, db::teams::update_description(&team_id, description))
            .map_err(ApiErr::from_db("update team: description"))?;
    }

    sq_query_row(&conn, db::teams::get(&team_id), team_from_row)
        .map(Json)
        .map_err(ApiErr::from_db("update team: reread"))
}

pub async fn delete_team(
    State(state): State<AppState>,
    user: AuthUser,
    Path(team_id): Path<String>,
) -> Result<Json<OkResponse>, ApiErr> {
    {
        let conn = state.db.conn();
        let role = require_member(&conn, &team_id, &user.user_id)?;
        if !role.can_manage_settings() {
            return Err(ApiErr::forbidden("owner role required"));
        }

        sq_execute(&conn, db::teams::delete(&team_id))
            .map_err(ApiErr::from_db("delete team"))?;
        sq_execute(&conn, db::grants::delete_for_resource(&team_id))
            .map_err(ApiErr::from_db("delete team: grants"))?;
        state.perms.invalidate_resource(&conn, &team_id);
    }

    audit::log_user_action(&state.db, &user.user_id, "team.delete", Some(&team_id), None);
    state.webhooks.dispatch(DomainEvent::new(
        EventKind::TeamDeleted,
        serde_json::json!({"team_id": team_id, "deleted_by": user.user_id}),
    ));
    Ok(Json(OkResponse { ok: true }))
}

// ---------------------------------------------------------------------------
// Members
// ---------------------------------------------------------------------------

pub async fn list_members(
    State(state): State<AppState>,
    user: AuthUser,
    Path(team_id): Path<String>,
) -> Result<Json<ListMembersResponse>, ApiErr> {
    let conn = state.db.conn();
    require_member(&conn, &team_id, &user.user_id)?;
    let members = sq_query_all(&conn, db::teams::list_members(&team_id), member_from_row)
        .map_err(ApiErr::from_db("list members"))?;
    Ok(Json(ListMembersResponse { members }))
}

pub async fn add_member(
    State(state): State<AppState>,
    user: AuthUser,
    Path(team_id): Path<String>,
    Json(req): Json<AddMemberRequest>,
) -> Result<(StatusCode, Json<OkResponse>), ApiErr> {
    let email = service::validate_email(&req.email)?;
    let role = service::validate_member_role(req.role.as_deref())?;

    let target_id = {
        let conn = state.db.conn();
        let caller_role = require_member(&conn, &team_id, &user.user_id)?;
        if !caller_role.can_manage_members() {
            return Err(ApiErr::forbidden("admin role required"));
        }

        let target_id: String =
            match sq_query_row(&conn, db::users::get_by_email_for_login(&email), |row| {
                row.get(0)
            }) {
                Ok(id) => id,
                Err(rusqlite::Error::QueryReturnedNoRows) => {
                    return Err(ApiErr::not_found("no user with that email"))
                }
                Err(e) => return Err(ApiErr::from_db("add member: lookup")(e)),
            };

        let already: bool =
            sq_query_row(&conn, db::teams::member_exists(&team_id, &target_id), |row| {
                row.get(0)
            })
            .map_err(ApiErr::from_db("add member: exists"))?;
        if already {
            return Err(ApiErr::conflict("user is already a member"));
        }

        sq_execute(&conn, db::teams::insert_member(&team_id, &target_id, &role))
            .map_err(ApiErr::from_db("add member"))?;
        sq_execute(&conn, db::grants::upsert(&target_id, &team_id, &role))
            .map_err(ApiErr::from_db("add member: grant"))?;
        state.perms.invalidate_resource(&conn, &team_id);
        target_id
    };

    state
        .notifications
        .push(&target_id, "team.member_added", "You were added to a team", None);
    audit::log_user_action(
        &state.db,
        &user.user_id,
        "team.add_member",
        Some(&target_id),
        Some(&team_id),
    );
    state.webhooks.dispatch(DomainEvent::new(
        EventKind::TeamMemberAdded,
        serde_json::json!({"team_id": team_id, "user_id": target_id, "role": role}),
    ));

    Ok((StatusCode::CREATED, Json(OkResponse { ok: true })))
}

pub async fn remove_member(
    State(state): State<AppState>,
    user: AuthUser,
    Path((team_id, target_id)): Path<(String, String)>,
) -> Result<Json<OkResponse>, ApiErr> {
    {
        let conn = state.db.conn();
        let caller_role = require_member(&conn, &team_id, &user.user_id)?;
        let leaving = target_id == user.user_id;
        if !leaving && !caller_role.can_manage_members() {
            return Err(ApiErr::forbidden("admin role required"));
        }

        removable_role(&conn, &team_id, &target_id)?;

        sq_execute(&conn, db::teams::delete_member(&team_id, &target_id))
            .map_err(ApiErr::from_db("remove member"))?;
        sq_execute(&conn, db::grants::delete(&target_id, &team_id))
            .map_err(ApiErr::from_db("remove member: grant"))?;
        state.perms.invalidate_resource(&conn, &team_id);
    }

    state.notifications.push(
        &target_id,
        "team.member_removed",
        "You were removed from a team",
        None,
    );
    audit::log_user_action(
        &state.db,
        &user.user_id,
        "team.remove_member",
        Some(&target_id),
        Some(&team_id),
    );
    state.webhooks.dispatch(DomainEvent::new(
        EventKind::TeamMemberRemoved,
        serde_json::json!({"team_id": team_id, "user_id": target_id}),
    ));
    Ok(Json(OkResponse { ok: true }))
}

// ---------------------------------------------------------------------------
// Invitations
// ---------------------------------------------------------------------------

pub async fn invite_member(
    State(state): State<AppState>,
    user: AuthUser,
    Path(team_id): Path<String>,
    Json(req): Json<InviteRequest>,
) -> Result<(StatusCode, Json<InvitationResponse>), ApiErr> {
    let email = service::validate_email(&req.email)?;
    let role = service::validate_member_role(req.role.as_deref())?;
    let expires_at = service::datetime_in_days(now_unix(), 7)?;
    let invitation_id = Uuid::new_v4().to_string();

    let (team_name, invitee_id) = {
        let conn = state.db.conn();
        let caller_role = require_member(&conn, &team_id, &user.user_id)?;
        if !caller_role.can_manage_members() {
            return Err(ApiErr::forbidden("admin role required"));
        }

        ensure_invitable(&conn, &team_id, &email)?;

        sq_execute(
            &conn,
            db::invitations::insert(
                &invitation_id,
                &team_id,
                &email,
                &user.user_id,
                &role,
                &expires_at,
            ),
        )
        .map_err(ApiErr::from_db("invite"))?;

        let (team_name,): (String,) =
            sq_query_row(&conn, db::teams::get(&team_id), |row| Ok((row.get(1)?,)))
                .map_err(ApiErr::from_db("invite: team"))?;
        let invitee_id = sq_query_row(&conn, db::users::get_by_email_for_login(&email), |row| {
            row.get::<_, String>(0)
        })
        .ok();
        (team_name, invitee_id)
    };

    if let Some(invitee_id) = invitee_id {
        state.notifications.push(
            &invitee_id,
            "team.invited",
            &format!("You were invited to {team_name}"),
            None,
        );
    }
    audit::log_user_action(
        &state.db,
        &user.user_id,
        "team.invite",
        Some(&invitation_id),
        Some(&team_id),
    );

    Ok((
        StatusCode::CREATED,
        Json(InvitationResponse {
            id: invitation_id,
            team_id,
            team_name,
            email,
            invited_by_nickname: user.nickname,
            role,
            status: "pending".into(),
            created_at: chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            expires_at,
        }),
    ))
}

pub async fn list_invitations(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<ListInvitationsResponse>, ApiErr> {
    let conn = state.db.conn();
    let invitations = sq_query_all(
        &conn,
        db::invitations::list_for_email(&user.email),
        invitation_from_row,
    )
    .map_err(ApiErr::from_db("list invitations"))?;
    Ok(Json(ListInvitationsResponse { invitations }))
}

struct InvitationRow {
    team_id: String,
    email: String,
    role: String,
    status: String,
    expires_at: String,
}

fn lookup_invitation(conn: &Connection, id: &str) -> Result<InvitationRow, ApiErr> {
    match sq_query_row(conn, db::invitations::lookup(id), |row| {
        Ok(InvitationRow {
            team_id: row.get(1)?,
            email: row.get(2)?,
            role: row.get(3)?,
            status: row.get(4)?,
            expires_at: row.get(5)?,
        })
    }) {
        Ok(inv) => Ok(inv),
        Err(rusqlite::Error::QueryReturnedNoRows) => Err(ApiErr::not_found("invitation not found")),
        Err(e) => Err(ApiErr::from_db("invitation lookup")(e)),
    }
}

/// Guards for claiming an invitation: wrong addressee → 403, already
/// resolved → 400, past `expires_at` → 400.
fn check_acceptance(inv: &InvitationRow, email: &str, now: &str) -> Result<(), ApiErr> {
    if inv.email != email {
        return Err(ApiErr::forbidden("invitation addressed to a different email"));
    }
    if inv.status != "pending" {
        return Err(ApiErr::bad_request("invitation is no longer pending"));
    }
    if inv.expires_at.as_str() < now {
        return Err(ApiErr::bad_request("invitation has expired"));
    }
    Ok(())
}

pub async fn accept_invitation(
    State(state): State<AppState>,
    user: AuthUser,
    Path(invitation_id): Path<String>,
) -> Result<Json<AcceptInvitationResponse>, ApiErr> {
    let (team_id, role) = {
        let conn = state.db.conn();
        let inv = lookup_invitation(&conn, &invitation_id)?;
        let now = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string();
        check_acceptance(&inv, &user.email, &now)?;

        let already: bool = sq_query_row(
            &conn,
            db::teams::member_exists(&inv.team_id, &user.user_id),
            |row| row.get(0),
        )
        .map_err(ApiErr::from_db("accept: member check"))?;
        if !already {
            sq_execute(
                &conn,
                db::teams::insert_member(&inv.team_id, &user.user_id, &inv.role),
            )
            .map_err(ApiErr::from_db("accept: member"))?;
            sq_execute(
                &conn,
                db::grants::upsert(&user.user_id, &inv.team_id, &inv.role),
            )
            .map_err(ApiErr::from_db("accept: grant"))?;
            state.perms.invalidate_resource(&conn, &inv.team_id);
        }
        sq_execute(&conn, db::invitations::update_status(&invitation_id, "accepted"))
            .map_err(ApiErr::from_db("accept: status"))?;
        (inv.team_id, inv.role)
    };

    audit::log_user_action(
        &state.db,
        &user.user_id,
        "team.accept_invitation",
        Some(&invitation_id),
        Some(&team_id),
    );
    state.webhooks.dispatch(DomainEvent::new(
        EventKind::TeamMemberAdded,
        serde_json::json!({"team_id": team_id, "user_id": user.user_id, "role": role}),
    ));

    Ok(Json(AcceptInvitationResponse { team_id, role }))
}

pub async fn decline_invitation(
    State(state): State<AppState>,
    user: AuthUser,
    Path(invitation_id): Path<String>,
) -> Result<Json<OkResponse>, ApiErr> {
    let conn = state.db.conn();
    let inv = lookup_invitation(&conn, &invitation_id)?;
    if inv.email != user.email {
        return Err(ApiErr::forbidden("invitation addressed to a different email"));
    }
    if inv.status != "pending" {
        return Err(ApiErr::bad_request("invitation is no longer pending"));
    }
    sq_execute(&conn, db::invitations::update_status(&invitation_id, "declined"))
        .map_err(ApiErr::from_db("decline"))?;
    Ok(Json(OkResponse { ok: true }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    use crate::storage::{init_db, Db};

    fn test_db() -> (tempfile::TempDir, Db) {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = init_db(dir.path()).expect("init db");
        (dir, db)
    }

    fn seed_user(conn: &Connection, id: &str, email: &str) {
        sq_execute(conn, db::users::insert(id, email, "nick", "h", "s", id)).unwrap();
    }

    fn seed_team(conn: &Connection, team_id: &str, owner_id: &str) {
        sq_execute(conn, db::teams::insert(team_id, "Acme", None, owner_id)).unwrap();
        sq_execute(conn, db::teams::insert_member(team_id, owner_id, "owner")).unwrap();
    }

    #[test]
    fn test_last_owner_cannot_be_removed() {
        let (_dir, db) = test_db();
        let conn = db.conn();
        seed_user(&conn, "u-1", "a@b.co");
        seed_team(&conn, "t-1", "u-1");

        let err = removable_role(&conn, "t-1", "u-1").unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        // A second owner lifts the protection.
        seed_user(&conn, "u-2", "b@b.co");
        sq_execute(&conn, db::teams::insert_member("t-1", "u-2", "owner")).unwrap();
        assert_eq!(removable_role(&conn, "t-1", "u-1").unwrap(), TeamRole::Owner);

        // Plain members are always removable.
        seed_user(&conn, "u-3", "c@b.co");
        sq_execute(&conn, db::teams::insert_member("t-1", "u-3", "member")).unwrap();
        assert_eq!(removable_role(&conn, "t-1", "u-3").unwrap(), TeamRole::Member);

        let err = removable_role(&conn, "t-1", "u-ghost").unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_duplicate_pending_invitation_rejected() {
        let (_dir, db) = test_db();
        let conn = db.conn();
        seed_user(&conn, "u-1", "owner@b.co");
        seed_team(&conn, "t-1", "u-1");

        sq_execute(
            &conn,
            db::invitations::insert("i-1", "t-1", "new@b.co", "u-1", "member", "2999-01-01 00:00:00"),
        )
        .unwrap();
        let err = ensure_invitable(&conn, "t-1", "new@b.co").unwrap_err();
        assert_eq!(err.status(), StatusCode::CONFLICT);

        // A resolved invitation no longer blocks a new one.
        sq_execute(&conn, db::invitations::update_status("i-1", "declined")).unwrap();
        assert!(ensure_invitable(&conn, "t-1", "new@b.co").is_ok());
    }

    #[test]
    fn test_inviting_existing_member_rejected() {
        let (_dir, db) = test_db();
        let conn = db.conn();
        seed_user(&conn, "u-1", "owner@b.co");
        seed_team(&conn, "t-1", "u-1");

        let err = ensure_invitable(&conn, "t-1", "owner@b.co").unwrap_err();
        assert_eq!(err.status(), StatusCode::CONFLICT);

        // Not yet registered, not yet invited: fine.
        assert!(ensure_invitable(&conn, "t-1", "stranger@b.co").is_ok());
    }

    #[test]
    fn test_acceptance_guards() {
        let inv = |status: &str, expires_at: &str| InvitationRow {
            team_id: "t-1".into(),
            email: "invited@b.co".into(),
            role: "member".into(),
            status: status.into(),
            expires_at: expires_at.into(),
        };
        let now = "2026-01-01 00:00:00";

        let err = check_acceptance(&inv("pending", "2999-01-01 00:00:00"), "other@b.co", now)
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);

        let err = check_acceptance(&inv("accepted", "2999-01-01 00:00:00"), "invited@b.co", now)
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let err = check_acceptance(&inv("pending", "2025-12-31 23:59:59"), "invited@b.co", now)
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        assert!(check_acceptance(&inv("pending", "2999-01-01 00:00:00"), "invited@b.co", now).is_ok());
    }
}
