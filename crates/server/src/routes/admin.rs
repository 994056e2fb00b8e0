use axum::{
    extract::{Path, Query, State},
    Json,
};

use userhub_api::{
    db, AdminUserListResponse, AdminUserResponse, AdminUserSearchQuery, EventKind, OkResponse,
};
use userhub_core::DomainEvent;

use crate::error::ApiErr;
use crate::routes::auth::AuthUser;
use crate::storage::{sq_execute, sq_query_all, sq_query_row};
use crate::{audit, AppState};

const MAX_PER_PAGE: u32 = 100;

fn require_admin(user: &AuthUser) -> Result<(), ApiErr> {
    if user.is_admin {
        Ok(())
    } else {
        Err(ApiErr::forbidden("admin access required"))
    }
}

pub async fn list_users(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<AdminUserSearchQuery>,
) -> Result<Json<AdminUserListResponse>, ApiErr> {
    require_admin(&user)?;

    let page = query.page.max(1);
    let per_page = query.per_page.clamp(1, MAX_PER_PAGE);
    let offset = u64::from(page - 1) * u64::from(per_page);
    let search = query.search.as_deref().unwrap_or("").trim();

    let conn = state.db.conn();
    let users = sq_query_all(
        &conn,
        db::users::admin_search(search, u64::from(per_page), offset),
        |row| {
            Ok(AdminUserResponse {
                id: row.get(0)?,
                email: row.get(1)?,
                nickname: row.get(2)?,
                email_verified: row.get(3)?,
                is_admin: row.get(4)?,
                created_at: row.get(5)?,
            })
        },
    )
    .map_err(ApiErr::from_db("admin: search"))?;

    let total: i64 = sq_query_row(&conn, db::users::admin_search_count(search), |row| {
        row.get(0)
    })
    .map_err(ApiErr::from_db("admin: count"))?;

    Ok(Json(AdminUserListResponse {
        users,
        total,
        page,
        per_page,
    }))
}

pub async fn delete_user(
    State(state): State<AppState>,
    user: AuthUser,
    Path(target_id): Path<String>,
) -> Result<Json<OkResponse>, ApiErr> {
    require_admin(&user)?;
    if target_id == user.user_id {
        return Err(ApiErr::bad_request("cannot delete your own account"));
    }

    {
        let conn = state.db.conn();
        let removed = sq_execute(&conn, db::users::delete(&target_id))
            .map_err(ApiErr::from_db("admin: delete user"))?;
        if removed == 0 {
            return Err(ApiErr::not_found("user not found"));
        }
        // Grants are not FK-backed; clean them up explicitly.
        sq_execute(&conn, db::grants::delete_for_user(&target_id))
            .map_err(ApiErr::from_db("admin: delete grants"))?;
        state.perms.invalidate_user(&target_id);
    }

    audit::log_user_action(
        &state.db,
        &user.user_id,
        "admin.delete_user",
        Some(&target_id),
        None,
    );
    state.webhooks.dispatch(DomainEvent::new(
        EventKind::UserDeleted,
        serde_json::json!({"user_id": target_id, "deleted_by": user.user_id}),
    ));
    Ok(Json(OkResponse { ok: true }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::init_db;

    #[test]
    fn test_admin_search_treats_metacharacters_literally() {
        let dir = tempfile::tempdir().unwrap();
        let db = init_db(dir.path()).unwrap();
        let conn = db.conn();
        sq_execute(&conn, db::users::insert("u-1", "deal@b.co", "50%_off", "h", "s", "k1"))
            .unwrap();
        sq_execute(&conn, db::users::insert("u-2", "other@b.co", "500off", "h", "s", "k2"))
            .unwrap();

        let ids = |search: &str| -> Vec<String> {
            sq_query_all(&conn, db::users::admin_search(search, 10, 0), |row| {
                row.get::<_, String>(0)
            })
            .unwrap()
        };

        // "%" and "_" must not act as wildcards.
        assert_eq!(ids("50%_off"), vec!["u-1".to_string()]);
        assert!(ids("50%x").is_empty());

        let total: i64 =
            sq_query_row(&conn, db::users::admin_search_count("50%_off"), |r| r.get(0)).unwrap();
        assert_eq!(total, 1);

        // Empty search still lists everyone.
        assert_eq!(ids("").len(), 2);
    }
}
