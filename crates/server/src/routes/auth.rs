use axum::{
    extract::{FromRef, FromRequestParts, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use uuid::Uuid;

use userhub_api::{
    crypto, db,
    service::{self, AuthToken},
    AuthRegisterRequest, AuthTokenResponse, ChangePasswordRequest, EventKind, LoginRequest,
    LogoutRequest, MeResponse, OkResponse, RefreshRequest, RegenerateKeyResponse,
    RegisterResponse, VerifyEmailRequest,
};
use userhub_core::DomainEvent;

use crate::error::ApiErr;
use crate::storage::{sq_execute, sq_query_row, Db};
use crate::{audit, AppConfig, AppState};

pub fn now_unix() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn now_datetime() -> String {
    chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

// ---------------------------------------------------------------------------
// Auth extractor
// ---------------------------------------------------------------------------

/// Authenticated user extracted from `Authorization: Bearer <token>`.
/// The token is either a JWT access token or an API key (`uhk_` prefix).
pub struct AuthUser {
    pub user_id: String,
    pub email: String,
    pub nickname: String,
    pub is_admin: bool,
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    Db: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let db = Db::from_ref(state);
        let config = AppConfig::from_ref(state);

        let token = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or_else(|| {
                ApiErr::unauthorized("missing or invalid Authorization header").into_response()
            })?
            .to_string();

        let resolved = service::resolve_auth_token(&token, &config.jwt_secret, now_unix())
            .map_err(|e| ApiErr::from(e).into_response())?;

        let conn = db.conn();
        let result = match resolved {
            AuthToken::Jwt(user_id) => {
                sq_query_row(&conn, db::users::get_auth_fields(&user_id), |row| {
                    Ok(AuthUser {
                        user_id: user_id.clone(),
                        email: row.get(0)?,
                        nickname: row.get(1)?,
                        is_admin: row.get(2)?,
                    })
                })
            }
            AuthToken::ApiKey(key) => {
                let key_hash = service::hash_api_key(&key);
                sq_query_row(&conn, db::users::get_by_api_key_hash(&key_hash), |row| {
                    Ok(AuthUser {
                        user_id: row.get(0)?,
                        email: row.get(1)?,
                        nickname: row.get(2)?,
                        is_admin: row.get(3)?,
                    })
                })
            }
        };

        result.map_err(|_| ApiErr::unauthorized("invalid credentials").into_response())
    }
}

// ---------------------------------------------------------------------------
// Register
// ---------------------------------------------------------------------------

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<AuthRegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), ApiErr> {
    let email = service::validate_email(&req.email)?;
    service::validate_password(&req.password)?;
    let nickname = service::validate_nickname(&req.nickname)?;

    let (password_hash, password_salt) = crypto::hash_password(&req.password)?;
    let user_id = Uuid::new_v4().to_string();
    let api_key_hash = service::hash_api_key(&service::generate_api_key());

    let now = now_unix();
    let bundle = service::prepare_token_bundle(&state.config.jwt_secret, &user_id, &nickname, now)?;
    let verification_token = crypto::generate_token()?;
    let verification_expiry = service::datetime_in_days(now, 7)?;

    {
        let conn = state.db.conn();
        let inserted = sq_execute(
            &conn,
            db::users::insert(
                &user_id,
                &email,
                &nickname,
                &password_hash,
                &password_salt,
                &api_key_hash,
            ),
        );
        match inserted {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                return Err(ApiErr::conflict("email already registered"));
            }
            Err(e) => return Err(ApiErr::from_db("register")(e)),
        }

        sq_execute(
            &conn,
            db::users::insert_refresh_token(
                &bundle.token_id,
                &user_id,
                &bundle.token_hash,
                &bundle.expires_at,
            ),
        )
        .map_err(ApiErr::from_db("register: refresh token"))?;

        sq_execute(
            &conn,
            db::users::insert_verification(
                &crypto::hash_token(&verification_token),
                &user_id,
                &verification_expiry,
            ),
        )
        .map_err(ApiErr::from_db("register: verification token"))?;
    }

    audit::log_user_action(&state.db, &user_id, "auth.register", None, None);
    state.webhooks.dispatch(DomainEvent::new(
        EventKind::UserCreated,
        serde_json::json!({"user_id": user_id, "email": email}),
    ));

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user_id,
            nickname,
            access_token: bundle.access_token,
            refresh_token: bundle.refresh_token,
            expires_in: crypto::JWT_EXPIRY_SECS,
            verification_token,
        }),
    ))
}

// ---------------------------------------------------------------------------
// Login / refresh / logout
// ---------------------------------------------------------------------------

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthTokenResponse>, ApiErr> {
    let email = service::validate_email(&req.email)?;

    let conn = state.db.conn();
    let found = sq_query_row(&conn, db::users::get_by_email_for_login(&email), |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
        ))
    });

    let (user_id, nickname, hash, salt) = match found {
        Ok(row) => row,
        Err(rusqlite::Error::QueryReturnedNoRows) => {
            return Err(ApiErr::unauthorized("invalid email or password"));
        }
        Err(e) => return Err(ApiErr::from_db("login")(e)),
    };

    if !crypto::verify_password(&req.password, &hash, &salt) {
        return Err(ApiErr::unauthorized("invalid email or password"));
    }

    let bundle =
        service::prepare_token_bundle(&state.config.jwt_secret, &user_id, &nickname, now_unix())?;
    sq_execute(
        &conn,
        db::users::insert_refresh_token(
            &bundle.token_id,
            &user_id,
            &bundle.token_hash,
            &bundle.expires_at,
        ),
    )
    .map_err(ApiErr::from_db("login: refresh token"))?;

    Ok(Json(bundle.response))
}

/// Look up, expire-check and rotate a refresh token. The presented token
/// is single-use: it is consumed whether it rotates or turns out expired.
fn rotate_refresh_token(
    conn: &rusqlite::Connection,
    jwt_secret: &str,
    refresh_token: &str,
) -> Result<service::TokenBundle, ApiErr> {
    let token_hash = crypto::hash_token(refresh_token);

    let found = sq_query_row(conn, db::users::lookup_refresh_token(&token_hash), |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
        ))
    });

    let (token_id, user_id, expires_at, nickname) = match found {
        Ok(row) => row,
        Err(rusqlite::Error::QueryReturnedNoRows) => {
            return Err(ApiErr::unauthorized("invalid refresh token"));
        }
        Err(e) => return Err(ApiErr::from_db("refresh")(e)),
    };

    if expires_at < now_datetime() {
        let _ = sq_execute(conn, db::users::delete_refresh_token_by_id(&token_id));
        return Err(ApiErr::unauthorized("refresh token expired"));
    }

    // Rotate: old token is single-use.
    sq_execute(conn, db::users::delete_refresh_token_by_id(&token_id))
        .map_err(ApiErr::from_db("refresh: rotate"))?;

    let bundle = service::prepare_token_bundle(jwt_secret, &user_id, &nickname, now_unix())?;
    sq_execute(
        conn,
        db::users::insert_refresh_token(
            &bundle.token_id,
            &user_id,
            &bundle.token_hash,
            &bundle.expires_at,
        ),
    )
    .map_err(ApiErr::from_db("refresh: insert"))?;

    Ok(bundle)
}

pub async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> Result<Json<AuthTokenResponse>, ApiErr> {
    let conn = state.db.conn();
    let bundle = rotate_refresh_token(&conn, &state.config.jwt_secret, &req.refresh_token)?;
    Ok(Json(bundle.response))
}

pub async fn logout(
    State(state): State<AppState>,
    Json(req): Json<LogoutRequest>,
) -> Result<Json<OkResponse>, ApiErr> {
    let token_hash = crypto::hash_token(&req.refresh_token);
    let conn = state.db.conn();
    sq_execute(&conn, db::users::delete_refresh_token(&token_hash))
        .map_err(ApiErr::from_db("logout"))?;
    Ok(Json(OkResponse { ok: true }))
}

// ---------------------------------------------------------------------------
// Password change
// ---------------------------------------------------------------------------

pub async fn change_password(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<Json<OkResponse>, ApiErr> {
    service::validate_password(&req.new_password)?;

    let conn = state.db.conn();
    let (hash, salt): (String, String) =
        sq_query_row(&conn, db::users::get_password_fields(&user.user_id), |row| {
            Ok((row.get(0)?, row.get(1)?))
        })
        .map_err(ApiErr::from_db("change password: lookup"))?;

    if !crypto::verify_password(&req.current_password, &hash, &salt) {
        return Err(ApiErr::unauthorized("current password is incorrect"));
    }

    let (new_hash, new_salt) = crypto::hash_password(&req.new_password)?;
    sq_execute(
        &conn,
        db::users::update_password(&user.user_id, &new_hash, &new_salt),
    )
    .map_err(ApiErr::from_db("change password"))?;
    drop(conn);

    audit::log_user_action(&state.db, &user.user_id, "auth.change_password", None, None);
    Ok(Json(OkResponse { ok: true }))
}

// ---------------------------------------------------------------------------
// Current user
// ---------------------------------------------------------------------------

pub async fn me(State(state): State<AppState>, user: AuthUser) -> Result<Json<MeResponse>, ApiErr> {
    let conn = state.db.conn();
    sq_query_row(&conn, db::users::get_by_id(&user.user_id), |row| {
        Ok(MeResponse {
            user_id: row.get(0)?,
            email: row.get(1)?,
            nickname: row.get(2)?,
            email_verified: row.get(3)?,
            is_admin: row.get(4)?,
            created_at: row.get(5)?,
        })
    })
    .map(Json)
    .map_err(ApiErr::from_db("me"))
}

// ---------------------------------------------------------------------------
// Email verification
// ---------------------------------------------------------------------------

pub async fn verify_email(
    State(state): State<AppState>,
    Json(req): Json<VerifyEmailRequest>,
) -> Result<Json<OkResponse>, ApiErr> {
    let token_hash = crypto::hash_token(&req.token);

    let conn = state.db.conn();
    let found = sq_query_row(&conn, db::users::lookup_verification(&token_hash), |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    });

    let (user_id, expires_at) = match found {
        Ok(row) => row,
        Err(rusqlite::Error::QueryReturnedNoRows) => {
            return Err(ApiErr::bad_request("invalid verification token"));
        }
        Err(e) => return Err(ApiErr::from_db("verify email")(e)),
    };

    if expires_at < now_datetime() {
        let _ = sq_execute(&conn, db::users::delete_verification(&token_hash));
        return Err(ApiErr::bad_request("verification token expired"));
    }

    sq_execute(&conn, db::users::mark_email_verified(&user_id))
        .map_err(ApiErr::from_db("verify email: update"))?;
    sq_execute(&conn, db::users::delete_verification(&token_hash))
        .map_err(ApiErr::from_db("verify email: consume"))?;

    Ok(Json(OkResponse { ok: true }))
}

// ---------------------------------------------------------------------------
// API key rotation
// ---------------------------------------------------------------------------

pub async fn regenerate_key(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<RegenerateKeyResponse>, ApiErr> {
    let api_key = service::generate_api_key();
    let key_hash = service::hash_api_key(&api_key);

    {
        let conn = state.db.conn();
        sq_execute(&conn, db::users::update_api_key_hash(&user.user_id, &key_hash))
            .map_err(ApiErr::from_db("regenerate key"))?;
    }

    audit::log_user_action(&state.db, &user.user_id, "auth.regenerate_key", None, None);
    Ok(Json(RegenerateKeyResponse { api_key }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::init_db;

    const SECRET: &str = "test-secret";

    fn issue_token(conn: &rusqlite::Connection, user_id: &str) -> service::TokenBundle {
        let bundle = service::prepare_token_bundle(SECRET, user_id, "nick", now_unix()).unwrap();
        sq_execute(
            conn,
            db::users::insert_refresh_token(
                &bundle.token_id,
                user_id,
                &bundle.token_hash,
                &bundle.expires_at,
            ),
        )
        .unwrap();
        bundle
    }

    #[test]
    fn test_refresh_rotation_consumes_old_token() {
        let dir = tempfile::tempdir().unwrap();
        let db = init_db(dir.path()).unwrap();
        let conn = db.conn();
        sq_execute(&conn, db::users::insert("u-1", "a@b.co", "nick", "h", "s", "k")).unwrap();
        let bundle = issue_token(&conn, "u-1");

        let rotated = rotate_refresh_token(&conn, SECRET, &bundle.refresh_token).unwrap();
        assert_ne!(rotated.refresh_token, bundle.refresh_token);

        // Replaying the consumed token fails.
        let err = rotate_refresh_token(&conn, SECRET, &bundle.refresh_token).unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::UNAUTHORIZED);

        // The replacement still works.
        assert!(rotate_refresh_token(&conn, SECRET, &rotated.refresh_token).is_ok());
    }

    #[test]
    fn test_refresh_after_logout_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let db = init_db(dir.path()).unwrap();
        let conn = db.conn();
        sq_execute(&conn, db::users::insert("u-1", "a@b.co", "nick", "h", "s", "k")).unwrap();
        let bundle = issue_token(&conn, "u-1");

        // Logout deletes by token hash.
        sq_execute(&conn, db::users::delete_refresh_token(&bundle.token_hash)).unwrap();

        let err = rotate_refresh_token(&conn, SECRET, &bundle.refresh_token).unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_expired_refresh_token_rejected_and_consumed() {
        let dir = tempfile::tempdir().unwrap();
        let db = init_db(dir.path()).unwrap();
        let conn = db.conn();
        sq_execute(&conn, db::users::insert("u-1", "a@b.co", "nick", "h", "s", "k")).unwrap();
        let bundle = issue_token(&conn, "u-1");
        conn.execute(
            "UPDATE refresh_tokens SET expires_at = '2000-01-01 00:00:00' WHERE id = ?1",
            [&bundle.token_id],
        )
        .unwrap();

        let err = rotate_refresh_token(&conn, SECRET, &bundle.refresh_token).unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::UNAUTHORIZED);

        // The expired row is gone, not lingering.
        let remaining: i64 = conn
            .query_row("SELECT COUNT(*) FROM refresh_tokens WHERE user_id = 'u-1'", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(remaining, 0);
    }
}
