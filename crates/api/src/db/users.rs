//! User / auth query builders.

use sea_query::{Asterisk, Expr, Func, LikeExpr, Query, SqliteQueryBuilder};

use super::tables::{EmailVerifications, RefreshTokens, Users};
use super::Built;

// ── User lookups ───────────────────────────────────────────────────────────

/// Find user by id (id, email, nickname, email_verified, is_admin, created_at).
pub fn get_by_id(user_id: &str) -> Built {
    Query::select()
        .columns([
            Users::Id,
            Users::Email,
            Users::Nickname,
            Users::EmailVerified,
            Users::IsAdmin,
            Users::CreatedAt,
        ])
        .from(Users::Table)
        .and_where(Expr::col(Users::Id).eq(user_id))
        .build(SqliteQueryBuilder)
}

/// Find user by email for login (id, nickname, password_hash, password_salt).
pub fn get_by_email_for_login(email: &str) -> Built {
    Query::select()
        .columns([
            Users::Id,
            Users::Nickname,
            Users::PasswordHash,
            Users::PasswordSalt,
        ])
        .from(Users::Table)
        .and_where(Expr::col(Users::Email).eq(email))
        .build(SqliteQueryBuilder)
}

/// Check email existence.
pub fn email_exists(email: &str) -> Built {
    Query::select()
        .expr(Expr::expr(Func::count(Expr::col(Asterisk))).gt(0))
        .from(Users::Table)
        .and_where(Expr::col(Users::Email).eq(email))
        .build(SqliteQueryBuilder)
}

/// Auth extractor lookup by API key hash (id, email, nickname, is_admin).
pub fn get_by_api_key_hash(key_hash: &str) -> Built {
    Query::select()
        .columns([Users::Id, Users::Email, Users::Nickname, Users::IsAdmin])
        .from(Users::Table)
        .and_where(Expr::col(Users::ApiKeyHash).eq(key_hash))
        .build(SqliteQueryBuilder)
}

/// Auth extractor lookup by id (email, nickname, is_admin).
pub fn get_auth_fields(user_id: &str) -> Built {
    Query::select()
        .columns([Users::Email, Users::Nickname, Users::IsAdmin])
        .from(Users::Table)
        .and_where(Expr::col(Users::Id).eq(user_id))
        .build(SqliteQueryBuilder)
}

/// Get password hash/salt for a user.
pub fn get_password_fields(user_id: &str) -> Built {
    Query::select()
        .columns([Users::PasswordHash, Users::PasswordSalt])
        .from(Users::Table)
        .and_where(Expr::col(Users::Id).eq(user_id))
        .build(SqliteQueryBuilder)
}

// ── User inserts / updates ─────────────────────────────────────────────────

pub fn insert(
    id: &str,
    email: &str,
    nickname: &str,
    password_hash: &str,
    password_salt: &str,
    api_key_hash: &str,
) -> Built {
    Query::insert()
        .into_table(Users::Table)
        .columns([
            Users::Id,
            Users::Email,
            Users::Nickname,
            Users::PasswordHash,
            Users::PasswordSalt,
            Users::ApiKeyHash,
        ])
        .values_panic([
            id.into(),
            email.into(),
            nickname.into(),
            password_hash.into(),
            password_salt.into(),
            api_key_hash.into(),
        ])
        .build(SqliteQueryBuilder)
}

pub fn update_password(user_id: &str, password_hash: &str, password_salt: &str) -> Built {
    Query::update()
        .table(Users::Table)
        .value(Users::PasswordHash, password_hash)
        .value(Users::PasswordSalt, password_salt)
        .and_where(Expr::col(Users::Id).eq(user_id))
        .build(SqliteQueryBuilder)
}

pub fn update_api_key_hash(user_id: &str, api_key_hash: &str) -> Built {
    Query::update()
        .table(Users::Table)
        .value(Users::ApiKeyHash, api_key_hash)
        .and_where(Expr::col(Users::Id).eq(user_id))
        .build(SqliteQueryBuilder)
}

pub fn mark_email_verified(user_id: &str) -> Built {
    Query::update()
        .table(Users::Table)
        .value(Users::EmailVerified, true)
        .and_where(Expr::col(Users::Id).eq(user_id))
        .build(SqliteQueryBuilder)
}

pub fn delete(user_id: &str) -> Built {
    Query::delete()
        .from_table(Users::Table)
        .and_where(Expr::col(Users::Id).eq(user_id))
        .build(SqliteQueryBuilder)
}

/// Substring LIKE pattern with `%`/`_`/`\` escaped, so a literal search
/// for e.g. `50%_off` does not turn into wildcards.
fn like_contains(search: &str) -> LikeExpr {
    let escaped = search
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    LikeExpr::new(format!("%{escaped}%")).escape('\\')
}

/// Admin search: substring match on email or nickname, paginated.
/// Pass an empty search to list everyone.
pub fn admin_search(search: &str, limit: u64, offset: u64) -> Built {
    Query::select()
        .columns([
            Users::Id,
            Users::Email,
            Users::Nickname,
            Users::EmailVerified,
            Users::IsAdmin,
            Users::CreatedAt,
        ])
        .from(Users::Table)
        .cond_where(
            sea_query::Cond::any()
                .add(Expr::col(Users::Email).like(like_contains(search)))
                .add(Expr::col(Users::Nickname).like(like_contains(search))),
        )
        .order_by(Users::CreatedAt, sea_query::Order::Desc)
        .limit(limit)
        .offset(offset)
        .build(SqliteQueryBuilder)
}

/// Total row count for admin search pagination.
pub fn admin_search_count(search: &str) -> Built {
    Query::select()
        .expr(Func::count(Expr::col(Asterisk)))
        .from(Users::Table)
        .cond_where(
            sea_query::Cond::any()
                .add(Expr::col(Users::Email).like(like_contains(search)))
                .add(Expr::col(Users::Nickname).like(like_contains(search))),
        )
        .build(SqliteQueryBuilder)
}

/// Delete users that never verified their email before the cutoff.
/// Params are SQLite datetime strings.
pub fn delete_unverified_before(cutoff: &str) -> Built {
    Query::delete()
        .from_table(Users::Table)
        .and_where(Expr::col(Users::EmailVerified).eq(false))
        .and_where(Expr::col(Users::CreatedAt).lt(cutoff))
        .build(SqliteQueryBuilder)
}

// ── Refresh tokens ─────────────────────────────────────────────────────────

pub fn insert_refresh_token(id: &str, user_id: &str, token_hash: &str, expires_at: &str) -> Built {
    Query::insert()
        .into_table(RefreshTokens::Table)
        .columns([
            RefreshTokens::Id,
            RefreshTokens::UserId,
            RefreshTokens::TokenHash,
            RefreshTokens::ExpiresAt,
        ])
        .values_panic([
            id.into(),
            user_id.into(),
            token_hash.into(),
            expires_at.into(),
        ])
        .build(SqliteQueryBuilder)
}

/// Lookup refresh token with user join (token id, user_id, expires_at, nickname).
pub fn lookup_refresh_token(token_hash: &str) -> Built {
    Query::select()
        .column((RefreshTokens::Table, RefreshTokens::Id))
        .column((RefreshTokens::Table, RefreshTokens::UserId))
        .column((RefreshTokens::Table, RefreshTokens::ExpiresAt))
        .column((Users::Table, Users::Nickname))
        .from(RefreshTokens::Table)
        .inner_join(
            Users::Table,
            Expr::col((Users::Table, Users::Id))
                .equals((RefreshTokens::Table, RefreshTokens::UserId)),
        )
        .and_where(Expr::col((RefreshTokens::Table, RefreshTokens::TokenHash)).eq(token_hash))
        .build(SqliteQueryBuilder)
}

pub fn delete_refresh_token(token_hash: &str) -> Built {
    Query::delete()
        .from_table(RefreshTokens::Table)
        .and_where(Expr::col(RefreshTokens::TokenHash).eq(token_hash))
        .build(SqliteQueryBuilder)
}

pub fn delete_refresh_token_by_id(id: &str) -> Built {
    Query::delete()
        .from_table(RefreshTokens::Table)
        .and_where(Expr::col(RefreshTokens::Id).eq(id))
        .build(SqliteQueryBuilder)
}

// ── Email verification tokens ──────────────────────────────────────────────

pub fn insert_verification(token_hash: &str, user_id: &str, expires_at: &str) -> Built {
    Query::insert()
        .into_table(EmailVerifications::Table)
        .columns([
            EmailVerifications::TokenHash,
            EmailVerifications::UserId,
            EmailVerifications::ExpiresAt,
        ])
        .values_panic([token_hash.into(), user_id.into(), expires_at.into()])
        .build(SqliteQueryBuilder)
}

/// Lookup a verification token (user_id, expires_at).
pub fn lookup_verification(token_hash: &str) -> Built {
    Query::select()
        .columns([EmailVerifications::UserId, EmailVerifications::ExpiresAt])
        .from(EmailVerifications::Table)
        .and_where(Expr::col(EmailVerifications::TokenHash).eq(token_hash))
        .build(SqliteQueryBuilder)
}

pub fn delete_verification(token_hash: &str) -> Built {
    Query::delete()
        .from_table(EmailVerifications::Table)
        .and_where(Expr::col(EmailVerifications::TokenHash).eq(token_hash))
        .build(SqliteQueryBuilder)
}
