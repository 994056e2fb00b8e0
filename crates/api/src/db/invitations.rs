//! Invitation query builders.

use sea_query::{Alias, Asterisk, Expr, Func, Query, SqliteQueryBuilder};

use super::tables::TeamInvitations;
use super::Built;

pub fn insert(
    id: &str,
    team_id: &str,
    email: &str,
    invited_by: &str,
    role: &str,
    expires_at: &str,
) -> Built {
    Query::insert()
        .into_table(TeamInvitations::Table)
        .columns([
            TeamInvitations::Id,
            TeamInvitations::TeamId,
            TeamInvitations::Email,
            TeamInvitations::InvitedBy,
            TeamInvitations::Role,
            TeamInvitations::ExpiresAt,
        ])
        .values_panic([
            id.into(),
            team_id.into(),
            email.into(),
            invited_by.into(),
            role.into(),
            expires_at.into(),
        ])
        .build(SqliteQueryBuilder)
}

/// List pending, non-expired invitations addressed to an email.
/// Row shape matches `InvitationResponse`.
pub fn list_for_email(email: &str) -> Built {
    let sql = concat!(
        "SELECT ",
        "i.\"id\", i.\"team_id\", t.\"name\" AS \"team_name\", i.\"email\", ",
        "u.\"nickname\" AS \"invited_by_nickname\", i.\"role\", i.\"status\", ",
        "i.\"created_at\", i.\"expires_at\" ",
        "FROM \"team_invitations\" i ",
        "INNER JOIN \"teams\" t ON t.\"id\" = i.\"team_id\" ",
        "INNER JOIN \"users\" u ON u.\"id\" = i.\"invited_by\" ",
        "WHERE i.\"status\" = 'pending' ",
        "AND i.\"expires_at\" > datetime('now') ",
        "AND i.\"email\" = ? ",
        "ORDER BY i.\"created_at\" DESC",
    )
    .to_string();
    (sql, sea_query::Values(vec![email.into()]))
}

/// Lookup an invitation by id (id, team_id, email, role, status, expires_at).
pub fn lookup(id: &str) -> Built {
    Query::select()
        .columns([
            TeamInvitations::Id,
            TeamInvitations::TeamId,
            TeamInvitations::Email,
            TeamInvitations::Role,
            TeamInvitations::Status,
            TeamInvitations::ExpiresAt,
        ])
        .from(TeamInvitations::Table)
        .and_where(Expr::col(TeamInvitations::Id).eq(id))
        .build(SqliteQueryBuilder)
}

pub fn update_status(id: &str, status: &str) -> Built {
    Query::update()
        .table(TeamInvitations::Table)
        .value(TeamInvitations::Status, status)
        .and_where(Expr::col(TeamInvitations::Id).eq(id))
        .build(SqliteQueryBuilder)
}

/// Check for duplicate pending invitation by email.
pub fn dup_check(team_id: &str, email: &str) -> Built {
    Query::select()
        .expr_as(Func::count(Expr::col(Asterisk)), Alias::new("count"))
        .from(TeamInvitations::Table)
        .and_where(Expr::col(TeamInvitations::TeamId).eq(team_id))
        .and_where(Expr::col(TeamInvitations::Email).eq(email))
        .and_where(Expr::col(TeamInvitations::Status).eq("pending"))
        .build(SqliteQueryBuilder)
}
