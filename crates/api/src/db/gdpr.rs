//! GDPR deletion-request / export query builders.

use sea_query::{Expr, Query, SqliteQueryBuilder};

use super::tables::{DataExports, DeletionRequests};
use super::Built;

// ── Deletion requests ──────────────────────────────────────────────────────

pub fn insert_deletion_request(id: &str, user_id: &str, grace_until: &str) -> Built {
    Query::insert()
        .into_table(DeletionRequests::Table)
        .columns([
            DeletionRequests::Id,
            DeletionRequests::UserId,
            DeletionRequests::GraceUntil,
        ])
        .values_panic([id.into(), user_id.into(), grace_until.into()])
        .build(SqliteQueryBuilder)
}

/// The user's active (pending) request, if any.
/// Row shape: (id, status, requested_at, grace_until).
pub fn pending_for_user(user_id: &str) -> Built {
    Query::select()
        .columns([
            DeletionRequests::Id,
            DeletionRequests::Status,
            DeletionRequests::RequestedAt,
            DeletionRequests::GraceUntil,
        ])
        .from(DeletionRequests::Table)
        .and_where(Expr::col(DeletionRequests::UserId).eq(user_id))
        .and_where(Expr::col(DeletionRequests::Status).eq("pending"))
        .build(SqliteQueryBuilder)
}

/// Pending requests whose grace window has elapsed (id, user_id).
pub fn due_pending(now: &str) -> Built {
    Query::select()
        .columns([DeletionRequests::Id, DeletionRequests::UserId])
        .from(DeletionRequests::Table)
        .and_where(Expr::col(DeletionRequests::Status).eq("pending"))
        .and_where(Expr::col(DeletionRequests::GraceUntil).lt(now))
        .build(SqliteQueryBuilder)
}

pub fn update_status(id: &str, status: &str) -> Built {
    Query::update()
        .table(DeletionRequests::Table)
        .value(DeletionRequests::Status, status)
        .and_where(Expr::col(DeletionRequests::Id).eq(id))
        .build(SqliteQueryBuilder)
}

// ── Data exports ───────────────────────────────────────────────────────────

pub fn insert_export(id: &str, user_id: &str, status: &str, data: &str) -> Built {
    Query::insert()
        .into_table(DataExports::Table)
        .columns([
            DataExports::Id,
            DataExports::UserId,
            DataExports::Status,
            DataExports::Data,
        ])
        .values_panic([id.into(), user_id.into(), status.into(), data.into()])
        .build(SqliteQueryBuilder)
}

/// Fetch an export owned by a user (status, created_at, data).
pub fn get_export(id: &str, user_id: &str) -> Built {
    Query::select()
        .columns([
            DataExports::Status,
            DataExports::CreatedAt,
            DataExports::Data,
        ])
        .from(DataExports::Table)
        .and_where(Expr::col(DataExports::Id).eq(id))
        .and_where(Expr::col(DataExports::UserId).eq(user_id))
        .build(SqliteQueryBuilder)
}
