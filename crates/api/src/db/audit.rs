//! Audit log query builders.

use sea_query::{Expr, Order, Query, SqliteQueryBuilder};

use super::tables::AuditLog;
use super::Built;

pub fn insert(
    id: &str,
    actor_id: &str,
    action: &str,
    target_id: Option<&str>,
    detail: Option<&str>,
) -> Built {
    Query::insert()
        .into_table(AuditLog::Table)
        .columns([
            AuditLog::Id,
            AuditLog::ActorId,
            AuditLog::Action,
            AuditLog::TargetId,
            AuditLog::Detail,
        ])
        .values_panic([
            id.into(),
            actor_id.into(),
            action.into(),
            target_id.map(|s| s.to_string()).into(),
            detail.map(|s| s.to_string()).into(),
        ])
        .build(SqliteQueryBuilder)
}

/// Actions performed by a user, newest first (GDPR export).
/// Row shape: (action, target_id, detail, created_at).
pub fn list_for_actor(actor_id: &str, limit: u64) -> Built {
    Query::select()
        .columns([
            AuditLog::Action,
            AuditLog::TargetId,
            AuditLog::Detail,
            AuditLog::CreatedAt,
        ])
        .from(AuditLog::Table)
        .and_where(Expr::col(AuditLog::ActorId).eq(actor_id))
        .order_by(AuditLog::CreatedAt, Order::Desc)
        .limit(limit)
        .build(SqliteQueryBuilder)
}
