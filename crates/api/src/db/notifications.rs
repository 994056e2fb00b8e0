//! Notification query builders.

use sea_query::{Expr, Order, Query, SqliteQueryBuilder};

use super::tables::Notifications;
use super::Built;

pub fn insert(id: &str, user_id: &str, kind: &str, title: &str, body: Option<&str>) -> Built {
    Query::insert()
        .into_table(Notifications::Table)
        .columns([
            Notifications::Id,
            Notifications::UserId,
            Notifications::Kind,
            Notifications::Title,
            Notifications::Body,
        ])
        .values_panic([
            id.into(),
            user_id.into(),
            kind.into(),
            title.into(),
            body.map(|s| s.to_string()).into(),
        ])
        .build(SqliteQueryBuilder)
}

/// Notifications for a user, newest first.
/// Row shape: (id, kind, title, body, read, created_at).
pub fn list_for_user(user_id: &str, unread_only: bool, limit: u64) -> Built {
    let mut query = Query::select();
    query
        .columns([
            Notifications::Id,
            Notifications::Kind,
            Notifications::Title,
            Notifications::Body,
            Notifications::Read,
            Notifications::CreatedAt,
        ])
        .from(Notifications::Table)
        .and_where(Expr::col(Notifications::UserId).eq(user_id));
    if unread_only {
        query.and_where(Expr::col(Notifications::Read).eq(false));
    }
    query
        .order_by(Notifications::CreatedAt, Order::Desc)
        .limit(limit)
        .build(SqliteQueryBuilder)
}

/// Mark one notification read; scoped to the owner.
pub fn mark_read(id: &str, user_id: &str) -> Built {
    Query::update()
        .table(Notifications::Table)
        .value(Notifications::Read, true)
        .and_where(Expr::col(Notifications::Id).eq(id))
        .and_where(Expr::col(Notifications::UserId).eq(user_id))
        .build(SqliteQueryBuilder)
}

pub fn mark_all_read(user_id: &str) -> Built {
    Query::update()
        .table(Notifications::Table)
        .value(Notifications::Read, true)
        .and_where(Expr::col(Notifications::UserId).eq(user_id))
        .build(SqliteQueryBuilder)
}
