//! Grant / resource-link query builders for the permission subsystem.

use sea_query::{Expr, Query, SqliteQueryBuilder};

use super::tables::{Grants, ResourceLinks};
use super::Built;

// ── Grants ─────────────────────────────────────────────────────────────────

/// Upsert a role grant for (user, resource).
pub fn upsert(user_id: &str, resource_id: &str, role: &str) -> Built {
    let sql = concat!(
        "INSERT INTO \"grants\" (\"user_id\", \"resource_id\", \"role\") VALUES (?, ?, ?) ",
        "ON CONFLICT(\"user_id\", \"resource_id\") DO UPDATE SET \"role\" = excluded.\"role\"",
    )
    .to_string();
    (
        sql,
        sea_query::Values(vec![user_id.into(), resource_id.into(), role.into()]),
    )
}

pub fn delete(user_id: &str, resource_id: &str) -> Built {
    Query::delete()
        .from_table(Grants::Table)
        .and_where(Expr::col(Grants::UserId).eq(user_id))
        .and_where(Expr::col(Grants::ResourceId).eq(resource_id))
        .build(SqliteQueryBuilder)
}

/// The role granted to a user on one specific resource, if any.
pub fn role_for(user_id: &str, resource_id: &str) -> Built {
    Query::select()
        .column(Grants::Role)
        .from(Grants::Table)
        .and_where(Expr::col(Grants::UserId).eq(user_id))
        .and_where(Expr::col(Grants::ResourceId).eq(resource_id))
        .build(SqliteQueryBuilder)
}

pub fn delete_for_user(user_id: &str) -> Built {
    Query::delete()
        .from_table(Grants::Table)
        .and_where(Expr::col(Grants::UserId).eq(user_id))
        .build(SqliteQueryBuilder)
}

pub fn delete_for_resource(resource_id: &str) -> Built {
    Query::delete()
        .from_table(Grants::Table)
        .and_where(Expr::col(Grants::ResourceId).eq(resource_id))
        .build(SqliteQueryBuilder)
}

// ── Resource links ─────────────────────────────────────────────────────────

/// Upsert a child → parent resource link.
pub fn link_resource(child_id: &str, parent_id: &str) -> Built {
    let sql = concat!(
        "INSERT INTO \"resource_links\" (\"child_id\", \"parent_id\") VALUES (?, ?) ",
        "ON CONFLICT(\"child_id\") DO UPDATE SET \"parent_id\" = excluded.\"parent_id\"",
    )
    .to_string();
    (
        sql,
        sea_query::Values(vec![child_id.into(), parent_id.into()]),
    )
}

/// All links (child_id, parent_id) — loaded once to build the in-memory
/// graph.
pub fn all_links() -> Built {
    Query::select()
        .columns([ResourceLinks::ChildId, ResourceLinks::ParentId])
        .from(ResourceLinks::Table)
        .build(SqliteQueryBuilder)
}
