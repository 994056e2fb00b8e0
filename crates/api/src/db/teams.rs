//! Team / membership query builders.

use sea_query::{Asterisk, Expr, Func, Order, Query, SqliteQueryBuilder};

use super::tables::{TeamMembers, Teams, Users};
use super::Built;

// ── Teams ──────────────────────────────────────────────────────────────────

pub fn insert(id: &str, name: &str, description: Option<&str>, created_by: &str) -> Built {
    Query::insert()
        .into_table(Teams::Table)
        .columns([Teams::Id, Teams::Name, Teams::Description, Teams::CreatedBy])
        .values_panic([
            id.into(),
            name.into(),
            description.map(|s| s.to_string()).into(),
            created_by.into(),
        ])
        .build(SqliteQueryBuilder)
}

/// Fetch one team (id, name, description, created_by, created_at).
pub fn get(id: &str) -> Built {
    Query::select()
        .columns([
            Teams::Id,
            Teams::Name,
            Teams::Description,
            Teams::CreatedBy,
            Teams::CreatedAt,
        ])
        .from(Teams::Table)
        .and_where(Expr::col(Teams::Id).eq(id))
        .build(SqliteQueryBuilder)
}

/// Teams the user belongs to, newest first.
pub fn list_for_user(user_id: &str) -> Built {
    Query::select()
        .column((Teams::Table, Teams::Id))
        .column((Teams::Table, Teams::Name))
        .column((Teams::Table, Teams::Description))
        .column((Teams::Table, Teams::CreatedBy))
        .column((Teams::Table, Teams::CreatedAt))
        .from(Teams::Table)
        .inner_join(
            TeamMembers::Table,
            Expr::col((TeamMembers::Table, TeamMembers::TeamId)).equals((Teams::Table, Teams::Id)),
        )
        .and_where(Expr::col((TeamMembers::Table, TeamMembers::UserId)).eq(user_id))
        .order_by((Teams::Table, Teams::CreatedAt), Order::Desc)
        .build(SqliteQueryBuilder)
}

pub fn exists(id: &str) -> Built {
    Query::select()
        .expr(Expr::expr(Func::count(Expr::col(Asterisk))).gt(0))
        .from(Teams::Table)
        .and_where(Expr::col(Teams::Id).eq(id))
        .build(SqliteQueryBuilder)
}

pub fn update_name(id: &str, name: &str) -> Built {
    Query::update()
        .table(Teams::Table)
        .value(Teams::Name, name)
        .and_where(Expr::col(Teams::Id).eq(id))
        .build(SqliteQueryBuilder)
}

pub fn update_description(id: &str, description: &str) -> Built {
    Query::update()
        .table(Teams::Table)
        .value(Teams::Description, description)
        .and_where(Expr::col(Teams::Id).eq(id))
        .build(SqliteQueryBuilder)
}

pub fn delete(id: &str) -> Built {
    Query::delete()
        .from_table(Teams::Table)
        .and_where(Expr::col(Teams::Id).eq(id))
        .build(SqliteQueryBuilder)
}

// ── Members ────────────────────────────────────────────────────────────────

pub fn insert_member(team_id: &str, user_id: &str, role: &str) -> Built {
    Query::insert()
        .into_table(TeamMembers::Table)
        .columns([
            TeamMembers::TeamId,
            TeamMembers::UserId,
            TeamMembers::Role,
        ])
        .values_panic([team_id.into(), user_id.into(), role.into()])
        .build(SqliteQueryBuilder)
}

pub fn delete_member(team_id: &str, user_id: &str) -> Built {
    Query::delete()
        .from_table(TeamMembers::Table)
        .and_where(Expr::col(TeamMembers::TeamId).eq(team_id))
        .and_where(Expr::col(TeamMembers::UserId).eq(user_id))
        .build(SqliteQueryBuilder)
}

/// Member list with nicknames (user_id, nickname, role, joined_at).
pub fn list_members(team_id: &str) -> Built {
    Query::select()
        .column((TeamMembers::Table, TeamMembers::UserId))
        .column((Users::Table, Users::Nickname))
        .column((TeamMembers::Table, TeamMembers::Role))
        .column((TeamMembers::Table, TeamMembers::JoinedAt))
        .from(TeamMembers::Table)
        .inner_join(
            Users::Table,
            Expr::col((Users::Table, Users::Id)).equals((TeamMembers::Table, TeamMembers::UserId)),
        )
        .and_where(Expr::col((TeamMembers::Table, TeamMembers::TeamId)).eq(team_id))
        .order_by((TeamMembers::Table, TeamMembers::JoinedAt), Order::Asc)
        .build(SqliteQueryBuilder)
}

pub fn member_count(team_id: &str) -> Built {
    Query::select()
        .expr(Func::count(Expr::col(Asterisk)))
        .from(TeamMembers::Table)
        .and_where(Expr::col(TeamMembers::TeamId).eq(team_id))
        .build(SqliteQueryBuilder)
}

pub fn member_exists(team_id: &str, user_id: &str) -> Built {
    Query::select()
        .expr(Expr::expr(Func::count(Expr::col(Asterisk))).gt(0))
        .from(TeamMembers::Table)
        .and_where(Expr::col(TeamMembers::TeamId).eq(team_id))
        .and_where(Expr::col(TeamMembers::UserId).eq(user_id))
        .build(SqliteQueryBuilder)
}

/// The member's role string, if they belong to the team.
pub fn member_role(team_id: &str, user_id: &str) -> Built {
    Query::select()
        .column(TeamMembers::Role)
        .from(TeamMembers::Table)
        .and_where(Expr::col(TeamMembers::TeamId).eq(team_id))
        .and_where(Expr::col(TeamMembers::UserId).eq(user_id))
        .build(SqliteQueryBuilder)
}

/// Count of members holding the owner role (last-owner protection).
pub fn owner_count(team_id: &str) -> Built {
    Query::select()
        .expr(Func::count(Expr::col(Asterisk)))
        .from(TeamMembers::Table)
        .and_where(Expr::col(TeamMembers::TeamId).eq(team_id))
        .and_where(Expr::col(TeamMembers::Role).eq("owner"))
        .build(SqliteQueryBuilder)
}
