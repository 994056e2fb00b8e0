//! SSO provider configuration query builders.

use sea_query::{Expr, Query, SqliteQueryBuilder};

use super::tables::SsoProviders;
use super::Built;

/// Upsert the config for (org, idp_type).
pub fn upsert(id: &str, org_id: &str, idp_type: &str, enabled: bool, config_json: &str) -> Built {
    let sql = concat!(
        "INSERT INTO \"sso_providers\" (\"id\", \"org_id\", \"idp_type\", \"enabled\", \"config_json\", \"updated_at\") ",
        "VALUES (?, ?, ?, ?, ?, datetime('now')) ",
        "ON CONFLICT(\"org_id\", \"idp_type\") DO UPDATE SET ",
        "\"enabled\" = excluded.\"enabled\", ",
        "\"config_json\" = excluded.\"config_json\", ",
        "\"updated_at\" = datetime('now')",
    )
    .to_string();
    (
        sql,
        sea_query::Values(vec![
            id.into(),
            org_id.into(),
            idp_type.into(),
            enabled.into(),
            config_json.into(),
        ]),
    )
}

/// Fetch (enabled, config_json, updated_at) for (org, idp_type).
pub fn get(org_id: &str, idp_type: &str) -> Built {
    Query::select()
        .columns([
            SsoProviders::Enabled,
            SsoProviders::ConfigJson,
            SsoProviders::UpdatedAt,
        ])
        .from(SsoProviders::Table)
        .and_where(Expr::col(SsoProviders::OrgId).eq(org_id))
        .and_where(Expr::col(SsoProviders::IdpType).eq(idp_type))
        .build(SqliteQueryBuilder)
}

pub fn delete(org_id: &str, idp_type: &str) -> Built {
    Query::delete()
        .from_table(SsoProviders::Table)
        .and_where(Expr::col(SsoProviders::OrgId).eq(org_id))
        .and_where(Expr::col(SsoProviders::IdpType).eq(idp_type))
        .build(SqliteQueryBuilder)
}
