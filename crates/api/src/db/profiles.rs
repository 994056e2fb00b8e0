//! Profile / business-profile query builders.
//!
//! Updates are patch-style: only the provided columns are written.

use sea_query::{Expr, Query, SqliteQueryBuilder};

use super::tables::{BusinessProfiles, Profiles};
use super::Built;

/// Fetch a user's profile (display_name, bio, locale, avatar_url).
pub fn get(user_id: &str) -> Built {
    Query::select()
        .columns([
            Profiles::DisplayName,
            Profiles::Bio,
            Profiles::Locale,
            Profiles::AvatarUrl,
        ])
        .from(Profiles::Table)
        .and_where(Expr::col(Profiles::UserId).eq(user_id))
        .build(SqliteQueryBuilder)
}

/// Ensure the profile row exists (no-op if present).
pub fn ensure_row(user_id: &str) -> Built {
    let sql =
        "INSERT INTO \"profiles\" (\"user_id\") VALUES (?) ON CONFLICT(\"user_id\") DO NOTHING"
            .to_string();
    (sql, sea_query::Values(vec![user_id.into()]))
}

/// Patch profile fields. `fields` pairs column with new value; absent
/// columns stay untouched.
pub fn patch(user_id: &str, fields: &[(Profiles, Option<&str>)]) -> Option<Built> {
    if fields.is_empty() {
        return None;
    }
    let mut update = Query::update();
    update.table(Profiles::Table);
    for (col, value) in fields {
        update.value(*col, value.map(|s| s.to_string()));
    }
    update
        .value(Profiles::UpdatedAt, Expr::cust("datetime('now')"))
        .and_where(Expr::col(Profiles::UserId).eq(user_id));
    Some(update.build(SqliteQueryBuilder))
}

/// Fetch a user's business profile.
pub fn get_business(user_id: &str) -> Built {
    Query::select()
        .columns([
            BusinessProfiles::CompanyName,
            BusinessProfiles::VatId,
            BusinessProfiles::BillingEmail,
            BusinessProfiles::AddressLine1,
            BusinessProfiles::AddressLine2,
            BusinessProfiles::City,
            BusinessProfiles::PostalCode,
            BusinessProfiles::Country,
        ])
        .from(BusinessProfiles::Table)
        .and_where(Expr::col(BusinessProfiles::UserId).eq(user_id))
        .build(SqliteQueryBuilder)
}

/// Ensure the business profile row exists (no-op if present).
pub fn ensure_business_row(user_id: &str) -> Built {
    let sql = "INSERT INTO \"business_profiles\" (\"user_id\") VALUES (?) ON CONFLICT(\"user_id\") DO NOTHING"
        .to_string();
    (sql, sea_query::Values(vec![user_id.into()]))
}

/// Patch business profile fields.
pub fn patch_business(user_id: &str, fields: &[(BusinessProfiles, Option<&str>)]) -> Option<Built> {
    if fields.is_empty() {
        return None;
    }
    let mut update = Query::update();
    update.table(BusinessProfiles::Table);
    for (col, value) in fields {
        update.value(*col, value.map(|s| s.to_string()));
    }
    update
        .value(BusinessProfiles::UpdatedAt, Expr::cust("datetime('now')"))
        .and_where(Expr::col(BusinessProfiles::UserId).eq(user_id));
    Some(update.build(SqliteQueryBuilder))
}
