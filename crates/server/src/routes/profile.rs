use axum::{extract::State, Json};

use userhub_api::db::{self, BusinessProfiles, Profiles};
use userhub_api::{
    BusinessProfileResponse, ProfileResponse, UpdateBusinessProfileRequest, UpdateProfileRequest,
};

use crate::error::ApiErr;
use crate::routes::auth::AuthUser;
use crate::storage::{sq_execute, sq_query_row};
use crate::AppState;

/// Absent fields stay untouched; an empty string clears the column.
fn patch_field<'a, C: Copy>(col: C, value: &'a Option<String>) -> Option<(C, Option<&'a str>)> {
    value.as_ref().map(|s| {
        if s.is_empty() {
            (col, None)
        } else {
            (col, Some(s.as_str()))
        }
    })
}

fn profile_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ProfileResponse> {
    Ok(ProfileResponse {
        display_name: row.get(0)?,
        bio: row.get(1)?,
        locale: row.get(2)?,
        avatar_url: row.get(3)?,
    })
}

fn business_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<BusinessProfileResponse> {
    Ok(BusinessProfileResponse {
        company_name: row.get(0)?,
        vat_id: row.get(1)?,
        billing_email: row.get(2)?,
        address_line1: row.get(3)?,
        address_line2: row.get(4)?,
        city: row.get(5)?,
        postal_code: row.get(6)?,
        country: row.get(7)?,
    })
}

pub async fn get_profile(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<ProfileResponse>, ApiErr> {
    let conn = state.db.conn();
    sq_execute(&conn, db::profiles::ensure_row(&user.user_id))
        .map_err(ApiErr::from_db("profile: ensure"))?;
    sq_query_row(&conn, db::profiles::get(&user.user_id), profile_from_row)
        .map(Json)
        .map_err(ApiErr::from_db("profile: get"))
}

pub async fn update_profile(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<ProfileResponse>, ApiErr> {
    let fields: Vec<(Profiles, Option<&str>)> = [
        patch_field(Profiles::DisplayName, &req.display_name),
        patch_field(Profiles::Bio, &req.bio),
        patch_field(Profiles::Locale, &req.locale),
        patch_field(Profiles::AvatarUrl, &req.avatar_url),
    ]
    .into_iter()
    .flatten()
    .collect();

    let conn = state.db.conn();
    sq_execute(&conn, db::profiles::ensure_row(&user.user_id))
        .map_err(ApiErr::from_db("profile: ensure"))?;
    if let Some(built) = db::profiles::patch(&user.user_id, &fields) {
        sq_execute(&conn, built).map_err(ApiErr::from_db("profile: patch"))?;
    }
    sq_query_row(&conn, db::profiles::get(&user.user_id), profile_from_row)
        .map(Json)
        .map_err(ApiErr::from_db("profile: reread"))
}

pub async fn get_business(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<BusinessProfileResponse>, ApiErr> {
    let conn = state.db.conn();
    sq_execute(&conn, db::profiles::ensure_business_row(&user.user_id))
        .map_err(ApiErr::from_db("business profile: ensure"))?;
    sq_query_row(
        &conn,
        db::profiles::get_business(&user.user_id),
        business_from_row,
    )
    .map(Json)
    .map_err(ApiErr::from_db("business profile: get"))
}

pub async fn update_business(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<UpdateBusinessProfileRequest>,
) -> Result<Json<BusinessProfileResponse>, ApiErr> {
    let fields: Vec<(BusinessProfiles, Option<&str>)> = [
        patch_field(BusinessProfiles::CompanyName, &req.company_name),
        patch_field(BusinessProfiles::VatId, &req.vat_id),
        patch_field(BusinessProfiles::BillingEmail, &req.billing_email),
        patch_field(BusinessProfiles::AddressLine1, &req.address_line1),
        patch_field(BusinessProfiles::AddressLine2, &req.address_line2),
        patch_field(BusinessProfiles::City, &req.city),
        patch_field(BusinessProfiles::PostalCode, &req.postal_code),
        patch_field(BusinessProfiles::Country, &req.country),
    ]
    .into_iter()
    .flatten()
    .collect();

    let conn = state.db.conn();
    sq_execute(&conn, db::profiles::ensure_business_row(&user.user_id))
        .map_err(ApiErr::from_db("business profile: ensure"))?;
    if let Some(built) = db::profiles::patch_business(&user.user_id, &fields) {
        sq_execute(&conn, built)
            .map_err(ApiErr::from_db("business profile: patch"))?;
    }
    sq_query_row(
        &conn,
        db::profiles::get_business(&user.user_id),
        business_from_row,
    )
    .map(Json)
    .map_err(ApiErr::from_db("business profile: reread"))
}
