use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use rusqlite::Connection;
use uuid::Uuid;

use userhub_api::{
    crypto, db, service, CreateWebhookRequest, CreateWebhookResponse, DeliveryResponse, EventKind,
    ListDeliveriesResponse, ListWebhooksResponse, OkResponse, WebhookResponse,
};
use userhub_core::DomainEvent;

use crate::error::ApiErr;
use crate::routes::auth::AuthUser;
use crate::storage::{sq_execute, sq_query_all, sq_query_row};
use crate::{audit, AppState};

const DELIVERY_PAGE: u64 = 50;

/// Ownership check: 404 for missing webhooks and for webhooks owned by
/// someone else, so ids cannot be probed.
fn require_owned(
    conn: &Connection,
    webhook_id: &str,
    user_id: &str,
) -> Result<(String, String), ApiErr> {
    match sq_query_row(conn, db::webhooks::get(webhook_id), |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
        ))
    }) {
        Ok((owner, url, secret)) if owner == user_id => Ok((url, secret)),
        Ok(_) | Err(rusqlite::Error::QueryReturnedNoRows) => {
            Err(ApiErr::not_found("webhook not found"))
        }
        Err(e) => Err(ApiErr::from_db("webhook lookup")(e)),
    }
}

pub async fn create_webhook(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<CreateWebhookRequest>,
) -> Result<(StatusCode, Json<CreateWebhookResponse>), ApiErr> {
    let url = service::validate_webhook_url(&req.url)?;
    let kinds = service::validate_event_list(&req.events)?;
    let events: Vec<String> = kinds.iter().map(|k| k.as_str().to_string()).collect();
    let events_json =
        serde_json::to_string(&events).map_err(ApiErr::from_db("webhook: events serialize"))?;

    let id = Uuid::new_v4().to_string();
    let secret = crypto::generate_token()?;

    {
        let conn = state.db.conn();
        sq_execute(
            &conn,
            db::webhooks::insert(&id, &user.user_id, &url, &secret, &events_json),
        )
        .map_err(ApiErr::from_db("webhook: insert"))?;
    }

    audit::log_user_action(&state.db, &user.user_id, "webhook.create", Some(&id), None);
    Ok((
        StatusCode::CREATED,
        Json(CreateWebhookResponse {
            id,
            url,
            events,
            secret,
        }),
    ))
}

pub async fn list_webhooks(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<ListWebhooksResponse>, ApiErr> {
    let conn = state.db.conn();
    let webhooks = sq_query_all(&conn, db::webhooks::list_for_user(&user.user_id), |row| {
        let events_json: String = row.get(2)?;
        Ok(WebhookResponse {
            id: row.get(0)?,
            url: row.get(1)?,
            events: serde_json::from_str(&events_json).unwrap_or_default(),
            enabled: row.get(3)?,
            created_at: row.get(4)?,
        })
    })
    .map_err(ApiErr::from_db("webhook: list"))?;
    Ok(Json(ListWebhooksResponse { webhooks }))
}

pub async fn delete_webhook(
    State(state): State<AppState>,
    user: AuthUser,
    Path(webhook_id): Path<String>,
) -> Result<Json<OkResponse>, ApiErr> {
    {
        let conn = state.db.conn();
        require_owned(&conn, &webhook_id, &user.user_id)?;
        sq_execute(&conn, db::webhooks::delete_deliveries_for_webhook(&webhook_id))
            .map_err(ApiErr::from_db("webhook: delete deliveries"))?;
        sq_execute(&conn, db::webhooks::delete(&webhook_id))
            .map_err(ApiErr::from_db("webhook: delete"))?;
    }
    audit::log_user_action(
        &state.db,
        &user.user_id,
        "webhook.delete",
        Some(&webhook_id),
        None,
    );
    Ok(Json(OkResponse { ok: true }))
}

pub async fn list_deliveries(
    State(state): State<AppState>,
    user: AuthUser,
    Path(webhook_id): Path<String>,
) -> Result<Json<ListDeliveriesResponse>, ApiErr> {
    let conn = state.db.conn();
    require_owned(&conn, &webhook_id, &user.user_id)?;
    let deliveries = sq_query_all(
        &conn,
        db::webhooks::list_deliveries(&webhook_id, DELIVERY_PAGE),
        |row| {
            Ok(DeliveryResponse {
                id: row.get(0)?,
                webhook_id: row.get(1)?,
                event_type: row.get(2)?,
                status: row.get(3)?,
                failure: row.get(4)?,
                response_status: row.get::<_, Option<i64>>(5)?.map(|s| s as u16),
                attempts: row.get::<_, i64>(6)? as u32,
                created_at: row.get(7)?,
            })
        },
    )
    .map_err(ApiErr::from_db("webhook: deliveries"))?;
    Ok(Json(ListDeliveriesResponse { deliveries }))
}

/// Fire a synthetic `webhook.test` event at one webhook and report the
/// outcome. The delivery is recorded like any real one.
pub async fn test_webhook(
    State(state): State<AppState>,
    user: AuthUser,
    Path(webhook_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiErr> {
    let (url, secret) = {
        let conn = state.db.conn();
        require_owned(&conn, &webhook_id, &user.user_id)?
    };

    let event = DomainEvent::new(
        EventKind::WebhookTest,
        serde_json::json!({"webhook_id": webhook_id}),
    );
    let payload =
        serde_json::to_string(&event).map_err(ApiErr::from_db("webhook test: serialize"))?;

    let outcome = state.webhooks.deliver(&url, &secret, &payload).await;
    state
        .webhooks
        .record(&webhook_id, EventKind::WebhookTest.as_str(), &payload, &outcome);

    Ok(Json(serde_json::json!({
        "status": outcome.status,
        "failure": outcome.failure,
        "response_status": outcome.response_status,
        "attempts": outcome.attempts,
    })))
}
