//! Webhook / delivery query builders.

use sea_query::{Expr, Order, Query, SqliteQueryBuilder};

use super::tables::{WebhookDeliveries, Webhooks};
use super::Built;

// ── Webhooks ───────────────────────────────────────────────────────────────

pub fn insert(id: &str, user_id: &str, url: &str, secret: &str, events: &str) -> Built {
    Query::insert()
        .into_table(Webhooks::Table)
        .columns([
            Webhooks::Id,
            Webhooks::UserId,
            Webhooks::Url,
            Webhooks::Secret,
            Webhooks::Events,
        ])
        .values_panic([
            id.into(),
            user_id.into(),
            url.into(),
            secret.into(),
            events.into(),
        ])
        .build(SqliteQueryBuilder)
}

/// Webhooks owned by a user (id, url, events, enabled, created_at).
pub fn list_for_user(user_id: &str) -> Built {
    Query::select()
        .columns([
            Webhooks::Id,
            Webhooks::Url,
            Webhooks::Events,
            Webhooks::Enabled,
            Webhooks::CreatedAt,
        ])
        .from(Webhooks::Table)
        .and_where(Expr::col(Webhooks::UserId).eq(user_id))
        .order_by(Webhooks::CreatedAt, Order::Desc)
        .build(SqliteQueryBuilder)
}

/// Ownership check + delivery target (user_id, url, secret).
pub fn get(id: &str) -> Built {
    Query::select()
        .columns([Webhooks::UserId, Webhooks::Url, Webhooks::Secret])
        .from(Webhooks::Table)
        .and_where(Expr::col(Webhooks::Id).eq(id))
        .build(SqliteQueryBuilder)
}

/// Every enabled webhook — dispatcher filters by subscription.
/// Row shape: (id, url, secret, events).
pub fn list_enabled() -> Built {
    Query::select()
        .columns([
            Webhooks::Id,
            Webhooks::Url,
            Webhooks::Secret,
            Webhooks::Events,
        ])
        .from(Webhooks::Table)
        .and_where(Expr::col(Webhooks::Enabled).eq(true))
        .build(SqliteQueryBuilder)
}

pub fn delete(id: &str) -> Built {
    Query::delete()
        .from_table(Webhooks::Table)
        .and_where(Expr::col(Webhooks::Id).eq(id))
        .build(SqliteQueryBuilder)
}

pub fn delete_for_user(user_id: &str) -> Built {
    Query::delete()
        .from_table(Webhooks::Table)
        .and_where(Expr::col(Webhooks::UserId).eq(user_id))
        .build(SqliteQueryBuilder)
}

// ── Deliveries ─────────────────────────────────────────────────────────────

#[allow(clippy::too_many_arguments)]
pub fn insert_delivery(
    id: &str,
    webhook_id: &str,
    event_type: &str,
    payload: &str,
    status: &str,
    failure: Option<&str>,
    response_status: Option<i64>,
    attempts: i64,
) -> Built {
    Query::insert()
        .into_table(WebhookDeliveries::Table)
        .columns([
            WebhookDeliveries::Id,
            WebhookDeliveries::WebhookId,
            WebhookDeliveries::EventType,
            WebhookDeliveries::Payload,
            WebhookDeliveries::Status,
            WebhookDeliveries::Failure,
            WebhookDeliveries::ResponseStatus,
            WebhookDeliveries::Attempts,
        ])
        .values_panic([
            id.into(),
            webhook_id.into(),
            event_type.into(),
            payload.into(),
            status.into(),
            failure.map(|s| s.to_string()).into(),
            response_status.into(),
            attempts.into(),
        ])
        .build(SqliteQueryBuilder)
}

/// Recent deliveries for one webhook, newest first.
/// Row shape: (id, webhook_id, event_type, status, failure, response_status, attempts, created_at).
pub fn list_deliveries(webhook_id: &str, limit: u64) -> Built {
    Query::select()
        .columns([
            WebhookDeliveries::Id,
            WebhookDeliveries::WebhookId,
            WebhookDeliveries::EventType,
            WebhookDeliveries::Status,
            WebhookDeliveries::Failure,
            WebhookDeliveries::ResponseStatus,
            WebhookDeliveries::Attempts,
            WebhookDeliveries::CreatedAt,
        ])
        .from(WebhookDeliveries::Table)
        .and_where(Expr::col(WebhookDeliveries::WebhookId).eq(webhook_id))
        .order_by(WebhookDeliveries::CreatedAt, Order::Desc)
        .limit(limit)
        .build(SqliteQueryBuilder)
}

pub fn delete_deliveries_for_webhook(webhook_id: &str) -> Built {
    Query::delete()
        .from_table(WebhookDeliveries::Table)
        .and_where(Expr::col(WebhookDeliveries::WebhookId).eq(webhook_id))
        .build(SqliteQueryBuilder)
}
