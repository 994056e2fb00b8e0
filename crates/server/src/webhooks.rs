//! Webhook delivery engine.
//!
//! Domain events are fanned out to every enabled webhook subscribed to
//! the event type. Each delivery is a signed JSON POST, retried with
//! exponential backoff on 5xx and network failures; 4xx responses are
//! terminal. Every attempt sequence is recorded as one delivery row.

use std::time::Duration;

use futures::future::join_all;
use uuid::Uuid;

use userhub_api::{crypto, db, DomainEvent};

use crate::storage::{sq_execute, sq_query_all, Db};

/// Header carrying the hex HMAC-SHA256 of the request body.
pub const SIGNATURE_HEADER: &str = "X-Webhook-Signature";

/// Delivery tuning knobs, loaded from the environment in `main`.
#[derive(Clone)]
pub struct WebhookConfig {
    pub max_attempts: u32,
    pub timeout_secs: u64,
    pub backoff_base_ms: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            timeout_secs: 10,
            backoff_base_ms: 500,
        }
    }
}

/// Result of one delivery (all attempts included).
#[derive(Debug)]
pub struct DeliveryOutcome {
    pub status: &'static str,
    pub failure: Option<&'static str>,
    pub response_status: Option<i64>,
    pub attempts: u32,
}

#[derive(Clone)]
pub struct WebhookEngine {
    client: reqwest::Client,
    db: Db,
    config: WebhookConfig,
}

struct Target {
    id: String,
    url: String,
    secret: String,
    events: Vec<String>,
}

impl WebhookEngine {
    pub fn new(db: Db, config: WebhookConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, db, config })
    }

    /// Fan an event out to all subscribed webhooks in the background.
    pub fn dispatch(&self, event: DomainEvent) {
        let engine = self.clone();
        tokio::spawn(async move {
            engine.dispatch_now(event).await;
        });
    }

    /// Fan-out body: scatter all deliveries concurrently, collect each
    /// result independently.
    pub async fn dispatch_now(&self, event: DomainEvent) {
        let kind = event.kind.as_str();
        let targets = {
            let conn = self.db.conn();
            match sq_query_all(&conn, db::webhooks::list_enabled(), |row| {
                let events_json: String = row.get(3)?;
                Ok(Target {
                    id: row.get(0)?,
                    url: row.get(1)?,
                    secret: row.get(2)?,
                    events: serde_json::from_str(&events_json).unwrap_or_default(),
                })
            }) {
                Ok(all) => all
                    .into_iter()
                    .filter(|t| t.events.iter().any(|e| e == kind))
                    .collect::<Vec<_>>(),
                Err(e) => {
                    tracing::error!("webhook target query failed: {e}");
                    return;
                }
            }
        };
        if targets.is_empty() {
            return;
        }

        let payload = match serde_json::to_string(&event) {
            Ok(p) => p,
            Err(e) => {
                tracing::error!("event serialization failed: {e}");
                return;
            }
        };

        tracing::debug!("dispatching {kind} to {} webhook(s)", targets.len());
        let outcomes = join_all(
            targets
                .iter()
                .map(|t| self.deliver(&t.url, &t.secret, &payload)),
        )
        .await;

        for (target, outcome) in targets.iter().zip(outcomes) {
            self.record(&target.id, kind, &payload, &outcome);
        }
    }

    /// POST the payload to one webhook, retrying on retryable failures.
    pub async fn deliver(&self, url: &str, secret: &str, payload: &str) -> DeliveryOutcome {
        let signature = crypto::sign_webhook(secret, payload.as_bytes());
        let mut failure = None;
        let mut response_status = None;

        for attempt in 1..=self.config.max_attempts {
            match self
                .client
                .post(url)
                .header("content-type", "application/json")
                .header(SIGNATURE_HEADER, &signature)
                .body(payload.to_string())
                .send()
                .await
            {
                Ok(resp) => {
                    let status = resp.status();
                    response_status = Some(status.as_u16() as i64);
                    if status.is_success() {
                        return DeliveryOutcome {
                            status: "delivered",
                            failure: None,
                            response_status,
                            attempts: attempt,
                        };
                    }
                    if status.is_server_error() {
                        failure = Some("server_error");
                    } else {
                        // 4xx is terminal — the endpoint rejected us.
                        return DeliveryOutcome {
                            status: "failed",
                            failure: Some("client_error"),
                            response_status,
                            attempts: attempt,
                        };
                    }
                }
                Err(e) => {
                    response_status = None;
                    failure = Some(if e.is_timeout() { "timeout" } else { "connect" });
                    tracing::debug!("webhook attempt {attempt} to {url} failed: {e}");
                }
            }

            if attempt < self.config.max_attempts {
                tokio::time::sleep(self.backoff_delay(attempt)).await;
            }
        }

        DeliveryOutcome {
            status: "failed",
            failure,
            response_status,
            attempts: self.config.max_attempts,
        }
    }

    /// Exponential backoff: base doubles per attempt, shift capped so
    /// the delay cannot overflow.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let shift = (attempt - 1).min(6);
        Duration::from_millis(self.config.backoff_base_ms.saturating_mul(1u64 << shift))
    }

    /// Persist the outcome of one delivery. Best-effort.
    pub fn record(&self, webhook_id: &str, event_type: &str, payload: &str, o: &DeliveryOutcome) {
        let conn = self.db.conn();
        if let Err(e) = sq_execute(
            &conn,
            db::webhooks::insert_delivery(
                &Uuid::new_v4().to_string(),
                webhook_id,
                event_type,
                payload,
                o.status,
                o.failure,
                o.response_status,
                o.attempts as i64,
            ),
        ) {
            tracing::warn!("delivery record insert failed for {webhook_id}: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{init_db, sq_query_row};
    use userhub_api::EventKind;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_engine() -> (tempfile::TempDir, WebhookEngine) {
        let dir = tempfile::tempdir().unwrap();
        let db = init_db(dir.path()).unwrap();
        let engine = WebhookEngine::new(
            db,
            WebhookConfig {
                max_attempts: 3,
                timeout_secs: 5,
                backoff_base_ms: 1,
            },
        )
        .unwrap();
        (dir, engine)
    }

    #[tokio::test]
    async fn test_successful_delivery_is_signed() {
        let (_dir, engine) = test_engine();
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let payload = r#"{"type":"webhook.test"}"#;
        let outcome = engine
            .deliver(&format!("{}/hook", server.uri()), "whsec", payload)
            .await;
        assert_eq!(outcome.status, "delivered");
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.response_status, Some(200));

        let requests = server.received_requests().await.unwrap();
        let sig = requests[0].headers[SIGNATURE_HEADER].to_str().unwrap();
        assert!(crypto::verify_webhook_signature(
            "whsec",
            &requests[0].body,
            sig
        ));
    }

    #[tokio::test]
    async fn test_server_errors_are_retried() {
        let (_dir, engine) = test_engine();
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&server)
            .await;

        let outcome = engine.deliver(&server.uri(), "whsec", "{}").await;
        assert_eq!(outcome.status, "failed");
        assert_eq!(outcome.failure, Some("server_error"));
        assert_eq!(outcome.attempts, 3);
    }

    #[tokio::test]
    async fn test_client_errors_are_terminal() {
        let (_dir, engine) = test_engine();
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = engine.deliver(&server.uri(), "whsec", "{}").await;
        assert_eq!(outcome.status, "failed");
        assert_eq!(outcome.failure, Some("client_error"));
        assert_eq!(outcome.response_status, Some(404));
        assert_eq!(outcome.attempts, 1);
    }

    #[tokio::test]
    async fn test_connect_failure_classification() {
        let (_dir, engine) = test_engine();
        // Nothing listens on this port.
        let outcome = engine
            .deliver("http://127.0.0.1:9/hook", "whsec", "{}")
            .await;
        assert_eq!(outcome.status, "failed");
        assert_eq!(outcome.failure, Some("connect"));
        assert_eq!(outcome.response_status, None);
    }

    #[tokio::test]
    async fn test_dispatch_filters_by_subscription() {
        let (_dir, engine) = test_engine();
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        {
            let conn = engine.db.conn();
            sq_execute(
                &conn,
                db::users::insert("u-1", "a@b.co", "a", "h", "s", "k"),
            )
            .unwrap();
            sq_execute(
                &conn,
                db::webhooks::insert("wh-1", "u-1", &server.uri(), "s1", r#"["user.created"]"#),
            )
            .unwrap();
            sq_execute(
                &conn,
                db::webhooks::insert("wh-2", "u-1", &server.uri(), "s2", r#"["team.created"]"#),
            )
            .unwrap();
        }

        let event = DomainEvent::new(EventKind::UserCreated, serde_json::json!({"user_id":"u-1"}));
        engine.dispatch_now(event).await;

        let conn = engine.db.conn();
        let recorded: String =
            sq_query_row(&conn, db::webhooks::list_deliveries("wh-1", 10), |row| {
                row.get(3)
            })
            .unwrap();
        assert_eq!(recorded, "delivered");
        assert!(
            sq_query_row(&conn, db::webhooks::list_deliveries("wh-2", 10), |row| row
                .get::<_, String>(0))
            .is_err()
        );
    }
}
