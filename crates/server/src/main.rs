mod audit;
mod error;
mod jobs;
mod notify;
mod perms;
mod routes;
mod storage;
mod webhooks;

use axum::{
    extract::FromRef,
    routing::{delete, get, post, put},
    Router,
};
use std::path::PathBuf;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use notify::NotificationQueue;
use perms::Perms;
use storage::Db;
use webhooks::{WebhookConfig, WebhookEngine};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub config: AppConfig,
    pub perms: Perms,
    pub webhooks: WebhookEngine,
    pub notifications: NotificationQueue,
}

/// Server configuration loaded from environment variables.
#[derive(Clone)]
pub struct AppConfig {
    pub base_url: String,
    pub jwt_secret: String,
    pub unverified_ttl_days: i64,
}

impl FromRef<AppState> for Db {
    fn from_ref(state: &AppState) -> Self {
        state.db.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}

fn env_parsed<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "userhub_server=info,tower_http=info".into()),
        )
        .init();

    // Data directory
    let data_dir = std::env::var("USERHUB_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("data"));

    tracing::info!("data directory: {}", data_dir.display());

    let db = storage::init_db(&data_dir)?;
    tracing::info!("database initialized");

    let base_url = std::env::var("USERHUB_BASE_URL")
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "http://localhost:3000".into());

    let jwt_secret = std::env::var("JWT_SECRET").unwrap_or_default();
    if jwt_secret.is_empty() {
        tracing::warn!("JWT_SECRET not set — JWT auth will be disabled (API keys still work)");
    }

    let config = AppConfig {
        base_url: base_url.clone(),
        jwt_secret,
        unverified_ttl_days: env_parsed("UNVERIFIED_TTL_DAYS", 7),
    };

    let webhook_config = WebhookConfig {
        max_attempts: env_parsed("WEBHOOK_MAX_ATTEMPTS", 3),
        timeout_secs: env_parsed("WEBHOOK_TIMEOUT_SECS", 10),
        ..WebhookConfig::default()
    };

    let notifications = NotificationQueue::default();
    let state = AppState {
        webhooks: WebhookEngine::new(db.clone(), webhook_config)?,
        perms: Perms::default(),
        notifications: notifications.clone(),
        config: config.clone(),
        db: db.clone(),
    };

    jobs::spawn(db, notifications, state.perms.clone(), config.unverified_ttl_days);

    // Build API routes
    let api = Router::new()
        // Health
        .route("/health", get(routes::health::health))
        // Auth
        .route("/auth/register", post(routes::auth::register))
        .route("/auth/login", post(routes::auth::login))
        .route("/auth/refresh", post(routes::auth::refresh))
        .route("/auth/logout", post(routes::auth::logout))
        .route("/auth/password", put(routes::auth::change_password))
        .route("/auth/me", get(routes::auth::me))
        .route("/auth/verify-email", post(routes::auth::verify_email))
        .route("/auth/regenerate-key", post(routes::auth::regenerate_key))
        // Profiles
        .route(
            "/profile",
            get(routes::profile::get_profile).patch(routes::profile::update_profile),
        )
        .route(
            "/profile/business",
            get(routes::profile::get_business).patch(routes::profile::update_business),
        )
        // Teams
        .route("/teams", post(routes::teams::create_team))
        .route("/teams", get(routes::teams::list_my_teams))
        .route(
            "/teams/{id}",
            get(routes::teams::get_team)
                .put(routes::teams::update_team)
                .delete(routes::teams::delete_team),
        )
        .route("/teams/{id}/members", get(routes::teams::list_members))
        .route("/teams/{id}/members", post(routes::teams::add_member))
        .route(
            "/teams/{team_id}/members/{user_id}",
            delete(routes::teams::remove_member),
        )
        // Invitations
        .route("/teams/{id}/invite", post(routes::teams::invite_member))
        .route("/invitations", get(routes::teams::list_invitations))
        .route(
            "/invitations/{id}/accept",
            post(routes::teams::accept_invitation),
        )
        .route(
            "/invitations/{id}/decline",
            post(routes::teams::decline_invitation),
        )
        // Permissions
        .route("/permissions/check", get(routes::permissions::check))
        // SSO provider configuration
        .route(
            "/organizations/{org_id}/sso/{idp_type}/config",
            get(routes::sso::get_config)
                .put(routes::sso::put_config)
                .delete(routes::sso::delete_config),
        )
        // Webhooks
        .route("/webhooks", post(routes::webhooks::create_webhook))
        .route("/webhooks", get(routes::webhooks::list_webhooks))
        .route("/webhooks/{id}", delete(routes::webhooks::delete_webhook))
        .route(
            "/webhooks/{id}/deliveries",
            get(routes::webhooks::list_deliveries),
        )
        .route("/webhooks/{id}/test", post(routes::webhooks::test_webhook))
        // GDPR
        .route(
            "/gdpr/deletion-request",
            post(routes::gdpr::request_deletion)
                .get(routes::gdpr::get_deletion_request)
                .delete(routes::gdpr::cancel_deletion),
        )
        .route("/gdpr/export", post(routes::gdpr::create_export))
        .route("/gdpr/export/{id}", get(routes::gdpr::get_export))
        // Notifications
        .route("/notifications", get(routes::notifications::list))
        .route(
            "/notifications/{id}/read",
            post(routes::notifications::mark_read),
        )
        .route(
            "/notifications/read-all",
            post(routes::notifications::mark_all_read),
        )
        // Admin
        .route("/admin/users", get(routes::admin::list_users))
        .route("/admin/users/{id}", delete(routes::admin::delete_user));

    let app = Router::new()
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    tracing::info!("starting server at {base_url}");

    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".into());
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
