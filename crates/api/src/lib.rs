//! Shared API types, crypto, and SQL builders for userhub.
//!
//! This crate is the single source of truth for all API request/response
//! types, the framework-agnostic [`ServiceError`], and the sea-query
//! builders the server executes against SQLite.

use serde::{Deserialize, Serialize};

pub mod crypto;
pub mod db;
pub mod service;

pub use userhub_core::{Action, DomainEvent, EventKind, TeamRole};

// ─── Auth ────────────────────────────────────────────────────────────────────

/// Email + password registration.
#[derive(Debug, Serialize, Deserialize)]
pub struct AuthRegisterRequest {
    pub email: String,
    pub password: String,
    pub nickname: String,
}

/// Returned on successful registration.
///
/// `verification_token` is handed back directly: this service ships no
/// mailer, so the operator (or a downstream integration) is responsible
/// for delivering it.
#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub user_id: String,
    pub nickname: String,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: u64,
    pub verification_token: String,
}

/// Email + password login.
#[derive(Debug, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Returned on successful login / refresh.
#[derive(Debug, Serialize, Deserialize)]
pub struct AuthTokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: u64,
    pub user_id: String,
    pub nickname: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Logout request (invalidate refresh token).
#[derive(Debug, Serialize, Deserialize)]
pub struct LogoutRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// Consume an email verification token.
#[derive(Debug, Serialize, Deserialize)]
pub struct VerifyEmailRequest {
    pub token: String,
}

/// Current user summary returned by `GET /api/auth/me`.
#[derive(Debug, Serialize, Deserialize)]
pub struct MeResponse {
    pub user_id: String,
    pub email: String,
    pub nickname: String,
    pub email_verified: bool,
    pub is_admin: bool,
    pub created_at: String,
}

/// Response for API key regeneration. The raw key is shown exactly once.
#[derive(Debug, Serialize, Deserialize)]
pub struct RegenerateKeyResponse {
    pub api_key: String,
}

// ─── Profiles ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileResponse {
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub locale: Option<String>,
    pub avatar_url: Option<String>,
}

/// Partial profile update: absent fields are left untouched.
#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub locale: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusinessProfileResponse {
    pub company_name: Option<String>,
    pub vat_id: Option<String>,
    pub billing_email: Option<String>,
    pub address_line1: Option<String>,
    pub address_line2: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateBusinessProfileRequest {
    pub company_name: Option<String>,
    pub vat_id: Option<String>,
    pub billing_email: Option<String>,
    pub address_line1: Option<String>,
    pub address_line2: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
}

// ─── Teams ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateTeamRequest {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTeamRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamResponse {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub created_by: String,
    pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TeamDetailResponse {
    pub team: TeamResponse,
    pub member_count: i64,
    /// The caller's role in this team, if they are a member.
    pub my_role: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListTeamsResponse {
    pub teams: Vec<TeamResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberResponse {
    pub user_id: String,
    pub nickname: String,
    pub role: String,
    pub joined_at: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListMembersResponse {
    pub members: Vec<MemberResponse>,
}

/// Add a member directly by email (admin shortcut, no invitation flow).
#[derive(Debug, Deserialize)]
pub struct AddMemberRequest {
    pub email: String,
    pub role: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct InviteRequest {
    pub email: String,
    pub role: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvitationResponse {
    pub id: String,
    pub team_id: String,
    pub team_name: String,
    pub email: String,
    pub invited_by_nickname: String,
    pub role: String,
    pub status: String,
    pub created_at: String,
    pub expires_at: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListInvitationsResponse {
    pub invitations: Vec<InvitationResponse>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AcceptInvitationResponse {
    pub team_id: String,
    pub role: String,
}

/// Generic success response for operations that don't return data.
#[derive(Debug, Serialize, Deserialize)]
pub struct OkResponse {
    pub ok: bool,
}

// ─── Permissions ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct PermissionCheckQuery {
    pub resource: String,
    pub action: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PermissionCheckResponse {
    pub allowed: bool,
}

// ─── SSO ─────────────────────────────────────────────────────────────────────

/// Upsert body for `PUT /api/organizations/:org_id/sso/:idp_type/config`.
///
/// `config` is validated per idp type by
/// [`service::validate_sso_config`].
#[derive(Debug, Deserialize)]
pub struct PutSsoConfigRequest {
    pub enabled: bool,
    pub config: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SsoConfigResponse {
    pub org_id: String,
    pub idp_type: String,
    pub enabled: bool,
    /// Secret fields are replaced by [`service::SECRET_MASK`].
    pub config: serde_json::Value,
    pub updated_at: String,
}

// ─── Webhooks ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateWebhookRequest {
    pub url: String,
    /// Dotted event names, e.g. `team.member_added`.
    pub events: Vec<String>,
}

/// Returned on webhook creation. The signing secret is shown exactly once.
#[derive(Debug, Serialize, Deserialize)]
pub struct CreateWebhookResponse {
    pub id: String,
    pub url: String,
    pub events: Vec<String>,
    pub secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookResponse {
    pub id: String,
    pub url: String,
    pub events: Vec<String>,
    pub enabled: bool,
    pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListWebhooksResponse {
    pub webhooks: Vec<WebhookResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryResponse {
    pub id: String,
    pub webhook_id: String,
    pub event_type: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_status: Option<u16>,
    pub attempts: u32,
    pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListDeliveriesResponse {
    pub deliveries: Vec<DeliveryResponse>,
}

// ─── GDPR ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletionRequestResponse {
    pub id: String,
    pub status: String,
    pub requested_at: String,
    /// Deletion executes after this deadline unless cancelled.
    pub grace_until: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportResponse {
    pub id: String,
    pub status: String,
    pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ExportDetailResponse {
    pub id: String,
    pub status: String,
    pub created_at: String,
    pub data: serde_json::Value,
}

// ─── Notifications ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationResponse {
    pub id: String,
    pub kind: String,
    pub title: String,
    pub body: Option<String>,
    pub read: bool,
    pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListNotificationsResponse {
    pub notifications: Vec<NotificationResponse>,
}

#[derive(Debug, Deserialize)]
pub struct NotificationListQuery {
    #[serde(default)]
    pub unread_only: bool,
}

// ─── Admin ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct AdminUserSearchQuery {
    pub search: Option<String>,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

fn default_page() -> u32 {
    1
}
fn default_per_page() -> u32 {
    20
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminUserResponse {
    pub id: String,
    pub email: String,
    pub nickname: String,
    pub email_verified: bool,
    pub is_admin: bool,
    pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AdminUserListResponse {
    pub users: Vec<AdminUserResponse>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
}

// ─── Service Error ───────────────────────────────────────────────────────────

/// Framework-agnostic service error.
///
/// Each variant maps to an HTTP status code; the server converts this
/// into the JSON error response.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum ServiceError {
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    RateLimited(String),
    Internal(String),
    Timeout(String),
}

impl ServiceError {
    /// HTTP status code as a `u16`.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::BadRequest(_) => 400,
            Self::Unauthorized(_) => 401,
            Self::Forbidden(_) => 403,
            Self::NotFound(_) => 404,
            Self::Conflict(_) => 409,
            Self::RateLimited(_) => 429,
            Self::Internal(_) => 500,
            Self::Timeout(_) => 504,
        }
    }

    /// The error message.
    pub fn message(&self) -> &str {
        match self {
            Self::BadRequest(m)
            | Self::Unauthorized(m)
            | Self::Forbidden(m)
            | Self::NotFound(m)
            | Self::Conflict(m)
            | Self::RateLimited(m)
            | Self::Internal(m)
            | Self::Timeout(m) => m,
        }
    }
}

impl std::fmt::Display for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ServiceError {}
