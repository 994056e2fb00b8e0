//! Shared business logic — framework-agnostic pure functions.
//!
//! Route handlers stay thin adapters: parse, call one of these, run the
//! prepared SQL, shape the response.

use userhub_core::EventKind;

use crate::{AuthTokenResponse, ServiceError};

// ─── Validation ─────────────────────────────────────────────────────────────

/// Validate and normalize an email address. Returns the lowercased, trimmed email.
pub fn validate_email(email: &str) -> Result<String, ServiceError> {
    let email = email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') || email.len() > 254 {
        return Err(ServiceError::BadRequest("invalid email address".into()));
    }
    Ok(email)
}

/// Validate a password (8-128 characters).
pub fn validate_password(password: &str) -> Result<(), ServiceError> {
    if password.len() < 8 {
        return Err(ServiceError::BadRequest(
            "password must be at least 8 characters".into(),
        ));
    }
    if password.len() > 128 {
        return Err(ServiceError::BadRequest(
            "password must be at most 128 characters".into(),
        ));
    }
    Ok(())
}

/// Validate and normalize a user nickname. Returns the trimmed nickname.
pub fn validate_nickname(nickname: &str) -> Result<String, ServiceError> {
    let trimmed = nickname.trim().to_string();
    if trimmed.is_empty() || trimmed.len() > 64 {
        return Err(ServiceError::BadRequest(
            "nickname must be 1-64 characters".into(),
        ));
    }
    Ok(trimmed)
}

/// Validate and normalize a team name. Returns the trimmed name.
pub fn validate_team_name(name: &str) -> Result<String, ServiceError> {
    let trimmed = name.trim().to_string();
    if trimmed.is_empty() || trimmed.len() > 100 {
        return Err(ServiceError::BadRequest(
            "team name must be 1-100 characters".into(),
        ));
    }
    Ok(trimmed)
}

/// Validate a member role string against the built-in hierarchy.
/// Ownership is only ever assigned by team creation, never by request.
pub fn validate_member_role(role: Option<&str>) -> Result<String, ServiceError> {
    match role.unwrap_or("member") {
        "member" => Ok("member".into()),
        "admin" => Ok("admin".into()),
        other => Err(ServiceError::BadRequest(format!(
            "invalid role: {other} (expected member or admin)"
        ))),
    }
}

/// Validate a webhook target URL (http/https only).
pub fn validate_webhook_url(url: &str) -> Result<String, ServiceError> {
    let trimmed = url.trim().to_string();
    if !trimmed.starts_with("http://") && !trimmed.starts_with("https://") {
        return Err(ServiceError::BadRequest(
            "webhook url must be http(s)".into(),
        ));
    }
    if trimmed.len() > 2048 {
        return Err(ServiceError::BadRequest("webhook url too long".into()));
    }
    Ok(trimmed)
}

/// Validate subscribed event names; returns the parsed kinds.
pub fn validate_event_list(events: &[String]) -> Result<Vec<EventKind>, ServiceError> {
    if events.is_empty() {
        return Err(ServiceError::BadRequest(
            "at least one event type required".into(),
        ));
    }
    events
        .iter()
        .map(|e| {
            EventKind::parse(e)
                .ok_or_else(|| ServiceError::BadRequest(format!("unknown event type: {e}")))
        })
        .collect()
}

// ─── SSO configuration ──────────────────────────────────────────────────────

/// Replacement value for secret fields in SSO config responses.
pub const SECRET_MASK: &str = "********";

/// Identity-provider types supported for SSO configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdpType {
    Saml,
    Oidc,
}

impl IdpType {
    pub fn parse(s: &str) -> Result<Self, ServiceError> {
        match s {
            "saml" => Ok(Self::Saml),
            "oidc" => Ok(Self::Oidc),
            other => Err(ServiceError::BadRequest(format!(
                "unknown idp type: {other} (expected saml or oidc)"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Saml => "saml",
            Self::Oidc => "oidc",
        }
    }

    /// Required string fields in the config JSON for this idp type.
    fn required_fields(&self) -> &'static [&'static str] {
        match self {
            Self::Saml => &["metadata_url", "entity_id", "certificate"],
            Self::Oidc => &["issuer_url", "client_id", "client_secret"],
        }
    }

    /// Fields masked in GET responses.
    fn secret_fields(&self) -> &'static [&'static str] {
        match self {
            Self::Saml => &["certificate"],
            Self::Oidc => &["client_secret"],
        }
    }
}

/// Check that an SSO config JSON object carries the fields the idp type
/// requires, all non-empty strings.
pub fn validate_sso_config(
    idp_type: IdpType,
    config: &serde_json::Value,
) -> Result<(), ServiceError> {
    let obj = config
        .as_object()
        .ok_or_else(|| ServiceError::BadRequest("config must be a JSON object".into()))?;
    for field in idp_type.required_fields() {
        match obj.get(*field).and_then(|v| v.as_str()) {
            Some(s) if !s.trim().is_empty() => {}
            _ => {
                return Err(ServiceError::BadRequest(format!(
                    "missing or empty config field: {field}"
                )))
            }
        }
    }
    Ok(())
}

/// Return a copy of the config with secret fields replaced by
/// [`SECRET_MASK`].
pub fn redact_sso_config(idp_type: IdpType, config: &serde_json::Value) -> serde_json::Value {
    let mut redacted = config.clone();
    if let Some(obj) = redacted.as_object_mut() {
        for field in idp_type.secret_fields() {
            if obj.contains_key(*field) {
                obj.insert(field.to_string(), serde_json::json!(SECRET_MASK));
            }
        }
    }
    redacted
}

// ─── API Key Generation ─────────────────────────────────────────────────────

/// Generate a new API key with the `uhk_` prefix.
pub fn generate_api_key() -> String {
    format!("uhk_{}", uuid::Uuid::new_v4().simple())
}

/// Hash an API key for persistent storage and lookup.
pub fn hash_api_key(api_key: &str) -> String {
    crate::crypto::hash_token(api_key)
}

// ─── Auth Token Resolution ──────────────────────────────────────────────────

/// Result of resolving an auth token string.
pub enum AuthToken {
    /// JWT was valid — contains the extracted user_id.
    Jwt(String),
    /// Token is an API key (`uhk_` prefix) — caller must look up in DB.
    ApiKey(String),
}

/// Resolve a bearer token into either a verified JWT user_id or an API
/// key. Centralizes the JWT-vs-API-key branching used by the extractor.
pub fn resolve_auth_token(
    token: &str,
    jwt_secret: &str,
    now: u64,
) -> Result<AuthToken, ServiceError> {
    if token.starts_with("uhk_") {
        return Ok(AuthToken::ApiKey(token.to_string()));
    }

    if jwt_secret.is_empty() {
        return Err(ServiceError::Unauthorized(
            "JWT authentication not configured".into(),
        ));
    }

    let user_id = crate::crypto::verify_jwt(token, jwt_secret, now)?;
    Ok(AuthToken::Jwt(user_id))
}

// ─── Token Bundle ───────────────────────────────────────────────────────────

/// Pre-computed token bundle returned by [`prepare_token_bundle`].
///
/// Contains everything needed to insert a refresh token and return the
/// auth response. The caller only performs the DB INSERT.
#[derive(Debug)]
pub struct TokenBundle {
    /// JWT access token.
    pub access_token: String,
    /// Raw refresh token (sent to the client).
    pub refresh_token: String,
    /// SHA-256 hash of the refresh token (stored in DB).
    pub token_hash: String,
    /// UUID primary key for the refresh_tokens row.
    pub token_id: String,
    /// `datetime` string for the refresh token expiry (DB column value).
    pub expires_at: String,
    /// Ready-to-return API response.
    pub response: AuthTokenResponse,
}

/// Build a [`TokenBundle`] containing a JWT, refresh token, and the auth
/// response.
pub fn prepare_token_bundle(
    jwt_secret: &str,
    user_id: &str,
    nickname: &str,
    now_unix: u64,
) -> Result<TokenBundle, ServiceError> {
    use crate::crypto;

    let access_token = crypto::sign_jwt(user_id, jwt_secret, now_unix);
    let refresh_token = crypto::generate_token()?;
    let token_hash = crypto::hash_token(&refresh_token);
    let token_id = uuid::Uuid::new_v4().to_string();

    let base = chrono::DateTime::from_timestamp(now_unix as i64, 0)
        .ok_or_else(|| ServiceError::Internal("invalid timestamp".into()))?;
    let expires_at = base
        .checked_add_signed(chrono::Duration::seconds(
            crypto::REFRESH_EXPIRY_SECS as i64,
        ))
        .ok_or_else(|| ServiceError::Internal("timestamp overflow".into()))?
        .format("%Y-%m-%d %H:%M:%S")
        .to_string();

    let response = AuthTokenResponse {
        access_token: access_token.clone(),
        refresh_token: refresh_token.clone(),
        expires_in: crypto::JWT_EXPIRY_SECS,
        user_id: user_id.to_string(),
        nickname: nickname.to_string(),
    };

    Ok(TokenBundle {
        access_token,
        refresh_token,
        token_hash,
        token_id,
        expires_at,
        response,
    })
}

/// SQLite datetime string `days` from `now_unix`.
pub fn datetime_in_days(now_unix: u64, days: i64) -> Result<String, ServiceError> {
    let base = chrono::DateTime::from_timestamp(now_unix as i64, 0)
        .ok_or_else(|| ServiceError::Internal("invalid timestamp".into()))?;
    Ok((base + chrono::Duration::days(days))
        .format("%Y-%m-%d %H:%M:%S")
        .to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_email() {
        assert_eq!(validate_email("  A@B.co  ").unwrap(), "a@b.co");
        assert!(validate_email("not-an-email").is_err());
        assert!(validate_email("").is_err());
    }

    #[test]
    fn test_validate_nickname() {
        assert!(validate_nickname("alice").is_ok());
        assert_eq!(validate_nickname("  bob  ").unwrap(), "bob");
        assert!(validate_nickname("").is_err());
        assert!(validate_nickname(&"x".repeat(65)).is_err());
        assert!(validate_nickname(&"x".repeat(64)).is_ok());
    }

    #[test]
    fn test_validate_member_role() {
        assert_eq!(validate_member_role(None).unwrap(), "member");
        assert_eq!(validate_member_role(Some("admin")).unwrap(), "admin");
        assert!(validate_member_role(Some("owner")).is_err());
        assert!(validate_member_role(Some("root")).is_err());
    }

    #[test]
    fn test_validate_event_list() {
        assert!(validate_event_list(&[]).is_err());
        assert!(validate_event_list(&["user.created".into()]).is_ok());
        assert!(validate_event_list(&["user.created".into(), "bogus".into()]).is_err());
    }

    #[test]
    fn test_validate_webhook_url() {
        assert!(validate_webhook_url("https://example.com/hook").is_ok());
        assert!(validate_webhook_url("ftp://example.com").is_err());
    }

    #[test]
    fn test_sso_config_validation() {
        let saml = serde_json::json!({
            "metadata_url": "https://idp/metadata",
            "entity_id": "urn:example",
            "certificate": "MIIC..."
        });
        assert!(validate_sso_config(IdpType::Saml, &saml).is_ok());
        assert!(validate_sso_config(IdpType::Oidc, &saml).is_err());

        let missing = serde_json::json!({"metadata_url": "https://idp/metadata"});
        assert!(validate_sso_config(IdpType::Saml, &missing).is_err());
    }

    #[test]
    fn test_sso_config_redaction() {
        let oidc = serde_json::json!({
            "issuer_url": "https://idp",
            "client_id": "abc",
            "client_secret": "topsecret"
        });
        let redacted = redact_sso_config(IdpType::Oidc, &oidc);
        assert_eq!(redacted["client_secret"], SECRET_MASK);
        assert_eq!(redacted["client_id"], "abc");
    }

    #[test]
    fn test_resolve_auth_token_branches() {
        match resolve_auth_token("uhk_abc123", "secret", 0).unwrap() {
            AuthToken::ApiKey(k) => assert_eq!(k, "uhk_abc123"),
            _ => panic!("expected ApiKey"),
        }
        let jwt = crate::crypto::sign_jwt("u-1", "secret", 100);
        match resolve_auth_token(&jwt, "secret", 150).unwrap() {
            AuthToken::Jwt(u) => assert_eq!(u, "u-1"),
            _ => panic!("expected Jwt"),
        }
        assert!(resolve_auth_token("garbage", "", 0).is_err());
    }
}
