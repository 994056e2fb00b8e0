//! Domain events emitted by the service.
//!
//! Events feed two consumers: the webhook dispatcher (signed outbound
//! POSTs) and the notification queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Everything that can be subscribed to by a webhook.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum EventKind {
    #[serde(rename = "user.created")]
    UserCreated,
    #[serde(rename = "user.deleted")]
    UserDeleted,
    #[serde(rename = "team.created")]
    TeamCreated,
    #[serde(rename = "team.deleted")]
    TeamDeleted,
    #[serde(rename = "team.member_added")]
    TeamMemberAdded,
    #[serde(rename = "team.member_removed")]
    TeamMemberRemoved,
    #[serde(rename = "gdpr.deletion_requested")]
    GdprDeletionRequested,
    #[serde(rename = "gdpr.export_ready")]
    GdprExportReady,
    #[serde(rename = "webhook.test")]
    WebhookTest,
}

impl EventKind {
    /// Dotted wire name, e.g. `team.member_added`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UserCreated => "user.created",
            Self::UserDeleted => "user.deleted",
            Self::TeamCreated => "team.created",
            Self::TeamDeleted => "team.deleted",
            Self::TeamMemberAdded => "team.member_added",
            Self::TeamMemberRemoved => "team.member_removed",
            Self::GdprDeletionRequested => "gdpr.deletion_requested",
            Self::GdprExportReady => "gdpr.export_ready",
            Self::WebhookTest => "webhook.test",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user.created" => Some(Self::UserCreated),
            "user.deleted" => Some(Self::UserDeleted),
            "team.created" => Some(Self::TeamCreated),
            "team.deleted" => Some(Self::TeamDeleted),
            "team.member_added" => Some(Self::TeamMemberAdded),
            "team.member_removed" => Some(Self::TeamMemberRemoved),
            "gdpr.deletion_requested" => Some(Self::GdprDeletionRequested),
            "gdpr.export_ready" => Some(Self::GdprExportReady),
            "webhook.test" => Some(Self::WebhookTest),
            _ => None,
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A concrete event instance with its JSON payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub occurred_at: DateTime<Utc>,
    pub data: serde_json::Value,
}

impl DomainEvent {
    pub fn new(kind: EventKind, data: serde_json::Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            occurred_at: Utc::now(),
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trip() {
        for kind in [
            EventKind::UserCreated,
            EventKind::TeamMemberAdded,
            EventKind::GdprDeletionRequested,
            EventKind::WebhookTest,
        ] {
            assert_eq!(EventKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(EventKind::parse("nope"), None);
    }

    #[test]
    fn test_event_serializes_type_field() {
        let ev = DomainEvent::new(EventKind::UserCreated, serde_json::json!({"id": "u1"}));
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "user.created");
        assert_eq!(json["data"]["id"], "u1");
    }
}
