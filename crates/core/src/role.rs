//! Team role hierarchy.
//!
//! Roles are ordered; each role carries the capabilities of every role
//! below it. The hierarchy is: Member < Admin < Owner.

use serde::{Deserialize, Serialize};

/// Role within a team.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TeamRole {
    /// Regular member: read access to team resources.
    Member = 0,

    /// Can manage members, invitations, and webhooks.
    Admin = 1,

    /// Full team control: settings, SSO configuration, deletion.
    Owner = 2,
}

impl TeamRole {
    /// `true` for Admin and Owner.
    pub fn can_manage_members(&self) -> bool {
        *self >= TeamRole::Admin
    }

    /// `true` only for Owner. Covers SSO configuration and team deletion.
    pub fn can_manage_settings(&self) -> bool {
        *self >= TeamRole::Owner
    }

    /// Parse a role from its stored string form (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "member" => Some(Self::Member),
            "admin" => Some(Self::Admin),
            "owner" => Some(Self::Owner),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Member => "member",
            Self::Admin => "admin",
            Self::Owner => "owner",
        }
    }
}

impl Default for TeamRole {
    fn default() -> Self {
        Self::Member
    }
}

impl std::fmt::Display for TeamRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_hierarchy() {
        assert!(TeamRole::Owner > TeamRole::Admin);
        assert!(TeamRole::Admin > TeamRole::Member);
    }

    #[test]
    fn test_role_capabilities() {
        assert!(!TeamRole::Member.can_manage_members());
        assert!(TeamRole::Admin.can_manage_members());
        assert!(!TeamRole::Admin.can_manage_settings());
        assert!(TeamRole::Owner.can_manage_settings());
    }

    #[test]
    fn test_role_parse() {
        assert_eq!(TeamRole::parse("admin"), Some(TeamRole::Admin));
        assert_eq!(TeamRole::parse("OWNER"), Some(TeamRole::Owner));
        assert_eq!(TeamRole::parse("invalid"), None);
    }
}
