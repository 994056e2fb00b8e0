//! Resource-scoped permission resolution.
//!
//! Three pieces cooperate here:
//!
//! - [`RoleSet`]: named roles, each optionally inheriting from a parent
//!   role. Resolution is an iterative walk over the parent chain with
//!   cycle protection.
//! - [`ResourceGraph`]: the child → parent relationship graph between
//!   resources (e.g. a project under a team). A grant on an ancestor
//!   applies to all of its descendants.
//! - [`PermissionCache`]: memoized `(user, resource)` permission sets.
//!   Invalidation walks the graph downward from the changed resource so
//!   stale entries on descendants are dropped too.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upper bound on parent-chain / ancestor walks. Deeper chains indicate
/// corrupt data rather than a legitimate hierarchy.
const MAX_DEPTH: usize = 64;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PermissionError {
    #[error("unknown role: {0}")]
    UnknownRole(String),
    #[error("role inheritance cycle through: {0}")]
    RoleCycle(String),
}

/// A single permission an actor may hold on a resource.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    View,
    Edit,
    ManageMembers,
    ManageWebhooks,
    ManageSso,
    ManageSettings,
    Delete,
}

impl Action {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "view" => Some(Self::View),
            "edit" => Some(Self::Edit),
            "manage_members" => Some(Self::ManageMembers),
            "manage_webhooks" => Some(Self::ManageWebhooks),
            "manage_sso" => Some(Self::ManageSso),
            "manage_settings" => Some(Self::ManageSettings),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::View => "view",
            Self::Edit => "edit",
            Self::ManageMembers => "manage_members",
            Self::ManageWebhooks => "manage_webhooks",
            Self::ManageSso => "manage_sso",
            Self::ManageSettings => "manage_settings",
            Self::Delete => "delete",
        }
    }
}

/// A named role: its own permissions plus an optional parent to inherit
/// from.
#[derive(Debug, Clone)]
pub struct RoleDef {
    pub name: String,
    pub parent: Option<String>,
    pub permissions: HashSet<Action>,
}

/// The full set of known roles, resolvable to flattened permission sets.
#[derive(Debug, Clone, Default)]
pub struct RoleSet {
    roles: HashMap<String, RoleDef>,
}

impl RoleSet {
    /// The built-in hierarchy: member < admin < owner.
    pub fn builtin() -> Self {
        let mut set = Self::default();
        set.insert(RoleDef {
            name: "member".into(),
            parent: None,
            permissions: [Action::View].into_iter().collect(),
        });
        set.insert(RoleDef {
            name: "admin".into(),
            parent: Some("member".into()),
            permissions: [Action::Edit, Action::ManageMembers, Action::ManageWebhooks]
                .into_iter()
                .collect(),
        });
        set.insert(RoleDef {
            name: "owner".into(),
            parent: Some("admin".into()),
            permissions: [Action::ManageSso, Action::ManageSettings, Action::Delete]
                .into_iter()
                .collect(),
        });
        set
    }

    pub fn insert(&mut self, def: RoleDef) {
        self.roles.insert(def.name.clone(), def);
    }

    /// Flatten a role into its full permission set, following parent
    /// pointers iteratively. A revisited role name means a cycle.
    pub fn resolve(&self, role: &str) -> Result<HashSet<Action>, PermissionError> {
        let mut permissions = HashSet::new();
        let mut visited: HashSet<&str> = HashSet::new();
        let mut current = Some(role);

        while let Some(name) = current {
            if !visited.insert(name) {
                return Err(PermissionError::RoleCycle(name.to_string()));
            }
            if visited.len() > MAX_DEPTH {
                return Err(PermissionError::RoleCycle(name.to_string()));
            }
            let def = self
                .roles
                .get(name)
                .ok_or_else(|| PermissionError::UnknownRole(name.to_string()))?;
            permissions.extend(def.permissions.iter().copied());
            current = def.parent.as_deref();
        }

        Ok(permissions)
    }
}

/// Child → parent links between resources.
#[derive(Debug, Clone, Default)]
pub struct ResourceGraph {
    parent: HashMap<String, String>,
    children: HashMap<String, Vec<String>>,
}

impl ResourceGraph {
    /// Register `child` under `parent`, replacing any previous parent.
    pub fn link(&mut self, child: &str, parent: &str) {
        self.unlink(child);
        self.parent.insert(child.to_string(), parent.to_string());
        self.children
            .entry(parent.to_string())
            .or_default()
            .push(child.to_string());
    }

    pub fn unlink(&mut self, child: &str) {
        if let Some(old) = self.parent.remove(child) {
            if let Some(siblings) = self.children.get_mut(&old) {
                siblings.retain(|c| c != child);
            }
        }
    }

    /// The resource itself followed by its ancestors, nearest first.
    /// The walk is depth-capped, so a corrupt cyclic chain terminates.
    pub fn self_and_ancestors(&self, id: &str) -> Vec<String> {
        let mut chain = vec![id.to_string()];
        let mut current = id;
        while let Some(parent) = self.parent.get(current) {
            if chain.len() > MAX_DEPTH || chain.iter().any(|c| c == parent) {
                break;
            }
            chain.push(parent.clone());
            current = parent;
        }
        chain
    }

    /// The resource itself plus every transitive descendant.
    pub fn self_and_descendants(&self, id: &str) -> Vec<String> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut queue = vec![id.to_string()];
        let mut out = Vec::new();
        while let Some(next) = queue.pop() {
            if !seen.insert(next.clone()) {
                continue;
            }
            if let Some(kids) = self.children.get(&next) {
                queue.extend(kids.iter().cloned());
            }
            out.push(next);
        }
        out
    }
}

/// Find the nearest grant for `user` on `resource` or any ancestor.
///
/// `grant_for` is the storage lookup: role name granted to the user on
/// one specific resource, if any.
pub fn nearest_grant<F>(graph: &ResourceGraph, resource: &str, grant_for: F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    graph
        .self_and_ancestors(resource)
        .iter()
        .find_map(|r| grant_for(r))
}

/// Memoized `(user, resource)` → permission set results.
#[derive(Debug, Default)]
pub struct PermissionCache {
    entries: HashMap<(String, String), HashSet<Action>>,
}

impl PermissionCache {
    pub fn get(&self, user: &str, resource: &str) -> Option<&HashSet<Action>> {
        self.entries
            .get(&(user.to_string(), resource.to_string()))
    }

    pub fn put(&mut self, user: &str, resource: &str, permissions: HashSet<Action>) {
        self.entries
            .insert((user.to_string(), resource.to_string()), permissions);
    }

    /// Drop every cached entry for `resource` and its descendants, for
    /// all users. Called when grants or relationships change.
    pub fn invalidate_resource(&mut self, graph: &ResourceGraph, resource: &str) {
        let affected: HashSet<String> =
            graph.self_and_descendants(resource).into_iter().collect();
        self.entries.retain(|(_, r), _| !affected.contains(r));
    }

    /// Drop every cached entry for one user (e.g. on account deletion).
    pub fn invalidate_user(&mut self, user: &str) {
        self.entries.retain(|(u, _), _| u != user);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roles() -> RoleSet {
        RoleSet::builtin()
    }

    #[test]
    fn test_builtin_inheritance() {
        let r = roles();
        let member = r.resolve("member").unwrap();
        assert!(member.contains(&Action::View));
        assert!(!member.contains(&Action::Edit));

        let admin = r.resolve("admin").unwrap();
        assert!(admin.contains(&Action::View), "inherited from member");
        assert!(admin.contains(&Action::ManageMembers));
        assert!(!admin.contains(&Action::ManageSso));

        let owner = r.resolve("owner").unwrap();
        assert!(owner.contains(&Action::View));
        assert!(owner.contains(&Action::ManageMembers));
        assert!(owner.contains(&Action::Delete));
    }

    #[test]
    fn test_unknown_role() {
        assert_eq!(
            roles().resolve("superuser"),
            Err(PermissionError::UnknownRole("superuser".into()))
        );
    }

    #[test]
    fn test_role_cycle_detected() {
        let mut r = RoleSet::default();
        r.insert(RoleDef {
            name: "a".into(),
            parent: Some("b".into()),
            permissions: HashSet::new(),
        });
        r.insert(RoleDef {
            name: "b".into(),
            parent: Some("a".into()),
            permissions: HashSet::new(),
        });
        assert!(matches!(r.resolve("a"), Err(PermissionError::RoleCycle(_))));
    }

    #[test]
    fn test_grant_falls_back_to_ancestor() {
        let mut graph = ResourceGraph::default();
        graph.link("project-1", "team-1");
        graph.link("task-9", "project-1");

        let grant = |r: &str| (r == "team-1").then(|| "admin".to_string());
        assert_eq!(
            nearest_grant(&graph, "task-9", grant),
            Some("admin".to_string())
        );
        assert_eq!(nearest_grant(&graph, "team-2", grant), None);
    }

    #[test]
    fn test_nearest_grant_wins() {
        let mut graph = ResourceGraph::default();
        graph.link("project-1", "team-1");

        let grant = |r: &str| match r {
            "team-1" => Some("owner".to_string()),
            "project-1" => Some("member".to_string()),
            _ => None,
        };
        assert_eq!(
            nearest_grant(&graph, "project-1", grant),
            Some("member".to_string())
        );
    }

    #[test]
    fn test_cache_invalidation_cascades() {
        let mut graph = ResourceGraph::default();
        graph.link("project-1", "team-1");
        graph.link("task-9", "project-1");

        let mut cache = PermissionCache::default();
        cache.put("u1", "team-1", HashSet::new());
        cache.put("u1", "project-1", HashSet::new());
        cache.put("u1", "task-9", HashSet::new());
        cache.put("u2", "other", HashSet::new());

        cache.invalidate_resource(&graph, "project-1");
        assert!(cache.get("u1", "team-1").is_some());
        assert!(cache.get("u1", "project-1").is_none());
        assert!(cache.get("u1", "task-9").is_none());
        assert!(cache.get("u2", "other").is_some());
    }

    #[test]
    fn test_cache_invalidate_user() {
        let mut cache = PermissionCache::default();
        cache.put("u1", "team-1", HashSet::new());
        cache.put("u2", "team-1", HashSet::new());
        cache.invalidate_user("u1");
        assert!(cache.get("u1", "team-1").is_none());
        assert!(cache.get("u2", "team-1").is_some());
    }

    #[test]
    fn test_relink_moves_subtree() {
        let mut graph = ResourceGraph::default();
        graph.link("p", "team-a");
        graph.link("p", "team-b");
        assert_eq!(
            graph.self_and_ancestors("p"),
            vec!["p".to_string(), "team-b".to_string()]
        );
        assert!(!graph.self_and_descendants("team-a").contains(&"p".to_string()));
    }
}
