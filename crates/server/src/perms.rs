//! Permission resolution against the grants and resource_links tables.
//!
//! Wraps the pure resolution logic from `userhub_core` with storage
//! lookups and a shared result cache.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use userhub_api::db;
use userhub_core::{nearest_grant, Action, PermissionCache, ResourceGraph, RoleSet, TeamRole};

use crate::storage::{sq_query_all, sq_query_row};

/// Shared permission service: built-in role hierarchy plus a memoized
/// `(user, resource)` result cache.
#[derive(Clone)]
pub struct Perms {
    roles: Arc<RoleSet>,
    cache: Arc<Mutex<PermissionCache>>,
}

impl Default for Perms {
    fn default() -> Self {
        Self {
            roles: Arc::new(RoleSet::builtin()),
            cache: Arc::new(Mutex::new(PermissionCache::default())),
        }
    }
}

impl Perms {
    /// Whether `user_id` may perform `action` on `resource`.
    ///
    /// Grant lookup falls back to the nearest ancestor in the resource
    /// relationship graph; resolved permission sets are cached until a
    /// mutation invalidates them.
    pub fn check(
        &self,
        conn: &Connection,
        user_id: &str,
        resource: &str,
        action: Action,
    ) -> rusqlite::Result<bool> {
        {
            let cache = self.cache.lock().expect("permission cache poisoned");
            if let Some(set) = cache.get(user_id, resource) {
                return Ok(set.contains(&action));
            }
        }

        let graph = load_graph(conn)?;
        let role = nearest_grant(&graph, resource, |rid| {
            sq_query_row(conn, db::grants::role_for(user_id, rid), |row| row.get(0)).ok()
        });

        let permissions: HashSet<Action> = match role {
            Some(name) => self.roles.resolve(&name).unwrap_or_else(|e| {
                tracing::warn!("unresolvable role {name:?} for {user_id}: {e}");
                HashSet::new()
            }),
            None => HashSet::new(),
        };

        let allowed = permissions.contains(&action);
        self.cache
            .lock()
            .expect("permission cache poisoned")
            .put(user_id, resource, permissions);
        Ok(allowed)
    }

    /// Invalidate cached results for `resource` and all its descendants.
    pub fn invalidate_resource(&self, conn: &Connection, resource: &str) {
        let graph = match load_graph(conn) {
            Ok(g) => g,
            Err(e) => {
                tracing::warn!("resource graph load failed during invalidation: {e}");
                ResourceGraph::default()
            }
        };
        self.cache
            .lock()
            .expect("permission cache poisoned")
            .invalidate_resource(&graph, resource);
    }

    pub fn invalidate_user(&self, user_id: &str) {
        self.cache
            .lock()
            .expect("permission cache poisoned")
            .invalidate_user(user_id);
    }

    #[cfg(test)]
    pub fn cached_entries(&self) -> usize {
        self.cache.lock().unwrap().len()
    }
}

/// Load the full child → parent relationship graph.
fn load_graph(conn: &Connection) -> rusqlite::Result<ResourceGraph> {
    let links: Vec<(String, String)> = sq_query_all(conn, db::grants::all_links(), |row| {
        Ok((row.get(0)?, row.get(1)?))
    })?;
    let mut graph = ResourceGraph::default();
    for (child, parent) in &links {
        graph.link(child, parent);
    }
    Ok(graph)
}

/// The caller's role in a team, if they are a member.
pub fn team_role(conn: &Connection, team_id: &str, user_id: &str) -> Option<TeamRole> {
    let role: String = sq_query_row(conn, db::teams::member_role(team_id, user_id), |row| {
        row.get(0)
    })
    .ok()?;
    TeamRole::parse(&role)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{init_db, sq_execute};

    fn seeded() -> (tempfile::TempDir, crate::storage::Db) {
        let dir = tempfile::tempdir().unwrap();
        let db = init_db(dir.path()).unwrap();
        (dir, db)
    }

    #[test]
    fn test_direct_grant_allows_action() {
        let (_dir, db) = seeded();
        let conn = db.conn();
        sq_execute(&conn, db::grants::upsert("u-1", "team-1", "admin")).unwrap();

        let perms = Perms::default();
        assert!(perms
            .check(&conn, "u-1", "team-1", Action::ManageMembers)
            .unwrap());
        assert!(!perms.check(&conn, "u-1", "team-1", Action::Delete).unwrap());
        assert!(!perms
            .check(&conn, "u-2", "team-1", Action::View)
            .unwrap());
    }

    #[test]
    fn test_grant_on_ancestor_applies_to_child() {
        let (_dir, db) = seeded();
        let conn = db.conn();
        sq_execute(&conn, db::grants::upsert("u-1", "team-1", "owner")).unwrap();
        sq_execute(&conn, db::grants::link_resource("proj-1", "team-1")).unwrap();

        let perms = Perms::default();
        assert!(perms.check(&conn, "u-1", "proj-1", Action::Delete).unwrap());
    }

    #[test]
    fn test_invalidation_after_grant_change() {
        let (_dir, db) = seeded();
        let conn = db.conn();
        sq_execute(&conn, db::grants::upsert("u-1", "team-1", "member")).unwrap();
        sq_execute(&conn, db::grants::link_resource("proj-1", "team-1")).unwrap();

        let perms = Perms::default();
        assert!(!perms
            .check(&conn, "u-1", "proj-1", Action::ManageMembers)
            .unwrap());
        assert_eq!(perms.cached_entries(), 1);

        // Promotion on the parent must drop the cached child result.
        sq_execute(&conn, db::grants::upsert("u-1", "team-1", "admin")).unwrap();
        perms.invalidate_resource(&conn, "team-1");
        assert_eq!(perms.cached_entries(), 0);
        assert!(perms
            .check(&conn, "u-1", "proj-1", Action::ManageMembers)
            .unwrap());
    }

    #[test]
    fn test_team_role_lookup() {
        let (_dir, db) = seeded();
        let conn = db.conn();
        sq_execute(&conn, db::users::insert("u-1", "a@b.co", "a", "h", "s", "k")).unwrap();
        sq_execute(&conn, db::teams::insert("t-1", "Acme", None, "u-1")).unwrap();
        sq_execute(&conn, db::teams::insert_member("t-1", "u-1", "owner")).unwrap();

        assert_eq!(team_role(&conn, "t-1", "u-1"), Some(TeamRole::Owner));
        assert_eq!(team_role(&conn, "t-1", "u-2"), None);
    }
}
