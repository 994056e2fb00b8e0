//! Best-effort audit trail. Failures are logged and never surfaced.

use uuid::Uuid;

use userhub_api::db;

use crate::storage::{sq_execute, Db};

/// Append an entry to the audit log.
pub fn log_user_action(
    db: &Db,
    actor_id: &str,
    action: &str,
    target_id: Option<&str>,
    detail: Option<&str>,
) {
    let conn = db.conn();
    if let Err(e) = sq_execute(
        &conn,
        db::audit::insert(
            &Uuid::new_v4().to_string(),
            actor_id,
            action,
            target_id,
            detail,
        ),
    ) {
        tracing::warn!("audit log insert failed ({action} by {actor_id}): {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{init_db, sq_query_all};

    #[test]
    fn test_actions_are_recorded_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let db = init_db(dir.path()).unwrap();
        log_user_action(&db, "u-1", "team.create", Some("t-1"), None);
        log_user_action(&db, "u-1", "team.delete", Some("t-1"), Some("cleanup"));

        let conn = db.conn();
        let actions: Vec<String> =
            sq_query_all(&conn, db::audit::list_for_actor("u-1", 10), |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(actions.len(), 2);
    }
}
