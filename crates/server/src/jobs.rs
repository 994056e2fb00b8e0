//! Periodic background tasks: unverified-account cleanup, execution of
//! due deletion requests, and the notification queue drain.

use std::time::Duration;

use userhub_api::db;

use crate::audit;
use crate::notify::{self, NotificationQueue};
use crate::perms::Perms;
use crate::storage::{sq_execute, sq_query_all, Db};

const CLEANUP_INTERVAL: Duration = Duration::from_secs(3600);
const DRAIN_INTERVAL: Duration = Duration::from_secs(5);

/// Spawn the background tasks. Runs for the lifetime of the process.
pub fn spawn(db: Db, queue: NotificationQueue, perms: Perms, unverified_ttl_days: i64) {
    let cleanup_db = db.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(CLEANUP_INTERVAL);
        loop {
            ticker.tick().await;
            match cleanup_unverified(&cleanup_db, unverified_ttl_days) {
                Ok(0) => {}
                Ok(n) => tracing::info!("purged {n} unverified account(s)"),
                Err(e) => tracing::warn!("unverified cleanup failed: {e}"),
            }
            match execute_due_deletions(&cleanup_db, &perms) {
                Ok(0) => {}
                Ok(n) => tracing::info!("executed {n} account deletion(s)"),
                Err(e) => tracing::warn!("deletion execution failed: {e}"),
            }
        }
    });

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(DRAIN_INTERVAL);
        loop {
            ticker.tick().await;
            notify::flush(&queue, &db);
        }
    });
}

/// Delete users that never verified their email within `ttl_days`.
pub fn cleanup_unverified(db: &Db, ttl_days: i64) -> anyhow::Result<usize> {
    let cutoff = (chrono::Utc::now() - chrono::Duration::days(ttl_days))
        .format("%Y-%m-%d %H:%M:%S")
        .to_string();
    let conn = db.conn();
    Ok(sq_execute(&conn, db::users::delete_unverified_before(&cutoff))?)
}

/// Execute pending deletion requests whose grace window has elapsed:
/// erase the account and mark the request completed.
pub fn execute_due_deletions(db: &Db, perms: &Perms) -> anyhow::Result<usize> {
    let now = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string();
    let due: Vec<(String, String)> = {
        let conn = db.conn();
        sq_query_all(&conn, db::gdpr::due_pending(&now), |row| {
            Ok((row.get(0)?, row.get(1)?))
        })?
    };

    for (request_id, user_id) in &due {
        {
            let conn = db.conn();
            // Webhooks go first (deliveries cascade with them); grants
            // are not FK-backed; the rest cascades off the user row.
            sq_execute(&conn, db::webhooks::delete_for_user(user_id))?;
            sq_execute(&conn, db::grants::delete_for_user(user_id))?;
            sq_execute(&conn, db::users::delete(user_id))?;
            sq_execute(&conn, db::gdpr::update_status(request_id, "completed"))?;
        }
        perms.invalidate_user(user_id);
        audit::log_user_action(db, user_id, "gdpr.execute_deletion", Some(request_id), None);
        tracing::info!("executed deletion request {request_id}");
    }
    Ok(due.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{init_db, sq_query_row};

    #[test]
    fn test_cleanup_only_removes_stale_unverified_users() {
        let dir = tempfile::tempdir().unwrap();
        let db = init_db(dir.path()).unwrap();
        {
            let conn = db.conn();
            sq_execute(&conn, db::users::insert("u-old", "old@b.co", "o", "h", "s", "k1")).unwrap();
            sq_execute(&conn, db::users::insert("u-new", "new@b.co", "n", "h", "s", "k2")).unwrap();
            sq_execute(&conn, db::users::insert("u-ok", "ok@b.co", "v", "h", "s", "k3")).unwrap();
            sq_execute(&conn, db::users::mark_email_verified("u-ok")).unwrap();
            // Backdate two accounts past the TTL.
            conn.execute(
                "UPDATE users SET created_at = '2000-01-01 00:00:00' WHERE id IN ('u-old', 'u-ok')",
                [],
            )
            .unwrap();
        }

        let removed = cleanup_unverified(&db, 7).unwrap();
        assert_eq!(removed, 1);

        let conn = db.conn();
        for (id, expected) in [("u-old", false), ("u-new", true), ("u-ok", true)] {
            let found = sq_query_row(&conn, db::users::get_by_id(id), |row| {
                row.get::<_, String>(0)
            })
            .is_ok();
            assert_eq!(found, expected, "user {id}");
        }
    }

    #[test]
    fn test_due_deletion_erases_account_and_completes_request() {
        let dir = tempfile::tempdir().unwrap();
        let db = init_db(dir.path()).unwrap();
        let perms = Perms::default();
        {
            let conn = db.conn();
            sq_execute(&conn, db::users::insert("u-1", "a@b.co", "a", "h", "s", "k1")).unwrap();
            sq_execute(&conn, db::users::insert("u-2", "b@b.co", "b", "h", "s", "k2")).unwrap();
            sq_execute(
                &conn,
                db::webhooks::insert("w-1", "u-1", "http://hook.test/x", "sec", "[\"user.created\"]"),
            )
            .unwrap();
            sq_execute(&conn, db::grants::upsert("u-1", "t-1", "member")).unwrap();
            // One request past its grace window, one still inside it.
            sq_execute(
                &conn,
                db::gdpr::insert_deletion_request("d-1", "u-1", "2000-01-01 00:00:00"),
            )
            .unwrap();
            sq_execute(
                &conn,
                db::gdpr::insert_deletion_request("d-2", "u-2", "2999-01-01 00:00:00"),
            )
            .unwrap();
        }

        let executed = execute_due_deletions(&db, &perms).unwrap();
        assert_eq!(executed, 1);

        let conn = db.conn();
        assert!(
            sq_query_row(&conn, db::users::get_by_id("u-1"), |r| r.get::<_, String>(0)).is_err()
        );
        assert!(
            sq_query_row(&conn, db::users::get_by_id("u-2"), |r| r.get::<_, String>(0)).is_ok()
        );

        let status: String = conn
            .query_row("SELECT status FROM deletion_requests WHERE id = 'd-1'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(status, "completed");
        let untouched: String = conn
            .query_row("SELECT status FROM deletion_requests WHERE id = 'd-2'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(untouched, "pending");

        let webhooks: i64 = conn
            .query_row("SELECT COUNT(*) FROM webhooks WHERE user_id = 'u-1'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(webhooks, 0);
        let grants: i64 = conn
            .query_row("SELECT COUNT(*) FROM grants WHERE user_id = 'u-1'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(grants, 0);
    }
}
