//! In-memory notification queue.
//!
//! Deliberately non-persistent: domain events enqueue entries here and a
//! periodic job flushes them into the notifications table. Entries queued
//! between flush and crash are lost, which is acceptable for this tier.

use std::sync::{Arc, Mutex};

use uuid::Uuid;

use userhub_api::db;

use crate::storage::{sq_execute, Db};

#[derive(Debug, Clone)]
pub struct Pending {
    pub user_id: String,
    pub kind: String,
    pub title: String,
    pub body: Option<String>,
}

#[derive(Clone, Default)]
pub struct NotificationQueue {
    inner: Arc<Mutex<Vec<Pending>>>,
}

impl NotificationQueue {
    pub fn push(&self, user_id: &str, kind: &str, title: &str, body: Option<String>) {
        self.inner
            .lock()
            .expect("notification queue poisoned")
            .push(Pending {
                user_id: user_id.to_string(),
                kind: kind.to_string(),
                title: title.to_string(),
                body,
            });
    }

    /// Take everything currently queued.
    pub fn drain(&self) -> Vec<Pending> {
        std::mem::take(&mut *self.inner.lock().expect("notification queue poisoned"))
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("notification queue poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Persist every queued notification. Rows that fail to insert are logged
/// and dropped rather than re-queued.
pub fn flush(queue: &NotificationQueue, db: &Db) {
    let pending = queue.drain();
    if pending.is_empty() {
        return;
    }
    let conn = db.conn();
    for p in &pending {
        if let Err(e) = sq_execute(
            &conn,
            db::notifications::insert(
                &Uuid::new_v4().to_string(),
                &p.user_id,
                &p.kind,
                &p.title,
                p.body.as_deref(),
            ),
        ) {
            tracing::warn!("notification insert failed for {}: {e}", p.user_id);
        }
    }
    tracing::debug!("flushed {} notification(s)", pending.len());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{init_db, sq_query_all};

    #[test]
    fn test_push_and_drain() {
        let queue = NotificationQueue::default();
        assert!(queue.is_empty());
        queue.push("u-1", "team.member_added", "Added to Acme", None);
        queue.push("u-2", "gdpr.export_ready", "Export ready", Some("body".into()));
        assert_eq!(queue.len(), 2);
        let drained = queue.drain();
        assert_eq!(drained.len(), 2);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_flush_writes_rows() {
        let dir = tempfile::tempdir().unwrap();
        let db = init_db(dir.path()).unwrap();
        {
            let conn = db.conn();
            sq_execute(
                &conn,
                db::users::insert("u-1", "a@b.co", "a", "h", "s", "k"),
            )
            .unwrap();
        }

        let queue = NotificationQueue::default();
        queue.push("u-1", "team.member_added", "Added to Acme", None);
        flush(&queue, &db);
        assert!(queue.is_empty());

        let conn = db.conn();
        let rows: Vec<String> = sq_query_all(
            &conn,
            db::notifications::list_for_user("u-1", false, 50),
            |row| row.get(2),
        )
        .unwrap();
        assert_eq!(rows, vec!["Added to Acme".to_string()]);
    }
}
