//! SQLite storage: connection handling, migrations, sea-query execution
//! helpers, and shared row mappers.

use anyhow::{Context, Result};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};

use userhub_api::{InvitationResponse, MemberResponse, TeamResponse};

/// Shared database state
#[derive(Clone)]
pub struct Db {
    conn: Arc<Mutex<Connection>>,
}

impl Db {
    pub fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().expect("database mutex poisoned")
    }
}

/// Initialize the database: open connection, enable WAL, run migrations
pub fn init_db(data_dir: &Path) -> Result<Db> {
    std::fs::create_dir_all(data_dir)?;
    let db_path = data_dir.join("userhub.db");
    let conn = Connection::open(&db_path).context("opening SQLite database")?;

    // WAL for better concurrent read performance
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    conn.execute_batch("PRAGMA foreign_keys=ON;")?;

    run_migrations(&conn)?;

    Ok(Db {
        conn: Arc::new(Mutex::new(conn)),
    })
}

fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    let migrations = vec![("0001_init", include_str!("../../../migrations/0001_init.sql"))];

    for (name, sql) in migrations {
        let already_applied: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM _migrations WHERE name = ?1",
                [name],
                |row| row.get(0),
            )
            .unwrap_or(false);

        if !already_applied {
            conn.execute_batch(sql)
                .with_context(|| format!("running migration {name}"))?;
            conn.execute("INSERT INTO _migrations (name) VALUES (?1)", [name])?;
            tracing::info!("Applied migration: {name}");
        }
    }

    Ok(())
}

// ── sea-query execution helpers ────────────────────────────────────────────

fn to_sql_value(v: sea_query::Value) -> rusqlite::types::Value {
    use rusqlite::types::Value as Sql;
    use sea_query::Value as V;
    match v {
        V::Bool(b) => b.map(|b| Sql::Integer(b as i64)).unwrap_or(Sql::Null),
        V::TinyInt(x) => x.map(|x| Sql::Integer(x as i64)).unwrap_or(Sql::Null),
        V::SmallInt(x) => x.map(|x| Sql::Integer(x as i64)).unwrap_or(Sql::Null),
        V::Int(x) => x.map(|x| Sql::Integer(x as i64)).unwrap_or(Sql::Null),
        V::BigInt(x) => x.map(Sql::Integer).unwrap_or(Sql::Null),
        V::TinyUnsigned(x) => x.map(|x| Sql::Integer(x as i64)).unwrap_or(Sql::Null),
        V::SmallUnsigned(x) => x.map(|x| Sql::Integer(x as i64)).unwrap_or(Sql::Null),
        V::Unsigned(x) => x.map(|x| Sql::Integer(x as i64)).unwrap_or(Sql::Null),
        V::BigUnsigned(x) => x.map(|x| Sql::Integer(x as i64)).unwrap_or(Sql::Null),
        V::Float(x) => x.map(|x| Sql::Real(x as f64)).unwrap_or(Sql::Null),
        V::Double(x) => x.map(Sql::Real).unwrap_or(Sql::Null),
        V::Char(c) => c.map(|c| Sql::Text(c.to_string())).unwrap_or(Sql::Null),
        V::String(s) => s.map(|s| Sql::Text(*s)).unwrap_or(Sql::Null),
        V::Bytes(b) => b.map(|b| Sql::Blob(*b)).unwrap_or(Sql::Null),
        #[allow(unreachable_patterns)]
        _ => Sql::Null,
    }
}

fn bind_values(values: sea_query::Values) -> Vec<rusqlite::types::Value> {
    values.0.into_iter().map(to_sql_value).collect()
}

/// Execute a built statement, returning the affected row count.
pub fn sq_execute(conn: &Connection, built: (String, sea_query::Values)) -> rusqlite::Result<usize> {
    let (sql, values) = built;
    conn.execute(&sql, rusqlite::params_from_iter(bind_values(values)))
}

/// Run a built query expected to yield one row.
pub fn sq_query_row<T, F>(
    conn: &Connection,
    built: (String, sea_query::Values),
    f: F,
) -> rusqlite::Result<T>
where
    F: FnOnce(&rusqlite::Row<'_>) -> rusqlite::Result<T>,
{
    let (sql, values) = built;
    conn.query_row(&sql, rusqlite::params_from_iter(bind_values(values)), f)
}

/// Run a built query and collect all rows, dropping ones that fail to map.
pub fn sq_query_all<T, F>(
    conn: &Connection,
    built: (String, sea_query::Values),
    f: F,
) -> rusqlite::Result<Vec<T>>
where
    F: FnMut(&rusqlite::Row<'_>) -> rusqlite::Result<T>,
{
    let (sql, values) = built;
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(bind_values(values)), f)?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

// ── Shared row mappers ─────────────────────────────────────────────────────

/// Map a row shaped like `db::teams::get` into a [`TeamResponse`].
pub fn team_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<TeamResponse> {
    Ok(TeamResponse {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        created_by: row.get(3)?,
        created_at: row.get(4)?,
    })
}

/// Map a row shaped like `db::teams::list_members`.
pub fn member_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MemberResponse> {
    Ok(MemberResponse {
        user_id: row.get(0)?,
        nickname: row.get(1)?,
        role: row.get(2)?,
        joined_at: row.get(3)?,
    })
}

/// Map a row shaped like `db::invitations::list_for_email`.
pub fn invitation_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<InvitationResponse> {
    Ok(InvitationResponse {
        id: row.get(0)?,
        team_id: row.get(1)?,
        team_name: row.get(2)?,
        email: row.get(3)?,
        invited_by_nickname: row.get(4)?,
        role: row.get(5)?,
        status: row.get(6)?,
        created_at: row.get(7)?,
        expires_at: row.get(8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use userhub_api::db;

    fn test_db() -> (tempfile::TempDir, Db) {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = init_db(dir.path()).expect("init db");
        (dir, db)
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        init_db(dir.path()).unwrap();
        // Re-opening must not re-run the migration.
        init_db(dir.path()).unwrap();
    }

    #[test]
    fn test_insert_and_query_user_via_builders() {
        let (_dir, db) = test_db();
        let conn = db.conn();

        sq_execute(
            &conn,
            db::users::insert("u-1", "a@b.co", "alice", "h", "s", "kh"),
        )
        .unwrap();

        let exists: bool = sq_query_row(&conn, db::users::email_exists("a@b.co"), |row| {
            row.get(0)
        })
        .unwrap();
        assert!(exists);

        let (id, nickname): (String, String) =
            sq_query_row(&conn, db::users::get_by_email_for_login("a@b.co"), |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .unwrap();
        assert_eq!(id, "u-1");
        assert_eq!(nickname, "alice");
    }

    #[test]
    fn test_duplicate_email_violates_constraint() {
        let (_dir, db) = test_db();
        let conn = db.conn();
        sq_execute(
            &conn,
            db::users::insert("u-1", "a@b.co", "alice", "h", "s", "k1"),
        )
        .unwrap();
        let err = sq_execute(
            &conn,
            db::users::insert("u-2", "a@b.co", "bob", "h", "s", "k2"),
        )
        .unwrap_err();
        match err {
            rusqlite::Error::SqliteFailure(e, _) => {
                assert_eq!(e.code, rusqlite::ErrorCode::ConstraintViolation)
            }
            other => panic!("expected constraint violation, got {other}"),
        }
    }

    #[test]
    fn test_team_membership_round_trip() {
        let (_dir, db) = test_db();
        let conn = db.conn();
        sq_execute(
            &conn,
            db::users::insert("u-1", "a@b.co", "alice", "h", "s", "k"),
        )
        .unwrap();
        sq_execute(&conn, db::teams::insert("t-1", "Acme", None, "u-1")).unwrap();
        sq_execute(&conn, db::teams::insert_member("t-1", "u-1", "owner")).unwrap();

        let members = sq_query_all(&conn, db::teams::list_members("t-1"), member_from_row).unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].role, "owner");

        let owners: i64 = sq_query_row(&conn, db::teams::owner_count("t-1"), |r| r.get(0)).unwrap();
        assert_eq!(owners, 1);
    }

    #[test]
    fn test_grants_upsert_replaces_role() {
        let (_dir, db) = test_db();
        let conn = db.conn();
        sq_execute(&conn, db::grants::upsert("u-1", "t-1", "member")).unwrap();
        sq_execute(&conn, db::grants::upsert("u-1", "t-1", "admin")).unwrap();
        let role: String =
            sq_query_row(&conn, db::grants::role_for("u-1", "t-1"), |r| r.get(0)).unwrap();
        assert_eq!(role, "admin");
    }
}
