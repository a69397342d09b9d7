//! Durable dedup state: an embedded SQLite database holding every entry id
//! ever inspected plus the recent-title window. Accessed only from the
//! poller task, so a plain connection is enough; no pooling, no locking.

use anyhow::{Context, Result};
use rusqlite::{params, Connection};
use std::path::Path;

/// A title signature row as stored.
#[derive(Debug, Clone, PartialEq)]
pub struct TitleRow {
    pub id: i64,
    pub title: String,
    pub published_at: i64,
}

pub struct StateStore {
    conn: Connection,
}

impl StateStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("opening state db at {}", path.display()))?;
        Self::init(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("opening in-memory state db")?;
        Self::init(&conn)?;
        Ok(Self { conn })
    }

    fn init(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS processed_entries (
                entry_id TEXT PRIMARY KEY,
                seen_at  INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS recent_titles (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                title        TEXT NOT NULL,
                published_at INTEGER NOT NULL
            );",
        )
        .context("creating state tables")
    }

    /// Record an inspected entry id. Idempotent: re-inserting an id keeps
    /// the original timestamp.
    pub fn insert_processed(&self, entry_id: &str, seen_at: i64) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR IGNORE INTO processed_entries (entry_id, seen_at) VALUES (?1, ?2)",
                params![entry_id, seen_at],
            )
            .context("inserting processed entry")?;
        Ok(())
    }

    /// All processed ids, oldest first.
    pub fn load_processed_ids(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT entry_id FROM processed_entries ORDER BY seen_at ASC, rowid ASC")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.context("reading processed entry row")?);
        }
        Ok(out)
    }

    pub fn processed_count(&self) -> Result<usize> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM processed_entries", [], |row| {
                row.get(0)
            })?;
        Ok(n as usize)
    }

    /// Append a published title signature; returns its row id.
    pub fn insert_title(&self, title: &str, published_at: i64) -> Result<i64> {
        self.conn
            .execute(
                "INSERT INTO recent_titles (title, published_at) VALUES (?1, ?2)",
                params![title, published_at],
            )
            .context("inserting title signature")?;
        Ok(self.conn.last_insert_rowid())
    }

    /// All title signatures, oldest first.
    pub fn load_titles(&self) -> Result<Vec<TitleRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, title, published_at FROM recent_titles ORDER BY published_at ASC, id ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(TitleRow {
                id: row.get(0)?,
                title: row.get(1)?,
                published_at: row.get(2)?,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.context("reading title row")?);
        }
        Ok(out)
    }

    pub fn delete_title(&self, id: i64) -> Result<()> {
        self.conn
            .execute("DELETE FROM recent_titles WHERE id = ?1", params![id])
            .context("deleting title signature")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn processed_ids_round_trip_and_ignore_duplicates() {
        let store = StateStore::open_in_memory().unwrap();
        store.insert_processed("chan_1", 100).unwrap();
        store.insert_processed("chan_2", 200).unwrap();
        store.insert_processed("chan_1", 300).unwrap();
        assert_eq!(store.load_processed_ids().unwrap(), vec!["chan_1", "chan_2"]);
        assert_eq!(store.processed_count().unwrap(), 2);
    }

    #[test]
    fn titles_round_trip_and_delete() {
        let store = StateStore::open_in_memory().unwrap();
        let a = store.insert_title("first title", 10).unwrap();
        let b = store.insert_title("second title", 20).unwrap();
        assert_ne!(a, b);

        let rows = store.load_titles().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].title, "first title");

        store.delete_title(a).unwrap();
        let rows = store.load_titles().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, b);
    }

    #[test]
    fn state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.db");
        {
            let store = StateStore::open(&path).unwrap();
            store.insert_processed("chan_x", 1).unwrap();
            store.insert_title("a title", 1).unwrap();
        }
        let store = StateStore::open(&path).unwrap();
        assert_eq!(store.load_processed_ids().unwrap(), vec!["chan_x"]);
        assert_eq!(store.load_titles().unwrap().len(), 1);
    }
}
