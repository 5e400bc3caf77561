use std::fs;
use std::path::Path;
use std::sync::Mutex;

use rusqlite::{Connection, OptionalExtension, params};

use crate::error::Error;

/// Key/value store the core writes its advisory cache to.
pub trait SettingsStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, Error>;
    fn set(&self, key: &str, value: &str) -> Result<(), Error>;
}

pub const ACCOUNTS_KEY: &str = "accounts";
pub const STEAM_PATH_KEY: &str = "steamPath";

pub struct SqliteSettings {
    conn: Mutex<Connection>,
}

impl SqliteSettings {
    pub fn open(path: &Path) -> Result<Self, Error> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| Error::read(parent, err))?;
        }
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    #[cfg(test)]
    pub fn in_memory() -> Result<Self, Error> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, Error> {
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> rusqlite::Result<T>) -> Result<T, Error> {
        // A panic while holding the lock leaves the connection itself intact.
        let conn = self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(f(&conn)?)
    }
}

fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );",
    )
}

impl SettingsStore for SqliteSettings {
    fn get(&self, key: &str) -> Result<Option<String>, Error> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
        })
    }

    fn set(&self, key: &str, value: &str) -> Result<(), Error> {
        let now = chrono::Utc::now().to_rfc3339();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at;",
                params![key, value, now],
            )
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn updated_at(store: &SqliteSettings, key: &str) -> Result<Option<String>, Error> {
        store.with_conn(|conn| {
            conn.query_row(
                "SELECT updated_at FROM settings WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
        })
    }

    #[test]
    fn set_overwrites_and_stamps() -> anyhow::Result<()> {
        let store = SqliteSettings::in_memory()?;
        assert_eq!(store.get(STEAM_PATH_KEY)?, None);

        store.set(STEAM_PATH_KEY, "/old")?;
        store.set(STEAM_PATH_KEY, "/new")?;
        assert_eq!(store.get(STEAM_PATH_KEY)?, Some("/new".to_string()));

        let stamp = updated_at(&store, STEAM_PATH_KEY)?;
        assert!(stamp.is_some_and(|s| chrono::DateTime::parse_from_rfc3339(&s).is_ok()));
        Ok(())
    }

    #[test]
    fn persists_across_reopen() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("data/settings.db");
        SqliteSettings::open(&path)?.set(ACCOUNTS_KEY, "\"accounts\" {}")?;
        assert_eq!(
            SqliteSettings::open(&path)?.get(ACCOUNTS_KEY)?,
            Some("\"accounts\" {}".to_string())
        );
        Ok(())
    }
}
