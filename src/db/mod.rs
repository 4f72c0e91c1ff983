pub mod schema;
pub mod migrations;
pub mod user_repo;
pub mod document_repo;
pub mod log_repo;
pub mod attachment_repo;

use anyhow::{anyhow, Result};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

pub use attachment_repo::AttachmentRepository;
pub use document_repo::DocumentRepository;
pub use log_repo::LogRepository;
pub use user_repo::UserRepository;

/// Shared connection handle used by every repository
pub type SharedConnection = Arc<Mutex<Connection>>;

/// Lock the shared connection, turning a poisoned lock into an error
pub(crate) fn lock(conn: &SharedConnection) -> Result<MutexGuard<'_, Connection>> {
    conn.lock().map_err(|_| anyhow!("Database connection lock poisoned"))
}

/// Main database wrapper with thread-safe access
pub struct Database {
    conn: SharedConnection,
}

impl Database {
    /// Open or create the database file
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA busy_timeout = 5000;
            "
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database (for tests)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.migrate()?;
        Ok(db)
    }

    /// Run database migrations
    pub fn migrate(&self) -> Result<()> {
        let conn = lock(&self.conn)?;
        migrations::run_migrations(&conn)
    }

    pub fn users(&self) -> UserRepository {
        UserRepository::new(Arc::clone(&self.conn))
    }

    pub fn documents(&self) -> DocumentRepository {
        DocumentRepository::new(Arc::clone(&self.conn))
    }

    pub fn logs(&self) -> LogRepository {
        LogRepository::new(Arc::clone(&self.conn))
    }

    pub fn attachments(&self) -> AttachmentRepository {
        AttachmentRepository::new(Arc::clone(&self.conn))
    }

    /// Direct access to the connection (maintenance, multi-table work)
    pub fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = lock(&self.conn)?;
        f(&conn)
    }

    /// Run `f` inside one transaction. Commits when `f` returns Ok and rolls
    /// back otherwise. Repositories are locked by the caller here, so `f`
    /// must use their `*_tx` functions rather than `db.users()` and friends.
    pub fn transaction<F, T, E>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&Connection) -> std::result::Result<T, E>,
        E: From<anyhow::Error>,
    {
        let mut conn = lock(&self.conn)?;
        let tx = conn.transaction().map_err(anyhow::Error::from)?;
        let value = f(&tx)?;
        tx.commit().map_err(anyhow::Error::from)?;
        Ok(value)
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            conn: Arc::clone(&self.conn),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log_count(db: &Database) -> i64 {
        db.with_connection(|conn| {
            Ok(conn.query_row("SELECT COUNT(*) FROM system_logs", [], |row| row.get(0))?)
        })
        .unwrap()
    }

    #[test]
    fn test_transaction_commits_or_rolls_back() {
        let db = Database::open_in_memory().unwrap();

        let failed: Result<()> = db.transaction(|conn| {
            LogRepository::log_tx(conn, "admin", "first", None)?;
            Err(anyhow!("abort"))
        });
        assert!(failed.is_err());
        assert_eq!(log_count(&db), 0);

        db.transaction(|conn| -> Result<()> {
            LogRepository::log_tx(conn, "admin", "first", None)?;
            LogRepository::log_tx(conn, "admin", "second", None)?;
            Ok(())
        })
        .unwrap();
        assert_eq!(log_count(&db), 2);

        // The lock is released again afterwards
        db.logs().log("admin", "third", None).unwrap();
        assert_eq!(log_count(&db), 3);
    }
}
