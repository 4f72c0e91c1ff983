use anyhow::Result;
use rusqlite::{Connection, OptionalExtension};
use tracing::info;

use super::schema::{CREATE_TABLES, SCHEMA_VERSION};

/// Run all pending migrations
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let mut current_version = get_current_version(conn)?;

    if current_version == 0 {
        info!("Creating new database (schema version 1)");
        initial_setup(conn)?;
        current_version = 1;
    }

    if current_version < SCHEMA_VERSION {
        info!(
            "Migrating database from version {} to {}",
            current_version, SCHEMA_VERSION
        );
        migrate_from(conn, current_version)?;
    } else {
        info!("Database is up to date (version {})", current_version);
    }

    Ok(())
}

pub fn get_current_version(conn: &Connection) -> Result<i32> {
    let table_exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_migrations')",
        [],
        |row| row.get(0),
    )?;

    if !table_exists {
        return Ok(0);
    }

    let version: Option<i32> = conn
        .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| row.get(0))
        .optional()?
        .flatten();

    Ok(version.unwrap_or(0))
}

fn initial_setup(conn: &Connection) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(CREATE_TABLES)?;
    tx.execute("INSERT INTO schema_migrations (version) VALUES (1)", [])?;
    tx.commit()?;

    info!("Initial setup complete");
    Ok(())
}

fn migrate_from(conn: &Connection, from_version: i32) -> Result<()> {
    for version in (from_version + 1)..=SCHEMA_VERSION {
        let tx = conn.unchecked_transaction()?;

        match version {
            2 => migrate_v1_to_v2(&tx)?,
            3 => migrate_v2_to_v3(&tx)?,
            _ => {}
        }

        tx.execute("INSERT INTO schema_migrations (version) VALUES (?)", [version])?;
        tx.commit()?;

        info!("Migrated to version {}", version);
    }

    Ok(())
}

/// Migration v1 -> v2: version column for optimistic locking
fn migrate_v1_to_v2(conn: &Connection) -> Result<()> {
    info!("Migration v2: adding documents.version");

    conn.execute_batch("ALTER TABLE documents ADD COLUMN version INTEGER NOT NULL DEFAULT 1;")?;

    Ok(())
}

/// Migration v2 -> v3: split "Approved - Forwarded to X" into status + forwarded_to
fn migrate_v2_to_v3(conn: &Connection) -> Result<()> {
    info!("Migration v3: adding documents.forwarded_to");

    conn.execute_batch("ALTER TABLE documents ADD COLUMN forwarded_to TEXT;")?;

    let affected = conn.execute(
        "UPDATE documents
         SET forwarded_to = trim(substr(status, instr(lower(status), 'forwarded to') + 12)),
             status = 'Approved'
         WHERE lower(status) LIKE 'approved - forwarded to %'",
        [],
    )?;

    info!("Normalized {} forwarded statuses", affected);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_initial_migration() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();

        for table in [
            "users",
            "documents",
            "document_actions",
            "document_attachments",
            "document_comments",
            "system_logs",
            "login_activity",
        ] {
            assert!(tables.contains(&table.to_string()), "missing {}", table);
        }

        assert_eq!(get_current_version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn test_idempotent_migration() {
        let conn = Connection::open_in_memory().unwrap();

        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let version = get_current_version(&conn).unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn test_v3_normalizes_free_text_status() {
        let conn = Connection::open_in_memory().unwrap();
        initial_setup(&conn).unwrap();

        conn.execute(
            "INSERT INTO documents (tracking_code, title, sender, recipient, status)
             VALUES ('DOC-2025-001', 'Memo', 'HR', 'Registry', 'Approved - Forwarded to Finance')",
            [],
        )
        .unwrap();

        run_migrations(&conn).unwrap();

        let (status, forwarded, version): (String, Option<String>, i64) = conn
            .query_row(
                "SELECT status, forwarded_to, version FROM documents WHERE tracking_code = 'DOC-2025-001'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .unwrap();

        assert_eq!(status, "Approved");
        assert_eq!(forwarded.as_deref(), Some("Finance"));
        assert_eq!(version, 1);
    }
}
