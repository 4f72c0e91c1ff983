//! Audit trail: system log, login activity and document history

use anyhow::Result;
use rusqlite::{params, Connection, Row};

use super::{lock, SharedConnection};
use crate::models::{ClientInfo, DocumentAction, LoginActivity, LoginEvent, SystemLog};

pub struct LogRepository {
    conn: SharedConnection,
}

impl LogRepository {
    pub fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }

    // === System log ===

    /// Append a system log row
    pub fn log(&self, actor: &str, action: &str, details: Option<&str>) -> Result<i64> {
        let conn = lock(&self.conn)?;
        Self::log_tx(&conn, actor, action, details)
    }

    pub fn log_tx(conn: &Connection, actor: &str, action: &str, details: Option<&str>) -> Result<i64> {
        conn.execute(
            "INSERT INTO system_logs (actor, action, details) VALUES (?1, ?2, ?3)",
            params![actor, action, details],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Newest entries first, optionally for one actor
    pub fn recent_system_logs(&self, limit: usize, actor: Option<&str>) -> Result<Vec<SystemLog>> {
        let conn = lock(&self.conn)?;
        let mut stmt = conn.prepare(
            "SELECT id, timestamp, actor, action, details FROM system_logs
             WHERE (?1 IS NULL OR actor = ?1 COLLATE NOCASE)
             ORDER BY id DESC LIMIT ?2",
        )?;

        let logs = stmt
            .query_map(params![actor, limit as i64], |row| {
                Ok(SystemLog {
                    id: row.get(0)?,
                    timestamp: row.get(1)?,
                    actor: row.get(2)?,
                    action: row.get(3)?,
                    details: row.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(logs)
    }

    /// Delete system log rows older than `before` (storage timestamp format)
    pub fn purge_system_logs_before(&self, before: &str) -> Result<usize> {
        let conn = lock(&self.conn)?;
        let rows = conn.execute("DELETE FROM system_logs WHERE timestamp < ?", [before])?;
        Ok(rows)
    }

    // === Login activity ===

    pub fn record_login(
        &self,
        user_id: Option<i64>,
        username: &str,
        event: LoginEvent,
        client: &ClientInfo,
    ) -> Result<i64> {
        let conn = lock(&self.conn)?;
        conn.execute(
            "INSERT INTO login_activity (user_id, username, event, ip_address, user_agent)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                user_id,
                username,
                event.to_string(),
                client.ip_address,
                client.user_agent,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn recent_logins(&self, limit: usize, user_id: Option<i64>) -> Result<Vec<LoginActivity>> {
        let conn = lock(&self.conn)?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, username, event, ip_address, user_agent, timestamp
             FROM login_activity
             WHERE (?1 IS NULL OR user_id = ?1)
             ORDER BY id DESC LIMIT ?2",
        )?;

        let rows = stmt
            .query_map(params![user_id, limit as i64], |row| {
                let event: String = row.get(3)?;
                Ok(LoginActivity {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    username: row.get(2)?,
                    event: LoginEvent::from_db_str(&event),
                    ip_address: row.get(4)?,
                    user_agent: row.get(5)?,
                    timestamp: row.get(6)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(rows)
    }

    // === Document history ===

    pub fn record_action_tx(conn: &Connection, action: &DocumentAction) -> Result<i64> {
        conn.execute(
            "INSERT INTO document_actions (document_id, user_id, actor, action, from_status, to_status, notes)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                action.document_id,
                action.user_id,
                action.actor,
                action.action,
                action.from_status,
                action.to_status,
                action.notes,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// History of one document, oldest first
    pub fn history(&self, document_id: i64) -> Result<Vec<DocumentAction>> {
        let conn = lock(&self.conn)?;
        let mut stmt = conn.prepare(
            "SELECT id, document_id, user_id, actor, action, from_status, to_status, notes, timestamp
             FROM document_actions WHERE document_id = ? ORDER BY id",
        )?;

        let rows = stmt
            .query_map([document_id], Self::row_to_action)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(rows)
    }

    fn row_to_action(row: &Row) -> rusqlite::Result<DocumentAction> {
        Ok(DocumentAction {
            id: row.get(0)?,
            document_id: row.get(1)?,
            user_id: row.get(2)?,
            actor: row.get(3)?,
            action: row.get(4)?,
            from_status: row.get(5)?,
            to_status: row.get(6)?,
            notes: row.get(7)?,
            timestamp: row.get(8)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::Document;

    #[test]
    fn test_system_log_newest_first() {
        let db = Database::open_in_memory().unwrap();
        let logs = db.logs();

        logs.log("admin", "user.create", Some("jdoe")).unwrap();
        logs.log("jdoe", "document.compose", None).unwrap();
        logs.log("admin", "maintenance.vacuum", None).unwrap();

        let all = logs.recent_system_logs(10, None).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].action, "maintenance.vacuum");

        let admin_only = logs.recent_system_logs(10, Some("ADMIN")).unwrap();
        assert_eq!(admin_only.len(), 2);

        assert_eq!(logs.recent_system_logs(1, None).unwrap().len(), 1);
    }

    #[test]
    fn test_purge_system_logs() {
        let db = Database::open_in_memory().unwrap();
        db.logs().log("admin", "old", None).unwrap();
        db.with_connection(|conn| {
            conn.execute("UPDATE system_logs SET timestamp = '2020-01-01 00:00:00'", [])?;
            Ok(())
        })
        .unwrap();
        db.logs().log("admin", "new", None).unwrap();

        let removed = db.logs().purge_system_logs_before("2024-01-01 00:00:00").unwrap();
        assert_eq!(removed, 1);
        assert_eq!(db.logs().recent_system_logs(10, None).unwrap()[0].action, "new");
    }

    #[test]
    fn test_login_activity() {
        let db = Database::open_in_memory().unwrap();
        let client = ClientInfo {
            ip_address: Some("10.0.0.5".into()),
            user_agent: Some("curl/8".into()),
        };

        db.logs().record_login(None, "ghost", LoginEvent::Failed, &client).unwrap();
        db.logs().record_login(Some(1), "admin", LoginEvent::Login, &client).unwrap();

        let all = db.logs().recent_logins(10, None).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].event, LoginEvent::Login);
        assert_eq!(all[1].ip_address.as_deref(), Some("10.0.0.5"));

        assert_eq!(db.logs().recent_logins(10, Some(1)).unwrap().len(), 1);
    }

    #[test]
    fn test_history_cascades_with_document() {
        let db = Database::open_in_memory().unwrap();
        let mut doc = Document::new("DOC-2025-001".into(), "Memo".into(), "A".into(), "B".into());
        let doc_id = db.documents().create(&mut doc).unwrap();

        db.transaction(|conn| {
            LogRepository::record_action_tx(
                conn,
                &DocumentAction {
                    id: None,
                    document_id: doc_id,
                    user_id: None,
                    actor: "registry".into(),
                    action: "submit".into(),
                    from_status: Some("Incoming".into()),
                    to_status: Some("Pending".into()),
                    notes: None,
                    timestamp: String::new(),
                },
            )
        })
        .unwrap();

        let history = db.logs().history(doc_id).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].to_status.as_deref(), Some("Pending"));
        assert!(!history[0].timestamp.is_empty());

        db.with_connection(|conn| {
            conn.execute("DELETE FROM documents WHERE id = ?", [doc_id])?;
            Ok(())
        })
        .unwrap();
        assert!(db.logs().history(doc_id).unwrap().is_empty());
    }
}
