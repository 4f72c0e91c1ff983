use anyhow::{anyhow, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{lock, SharedConnection};
use crate::models::{Document, DocumentFilter, DocumentStatus, Priority};
use crate::utils::date::{format_date, parse_date};

const DOCUMENT_COLUMNS: &str = "id, tracking_code, title, sender, recipient, details, required_action,
     date_of_letter, date_received, priority, status, forwarded_to, current_holder,
     processed_by, version, created_at, updated_at";

/// Hard cap for a single page of search results
const MAX_PAGE_SIZE: u32 = 500;

/// Count filter: every document when ?1 is NULL, otherwise the ones user ?1
/// processed or user ?2 holds
const VISIBLE_TO: &str = "(?1 IS NULL OR processed_by = ?1 OR current_holder = ?2 COLLATE NOCASE)";

pub struct DocumentRepository {
    conn: SharedConnection,
}

impl DocumentRepository {
    pub fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }

    pub fn find_by_id(&self, id: i64) -> Result<Option<Document>> {
        let conn = lock(&self.conn)?;
        let doc = conn
            .query_row(
                &format!("SELECT {} FROM documents WHERE id = ?", DOCUMENT_COLUMNS),
                [id],
                Self::row_to_document,
            )
            .optional()?;

        Ok(doc)
    }

    pub fn find_by_code(&self, code: &str) -> Result<Option<Document>> {
        let conn = lock(&self.conn)?;
        let doc = conn
            .query_row(
                &format!("SELECT {} FROM documents WHERE tracking_code = ?", DOCUMENT_COLUMNS),
                [code.trim()],
                Self::row_to_document,
            )
            .optional()?;

        Ok(doc)
    }

    pub fn find_all(&self) -> Result<Vec<Document>> {
        let conn = lock(&self.conn)?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM documents ORDER BY id",
            DOCUMENT_COLUMNS
        ))?;

        let docs = stmt
            .query_map([], Self::row_to_document)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(docs)
    }

    pub fn code_exists(&self, code: &str) -> Result<bool> {
        let conn = lock(&self.conn)?;
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM documents WHERE tracking_code = ?)",
            [code],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Tracking codes that start with `prefix`
    pub fn codes_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let conn = lock(&self.conn)?;
        let mut stmt = conn.prepare(
            "SELECT tracking_code FROM documents WHERE substr(tracking_code, 1, ?1) = ?2",
        )?;

        let codes = stmt
            .query_map(params![prefix.chars().count() as i64, prefix], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;

        Ok(codes)
    }

    pub fn create(&self, doc: &mut Document) -> Result<i64> {
        let conn = lock(&self.conn)?;
        Self::create_tx(&conn, doc)
    }

    pub fn create_tx(conn: &Connection, doc: &mut Document) -> Result<i64> {
        conn.execute(
            "INSERT INTO documents (tracking_code, title, sender, recipient, details, required_action,
                                    date_of_letter, date_received, priority, status, forwarded_to,
                                    current_holder, processed_by, version)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, 1)",
            params![
                doc.tracking_code,
                doc.title,
                doc.sender,
                doc.recipient,
                doc.details,
                doc.required_action,
                doc.date_of_letter.map(format_date),
                doc.date_received.map(format_date),
                doc.priority.to_string(),
                doc.status.to_string(),
                doc.forwarded_to,
                doc.current_holder,
                doc.processed_by,
            ],
        )?;

        let id = conn.last_insert_rowid();
        doc.id = Some(id);
        doc.version = 1;

        Ok(id)
    }

    /// Write the editable detail fields. `doc.version` is the version the
    /// caller read; returns false when someone else saved in between.
    pub fn update_details_tx(conn: &Connection, doc: &Document) -> Result<bool> {
        let id = doc.id.ok_or_else(|| anyhow!("Document has no ID"))?;
        let rows = conn.execute(
            "UPDATE documents SET
                title = ?1, sender = ?2, recipient = ?3, details = ?4, required_action = ?5,
                date_of_letter = ?6, priority = ?7,
                version = version + 1, updated_at = datetime('now')
             WHERE id = ?8 AND version = ?9",
            params![
                doc.title,
                doc.sender,
                doc.recipient,
                doc.details,
                doc.required_action,
                doc.date_of_letter.map(format_date),
                doc.priority.to_string(),
                id,
                doc.version,
            ],
        )?;

        Ok(rows == 1)
    }

    /// Write workflow state (status, forwarding, holder, received date).
    /// Same version rule as `update_details_tx`.
    pub fn update_status_tx(conn: &Connection, doc: &Document) -> Result<bool> {
        let id = doc.id.ok_or_else(|| anyhow!("Document has no ID"))?;
        let rows = conn.execute(
            "UPDATE documents SET
                status = ?1, forwarded_to = ?2, current_holder = ?3, date_received = ?4,
                version = version + 1, updated_at = datetime('now')
             WHERE id = ?5 AND version = ?6",
            params![
                doc.status.to_string(),
                doc.forwarded_to,
                doc.current_holder,
                doc.date_received.map(format_date),
                id,
                doc.version,
            ],
        )?;

        Ok(rows == 1)
    }

    /// Filtered search, newest first
    pub fn search(&self, filter: &DocumentFilter) -> Result<Vec<Document>> {
        let conn = lock(&self.conn)?;

        let mut sql = format!("SELECT {} FROM documents WHERE 1=1", DOCUMENT_COLUMNS);
        let mut param_index = 1;
        let mut params_vec: Vec<String> = Vec::new();

        if !filter.query.trim().is_empty() {
            sql.push_str(&format!(
                " AND (tracking_code LIKE ?{0} OR title LIKE ?{0} OR sender LIKE ?{0} OR recipient LIKE ?{0})",
                param_index
            ));
            params_vec.push(format!("%{}%", filter.query.trim()));
            param_index += 1;
        }

        if let Some(status) = filter.status {
            sql.push_str(&format!(" AND status = ?{}", param_index));
            params_vec.push(status.to_string());
            param_index += 1;
        }

        if let Some(priority) = filter.priority {
            sql.push_str(&format!(" AND priority = ?{}", param_index));
            params_vec.push(priority.to_string());
            param_index += 1;
        }

        if let Some(holder) = filter.holder.as_deref().filter(|h| !h.trim().is_empty()) {
            sql.push_str(&format!(" AND current_holder = ?{} COLLATE NOCASE", param_index));
            params_vec.push(holder.trim().to_string());
            param_index += 1;
        }

        if let Some((user_id, username)) = &filter.visible_to {
            sql.push_str(&format!(
                " AND (processed_by = ?{0} OR current_holder = ?{1} COLLATE NOCASE)",
                param_index,
                param_index + 1
            ));
            params_vec.push(user_id.to_string());
            params_vec.push(username.clone());
            param_index += 2;
        }

        if let Some(date) = filter.received_after {
            sql.push_str(&format!(" AND date_received >= ?{}", param_index));
            params_vec.push(format_date(date));
            param_index += 1;
        }

        if let Some(date) = filter.received_before {
            sql.push_str(&format!(" AND date_received <= ?{}", param_index));
            params_vec.push(format_date(date));
        }

        let limit = filter.limit.unwrap_or(100).min(MAX_PAGE_SIZE);
        let offset = filter.offset.unwrap_or(0);
        sql.push_str(&format!(" ORDER BY created_at DESC, id DESC LIMIT {} OFFSET {}", limit, offset));

        let mut stmt = conn.prepare(&sql)?;

        let params_refs: Vec<&dyn rusqlite::ToSql> = params_vec
            .iter()
            .map(|s| s as &dyn rusqlite::ToSql)
            .collect();

        let docs = stmt
            .query_map(rusqlite::params_from_iter(params_refs), Self::row_to_document)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(docs)
    }

    /// Number of documents, or of the ones visible to (user id, username)
    pub fn count(&self, visible_to: Option<(i64, &str)>) -> Result<i64> {
        let conn = lock(&self.conn)?;
        let (user_id, username) = scope(visible_to);
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM documents WHERE {}", VISIBLE_TO),
            params![user_id, username],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Document count per status (every status present, zero when empty)
    pub fn count_by_status(&self, visible_to: Option<(i64, &str)>) -> Result<Vec<(DocumentStatus, i64)>> {
        let counts = self.grouped_counts("status", visible_to)?;
        Ok(DocumentStatus::all()
            .iter()
            .map(|s| {
                let n = counts
                    .iter()
                    .find(|(k, _)| k == &s.to_string())
                    .map(|(_, n)| *n)
                    .unwrap_or(0);
                (*s, n)
            })
            .collect())
    }

    pub fn count_by_priority(&self, visible_to: Option<(i64, &str)>) -> Result<Vec<(Priority, i64)>> {
        let counts = self.grouped_counts("priority", visible_to)?;
        Ok(Priority::all()
            .iter()
            .map(|p| {
                let n = counts
                    .iter()
                    .find(|(k, _)| k == &p.to_string())
                    .map(|(_, n)| *n)
                    .unwrap_or(0);
                (*p, n)
            })
            .collect())
    }

    pub fn find_recent(&self, limit: usize) -> Result<Vec<Document>> {
        let conn = lock(&self.conn)?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM documents ORDER BY created_at DESC, id DESC LIMIT ?",
            DOCUMENT_COLUMNS
        ))?;

        let docs = stmt
            .query_map([limit as i64], Self::row_to_document)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(docs)
    }

    fn grouped_counts(
        &self,
        column: &'static str,
        visible_to: Option<(i64, &str)>,
    ) -> Result<Vec<(String, i64)>> {
        let conn = lock(&self.conn)?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {0}, COUNT(*) FROM documents WHERE {1} GROUP BY {0}",
            column, VISIBLE_TO
        ))?;

        let (user_id, username) = scope(visible_to);
        let counts = stmt
            .query_map(params![user_id, username], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<(String, i64)>>>()?;

        Ok(counts)
    }

    fn row_to_document(row: &Row) -> rusqlite::Result<Document> {
        let date_of_letter: Option<String> = row.get(7)?;
        let date_received: Option<String> = row.get(8)?;
        let priority: String = row.get(9)?;
        let status: String = row.get(10)?;

        Ok(Document {
            id: row.get(0)?,
            tracking_code: row.get(1)?,
            title: row.get(2)?,
            sender: row.get(3)?,
            recipient: row.get(4)?,
            details: row.get(5)?,
            required_action: row.get(6)?,
            date_of_letter: date_of_letter.as_deref().and_then(parse_date),
            date_received: date_received.as_deref().and_then(parse_date),
            priority: Priority::parse(&priority).unwrap_or_default(),
            status: DocumentStatus::parse(&status).unwrap_or_default(),
            forwarded_to: row.get(11)?,
            current_holder: row.get(12)?,
            processed_by: row.get(13)?,
            version: row.get(14)?,
            created_at: row.get(15)?,
            updated_at: row.get(16)?,
        })
    }
}

fn scope(visible_to: Option<(i64, &str)>) -> (Option<i64>, Option<&str>) {
    match visible_to {
        Some((id, username)) => (Some(id), Some(username.trim())),
        None => (None, None),
    }
}
