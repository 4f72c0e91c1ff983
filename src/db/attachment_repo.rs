use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{lock, SharedConnection};
use crate::models::{DocumentAttachment, DocumentComment};

const ATTACHMENT_COLUMNS: &str = "id, document_id, original_filename, stored_filename, file_size,
     content_type, uploaded_by, uploaded_at";

/// Attachments and comments hang off a document and go away with it
pub struct AttachmentRepository {
    conn: SharedConnection,
}

impl AttachmentRepository {
    pub fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }

    // === Attachments ===

    pub fn create(&self, attachment: &mut DocumentAttachment) -> Result<i64> {
        let conn = lock(&self.conn)?;
        conn.execute(
            "INSERT INTO document_attachments
             (document_id, original_filename, stored_filename, file_size, content_type, uploaded_by)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                attachment.document_id,
                attachment.original_filename,
                attachment.stored_filename,
                attachment.file_size,
                attachment.content_type,
                attachment.uploaded_by,
            ],
        )?;

        let id = conn.last_insert_rowid();
        attachment.id = Some(id);

        Ok(id)
    }

    pub fn find_by_id(&self, id: i64) -> Result<Option<DocumentAttachment>> {
        let conn = lock(&self.conn)?;
        let attachment = conn
            .query_row(
                &format!("SELECT {} FROM document_attachments WHERE id = ?", ATTACHMENT_COLUMNS),
                [id],
                Self::row_to_attachment,
            )
            .optional()?;

        Ok(attachment)
    }

    pub fn find_by_document(&self, document_id: i64) -> Result<Vec<DocumentAttachment>> {
        let conn = lock(&self.conn)?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM document_attachments WHERE document_id = ? ORDER BY id",
            ATTACHMENT_COLUMNS
        ))?;

        let attachments = stmt
            .query_map([document_id], Self::row_to_attachment)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(attachments)
    }

    /// Stored filenames for a document, used before deleting files on disk
    pub fn stored_filenames(&self, document_id: i64) -> Result<Vec<String>> {
        let conn = lock(&self.conn)?;
        let mut stmt = conn.prepare(
            "SELECT stored_filename FROM document_attachments WHERE document_id = ?",
        )?;

        let names = stmt
            .query_map([document_id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;

        Ok(names)
    }

    pub fn delete(&self, id: i64) -> Result<bool> {
        let conn = lock(&self.conn)?;
        let rows = conn.execute("DELETE FROM document_attachments WHERE id = ?", [id])?;
        Ok(rows > 0)
    }

    fn row_to_attachment(row: &Row) -> rusqlite::Result<DocumentAttachment> {
        Ok(DocumentAttachment {
            id: row.get(0)?,
            document_id: row.get(1)?,
            original_filename: row.get(2)?,
            stored_filename: row.get(3)?,
            file_size: row.get(4)?,
            content_type: row.get(5)?,
            uploaded_by: row.get(6)?,
            uploaded_at: row.get(7)?,
        })
    }

    // === Comments ===

    pub fn add_comment_tx(conn: &Connection, comment: &mut DocumentComment) -> Result<i64> {
        conn.execute(
            "INSERT INTO document_comments (document_id, user_id, author, body)
             VALUES (?1, ?2, ?3, ?4)",
            params![comment.document_id, comment.user_id, comment.author, comment.body],
        )?;

        let id = conn.last_insert_rowid();
        comment.id = Some(id);

        Ok(id)
    }

    pub fn find_comment(&self, id: i64) -> Result<Option<DocumentComment>> {
        let conn = lock(&self.conn)?;
        let comment = conn
            .query_row(
                "SELECT id, document_id, user_id, author, body, created_at
                 FROM document_comments WHERE id = ?",
                [id],
                Self::row_to_comment,
            )
            .optional()?;

        Ok(comment)
    }

    /// Comments on a document, oldest first
    pub fn comments(&self, document_id: i64) -> Result<Vec<DocumentComment>> {
        let conn = lock(&self.conn)?;
        let mut stmt = conn.prepare(
            "SELECT id, document_id, user_id, author, body, created_at
             FROM document_comments WHERE document_id = ? ORDER BY id",
        )?;

        let comments = stmt
            .query_map([document_id], Self::row_to_comment)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(comments)
    }

    pub fn delete_comment_tx(conn: &Connection, id: i64) -> Result<bool> {
        let rows = conn.execute("DELETE FROM document_comments WHERE id = ?", [id])?;
        Ok(rows > 0)
    }

    fn row_to_comment(row: &Row) -> rusqlite::Result<DocumentComment> {
        Ok(DocumentComment {
            id: row.get(0)?,
            document_id: row.get(1)?,
            user_id: row.get(2)?,
            author: row.get(3)?,
            body: row.get(4)?,
            created_at: row.get(5)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::Document;

    fn setup() -> (Database, i64) {
        let db = Database::open_in_memory().unwrap();
        let mut doc = Document::new("DOC-2025-001".into(), "Memo".into(), "HR".into(), "Registry".into());
        let id = db.documents().create(&mut doc).unwrap();
        (db, id)
    }

    fn attachment(document_id: i64, stored: &str) -> DocumentAttachment {
        DocumentAttachment {
            id: None,
            document_id,
            original_filename: "scan.pdf".into(),
            stored_filename: stored.into(),
            file_size: 2048,
            content_type: Some("application/pdf".into()),
            uploaded_by: None,
            uploaded_at: None,
        }
    }

    #[test]
    fn test_attachment_crud() {
        let (db, doc_id) = setup();
        let repo = db.attachments();

        let mut first = attachment(doc_id, "a1_scan.pdf");
        let id = repo.create(&mut first).unwrap();
        repo.create(&mut attachment(doc_id, "a2_scan.pdf")).unwrap();

        let found = repo.find_by_id(id).unwrap().unwrap();
        assert_eq!(found.stored_filename, "a1_scan.pdf");
        assert_eq!(found.file_size_display(), "2.0 KB");
        assert!(found.uploaded_at.is_some());

        assert_eq!(repo.find_by_document(doc_id).unwrap().len(), 2);
        assert_eq!(repo.stored_filenames(doc_id).unwrap().len(), 2);

        assert!(repo.delete(id).unwrap());
        assert!(!repo.delete(id).unwrap());
        assert_eq!(repo.find_by_document(doc_id).unwrap().len(), 1);
    }

    #[test]
    fn test_stored_filename_unique() {
        let (db, doc_id) = setup();
        let repo = db.attachments();

        repo.create(&mut attachment(doc_id, "same.pdf")).unwrap();
        assert!(repo.create(&mut attachment(doc_id, "same.pdf")).is_err());
    }

    #[test]
    fn test_comments() {
        let (db, doc_id) = setup();
        let repo = db.attachments();

        let mut comment = DocumentComment {
            id: None,
            document_id: doc_id,
            user_id: None,
            author: "registry".into(),
            body: "Received in good order".into(),
            created_at: None,
        };
        let id = db
            .transaction(|conn| AttachmentRepository::add_comment_tx(conn, &mut comment))
            .unwrap();
        assert_eq!(comment.id, Some(id));

        let comments = repo.comments(doc_id).unwrap();
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].body, "Received in good order");
        assert!(repo.find_comment(id).unwrap().is_some());

        assert!(db.transaction(|conn| AttachmentRepository::delete_comment_tx(conn, id)).unwrap());
        assert!(repo.comments(doc_id).unwrap().is_empty());
    }

    #[test]
    fn test_children_removed_with_document() {
        let (db, doc_id) = setup();
        db.attachments().create(&mut attachment(doc_id, "x.pdf")).unwrap();

        db.with_connection(|conn| {
            conn.execute("DELETE FROM documents WHERE id = ?", [doc_id])?;
            Ok(())
        })
        .unwrap();

        assert!(db.attachments().find_by_document(doc_id).unwrap().is_empty());
    }
}
