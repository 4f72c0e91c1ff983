//! Attachment uploads

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::{info, warn};

use crate::db::Database;
use crate::models::{AppConfig, DocumentAttachment, User};
use crate::utils::file_ops::{self, get_file_extension, unique_filename};
use crate::utils::path::sanitize_filename;
use crate::utils::{AppError, AppResult};

/// Whether the file name carries one of the allowed extensions
pub fn allowed_file(filename: &str, allowed: &[String]) -> bool {
    if !filename.contains('.') {
        return false;
    }
    get_file_extension(Path::new(filename))
        .is_some_and(|ext| allowed.iter().any(|a| a.eq_ignore_ascii_case(&ext)))
}

/// Human readable size, e.g. `1.5 MB`
pub fn format_file_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    match bytes {
        b if b >= GB => format!("{:.1} GB", b as f64 / GB as f64),
        b if b >= MB => format!("{:.1} MB", b as f64 / MB as f64),
        b if b >= KB => format!("{:.1} KB", b as f64 / KB as f64),
        b => format!("{} B", b),
    }
}

/// File name safe to store on disk. Never empty.
pub fn secure_filename(name: &str) -> String {
    let cleaned = sanitize_filename(name);
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '_' || c == '.') {
        "upload".to_string()
    } else {
        cleaned
    }
}

/// Write `content` under `dir` without overwriting anything.
/// Returns the name the file was stored as.
pub fn save_upload(dir: &Path, filename: &str, content: &[u8]) -> AppResult<String> {
    file_ops::ensure_directory(dir)?;
    let safe = secure_filename(filename);

    for _ in 0..10 {
        let name = unique_filename(dir, &safe);
        let path = dir.join(&name);

        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                file.write_all(content)
                    .with_context(|| format!("Could not write upload: {:?}", path))?;
                return Ok(name);
            }
            // Another upload took the name between the check and the open
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e.into()),
        }
    }

    Err(AppError::conflict(format!("Could not find a free file name for {}", safe)))
}

pub struct AttachmentService<'a> {
    db: &'a Database,
    config: &'a AppConfig,
}

impl<'a> AttachmentService<'a> {
    pub fn new(db: &'a Database, config: &'a AppConfig) -> Self {
        Self { db, config }
    }

    fn upload_dir(&self) -> &Path {
        &self.config.storage.upload_dir
    }

    /// Store an uploaded file and attach it to a document
    pub fn add(
        &self,
        document_id: i64,
        filename: &str,
        content_type: Option<&str>,
        content: &[u8],
        uploader: &User,
    ) -> AppResult<DocumentAttachment> {
        if filename.trim().is_empty() {
            return Err(AppError::validation("No file selected"));
        }
        if !allowed_file(filename, &self.config.uploads.allowed_extensions) {
            return Err(AppError::validation(format!("File type not allowed: {}", filename)));
        }
        if content.len() > self.config.uploads.max_bytes {
            return Err(AppError::validation(format!(
                "File is larger than {}",
                format_file_size(self.config.uploads.max_bytes as u64)
            )));
        }

        let document = self
            .db
            .documents()
            .find_by_id(document_id)?
            .ok_or_else(|| AppError::not_found("Document"))?;

        let stored_filename = save_upload(self.upload_dir(), filename, content)?;

        let content_type = content_type
            .filter(|c| !c.trim().is_empty())
            .map(str::to_string)
            .or_else(|| mime_guess::from_path(filename).first().map(|m| m.to_string()));

        let mut attachment = DocumentAttachment {
            id: None,
            document_id,
            original_filename: filename.to_string(),
            stored_filename,
            file_size: content.len() as i64,
            content_type,
            uploaded_by: uploader.id,
            uploaded_at: None,
        };

        if let Err(e) = self.db.attachments().create(&mut attachment) {
            // Don't leave an orphan file behind
            file_ops::delete_file(&self.upload_dir().join(&attachment.stored_filename))?;
            return Err(e.into());
        }

        self.db.logs().log(
            &uploader.username,
            "attachment.upload",
            Some(&format!(
                "{} on {} ({})",
                attachment.original_filename,
                document.tracking_code,
                attachment.file_size_display()
            )),
        )?;
        info!("{} attached {} to {}", uploader.username, attachment.original_filename, document.tracking_code);

        self.find(attachment.id.unwrap_or_default())
    }

    pub fn list(&self, document_id: i64) -> AppResult<Vec<DocumentAttachment>> {
        Ok(self.db.attachments().find_by_document(document_id)?)
    }

    pub fn find(&self, id: i64) -> AppResult<DocumentAttachment> {
        self.db
            .attachments()
            .find_by_id(id)?
            .ok_or_else(|| AppError::not_found("Attachment"))
    }

    /// Attachment row plus the path of its file on disk
    pub fn open(&self, id: i64) -> AppResult<(DocumentAttachment, PathBuf)> {
        let attachment = self.find(id)?;
        let path = self.upload_dir().join(&attachment.stored_filename);

        if !path.is_file() {
            warn!("Attachment {} missing on disk: {:?}", id, path);
            return Err(AppError::not_found("Attachment file"));
        }

        Ok((attachment, path))
    }

    pub fn read(&self, id: i64) -> AppResult<(DocumentAttachment, Vec<u8>)> {
        let (attachment, path) = self.open(id)?;
        let content = fs::read(&path)?;
        Ok((attachment, content))
    }

    pub fn delete(&self, id: i64, actor: &User) -> AppResult<()> {
        let attachment = self.find(id)?;

        self.db.attachments().delete(id)?;
        file_ops::delete_file(&self.upload_dir().join(&attachment.stored_filename))?;

        self.db.logs().log(
            &actor.username,
            "attachment.delete",
            Some(&attachment.original_filename),
        )?;

        Ok(())
    }
}
