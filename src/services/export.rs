//! Document export and import
//!
//! Exports go to JSON or CSV. The JSON form doubles as the flat
//! `document_tracking.json` store; importing one merges by tracking code and
//! reports conflicts instead of overwriting anything.

use std::collections::HashMap;

use anyhow::Context;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::permissions::{require, Permission};
use crate::db::{Database, DocumentRepository, LogRepository};
use crate::models::{AppConfig, Document, DocumentAction, DocumentStatus, Priority, User};
use crate::utils::date::{format_date, parse_date, TIMESTAMP_FORMAT};
use crate::utils::file_ops::write_atomic;
use crate::utils::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
}

impl ExportFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "json" => Some(Self::Json),
            "csv" => Some(Self::Csv),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Json => "application/json",
            ExportFormat::Csv => "text/csv; charset=utf-8",
        }
    }
}

/// One document as it appears in the JSON store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    #[serde(alias = "code")]
    pub tracking_code: String,
    pub title: String,
    pub sender: String,
    pub recipient: String,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub required_action: Option<String>,
    #[serde(default)]
    pub date_of_letter: Option<String>,
    #[serde(default)]
    pub date_received: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    /// Status label, e.g. `Approved - Forwarded to Finance`
    pub status: String,
    #[serde(default)]
    pub current_holder: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl From<&Document> for DocumentRecord {
    fn from(d: &Document) -> Self {
        Self {
            tracking_code: d.tracking_code.clone(),
            title: d.title.clone(),
            sender: d.sender.clone(),
            recipient: d.recipient.clone(),
            details: d.details.clone(),
            required_action: d.required_action.clone(),
            date_of_letter: d.date_of_letter.map(format_date),
            date_received: d.date_received.map(format_date),
            priority: Some(d.priority.to_string()),
            status: d.status_label(),
            current_holder: d.current_holder.clone(),
            created_at: d.created_at.clone(),
            updated_at: d.updated_at.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentStore {
    #[serde(default)]
    pub exported_at: Option<String>,
    #[serde(default)]
    pub documents: Vec<DocumentRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportResult {
    pub path: String,
    pub document_count: usize,
    pub file_size: usize,
}

/// A stored document that differs from the imported one
#[derive(Debug, Clone, Serialize)]
pub struct ImportConflict {
    pub tracking_code: String,
    pub fields: Vec<String>,
}

#[derive(Debug, Default, Serialize)]
pub struct ImportResult {
    pub added: usize,
    pub unchanged: usize,
    pub conflicts: Vec<ImportConflict>,
    /// Records that could not be read (missing fields, unknown status)
    pub skipped: usize,
    pub warnings: Vec<String>,
}

impl ImportResult {
    pub fn summary(&self) -> String {
        format!(
            "{} added, {} unchanged, {} conflicts, {} skipped",
            self.added,
            self.unchanged,
            self.conflicts.len(),
            self.skipped
        )
    }
}

pub struct ExportService<'a> {
    db: &'a Database,
    config: &'a AppConfig,
}

impl<'a> ExportService<'a> {
    pub fn new(db: &'a Database, config: &'a AppConfig) -> Self {
        Self { db, config }
    }

    pub fn generate_filename(format: ExportFormat) -> String {
        let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
        format!("doctrack_documents_{}.{}", timestamp, format.extension())
    }

    /// All documents in the requested format
    pub fn export_documents(&self, format: ExportFormat, actor: &User) -> AppResult<String> {
        require(actor, Permission::ViewAllDocuments)?;

        let records = self.records()?;
        let content = match format {
            ExportFormat::Json => self.to_json(records)?,
            ExportFormat::Csv => documents_to_csv(&records),
        };

        self.db.logs().log(
            &actor.username,
            "export.documents",
            Some(&format!("{} documents as {}", self.db.documents().count(None)?, format.extension())),
        )?;

        Ok(content)
    }

    /// Replace the JSON store file with the current contents of the database
    pub fn write_json_store(&self, actor: &User) -> AppResult<ExportResult> {
        require(actor, Permission::ManageSystem)?;

        let records = self.records()?;
        let document_count = records.len();
        let content = self.to_json(records)?;

        let path = &self.config.storage.export_path;
        write_atomic(path, content.as_bytes())?;

        self.db.logs().log(
            &actor.username,
            "export.store",
            Some(&format!("{} documents to {}", document_count, path.display())),
        )?;
        info!("Wrote {} documents to {:?}", document_count, path);

        Ok(ExportResult {
            path: path.display().to_string(),
            document_count,
            file_size: content.len(),
        })
    }

    /// Read the JSON store file and merge it into the database
    pub fn import_json_store(&self, actor: &User) -> AppResult<ImportResult> {
        require(actor, Permission::ManageSystem)?;

        let path = &self.config.storage.export_path;
        if !path.is_file() {
            return Err(AppError::not_found(format!("Document store {}", path.display())));
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Could not read {:?}", path))?;
        self.import_json(&content, actor)
    }

    /// Merge a JSON store into the database, keyed by tracking code.
    /// Accepts either `{ "documents": [...] }` or a bare array.
    pub fn import_json(&self, content: &str, actor: &User) -> AppResult<ImportResult> {
        require(actor, Permission::ManageSystem)?;

        let records = parse_store(content)?;
        let mut result = ImportResult::default();

        let existing: HashMap<String, Document> = self
            .db
            .documents()
            .find_all()?
            .into_iter()
            .map(|d| (d.tracking_code.clone(), d))
            .collect();

        self.db.transaction(|conn| -> AppResult<()> {
            for record in records {
                let code = record.tracking_code.trim().to_string();
                if code.is_empty() {
                    result.skipped += 1;
                    result.warnings.push("Record without tracking code".to_string());
                    continue;
                }

                if let Some(current) = existing.get(&code) {
                    let fields = differing_fields(&DocumentRecord::from(current), &record);
                    if fields.is_empty() {
                        result.unchanged += 1;
                    } else {
                        result.conflicts.push(ImportConflict {
                            tracking_code: code,
                            fields,
                        });
                    }
                    continue;
                }

                let mut doc = match record_to_document(&record, &mut result.warnings) {
                    Ok(doc) => doc,
                    Err(e) => {
                        result.skipped += 1;
                        result.warnings.push(format!("{}: {}", code, e));
                        continue;
                    }
                };

                match DocumentRepository::create_tx(conn, &mut doc) {
                    Ok(id) => {
                        LogRepository::record_action_tx(
                            conn,
                            &DocumentAction {
                                id: None,
                                document_id: id,
                                user_id: actor.id,
                                actor: actor.username.clone(),
                                action: "import".to_string(),
                                from_status: None,
                                to_status: Some(doc.status_label()),
                                notes: None,
                                timestamp: String::new(),
                            },
                        )?;
                        result.added += 1;
                    }
                    Err(e) => {
                        // Duplicate codes inside the same file end up here
                        let err = AppError::from(e);
                        if !err.is_constraint_violation() {
                            return Err(err);
                        }
                        result.skipped += 1;
                        result.warnings.push(format!("{}: duplicate tracking code", code));
                    }
                }
            }

            LogRepository::log_tx(conn, &actor.username, "import.documents", Some(&result.summary()))?;
            Ok(())
        })?;

        for conflict in &result.conflicts {
            warn!(
                "Import conflict on {}: {}",
                conflict.tracking_code,
                conflict.fields.join(", ")
            );
        }
        info!("Import finished: {}", result.summary());

        Ok(result)
    }

    fn records(&self) -> AppResult<Vec<DocumentRecord>> {
        Ok(self
            .db
            .documents()
            .find_all()?
            .iter()
            .map(DocumentRecord::from)
            .collect())
    }

    fn to_json(&self, documents: Vec<DocumentRecord>) -> AppResult<String> {
        let store = DocumentStore {
            exported_at: Some(Utc::now().format(TIMESTAMP_FORMAT).to_string()),
            documents,
        };
        Ok(serde_json::to_string_pretty(&store).context("JSON serialization failed")?)
    }
}

fn parse_store(content: &str) -> AppResult<Vec<DocumentRecord>> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StoreShape {
        Wrapped(DocumentStore),
        Bare(Vec<DocumentRecord>),
    }

    let shape: StoreShape = serde_json::from_str(content)
        .map_err(|e| AppError::validation(format!("Invalid document store: {}", e)))?;

    Ok(match shape {
        StoreShape::Wrapped(store) => store.documents,
        StoreShape::Bare(records) => records,
    })
}

/// Build a new document from an imported record. Free-text statuses such as
/// `Approved - Forwarded to X` are understood.
/// Build a new document from an imported record. Dates that can't be read
/// are left empty and reported in `warnings`.
fn record_to_document(record: &DocumentRecord, warnings: &mut Vec<String>) -> Result<Document, String> {
    let required = |value: &str, name: &str| {
        let value = value.trim();
        if value.is_empty() {
            Err(format!("{} is missing", name))
        } else {
            Ok(value.to_string())
        }
    };

    let (status, forwarded_to) = DocumentStatus::parse_legacy(&record.status)
        .ok_or_else(|| format!("unknown status \"{}\"", record.status))?;

    let priority = match record.priority.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
        None => Priority::Normal,
        Some(p) => Priority::parse(p).ok_or_else(|| format!("unknown priority \"{}\"", p))?,
    };

    let mut doc = Document::new(
        record.tracking_code.trim().to_string(),
        required(&record.title, "title")?,
        required(&record.sender, "sender")?,
        required(&record.recipient, "recipient")?,
    );
    doc.details = record.details.clone();
    doc.required_action = record.required_action.clone();
    let mut date = |value: &Option<String>, name: &str| {
        let value = value.as_deref().map(str::trim).filter(|v| !v.is_empty())?;
        let parsed = parse_date(value);
        if parsed.is_none() {
            warnings.push(format!(
                "{}: unreadable {} \"{}\" left empty",
                record.tracking_code.trim(),
                name,
                value
            ));
        }
        parsed
    };
    doc.date_of_letter = date(&record.date_of_letter, "date_of_letter");
    doc.date_received = date(&record.date_received, "date_received");
    doc.priority = priority;
    doc.status = status;
    doc.forwarded_to = forwarded_to;
    doc.current_holder = record.current_holder.clone();

    Ok(doc)
}

/// Names of the content fields that differ. Timestamps are not compared.
fn differing_fields(stored: &DocumentRecord, incoming: &DocumentRecord) -> Vec<String> {
    fn norm(value: &Option<String>) -> &str {
        value.as_deref().map(str::trim).unwrap_or("")
    }

    let incoming_priority = incoming
        .priority
        .as_deref()
        .and_then(Priority::parse)
        .unwrap_or_default()
        .to_string();
    let incoming_status = DocumentStatus::parse_legacy(&incoming.status)
        .map(|(status, target)| match target {
            Some(t) => format!("{} - Forwarded to {}", status, t),
            None => status.to_string(),
        })
        .unwrap_or_else(|| incoming.status.clone());
    let incoming_date = |value: &Option<String>| {
        value
            .as_deref()
            .and_then(parse_date)
            .map(format_date)
            .unwrap_or_default()
    };

    let checks = [
        ("title", stored.title.trim() != incoming.title.trim()),
        ("sender", stored.sender.trim() != incoming.sender.trim()),
        ("recipient", stored.recipient.trim() != incoming.recipient.trim()),
        ("details", norm(&stored.details) != norm(&incoming.details)),
        ("required_action", norm(&stored.required_action) != norm(&incoming.required_action)),
        ("date_of_letter", norm(&stored.date_of_letter) != incoming_date(&incoming.date_of_letter)),
        ("date_received", norm(&stored.date_received) != incoming_date(&incoming.date_received)),
        ("priority", norm(&stored.priority) != incoming_priority),
        ("status", stored.status != incoming_status),
        ("current_holder", norm(&stored.current_holder) != norm(&incoming.current_holder)),
    ];

    checks
        .iter()
        .filter(|(_, differs)| *differs)
        .map(|(name, _)| name.to_string())
        .collect()
}

fn documents_to_csv(records: &[DocumentRecord]) -> String {
    let mut csv = String::new();

    csv.push_str(
        "tracking_code,title,sender,recipient,date_of_letter,date_received,priority,status,current_holder,created_at\n",
    );

    for r in records {
        csv.push_str(&format!(
            "{},{},{},{},{},{},{},{},{},{}\n",
            csv_escape(&r.tracking_code),
            csv_escape(&r.title),
            csv_escape(&r.sender),
            csv_escape(&r.recipient),
            r.date_of_letter.as_deref().unwrap_or(""),
            r.date_received.as_deref().unwrap_or(""),
            r.priority.as_deref().unwrap_or(""),
            csv_escape(&r.status),
            csv_escape(r.current_holder.as_deref().unwrap_or("")),
            r.created_at.as_deref().unwrap_or(""),
        ));
    }

    csv
}

fn csv_escape(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') || value.contains('\r') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
