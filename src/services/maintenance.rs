//! Database maintenance: backups, vacuum, reindex, integrity check and log purge

use std::fs::{self, File};
use std::io::{Read, Seek, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use chrono::{Duration, Local, NaiveDateTime, Utc};
use serde::Serialize;
use tracing::info;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use super::permissions::{require, Permission};
use super::uploads::format_file_size;
use crate::db::Database;
use crate::models::{AppConfig, User};
use crate::utils::date::TIMESTAMP_FORMAT;
use crate::utils::file_ops::{self, unique_filename};
use crate::utils::{AppError, AppResult};

const BACKUP_PREFIX: &str = "doctrack_backup_";

/// Name of the database inside a backup archive
const ARCHIVE_DB_NAME: &str = "doctrack.db";

/// Longest log retention accepted (about a century)
pub const MAX_RETENTION_DAYS: u32 = 36_500;

#[derive(Debug, Clone, Serialize)]
pub struct BackupResult {
    pub filename: String,
    #[serde(skip)]
    pub path: PathBuf,
    pub size: u64,
    pub size_display: String,
    /// Files in the archive, database included
    pub file_count: usize,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BackupInfo {
    pub filename: String,
    #[serde(skip)]
    pub path: PathBuf,
    pub size: u64,
    pub size_display: String,
    /// Taken from the file name
    pub date: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MaintenanceResult {
    pub operation: String,
    pub message: String,
    pub duration_ms: u128,
}

#[derive(Debug, Clone, Serialize)]
pub struct IntegrityReport {
    pub ok: bool,
    pub messages: Vec<String>,
}

pub struct MaintenanceService<'a> {
    db: &'a Database,
    config: &'a AppConfig,
}

impl<'a> MaintenanceService<'a> {
    pub fn new(db: &'a Database, config: &'a AppConfig) -> Self {
        Self { db, config }
    }

    fn backup_dir(&self) -> &Path {
        &self.config.storage.backup_dir
    }

    /// Zip a consistent snapshot of the database together with all uploads
    pub fn backup(&self, actor: &User) -> AppResult<BackupResult> {
        require(actor, Permission::ManageSystem)?;

        let backup_dir = self.backup_dir();
        file_ops::ensure_directory(backup_dir)?;

        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        let filename = unique_filename(backup_dir, &format!("{}{}.zip", BACKUP_PREFIX, timestamp));
        let backup_path = backup_dir.join(&filename);

        // VACUUM INTO gives a consistent copy even while the server keeps writing
        let snapshot = backup_dir.join(format!(".snapshot_{}.db", timestamp));
        file_ops::delete_file(&snapshot)?;
        let snapshot_str = snapshot.to_string_lossy().to_string();
        self.db.with_connection(|conn| {
            conn.execute("VACUUM INTO ?1", [&snapshot_str])?;
            Ok(())
        })?;

        let result = self.write_archive(&backup_path, &snapshot);
        file_ops::delete_file(&snapshot)?;
        let file_count = result?;

        let size = fs::metadata(&backup_path)?.len();
        let backup = BackupResult {
            filename,
            path: backup_path,
            size,
            size_display: format_file_size(size),
            file_count,
            created_at: Local::now().format(TIMESTAMP_FORMAT).to_string(),
        };

        self.db.logs().log(
            &actor.username,
            "maintenance.backup",
            Some(&format!("{} ({} files, {})", backup.filename, file_count, backup.size_display)),
        )?;
        info!("Backup written to {:?}", backup.path);

        Ok(backup)
    }

    fn write_archive(&self, backup_path: &Path, snapshot: &Path) -> AppResult<usize> {
        let file = File::create(backup_path).context("Could not create backup file")?;
        let mut zip = ZipWriter::new(file);

        let options = SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated)
            .compression_level(Some(6));

        add_file_to_zip(&mut zip, snapshot, ARCHIVE_DB_NAME, options)?;
        let mut file_count = 1;

        let upload_dir = &self.config.storage.upload_dir;
        if upload_dir.exists() {
            file_count += add_directory_to_zip(&mut zip, upload_dir, "uploads", options)?;
        }

        zip.finish().context("Could not finish ZIP file")?;
        Ok(file_count)
    }

    /// Existing backups, newest first
    pub fn list_backups(&self, actor: &User) -> AppResult<Vec<BackupInfo>> {
        require(actor, Permission::ManageSystem)?;

        let backup_dir = self.backup_dir();
        if !backup_dir.exists() {
            return Ok(Vec::new());
        }

        let mut backups = Vec::new();

        for entry in fs::read_dir(backup_dir)? {
            let path = entry?.path();
            if !path.is_file() || path.extension().map(|e| e != "zip").unwrap_or(true) {
                continue;
            }

            let filename = path
                .file_name()
                .unwrap_or_default()
                .to_string_lossy()
                .to_string();
            let size = fs::metadata(&path)?.len();

            backups.push(BackupInfo {
                date: extract_date_from_filename(&filename),
                filename,
                path,
                size,
                size_display: format_file_size(size),
            });
        }

        backups.sort_by(|a, b| b.filename.cmp(&a.filename));

        Ok(backups)
    }

    /// Remove one backup. `name` must be a bare file name inside the backup directory.
    pub fn delete_backup(&self, name: &str, actor: &User) -> AppResult<()> {
        require(actor, Permission::ManageSystem)?;

        let is_plain_name = Path::new(name).file_name().and_then(|n| n.to_str()) == Some(name);
        if !is_plain_name || name.starts_with('.') || !name.ends_with(".zip") {
            return Err(AppError::validation(format!("Invalid backup name: {}", name)));
        }

        let path = self.backup_dir().join(name);
        if !path.is_file() {
            return Err(AppError::not_found(format!("Backup {}", name)));
        }

        fs::remove_file(&path).context("Could not delete backup file")?;
        self.db
            .logs()
            .log(&actor.username, "maintenance.delete_backup", Some(name))?;

        Ok(())
    }

    pub fn vacuum(&self, actor: &User) -> AppResult<MaintenanceResult> {
        self.run(actor, "vacuum", |conn| {
            conn.execute_batch("VACUUM;")?;
            Ok("Database compacted".to_string())
        })
    }

    pub fn reindex(&self, actor: &User) -> AppResult<MaintenanceResult> {
        self.run(actor, "reindex", |conn| {
            conn.execute_batch("REINDEX;")?;
            Ok("All indexes rebuilt".to_string())
        })
    }

    pub fn integrity_check(&self, actor: &User) -> AppResult<IntegrityReport> {
        require(actor, Permission::ManageSystem)?;

        let messages = self.db.with_connection(|conn| {
            let mut stmt = conn.prepare("PRAGMA integrity_check")?;
            let rows = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })?;

        let ok = messages.len() == 1 && messages[0] == "ok";
        self.db.logs().log(
            &actor.username,
            "maintenance.integrity_check",
            Some(if ok { "ok" } else { "problems found" }),
        )?;

        Ok(IntegrityReport { ok, messages })
    }

    /// Delete system log rows older than `days` days
    pub fn purge_logs(&self, days: u32, actor: &User) -> AppResult<usize> {
        require(actor, Permission::ManageSystem)?;
        if !(1..=MAX_RETENTION_DAYS).contains(&days) {
            return Err(AppError::validation(format!(
                "Retention must be between 1 and {} days",
                MAX_RETENTION_DAYS
            )));
        }

        let cutoff: NaiveDateTime = Utc::now()
            .checked_sub_signed(Duration::days(i64::from(days)))
            .ok_or_else(|| AppError::validation(format!("Retention of {} days is out of range", days)))?
            .naive_utc();
        let removed = self
            .db
            .logs()
            .purge_system_logs_before(&cutoff.format(TIMESTAMP_FORMAT).to_string())?;

        self.db.logs().log(
            &actor.username,
            "maintenance.purge_logs",
            Some(&format!("{} entries older than {} days", removed, days)),
        )?;
        info!("Purged {} system log entries", removed);

        Ok(removed)
    }

    fn run<F>(&self, actor: &User, operation: &str, f: F) -> AppResult<MaintenanceResult>
    where
        F: FnOnce(&rusqlite::Connection) -> anyhow::Result<String>,
    {
        require(actor, Permission::ManageSystem)?;

        let started = Instant::now();
        let message = self.db.with_connection(f)?;
        let duration_ms = started.elapsed().as_millis();

        self.db.logs().log(
            &actor.username,
            &format!("maintenance.{}", operation),
            Some(&format!("{} in {} ms", message, duration_ms)),
        )?;
        info!("{}: {} ({} ms)", operation, message, duration_ms);

        Ok(MaintenanceResult {
            operation: operation.to_string(),
            message,
            duration_ms,
        })
    }
}

fn add_file_to_zip<W: Write + Seek>(
    zip: &mut ZipWriter<W>,
    file_path: &Path,
    archive_name: &str,
    options: SimpleFileOptions,
) -> AppResult<()> {
    zip.start_file(archive_name, options)
        .map_err(|e| anyhow::anyhow!("Could not add {} to archive: {}", archive_name, e))?;

    let mut buffer = Vec::new();
    File::open(file_path)?.read_to_end(&mut buffer)?;
    zip.write_all(&buffer)?;

    Ok(())
}

fn add_directory_to_zip<W: Write + Seek>(
    zip: &mut ZipWriter<W>,
    dir_path: &Path,
    base_name: &str,
    options: SimpleFileOptions,
) -> AppResult<usize> {
    let files = file_ops::scan_directory_relative(dir_path)?;

    for (path, relative) in &files {
        add_file_to_zip(zip, path, &format!("{}/{}", base_name, relative), options)?;
    }

    Ok(files.len())
}

/// `doctrack_backup_20250428_143022.zip` -> `2025-04-28 14:30:22`
fn extract_date_from_filename(filename: &str) -> Option<String> {
    let stamp = filename.strip_prefix(BACKUP_PREFIX)?.strip_suffix(".zip")?;
    let stamp = stamp.get(..15)?;
    NaiveDateTime::parse_from_str(stamp, "%Y%m%d_%H%M%S")
        .ok()
        .map(|dt| dt.format(TIMESTAMP_FORMAT).to_string())
}
