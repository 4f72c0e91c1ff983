use serde::Serialize;

use super::permissions::{has_permission, Permission};
use crate::db::Database;
use crate::models::{Document, DocumentFilter, SystemLog, User};
use crate::utils::{AppError, AppResult};

const RECENT_DOCUMENTS: usize = 10;
const RECENT_LOGS: usize = 10;

#[derive(Debug, Serialize)]
pub struct CountEntry {
    pub label: String,
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct DashboardStats {
    pub total_documents: i64,
    pub by_status: Vec<CountEntry>,
    pub by_priority: Vec<CountEntry>,
    /// Only filled in for users who manage accounts
    pub total_users: Option<i64>,
    pub active_users: Option<i64>,
    pub recent_documents: Vec<Document>,
    /// Only filled in for users who may read the logs
    pub recent_logs: Vec<SystemLog>,
}

/// Summary for the landing page. Plain users see figures for their own documents only.
pub fn dashboard(db: &Database, user: &User) -> AppResult<DashboardStats> {
    let documents = db.documents();
    let visible_to = if has_permission(user.role, Permission::ViewAllDocuments) {
        None
    } else {
        Some((user.id.ok_or(AppError::Unauthorized)?, user.username.as_str()))
    };

    let total_documents = documents.count(visible_to)?;
    let by_status = to_entries(documents.count_by_status(visible_to)?);
    let by_priority = to_entries(documents.count_by_priority(visible_to)?);
    let recent_documents = match visible_to {
        None => documents.find_recent(RECENT_DOCUMENTS)?,
        Some((id, username)) => documents.search(&DocumentFilter {
            visible_to: Some((id, username.to_string())),
            limit: Some(RECENT_DOCUMENTS as u32),
            ..Default::default()
        })?,
    };

    let (total_users, active_users) = if has_permission(user.role, Permission::ManageUsers) {
        (Some(db.users().count()?), Some(db.users().count_active()?))
    } else {
        (None, None)
    };

    let recent_logs = if has_permission(user.role, Permission::ViewLogs) {
        db.logs().recent_system_logs(RECENT_LOGS, None)?
    } else {
        Vec::new()
    };

    Ok(DashboardStats {
        total_documents,
        by_status,
        by_priority,
        total_users,
        active_users,
        recent_documents,
        recent_logs,
    })
}

fn to_entries<T: ToString>(counts: Vec<(T, i64)>) -> Vec<CountEntry> {
    counts
        .into_iter()
        .map(|(label, count)| CountEntry {
            label: label.to_string(),
            count,
        })
        .collect()
}
