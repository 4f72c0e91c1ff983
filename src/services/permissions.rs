//! Role based access control

use chrono::{Duration, NaiveDateTime};
use serde::Serialize;

use crate::models::{Document, Role, User};
use crate::utils::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Permission {
    /// See documents one holds or processed
    ViewDocuments,
    /// See every document regardless of holder
    ViewAllDocuments,
    ComposeDocument,
    UpdateStatus,
    /// Approve or reject pending documents
    ApproveRegistry,
    UploadAttachment,
    Comment,
    ManageUsers,
    ViewLogs,
    ManageSystem,
}

const ADMINISTRATOR: &[Permission] = &[
    Permission::ViewDocuments,
    Permission::ViewAllDocuments,
    Permission::ComposeDocument,
    Permission::UpdateStatus,
    Permission::ApproveRegistry,
    Permission::UploadAttachment,
    Permission::Comment,
    Permission::ManageUsers,
    Permission::ViewLogs,
    Permission::ManageSystem,
];

const REGISTRY: &[Permission] = &[
    Permission::ViewDocuments,
    Permission::ViewAllDocuments,
    Permission::ComposeDocument,
    Permission::UpdateStatus,
    Permission::ApproveRegistry,
    Permission::UploadAttachment,
    Permission::Comment,
];

const SUPERVISOR: &[Permission] = &[
    Permission::ViewDocuments,
    Permission::ViewAllDocuments,
    Permission::ComposeDocument,
    Permission::UpdateStatus,
    Permission::UploadAttachment,
    Permission::Comment,
    Permission::ViewLogs,
];

const USER: &[Permission] = &[
    Permission::ViewDocuments,
    Permission::ComposeDocument,
    Permission::UpdateStatus,
    Permission::UploadAttachment,
    Permission::Comment,
];

pub fn permissions_for(role: Role) -> &'static [Permission] {
    match role {
        Role::Administrator => ADMINISTRATOR,
        Role::Registry => REGISTRY,
        Role::Supervisor => SUPERVISOR,
        Role::User => USER,
    }
}

pub fn has_permission(role: Role, permission: Permission) -> bool {
    permissions_for(role).contains(&permission)
}

/// Fail with `Forbidden` unless the user's role grants `permission`
pub fn require(user: &User, permission: Permission) -> AppResult<()> {
    if has_permission(user.role, permission) {
        Ok(())
    } else {
        Err(AppError::forbidden(format!("{:?} required", permission)))
    }
}

/// Whether `user` may open `doc`: either they see everything or they hold
/// or processed it
pub fn can_access_document(user: &User, doc: &Document) -> bool {
    if has_permission(user.role, Permission::ViewAllDocuments) {
        return true;
    }
    match user.id {
        Some(id) => doc.is_handled_by(id, &user.username),
        None => false,
    }
}

/// A session idle for longer than `timeout_secs` is expired
pub fn session_expired(last_activity: NaiveDateTime, now: NaiveDateTime, timeout_secs: u64) -> bool {
    let timeout = Duration::seconds(timeout_secs.min((i64::MAX / 1000) as u64) as i64);
    now.signed_duration_since(last_activity) > timeout
}
