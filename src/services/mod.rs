//! Business logic that doesn't belong in the HTTP layer or the repositories

pub mod auth;
pub mod dashboard;
pub mod export;
pub mod maintenance;
pub mod permissions;
pub mod sessions;
pub mod tracking_code;
pub mod uploads;
pub mod users;
pub mod workflow;

pub use auth::AuthService;
pub use export::{ExportFormat, ExportService, ImportResult};
pub use maintenance::{BackupInfo, MaintenanceService};
pub use permissions::Permission;
pub use sessions::{Session, SessionStore};
pub use uploads::AttachmentService;
pub use users::UserService;
pub use workflow::{TransitionRequest, WorkflowService};
