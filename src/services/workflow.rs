//! Document workflow
//!
//! Composing, editing and moving documents through their statuses. Every
//! change is written with the version the caller read, so two people
//! editing the same document can't silently overwrite each other.

use chrono::{Local, NaiveDate};
use serde::Deserialize;
use tracing::{info, warn};

use super::permissions::{can_access_document, has_permission, require, Permission};
use super::tracking_code;
use crate::db::{AttachmentRepository, Database, DocumentRepository, LogRepository};
use crate::models::{
    AppConfig, Document, DocumentAction, DocumentComment, DocumentFilter, DocumentStatus,
    DocumentUpdate, NewDocument, Priority, User, WorkflowAction,
};
use crate::utils::date::parse_date;
use crate::utils::{AppError, AppResult};

/// Holder of documents waiting for registry approval
pub const REGISTRY_HOLDER: &str = "Registry";

/// Attempts at inserting a document before a code collision is reported
const MAX_COMPOSE_ATTEMPTS: usize = 5;

#[derive(Debug, Clone, Deserialize)]
pub struct TransitionRequest {
    pub action: WorkflowAction,
    #[serde(default)]
    pub forward_to: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub expected_version: Option<i64>,
}

impl TransitionRequest {
    pub fn new(action: WorkflowAction) -> Self {
        Self {
            action,
            forward_to: None,
            notes: None,
            expected_version: None,
        }
    }
}

pub struct WorkflowService<'a> {
    db: &'a Database,
    config: &'a AppConfig,
}

impl<'a> WorkflowService<'a> {
    pub fn new(db: &'a Database, config: &'a AppConfig) -> Self {
        Self { db, config }
    }

    // === Reading ===

    pub fn get(&self, id: i64, user: &User) -> AppResult<Document> {
        let doc = self
            .db
            .documents()
            .find_by_id(id)?
            .ok_or_else(|| AppError::not_found(format!("Document {}", id)))?;
        self.ensure_access(user, &doc)?;
        Ok(doc)
    }

    pub fn get_by_code(&self, code: &str, user: &User) -> AppResult<Document> {
        let doc = self
            .db
            .documents()
            .find_by_code(code)?
            .ok_or_else(|| AppError::not_found(format!("Document {}", code.trim())))?;
        self.ensure_access(user, &doc)?;
        Ok(doc)
    }

    /// Search, limited to the user's own documents unless they may see all
    pub fn search(&self, filter: &DocumentFilter, user: &User) -> AppResult<Vec<Document>> {
        require(user, Permission::ViewDocuments)?;

        let mut filter = filter.clone();
        filter.visible_to = None;
        if !has_permission(user.role, Permission::ViewAllDocuments) {
            let id = user.id.ok_or(AppError::Unauthorized)?;
            filter.visible_to = Some((id, user.username.clone()));
        }

        Ok(self.db.documents().search(&filter)?)
    }

    pub fn history(&self, id: i64, user: &User) -> AppResult<Vec<DocumentAction>> {
        self.get(id, user)?;
        Ok(self.db.logs().history(id)?)
    }

    // === Writing ===

    /// Create a document with a freshly generated tracking code
    pub fn compose(&self, input: &NewDocument, actor: &User) -> AppResult<Document> {
        require(actor, Permission::ComposeDocument)?;
        input.validate()?;

        let today = Local::now().date_naive();
        let status = input.initial_status()?;

        let mut doc = Document::new(
            String::new(),
            input.title.trim().to_string(),
            input.sender.trim().to_string(),
            input.recipient.trim().to_string(),
        );
        doc.details = non_empty(input.details.as_deref());
        doc.required_action = non_empty(input.required_action.as_deref());
        doc.date_of_letter = parse_optional_date(input.date_of_letter.as_deref())?;
        doc.priority = input.priority()?;
        doc.status = status;
        doc.current_holder = Some(actor.username.clone());
        doc.processed_by = actor.id;
        if status == DocumentStatus::Incoming {
            doc.date_received = Some(today);
        }

        let id = self.insert_with_fresh_code(&mut doc, actor, today)?;
        info!("{} composed {}", actor.username, doc.tracking_code);

        self.reload(id)
    }

    /// Insert `doc` together with its first history entry, drawing a new
    /// code whenever the previous one turned out to be taken
    fn insert_with_fresh_code(&self, doc: &mut Document, actor: &User, today: NaiveDate) -> AppResult<i64> {
        for attempt in 1..=MAX_COMPOSE_ATTEMPTS {
            doc.tracking_code = tracking_code::generate(self.db, &self.config.tracking, today)?;

            let inserted = self.db.transaction(|conn| -> AppResult<i64> {
                let id = DocumentRepository::create_tx(conn, doc)?;
                let entry = history_entry(doc, actor, "compose", None, Some(doc.status_label()), None)?;
                LogRepository::record_action_tx(conn, &entry)?;
                LogRepository::log_tx(
                    conn,
                    &actor.username,
                    "document.compose",
                    Some(&format!("{} \"{}\"", doc.tracking_code, doc.title)),
                )?;
                Ok(id)
            });

            match inserted {
                Ok(id) => return Ok(id),
                Err(err) if err.is_constraint_violation() => {
                    warn!(
                        "Tracking code {} taken (attempt {}), retrying",
                        doc.tracking_code, attempt
                    );
                }
                Err(err) => return Err(err),
            }
        }

        Err(AppError::conflict("Could not allocate a unique tracking code"))
    }

    /// Edit the descriptive fields of a document
    pub fn update_details(&self, id: i64, update: &DocumentUpdate, actor: &User) -> AppResult<Document> {
        require(actor, Permission::UpdateStatus)?;
        let mut doc = self.get(id, actor)?;

        if doc.status.is_terminal() {
            return Err(AppError::validation("Ended documents can no longer be edited"));
        }
        check_version(&doc, update.expected_version)?;

        if let Some(title) = &update.title {
            doc.title = required_field(title, "Title")?;
        }
        if let Some(sender) = &update.sender {
            doc.sender = required_field(sender, "Sender")?;
        }
        if let Some(recipient) = &update.recipient {
            doc.recipient = required_field(recipient, "Recipient")?;
        }
        if let Some(details) = &update.details {
            doc.details = non_empty(Some(details));
        }
        if let Some(required_action) = &update.required_action {
            doc.required_action = non_empty(Some(required_action));
        }
        if let Some(date) = &update.date_of_letter {
            doc.date_of_letter = parse_optional_date(Some(date))?;
        }
        if let Some(priority) = &update.priority {
            doc.priority = Priority::parse(priority)
                .ok_or_else(|| AppError::validation(format!("Unknown priority: {}", priority)))?;
        }

        let entry = history_entry(&doc, actor, "edit", None, None, None)?;
        self.db.transaction(|conn| -> AppResult<()> {
            if !DocumentRepository::update_details_tx(conn, &doc)? {
                return Err(stale(&doc));
            }
            LogRepository::record_action_tx(conn, &entry)?;
            Ok(())
        })?;

        self.reload(id)
    }

    /// Move a document to its next status
    pub fn transition(&self, id: i64, request: &TransitionRequest, actor: &User) -> AppResult<Document> {
        require(actor, Permission::UpdateStatus)?;
        if request.action.is_registry_decision() {
            require(actor, Permission::ApproveRegistry)?;
        }

        let mut doc = self.get(id, actor)?;
        check_version(&doc, request.expected_version)?;

        let from = doc.status_label();
        let next = doc.status.apply(request.action).ok_or_else(|| {
            AppError::validation(format!(
                "Cannot {} a document that is {}",
                request.action.label(),
                doc.status
            ))
        })?;

        match request.action {
            WorkflowAction::Submit => {
                doc.current_holder = Some(REGISTRY_HOLDER.to_string());
                doc.forwarded_to = None;
            }
            WorkflowAction::Approve => {
                let target = non_empty(request.forward_to.as_deref())
                    .ok_or_else(|| AppError::validation("Approval needs a forwarding target"))?;
                doc.current_holder = Some(target.clone());
                doc.forwarded_to = Some(target);
            }
            WorkflowAction::Reject => {
                doc.current_holder = self.processor_username(&doc)?.or(doc.current_holder.take());
                doc.forwarded_to = None;
            }
            WorkflowAction::Receive => {
                doc.current_holder = Some(actor.username.clone());
                if doc.date_received.is_none() {
                    doc.date_received = Some(Local::now().date_naive());
                }
                doc.forwarded_to = None;
            }
            WorkflowAction::Dispatch | WorkflowAction::Send | WorkflowAction::End => {
                doc.forwarded_to = None;
            }
        }
        doc.status = next;

        let entry = history_entry(
            &doc,
            actor,
            request.action.label(),
            Some(from.clone()),
            Some(doc.status_label()),
            non_empty(request.notes.as_deref()),
        )?;
        self.db.transaction(|conn| -> AppResult<()> {
            if !DocumentRepository::update_status_tx(conn, &doc)? {
                return Err(stale(&doc));
            }
            LogRepository::record_action_tx(conn, &entry)?;
            LogRepository::log_tx(
                conn,
                &actor.username,
                &format!("document.{}", request.action.label()),
                Some(&format!("{}: {} -> {}", doc.tracking_code, from, doc.status_label())),
            )?;
            Ok(())
        })?;
        info!(
            "{} moved {} from {} to {}",
            actor.username,
            doc.tracking_code,
            from,
            doc.status_label()
        );

        self.reload(id)
    }

    // === Comments ===

    pub fn add_comment(&self, id: i64, body: &str, actor: &User) -> AppResult<DocumentComment> {
        require(actor, Permission::Comment)?;
        let doc = self.get(id, actor)?;

        let body = body.trim();
        if body.is_empty() {
            return Err(AppError::validation("Comment is empty"));
        }

        let mut comment = DocumentComment {
            id: None,
            document_id: id,
            user_id: actor.id,
            author: actor.username.clone(),
            body: body.to_string(),
            created_at: None,
        };
        let entry = history_entry(&doc, actor, "comment", None, None, None)?;
        let comment_id = self.db.transaction(|conn| -> AppResult<i64> {
            let comment_id = AttachmentRepository::add_comment_tx(conn, &mut comment)?;
            LogRepository::record_action_tx(conn, &entry)?;
            Ok(comment_id)
        })?;

        self.db
            .attachments()
            .find_comment(comment_id)?
            .ok_or_else(|| AppError::not_found("Comment"))
    }

    /// Remove a comment. Authors may remove their own, system managers any.
    pub fn delete_comment(&self, comment_id: i64, actor: &User) -> AppResult<()> {
        require(actor, Permission::Comment)?;
        let comment = self
            .db
            .attachments()
            .find_comment(comment_id)?
            .ok_or_else(|| AppError::not_found(format!("Comment {}", comment_id)))?;
        let doc = self.get(comment.document_id, actor)?;

        let is_author = comment.user_id.is_some() && comment.user_id == actor.id;
        if !is_author && !has_permission(actor.role, Permission::ManageSystem) {
            return Err(AppError::forbidden("Only the author can remove this comment"));
        }

        let entry = history_entry(&doc, actor, "remove comment", None, None, None)?;
        self.db.transaction(|conn| -> AppResult<()> {
            if !AttachmentRepository::delete_comment_tx(conn, comment_id)? {
                return Err(AppError::not_found(format!("Comment {}", comment_id)));
            }
            LogRepository::record_action_tx(conn, &entry)?;
            Ok(())
        })?;
        info!("{} removed comment {} on {}", actor.username, comment_id, doc.tracking_code);

        Ok(())
    }

    pub fn comments(&self, id: i64, user: &User) -> AppResult<Vec<DocumentComment>> {
        self.get(id, user)?;
        Ok(self.db.attachments().comments(id)?)
    }

    // === Helpers ===

    fn ensure_access(&self, user: &User, doc: &Document) -> AppResult<()> {
        require(user, Permission::ViewDocuments)?;
        if can_access_document(user, doc) {
            Ok(())
        } else {
            Err(AppError::forbidden(format!(
                "{} is not assigned to you",
                doc.tracking_code
            )))
        }
    }

    fn processor_username(&self, doc: &Document) -> AppResult<Option<String>> {
        let Some(user_id) = doc.processed_by else {
            return Ok(None);
        };
        Ok(self.db.users().find_by_id(user_id)?.map(|u| u.username))
    }

    fn reload(&self, id: i64) -> AppResult<Document> {
        self.db
            .documents()
            .find_by_id(id)?
            .ok_or_else(|| AppError::not_found(format!("Document {}", id)))
    }
}

fn history_entry(
    doc: &Document,
    actor: &User,
    action: &str,
    from_status: Option<String>,
    to_status: Option<String>,
    notes: Option<String>,
) -> AppResult<DocumentAction> {
    let document_id = doc.id.ok_or_else(|| anyhow::anyhow!("Document has no ID"))?;
    Ok(DocumentAction {
        id: None,
        document_id,
        user_id: actor.id,
        actor: actor.username.clone(),
        action: action.to_string(),
        from_status,
        to_status,
        notes,
        timestamp: String::new(),
    })
}

fn check_version(doc: &Document, expected: Option<i64>) -> AppResult<()> {
    match expected {
        Some(v) if v != doc.version => Err(stale(doc)),
        _ => Ok(()),
    }
}

fn stale(doc: &Document) -> AppError {
    AppError::conflict(format!(
        "{} was changed by someone else; reload and try again",
        doc.tracking_code
    ))
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

fn required_field(value: &str, name: &str) -> AppResult<String> {
    non_empty(Some(value)).ok_or_else(|| AppError::validation(format!("{} is required", name)))
}

fn parse_optional_date(value: Option<&str>) -> AppResult<Option<NaiveDate>> {
    match value.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => parse_date(s)
            .map(Some)
            .ok_or_else(|| AppError::validation(format!("Invalid date: {}", s))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use crate::test_support::create_user;

    struct Fixture {
        db: Database,
        config: AppConfig,
        registry: User,
        clerk: User,
    }

    impl Fixture {
        fn new() -> Self {
            let db = Database::open_in_memory().unwrap();
            let registry = create_user(&db, "registry", Role::Registry);
            let clerk = create_user(&db, "clerk", Role::User);
            Self {
                db,
                config: AppConfig::default(),
                registry,
                clerk,
            }
        }

        fn service(&self) -> WorkflowService<'_> {
            WorkflowService::new(&self.db, &self.config)
        }
    }

    fn letter() -> NewDocument {
        NewDocument {
            title: "Grant award letter".into(),
            sender: "Ministry of Health".into(),
            recipient: "Director".into(),
            date_of_letter: Some("2025-04-20".into()),
            priority: Some("urgent".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_compose_assigns_codes() {
        let fx = Fixture::new();
        let service = fx.service();

        let first = service.compose(&letter(), &fx.clerk).unwrap();
        let second = service.compose(&letter(), &fx.clerk).unwrap();

        let year = Local::now().date_naive().format("%Y").to_string();
        assert_eq!(first.tracking_code, format!("DOC-{}-001", year));
        assert_eq!(second.tracking_code, format!("DOC-{}-002", year));
        assert_eq!(first.status, DocumentStatus::Incoming);
        assert_eq!(first.priority, Priority::Urgent);
        assert_eq!(first.current_holder.as_deref(), Some("clerk"));
        assert_eq!(first.processed_by, fx.clerk.id);
        assert!(first.date_received.is_some());

        let history = service.history(first.id.unwrap(), &fx.clerk).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].action, "compose");
    }

    #[test]
    fn test_compose_rejects_bad_input() {
        let fx = Fixture::new();
        let mut input = letter();
        input.date_of_letter = Some("someday".into());

        assert!(matches!(
            fx.service().compose(&input, &fx.clerk),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_full_lifecycle() {
        let fx = Fixture::new();
        let service = fx.service();
        let doc = service.compose(&letter(), &fx.clerk).unwrap();
        let id = doc.id.unwrap();

        let doc = service
            .transition(id, &TransitionRequest::new(WorkflowAction::Submit), &fx.clerk)
            .unwrap();
        assert_eq!(doc.status, DocumentStatus::Pending);
        assert_eq!(doc.current_holder.as_deref(), Some(REGISTRY_HOLDER));

        let mut approve = TransitionRequest::new(WorkflowAction::Approve);
        approve.forward_to = Some("Finance".into());
        let doc = service.transition(id, &approve, &fx.registry).unwrap();
        assert_eq!(doc.status_label(), "Approved - Forwarded to Finance");
        assert_eq!(doc.current_holder.as_deref(), Some("Finance"));

        let doc = service
            .transition(id, &TransitionRequest::new(WorkflowAction::Receive), &fx.registry)
            .unwrap();
        assert_eq!(doc.status, DocumentStatus::Received);
        assert_eq!(doc.forwarded_to, None);

        for action in [WorkflowAction::Dispatch, WorkflowAction::Send, WorkflowAction::End] {
            service
                .transition(id, &TransitionRequest::new(action), &fx.registry)
                .unwrap();
        }

        let doc = service.get(id, &fx.registry).unwrap();
        assert_eq!(doc.status, DocumentStatus::Ended);
        assert_eq!(doc.version, 7);

        let history = service.history(id, &fx.registry).unwrap();
        assert_eq!(history.len(), 7);
        assert_eq!(history[2].to_status.as_deref(), Some("Approved - Forwarded to Finance"));
    }

    #[test]
    fn test_invalid_transition() {
        let fx = Fixture::new();
        let service = fx.service();
        let doc = service.compose(&letter(), &fx.clerk).unwrap();

        let result = service.transition(
            doc.id.unwrap(),
            &TransitionRequest::new(WorkflowAction::Send),
            &fx.clerk,
        );
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_approval_needs_registry_and_target() {
        let fx = Fixture::new();
        let service = fx.service();
        let doc = service.compose(&letter(), &fx.clerk).unwrap();
        let id = doc.id.unwrap();
        service
            .transition(id, &TransitionRequest::new(WorkflowAction::Submit), &fx.clerk)
            .unwrap();

        let mut approve = TransitionRequest::new(WorkflowAction::Approve);
        approve.forward_to = Some("Finance".into());
        assert!(matches!(
            service.transition(id, &approve, &fx.clerk),
            Err(AppError::Forbidden(_))
        ));

        approve.forward_to = Some("   ".into());
        assert!(matches!(
            service.transition(id, &approve, &fx.registry),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_reject_returns_to_processor() {
        let fx = Fixture::new();
        let service = fx.service();
        let id = service.compose(&letter(), &fx.clerk).unwrap().id.unwrap();
        service
            .transition(id, &TransitionRequest::new(WorkflowAction::Submit), &fx.clerk)
            .unwrap();

        let mut reject = TransitionRequest::new(WorkflowAction::Reject);
        reject.notes = Some("Missing signature".into());
        let doc = service.transition(id, &reject, &fx.registry).unwrap();

        assert_eq!(doc.status, DocumentStatus::Rejected);
        assert_eq!(doc.current_holder.as_deref(), Some("clerk"));

        let history = service.history(id, &fx.clerk).unwrap();
        assert_eq!(history.last().unwrap().notes.as_deref(), Some("Missing signature"));
    }

    #[test]
    fn test_stale_version_is_conflict() {
        let fx = Fixture::new();
        let service = fx.service();
        let doc = service.compose(&letter(), &fx.clerk).unwrap();
        let id = doc.id.unwrap();

        let mut first = DocumentUpdate {
            title: Some("Grant award letter (signed)".into()),
            expected_version: Some(doc.version),
            ..Default::default()
        };
        service.update_details(id, &first, &fx.clerk).unwrap();

        first.title = Some("Someone else's edit".into());
        assert!(matches!(
            service.update_details(id, &first, &fx.clerk),
            Err(AppError::Conflict(_))
        ));

        let mut submit = TransitionRequest::new(WorkflowAction::Submit);
        submit.expected_version = Some(doc.version);
        assert!(matches!(
            service.transition(id, &submit, &fx.clerk),
            Err(AppError::Conflict(_))
        ));

        assert_eq!(service.get(id, &fx.clerk).unwrap().title, "Grant award letter (signed)");
    }

    #[test]
    fn test_plain_user_sees_only_own_documents() {
        let fx = Fixture::new();
        let service = fx.service();
        let other = create_user(&fx.db, "other", Role::User);

        let mine = service.compose(&letter(), &fx.clerk).unwrap();
        service.compose(&letter(), &fx.registry).unwrap();

        let visible = service.search(&DocumentFilter::default(), &fx.clerk).unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].id, mine.id);

        assert_eq!(service.search(&DocumentFilter::default(), &fx.registry).unwrap().len(), 2);

        assert!(matches!(
            service.get(mine.id.unwrap(), &other),
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            service.transition(mine.id.unwrap(), &TransitionRequest::new(WorkflowAction::End), &other),
            Err(AppError::Forbidden(_))
        ));
    }

    #[test]
    fn test_ended_documents_are_read_only() {
        let fx = Fixture::new();
        let service = fx.service();
        let id = service.compose(&letter(), &fx.clerk).unwrap().id.unwrap();
        service
            .transition(id, &TransitionRequest::new(WorkflowAction::End), &fx.clerk)
            .unwrap();

        let update = DocumentUpdate {
            title: Some("Too late".into()),
            ..Default::default()
        };
        assert!(matches!(
            service.update_details(id, &update, &fx.clerk),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_comments() {
        let fx = Fixture::new();
        let service = fx.service();
        let id = service.compose(&letter(), &fx.clerk).unwrap().id.unwrap();

        assert!(service.add_comment(id, "   ", &fx.clerk).is_err());
        let comment = service.add_comment(id, "Please expedite", &fx.registry).unwrap();
        assert_eq!(comment.author, "registry");

        assert_eq!(service.comments(id, &fx.clerk).unwrap().len(), 1);
    }

    #[test]
    fn test_comment_removal() {
        let fx = Fixture::new();
        let service = fx.service();
        let admin = create_user(&fx.db, "admin", Role::Administrator);
        let id = service.compose(&letter(), &fx.clerk).unwrap().id.unwrap();

        let first = service.add_comment(id, "Please expedite", &fx.registry).unwrap();
        let second = service.add_comment(id, "On it", &fx.clerk).unwrap();

        assert!(matches!(
            service.delete_comment(first.id.unwrap(), &fx.clerk),
            Err(AppError::Forbidden(_))
        ));
        service.delete_comment(first.id.unwrap(), &fx.registry).unwrap();
        assert!(matches!(
            service.delete_comment(first.id.unwrap(), &fx.registry),
            Err(AppError::NotFound(_))
        ));

        service.delete_comment(second.id.unwrap(), &admin).unwrap();
        assert!(service.comments(id, &fx.clerk).unwrap().is_empty());

        let history = service.history(id, &fx.clerk).unwrap();
        assert_eq!(history.last().unwrap().action, "remove comment");
        assert_eq!(history.last().unwrap().actor, "admin");
    }

    #[test]
    fn test_failed_history_write_leaves_document_untouched() {
        let fx = Fixture::new();
        let service = fx.service();
        let doc = service.compose(&letter(), &fx.clerk).unwrap();
        let id = doc.id.unwrap();

        fx.db
            .with_connection(|conn| {
                conn.execute_batch("DROP TABLE document_actions")?;
                Ok(())
            })
            .unwrap();

        assert!(service
            .transition(id, &TransitionRequest::new(WorkflowAction::Submit), &fx.clerk)
            .is_err());
        let update = DocumentUpdate {
            title: Some("Renamed".into()),
            ..Default::default()
        };
        assert!(service.update_details(id, &update, &fx.clerk).is_err());
        assert!(service.compose(&letter(), &fx.clerk).is_err());

        let stored = fx.db.documents().find_by_id(id).unwrap().unwrap();
        assert_eq!(stored.status, DocumentStatus::Incoming);
        assert_eq!(stored.title, doc.title);
        assert_eq!(stored.version, doc.version);
        assert_eq!(fx.db.documents().count(None).unwrap(), 1);

        let logs = fx.db.logs().recent_system_logs(10, Some("clerk")).unwrap();
        assert!(logs.iter().all(|l| l.action == "document.compose"));
        assert_eq!(logs.len(), 1);
    }
}
