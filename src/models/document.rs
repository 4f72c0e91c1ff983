use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::utils::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Priority {
    #[default]
    Normal,
    Priority,
    Urgent,
}

impl Priority {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "normal" => Some(Self::Normal),
            "priority" | "high" => Some(Self::Priority),
            "urgent" => Some(Self::Urgent),
            _ => None,
        }
    }

    pub fn all() -> &'static [Priority] {
        &[Self::Normal, Self::Priority, Self::Urgent]
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => write!(f, "Normal"),
            Self::Priority => write!(f, "Priority"),
            Self::Urgent => write!(f, "Urgent"),
        }
    }
}

/// Status of a document in the correspondence workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DocumentStatus {
    #[default]
    Incoming,
    Pending,
    Approved,
    Rejected,
    Received,
    Outgoing,
    Sent,
    Ended,
}

/// Step a user takes on a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowAction {
    /// Hand the document to the registry for approval
    Submit,
    Approve,
    Reject,
    Receive,
    Dispatch,
    Send,
    End,
}

impl WorkflowAction {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Submit => "submit",
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::Receive => "receive",
            Self::Dispatch => "dispatch",
            Self::Send => "send",
            Self::End => "end",
        }
    }

    /// Registry decisions need the approval permission
    pub fn is_registry_decision(&self) -> bool {
        matches!(self, Self::Approve | Self::Reject)
    }
}

impl DocumentStatus {
    pub fn all() -> &'static [DocumentStatus] {
        &[
            Self::Incoming,
            Self::Pending,
            Self::Approved,
            Self::Rejected,
            Self::Received,
            Self::Outgoing,
            Self::Sent,
            Self::Ended,
        ]
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ended)
    }

    /// Transition table. `None` means the action is not allowed from this status.
    pub fn apply(&self, action: WorkflowAction) -> Option<DocumentStatus> {
        use DocumentStatus::*;
        use WorkflowAction::*;

        match (self, action) {
            (Incoming, Submit) => Some(Pending),
            (Incoming, Receive) => Some(Received),
            (Incoming, End) => Some(Ended),

            (Pending, Approve) => Some(Approved),
            (Pending, Reject) => Some(Rejected),

            (Approved, Receive) => Some(Received),

            (Rejected, Submit) => Some(Pending),
            (Rejected, End) => Some(Ended),

            (Received, Submit) => Some(Pending),
            (Received, Dispatch) => Some(Outgoing),
            (Received, End) => Some(Ended),

            (Outgoing, Send) => Some(Sent),

            (Sent, End) => Some(Ended),

            _ => None,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "incoming" => Some(Self::Incoming),
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "received" => Some(Self::Received),
            "outgoing" => Some(Self::Outgoing),
            "sent" => Some(Self::Sent),
            "ended" => Some(Self::Ended),
            _ => None,
        }
    }

    /// Parse free-text statuses such as `"Approved - Forwarded to Finance"`.
    pub fn parse_legacy(s: &str) -> Option<(Self, Option<String>)> {
        if let Some(status) = Self::parse(s) {
            return Some((status, None));
        }

        let (head, tail) = s.split_once('-')?;
        let status = Self::parse(head)?;
        let tail = tail.trim();
        let lower = tail.to_lowercase();
        let target = lower
            .strip_prefix("forwarded to")
            .map(|_| tail["forwarded to".len()..].trim().to_string())
            .filter(|t| !t.is_empty());

        Some((status, target))
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Incoming => "Incoming",
            Self::Pending => "Pending",
            Self::Approved => "Approved",
            Self::Rejected => "Rejected",
            Self::Received => "Received",
            Self::Outgoing => "Outgoing",
            Self::Sent => "Sent",
            Self::Ended => "Ended",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: Option<i64>,
    pub tracking_code: String,
    pub title: String,
    pub sender: String,
    pub recipient: String,
    pub details: Option<String>,
    pub required_action: Option<String>,
    pub date_of_letter: Option<NaiveDate>,
    pub date_received: Option<NaiveDate>,
    pub priority: Priority,
    pub status: DocumentStatus,
    pub forwarded_to: Option<String>,
    pub current_holder: Option<String>,
    pub processed_by: Option<i64>,
    pub version: i64,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

impl Document {
    pub fn new(tracking_code: String, title: String, sender: String, recipient: String) -> Self {
        Self {
            id: None,
            tracking_code,
            title,
            sender,
            recipient,
            details: None,
            required_action: None,
            date_of_letter: None,
            date_received: None,
            priority: Priority::default(),
            status: DocumentStatus::default(),
            forwarded_to: None,
            current_holder: None,
            processed_by: None,
            version: 1,
            created_at: None,
            updated_at: None,
        }
    }

    /// Status as shown to users, including the forwarding target
    pub fn status_label(&self) -> String {
        match (&self.status, &self.forwarded_to) {
            (DocumentStatus::Approved, Some(target)) => format!("Approved - Forwarded to {}", target),
            (status, _) => status.to_string(),
        }
    }

    /// Whether `username`/`user_id` holds or processed this document
    pub fn is_handled_by(&self, user_id: i64, username: &str) -> bool {
        self.processed_by == Some(user_id)
            || self
                .current_holder
                .as_deref()
                .is_some_and(|h| h.eq_ignore_ascii_case(username))
    }
}

/// Input when composing a new document
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewDocument {
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
    pub priority: Option<String>,
    /// `Incoming` (default) or `Outgoing`
    #[serde(default)]
    pub status: Option<String>,
}

impl NewDocument {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.title.trim().is_empty() {
            return Err(AppError::validation("Title is required"));
        }
        if self.sender.trim().is_empty() {
            return Err(AppError::validation("Sender is required"));
        }
        if self.recipient.trim().is_empty() {
            return Err(AppError::validation("Recipient is required"));
        }
        self.initial_status()?;
        self.priority()?;
        Ok(())
    }

    pub fn initial_status(&self) -> Result<DocumentStatus, AppError> {
        match self.status.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            None => Ok(DocumentStatus::Incoming),
            Some(s) => match DocumentStatus::parse(s) {
                Some(status @ (DocumentStatus::Incoming | DocumentStatus::Outgoing)) => Ok(status),
                _ => Err(AppError::validation(
                    "New documents must be Incoming or Outgoing",
                )),
            },
        }
    }

    pub fn priority(&self) -> Result<Priority, AppError> {
        match self.priority.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            None => Ok(Priority::Normal),
            Some(s) => Priority::parse(s)
                .ok_or_else(|| AppError::validation(format!("Unknown priority: {}", s))),
        }
    }
}

/// Editable document details, guarded by the version the client last saw
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DocumentUpdate {
    pub title: Option<String>,
    pub sender: Option<String>,
    pub recipient: Option<String>,
    pub details: Option<String>,
    pub required_action: Option<String>,
    pub date_of_letter: Option<String>,
    pub priority: Option<String>,
    pub expected_version: Option<i64>,
}

/// Search filter for document lists
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DocumentFilter {
    /// Free text over code, title, sender and recipient
    #[serde(default, rename = "q")]
    pub query: String,
    pub status: Option<DocumentStatus>,
    pub priority: Option<Priority>,
    pub holder: Option<String>,
    /// Restrict to documents held or processed by this user (id, username)
    #[serde(skip)]
    pub visible_to: Option<(i64, String)>,
    pub received_after: Option<NaiveDate>,
    pub received_before: Option<NaiveDate>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}
