use serde::{Deserialize, Serialize};
use std::fmt;

/// Append-only audit row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemLog {
    pub id: Option<i64>,
    pub timestamp: String,
    pub actor: String,
    pub action: String,
    pub details: Option<String>,
}

/// One step in a document's history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentAction {
    pub id: Option<i64>,
    pub document_id: i64,
    pub user_id: Option<i64>,
    pub actor: String,
    pub action: String,
    pub from_status: Option<String>,
    pub to_status: Option<String>,
    pub notes: Option<String>,
    pub timestamp: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoginEvent {
    Login,
    Logout,
    Failed,
}

impl LoginEvent {
    pub fn from_db_str(s: &str) -> Self {
        match s {
            "login" => Self::Login,
            "logout" => Self::Logout,
            _ => Self::Failed,
        }
    }
}

impl fmt::Display for LoginEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Login => write!(f, "login"),
            Self::Logout => write!(f, "logout"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginActivity {
    pub id: Option<i64>,
    pub user_id: Option<i64>,
    pub username: String,
    pub event: LoginEvent,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub timestamp: String,
}

/// Where a login request came from
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}
