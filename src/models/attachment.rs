use serde::{Deserialize, Serialize};

use crate::services::uploads::format_file_size;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentAttachment {
    pub id: Option<i64>,
    pub document_id: i64,
    pub original_filename: String,
    /// Name on disk inside the upload directory
    pub stored_filename: String,
    pub file_size: i64,
    pub content_type: Option<String>,
    pub uploaded_by: Option<i64>,
    pub uploaded_at: Option<String>,
}

impl DocumentAttachment {
    pub fn file_size_display(&self) -> String {
        format_file_size(self.file_size.max(0) as u64)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentComment {
    pub id: Option<i64>,
    pub document_id: i64,
    pub user_id: Option<i64>,
    pub author: String,
    pub body: String,
    pub created_at: Option<String>,
}
