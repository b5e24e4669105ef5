//! Data models for the overlay API

use chrono::{DateTime, Utc};
use overlay_core::{DocumentRef, FieldRecord, RecipientId, SignatureImage, Size};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Draft,
    Sent,
    Completed,
}

impl DocumentStatus {
    pub fn parse(s: &str) -> Self {
        match s {
            "sent" => DocumentStatus::Sent,
            "completed" => DocumentStatus::Completed,
            _ => DocumentStatus::Draft,
        }
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentStatus::Draft => write!(f, "draft"),
            DocumentStatus::Sent => write!(f, "sent"),
            DocumentStatus::Completed => write!(f, "completed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Pending,
    Completed,
}

impl SessionStatus {
    pub fn parse(s: &str) -> Self {
        match s {
            "completed" => SessionStatus::Completed,
            _ => SessionStatus::Pending,
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Pending => write!(f, "pending"),
            SessionStatus::Completed => write!(f, "completed"),
        }
    }
}

/// Document stored in database
#[derive(Debug, Clone, FromRow)]
pub struct DbDocument {
    pub id: String,
    pub title: String,
    pub sha256: String,
    pub pdf_data: Vec<u8>,
    pub page_sizes_json: String,
    pub status: String,
    pub public_token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DbDocument {
    pub fn page_sizes(&self) -> Result<Vec<Size>, serde_json::Error> {
        serde_json::from_str(&self.page_sizes_json)
    }

    pub fn reference(&self) -> Result<DocumentRef, serde_json::Error> {
        Ok(DocumentRef::new(self.title.clone(), self.page_sizes()?)
            .with_source_url(format!("/api/documents/{}/file", self.id)))
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbField {
    pub id: String,
    pub attributes_json: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct DbSession {
    pub token: String,
    pub document_id: String,
    pub recipient_id: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, FromRow)]
pub struct DbSubmission {
    pub id: String,
    pub document_id: String,
    pub submitter_name: String,
    pub submitter_email: Option<String>,
    pub fields_json: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDocumentRequest {
    /// Defaults to the PDF's own title
    #[serde(default)]
    pub title: Option<String>,
    pub pdf_base64: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentResponse {
    pub id: String,
    pub title: String,
    pub sha256: String,
    pub page_count: u32,
    pub page_sizes: Vec<Size>,
    pub status: DocumentStatus,
    pub public_token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub recipient_id: RecipientId,
    #[serde(default)]
    pub expires_in_hours: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub token: String,
    pub document_id: String,
    pub document_title: String,
    pub page_sizes: Vec<Size>,
    pub recipient_id: RecipientId,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Value or signature entered by a signer; exactly one must be set
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FillFieldRequest {
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub signature_data: Option<SignatureImage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishResponse {
    pub public_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicFormResponse {
    pub document_id: String,
    pub title: String,
    pub page_sizes: Vec<Size>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitFormRequest {
    pub submitter_name: String,
    #[serde(default)]
    pub submitter_email: Option<String>,
    /// Field id to value
    #[serde(default)]
    pub values: BTreeMap<String, String>,
    /// Field id to signature image
    #[serde(default)]
    pub signatures: BTreeMap<String, SignatureImage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionResponse {
    pub id: String,
    pub document_id: String,
    pub submitter_name: String,
    pub submitter_email: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Field id to entered value; signatures are only in the PDF
    pub values: BTreeMap<String, String>,
}

impl SubmissionResponse {
    pub fn from_row(row: DbSubmission, fields: &[FieldRecord]) -> Self {
        let values = fields
            .iter()
            .filter_map(|f| {
                f.attributes
                    .value
                    .as_ref()
                    .map(|v| (f.id.to_string(), v.clone()))
            })
            .collect();
        Self {
            id: row.id,
            document_id: row.document_id,
            submitter_name: row.submitter_name,
            submitter_email: row.submitter_email,
            created_at: row.created_at,
            values,
        }
    }
}
