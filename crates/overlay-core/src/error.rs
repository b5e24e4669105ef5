use crate::field::{FieldId, FieldType, RecipientId, RemoteId};
use thiserror::Error;

/// A registry mutation was rejected; the registry is unchanged
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Page {page} is out of range (document has {page_count} pages)")]
    PageOutOfRange { page: u32, page_count: u32 },

    #[error("Field not found: {0}")]
    UnknownField(FieldId),

    #[error("Field type is immutable ({current} -> {requested})")]
    ImmutableType {
        current: FieldType,
        requested: FieldType,
    },

    #[error("Unknown recipient: {0}")]
    UnknownRecipient(RecipientId),

    #[error("Field belongs to recipient {owner}, not {actor}")]
    RecipientMismatch {
        owner: RecipientId,
        actor: RecipientId,
    },

    #[error("{0} fields take signature data, not a value")]
    ValueNotAllowed(FieldType),

    #[error("{0} fields take a value, not signature data")]
    SignatureNotAllowed(FieldType),

    #[error("'{value}' is not one of the dropdown options")]
    InvalidOption { value: String },
}

/// A remote field store operation failed
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Remote field not found: {0}")]
    NotFound(RemoteId),

    #[error("Store rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Invalid store response: {0}")]
    InvalidResponse(String),
}

impl StoreError {
    /// Whether repeating the same request may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::Network(_) => true,
            StoreError::Rejected { status, .. } => *status >= 500 || *status == 429,
            StoreError::NotFound(_) | StoreError::InvalidResponse(_) => false,
        }
    }
}
