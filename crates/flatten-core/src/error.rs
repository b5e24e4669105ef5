use overlay_core::FieldId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlattenError {
    #[error("Failed to parse PDF: {0}")]
    ParseError(String),

    #[error("Signature image of field {field} could not be decoded: {reason}")]
    SignatureImage { field: FieldId, reason: String },

    #[error("PDF operation failed: {0}")]
    OperationError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Flatten task failed: {0}")]
    TaskError(String),
}
