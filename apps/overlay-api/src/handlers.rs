//! HTTP handlers for the overlay API

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::Utc;
use flatten_core::{flatten_async, inspect, FlattenOptions};
use overlay_core::{
    Access, Field, FieldAttributes, FieldId, FieldPatch, FieldRecord, FieldRegistry, RecipientId,
    RemoteId, ValidationError,
};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::*;
use crate::state::AppState;

type PdfResponse = (StatusCode, [(String, String); 2], Vec<u8>);

/// Health check endpoint
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "overlay-api",
    }))
}

// ------------------------------------------------------------------
// Documents
// ------------------------------------------------------------------

/// Upload a source PDF
pub async fn create_document(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateDocumentRequest>,
) -> Result<(StatusCode, Json<DocumentResponse>), ApiError> {
    let pdf_data = BASE64
        .decode(req.pdf_base64.trim())
        .map_err(|e| ApiError::InvalidRequest(format!("Invalid PDF base64: {}", e)))?;
    if pdf_data.len() > state.limits.max_pdf_bytes {
        return Err(ApiError::PayloadTooLarge(state.limits.max_pdf_bytes));
    }

    let inspected = inspect(&pdf_data)?;
    let title = req
        .title
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or(inspected.title);
    let sha256 = hex::encode(Sha256::digest(&pdf_data));
    let page_sizes_json = serde_json::to_string(&inspected.page_sizes)?;
    let id = Uuid::new_v4().to_string();
    let now = Utc::now();

    sqlx::query(
        r#"
        INSERT INTO documents (id, title, sha256, pdf_data, page_sizes_json, status, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, 'draft', ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&title)
    .bind(&sha256)
    .bind(&pdf_data)
    .bind(&page_sizes_json)
    .bind(now.to_rfc3339())
    .bind(now.to_rfc3339())
    .execute(&state.db)
    .await?;

    tracing::info!(
        "Created document {} ({} pages)",
        id,
        inspected.page_sizes.len()
    );

    Ok((
        StatusCode::CREATED,
        Json(DocumentResponse {
            id,
            title,
            sha256,
            page_count: inspected.page_sizes.len() as u32,
            page_sizes: inspected.page_sizes,
            status: DocumentStatus::Draft,
            public_token: None,
            created_at: now,
            updated_at: now,
        }),
    ))
}

pub async fn get_document(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DocumentResponse>, ApiError> {
    let doc = fetch_document(&state.db, &id).await?;
    Ok(Json(document_response(&doc)?))
}

/// The untouched source PDF
pub async fn get_document_file(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<PdfResponse, ApiError> {
    let doc = fetch_document(&state.db, &id).await?;
    let filename = format!("{}.pdf", doc.title);
    Ok(pdf_response("inline", &filename, doc.pdf_data))
}

/// The source PDF with every stored field value drawn in
pub async fn flatten_document(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<PdfResponse, ApiError> {
    let doc = fetch_document(&state.db, &id).await?;
    let records = fetch_fields(&state.db, &id).await?;
    let filename = format!("{}-completed.pdf", doc.title);
    let bytes = flatten_records(doc.pdf_data, records).await?;
    Ok(pdf_response("attachment", &filename, bytes))
}

// ------------------------------------------------------------------
// Field store
// ------------------------------------------------------------------

pub async fn list_fields(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<FieldRecord>>, ApiError> {
    fetch_document(&state.db, &id).await?;
    Ok(Json(fetch_fields(&state.db, &id).await?))
}

pub async fn create_field(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(attributes): Json<FieldAttributes>,
) -> Result<(StatusCode, Json<FieldRecord>), ApiError> {
    let doc = fetch_document(&state.db, &id).await?;
    let record = FieldRecord {
        id: RemoteId::new(Uuid::new_v4().to_string()),
        attributes: normalise(&doc, attributes)?,
    };

    sqlx::query(
        r#"
        INSERT INTO document_fields (id, document_id, recipient_id, attributes_json)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(record.id.as_str())
    .bind(&id)
    .bind(record.attributes.recipient_id.as_str())
    .bind(serde_json::to_string(&record.attributes)?)
    .execute(&state.db)
    .await?;

    tracing::debug!("Created field {} on document {}", record.id, id);
    Ok((StatusCode::CREATED, Json(record)))
}

/// Replace a field's attributes; the type cannot change
pub async fn update_field(
    State(state): State<Arc<AppState>>,
    Path((id, field_id)): Path<(String, String)>,
    Json(attributes): Json<FieldAttributes>,
) -> Result<Json<FieldRecord>, ApiError> {
    let doc = fetch_document(&state.db, &id).await?;
    let existing = fetch_field(&state.db, &id, &field_id).await?;
    if existing.attributes.field_type != attributes.field_type {
        return Err(ValidationError::ImmutableType {
            current: existing.attributes.field_type,
            requested: attributes.field_type,
        }
        .into());
    }

    let record = FieldRecord {
        id: existing.id,
        attributes: normalise(&doc, attributes)?,
    };
    store_field(&state.db, &id, &record).await?;

    tracing::debug!("Updated field {} on document {}", record.id, id);
    Ok(Json(record))
}

pub async fn delete_field(
    State(state): State<Arc<AppState>>,
    Path((id, field_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let result = sqlx::query("DELETE FROM document_fields WHERE document_id = ? AND id = ?")
        .bind(&id)
        .bind(&field_id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound(format!("Field {}", field_id)));
    }

    tracing::debug!("Deleted field {} on document {}", field_id, id);
    Ok(StatusCode::NO_CONTENT)
}

// ------------------------------------------------------------------
// Signing sessions
// ------------------------------------------------------------------

/// Invite one recipient to fill their fields
pub async fn create_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<SessionResponse>), ApiError> {
    let doc = fetch_document(&state.db, &id).await?;
    let hours = req
        .expires_in_hours
        .unwrap_or(state.limits.session_ttl_hours);
    if hours <= 0 {
        return Err(ApiError::InvalidRequest(
            "expiresInHours must be positive".to_string(),
        ));
    }

    let token = Uuid::new_v4().to_string();
    let now = Utc::now();
    let expires_at = now + chrono::Duration::hours(hours);

    sqlx::query(
        r#"
        INSERT INTO signing_sessions (token, document_id, recipient_id, status, created_at, expires_at)
        VALUES (?, ?, ?, 'pending', ?, ?)
        "#,
    )
    .bind(&token)
    .bind(&id)
    .bind(req.recipient_id.as_str())
    .bind(now.to_rfc3339())
    .bind(expires_at.to_rfc3339())
    .execute(&state.db)
    .await?;

    sqlx::query("UPDATE documents SET status = 'sent', updated_at = ? WHERE id = ? AND status = 'draft'")
        .bind(now.to_rfc3339())
        .bind(&id)
        .execute(&state.db)
        .await?;

    tracing::info!(
        "Created signing session for recipient {} on document {}",
        req.recipient_id,
        id
    );

    let session = DbSession {
        token,
        document_id: id,
        recipient_id: req.recipient_id.to_string(),
        status: SessionStatus::Pending.to_string(),
        created_at: now,
        expires_at,
        completed_at: None,
    };
    Ok((StatusCode::CREATED, Json(session_response(&doc, session)?)))
}

pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<Json<SessionResponse>, ApiError> {
    let session = fetch_session(&state.db, &token).await?;
    ensure_not_expired(&session)?;
    let doc = fetch_document(&state.db, &session.document_id).await?;
    Ok(Json(session_response(&doc, session)?))
}

/// Fields assigned to the session's recipient
pub async fn session_fields(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<Json<Vec<FieldRecord>>, ApiError> {
    let session = fetch_session(&state.db, &token).await?;
    ensure_not_expired(&session)?;
    let records = fetch_fields(&state.db, &session.document_id)
        .await?
        .into_iter()
        .filter(|r| r.attributes.recipient_id.as_str() == session.recipient_id)
        .collect();
    Ok(Json(records))
}

/// Enter a value or signature into one of the recipient's own fields
pub async fn fill_session_field(
    State(state): State<Arc<AppState>>,
    Path((token, field_id)): Path<(String, String)>,
    Json(req): Json<FillFieldRequest>,
) -> Result<Json<FieldRecord>, ApiError> {
    let session = fetch_session(&state.db, &token).await?;
    ensure_open(&session)?;
    let doc = fetch_document(&state.db, &session.document_id).await?;
    let access = Access::Recipient(RecipientId::new(session.recipient_id.clone()));
    let mut registry = load_registry(&state.db, &doc, access).await?;

    let id = FieldId::Remote(RemoteId::new(field_id.clone()));
    if registry.get(&id).is_none() {
        return Err(ApiError::NotFound(format!("Field {}", field_id)));
    }
    match (req.value, req.signature_data) {
        (Some(value), None) => registry.set_value(&id, Some(value))?,
        (None, Some(signature)) => registry.set_signature(&id, Some(signature))?,
        _ => {
            return Err(ApiError::InvalidRequest(
                "Provide exactly one of value or signatureData".to_string(),
            ))
        }
    }

    let record = registry
        .get(&id)
        .and_then(record_of)
        .ok_or_else(|| ApiError::NotFound(format!("Field {}", field_id)))?;
    store_field(&state.db, &doc.id, &record).await?;

    tracing::debug!("Recipient {} filled field {}", session.recipient_id, field_id);
    Ok(Json(record))
}

/// Finish signing; every required field of the recipient must be filled
pub async fn complete_session(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<Json<SessionResponse>, ApiError> {
    let session = fetch_session(&state.db, &token).await?;
    ensure_open(&session)?;
    let doc = fetch_document(&state.db, &session.document_id).await?;
    let recipient = RecipientId::new(session.recipient_id.clone());
    let registry = load_registry(&state.db, &doc, Access::Recipient(recipient.clone())).await?;

    let missing = registry.missing_required(&recipient).len();
    if missing > 0 {
        return Err(ApiError::InvalidRequest(format!(
            "{} required field(s) are still empty",
            missing
        )));
    }

    let now = Utc::now();
    let result = sqlx::query(
        "UPDATE signing_sessions SET status = 'completed', completed_at = ? WHERE token = ? AND status = 'pending'",
    )
    .bind(now.to_rfc3339())
    .bind(&token)
    .execute(&state.db)
    .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::AlreadyCompleted);
    }

    let outstanding: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM signing_sessions WHERE document_id = ? AND status != 'completed'",
    )
    .bind(&doc.id)
    .fetch_one(&state.db)
    .await?;
    if outstanding == 0 {
        sqlx::query("UPDATE documents SET status = 'completed', updated_at = ? WHERE id = ?")
            .bind(now.to_rfc3339())
            .bind(&doc.id)
            .execute(&state.db)
            .await?;
        tracing::info!("Document {} completed", doc.id);
    }

    tracing::info!("Session completed for recipient {}", recipient);
    let session = fetch_session(&state.db, &token).await?;
    Ok(Json(session_response(&doc, session)?))
}

// ------------------------------------------------------------------
// Public forms
// ------------------------------------------------------------------

/// Give the document a public form link; publishing twice keeps the token
pub async fn publish_document(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<PublishResponse>, ApiError> {
    let doc = fetch_document(&state.db, &id).await?;
    let public_token = match doc.public_token {
        Some(token) => token,
        None => {
            let token = Uuid::new_v4().to_string();
            sqlx::query("UPDATE documents SET public_token = ?, updated_at = ? WHERE id = ?")
                .bind(&token)
                .bind(Utc::now().to_rfc3339())
                .bind(&id)
                .execute(&state.db)
                .await?;
            tracing::info!("Published document {}", id);
            token
        }
    };
    Ok(Json(PublishResponse { public_token }))
}

pub async fn get_public_form(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<Json<PublicFormResponse>, ApiError> {
    let doc = fetch_public_document(&state.db, &token).await?;
    Ok(Json(PublicFormResponse {
        page_sizes: doc.page_sizes()?,
        document_id: doc.id,
        title: doc.title,
    }))
}

pub async fn public_form_fields(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<Json<Vec<FieldRecord>>, ApiError> {
    let doc = fetch_public_document(&state.db, &token).await?;
    Ok(Json(fetch_fields(&state.db, &doc.id).await?))
}

/// Record one filled-in copy of a public form
pub async fn submit_public_form(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    Json(req): Json<SubmitFormRequest>,
) -> Result<(StatusCode, Json<SubmissionResponse>), ApiError> {
    let doc = fetch_public_document(&state.db, &token).await?;
    let submitter_name = req.submitter_name.trim().to_string();
    if submitter_name.is_empty() {
        return Err(ApiError::InvalidRequest(
            "submitterName is required".to_string(),
        ));
    }

    let mut registry = load_registry(&state.db, &doc, Access::Editor).await?;
    for (field_id, value) in req.values {
        let id = known_field(&registry, field_id)?;
        registry.set_value(&id, Some(value))?;
    }
    for (field_id, signature) in req.signatures {
        let id = known_field(&registry, field_id)?;
        registry.set_signature(&id, Some(signature))?;
    }

    let missing = registry
        .fields()
        .iter()
        .filter(|f| f.required && !f.is_filled())
        .count();
    if missing > 0 {
        return Err(ApiError::InvalidRequest(format!(
            "{} required field(s) are still empty",
            missing
        )));
    }

    let records: Vec<FieldRecord> = registry.fields().iter().filter_map(record_of).collect();
    let row = DbSubmission {
        id: Uuid::new_v4().to_string(),
        document_id: doc.id.clone(),
        submitter_name,
        submitter_email: req.submitter_email,
        fields_json: serde_json::to_string(&records)?,
        created_at: Utc::now(),
    };

    sqlx::query(
        r#"
        INSERT INTO form_submissions (id, document_id, submitter_name, submitter_email, fields_json, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&row.id)
    .bind(&row.document_id)
    .bind(&row.submitter_name)
    .bind(&row.submitter_email)
    .bind(&row.fields_json)
    .bind(row.created_at.to_rfc3339())
    .execute(&state.db)
    .await?;

    tracing::info!("Recorded submission {} for document {}", row.id, doc.id);
    Ok((
        StatusCode::CREATED,
        Json(SubmissionResponse::from_row(row, &records)),
    ))
}

pub async fn list_submissions(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<SubmissionResponse>>, ApiError> {
    fetch_document(&state.db, &id).await?;
    let rows: Vec<DbSubmission> = sqlx::query_as(
        r#"
        SELECT id, document_id, submitter_name, submitter_email, fields_json, created_at
        FROM form_submissions
        WHERE document_id = ?
        ORDER BY created_at
        "#,
    )
    .bind(&id)
    .fetch_all(&state.db)
    .await?;

    let mut submissions = Vec::with_capacity(rows.len());
    for row in rows {
        let records: Vec<FieldRecord> = serde_json::from_str(&row.fields_json)?;
        submissions.push(SubmissionResponse::from_row(row, &records));
    }
    Ok(Json(submissions))
}

/// The source PDF flattened with one submission's values
pub async fn submission_pdf(
    State(state): State<Arc<AppState>>,
    Path((id, submission_id)): Path<(String, String)>,
) -> Result<PdfResponse, ApiError> {
    let doc = fetch_document(&state.db, &id).await?;
    let row: Option<DbSubmission> = sqlx::query_as(
        r#"
        SELECT id, document_id, submitter_name, submitter_email, fields_json, created_at
        FROM form_submissions
        WHERE id = ? AND document_id = ?
        "#,
    )
    .bind(&submission_id)
    .bind(&id)
    .fetch_optional(&state.db)
    .await?;
    let row = row.ok_or_else(|| ApiError::NotFound(format!("Submission {}", submission_id)))?;

    let records: Vec<FieldRecord> = serde_json::from_str(&row.fields_json)?;
    let filename = format!("{}-{}.pdf", doc.title, row.submitter_name);
    let bytes = flatten_records(doc.pdf_data, records).await?;
    Ok(pdf_response("attachment", &filename, bytes))
}

// ------------------------------------------------------------------
// Helpers
// ------------------------------------------------------------------

async fn fetch_document(db: &SqlitePool, id: &str) -> Result<DbDocument, ApiError> {
    let doc: Option<DbDocument> = sqlx::query_as(
        r#"
        SELECT id, title, sha256, pdf_data, page_sizes_json, status, public_token, created_at, updated_at
        FROM documents
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(db)
    .await?;

    doc.ok_or_else(|| ApiError::NotFound(format!("Document {}", id)))
}

async fn fetch_public_document(db: &SqlitePool, token: &str) -> Result<DbDocument, ApiError> {
    let doc: Option<DbDocument> = sqlx::query_as(
        r#"
        SELECT id, title, sha256, pdf_data, page_sizes_json, status, public_token, created_at, updated_at
        FROM documents
        WHERE public_token = ?
        "#,
    )
    .bind(token)
    .fetch_optional(db)
    .await?;

    doc.ok_or_else(|| ApiError::NotFound("Form".to_string()))
}

fn document_response(doc: &DbDocument) -> Result<DocumentResponse, ApiError> {
    let page_sizes = doc.page_sizes()?;
    Ok(DocumentResponse {
        id: doc.id.clone(),
        title: doc.title.clone(),
        sha256: doc.sha256.clone(),
        page_count: page_sizes.len() as u32,
        page_sizes,
        status: DocumentStatus::parse(&doc.status),
        public_token: doc.public_token.clone(),
        created_at: doc.created_at,
        updated_at: doc.updated_at,
    })
}

async fn fetch_fields(db: &SqlitePool, document_id: &str) -> Result<Vec<FieldRecord>, ApiError> {
    let rows: Vec<DbField> = sqlx::query_as(
        "SELECT id, attributes_json FROM document_fields WHERE document_id = ? ORDER BY seq",
    )
    .bind(document_id)
    .fetch_all(db)
    .await?;

    rows.into_iter().map(record_from_row).collect()
}

async fn fetch_field(
    db: &SqlitePool,
    document_id: &str,
    field_id: &str,
) -> Result<FieldRecord, ApiError> {
    let row: Option<DbField> = sqlx::query_as(
        "SELECT id, attributes_json FROM document_fields WHERE document_id = ? AND id = ?",
    )
    .bind(document_id)
    .bind(field_id)
    .fetch_optional(db)
    .await?;

    let row = row.ok_or_else(|| ApiError::NotFound(format!("Field {}", field_id)))?;
    record_from_row(row)
}

fn record_from_row(row: DbField) -> Result<FieldRecord, ApiError> {
    Ok(FieldRecord {
        id: RemoteId::new(row.id),
        attributes: serde_json::from_str(&row.attributes_json)?,
    })
}

async fn store_field(
    db: &SqlitePool,
    document_id: &str,
    record: &FieldRecord,
) -> Result<(), ApiError> {
    sqlx::query(
        "UPDATE document_fields SET recipient_id = ?, attributes_json = ? WHERE document_id = ? AND id = ?",
    )
    .bind(record.attributes.recipient_id.as_str())
    .bind(serde_json::to_string(&record.attributes)?)
    .bind(document_id)
    .bind(record.id.as_str())
    .execute(db)
    .await?;
    Ok(())
}

/// The document's stored fields behind the registry's validation
async fn load_registry(
    db: &SqlitePool,
    doc: &DbDocument,
    access: Access,
) -> Result<FieldRegistry, ApiError> {
    let mut registry = FieldRegistry::new(doc.reference()?).with_access(access);
    registry.load_records(fetch_fields(db, &doc.id).await?);
    Ok(registry)
}

/// Run incoming attributes through the registry so the store only ever holds
/// in-range pages, clamped geometry and type-consistent values
fn normalise(doc: &DbDocument, attributes: FieldAttributes) -> Result<FieldAttributes, ApiError> {
    let mut registry = FieldRegistry::new(doc.reference()?);
    let field = registry.add(
        attributes.field_type,
        attributes.page,
        attributes.position,
        attributes.recipient_id,
    )?;
    let patch = FieldPatch {
        size: Some(attributes.size),
        value: Some(attributes.value),
        signature_data: Some(attributes.signature_data),
        label: Some(attributes.label),
        required: Some(attributes.required),
        options: Some(attributes.options),
        ..FieldPatch::default()
    };
    registry.update(&field.id, patch)?;
    registry
        .get(&field.id)
        .map(Field::attributes)
        .ok_or_else(|| ValidationError::UnknownField(field.id.clone()).into())
}

fn known_field(registry: &FieldRegistry, field_id: String) -> Result<FieldId, ApiError> {
    let id = FieldId::Remote(RemoteId::new(field_id));
    match registry.get(&id) {
        Some(_) => Ok(id),
        None => Err(ValidationError::UnknownField(id).into()),
    }
}

fn record_of(field: &Field) -> Option<FieldRecord> {
    Some(FieldRecord {
        id: field.id.as_remote()?.clone(),
        attributes: field.attributes(),
    })
}

async fn fetch_session(db: &SqlitePool, token: &str) -> Result<DbSession, ApiError> {
    let session: Option<DbSession> = sqlx::query_as(
        r#"
        SELECT token, document_id, recipient_id, status, created_at, expires_at, completed_at
        FROM signing_sessions
        WHERE token = ?
        "#,
    )
    .bind(token)
    .fetch_optional(db)
    .await?;

    session.ok_or_else(|| ApiError::NotFound("Session".to_string()))
}

/// A pending session past its expiry is gone; completed sessions stay readable
fn ensure_not_expired(session: &DbSession) -> Result<(), ApiError> {
    if SessionStatus::parse(&session.status) == SessionStatus::Pending
        && session.expires_at < Utc::now()
    {
        return Err(ApiError::SessionExpired);
    }
    Ok(())
}

/// The session still accepts input
fn ensure_open(session: &DbSession) -> Result<(), ApiError> {
    if SessionStatus::parse(&session.status) == SessionStatus::Completed {
        return Err(ApiError::AlreadyCompleted);
    }
    ensure_not_expired(session)
}

fn session_response(doc: &DbDocument, session: DbSession) -> Result<SessionResponse, ApiError> {
    Ok(SessionResponse {
        status: SessionStatus::parse(&session.status),
        token: session.token,
        document_id: session.document_id,
        document_title: doc.title.clone(),
        page_sizes: doc.page_sizes()?,
        recipient_id: RecipientId::new(session.recipient_id),
        created_at: session.created_at,
        expires_at: session.expires_at,
        completed_at: session.completed_at,
    })
}

async fn flatten_records(pdf: Vec<u8>, records: Vec<FieldRecord>) -> Result<Vec<u8>, ApiError> {
    let fields = records.into_iter().map(Field::from_record).collect();
    Ok(flatten_async(pdf, fields, FlattenOptions::default()).await?)
}

fn pdf_response(disposition: &str, filename: &str, bytes: Vec<u8>) -> PdfResponse {
    let filename: String = filename
        .chars()
        .filter(|c| !matches!(c, '"' | '\\' | '\r' | '\n'))
        .collect();
    (
        StatusCode::OK,
        [
            ("Content-Type".to_string(), "application/pdf".to_string()),
            (
                "Content-Disposition".to_string(),
                format!("{}; filename=\"{}\"", disposition, filename),
            ),
        ],
        bytes,
    )
}
