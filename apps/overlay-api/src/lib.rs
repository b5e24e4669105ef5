//! Overlay API - backend for PDF field overlays
//!
//! Provides REST endpoints for:
//! - Document upload and flattening
//! - The field store the editor reconciles against
//! - Per-recipient signing sessions
//! - Public forms and their submissions

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, patch, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod state;

pub use config::Config;
pub use error::ApiError;
pub use state::AppState;

/// JSON bodies carry the PDF base64-encoded
const BODY_OVERHEAD: usize = 64 * 1024;

pub fn router(state: Arc<AppState>) -> Router {
    let body_limit = state.limits.max_pdf_bytes.div_ceil(3) * 4 + BODY_OVERHEAD;

    // CORS configuration for web clients
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health check
        .route("/health", get(handlers::health))
        // Documents
        .route("/api/documents", post(handlers::create_document))
        .route("/api/documents/:id", get(handlers::get_document))
        .route("/api/documents/:id/file", get(handlers::get_document_file))
        .route("/api/documents/:id/flatten", get(handlers::flatten_document))
        // Field store
        .route(
            "/api/documents/:id/fields",
            get(handlers::list_fields).post(handlers::create_field),
        )
        .route(
            "/api/documents/:id/fields/:field_id",
            patch(handlers::update_field).delete(handlers::delete_field),
        )
        // Signing sessions
        .route("/api/documents/:id/sessions", post(handlers::create_session))
        .route("/api/sessions/:token", get(handlers::get_session))
        .route("/api/sessions/:token/fields", get(handlers::session_fields))
        .route(
            "/api/sessions/:token/fields/:field_id",
            patch(handlers::fill_session_field),
        )
        .route(
            "/api/sessions/:token/complete",
            post(handlers::complete_session),
        )
        // Public forms
        .route(
            "/api/documents/:id/publish",
            post(handlers::publish_document),
        )
        .route("/api/public-forms/:token", get(handlers::get_public_form))
        .route("/api/public-forms/:token/fields", get(handlers::public_form_fields))
        .route(
            "/api/public-forms/:token/submit",
            post(handlers::submit_public_form),
        )
        .route(
            "/api/documents/:id/submissions",
            get(handlers::list_submissions),
        )
        .route(
            "/api/documents/:id/submissions/:submission_id/pdf",
            get(handlers::submission_pdf),
        )
        // Add middleware
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
