//! Shared helpers for the overlay-api integration tests

#![allow(dead_code)]

use axum_test::TestServer;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use lopdf::{dictionary, Document, Object, StringFormat};
use overlay_api::config::LimitsConfig;
use overlay_api::{router, AppState};
use serde_json::{json, Value};
use std::sync::Arc;

pub async fn state_with(limits: LimitsConfig) -> Arc<AppState> {
    Arc::new(AppState::in_memory(limits).await.unwrap())
}

pub async fn create_test_server() -> TestServer {
    let state = state_with(LimitsConfig::default()).await;
    TestServer::new(router(state)).unwrap()
}

/// Blank PDF with one page per entry in `sizes` and an Info title
pub fn sample_pdf(title: &str, sizes: &[(i64, i64)]) -> Vec<u8> {
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();

    let kids: Vec<Object> = sizes
        .iter()
        .map(|&(width, height)| {
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Integer(width),
                    Object::Integer(height),
                ],
            });
            Object::Reference(page_id)
        })
        .collect();

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => sizes.len() as i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    let info_id = doc.add_object(dictionary! {
        "Title" => Object::String(title.as_bytes().to_vec(), StringFormat::Literal),
    });
    doc.trailer.set("Root", catalog_id);
    doc.trailer.set("Info", info_id);

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).unwrap();
    buffer
}

/// Upload a two-page letter document and return its id
pub async fn upload_document(server: &TestServer) -> String {
    let pdf = sample_pdf("Lease Agreement", &[(612, 792), (612, 792)]);
    let response = server
        .post("/api/documents")
        .json(&json!({ "pdfBase64": BASE64.encode(pdf) }))
        .await;
    response.assert_status(axum::http::StatusCode::CREATED);
    response.json::<Value>()["id"].as_str().unwrap().to_string()
}

/// Store one field and return its id
pub async fn create_field(server: &TestServer, document_id: &str, field: Value) -> String {
    let response = server
        .post(&format!("/api/documents/{}/fields", document_id))
        .json(&field)
        .await;
    response.assert_status(axum::http::StatusCode::CREATED);
    response.json::<Value>()["id"].as_str().unwrap().to_string()
}

pub fn text_field(page: u32, recipient: &str) -> Value {
    json!({
        "type": "text",
        "page": page,
        "x": 100.0,
        "y": 150.0,
        "width": 150.0,
        "height": 30.0,
        "recipientId": recipient,
    })
}
