//! Field store backed by the overlay API over HTTP

use super::{DocumentId, FieldStore};
use crate::error::StoreError;
use crate::field::{FieldAttributes, FieldRecord, RemoteId};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use std::time::Duration;

pub struct HttpFieldStore {
    client: Client,
    base_url: String,
}

impl HttpFieldStore {
    /// `base_url` is the service root, e.g. `http://localhost:3001`
    pub fn new(base_url: impl Into<String>) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| StoreError::Network(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn fields_url(&self, document: &DocumentId) -> String {
        format!("{}/api/documents/{}/fields", self.base_url, document)
    }

    fn field_url(&self, document: &DocumentId, id: &RemoteId) -> String {
        format!("{}/{}", self.fields_url(document), id)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, StoreError> {
        request
            .send()
            .await
            .map_err(|e| StoreError::Network(e.to_string()))
    }
}

/// Turn a non-success response into a [`StoreError`]
async fn check(response: Response, id: Option<&RemoteId>) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::NOT_FOUND {
        if let Some(id) = id {
            return Err(StoreError::NotFound(id.clone()));
        }
    }
    let message = response.text().await.unwrap_or_default();
    Err(StoreError::Rejected {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl FieldStore for HttpFieldStore {
    async fn list(&self, document: &DocumentId) -> Result<Vec<FieldRecord>, StoreError> {
        let response = self.send(self.client.get(self.fields_url(document))).await?;
        check(response, None)
            .await?
            .json()
            .await
            .map_err(|e| StoreError::InvalidResponse(e.to_string()))
    }

    async fn create(
        &self,
        document: &DocumentId,
        attributes: &FieldAttributes,
    ) -> Result<RemoteId, StoreError> {
        let request = self.client.post(self.fields_url(document)).json(attributes);
        let response = check(self.send(request).await?, None).await?;
        let record: FieldRecord = response
            .json()
            .await
            .map_err(|e| StoreError::InvalidResponse(e.to_string()))?;
        Ok(record.id)
    }

    async fn update(
        &self,
        document: &DocumentId,
        id: &RemoteId,
        attributes: &FieldAttributes,
    ) -> Result<(), StoreError> {
        let request = self
            .client
            .patch(self.field_url(document, id))
            .json(attributes);
        check(self.send(request).await?, Some(id)).await?;
        Ok(())
    }

    async fn delete(&self, document: &DocumentId, id: &RemoteId) -> Result<(), StoreError> {
        let request = self.client.delete(self.field_url(document, id));
        check(self.send(request).await?, Some(id)).await?;
        Ok(())
    }
}
