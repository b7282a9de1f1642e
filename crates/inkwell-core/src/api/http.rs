//! REST implementation of the document API

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::{DocumentApi, DocumentUpdate, PropertyDefinition, PropertyValue, SnapshotPayload};
use crate::error::{CollabError, CollabResult};
use crate::ids::{DocumentId, WorkspaceId};

/// Document API over HTTP/JSON
#[derive(Debug, Clone)]
pub struct HttpDocumentApi {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpDocumentApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
        }
    }

    /// Authenticate requests with a bearer token
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    fn document_url(&self, id: &DocumentId) -> String {
        format!("{}/documents/{}", self.base_url, id)
    }

    fn versions_url(&self, workspace_id: &WorkspaceId, id: &DocumentId) -> String {
        format!(
            "{}/workspaces/{}/documents/{}/versions",
            self.base_url, workspace_id, id
        )
    }

    fn properties_url(&self, workspace_id: &WorkspaceId, id: &DocumentId) -> String {
        format!(
            "{}/workspaces/{}/documents/{}/properties",
            self.base_url, workspace_id, id
        )
    }

    fn property_values_url(&self, id: &DocumentId) -> String {
        format!("{}/documents/{}/property-values", self.base_url, id)
    }

    async fn execute(
        &self,
        operation: &'static str,
        id: &DocumentId,
        request: RequestBuilder,
    ) -> CollabResult<Response> {
        let request = match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };

        let response = request
            .send()
            .await
            .map_err(|e| CollabError::persistence(operation, e.to_string()))?;

        let status = response.status();
        debug!(document_id = %id, operation, status = status.as_u16(), "document api response");
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(classify_status(operation, id, status, body))
    }

    async fn fetch_json<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        id: &DocumentId,
        url: String,
    ) -> CollabResult<T> {
        let response = self.execute(operation, id, self.client.get(url)).await?;
        response
            .json()
            .await
            .map_err(|e| CollabError::persistence(operation, format!("invalid response body: {}", e)))
    }
}

/// Map a failed HTTP status to the error taxonomy
fn classify_status(
    operation: &'static str,
    id: &DocumentId,
    status: StatusCode,
    body: String,
) -> CollabError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => CollabError::Permission {
            document_id: id.clone(),
            can_write: false,
            is_read_only: false,
        },
        _ => CollabError::Persistence {
            operation,
            status: Some(status.as_u16()),
            details: if body.is_empty() {
                status.to_string()
            } else {
                body
            },
        },
    }
}

#[async_trait]
impl DocumentApi for HttpDocumentApi {
    async fn update_document(&self, id: &DocumentId, update: &DocumentUpdate) -> CollabResult<()> {
        let request = self.client.put(self.document_url(id)).json(update);
        self.execute("update_document", id, request).await?;
        Ok(())
    }

    async fn create_version(
        &self,
        workspace_id: &WorkspaceId,
        id: &DocumentId,
        snapshot: &SnapshotPayload,
    ) -> CollabResult<()> {
        let request = self
            .client
            .post(self.versions_url(workspace_id, id))
            .json(snapshot);
        self.execute("create_version", id, request).await?;
        Ok(())
    }

    async fn get_properties(
        &self,
        workspace_id: &WorkspaceId,
        id: &DocumentId,
    ) -> CollabResult<Vec<PropertyDefinition>> {
        self.fetch_json("get_properties", id, self.properties_url(workspace_id, id))
            .await
    }

    async fn get_property_values_by_document(
        &self,
        id: &DocumentId,
    ) -> CollabResult<Vec<PropertyValue>> {
        self.fetch_json("get_property_values", id, self.property_values_url(id))
            .await
    }
}
