//! Document persistence API
//!
//! The backend that stores documents and their versions. The core only
//! depends on the [`DocumentApi`] trait; [`HttpDocumentApi`] talks to the
//! REST backend.

mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::buffer::DocumentContent;
use crate::error::CollabResult;
use crate::ids::{DocumentId, WorkspaceId};

pub use http::HttpDocumentApi;

/// Kind of document; decides what a snapshot contains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    /// Rich-text page, snapshots include the body
    Page,
    /// Database-style table, snapshots omit the body
    Table,
}

/// Body of a document update
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentUpdate {
    pub title: String,
    pub content: String,
}

impl From<DocumentContent> for DocumentUpdate {
    fn from(doc: DocumentContent) -> Self {
        Self {
            title: doc.title,
            content: doc.content,
        }
    }
}

/// Property schema entry; opaque beyond its id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDefinition {
    pub id: String,
    #[serde(flatten)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

/// Value of one property on one document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyValue {
    pub property_id: String,
    pub value: serde_json::Value,
}

/// A full point-in-time copy of a document, stored as one version record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotPayload {
    pub title: String,
    /// Omitted for table documents
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub properties: Vec<PropertyDefinition>,
    pub property_values: Vec<PropertyValue>,
}

/// Backend calls consumed by autosave and versioning
///
/// Every call may fail; implementations map authorization failures to
/// [`CollabError::Permission`](crate::CollabError::Permission) and everything
/// else to [`CollabError::Persistence`](crate::CollabError::Persistence).
#[async_trait]
pub trait DocumentApi: Send + Sync {
    /// Overwrite a document's title and content
    async fn update_document(&self, id: &DocumentId, update: &DocumentUpdate) -> CollabResult<()>;

    /// Store a new version record
    async fn create_version(
        &self,
        workspace_id: &WorkspaceId,
        id: &DocumentId,
        snapshot: &SnapshotPayload,
    ) -> CollabResult<()>;

    /// Property schema of a document
    async fn get_properties(
        &self,
        workspace_id: &WorkspaceId,
        id: &DocumentId,
    ) -> CollabResult<Vec<PropertyDefinition>>;

    /// Property values of a document
    async fn get_property_values_by_document(
        &self,
        id: &DocumentId,
    ) -> CollabResult<Vec<PropertyValue>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_snapshot_omits_content() {
        let snapshot = SnapshotPayload {
            title: "Tasks".into(),
            content: None,
            properties: vec![],
            property_values: vec![],
        };
        let json = serde_json::to_value(&snapshot).unwrap();
        assert!(json.get("content").is_none());
        assert!(json.get("propertyValues").is_some());
    }

    #[test]
    fn test_property_definition_keeps_attributes() {
        let json = r#"{"id":"p1","name":"Status","type":"select"}"#;
        let def: PropertyDefinition = serde_json::from_str(json).unwrap();
        assert_eq!(def.id, "p1");
        assert_eq!(def.attributes["type"], "select");
    }
}
