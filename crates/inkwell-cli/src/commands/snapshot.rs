//! Snapshot command handler

use anyhow::{Context, Result};

use inkwell_core::{
    Config, DocumentContent, DocumentId, DocumentKind, SharedBuffer, VersionTimer, WorkspaceId,
};

use crate::output::Output;

/// Store one version snapshot of a document right away
pub async fn snapshot(
    config: &Config,
    workspace: String,
    document: String,
    kind: DocumentKind,
    title: String,
    content: String,
    output: &Output,
) -> Result<()> {
    let api = super::document_api(config)?;
    let document_id = DocumentId::new(document);
    let buffer = SharedBuffer::new(DocumentContent::new(title, content));

    let timer = VersionTimer::new(
        api,
        buffer,
        WorkspaceId::new(workspace),
        document_id.clone(),
        kind,
        config.snapshot_interval_ms(),
    );
    timer
        .create_snapshot()
        .await
        .with_context(|| format!("Failed to snapshot document {}", document_id))?;

    output.success(&format!("Created version of {}", document_id));
    Ok(())
}
