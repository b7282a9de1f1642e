//! Edit command handler

use anyhow::{bail, Context, Result};

use inkwell_core::sync::{ConnectionStatus, EditMessage, EditProtocol};
use inkwell_core::{AutoSave, Config, DocumentContent, DocumentId, Permissions, SharedBuffer};

use crate::output::Output;

/// Publish new content for a document and persist it
pub async fn edit(
    config: &Config,
    document: String,
    content: String,
    title: Option<String>,
    save: bool,
    output: &Output,
) -> Result<()> {
    let document_id = DocumentId::new(document);
    let session = super::session_config(config, document_id.clone())?;
    // Resolve the API up front so a missing URL fails before anything is sent
    let api = if save {
        Some(super::document_api(config)?)
    } else {
        None
    };

    let buffer = SharedBuffer::new(DocumentContent::new(title.unwrap_or_default(), ""));
    let mut protocol = EditProtocol::connect(session, buffer.clone(), |_: &EditMessage| {});

    let mut status = protocol.subscribe_status();
    let connected = tokio::time::timeout(
        config.handshake_timeout(),
        status.wait_for(|s| {
            s.status == ConnectionStatus::Connected
                || (s.status == ConnectionStatus::Error && !s.reconnecting)
        }),
    )
    .await
    .ok()
    .and_then(|r| r.ok())
    .is_some_and(|s| s.status == ConnectionStatus::Connected);

    if !connected {
        let reason = protocol
            .error()
            .map(|e| e.to_string())
            .unwrap_or_else(|| "timed out".to_string());
        protocol.disconnect().await;
        bail!("Could not connect to document {}: {}", document_id, reason);
    }

    buffer.set_content(content.as_str());
    if !protocol.send_edit(&content) {
        protocol.disconnect().await;
        bail!("Connection dropped before the edit was sent");
    }
    output.message(&format!("Sent edit to {}", document_id));

    if let Some(api) = api {
        let autosave = AutoSave::new(api, buffer, document_id.clone(), Permissions::writable());
        let saved = autosave.handle_save().await;
        if let Err(ref e) = saved {
            if let Some(message) = e.user_message() {
                output.message(message);
            }
        }
        protocol.disconnect().await;
        saved.with_context(|| format!("Failed to save document {}", document_id))?;
        output.success(&format!("Saved document {}", document_id));
    } else {
        protocol.disconnect().await;
    }

    Ok(())
}
