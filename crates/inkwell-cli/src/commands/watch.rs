//! Watch command handler

use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::info;

use inkwell_core::sync::{ConnectionStatus, EditMessage, EditProtocol};
use inkwell_core::{Config, DocumentId, DocumentKind, SharedBuffer, VersionTimer, WorkspaceId};

use crate::output::Output;

/// Follow a document, printing remote edits until interrupted
///
/// With a workspace, version snapshots are taken on the usual cadence
/// while watching.
pub async fn watch(
    config: &Config,
    document: String,
    workspace: Option<String>,
    kind: DocumentKind,
    duration: Option<u64>,
    output: &Output,
) -> Result<()> {
    let document_id = DocumentId::new(document);
    let session = super::session_config(config, document_id.clone())?;
    let buffer = SharedBuffer::default();

    let versioning = match workspace {
        Some(workspace) => {
            let timer = VersionTimer::new(
                super::document_api(config)?,
                buffer.clone(),
                WorkspaceId::new(workspace),
                document_id.clone(),
                kind,
                config.snapshot_interval_ms(),
            );
            Some(timer.spawn())
        }
        None => None,
    };

    info!(document_id = %document_id, snapshots = versioning.is_some(), "watch started");
    output.message(&format!("Watching document {}...", document_id));

    let (edit_tx, mut edit_rx) = mpsc::unbounded_channel::<EditMessage>();
    let mut protocol = EditProtocol::connect(session, buffer, move |edit: &EditMessage| {
        let _ = edit_tx.send(edit.clone());
    });
    let mut status = protocol.subscribe_status();
    let mut progress = versioning.as_ref().map(|v| v.subscribe());

    let deadline = tokio::time::sleep(duration.map(Duration::from_secs).unwrap_or(Duration::MAX));
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = &mut deadline, if duration.is_some() => break,

            Some(edit) = edit_rx.recv() => output.print_edit(&edit),

            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *status.borrow_and_update();
                output.print_status(&current);
                if current.status == ConnectionStatus::Error && !current.reconnecting {
                    if let Some(err) = protocol.error() {
                        output.message(&format!("Giving up: {}", err));
                    }
                    break;
                }
            }

            Some(Ok(())) = async {
                match progress.as_mut() {
                    Some(rx) => Some(rx.changed().await),
                    None => std::future::pending().await,
                }
            } => {
                if let Some(rx) = progress.as_mut() {
                    let current = *rx.borrow_and_update();
                    output.print_progress(&current);
                }
            }
        }
    }

    protocol.disconnect().await;
    if let Some(versioning) = versioning {
        versioning.shutdown().await;
    }
    output.success("Stopped watching");

    Ok(())
}
