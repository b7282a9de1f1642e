//! Document switching
//!
//! Holds at most one live [`EditProtocol`]. Opening another document always
//! tears the previous session down completely before the new one connects,
//! so two sessions never overlap.

use tracing::info;

use super::edit::{EditMessage, EditProtocol};
use super::session::SessionConfig;
use crate::buffer::SharedBuffer;
use crate::ids::DocumentId;

/// Owner of the session for the currently open document
pub struct CollabConnection {
    template: SessionConfig,
    buffer: SharedBuffer,
    current: Option<EditProtocol>,
}

impl CollabConnection {
    /// `template` supplies URL, user and retry settings; its document id is
    /// replaced on every [`open`](Self::open).
    pub fn new(template: SessionConfig, buffer: SharedBuffer) -> Self {
        Self {
            template,
            buffer,
            current: None,
        }
    }

    /// Open `document_id`, tearing down any previous session first
    ///
    /// Reopening the document that is already open keeps the existing
    /// session and only swaps the callback.
    pub async fn open<F>(&mut self, document_id: DocumentId, on_remote_edit: F) -> &EditProtocol
    where
        F: FnMut(&EditMessage) + Send + 'static,
    {
        let protocol = match self.current.take() {
            Some(protocol) if protocol.document_id() == &document_id => {
                protocol.on_remote_edit(on_remote_edit);
                protocol
            }
            previous => {
                if let Some(mut previous) = previous {
                    info!(document_id = %previous.document_id(), "closing collaboration session");
                    previous.disconnect().await;
                }
                info!(document_id = %document_id, "opening collaboration session");
                let config = self.template.for_document(document_id);
                EditProtocol::connect(config, self.buffer.clone(), on_remote_edit)
            }
        };

        self.current.insert(protocol)
    }

    /// Tear down the current session, if any
    pub async fn close(&mut self) {
        if let Some(mut protocol) = self.current.take() {
            info!(document_id = %protocol.document_id(), "closing collaboration session");
            protocol.disconnect().await;
        }
    }

    pub fn current(&self) -> Option<&EditProtocol> {
        self.current.as_ref()
    }
}
