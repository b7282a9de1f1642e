//! Edit propagation
//!
//! Formats local edits for the document's command address and applies
//! remote edits from the document topic. The protocol is last-write-wins on
//! the content field: the newest message simply replaces the content.
//!
//! Inbound messages pass through [`RemoteEditFilter`] before reaching the
//! caller: echoes of our own edits are dropped, and content equal to the
//! current buffer is not re-applied.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, warn};

use super::session::{self, Session, SessionConfig, SessionStatus};
use super::ConnectionStatus;
use crate::buffer::SharedBuffer;
use crate::error::CollabError;
use crate::identity::Identity;
use crate::ids::{DocumentId, UserId};

/// An edit as it travels over the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditMessage {
    pub document_id: DocumentId,
    /// Author of the edit, used for echo suppression
    pub origin_user_id: UserId,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl EditMessage {
    pub fn new(document_id: DocumentId, origin_user_id: UserId, content: impl Into<String>) -> Self {
        Self {
            document_id,
            origin_user_id,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Callback for applied remote edits
pub type RemoteEditHandler = Box<dyn FnMut(&EditMessage) + Send>;

/// What happened to an inbound edit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteEditOutcome {
    /// Sent by the local user
    Echo,
    /// Addressed to a different document
    ForeignDocument,
    /// Content already matches the buffer
    Unchanged,
    /// Buffer updated
    Applied,
}

/// Echo suppression and change detection for inbound edits
#[derive(Debug, Clone)]
pub struct RemoteEditFilter {
    document_id: DocumentId,
    identity: Identity,
    buffer: SharedBuffer,
}

impl RemoteEditFilter {
    pub fn new(document_id: DocumentId, identity: Identity, buffer: SharedBuffer) -> Self {
        Self {
            document_id,
            identity,
            buffer,
        }
    }

    /// Apply an inbound edit to the buffer if it should be
    pub fn apply(&self, edit: &EditMessage) -> RemoteEditOutcome {
        if self.identity.is_self(&edit.origin_user_id) {
            return RemoteEditOutcome::Echo;
        }
        if edit.document_id != self.document_id {
            return RemoteEditOutcome::ForeignDocument;
        }
        if self.buffer.apply_content_if_changed(&edit.content) {
            RemoteEditOutcome::Applied
        } else {
            RemoteEditOutcome::Unchanged
        }
    }
}

/// Edit propagation bound to one document session
///
/// This is the handle an editing surface holds: `send_edit`, the remote edit
/// callback, connection status, last error and manual reconnect.
pub struct EditProtocol {
    session: Session,
    identity: Identity,
    on_remote_edit: Arc<Mutex<RemoteEditHandler>>,
}

impl EditProtocol {
    /// Connect to the document and start applying remote edits to `buffer`
    ///
    /// `on_remote_edit` runs after an edit has been applied to the buffer.
    pub fn connect<F>(config: SessionConfig, buffer: SharedBuffer, on_remote_edit: F) -> Self
    where
        F: FnMut(&EditMessage) + Send + 'static,
    {
        let identity = Identity::new(config.user_id.clone());
        let on_remote_edit: Arc<Mutex<RemoteEditHandler>> =
            Arc::new(Mutex::new(Box::new(on_remote_edit)));

        let filter = RemoteEditFilter::new(config.document_id.clone(), identity.clone(), buffer);
        let callback = on_remote_edit.clone();
        let session = session::connect(config, move |edit| match filter.apply(&edit) {
            RemoteEditOutcome::Applied => {
                let mut handler = callback.lock().unwrap_or_else(|e| e.into_inner());
                (handler)(&edit);
            }
            outcome => debug!(document_id = %edit.document_id, ?outcome, "remote edit skipped"),
        });

        Self {
            session,
            identity,
            on_remote_edit,
        }
    }

    pub fn document_id(&self) -> &DocumentId {
        self.session.document_id()
    }

    /// Publish new content for the document
    ///
    /// Fire-and-forget: a no-op unless the session is connected.
    pub fn send_edit(&self, content: &str) -> bool {
        let edit = EditMessage::new(
            self.document_id().clone(),
            self.identity.user_id().clone(),
            content,
        );
        match serde_json::to_string(&edit) {
            Ok(body) => self.session.send(body),
            Err(e) => {
                warn!(document_id = %edit.document_id, "failed to encode edit: {}", e);
                false
            }
        }
    }

    /// Swap the remote edit callback without reconnecting
    pub fn on_remote_edit<F>(&self, handler: F)
    where
        F: FnMut(&EditMessage) + Send + 'static,
    {
        let mut guard = self.on_remote_edit.lock().unwrap_or_else(|e| e.into_inner());
        *guard = Box::new(handler);
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.session.status()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SessionStatus> {
        self.session.subscribe_status()
    }

    /// Whether a retry is scheduled ("reconnecting" indicator)
    pub fn is_reconnecting(&self) -> bool {
        self.session.status_detail().reconnecting
    }

    pub fn error(&self) -> Option<CollabError> {
        self.session.error()
    }

    pub fn reconnect(&self) {
        self.session.reconnect();
    }

    pub async fn disconnect(&mut self) {
        self.session.disconnect().await;
    }
}
