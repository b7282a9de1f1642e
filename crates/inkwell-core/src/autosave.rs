//! Autosave scheduler
//!
//! Debounces local edits into document updates:
//!
//! ```text
//! saved --edit--> unsaved --debounce--> saving --ok--> saved
//!                                              \--err--> error
//! ```
//!
//! Every [`AutoSave::trigger_auto_save`] restarts the debounce window, so a
//! burst of edits becomes one write once input pauses. The write uses the
//! title/content captured at the last trigger.
//!
//! Writes go out one at a time in the order they were started. A write that
//! is still queued when a newer one starts is dropped, and only the newest
//! write decides the final status.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::{DocumentApi, DocumentUpdate};
use crate::buffer::{DocumentContent, SharedBuffer};
use crate::error::{CollabError, CollabResult};
use crate::identity::Permissions;
use crate::ids::DocumentId;

/// Default debounce window
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// Save indicator state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveStatus {
    Saved,
    Unsaved,
    Saving,
    Error,
}

impl SaveStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SaveStatus::Saved => "saved",
            SaveStatus::Unsaved => "unsaved",
            SaveStatus::Saving => "saving",
            SaveStatus::Error => "error",
        }
    }
}

/// Callback for saves refused for lack of permission
pub type PermissionErrorHandler = Box<dyn Fn(&CollabError) + Send + Sync>;

/// Debounced persistence for the open document
///
/// Cloning yields another handle to the same scheduler.
#[derive(Clone)]
pub struct AutoSave {
    inner: Arc<Inner>,
}

struct Inner {
    api: Arc<dyn DocumentApi>,
    buffer: SharedBuffer,
    debounce: Duration,
    status_tx: watch::Sender<SaveStatus>,
    tracking: Mutex<Tracking>,
    /// Held for the duration of one API write
    write_lock: tokio::sync::Mutex<()>,
    on_permission_error: Option<PermissionErrorHandler>,
}

/// Per-document bookkeeping
struct Tracking {
    document_id: DocumentId,
    permissions: Permissions,
    /// Title/content captured at the last trigger
    latest: DocumentContent,
    /// Bumped on every trigger or cancel; a timer only fires for its own
    generation: u64,
    pending: Option<JoinHandle<()>>,
    /// Sequence number of the newest write started
    write_seq: u64,
    /// Writes numbered up to here belong to previously tracked documents
    switched_at: u64,
}

impl AutoSave {
    pub fn new(
        api: Arc<dyn DocumentApi>,
        buffer: SharedBuffer,
        document_id: DocumentId,
        permissions: Permissions,
    ) -> Self {
        let (status_tx, _) = watch::channel(SaveStatus::Saved);
        let latest = buffer.snapshot();
        Self {
            inner: Arc::new(Inner {
                api,
                buffer,
                debounce: DEFAULT_DEBOUNCE,
                status_tx,
                tracking: Mutex::new(Tracking {
                    document_id,
                    permissions,
                    latest,
                    generation: 0,
                    pending: None,
                    write_seq: 0,
                    switched_at: 0,
                }),
                write_lock: tokio::sync::Mutex::new(()),
                on_permission_error: None,
            }),
        }
    }

    /// Override the debounce window (builder style)
    ///
    /// Only takes effect before the handle is cloned.
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.debounce = debounce;
        }
        self
    }

    /// Report refused manual saves through `handler` (builder style)
    ///
    /// Only takes effect before the handle is cloned.
    pub fn with_permission_error_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&CollabError) + Send + Sync + 'static,
    {
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.on_permission_error = Some(Box::new(handler));
        }
        self
    }

    /// Current save status
    pub fn status(&self) -> SaveStatus {
        *self.inner.status_tx.borrow()
    }

    /// Subscribe to save status changes
    pub fn subscribe_status(&self) -> watch::Receiver<SaveStatus> {
        self.inner.status_tx.subscribe()
    }

    /// Document currently tracked
    pub fn document_id(&self) -> DocumentId {
        self.inner.lock_tracking().document_id.clone()
    }

    /// Update permissions (e.g. after a sharing change)
    pub fn set_permissions(&self, permissions: Permissions) {
        self.inner.lock_tracking().permissions = permissions;
    }

    /// Record a local edit and restart the debounce window
    ///
    /// No-op without write permission. Must be called within a tokio runtime.
    pub fn trigger_auto_save(&self) {
        let mut tracking = self.inner.lock_tracking();
        if !tracking.permissions.allows_save() {
            debug!(document_id = %tracking.document_id, "autosave skipped, no write access");
            return;
        }

        tracking.latest = self.inner.buffer.snapshot();
        tracking.cancel_pending();
        let generation = tracking.generation;
        self.inner.status_tx.send_replace(SaveStatus::Unsaved);

        let inner = self.inner.clone();
        let debounce = self.inner.debounce;
        tracking.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            let write = {
                let mut tracking = inner.lock_tracking();
                if tracking.generation != generation {
                    return;
                }
                tracking.pending = None;
                inner.begin_write(&mut tracking)
            };
            // Detach the write so a later trigger cannot abort it mid-flight
            tokio::spawn(async move {
                let _ = inner.persist(write).await;
            });
        }));
    }

    /// Save immediately, cancelling any pending debounce
    ///
    /// The status passes through unsaved before saving, even when nothing
    /// changed since the last write. Without write permission nothing is
    /// saved, the status is left alone and the permission error goes to the
    /// registered callback.
    pub async fn handle_save(&self) -> CollabResult<()> {
        {
            let mut tracking = self.inner.lock_tracking();
            if !tracking.permissions.allows_save() {
                let err = CollabError::Permission {
                    document_id: tracking.document_id.clone(),
                    can_write: tracking.permissions.can_write,
                    is_read_only: tracking.permissions.is_read_only,
                };
                drop(tracking);
                info!("manual save refused: {}", err);
                if let Some(handler) = &self.inner.on_permission_error {
                    handler(&err);
                }
                return Err(err);
            }

            tracking.cancel_pending();
            self.inner.status_tx.send_if_modified(|status| {
                let changed = *status != SaveStatus::Unsaved;
                *status = SaveStatus::Unsaved;
                changed
            });
        }
        // Give observers a turn to see the unsaved state
        tokio::task::yield_now().await;

        let write = {
            let mut tracking = self.inner.lock_tracking();
            tracking.latest = self.inner.buffer.snapshot();
            self.inner.begin_write(&mut tracking)
        };
        self.inner.persist(write).await
    }

    /// Cancel the pending debounced save, if any
    ///
    /// Idempotent; cancelling after the timer fired does nothing.
    pub fn cancel_pending_save(&self) {
        self.inner.lock_tracking().cancel_pending();
    }

    /// Start tracking another document
    ///
    /// If the previous document has unsaved edits, its last captured
    /// title/content is flushed under the previous id. The returned handle
    /// resolves when that flush completes.
    pub fn switch_document(
        &self,
        next: DocumentId,
        permissions: Permissions,
    ) -> Option<JoinHandle<CollabResult<()>>> {
        let mut tracking = self.inner.lock_tracking();
        tracking.cancel_pending();

        let flush = if self.status() == SaveStatus::Unsaved && tracking.permissions.allows_save() {
            tracking.write_seq += 1;
            let write = Write {
                seq: tracking.write_seq,
                document_id: tracking.document_id.clone(),
                content: tracking.latest.clone(),
                permissions: tracking.permissions,
            };
            info!(document_id = %write.document_id, "flushing unsaved edits before switching document");
            let inner = self.inner.clone();
            Some(tokio::spawn(async move { inner.persist(write).await }))
        } else {
            None
        };

        tracking.switched_at = tracking.write_seq;
        tracking.document_id = next;
        tracking.permissions = permissions;
        tracking.latest = self.inner.buffer.snapshot();
        self.inner.status_tx.send_replace(SaveStatus::Saved);

        flush
    }

    /// Cancel the debounce and attempt one last save if edits are unsaved
    ///
    /// Best effort: the save is spawned and may not finish before exit.
    pub fn teardown(&self) -> Option<JoinHandle<CollabResult<()>>> {
        let write = {
            let mut tracking = self.inner.lock_tracking();
            tracking.cancel_pending();
            if self.status() != SaveStatus::Unsaved || !tracking.permissions.allows_save() {
                return None;
            }
            self.inner.begin_write(&mut tracking)
        };

        let inner = self.inner.clone();
        Some(tokio::spawn(async move { inner.persist(write).await }))
    }
}

impl Tracking {
    fn cancel_pending(&mut self) {
        self.generation += 1;
        if let Some(pending) = self.pending.take() {
            pending.abort();
        }
    }
}

impl Inner {
    fn lock_tracking(&self) -> MutexGuard<'_, Tracking> {
        self.tracking.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Capture the tracked content as the newest write and mark it saving
    fn begin_write(&self, tracking: &mut Tracking) -> Write {
        tracking.write_seq += 1;
        self.status_tx.send_replace(SaveStatus::Saving);
        Write {
            seq: tracking.write_seq,
            document_id: tracking.document_id.clone(),
            content: tracking.latest.clone(),
            permissions: tracking.permissions,
        }
    }

    /// Write through the API, driving the status machine
    ///
    /// Writes for a previously tracked document are never dropped and
    /// leave the status alone.
    async fn persist(&self, write: Write) -> CollabResult<()> {
        let _serial = self.write_lock.lock().await;
        let (current, newest) = {
            let tracking = self.lock_tracking();
            (write.seq > tracking.switched_at, tracking.write_seq == write.seq)
        };
        if current && !newest {
            debug!(document_id = %write.document_id, seq = write.seq, "save superseded");
            return Ok(());
        }

        let result = self
            .api
            .update_document(&write.document_id, &DocumentUpdate::from(write.content))
            .await;

        let next = match &result {
            Ok(()) => {
                debug!(document_id = %write.document_id, seq = write.seq, "document saved");
                SaveStatus::Saved
            }
            Err(e) => {
                log_failure(&write.document_id, write.permissions, e);
                SaveStatus::Error
            }
        };

        // A newer write owns the status; a newer edit keeps it unsaved
        let tracking = self.lock_tracking();
        if write.seq > tracking.switched_at && tracking.write_seq == write.seq {
            self.status_tx.send_if_modified(|status| {
                if *status == SaveStatus::Saving {
                    *status = next;
                    true
                } else {
                    false
                }
            });
        }
        drop(tracking);

        result
    }
}

/// One captured write
struct Write {
    seq: u64,
    document_id: DocumentId,
    content: DocumentContent,
    permissions: Permissions,
}

fn log_failure(document_id: &DocumentId, permissions: Permissions, err: &CollabError) {
    warn!(
        document_id = %document_id,
        can_write = permissions.can_write,
        is_read_only = permissions.is_read_only,
        retryable = err.is_retryable(),
        "save failed: {}",
        err
    );
}
