//! Version snapshots paced by active time
//!
//! A snapshot is taken each time the document's cumulative foreground time
//! crosses the next target. Targets advance by a fixed interval from the
//! target that was crossed. Background time never counts, and each
//! observation takes at most one snapshot.
//!
//! Failures never stall the cadence: the next target is scheduled before the
//! snapshot is attempted.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::api::{DocumentApi, DocumentKind, SnapshotPayload};
use crate::buffer::SharedBuffer;
use crate::error::CollabResult;
use crate::ids::{DocumentId, WorkspaceId};

/// Next-snapshot bookkeeping for one open document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotSchedule {
    elapsed_ms: u64,
    next_target_ms: u64,
    interval_ms: u64,
}

impl SnapshotSchedule {
    /// First target is one interval past `elapsed_ms`
    pub fn new(interval_ms: u64, elapsed_ms: u64) -> Self {
        let interval_ms = interval_ms.max(1);
        Self {
            elapsed_ms,
            next_target_ms: elapsed_ms.saturating_add(interval_ms),
            interval_ms,
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed_ms
    }

    pub fn next_target_ms(&self) -> u64 {
        self.next_target_ms
    }

    pub fn interval_ms(&self) -> u64 {
        self.interval_ms
    }

    /// Record the current active time
    ///
    /// Returns true when the target was crossed; the target has then already
    /// moved one interval forward.
    pub fn observe(&mut self, elapsed_ms: u64) -> bool {
        self.elapsed_ms = elapsed_ms;
        if elapsed_ms < self.next_target_ms {
            return false;
        }
        self.next_target_ms = self.next_target_ms.saturating_add(self.interval_ms);
        true
    }

    /// Restart the cadence for a newly opened document
    pub fn reset_for_document(&mut self, elapsed_ms: u64) {
        self.elapsed_ms = elapsed_ms;
        self.next_target_ms = elapsed_ms.saturating_add(self.interval_ms);
    }

    /// Active time left before the next target
    pub fn remaining_ms(&self) -> u64 {
        self.next_target_ms.saturating_sub(self.elapsed_ms)
    }
}

/// Cumulative time spent in the foreground
///
/// The counter only runs while foregrounded.
#[derive(Debug, Clone)]
pub struct ActiveTimer {
    accumulated: Duration,
    foreground_since: Option<Instant>,
}

impl ActiveTimer {
    pub fn new(foreground: bool) -> Self {
        Self {
            accumulated: Duration::ZERO,
            foreground_since: foreground.then(Instant::now),
        }
    }

    pub fn is_foreground(&self) -> bool {
        self.foreground_since.is_some()
    }

    pub fn set_foreground(&mut self, foreground: bool) {
        match (foreground, self.foreground_since) {
            (true, None) => self.foreground_since = Some(Instant::now()),
            (false, Some(since)) => {
                self.accumulated += since.elapsed();
                self.foreground_since = None;
            }
            _ => {}
        }
    }

    pub fn elapsed(&self) -> Duration {
        match self.foreground_since {
            Some(since) => self.accumulated + since.elapsed(),
            None => self.accumulated,
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

/// Values surfaced to the editing surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersioningProgress {
    pub elapsed_ms: u64,
    pub next_snapshot_ms: u64,
}

/// Snapshot timer for the open document
pub struct VersionTimer {
    api: Arc<dyn DocumentApi>,
    buffer: SharedBuffer,
    workspace_id: WorkspaceId,
    document_id: DocumentId,
    kind: DocumentKind,
    timer: ActiveTimer,
    schedule: SnapshotSchedule,
}

impl VersionTimer {
    /// Start timing `document_id`; the active-time counter starts foregrounded
    pub fn new(
        api: Arc<dyn DocumentApi>,
        buffer: SharedBuffer,
        workspace_id: WorkspaceId,
        document_id: DocumentId,
        kind: DocumentKind,
        interval_ms: u64,
    ) -> Self {
        Self {
            api,
            buffer,
            workspace_id,
            document_id,
            kind,
            timer: ActiveTimer::new(true),
            schedule: SnapshotSchedule::new(interval_ms, 0),
        }
    }

    pub fn document_id(&self) -> &DocumentId {
        &self.document_id
    }

    pub fn schedule(&self) -> &SnapshotSchedule {
        &self.schedule
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.timer.elapsed_ms()
    }

    pub fn next_snapshot_ms(&self) -> u64 {
        self.schedule.next_target_ms()
    }

    pub fn progress(&self) -> VersioningProgress {
        VersioningProgress {
            elapsed_ms: self.elapsed_ms(),
            next_snapshot_ms: self.next_snapshot_ms(),
        }
    }

    pub fn set_foreground(&mut self, foreground: bool) {
        self.timer.set_foreground(foreground);
    }

    /// Observe the active time and snapshot if the target was crossed
    ///
    /// Returns whether a snapshot was attempted. A failed snapshot is logged
    /// and the next target stays scheduled.
    pub async fn tick(&mut self) -> bool {
        let elapsed_ms = self.timer.elapsed_ms();
        if !self.schedule.observe(elapsed_ms) {
            return false;
        }

        debug!(
            document_id = %self.document_id,
            elapsed_ms,
            next_target_ms = self.schedule.next_target_ms(),
            "snapshot target reached"
        );
        if let Err(e) = self.create_snapshot().await {
            warn!(
                document_id = %self.document_id,
                retryable = e.is_retryable(),
                "snapshot failed: {}",
                e
            );
        }
        true
    }

    /// Track another document, restarting the cadence from now
    pub fn switch_document(&mut self, document_id: DocumentId, kind: DocumentKind) {
        self.schedule.reset_for_document(self.timer.elapsed_ms());
        debug!(
            from = %self.document_id,
            to = %document_id,
            next_target_ms = self.schedule.next_target_ms(),
            "versioning switched document"
        );
        self.document_id = document_id;
        self.kind = kind;
    }

    /// Store one version record with the document's full state
    ///
    /// Property schema and values are fetched concurrently; if either fetch
    /// fails no version is written.
    pub async fn create_snapshot(&self) -> CollabResult<()> {
        let current = self.buffer.snapshot();
        let (properties, property_values) = tokio::join!(
            self.api.get_properties(&self.workspace_id, &self.document_id),
            self.api.get_property_values_by_document(&self.document_id),
        );

        let payload = SnapshotPayload {
            title: current.title,
            content: match self.kind {
                DocumentKind::Page => Some(current.content),
                DocumentKind::Table => None,
            },
            properties: properties?,
            property_values: property_values?,
        };

        self.api
            .create_version(&self.workspace_id, &self.document_id, &payload)
            .await?;
        info!(document_id = %self.document_id, "version snapshot created");
        Ok(())
    }

    /// Drive the timer on a background task
    pub fn spawn(self) -> VersioningHandle {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (progress_tx, _) = watch::channel(self.progress());
        let task = tokio::spawn(self.run(command_rx, progress_tx.clone()));
        VersioningHandle {
            command_tx,
            progress_tx,
            task,
        }
    }

    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<VersioningCommand>,
        progress: watch::Sender<VersioningProgress>,
    ) {
        loop {
            self.tick().await;
            progress.send_replace(self.progress());

            // Sleep until the target in active time; in the background only
            // a command can move things forward
            let wait = self
                .timer
                .is_foreground()
                .then(|| Duration::from_millis(self.schedule.remaining_ms()));

            tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(VersioningCommand::SetForeground(foreground)) => {
                        self.set_foreground(foreground);
                    }
                    Some(VersioningCommand::SwitchDocument { document_id, kind }) => {
                        self.switch_document(document_id, kind);
                    }
                    None => break,
                },
                _ = sleep_or_pending(wait) => {}
            }
        }
        debug!(document_id = %self.document_id, "versioning stopped");
    }
}

async fn sleep_or_pending(wait: Option<Duration>) {
    match wait {
        Some(wait) => tokio::time::sleep(wait).await,
        None => std::future::pending().await,
    }
}

enum VersioningCommand {
    SetForeground(bool),
    SwitchDocument {
        document_id: DocumentId,
        kind: DocumentKind,
    },
}

/// Handle to a spawned [`VersionTimer`]
///
/// Dropping the handle stops the timer.
pub struct VersioningHandle {
    command_tx: mpsc::UnboundedSender<VersioningCommand>,
    progress_tx: watch::Sender<VersioningProgress>,
    task: JoinHandle<()>,
}

impl VersioningHandle {
    /// Latest published elapsed/next-target values
    pub fn progress(&self) -> VersioningProgress {
        *self.progress_tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<VersioningProgress> {
        self.progress_tx.subscribe()
    }

    pub fn set_foreground(&self, foreground: bool) {
        let _ = self
            .command_tx
            .send(VersioningCommand::SetForeground(foreground));
    }

    pub fn switch_document(&self, document_id: DocumentId, kind: DocumentKind) {
        let _ = self
            .command_tx
            .send(VersioningCommand::SwitchDocument { document_id, kind });
    }

    /// Stop the timer and wait for the task to finish
    pub async fn shutdown(self) {
        let Self {
            command_tx, task, ..
        } = self;
        // Closing the command channel ends the task's loop
        drop(command_tx);
        let _ = task.await;
    }
}
