//! Inkwell Core Library
//!
//! This crate provides the real-time sync layer behind Inkwell's document
//! editor: per-document collaboration sessions, edit propagation, debounced
//! autosave, active-time version snapshots and drag-and-drop block
//! reordering.
//!
//! # Architecture
//!
//! - **Sessions**: one STOMP-over-WebSocket session per open document, with
//!   an explicit reconnect state machine
//! - **Last write wins**: remote edits replace the content wholesale; own
//!   echoes are filtered out
//! - **Document API**: persistence goes through the [`api::DocumentApi`]
//!   trait, backed by HTTP in production
//!
//! # Quick Start
//!
//! ```text
//! let config = Config::load()?;
//! let buffer = SharedBuffer::default();
//! let session = SessionConfig::new(url, doc_id.clone(), user_id);
//! let edits = EditProtocol::connect(session, buffer.clone(), |edit| {
//!     println!("remote edit from {}", edit.origin_user_id);
//! });
//!
//! let autosave = AutoSave::new(api, buffer.clone(), doc_id, Permissions::writable());
//! buffer.set_content("hello");
//! edits.send_edit("hello");
//! autosave.trigger_auto_save();
//! ```
//!
//! # Modules
//!
//! - `sync`: sessions, reconnect policy, wire frames and edit propagation
//! - `autosave`: debounced persistence of local edits
//! - `versioning`: snapshot timer paced by foreground time
//! - `reorder`: block tree, drag handles and atomic moves
//! - `api`: document persistence interface and HTTP client
//! - `config`: application configuration

pub mod api;
pub mod autosave;
pub mod buffer;
pub mod config;
pub mod error;
pub mod identity;
pub mod ids;
pub mod reorder;
pub mod sync;
pub mod versioning;

pub use api::{DocumentApi, DocumentKind, HttpDocumentApi};
pub use autosave::{AutoSave, SaveStatus};
pub use buffer::{DocumentContent, SharedBuffer};
pub use config::Config;
pub use error::{CollabError, CollabResult};
pub use identity::{Identity, Permissions};
pub use ids::{DocumentId, UserId, WorkspaceId};
pub use reorder::ReorderEngine;
pub use sync::{CollabConnection, ConnectionStatus, EditMessage, EditProtocol, SessionConfig};
pub use versioning::{ActiveTimer, SnapshotSchedule, VersionTimer, VersioningHandle};
