//! Shared editing buffer
//!
//! The current title and content of the open document. Only the active
//! editing surface writes to it; autosave, versioning and edit propagation
//! read from it.

use std::sync::{Arc, RwLock};

/// Title and content of a document at one point in time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentContent {
    pub title: String,
    pub content: String,
}

impl DocumentContent {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
        }
    }
}

/// Cheaply cloneable handle to the current title/content
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer {
    inner: Arc<RwLock<DocumentContent>>,
}

impl SharedBuffer {
    pub fn new(initial: DocumentContent) -> Self {
        Self {
            inner: Arc::new(RwLock::new(initial)),
        }
    }

    /// Copy of the current title/content
    pub fn snapshot(&self) -> DocumentContent {
        self.read(|doc| doc.clone())
    }

    pub fn content(&self) -> String {
        self.read(|doc| doc.content.clone())
    }

    pub fn title(&self) -> String {
        self.read(|doc| doc.title.clone())
    }

    pub fn set_content(&self, content: impl Into<String>) {
        let content = content.into();
        self.write(|doc| doc.content = content);
    }

    pub fn set_title(&self, title: impl Into<String>) {
        let title = title.into();
        self.write(|doc| doc.title = title);
    }

    /// Replace title and content together (document switch)
    pub fn replace(&self, next: DocumentContent) {
        self.write(|doc| *doc = next);
    }

    /// Set the content if it differs from the current value
    ///
    /// Returns whether the buffer changed.
    pub fn apply_content_if_changed(&self, content: &str) -> bool {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        if guard.content == content {
            return false;
        }
        guard.content = content.to_string();
        true
    }

    fn read<T>(&self, f: impl FnOnce(&DocumentContent) -> T) -> T {
        // A panicking writer leaves plain strings behind, still safe to read
        let guard = self.inner.read().unwrap_or_else(|e| e.into_inner());
        f(&guard)
    }

    fn write(&self, f: impl FnOnce(&mut DocumentContent)) {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        f(&mut guard);
    }
}
