//! Handle and drop-mark decorations
//!
//! Decorations are derived from the tree alone. The cache recomputes them
//! when the structure, the selection or the drop mark changes; text edits
//! only move anchors, so the cached set is mapped through the edit instead.

use super::tree::{Assoc, BlockId, Document, NodeKind, StepMap};

/// What to render at a decoration's anchor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Widget {
    /// Drag handle for a block
    Handle {
        block_id: BlockId,
        kind: NodeKind,
        /// The selection covers exactly this block
        selected: bool,
    },
    /// Transient highlight on the block that was just dropped
    DropMark { block_id: BlockId },
}

/// A widget anchored at a document position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decoration {
    pub anchor: usize,
    pub widget: Widget,
}

/// Selected range in document positions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub from: usize,
    pub to: usize,
}

/// Compute the full decoration set for a document
pub fn compute(
    doc: &Document,
    selection: Option<Selection>,
    marked: Option<BlockId>,
) -> Vec<Decoration> {
    let mut decorations: Vec<Decoration> = doc
        .blocks()
        .into_iter()
        .map(|block| Decoration {
            anchor: block.start_position,
            widget: Widget::Handle {
                block_id: block.id,
                kind: block.kind,
                selected: selection.is_some_and(|s| {
                    s.from == block.start_position && s.to == block.end_position()
                }),
            },
        })
        .collect();

    if let Some(block_id) = marked {
        if let Some((_, start)) = doc.locate(block_id) {
            decorations.push(Decoration {
                anchor: start,
                widget: Widget::DropMark { block_id },
            });
        }
    }
    decorations
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CacheKey {
    version: u64,
    selection: Option<Selection>,
    marked: Option<BlockId>,
}

/// Decoration set reused until the inputs change
#[derive(Debug, Default)]
pub struct DecorationCache {
    key: Option<CacheKey>,
    decorations: Vec<Decoration>,
    computations: usize,
}

impl DecorationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decorations for the given inputs, recomputed only if they changed
    pub fn get(
        &mut self,
        doc: &Document,
        selection: Option<Selection>,
        marked: Option<BlockId>,
    ) -> &[Decoration] {
        let key = CacheKey {
            version: doc.version(),
            selection,
            marked,
        };
        if self.key != Some(key) {
            self.decorations = compute(doc, selection, marked);
            self.computations += 1;
            self.key = Some(key);
        }
        &self.decorations
    }

    /// Carry the cached set across a text edit
    ///
    /// `map` must describe the step that took the document from the cached
    /// version to `new_version`; otherwise the cache is dropped.
    pub fn map_through(&mut self, map: &StepMap, from_version: u64, new_version: u64) {
        match self.key.as_mut() {
            Some(key) if key.version == from_version => {
                for decoration in &mut self.decorations {
                    decoration.anchor = map.map(decoration.anchor, Assoc::Right);
                }
                key.version = new_version;
            }
            _ => self.invalidate(),
        }
    }

    pub fn invalidate(&mut self) {
        self.key = None;
    }

    /// Number of full recomputations so far
    pub fn computations(&self) -> usize {
        self.computations
    }
}
