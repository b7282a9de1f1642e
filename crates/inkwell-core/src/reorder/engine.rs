//! Drag-and-drop reordering engine
//!
//! One engine is attached to one editing surface. It owns the document
//! body while attached, so nothing else reads or mutates positions during
//! a move. Hover, drag and drop-mark state all live on the engine and are
//! threaded through each handler explicitly.

use tracing::debug;

use super::decorations::{Decoration, DecorationCache, Selection};
use super::drag::{DragState, PreviewRenderer};
use super::hover::{self, SpatialIndex};
use super::tree::{Block, BlockId, Document, MoveOutcome};
use crate::error::{CollabError, CollabResult};

/// Result of a drop gesture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropOutcome {
    /// Dropped within its own span, or no drag was active
    Unchanged,
    Moved { block_id: BlockId, start: usize },
    /// No legal slot near the drop point; the document is untouched
    Abandoned,
}

pub struct ReorderEngine {
    doc: Document,
    decorations: DecorationCache,
    selection: Option<Selection>,
    hover: Option<Block>,
    drag: Option<DragState>,
    marked: Option<BlockId>,
    renderer: Option<Box<dyn PreviewRenderer>>,
}

impl ReorderEngine {
    pub fn new(doc: Document) -> Self {
        Self {
            doc,
            decorations: DecorationCache::new(),
            selection: None,
            hover: None,
            drag: None,
            marked: None,
            renderer: None,
        }
    }

    pub fn with_preview_renderer(mut self, renderer: impl PreviewRenderer + 'static) -> Self {
        self.renderer = Some(Box::new(renderer));
        self
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    /// Detach from the surface, handing the document back
    pub fn into_document(self) -> Document {
        self.doc
    }

    pub fn selection(&self) -> Option<Selection> {
        self.selection
    }

    pub fn set_selection(&mut self, selection: Option<Selection>) {
        self.selection = selection;
    }

    /// Current handle and drop-mark decorations
    pub fn decorations(&mut self) -> &[Decoration] {
        self.decorations.get(&self.doc, self.selection, self.marked)
    }

    pub fn decoration_computations(&self) -> usize {
        self.decorations.computations()
    }

    /// Apply a typed edit; decorations are remapped, not recomputed
    pub fn insert_text(&mut self, pos: usize, text: &str) -> bool {
        let version = self.doc.version();
        let Some(map) = self.doc.insert_text(pos, text) else {
            return false;
        };
        self.decorations.map_through(&map, version, self.doc.version());
        self.hover = None;
        true
    }

    /// Update the hover target for a pointer position
    pub fn pointer_move(&mut self, index: &dyn SpatialIndex, x: f64, y: f64) -> Option<&Block> {
        self.hover = hover::target_at(&self.doc, index, x, y);
        self.hover.as_ref()
    }

    pub fn hovered(&self) -> Option<&Block> {
        self.hover.as_ref()
    }

    /// Start dragging the hovered block
    ///
    /// The whole block is selected before the drag begins. Fails with
    /// [`CollabError::MoveAborted`] when nothing is hovered or the hover
    /// target predates the last document change.
    pub fn start_drag(&mut self) -> CollabResult<&DragState> {
        let block = self
            .hover
            .clone()
            .ok_or_else(|| CollabError::MoveAborted("no handle under pointer".into()))?;
        if block.version != self.doc.version() {
            self.hover = None;
            return Err(CollabError::MoveAborted("hover target is stale".into()));
        }
        let node = self
            .doc
            .node(block.id)
            .cloned()
            .ok_or_else(|| CollabError::MoveAborted("hovered block vanished".into()))?;

        if let Some(previous) = self.drag.take() {
            previous.finish(self.renderer_mut());
        }
        self.selection = Some(Selection {
            from: block.start_position,
            to: block.end_position(),
        });

        let drag = DragState::begin(block, &node, self.renderer_mut());
        debug!(block_id = %drag.source_block_id(), start = drag.source_start(), "drag started");
        Ok(self.drag.insert(drag))
    }

    pub fn dragging(&self) -> Option<&DragState> {
        self.drag.as_ref()
    }

    /// Abandon the active drag, if any
    pub fn cancel_drag(&mut self) {
        if let Some(drag) = self.drag.take() {
            drag.finish(self.renderer_mut());
        }
    }

    /// Drop the dragged block at a document position
    pub fn drop_at(&mut self, pos: usize) -> DropOutcome {
        let Some(drag) = self.drag.take() else {
            return DropOutcome::Unchanged;
        };
        let source = drag.finish(self.renderer_mut());

        match self.doc.move_block(&source, pos) {
            Ok(MoveOutcome::Unchanged) => DropOutcome::Unchanged,
            Ok(MoveOutcome::Moved { block_id, start }) => {
                // Only the latest drop is marked
                self.marked = Some(block_id);
                self.hover = None;
                self.selection = Some(Selection {
                    from: start,
                    to: start + source.size,
                });
                DropOutcome::Moved { block_id, start }
            }
            Err(e) => {
                debug!(block_id = %source.id, pos, "drop abandoned: {}", e);
                DropOutcome::Abandoned
            }
        }
    }

    /// Drop at screen coordinates
    pub fn drop_at_coords(&mut self, index: &dyn SpatialIndex, x: f64, y: f64) -> DropOutcome {
        match index.pos_at_coords(x, y) {
            Some(pos) => self.drop_at(pos),
            None => {
                self.cancel_drag();
                DropOutcome::Abandoned
            }
        }
    }

    pub fn marked(&self) -> Option<BlockId> {
        self.marked
    }

    /// Remove the post-drop mark (e.g. when its highlight times out)
    pub fn clear_mark(&mut self) {
        self.marked = None;
    }

    fn renderer_mut(&mut self) -> Option<&mut dyn PreviewRenderer> {
        self.renderer
            .as_mut()
            .map(|r| &mut **r as &mut dyn PreviewRenderer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reorder::decorations::Widget;
    use crate::reorder::hover::HandleAnchor;
    use crate::reorder::tree::Node;

    /// Handles stacked 20px apart in document order
    struct Rail {
        anchors: Vec<HandleAnchor>,
        pos: Option<usize>,
    }

    impl Rail {
        fn for_doc(doc: &Document, pos: Option<usize>) -> Self {
            let anchors = doc
                .blocks()
                .iter()
                .enumerate()
                .map(|(i, b)| HandleAnchor {
                    pos: b.start_position,
                    y: i as f64 * 20.0,
                })
                .collect();
            Self { anchors, pos }
        }
    }

    impl SpatialIndex for Rail {
        fn handle_anchors(&self) -> Vec<HandleAnchor> {
            self.anchors.clone()
        }

        fn pos_at_coords(&self, _x: f64, _y: f64) -> Option<usize> {
            self.pos
        }
    }

    fn engine() -> ReorderEngine {
        ReorderEngine::new(Document::new(vec![
            Node::paragraph("one"),
            Node::paragraph("two"),
            Node::paragraph("three"),
        ]))
    }

    fn drag_handle(engine: &mut ReorderEngine, handle: usize) {
        let rail = Rail::for_doc(engine.document(), None);
        engine.pointer_move(&rail, 0.0, handle as f64 * 20.0);
        engine.start_drag().unwrap();
    }

    #[test]
    fn test_drag_selects_whole_block() {
        let mut engine = engine();
        drag_handle(&mut engine, 1);

        let drag = engine.dragging().unwrap();
        assert_eq!(drag.source_start(), 5);
        assert_eq!(drag.source_size(), 5);
        assert_eq!(engine.selection(), Some(Selection { from: 5, to: 10 }));
    }

    #[test]
    fn test_drop_on_itself_leaves_document_alone() {
        let mut engine = engine();
        let before = engine.document().clone();
        drag_handle(&mut engine, 1);

        assert_eq!(engine.drop_at(5), DropOutcome::Unchanged);
        assert_eq!(engine.document(), &before);
        assert_eq!(engine.marked(), None);
        assert!(engine.dragging().is_none());
    }

    #[test]
    fn test_drop_moves_and_marks_block() {
        let mut engine = engine();
        drag_handle(&mut engine, 0);

        let outcome = engine.drop_at(16);

        assert!(matches!(outcome, DropOutcome::Moved { start: 12, .. }));
        assert_eq!(
            engine.document().outline(),
            r#"doc(p("two") p("three") p("one"))"#
        );
        let marks: Vec<usize> = engine
            .decorations()
            .iter()
            .filter(|d| matches!(d.widget, Widget::DropMark { .. }))
            .map(|d| d.anchor)
            .collect();
        assert_eq!(marks, vec![12]);
    }

    #[test]
    fn test_only_latest_drop_is_marked() {
        let mut engine = engine();
        drag_handle(&mut engine, 0);
        let DropOutcome::Moved { block_id: first, .. } = engine.drop_at(16) else {
            panic!("first drop should move");
        };

        // "two" is now first; move it after "three"
        drag_handle(&mut engine, 0);
        let DropOutcome::Moved { block_id: second, .. } = engine.drop_at(11) else {
            panic!("second drop should move");
        };

        assert_ne!(first, second);
        assert_eq!(engine.marked(), Some(second));
        let marks = engine
            .decorations()
            .iter()
            .filter(|d| matches!(d.widget, Widget::DropMark { .. }))
            .count();
        assert_eq!(marks, 1);
    }

    #[test]
    fn test_abandoned_drop_keeps_document() {
        let mut engine = ReorderEngine::new(Document::new(vec![
            Node::bullet_list(vec![
                Node::list_item(vec![Node::paragraph("a")]),
                Node::list_item(vec![Node::paragraph("b")]),
            ]),
            Node::paragraph("outside"),
        ]));
        let before = engine.document().clone();
        // Handle 0 is the list, handle 1 its first item
        drag_handle(&mut engine, 1);

        // Middle of "outside", where no list item may go
        assert_eq!(engine.drop_at(16), DropOutcome::Abandoned);
        assert_eq!(engine.document(), &before);
        assert_eq!(engine.marked(), None);
    }

    #[test]
    fn test_stale_hover_cannot_start_drag() {
        let mut engine = engine();
        let rail = Rail::for_doc(engine.document(), None);
        engine.pointer_move(&rail, 0.0, 0.0);
        assert!(engine.insert_text(1, "x"));

        // Typing clears the hover target
        assert!(matches!(engine.start_drag(), Err(CollabError::MoveAborted(_))));
    }

    #[test]
    fn test_typing_does_not_recompute_decorations() {
        let mut engine = engine();
        engine.decorations();
        engine.insert_text(2, "abc");
        engine.insert_text(3, "d");
        let anchors: Vec<usize> = engine.decorations().iter().map(|d| d.anchor).collect();

        assert_eq!(engine.decoration_computations(), 1);
        assert_eq!(anchors, vec![0, 9, 14]);
    }

    #[test]
    fn test_drop_at_coords() {
        let mut engine = engine();
        drag_handle(&mut engine, 2);

        let off_surface = Rail::for_doc(engine.document(), None);
        assert_eq!(engine.drop_at_coords(&off_surface, 0.0, 500.0), DropOutcome::Abandoned);
        assert!(engine.dragging().is_none());

        drag_handle(&mut engine, 2);
        let top = Rail::for_doc(engine.document(), Some(1));
        assert!(matches!(
            engine.drop_at_coords(&top, 0.0, 0.0),
            DropOutcome::Moved { start: 0, .. }
        ));
        assert_eq!(
            engine.document().outline(),
            r#"doc(p("three") p("one") p("two"))"#
        );
    }

    #[test]
    fn test_cancel_drag_is_idempotent() {
        let mut engine = engine();
        drag_handle(&mut engine, 2);
        engine.cancel_drag();
        engine.cancel_drag();
        assert!(engine.dragging().is_none());
        assert_eq!(engine.drop_at(0), DropOutcome::Unchanged);
    }
}
