//! Drag gesture state

use tracing::debug;

use super::tree::{Block, BlockId, Node};

/// Opaque id of a preview built by the rendering layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreviewHandle(pub u64);

/// Builds the detached visual shown under the pointer while dragging
pub trait PreviewRenderer: Send {
    fn render(&mut self, node: &Node) -> Result<PreviewHandle, String>;

    fn discard(&mut self, _preview: PreviewHandle) {}
}

/// An active drag; exists from pointer-down on a handle until drop or cancel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DragState {
    source: Block,
    preview: Option<PreviewHandle>,
}

impl DragState {
    /// Begin dragging `source`
    ///
    /// A failed preview is logged and the drag proceeds without one.
    pub fn begin(source: Block, node: &Node, renderer: Option<&mut dyn PreviewRenderer>) -> Self {
        let preview = renderer.and_then(|r| match r.render(node) {
            Ok(preview) => Some(preview),
            Err(e) => {
                debug!(block_id = %source.id, "drag preview unavailable: {}", e);
                None
            }
        });
        Self { source, preview }
    }

    pub fn source(&self) -> &Block {
        &self.source
    }

    pub fn source_block_id(&self) -> BlockId {
        self.source.id
    }

    pub fn source_start(&self) -> usize {
        self.source.start_position
    }

    pub fn source_size(&self) -> usize {
        self.source.size
    }

    pub fn preview(&self) -> Option<PreviewHandle> {
        self.preview
    }

    /// End the gesture, releasing the preview
    pub fn finish(self, renderer: Option<&mut dyn PreviewRenderer>) -> Block {
        if let (Some(preview), Some(renderer)) = (self.preview, renderer) {
            renderer.discard(preview);
        }
        self.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reorder::tree::Document;

    struct FlakyRenderer {
        fail: bool,
        discarded: Vec<PreviewHandle>,
    }

    impl PreviewRenderer for FlakyRenderer {
        fn render(&mut self, _node: &Node) -> Result<PreviewHandle, String> {
            if self.fail {
                Err("no surface".into())
            } else {
                Ok(PreviewHandle(7))
            }
        }

        fn discard(&mut self, preview: PreviewHandle) {
            self.discarded.push(preview);
        }
    }

    fn source() -> (Block, Node) {
        let doc = Document::new(vec![Node::paragraph("drag me")]);
        let block = doc.block_starting_at(0).unwrap();
        let node = doc.node(block.id).unwrap().clone();
        (block, node)
    }

    #[test]
    fn test_preview_failure_does_not_abort() {
        let (block, node) = source();
        let mut renderer = FlakyRenderer {
            fail: true,
            discarded: Vec::new(),
        };

        let drag = DragState::begin(block.clone(), &node, Some(&mut renderer));

        assert_eq!(drag.preview(), None);
        assert_eq!(drag.source_block_id(), block.id);
        assert_eq!(drag.source_start(), 0);
        assert_eq!(drag.source_size(), 9);
    }

    #[test]
    fn test_finish_discards_preview() {
        let (block, node) = source();
        let mut renderer = FlakyRenderer {
            fail: false,
            discarded: Vec::new(),
        };

        let drag = DragState::begin(block, &node, Some(&mut renderer));
        assert_eq!(drag.preview(), Some(PreviewHandle(7)));

        drag.finish(Some(&mut renderer));
        assert_eq!(renderer.discarded, vec![PreviewHandle(7)]);
    }
}
