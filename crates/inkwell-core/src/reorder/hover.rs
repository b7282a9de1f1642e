//! Pointer-to-handle targeting
//!
//! The rendering layer is reached through [`SpatialIndex`]. Handles sit on
//! a shared rail and can overlap, so the pointer picks the handle nearest
//! by vertical distance rather than the one under it.

use super::tree::{Block, Document};

/// A rendered handle: its block position and vertical centre on screen
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HandleAnchor {
    pub pos: usize,
    pub y: f64,
}

/// Rendered geometry of the editing surface
pub trait SpatialIndex {
    /// Handles currently rendered
    fn handle_anchors(&self) -> Vec<HandleAnchor>;

    /// Document position under screen coordinates
    fn pos_at_coords(&self, x: f64, y: f64) -> Option<usize>;
}

/// The handle closest to `y`; ties go to the earlier anchor
pub fn nearest_handle(anchors: &[HandleAnchor], y: f64) -> Option<HandleAnchor> {
    anchors
        .iter()
        .filter(|a| a.y.is_finite())
        .min_by(|a, b| (a.y - y).abs().total_cmp(&(b.y - y).abs()))
        .copied()
}

/// Block the pointer at (`x`, `y`) should drag
///
/// Prefers the nearest rendered handle that still names a block. Otherwise
/// maps the coordinates to a position and takes the innermost handle block
/// around it, so a pick inside a list item's paragraph yields the item.
pub fn target_at(doc: &Document, index: &dyn SpatialIndex, x: f64, y: f64) -> Option<Block> {
    let anchors = index.handle_anchors();
    if let Some(block) = nearest_handle(&anchors, y).and_then(|a| doc.block_starting_at(a.pos)) {
        return Some(block);
    }
    let pos = index.pos_at_coords(x, y)?;
    doc.block_at(pos)
}
