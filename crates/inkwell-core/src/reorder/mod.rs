//! Structural block reordering
//!
//! Drag handles on the blocks of a tree-shaped document body, and moves
//! that keep every position valid:
//!
//! - [`tree`]: the document tree, position arithmetic and atomic moves
//! - [`decorations`]: handle and drop-mark widgets with a recompute cache
//! - [`hover`]: nearest-handle targeting over a [`SpatialIndex`]
//! - [`drag`]: drag gesture state and previews
//! - [`engine`]: the per-surface engine tying them together

pub mod decorations;
pub mod drag;
pub mod engine;
pub mod hover;
pub mod tree;

pub use decorations::{Decoration, DecorationCache, Selection, Widget};
pub use drag::{DragState, PreviewHandle, PreviewRenderer};
pub use engine::{DropOutcome, ReorderEngine};
pub use hover::{HandleAnchor, SpatialIndex};
pub use tree::{Assoc, Block, BlockId, Document, MoveOutcome, Node, NodeKind, ResolvedPos, StepMap};
