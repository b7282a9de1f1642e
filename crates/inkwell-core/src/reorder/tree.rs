//! Document tree and position arithmetic
//!
//! Positions count tokens in a flattened view of the tree. Entering or
//! leaving a container node is one token each, every character of text is
//! one token and a leaf block (horizontal rule) is one token. The document
//! root has no tokens of its own, so position 0 is before its first child.
//!
//! ```text
//!  0   1 2 3   4   5   6   7 8   9  10
//!  <p> a b </p> <ul> <li> <p> c </p> </li> </ul>
//! ```
//!
//! Every mutation bumps [`Document::version`]; a [`Block`] computed against
//! an older version is rejected rather than reinterpreted.

use std::fmt;

use tracing::debug;
use uuid::Uuid;

use crate::error::{CollabError, CollabResult};

/// Stable identity of a node across mutations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId(Uuid);

impl BlockId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for BlockId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Node types of the document body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Doc,
    Paragraph,
    Heading(u8),
    CodeBlock,
    HorizontalRule,
    Blockquote,
    BulletList,
    OrderedList,
    ListItem,
    Text,
}

impl NodeKind {
    /// Holds inline text only
    pub fn is_textblock(&self) -> bool {
        matches!(
            self,
            NodeKind::Paragraph | NodeKind::Heading(_) | NodeKind::CodeBlock
        )
    }

    /// Allowed directly inside the document, a blockquote or a list item
    pub fn is_block(&self) -> bool {
        !matches!(self, NodeKind::Doc | NodeKind::ListItem | NodeKind::Text)
    }

    /// Leaf node occupying a single position
    pub fn is_atom(&self) -> bool {
        matches!(self, NodeKind::HorizontalRule)
    }

    /// Must keep at least one child
    pub fn requires_content(&self) -> bool {
        matches!(
            self,
            NodeKind::Blockquote | NodeKind::BulletList | NodeKind::OrderedList | NodeKind::ListItem
        )
    }

    /// Whether `child` may sit at `index` of a node of this kind
    pub fn can_contain(&self, child: NodeKind, index: usize) -> bool {
        match self {
            NodeKind::Doc | NodeKind::Blockquote => child.is_block(),
            NodeKind::BulletList | NodeKind::OrderedList => child == NodeKind::ListItem,
            // A list item leads with its paragraph
            NodeKind::ListItem => child.is_block() && (index > 0 || child == NodeKind::Paragraph),
            NodeKind::Paragraph | NodeKind::Heading(_) | NodeKind::CodeBlock => {
                child == NodeKind::Text
            }
            NodeKind::HorizontalRule | NodeKind::Text => false,
        }
    }

    fn tag(&self) -> String {
        match self {
            NodeKind::Doc => "doc".into(),
            NodeKind::Paragraph => "p".into(),
            NodeKind::Heading(level) => format!("h{}", level),
            NodeKind::CodeBlock => "code".into(),
            NodeKind::HorizontalRule => "hr".into(),
            NodeKind::Blockquote => "quote".into(),
            NodeKind::BulletList => "ul".into(),
            NodeKind::OrderedList => "ol".into(),
            NodeKind::ListItem => "li".into(),
            NodeKind::Text => "text".into(),
        }
    }
}

/// A node of the document tree
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    id: BlockId,
    kind: NodeKind,
    text: String,
    children: Vec<Node>,
}

impl Node {
    fn container(kind: NodeKind, children: Vec<Node>) -> Self {
        Self {
            id: BlockId::new(),
            kind,
            text: String::new(),
            children,
        }
    }

    fn textblock(kind: NodeKind, text: &str) -> Self {
        let children = if text.is_empty() {
            Vec::new()
        } else {
            vec![Node::text(text)]
        };
        Self::container(kind, children)
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            id: BlockId::new(),
            kind: NodeKind::Text,
            text: text.into(),
            children: Vec::new(),
        }
    }

    pub fn paragraph(text: &str) -> Self {
        Self::textblock(NodeKind::Paragraph, text)
    }

    pub fn heading(level: u8, text: &str) -> Self {
        Self::textblock(NodeKind::Heading(level), text)
    }

    pub fn code_block(text: &str) -> Self {
        Self::textblock(NodeKind::CodeBlock, text)
    }

    pub fn horizontal_rule() -> Self {
        Self::container(NodeKind::HorizontalRule, Vec::new())
    }

    pub fn blockquote(children: Vec<Node>) -> Self {
        Self::container(NodeKind::Blockquote, children)
    }

    pub fn bullet_list(items: Vec<Node>) -> Self {
        Self::container(NodeKind::BulletList, items)
    }

    pub fn ordered_list(items: Vec<Node>) -> Self {
        Self::container(NodeKind::OrderedList, items)
    }

    pub fn list_item(children: Vec<Node>) -> Self {
        Self::container(NodeKind::ListItem, children)
    }

    pub fn id(&self) -> BlockId {
        self.id
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }

    /// Positions the node occupies in its parent
    pub fn size(&self) -> usize {
        match self.kind {
            NodeKind::Text => self.text.chars().count(),
            kind if kind.is_atom() => 1,
            _ => self.content_size() + 2,
        }
    }

    /// Positions between the node's open and close tokens
    pub fn content_size(&self) -> usize {
        self.children.iter().map(Node::size).sum()
    }

    /// Concatenated text of all descendants
    pub fn text_content(&self) -> String {
        match self.kind {
            NodeKind::Text => self.text.clone(),
            _ => self.children.iter().map(Node::text_content).collect(),
        }
    }

    /// Compact structural rendering, e.g. `ul(li(p("a")))`
    pub fn outline(&self) -> String {
        match self.kind {
            NodeKind::Text => format!("{:?}", self.text),
            _ if self.children.is_empty() => self.kind.tag(),
            _ => {
                let inner: Vec<String> = self.children.iter().map(Node::outline).collect();
                format!("{}({})", self.kind.tag(), inner.join(" "))
            }
        }
    }

    /// Index of the child at relative position `rel` and that child's offset
    ///
    /// A position on a boundary belongs to the child after it; past the last
    /// child the index equals the child count.
    fn child_at(&self, rel: usize) -> (usize, usize) {
        let mut offset = 0;
        for (index, child) in self.children.iter().enumerate() {
            let end = offset + child.size();
            if rel < end {
                return (index, offset);
            }
            offset = end;
        }
        (self.children.len(), offset)
    }

    fn find_path(&self, id: BlockId, start: usize, path: &mut Vec<usize>) -> Option<usize> {
        let mut offset = start;
        for (index, child) in self.children.iter().enumerate() {
            path.push(index);
            if child.id == id {
                return Some(offset);
            }
            if let Some(found) = child.find_path(id, offset + 1, path) {
                return Some(found);
            }
            path.pop();
            offset += child.size();
        }
        None
    }
}

/// A handle-bearing block, valid for one document version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub id: BlockId,
    pub start_position: usize,
    /// Enclosing block, `None` for top-level blocks
    pub parent_id: Option<BlockId>,
    pub kind: NodeKind,
    pub size: usize,
    pub version: u64,
}

impl Block {
    pub fn end_position(&self) -> usize {
        self.start_position + self.size
    }

    /// Whether `pos` lies within the block, bounds included
    pub fn spans(&self, pos: usize) -> bool {
        self.start_position <= pos && pos <= self.end_position()
    }
}

/// Which side a position sticks to when content appears on it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assoc {
    Left,
    Right,
}

/// Position mapping for one replace step
///
/// A step removes `deleted` positions at `start` and puts `inserted` in
/// their place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepMap {
    start: usize,
    deleted: usize,
    inserted: usize,
}

impl StepMap {
    pub fn deletion(from: usize, to: usize) -> Self {
        Self {
            start: from,
            deleted: to.saturating_sub(from),
            inserted: 0,
        }
    }

    pub fn insertion(at: usize, size: usize) -> Self {
        Self {
            start: at,
            deleted: 0,
            inserted: size,
        }
    }

    /// Map a position from before the step to after it
    ///
    /// Positions inside a deleted range collapse onto the range start.
    pub fn map(&self, pos: usize, assoc: Assoc) -> usize {
        let end = self.start + self.deleted;
        if pos < self.start || (pos == self.start && assoc == Assoc::Left) {
            pos
        } else if pos > end || (pos == end && assoc == Assoc::Right) {
            pos - self.deleted + self.inserted
        } else if assoc == Assoc::Left {
            self.start
        } else {
            self.start + self.inserted
        }
    }
}

/// One ancestor of a resolved position
#[derive(Debug, Clone, PartialEq, Eq)]
struct Level {
    path: Vec<usize>,
    kind: NodeKind,
    /// Absolute position of the node's content start
    start: usize,
    content_size: usize,
    /// Child index the position sits in or before
    index: usize,
}

/// A position with its chain of ancestors
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPos {
    pub pos: usize,
    levels: Vec<Level>,
}

impl ResolvedPos {
    /// Depth of the innermost ancestor; the document is depth 0
    pub fn depth(&self) -> usize {
        self.levels.len() - 1
    }

    pub fn kind(&self, depth: usize) -> NodeKind {
        self.levels[depth].kind
    }

    pub fn index(&self, depth: usize) -> usize {
        self.levels[depth].index
    }

    pub fn start(&self, depth: usize) -> usize {
        self.levels[depth].start
    }

    pub fn end(&self, depth: usize) -> usize {
        self.levels[depth].start + self.levels[depth].content_size
    }

    /// Position before the ancestor at `depth` (depth ≥ 1)
    pub fn before(&self, depth: usize) -> usize {
        self.start(depth) - 1
    }

    /// Position after the ancestor at `depth` (depth ≥ 1)
    pub fn after(&self, depth: usize) -> usize {
        self.end(depth) + 1
    }

    fn path(&self, depth: usize) -> &[usize] {
        &self.levels[depth].path
    }
}

/// Outcome of a structural move
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    /// Dropped onto itself; nothing changed
    Unchanged,
    Moved { block_id: BlockId, start: usize },
}

/// The document body
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    root: Node,
    version: u64,
}

impl Document {
    pub fn new(children: Vec<Node>) -> Self {
        Self {
            root: Node::container(NodeKind::Doc, children),
            version: 0,
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    pub fn content_size(&self) -> usize {
        self.root.content_size()
    }

    pub fn outline(&self) -> String {
        self.root.outline()
    }

    /// Resolve a position against the current tree
    pub fn resolve(&self, pos: usize) -> Option<ResolvedPos> {
        resolve_in(&self.root, pos)
    }

    /// Position of a node and its path from the root
    pub fn locate(&self, id: BlockId) -> Option<(Vec<usize>, usize)> {
        let mut path = Vec::new();
        let start = self.root.find_path(id, 0, &mut path)?;
        Some((path, start))
    }

    pub fn node(&self, id: BlockId) -> Option<&Node> {
        let (path, _) = self.locate(id)?;
        node_at(&self.root, &path)
    }

    /// Blocks that carry a drag handle, in document order
    ///
    /// Nested blocks are included. A list item's leading paragraph is
    /// covered by the item's handle.
    pub fn blocks(&self) -> Vec<Block> {
        let mut blocks = Vec::new();
        collect_blocks(&self.root, 0, self.version, &mut blocks);
        blocks
    }

    /// Handle block starting exactly at `pos`
    pub fn block_starting_at(&self, pos: usize) -> Option<Block> {
        self.blocks().into_iter().find(|b| b.start_position == pos)
    }

    /// Innermost handle block containing `pos`
    ///
    /// A position inside a list item's paragraph yields the list item.
    pub fn block_at(&self, pos: usize) -> Option<Block> {
        self.blocks()
            .into_iter()
            .filter(|b| b.start_position <= pos && pos < b.end_position())
            .max_by_key(|b| b.start_position)
    }

    /// Nearest position around `pos` where a `kind` node can be inserted
    ///
    /// Walks outwards from the innermost ancestor. Below the innermost level
    /// the slot goes before or after the child holding `pos`, whichever
    /// side of its midpoint `pos` is on. Returns `None` if no ancestor
    /// accepts the node.
    pub fn drop_point(&self, pos: usize, kind: NodeKind) -> Option<usize> {
        let resolved = self.resolve(pos)?;
        for depth in (0..=resolved.depth()).rev() {
            let bias_after = depth < resolved.depth()
                && pos * 2 > resolved.start(depth + 1) + resolved.end(depth + 1);
            let index = resolved.index(depth) + usize::from(bias_after);
            if !resolved.kind(depth).can_contain(kind, index) {
                continue;
            }
            return Some(if depth == resolved.depth() {
                pos
            } else if bias_after {
                resolved.after(depth + 1)
            } else {
                resolved.before(depth + 1)
            });
        }
        None
    }

    /// Move a handle block so it lands at `drop_pos`
    ///
    /// The source span is deleted first, then the insertion slot is mapped
    /// through that deletion. All work happens on a copy and is committed
    /// only if every step succeeds.
    pub fn move_block(&mut self, source: &Block, drop_pos: usize) -> CollabResult<MoveOutcome> {
        if source.version != self.version {
            return Err(CollabError::MoveAborted(format!(
                "block computed at version {}, document is at {}",
                source.version, self.version
            )));
        }
        let (path, start) = self
            .locate(source.id)
            .ok_or_else(|| CollabError::MoveAborted("source block not found".into()))?;
        if start != source.start_position {
            return Err(CollabError::MoveAborted("source block position mismatch".into()));
        }
        let from = start;
        let to = start + source.size;

        if from <= drop_pos && drop_pos <= to {
            return Ok(MoveOutcome::Unchanged);
        }
        let slot = self
            .drop_point(drop_pos, source.kind)
            .ok_or_else(|| CollabError::MoveAborted(format!("no legal slot near {}", drop_pos)))?;
        if slot == from || slot == to {
            return Ok(MoveOutcome::Unchanged);
        }
        if from < slot && slot < to {
            return Err(CollabError::MoveAborted("slot lies inside the dragged block".into()));
        }

        let mut next = self.root.clone();
        let (removed, deletion) = delete_at(&mut next, path, from)?;
        let target = deletion.map(slot, Assoc::Left);
        insert_at(&mut next, target, removed)?;

        self.root = next;
        self.version += 1;
        debug!(
            block_id = %source.id,
            from,
            slot,
            target,
            version = self.version,
            "block moved"
        );
        Ok(MoveOutcome::Moved {
            block_id: source.id,
            start: target,
        })
    }

    /// Insert text at an inline position
    ///
    /// Returns the step's position map, or `None` if `pos` is not inside a
    /// textblock. Only positions change; the set of blocks does not.
    pub fn insert_text(&mut self, pos: usize, text: &str) -> Option<StepMap> {
        let resolved = self.resolve(pos)?;
        let depth = resolved.depth();
        if !resolved.kind(depth).is_textblock() || text.is_empty() {
            return None;
        }
        let offset = pos - resolved.start(depth);
        let block = node_at_mut(&mut self.root, resolved.path(depth))?;

        match block.children.first_mut() {
            Some(existing) => {
                let byte = existing
                    .text
                    .char_indices()
                    .nth(offset)
                    .map(|(i, _)| i)
                    .unwrap_or(existing.text.len());
                existing.text.insert_str(byte, text);
            }
            None => block.children.push(Node::text(text)),
        }

        self.version += 1;
        Some(StepMap::insertion(pos, text.chars().count()))
    }
}

fn resolve_in(root: &Node, pos: usize) -> Option<ResolvedPos> {
    if pos > root.content_size() {
        return None;
    }

    let mut levels = Vec::new();
    let mut path = Vec::new();
    let mut node = root;
    let mut start = 0;
    loop {
        let (index, offset) = node.child_at(pos - start);
        levels.push(Level {
            path: path.clone(),
            kind: node.kind,
            start,
            content_size: node.content_size(),
            index,
        });

        let Some(child) = node.children.get(index) else {
            break;
        };
        if offset == pos - start || child.kind == NodeKind::Text || child.kind.is_atom() {
            break;
        }
        path.push(index);
        start += offset + 1;
        node = child;
    }

    Some(ResolvedPos { pos, levels })
}

fn collect_blocks(node: &Node, start: usize, version: u64, out: &mut Vec<Block>) {
    let parent_id = (node.kind != NodeKind::Doc).then_some(node.id);
    let mut offset = start;
    for (index, child) in node.children.iter().enumerate() {
        // The leading paragraph moves with its list item
        let leads_item = node.kind == NodeKind::ListItem && index == 0;
        if !leads_item {
            out.push(Block {
                id: child.id,
                start_position: offset,
                parent_id,
                kind: child.kind,
                size: child.size(),
                version,
            });
        }
        if !child.kind.is_textblock() && !child.kind.is_atom() {
            collect_blocks(child, offset + 1, version, out);
        }
        offset += child.size();
    }
}

fn node_at<'a>(root: &'a Node, path: &[usize]) -> Option<&'a Node> {
    path.iter().try_fold(root, |node, &i| node.children.get(i))
}

fn node_at_mut<'a>(root: &'a mut Node, path: &[usize]) -> Option<&'a mut Node> {
    path.iter()
        .try_fold(root, |node, &i| node.children.get_mut(i))
}

/// Remove the node at `path`, widening to ancestors that would be left invalid
///
/// Returns the addressed node and the map of the whole deletion.
fn delete_at(root: &mut Node, mut path: Vec<usize>, start: usize) -> CollabResult<(Node, StepMap)> {
    let missing = || CollabError::MoveAborted("source path vanished".into());
    let dragged = node_at(root, &path).ok_or_else(missing)?.clone();
    let (mut from, mut to) = (start, start + dragged.size());

    // Widen while removing the child would break the parent
    while path.len() > 1 {
        let (index, parent_path) = match path.split_last() {
            Some((&index, rest)) => (index, rest),
            None => break,
        };
        let parent = node_at(root, parent_path).ok_or_else(missing)?;
        let emptied = parent.kind.requires_content() && parent.children.len() == 1;
        let orphaned_lead = parent.kind == NodeKind::ListItem
            && index == 0
            && parent
                .children
                .get(1)
                .is_some_and(|next| next.kind != NodeKind::Paragraph);
        if !(emptied || orphaned_lead) {
            break;
        }
        let before: usize = parent.children[..index].iter().map(Node::size).sum();
        let after: usize = parent.children[index + 1..].iter().map(Node::size).sum();
        from -= before + 1;
        to += after + 1;
        path.pop();
    }

    let (index, parent_path) = path.split_last().ok_or_else(missing)?;
    let parent = node_at_mut(root, parent_path).ok_or_else(missing)?;
    parent.children.remove(*index);

    Ok((dragged, StepMap::deletion(from, to)))
}

fn insert_at(root: &mut Node, pos: usize, node: Node) -> CollabResult<()> {
    let resolved = resolve_in(root, pos)
        .ok_or_else(|| CollabError::MoveAborted(format!("insert position {} out of range", pos)))?;
    let depth = resolved.depth();
    let index = resolved.index(depth);
    let parent_kind = resolved.kind(depth);

    if !parent_kind.can_contain(node.kind, index) {
        return Err(CollabError::MoveAborted(format!(
            "{:?} cannot hold {:?} at index {}",
            parent_kind, node.kind, index
        )));
    }
    let parent = node_at_mut(root, resolved.path(depth))
        .ok_or_else(|| CollabError::MoveAborted("insert parent vanished".into()))?;
    parent.children.insert(index, node);
    Ok(())
}
