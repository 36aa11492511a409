use tracing::{debug, trace};

use crate::error::Result;

pub mod command;
pub mod history;
pub mod native;
pub mod node;
pub mod selection;
pub mod text;
pub mod tree;

pub use command::{CommandBus, CommandPriority, Registration};
pub use history::{History, UpdateTag};
pub use node::{
    Attachment, CustomAttachment, DecoratorNode, ElementKind, FormatType, HeadingTag, ListType,
    NodeData, NodeKey, PendingUpload, TextFormat, TextNode, TextStyle, UploadFile, UploadId,
    UploadStatus,
};
pub use selection::{NodeSelection, Point, PointKind, RangeSelection, Selection};
pub use tree::Tree;

/// A committed document plus the selection that goes with it.
#[derive(Clone, Debug)]
pub struct EditorState {
    pub tree: Tree,
    pub selection: Option<Selection>,
}

impl Default for EditorState {
    fn default() -> Self {
        let mut tree = Tree::new();
        let paragraph = tree.create_paragraph();
        let root = tree.root();
        let _ = tree.append(root, paragraph);
        Self {
            tree,
            selection: Some(Selection::caret(Point::element(paragraph, 0))),
        }
    }
}

impl EditorState {
    pub fn new(tree: Tree) -> Self {
        Self {
            tree,
            selection: None,
        }
    }

    pub fn range(&self) -> Option<&RangeSelection> {
        self.selection.as_ref().and_then(Selection::as_range)
    }

    pub fn node_selection(&self) -> Option<&NodeSelection> {
        self.selection.as_ref().and_then(Selection::as_node)
    }

    /// Anchor node and offset of a collapsed range selection.
    pub fn collapsed_anchor(&self) -> Option<Point> {
        let range = self.range()?;
        range.is_collapsed().then_some(range.anchor)
    }
}

/// Commit-time rewrite applied to every text node.
pub type TextTransform = fn(&mut TextNode);

/// Owns the committed state and serializes every change through
/// [`Engine::update`].
#[derive(Debug)]
pub struct Engine {
    state: EditorState,
    history: History,
    transforms: Vec<TextTransform>,
    version: u64,
}

impl Engine {
    pub fn new(state: EditorState, history_limit: usize) -> Self {
        let mut engine = Self {
            state,
            history: History::new(history_limit),
            transforms: Vec::new(),
            version: 0,
        };
        normalize(&mut engine.state, &engine.transforms);
        engine
    }

    pub fn state(&self) -> &EditorState {
        &self.state
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn read<T>(&self, f: impl FnOnce(&EditorState) -> T) -> T {
        f(&self.state)
    }

    pub fn register_text_transform(&mut self, transform: TextTransform) {
        self.transforms.push(transform);
    }

    pub fn update<T>(&mut self, f: impl FnOnce(&mut Transaction<'_>) -> Result<T>) -> Result<T> {
        self.update_tagged(UpdateTag::Default, f)
    }

    /// Runs `f` against a scratch copy of the state. On success the result is
    /// normalized and committed; on error the previous state is kept.
    pub fn update_tagged<T>(
        &mut self,
        tag: UpdateTag,
        f: impl FnOnce(&mut Transaction<'_>) -> Result<T>,
    ) -> Result<T> {
        let snapshot = self.state.clone();
        let result = {
            let mut tx = Transaction {
                tree: &mut self.state.tree,
                selection: &mut self.state.selection,
            };
            f(&mut tx)
        };
        match result {
            Ok(value) => {
                normalize(&mut self.state, &self.transforms);
                let tree_changed = !self.state.tree.same_content(&snapshot.tree);
                if tree_changed {
                    self.history.record(snapshot, tag);
                    self.version += 1;
                } else if self.state.selection != snapshot.selection {
                    self.version += 1;
                }
                trace!(tree_changed, ?tag, "committed update");
                Ok(value)
            }
            Err(err) => {
                debug!(%err, "update rolled back");
                self.state = snapshot;
                Err(err)
            }
        }
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn undo(&mut self) -> bool {
        let Some(previous) = self.history.undo(self.state.clone()) else {
            return false;
        };
        self.state = previous;
        self.version += 1;
        true
    }

    pub fn redo(&mut self) -> bool {
        let Some(next) = self.history.redo(self.state.clone()) else {
            return false;
        };
        self.state = next;
        self.version += 1;
        true
    }

    /// Replaces the whole document, dropping undo history.
    pub fn set_state(&mut self, state: EditorState) {
        self.state = state;
        normalize(&mut self.state, &self.transforms);
        self.history.clear();
        self.version += 1;
    }
}

/// Mutable view of the state inside [`Engine::update`].
pub struct Transaction<'a> {
    pub tree: &'a mut Tree,
    pub selection: &'a mut Option<Selection>,
}

impl Transaction<'_> {
    pub fn range(&self) -> Option<&RangeSelection> {
        self.selection.as_ref().and_then(Selection::as_range)
    }

    pub fn node_selection(&self) -> Option<&NodeSelection> {
        self.selection.as_ref().and_then(Selection::as_node)
    }

    pub fn set_selection(&mut self, selection: Option<Selection>) {
        *self.selection = selection;
    }

    pub fn set_caret(&mut self, point: Point) {
        *self.selection = Some(Selection::caret(point));
    }

    pub fn select_nodes(&mut self, keys: Vec<NodeKey>) {
        *self.selection = NodeSelection::new(keys).map(Selection::Node);
    }

    pub fn anchor_node(&self) -> Option<NodeKey> {
        self.range().map(|range| range.anchor.key)
    }

    /// Selects offsets inside `key`: characters for text nodes, child
    /// indices for elements.
    pub fn select(&mut self, key: NodeKey, anchor: usize, focus: usize) {
        let make = |offset| {
            if self.tree.is_text(key) {
                Point::text(key, offset)
            } else {
                Point::element(key, offset)
            }
        };
        let (anchor, focus) = (make(anchor), make(focus));
        *self.selection = Some(Selection::Range(RangeSelection::new(anchor, focus)));
    }

    pub fn select_start(&mut self, key: NodeKey) {
        let leaf = self.tree.first_descendant(key);
        let point = if self.tree.is_text(leaf) {
            Point::text(leaf, 0)
        } else if self.tree.is_element(leaf) {
            Point::element(leaf, 0)
        } else {
            let parent = self.tree.parent(leaf).unwrap_or(key);
            let index = self.tree.index_in_parent(leaf).unwrap_or(0);
            Point::element(parent, index)
        };
        self.set_caret(point);
    }

    pub fn select_end(&mut self, key: NodeKey) {
        let leaf = self.tree.last_descendant(key);
        let point = if self.tree.is_text(leaf) {
            Point::text(leaf, self.tree.text_len(leaf))
        } else if self.tree.is_element(leaf) {
            Point::element(leaf, self.tree.child_count(leaf))
        } else {
            let parent = self.tree.parent(leaf).unwrap_or(key);
            let index = self.tree.index_in_parent(leaf).map(|i| i + 1).unwrap_or(0);
            Point::element(parent, index)
        };
        self.set_caret(point);
    }

    /// Moves the caret just past `key`: into the next element's start, onto
    /// the next text at the given offsets, or after an atomic sibling.
    pub fn select_next(&mut self, key: NodeKey, anchor: usize, focus: usize) {
        let Some(parent) = self.tree.parent(key) else {
            return;
        };
        let Some(next) = self.tree.next_sibling(key) else {
            let len = self.tree.child_count(parent);
            self.select(parent, len, len);
            return;
        };
        match self.tree.data(next) {
            Some(NodeData::Element(_)) => self.select(next, 0, 0),
            Some(NodeData::Text(_)) => {
                let len = self.tree.text_len(next);
                self.select(next, anchor.min(len), focus.min(len));
            }
            _ => {
                let index = self.tree.index_in_parent(next).map(|i| i + 1).unwrap_or(0);
                self.select(parent, index, index);
            }
        }
    }

    pub fn select_previous(&mut self, key: NodeKey) {
        let Some(parent) = self.tree.parent(key) else {
            return;
        };
        let Some(previous) = self.tree.previous_sibling(key) else {
            self.select(parent, 0, 0);
            return;
        };
        match self.tree.data(previous) {
            Some(NodeData::Element(_)) => {
                let len = self.tree.child_count(previous);
                self.select(previous, len, len);
            }
            Some(NodeData::Text(_)) => {
                let len = self.tree.text_len(previous);
                self.select(previous, len, len);
            }
            _ => {
                let index = self.tree.index_in_parent(previous).unwrap_or(0);
                self.select(parent, index, index);
            }
        }
    }
}

fn normalize(state: &mut EditorState, transforms: &[TextTransform]) {
    enforce_content_models(&mut state.tree);

    for key in state.tree.document_order() {
        if let Some(NodeData::Text(text)) = state.tree.data_mut(key) {
            for transform in transforms {
                transform(text);
            }
        }
    }

    merge_text_runs(state);
    let dropped = state.tree.prune_detached();
    if dropped > 0 {
        trace!(dropped, "pruned detached nodes");
    }
    validate_selection(state);
}

fn enforce_content_models(tree: &mut Tree) {
    loop {
        let mut changed = false;
        for key in tree.document_order() {
            if !tree.is_attached(key) {
                continue;
            }
            let Some(kind) = tree.element_kind(key).cloned() else {
                continue;
            };
            match kind {
                ElementKind::List(_) | ElementKind::Link { .. } if tree.child_count(key) == 0 => {
                    let _ = tree.remove(key);
                    changed = true;
                }
                ElementKind::List(_) => {
                    for child in tree.children(key).to_vec() {
                        if tree.is_kind(child, |kind| matches!(kind, ElementKind::ListItem)) {
                            continue;
                        }
                        let item = tree.create(NodeData::Element(ElementKind::ListItem));
                        if tree.replace(child, item).is_ok() && tree.append(item, child).is_ok() {
                            changed = true;
                        }
                    }
                }
                _ => {}
            }
        }
        if !changed {
            break;
        }
    }
}

fn references(selection: &Option<Selection>, key: NodeKey) -> bool {
    match selection {
        Some(Selection::Range(range)) => range.anchor.key == key || range.focus.key == key,
        Some(Selection::Node(nodes)) => nodes.contains(key),
        None => false,
    }
}

fn remap_points(selection: &mut Option<Selection>, remap: impl Fn(Point) -> Point) {
    if let Some(Selection::Range(range)) = selection {
        range.anchor = remap(range.anchor);
        range.focus = remap(range.focus);
    }
}

/// Joins adjacent text nodes with identical marks and drops empty text
/// nodes the selection does not point into.
fn merge_text_runs(state: &mut EditorState) {
    let elements: Vec<NodeKey> = state
        .tree
        .document_order()
        .into_iter()
        .filter(|key| state.tree.is_element(*key))
        .collect();
    for parent in elements {
        let mut index = 0;
        while index < state.tree.child_count(parent) {
            let Some(current) = state.tree.child_at(parent, index) else {
                break;
            };
            let Some(NodeData::Text(current_text)) = state.tree.data(current).cloned() else {
                index += 1;
                continue;
            };
            if current_text.text.is_empty() && !references(&state.selection, current) {
                let _ = state.tree.remove(current);
                remap_points(&mut state.selection, |point| {
                    if point.key == parent && point.kind == PointKind::Element && point.offset > index
                    {
                        Point::element(parent, point.offset - 1)
                    } else {
                        point
                    }
                });
                continue;
            }
            let Some(next) = state.tree.child_at(parent, index + 1) else {
                break;
            };
            let mergeable = matches!(
                state.tree.data(next),
                Some(NodeData::Text(next_text)) if next_text.same_marks(&current_text)
            );
            if !mergeable {
                index += 1;
                continue;
            }
            let shift = current_text.char_len();
            let next_text = state.tree.text(next).unwrap_or_default().to_string();
            if let Some(NodeData::Text(text)) = state.tree.data_mut(current) {
                text.text.push_str(&next_text);
            }
            let _ = state.tree.remove(next);
            remap_points(&mut state.selection, |point| {
                if point.key == next {
                    Point::text(current, shift + point.offset)
                } else if point.key == parent && point.kind == PointKind::Element {
                    if point.offset == index + 1 {
                        Point::text(current, shift)
                    } else if point.offset > index + 1 {
                        Point::element(parent, point.offset - 1)
                    } else {
                        point
                    }
                } else {
                    point
                }
            });
        }
    }
}

fn validate_selection(state: &mut EditorState) {
    let tree = &state.tree;
    let fixed = match state.selection.take() {
        None => None,
        Some(Selection::Node(nodes)) => nodes.retain_attached(tree).map(Selection::Node),
        Some(Selection::Range(mut range)) => {
            let anchor = repair_point(tree, range.anchor);
            let focus = repair_point(tree, range.focus);
            match (anchor, focus) {
                (Some(anchor), Some(focus)) => {
                    range.anchor = anchor;
                    range.focus = focus;
                    Some(Selection::Range(range))
                }
                (Some(point), None) | (None, Some(point)) => Some(Selection::caret(point)),
                (None, None) => {
                    debug!("selection pointed at removed nodes, moving caret to document end");
                    document_end(tree).map(Selection::caret)
                }
            }
        }
    };
    state.selection = fixed;
}

fn repair_point(tree: &Tree, point: Point) -> Option<Point> {
    if point.is_valid(tree) {
        return Some(point);
    }
    if !tree.is_attached(point.key) {
        return None;
    }
    if tree.is_text(point.key) {
        return Some(Point::text(point.key, point.offset.min(tree.text_len(point.key))));
    }
    if tree.is_element(point.key) {
        return Some(Point::element(
            point.key,
            point.offset.min(tree.child_count(point.key)),
        ));
    }
    let parent = tree.parent(point.key)?;
    let index = tree.index_in_parent(point.key)?;
    Some(Point::element(parent, index))
}

fn document_end(tree: &Tree) -> Option<Point> {
    let leaf = tree.last_descendant(tree.root());
    if tree.is_text(leaf) {
        return Some(Point::text(leaf, tree.text_len(leaf)));
    }
    if tree.is_element(leaf) {
        return Some(Point::element(leaf, tree.child_count(leaf)));
    }
    let parent = tree.parent(leaf)?;
    Some(Point::element(parent, tree.index_in_parent(leaf)? + 1))
}
