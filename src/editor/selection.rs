//! Range versus node selection: neighbor lookups around the caret, decorator
//! selection by keyboard, node-set deletion and the selected-node marks.

use std::collections::BTreeSet;

use ratatui::layout::Rect;
use tracing::debug;

use super::{Commands, CommandPayload, Editor, EditorCommand, register_handler};
use crate::engine::{
    CommandPriority, NodeData, NodeKey, Point, PointKind, RangeSelection, Selection, Tree,
};
use crate::error::Result;

/// Keys carrying the "selected" marker. Lives next to the tree so that
/// re-marking never touches the document or its history.
#[derive(Clone, Debug, Default)]
pub struct SelectionMarks {
    selected: BTreeSet<NodeKey>,
}

impl SelectionMarks {
    pub fn contains(&self, key: NodeKey) -> bool {
        self.selected.contains(&key)
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = NodeKey> + '_ {
        self.selected.iter().copied()
    }

    /// Replaces the marked set with the nodes of `selection` and reports the
    /// difference against the previous pass.
    pub fn sync(&mut self, selection: Option<&Selection>) -> MarkDiff {
        let current: BTreeSet<NodeKey> = match selection {
            Some(Selection::Node(nodes)) => nodes.keys().iter().copied().collect(),
            _ => BTreeSet::new(),
        };
        let diff = MarkDiff {
            added: current.difference(&self.selected).copied().collect(),
            removed: self.selected.difference(&current).copied().collect(),
        };
        self.selected = current;
        diff
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MarkDiff {
    pub added: Vec<NodeKey>,
    pub removed: Vec<NodeKey>,
}

impl MarkDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Whatever draws the document and can tell where the caret ended up.
pub trait CaretSurface {
    /// Caret rectangle as measured by the surface.
    fn caret_rect(&self, caret: Point) -> Option<Rect>;
    /// Measures again with a zero-width marker placed at the caret.
    fn caret_rect_with_marker(&self, caret: Point) -> Option<Rect>;
    /// Height of a line at the caret, in surface units.
    fn line_height(&self, caret: Point) -> u16;
    /// Where the editable area starts.
    fn root_origin(&self) -> Rect;
}

/// Caret position relative to the editable area, already pushed below the
/// line the caret sits on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CursorPosition {
    pub x: i32,
    pub y: i32,
    pub font_size: u16,
}

fn is_reliable(rect: &Rect) -> bool {
    let empty = rect.width == 0 && rect.height == 0;
    let at_origin = rect.x == 0 && rect.y == 0;
    !empty && !at_origin
}

fn find_next_sibling_up(tree: &Tree, key: NodeKey) -> Option<NodeKey> {
    let root = tree.root();
    tree.ancestors(key)
        .take_while(|node| *node != root)
        .find_map(|node| tree.next_sibling(node))
}

fn find_previous_sibling_up(tree: &Tree, key: NodeKey) -> Option<NodeKey> {
    let root = tree.root();
    tree.ancestors(key)
        .take_while(|node| *node != root)
        .find_map(|node| tree.previous_sibling(node))
}

fn next_from_text_end(tree: &Tree, text: NodeKey) -> Option<NodeKey> {
    if let Some(next) = tree.next_sibling(text).filter(|next| tree.is_decorator(*next)) {
        return Some(next);
    }
    tree.parent(text).and_then(|parent| tree.next_sibling(parent))
}

fn previous_from_text_start(tree: &Tree, text: NodeKey) -> Option<NodeKey> {
    if let Some(previous) = tree.previous_sibling(text).filter(|previous| tree.is_decorator(*previous))
    {
        return Some(previous);
    }
    tree.parent(text).and_then(|parent| tree.previous_sibling(parent))
}

fn after_element(tree: &Tree, element: NodeKey, offset: usize) -> Option<NodeKey> {
    if offset < tree.child_count(element) {
        tree.child_at(element, offset)
    } else {
        find_next_sibling_up(tree, element)
    }
}

fn before_element(tree: &Tree, element: NodeKey, offset: usize) -> Option<NodeKey> {
    if offset > 0 {
        tree.child_at(element, offset - 1)
    } else {
        find_previous_sibling_up(tree, element)
    }
}

pub(super) fn node_after(tree: &Tree, caret: Point) -> Option<NodeKey> {
    match caret.kind {
        PointKind::Text if caret.offset == tree.text_len(caret.key) => {
            next_from_text_end(tree, caret.key)
        }
        PointKind::Text => None,
        PointKind::Element => after_element(tree, caret.key, caret.offset),
    }
}

pub(super) fn node_before(tree: &Tree, caret: Point) -> Option<NodeKey> {
    match caret.kind {
        PointKind::Text if caret.offset == 0 => previous_from_text_start(tree, caret.key),
        PointKind::Text => None,
        PointKind::Element => before_element(tree, caret.key, caret.offset),
    }
}

// The text rules here ignore the offset on purpose: Up/Down navigate by
// block from anywhere in the line.
pub(super) fn top_level_node_after(tree: &Tree, caret: Point) -> Option<NodeKey> {
    match caret.kind {
        PointKind::Text => next_from_text_end(tree, caret.key),
        PointKind::Element => after_element(tree, caret.key, caret.offset),
    }
}

pub(super) fn top_level_node_before(tree: &Tree, caret: Point) -> Option<NodeKey> {
    match caret.kind {
        PointKind::Text => previous_from_text_start(tree, caret.key),
        PointKind::Element => before_element(tree, caret.key, caret.offset),
    }
}

/// Direct neighbors of a collapsed caret, without walking up.
fn node_before_position(tree: &Tree, caret: Point) -> Option<NodeKey> {
    match caret.kind {
        PointKind::Text if caret.offset == 0 => tree.previous_sibling(caret.key),
        PointKind::Text => None,
        PointKind::Element if caret.offset > 0 => tree.child_at(caret.key, caret.offset - 1),
        PointKind::Element => None,
    }
}

fn node_after_position(tree: &Tree, caret: Point) -> Option<NodeKey> {
    match caret.kind {
        PointKind::Text if caret.offset == tree.text_len(caret.key) => tree.next_sibling(caret.key),
        PointKind::Text => None,
        PointKind::Element => tree.child_at(caret.key, caret.offset),
    }
}

fn is_block_decorator(tree: &Tree, key: NodeKey) -> bool {
    tree.data(key).is_some_and(NodeData::is_block_decorator)
}

impl Editor {
    pub fn has_node_selection(&self) -> bool {
        self.state().node_selection().is_some()
    }

    pub fn node_after_cursor(&self) -> Option<NodeKey> {
        let caret = self.state().collapsed_anchor()?;
        node_after(self.tree(), caret)
    }

    pub fn node_before_cursor(&self) -> Option<NodeKey> {
        let caret = self.state().collapsed_anchor()?;
        node_before(self.tree(), caret)
    }

    pub fn top_level_node_after_cursor(&self) -> Option<NodeKey> {
        let caret = self.state().collapsed_anchor()?;
        top_level_node_after(self.tree(), caret)
    }

    pub fn top_level_node_before_cursor(&self) -> Option<NodeKey> {
        let caret = self.state().collapsed_anchor()?;
        top_level_node_before(self.tree(), caret)
    }

    /// Screen position of a collapsed caret, or `None` for anything else.
    pub fn cursor_position(&self, surface: &dyn CaretSurface) -> Option<CursorPosition> {
        let caret = self.state().collapsed_anchor()?;
        let rect = match surface.caret_rect(caret) {
            Some(rect) if is_reliable(&rect) => rect,
            _ => surface.caret_rect_with_marker(caret)?,
        };
        let origin = surface.root_origin();
        let font_size = surface.line_height(caret);
        Some(CursorPosition {
            x: i32::from(rect.x) - i32::from(origin.x),
            y: i32::from(rect.y) - i32::from(origin.y) + i32::from(font_size),
            font_size,
        })
    }

    /// Anchor node and offset of a range selection, or the first selected
    /// node at offset zero.
    pub fn selected_node_with_offset(&self) -> Option<(NodeKey, usize)> {
        match self.selection()? {
            Selection::Range(range) => Some((range.anchor.key, range.anchor.offset)),
            Selection::Node(nodes) => Some((nodes.first(), 0)),
        }
    }

    /// Runs `f` and puts a range selection back where it was.
    pub fn preserving_selection<T>(&mut self, f: impl FnOnce(&mut Editor) -> Result<T>) -> Result<T> {
        let saved = self.state().range().map(|range| (range.anchor, range.focus));
        let value = f(self)?;
        if let Some((anchor, focus)) = saved {
            self.update(|tx| {
                if anchor.is_valid(tx.tree) && focus.is_valid(tx.tree) {
                    tx.set_selection(Some(Selection::Range(RangeSelection::new(anchor, focus))));
                }
                Ok(())
            })?;
        }
        Ok(value)
    }

    /// A non-collapsed range inside one top-level block, without line breaks.
    pub fn has_selected_words_in_single_line(&self) -> bool {
        let Some(range) = self.state().range() else {
            return false;
        };
        if range.is_collapsed() {
            return false;
        }
        let tree = self.tree();
        if tree.top_level(range.anchor.key) != tree.top_level(range.focus.key) {
            return false;
        }
        !range.nodes(tree).iter().any(|key| tree.is_line_break(*key))
    }

    pub fn is_inside_list(&self) -> bool {
        self.state()
            .range()
            .is_some_and(|range| super::query::is_inside_list(self.tree(), range.anchor.key))
    }

    /// Selects a decorator as a whole, as a click on it would.
    pub fn select_node_by_key(&mut self, key: NodeKey) -> Result<bool> {
        self.update(|tx| {
            if !tx.tree.is_decorator(key) || !tx.tree.is_attached(key) {
                return Ok(false);
            }
            tx.select_node(key);
            Ok(true)
        })
    }

    /// Moves to the start of the block after the current one, appending an
    /// empty paragraph when there is none.
    pub fn select_or_append_next_line(&mut self) -> Result<()> {
        self.update(|tx| {
            let current = match tx.selection.as_ref() {
                Some(Selection::Node(nodes)) => Some(nodes.first()),
                Some(Selection::Range(range)) => Some(range.anchor.key),
                None => None,
            };
            let Some(top) = current.and_then(|key| tx.tree.top_level(key)) else {
                return Ok(());
            };
            match tx.tree.next_sibling(top) {
                Some(next) => tx.select_start(next),
                None => {
                    let paragraph = tx.tree.create_paragraph();
                    let root = tx.tree.root();
                    tx.tree.append(root, paragraph)?;
                    tx.select_start(paragraph);
                }
            }
            Ok(())
        })
    }

    pub fn place_cursor_at_the_end(&mut self) -> Result<()> {
        self.update(|tx| {
            let root = tx.tree.root();
            tx.select_end(root);
            Ok(())
        })
    }

    /// Removes every node of a node selection and lands the caret next to
    /// where they were. Returns whether anything was removed.
    pub fn delete_selected_nodes(&mut self) -> Result<bool> {
        self.update(|tx| {
            let Some(nodes) = tx.node_selection().cloned() else {
                return Ok(false);
            };
            let adjacent = tx
                .tree
                .previous_sibling(nodes.first())
                .or_else(|| tx.tree.next_sibling(nodes.last()))
                .filter(|key| !nodes.contains(*key));

            for key in nodes.keys() {
                let (Some(parent), Some(index)) = (tx.tree.parent(*key), tx.tree.index_in_parent(*key))
                else {
                    continue;
                };
                tx.tree.splice(parent, index, 1, &[])?;
            }
            tx.set_selection(None);

            let root = tx.tree.root();
            if tx.tree.child_count(root) == 0 {
                let paragraph = tx.tree.create_paragraph();
                tx.tree.append(root, paragraph)?;
                tx.select_start(paragraph);
            } else if let Some(adjacent) = adjacent.filter(|key| tx.tree.is_attached(*key)) {
                if tx.tree.is_text(adjacent) || tx.tree.is_paragraph(adjacent) {
                    tx.select_end(adjacent);
                } else {
                    tx.select_next(adjacent, 0, 0);
                }
            }
            debug!(removed = nodes.keys().len(), "deleted selected nodes");
            Ok(true)
        })
    }

    /// Typing right next to a block decorator starts a new paragraph beside
    /// it instead of touching the decorator.
    pub(super) fn handle_printable_input(&mut self, text: &str) -> Result<bool> {
        let Some(caret) = self.state().collapsed_anchor() else {
            return Ok(false);
        };
        let tree = self.tree();
        if let Some(before) = node_before_position(tree, caret).filter(|key| is_block_decorator(tree, *key)) {
            self.create_paragraph_after_node(before, Some(text))?;
            return Ok(true);
        }
        if let Some(after) = node_after_position(tree, caret).filter(|key| is_block_decorator(tree, *key)) {
            self.create_paragraph_before_node(after, Some(text))?;
            return Ok(true);
        }
        Ok(false)
    }

    fn select_decorator(&mut self, key: Option<NodeKey>) -> Result<bool> {
        match key.filter(|key| self.tree().is_decorator(*key)) {
            Some(key) => self.select_node_by_key(key),
            None => Ok(false),
        }
    }

    fn move_out_of_node_selection(&mut self, backward: bool, vertical: bool) -> Result<bool> {
        let Some(nodes) = self.state().node_selection().cloned() else {
            return Ok(false);
        };
        let tree = self.tree();
        let edge = if backward { nodes.first() } else { nodes.last() };
        let blocked = tree.top_level(edge).is_some_and(|top| {
            if backward {
                tree.previous_sibling(top).is_none()
            } else {
                tree.next_sibling(top).is_none()
            }
        });
        if vertical && blocked {
            return Ok(true);
        }
        self.update(|tx| {
            tx.set_selection(None);
            if backward {
                tx.select_previous(nodes.first());
            } else {
                tx.select_next(nodes.last(), 0, 0);
            }
            Ok(true)
        })
    }
}

fn arrow(editor: &mut Editor, backward: bool, vertical: bool) -> Result<bool> {
    if editor.has_node_selection() {
        return editor.move_out_of_node_selection(backward, vertical);
    }
    let neighbor = match (backward, vertical) {
        (true, false) => editor.node_before_cursor(),
        (false, false) => editor.node_after_cursor(),
        (true, true) => editor.top_level_node_before_cursor(),
        (false, true) => editor.top_level_node_after_cursor(),
    };
    editor.select_decorator(neighbor)
}

fn delete(editor: &mut Editor, backward: bool) -> Result<bool> {
    let neighbor = if backward {
        editor.node_before_cursor()
    } else {
        editor.node_after_cursor()
    };
    if editor.select_decorator(neighbor)? {
        return Ok(true);
    }
    editor.delete_selected_nodes()
}

pub(super) fn register(bus: &mut Commands) {
    let low = CommandPriority::Low;
    register_handler(bus, EditorCommand::MoveLeft, low, |editor, _| arrow(editor, true, false));
    register_handler(bus, EditorCommand::MoveRight, low, |editor, _| arrow(editor, false, false));
    register_handler(bus, EditorCommand::MoveUp, low, |editor, _| arrow(editor, true, true));
    register_handler(bus, EditorCommand::MoveDown, low, |editor, _| arrow(editor, false, true));
    register_handler(bus, EditorCommand::DeleteBackward, low, |editor, _| delete(editor, true));
    register_handler(bus, EditorCommand::DeleteForward, low, |editor, _| delete(editor, false));
    register_handler(bus, EditorCommand::InsertText, low, |editor, payload| match payload {
        CommandPayload::Text(text) => editor.handle_printable_input(text),
        _ => Ok(false),
    });
    register_handler(bus, EditorCommand::Space, low, |editor, _| {
        editor.handle_printable_input(" ")
    });
}
