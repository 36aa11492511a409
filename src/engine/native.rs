//! Built-in editing behavior: what happens to the tree when nobody above
//! the engine claims a key.

use std::{cmp::Ordering, collections::HashSet};

use super::Transaction;
use super::node::{ElementKind, FormatType, ListType, NodeData, NodeKey, TextFormat, TextNode};
use super::selection::{
    NodeSelection, Point, PointKind, RangeSelection, Selection, after_node, before_node,
    block_len, block_offset, caret_block_of, caret_blocks, inline_leaves, is_caret_block,
    leaf_len, point_in_block,
};
use super::text::{char_to_byte_idx, next_word_boundary, previous_word_boundary};
use super::tree::Tree;
use crate::error::{EditorError, Result};

const OBJECT_REPLACEMENT: char = '\u{FFFC}';

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaretMove {
    Left,
    Right,
    Up,
    Down,
    WordLeft,
    WordRight,
    LineStart,
    LineEnd,
}

/// Text of a caret block where every non-text leaf counts as one character.
pub fn block_text(tree: &Tree, block: NodeKey) -> String {
    let mut out = String::new();
    for leaf in inline_leaves(tree, block) {
        match tree.data(leaf) {
            Some(NodeData::Text(text)) => out.push_str(&text.text),
            Some(NodeData::LineBreak) => out.push('\n'),
            Some(_) => out.push(OBJECT_REPLACEMENT),
            None => {}
        }
    }
    out
}

/// Format of the text a caret at `point` would continue.
pub fn format_at(tree: &Tree, point: Point) -> TextFormat {
    match (point.kind, tree.data(point.key)) {
        (PointKind::Text, Some(NodeData::Text(text))) => text.format,
        _ => TextFormat::NONE,
    }
}

/// Text nodes that carry at least one selected character. A collapsed
/// range yields the text node under the caret, if any.
pub fn selected_text_nodes(tree: &Tree, range: &RangeSelection) -> Vec<NodeKey> {
    let (start, end) = range.ordered(tree);
    range
        .nodes(tree)
        .into_iter()
        .filter(|key| tree.is_text(*key))
        .filter(|key| {
            if range.is_collapsed() {
                return true;
            }
            let len = tree.text_len(*key);
            let starts_at_end = start.kind == PointKind::Text && start.key == *key && start.offset >= len;
            let ends_at_start = end.kind == PointKind::Text && end.key == *key && end.offset == 0;
            len > 0 && !starts_at_end && !ends_at_start
        })
        .collect()
}

pub fn is_block_empty(tree: &Tree, key: NodeKey) -> bool {
    tree.children(key)
        .iter()
        .all(|child| tree.text(*child).is_some_and(str::is_empty))
}

fn previous_caret_block(tree: &Tree, block: NodeKey) -> Option<NodeKey> {
    let blocks = caret_blocks(tree);
    let index = blocks.iter().position(|candidate| *candidate == block)?;
    index.checked_sub(1).and_then(|idx| blocks.get(idx).copied())
}

fn next_caret_block(tree: &Tree, block: NodeKey) -> Option<NodeKey> {
    let blocks = caret_blocks(tree);
    let index = blocks.iter().position(|candidate| *candidate == block)?;
    blocks.get(index + 1).copied()
}

/// First caret block at or after `point`.
fn resolve_start(tree: &Tree, point: Point) -> Option<(NodeKey, usize)> {
    if let Some(found) = block_offset(tree, point) {
        return Some(found);
    }
    caret_blocks(tree)
        .into_iter()
        .find(|block| Point::element(*block, 0).compare(&point, tree) != Ordering::Less)
        .map(|block| (block, 0))
}

/// Last caret block at or before `point`.
fn resolve_end(tree: &Tree, point: Point) -> Option<(NodeKey, usize)> {
    if let Some(found) = block_offset(tree, point) {
        return Some(found);
    }
    caret_blocks(tree)
        .into_iter()
        .rev()
        .find(|block| {
            let end = Point::element(*block, tree.child_count(*block));
            end.compare(&point, tree) != Ordering::Greater
        })
        .map(|block| (block, block_len(tree, block)))
}

fn previous_node_up(tree: &Tree, key: NodeKey) -> Option<NodeKey> {
    let root = tree.root();
    tree.ancestors(key)
        .take_while(|candidate| *candidate != root)
        .find_map(|candidate| tree.previous_sibling(candidate))
}

fn next_node_up(tree: &Tree, key: NodeKey) -> Option<NodeKey> {
    let root = tree.root();
    tree.ancestors(key)
        .take_while(|candidate| *candidate != root)
        .find_map(|candidate| tree.next_sibling(candidate))
}

fn is_container(tree: &Tree, key: NodeKey) -> bool {
    tree.is_kind(key, |kind| {
        matches!(kind, ElementKind::List(_) | ElementKind::ListItem | ElementKind::Quote)
    })
}

impl Transaction<'_> {
    pub fn select_node(&mut self, key: NodeKey) {
        *self.selection = Some(Selection::Node(NodeSelection::single(key)));
    }

    pub fn collapsed_caret(&self) -> Option<Point> {
        self.range()
            .filter(|range| range.is_collapsed())
            .map(|range| range.anchor)
    }

    /// Collapses the selection onto `offset` of a caret block, picking up
    /// the format of the text found there.
    pub fn place_caret(&mut self, block: NodeKey, offset: usize) {
        let point = point_in_block(self.tree, block, offset);
        let mut range = RangeSelection::collapsed(point);
        range.format = format_at(self.tree, point);
        *self.selection = Some(Selection::Range(range));
    }

    fn set_caret_with_format(&mut self, point: Point, format: TextFormat) {
        let mut range = RangeSelection::collapsed(point);
        range.format = format;
        *self.selection = Some(Selection::Range(range));
    }

    fn remap_points(&mut self, remap: impl Fn(Point) -> Point) {
        if let Some(Selection::Range(range)) = self.selection.as_mut() {
            range.anchor = remap(range.anchor);
            range.focus = remap(range.focus);
        }
    }

    /// Points into `old` (as an element) now point into `new`.
    pub fn remap_element(&mut self, old: NodeKey, new: NodeKey) {
        self.remap_points(|point| {
            if point.key == old && point.kind == PointKind::Element {
                Point::element(new, point.offset)
            } else {
                point
            }
        });
    }

    /// Places the caret right behind `node`.
    pub fn caret_after(&mut self, node: NodeKey) {
        if self.tree.data(node).is_some_and(|data| data.is_element() && !data.is_inline()) {
            self.select_end(node);
            return;
        }
        let point = match self.tree.data(node) {
            Some(NodeData::Text(text)) => Some(Point::text(node, text.char_len())),
            _ => after_node(self.tree, node),
        };
        if let Some(point) = point {
            let format = format_at(self.tree, point);
            self.set_caret_with_format(point, format);
        }
    }

    /// Cuts a text node at `offset`; the tail becomes a new sibling with the
    /// same marks. Selection points past the cut follow the tail.
    pub fn split_text(&mut self, key: NodeKey, offset: usize) -> Result<NodeKey> {
        let tail = {
            let Some(NodeData::Text(node)) = self.tree.data_mut(key) else {
                return Err(EditorError::InvalidNodeKind {
                    key,
                    expected: "text",
                });
            };
            let byte = char_to_byte_idx(&node.text, offset);
            TextNode {
                text: node.text.split_off(byte),
                format: node.format,
                style: node.style.clone(),
            }
        };
        let tail = self.tree.create(NodeData::Text(tail));
        self.tree.insert_after(key, tail)?;
        let parent = self.tree.parent(key);
        let index = self.tree.index_in_parent(key).unwrap_or(0);
        self.remap_points(|point| match point.kind {
            PointKind::Text if point.key == key && point.offset > offset => {
                Point::text(tail, point.offset - offset)
            }
            PointKind::Element if Some(point.key) == parent && point.offset > index => {
                Point::element(point.key, point.offset + 1)
            }
            _ => point,
        });
        Ok(tail)
    }

    /// Splits text so that `point` falls between two children and returns
    /// that gap as `(parent, index)`.
    pub fn split_at_point(&mut self, point: Point) -> Result<(NodeKey, usize)> {
        match point.kind {
            PointKind::Element => Ok((
                point.key,
                point.offset.min(self.tree.child_count(point.key)),
            )),
            PointKind::Text => {
                let parent = self
                    .tree
                    .parent(point.key)
                    .ok_or(EditorError::NodeNotFound(point.key))?;
                let index = self
                    .tree
                    .index_in_parent(point.key)
                    .ok_or(EditorError::NodeNotFound(point.key))?;
                if point.offset == 0 {
                    return Ok((parent, index));
                }
                if point.offset < self.tree.text_len(point.key) {
                    self.split_text(point.key, point.offset)?;
                }
                Ok((parent, index + 1))
            }
        }
    }

    /// Splits `block` at `point`, moving everything after the point into a
    /// new sibling of the same kind. Inline elements in between split too.
    pub fn split_block(&mut self, block: NodeKey, point: Point) -> Result<NodeKey> {
        let (mut parent, mut index) = self.split_at_point(point)?;
        loop {
            if parent == self.tree.root() {
                return Err(EditorError::InvalidStructure(format!(
                    "{block} does not contain the split point"
                )));
            }
            let data = self.tree.try_data(parent)?.clone();
            let tail_children = self.tree.children(parent)[index.min(self.tree.child_count(parent))..].to_vec();
            let sibling = self.tree.create(data);
            self.tree.append_all(sibling, &tail_children)?;
            self.tree.insert_after(parent, sibling)?;
            let split_at = index;
            let split_parent = parent;
            self.remap_points(|point| {
                if point.key == split_parent && point.kind == PointKind::Element && point.offset > split_at {
                    Point::element(sibling, point.offset - split_at)
                } else {
                    point
                }
            });
            if parent == block {
                return Ok(sibling);
            }
            index = self
                .tree
                .index_in_parent(parent)
                .ok_or(EditorError::NodeNotFound(parent))?
                + 1;
            parent = self
                .tree
                .parent(parent)
                .ok_or(EditorError::NodeNotFound(parent))?;
        }
    }

    /// Moves the children of `key` in front of it and removes it.
    pub fn unwrap_element(&mut self, key: NodeKey) -> Result<Vec<NodeKey>> {
        let children = self.tree.children(key).to_vec();
        for child in &children {
            self.tree.insert_before(key, *child)?;
        }
        self.tree.remove(key)?;
        Ok(children)
    }

    pub fn set_element_kind(&mut self, key: NodeKey, kind: ElementKind) -> Result<()> {
        match self.tree.data_mut(key) {
            Some(data @ NodeData::Element(_)) => {
                *data = NodeData::Element(kind);
                Ok(())
            }
            Some(_) => Err(EditorError::InvalidNodeKind {
                key,
                expected: "element",
            }),
            None => Err(EditorError::NodeNotFound(key)),
        }
    }

    /// Removes characters `[start, end)` of a caret block.
    fn delete_inline(&mut self, block: NodeKey, start: usize, end: usize) -> Result<()> {
        if start >= end {
            return Ok(());
        }
        let mut position = 0;
        for leaf in inline_leaves(self.tree, block) {
            let len = leaf_len(self.tree, leaf);
            let (leaf_start, leaf_end) = (position, position + len);
            position = leaf_end;
            if leaf_end <= start || leaf_start >= end {
                continue;
            }
            let emptied = match self.tree.data_mut(leaf) {
                Some(NodeData::Text(node)) => {
                    let from = char_to_byte_idx(&node.text, start.saturating_sub(leaf_start));
                    let to = char_to_byte_idx(&node.text, (end - leaf_start).min(len));
                    node.text.replace_range(from..to, "");
                    node.text.is_empty()
                }
                _ => start <= leaf_start && leaf_end <= end,
            };
            if emptied {
                self.tree.remove(leaf)?;
            }
        }
        Ok(())
    }

    /// Index at which inline content appended to `block` belongs: before
    /// any nested block children.
    fn inline_insert_index(&self, block: NodeKey) -> usize {
        self.tree
            .children(block)
            .iter()
            .position(|child| !self.tree.data(*child).is_some_and(NodeData::is_inline))
            .unwrap_or(self.tree.child_count(block))
    }

    /// Appends the inline content of `source` to `target` and removes
    /// `source` along with any containers it leaves empty.
    fn merge_blocks(&mut self, target: NodeKey, source: NodeKey) -> Result<()> {
        let inline: Vec<NodeKey> = self
            .tree
            .children(source)
            .iter()
            .copied()
            .filter(|child| self.tree.data(*child).is_some_and(NodeData::is_inline))
            .collect();
        let mut index = self.inline_insert_index(target);
        for child in inline {
            self.tree.insert_at(target, index, child)?;
            index += 1;
        }
        if self.tree.child_count(source) == 0 {
            self.remove_with_empty_ancestors(source)?;
        }
        Ok(())
    }

    pub fn remove_with_empty_ancestors(&mut self, key: NodeKey) -> Result<()> {
        let root = self.tree.root();
        let mut current = key;
        loop {
            let parent = self.tree.parent(current);
            self.tree.remove(current)?;
            match parent {
                Some(parent)
                    if parent != root
                        && self.tree.child_count(parent) == 0
                        && is_container(self.tree, parent) =>
                {
                    current = parent;
                }
                _ => return Ok(()),
            }
        }
    }

    /// Removes every node strictly between two caret blocks that is not an
    /// ancestor of the second one.
    fn remove_between(&mut self, first: NodeKey, last: NodeKey) -> Result<()> {
        let order = self.tree.document_order();
        let first_end = self.tree.last_descendant(first);
        let (Some(from), Some(to)) = (
            order.iter().position(|key| *key == first_end),
            order.iter().position(|key| *key == last),
        ) else {
            return Ok(());
        };
        let mut removed = HashSet::new();
        for key in order.iter().take(to).skip(from + 1) {
            if self.tree.is_ancestor_of(*key, last) {
                continue;
            }
            let parent_removed = self
                .tree
                .parent(*key)
                .is_some_and(|parent| removed.contains(&parent));
            removed.insert(*key);
            if !parent_removed {
                self.tree.remove(*key)?;
            }
        }
        Ok(())
    }

    /// Removes everything between the ends of `range` and leaves a collapsed
    /// caret where the range began.
    pub fn delete_range(&mut self, range: &RangeSelection) -> Result<()> {
        let (start, end) = range.ordered(self.tree);
        let start_block = resolve_start(self.tree, start);
        let end_block = resolve_end(self.tree, end);

        let covered: Vec<NodeKey> = self
            .tree
            .document_order()
            .into_iter()
            .filter(|key| self.tree.data(*key).is_some_and(NodeData::is_block_decorator))
            .filter(|key| {
                let (Some(before), Some(after)) =
                    (before_node(self.tree, *key), after_node(self.tree, *key))
                else {
                    return false;
                };
                start.compare(&before, self.tree) != Ordering::Greater
                    && after.compare(&end, self.tree) != Ordering::Greater
            })
            .collect();
        for key in covered {
            self.tree.remove(key)?;
        }

        let caret = match (start_block, end_block) {
            (Some((first, from)), Some((last, to))) if first == last => {
                self.delete_inline(first, from, to)?;
                Some((first, from))
            }
            (Some((first, from)), Some((last, to)))
                if Point::element(first, 0).compare(&Point::element(last, 0), self.tree)
                    == Ordering::Less =>
            {
                let first_len = block_len(self.tree, first);
                self.delete_inline(first, from, first_len)?;
                self.delete_inline(last, 0, to)?;
                self.remove_between(first, last)?;
                self.merge_blocks(first, last)?;
                Some((first, from))
            }
            (Some(found), _) => Some(found),
            (None, Some((last, _))) => Some((last, block_len(self.tree, last))),
            (None, None) => None,
        };
        match caret {
            Some((block, offset)) if self.tree.is_attached(block) => {
                self.place_caret(block, offset);
            }
            _ => self.set_caret(start),
        }
        Ok(())
    }

    /// Clears a non-collapsed range or steps out of a node selection so that
    /// a collapsed caret remains. Returns the format typed text should use.
    fn prepare_insertion(&mut self) -> Result<TextFormat> {
        match self.selection.clone() {
            Some(Selection::Range(range)) => {
                if !range.is_collapsed() {
                    self.delete_range(&range)?;
                }
                Ok(range.format)
            }
            Some(Selection::Node(nodes)) => {
                let last = nodes.last();
                let point = after_node(self.tree, last).ok_or(EditorError::NodeNotFound(last))?;
                self.set_caret(point);
                Ok(TextFormat::NONE)
            }
            None => {
                let root = self.tree.root();
                let point = Point::element(root, self.tree.child_count(root));
                self.set_caret(point);
                Ok(TextFormat::NONE)
            }
        }
    }

    fn accepts_inline(&self, key: NodeKey) -> bool {
        match self.tree.element_kind(key) {
            Some(ElementKind::Quote) => is_caret_block(self.tree, key),
            Some(kind) => kind.holds_inline_content() || matches!(kind, ElementKind::ListItem),
            None => false,
        }
    }

    /// Puts an inline node at `point`, wrapping it in a fresh paragraph (or
    /// list item) when the point sits between blocks.
    fn insert_inline_at(&mut self, point: Point, node: NodeKey) -> Result<()> {
        let (parent, index) = self.split_at_point(point)?;
        if self.accepts_inline(parent) {
            return self.tree.insert_at(parent, index, node);
        }
        let wrapper = if self.tree.is_kind(parent, ElementKind::is_list) {
            ElementKind::ListItem
        } else {
            ElementKind::Paragraph
        };
        let block = self.tree.create(NodeData::Element(wrapper));
        self.tree.append(block, node)?;
        self.tree.insert_at(parent, index, block)
    }

    fn insert_block_at(&mut self, caret: Point, node: NodeKey) -> Result<()> {
        let root = self.tree.root();
        let Some(block) = caret_block_of(self.tree, caret.key) else {
            let (parent, index) = self.split_at_point(caret)?;
            return self.tree.insert_at(parent, index, node);
        };
        if block == root {
            return self.tree.append(root, node);
        }
        if let Some(item) = self
            .tree
            .find_ancestor(block, |data| matches!(data, NodeData::Element(ElementKind::ListItem)))
        {
            let top = self.tree.top_level(item).unwrap_or(item);
            return self.tree.insert_after(top, node);
        }
        if self.tree.is_paragraph(block) && is_block_empty(self.tree, block) {
            return self.tree.replace(block, node);
        }
        let len = block_len(self.tree, block);
        let offset = block_offset(self.tree, caret).map(|(_, offset)| offset).unwrap_or(len);
        if offset == 0 {
            self.tree.insert_before(block, node)
        } else if offset >= len {
            self.tree.insert_after(block, node)
        } else {
            let tail = self.split_block(block, caret)?;
            self.tree.insert_before(tail, node)
        }
    }

    /// Inserts `nodes` at the selection. Inline nodes go in at the caret,
    /// block nodes split the block around it.
    pub fn insert_nodes(&mut self, nodes: &[NodeKey]) -> Result<()> {
        self.prepare_insertion()?;
        for node in nodes {
            let Some(caret) = self.collapsed_caret() else {
                return Err(EditorError::InvalidSelection(
                    "no caret to insert nodes at".into(),
                ));
            };
            if self.tree.data(*node).is_some_and(NodeData::is_inline) {
                self.insert_inline_at(caret, *node)?;
            } else {
                self.insert_block_at(caret, *node)?;
            }
            self.caret_after(*node);
        }
        Ok(())
    }

    pub fn insert_text(&mut self, text: &str) -> Result<()> {
        if text.is_empty() {
            return Ok(());
        }
        let format = self.prepare_insertion()?;
        let Some(caret) = self.collapsed_caret() else {
            return Err(EditorError::InvalidSelection(
                "no caret to insert text at".into(),
            ));
        };
        let inserted = text.chars().count();
        if caret.kind == PointKind::Text
            && let Some(NodeData::Text(node)) = self.tree.data_mut(caret.key)
            && node.format == format
        {
            let byte = char_to_byte_idx(&node.text, caret.offset);
            node.text.insert_str(byte, text);
            self.set_caret_with_format(Point::text(caret.key, caret.offset + inserted), format);
            return Ok(());
        }
        let style = match self.tree.data(caret.key) {
            Some(NodeData::Text(node)) => node.style.clone(),
            _ => Default::default(),
        };
        let node = self.tree.create(NodeData::Text(
            TextNode::new(text).with_format(format).with_style(style),
        ));
        self.insert_inline_at(caret, node)?;
        self.set_caret_with_format(Point::text(node, inserted), format);
        Ok(())
    }

    pub fn insert_line_break(&mut self) -> Result<()> {
        self.prepare_insertion()?;
        let Some(caret) = self.collapsed_caret() else {
            return Ok(());
        };
        let line_break = self.tree.create(NodeData::LineBreak);
        self.insert_inline_at(caret, line_break)?;
        self.caret_after(line_break);
        Ok(())
    }

    /// Enter.
    pub fn insert_paragraph(&mut self) -> Result<()> {
        match self.selection.clone() {
            Some(Selection::Node(nodes)) => {
                let paragraph = self.tree.create_paragraph();
                self.tree.insert_after(nodes.last(), paragraph)?;
                self.set_caret(Point::element(paragraph, 0));
                return Ok(());
            }
            Some(Selection::Range(range)) if !range.is_collapsed() => self.delete_range(&range)?,
            _ => {}
        }
        let Some(caret) = self.collapsed_caret() else {
            return Ok(());
        };
        let root = self.tree.root();
        let Some(block) = caret_block_of(self.tree, caret.key) else {
            let (parent, index) = self.split_at_point(caret)?;
            let kind = if self.tree.is_kind(parent, ElementKind::is_list) {
                ElementKind::ListItem
            } else {
                ElementKind::Paragraph
            };
            let paragraph = self.tree.create(NodeData::Element(kind));
            self.tree.insert_at(parent, index, paragraph)?;
            self.set_caret(Point::element(paragraph, 0));
            return Ok(());
        };
        if block == root {
            let first = self.tree.create_paragraph();
            let second = self.tree.create_paragraph();
            self.tree.append_all(root, &[first, second])?;
            self.set_caret(Point::element(second, 0));
            return Ok(());
        }

        let len = block_len(self.tree, block);
        let offset = block_offset(self.tree, caret).map(|(_, offset)| offset).unwrap_or(len);
        let Some(kind) = self.tree.element_kind(block).cloned() else {
            return Ok(());
        };
        match kind {
            ElementKind::Code { .. } => return self.insert_code_break(block, offset, len),
            ElementKind::ListItem if is_block_empty(self.tree, block) => {
                return self.exit_list_item(block);
            }
            ElementKind::Heading(_) if offset >= len => {
                let paragraph = self.tree.create_paragraph();
                self.tree.insert_after(block, paragraph)?;
                self.set_caret(Point::element(paragraph, 0));
                return Ok(());
            }
            ElementKind::Heading(_) if offset == 0 => {
                let paragraph = self.tree.create_paragraph();
                self.tree.insert_before(block, paragraph)?;
                self.place_caret(block, 0);
                return Ok(());
            }
            _ => {}
        }
        let tail = self.split_block(block, caret)?;
        if kind.is_quote() {
            self.set_element_kind(tail, ElementKind::Paragraph)?;
        }
        self.place_caret(tail, 0);
        Ok(())
    }

    fn insert_code_break(&mut self, block: NodeKey, offset: usize, len: usize) -> Result<()> {
        let children = self.tree.children(block).to_vec();
        let trailing_breaks = children
            .iter()
            .rev()
            .take_while(|child| self.tree.is_line_break(**child))
            .count();
        if offset >= len && trailing_breaks >= 2 {
            for line_break in children.iter().rev().take(2) {
                self.tree.remove(*line_break)?;
            }
            let paragraph = self.tree.create_paragraph();
            self.tree.insert_after(block, paragraph)?;
            self.set_caret(Point::element(paragraph, 0));
            return Ok(());
        }
        self.insert_line_break()
    }

    fn exit_list_item(&mut self, item: NodeKey) -> Result<()> {
        let nested = self
            .tree
            .parent(item)
            .and_then(|list| self.tree.parent(list))
            .is_some_and(|parent| self.tree.is_kind(parent, |kind| matches!(kind, ElementKind::ListItem)));
        if nested {
            self.outdent_item(item)?;
            self.place_caret(item, 0);
            return Ok(());
        }
        let paragraph = self.list_item_to_paragraph(item)?;
        self.place_caret(paragraph, 0);
        Ok(())
    }

    /// Turns a list item into a paragraph right after its list, splitting
    /// the list when later items follow. Nested lists move along behind the
    /// paragraph.
    pub fn list_item_to_paragraph(&mut self, item: NodeKey) -> Result<NodeKey> {
        let list = self.tree.parent(item).ok_or(EditorError::NodeNotFound(item))?;
        let list_kind = self
            .tree
            .element_kind(list)
            .cloned()
            .ok_or(EditorError::InvalidNodeKind {
                key: list,
                expected: "list",
            })?;
        let following = self.tree.next_siblings(item);
        if !following.is_empty() {
            let rest = self.tree.create(NodeData::Element(list_kind));
            self.tree.insert_after(list, rest)?;
            self.tree.append_all(rest, &following)?;
        }
        let (inline, blocks): (Vec<NodeKey>, Vec<NodeKey>) = self
            .tree
            .children(item)
            .iter()
            .copied()
            .partition(|child| self.tree.data(*child).is_some_and(NodeData::is_inline));
        let paragraph = self.tree.create_paragraph();
        self.tree.append_all(paragraph, &inline)?;
        self.tree.insert_after(list, paragraph)?;
        let mut anchor = paragraph;
        for block in blocks {
            self.tree.insert_after(anchor, block)?;
            anchor = block;
        }
        self.remap_element(item, paragraph);
        self.tree.remove(item)?;
        if self.tree.child_count(list) == 0 {
            self.tree.remove(list)?;
        }
        Ok(paragraph)
    }

    pub fn delete_backward(&mut self) -> Result<bool> {
        self.delete_character(true)
    }

    pub fn delete_forward(&mut self) -> Result<bool> {
        self.delete_character(false)
    }

    fn delete_character(&mut self, backward: bool) -> Result<bool> {
        let range = match self.selection.clone() {
            None => return Ok(false),
            Some(Selection::Node(nodes)) => {
                self.remove_node_selection(nodes.keys())?;
                return Ok(true);
            }
            Some(Selection::Range(range)) => range,
        };
        if !range.is_collapsed() {
            self.delete_range(&range)?;
            return Ok(true);
        }
        let caret = range.anchor;
        let Some((block, offset)) = block_offset(self.tree, caret) else {
            return self.delete_beside_element_point(caret, backward);
        };
        let len = block_len(self.tree, block);
        if backward && offset > 0 {
            self.delete_inline(block, offset - 1, offset)?;
            self.place_caret(block, offset - 1);
            return Ok(true);
        }
        if !backward && offset < len {
            self.delete_inline(block, offset, offset + 1)?;
            self.place_caret(block, offset);
            return Ok(true);
        }
        if block == self.tree.root() {
            return Ok(false);
        }
        if backward {
            self.collapse_block_start(block)
        } else {
            self.join_next_block(block)
        }
    }

    fn remove_node_selection(&mut self, keys: &[NodeKey]) -> Result<()> {
        let first = keys[0];
        let parent = self.tree.parent(first);
        let index = self.tree.index_in_parent(first);
        for key in keys {
            self.tree.remove(*key)?;
        }
        let (Some(parent), Some(index)) = (parent, index) else {
            return Ok(());
        };
        if let Some(previous) = index.checked_sub(1).and_then(|idx| self.tree.child_at(parent, idx)) {
            self.select_end(previous);
        } else if let Some(next) = self.tree.child_at(parent, index) {
            self.select_start(next);
        } else {
            self.set_caret(Point::element(parent, 0));
        }
        Ok(())
    }

    fn delete_beside_element_point(&mut self, caret: Point, backward: bool) -> Result<bool> {
        let neighbor = if backward {
            caret
                .offset
                .checked_sub(1)
                .and_then(|idx| self.tree.child_at(caret.key, idx))
        } else {
            self.tree.child_at(caret.key, caret.offset)
        };
        let Some(neighbor) = neighbor else {
            return Ok(false);
        };
        if self.tree.is_element(neighbor) {
            if backward {
                self.select_end(neighbor);
            } else {
                self.select_start(neighbor);
            }
            return Ok(true);
        }
        let index = self.tree.index_in_parent(neighbor).unwrap_or(0);
        self.tree.remove(neighbor)?;
        self.set_caret(Point::element(caret.key, index));
        Ok(true)
    }

    /// Backspace at the very start of a caret block.
    fn collapse_block_start(&mut self, block: NodeKey) -> Result<bool> {
        match self.tree.element_kind(block).cloned() {
            Some(ElementKind::ListItem) => {
                let paragraph = self.list_item_to_paragraph(block)?;
                self.place_caret(paragraph, 0);
                return Ok(true);
            }
            Some(ElementKind::Heading(_) | ElementKind::Code { .. } | ElementKind::Quote) => {
                self.set_element_kind(block, ElementKind::Paragraph)?;
                self.place_caret(block, 0);
                return Ok(true);
            }
            _ => {}
        }
        if let Some(quote) = self.tree.parent(block)
            && self.tree.is_kind(quote, ElementKind::is_quote)
            && self.tree.index_in_parent(block) == Some(0)
        {
            self.tree.insert_before(quote, block)?;
            if self.tree.child_count(quote) == 0 {
                self.tree.remove(quote)?;
            }
            self.place_caret(block, 0);
            return Ok(true);
        }
        if let Some(previous) = previous_node_up(self.tree, block)
            && self.tree.data(previous).is_some_and(NodeData::is_block_decorator)
        {
            self.tree.remove(previous)?;
            self.place_caret(block, 0);
            return Ok(true);
        }
        let Some(target) = previous_caret_block(self.tree, block) else {
            return Ok(false);
        };
        let target_len = block_len(self.tree, target);
        self.merge_blocks(target, block)?;
        self.place_caret(target, target_len);
        Ok(true)
    }

    /// Delete at the very end of a caret block.
    fn join_next_block(&mut self, block: NodeKey) -> Result<bool> {
        if let Some(next) = next_node_up(self.tree, block)
            && self.tree.data(next).is_some_and(NodeData::is_block_decorator)
        {
            self.tree.remove(next)?;
            let len = block_len(self.tree, block);
            self.place_caret(block, len);
            return Ok(true);
        }
        let Some(next) = next_caret_block(self.tree, block) else {
            return Ok(false);
        };
        let len = block_len(self.tree, block);
        self.merge_blocks(block, next)?;
        self.place_caret(block, len);
        Ok(true)
    }

    pub fn delete_word_backward(&mut self) -> Result<bool> {
        let Some((block, offset)) = self
            .collapsed_caret()
            .and_then(|caret| block_offset(self.tree, caret))
        else {
            return self.delete_backward();
        };
        if offset == 0 {
            return self.delete_backward();
        }
        let start = previous_word_boundary(&block_text(self.tree, block), offset);
        self.delete_inline(block, start, offset)?;
        self.place_caret(block, start);
        Ok(true)
    }

    pub fn delete_word_forward(&mut self) -> Result<bool> {
        let Some((block, offset)) = self
            .collapsed_caret()
            .and_then(|caret| block_offset(self.tree, caret))
        else {
            return self.delete_forward();
        };
        if offset >= block_len(self.tree, block) {
            return self.delete_forward();
        }
        let end = next_word_boundary(&block_text(self.tree, block), offset);
        self.delete_inline(block, offset, end)?;
        self.place_caret(block, offset);
        Ok(true)
    }

    /// Moves the caret, or only the focus when `extend` is set. Returns
    /// false when there is nowhere to go.
    pub fn move_caret(&mut self, movement: CaretMove, extend: bool) -> bool {
        let range = match self.selection.clone() {
            Some(Selection::Range(range)) => range,
            Some(Selection::Node(nodes)) => {
                let target = match movement {
                    CaretMove::Left | CaretMove::Up | CaretMove::WordLeft | CaretMove::LineStart => {
                        before_node(self.tree, nodes.first())
                    }
                    _ => after_node(self.tree, nodes.last()),
                };
                let Some(point) = target else {
                    return false;
                };
                self.set_caret(point);
                return true;
            }
            None => return false,
        };
        if !extend && !range.is_collapsed() && matches!(movement, CaretMove::Left | CaretMove::Right) {
            let (start, end) = range.ordered(self.tree);
            let point = if movement == CaretMove::Left { start } else { end };
            let format = format_at(self.tree, point);
            self.set_caret_with_format(point, format);
            return true;
        }
        let Some(target) = self.caret_target(range.focus, movement) else {
            return false;
        };
        if extend {
            let mut extended = range;
            extended.focus = target;
            *self.selection = Some(Selection::Range(extended));
        } else {
            let format = format_at(self.tree, target);
            self.set_caret_with_format(target, format);
        }
        true
    }

    fn caret_target(&self, point: Point, movement: CaretMove) -> Option<Point> {
        let tree = &*self.tree;
        let (block, offset) = block_offset(tree, point).or_else(|| resolve_start(tree, point))?;
        let len = block_len(tree, block);
        let previous = || previous_caret_block(tree, block);
        let next = || next_caret_block(tree, block);
        let (target, target_offset) = match movement {
            CaretMove::Left if offset > 0 => (block, offset - 1),
            CaretMove::Right if offset < len => (block, offset + 1),
            CaretMove::Left => {
                let previous = previous()?;
                (previous, block_len(tree, previous))
            }
            CaretMove::Right => (next()?, 0),
            CaretMove::Up => {
                let previous = previous()?;
                (previous, offset.min(block_len(tree, previous)))
            }
            CaretMove::Down => {
                let next = next()?;
                (next, offset.min(block_len(tree, next)))
            }
            CaretMove::LineStart => (block, 0),
            CaretMove::LineEnd => (block, len),
            CaretMove::WordLeft if offset > 0 => {
                (block, previous_word_boundary(&block_text(tree, block), offset))
            }
            CaretMove::WordLeft => {
                let previous = previous()?;
                (previous, block_len(tree, previous))
            }
            CaretMove::WordRight if offset < len => {
                (block, next_word_boundary(&block_text(tree, block), offset))
            }
            CaretMove::WordRight => (next()?, 0),
        };
        Some(point_in_block(tree, target, target_offset))
    }

    /// Splits text at both ends of the range and returns the inline leaves
    /// that lie fully inside it.
    fn split_selected_inline(&mut self) -> Result<Vec<NodeKey>> {
        let Some(range) = self.range().cloned() else {
            return Ok(Vec::new());
        };
        let (start, _) = range.ordered(self.tree);
        let (start_parent, start_index) = self.split_at_point(start)?;
        let start_gap = Point::element(start_parent, start_index);
        // The start split remaps the selection, so read the end again.
        let Some(range) = self.range().cloned() else {
            return Ok(Vec::new());
        };
        let (_, end) = range.ordered(self.tree);
        let (end_parent, end_index) = self.split_at_point(end)?;
        let end_gap = Point::element(end_parent, end_index);
        let tree = &*self.tree;
        Ok(tree
            .document_order()
            .into_iter()
            .filter(|key| tree.data(*key).is_some_and(|data| data.is_inline() && !data.is_element()))
            .filter(|key| {
                let (Some(before), Some(after)) = (before_node(tree, *key), after_node(tree, *key))
                else {
                    return false;
                };
                start_gap.compare(&before, tree) != Ordering::Greater
                    && after.compare(&end_gap, tree) != Ordering::Greater
            })
            .collect())
    }

    fn select_run(&mut self, leaves: &[NodeKey], backward: bool) {
        let (Some(first), Some(last)) = (leaves.first(), leaves.last()) else {
            return;
        };
        let start = if self.tree.is_text(*first) {
            Some(Point::text(*first, 0))
        } else {
            before_node(self.tree, *first)
        };
        let end = if self.tree.is_text(*last) {
            Some(Point::text(*last, self.tree.text_len(*last)))
        } else {
            after_node(self.tree, *last)
        };
        let (Some(start), Some(end)) = (start, end) else {
            return;
        };
        let mut range = if backward {
            RangeSelection::new(end, start)
        } else {
            RangeSelection::new(start, end)
        };
        range.format = format_at(self.tree, start);
        *self.selection = Some(Selection::Range(range));
    }

    /// Toggles `format` over the selected text. The first selected text node
    /// decides the direction. A collapsed caret toggles the format that the
    /// next typed text gets.
    pub fn format_text(&mut self, format: FormatType) -> Result<()> {
        let Some(mut range) = self.range().cloned() else {
            return Ok(());
        };
        if range.is_collapsed() {
            range.format = range.format.toggled(format);
            *self.selection = Some(Selection::Range(range));
            return Ok(());
        }
        let backward = range.is_backward(self.tree);
        let texts: Vec<NodeKey> = self
            .split_selected_inline()?
            .into_iter()
            .filter(|key| self.tree.is_text(*key))
            .collect();
        let Some(first) = texts.first() else {
            return Ok(());
        };
        let enable = !format_at(self.tree, Point::text(*first, 0)).has(format);
        for key in &texts {
            if let Some(NodeData::Text(node)) = self.tree.data_mut(*key) {
                node.format = node.format.set(format, enable);
            }
        }
        self.select_run(&texts, backward);
        Ok(())
    }

    /// Sets (`Some`) or clears (`None`) style properties on the selected text.
    pub fn patch_style_text(&mut self, patch: &[(&str, Option<&str>)]) -> Result<()> {
        let Some(range) = self.range().cloned() else {
            return Ok(());
        };
        if range.is_collapsed() {
            return Ok(());
        }
        let backward = range.is_backward(self.tree);
        let texts: Vec<NodeKey> = self
            .split_selected_inline()?
            .into_iter()
            .filter(|key| self.tree.is_text(*key))
            .collect();
        for key in &texts {
            if let Some(NodeData::Text(node)) = self.tree.data_mut(*key) {
                for (property, value) in patch {
                    node.style.set(property, *value);
                }
            }
        }
        self.select_run(&texts, backward);
        Ok(())
    }

    /// Links the selection to `url`, or removes links from it with `None`.
    pub fn toggle_link(&mut self, url: Option<&str>) -> Result<()> {
        let Some(range) = self.range().cloned() else {
            return Ok(());
        };
        let is_link = |data: &NodeData| matches!(data, NodeData::Element(ElementKind::Link { .. }));
        let Some(url) = url else {
            let mut links = Vec::new();
            for key in range.nodes(self.tree) {
                if let Some(link) = self.tree.find_ancestor(key, is_link)
                    && !links.contains(&link)
                {
                    links.push(link);
                }
            }
            for link in links {
                self.unwrap_element(link)?;
            }
            return Ok(());
        };
        if range.is_collapsed() {
            if let Some(link) = self.tree.find_ancestor(range.anchor.key, is_link) {
                self.set_element_kind(link, ElementKind::Link { url: url.to_string() })?;
            }
            return Ok(());
        }
        let backward = range.is_backward(self.tree);
        let leaves = self.split_selected_inline()?;
        let mut groups: Vec<Vec<NodeKey>> = Vec::new();
        for leaf in &leaves {
            let Some(parent) = self.tree.parent(*leaf) else {
                continue;
            };
            if self.tree.data(parent).is_some_and(is_link) {
                self.set_element_kind(parent, ElementKind::Link { url: url.to_string() })?;
                continue;
            }
            match groups.last_mut() {
                Some(group)
                    if group
                        .last()
                        .is_some_and(|last| self.tree.next_sibling(*last) == Some(*leaf)) =>
                {
                    group.push(*leaf);
                }
                _ => groups.push(vec![*leaf]),
            }
        }
        for group in groups {
            let link = self.tree.create(NodeData::Element(ElementKind::Link {
                url: url.to_string(),
            }));
            self.tree.insert_before(group[0], link)?;
            self.tree.append_all(link, &group)?;
        }
        self.select_run(&leaves, backward);
        Ok(())
    }

    /// Caret blocks touched by the selection, in document order.
    pub fn selected_blocks(&self) -> Vec<NodeKey> {
        let tree = &*self.tree;
        match self.selection.as_ref() {
            Some(Selection::Range(range)) => {
                let (start, end) = range.ordered(tree);
                let (Some((first, _)), Some((last, _))) =
                    (resolve_start(tree, start), resolve_end(tree, end))
                else {
                    return Vec::new();
                };
                let blocks = caret_blocks(tree);
                let (Some(from), Some(to)) = (
                    blocks.iter().position(|block| *block == first),
                    blocks.iter().position(|block| *block == last),
                ) else {
                    return Vec::new();
                };
                if to < from {
                    return Vec::new();
                }
                blocks[from..=to].to_vec()
            }
            Some(Selection::Node(nodes)) => {
                let mut blocks = Vec::new();
                for key in nodes.keys() {
                    if let Some(block) = caret_block_of(tree, *key)
                        && !blocks.contains(&block)
                    {
                        blocks.push(block);
                    }
                }
                blocks
            }
            None => Vec::new(),
        }
    }

    fn selected_list_items(&self) -> Vec<NodeKey> {
        let mut items = Vec::new();
        for block in self.selected_blocks() {
            if let Some(item) = self
                .tree
                .find_ancestor(block, |data| matches!(data, NodeData::Element(ElementKind::ListItem)))
                && !items.contains(&item)
            {
                items.push(item);
            }
        }
        items
    }

    /// Turns the selected blocks into list items of `list_type`. Blocks
    /// already in a list switch that list's type.
    pub fn insert_list(&mut self, list_type: ListType) -> Result<()> {
        let root = self.tree.root();
        let mut current: Option<NodeKey> = None;
        for block in self.selected_blocks() {
            if let Some(list) = self
                .tree
                .find_ancestor(block, |data| matches!(data, NodeData::Element(ElementKind::List(_))))
            {
                self.set_element_kind(list, ElementKind::List(list_type))?;
                current = None;
                continue;
            }
            let item = self.tree.create(NodeData::Element(ElementKind::ListItem));
            if block == root {
                let list = self.tree.create(NodeData::Element(ElementKind::List(list_type)));
                self.tree.append(list, item)?;
                self.tree.append(root, list)?;
                self.set_caret(Point::element(item, 0));
                continue;
            }
            self.tree.move_children(block, item)?;
            let reuse = current
                .filter(|list| self.tree.next_sibling(*list) == Some(block))
                .or_else(|| {
                    self.tree
                        .previous_sibling(block)
                        .filter(|previous| {
                            self.tree.element_kind(*previous) == Some(&ElementKind::List(list_type))
                        })
                });
            let list = match reuse {
                Some(list) => list,
                None => {
                    let list = self.tree.create(NodeData::Element(ElementKind::List(list_type)));
                    self.tree.insert_before(block, list)?;
                    list
                }
            };
            self.tree.append(list, item)?;
            self.remap_element(block, item);
            self.tree.remove(block)?;
            current = Some(list);
        }
        Ok(())
    }

    /// Nests each selected list item under its previous sibling.
    pub fn indent_list_items(&mut self) -> Result<bool> {
        let mut changed = false;
        for item in self.selected_list_items() {
            let Some(previous) = self.tree.previous_sibling(item) else {
                continue;
            };
            let Some(list_kind) = self.tree.parent(item).and_then(|list| self.tree.element_kind(list)).cloned() else {
                continue;
            };
            let nested = match self
                .tree
                .last_child(previous)
                .filter(|child| self.tree.is_kind(*child, ElementKind::is_list))
            {
                Some(nested) => nested,
                None => {
                    let nested = self.tree.create(NodeData::Element(list_kind));
                    self.tree.append(previous, nested)?;
                    nested
                }
            };
            self.tree.append(nested, item)?;
            changed = true;
        }
        Ok(changed)
    }

    /// Moves each selected nested list item one level up.
    pub fn outdent_list_items(&mut self) -> Result<bool> {
        let mut changed = false;
        for item in self.selected_list_items() {
            changed |= self.outdent_item(item)?;
        }
        Ok(changed)
    }

    fn outdent_item(&mut self, item: NodeKey) -> Result<bool> {
        let Some(list) = self.tree.parent(item) else {
            return Ok(false);
        };
        let Some(parent_item) = self
            .tree
            .parent(list)
            .filter(|parent| self.tree.is_kind(*parent, |kind| matches!(kind, ElementKind::ListItem)))
        else {
            return Ok(false);
        };
        let following = self.tree.next_siblings(item);
        if !following.is_empty() {
            let list_kind = self
                .tree
                .element_kind(list)
                .cloned()
                .unwrap_or(ElementKind::List(ListType::Bullet));
            let nested = match self
                .tree
                .last_child(item)
                .filter(|child| self.tree.is_kind(*child, ElementKind::is_list))
            {
                Some(nested) => nested,
                None => {
                    let nested = self.tree.create(NodeData::Element(list_kind));
                    self.tree.append(item, nested)?;
                    nested
                }
            };
            self.tree.append_all(nested, &following)?;
        }
        self.tree.insert_after(parent_item, item)?;
        if self.tree.child_count(list) == 0 {
            self.tree.remove(list)?;
        }
        Ok(true)
    }
}

#[cfg(test)]
#[path = "native_tests.rs"]
mod native_tests;
