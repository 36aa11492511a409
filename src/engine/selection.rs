use std::cmp::Ordering;

use super::node::{ElementKind, NodeData, NodeKey, TextFormat};
use super::tree::Tree;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PointKind {
    Text,
    Element,
}

/// A caret position. Text points count characters inside a text node,
/// element points count children of an element.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Point {
    pub key: NodeKey,
    pub offset: usize,
    pub kind: PointKind,
}

impl Point {
    pub fn text(key: NodeKey, offset: usize) -> Self {
        Self {
            key,
            offset,
            kind: PointKind::Text,
        }
    }

    pub fn element(key: NodeKey, offset: usize) -> Self {
        Self {
            key,
            offset,
            kind: PointKind::Element,
        }
    }

    pub fn is_valid(&self, tree: &Tree) -> bool {
        if !tree.is_attached(self.key) {
            return false;
        }
        match self.kind {
            PointKind::Text => tree.is_text(self.key) && self.offset <= tree.text_len(self.key),
            PointKind::Element => {
                tree.is_element(self.key) && self.offset <= tree.child_count(self.key)
            }
        }
    }

    /// Sort key in document order. Children sit at odd slots so that an
    /// element point at child `i` lands before that child's content.
    fn order_key(&self, tree: &Tree) -> Option<Vec<usize>> {
        let path = tree.path(self.key)?;
        let mut key: Vec<usize> = path.into_iter().map(|index| index * 2 + 1).collect();
        match self.kind {
            PointKind::Text => key.push(self.offset),
            PointKind::Element => key.push(self.offset * 2),
        }
        Some(key)
    }

    pub fn compare(&self, other: &Point, tree: &Tree) -> Ordering {
        match (self.order_key(tree), other.order_key(tree)) {
            (Some(a), Some(b)) => a.cmp(&b),
            _ => Ordering::Equal,
        }
    }

    /// The node a caret at this point sits in or in front of.
    pub fn node(&self, tree: &Tree) -> NodeKey {
        match self.kind {
            PointKind::Text => self.key,
            PointKind::Element => match tree.child_at(self.key, self.offset) {
                Some(child) => tree.first_descendant(child),
                None => match tree.last_child(self.key) {
                    Some(last) => tree.last_descendant(last),
                    None => self.key,
                },
            },
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RangeSelection {
    pub anchor: Point,
    pub focus: Point,
    /// Format applied to text typed at a collapsed caret.
    pub format: TextFormat,
}

impl RangeSelection {
    pub fn new(anchor: Point, focus: Point) -> Self {
        Self {
            anchor,
            focus,
            format: TextFormat::NONE,
        }
    }

    pub fn collapsed(point: Point) -> Self {
        Self::new(point, point)
    }

    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.focus
    }

    pub fn is_backward(&self, tree: &Tree) -> bool {
        self.anchor.compare(&self.focus, tree) == Ordering::Greater
    }

    /// Start and end in document order.
    pub fn ordered(&self, tree: &Tree) -> (Point, Point) {
        if self.is_backward(tree) {
            (self.focus, self.anchor)
        } else {
            (self.anchor, self.focus)
        }
    }

    /// Every node touched by the range, in document order.
    pub fn nodes(&self, tree: &Tree) -> Vec<NodeKey> {
        let (start, end) = self.ordered(tree);
        let first = start.node(tree);
        if self.is_collapsed() {
            return vec![first];
        }
        let last = end.node(tree);
        let order = tree.document_order();
        let Some(from) = order.iter().position(|key| *key == first) else {
            return vec![first];
        };
        let to = order.iter().position(|key| *key == last).unwrap_or(from);
        if to < from {
            return vec![first];
        }
        order[from..=to].to_vec()
    }
}

/// Explicitly selected whole nodes. Never empty.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeSelection {
    keys: Vec<NodeKey>,
}

impl NodeSelection {
    pub fn new(keys: Vec<NodeKey>) -> Option<Self> {
        let mut unique = Vec::with_capacity(keys.len());
        for key in keys {
            if !unique.contains(&key) {
                unique.push(key);
            }
        }
        if unique.is_empty() {
            None
        } else {
            Some(Self { keys: unique })
        }
    }

    pub fn single(key: NodeKey) -> Self {
        Self { keys: vec![key] }
    }

    pub fn keys(&self) -> &[NodeKey] {
        &self.keys
    }

    pub fn first(&self) -> NodeKey {
        self.keys[0]
    }

    pub fn last(&self) -> NodeKey {
        self.keys[self.keys.len() - 1]
    }

    pub fn contains(&self, key: NodeKey) -> bool {
        self.keys.contains(&key)
    }

    /// Keeps only members still attached to the tree.
    pub fn retain_attached(self, tree: &Tree) -> Option<Self> {
        Self::new(
            self.keys
                .into_iter()
                .filter(|key| tree.is_attached(*key))
                .collect(),
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Selection {
    Range(RangeSelection),
    Node(NodeSelection),
}

impl Selection {
    pub fn caret(point: Point) -> Self {
        Selection::Range(RangeSelection::collapsed(point))
    }

    pub fn as_range(&self) -> Option<&RangeSelection> {
        match self {
            Selection::Range(range) => Some(range),
            Selection::Node(_) => None,
        }
    }

    pub fn as_node(&self) -> Option<&NodeSelection> {
        match self {
            Selection::Node(nodes) => Some(nodes),
            Selection::Range(_) => None,
        }
    }

    pub fn is_collapsed(&self) -> bool {
        match self {
            Selection::Range(range) => range.is_collapsed(),
            Selection::Node(_) => false,
        }
    }

    pub fn nodes(&self, tree: &Tree) -> Vec<NodeKey> {
        match self {
            Selection::Range(range) => range.nodes(tree),
            Selection::Node(nodes) => nodes.keys().to_vec(),
        }
    }
}

/// Elements the caret moves through as one line of inline content.
pub fn is_caret_block(tree: &Tree, key: NodeKey) -> bool {
    match tree.data(key) {
        Some(NodeData::Root) => tree.child_count(key) == 0,
        Some(NodeData::Element(kind)) if !kind.is_inline() => {
            if kind.holds_inline_content() {
                return true;
            }
            match kind {
                ElementKind::ListItem | ElementKind::Quote => {
                    let children = tree.children(key);
                    children.is_empty()
                        || children
                            .iter()
                            .any(|child| tree.data(*child).is_some_and(NodeData::is_inline))
                }
                _ => false,
            }
        }
        _ => false,
    }
}

pub fn caret_blocks(tree: &Tree) -> Vec<NodeKey> {
    tree.document_order()
        .into_iter()
        .filter(|key| is_caret_block(tree, *key))
        .collect()
}

pub fn caret_block_of(tree: &Tree, key: NodeKey) -> Option<NodeKey> {
    tree.ancestors(key).find(|candidate| is_caret_block(tree, *candidate))
}

/// Inline leaves of a caret block, descending into links but skipping
/// nested blocks.
pub fn inline_leaves(tree: &Tree, block: NodeKey) -> Vec<NodeKey> {
    let mut leaves = Vec::new();
    collect_inline_leaves(tree, block, &mut leaves);
    leaves
}

fn collect_inline_leaves(tree: &Tree, parent: NodeKey, leaves: &mut Vec<NodeKey>) {
    for child in tree.children(parent) {
        match tree.data(*child) {
            Some(NodeData::Element(kind)) if kind.is_inline() => {
                collect_inline_leaves(tree, *child, leaves)
            }
            Some(data) if data.is_inline() => leaves.push(*child),
            _ => {}
        }
    }
}

pub fn leaf_len(tree: &Tree, leaf: NodeKey) -> usize {
    match tree.data(leaf) {
        Some(NodeData::Text(text)) => text.char_len(),
        Some(NodeData::Element(_)) | Some(NodeData::Root) | None => 0,
        Some(_) => 1,
    }
}

pub fn block_len(tree: &Tree, block: NodeKey) -> usize {
    inline_leaves(tree, block)
        .iter()
        .map(|leaf| leaf_len(tree, *leaf))
        .sum()
}

/// Caret point at character `offset` of a caret block.
pub fn point_in_block(tree: &Tree, block: NodeKey, offset: usize) -> Point {
    let leaves = inline_leaves(tree, block);
    let mut position = 0;
    for leaf in &leaves {
        let len = leaf_len(tree, *leaf);
        if tree.is_text(*leaf) {
            if offset <= position + len {
                return Point::text(*leaf, offset - position.min(offset));
            }
        } else if offset <= position {
            return before_node(tree, *leaf).unwrap_or(Point::element(block, 0));
        }
        position += len;
    }
    match leaves.last() {
        Some(last) if tree.is_text(*last) => Point::text(*last, tree.text_len(*last)),
        Some(last) => after_node(tree, *last).unwrap_or(Point::element(block, 0)),
        None => Point::element(block, tree.child_count(block)),
    }
}

pub fn before_node(tree: &Tree, key: NodeKey) -> Option<Point> {
    Some(Point::element(tree.parent(key)?, tree.index_in_parent(key)?))
}

pub fn after_node(tree: &Tree, key: NodeKey) -> Option<Point> {
    Some(Point::element(tree.parent(key)?, tree.index_in_parent(key)? + 1))
}

/// Caret block and character offset of a point, if the point sits inside
/// inline content.
pub fn block_offset(tree: &Tree, point: Point) -> Option<(NodeKey, usize)> {
    let block = caret_block_of(tree, point.key)?;
    let leaves = inline_leaves(tree, block);
    let mut position = 0;
    for leaf in &leaves {
        if point.kind == PointKind::Text && *leaf == point.key {
            return Some((block, position + point.offset));
        }
        if point.kind == PointKind::Element {
            let leaf_point = before_node(tree, *leaf)?;
            if point.compare(&leaf_point, tree) != Ordering::Greater {
                return Some((block, position));
            }
        }
        position += leaf_len(tree, *leaf);
    }
    Some((block, position))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_paragraphs() -> (Tree, NodeKey, NodeKey) {
        let mut tree = Tree::new();
        let mut texts = Vec::new();
        for word in ["one", "two"] {
            let paragraph = tree.create_paragraph();
            let text = tree.create_text(word);
            tree.append(paragraph, text).unwrap();
            tree.append(tree.root(), paragraph).unwrap();
            texts.push(text);
        }
        (tree, texts[0], texts[1])
    }

    #[test]
    fn element_point_sorts_before_child_content() {
        let (tree, first, _) = two_paragraphs();
        let paragraph = tree.parent(first).unwrap();

        let before = Point::element(paragraph, 0);
        let inside = Point::text(first, 0);
        let after = Point::element(paragraph, 1);

        assert_eq!(before.compare(&inside, &tree), Ordering::Less);
        assert_eq!(after.compare(&Point::text(first, 3), &tree), Ordering::Greater);
    }

    #[test]
    fn backward_ranges_are_ordered() {
        let (tree, first, second) = two_paragraphs();
        let range = RangeSelection::new(Point::text(second, 1), Point::text(first, 2));

        assert!(range.is_backward(&tree));
        let (start, end) = range.ordered(&tree);
        assert_eq!(start.key, first);
        assert_eq!(end.key, second);
    }

    #[test]
    fn range_nodes_span_both_paragraphs() {
        let (tree, first, second) = two_paragraphs();
        let range = RangeSelection::new(Point::text(first, 1), Point::text(second, 1));

        let nodes = range.nodes(&tree);

        assert_eq!(nodes.first(), Some(&first));
        assert_eq!(nodes.last(), Some(&second));
        assert!(nodes.contains(&tree.parent(second).unwrap()));
    }

    #[test]
    fn node_selection_is_never_empty() {
        assert!(NodeSelection::new(Vec::new()).is_none());
        let (mut tree, first, _) = two_paragraphs();
        let divider = tree.create(NodeData::LineBreak);
        let selection = NodeSelection::new(vec![first, first, divider]).unwrap();
        assert_eq!(selection.keys().len(), 2);
        assert_eq!(selection.retain_attached(&tree).unwrap().keys(), &[first]);
    }
    #[test]
    fn block_offsets_round_trip_across_line_breaks() {
        let mut tree = Tree::new();
        let paragraph = tree.create_paragraph();
        tree.append(tree.root(), paragraph).unwrap();
        let first = tree.create_text("ab");
        let line_break = tree.create(NodeData::LineBreak);
        let second = tree.create_text("cd");
        tree.append_all(paragraph, &[first, line_break, second]).unwrap();

        assert_eq!(block_len(&tree, paragraph), 5);
        assert_eq!(point_in_block(&tree, paragraph, 2), Point::text(first, 2));
        assert_eq!(point_in_block(&tree, paragraph, 3), Point::text(second, 0));
        assert_eq!(
            block_offset(&tree, Point::element(paragraph, 2)),
            Some((paragraph, 3))
        );
        assert_eq!(block_offset(&tree, Point::text(second, 2)), Some((paragraph, 5)));
    }

    #[test]
    fn empty_quote_is_a_caret_block_until_it_holds_paragraphs() {
        let mut tree = Tree::new();
        let quote = tree.create(NodeData::Element(ElementKind::Quote));
        tree.append(tree.root(), quote).unwrap();
        assert!(is_caret_block(&tree, quote));

        let paragraph = tree.create_paragraph();
        tree.append(quote, paragraph).unwrap();
        assert!(!is_caret_block(&tree, quote));
        assert_eq!(caret_blocks(&tree), vec![paragraph]);
    }
}
