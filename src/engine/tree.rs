use std::collections::{HashMap, HashSet};

use super::node::{ElementKind, NodeData, NodeKey};
use crate::error::{EditorError, Result};

#[derive(Clone, Debug, PartialEq)]
struct Slot {
    data: NodeData,
    parent: Option<NodeKey>,
    children: Vec<NodeKey>,
}

/// Arena-backed document tree. Children are owned top-down through key
/// lists, the parent link is a plain back reference.
#[derive(Clone, Debug)]
pub struct Tree {
    slots: HashMap<NodeKey, Slot>,
    root: NodeKey,
    next_key: u32,
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

impl Tree {
    pub fn new() -> Self {
        let root = NodeKey(0);
        let mut slots = HashMap::new();
        slots.insert(
            root,
            Slot {
                data: NodeData::Root,
                parent: None,
                children: Vec::new(),
            },
        );
        Self {
            slots,
            root,
            next_key: 1,
        }
    }

    pub fn root(&self) -> NodeKey {
        self.root
    }

    pub fn contains(&self, key: NodeKey) -> bool {
        self.slots.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Structural equality of two snapshots of the same document.
    pub fn same_content(&self, other: &Tree) -> bool {
        self.root == other.root && self.slots == other.slots
    }

    pub fn data(&self, key: NodeKey) -> Option<&NodeData> {
        self.slots.get(&key).map(|slot| &slot.data)
    }

    pub fn data_mut(&mut self, key: NodeKey) -> Option<&mut NodeData> {
        self.slots.get_mut(&key).map(|slot| &mut slot.data)
    }

    pub fn try_data(&self, key: NodeKey) -> Result<&NodeData> {
        self.data(key).ok_or(EditorError::NodeNotFound(key))
    }

    pub fn element_kind(&self, key: NodeKey) -> Option<&ElementKind> {
        self.data(key).and_then(NodeData::element_kind)
    }

    pub fn is_element(&self, key: NodeKey) -> bool {
        self.data(key).is_some_and(NodeData::is_element)
    }

    pub fn is_text(&self, key: NodeKey) -> bool {
        self.data(key).is_some_and(NodeData::is_text)
    }

    pub fn is_decorator(&self, key: NodeKey) -> bool {
        self.data(key).is_some_and(NodeData::is_decorator)
    }

    pub fn is_line_break(&self, key: NodeKey) -> bool {
        self.data(key).is_some_and(NodeData::is_line_break)
    }

    pub fn is_paragraph(&self, key: NodeKey) -> bool {
        matches!(self.element_kind(key), Some(ElementKind::Paragraph))
    }

    pub fn is_kind(&self, key: NodeKey, predicate: impl Fn(&ElementKind) -> bool) -> bool {
        self.element_kind(key).is_some_and(predicate)
    }

    pub fn text(&self, key: NodeKey) -> Option<&str> {
        self.data(key)
            .and_then(NodeData::as_text)
            .map(|text| text.text.as_str())
    }

    pub fn parent(&self, key: NodeKey) -> Option<NodeKey> {
        self.slots.get(&key).and_then(|slot| slot.parent)
    }

    pub fn children(&self, key: NodeKey) -> &[NodeKey] {
        self.slots
            .get(&key)
            .map(|slot| slot.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn child_count(&self, key: NodeKey) -> usize {
        self.children(key).len()
    }

    pub fn child_at(&self, key: NodeKey, index: usize) -> Option<NodeKey> {
        self.children(key).get(index).copied()
    }

    pub fn first_child(&self, key: NodeKey) -> Option<NodeKey> {
        self.children(key).first().copied()
    }

    pub fn last_child(&self, key: NodeKey) -> Option<NodeKey> {
        self.children(key).last().copied()
    }

    pub fn index_in_parent(&self, key: NodeKey) -> Option<usize> {
        let parent = self.parent(key)?;
        self.children(parent).iter().position(|child| *child == key)
    }

    pub fn next_sibling(&self, key: NodeKey) -> Option<NodeKey> {
        let parent = self.parent(key)?;
        let index = self.index_in_parent(key)?;
        self.child_at(parent, index + 1)
    }

    pub fn previous_sibling(&self, key: NodeKey) -> Option<NodeKey> {
        let parent = self.parent(key)?;
        let index = self.index_in_parent(key)?;
        index.checked_sub(1).and_then(|idx| self.child_at(parent, idx))
    }

    pub fn next_siblings(&self, key: NodeKey) -> Vec<NodeKey> {
        let (Some(parent), Some(index)) = (self.parent(key), self.index_in_parent(key)) else {
            return Vec::new();
        };
        self.children(parent)[index + 1..].to_vec()
    }

    /// Parent chain starting at `key` itself and ending at the root.
    pub fn ancestors(&self, key: NodeKey) -> Ancestors<'_> {
        Ancestors {
            tree: self,
            next: self.contains(key).then_some(key),
        }
    }

    pub fn find_ancestor(
        &self,
        key: NodeKey,
        predicate: impl Fn(&NodeData) -> bool,
    ) -> Option<NodeKey> {
        self.ancestors(key)
            .find(|candidate| self.data(*candidate).is_some_and(&predicate))
    }

    /// Highest ancestor (inclusive) that is still a direct child of the root.
    pub fn top_level(&self, key: NodeKey) -> Option<NodeKey> {
        if key == self.root {
            return None;
        }
        self.ancestors(key)
            .find(|candidate| self.parent(*candidate) == Some(self.root))
    }

    pub fn is_attached(&self, key: NodeKey) -> bool {
        self.ancestors(key).any(|candidate| candidate == self.root)
    }

    pub fn is_ancestor_of(&self, ancestor: NodeKey, key: NodeKey) -> bool {
        self.ancestors(key).any(|candidate| candidate == ancestor)
    }

    /// Index path from the root down to `key`.
    pub fn path(&self, key: NodeKey) -> Option<Vec<usize>> {
        let mut path = Vec::new();
        let mut current = key;
        while current != self.root {
            path.push(self.index_in_parent(current)?);
            current = self.parent(current)?;
        }
        path.reverse();
        Some(path)
    }

    pub fn first_descendant(&self, key: NodeKey) -> NodeKey {
        let mut current = key;
        while let Some(child) = self.first_child(current) {
            current = child;
        }
        current
    }

    pub fn last_descendant(&self, key: NodeKey) -> NodeKey {
        let mut current = key;
        while let Some(child) = self.last_child(current) {
            current = child;
        }
        current
    }

    /// Pre-order walk of everything below `key`, `key` included.
    pub fn descendants(&self, key: NodeKey) -> Vec<NodeKey> {
        let mut order = Vec::new();
        let mut stack = vec![key];
        while let Some(current) = stack.pop() {
            order.push(current);
            for child in self.children(current).iter().rev() {
                stack.push(*child);
            }
        }
        order
    }

    pub fn document_order(&self) -> Vec<NodeKey> {
        self.descendants(self.root)
    }

    pub fn text_content(&self, key: NodeKey) -> String {
        let mut out = String::new();
        self.collect_text(key, &mut out);
        out
    }

    fn collect_text(&self, key: NodeKey, out: &mut String) {
        let Some(data) = self.data(key) else {
            return;
        };
        match data {
            NodeData::Text(text) => out.push_str(&text.text),
            NodeData::LineBreak => out.push('\n'),
            NodeData::Decorator(decorator) => out.push_str(&decorator.text_content()),
            NodeData::Root | NodeData::Element(_) => {
                let children = self.children(key);
                for (idx, child) in children.iter().enumerate() {
                    self.collect_text(*child, out);
                    let is_block_element = self
                        .data(*child)
                        .is_some_and(|data| data.is_element() && !data.is_inline());
                    if is_block_element && idx + 1 < children.len() {
                        out.push_str("\n\n");
                    }
                }
            }
        }
    }

    pub fn text_len(&self, key: NodeKey) -> usize {
        self.text(key).map(|text| text.chars().count()).unwrap_or(0)
    }

    pub fn create(&mut self, data: NodeData) -> NodeKey {
        let key = NodeKey(self.next_key);
        self.next_key += 1;
        self.slots.insert(
            key,
            Slot {
                data,
                parent: None,
                children: Vec::new(),
            },
        );
        key
    }

    pub fn create_with_children(&mut self, data: NodeData, children: &[NodeKey]) -> Result<NodeKey> {
        let key = self.create(data);
        for child in children {
            self.append(key, *child)?;
        }
        Ok(key)
    }

    pub fn create_text(&mut self, text: impl Into<String>) -> NodeKey {
        self.create(NodeData::text(text))
    }

    pub fn create_paragraph(&mut self) -> NodeKey {
        self.create(NodeData::paragraph())
    }

    fn ensure(&self, key: NodeKey) -> Result<()> {
        if self.contains(key) {
            Ok(())
        } else {
            Err(EditorError::NodeNotFound(key))
        }
    }

    fn ensure_can_adopt(&self, parent: NodeKey, child: NodeKey) -> Result<()> {
        self.ensure(parent)?;
        self.ensure(child)?;
        if child == self.root || self.is_ancestor_of(child, parent) {
            return Err(EditorError::InvalidStructure(format!(
                "{child} cannot become a child of {parent}"
            )));
        }
        if !self.is_element(parent) {
            return Err(EditorError::InvalidNodeKind {
                key: parent,
                expected: "element",
            });
        }
        Ok(())
    }

    /// Unlinks `key` from its parent. The slot survives until the next prune.
    pub fn detach(&mut self, key: NodeKey) {
        let Some(parent) = self.parent(key) else {
            return;
        };
        if let Some(slot) = self.slots.get_mut(&parent) {
            slot.children.retain(|child| *child != key);
        }
        if let Some(slot) = self.slots.get_mut(&key) {
            slot.parent = None;
        }
    }

    pub fn remove(&mut self, key: NodeKey) -> Result<()> {
        self.ensure(key)?;
        if key == self.root {
            return Err(EditorError::InvalidStructure("the root cannot be removed".into()));
        }
        self.detach(key);
        Ok(())
    }

    pub fn insert_at(&mut self, parent: NodeKey, index: usize, child: NodeKey) -> Result<()> {
        self.ensure_can_adopt(parent, child)?;
        let mut index = index;
        if self.parent(child) == Some(parent)
            && let Some(current) = self.index_in_parent(child)
            && current < index
        {
            index -= 1;
        }
        self.detach(child);
        let Some(slot) = self.slots.get_mut(&parent) else {
            return Err(EditorError::NodeNotFound(parent));
        };
        let index = index.min(slot.children.len());
        slot.children.insert(index, child);
        if let Some(slot) = self.slots.get_mut(&child) {
            slot.parent = Some(parent);
        }
        Ok(())
    }

    pub fn append(&mut self, parent: NodeKey, child: NodeKey) -> Result<()> {
        let len = self.child_count(parent);
        self.insert_at(parent, len, child)
    }

    pub fn append_all(&mut self, parent: NodeKey, children: &[NodeKey]) -> Result<()> {
        for child in children {
            self.append(parent, *child)?;
        }
        Ok(())
    }

    fn parent_and_index(&self, target: NodeKey) -> Result<(NodeKey, usize)> {
        let parent = self.parent(target).ok_or_else(|| {
            EditorError::InvalidStructure(format!("{target} is not attached to a parent"))
        })?;
        let index = self.index_in_parent(target).ok_or(EditorError::NodeNotFound(target))?;
        Ok((parent, index))
    }

    pub fn insert_before(&mut self, target: NodeKey, node: NodeKey) -> Result<()> {
        if target == node {
            return Ok(());
        }
        self.detach(node);
        let (parent, index) = self.parent_and_index(target)?;
        self.insert_at(parent, index, node)
    }

    pub fn insert_after(&mut self, target: NodeKey, node: NodeKey) -> Result<()> {
        if target == node {
            return Ok(());
        }
        self.detach(node);
        let (parent, index) = self.parent_and_index(target)?;
        self.insert_at(parent, index + 1, node)
    }

    /// Puts `with` where `target` was and detaches `target`.
    pub fn replace(&mut self, target: NodeKey, with: NodeKey) -> Result<()> {
        if target == with {
            return Ok(());
        }
        self.detach(with);
        let (parent, index) = self.parent_and_index(target)?;
        self.detach(target);
        self.insert_at(parent, index, with)
    }

    /// Removes `delete_count` children starting at `start` and inserts
    /// `nodes` in their place.
    pub fn splice(
        &mut self,
        parent: NodeKey,
        start: usize,
        delete_count: usize,
        nodes: &[NodeKey],
    ) -> Result<()> {
        self.ensure(parent)?;
        let children = self.children(parent).to_vec();
        let start = start.min(children.len());
        let end = (start + delete_count).min(children.len());
        for removed in &children[start..end] {
            self.detach(*removed);
        }
        for (offset, node) in nodes.iter().enumerate() {
            self.insert_at(parent, start + offset, *node)?;
        }
        Ok(())
    }

    /// Moves every child of `from` to the end of `to`.
    pub fn move_children(&mut self, from: NodeKey, to: NodeKey) -> Result<()> {
        let children = self.children(from).to_vec();
        self.append_all(to, &children)
    }

    /// Drops every slot no longer reachable from the root.
    pub fn prune_detached(&mut self) -> usize {
        let reachable: HashSet<NodeKey> = self.document_order().into_iter().collect();
        let before = self.slots.len();
        self.slots.retain(|key, _| reachable.contains(key));
        before - self.slots.len()
    }
}

pub struct Ancestors<'a> {
    tree: &'a Tree,
    next: Option<NodeKey>,
}

impl Iterator for Ancestors<'_> {
    type Item = NodeKey;

    fn next(&mut self) -> Option<NodeKey> {
        let current = self.next?;
        self.next = self.tree.parent(current);
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paragraph_with(tree: &mut Tree, text: &str) -> NodeKey {
        let paragraph = tree.create_paragraph();
        let text = tree.create_text(text);
        tree.append(paragraph, text).unwrap();
        tree.append(tree.root(), paragraph).unwrap();
        paragraph
    }

    #[test]
    fn siblings_and_paths_follow_insertion_order() {
        let mut tree = Tree::new();
        let first = paragraph_with(&mut tree, "one");
        let second = paragraph_with(&mut tree, "two");

        assert_eq!(tree.next_sibling(first), Some(second));
        assert_eq!(tree.previous_sibling(second), Some(first));
        assert_eq!(tree.path(second), Some(vec![1]));
        assert_eq!(tree.text_content(tree.root()), "one\n\ntwo");
    }

    #[test]
    fn moving_a_node_detaches_it_from_its_old_parent() {
        let mut tree = Tree::new();
        let first = paragraph_with(&mut tree, "one");
        let second = paragraph_with(&mut tree, "two");
        let text = tree.first_child(first).unwrap();

        tree.append(second, text).unwrap();

        assert_eq!(tree.child_count(first), 0);
        assert_eq!(tree.text_content(second), "twoone");
        assert_eq!(tree.parent(text), Some(second));
    }

    #[test]
    fn insert_at_accounts_for_moving_within_the_same_parent() {
        let mut tree = Tree::new();
        let a = paragraph_with(&mut tree, "a");
        let b = paragraph_with(&mut tree, "b");
        let c = paragraph_with(&mut tree, "c");

        tree.insert_at(tree.root(), 3, a).unwrap();

        assert_eq!(tree.children(tree.root()), &[b, c, a]);
    }

    #[test]
    fn refuses_to_create_cycles() {
        let mut tree = Tree::new();
        let outer = tree.create(NodeData::Element(ElementKind::Quote));
        let inner = paragraph_with(&mut tree, "x");
        tree.append(outer, inner).unwrap();

        assert!(tree.append(inner, outer).is_err());
    }

    #[test]
    fn prune_drops_detached_slots() {
        let mut tree = Tree::new();
        let first = paragraph_with(&mut tree, "one");
        paragraph_with(&mut tree, "two");

        tree.remove(first).unwrap();
        let dropped = tree.prune_detached();

        assert_eq!(dropped, 2);
        assert!(!tree.contains(first));
    }

    #[test]
    fn top_level_finds_direct_child_of_root() {
        let mut tree = Tree::new();
        let quote = tree.create(NodeData::Element(ElementKind::Quote));
        tree.append(tree.root(), quote).unwrap();
        let inner = tree.create_paragraph();
        tree.append(quote, inner).unwrap();
        let text = tree.create_text("deep");
        tree.append(inner, text).unwrap();

        assert_eq!(tree.top_level(text), Some(quote));
        assert_eq!(tree.top_level(quote), Some(quote));
        assert_eq!(tree.top_level(tree.root()), None);
    }

    #[test]
    fn splice_replaces_a_range_of_children() {
        let mut tree = Tree::new();
        let a = paragraph_with(&mut tree, "a");
        let b = paragraph_with(&mut tree, "b");
        let c = paragraph_with(&mut tree, "c");

        tree.splice(tree.root(), 1, 1, &[]).unwrap();

        assert_eq!(tree.children(tree.root()), &[a, c]);
        assert!(!tree.is_attached(b));
    }
}
