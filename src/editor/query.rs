//! Upward tree walks and key classification. Everything here is pure.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::engine::{ElementKind, ListType, NodeData, NodeKey, Tree};

/// Nearest ancestor (inclusive) whose kind matches `predicate`.
pub fn nearest_of_kind(
    tree: &Tree,
    key: NodeKey,
    predicate: impl Fn(&ElementKind) -> bool,
) -> Option<NodeKey> {
    tree.ancestors(key)
        .find(|candidate| tree.element_kind(*candidate).is_some_and(&predicate))
}

pub fn nearest_list_item(tree: &Tree, key: NodeKey) -> Option<NodeKey> {
    nearest_of_kind(tree, key, |kind| matches!(kind, ElementKind::ListItem))
}

/// Kind of the nearest enclosing list.
pub fn list_type(tree: &Tree, key: NodeKey) -> Option<ListType> {
    let list = nearest_of_kind(tree, key, ElementKind::is_list)?;
    match tree.element_kind(list) {
        Some(ElementKind::List(list_type)) => Some(*list_type),
        _ => None,
    }
}

pub fn nearest_paragraph(tree: &Tree, key: NodeKey) -> Option<NodeKey> {
    nearest_of_kind(tree, key, |kind| matches!(kind, ElementKind::Paragraph))
}

pub fn is_inside_quote(tree: &Tree, key: NodeKey) -> bool {
    nearest_of_kind(tree, key, ElementKind::is_quote).is_some()
}

pub fn is_inside_code(tree: &Tree, key: NodeKey) -> bool {
    nearest_of_kind(tree, key, ElementKind::is_code).is_some()
}

pub fn is_inside_list(tree: &Tree, key: NodeKey) -> bool {
    nearest_list_item(tree, key).is_some()
}

/// Blank text, and every child either a line break or itself empty.
pub fn is_node_empty(tree: &Tree, key: NodeKey) -> bool {
    if !tree.text_content(key).trim().is_empty() {
        return false;
    }
    if tree.is_decorator(key) {
        return false;
    }
    tree.children(key).iter().all(|child| {
        matches!(tree.data(*child), Some(NodeData::LineBreak)) || is_node_empty(tree, *child)
    })
}

/// Content-producing keystrokes: no command modifier, and either a visible
/// character, Enter or Space.
pub fn is_printable_character(event: &KeyEvent) -> bool {
    let command_modifiers =
        KeyModifiers::CONTROL | KeyModifiers::ALT | KeyModifiers::SUPER | KeyModifiers::META;
    if event.modifiers.intersects(command_modifiers) {
        return false;
    }
    match event.code {
        KeyCode::Enter => true,
        KeyCode::Char(ch) => !ch.is_control(),
        _ => false,
    }
}
