use super::query::*;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::engine::{DecoratorNode, ElementKind, ListType, NodeData, NodeKey, Tree};

fn list_with_item(tree: &mut Tree, text: &str) -> (NodeKey, NodeKey, NodeKey) {
    let list = tree.create(NodeData::Element(ElementKind::List(ListType::Number)));
    let item = tree.create(NodeData::Element(ElementKind::ListItem));
    let text = tree.create_text(text);
    tree.append(item, text).unwrap();
    tree.append(list, item).unwrap();
    tree.append(tree.root(), list).unwrap();
    (list, item, text)
}

#[test]
fn nearest_list_item_only_looks_at_ancestors() {
    let mut tree = Tree::new();
    let (list, item, text) = list_with_item(&mut tree, "inside");
    let paragraph = tree.create_paragraph();
    let outside = tree.create_text("outside");
    tree.append(paragraph, outside).unwrap();
    tree.append(tree.root(), paragraph).unwrap();

    assert_eq!(nearest_list_item(&tree, text), Some(item));
    assert_eq!(nearest_list_item(&tree, item), Some(item));
    assert_eq!(nearest_list_item(&tree, list), None);
    assert_eq!(nearest_list_item(&tree, outside), None);
    assert!(is_inside_list(&tree, text));
    assert!(!is_inside_list(&tree, outside));
}

#[test]
fn list_type_comes_from_the_enclosing_list() {
    let mut tree = Tree::new();
    let (_, _, text) = list_with_item(&mut tree, "first");
    assert_eq!(list_type(&tree, text), Some(ListType::Number));
    assert_eq!(list_type(&tree, tree.root()), None);
}

#[test]
fn quotes_and_code_are_found_through_paragraphs() {
    let mut tree = Tree::new();
    let quote = tree.create(NodeData::Element(ElementKind::Quote));
    let paragraph = tree.create_paragraph();
    let text = tree.create_text("quoted");
    tree.append(paragraph, text).unwrap();
    tree.append(quote, paragraph).unwrap();
    tree.append(tree.root(), quote).unwrap();

    assert!(is_inside_quote(&tree, text));
    assert!(!is_inside_code(&tree, text));
    assert_eq!(nearest_paragraph(&tree, text), Some(paragraph));
}

#[test]
fn line_breaks_and_blank_text_count_as_empty() {
    let mut tree = Tree::new();
    let paragraph = tree.create_paragraph();
    let blank = tree.create_text("  ");
    let line_break = tree.create(NodeData::LineBreak);
    tree.append_all(paragraph, &[blank, line_break]).unwrap();
    tree.append(tree.root(), paragraph).unwrap();
    let divider = tree.create(NodeData::Decorator(DecoratorNode::Divider));
    tree.append(tree.root(), divider).unwrap();

    assert!(is_node_empty(&tree, paragraph));
    assert!(!is_node_empty(&tree, divider));
    assert!(!is_node_empty(&tree, tree.root()));
}

#[test]
fn printable_keys_exclude_command_chords() {
    let plain = KeyEvent::new(KeyCode::Char('a'), KeyModifiers::NONE);
    let shifted = KeyEvent::new(KeyCode::Char('A'), KeyModifiers::SHIFT);
    let chord = KeyEvent::new(KeyCode::Char('a'), KeyModifiers::CONTROL);
    let arrow = KeyEvent::new(KeyCode::Left, KeyModifiers::NONE);

    assert!(is_printable_character(&plain));
    assert!(is_printable_character(&shifted));
    assert!(is_printable_character(&KeyEvent::new(KeyCode::Enter, KeyModifiers::NONE)));
    assert!(!is_printable_character(&chord));
    assert!(!is_printable_character(&arrow));
}
