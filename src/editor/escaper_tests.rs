use super::*;

use crate::config::EditorConfig;
use crate::engine::{ElementKind, ListType, NodeData, Point};

fn key(code: KeyCode) -> KeyEvent {
    KeyEvent::new(code, KeyModifiers::NONE)
}

fn element(tree: &mut Tree, parent: NodeKey, kind: ElementKind) -> NodeKey {
    let key = tree.create(NodeData::Element(kind));
    tree.append(parent, key).unwrap();
    key
}

fn with_text(tree: &mut Tree, parent: NodeKey, kind: ElementKind, text: &str) -> NodeKey {
    let key = element(tree, parent, kind);
    if !text.is_empty() {
        let text = tree.create_text(text);
        tree.append(key, text).unwrap();
    }
    key
}

/// A quote holding a bullet list with one item per entry.
fn quoted_list(items: &[&str]) -> (Tree, NodeKey, Vec<NodeKey>) {
    let mut tree = Tree::new();
    let root = tree.root();
    let quote = element(&mut tree, root, ElementKind::Quote);
    let list = element(&mut tree, quote, ElementKind::List(ListType::Bullet));
    let keys = items
        .iter()
        .map(|text| with_text(&mut tree, list, ElementKind::ListItem, text))
        .collect();
    (tree, quote, keys)
}

fn editor_at(tree: Tree, caret: Point) -> Editor {
    let mut editor = Editor::with_state(EditorConfig::default(), EditorState::new(tree));
    editor
        .update(|tx| {
            tx.set_caret(caret);
            Ok(())
        })
        .unwrap();
    editor
}

fn top_level(editor: &Editor) -> Vec<NodeKey> {
    editor.tree().children(editor.tree().root()).to_vec()
}

fn is_quote(editor: &Editor, key: NodeKey) -> bool {
    editor.tree().is_kind(key, ElementKind::is_quote)
}

#[test]
fn enter_in_a_trailing_empty_item_leaves_the_list_then_the_quote() {
    let (tree, quote, items) = quoted_list(&["one", ""]);
    let mut editor = editor_at(tree, Point::element(items[1], 0));

    assert!(editor.handle_key(key(KeyCode::Enter)).unwrap());

    let tree = editor.tree();
    let children = tree.children(quote).to_vec();
    assert_eq!(children.len(), 2);
    assert!(tree.is_kind(children[0], ElementKind::is_list));
    assert_eq!(tree.child_count(children[0]), 1);
    assert!(tree.is_paragraph(children[1]));
    assert_eq!(editor.state().collapsed_anchor(), Some(Point::element(children[1], 0)));

    assert!(editor.handle_key(key(KeyCode::Enter)).unwrap());

    let top = top_level(&editor);
    assert_eq!(top.len(), 2);
    assert!(is_quote(&editor, top[0]));
    assert!(editor.tree().is_paragraph(top[1]));
    assert_eq!(editor.tree().child_count(quote), 1);
    assert_eq!(editor.state().collapsed_anchor(), Some(Point::element(top[1], 0)));
}

#[test]
fn enter_in_a_middle_empty_item_splits_the_quote() {
    let (tree, _, items) = quoted_list(&["one", "", "three"]);
    let mut editor = editor_at(tree, Point::element(items[1], 0));

    assert!(editor.escape_on_enter().unwrap());

    let top = top_level(&editor);
    assert_eq!(top.len(), 3);
    assert!(is_quote(&editor, top[0]));
    assert!(editor.tree().is_paragraph(top[1]));
    assert!(is_quote(&editor, top[2]));
    assert_eq!(editor.tree().text_content(top[0]), "one");
    assert_eq!(editor.tree().text_content(top[2]), "three");
    assert_eq!(editor.state().collapsed_anchor(), Some(Point::element(top[1], 0)));
}

#[test]
fn enter_in_an_empty_quoted_paragraph_splits_around_it() {
    let mut tree = Tree::new();
    let root = tree.root();
    let quote = element(&mut tree, root, ElementKind::Quote);
    with_text(&mut tree, quote, ElementKind::Paragraph, "before");
    let empty = with_text(&mut tree, quote, ElementKind::Paragraph, "");
    with_text(&mut tree, quote, ElementKind::Paragraph, "after");
    let mut editor = editor_at(tree, Point::element(empty, 0));

    assert!(editor.escape_on_enter().unwrap());

    let top = top_level(&editor);
    assert_eq!(top.len(), 3);
    assert_eq!(editor.tree().text_content(top[0]), "before");
    assert!(editor.tree().is_paragraph(top[1]));
    assert_eq!(editor.tree().text_content(top[2]), "after");
    assert!(!editor.tree().is_attached(empty));
}

#[test]
fn enter_with_text_in_a_quote_is_left_to_the_engine() {
    let mut tree = Tree::new();
    let root = tree.root();
    let quote = element(&mut tree, root, ElementKind::Quote);
    let paragraph = with_text(&mut tree, quote, ElementKind::Paragraph, "quoted");
    let text = tree.first_child(paragraph).unwrap();
    let mut editor = editor_at(tree, Point::text(text, 6));

    assert!(!editor.escape_on_enter().unwrap());

    assert!(editor.handle_key(key(KeyCode::Enter)).unwrap());
    assert_eq!(editor.tree().child_count(quote), 2);
    assert_eq!(top_level(&editor).len(), 1);
}

#[test]
fn enter_outside_a_quote_is_not_an_escape() {
    let mut tree = Tree::new();
    let root = tree.root();
    let list = element(&mut tree, root, ElementKind::List(ListType::Bullet));
    let item = with_text(&mut tree, list, ElementKind::ListItem, "");
    let mut editor = editor_at(tree, Point::element(item, 0));

    assert!(!editor.escape_on_enter().unwrap());
}
