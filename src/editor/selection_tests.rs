use super::*;
use ratatui::layout::Rect;

use crate::config::EditorConfig;
use crate::engine::{
    CustomAttachment, DecoratorNode, ElementKind, NodeData, NodeSelection, Point, RangeSelection,
};

fn key(code: KeyCode) -> KeyEvent {
    KeyEvent::new(code, KeyModifiers::NONE)
}

fn paragraph(tree: &mut Tree, text: &str) -> (NodeKey, NodeKey) {
    let paragraph = tree.create_paragraph();
    let text = tree.create_text(text);
    tree.append(paragraph, text).unwrap();
    tree.append(tree.root(), paragraph).unwrap();
    (paragraph, text)
}

fn divider(tree: &mut Tree) -> NodeKey {
    let divider = tree.create(NodeData::Decorator(DecoratorNode::Divider));
    tree.append(tree.root(), divider).unwrap();
    divider
}

/// A paragraph holding an inline mention followed by `text`.
fn mention_line(tree: &mut Tree, text: &str) -> (NodeKey, NodeKey, NodeKey) {
    let paragraph = tree.create_paragraph();
    let mention = tree.create(NodeData::Decorator(DecoratorNode::Custom(CustomAttachment {
        sgid: Some("gid-ana".to_string()),
        content_type: "application/vnd.actiontext.mention".to_string(),
        inner_markup: "<strong>@Ana</strong>".to_string(),
    })));
    let text = tree.create_text(text);
    tree.append_all(paragraph, &[mention, text]).unwrap();
    tree.append(tree.root(), paragraph).unwrap();
    (paragraph, mention, text)
}

fn selected_keys(editor: &Editor) -> Option<Vec<NodeKey>> {
    editor.state().node_selection().map(|nodes| nodes.keys().to_vec())
}

fn editor_with(tree: Tree) -> Editor {
    Editor::with_state(EditorConfig::default(), EditorState::new(tree))
}

fn place(editor: &mut Editor, anchor: Point, focus: Point) {
    editor
        .update(|tx| {
            tx.set_selection(Some(Selection::Range(RangeSelection::new(anchor, focus))));
            Ok(())
        })
        .unwrap();
}

fn top_level(editor: &Editor) -> Vec<NodeKey> {
    editor.tree().children(editor.tree().root()).to_vec()
}

struct Surface {
    caret: Rect,
    marker: Rect,
}

impl CaretSurface for Surface {
    fn caret_rect(&self, _caret: Point) -> Option<Rect> {
        Some(self.caret)
    }

    fn caret_rect_with_marker(&self, _caret: Point) -> Option<Rect> {
        Some(self.marker)
    }

    fn line_height(&self, _caret: Point) -> u16 {
        1
    }

    fn root_origin(&self) -> Rect {
        Rect::new(1, 1, 40, 10)
    }
}

#[test]
fn backspace_after_a_decorator_selects_it_then_deletes_it() {
    let mut tree = Tree::new();
    let (_, first) = paragraph(&mut tree, "a");
    let divider = divider(&mut tree);
    let (_, second) = paragraph(&mut tree, "b");
    let mut editor = editor_with(tree);
    let caret = Point::text(second, 0);
    place(&mut editor, caret, caret);

    assert!(editor.handle_key(key(KeyCode::Backspace)).unwrap());
    assert!(editor.has_node_selection());
    assert!(editor.marks().contains(divider));
    assert_eq!(top_level(&editor).len(), 3);

    assert!(editor.handle_key(key(KeyCode::Backspace)).unwrap());
    assert_eq!(top_level(&editor).len(), 2);
    assert!(editor.marks().is_empty());
    assert_eq!(editor.state().collapsed_anchor(), Some(Point::text(first, 1)));
}

#[test]
fn deleting_the_last_node_leaves_an_empty_paragraph() {
    let mut tree = Tree::new();
    let divider = divider(&mut tree);
    let mut editor = editor_with(tree);
    assert!(editor.select_node_by_key(divider).unwrap());

    assert!(editor.delete_selected_nodes().unwrap());

    let top = top_level(&editor);
    assert_eq!(top.len(), 1);
    assert!(editor.tree().is_paragraph(top[0]));
    assert_eq!(editor.state().collapsed_anchor(), Some(Point::element(top[0], 0)));
}

#[test]
fn deleting_without_a_node_selection_does_nothing() {
    let mut tree = Tree::new();
    paragraph(&mut tree, "text");
    let mut editor = editor_with(tree);
    editor.place_cursor_at_the_end().unwrap();

    assert!(!editor.delete_selected_nodes().unwrap());
    assert_eq!(top_level(&editor).len(), 1);
}

#[test]
fn right_arrow_selects_the_next_decorator_and_then_leaves_it() {
    let mut tree = Tree::new();
    let (_, text) = paragraph(&mut tree, "a");
    let divider = divider(&mut tree);
    let mut editor = editor_with(tree);
    let caret = Point::text(text, 1);
    place(&mut editor, caret, caret);

    assert!(editor.handle_key(key(KeyCode::Right)).unwrap());
    assert_eq!(
        editor.state().node_selection().map(|nodes| nodes.keys().to_vec()),
        Some(vec![divider])
    );

    assert!(editor.handle_key(key(KeyCode::Right)).unwrap());
    let root = editor.tree().root();
    assert_eq!(editor.state().collapsed_anchor(), Some(Point::element(root, 2)));
    assert!(editor.marks().is_empty());
}

#[test]
fn vertical_moves_at_the_edge_keep_the_node_selected() {
    let mut tree = Tree::new();
    paragraph(&mut tree, "a");
    let divider = divider(&mut tree);
    let mut editor = editor_with(tree);
    editor.select_node_by_key(divider).unwrap();

    assert!(editor.handle_key(key(KeyCode::Down)).unwrap());
    assert!(editor.marks().contains(divider));

    assert!(editor.handle_key(key(KeyCode::Up)).unwrap());
    assert!(!editor.has_node_selection());
}

#[test]
fn mark_sync_reports_changes_once() {
    let mut tree = Tree::new();
    let divider = divider(&mut tree);
    let mut marks = SelectionMarks::default();
    let selection = Selection::Node(NodeSelection::single(divider));

    let first = marks.sync(Some(&selection));
    assert_eq!(first.added, vec![divider]);
    assert!(marks.sync(Some(&selection)).is_empty());

    let cleared = marks.sync(None);
    assert_eq!(cleared.removed, vec![divider]);
    assert!(marks.is_empty());
    assert!(marks.sync(None).is_empty());
}

#[test]
fn editor_marks_follow_the_committed_selection() {
    let mut tree = Tree::new();
    let divider = divider(&mut tree);
    let mut editor = editor_with(tree);

    editor.select_node_by_key(divider).unwrap();
    assert!(editor.marks().contains(divider));
    assert!(editor.sync_selected_marks().is_empty());

    editor.place_cursor_at_the_end().unwrap();
    assert!(!editor.marks().contains(divider));
}

#[test]
fn cursor_position_sits_below_the_caret_line() {
    let mut tree = Tree::new();
    let (_, text) = paragraph(&mut tree, "abc");
    let mut editor = editor_with(tree);
    let caret = Point::text(text, 2);
    place(&mut editor, caret, caret);

    let reliable = Surface {
        caret: Rect::new(6, 4, 1, 1),
        marker: Rect::new(0, 0, 0, 0),
    };
    assert_eq!(
        editor.cursor_position(&reliable),
        Some(CursorPosition { x: 5, y: 4, font_size: 1 })
    );

    let degenerate = Surface {
        caret: Rect::new(0, 0, 0, 0),
        marker: Rect::new(3, 2, 1, 1),
    };
    assert_eq!(
        editor.cursor_position(&degenerate),
        Some(CursorPosition { x: 2, y: 2, font_size: 1 })
    );

    place(&mut editor, Point::text(text, 0), Point::text(text, 2));
    assert_eq!(editor.cursor_position(&reliable), None);
}

#[test]
fn typing_beside_a_block_decorator_starts_a_paragraph() {
    let mut tree = Tree::new();
    divider(&mut tree);
    let mut editor = editor_with(tree);
    let root = editor.tree().root();
    place(&mut editor, Point::element(root, 1), Point::element(root, 1));

    assert!(editor.insert_text("x").unwrap());

    let top = top_level(&editor);
    assert_eq!(top.len(), 2);
    assert!(editor.tree().is_paragraph(top[1]));
    assert_eq!(editor.tree().text_content(top[1]), "x");
}

#[test]
fn words_in_a_single_line() {
    let mut tree = Tree::new();
    let (_, first) = paragraph(&mut tree, "hello world");
    let (_, second) = paragraph(&mut tree, "again");
    let mut editor = editor_with(tree);

    place(&mut editor, Point::text(first, 0), Point::text(first, 5));
    assert!(editor.has_selected_words_in_single_line());

    place(&mut editor, Point::text(first, 6), Point::text(second, 2));
    assert!(!editor.has_selected_words_in_single_line());

    place(&mut editor, Point::text(first, 3), Point::text(first, 3));
    assert!(!editor.has_selected_words_in_single_line());
}

#[test]
fn preserving_selection_puts_the_range_back() {
    let mut tree = Tree::new();
    let (_, text) = paragraph(&mut tree, "hello");
    let mut editor = editor_with(tree);
    let caret = Point::text(text, 2);
    place(&mut editor, caret, caret);

    editor
        .preserving_selection(|editor| editor.place_cursor_at_the_end())
        .unwrap();

    assert_eq!(editor.state().collapsed_anchor(), Some(caret));
}

#[test]
fn select_or_append_next_line_adds_a_paragraph_at_the_end() {
    let mut tree = Tree::new();
    paragraph(&mut tree, "only");
    let mut editor = editor_with(tree);
    editor.place_cursor_at_the_end().unwrap();

    editor.select_or_append_next_line().unwrap();

    let top = top_level(&editor);
    assert_eq!(top.len(), 2);
    assert_eq!(editor.state().collapsed_anchor(), Some(Point::element(top[1], 0)));
}

#[test]
fn up_from_an_inline_decorator_at_line_start_leaves_it() {
    let mut tree = Tree::new();
    paragraph(&mut tree, "first");
    let (line, mention, _) = mention_line(&mut tree, " rest");
    let mut editor = editor_with(tree);
    assert!(editor.select_node_by_key(mention).unwrap());

    assert!(editor.handle_key(key(KeyCode::Up)).unwrap());

    assert!(!editor.has_node_selection());
    assert_eq!(editor.state().collapsed_anchor(), Some(Point::element(line, 0)));
    assert!(editor.marks().is_empty());
}

#[test]
fn down_from_the_last_block_of_a_quote_leaves_it() {
    let mut tree = Tree::new();
    let quote = tree.create(NodeData::Element(ElementKind::Quote));
    let inner = tree.create_paragraph();
    let text = tree.create_text("quoted");
    tree.append(inner, text).unwrap();
    let divider = tree.create(NodeData::Decorator(DecoratorNode::Divider));
    tree.append_all(quote, &[inner, divider]).unwrap();
    tree.append(tree.root(), quote).unwrap();
    paragraph(&mut tree, "after");
    let mut editor = editor_with(tree);
    assert!(editor.select_node_by_key(divider).unwrap());

    assert!(editor.handle_key(key(KeyCode::Down)).unwrap());

    assert!(!editor.has_node_selection());
}

#[test]
fn up_from_a_decorator_in_the_first_block_is_swallowed() {
    let mut tree = Tree::new();
    let (_, mention, _) = mention_line(&mut tree, " first");
    paragraph(&mut tree, "second");
    let mut editor = editor_with(tree);
    editor.select_node_by_key(mention).unwrap();

    assert!(editor.handle_key(key(KeyCode::Up)).unwrap());

    assert_eq!(selected_keys(&editor), Some(vec![mention]));
}

#[test]
fn neighbor_lookups_at_an_interior_offset() {
    let mut tree = Tree::new();
    let (first, text) = paragraph(&mut tree, "abcd");
    let divider = divider(&mut tree);
    paragraph(&mut tree, "after");
    let mut editor = editor_with(tree);
    let caret = Point::text(text, 2);
    place(&mut editor, caret, caret);

    assert_eq!(editor.node_after_cursor(), None);
    assert_eq!(editor.node_before_cursor(), None);
    assert_eq!(editor.top_level_node_after_cursor(), Some(divider));
    assert_eq!(editor.top_level_node_before_cursor(), None);

    let end = Point::text(text, 4);
    place(&mut editor, end, end);
    assert_eq!(editor.node_after_cursor(), Some(divider));
    assert_eq!(editor.tree().next_sibling(first), Some(divider));
}

#[test]
fn top_level_lookup_before_ignores_the_offset() {
    let mut tree = Tree::new();
    let divider = divider(&mut tree);
    let (_, text) = paragraph(&mut tree, "abcd");
    let mut editor = editor_with(tree);
    let caret = Point::text(text, 3);
    place(&mut editor, caret, caret);

    assert_eq!(editor.node_before_cursor(), None);
    assert_eq!(editor.top_level_node_before_cursor(), Some(divider));
}

#[test]
fn backspace_after_an_inline_decorator_selects_it() {
    let mut tree = Tree::new();
    paragraph(&mut tree, "before");
    let (_, mention, text) = mention_line(&mut tree, "rest");
    let mut editor = editor_with(tree);
    let caret = Point::text(text, 0);
    place(&mut editor, caret, caret);

    assert_eq!(editor.node_before_cursor(), Some(mention));
    assert!(editor.handle_key(key(KeyCode::Backspace)).unwrap());

    assert_eq!(selected_keys(&editor), Some(vec![mention]));
    assert_eq!(editor.tree().text(text), Some("rest"));
}
