use super::*;
use crate::engine::{DecoratorNode, EditorState, Engine};

fn paragraphs(words: &[&str]) -> (Engine, Vec<NodeKey>) {
    let mut tree = Tree::new();
    let mut texts = Vec::new();
    for word in words {
        let paragraph = tree.create_paragraph();
        let text = tree.create_text(*word);
        tree.append(paragraph, text).unwrap();
        tree.append(tree.root(), paragraph).unwrap();
        texts.push(text);
    }
    (Engine::new(EditorState::new(tree), 50), texts)
}

fn bullet_list(items: &[&str]) -> (Engine, Vec<NodeKey>) {
    let mut tree = Tree::new();
    let list = tree.create(NodeData::Element(ElementKind::List(ListType::Bullet)));
    tree.append(tree.root(), list).unwrap();
    let mut keys = Vec::new();
    for item_text in items {
        let item = tree.create(NodeData::Element(ElementKind::ListItem));
        if !item_text.is_empty() {
            let text = tree.create_text(*item_text);
            tree.append(item, text).unwrap();
        }
        tree.append(list, item).unwrap();
        keys.push(item);
    }
    (Engine::new(EditorState::new(tree), 50), keys)
}

fn select(engine: &mut Engine, anchor: Point, focus: Point) {
    engine
        .update(|tx| {
            tx.set_selection(Some(Selection::Range(RangeSelection::new(anchor, focus))));
            Ok(())
        })
        .unwrap();
}

fn document_text(engine: &Engine) -> String {
    let tree = &engine.state().tree;
    tree.text_content(tree.root())
}

#[test]
fn typing_inserts_at_the_caret() {
    let (mut engine, texts) = paragraphs(&["helo"]);
    let caret = Point::text(texts[0], 3);
    select(&mut engine, caret, caret);

    engine.update(|tx| tx.insert_text("l")).unwrap();

    assert_eq!(document_text(&engine), "hello");
    assert_eq!(engine.state().collapsed_anchor(), Some(Point::text(texts[0], 4)));
}

#[test]
fn typing_with_a_toggled_format_starts_a_new_run() {
    let (mut engine, texts) = paragraphs(&["plain"]);
    let caret = Point::text(texts[0], 5);
    select(&mut engine, caret, caret);

    engine
        .update(|tx| {
            tx.format_text(FormatType::Bold)?;
            tx.insert_text("!")
        })
        .unwrap();

    let tree = &engine.state().tree;
    let paragraph = tree.parent(texts[0]).unwrap();
    assert_eq!(tree.child_count(paragraph), 2);
    let bold = tree.child_at(paragraph, 1).unwrap();
    let node = tree.data(bold).and_then(NodeData::as_text).unwrap();
    assert_eq!(node.text, "!");
    assert!(node.format.has(FormatType::Bold));
}

#[test]
fn enter_splits_the_paragraph_and_moves_the_caret() {
    let (mut engine, texts) = paragraphs(&["hello world"]);
    let caret = Point::text(texts[0], 5);
    select(&mut engine, caret, caret);

    engine.update(|tx| tx.insert_paragraph()).unwrap();

    let tree = &engine.state().tree;
    assert_eq!(tree.child_count(tree.root()), 2);
    assert_eq!(document_text(&engine), "hello\n\n world");
    let second = tree.child_at(tree.root(), 1).unwrap();
    let tail = tree.first_child(second).unwrap();
    assert_eq!(engine.state().collapsed_anchor(), Some(Point::text(tail, 0)));
}

#[test]
fn backspace_at_paragraph_start_merges_with_the_previous_one() {
    let (mut engine, texts) = paragraphs(&["one", "two"]);
    let caret = Point::text(texts[1], 0);
    select(&mut engine, caret, caret);

    assert!(engine.update(|tx| tx.delete_backward()).unwrap());

    assert_eq!(document_text(&engine), "onetwo");
    assert_eq!(engine.state().collapsed_anchor(), Some(Point::text(texts[0], 3)));
}

#[test]
fn deleting_a_range_across_paragraphs_joins_them() {
    let (mut engine, texts) = paragraphs(&["hello", "world"]);
    select(&mut engine, Point::text(texts[0], 2), Point::text(texts[1], 3));

    engine.update(|tx| tx.delete_backward()).unwrap();

    assert_eq!(document_text(&engine), "held");
    assert_eq!(engine.state().collapsed_anchor(), Some(Point::text(texts[0], 2)));
}

#[test]
fn deleting_a_word_stops_at_the_boundary() {
    let (mut engine, texts) = paragraphs(&["hello world"]);
    let caret = Point::text(texts[0], 11);
    select(&mut engine, caret, caret);

    engine.update(|tx| tx.delete_word_backward()).unwrap();

    assert_eq!(document_text(&engine), "hello ");
}

#[test]
fn enter_in_an_empty_list_item_leaves_the_list() {
    let (mut engine, items) = bullet_list(&["a", ""]);
    let caret = Point::element(items[1], 0);
    select(&mut engine, caret, caret);

    engine.update(|tx| tx.insert_paragraph()).unwrap();

    let tree = &engine.state().tree;
    let root_children = tree.children(tree.root()).to_vec();
    assert_eq!(root_children.len(), 2);
    assert_eq!(tree.child_count(root_children[0]), 1);
    assert!(tree.is_paragraph(root_children[1]));
    assert_eq!(
        engine.state().collapsed_anchor(),
        Some(Point::element(root_children[1], 0))
    );
}

#[test]
fn backspace_at_list_item_start_turns_it_into_a_paragraph() {
    let (mut engine, items) = bullet_list(&["a"]);
    let text = engine.state().tree.first_child(items[0]).unwrap();
    let caret = Point::text(text, 0);
    select(&mut engine, caret, caret);

    engine.update(|tx| tx.delete_backward()).unwrap();

    let tree = &engine.state().tree;
    let root_children = tree.children(tree.root());
    assert_eq!(root_children.len(), 1);
    assert!(tree.is_paragraph(root_children[0]));
    assert_eq!(document_text(&engine), "a");
}

#[test]
fn second_empty_line_at_the_end_of_code_leaves_the_block() {
    let mut tree = Tree::new();
    let code = tree.create(NodeData::Element(ElementKind::Code { language: None }));
    let text = tree.create_text("x");
    let first = tree.create(NodeData::LineBreak);
    let second = tree.create(NodeData::LineBreak);
    tree.append_all(code, &[text, first, second]).unwrap();
    tree.append(tree.root(), code).unwrap();
    let mut engine = Engine::new(EditorState::new(tree), 50);
    let caret = Point::element(code, 3);
    select(&mut engine, caret, caret);

    engine.update(|tx| tx.insert_paragraph()).unwrap();

    let tree = &engine.state().tree;
    assert_eq!(tree.child_count(tree.root()), 2);
    assert_eq!(tree.children(code), &[text]);
    let paragraph = tree.child_at(tree.root(), 1).unwrap();
    assert_eq!(engine.state().collapsed_anchor(), Some(Point::element(paragraph, 0)));
}

#[test]
fn enter_inside_code_inserts_a_line_break() {
    let mut tree = Tree::new();
    let code = tree.create(NodeData::Element(ElementKind::Code { language: None }));
    let text = tree.create_text("let x");
    tree.append(code, text).unwrap();
    tree.append(tree.root(), code).unwrap();
    let mut engine = Engine::new(EditorState::new(tree), 50);
    let caret = Point::text(text, 5);
    select(&mut engine, caret, caret);

    engine.update(|tx| tx.insert_paragraph()).unwrap();

    let tree = &engine.state().tree;
    assert_eq!(tree.child_count(tree.root()), 1);
    assert_eq!(tree.text_content(code), "let x\n");
}

#[test]
fn bold_toggles_on_and_off_over_a_partial_selection() {
    let (mut engine, texts) = paragraphs(&["hello world"]);
    select(&mut engine, Point::text(texts[0], 0), Point::text(texts[0], 5));

    engine.update(|tx| tx.format_text(FormatType::Bold)).unwrap();
    {
        let tree = &engine.state().tree;
        let paragraph = tree.parent(texts[0]).unwrap();
        assert_eq!(tree.child_count(paragraph), 2);
        let first = tree.data(texts[0]).and_then(NodeData::as_text).unwrap();
        assert_eq!(first.text, "hello");
        assert!(first.format.has(FormatType::Bold));
    }

    engine.update(|tx| tx.format_text(FormatType::Bold)).unwrap();
    let tree = &engine.state().tree;
    let paragraph = tree.parent(texts[0]).unwrap();
    assert_eq!(tree.child_count(paragraph), 1);
    assert!(tree.data(texts[0]).and_then(NodeData::as_text).unwrap().format.is_empty());
}

#[test]
fn toggling_a_link_wraps_and_unwraps_the_selection() {
    let (mut engine, texts) = paragraphs(&["hello world"]);
    select(&mut engine, Point::text(texts[0], 6), Point::text(texts[0], 11));

    engine
        .update(|tx| tx.toggle_link(Some("https://example.com")))
        .unwrap();
    let paragraph = engine.state().tree.parent(texts[0]).unwrap();
    {
        let tree = &engine.state().tree;
        let link = tree.child_at(paragraph, 1).unwrap();
        assert_eq!(
            tree.element_kind(link),
            Some(&ElementKind::Link {
                url: "https://example.com".into()
            })
        );
        assert_eq!(tree.text_content(link), "world");
    }

    engine.update(|tx| tx.toggle_link(None)).unwrap();
    let tree = &engine.state().tree;
    assert_eq!(tree.child_count(paragraph), 1);
    assert_eq!(tree.text_content(paragraph), "hello world");
}

#[test]
fn consecutive_paragraphs_become_one_list() {
    let (mut engine, texts) = paragraphs(&["a", "b"]);
    select(&mut engine, Point::text(texts[0], 0), Point::text(texts[1], 1));

    engine.update(|tx| tx.insert_list(ListType::Bullet)).unwrap();

    let tree = &engine.state().tree;
    let root_children = tree.children(tree.root());
    assert_eq!(root_children.len(), 1);
    assert_eq!(
        tree.element_kind(root_children[0]),
        Some(&ElementKind::List(ListType::Bullet))
    );
    assert_eq!(tree.child_count(root_children[0]), 2);
}

#[test]
fn list_type_switches_in_place() {
    let (mut engine, items) = bullet_list(&["a"]);
    let text = engine.state().tree.first_child(items[0]).unwrap();
    select(&mut engine, Point::text(text, 0), Point::text(text, 0));

    engine.update(|tx| tx.insert_list(ListType::Number)).unwrap();

    let tree = &engine.state().tree;
    let list = tree.parent(items[0]).unwrap();
    assert_eq!(tree.element_kind(list), Some(&ElementKind::List(ListType::Number)));
}

#[test]
fn indent_nests_under_the_previous_item_and_outdent_undoes_it() {
    let (mut engine, items) = bullet_list(&["a", "b"]);
    let text = engine.state().tree.first_child(items[1]).unwrap();
    select(&mut engine, Point::text(text, 1), Point::text(text, 1));

    assert!(engine.update(|tx| tx.indent_list_items()).unwrap());
    {
        let tree = &engine.state().tree;
        let outer = tree.parent(items[0]).unwrap();
        assert_eq!(tree.child_count(outer), 1);
        let nested = tree.last_child(items[0]).unwrap();
        assert_eq!(tree.children(nested), &[items[1]]);
    }

    assert!(engine.update(|tx| tx.outdent_list_items()).unwrap());
    let tree = &engine.state().tree;
    let outer = tree.parent(items[0]).unwrap();
    assert_eq!(tree.children(outer), &[items[0], items[1]]);
    assert_eq!(tree.child_count(items[0]), 1);
}

#[test]
fn first_item_cannot_be_indented() {
    let (mut engine, items) = bullet_list(&["a"]);
    let text = engine.state().tree.first_child(items[0]).unwrap();
    select(&mut engine, Point::text(text, 0), Point::text(text, 0));

    assert!(!engine.update(|tx| tx.indent_list_items()).unwrap());
}

#[test]
fn right_arrow_at_block_end_enters_the_next_block() {
    let (mut engine, texts) = paragraphs(&["ab", "cd"]);
    let caret = Point::text(texts[0], 2);
    select(&mut engine, caret, caret);

    let moved = engine
        .update(|tx| Ok(tx.move_caret(CaretMove::Right, false)))
        .unwrap();

    assert!(moved);
    assert_eq!(engine.state().collapsed_anchor(), Some(Point::text(texts[1], 0)));
}

#[test]
fn shift_arrow_extends_only_the_focus() {
    let (mut engine, texts) = paragraphs(&["abc"]);
    let caret = Point::text(texts[0], 1);
    select(&mut engine, caret, caret);

    engine
        .update(|tx| Ok(tx.move_caret(CaretMove::LineEnd, true)))
        .unwrap();

    let range = engine.state().range().unwrap();
    assert_eq!(range.anchor, Point::text(texts[0], 1));
    assert_eq!(range.focus, Point::text(texts[0], 3));
}

#[test]
fn a_block_decorator_replaces_an_empty_paragraph() {
    let (mut engine, _) = paragraphs(&["a"]);
    engine
        .update(|tx| {
            let root = tx.tree.root();
            let empty = tx.tree.create_paragraph();
            tx.tree.append(root, empty)?;
            tx.set_caret(Point::element(empty, 0));
            Ok(())
        })
        .unwrap();

    engine
        .update(|tx| {
            let divider = tx.tree.create(NodeData::Decorator(DecoratorNode::Divider));
            tx.insert_nodes(&[divider])
        })
        .unwrap();

    let tree = &engine.state().tree;
    let root = tree.root();
    assert_eq!(tree.child_count(root), 2);
    assert!(tree.is_decorator(tree.child_at(root, 1).unwrap()));
    assert_eq!(engine.state().collapsed_anchor(), Some(Point::element(root, 2)));
}

#[test]
fn a_block_decorator_splits_a_paragraph_in_the_middle() {
    let (mut engine, texts) = paragraphs(&["abcd"]);
    let caret = Point::text(texts[0], 2);
    select(&mut engine, caret, caret);

    engine
        .update(|tx| {
            let divider = tx.tree.create(NodeData::Decorator(DecoratorNode::Divider));
            tx.insert_nodes(&[divider])
        })
        .unwrap();

    let tree = &engine.state().tree;
    assert_eq!(tree.child_count(tree.root()), 3);
    assert_eq!(document_text(&engine), "ab\n\n┄\n\ncd");
}
