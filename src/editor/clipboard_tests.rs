use std::cell::RefCell;
use std::io;
use std::sync::{Arc, Mutex};

use super::*;

use crate::config::EditorConfig;
use crate::engine::{DecoratorNode, FormatType, NodeData, Point, RangeSelection};

const URL: &str = "https://example.com/page";

/// Collects formatted log output for assertions.
#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl LogBuffer {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

fn editor(markup: &str) -> Editor {
    Editor::from_markup(EditorConfig::default(), markup).unwrap()
}

fn document_text(editor: &Editor) -> String {
    editor.tree().text_content(editor.tree().root())
}

fn select_first_block(editor: &mut Editor) {
    editor
        .update(|tx| {
            let block = tx.tree.children(tx.tree.root())[0];
            let len = tx.tree.child_count(block);
            let range = RangeSelection::new(Point::element(block, 0), Point::element(block, len));
            tx.set_selection(Some(Selection::Range(range)));
            Ok(())
        })
        .unwrap();
}

fn count_decorators(editor: &Editor, matches: impl Fn(&DecoratorNode) -> bool) -> usize {
    let tree = editor.tree();
    tree.document_order()
        .into_iter()
        .filter(|key| {
            matches!(tree.data(*key), Some(NodeData::Decorator(decorator)) if matches(decorator))
        })
        .count()
}

struct Unfurler {
    seen: Rc<RefCell<Vec<String>>>,
    below: bool,
}

impl EditorListener for Unfurler {
    fn link_inserted(&mut self, insertion: &mut LinkInsertion) {
        self.seen.borrow_mut().push(insertion.url.clone());
        if self.below {
            insertion.insert_below_link("<b>Example</b>", AttachmentOptions::attachment("gid-card"));
        } else {
            insertion.replace_link_with("<em>preview</em>", AttachmentOptions::default());
        }
    }
}

#[test]
fn a_pasted_url_becomes_a_link() {
    let mut editor = Editor::new(EditorConfig::default());

    assert!(editor.paste(ClipboardData::text(URL)).unwrap());

    assert!(editor.value().contains(&format!("<a href=\"{URL}\">{URL}</a>")));
}

#[test]
fn a_pasted_url_links_selected_text() {
    let mut editor = editor("<p>docs</p>");
    select_first_block(&mut editor);

    assert!(editor.paste(ClipboardData::text(URL)).unwrap());

    assert!(editor.value().contains(&format!("<a href=\"{URL}\">docs</a>")));
    assert_eq!(document_text(&editor), "docs");
}

#[test]
fn link_listeners_can_replace_the_new_link() {
    let mut editor = Editor::new(EditorConfig::default());
    let seen = Rc::new(RefCell::new(Vec::new()));
    editor.set_listener(Box::new(Unfurler {
        seen: seen.clone(),
        below: false,
    }));

    editor.paste(ClipboardData::text(URL)).unwrap();

    assert_eq!(seen.borrow().as_slice(), [URL.to_string()]);
    assert_eq!(document_text(&editor), "preview");
    assert!(!editor.value().contains("href"));
}

#[test]
fn link_listeners_can_add_a_card_below() {
    let mut editor = Editor::new(EditorConfig::default());
    editor.set_listener(Box::new(Unfurler {
        seen: Rc::new(RefCell::new(Vec::new())),
        below: true,
    }));

    editor.paste(ClipboardData::text(URL)).unwrap();

    let root = editor.tree().root();
    assert_eq!(editor.tree().child_count(root), 2);
    assert_eq!(
        count_decorators(&editor, |decorator| matches!(
            decorator,
            DecoratorNode::Custom(custom) if custom.sgid.as_deref() == Some("gid-card")
        )),
        1
    );
}

#[test]
fn plain_text_is_read_as_markdown() {
    let mut editor = Editor::new(EditorConfig::default());

    assert!(editor.paste(ClipboardData::text("**bold** and more")).unwrap());

    assert_eq!(document_text(&editor), "bold and more");
    let tree = editor.tree();
    let bold = tree
        .document_order()
        .into_iter()
        .filter_map(|key| tree.data(key).and_then(NodeData::as_text))
        .find(|text| text.text == "bold")
        .unwrap();
    assert!(bold.format.has(FormatType::Bold));
}

#[test]
fn markdown_paragraphs_after_the_first_become_blocks() {
    let mut editor = Editor::new(EditorConfig::default());

    editor.paste(ClipboardData::text("first\n\nsecond")).unwrap();

    let root = editor.tree().root();
    assert_eq!(editor.tree().child_count(root), 2);
    assert_eq!(document_text(&editor), "first\n\nsecond");
}

#[test]
fn text_pasted_into_code_keeps_its_lines() {
    let mut editor = editor("<pre>x</pre>");

    assert!(editor.paste(ClipboardData::text("a\nb")).unwrap());

    let root = editor.tree().root();
    assert_eq!(editor.tree().child_count(root), 1);
    assert_eq!(document_text(&editor), "xa\nb");
}

#[test]
fn markup_is_inserted_as_markup() {
    let mut editor = Editor::new(EditorConfig::default());

    assert!(editor
        .paste(ClipboardData::html("<p><em>hi</em></p>", "hi"))
        .unwrap());

    assert!(editor.value().contains("<em>hi</em>"));
}

#[test]
fn pasted_files_upload_and_ask_to_restore_the_scroll() {
    let mut editor = Editor::new(EditorConfig::default());
    let scroll = ScrollPosition { top: 7, left: 0 };
    editor.set_scroll_position(scroll);

    let file = UploadFile::new("photo.png", "image/png", vec![1, 2, 3]);
    assert!(editor.paste(ClipboardData::files(vec![file])).unwrap());

    assert_eq!(
        count_decorators(&editor, |decorator| matches!(decorator, DecoratorNode::Upload(_))),
        1
    );
    assert_eq!(editor.take_scroll_restore(), Some(scroll));
    assert_eq!(editor.take_scroll_restore(), None);
}

#[test]
fn pasted_files_are_ignored_without_attachments() {
    let mut editor = Editor::new(EditorConfig::default().with_attachments(false));

    let file = UploadFile::new("photo.png", "image/png", vec![1]);
    assert!(!editor.paste(ClipboardData::files(vec![file])).unwrap());

    assert_eq!(count_decorators(&editor, |_| true), 0);
}

#[test]
fn pasted_files_without_attachments_log_a_warning() {
    let logs = LogBuffer::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::WARN)
        .finish();

    tracing::subscriber::with_default(subscriber, || {
        let mut editor = Editor::new(EditorConfig::default().with_attachments(false));
        let file = UploadFile::new("photo.png", "image/png", vec![1]);
        assert!(!editor.paste(ClipboardData::files(vec![file])).unwrap());
    });

    let output = logs.contents();
    assert!(output.contains("WARN"), "{output}");
    assert!(output.contains("does not accept attachments"), "{output}");
}
