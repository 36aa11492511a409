//! Bridges between the editing tree and tdoc documents (FTML and Markdown).

use std::io::Cursor;

use tdoc::{
    ChecklistItem, Document, InlineStyle, Paragraph, ParagraphType, Span, markdown, parse,
    writer::Writer,
};

use crate::engine::{
    DecoratorNode, ElementKind, FormatType, HeadingTag, ListType, NodeData, NodeKey, TextFormat,
    TextNode, TextStyle, Tree,
};
use crate::error::{EditorError, Result};

/// Background applied to highlighted spans coming from tdoc, which carries
/// no color of its own.
pub const IMPORTED_HIGHLIGHT_BACKGROUND: &str = "yellow";

pub fn markdown_to_nodes(tree: &mut Tree, source: &str) -> Result<Vec<NodeKey>> {
    let document = markdown::parse(Cursor::new(source))
        .map_err(|err| EditorError::Markdown(err.to_string()))?;
    document_to_nodes(tree, &document)
}

pub fn ftml_to_nodes(tree: &mut Tree, source: &str) -> Result<Vec<NodeKey>> {
    let document =
        parse(Cursor::new(source)).map_err(|err| EditorError::Markdown(err.to_string()))?;
    document_to_nodes(tree, &document)
}

/// Builds detached top-level nodes for every paragraph of `document`.
pub fn document_to_nodes(tree: &mut Tree, document: &Document) -> Result<Vec<NodeKey>> {
    document
        .paragraphs
        .iter()
        .map(|paragraph| paragraph_to_node(tree, paragraph))
        .collect()
}

/// A whole tree built from a tdoc document.
pub fn document_to_tree(document: &Document) -> Result<Tree> {
    let mut tree = Tree::new();
    let nodes = document_to_nodes(&mut tree, document)?;
    let root = tree.root();
    if nodes.is_empty() {
        let paragraph = tree.create_paragraph();
        tree.append(root, paragraph)?;
    } else {
        tree.append_all(root, &nodes)?;
    }
    Ok(tree)
}

fn paragraph_to_node(tree: &mut Tree, paragraph: &Paragraph) -> Result<NodeKey> {
    match paragraph {
        Paragraph::Text { content } => inline_block(tree, ElementKind::Paragraph, content),
        Paragraph::Header1 { content } => {
            inline_block(tree, ElementKind::Heading(HeadingTag::H1), content)
        }
        Paragraph::Header2 { content } => {
            inline_block(tree, ElementKind::Heading(HeadingTag::H2), content)
        }
        Paragraph::Header3 { content } => {
            inline_block(tree, ElementKind::Heading(HeadingTag::H3), content)
        }
        Paragraph::CodeBlock { content } => {
            let code = tree.create(NodeData::Element(ElementKind::Code { language: None }));
            let text: String = content.iter().map(span_text).collect();
            let mut lines = text.trim_end_matches('\n').split('\n').peekable();
            while let Some(line) = lines.next() {
                if !line.is_empty() {
                    let key = tree.create_text(line);
                    tree.append(code, key)?;
                }
                if lines.peek().is_some() {
                    let key = tree.create(NodeData::LineBreak);
                    tree.append(code, key)?;
                }
            }
            Ok(code)
        }
        Paragraph::OrderedList { entries } => list(tree, ListType::Number, entries),
        Paragraph::UnorderedList { entries } => list(tree, ListType::Bullet, entries),
        Paragraph::Quote { children } => {
            let quote = tree.create(NodeData::Element(ElementKind::Quote));
            for child in children {
                let node = paragraph_to_node(tree, child)?;
                tree.append(quote, node)?;
            }
            Ok(quote)
        }
        Paragraph::Checklist { items } => checklist(tree, items),
    }
}

fn inline_block(tree: &mut Tree, kind: ElementKind, content: &[Span]) -> Result<NodeKey> {
    let block = tree.create(NodeData::Element(kind));
    append_spans(tree, block, content, TextFormat::NONE)?;
    Ok(block)
}

fn list(tree: &mut Tree, list_type: ListType, entries: &[Vec<Paragraph>]) -> Result<NodeKey> {
    let list = tree.create(NodeData::Element(ElementKind::List(list_type)));
    for entry in entries {
        let item = tree.create(NodeData::Element(ElementKind::ListItem));
        for paragraph in entry {
            match paragraph {
                Paragraph::OrderedList { .. }
                | Paragraph::UnorderedList { .. }
                | Paragraph::Checklist { .. } => {
                    let nested = paragraph_to_node(tree, paragraph)?;
                    tree.append(item, nested)?;
                }
                Paragraph::Quote { .. } => {
                    let quote = paragraph_to_node(tree, paragraph)?;
                    tree.append(item, quote)?;
                }
                _ => {
                    if tree.child_count(item) > 0 {
                        let key = tree.create(NodeData::LineBreak);
                        tree.append(item, key)?;
                    }
                    append_spans(tree, item, paragraph.content(), TextFormat::NONE)?;
                }
            }
        }
        tree.append(list, item)?;
    }
    Ok(list)
}

/// Checklists have no counterpart in the editor; they become bullet lists
/// whose items keep a textual check mark.
fn checklist(tree: &mut Tree, items: &[ChecklistItem]) -> Result<NodeKey> {
    let list = tree.create(NodeData::Element(ElementKind::List(ListType::Bullet)));
    for entry in items {
        let item = tree.create(NodeData::Element(ElementKind::ListItem));
        let mark = tree.create_text(if entry.checked { "[x] " } else { "[ ] " });
        tree.append(item, mark)?;
        append_spans(tree, item, &entry.content, TextFormat::NONE)?;
        if !entry.children.is_empty() {
            let nested = checklist(tree, &entry.children)?;
            tree.append(item, nested)?;
        }
        tree.append(list, item)?;
    }
    Ok(list)
}

fn span_text(span: &Span) -> String {
    let mut text = span.text.clone();
    for child in &span.children {
        text.push_str(&span_text(child));
    }
    text
}

fn format_for(style: InlineStyle) -> Option<FormatType> {
    match style {
        InlineStyle::Bold => Some(FormatType::Bold),
        InlineStyle::Italic => Some(FormatType::Italic),
        InlineStyle::Highlight => Some(FormatType::Highlight),
        InlineStyle::Code => Some(FormatType::Code),
        InlineStyle::Strike => Some(FormatType::Strikethrough),
        InlineStyle::None | InlineStyle::Link | InlineStyle::Underline => None,
    }
}

fn append_spans(tree: &mut Tree, parent: NodeKey, spans: &[Span], format: TextFormat) -> Result<()> {
    for span in spans {
        let format = match format_for(span.style) {
            Some(format_type) => format.with(format_type),
            None => format,
        };
        let target = match (&span.style, &span.link_target) {
            (InlineStyle::Link, Some(url)) => {
                let link = tree.create(NodeData::Element(ElementKind::Link { url: url.clone() }));
                tree.append(parent, link)?;
                link
            }
            _ => parent,
        };
        append_text(tree, target, &span.text, format)?;
        append_spans(tree, target, &span.children, format)?;
    }
    Ok(())
}

fn append_text(tree: &mut Tree, parent: NodeKey, text: &str, format: TextFormat) -> Result<()> {
    let mut lines = text.split('\n').peekable();
    while let Some(line) = lines.next() {
        if !line.is_empty() {
            let mut style = TextStyle::default();
            if format.has(FormatType::Highlight) {
                style.set("background-color", Some(IMPORTED_HIGHLIGHT_BACKGROUND));
            }
            let node = TextNode::new(line).with_format(format).with_style(style);
            let key = tree.create(NodeData::Text(node));
            tree.append(parent, key)?;
        }
        if lines.peek().is_some() {
            let key = tree.create(NodeData::LineBreak);
            tree.append(parent, key)?;
        }
    }
    Ok(())
}

/// Exports the tree as a tdoc document. Attachments become their caption
/// text; pending uploads are left out.
pub fn to_document(tree: &Tree) -> Document {
    let paragraphs = tree
        .children(tree.root())
        .iter()
        .filter_map(|key| node_to_paragraph(tree, *key))
        .collect();
    Document::new().with_paragraphs(paragraphs)
}

pub fn to_ftml(tree: &Tree) -> Result<String> {
    Writer::new()
        .write_to_string(&to_document(tree))
        .map_err(|err| EditorError::Markdown(err.to_string()))
}

pub fn to_markdown(tree: &Tree) -> Result<String> {
    let mut contents = Vec::new();
    markdown::write(&mut contents, &to_document(tree))
        .map_err(|err| EditorError::Markdown(err.to_string()))?;
    Ok(String::from_utf8_lossy(&contents).into_owned())
}

fn node_to_paragraph(tree: &Tree, key: NodeKey) -> Option<Paragraph> {
    match tree.data(key)? {
        NodeData::Element(kind) => Some(match kind {
            ElementKind::Paragraph | ElementKind::Link { .. } => {
                Paragraph::new_text().with_content(spans_of(tree, key))
            }
            ElementKind::Heading(tag) => {
                let paragraph_type = match tag {
                    HeadingTag::H1 => ParagraphType::Header1,
                    HeadingTag::H2 => ParagraphType::Header2,
                    _ => ParagraphType::Header3,
                };
                Paragraph::new(paragraph_type).with_content(spans_of(tree, key))
            }
            ElementKind::Code { .. } => Paragraph::new(ParagraphType::CodeBlock)
                .with_content(vec![Span::new_text(&tree.text_content(key))]),
            ElementKind::Quote => {
                let children = block_children(tree, key);
                Paragraph::new_quote().with_children(children)
            }
            ElementKind::List(list_type) => {
                let entries = tree
                    .children(key)
                    .iter()
                    .map(|item| block_children(tree, *item))
                    .collect();
                match list_type {
                    ListType::Bullet => Paragraph::new_unordered_list().with_entries(entries),
                    ListType::Number => Paragraph::new_ordered_list().with_entries(entries),
                }
            }
            ElementKind::ListItem => Paragraph::new_text().with_content(spans_of(tree, key)),
        }),
        NodeData::Decorator(DecoratorNode::Upload(_)) => None,
        NodeData::Decorator(decorator) => Some(
            Paragraph::new_text()
                .with_content(vec![Span::new_text(decorator.text_content().trim_end())]),
        ),
        NodeData::Text(_) | NodeData::LineBreak => {
            Some(Paragraph::new_text().with_content(spans_of_leaves(tree, &[key])))
        }
        NodeData::Root => None,
    }
}

/// Children of a container as paragraphs; runs of inline children are
/// gathered into one text paragraph.
fn block_children(tree: &Tree, key: NodeKey) -> Vec<Paragraph> {
    let mut paragraphs = Vec::new();
    let mut inline_run: Vec<NodeKey> = Vec::new();
    for child in tree.children(key) {
        if tree.data(*child).is_some_and(NodeData::is_inline) {
            inline_run.push(*child);
            continue;
        }
        if !inline_run.is_empty() {
            paragraphs
                .push(Paragraph::new_text().with_content(spans_of_leaves(tree, &inline_run)));
            inline_run.clear();
        }
        if let Some(paragraph) = node_to_paragraph(tree, *child) {
            paragraphs.push(paragraph);
        }
    }
    if !inline_run.is_empty() || paragraphs.is_empty() {
        paragraphs.push(Paragraph::new_text().with_content(spans_of_leaves(tree, &inline_run)));
    }
    paragraphs
}

fn spans_of(tree: &Tree, key: NodeKey) -> Vec<Span> {
    spans_of_leaves(tree, tree.children(key))
}

fn spans_of_leaves(tree: &Tree, keys: &[NodeKey]) -> Vec<Span> {
    let mut spans = Vec::new();
    for key in keys {
        match tree.data(*key) {
            Some(NodeData::Text(text)) => spans.push(styled_span(text)),
            Some(NodeData::LineBreak) => spans.push(Span::new_text("\n")),
            Some(NodeData::Element(ElementKind::Link { url })) => {
                let mut link = Span::new_styled(InlineStyle::Link)
                    .with_children(spans_of_leaves(tree, tree.children(*key)));
                link.link_target = Some(url.clone());
                spans.push(link);
            }
            Some(NodeData::Decorator(decorator)) if decorator.is_inline() => {
                spans.push(Span::new_text(&decorator.text_content()));
            }
            _ => {}
        }
    }
    if spans.is_empty() {
        spans.push(Span::new_text(""));
    }
    spans
}

/// Wraps the text in one span per format, outermost first.
fn styled_span(text: &TextNode) -> Span {
    let styles: Vec<InlineStyle> = [
        (FormatType::Bold, InlineStyle::Bold),
        (FormatType::Italic, InlineStyle::Italic),
        (FormatType::Strikethrough, InlineStyle::Strike),
        (FormatType::Highlight, InlineStyle::Highlight),
        (FormatType::Code, InlineStyle::Code),
    ]
    .into_iter()
    .filter(|(format, _)| text.format.has(*format))
    .map(|(_, style)| style)
    .collect();

    let Some((innermost, outer)) = styles.split_last() else {
        return Span::new_text(text.text.as_str());
    };
    let mut span = Span::new_styled(*innermost).with_text(&text.text);
    for style in outer.iter().rev() {
        span = Span::new_styled(*style).with_children(vec![span]);
    }
    span
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markdown_headings_lists_and_emphasis_become_nodes() {
        let mut tree = Tree::new();
        let nodes =
            markdown_to_nodes(&mut tree, "## Notes\n\nSome **bold** text\n\n- one\n- two\n")
                .unwrap();
        assert_eq!(nodes.len(), 3);
        assert_eq!(
            tree.element_kind(nodes[0]),
            Some(&ElementKind::Heading(HeadingTag::H2))
        );
        assert_eq!(tree.text_content(nodes[1]), "Some bold text");
        let bold = tree
            .children(nodes[1])
            .iter()
            .find(|key| tree.text(**key) == Some("bold"))
            .copied()
            .unwrap();
        assert!(
            tree.data(bold)
                .and_then(NodeData::as_text)
                .unwrap()
                .format
                .has(FormatType::Bold)
        );
        assert_eq!(
            tree.element_kind(nodes[2]),
            Some(&ElementKind::List(ListType::Bullet))
        );
        assert_eq!(tree.child_count(nodes[2]), 2);
    }

    #[test]
    fn markdown_links_become_link_elements() {
        let mut tree = Tree::new();
        let nodes = markdown_to_nodes(&mut tree, "see [docs](https://example.com/docs)\n").unwrap();
        let link = tree
            .children(nodes[0])
            .iter()
            .copied()
            .find(|key| tree.is_kind(*key, |kind| matches!(kind, ElementKind::Link { .. })))
            .unwrap();
        assert_eq!(
            tree.element_kind(link),
            Some(&ElementKind::Link {
                url: "https://example.com/docs".to_string()
            })
        );
        assert_eq!(tree.text_content(link), "docs");
    }

    #[test]
    fn document_export_keeps_structure() {
        let tree =
            crate::markup::parse_document("<h1>Title</h1><blockquote><p>q</p></blockquote><ol><li>a</li></ol>")
                .unwrap();
        let document = to_document(&tree);
        assert_eq!(document.paragraphs.len(), 3);
        assert!(matches!(document.paragraphs[0], Paragraph::Header1 { .. }));
        assert!(matches!(document.paragraphs[1], Paragraph::Quote { .. }));
        let Paragraph::OrderedList { entries } = &document.paragraphs[2] else {
            panic!("expected an ordered list");
        };
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0][0].content()[0].text, "a");
    }

    #[test]
    fn bold_italic_text_nests_spans() {
        let text = TextNode::new("both").with_format(
            TextFormat::NONE
                .with(FormatType::Bold)
                .with(FormatType::Italic),
        );
        let span = styled_span(&text);
        assert_eq!(span.style, InlineStyle::Bold);
        assert_eq!(span.children[0].style, InlineStyle::Italic);
        assert_eq!(span.children[0].text, "both");
    }

    #[test]
    fn ftml_export_round_trips_through_tdoc() {
        let tree = crate::markup::parse_document("<p>hello <strong>world</strong></p>").unwrap();
        let ftml = to_ftml(&tree).unwrap();
        let mut again = Tree::new();
        let nodes = ftml_to_nodes(&mut again, &ftml).unwrap();
        assert_eq!(again.text_content(nodes[0]), "hello world");
    }
}
