//! Sanitized markup interchange.
//!
//! Documents travel as a small allow-listed subset of HTML. Parsing drops
//! every tag outside [`ALLOWED_TAGS`] (keeping its text), every attribute
//! outside [`ALLOWED_ATTRIBUTES`], and every style property other than the
//! two highlight colors. Serialization only ever emits that subset.

use quick_xml::{
    Reader,
    escape::escape,
    events::{BytesStart, BytesText, Event},
};

use crate::engine::{
    Attachment, CustomAttachment, DecoratorNode, ElementKind, FormatType, HeadingTag, ListType,
    NodeData, NodeKey, TextFormat, TextNode, TextStyle, Tree,
};
use crate::error::{EditorError, Result};

pub const ALLOWED_TAGS: &[&str] = &[
    "a",
    "action-text-attachment",
    "b",
    "blockquote",
    "br",
    "code",
    "del",
    "em",
    "figcaption",
    "figure",
    "h1",
    "h2",
    "h3",
    "h4",
    "h5",
    "h6",
    "hr",
    "i",
    "img",
    "li",
    "mark",
    "ol",
    "p",
    "pre",
    "q",
    "s",
    "span",
    "strong",
    "ul",
];

pub const ALLOWED_ATTRIBUTES: &[&str] = &[
    "alt",
    "caption",
    "class",
    "content",
    "content-type",
    "contenteditable",
    "data-direct-upload-id",
    "data-sgid",
    "filename",
    "filesize",
    "height",
    "href",
    "presentation",
    "previewable",
    "sgid",
    "src",
    "style",
    "title",
    "url",
    "width",
];

pub const ALLOWED_STYLE_PROPERTIES: &[&str] = &["color", "background-color"];

pub const UNKNOWN_CONTENT_TYPE: &str = "application/vnd.actiontext.unknown";

/// Elements whose content is dropped together with the tag.
const OPAQUE_TAGS: &[&str] = &["script", "style", "template", "iframe", "object", "head", "title"];

pub fn is_allowed_tag(name: &str) -> bool {
    ALLOWED_TAGS.contains(&name)
}

pub fn is_allowed_attribute(name: &str) -> bool {
    ALLOWED_ATTRIBUTES.contains(&name)
}

/// Reduces a `style` attribute to the highlight color properties.
pub fn sanitize_style(css: &str) -> TextStyle {
    let mut style = TextStyle::parse(css);
    style.retain(|name| ALLOWED_STYLE_PROPERTIES.contains(&name));
    style
}

#[derive(Debug, Default)]
struct Attributes(Vec<(String, String)>);

impl Attributes {
    fn read(element: &BytesStart<'_>) -> Self {
        let mut attributes = Vec::new();
        for attr in element.html_attributes().flatten() {
            let name = String::from_utf8_lossy(attr.key.as_ref()).to_ascii_lowercase();
            if !is_allowed_attribute(&name) {
                continue;
            }
            let value = attr
                .unescape_value()
                .map(|value| value.into_owned())
                .unwrap_or_else(|_| String::from_utf8_lossy(&attr.value).into_owned());
            attributes.push((name, value));
        }
        Attributes(attributes)
    }

    fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    fn string(&self, name: &str) -> Option<String> {
        self.get(name)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    }

    fn number<T: std::str::FromStr>(&self, name: &str) -> Option<T> {
        self.get(name).and_then(|value| value.trim().parse().ok())
    }

    fn style(&self) -> TextStyle {
        self.get("style").map(sanitize_style).unwrap_or_default()
    }
}

#[derive(Debug)]
struct Frame {
    tag: String,
    container: Option<NodeKey>,
    format: TextFormat,
    style: TextStyle,
    preformatted: bool,
    opaque: bool,
}

/// Builds detached nodes in a tree from a markup event stream.
struct FragmentBuilder<'t> {
    tree: &'t mut Tree,
    top: Vec<NodeKey>,
    frames: Vec<Frame>,
    implicit_paragraph: Option<NodeKey>,
}

impl<'t> FragmentBuilder<'t> {
    fn new(tree: &'t mut Tree) -> Self {
        Self {
            tree,
            top: Vec::new(),
            frames: Vec::new(),
            implicit_paragraph: None,
        }
    }

    fn container(&self) -> Option<NodeKey> {
        self.frames.iter().rev().find_map(|frame| frame.container)
    }

    fn format(&self) -> TextFormat {
        self.frames.last().map(|frame| frame.format).unwrap_or_default()
    }

    fn style(&self) -> TextStyle {
        self.frames
            .last()
            .map(|frame| frame.style.clone())
            .unwrap_or_default()
    }

    fn preformatted(&self) -> bool {
        self.frames.iter().any(|frame| frame.preformatted)
    }

    fn skipping(&self) -> bool {
        self.frames.iter().any(|frame| frame.opaque)
    }

    fn push(&mut self, tag: &str, container: Option<NodeKey>) -> &mut Frame {
        let format = self.format();
        let style = self.style();
        let preformatted = self.preformatted();
        self.frames.push(Frame {
            tag: tag.to_string(),
            container,
            format,
            style,
            preformatted,
            opaque: false,
        });
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }

    fn kind_of(&self, key: NodeKey) -> Option<ElementKind> {
        self.tree.element_kind(key).cloned()
    }

    fn accepts_inline(&self, key: NodeKey) -> bool {
        self.kind_of(key).is_some_and(|kind| {
            kind.holds_inline_content() || matches!(kind, ElementKind::ListItem | ElementKind::Quote)
        })
    }

    fn add_inline(&mut self, node: NodeKey) -> Result<()> {
        match self.container() {
            Some(container) if self.accepts_inline(container) => self.tree.append(container, node),
            Some(container) => {
                let wrapper = if self.kind_of(container).is_some_and(|kind| kind.is_list()) {
                    self.reuse_last_item(container)
                } else {
                    None
                };
                let wrapper = match wrapper {
                    Some(item) => item,
                    None => {
                        let item = self
                            .tree
                            .create(NodeData::Element(ElementKind::ListItem));
                        self.tree.append(container, item)?;
                        item
                    }
                };
                self.tree.append(wrapper, node)
            }
            None => {
                let paragraph = match self.implicit_paragraph {
                    Some(paragraph) if self.top.last() == Some(&paragraph) => paragraph,
                    _ => {
                        let paragraph = self.tree.create_paragraph();
                        self.top.push(paragraph);
                        self.implicit_paragraph = Some(paragraph);
                        paragraph
                    }
                };
                self.tree.append(paragraph, node)
            }
        }
    }

    fn reuse_last_item(&self, list: NodeKey) -> Option<NodeKey> {
        let last = self.tree.last_child(list)?;
        let open = self.frames.iter().any(|frame| frame.container == Some(last));
        let inline_only = self
            .tree
            .children(last)
            .iter()
            .all(|child| self.tree.data(*child).is_some_and(NodeData::is_inline));
        (!open && inline_only).then_some(last)
    }

    fn add_block(&mut self, node: NodeKey) -> Result<()> {
        let Some(container) = self.container() else {
            self.top.push(node);
            return Ok(());
        };
        let Some(kind) = self.kind_of(container) else {
            return self.tree.append(container, node);
        };
        if kind.holds_inline_content() {
            // Blocks cannot live inside inline content; hoist them after the
            // outermost open inline holder.
            let holder = self
                .frames
                .iter()
                .filter_map(|frame| frame.container)
                .find(|key| self.kind_of(*key).is_some_and(|kind| kind.holds_inline_content()))
                .unwrap_or(container);
            if self.tree.parent(holder).is_some() {
                return self.tree.insert_after(holder, node);
            }
            let index = self
                .top
                .iter()
                .position(|key| *key == holder)
                .map(|index| index + 1)
                .unwrap_or(self.top.len());
            self.top.insert(index, node);
            return Ok(());
        }
        let is_item = self.tree.is_kind(node, |kind| matches!(kind, ElementKind::ListItem));
        if kind.is_list() && !is_item {
            let item = match self.tree.last_child(container) {
                Some(last) if self.tree.is_kind(node, ElementKind::is_list) => last,
                _ => {
                    let item = self.tree.create(NodeData::Element(ElementKind::ListItem));
                    self.tree.append(container, item)?;
                    item
                }
            };
            return self.tree.append(item, node);
        }
        self.tree.append(container, node)
    }

    fn open_block(&mut self, tag: &str, kind: ElementKind) -> Result<()> {
        let key = self.tree.create(NodeData::Element(kind));
        self.add_block(key)?;
        self.push(tag, Some(key));
        Ok(())
    }

    fn start(&mut self, element: &BytesStart<'_>) -> Result<()> {
        let name = String::from_utf8_lossy(element.name().as_ref()).to_ascii_lowercase();
        if self.skipping() {
            if !is_void(&name) {
                self.push(&name, None).opaque = true;
            }
            return Ok(());
        }
        let attributes = Attributes::read(element);
        if OPAQUE_TAGS.contains(&name.as_str()) {
            self.push(&name, None).opaque = true;
            return Ok(());
        }
        if !is_allowed_tag(&name) {
            self.push(&name, None);
            return Ok(());
        }

        if let Some(tag) = HeadingTag::from_tag_name(&name) {
            return self.open_block(&name, ElementKind::Heading(tag));
        }
        match name.as_str() {
            "p" => {
                let in_item = self
                    .container()
                    .and_then(|key| self.kind_of(key))
                    .is_some_and(|kind| matches!(kind, ElementKind::ListItem));
                if in_item {
                    if let Some(item) = self.container()
                        && !self.tree.children(item).is_empty()
                    {
                        let line_break = self.tree.create(NodeData::LineBreak);
                        self.tree.append(item, line_break)?;
                    }
                    self.push(&name, None);
                    Ok(())
                } else {
                    self.open_block(&name, ElementKind::Paragraph)
                }
            }
            "ul" | "ol" => {
                let list_type = if name == "ol" {
                    ListType::Number
                } else {
                    ListType::Bullet
                };
                self.open_block(&name, ElementKind::List(list_type))
            }
            "li" => {
                let in_list = self
                    .container()
                    .and_then(|key| self.kind_of(key))
                    .is_some_and(|kind| kind.is_list());
                if !in_list {
                    self.open_block("", ElementKind::List(ListType::Bullet))?;
                }
                self.open_block(&name, ElementKind::ListItem)
            }
            "blockquote" => self.open_block(&name, ElementKind::Quote),
            "pre" => {
                self.open_block(&name, ElementKind::Code { language: None })?;
                if let Some(frame) = self.frames.last_mut() {
                    frame.preformatted = true;
                }
                Ok(())
            }
            "a" => {
                let url = attributes.get("href").unwrap_or_default().to_string();
                let link = self.tree.create(NodeData::Element(ElementKind::Link { url }));
                self.add_inline(link)?;
                self.push(&name, Some(link)).style.extend(&attributes.style());
                Ok(())
            }
            "br" => self.line_break(),
            "hr" => self.add_block_leaf(NodeData::Decorator(DecoratorNode::Divider)),
            "img" => {
                let attachment = image_attachment(&attributes);
                self.add_block_leaf(NodeData::Decorator(DecoratorNode::Attachment(attachment)))
            }
            "action-text-attachment" => {
                self.attachment(&attributes)?;
                self.push(&name, None).opaque = true;
                Ok(())
            }
            _ => {
                let format = match name.as_str() {
                    "b" | "strong" => Some(FormatType::Bold),
                    "i" | "em" => Some(FormatType::Italic),
                    "s" | "del" => Some(FormatType::Strikethrough),
                    "mark" => Some(FormatType::Highlight),
                    "code" if !self.preformatted() => Some(FormatType::Code),
                    _ => None,
                };
                let style = attributes.style();
                let frame = self.push(&name, None);
                if let Some(format) = format {
                    frame.format = frame.format.with(format);
                }
                frame.style.extend(&style);
                Ok(())
            }
        }
    }

    fn end(&mut self, name: &str) {
        let Some(index) = self.frames.iter().rposition(|frame| frame.tag == name) else {
            return;
        };
        self.frames.truncate(index);
        // An implicit list opened for a stray <li> closes with it.
        while self.frames.last().is_some_and(|frame| frame.tag.is_empty()) {
            self.frames.pop();
        }
    }

    fn empty(&mut self, element: &BytesStart<'_>) -> Result<()> {
        let name = String::from_utf8_lossy(element.name().as_ref()).to_ascii_lowercase();
        self.start(element)?;
        if !is_void(&name) {
            self.end(&name);
        }
        Ok(())
    }

    fn add_block_leaf(&mut self, data: NodeData) -> Result<()> {
        let key = self.tree.create(data);
        self.add_block(key)
    }

    fn line_break(&mut self) -> Result<()> {
        let key = self.tree.create(NodeData::LineBreak);
        self.add_inline(key)
    }

    fn attachment(&mut self, attributes: &Attributes) -> Result<()> {
        if let Some(content) = attributes.get("content") {
            let custom = CustomAttachment {
                sgid: attributes.string("sgid"),
                content_type: attributes
                    .string("content-type")
                    .unwrap_or_else(|| UNKNOWN_CONTENT_TYPE.to_string()),
                inner_markup: content.to_string(),
            };
            if self.previous_text_ends_with_space() {
                self.text(" ".to_string())?;
            }
            let key = self
                .tree
                .create(NodeData::Decorator(DecoratorNode::Custom(custom)));
            self.add_inline(key)?;
            return self.text(" ".to_string());
        }
        let attachment = Attachment {
            sgid: attributes.string("sgid"),
            src: attributes.string("url"),
            previewable: attributes.get("previewable") == Some("true"),
            alt_text: attributes.string("alt"),
            caption: attributes.string("caption"),
            content_type: attributes.string("content-type").unwrap_or_default(),
            file_name: attributes.string("filename").unwrap_or_default(),
            file_size: attributes.number("filesize"),
            width: attributes.number("width"),
            height: attributes.number("height"),
        };
        self.add_block_leaf(NodeData::Decorator(DecoratorNode::Attachment(attachment)))
    }

    fn previous_text_ends_with_space(&self) -> bool {
        let Some(container) = self.container().or(self.implicit_paragraph) else {
            return false;
        };
        self.tree
            .last_child(container)
            .and_then(|last| self.tree.text(last))
            .and_then(|text| text.chars().last())
            .is_some_and(char::is_whitespace)
    }

    fn raw_text(&mut self, raw: String) -> Result<()> {
        if self.skipping() {
            return Ok(());
        }
        if self.preformatted() {
            let mut lines = raw.split('\n').peekable();
            while let Some(line) = lines.next() {
                if !line.is_empty() {
                    self.text(line.to_string())?;
                }
                if lines.peek().is_some() {
                    self.line_break()?;
                }
            }
            return Ok(());
        }
        let text = raw.replace(['\n', '\r', '\t'], " ");
        if text.trim().is_empty() && !self.keeps_whitespace(&raw) {
            return Ok(());
        }
        self.text(text)
    }

    /// Whitespace-only text is layout noise between blocks, but a separator
    /// inside a line.
    fn keeps_whitespace(&self, raw: &str) -> bool {
        let Some(container) = self.container() else {
            return false;
        };
        match self.kind_of(container) {
            Some(kind) if kind.holds_inline_content() => true,
            Some(ElementKind::ListItem | ElementKind::Quote) => {
                !raw.contains('\n') && !self.tree.children(container).is_empty()
            }
            _ => false,
        }
    }

    fn text(&mut self, text: String) -> Result<()> {
        let node = TextNode::new(text)
            .with_format(self.format())
            .with_style(self.style());
        let key = self.tree.create(NodeData::Text(node));
        self.add_inline(key)
    }
}

fn is_void(name: &str) -> bool {
    matches!(name, "br" | "hr" | "img" | "meta" | "link" | "input" | "wbr" | "col" | "source")
}

fn image_attachment(attributes: &Attributes) -> Attachment {
    let src = attributes.string("src");
    let file_name = src
        .as_deref()
        .and_then(|src| src.rsplit('/').next())
        .unwrap_or_default()
        .to_string();
    Attachment {
        src,
        caption: attributes.string("alt"),
        content_type: "image/*".to_string(),
        file_name,
        width: attributes.number("width"),
        height: attributes.number("height"),
        ..Attachment::default()
    }
}

fn unescape_text(text: &BytesText<'_>) -> String {
    text.unescape()
        .map(|text| text.into_owned())
        .unwrap_or_else(|_| String::from_utf8_lossy(text).into_owned())
}

/// Parses `markup` into detached nodes of `tree` and returns the top-level
/// ones in document order. Inline content outside any block is gathered into
/// paragraphs.
pub fn parse_fragment(tree: &mut Tree, markup: &str) -> Result<Vec<NodeKey>> {
    let mut reader = Reader::from_reader(markup.as_bytes());
    reader.trim_text(false);
    reader.check_end_names(false);

    let mut builder = FragmentBuilder::new(tree);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => builder.start(e)?,
            Ok(Event::Empty(ref e)) => builder.empty(e)?,
            Ok(Event::End(ref e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_ascii_lowercase();
                builder.end(&name);
            }
            Ok(Event::Text(ref e)) => builder.raw_text(unescape_text(e))?,
            Ok(Event::CData(ref e)) => {
                builder.raw_text(String::from_utf8_lossy(e).into_owned())?
            }
            Ok(Event::Eof) => break,
            Err(err) => {
                return Err(EditorError::Markup(format!(
                    "markup error at position {}: {err}",
                    reader.buffer_position()
                )));
            }
            _ => {}
        }
        buf.clear();
    }
    Ok(builder.top)
}

/// Parses a whole document. An empty document gets one empty paragraph.
pub fn parse_document(markup: &str) -> Result<Tree> {
    let mut tree = Tree::new();
    let nodes = parse_fragment(&mut tree, markup)?;
    let root = tree.root();
    if nodes.is_empty() {
        let paragraph = tree.create_paragraph();
        tree.append(root, paragraph)?;
    } else {
        tree.append_all(root, &nodes)?;
    }
    tree.prune_detached();
    Ok(tree)
}

/// Text of a markup string, with `<br>` as a newline.
pub fn plain_text(markup: &str) -> String {
    let mut reader = Reader::from_reader(markup.as_bytes());
    reader.trim_text(false);
    reader.check_end_names(false);

    let mut text = String::new();
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Text(ref e)) => text.push_str(&unescape_text(e)),
            Ok(Event::Start(ref e) | Event::Empty(ref e)) if e.name().as_ref() == b"br" => {
                text.push('\n');
            }
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
        buf.clear();
    }
    text
}

/// Serializes the children of the root.
pub fn to_markup(tree: &Tree) -> String {
    nodes_to_markup(tree, tree.children(tree.root()))
}

pub fn nodes_to_markup(tree: &Tree, keys: &[NodeKey]) -> String {
    let mut out = String::new();
    for key in keys {
        write_node(tree, *key, &mut out);
    }
    out
}

fn write_children(tree: &Tree, key: NodeKey, out: &mut String) {
    for child in tree.children(key) {
        write_node(tree, *child, out);
    }
}

fn write_node(tree: &Tree, key: NodeKey, out: &mut String) {
    let Some(data) = tree.data(key) else {
        return;
    };
    match data {
        NodeData::Root => write_children(tree, key, out),
        NodeData::Element(kind) => {
            let (open, close) = match kind {
                ElementKind::Paragraph => ("<p>".to_string(), "</p>"),
                ElementKind::Heading(tag) => (format!("<{}>", tag.tag_name()), close_tag(tag.tag_name())),
                ElementKind::List(list_type) => {
                    (format!("<{}>", list_type.tag_name()), close_tag(list_type.tag_name()))
                }
                ElementKind::ListItem => ("<li>".to_string(), "</li>"),
                ElementKind::Quote => ("<blockquote>".to_string(), "</blockquote>"),
                ElementKind::Code { .. } => ("<pre>".to_string(), "</pre>"),
                ElementKind::Link { url } => (format!("<a href=\"{}\">", escape(url.as_str())), "</a>"),
            };
            out.push_str(&open);
            write_children(tree, key, out);
            out.push_str(close);
        }
        NodeData::Text(text) => write_text(tree, key, text, out),
        NodeData::LineBreak => out.push_str("<br>"),
        NodeData::Decorator(decorator) => write_decorator(decorator, out),
    }
}

fn close_tag(name: &str) -> &'static str {
    match name {
        "h1" => "</h1>",
        "h2" => "</h2>",
        "h3" => "</h3>",
        "h4" => "</h4>",
        "h5" => "</h5>",
        "h6" => "</h6>",
        "ol" => "</ol>",
        _ => "</ul>",
    }
}

fn write_text(tree: &Tree, key: NodeKey, text: &TextNode, out: &mut String) {
    let in_code_block = tree
        .parent(key)
        .is_some_and(|parent| tree.is_kind(parent, ElementKind::is_code));
    let mut tags: Vec<&str> = Vec::new();
    if text.format.has(FormatType::Code) && !in_code_block {
        tags.push("code");
    }
    if text.format.has(FormatType::Bold) {
        tags.push("strong");
    }
    if text.format.has(FormatType::Italic) {
        tags.push("em");
    }
    if text.format.has(FormatType::Strikethrough) {
        tags.push("s");
    }
    let highlighted = text.format.has(FormatType::Highlight);
    let mut style = text.style.clone();
    style.retain(|name| ALLOWED_STYLE_PROPERTIES.contains(&name));

    if highlighted {
        if style.is_empty() {
            out.push_str("<mark>");
        } else {
            out.push_str(&format!("<mark style=\"{}\">", escape(style.to_css().as_str())));
        }
    } else if !style.is_empty() {
        out.push_str(&format!("<span style=\"{}\">", escape(style.to_css().as_str())));
    }
    for tag in &tags {
        out.push_str(&format!("<{tag}>"));
    }
    out.push_str(&escape(text.text.as_str()));
    for tag in tags.iter().rev() {
        out.push_str(&format!("</{tag}>"));
    }
    if highlighted {
        out.push_str("</mark>");
    } else if !style.is_empty() {
        out.push_str("</span>");
    }
}

fn write_decorator(decorator: &DecoratorNode, out: &mut String) {
    match decorator {
        DecoratorNode::Divider => out.push_str("<hr>"),
        DecoratorNode::Attachment(attachment) => {
            let mut attributes: Vec<(&str, String)> = Vec::new();
            if let Some(sgid) = &attachment.sgid {
                attributes.push(("sgid", sgid.clone()));
            }
            attributes.push(("previewable", attachment.previewable.to_string()));
            if let Some(src) = &attachment.src {
                attributes.push(("url", src.clone()));
            }
            if let Some(alt) = &attachment.alt_text {
                attributes.push(("alt", alt.clone()));
            }
            if let Some(caption) = &attachment.caption {
                attributes.push(("caption", caption.clone()));
            }
            attributes.push(("content-type", attachment.content_type.clone()));
            attributes.push(("filename", attachment.file_name.clone()));
            if let Some(size) = attachment.file_size {
                attributes.push(("filesize", size.to_string()));
            }
            if let Some(width) = attachment.width {
                attributes.push(("width", width.to_string()));
            }
            if let Some(height) = attachment.height {
                attributes.push(("height", height.to_string()));
            }
            attributes.push(("presentation", "gallery".to_string()));
            write_attachment_tag(&attributes, out);
        }
        // Pending uploads are transient and never serialized.
        DecoratorNode::Upload(_) => {}
        DecoratorNode::Custom(custom) => {
            let mut attributes: Vec<(&str, String)> = Vec::new();
            if let Some(sgid) = &custom.sgid {
                attributes.push(("sgid", sgid.clone()));
            }
            attributes.push(("content", custom.inner_markup.clone()));
            attributes.push(("content-type", custom.content_type.clone()));
            write_attachment_tag(&attributes, out);
        }
    }
}

fn write_attachment_tag(attributes: &[(&str, String)], out: &mut String) {
    out.push_str("<action-text-attachment");
    for (name, value) in attributes {
        out.push_str(&format!(" {name}=\"{}\"", escape(value.as_str())));
    }
    out.push_str("></action-text-attachment>");
}

#[cfg(test)]
#[path = "markup_tests.rs"]
mod markup_tests;
