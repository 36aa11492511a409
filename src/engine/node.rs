use std::{collections::BTreeMap, fmt};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeKey(pub(crate) u32);

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum NodeData {
    Root,
    Element(ElementKind),
    Text(TextNode),
    LineBreak,
    Decorator(DecoratorNode),
}

impl NodeData {
    pub fn text(text: impl Into<String>) -> Self {
        NodeData::Text(TextNode::new(text))
    }

    pub fn paragraph() -> Self {
        NodeData::Element(ElementKind::Paragraph)
    }

    pub fn is_element(&self) -> bool {
        matches!(self, NodeData::Element(_) | NodeData::Root)
    }

    pub fn is_text(&self) -> bool {
        matches!(self, NodeData::Text(_))
    }

    pub fn is_decorator(&self) -> bool {
        matches!(self, NodeData::Decorator(_))
    }

    pub fn is_line_break(&self) -> bool {
        matches!(self, NodeData::LineBreak)
    }

    pub fn is_inline(&self) -> bool {
        match self {
            NodeData::Root => false,
            NodeData::Element(kind) => kind.is_inline(),
            NodeData::Text(_) | NodeData::LineBreak => true,
            NodeData::Decorator(decorator) => decorator.is_inline(),
        }
    }

    pub fn element_kind(&self) -> Option<&ElementKind> {
        match self {
            NodeData::Element(kind) => Some(kind),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&TextNode> {
        match self {
            NodeData::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_decorator(&self) -> Option<&DecoratorNode> {
        match self {
            NodeData::Decorator(decorator) => Some(decorator),
            _ => None,
        }
    }

    pub fn is_block_decorator(&self) -> bool {
        matches!(self, NodeData::Decorator(decorator) if !decorator.is_inline())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeadingTag {
    H1,
    H2,
    H3,
    H4,
    H5,
    H6,
}

impl HeadingTag {
    pub fn tag_name(self) -> &'static str {
        match self {
            HeadingTag::H1 => "h1",
            HeadingTag::H2 => "h2",
            HeadingTag::H3 => "h3",
            HeadingTag::H4 => "h4",
            HeadingTag::H5 => "h5",
            HeadingTag::H6 => "h6",
        }
    }

    pub fn from_tag_name(name: &str) -> Option<Self> {
        match name {
            "h1" => Some(HeadingTag::H1),
            "h2" => Some(HeadingTag::H2),
            "h3" => Some(HeadingTag::H3),
            "h4" => Some(HeadingTag::H4),
            "h5" => Some(HeadingTag::H5),
            "h6" => Some(HeadingTag::H6),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ListType {
    Bullet,
    Number,
}

impl ListType {
    pub fn tag_name(self) -> &'static str {
        match self {
            ListType::Bullet => "ul",
            ListType::Number => "ol",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ElementKind {
    Paragraph,
    Heading(HeadingTag),
    List(ListType),
    ListItem,
    Quote,
    Code { language: Option<String> },
    Link { url: String },
}

impl ElementKind {
    pub fn is_inline(&self) -> bool {
        matches!(self, ElementKind::Link { .. })
    }

    pub fn is_list(&self) -> bool {
        matches!(self, ElementKind::List(_))
    }

    pub fn is_quote(&self) -> bool {
        matches!(self, ElementKind::Quote)
    }

    pub fn is_code(&self) -> bool {
        matches!(self, ElementKind::Code { .. })
    }

    /// Elements whose children are inline content rather than blocks.
    pub fn holds_inline_content(&self) -> bool {
        matches!(
            self,
            ElementKind::Paragraph
                | ElementKind::Heading(_)
                | ElementKind::Code { .. }
                | ElementKind::Link { .. }
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FormatType {
    Bold,
    Italic,
    Strikethrough,
    Highlight,
    Code,
}

impl FormatType {
    fn bit(self) -> u8 {
        match self {
            FormatType::Bold => 1,
            FormatType::Italic => 1 << 1,
            FormatType::Strikethrough => 1 << 2,
            FormatType::Highlight => 1 << 3,
            FormatType::Code => 1 << 4,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            FormatType::Bold => "bold",
            FormatType::Italic => "italic",
            FormatType::Strikethrough => "strikethrough",
            FormatType::Highlight => "highlight",
            FormatType::Code => "code",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct TextFormat(u8);

impl TextFormat {
    pub const NONE: TextFormat = TextFormat(0);

    pub fn has(self, format: FormatType) -> bool {
        self.0 & format.bit() != 0
    }

    pub fn with(self, format: FormatType) -> Self {
        TextFormat(self.0 | format.bit())
    }

    pub fn without(self, format: FormatType) -> Self {
        TextFormat(self.0 & !format.bit())
    }

    pub fn toggled(self, format: FormatType) -> Self {
        TextFormat(self.0 ^ format.bit())
    }

    pub fn set(self, format: FormatType, enabled: bool) -> Self {
        if enabled {
            self.with(format)
        } else {
            self.without(format)
        }
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

/// CSS-like inline declarations, kept sorted by property name.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TextStyle(BTreeMap<String, String>);

impl TextStyle {
    pub fn parse(css: &str) -> Self {
        let mut properties = BTreeMap::new();
        for declaration in css.split(';') {
            let Some((name, value)) = declaration.split_once(':') else {
                continue;
            };
            let name = name.trim().to_ascii_lowercase();
            let value = value.trim();
            if name.is_empty() || value.is_empty() {
                continue;
            }
            properties.insert(name, value.to_string());
        }
        TextStyle(properties)
    }

    pub fn get(&self, property: &str) -> Option<&str> {
        self.0.get(property).map(String::as_str)
    }

    pub fn set(&mut self, property: &str, value: Option<&str>) {
        match value {
            Some(value) if !value.is_empty() => {
                self.0.insert(property.to_string(), value.to_string());
            }
            _ => {
                self.0.remove(property);
            }
        }
    }

    /// Overlays `other`; its properties win.
    pub fn extend(&mut self, other: &TextStyle) {
        for (name, value) in other.iter() {
            self.0.insert(name.to_string(), value.to_string());
        }
    }

    pub fn retain(&mut self, keep: impl Fn(&str) -> bool) {
        self.0.retain(|name, _| keep(name));
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn to_css(&self) -> String {
        self.0
            .iter()
            .map(|(name, value)| format!("{name}: {value};"))
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn has_highlight(&self) -> bool {
        self.get("color").is_some() || self.get("background-color").is_some()
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TextNode {
    pub text: String,
    pub format: TextFormat,
    pub style: TextStyle,
}

impl TextNode {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            format: TextFormat::NONE,
            style: TextStyle::default(),
        }
    }

    pub fn with_format(mut self, format: TextFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_style(mut self, style: TextStyle) -> Self {
        self.style = style;
        self
    }

    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }

    /// True when both nodes would render identically apart from their text.
    pub fn same_marks(&self, other: &TextNode) -> bool {
        self.format == other.format && self.style == other.style
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum DecoratorNode {
    Attachment(Attachment),
    Upload(PendingUpload),
    Divider,
    Custom(CustomAttachment),
}

impl DecoratorNode {
    pub fn is_inline(&self) -> bool {
        matches!(self, DecoratorNode::Custom(_))
    }

    pub fn text_content(&self) -> String {
        match self {
            DecoratorNode::Attachment(attachment) => {
                let label = attachment
                    .caption
                    .as_deref()
                    .filter(|caption| !caption.is_empty())
                    .unwrap_or(&attachment.file_name);
                format!("[{label}]\n\n")
            }
            DecoratorNode::Upload(upload) => format!("[{}]\n\n", upload.file.name),
            DecoratorNode::Divider => "┄\n\n".to_string(),
            DecoratorNode::Custom(custom) => custom.text_content(),
        }
    }
}

/// A file stored remotely and referenced from the document.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Attachment {
    pub sgid: Option<String>,
    pub src: Option<String>,
    pub previewable: bool,
    pub alt_text: Option<String>,
    pub caption: Option<String>,
    pub content_type: String,
    pub file_name: String,
    pub file_size: Option<u64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl Attachment {
    pub fn is_previewable_image(&self) -> bool {
        is_previewable_image(&self.content_type)
    }
}

pub fn is_previewable_image(content_type: &str) -> bool {
    content_type.starts_with("image/") && !content_type.contains("svg")
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UploadId(pub u64);

/// The local file behind an upload.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UploadFile {
    pub name: String,
    pub content_type: String,
    pub size: u64,
    pub data: Vec<u8>,
}

impl UploadFile {
    pub fn new(name: impl Into<String>, content_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            size: data.len() as u64,
            data,
        }
    }

    pub fn extension(&self) -> String {
        self.name
            .rsplit('.')
            .next()
            .unwrap_or_default()
            .to_lowercase()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UploadStatus {
    Uploading,
    Failed { message: String },
}

#[derive(Clone, Debug, PartialEq)]
pub struct PendingUpload {
    pub id: UploadId,
    pub file: UploadFile,
    pub upload_url: Option<String>,
    pub blob_url_template: String,
    pub progress: u8,
    pub status: UploadStatus,
}

impl PendingUpload {
    pub fn is_previewable(&self) -> bool {
        is_previewable_image(&self.file.content_type)
    }
}

/// Inline attachment carrying arbitrary sanitized markup, as produced by prompts.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CustomAttachment {
    pub sgid: Option<String>,
    pub content_type: String,
    pub inner_markup: String,
}

impl CustomAttachment {
    pub fn text_content(&self) -> String {
        let text = crate::markup::plain_text(&self.inner_markup);
        if text.trim().is_empty() {
            format!("[{}]", self.content_type)
        } else {
            text.trim().to_string()
        }
    }
}
