//! Terminal layout of a document: wrapped, styled lines plus the cell every
//! caret position landed on. [`Layout`] is also the [`CaretSurface`] the
//! editor measures popover placement against.

use std::collections::HashMap;
use std::str::FromStr;

use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
};
use unicode_width::UnicodeWidthChar;

use crate::editor::{CaretSurface, SelectionMarks};
use crate::engine::selection::{block_offset, caret_blocks, is_caret_block};
use crate::engine::{
    DecoratorNode, ElementKind, FormatType, HeadingTag, ListType, NodeData, NodeKey, Point,
    Selection, TextNode, Tree, UploadStatus,
};
use crate::theme::Theme;

const MIN_RULE_WIDTH: usize = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CursorVisualPosition {
    pub line: usize,
    pub column: u16,
}

/// A laid out document.
#[derive(Debug)]
pub struct Layout {
    lines: Vec<Line<'static>>,
    caret_map: Vec<(Point, CursorVisualPosition)>,
    area: Rect,
    scroll_top: usize,
}

impl Layout {
    pub fn build(
        tree: &Tree,
        selection: Option<&Selection>,
        marks: &SelectionMarks,
        width: usize,
        theme: &Theme,
    ) -> Self {
        let mut renderer = Renderer::new(tree, selection, marks, width.max(1), theme);
        renderer.render_root();
        renderer.finish()
    }

    pub fn lines(&self) -> &[Line<'static>] {
        &self.lines
    }

    pub fn total_lines(&self) -> usize {
        self.lines.len()
    }

    pub fn position_of(&self, point: Point) -> Option<CursorVisualPosition> {
        self.caret_map
            .iter()
            .find(|(candidate, _)| *candidate == point)
            .map(|(_, position)| *position)
    }

    /// Where the layout is drawn and how far it is scrolled.
    pub fn set_viewport(&mut self, area: Rect, scroll_top: usize) {
        self.area = area;
        self.scroll_top = scroll_top;
    }

    pub fn scroll_top(&self) -> usize {
        self.scroll_top
    }

    /// Screen cell of `point`, if it is inside the viewport.
    pub fn screen_position(&self, point: Point) -> Option<(u16, u16)> {
        let position = self.position_of(point)?;
        let visible = self.scroll_top..self.scroll_top + self.area.height as usize;
        if !visible.contains(&position.line) || self.area.width == 0 {
            return None;
        }
        let y = self.area.y + (position.line - self.scroll_top) as u16;
        let x = self.area.x + position.column.min(self.area.width - 1);
        Some((x, y))
    }
}

impl CaretSurface for Layout {
    fn caret_rect(&self, caret: Point) -> Option<Rect> {
        let (x, y) = self.screen_position(caret)?;
        Some(Rect::new(x, y, 1, 1))
    }

    // Cells are measured exactly, so a marker finds the same cell.
    fn caret_rect_with_marker(&self, caret: Point) -> Option<Rect> {
        self.caret_rect(caret)
    }

    fn line_height(&self, _caret: Point) -> u16 {
        1
    }

    fn root_origin(&self) -> Rect {
        self.area
    }
}

/// Selection bounds as (caret block index, offset) pairs.
type SelectionBounds = ((usize, usize), (usize, usize));

struct Renderer<'a> {
    tree: &'a Tree,
    marks: &'a SelectionMarks,
    theme: &'a Theme,
    wrap_width: usize,
    block_index: HashMap<NodeKey, usize>,
    selected: Option<SelectionBounds>,
    lines: Vec<Line<'static>>,
    caret_map: Vec<(Point, CursorVisualPosition)>,
}

impl<'a> Renderer<'a> {
    fn new(
        tree: &'a Tree,
        selection: Option<&Selection>,
        marks: &'a SelectionMarks,
        wrap_width: usize,
        theme: &'a Theme,
    ) -> Self {
        let block_index: HashMap<NodeKey, usize> = caret_blocks(tree)
            .into_iter()
            .enumerate()
            .map(|(index, key)| (key, index))
            .collect();
        let selected = selection
            .and_then(Selection::as_range)
            .filter(|range| !range.is_collapsed())
            .and_then(|range| {
                let (start, end) = range.ordered(tree);
                let locate = |point: Point| {
                    let (block, offset) = block_offset(tree, point)?;
                    Some((*block_index.get(&block)?, offset))
                };
                Some((locate(start)?, locate(end)?))
            });
        Self {
            tree,
            marks,
            theme,
            wrap_width,
            block_index,
            selected,
            lines: Vec::new(),
            caret_map: Vec::new(),
        }
    }

    fn render_root(&mut self) {
        let root = self.tree.root();
        let children = self.tree.children(root).to_vec();
        if children.is_empty() {
            self.caret_map.push((
                Point::element(root, 0),
                CursorVisualPosition { line: 0, column: 0 },
            ));
        }
        for (index, child) in children.into_iter().enumerate() {
            if index > 0 {
                self.push_blank_line();
            }
            self.render_block(child, "", "");
        }
    }

    fn render_block(&mut self, key: NodeKey, first_prefix: &str, continuation_prefix: &str) {
        let tree = self.tree;
        match tree.data(key) {
            Some(NodeData::Element(kind)) => match kind {
                ElementKind::Paragraph => {
                    self.render_inline_block(key, first_prefix, continuation_prefix, Style::default())
                }
                ElementKind::Heading(tag) => self.render_heading(key, first_prefix, *tag),
                ElementKind::Code { .. } => self.render_code_block(key, first_prefix),
                ElementKind::Quote => self.render_quote(key, first_prefix),
                ElementKind::List(list_type) => self.render_list(key, first_prefix, *list_type),
                ElementKind::ListItem => {
                    self.render_list_item(key, first_prefix, continuation_prefix)
                }
                ElementKind::Link { .. } => {
                    self.render_inline_block(key, first_prefix, continuation_prefix, Style::default())
                }
            },
            Some(NodeData::Decorator(decorator)) => {
                self.render_decorator_line(key, decorator, first_prefix)
            }
            _ => {}
        }
    }

    fn render_inline_block(
        &mut self,
        block: NodeKey,
        first_prefix: &str,
        continuation_prefix: &str,
        base: Style,
    ) {
        let items = self.collect_block(block, base);
        let lines = wrap_fragments(
            &items,
            first_prefix,
            continuation_prefix,
            self.wrap_width,
            self.theme.gutter_style(),
        );
        self.consume_lines(lines);
    }

    fn render_heading(&mut self, key: NodeKey, prefix: &str, tag: HeadingTag) {
        let bold = Style::default().add_modifier(Modifier::BOLD);
        self.render_inline_block(key, prefix, prefix, bold);

        let underline = match tag {
            HeadingTag::H2 => '=',
            HeadingTag::H3 => '-',
            _ => return,
        };
        let width = self
            .lines
            .last()
            .map(|line| line_width(line).saturating_sub(visible_width(prefix)))
            .unwrap_or(0)
            .max(1);
        let rule = format!("{prefix}{}", underline.to_string().repeat(width));
        self.push_plain_line(&rule, Style::default());
    }

    fn render_code_block(&mut self, key: NodeKey, prefix: &str) {
        let available = self.wrap_width.saturating_sub(visible_width(prefix));
        let fence = format!("{prefix}{}", "-".repeat(available.max(MIN_RULE_WIDTH)));
        let gutter = self.theme.gutter_style();
        self.push_plain_line(&fence, gutter);
        let items = self.collect_block(key, self.theme.code_style());
        let lines = wrap_fragments(&items, prefix, prefix, usize::MAX / 4, gutter);
        self.consume_lines(lines);
        self.push_plain_line(&fence, gutter);
    }

    fn render_quote(&mut self, key: NodeKey, prefix: &str) {
        let quote_prefix = format!("{prefix}│ ");
        if is_caret_block(self.tree, key) {
            self.render_inline_block(key, &quote_prefix, &quote_prefix, Style::default());
            return;
        }
        let children = self.tree.children(key).to_vec();
        for (index, child) in children.into_iter().enumerate() {
            if index > 0 {
                self.lines.push(Line::from(Span::styled(
                    quote_prefix.trim_end().to_string(),
                    self.theme.gutter_style(),
                )));
            }
            self.render_block(child, &quote_prefix, &quote_prefix);
        }
    }

    fn render_list(&mut self, key: NodeKey, prefix: &str, list_type: ListType) {
        let items = self.tree.children(key).to_vec();
        let mut number = 0;
        for item in items {
            let wrapper = self.is_wrapper_item(item);
            if !wrapper {
                number += 1;
            }
            let marker = match list_type {
                ListType::Bullet => "• ".to_string(),
                ListType::Number => format!("{number}. "),
            };
            let first_prefix = format!("{prefix}{marker}");
            let continuation_prefix = format!("{prefix}{}", " ".repeat(visible_width(&marker)));
            if wrapper {
                self.render_list_item(item, &continuation_prefix, &continuation_prefix);
            } else {
                self.render_list_item(item, &first_prefix, &continuation_prefix);
            }
        }
    }

    /// Items that only hold a nested list, as left behind by indenting.
    fn is_wrapper_item(&self, item: NodeKey) -> bool {
        let children = self.tree.children(item);
        !children.is_empty()
            && children
                .iter()
                .all(|child| self.tree.is_kind(*child, ElementKind::is_list))
    }

    fn render_list_item(&mut self, item: NodeKey, first_prefix: &str, continuation_prefix: &str) {
        if !self.is_wrapper_item(item) {
            self.render_inline_block(item, first_prefix, continuation_prefix, Style::default());
        }
        let nested: Vec<NodeKey> = self
            .tree
            .children(item)
            .iter()
            .copied()
            .filter(|child| self.tree.data(*child).is_some_and(|data| !data.is_inline()))
            .collect();
        for child in nested {
            self.render_block(child, continuation_prefix, continuation_prefix);
        }
    }

    fn render_decorator_line(&mut self, key: NodeKey, decorator: &DecoratorNode, prefix: &str) {
        let (label, mut style) = match decorator {
            DecoratorNode::Divider => {
                let available = self.wrap_width.saturating_sub(visible_width(prefix));
                ("─".repeat(available.max(MIN_RULE_WIDTH)), self.theme.gutter_style())
            }
            DecoratorNode::Attachment(attachment) => {
                let name = attachment
                    .caption
                    .as_deref()
                    .filter(|caption| !caption.is_empty())
                    .unwrap_or(&attachment.file_name);
                let label = match (attachment.previewable, attachment.width, attachment.height) {
                    (true, Some(width), Some(height)) => format!("[image: {name} {width}x{height}]"),
                    (true, _, _) => format!("[image: {name}]"),
                    _ => format!("[file: {name}]"),
                };
                (label, self.theme.attachment_style())
            }
            DecoratorNode::Upload(upload) => match &upload.status {
                UploadStatus::Uploading => (
                    format!("[uploading {} {}%]", upload.file.name, upload.progress),
                    self.theme.attachment_style(),
                ),
                UploadStatus::Failed { message } => {
                    (format!("[{message}]"), self.theme.error_style())
                }
            },
            DecoratorNode::Custom(custom) => (custom.text_content(), self.theme.attachment_style()),
        };
        if self.marks.contains(key) || self.decorator_in_range(key) {
            style = style.patch(self.theme.node_mark_style());
        }

        let line = self.lines.len();
        let start = visible_width(prefix) as u16;
        if let (Some(parent), Some(index)) = (self.tree.parent(key), self.tree.index_in_parent(key)) {
            let end = start + visible_width(&label) as u16;
            self.caret_map
                .push((Point::element(parent, index + 1), CursorVisualPosition { line, column: end }));
            self.caret_map
                .push((Point::element(parent, index), CursorVisualPosition { line, column: start }));
        }
        self.lines.push(Line::from(vec![
            Span::styled(prefix.to_string(), self.theme.gutter_style()),
            Span::styled(label, style),
        ]));
    }

    fn decorator_in_range(&self, key: NodeKey) -> bool {
        let Some(((start_block, _), (end_block, _))) = self.selected else {
            return false;
        };
        // Block decorators sit between caret blocks.
        let after = self
            .tree
            .document_order()
            .into_iter()
            .skip_while(|candidate| *candidate != key)
            .find_map(|candidate| self.block_index.get(&candidate).copied());
        after.is_some_and(|block| block > start_block && block <= end_block)
    }

    fn collect_block(&self, block: NodeKey, base: Style) -> Vec<FragmentItem> {
        let mut collector = InlineCollector::default();
        let mut position = 0;
        let index = self.block_index.get(&block).copied();
        self.collect_inline(block, base, index, &mut position, &mut collector);
        collector.finish()
    }

    fn collect_inline(
        &self,
        parent: NodeKey,
        base: Style,
        block: Option<usize>,
        position: &mut usize,
        collector: &mut InlineCollector,
    ) {
        let children = self.tree.children(parent);
        for (index, child) in children.iter().enumerate() {
            let Some(data) = self.tree.data(*child) else {
                continue;
            };
            if !data.is_inline() {
                continue;
            }
            collector.caret(Point::element(parent, index));
            match data {
                NodeData::Text(text) => {
                    let style = self.text_style(text, base);
                    for (offset, ch) in text.text.chars().enumerate() {
                        collector.caret(Point::text(*child, offset));
                        let style = self.selected_style(style, block, *position);
                        collector.push_char(ch, style);
                        *position += 1;
                    }
                    collector.caret(Point::text(*child, text.char_len()));
                }
                NodeData::LineBreak => {
                    collector.line_break();
                    *position += 1;
                }
                NodeData::Element(ElementKind::Link { .. }) => {
                    let style = base.patch(self.theme.link_style());
                    self.collect_inline(*child, style, block, position, collector);
                }
                NodeData::Decorator(decorator) => {
                    let mut style = base.patch(self.theme.attachment_style());
                    if self.marks.contains(*child) {
                        style = style.patch(self.theme.node_mark_style());
                    }
                    let style = self.selected_style(style, block, *position);
                    collector.push_atom(&decorator.text_content(), style);
                    *position += 1;
                }
                _ => {}
            }
        }
        collector.caret(Point::element(parent, children.len()));
    }

    fn text_style(&self, text: &TextNode, base: Style) -> Style {
        let mut style = base;
        if text.format.has(FormatType::Bold) {
            style = style.add_modifier(Modifier::BOLD);
        }
        if text.format.has(FormatType::Italic) {
            style = style.add_modifier(Modifier::ITALIC);
        }
        if text.format.has(FormatType::Strikethrough) {
            style = style.add_modifier(Modifier::CROSSED_OUT);
        }
        if text.format.has(FormatType::Code) {
            style = style.patch(self.theme.code_style());
        }
        if text.format.has(FormatType::Highlight) || text.style.has_highlight() {
            let color = text.style.get("color").and_then(parse_color);
            let background = text.style.get("background-color").and_then(parse_color);
            style = style.patch(self.theme.highlight_style(color, background));
        }
        style
    }

    fn selected_style(&self, style: Style, block: Option<usize>, position: usize) -> Style {
        let (Some((start, end)), Some(block)) = (self.selected, block) else {
            return style;
        };
        if (block, position) >= start && (block, position) < end {
            style.patch(self.theme.selection_style())
        } else {
            style
        }
    }

    fn push_blank_line(&mut self) {
        self.lines.push(Line::from(""));
    }

    fn push_plain_line(&mut self, content: &str, style: Style) {
        self.lines
            .push(Line::from(vec![Span::styled(content.to_string(), style)]));
    }

    fn consume_lines(&mut self, outputs: Vec<LineOutput>) {
        for output in outputs {
            let spans: Vec<Span<'static>> = output
                .spans
                .into_iter()
                .map(|segment| Span::styled(segment.text, segment.style))
                .collect();
            let line = self.lines.len();
            for event in output.events {
                self.caret_map.push((
                    event.point,
                    CursorVisualPosition {
                        line,
                        column: event.column,
                    },
                ));
            }
            self.lines.push(Line::from(spans));
        }
    }

    fn finish(mut self) -> Layout {
        if self.lines.is_empty() {
            self.lines.push(Line::from(""));
        }
        Layout {
            lines: self.lines,
            caret_map: self.caret_map,
            area: Rect::default(),
            scroll_top: 0,
        }
    }
}

fn parse_color(value: &str) -> Option<Color> {
    Color::from_str(value.trim()).ok()
}

#[derive(Clone)]
struct LineSegment {
    text: String,
    style: Style,
}

struct LineOutput {
    spans: Vec<LineSegment>,
    events: Vec<LocatedEvent>,
}

#[derive(Clone, Copy)]
struct LocatedEvent {
    column: u16,
    point: Point,
}

#[derive(Clone)]
struct Fragment {
    text: String,
    style: Style,
    kind: FragmentKind,
    width: usize,
    events: Vec<TextEvent>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum FragmentKind {
    Word,
    Whitespace,
}

#[derive(Clone)]
enum FragmentItem {
    Token(Fragment),
    LineBreak,
}

#[derive(Clone, Copy)]
struct TextEvent {
    offset: usize,
    point: Point,
}

/// Splits inline content into words and whitespace, carrying caret points
/// along so they can be located after wrapping.
#[derive(Default)]
struct InlineCollector {
    items: Vec<FragmentItem>,
    current: Option<TokenBuilder>,
    pending: Vec<Point>,
}

impl InlineCollector {
    fn caret(&mut self, point: Point) {
        self.pending.push(point);
    }

    fn push_char(&mut self, ch: char, style: Style) {
        match ch {
            '\r' => {}
            '\n' => self.line_break(),
            '\t' => {
                for _ in 0..4 {
                    self.push_visible(' ', style);
                }
            }
            ch => self.push_visible(ch, style),
        }
    }

    fn push_visible(&mut self, ch: char, style: Style) {
        let kind = if ch.is_whitespace() {
            FragmentKind::Whitespace
        } else {
            FragmentKind::Word
        };
        let continues = self
            .current
            .as_ref()
            .is_some_and(|token| token.kind == kind && token.style == style);
        if !continues {
            self.flush();
            self.current = Some(TokenBuilder::new(style, kind));
        }
        if let Some(token) = self.current.as_mut() {
            token.add_events(&mut self.pending);
            token.push_char(ch);
        }
    }

    /// An unbreakable token, such as an inline attachment.
    fn push_atom(&mut self, text: &str, style: Style) {
        self.flush();
        let mut token = TokenBuilder::new(style, FragmentKind::Word);
        token.add_events(&mut self.pending);
        for ch in text.chars().filter(|ch| !ch.is_control()) {
            token.push_char(ch);
        }
        self.items.push(FragmentItem::Token(token.finish()));
    }

    fn line_break(&mut self) {
        self.close_line();
        self.items.push(FragmentItem::LineBreak);
    }

    /// Ends the current token. Pending carets wait for the next one.
    fn flush(&mut self) {
        if let Some(token) = self.current.take() {
            self.items.push(FragmentItem::Token(token.finish()));
        }
    }

    /// Pending carets stay on the line being closed.
    fn close_line(&mut self) {
        let mut token = self
            .current
            .take()
            .unwrap_or_else(|| TokenBuilder::new(Style::default(), FragmentKind::Word));
        token.add_events(&mut self.pending);
        if !token.text.is_empty() || !token.events.is_empty() {
            self.items.push(FragmentItem::Token(token.finish()));
        }
    }

    fn finish(mut self) -> Vec<FragmentItem> {
        self.close_line();
        self.items
    }
}

struct TokenBuilder {
    text: String,
    style: Style,
    kind: FragmentKind,
    width: usize,
    events: Vec<TextEvent>,
}

impl TokenBuilder {
    fn new(style: Style, kind: FragmentKind) -> Self {
        Self {
            text: String::new(),
            style,
            kind,
            width: 0,
            events: Vec::new(),
        }
    }

    fn add_events(&mut self, pending: &mut Vec<Point>) {
        for point in pending.drain(..) {
            self.events.push(TextEvent {
                offset: self.width,
                point,
            });
        }
    }

    fn push_char(&mut self, ch: char) {
        self.text.push(ch);
        self.width += UnicodeWidthChar::width(ch).unwrap_or(0);
    }

    fn finish(self) -> Fragment {
        Fragment {
            text: self.text,
            style: self.style,
            kind: self.kind,
            width: self.width,
            events: self.events,
        }
    }
}

fn wrap_fragments(
    fragments: &[FragmentItem],
    first_prefix: &str,
    continuation_prefix: &str,
    width: usize,
    prefix_style: Style,
) -> Vec<LineOutput> {
    let mut outputs = Vec::new();
    let mut builder = LineBuilder::new(first_prefix, prefix_style);
    let mut pending_whitespace: Vec<Fragment> = Vec::new();

    for fragment in fragments {
        match fragment {
            FragmentItem::LineBreak => {
                builder.consume_pending(&mut pending_whitespace);
                outputs.push(builder.build_line());
                builder = LineBuilder::new(continuation_prefix, prefix_style);
            }
            FragmentItem::Token(token) => match token.kind {
                FragmentKind::Whitespace => pending_whitespace.push(token.clone()),
                FragmentKind::Word => {
                    let whitespace_width: usize =
                        pending_whitespace.iter().map(|item| item.width).sum();
                    if builder.width > builder.prefix_width
                        && builder.width + whitespace_width + token.width > width
                    {
                        builder.consume_pending(&mut pending_whitespace);
                        outputs.push(builder.build_line());
                        builder = LineBuilder::new(continuation_prefix, prefix_style);
                    }
                    builder.consume_pending(&mut pending_whitespace);
                    builder.append_token(token.clone());
                }
            },
        }
    }

    builder.consume_pending(&mut pending_whitespace);
    outputs.push(builder.build_line());
    outputs
}

struct LineBuilder {
    segments: Vec<LineSegment>,
    events: Vec<LocatedEvent>,
    width: usize,
    prefix_width: usize,
}

impl LineBuilder {
    fn new(prefix: &str, prefix_style: Style) -> Self {
        let prefix_width = visible_width(prefix);
        let mut segments = Vec::new();
        if !prefix.is_empty() {
            segments.push(LineSegment {
                text: prefix.to_string(),
                style: prefix_style,
            });
        }
        Self {
            segments,
            events: Vec::new(),
            width: prefix_width,
            prefix_width,
        }
    }

    fn consume_pending(&mut self, pending_whitespace: &mut Vec<Fragment>) {
        for fragment in pending_whitespace.drain(..) {
            self.append_token(fragment);
        }
    }

    fn append_token(&mut self, fragment: Fragment) {
        let start = self.width;
        if !fragment.text.is_empty() {
            self.segments.push(LineSegment {
                text: fragment.text,
                style: fragment.style,
            });
            self.width += fragment.width;
        }
        for event in fragment.events {
            self.events.push(LocatedEvent {
                column: (start + event.offset) as u16,
                point: event.point,
            });
        }
    }

    fn build_line(mut self) -> LineOutput {
        if self.segments.is_empty() {
            self.segments.push(LineSegment {
                text: String::new(),
                style: Style::default(),
            });
        }
        self.events.sort_by_key(|event| event.column);
        LineOutput {
            spans: self.segments,
            events: self.events,
        }
    }
}

fn visible_width(text: &str) -> usize {
    text.chars()
        .map(|ch| UnicodeWidthChar::width(ch).unwrap_or(0))
        .sum()
}

fn line_width(line: &Line<'_>) -> usize {
    line.spans
        .iter()
        .map(|span| visible_width(span.content.as_ref()))
        .sum()
}
