//! Structural edits the toolbar and collaborators ask for: wrapping lines
//! into blocks and back, list unwrapping, links, trigger replacement and
//! node replacement from markup.

use tracing::debug;

use super::Editor;
use super::query::nearest_list_item;
use crate::engine::text::{char_len, last_index_before, slice_chars};
use crate::engine::{
    CustomAttachment, DecoratorNode, ElementKind, NodeData, NodeKey, Point, RangeSelection,
    Selection, TextNode, Transaction, Tree,
};
use crate::error::Result;
use crate::markup;

/// How markup handed to [`Editor::replace_node_with_markup`] and
/// [`Editor::insert_markup_below_node`] is inserted.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AttachmentOptions {
    /// Insert the markup as one custom attachment instead of parsing it.
    pub attachment: bool,
    pub sgid: Option<String>,
}

impl AttachmentOptions {
    pub fn attachment(sgid: impl Into<String>) -> Self {
        Self {
            attachment: true,
            sgid: Some(sgid.into()),
        }
    }
}

const HTML_CONTENT_TYPE: &str = "text/html";

/// Parses `source`. In an inline context, leading paragraphs are unpacked
/// so their content can sit inside a line.
pub(super) fn parse_markup(tree: &mut Tree, source: &str, inline: bool) -> Result<Vec<NodeKey>> {
    let nodes = markup::parse_fragment(tree, source)?;
    if !inline {
        return Ok(nodes);
    }
    let mut flattened = Vec::new();
    for node in nodes {
        if tree.is_paragraph(node) {
            if !flattened.is_empty() {
                flattened.push(tree.create(NodeData::LineBreak));
            }
            flattened.extend(tree.children(node).iter().copied());
        } else {
            flattened.push(node);
        }
    }
    Ok(flattened)
}

fn attachment_node(tree: &mut Tree, source: &str, options: &AttachmentOptions) -> NodeKey {
    tree.create(NodeData::Decorator(DecoratorNode::Custom(CustomAttachment {
        sgid: options.sgid.clone(),
        content_type: HTML_CONTENT_TYPE.to_string(),
        inner_markup: source.to_string(),
    })))
}

/// Inserts freshly parsed nodes at the caret. A leading paragraph merges
/// into the current line; everything else lands behind it.
pub(super) fn insert_parsed(tx: &mut Transaction<'_>, mut nodes: Vec<NodeKey>) -> Result<()> {
    if nodes.first().is_some_and(|first| tx.tree.is_paragraph(*first)) {
        let first = nodes.remove(0);
        let inline = tx.tree.children(first).to_vec();
        tx.insert_nodes(&inline)?;
    }
    tx.insert_nodes(&nodes)
}

/// Range, node selection or document end, in that order.
pub(super) fn insert_at_cursor(tx: &mut Transaction<'_>, node: NodeKey) -> Result<()> {
    match tx.selection.clone() {
        Some(Selection::Range(_)) => tx.insert_nodes(&[node]),
        Some(Selection::Node(nodes)) => tx.tree.insert_after(nodes.last(), node),
        None => {
            let root = tx.tree.root();
            tx.tree.append(root, node)
        }
    }
}

fn ensure_line_below(tx: &mut Transaction<'_>, node: NodeKey) -> Result<()> {
    let is_block = tx.tree.data(node).is_some_and(|data| !data.is_inline());
    if is_block && tx.tree.next_sibling(node).is_none() {
        let paragraph = tx.tree.create_paragraph();
        tx.tree.insert_after(node, paragraph)?;
        tx.select_start(paragraph);
    }
    Ok(())
}

fn wrap_children(tx: &mut Transaction<'_>, target: NodeKey, kind: ElementKind) -> Result<NodeKey> {
    let wrapper = tx.tree.create(NodeData::Element(kind));
    tx.tree.move_children(target, wrapper)?;
    tx.tree.replace(target, wrapper)?;
    tx.remap_element(target, wrapper);
    Ok(wrapper)
}

/// Lifts the children of `element` into its place.
fn unwrap(tx: &mut Transaction<'_>, element: NodeKey) -> Result<()> {
    let children = tx.tree.children(element).to_vec();
    for child in &children {
        tx.tree.insert_before(element, *child)?;
    }
    let points_inside = tx.range().is_some_and(|range| {
        range.anchor.key == element || range.focus.key == element
    });
    tx.tree.remove(element)?;
    if points_inside && let Some(first) = children.first() {
        tx.select_start(*first);
    }
    Ok(())
}

fn unique_top_levels(tree: &Tree, nodes: &[NodeKey]) -> Vec<NodeKey> {
    let mut tops = Vec::new();
    for node in nodes {
        if let Some(top) = tree.top_level(*node)
            && !tops.contains(&top)
        {
            tops.push(top);
        }
    }
    tops
}

fn is_empty_paragraph(tree: &Tree, key: NodeKey) -> bool {
    tree.is_paragraph(key)
        && tree.text_content(key).trim().is_empty()
        && tree.children(key).iter().all(|child| tree.is_line_break(*child))
}

fn remove_standalone_empty_paragraph(tx: &mut Transaction<'_>) -> Result<()> {
    let root = tx.tree.root();
    let children = tx.tree.children(root);
    if children.len() == 1 && is_empty_paragraph(tx.tree, children[0]) {
        let paragraph = children[0];
        tx.tree.remove(paragraph)?;
        tx.set_caret(Point::element(root, 0));
    }
    Ok(())
}

fn remove_formatting(tx: &mut Transaction<'_>, top: NodeKey) -> Result<()> {
    let inline = tx.tree.element_kind(top).is_some_and(ElementKind::holds_inline_content);
    if inline {
        wrap_children(tx, top, ElementKind::Paragraph)?;
        Ok(())
    } else {
        unwrap(tx, top)
    }
}

fn wrap_current_line(tx: &mut Transaction<'_>, top: NodeKey, kind: ElementKind) -> Result<()> {
    if !tx.tree.text_content(top).is_empty() {
        wrap_children(tx, top, kind)?;
        return Ok(());
    }
    let wrapper = tx.tree.create(NodeData::Element(kind));
    tx.insert_nodes(&[wrapper])
}

/// Merges the selected paragraphs into one wrapper, one line each.
/// Identical lines collapse into one.
fn wrap_multiple_selected_lines(
    tx: &mut Transaction<'_>,
    range: &RangeSelection,
    kind: ElementKind,
) -> Result<()> {
    let mut paragraphs: Vec<NodeKey> = Vec::new();
    for node in range.nodes(tx.tree) {
        let paragraph = if tx.tree.is_paragraph(node) {
            Some(node)
        } else if tx.tree.is_text(node) {
            tx.tree.parent(node).filter(|parent| tx.tree.is_paragraph(*parent))
        } else {
            None
        };
        if let Some(paragraph) = paragraph
            && !paragraphs.contains(&paragraph)
        {
            paragraphs.push(paragraph);
        }
    }

    let mut lines: Vec<String> = Vec::new();
    for paragraph in &paragraphs {
        for line in tx.tree.text_content(*paragraph).split('\n') {
            if !line.trim().is_empty() && !lines.iter().any(|seen| seen == line) {
                lines.push(line.to_string());
            }
        }
    }
    let Some(first) = paragraphs.first().copied() else {
        return Ok(());
    };
    if lines.is_empty() {
        return Ok(());
    }

    tx.set_selection(None);
    let wrapper = tx.tree.create(NodeData::Element(kind));
    for (index, line) in lines.iter().enumerate() {
        if index > 0 {
            let line_break = tx.tree.create(NodeData::LineBreak);
            tx.tree.append(wrapper, line_break)?;
        }
        let text = tx.tree.create_text(line.as_str());
        tx.tree.append(wrapper, text)?;
    }
    tx.tree.replace(first, wrapper)?;
    for paragraph in paragraphs.into_iter().skip(1) {
        if tx.tree.is_attached(paragraph) {
            tx.tree.remove(paragraph)?;
        }
    }
    tx.select_end(wrapper);
    debug!(lines = lines.len(), "wrapped selected lines");
    Ok(())
}

/// Keeps a trailing empty line beneath a replacement so the caret can
/// still reach it.
fn append_line_break_if_needed(tx: &mut Transaction<'_>, paragraph: NodeKey) -> Result<()> {
    if !tx.tree.is_paragraph(paragraph) {
        return Ok(());
    }
    let children = tx.tree.children(paragraph);
    let [.., before_last, last] = children else {
        return Ok(());
    };
    let (before_last, last) = (*before_last, *last);
    if tx.tree.text(last) == Some("") && !tx.tree.is_text(before_last) {
        let line_break = tx.tree.create(NodeData::LineBreak);
        tx.tree.append(paragraph, line_break)?;
    }
    Ok(())
}

fn paragraph_with_text(tree: &mut Tree, text: Option<&str>) -> Result<NodeKey> {
    let paragraph = tree.create_paragraph();
    if let Some(text) = text.filter(|text| !text.is_empty()) {
        let node = tree.create_text(text);
        tree.append(paragraph, node)?;
    }
    Ok(paragraph)
}

impl Editor {
    /// Parses `source` and inserts it at a range selection.
    pub fn insert_markup(&mut self, source: &str) -> Result<()> {
        self.update(|tx| {
            if tx.range().is_none() {
                return Ok(());
            }
            let nodes = markup::parse_fragment(tx.tree, source)?;
            insert_parsed(tx, nodes)
        })
    }

    pub fn insert_at_cursor(&mut self, data: NodeData) -> Result<NodeKey> {
        self.update(|tx| {
            let node = tx.tree.create(data);
            insert_at_cursor(tx, node)?;
            Ok(node)
        })
    }

    /// Inserts a node and makes sure an empty paragraph follows a block
    /// that would otherwise end the document.
    pub fn insert_at_cursor_ensuring_line_below(&mut self, data: NodeData) -> Result<NodeKey> {
        self.update(|tx| {
            let node = tx.tree.create(data);
            insert_at_cursor(tx, node)?;
            ensure_line_below(tx, node)?;
            Ok(node)
        })
    }

    /// Gives every selected top-level line a fresh wrapper of `kind`.
    pub fn insert_node_wrapping_each_selected_line(
        &mut self,
        kind: impl Fn() -> ElementKind,
    ) -> Result<()> {
        self.update(|tx| {
            let nodes = match tx.selection.as_ref() {
                Some(selection) => selection.nodes(tx.tree),
                None => return Ok(()),
            };
            for top in unique_top_levels(tx.tree, &nodes) {
                let wraps_inline = tx
                    .tree
                    .element_kind(top)
                    .is_some_and(ElementKind::holds_inline_content);
                if wraps_inline {
                    wrap_children(tx, top, kind())?;
                }
            }
            Ok(())
        })
    }

    /// Turns the anchor's top-level block back into a plain paragraph.
    pub fn remove_formatting_from_selected_lines(&mut self) -> Result<()> {
        self.update(|tx| {
            let Some(top) = tx.anchor_node().and_then(|key| tx.tree.top_level(key)) else {
                return Ok(());
            };
            remove_formatting(tx, top)
        })
    }

    /// Line-oriented wrappers such as code blocks: unwraps when the anchor
    /// already sits in one, otherwise wraps the current or selected lines.
    pub fn toggle_node_wrapping_all_selected_lines(
        &mut self,
        is_applied: impl Fn(&ElementKind) -> bool,
        kind: impl Fn() -> ElementKind,
    ) -> Result<()> {
        self.update(|tx| {
            let Some(range) = tx.range().cloned() else {
                return Ok(());
            };
            let Some(top) = tx.tree.top_level(range.anchor.key) else {
                return Ok(());
            };
            if tx.tree.is_kind(top, &is_applied) {
                remove_formatting(tx, top)
            } else if range.is_collapsed() {
                wrap_current_line(tx, top, kind())
            } else {
                wrap_multiple_selected_lines(tx, &range, kind())
            }
        })
    }

    /// Node-oriented wrappers such as quotes: moves every selected
    /// top-level node into one wrapper, or lifts them back out.
    pub fn toggle_node_wrapping_all_selected_nodes(
        &mut self,
        is_applied: impl Fn(&ElementKind) -> bool,
        kind: impl Fn() -> ElementKind,
    ) -> Result<()> {
        self.update(|tx| {
            let (anchor, nodes) = match tx.selection.as_ref() {
                Some(Selection::Range(range)) => (range.anchor.key, range.nodes(tx.tree)),
                Some(Selection::Node(nodes)) => (nodes.first(), nodes.keys().to_vec()),
                None => return Ok(()),
            };
            if let Some(top) = tx.tree.top_level(anchor)
                && tx.tree.is_kind(top, &is_applied)
            {
                debug!(%top, "unwrapping selected nodes");
                return unwrap(tx, top);
            }

            let mut tops = unique_top_levels(tx.tree, &nodes);
            while tops.last().is_some_and(|last| is_empty_paragraph(tx.tree, *last)) {
                tops.pop();
            }
            let wrapper = tx.tree.create(NodeData::Element(kind()));
            let Some(first) = tops.first().copied() else {
                remove_standalone_empty_paragraph(tx)?;
                return insert_at_cursor(tx, wrapper);
            };
            tx.tree.insert_before(first, wrapper)?;
            tx.tree.append_all(wrapper, &tops)?;
            debug!(wrapped = tops.len(), "wrapped selected nodes");
            Ok(())
        })
    }

    pub fn has_selected_text(&self) -> bool {
        self.state().range().is_some_and(|range| !range.is_collapsed())
    }

    /// Converts every selected list item into a paragraph. Nested lists
    /// follow their paragraph; emptied lists disappear.
    pub fn unwrap_selected_list_items(&mut self) -> Result<bool> {
        self.update(|tx| {
            let Some(range) = tx.range().cloned() else {
                return Ok(false);
            };
            let mut items: Vec<NodeKey> = Vec::new();
            let mut nodes = range.nodes(tx.tree);
            nodes.push(range.anchor.key);
            for node in nodes {
                if let Some(item) = nearest_list_item(tx.tree, node)
                    && !items.contains(&item)
                {
                    items.push(item);
                }
            }
            if items.is_empty() {
                return Ok(false);
            }

            let mut paragraphs = Vec::new();
            for item in items {
                if tx.tree.is_attached(item) {
                    paragraphs.push(tx.list_item_to_paragraph(item)?);
                }
            }
            match paragraphs.as_slice() {
                [] => {}
                [only] => tx.select_end(*only),
                [first, .., last] => {
                    let focus = Point::element(*last, tx.tree.child_count(*last));
                    let range = RangeSelection::new(Point::element(*first, 0), focus);
                    tx.set_selection(Some(Selection::Range(range)));
                }
            }
            Ok(true)
        })
    }

    /// Inserts a link showing its own URL at a range selection.
    pub fn create_link(&mut self, url: &str) -> Result<Option<NodeKey>> {
        self.update(|tx| {
            if tx.range().is_none() {
                return Ok(None);
            }
            let text = tx.tree.create_text(url);
            let link = tx.tree.create_with_children(
                NodeData::Element(ElementKind::Link {
                    url: url.to_string(),
                }),
                &[text],
            )?;
            tx.insert_nodes(&[link])?;
            Ok(Some(link))
        })
    }

    pub fn create_link_with_selected_text(&mut self, url: &str) -> Result<bool> {
        if !self.has_selected_text() {
            return Ok(false);
        }
        self.update(|tx| tx.toggle_link(Some(url)))?;
        Ok(true)
    }

    /// Text between the last `trigger` before a collapsed caret and the
    /// caret, or an empty string.
    pub fn text_back_until(&self, trigger: &str) -> String {
        let Some(caret) = self.state().collapsed_anchor() else {
            return String::new();
        };
        let Some(text) = self.tree().text(caret.key) else {
            return String::new();
        };
        match last_index_before(text, caret.offset, trigger) {
            Some(index) => slice_chars(text, index + char_len(trigger), caret.offset).to_string(),
            None => String::new(),
        }
    }

    pub fn contains_text_back_until(&self, trigger: &str) -> bool {
        let Some(caret) = self.state().collapsed_anchor() else {
            return false;
        };
        self.tree()
            .text(caret.key)
            .is_some_and(|text| last_index_before(text, caret.offset, trigger).is_some())
    }

    /// Swaps everything from the last `needle` up to the caret for the nodes
    /// `build` creates. The rest of the line (or a single space) follows
    /// them and receives the caret.
    pub fn replace_text_back_until(
        &mut self,
        needle: &str,
        build: impl FnOnce(&mut Tree) -> Result<Vec<NodeKey>>,
    ) -> Result<bool> {
        let single_line = self.config.single_line;
        self.update(|tx| {
            let Some(caret) = tx.collapsed_caret() else {
                return Ok(false);
            };
            let Some(NodeData::Text(anchor)) = tx.tree.data(caret.key).cloned() else {
                return Ok(false);
            };
            let Some(index) = last_index_before(&anchor.text, caret.offset, needle) else {
                return Ok(false);
            };
            let before = slice_chars(&anchor.text, 0, index).to_string();
            let rest = slice_chars(&anchor.text, caret.offset, anchor.char_len()).to_string();
            let remainder_empty = rest.is_empty();

            if let Some(NodeData::Text(node)) = tx.tree.data_mut(caret.key) {
                node.text = before;
            }
            let mut previous = caret.key;
            for node in build(tx.tree)? {
                tx.tree.insert_after(previous, node)?;
                previous = node;
            }
            let tail = TextNode {
                text: if remainder_empty { " ".to_string() } else { rest },
                ..anchor
            };
            let tail = tx.tree.create(NodeData::Text(tail));
            tx.tree.insert_after(previous, tail)?;

            if !single_line && let Some(parent) = tx.tree.parent(tail) {
                append_line_break_if_needed(tx, parent)?;
            }
            tx.set_caret(Point::text(tail, if remainder_empty { 1 } else { 0 }));
            Ok(true)
        })
    }

    /// [`Editor::replace_text_back_until`] with parsed inline markup.
    pub fn replace_text_back_until_with_markup(&mut self, needle: &str, source: &str) -> Result<bool> {
        self.replace_text_back_until(needle, |tree| parse_markup(tree, source, true))
    }

    pub fn create_paragraph_after_node(&mut self, node: NodeKey, text: Option<&str>) -> Result<NodeKey> {
        self.update(|tx| {
            let paragraph = paragraph_with_text(tx.tree, text)?;
            tx.tree.insert_after(node, paragraph)?;
            tx.select_end(paragraph);
            Ok(paragraph)
        })
    }

    pub fn create_paragraph_before_node(&mut self, node: NodeKey, text: Option<&str>) -> Result<NodeKey> {
        self.update(|tx| {
            let paragraph = paragraph_with_text(tx.tree, text)?;
            tx.tree.insert_before(node, paragraph)?;
            tx.select_end(paragraph);
            Ok(paragraph)
        })
    }

    /// Puts parsed markup (or a custom attachment holding it) where `key`
    /// was. A selection touching `key` moves to the end of the replacement.
    pub fn replace_node_with_markup(
        &mut self,
        key: NodeKey,
        source: &str,
        options: AttachmentOptions,
    ) -> Result<bool> {
        self.update(|tx| {
            if !tx.tree.is_attached(key) {
                return Ok(false);
            }
            let was_selected = tx.range().is_some_and(|range| {
                range
                    .nodes(tx.tree)
                    .iter()
                    .any(|node| *node == key || tx.tree.parent(*node) == Some(key))
            });
            if was_selected {
                tx.set_selection(None);
            }
            let inline = tx.tree.data(key).is_some_and(NodeData::is_inline);
            let replacement = if options.attachment {
                vec![attachment_node(tx.tree, source, &options)]
            } else {
                parse_markup(tx.tree, source, inline)?
            };
            let replacement = match replacement.as_slice() {
                [] => vec![tx.tree.create_paragraph()],
                _ => replacement,
            };
            tx.tree.replace(key, replacement[0])?;
            for pair in replacement.windows(2) {
                tx.tree.insert_after(pair[0], pair[1])?;
            }
            if was_selected && let Some(last) = replacement.last() {
                tx.caret_after(*last);
            }
            Ok(true)
        })
    }

    /// Inserts parsed markup (or a custom attachment) after the top-level
    /// block holding `key`.
    pub fn insert_markup_below_node(
        &mut self,
        key: NodeKey,
        source: &str,
        options: AttachmentOptions,
    ) -> Result<bool> {
        self.update(|tx| {
            if !tx.tree.is_attached(key) {
                return Ok(false);
            }
            let target = tx.tree.top_level(key).unwrap_or(key);
            let nodes = if options.attachment {
                let attachment = attachment_node(tx.tree, source, &options);
                let paragraph = tx.tree.create_paragraph();
                tx.tree.append(paragraph, attachment)?;
                vec![paragraph]
            } else {
                parse_markup(tx.tree, source, false)?
            };
            let mut previous = target;
            for node in nodes {
                tx.tree.insert_after(previous, node)?;
                previous = node;
            }
            Ok(true)
        })
    }
}
