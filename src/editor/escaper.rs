//! Enter on an empty line inside a quote leaves the quote (or the list in
//! it), splitting the container when content follows.

use tracing::debug;

use super::query::{is_inside_quote, is_node_empty, nearest_list_item, nearest_paragraph};
use super::{Commands, Editor, EditorCommand, register_handler};
use crate::engine::{CommandPriority, ElementKind, NodeData, NodeKey, Transaction, Tree};
use crate::error::Result;

fn is_list_item(tree: &Tree, key: NodeKey) -> bool {
    tree.is_kind(key, |kind| matches!(kind, ElementKind::ListItem))
}

fn non_empty_siblings_after(tree: &Tree, key: NodeKey) -> Vec<NodeKey> {
    tree.next_siblings(key)
        .into_iter()
        .filter(|sibling| !is_node_empty(tree, *sibling))
        .collect()
}

fn remove_trailing_empty_children(tx: &mut Transaction<'_>, parent: NodeKey) -> Result<()> {
    while let Some(last) = tx.tree.last_child(parent) {
        if !is_node_empty(tx.tree, last) {
            break;
        }
        tx.tree.remove(last)?;
    }
    Ok(())
}

fn insert_paragraph_after(tx: &mut Transaction<'_>, target: NodeKey) -> Result<NodeKey> {
    let paragraph = tx.tree.create_paragraph();
    tx.tree.insert_after(target, paragraph)?;
    Ok(paragraph)
}

/// The list item to escape from: an empty item, or an item whose empty
/// paragraph holds the caret.
fn list_item_to_escape(tree: &Tree, anchor: NodeKey) -> Option<NodeKey> {
    if let Some(item) = nearest_list_item(tree, anchor)
        && is_node_empty(tree, item)
    {
        return Some(item);
    }
    let paragraph = nearest_paragraph(tree, anchor).filter(|p| is_node_empty(tree, *p))?;
    tree.parent(paragraph).filter(|parent| is_list_item(tree, *parent))
}

/// An empty paragraph sitting directly in a quote.
fn paragraph_to_escape(tree: &Tree, anchor: NodeKey) -> Option<NodeKey> {
    let paragraph = nearest_paragraph(tree, anchor).filter(|p| is_node_empty(tree, *p))?;
    let parent = tree.parent(paragraph)?;
    tree.is_kind(parent, ElementKind::is_quote).then_some(paragraph)
}

fn escape_from_list(tx: &mut Transaction<'_>, item: NodeKey) -> Result<()> {
    let Some(list) = tx.tree.parent(item).filter(|list| tx.tree.is_kind(*list, ElementKind::is_list))
    else {
        return Ok(());
    };
    let quote = tx
        .tree
        .parent(list)
        .filter(|parent| tx.tree.is_kind(*parent, ElementKind::is_quote));
    if let Some(quote) = quote {
        let items_after = non_empty_siblings_after(tx.tree, item);
        if !items_after.is_empty() {
            return split_quote_with_list(tx, quote, list, item, &items_after);
        }
    }
    let paragraph = insert_paragraph_after(tx, list)?;
    tx.tree.remove(item)?;
    if tx.tree.child_count(list) == 0 {
        tx.tree.remove(list)?;
    }
    tx.select_start(paragraph);
    debug!(%item, "escaped from list");
    Ok(())
}

fn split_quote_with_list(
    tx: &mut Transaction<'_>,
    quote: NodeKey,
    list: NodeKey,
    empty_item: NodeKey,
    items_after: &[NodeKey],
) -> Result<()> {
    let quote_siblings_after = non_empty_siblings_after(tx.tree, list);
    let Some(list_kind) = tx.tree.element_kind(list).cloned() else {
        return Ok(());
    };

    let middle = insert_paragraph_after(tx, quote)?;
    let new_quote = tx.tree.create(NodeData::Element(ElementKind::Quote));
    tx.tree.insert_after(middle, new_quote)?;
    let new_list = tx.tree.create(NodeData::Element(list_kind));
    tx.tree.append(new_quote, new_list)?;
    tx.tree.append_all(new_list, items_after)?;
    tx.tree.append_all(new_quote, &quote_siblings_after)?;
    tx.tree.remove(empty_item)?;

    remove_trailing_empty_children(tx, list)?;
    remove_trailing_empty_children(tx, new_quote)?;
    if tx.tree.child_count(list) == 0 {
        tx.tree.remove(list)?;
        if tx.tree.child_count(quote) == 0 {
            tx.tree.remove(quote)?;
        }
    } else {
        remove_trailing_empty_children(tx, quote)?;
    }
    tx.select_start(middle);
    debug!(moved = items_after.len(), "split quote around list");
    Ok(())
}

fn escape_from_quote(tx: &mut Transaction<'_>, paragraph: NodeKey) -> Result<()> {
    let Some(quote) = tx.tree.parent(paragraph) else {
        return Ok(());
    };
    let siblings_after = non_empty_siblings_after(tx.tree, paragraph);
    let new_paragraph = insert_paragraph_after(tx, quote)?;
    if siblings_after.is_empty() {
        tx.tree.remove(paragraph)?;
        if tx.tree.child_count(quote) == 0 {
            tx.tree.remove(quote)?;
        }
    } else {
        let new_quote = tx.tree.create(NodeData::Element(ElementKind::Quote));
        tx.tree.insert_after(new_paragraph, new_quote)?;
        tx.tree.append_all(new_quote, &siblings_after)?;
        tx.tree.remove(paragraph)?;
        remove_trailing_empty_children(tx, quote)?;
        remove_trailing_empty_children(tx, new_quote)?;
    }
    tx.select_start(new_paragraph);
    debug!(split = !siblings_after.is_empty(), "escaped from quote");
    Ok(())
}

impl Editor {
    /// Enter inside a quote. Returns whether an escape happened; anything
    /// else is left to the regular Enter handling.
    pub fn escape_on_enter(&mut self) -> Result<bool> {
        let Some(anchor) = self.state().range().map(|range| range.anchor.key) else {
            return Ok(false);
        };
        let tree = self.tree();
        if !is_inside_quote(tree, anchor) {
            return Ok(false);
        }
        if let Some(item) = list_item_to_escape(tree, anchor) {
            self.update(|tx| escape_from_list(tx, item))?;
            return Ok(true);
        }
        if let Some(paragraph) = paragraph_to_escape(tree, anchor) {
            self.update(|tx| escape_from_quote(tx, paragraph))?;
            return Ok(true);
        }
        Ok(false)
    }
}

pub(super) fn register(bus: &mut Commands) {
    register_handler(bus, EditorCommand::Enter, CommandPriority::High, |editor, _| {
        editor.escape_on_enter()
    });
}
