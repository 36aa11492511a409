//! Text and background color over the selected text.

use super::Editor;
use crate::engine::native::selected_text_nodes;
use crate::engine::{FormatType, NodeData, TextNode};
use crate::error::Result;

const COLOR: &str = "color";
const BACKGROUND_COLOR: &str = "background-color";

/// Colors to toggle. `None` leaves a property alone.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HighlightStyles {
    pub color: Option<String>,
    pub background_color: Option<String>,
}

impl HighlightStyles {
    pub fn color(color: impl Into<String>) -> Self {
        Self {
            color: Some(color.into()),
            background_color: None,
        }
    }

    pub fn background(color: impl Into<String>) -> Self {
        Self {
            color: None,
            background_color: Some(color.into()),
        }
    }
}

/// Commit-time transform: the highlight format follows the highlight styles.
pub(super) fn sync_highlight_with_style(text: &mut TextNode) {
    let highlighted = text.style.has_highlight();
    text.format = text.format.set(FormatType::Highlight, highlighted);
}

impl Editor {
    /// Value of `property` shared by every selected text node, or an empty
    /// string when they disagree or none has it.
    pub fn selection_style_value(&self, property: &str) -> String {
        let Some(range) = self.state().range() else {
            return String::new();
        };
        let tree = self.tree();
        let mut values = selected_text_nodes(tree, range).into_iter().map(|key| {
            match tree.data(key) {
                Some(NodeData::Text(text)) => text.style.get(property).unwrap_or_default(),
                _ => "",
            }
        });
        let Some(first) = values.next() else {
            return String::new();
        };
        if values.all(|value| value == first) {
            first.to_string()
        } else {
            String::new()
        }
    }

    /// Sets each given color, or clears it where the selection already has
    /// exactly that color.
    pub fn toggle_highlight(&mut self, styles: &HighlightStyles) -> Result<bool> {
        if !self.has_selected_text() {
            return Ok(false);
        }
        let mut patch: Vec<(&str, Option<String>)> = Vec::new();
        for (property, value) in [(COLOR, &styles.color), (BACKGROUND_COLOR, &styles.background_color)] {
            let Some(value) = value else {
                continue;
            };
            let current = self.selection_style_value(property);
            let next = (current != *value).then(|| value.clone());
            patch.push((property, next));
        }
        if patch.is_empty() {
            return Ok(false);
        }
        self.update(|tx| {
            let patch: Vec<(&str, Option<&str>)> = patch
                .iter()
                .map(|(property, value)| (*property, value.as_deref()))
                .collect();
            tx.patch_style_text(&patch)
        })?;
        Ok(true)
    }

    pub fn remove_highlight(&mut self) -> Result<bool> {
        if !self.has_selected_text() {
            return Ok(false);
        }
        self.update(|tx| tx.patch_style_text(&[(COLOR, None), (BACKGROUND_COLOR, None)]))?;
        Ok(true)
    }
}
