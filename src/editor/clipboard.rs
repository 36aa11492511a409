//! Paste: URLs become links, plain text is read as Markdown, files upload.

use tracing::warn;
use url::Url;

use super::contents::insert_parsed;
use super::query::is_inside_code;
use super::{Commands, CommandPayload, Editor, EditorCommand, register_handler};
use crate::convert;
use crate::engine::{CommandPriority, UploadFile};
use crate::error::Result;

/// What the host found on the clipboard.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ClipboardData {
    pub text: Option<String>,
    /// Set when the source also offered a URI list next to the text.
    pub uri_list: Option<String>,
    pub html: Option<String>,
    pub files: Vec<UploadFile>,
}

impl ClipboardData {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn html(html: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            html: Some(html.into()),
            ..Self::default()
        }
    }

    pub fn files(files: Vec<UploadFile>) -> Self {
        Self {
            files,
            ..Self::default()
        }
    }

    /// Plain text alone, optionally paired with a URI list.
    pub fn is_plain_text(&self) -> bool {
        self.text.is_some() && self.html.is_none() && self.files.is_empty()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScrollPosition {
    pub top: usize,
    pub left: usize,
}

fn as_url(text: &str) -> Option<&str> {
    let text = text.trim();
    if text.is_empty() || text.contains(char::is_whitespace) {
        return None;
    }
    Url::parse(text).ok().map(|_| text)
}

impl Editor {
    /// Reads `source` as Markdown and inserts it at a range selection.
    pub fn insert_markdown(&mut self, source: &str) -> Result<()> {
        self.update(|tx| {
            if tx.range().is_none() {
                return Ok(());
            }
            let nodes = convert::markdown_to_nodes(tx.tree, source)?;
            insert_parsed(tx, nodes)
        })
    }

    fn paste_url(&mut self, url: &str) -> Result<()> {
        if self.has_selected_text() {
            self.create_link_with_selected_text(url)?;
            return Ok(());
        }
        if let Some(link) = self.create_link(url)? {
            self.notify_link_inserted(link, url)?;
        }
        Ok(())
    }

    fn handle_paste(&mut self, data: &ClipboardData) -> Result<bool> {
        if let Some(text) = data.text.as_deref().filter(|_| data.is_plain_text()) {
            let in_code = self
                .state()
                .range()
                .is_some_and(|range| is_inside_code(self.tree(), range.anchor.key));
            if in_code {
                return Ok(false);
            }
            match as_url(text) {
                Some(url) => self.paste_url(url)?,
                None => self.insert_markdown(text)?,
            }
            return Ok(true);
        }

        if data.files.is_empty() || data.html.is_some() {
            return Ok(false);
        }
        if !self.config.attachments {
            warn!(files = data.files.len(), "this editor does not accept attachments");
            return Ok(false);
        }
        let scroll = self.scroll;
        self.upload_files(data.files.clone())?;
        self.scroll_restore = Some(scroll);
        Ok(true)
    }
}

/// Paste when no handler above claimed it: markup as markup, text line by
/// line.
pub(super) fn paste_natively(editor: &mut Editor, data: &ClipboardData) -> Result<bool> {
    if let Some(html) = &data.html {
        editor.insert_markup(html)?;
        return Ok(true);
    }
    let Some(text) = &data.text else {
        return Ok(false);
    };
    editor.update(|tx| {
        let in_code = tx.anchor_node().is_some_and(|anchor| is_inside_code(tx.tree, anchor));
        for (index, line) in text.split('\n').enumerate() {
            if index > 0 {
                if in_code {
                    tx.insert_line_break()?;
                } else {
                    tx.insert_paragraph()?;
                }
            }
            tx.insert_text(line.trim_end_matches('\r'))?;
        }
        Ok(())
    })?;
    Ok(true)
}

pub(super) fn register(bus: &mut Commands) {
    register_handler(bus, EditorCommand::Paste, CommandPriority::Low, |editor, payload| {
        match payload {
            CommandPayload::Clipboard(data) => editor.handle_paste(data),
            _ => Ok(false),
        }
    });
}
