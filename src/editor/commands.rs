//! The named toolbar commands, their keyboard shortcuts, and drag-and-drop.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use tracing::debug;

use super::query::list_type;
use super::{Commands, CommandPayload, Editor, EditorCommand, register_handler};
use crate::engine::{
    CommandPriority, DecoratorNode, ElementKind, FormatType, HeadingTag, ListType, NodeData,
    UploadFile, UploadId,
};
use crate::error::Result;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ToolbarCommand {
    Bold,
    Italic,
    Strikethrough,
    Link,
    Unlink,
    ToggleHighlight,
    RemoveHighlight,
    RotateHeading,
    InsertUnorderedList,
    InsertOrderedList,
    InsertQuote,
    InsertCode,
    InsertDivider,
    UploadAttachments,
    Undo,
    Redo,
}

impl ToolbarCommand {
    pub const ALL: [ToolbarCommand; 16] = [
        ToolbarCommand::Bold,
        ToolbarCommand::Italic,
        ToolbarCommand::Strikethrough,
        ToolbarCommand::Link,
        ToolbarCommand::Unlink,
        ToolbarCommand::ToggleHighlight,
        ToolbarCommand::RemoveHighlight,
        ToolbarCommand::RotateHeading,
        ToolbarCommand::InsertUnorderedList,
        ToolbarCommand::InsertOrderedList,
        ToolbarCommand::InsertQuote,
        ToolbarCommand::InsertCode,
        ToolbarCommand::InsertDivider,
        ToolbarCommand::UploadAttachments,
        ToolbarCommand::Undo,
        ToolbarCommand::Redo,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ToolbarCommand::Bold => "bold",
            ToolbarCommand::Italic => "italic",
            ToolbarCommand::Strikethrough => "strikethrough",
            ToolbarCommand::Link => "link",
            ToolbarCommand::Unlink => "unlink",
            ToolbarCommand::ToggleHighlight => "toggle-highlight",
            ToolbarCommand::RemoveHighlight => "remove-highlight",
            ToolbarCommand::RotateHeading => "rotate-heading",
            ToolbarCommand::InsertUnorderedList => "insert-unordered-list",
            ToolbarCommand::InsertOrderedList => "insert-ordered-list",
            ToolbarCommand::InsertQuote => "insert-quote",
            ToolbarCommand::InsertCode => "insert-code",
            ToolbarCommand::InsertDivider => "insert-divider",
            ToolbarCommand::UploadAttachments => "upload-attachments",
            ToolbarCommand::Undo => "undo",
            ToolbarCommand::Redo => "redo",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|command| command.name() == name)
    }

    pub fn label(self) -> &'static str {
        match self {
            ToolbarCommand::Bold => "Bold",
            ToolbarCommand::Italic => "Italic",
            ToolbarCommand::Strikethrough => "Strikethrough",
            ToolbarCommand::Link => "Link",
            ToolbarCommand::Unlink => "Remove link",
            ToolbarCommand::ToggleHighlight => "Highlight",
            ToolbarCommand::RemoveHighlight => "Remove highlight",
            ToolbarCommand::RotateHeading => "Heading",
            ToolbarCommand::InsertUnorderedList => "Bullet list",
            ToolbarCommand::InsertOrderedList => "Numbered list",
            ToolbarCommand::InsertQuote => "Quote",
            ToolbarCommand::InsertCode => "Code",
            ToolbarCommand::InsertDivider => "Divider",
            ToolbarCommand::UploadAttachments => "Upload file",
            ToolbarCommand::Undo => "Undo",
            ToolbarCommand::Redo => "Redo",
        }
    }
}

/// Keyboard shortcut for a toolbar command, if `key` is one.
pub fn shortcut(key: &KeyEvent) -> Option<ToolbarCommand> {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    let alt = key.modifiers.contains(KeyModifiers::ALT);
    let shift = key.modifiers.contains(KeyModifiers::SHIFT);
    let KeyCode::Char(ch) = key.code else {
        return None;
    };
    let command = match (ch.to_ascii_lowercase(), ctrl, alt) {
        ('b', true, false) => ToolbarCommand::Bold,
        ('i', true, false) => ToolbarCommand::Italic,
        ('d', true, false) => ToolbarCommand::Strikethrough,
        ('z', true, false) if shift => ToolbarCommand::Redo,
        ('z', true, false) => ToolbarCommand::Undo,
        ('y', true, false) => ToolbarCommand::Redo,
        ('h', false, true) => ToolbarCommand::RotateHeading,
        ('u', false, true) => ToolbarCommand::InsertUnorderedList,
        ('o', false, true) => ToolbarCommand::InsertOrderedList,
        ('q', false, true) => ToolbarCommand::InsertQuote,
        ('c', false, true) => ToolbarCommand::InsertCode,
        ('-', false, true) => ToolbarCommand::InsertDivider,
        ('m', false, true) => ToolbarCommand::RemoveHighlight,
        _ => return None,
    };
    Some(command)
}

/// Nested enter/leave counting for the "drag active" state.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DragState {
    depth: usize,
    active: bool,
}

impl DragState {
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Returns true when this enter switched the state on.
    fn enter(&mut self) -> bool {
        self.depth += 1;
        if self.depth == 1 && !self.active {
            self.active = true;
            return true;
        }
        false
    }

    /// Returns true when this leave switched the state off.
    fn leave(&mut self) -> bool {
        self.depth = self.depth.saturating_sub(1);
        if self.depth == 0 && self.active {
            self.active = false;
            return true;
        }
        false
    }

    fn reset(&mut self) {
        self.depth = 0;
        self.active = false;
    }
}

fn next_heading(current: Option<HeadingTag>) -> Option<HeadingTag> {
    match current {
        Some(HeadingTag::H2) => Some(HeadingTag::H3),
        Some(HeadingTag::H3) => Some(HeadingTag::H4),
        Some(HeadingTag::H4) => None,
        _ => Some(HeadingTag::H2),
    }
}

impl Editor {
    pub fn drag_enter(&mut self) -> bool {
        self.drag.enter()
    }

    pub fn drag_leave(&mut self) -> bool {
        self.drag.leave()
    }

    /// Ends the drag and uploads whatever was dropped.
    pub fn drop_files(&mut self, files: Vec<UploadFile>) -> Result<Vec<UploadId>> {
        self.drag.reset();
        self.upload_files(files)
    }

    fn format(&mut self, format: FormatType) -> Result<bool> {
        self.update(|tx| tx.format_text(format))?;
        Ok(true)
    }

    /// Links the selection, or inserts the URL as a link at a caret.
    fn link(&mut self, url: &str) -> Result<bool> {
        if self.has_selected_text() {
            self.update(|tx| tx.toggle_link(Some(url)))?;
        } else {
            self.create_link(url)?;
        }
        Ok(true)
    }

    fn rotate_heading(&mut self) -> Result<bool> {
        let current = self.state().range().and_then(|range| {
            let top = self.tree().top_level(range.anchor.key)?;
            match self.tree().element_kind(top) {
                Some(ElementKind::Heading(tag)) => Some(*tag),
                _ => None,
            }
        });
        match next_heading(current) {
            Some(tag) => self.insert_node_wrapping_each_selected_line(|| ElementKind::Heading(tag))?,
            None => self.remove_formatting_from_selected_lines()?,
        }
        Ok(true)
    }

    fn toggle_list(&mut self, kind: ListType) -> Result<bool> {
        let anchor = self.state().range().map(|range| range.anchor.key);
        let same_kind = anchor.is_some_and(|anchor| list_type(self.tree(), anchor) == Some(kind));
        if self.is_inside_list() && same_kind {
            self.unwrap_selected_list_items()?;
        } else {
            self.update(|tx| tx.insert_list(kind))?;
        }
        Ok(true)
    }

    fn insert_code(&mut self) -> Result<bool> {
        if self.has_selected_words_in_single_line() {
            return self.format(FormatType::Code);
        }
        self.toggle_node_wrapping_all_selected_lines(ElementKind::is_code, || ElementKind::Code {
            language: Some("plain".to_string()),
        })?;
        Ok(true)
    }

    fn run_toolbar(&mut self, command: ToolbarCommand, payload: &CommandPayload) -> Result<bool> {
        debug!(command = command.name(), "running toolbar command");
        match command {
            ToolbarCommand::Bold => self.format(FormatType::Bold),
            ToolbarCommand::Italic => self.format(FormatType::Italic),
            ToolbarCommand::Strikethrough => self.format(FormatType::Strikethrough),
            ToolbarCommand::Link => match payload {
                CommandPayload::Link(Some(url)) | CommandPayload::Text(url) => self.link(url),
                _ => Ok(false),
            },
            ToolbarCommand::Unlink => {
                self.update(|tx| tx.toggle_link(None))?;
                Ok(true)
            }
            ToolbarCommand::ToggleHighlight => match payload {
                CommandPayload::Highlight(styles) => self.toggle_highlight(styles),
                _ => Ok(false),
            },
            ToolbarCommand::RemoveHighlight => self.remove_highlight(),
            ToolbarCommand::RotateHeading => self.rotate_heading(),
            ToolbarCommand::InsertUnorderedList => self.toggle_list(ListType::Bullet),
            ToolbarCommand::InsertOrderedList => self.toggle_list(ListType::Number),
            ToolbarCommand::InsertQuote => {
                self.toggle_node_wrapping_all_selected_nodes(ElementKind::is_quote, || {
                    ElementKind::Quote
                })?;
                Ok(true)
            }
            ToolbarCommand::InsertCode => self.insert_code(),
            ToolbarCommand::InsertDivider => {
                self.insert_at_cursor_ensuring_line_below(NodeData::Decorator(DecoratorNode::Divider))?;
                Ok(true)
            }
            ToolbarCommand::UploadAttachments => match payload {
                CommandPayload::Files(files) => {
                    self.upload_files(files.clone())?;
                    Ok(true)
                }
                _ => Ok(false),
            },
            ToolbarCommand::Undo => Ok(self.undo()),
            ToolbarCommand::Redo => Ok(self.redo()),
        }
    }
}

fn is_shift_tab(payload: &CommandPayload) -> bool {
    payload.key().is_some_and(|key| {
        key.code == KeyCode::BackTab || key.modifiers.contains(KeyModifiers::SHIFT)
    })
}

pub(super) fn register(bus: &mut Commands) {
    for command in ToolbarCommand::ALL {
        register_handler(
            bus,
            EditorCommand::Toolbar(command),
            CommandPriority::Editor,
            move |editor, payload| editor.run_toolbar(command, payload),
        );
    }

    register_handler(bus, EditorCommand::Tab, CommandPriority::Normal, |editor, payload| {
        if !editor.is_inside_list() {
            return Ok(false);
        }
        if is_shift_tab(payload) {
            editor.update(|tx| tx.outdent_list_items())
        } else {
            editor.update(|tx| tx.indent_list_items())
        }
    });

    register_handler(bus, EditorCommand::Enter, CommandPriority::Normal, |editor, payload| {
        let ctrl = payload
            .key()
            .is_some_and(|key| key.modifiers.contains(KeyModifiers::CONTROL));
        Ok(ctrl || editor.config.single_line)
    });
}
