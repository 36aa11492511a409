//! The editing surface: engine, selection marks, command routing and the
//! collaborators hanging off them. Every change goes through
//! [`Editor::update`], which commits through the engine and re-syncs the
//! selection marks afterwards.

use std::rc::Rc;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::config::EditorConfig;
use crate::engine::native::CaretMove;
use crate::engine::{
    CommandBus, CommandPriority, EditorState, Engine, NodeKey, Registration, Selection,
    Transaction, Tree, UpdateTag, UploadFile,
};
use crate::error::Result;
use crate::markup;

mod clipboard;
mod commands;
mod contents;
mod escaper;
mod highlight;
pub mod query;
mod selection;
mod upload;

pub use clipboard::{ClipboardData, ScrollPosition};
pub use commands::{DragState, ToolbarCommand};
pub use contents::AttachmentOptions;
pub use highlight::HighlightStyles;
pub use selection::{CaretSurface, CursorPosition, MarkDiff, SelectionMarks};
pub use upload::{UploadEvent, UploadRequest, UploadTransport, UploadedBlob};

/// A command handler. Returning `Ok(true)` stops lower-priority handlers.
pub type CommandHandler = Rc<dyn Fn(&mut Editor, &CommandPayload) -> Result<bool>>;

/// Everything the command bus routes. Keys that nobody above the engine
/// cares about (Home, End, word jumps) bypass the bus.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EditorCommand {
    MoveLeft,
    MoveRight,
    MoveUp,
    MoveDown,
    DeleteBackward,
    DeleteForward,
    Enter,
    Tab,
    Space,
    Escape,
    InsertText,
    Paste,
    Toolbar(ToolbarCommand),
}

#[derive(Clone, Debug, Default)]
pub enum CommandPayload {
    #[default]
    None,
    Key(KeyEvent),
    Text(String),
    Clipboard(ClipboardData),
    Link(Option<String>),
    Highlight(HighlightStyles),
    Files(Vec<UploadFile>),
}

impl CommandPayload {
    pub fn key(&self) -> Option<&KeyEvent> {
        match self {
            CommandPayload::Key(key) => Some(key),
            _ => None,
        }
    }

    fn modifiers(&self) -> KeyModifiers {
        self.key().map(|key| key.modifiers).unwrap_or(KeyModifiers::NONE)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileDecision {
    Accept,
    Reject,
}

#[derive(Clone, Debug, PartialEq)]
enum LinkRequest {
    Replace(String, AttachmentOptions),
    InsertBelow(String, AttachmentOptions),
}

/// Raised after a pasted URL became a link. Listeners queue follow-up
/// edits; the editor applies them once the listener returns.
#[derive(Debug)]
pub struct LinkInsertion {
    pub key: NodeKey,
    pub url: String,
    requests: Vec<LinkRequest>,
}

impl LinkInsertion {
    fn new(key: NodeKey, url: String) -> Self {
        Self {
            key,
            url,
            requests: Vec::new(),
        }
    }

    pub fn replace_link_with(&mut self, markup: impl Into<String>, options: AttachmentOptions) {
        self.requests.push(LinkRequest::Replace(markup.into(), options));
    }

    pub fn insert_below_link(&mut self, markup: impl Into<String>, options: AttachmentOptions) {
        self.requests.push(LinkRequest::InsertBelow(markup.into(), options));
    }
}

/// Hooks for whoever hosts the editor.
pub trait EditorListener {
    /// Called before a dropped, pasted or picked file starts uploading.
    fn file_accept(&mut self, _file: &UploadFile) -> FileDecision {
        FileDecision::Accept
    }

    fn link_inserted(&mut self, _insertion: &mut LinkInsertion) {}
}

pub struct Editor {
    engine: Engine,
    config: EditorConfig,
    marks: SelectionMarks,
    commands: Commands,
    listener: Option<Box<dyn EditorListener>>,
    transport: Option<Box<dyn UploadTransport>>,
    upload_events: mpsc::UnboundedSender<UploadEvent>,
    upload_inbox: mpsc::UnboundedReceiver<UploadEvent>,
    next_upload: u64,
    drag: DragState,
    scroll: ScrollPosition,
    scroll_restore: Option<ScrollPosition>,
}

impl Editor {
    pub fn new(config: EditorConfig) -> Self {
        Self::with_state(config, EditorState::default())
    }

    pub fn with_state(config: EditorConfig, state: EditorState) -> Self {
        let mut engine = Engine::new(EditorState::default(), config.history_limit);
        engine.register_text_transform(highlight::sync_highlight_with_style);
        engine.set_state(state);
        let (upload_events, upload_inbox) = mpsc::unbounded_channel();
        let mut editor = Self {
            engine,
            config,
            marks: SelectionMarks::default(),
            commands: CommandBus::new(),
            listener: None,
            transport: None,
            upload_events,
            upload_inbox,
            next_upload: 1,
            drag: DragState::default(),
            scroll: ScrollPosition::default(),
            scroll_restore: None,
        };
        register_native_handlers(&mut editor.commands);
        selection::register(&mut editor.commands);
        escaper::register(&mut editor.commands);
        clipboard::register(&mut editor.commands);
        commands::register(&mut editor.commands);
        editor
    }

    /// Loads sanitized markup. An empty string yields one empty paragraph.
    pub fn from_markup(config: EditorConfig, source: &str) -> Result<Self> {
        let tree = markup::parse_document(source)?;
        let mut editor = Self::with_state(config, EditorState::new(tree));
        editor.place_cursor_at_the_end()?;
        Ok(editor)
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn state(&self) -> &EditorState {
        self.engine.state()
    }

    pub fn tree(&self) -> &Tree {
        &self.engine.state().tree
    }

    pub fn selection(&self) -> Option<&Selection> {
        self.engine.state().selection.as_ref()
    }

    pub fn version(&self) -> u64 {
        self.engine.version()
    }

    pub fn marks(&self) -> &SelectionMarks {
        &self.marks
    }

    pub fn can_undo(&self) -> bool {
        self.engine.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.engine.can_redo()
    }

    pub fn read<T>(&self, f: impl FnOnce(&EditorState) -> T) -> T {
        self.engine.read(f)
    }

    pub fn update<T>(&mut self, f: impl FnOnce(&mut Transaction<'_>) -> Result<T>) -> Result<T> {
        self.update_tagged(UpdateTag::Default, f)
    }

    pub fn update_tagged<T>(
        &mut self,
        tag: UpdateTag,
        f: impl FnOnce(&mut Transaction<'_>) -> Result<T>,
    ) -> Result<T> {
        let value = self.engine.update_tagged(tag, f)?;
        self.sync_selected_marks();
        Ok(value)
    }

    pub fn undo(&mut self) -> bool {
        let undone = self.engine.undo();
        self.sync_selected_marks();
        undone
    }

    pub fn redo(&mut self) -> bool {
        let redone = self.engine.redo();
        self.sync_selected_marks();
        redone
    }

    /// Markup of the whole document.
    pub fn value(&self) -> String {
        markup::to_markup(self.tree())
    }

    /// Replaces the document with parsed markup and drops undo history.
    pub fn set_value(&mut self, source: &str) -> Result<()> {
        let tree = markup::parse_document(source)?;
        self.engine.set_state(EditorState::new(tree));
        self.place_cursor_at_the_end()
    }

    pub fn set_listener(&mut self, listener: Box<dyn EditorListener>) {
        self.listener = Some(listener);
    }

    pub fn set_upload_transport(&mut self, transport: Box<dyn UploadTransport>) {
        self.transport = Some(transport);
    }

    pub fn register_command(
        &mut self,
        command: EditorCommand,
        priority: CommandPriority,
        handler: CommandHandler,
    ) -> Registration {
        self.commands.register(command, priority, handler)
    }

    pub fn unregister_command(&mut self, registration: Registration) -> bool {
        self.commands.unregister(registration)
    }

    /// Runs the handlers for `command` from the highest tier down until one
    /// reports the command as handled.
    pub fn dispatch(&mut self, command: EditorCommand, payload: CommandPayload) -> Result<bool> {
        let handlers = self.commands.handlers(command);
        trace!(?command, handlers = handlers.len(), "dispatching command");
        let mut handled = false;
        for handler in handlers {
            if handler(self, &payload)? {
                handled = true;
                break;
            }
        }
        self.sync_selected_marks();
        Ok(handled)
    }

    pub fn run(&mut self, command: ToolbarCommand) -> Result<bool> {
        self.dispatch(EditorCommand::Toolbar(command), CommandPayload::None)
    }

    pub fn run_with(&mut self, command: ToolbarCommand, payload: CommandPayload) -> Result<bool> {
        self.dispatch(EditorCommand::Toolbar(command), payload)
    }

    pub fn paste(&mut self, data: ClipboardData) -> Result<bool> {
        self.dispatch(EditorCommand::Paste, CommandPayload::Clipboard(data))
    }

    /// Routes a key press: shortcuts first, then bus commands, then the
    /// few keys the engine handles directly.
    pub fn handle_key(&mut self, key: KeyEvent) -> Result<bool> {
        if let Some(command) = commands::shortcut(&key) {
            return self.run(command);
        }
        let shift = key.modifiers.contains(KeyModifiers::SHIFT);
        let command = match key.code {
            KeyCode::Left => EditorCommand::MoveLeft,
            KeyCode::Right => EditorCommand::MoveRight,
            KeyCode::Up => EditorCommand::MoveUp,
            KeyCode::Down => EditorCommand::MoveDown,
            KeyCode::Backspace => EditorCommand::DeleteBackward,
            KeyCode::Delete => EditorCommand::DeleteForward,
            KeyCode::Enter => EditorCommand::Enter,
            KeyCode::Tab | KeyCode::BackTab => EditorCommand::Tab,
            KeyCode::Esc => EditorCommand::Escape,
            KeyCode::Home => return self.move_caret(CaretMove::LineStart, shift),
            KeyCode::End => return self.move_caret(CaretMove::LineEnd, shift),
            KeyCode::Char(' ') if query::is_printable_character(&key) => EditorCommand::Space,
            KeyCode::Char(ch) if query::is_printable_character(&key) => {
                return self.dispatch(EditorCommand::InsertText, CommandPayload::Text(ch.to_string()));
            }
            _ => return Ok(false),
        };
        self.dispatch(command, CommandPayload::Key(key))
    }

    pub fn move_caret(&mut self, movement: CaretMove, extend: bool) -> Result<bool> {
        self.update(|tx| Ok(tx.move_caret(movement, extend)))
    }

    pub fn insert_text(&mut self, text: &str) -> Result<bool> {
        self.dispatch(EditorCommand::InsertText, CommandPayload::Text(text.to_string()))
    }

    pub fn drag_state(&self) -> &DragState {
        &self.drag
    }

    /// Scroll offset the host reports so that pastes can restore it.
    pub fn set_scroll_position(&mut self, scroll: ScrollPosition) {
        self.scroll = scroll;
    }

    /// Scroll offset the host should jump back to, once.
    pub fn take_scroll_restore(&mut self) -> Option<ScrollPosition> {
        self.scroll_restore.take()
    }

    /// Re-derives the selected-node marks from the committed selection.
    pub fn sync_selected_marks(&mut self) -> MarkDiff {
        let diff = self.marks.sync(self.engine.state().selection.as_ref());
        if !diff.is_empty() {
            debug!(added = diff.added.len(), removed = diff.removed.len(), "synced node marks");
        }
        diff
    }

    fn notify_file_accept(&mut self, file: &UploadFile) -> FileDecision {
        match self.listener.as_mut() {
            Some(listener) => listener.file_accept(file),
            None => FileDecision::Accept,
        }
    }

    fn notify_link_inserted(&mut self, key: NodeKey, url: &str) -> Result<()> {
        let Some(listener) = self.listener.as_mut() else {
            return Ok(());
        };
        let mut insertion = LinkInsertion::new(key, url.to_string());
        listener.link_inserted(&mut insertion);
        for request in insertion.requests {
            match request {
                LinkRequest::Replace(markup, options) => {
                    self.replace_node_with_markup(key, &markup, options)?;
                }
                LinkRequest::InsertBelow(markup, options) => {
                    self.insert_markup_below_node(key, &markup, options)?;
                }
            }
        }
        Ok(())
    }
}

type Commands = CommandBus<EditorCommand, CommandHandler>;

fn register_handler(
    bus: &mut Commands,
    command: EditorCommand,
    priority: CommandPriority,
    handler: impl Fn(&mut Editor, &CommandPayload) -> Result<bool> + 'static,
) -> Registration {
    bus.register(command, priority, Rc::new(handler))
}

fn native(
    bus: &mut Commands,
    command: EditorCommand,
    handler: impl Fn(&mut Editor, &CommandPayload) -> Result<bool> + 'static,
) {
    register_handler(bus, command, CommandPriority::Editor, handler);
}

fn native_move(
    editor: &mut Editor,
    payload: &CommandPayload,
    plain: CaretMove,
    by_word: CaretMove,
) -> Result<bool> {
    let modifiers = payload.modifiers();
    let word = modifiers.intersects(KeyModifiers::CONTROL | KeyModifiers::ALT);
    let movement = if word { by_word } else { plain };
    editor.move_caret(movement, modifiers.contains(KeyModifiers::SHIFT))
}

/// What the engine does when nobody above it claims a command.
fn register_native_handlers(bus: &mut Commands) {
    native(bus, EditorCommand::MoveLeft, |editor, payload| {
        native_move(editor, payload, CaretMove::Left, CaretMove::WordLeft)
    });
    native(bus, EditorCommand::MoveRight, |editor, payload| {
        native_move(editor, payload, CaretMove::Right, CaretMove::WordRight)
    });
    native(bus, EditorCommand::MoveUp, |editor, payload| {
        native_move(editor, payload, CaretMove::Up, CaretMove::Up)
    });
    native(bus, EditorCommand::MoveDown, |editor, payload| {
        native_move(editor, payload, CaretMove::Down, CaretMove::Down)
    });
    native(bus, EditorCommand::DeleteBackward, |editor, payload| {
        if payload.modifiers().intersects(KeyModifiers::CONTROL | KeyModifiers::ALT) {
            editor.update(|tx| tx.delete_word_backward())
        } else {
            editor.update(|tx| tx.delete_backward())
        }
    });
    native(bus, EditorCommand::DeleteForward, |editor, payload| {
        if payload.modifiers().intersects(KeyModifiers::CONTROL | KeyModifiers::ALT) {
            editor.update(|tx| tx.delete_word_forward())
        } else {
            editor.update(|tx| tx.delete_forward())
        }
    });
    native(bus, EditorCommand::Enter, |editor, payload| {
        if payload.modifiers().contains(KeyModifiers::SHIFT) {
            editor.update(|tx| tx.insert_line_break())?;
        } else {
            editor.update(|tx| tx.insert_paragraph())?;
        }
        Ok(true)
    });
    native(bus, EditorCommand::Space, |editor, _| {
        editor.update(|tx| tx.insert_text(" "))?;
        Ok(true)
    });
    native(bus, EditorCommand::InsertText, |editor, payload| {
        let CommandPayload::Text(text) = payload else {
            return Ok(false);
        };
        editor.update(|tx| tx.insert_text(text))?;
        Ok(true)
    });
    native(bus, EditorCommand::Paste, |editor, payload| {
        let CommandPayload::Clipboard(data) = payload else {
            return Ok(false);
        };
        clipboard::paste_natively(editor, data)
    });
}


#[cfg(test)]
#[path = "editor/query_tests.rs"]
mod query_tests;

#[cfg(test)]
#[path = "editor/selection_tests.rs"]
mod selection_tests;


#[cfg(test)]
#[path = "editor/escaper_tests.rs"]
mod escaper_tests;


#[cfg(test)]
#[path = "editor/clipboard_tests.rs"]
mod clipboard_tests;

#[cfg(test)]
#[path = "editor/upload_tests.rs"]
mod upload_tests;
