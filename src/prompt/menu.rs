//! The completion popover: opens when its trigger is typed, refilters as the
//! search grows, and swaps the trigger text for the chosen item.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::{debug, trace};

use super::source::PromptSource;
use super::{ListItem, PromptItem};
use crate::editor::{CaretSurface, CommandHandler, CommandPayload, Editor, EditorCommand};
use crate::engine::text::slice_chars;
use crate::engine::{CommandPriority, CustomAttachment, DecoratorNode, NodeData, Registration};
use crate::error::Result;

pub const NOTHING_FOUND: &str = "Nothing found";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PromptConfig {
    pub trigger: String,
    /// Used in the content type of inserted attachments.
    pub name: String,
    /// Insert the item's markup as text instead of a custom attachment.
    pub insert_editable_text: bool,
    /// Space keeps typing into the search instead of choosing.
    pub supports_space_in_searches: bool,
    pub empty_results: String,
    /// Distance from the surface origin to the editable area.
    pub vertical_offset: i32,
}

impl PromptConfig {
    pub fn new(trigger: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            trigger: trigger.into(),
            name: name.into(),
            insert_editable_text: false,
            supports_space_in_searches: false,
            empty_results: NOTHING_FOUND.to_string(),
            vertical_offset: 0,
        }
    }

    pub fn with_editable_text(mut self, editable: bool) -> Self {
        self.insert_editable_text = editable;
        self
    }

    pub fn with_spaces_in_searches(mut self, spaces: bool) -> Self {
        self.supports_space_in_searches = spaces;
        self
    }

    pub fn with_empty_results(mut self, message: impl Into<String>) -> Self {
        self.empty_results = message.into();
        self
    }

    pub fn with_vertical_offset(mut self, offset: i32) -> Self {
        self.vertical_offset = offset;
        self
    }

    fn content_type(&self) -> String {
        format!("application/vnd.actiontext.{}", self.name)
    }
}

/// Where the popover goes, relative to the editable area.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Placement {
    pub x: i32,
    pub y: i32,
    /// Flipped above the caret line.
    pub above: bool,
}

#[derive(Debug, Default)]
struct MenuState {
    open: bool,
    items: Vec<ListItem>,
    selected: Option<usize>,
    anchored_x: Option<i32>,
    clipped: bool,
    seen_version: Option<u64>,
}

impl MenuState {
    fn open(&mut self) {
        self.open = true;
        self.items.clear();
        self.selected = None;
        self.anchored_x = None;
        self.clipped = false;
    }

    fn close(&mut self) {
        self.open = false;
        self.items.clear();
        self.selected = None;
    }

    fn show(&mut self, items: Vec<ListItem>) {
        self.selected = if items.is_empty() { None } else { Some(0) };
        self.items = items;
    }

    fn move_selection(&mut self, down: bool) {
        let Some(current) = self.selected else {
            return;
        };
        if down && current + 1 < self.items.len() {
            self.selected = Some(current + 1);
        } else if !down && current > 0 {
            self.selected = Some(current - 1);
        }
    }
}

/// A popover bound to one trigger and one source. Call
/// [`PromptMenu::after_update`] after every editor change.
pub struct PromptMenu<S> {
    config: Rc<PromptConfig>,
    source: Rc<S>,
    state: Rc<RefCell<MenuState>>,
    registrations: RefCell<Vec<Registration>>,
}

fn handler(f: impl Fn(&mut Editor, &CommandPayload) -> Result<bool> + 'static) -> CommandHandler {
    Rc::new(f)
}

/// Trigger character right before the caret, at the start of the text or
/// after a space or newline.
fn trigger_typed(editor: &Editor, trigger: &str) -> bool {
    let Some((key, offset)) = editor.selected_node_with_offset() else {
        return false;
    };
    let Some(text) = editor.tree().text(key) else {
        return false;
    };
    if offset == 0 || slice_chars(text, offset - 1, offset) != trigger {
        return false;
    }
    offset == 1 || matches!(slice_chars(text, offset - 2, offset - 1), " " | "\n")
}

impl<S: PromptSource + 'static> PromptMenu<S> {
    pub fn new(config: PromptConfig, source: S) -> Self {
        Self {
            config: Rc::new(config),
            source: Rc::new(source),
            state: Rc::new(RefCell::new(MenuState::default())),
            registrations: RefCell::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &PromptConfig {
        &self.config
    }

    pub fn is_open(&self) -> bool {
        self.state.borrow().open
    }

    pub fn items(&self) -> Vec<ListItem> {
        self.state.borrow().items.clone()
    }

    pub fn selected_index(&self) -> Option<usize> {
        self.state.borrow().selected
    }

    /// Placeholder text while the menu is open without results.
    pub fn empty_message(&self) -> Option<&str> {
        let state = self.state.borrow();
        (state.open && state.items.is_empty()).then_some(self.config.empty_results.as_str())
    }

    pub fn close(&self) {
        self.state.borrow_mut().close();
    }

    /// Hooks the menu keys into the editor at High priority. They only act
    /// while the menu is open.
    pub fn attach(&self, editor: &mut Editor) {
        let mut registrations = self.registrations.borrow_mut();
        let mut choosing = vec![EditorCommand::Enter, EditorCommand::Tab];
        if !self.config.supports_space_in_searches {
            choosing.push(EditorCommand::Space);
        }
        for command in choosing {
            let (state, source, config) = (self.state.clone(), self.source.clone(), self.config.clone());
            registrations.push(editor.register_command(
                command,
                CommandPriority::High,
                handler(move |editor, _| choose(editor, &state, source.as_ref(), &config)),
            ));
        }
        for (command, down) in [(EditorCommand::MoveUp, false), (EditorCommand::MoveDown, true)] {
            let state = self.state.clone();
            registrations.push(editor.register_command(
                command,
                CommandPriority::High,
                handler(move |_, _| {
                    let mut state = state.borrow_mut();
                    if !state.open {
                        return Ok(false);
                    }
                    state.move_selection(down);
                    Ok(true)
                }),
            ));
        }
        let state = self.state.clone();
        registrations.push(editor.register_command(
            EditorCommand::Escape,
            CommandPriority::High,
            handler(move |_, _| {
                let mut state = state.borrow_mut();
                if !state.open {
                    return Ok(false);
                }
                state.close();
                Ok(true)
            }),
        ));
    }

    pub fn detach(&self, editor: &mut Editor) {
        for registration in self.registrations.borrow_mut().drain(..) {
            editor.unregister_command(registration);
        }
        self.close();
    }

    /// Opens on a freshly typed trigger, closes when the caret leaves the
    /// search, and refilters otherwise.
    pub async fn after_update(&self, editor: &Editor) -> Result<()> {
        let trigger = self.config.trigger.as_str();
        {
            let mut state = self.state.borrow_mut();
            if state.seen_version == Some(editor.version()) {
                return Ok(());
            }
            state.seen_version = Some(editor.version());
            if !state.open {
                if !trigger_typed(editor, trigger) {
                    return Ok(());
                }
                debug!(trigger, "prompt opened");
                state.open();
            } else if !editor.contains_text_back_until(trigger) {
                trace!(trigger, "caret left the prompt search");
                state.close();
                return Ok(());
            }
        }

        let filter = editor.text_back_until(trigger);
        let Some(items) = self.source.build_list_items(&filter).await? else {
            return Ok(());
        };
        let mut state = self.state.borrow_mut();
        if state.open {
            trace!(filter, items = items.len(), "prompt filtered");
            state.show(items);
        }
        Ok(())
    }

    /// Anchors the popover below the caret, or above it once it would run
    /// past `viewport_height`. The column is fixed when the menu opens.
    pub fn place(
        &self,
        editor: &Editor,
        surface: &dyn CaretSurface,
        menu_height: u16,
        viewport_height: u16,
    ) -> Option<Placement> {
        let mut state = self.state.borrow_mut();
        if !state.open {
            return None;
        }
        let position = editor.cursor_position(surface)?;
        let x = *state.anchored_x.get_or_insert(position.x);
        let below = position.y + self.config.vertical_offset;
        if below + i32::from(menu_height) > i32::from(viewport_height) {
            state.clipped = true;
        }
        let y = if state.clipped {
            below - i32::from(menu_height) - i32::from(position.font_size)
        } else {
            below
        };
        Some(Placement {
            x,
            y,
            above: state.clipped,
        })
    }
}

fn choose<S: PromptSource>(
    editor: &mut Editor,
    state: &RefCell<MenuState>,
    source: &S,
    config: &PromptConfig,
) -> Result<bool> {
    let row = {
        let mut state = state.borrow_mut();
        if !state.open {
            return Ok(false);
        }
        let row = state.selected.and_then(|index| state.items.get(index).cloned());
        state.close();
        row
    };
    let Some(item) = row.and_then(|row| source.prompt_item_for(&row)) else {
        return Ok(true);
    };
    let needle = format!("{}{}", config.trigger, editor.text_back_until(&config.trigger));
    debug!(search = %item.search, "prompt item chosen");
    if config.insert_editable_text {
        editor.replace_text_back_until_with_markup(&needle, &item.editor_markup)?;
    } else {
        let attachment = attachment_for(&item, config);
        editor.replace_text_back_until(&needle, |tree| Ok(vec![tree.create(attachment)]))?;
    }
    Ok(true)
}

fn attachment_for(item: &PromptItem, config: &PromptConfig) -> NodeData {
    NodeData::Decorator(DecoratorNode::Custom(CustomAttachment {
        sgid: item.sgid.clone(),
        content_type: config.content_type(),
        inner_markup: item.editor_markup.clone(),
    }))
}
