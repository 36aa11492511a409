use std::{
    env, fs, io,
    path::{Path, PathBuf},
    sync::Mutex,
    time::{Duration, Instant},
};

use anyhow::{Context, Result, anyhow};
use crossterm::{
    event::{
        self, DisableBracketedPaste, EnableBracketedPaste, Event, KeyCode, KeyEvent, KeyEventKind,
        KeyModifiers,
    },
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Frame, Terminal,
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Position, Rect},
    style::Modifier,
    text::{Line, Span, Text},
    widgets::{
        Block, Borders, Clear, List, ListItem, ListState, Paragraph, Scrollbar,
        ScrollbarOrientation, ScrollbarState,
    },
};
use tokio::{runtime::Runtime, sync::mpsc};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use quire::{
    Editor, EditorConfig, convert,
    editor::{
        ClipboardData, CommandPayload, HighlightStyles, ScrollPosition, ToolbarCommand, UploadEvent,
        UploadRequest, UploadTransport, UploadedBlob, query,
    },
    engine::{
        EditorState, ElementKind, HeadingTag, Point, Selection, Tree, UploadFile,
        native::CaretMove,
        selection::caret_block_of,
    },
    prompt::{InlineSource, PromptConfig, PromptItem, PromptMenu},
    render::Layout,
    theme::Theme,
};

const STATUS_TIMEOUT: Duration = Duration::from_secs(4);
const PROMPT_MAX_ROWS: usize = 6;

fn main() -> Result<()> {
    init_logging()?;
    run()
}

/// Logs go to the file named by `QUIRE_LOG`; without it nothing is logged,
/// since stdout belongs to the terminal UI.
fn init_logging() -> Result<()> {
    let Ok(path) = env::var("QUIRE_LOG") else {
        return Ok(());
    };
    let file = fs::File::create(&path).with_context(|| format!("failed to create {path}"))?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .try_init()
        .map_err(|err| anyhow!("failed to install logger: {err}"))
}

fn run() -> Result<()> {
    let path = env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("untitled.html"));

    let config = EditorConfig::from_env();
    let (editor, initial_status) = load_editor(&path, config)?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .context("failed to start async runtime")?;
    let mut app = App::new(editor, path, initial_status, runtime);

    enable_raw_mode().context("failed to enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableBracketedPaste)
        .context("failed to enter alternate screen")?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("failed to create terminal backend")?;
    terminal.clear().ok();

    let res = run_app(&mut terminal, &mut app).context("application error");

    disable_raw_mode().ok();
    execute!(terminal.backend_mut(), DisableBracketedPaste, LeaveAlternateScreen).ok();
    terminal.show_cursor().ok();

    res
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FileFormat {
    Markup,
    Ftml,
    Markdown,
}

impl FileFormat {
    fn of(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("ftml") => FileFormat::Ftml,
            Some("md") | Some("markdown") => FileFormat::Markdown,
            _ => FileFormat::Markup,
        }
    }
}

fn load_editor(path: &Path, config: EditorConfig) -> Result<(Editor, Option<String>)> {
    if !path.exists() {
        return Ok((Editor::new(config), Some("New document".to_string())));
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let loaded = match FileFormat::of(path) {
        FileFormat::Markup => Editor::from_markup(config.clone(), &content),
        format => load_document(config.clone(), format, &content),
    };
    match loaded {
        Ok(editor) => Ok((editor, None)),
        Err(err) => {
            let message = format!("Parse error: {err}. Starting with empty document.");
            Ok((Editor::new(config), Some(message)))
        }
    }
}

fn load_document(config: EditorConfig, format: FileFormat, content: &str) -> quire::Result<Editor> {
    let mut tree = Tree::new();
    let nodes = match format {
        FileFormat::Ftml => convert::ftml_to_nodes(&mut tree, content)?,
        _ => convert::markdown_to_nodes(&mut tree, content)?,
    };
    let root = tree.root();
    if nodes.is_empty() {
        let paragraph = tree.create_paragraph();
        tree.append(root, paragraph)?;
    } else {
        tree.append_all(root, &nodes)?;
    }
    let mut editor = Editor::with_state(config, EditorState::new(tree));
    editor.place_cursor_at_the_end()?;
    Ok(editor)
}

fn run_app<B: ratatui::backend::Backend>(terminal: &mut Terminal<B>, app: &mut App) -> Result<()> {
    let tick_rate = Duration::from_millis(250);
    let mut last_tick = Instant::now();

    while !app.should_quit() {
        terminal
            .draw(|frame| app.draw(frame))
            .context("failed to draw frame")?;

        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or_else(|| Duration::from_secs(0));

        if event::poll(timeout).context("event poll failed")? {
            let evt = event::read().context("failed to read event")?;
            app.handle_event(evt)?;
        }

        if last_tick.elapsed() >= tick_rate {
            app.on_tick()?;
            last_tick = Instant::now();
        }
    }

    Ok(())
}

/// Finishes "uploads" on the spot, pointing the attachment at the
/// default blob path.
struct LocalTransport;

impl UploadTransport for LocalTransport {
    fn start(&mut self, request: UploadRequest, events: mpsc::UnboundedSender<UploadEvent>) {
        let total = request.file.size;
        let blob = UploadedBlob {
            signed_id: format!("local-{}", request.id.0),
            filename: request.file.name.clone(),
            content_type: request.file.content_type.clone(),
            byte_size: total,
            ..UploadedBlob::default()
        };
        let sent = events
            .send(UploadEvent::Progress {
                id: request.id,
                loaded: total,
                total,
            })
            .and_then(|_| events.send(UploadEvent::Completed { id: request.id, blob }));
        if sent.is_err() {
            debug!(file = %request.file.name, "editor went away before the upload finished");
        }
    }
}

fn content_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("svg") => "image/svg+xml",
        Some("pdf") => "application/pdf",
        Some("txt") | Some("md") => "text/plain",
        _ => "application/octet-stream",
    }
}

fn demo_people() -> Vec<PromptItem> {
    [("Ana Lima", "1"), ("Bruno Díaz", "2"), ("Chloé Martin", "3"), ("Dev Patel", "4")]
        .into_iter()
        .map(|(name, id)| PromptItem {
            search: name.to_string(),
            sgid: Some(format!("gid://quire/Person/{id}")),
            menu_markup: format!("<strong>{name}</strong>"),
            editor_markup: format!("<strong>@{name}</strong>"),
        })
        .collect()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum InputPurpose {
    Link,
    Attach,
}

impl InputPurpose {
    fn label(self) -> &'static str {
        match self {
            InputPurpose::Link => "Link URL (empty removes the link): ",
            InputPurpose::Attach => "Attach file: ",
        }
    }
}

struct LineInput {
    purpose: InputPurpose,
    buffer: String,
}

struct CommandMenuState {
    selected_index: usize,
}

impl CommandMenuState {
    fn move_selection(&mut self, delta: i32) {
        let len = ToolbarCommand::ALL.len() as i32;
        let idx = (self.selected_index as i32 + delta).rem_euclid(len);
        self.selected_index = idx as usize;
    }

    fn current(&self) -> ToolbarCommand {
        ToolbarCommand::ALL[self.selected_index]
    }
}

struct App {
    editor: Editor,
    prompt: PromptMenu<InlineSource>,
    runtime: Runtime,
    theme: Theme,
    file_path: PathBuf,
    scroll_top: usize,
    last_view_height: usize,
    should_quit: bool,
    dirty: bool,
    saved_value: String,
    seen_version: u64,
    status_message: Option<(String, Instant)>,
    command_menu: Option<CommandMenuState>,
    input: Option<LineInput>,
}

impl App {
    fn new(mut editor: Editor, path: PathBuf, initial_status: Option<String>, runtime: Runtime) -> Self {
        editor.set_upload_transport(Box::new(LocalTransport));
        let prompt = PromptMenu::new(
            PromptConfig::new("@", "mention"),
            InlineSource::new(demo_people()),
        );
        prompt.attach(&mut editor);
        let saved_value = editor.value();
        let seen_version = editor.version();

        Self {
            editor,
            prompt,
            runtime,
            theme: Theme::default(),
            file_path: path,
            scroll_top: 0,
            last_view_height: 1,
            should_quit: false,
            dirty: false,
            saved_value,
            seen_version,
            status_message: initial_status.map(|msg| (msg, Instant::now())),
            command_menu: None,
            input: None,
        }
    }

    fn should_quit(&self) -> bool {
        self.should_quit
    }

    fn caret(&self) -> Option<Point> {
        match self.editor.selection()? {
            Selection::Range(range) => Some(range.focus),
            Selection::Node(_) => None,
        }
    }

    fn draw(&mut self, frame: &mut Frame) {
        let area = frame.area();
        if area.height == 0 || area.width == 0 {
            return;
        }

        let status_height = if area.height > 1 { 2 } else { 1 };
        let vertical = ratatui::layout::Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(1), Constraint::Length(status_height)])
            .split(area);
        let editor_area = vertical[0];
        let status_area = vertical[1];

        let horizontal = ratatui::layout::Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Min(1), Constraint::Length(1)])
            .split(editor_area);
        let text_area = horizontal[0];
        let scrollbar_area = horizontal[1];

        let mut layout = Layout::build(
            self.editor.tree(),
            self.editor.selection(),
            self.editor.marks(),
            text_area.width.max(1) as usize,
            &self.theme,
        );
        let caret = self.caret();
        let caret_line = caret.and_then(|point| layout.position_of(point)).map(|p| p.line);
        let viewport_height = text_area.height as usize;
        self.last_view_height = viewport_height.max(1);
        self.adjust_scroll(caret_line, layout.total_lines(), viewport_height);
        layout.set_viewport(text_area, self.scroll_top);
        self.editor.set_scroll_position(ScrollPosition {
            top: self.scroll_top,
            left: 0,
        });

        let paragraph = Paragraph::new(Text::from(layout.lines().to_vec()))
            .style(ratatui::style::Style::default().bg(self.theme.background))
            .scroll((self.scroll_top as u16, 0));
        frame.render_widget(paragraph, text_area);

        let mut scrollbar_state =
            ScrollbarState::new(layout.total_lines()).position(self.scroll_top);
        let scrollbar = Scrollbar::new(ScrollbarOrientation::VerticalRight)
            .thumb_style(self.theme.scrollbar_knob_style())
            .track_style(self.theme.scrollbar_track_style());
        frame.render_stateful_widget(scrollbar, scrollbar_area, &mut scrollbar_state);

        if self.input.is_none() && self.command_menu.is_none() {
            if let Some((x, y)) = caret.and_then(|point| layout.screen_position(point)) {
                frame.set_cursor_position(Position::new(x, y));
            }
        }

        self.render_status(frame, status_area, caret_line);

        if self.prompt.is_open() {
            self.render_prompt(frame, &layout, text_area);
        }
        if self.command_menu.is_some() {
            self.render_command_menu(frame, area);
        }
    }

    fn render_status(&mut self, frame: &mut Frame, area: Rect, caret_line: Option<usize>) {
        let line = match &self.input {
            Some(input) => {
                let label = Span::styled(input.purpose.label(), self.theme.filename_style());
                Line::from(vec![label, Span::raw(input.buffer.clone())])
            }
            None => Line::from(Span::styled(
                self.status_line(caret_line),
                self.theme.status_bar_style(),
            )),
        };
        let status_widget = Paragraph::new(line).block(Block::default().borders(Borders::TOP));
        frame.render_widget(status_widget, area);

        if let Some(input) = &self.input {
            let width = input.purpose.label().chars().count() + input.buffer.chars().count();
            let y = area.y + area.height.saturating_sub(1);
            let x = area.x + (width as u16).min(area.width.saturating_sub(1));
            frame.set_cursor_position(Position::new(x, y));
        }
    }

    fn render_prompt(&self, frame: &mut Frame, layout: &Layout, text_area: Rect) {
        let items = self.prompt.items();
        let rows: Vec<String> = if items.is_empty() {
            self.prompt
                .empty_message()
                .map(|message| vec![message.to_string()])
                .unwrap_or_default()
        } else {
            items.iter().take(PROMPT_MAX_ROWS).map(|item| item.label.clone()).collect()
        };
        if rows.is_empty() {
            return;
        }
        let width = rows.iter().map(|row| row.chars().count()).max().unwrap_or(0) as u16 + 4;
        let height = rows.len() as u16 + 2;
        let Some(placement) = self.prompt.place(&self.editor, layout, height, text_area.height)
        else {
            return;
        };

        let x = (i32::from(text_area.x) + placement.x).max(i32::from(text_area.x)) as u16;
        let y = (i32::from(text_area.y) + placement.y).max(i32::from(text_area.y)) as u16;
        let popup = Rect::new(x, y, width, height).intersection(text_area);
        if popup.width < 3 || popup.height < 3 {
            return;
        }
        frame.render_widget(Clear, popup);

        let style = if items.is_empty() {
            self.theme.menu_disabled_style()
        } else {
            self.theme.menu_style()
        };
        let list_items: Vec<ListItem> = rows
            .into_iter()
            .map(|row| ListItem::new(Line::from(Span::styled(row, style))))
            .collect();
        let mut state = ListState::default();
        state.select(self.prompt.selected_index());
        let list = List::new(list_items)
            .highlight_style(self.theme.menu_selected_style())
            .style(self.theme.menu_style())
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .style(self.theme.menu_style())
                    .border_style(self.theme.gutter_style()),
            );
        frame.render_stateful_widget(list, popup, &mut state);
    }

    fn render_command_menu(&self, frame: &mut Frame, area: Rect) {
        let Some(menu) = &self.command_menu else {
            return;
        };
        if area.width < 3 || area.height < 3 {
            return;
        }

        let label_width = ToolbarCommand::ALL
            .iter()
            .map(|command| command.label().chars().count())
            .max()
            .unwrap_or(0);
        let width = (label_width as u16 + 4).min(area.width).max(10.min(area.width));
        let height = (ToolbarCommand::ALL.len() as u16 + 2).min(area.height);
        let popup_area = Rect::new(
            area.x + (area.width.saturating_sub(width)) / 2,
            area.y + (area.height.saturating_sub(height)) / 2,
            width,
            height,
        );
        frame.render_widget(Clear, popup_area);

        let items: Vec<ListItem> = ToolbarCommand::ALL
            .iter()
            .map(|command| ListItem::new(Line::from(command.label())))
            .collect();
        let mut state = ListState::default();
        state.select(Some(menu.selected_index));

        let list = List::new(items)
            .highlight_style(self.theme.menu_selected_style())
            .style(self.theme.menu_style())
            .block(
                Block::default()
                    .title(Span::styled(
                        "Commands",
                        self.theme.menu_style().add_modifier(Modifier::BOLD),
                    ))
                    .borders(Borders::ALL)
                    .style(self.theme.menu_style())
                    .border_style(self.theme.gutter_style()),
            );
        frame.render_stateful_widget(list, popup_area, &mut state);
    }

    fn status_line(&mut self, caret_line: Option<usize>) -> String {
        self.prune_status_message();
        let cursor_details = self.cursor_status_text(caret_line);
        if let Some((message, _)) = &self.status_message {
            return format!("{cursor_details} | {message}");
        }

        let marker = if self.dirty { "*" } else { "" };
        format!(
            "{} | {}{} | Ctrl-S save | Ctrl-P commands | Ctrl-Q quit",
            cursor_details,
            self.file_path.display(),
            marker,
        )
    }

    fn cursor_status_text(&self, caret_line: Option<usize>) -> String {
        let position = caret_line
            .map(|line| format!("[{}]", line + 1))
            .unwrap_or_else(|| "[-]".to_string());
        let tree = self.editor.tree();
        let block = match self.editor.selection() {
            Some(Selection::Node(nodes)) => {
                let count = nodes.keys().len();
                return format!("{position} {count} selected");
            }
            Some(Selection::Range(range)) => caret_block_of(tree, range.focus.key),
            None => None,
        };
        let label = block
            .and_then(|block| tree.element_kind(block))
            .map(|kind| match kind {
                ElementKind::Paragraph => "Paragraph".to_string(),
                ElementKind::Heading(tag) => heading_label(*tag),
                ElementKind::ListItem => "List item".to_string(),
                ElementKind::Quote => "Quote".to_string(),
                ElementKind::Code { .. } => "Code".to_string(),
                ElementKind::List(_) => "List".to_string(),
                ElementKind::Link { url } => format!("Link {url}"),
            });
        let quoted = block.is_some_and(|block| query::is_inside_quote(tree, block));
        match (label, quoted) {
            (Some(label), true) => format!("{position} Quote > {label}"),
            (Some(label), false) => format!("{position} {label}"),
            (None, _) => position,
        }
    }

    fn set_status(&mut self, message: impl Into<String>) {
        self.status_message = Some((message.into(), Instant::now()));
    }

    fn prune_status_message(&mut self) {
        if let Some((_, instant)) = &self.status_message {
            if instant.elapsed() > STATUS_TIMEOUT {
                self.status_message = None;
            }
        }
    }

    fn adjust_scroll(&mut self, caret_line: Option<usize>, total_lines: usize, viewport_height: usize) {
        let viewport = viewport_height.max(1);
        if let Some(line) = caret_line {
            if line < self.scroll_top {
                self.scroll_top = line;
            } else if line >= self.scroll_top + viewport {
                self.scroll_top = line + 1 - viewport;
            }
        }
        let max_scroll = total_lines.saturating_sub(viewport);
        self.scroll_top = self.scroll_top.min(max_scroll);
    }

    fn handle_event(&mut self, event: Event) -> Result<()> {
        match event {
            Event::Key(key) if key.kind == KeyEventKind::Press => self.handle_key(key)?,
            Event::Paste(text) => {
                if let Some(input) = self.input.as_mut() {
                    input.buffer.push_str(text.trim());
                    return Ok(());
                }
                self.editor.paste(ClipboardData::text(text))?;
                if let Some(scroll) = self.editor.take_scroll_restore() {
                    self.scroll_top = scroll.top;
                }
            }
            _ => {}
        }
        self.after_change();
        Ok(())
    }

    fn handle_key(&mut self, key: KeyEvent) -> Result<()> {
        if self.input.is_some() {
            return self.handle_input_key(key);
        }
        if self.command_menu.is_some() {
            return self.handle_command_menu_key(key);
        }

        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Char('q') | KeyCode::Char('c') if ctrl => self.should_quit = true,
            KeyCode::Char('s') if ctrl => self.save()?,
            KeyCode::Char('p') if ctrl => {
                self.command_menu = Some(CommandMenuState { selected_index: 0 });
            }
            KeyCode::Char('k') if ctrl => self.open_input(InputPurpose::Link),
            KeyCode::Char('o') if ctrl => self.open_input(InputPurpose::Attach),
            KeyCode::Char('a') if ctrl => {
                self.editor.move_caret(CaretMove::LineStart, false)?;
            }
            KeyCode::Char('e') if ctrl => {
                self.editor.move_caret(CaretMove::LineEnd, false)?;
            }
            KeyCode::PageUp => {
                self.scroll_top = self.scroll_top.saturating_sub(self.last_view_height);
            }
            KeyCode::PageDown => {
                self.scroll_top += self.last_view_height;
            }
            _ => {
                if !self.editor.handle_key(key)? {
                    debug!(?key, "key not handled");
                }
            }
        }
        Ok(())
    }

    fn open_input(&mut self, purpose: InputPurpose) {
        self.input = Some(LineInput {
            purpose,
            buffer: String::new(),
        });
    }

    fn handle_input_key(&mut self, key: KeyEvent) -> Result<()> {
        let Some(input) = self.input.as_mut() else {
            return Ok(());
        };
        match key.code {
            KeyCode::Esc => self.input = None,
            KeyCode::Backspace => {
                input.buffer.pop();
            }
            KeyCode::Enter => {
                if let Some(input) = self.input.take() {
                    self.submit_input(input)?;
                }
            }
            KeyCode::Char(ch) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
                input.buffer.push(ch);
            }
            _ => {}
        }
        Ok(())
    }

    fn submit_input(&mut self, input: LineInput) -> Result<()> {
        let value = input.buffer.trim();
        match input.purpose {
            InputPurpose::Link if value.is_empty() => {
                self.editor.run(ToolbarCommand::Unlink)?;
            }
            InputPurpose::Link => {
                let payload = CommandPayload::Link(Some(value.to_string()));
                if !self.editor.run_with(ToolbarCommand::Link, payload)? {
                    self.set_status("Nothing to link");
                }
            }
            InputPurpose::Attach if value.is_empty() => {}
            InputPurpose::Attach => self.attach_file(Path::new(value))?,
        }
        Ok(())
    }

    fn attach_file(&mut self, path: &Path) -> Result<()> {
        let data = match fs::read(path) {
            Ok(data) => data,
            Err(err) => {
                self.set_status(format!("Cannot read {}: {err}", path.display()));
                return Ok(());
            }
        };
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let file = UploadFile::new(name, content_type_for(path), data);
        let payload = CommandPayload::Files(vec![file]);
        self.editor.run_with(ToolbarCommand::UploadAttachments, payload)?;
        if !self.editor.config().attachments {
            self.set_status("Attachments are disabled");
        }
        Ok(())
    }

    fn handle_command_menu_key(&mut self, key: KeyEvent) -> Result<()> {
        let Some(menu) = self.command_menu.as_mut() else {
            return Ok(());
        };
        match key.code {
            KeyCode::Esc => self.command_menu = None,
            KeyCode::Char('p') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.command_menu = None;
            }
            KeyCode::Up => menu.move_selection(-1),
            KeyCode::Down => menu.move_selection(1),
            KeyCode::Enter => {
                let command = menu.current();
                self.command_menu = None;
                self.execute_command(command)?;
            }
            _ => {}
        }
        Ok(())
    }

    fn execute_command(&mut self, command: ToolbarCommand) -> Result<()> {
        match command {
            ToolbarCommand::Link => self.open_input(InputPurpose::Link),
            ToolbarCommand::UploadAttachments => self.open_input(InputPurpose::Attach),
            ToolbarCommand::ToggleHighlight => {
                let styles = HighlightStyles::background(convert::IMPORTED_HIGHLIGHT_BACKGROUND);
                self.editor
                    .run_with(command, CommandPayload::Highlight(styles))?;
            }
            command => {
                if !self.editor.run(command)? {
                    self.set_status(format!("{} is not available here", command.label()));
                }
            }
        }
        Ok(())
    }

    /// Runs after every event: feeds the prompt and refreshes the dirty flag
    /// once per editor version.
    fn after_change(&mut self) {
        let version = self.editor.version();
        if version == self.seen_version {
            return;
        }
        self.seen_version = version;
        let refreshed = self.runtime.block_on(self.prompt.after_update(&self.editor));
        if let Err(err) = refreshed {
            self.set_status(format!("Prompt error: {err}"));
        }
        self.dirty = self.editor.value() != self.saved_value;
    }

    fn on_tick(&mut self) -> Result<()> {
        self.prune_status_message();
        if self.editor.process_upload_events()? > 0 {
            self.after_change();
        }
        Ok(())
    }

    fn save(&mut self) -> Result<()> {
        let tree = self.editor.tree();
        let contents = match FileFormat::of(&self.file_path) {
            FileFormat::Markup => self.editor.value(),
            FileFormat::Ftml => convert::to_ftml(tree).context("failed to render FTML")?,
            FileFormat::Markdown => {
                convert::to_markdown(tree).context("failed to render Markdown")?
            }
        };
        fs::write(&self.file_path, contents)
            .with_context(|| format!("failed to write {}", self.file_path.display()))?;
        info!(path = %self.file_path.display(), "saved");

        self.saved_value = self.editor.value();
        self.dirty = false;
        self.set_status("Saved");
        Ok(())
    }
}

fn heading_label(tag: HeadingTag) -> String {
    format!("Heading {}", &tag.tag_name()[1..])
}
