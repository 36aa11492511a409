use ratatui::style::{Color, Modifier, Style};

/// Colors used by the terminal front end.
#[derive(Clone, Debug)]
pub struct Theme {
    /// Background color for the editor
    pub background: Color,

    /// Foreground (text) color for the status bar
    pub status_bar_fg: Color,

    /// Background color for the status bar
    pub status_bar_bg: Color,

    /// Color for the current file name in the status bar
    pub filename_color: Color,

    /// Foreground color for selected text
    pub selection_fg: Color,

    /// Background color for selected text
    pub selection_bg: Color,

    /// Foreground color for a selected decorator (divider, attachment)
    pub node_mark_fg: Color,

    /// Background color for a selected decorator
    pub node_mark_bg: Color,

    /// Fallback foreground for highlighted text without its own color
    pub highlight_fg: Color,

    /// Fallback background for highlighted text without its own color
    pub highlight_bg: Color,

    /// Color for links
    pub link_color: Color,

    /// Color for inline code and code blocks
    pub code_color: Color,

    /// Color for the quote gutter and list markers
    pub gutter_color: Color,

    /// Color for attachments and custom attachments
    pub attachment_color: Color,

    /// Color for uploads that failed
    pub error_color: Color,

    /// Foreground color for the scrollbar knob
    pub scrollbar_knob_fg: Color,

    /// Foreground color for the scrollbar track
    pub scrollbar_track_fg: Color,

    /// Foreground color for menu items
    pub menu_fg: Color,

    /// Background color for menus and the prompt popover
    pub menu_bg: Color,

    /// Foreground color for the "nothing found" placeholder
    pub menu_disabled_fg: Color,

    /// Foreground color for the selected menu entry
    pub menu_selected_fg: Color,

    /// Background color for the selected menu entry
    pub menu_selected_bg: Color,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            background: Color::Reset,
            status_bar_fg: Color::White,
            status_bar_bg: Color::Blue,
            filename_color: Color::LightYellow,
            selection_fg: Color::White,
            selection_bg: Color::LightBlue,
            node_mark_fg: Color::Black,
            node_mark_bg: Color::LightCyan,
            highlight_fg: Color::Black,
            highlight_bg: Color::LightYellow,
            link_color: Color::Blue,
            code_color: Color::Gray,
            gutter_color: Color::DarkGray,
            attachment_color: Color::Magenta,
            error_color: Color::LightRed,
            scrollbar_knob_fg: Color::Reset,
            scrollbar_track_fg: Color::DarkGray,
            menu_fg: Color::White,
            menu_bg: Color::Black,
            menu_disabled_fg: Color::DarkGray,
            menu_selected_fg: Color::Black,
            menu_selected_bg: Color::White,
        }
    }
}

impl Theme {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status_bar_style(&self) -> Style {
        Style::default()
            .fg(self.status_bar_fg)
            .bg(self.status_bar_bg)
    }

    pub fn filename_style(&self) -> Style {
        Style::default().fg(self.filename_color)
    }

    pub fn selection_style(&self) -> Style {
        Style::default().fg(self.selection_fg).bg(self.selection_bg)
    }

    /// Style for decorators carrying the "selected" mark.
    pub fn node_mark_style(&self) -> Style {
        Style::default().fg(self.node_mark_fg).bg(self.node_mark_bg)
    }

    /// Highlighted text. Colors stored on the text win over the theme's.
    pub fn highlight_style(&self, color: Option<Color>, background: Option<Color>) -> Style {
        Style::default()
            .fg(color.unwrap_or(self.highlight_fg))
            .bg(background.unwrap_or(self.highlight_bg))
    }

    pub fn link_style(&self) -> Style {
        Style::default()
            .fg(self.link_color)
            .add_modifier(Modifier::UNDERLINED)
    }

    pub fn code_style(&self) -> Style {
        Style::default().fg(self.code_color)
    }

    pub fn gutter_style(&self) -> Style {
        Style::default().fg(self.gutter_color)
    }

    pub fn attachment_style(&self) -> Style {
        Style::default().fg(self.attachment_color)
    }

    pub fn error_style(&self) -> Style {
        Style::default()
            .fg(self.error_color)
            .add_modifier(Modifier::BOLD)
    }

    pub fn scrollbar_knob_style(&self) -> Style {
        Style::default().fg(self.scrollbar_knob_fg)
    }

    pub fn scrollbar_track_style(&self) -> Style {
        Style::default().fg(self.scrollbar_track_fg)
    }

    pub fn menu_style(&self) -> Style {
        Style::default().fg(self.menu_fg).bg(self.menu_bg)
    }

    pub fn menu_disabled_style(&self) -> Style {
        Style::default().fg(self.menu_disabled_fg).bg(self.menu_bg)
    }

    pub fn menu_selected_style(&self) -> Style {
        Style::default()
            .fg(self.menu_selected_fg)
            .bg(self.menu_selected_bg)
    }
}
