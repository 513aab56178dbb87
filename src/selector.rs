use std::borrow::Cow;
use std::cmp::Ordering;

use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use fuzzy_matcher::FuzzyMatcher;
use fuzzy_matcher::skim::SkimMatcherV2;
use ratatui::buffer::Buffer;
use ratatui::layout::{Constraint, Direction, Layout, Margin, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{List, ListItem, ListState, Paragraph, StatefulWidget, Widget};

use crate::config::{Config, FilterMode, LayoutConfig};
use crate::model::Entry;

/// Rows taken by the title, filter, status and hint lines plus the default
/// vertical margin. Only used to size page jumps.
const CHROME_ROWS: u16 = 6;
const ITEM_ROWS: u16 = 2;
const HIGHLIGHT_SYMBOL: &str = "▸ ";

/// Everything the selector reacts to. Key releases and repeats, mouse and
/// focus events all collapse into `Other`.
#[derive(Debug, Clone)]
pub enum Input {
    Key(KeyEvent),
    Resize { width: u16, height: u16 },
    Other,
}

impl From<Event> for Input {
    fn from(event: Event) -> Self {
        match event {
            Event::Key(key) if key.kind == KeyEventKind::Press => Input::Key(key),
            Event::Resize(width, height) => Input::Resize { width, height },
            _ => Input::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectorAction {
    None,
    Cancelled,
    Selected(Entry),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SelectorOptions {
    pub mode: FilterMode,
    pub case_sensitive: bool,
    pub wrap: bool,
}

impl From<&Config> for SelectorOptions {
    fn from(config: &Config) -> Self {
        Self {
            mode: config.filter.mode,
            case_sensitive: config.filter.case_sensitive,
            wrap: config.list.wrap,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Viewport {
    pub width: u16,
    pub height: u16,
}

/// Render-time styling. Passed to `render`/`draw` by value so frames depend
/// only on their arguments.
#[derive(Debug, Clone, Copy)]
pub struct Theme {
    pub margin_vertical: u16,
    pub margin_horizontal: u16,
    pub title: Style,
    pub name: Style,
    pub command: Style,
    pub highlight: Style,
    pub muted: Style,
}

impl Theme {
    pub fn new(layout: LayoutConfig) -> Self {
        Self {
            margin_vertical: layout.margin_vertical,
            margin_horizontal: layout.margin_horizontal,
            title: Style::default()
                .fg(Color::Rgb(255, 253, 245))
                .bg(Color::Rgb(98, 84, 160))
                .add_modifier(Modifier::BOLD),
            name: Style::default().fg(Color::White),
            command: Style::default().fg(Color::DarkGray),
            highlight: Style::default()
                .bg(Color::Rgb(42, 88, 116))
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
            muted: Style::default().fg(Color::DarkGray),
        }
    }
}

impl Default for Theme {
    fn default() -> Self {
        Self::new(LayoutConfig::default())
    }
}

pub struct SelectorState {
    entries: Vec<Entry>,
    visible: Vec<usize>,
    cursor: usize,
    filter: String,
    viewport: Viewport,
    options: SelectorOptions,
    matcher: SkimMatcherV2,
}

impl SelectorState {
    pub fn new(entries: Vec<Entry>, options: SelectorOptions) -> Self {
        let matcher = if options.case_sensitive {
            SkimMatcherV2::default().respect_case()
        } else {
            SkimMatcherV2::default().ignore_case()
        };
        let mut state = Self {
            entries,
            visible: Vec::new(),
            cursor: 0,
            filter: String::new(),
            viewport: Viewport::default(),
            options,
            matcher,
        };
        state.refresh_visible();
        state
    }

    pub fn handle_event(&mut self, input: Input) -> SelectorAction {
        match input {
            Input::Key(key) => self.on_key(key),
            Input::Resize { width, height } => {
                self.viewport = Viewport { width, height };
                SelectorAction::None
            }
            Input::Other => SelectorAction::None,
        }
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn filter(&self) -> &str {
        &self.filter
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn visible_count(&self) -> usize {
        self.visible.len()
    }

    pub fn visible_entries(&self) -> impl Iterator<Item = &Entry> + '_ {
        self.visible.iter().map(|index| &self.entries[*index])
    }

    /// `None` when nothing is visible.
    pub fn cursor(&self) -> Option<usize> {
        (!self.visible.is_empty()).then_some(self.cursor)
    }

    pub fn selected(&self) -> Option<&Entry> {
        self.visible
            .get(self.cursor)
            .map(|index| &self.entries[*index])
    }

    fn on_key(&mut self, key: KeyEvent) -> SelectorAction {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

        match key.code {
            KeyCode::Char('c') if ctrl => SelectorAction::Cancelled,
            KeyCode::Esc => {
                if self.filter.is_empty() {
                    SelectorAction::Cancelled
                } else {
                    self.set_filter(String::new());
                    SelectorAction::None
                }
            }
            KeyCode::Enter => match self.selected() {
                Some(entry) => SelectorAction::Selected(entry.clone()),
                None => SelectorAction::None,
            },
            KeyCode::Up => self.move_cursor(-1),
            KeyCode::Down => self.move_cursor(1),
            KeyCode::Char('k' | 'p') if ctrl => self.move_cursor(-1),
            KeyCode::Char('j' | 'n') if ctrl => self.move_cursor(1),
            KeyCode::PageUp => self.jump_cursor(-(self.page_size() as isize)),
            KeyCode::PageDown => self.jump_cursor(self.page_size() as isize),
            KeyCode::Home => self.jump_cursor(isize::MIN),
            KeyCode::End => self.jump_cursor(isize::MAX),
            KeyCode::Char('u') if ctrl => {
                if !self.filter.is_empty() {
                    self.set_filter(String::new());
                }
                SelectorAction::None
            }
            KeyCode::Backspace => {
                let mut filter = self.filter.clone();
                if filter.pop().is_some() {
                    self.set_filter(filter);
                }
                SelectorAction::None
            }
            KeyCode::Char(ch)
                if key.modifiers.is_empty() || key.modifiers == KeyModifiers::SHIFT =>
            {
                let mut filter = self.filter.clone();
                filter.push(ch);
                self.set_filter(filter);
                SelectorAction::None
            }
            _ => SelectorAction::None,
        }
    }

    fn set_filter(&mut self, filter: String) {
        self.filter = filter;
        self.refresh_visible();
    }

    /// Single step. Wraps around when configured, otherwise stops at the ends.
    fn move_cursor(&mut self, step: isize) -> SelectorAction {
        if self.visible.is_empty() {
            self.cursor = 0;
            return SelectorAction::None;
        }

        if self.options.wrap {
            let len = self.visible.len() as isize;
            self.cursor = (self.cursor as isize + step).rem_euclid(len) as usize;
            return SelectorAction::None;
        }

        self.jump_cursor(step)
    }

    /// Multi-row move, always clamped.
    fn jump_cursor(&mut self, step: isize) -> SelectorAction {
        let Some(last) = self.visible.len().checked_sub(1) else {
            self.cursor = 0;
            return SelectorAction::None;
        };

        self.cursor = if step < 0 {
            self.cursor.saturating_sub(step.unsigned_abs())
        } else {
            self.cursor.saturating_add(step as usize).min(last)
        };
        SelectorAction::None
    }

    fn page_size(&self) -> usize {
        let rows = self.viewport.height.saturating_sub(CHROME_ROWS);
        usize::from(rows / ITEM_ROWS).max(1)
    }

    fn refresh_visible(&mut self) {
        self.cursor = 0;

        if self.filter.is_empty() {
            self.visible = (0..self.entries.len()).collect();
            return;
        }

        let query = self.normalize(&self.filter);
        self.visible = match self.options.mode {
            FilterMode::Substring => self
                .entries
                .iter()
                .enumerate()
                .filter(|(_, entry)| self.normalize(&entry.name).contains(&*query))
                .map(|(index, _)| index)
                .collect(),
            FilterMode::Fuzzy => {
                let mut scored: Vec<(usize, i64)> = self
                    .entries
                    .iter()
                    .enumerate()
                    .filter_map(|(index, entry)| {
                        self.matcher
                            .fuzzy_match(&entry.name, &query)
                            .map(|score| (index, score))
                    })
                    .collect();
                scored.sort_by(|a, b| match b.1.cmp(&a.1) {
                    Ordering::Equal => a.0.cmp(&b.0),
                    other => other,
                });
                scored.into_iter().map(|(index, _)| index).collect()
            }
        };
    }

    fn normalize<'a>(&self, value: &'a str) -> Cow<'a, str> {
        if self.options.case_sensitive {
            Cow::Borrowed(value)
        } else {
            Cow::Owned(value.to_lowercase())
        }
    }
}

/// Renders one frame as plain text, one line per viewport row with trailing
/// blanks trimmed. A zero-size viewport yields an empty string.
pub fn render(state: &SelectorState, theme: &Theme) -> String {
    let area = Rect::new(0, 0, state.viewport.width, state.viewport.height);
    if area.is_empty() {
        return String::new();
    }

    let mut buffer = Buffer::empty(area);
    draw(area, &mut buffer, state, theme);
    buffer_to_text(&buffer)
}

pub fn draw(area: Rect, buf: &mut Buffer, state: &SelectorState, theme: &Theme) {
    let inner = area.inner(Margin::new(theme.margin_horizontal, theme.margin_vertical));
    if inner.is_empty() {
        return;
    }

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Min(0),
            Constraint::Length(1),
        ])
        .split(inner);

    Paragraph::new(Line::from(Span::styled(" Scripts ", theme.title))).render(chunks[0], buf);
    Paragraph::new(Line::from(vec![
        Span::styled("Filter: ", theme.muted),
        Span::styled(state.filter.clone(), theme.name),
    ]))
    .render(chunks[1], buf);
    Paragraph::new(Line::from(Span::styled(
        format!("{}/{} scripts", state.visible.len(), state.entries.len()),
        theme.muted,
    )))
    .render(chunks[2], buf);
    draw_entries(chunks[3], buf, state, theme);
    Paragraph::new(Line::from(Span::styled(
        "↑/↓ move • enter run • esc clear • ctrl+c quit",
        theme.muted,
    )))
    .render(chunks[4], buf);
}

fn draw_entries(area: Rect, buf: &mut Buffer, state: &SelectorState, theme: &Theme) {
    if state.visible.is_empty() {
        let message = if state.entries.is_empty() {
            "No scripts found"
        } else {
            "No matching scripts"
        };
        Paragraph::new(Span::styled(message, theme.muted)).render(area, buf);
        return;
    }

    let items: Vec<ListItem<'_>> = state
        .visible_entries()
        .map(|entry| {
            ListItem::new(vec![
                Line::from(Span::styled(entry.name.clone(), theme.name)),
                Line::from(Span::styled(format!("  {}", entry.command), theme.command)),
            ])
        })
        .collect();

    let mut list_state = ListState::default().with_selected(state.cursor());
    let list = List::new(items)
        .highlight_style(theme.highlight)
        .highlight_symbol(HIGHLIGHT_SYMBOL);

    StatefulWidget::render(list, area, buf, &mut list_state);
}

fn buffer_to_text(buffer: &Buffer) -> String {
    let area = buffer.area;
    let mut lines = Vec::with_capacity(usize::from(area.height));
    for y in area.top()..area.bottom() {
        let mut line = String::new();
        for x in area.left()..area.right() {
            if let Some(cell) = buffer.cell((x, y)) {
                line.push_str(cell.symbol());
            }
        }
        lines.push(line.trim_end().to_string());
    }
    lines.join("\n")
}
