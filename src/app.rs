use std::io::{self, Stdout};
use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::cursor;
use crossterm::event;
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
    size as terminal_size,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::Rect;
use tracing::debug;

use crate::model::Entry;
use crate::selector::{self, Input, SelectorAction, SelectorOptions, SelectorState, Theme};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

type TuiTerminal = Terminal<CrosstermBackend<Stdout>>;

/// Runs the selector on the alternate screen until the user picks a script
/// or backs out. The terminal is restored before this returns, on every path.
pub fn run_tui(
    entries: Vec<Entry>,
    options: SelectorOptions,
    theme: Theme,
) -> Result<SelectorAction> {
    let mut terminal = init_terminal()?;
    let mut state = SelectorState::new(entries, options);

    match run_loop(&mut terminal, &mut state, &theme) {
        Ok(action) => {
            restore_terminal(&mut terminal)?;
            debug!(
                total = state.entries().len(),
                visible = state.visible_count(),
                filter = state.filter(),
                "selector closed"
            );
            Ok(action)
        }
        Err(err) => {
            let _ = restore_terminal(&mut terminal);
            Err(err)
        }
    }
}

fn init_terminal() -> Result<TuiTerminal> {
    enable_raw_mode().context("failed to enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).context("failed to enter alternate screen")?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend).context("failed to create terminal")
}

fn restore_terminal(terminal: &mut TuiTerminal) -> Result<()> {
    disable_raw_mode().context("failed to disable raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, cursor::Show)
        .context("failed to leave alternate screen")?;
    terminal.show_cursor().context("failed to show cursor")
}

fn run_loop(
    terminal: &mut TuiTerminal,
    state: &mut SelectorState,
    theme: &Theme,
) -> Result<SelectorAction> {
    // crossterm only reports size changes, so seed the viewport once.
    let (width, height) = terminal_size().context("failed to read terminal size")?;
    state.handle_event(Input::Resize { width, height });

    loop {
        terminal.draw(|frame| {
            let viewport = state.viewport();
            let area = Rect::new(0, 0, viewport.width, viewport.height).intersection(frame.area());
            selector::draw(area, frame.buffer_mut(), state, theme);
        })?;

        if !event::poll(POLL_INTERVAL)? {
            continue;
        }

        match state.handle_event(Input::from(event::read()?)) {
            SelectorAction::None => {}
            action => return Ok(action),
        }
    }
}
