use crate::{
    app::{App, DialogChoice, Focus, InputMode, InputPurpose, LogLevel, PreviewRow, Report},
    models::{DupAction, IniParseMode},
    panel::DocumentSlot,
    store::ToastLevel,
};
use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    prelude::*,
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Clear, Padding, Paragraph, Wrap},
};
use std::{io, time::Duration};

const CELL_WIDTH: u16 = 26;
const LOG_HEIGHT: u16 = 8;

#[derive(Clone)]
struct Theme {
    accent: Color,
    accent_soft: Color,
    border: Color,
    text: Color,
    muted: Color,
    success: Color,
    warning: Color,
    error: Color,
    header_bg: Color,
    log_bg: Color,
}

impl Theme {
    fn new() -> Self {
        Self {
            accent: Color::Rgb(120, 190, 255),
            accent_soft: Color::Rgb(70, 110, 160),
            border: Color::Rgb(65, 75, 90),
            text: Color::Rgb(220, 230, 240),
            muted: Color::Rgb(135, 145, 155),
            success: Color::Rgb(120, 220, 140),
            warning: Color::Rgb(230, 200, 120),
            error: Color::Rgb(235, 100, 95),
            header_bg: Color::Rgb(22, 28, 36),
            log_bg: Color::Rgb(16, 20, 26),
        }
    }

    fn block(&self, title: String, focused: bool) -> Block<'static> {
        let border = if focused { self.accent_soft } else { self.border };
        Block::default()
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .border_style(Style::default().fg(border))
            .title(Span::styled(
                title,
                Style::default()
                    .fg(self.accent)
                    .add_modifier(Modifier::BOLD),
            ))
    }

    fn panel(&self, title: String, focused: bool) -> Block<'static> {
        self.block(title, focused).padding(Padding {
            left: 1,
            right: 1,
            top: 0,
            bottom: 0,
        })
    }
}

pub fn run(app: &mut App) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = ratatui::backend::CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_loop(&mut terminal, app);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

fn run_loop(terminal: &mut Terminal<impl Backend>, app: &mut App) -> Result<()> {
    loop {
        app.tick();
        terminal.draw(|frame| draw(frame, app))?;

        if app.should_quit {
            break;
        }

        if event::poll(Duration::from_millis(200))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    handle_key(app, key)?;
                }
            }
        }
    }

    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent) -> Result<()> {
    if app.dialog.is_some() {
        return handle_dialog_mode(app, key);
    }

    let mode = std::mem::replace(&mut app.input_mode, InputMode::Normal);
    match mode {
        InputMode::Normal => handle_normal_mode(app, key),
        InputMode::Editing {
            prompt,
            mut buffer,
            purpose,
        } => handle_input_mode(app, key, &mut buffer, purpose, prompt),
    }
}

fn handle_dialog_mode(app: &mut App, key: KeyEvent) -> Result<()> {
    match key.code {
        KeyCode::Left | KeyCode::Char('h') | KeyCode::Char('H') => app.dialog_choice_left(),
        KeyCode::Right | KeyCode::Char('l') | KeyCode::Char('L') | KeyCode::Tab => {
            app.dialog_choice_right()
        }
        KeyCode::Char('y') | KeyCode::Char('Y') => app.dialog_set_choice(DialogChoice::Yes),
        KeyCode::Char('n') | KeyCode::Char('N') => app.dialog_set_choice(DialogChoice::No),
        KeyCode::Char('c') | KeyCode::Char('C') => app.dialog_set_choice(DialogChoice::Cancel),
        KeyCode::Enter | KeyCode::Char(' ') => app.dialog_confirm(),
        KeyCode::Esc => app.dialog_escape(),
        _ => {}
    }
    Ok(())
}

fn handle_normal_mode(app: &mut App, key: KeyEvent) -> Result<()> {
    if app.report.is_some() {
        return handle_report_mode(app, key);
    }

    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    if !matches!(key.code, KeyCode::Char('q') | KeyCode::Char('Q')) {
        app.disarm_quit();
    }
    match key.code {
        KeyCode::Char('s') | KeyCode::Char('S') if ctrl => {
            app.save();
            return Ok(());
        }
        KeyCode::Char('q') | KeyCode::Char('Q') => {
            app.request_quit();
            return Ok(());
        }
        KeyCode::Tab => {
            app.cycle_focus();
            return Ok(());
        }
        KeyCode::PageUp => {
            app.scroll_log_up(3);
            return Ok(());
        }
        KeyCode::PageDown => {
            app.scroll_log_down(3);
            return Ok(());
        }
        KeyCode::Char('X') => {
            app.discard();
            return Ok(());
        }
        KeyCode::Char('s') => {
            app.toggle_safe_mode();
            return Ok(());
        }
        KeyCode::Char('g') => {
            app.cycle_game();
            return Ok(());
        }
        KeyCode::Char('M') => {
            app.enter_mods_path();
            return Ok(());
        }
        KeyCode::Char('c') => {
            app.open_conflicts();
            return Ok(());
        }
        KeyCode::Char('D') => {
            app.open_duplicates();
            return Ok(());
        }
        KeyCode::Char('r') => {
            app.suggest_random();
            return Ok(());
        }
        KeyCode::Char('/') => {
            app.enter_filter();
            return Ok(());
        }
        KeyCode::Esc => {
            app.toasts.dismiss();
            return Ok(());
        }
        _ => {}
    }

    match app.focus {
        Focus::Grid => handle_grid_mode(app, key),
        Focus::Preview => handle_preview_mode(app, key),
        Focus::Log => handle_log_mode(app, key),
    }
    Ok(())
}

fn handle_grid_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Up | KeyCode::Char('k') => app.move_grid(0, -1),
        KeyCode::Down | KeyCode::Char('j') => app.move_grid(0, 1),
        KeyCode::Left | KeyCode::Char('h') => app.move_grid(-1, 0),
        KeyCode::Right | KeyCode::Char('l') => app.move_grid(1, 0),
        KeyCode::Char(' ') => app.toggle_current_enabled(),
        KeyCode::Char('f') => app.toggle_current_favorite(),
        KeyCode::Char('e') => app.enable_only_current(),
        KeyCode::Enter => app.enter_folder(),
        KeyCode::Backspace => app.leave_folder(),
        _ => {}
    }
}

fn handle_preview_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Up | KeyCode::Char('k') => app.move_preview(-1),
        KeyCode::Down | KeyCode::Char('j') => app.move_preview(1),
        KeyCode::Enter | KeyCode::Char(' ') => app.activate_preview_row(),
        KeyCode::Char('p') => app.enter_add_preview(),
        KeyCode::Delete => app.remove_preview_image(),
        KeyCode::Char('P') => app.open_clear_previews_dialog(),
        _ => {}
    }
}

fn handle_log_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Up | KeyCode::Char('k') => app.scroll_log_up(1),
        KeyCode::Down | KeyCode::Char('j') => app.scroll_log_down(1),
        _ => {}
    }
}

fn handle_report_mode(app: &mut App, key: KeyEvent) -> Result<()> {
    if matches!(key.code, KeyCode::Esc | KeyCode::Char('q')) {
        app.close_report();
        return Ok(());
    }
    let mut confirm = false;
    if let Some(Report::Duplicates(report)) = &mut app.report {
        match key.code {
            KeyCode::Up | KeyCode::Char('k') => report.move_cursor(-1),
            KeyCode::Down | KeyCode::Char('j') => report.move_cursor(1),
            KeyCode::Tab | KeyCode::Char(' ') => report.cycle_keep(),
            KeyCode::Char('a') => {
                report.action = match report.action {
                    DupAction::Disable => DupAction::Remove,
                    DupAction::Remove => DupAction::Disable,
                };
            }
            KeyCode::Enter => confirm = true,
            _ => {}
        }
    }
    if confirm {
        app.confirm_duplicates();
    }
    Ok(())
}

fn handle_input_mode(
    app: &mut App,
    key: KeyEvent,
    buffer: &mut String,
    purpose: InputPurpose,
    prompt: String,
) -> Result<()> {
    match key.code {
        KeyCode::Esc => {
            app.cancel_input(&purpose);
            return Ok(());
        }
        KeyCode::Enter => {
            let value = std::mem::take(buffer);
            if let Err(err) = app.handle_submit(purpose, value) {
                app.status = format!("Action failed: {err}");
                app.log_error(format!("Action failed: {err}"));
            }
            return Ok(());
        }
        KeyCode::Char(c) => {
            if key.modifiers.contains(KeyModifiers::CONTROL)
                || key.modifiers.contains(KeyModifiers::ALT)
            {
                return keep_editing(app, buffer, purpose, prompt);
            }
            buffer.push(c);
        }
        KeyCode::Backspace => {
            buffer.pop();
        }
        _ => {}
    }
    keep_editing(app, buffer, purpose, prompt)
}

fn keep_editing(
    app: &mut App,
    buffer: &mut String,
    purpose: InputPurpose,
    prompt: String,
) -> Result<()> {
    app.input_mode = InputMode::Editing {
        prompt,
        buffer: std::mem::take(buffer),
        purpose,
    };
    Ok(())
}

fn draw(frame: &mut Frame<'_>, app: &mut App) {
    let area = frame.size();
    let theme = Theme::new();
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(2),
            Constraint::Min(8),
            Constraint::Length(LOG_HEIGHT),
            Constraint::Length(1),
        ])
        .split(area);

    draw_header(frame, app, &theme, chunks[0]);

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(chunks[1]);
    draw_grid(frame, app, &theme, body[0]);
    if let Some(report) = &app.report {
        draw_report(frame, report, &theme, body[1]);
    } else {
        draw_preview(frame, app, &theme, body[1]);
    }

    let log_block = theme
        .panel("Log".to_string(), app.focus == Focus::Log)
        .style(Style::default().bg(theme.log_bg));
    let log_inner = log_block.inner(chunks[2]);
    let log = Paragraph::new(build_log_lines(app, &theme, log_inner.height as usize))
        .style(Style::default().fg(theme.text).bg(theme.log_bg))
        .block(log_block);
    frame.render_widget(log, chunks[2]);

    let status = Paragraph::new(status_bar_line(app, chunks[3].width))
        .style(Style::default().fg(theme.muted).bg(theme.header_bg));
    frame.render_widget(status, chunks[3]);

    if app.dialog.is_some() {
        draw_dialog(frame, app, &theme);
    }
    draw_toast(frame, app, &theme, chunks[1]);
}

fn draw_header(frame: &mut Frame<'_>, app: &App, theme: &Theme, area: Rect) {
    let total = app.grid.folders().len();
    let enabled = app.grid.folders().iter().filter(|f| f.enabled).count();
    let location = app
        .nav
        .sub_path_string()
        .map(|sub| format!("/{sub}"))
        .unwrap_or_default();
    let mut spans = vec![
        Span::styled(
            "modnest",
            Style::default().fg(theme.accent).add_modifier(Modifier::BOLD),
        ),
        Span::raw("  "),
        Span::styled(app.nav.game_id.display_name(), Style::default().fg(theme.text)),
        Span::styled(location, Style::default().fg(theme.muted)),
        Span::raw("   "),
        Span::styled("Mods: ", Style::default().fg(theme.muted)),
        Span::styled(total.to_string(), Style::default().fg(theme.text)),
        Span::raw("   "),
        Span::styled("Enabled: ", Style::default().fg(theme.muted)),
        Span::styled(
            enabled.to_string(),
            Style::default().fg(theme.success).add_modifier(Modifier::BOLD),
        ),
    ];
    if app.safe_mode.is_enabled() {
        spans.push(Span::styled(
            "  SAFE",
            Style::default().fg(theme.warning).add_modifier(Modifier::BOLD),
        ));
    }
    if !app.grid.filter.is_empty() {
        spans.push(Span::styled(
            format!("  filter: {}", app.grid.filter),
            Style::default().fg(theme.muted),
        ));
    }
    let header = Paragraph::new(vec![Line::from(spans)])
        .style(Style::default().bg(theme.header_bg))
        .alignment(Alignment::Center);
    frame.render_widget(header, area);
}

fn draw_grid(frame: &mut Frame<'_>, app: &mut App, theme: &Theme, area: Rect) {
    let block = theme.panel("Mods".to_string(), app.focus == Focus::Grid);
    let inner = block.inner(area);
    frame.render_widget(block, area);

    app.grid.columns = (inner.width / CELL_WIDTH).max(1) as usize;
    let visible_count = app.grid.visible_indices().len();
    if visible_count == 0 {
        let empty = Paragraph::new(Span::styled(
            "No mods here.",
            Style::default().fg(theme.muted),
        ));
        frame.render_widget(empty, inner);
        return;
    }

    let window = app.grid.visible_window(inner.height as usize, visible_count);
    let columns = app.grid.columns;
    let cursor = app.grid.cursor;
    let visible = app.grid.visible();
    let cell_width = (inner.width as usize / columns).max(1);
    let mut lines = Vec::new();
    let positions: Vec<usize> = window.collect();
    for row in positions.chunks(columns) {
        let mut spans = Vec::new();
        for pos in row {
            let folder = visible[*pos];
            let marker = if folder.enabled { "●" } else { "○" };
            let star = if folder.is_favorite { "★" } else { " " };
            let mut label = format!("{marker}{star} {}", folder.name);
            truncate_to(&mut label, cell_width.saturating_sub(1));
            let mut style = if folder.enabled {
                Style::default().fg(theme.text)
            } else {
                Style::default().fg(theme.muted)
            };
            if *pos == cursor {
                style = style
                    .bg(theme.accent_soft)
                    .add_modifier(Modifier::BOLD);
            }
            if app.selection.is_selected(&folder.path) && *pos != cursor {
                style = style.add_modifier(Modifier::UNDERLINED);
            }
            spans.push(Span::styled(
                format!("{label:<width$}", width = cell_width),
                style,
            ));
        }
        lines.push(Line::from(spans));
    }
    frame.render_widget(Paragraph::new(lines), inner);
}

fn draw_preview(frame: &mut Frame<'_>, app: &App, theme: &Theme, area: Rect) {
    let dirty = app.panel.has_unsaved_changes();
    let title = if dirty {
        "Preview *".to_string()
    } else {
        "Preview".to_string()
    };
    let block = theme.panel(title, app.focus == Focus::Preview);
    let inner = block.inner(area);

    let lines = build_preview_lines(app, theme);
    let height = inner.height as usize;
    let cursor_line = app.preview_cursor + preview_header_len(app);
    let offset = cursor_line.saturating_sub(height.saturating_sub(1));
    let paragraph = Paragraph::new(lines)
        .block(block)
        .wrap(Wrap { trim: false })
        .scroll((offset as u16, 0));
    frame.render_widget(paragraph, area);
}

fn preview_header_len(app: &App) -> usize {
    if app.panel.active_path().is_none() {
        0
    } else {
        2
    }
}

fn build_preview_lines(app: &App, theme: &Theme) -> Vec<Line<'static>> {
    let Some(active) = app.panel.active_path() else {
        return vec![Line::from(Span::styled(
            "Select a mod to see its details.",
            Style::default().fg(theme.muted),
        ))];
    };

    let mut lines = vec![
        Line::from(Span::styled(
            active.display().to_string(),
            Style::default().fg(theme.muted),
        )),
        Line::from(""),
    ];
    let rows = app.preview_rows();
    for (idx, row) in rows.iter().enumerate() {
        let selected = idx == app.preview_cursor && app.focus == Focus::Preview;
        let mut line = match row {
            PreviewRow::Metadata(field) => {
                let value = app.panel.metadata_value(*field).to_string();
                Line::from(vec![
                    Span::styled(
                        format!("{:<12}", field.label()),
                        Style::default().fg(theme.muted),
                    ),
                    Span::styled(value, Style::default().fg(theme.text)),
                ])
            }
            PreviewRow::Group(group_id) => {
                let group = app.panel.groups().iter().find(|g| &g.id == group_id);
                let label = group
                    .map(|g| format!("[{}] {}", g.section_name, g.file_name))
                    .unwrap_or_default();
                let arrow = if app.panel.is_expanded(group_id) { "▾" } else { "▸" };
                let mark = if app.panel.is_section_dirty(group_id) { " *" } else { "" };
                Line::from(Span::styled(
                    format!("{arrow} {label}{mark}"),
                    Style::default().fg(theme.accent).add_modifier(Modifier::BOLD),
                ))
            }
            PreviewRow::Field(field_id) => {
                let field = app.panel.fields().iter().find(|f| &f.id == field_id);
                let label = field.map(|f| f.label.clone()).unwrap_or_default();
                let value = app.panel.draft_value(field_id).unwrap_or_default().to_string();
                let dirty = app.panel.is_field_dirty(field_id);
                let color = if dirty { theme.warning } else { theme.text };
                Line::from(vec![
                    Span::raw("    "),
                    Span::styled(format!("{label} = "), Style::default().fg(theme.muted)),
                    Span::styled(value, Style::default().fg(color)),
                    Span::styled(if dirty { " *" } else { "" }, Style::default().fg(theme.warning)),
                ])
            }
        };
        if selected {
            line = line.style(Style::default().bg(theme.accent_soft));
        }
        lines.push(line);
    }

    let mut notes = Vec::new();
    for (file_name, slot) in app.panel.document_slots() {
        match slot {
            DocumentSlot::Loading => notes.push((format!("{file_name}: loading"), theme.muted)),
            DocumentSlot::Failed(err) => notes.push((format!("{file_name}: {err}"), theme.error)),
            DocumentSlot::Ready(document) if document.mode == IniParseMode::RawFallback => {
                notes.push((format!("{file_name}: not editable"), theme.muted))
            }
            DocumentSlot::Ready(_) => {}
        }
    }
    if let Some(err) = app.panel.load_error() {
        notes.push((err.to_string(), theme.error));
    }
    if !app.panel.previews().is_empty() {
        let names: Vec<&str> = app
            .panel
            .previews()
            .iter()
            .map(|p| p.file_name.as_str())
            .collect();
        notes.push((format!("Previews: {}", names.join(", ")), theme.muted));
    }
    if !notes.is_empty() {
        lines.push(Line::from(""));
        for (note, color) in notes {
            lines.push(Line::from(Span::styled(note, Style::default().fg(color))));
        }
    }
    lines
}

fn draw_report(frame: &mut Frame<'_>, report: &Report, theme: &Theme, area: Rect) {
    let (title, lines) = match report {
        Report::Conflicts(report) => {
            let mut lines: Vec<Line> = report
                .lines()
                .into_iter()
                .map(|line| Line::from(Span::styled(line, Style::default().fg(theme.text))))
                .collect();
            if lines.is_empty() {
                lines.push(Line::from(Span::styled(
                    "No conflicts.",
                    Style::default().fg(theme.muted),
                )));
            }
            ("Shader conflicts".to_string(), lines)
        }
        Report::Duplicates(report) => {
            let action = match report.action {
                DupAction::Disable => "disable",
                DupAction::Remove => "remove",
            };
            let mut lines = vec![Line::from(Span::styled(
                format!("Others will be: {action}  (a to switch, Enter to apply)"),
                Style::default().fg(theme.muted),
            ))];
            for (idx, group) in report.groups().iter().enumerate() {
                let style = if idx == report.cursor {
                    Style::default().fg(theme.accent).add_modifier(Modifier::BOLD)
                } else {
                    Style::default().fg(theme.text)
                };
                lines.push(Line::from(Span::styled(
                    format!("{:.0}%  {}", group.confidence * 100.0, group.group_id),
                    style,
                )));
                let kept = report.kept_index(&group.group_id);
                for (member_idx, member) in group.members.iter().enumerate() {
                    let (mark, color) = if Some(member_idx) == kept {
                        ("keep", theme.success)
                    } else {
                        (action, theme.warning)
                    };
                    lines.push(Line::from(vec![
                        Span::styled(format!("    {mark:<8}"), Style::default().fg(color)),
                        Span::styled(member.name.clone(), Style::default().fg(theme.text)),
                    ]));
                }
            }
            ("Duplicates".to_string(), lines)
        }
    };
    let paragraph = Paragraph::new(lines)
        .block(theme.panel(title, true))
        .wrap(Wrap { trim: false });
    frame.render_widget(paragraph, area);
}

fn status_bar_line(app: &App, width: u16) -> String {
    let width = width as usize;
    let (left, right) = match &app.input_mode {
        InputMode::Normal => (format!("Status: {}", app.status), hint(app).to_string()),
        InputMode::Editing {
            prompt,
            buffer,
            purpose,
        } => {
            let shown = if *purpose == InputPurpose::Pin {
                "*".repeat(buffer.chars().count())
            } else {
                buffer.clone()
            };
            let mut left = format!("{prompt} {shown}");
            if *purpose == InputPurpose::Pin {
                if let Some(err) = app.safe_mode.error() {
                    left.push_str(&format!("  ({err})"));
                }
            }
            (left, "Enter confirm | Esc cancel".to_string())
        }
    };

    if width == 0 {
        return String::new();
    }

    let left_len = left.chars().count();
    let right_len = right.chars().count();
    if left_len + right_len + 1 > width {
        let mut line = left;
        truncate_to(&mut line, width);
        return line;
    }

    let spaces = width - left_len - right_len;
    format!("{left}{}{}", " ".repeat(spaces), right)
}

fn hint(app: &App) -> &'static str {
    if app.report.is_some() {
        return "Esc close";
    }
    match app.focus {
        Focus::Grid => "Space toggle | f fav | e only | r random | / filter | Tab focus",
        Focus::Preview => "Enter edit/expand | Ctrl+S save | X discard | Tab focus",
        Focus::Log => "Up/Down scroll | Tab focus",
    }
}

fn build_log_lines(app: &App, theme: &Theme, height: usize) -> Vec<Line<'static>> {
    if height == 0 {
        return Vec::new();
    }

    if app.logs.is_empty() {
        return vec![Line::from(Span::styled(
            "No recent events.",
            Style::default().fg(theme.muted),
        ))];
    }

    let total = app.logs.len();
    let view = height.max(1);
    let max_scroll = total.saturating_sub(view);
    let scroll = app.log_scroll.min(max_scroll);
    let start = total.saturating_sub(view + scroll);
    let end = (start + view).min(total);

    app.logs[start..end]
        .iter()
        .map(|entry| {
            let (label, color) = match entry.level {
                LogLevel::Info => ("[i]", theme.accent),
                LogLevel::Warn => ("[!]", theme.warning),
                LogLevel::Error => ("[x]", theme.error),
            };
            Line::from(vec![
                Span::styled(label, Style::default().fg(color).add_modifier(Modifier::BOLD)),
                Span::raw(" "),
                Span::styled(entry.message.clone(), Style::default().fg(theme.text)),
            ])
        })
        .collect()
}

fn draw_dialog(frame: &mut Frame<'_>, app: &App, theme: &Theme) {
    let Some(dialog) = &app.dialog else {
        return;
    };

    let area = frame.size();
    let message_lines: Vec<Line> = dialog
        .message
        .lines()
        .map(|line| Line::from(line.to_string()))
        .collect();
    let content_height = message_lines.len().max(1) as u16;
    let height = (content_height + 6).max(7).min(area.height.saturating_sub(2));
    let width = area.width.saturating_mul(2) / 3;
    let width = width.clamp(34, area.width.saturating_sub(2).max(34));
    let x = area.x + (area.width.saturating_sub(width)) / 2;
    let y = area.y + (area.height.saturating_sub(height)) / 2;
    let dialog_area = Rect::new(x, y, width.min(area.width), height);

    let button = |label: &str, choice: DialogChoice, color: Color| {
        let style = if dialog.choice == choice {
            Style::default()
                .fg(Color::Black)
                .bg(color)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(theme.text)
        };
        Span::styled(format!(" {label} "), style)
    };

    let mut buttons = vec![
        Span::raw(" "),
        button(&dialog.yes_label, DialogChoice::Yes, theme.accent),
        Span::raw("   "),
        button(&dialog.no_label, DialogChoice::No, theme.warning),
    ];
    if let Some(cancel) = &dialog.cancel_label {
        buttons.push(Span::raw("   "));
        buttons.push(button(cancel, DialogChoice::Cancel, theme.muted));
    }

    let mut lines = Vec::new();
    lines.push(Line::from(Span::styled(
        dialog.title.clone(),
        Style::default().fg(theme.accent).add_modifier(Modifier::BOLD),
    )));
    lines.push(Line::from(""));
    lines.extend(message_lines);
    lines.push(Line::from(""));
    lines.push(Line::from(buttons));

    frame.render_widget(Clear, dialog_area);
    let dialog_block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(theme.accent_soft))
        .style(Style::default().bg(theme.header_bg));
    let dialog_widget = Paragraph::new(lines)
        .block(dialog_block)
        .style(Style::default().fg(theme.text))
        .alignment(Alignment::Center);
    frame.render_widget(dialog_widget, dialog_area);
}

fn render_toast(frame: &mut Frame<'_>, theme: &Theme, body_area: Rect, message: &str, level: ToastLevel) {
    let mut message = message.to_string();
    let max_width = body_area.width.saturating_sub(4).max(24);
    truncate_to(&mut message, max_width.saturating_sub(4) as usize);
    let width = (message.chars().count() as u16 + 4).clamp(24, max_width);
    let x = body_area.x + (body_area.width.saturating_sub(width)) / 2;
    let toast_area = Rect::new(x, body_area.y + 1, width.min(body_area.width), 3);

    let border = match level {
        ToastLevel::Info => theme.accent,
        ToastLevel::Warn => theme.warning,
        ToastLevel::Error => theme.error,
    };

    frame.render_widget(Clear, toast_area);
    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(border))
        .style(Style::default().bg(theme.header_bg));
    let content = Paragraph::new(message)
        .block(block)
        .style(Style::default().fg(theme.text))
        .alignment(Alignment::Center);
    frame.render_widget(content, toast_area);
}

fn draw_toast(frame: &mut Frame<'_>, app: &App, theme: &Theme, body_area: Rect) {
    if app.dialog.is_some() {
        return;
    }
    let Some(toast) = app.toasts.latest() else {
        return;
    };
    render_toast(frame, theme, body_area, &toast.message, toast.level);
}

fn truncate_to(value: &mut String, max_chars: usize) {
    if value.chars().count() <= max_chars {
        return;
    }
    let keep = max_chars.saturating_sub(3);
    let cut = value
        .char_indices()
        .nth(keep)
        .map(|(idx, _)| idx)
        .unwrap_or(value.len());
    value.truncate(cut);
    value.push_str("...");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_char_boundaries() {
        let mut value = "Raiden Shogun ★ Outfit".to_string();
        truncate_to(&mut value, 10);
        assert_eq!(value, "Raiden ...");

        let mut short = "ok".to_string();
        truncate_to(&mut short, 10);
        assert_eq!(short, "ok");
    }
}
