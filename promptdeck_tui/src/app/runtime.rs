use anyhow::Result;
use crossterm::event::{
    self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseButton, MouseEvent,
    MouseEventKind,
};
use promptdeck_core::ExpandMode;
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use std::io::Stdout;
use std::time::{Duration, Instant};

use crate::app::actions::perform_footer_action;
use crate::app::editor::{
    char_count, delete_char_at_cursor, delete_char_before_cursor, delete_word_before_cursor,
    insert_char_at_cursor, point_in_rect, set_cursor_from_click,
};
use crate::app::state::{App, AppState, FocusArea, FooterAction};
use crate::ui::main_view::ui;

const INPUT_PREFIX_LEN: u16 = 3;

pub async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    app: &mut App,
) -> Result<()> {
    loop {
        app.on_tick(Instant::now());
        // Cursor blink in the chat input.
        if app.state() == AppState::Chat && app.tick_count % 4 == 0 {
            app.dirty = true;
        }

        if app.dirty || app.is_busy() {
            terminal.draw(|f| ui(f, app))?;
            app.dirty = false;
        }

        // Animation frames need a short poll; idle screens can wait.
        let poll_ms = if app.is_busy() { 16 } else { 200 };
        if event::poll(Duration::from_millis(poll_ms))? {
            app.dirty = true;
            if handle_runtime_event(app, event::read()?, Instant::now()).await? {
                tracing::info!("quit requested");
                return Ok(());
            }
        }
    }
}

async fn handle_runtime_event(app: &mut App, event: Event, now: Instant) -> Result<bool> {
    match event {
        Event::Key(key) if key.kind == KeyEventKind::Press => handle_key_press(app, key, now).await,
        Event::Paste(text) => {
            handle_paste(app, &text);
            Ok(false)
        }
        Event::Mouse(mouse) => handle_mouse_event(app, mouse, now).await,
        _ => Ok(false),
    }
}

async fn handle_key_press(app: &mut App, key: KeyEvent, now: Instant) -> Result<bool> {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    if ctrl && key.code == KeyCode::Char('c') {
        return Ok(true);
    }

    // Focus switching / button navigation.
    match key.code {
        KeyCode::Tab => {
            if app.focus == FocusArea::Content {
                app.focus = FocusArea::FooterButtons;
                app.footer_focus = 0;
            } else if !app.footer_buttons.is_empty() {
                app.footer_focus += 1;
                if app.footer_focus >= app.footer_buttons.len() {
                    app.footer_focus = 0;
                    app.focus = FocusArea::Content;
                }
            }
            return Ok(false);
        }
        KeyCode::BackTab => {
            app.focus = FocusArea::Content;
            return Ok(false);
        }
        KeyCode::Left if app.focus == FocusArea::FooterButtons => {
            if !app.footer_buttons.is_empty() {
                app.footer_focus = if app.footer_focus == 0 {
                    app.footer_buttons.len() - 1
                } else {
                    app.footer_focus - 1
                };
            }
            return Ok(false);
        }
        KeyCode::Right if app.focus == FocusArea::FooterButtons => {
            if !app.footer_buttons.is_empty() {
                app.footer_focus = (app.footer_focus + 1) % app.footer_buttons.len();
            }
            return Ok(false);
        }
        KeyCode::Enter | KeyCode::Char(' ') if app.focus == FocusArea::FooterButtons => {
            if let Some(action) = app.footer_buttons.get(app.footer_focus).map(|b| b.action) {
                return perform_footer_action(app, action, now).await;
            }
            return Ok(false);
        }
        KeyCode::Esc if app.focus == FocusArea::FooterButtons => {
            app.focus = FocusArea::Content;
            return Ok(false);
        }
        _ => {}
    }

    match app.state() {
        AppState::Grid => handle_grid_key(app, key, now).await,
        AppState::Details => handle_details_key(app, key, now).await,
        AppState::Chat => handle_chat_key(app, key, now).await,
        AppState::ChainPicker => {
            match key.code {
                KeyCode::Up | KeyCode::Char('k') => app.move_chain_selection(-1),
                KeyCode::Down | KeyCode::Char('j') => app.move_chain_selection(1),
                KeyCode::Enter => app.start_selected_chain(now),
                KeyCode::Char(c @ '1'..='9') => {
                    let idx = c as usize - '1' as usize;
                    if idx < app.controller.chain_registry().chains().len() {
                        app.chain_selected = idx;
                        app.start_selected_chain(now);
                    }
                }
                KeyCode::Esc | KeyCode::Char('q') => app.close_overlay(),
                _ => {}
            }
            Ok(false)
        }
        AppState::ConfirmCancelChain => {
            match key.code {
                KeyCode::Char('y') | KeyCode::Char('Y') => app.resolve_cancel_chain(true),
                KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                    app.resolve_cancel_chain(false)
                }
                _ => {}
            }
            Ok(false)
        }
    }
}

async fn handle_grid_key(app: &mut App, key: KeyEvent, now: Instant) -> Result<bool> {
    let action = match key.code {
        KeyCode::Left | KeyCode::Char('h') => {
            app.move_selection(-1, 0);
            None
        }
        KeyCode::Right => {
            app.move_selection(1, 0);
            None
        }
        KeyCode::Up | KeyCode::Char('k') => {
            app.move_selection(0, -1);
            None
        }
        KeyCode::Down | KeyCode::Char('j') => {
            app.move_selection(0, 1);
            None
        }
        KeyCode::Home => {
            app.selected = 0;
            None
        }
        KeyCode::End => {
            app.selected = app.controller.cards().len().saturating_sub(1);
            None
        }
        KeyCode::Enter | KeyCode::Char('t') => Some(FooterAction::TryPrompt),
        KeyCode::Char('d') => Some(FooterAction::ViewDetails),
        KeyCode::Char('w') => Some(FooterAction::OpenChains),
        KeyCode::Char('n') => Some(FooterAction::NextStep),
        KeyCode::Char('x') => Some(FooterAction::CancelChain),
        KeyCode::Char('c') => Some(FooterAction::ClearRecent),
        KeyCode::Char('l') => Some(FooterAction::ToggleLog),
        KeyCode::Char('q') | KeyCode::Esc => Some(FooterAction::Quit),
        _ => None,
    };
    match action {
        Some(action) => perform_footer_action(app, action, now).await,
        None => Ok(false),
    }
}

async fn handle_details_key(app: &mut App, key: KeyEvent, now: Instant) -> Result<bool> {
    match key.code {
        KeyCode::Enter | KeyCode::Char('t') => {
            return perform_footer_action(app, FooterAction::SwitchToChat, now).await;
        }
        KeyCode::Esc | KeyCode::Char('q') => {
            return perform_footer_action(app, FooterAction::Close, now).await;
        }
        KeyCode::Up | KeyCode::Char('k') => app.details_scroll = app.details_scroll.saturating_sub(1),
        KeyCode::Down | KeyCode::Char('j') => {
            app.details_scroll = app.details_scroll.saturating_add(1)
        }
        KeyCode::PageUp => app.details_scroll = app.details_scroll.saturating_sub(10),
        KeyCode::PageDown => app.details_scroll = app.details_scroll.saturating_add(10),
        KeyCode::Home => app.details_scroll = 0,
        _ => {}
    }
    Ok(false)
}

fn scroll_chat_up(app: &mut App, rows: u16) {
    app.follow_chat = false;
    app.chat_scroll = app.chat_scroll.saturating_sub(rows);
}

fn scroll_chat_down(app: &mut App, rows: u16) {
    app.chat_scroll = app.chat_scroll.saturating_add(rows).min(app.chat_max_scroll);
    if app.chat_scroll >= app.chat_max_scroll {
        app.follow_chat = true;
    }
}

async fn handle_chat_key(app: &mut App, key: KeyEvent, now: Instant) -> Result<bool> {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    let alt = key.modifiers.contains(KeyModifiers::ALT);

    match key.code {
        KeyCode::Char('e') if ctrl => {
            return perform_footer_action(app, FooterAction::Export, now).await;
        }
        KeyCode::Char('g') if ctrl => {
            return perform_footer_action(app, FooterAction::SwitchToDetails, now).await;
        }
        KeyCode::Char('n') if ctrl => {
            return perform_footer_action(app, FooterAction::NextStep, now).await;
        }
        KeyCode::Char('x') if ctrl => {
            return perform_footer_action(app, FooterAction::CancelChain, now).await;
        }
        KeyCode::Char('w') if ctrl => {
            delete_word_before_cursor(&mut app.input, &mut app.input_cursor);
        }
        KeyCode::Char('u') if ctrl => {
            app.input.clear();
            app.input_cursor = 0;
        }
        // Digits pick a suggestion only while the input is empty; Alt+digit always does.
        KeyCode::Char(c @ '1'..='3') if alt || app.input.is_empty() => {
            let idx = c as usize - '1' as usize;
            let available = app
                .controller
                .expanded_card()
                .and_then(|card| card.session())
                .map(|s| s.suggestions().len())
                .unwrap_or(0);
            if idx < available {
                return perform_footer_action(app, FooterAction::Suggestion(idx), now).await;
            }
            if !alt {
                insert_char_at_cursor(&mut app.input, &mut app.input_cursor, c);
            }
        }
        KeyCode::Enter => {
            return perform_footer_action(app, FooterAction::Send, now).await;
        }
        KeyCode::Esc => {
            return perform_footer_action(app, FooterAction::Close, now).await;
        }
        KeyCode::Left => {
            app.input_cursor = app.input_cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            if app.input_cursor < char_count(&app.input) {
                app.input_cursor += 1;
            }
        }
        KeyCode::Home => app.input_cursor = 0,
        KeyCode::End => app.input_cursor = char_count(&app.input),
        KeyCode::Up => scroll_chat_up(app, 1),
        KeyCode::Down => scroll_chat_down(app, 1),
        KeyCode::PageUp => scroll_chat_up(app, 10),
        KeyCode::PageDown => scroll_chat_down(app, 10),
        KeyCode::Backspace => {
            delete_char_before_cursor(&mut app.input, &mut app.input_cursor);
        }
        KeyCode::Delete => {
            delete_char_at_cursor(&mut app.input, &mut app.input_cursor);
        }
        KeyCode::Char(c) if !ctrl => {
            insert_char_at_cursor(&mut app.input, &mut app.input_cursor, c);
            app.notice = None;
        }
        _ => {}
    }
    Ok(false)
}

fn handle_paste(app: &mut App, text: &str) {
    if app.state() != AppState::Chat {
        return;
    }
    for ch in text.chars() {
        insert_char_at_cursor(&mut app.input, &mut app.input_cursor, ch);
    }
    app.notice = None;
}

async fn handle_mouse_event(app: &mut App, mouse: MouseEvent, now: Instant) -> Result<bool> {
    let state = app.state();
    match mouse.kind {
        MouseEventKind::ScrollUp => match state {
            AppState::Grid => app.move_selection(0, -1),
            AppState::Details => app.details_scroll = app.details_scroll.saturating_sub(3),
            AppState::Chat => scroll_chat_up(app, 3),
            AppState::ChainPicker => app.move_chain_selection(-1),
            AppState::ConfirmCancelChain => {}
        },
        MouseEventKind::ScrollDown => match state {
            AppState::Grid => app.move_selection(0, 1),
            AppState::Details => app.details_scroll = app.details_scroll.saturating_add(3),
            AppState::Chat => scroll_chat_down(app, 3),
            AppState::ChainPicker => app.move_chain_selection(1),
            AppState::ConfirmCancelChain => {}
        },
        MouseEventKind::Down(MouseButton::Left) => {
            // Click footer buttons if mouse is within the rect.
            let clicked = app
                .footer_buttons
                .iter()
                .enumerate()
                .find(|(_, btn)| point_in_rect(btn.rect, mouse.column, mouse.row))
                .map(|(idx, btn)| (idx, btn.action));
            if let Some((idx, action)) = clicked {
                app.focus = FocusArea::FooterButtons;
                app.footer_focus = idx;
                return perform_footer_action(app, action, now).await;
            }
            app.focus = FocusArea::Content;

            match state {
                AppState::Chat => {
                    if let Some(area) = app.input_rect {
                        if point_in_rect(area, mouse.column, mouse.row) {
                            set_cursor_from_click(
                                &app.input,
                                &mut app.input_cursor,
                                area,
                                mouse.column,
                                INPUT_PREFIX_LEN,
                            );
                        }
                    }
                }
                AppState::Grid | AppState::Details => {
                    let recent = app
                        .recent_hitboxes
                        .iter()
                        .find(|hit| point_in_rect(hit.rect, mouse.column, mouse.row))
                        .map(|hit| hit.prompt_id);
                    if let Some(id) = recent {
                        app.open_card(id, ExpandMode::Chat, now);
                        return Ok(false);
                    }

                    let card = app
                        .card_hitboxes
                        .iter()
                        .find(|hit| point_in_rect(hit.rect, mouse.column, mouse.row))
                        .map(|hit| hit.prompt_id);
                    let expanded = app.controller.expanded_card().map(|c| c.prompt_id());
                    if let Some(id) = card {
                        if expanded == Some(id) {
                            return Ok(false);
                        }
                        if app.selected_prompt_id() == Some(id) {
                            app.open_card(id, ExpandMode::Chat, now);
                        } else {
                            app.select_prompt(id);
                        }
                    }
                }
                AppState::ChainPicker | AppState::ConfirmCancelChain => {}
            }
        }
        _ => {}
    }

    Ok(false)
}
