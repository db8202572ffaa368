use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Scrollbar, ScrollbarOrientation, ScrollbarState, Wrap},
    Frame,
};
use std::time::Instant;

use promptdeck_core::layout::Rect as CardRect;
use promptdeck_core::{Card, CardMode, ChatSession, GridMetrics, PromptRecord, Sender, StepStatus};

use crate::app::editor::split_line_at_char;
use crate::app::state::{App, AppState, CardHitbox, FocusArea, FooterAction, FooterButton};
use crate::theme::Theme;
use crate::ui::markup::render_markup;

const INPUT_PREFIX: &str = " > ";

pub fn ui(f: &mut Frame, app: &mut App) {
    let area = f.area();
    let state = app.state();
    let show_chain = app.controller.active_chain().is_some();
    let show_recent = app.controller.recent().is_visible() && state != AppState::Chat;

    let main_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints(main_layout_constraints(area, show_chain, show_recent, app.show_log))
        .split(area);

    f.render_widget(Block::default().style(app.theme.base_style), area);
    render_header(f, app, main_layout[0]);
    if show_chain {
        render_chain_bar(f, app, main_layout[1]);
    }
    app.recent_hitboxes.clear();
    if show_recent {
        render_recent_strip(f, app, main_layout[2]);
    }
    render_cards(f, app, main_layout[3]);
    render_button_bar(f, app, main_layout[4]);
    if app.show_log {
        render_log_pane(f, app, main_layout[5]);
    }
    render_footer(f, app, main_layout[6], state);

    match state {
        AppState::ChainPicker => render_chain_picker(f, app, area),
        AppState::ConfirmCancelChain => render_cancel_confirm(f, app, area),
        _ => {}
    }
}

fn main_layout_constraints(
    area: Rect,
    show_chain: bool,
    show_recent: bool,
    show_log: bool,
) -> [Constraint; 7] {
    let short_height = area.height < 30;
    [
        Constraint::Length(3),                                     // 1. Header
        Constraint::Length(if show_chain { 3 } else { 0 }),        // 2. Workflow progress
        Constraint::Length(if show_recent { 3 } else { 0 }),       // 3. Recent prompts
        Constraint::Min(4),                                        // 4. Cards
        Constraint::Length(1),                                     // 5. Buttons
        Constraint::Length(match (show_log, short_height) {        // 6. Log
            (false, _) => 0,
            (true, true) => 4,
            (true, false) => 7,
        }),
        Constraint::Length(3),                                     // 7. Footer
    ]
}

fn render_header(f: &mut Frame, app: &App, area: Rect) {
    let narrow = area.width < 80;
    let header_text = if narrow {
        Line::from(vec![
            Span::styled(" PROMPTDECK ", app.theme.header_title_style),
            Span::styled(
                format!(" {} prompts ", app.controller.catalog().len()),
                app.theme.header_subtitle_style,
            ),
        ])
    } else {
        Line::from(vec![
            Span::styled(" P R O M P T D E C K ", app.theme.header_title_style),
            Span::styled(
                format!(
                    " // EDUCATIONAL PROMPT LIBRARY · {} PROMPTS ",
                    app.controller.catalog().len()
                ),
                app.theme.header_subtitle_style,
            ),
        ])
    };
    let header = Paragraph::new(header_text).style(app.theme.base_style).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(app.theme.border_style)
            .title(format!(" RELAY: {} ", app.config.client.relay_url)),
    );
    f.render_widget(header, area);
}

fn render_chain_bar(f: &mut Frame, app: &App, area: Rect) {
    let Some(chain) = app.controller.active_chain() else {
        return;
    };
    let mut spans = vec![Span::raw(" ")];
    let progress = app.controller.chain_progress();
    let last = progress.len().saturating_sub(1);
    for step in &progress {
        let (marker, style) = match step.status {
            StepStatus::Completed => ("✓", app.theme.step_completed_style),
            StepStatus::Current => ("▶", app.theme.step_current_style),
            StepStatus::Upcoming => ("○", app.theme.step_upcoming_style),
        };
        spans.push(Span::styled(format!(" {} {} ", marker, step.title), style));
        if step.index < last {
            spans.push(Span::styled(" → ", app.theme.border_style));
        }
    }

    let title = format!(
        " WORKFLOW: {} ({}/{}) ",
        chain.name,
        (chain.current_step + 1).min(chain.steps.len()),
        chain.steps.len()
    );
    let bar = Paragraph::new(Line::from(spans)).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(app.theme.border_style)
            .title(Span::styled(title, app.theme.header_title_style)),
    );
    f.render_widget(bar, area);
}

fn render_recent_strip(f: &mut Frame, app: &mut App, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(app.theme.border_style)
        .title(Span::styled(" RECENT ", app.theme.header_title_style));
    let inner = block.inner(area);
    f.render_widget(block, area);

    let mut spans = Vec::new();
    let mut x = inner.x;
    let right = inner.x.saturating_add(inner.width);
    for entry in app.controller.recent().entries() {
        let label = format!(" {} ", truncate_with_ellipsis(&entry.prompt.title, 28));
        let width = label.chars().count() as u16;
        if x.saturating_add(width) > right {
            break;
        }
        app.recent_hitboxes.push(CardHitbox {
            rect: Rect::new(x, inner.y, width, 1),
            prompt_id: entry.prompt.id,
        });
        spans.push(Span::styled(label, app.theme.card_tag_style));
        spans.push(Span::raw(" "));
        x = x.saturating_add(width + 1);
    }
    f.render_widget(Paragraph::new(Line::from(spans)), inner);
}

fn grid_metrics(app: &App, area: Rect) -> GridMetrics {
    let defaults = GridMetrics::default();
    GridMetrics {
        columns: app.config.client.columns,
        details_height: defaults.details_height.min(area.height as f32).max(8.0),
        ..defaults
    }
    .with_viewport(area.width as f32, area.height as f32)
}

fn render_cards(f: &mut Frame, app: &mut App, area: Rect) {
    app.controller.set_metrics(grid_metrics(app, area));
    app.card_hitboxes.clear();
    app.input_rect = None;

    let now = Instant::now();
    let rects = app.controller.card_rects(now);
    let animating = app.controller.is_animating();
    update_grid_scroll(app, &rects, area);

    let dimming = app
        .controller
        .expanded_card()
        .map(Card::dims_siblings)
        .unwrap_or(false);

    let mut chat_card: Option<(usize, CardRect)> = None;
    for (idx, rect) in rects.iter().enumerate() {
        let Some(card) = app.controller.cards().get(idx) else {
            continue;
        };
        if card.mode() == CardMode::Chat {
            chat_card = Some((idx, *rect));
            continue;
        }
        let Some(screen) = to_screen(rect, area, app.grid_scroll) else {
            continue;
        };
        let Some(prompt) = app.controller.catalog().get(card.prompt_id()) else {
            continue;
        };
        let selected = idx == app.selected && app.focus == FocusArea::Content;
        let dimmed = dimming && !card.is_expanded();
        if card.mode() == CardMode::Details && !animating {
            render_details_card(f, app, prompt, screen, app.details_scroll);
        } else {
            render_collapsed_card(f, &app.theme, prompt, screen, selected, dimmed);
        }
        app.card_hitboxes.push(CardHitbox {
            rect: screen,
            prompt_id: card.prompt_id(),
        });
    }

    // The chat pane is pinned to the viewport and drawn over its siblings.
    if let Some((idx, rect)) = chat_card {
        let Some(screen) = to_screen(&rect, area, 0) else {
            return;
        };
        f.render_widget(Clear, screen);
        let Some(card) = app.controller.cards().get(idx) else {
            return;
        };
        let prompt_id = card.prompt_id();
        if animating || card.session().is_none() {
            let title = app
                .controller
                .catalog()
                .get(prompt_id)
                .map(|p| p.title.clone())
                .unwrap_or_default();
            let block = Block::default()
                .borders(Borders::ALL)
                .border_style(app.theme.card_selected_border_style)
                .title(Span::styled(format!(" {} ", title), app.theme.card_title_style));
            f.render_widget(block, screen);
        } else {
            render_chat_pane(f, app, idx, screen);
        }
    }
}

fn update_grid_scroll(app: &mut App, rects: &[CardRect], area: Rect) {
    if app.controller.is_animating() || app.state() == AppState::Chat {
        return;
    }
    let height = area.height as f32;
    let content_bottom = rects
        .iter()
        .map(|r| r.y + r.height)
        .fold(0.0f32, f32::max);
    let mut scroll = app.grid_scroll as f32;
    if let Some(r) = rects.get(app.selected) {
        if r.y < scroll {
            scroll = r.y;
        } else if r.y + r.height > scroll + height {
            scroll = r.y + r.height - height;
        }
    }
    let max_scroll = (content_bottom - height).max(0.0);
    app.grid_scroll = scroll.clamp(0.0, max_scroll).round() as u16;
}

fn to_screen(rect: &CardRect, area: Rect, scroll: u16) -> Option<Rect> {
    let x = area.x as f32 + rect.x.round();
    let y = area.y as f32 + rect.y.round() - scroll as f32;
    let left = x.max(area.x as f32);
    let top = y.max(area.y as f32);
    let right = (x + rect.width.round()).min((area.x + area.width) as f32);
    let bottom = (y + rect.height.round()).min((area.y + area.height) as f32);
    if right - left < 4.0 || bottom - top < 2.0 {
        return None;
    }
    Some(Rect::new(
        left as u16,
        top as u16,
        (right - left) as u16,
        (bottom - top) as u16,
    ))
}

fn render_collapsed_card(
    f: &mut Frame,
    theme: &Theme,
    prompt: &PromptRecord,
    area: Rect,
    selected: bool,
    dimmed: bool,
) {
    let pick = |style: Style| if dimmed { theme.card_dimmed_style } else { style };
    let border = if selected {
        theme.card_selected_border_style
    } else {
        theme.border_style
    };

    let mut lines = vec![Line::from(Span::styled(
        prompt.title.clone(),
        pick(theme.card_title_style),
    ))];
    let mut meta = Vec::new();
    if !prompt.author.is_empty() {
        meta.push(format!("by {}", prompt.author));
    }
    if !prompt.chapter.is_empty() {
        meta.push(prompt.chapter.clone());
    }
    if !meta.is_empty() {
        lines.push(Line::from(Span::styled(
            meta.join(" · "),
            pick(theme.card_meta_style),
        )));
    }
    lines.push(Line::from(Span::styled(
        prompt.description.clone(),
        pick(theme.message_text_style),
    )));

    let title = if prompt.category.is_empty() {
        Span::raw("")
    } else {
        Span::styled(format!(" {} ", prompt.category), pick(theme.card_tag_style))
    };
    let card = Paragraph::new(lines).wrap(Wrap { trim: true }).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(pick(border))
            .title(title),
    );
    f.render_widget(Clear, area);
    f.render_widget(card, area);
}

fn details_lines(prompt: &PromptRecord, theme: &Theme) -> Vec<Line<'static>> {
    let mut lines = vec![
        Line::from(Span::styled(prompt.title.clone(), theme.card_title_style)),
        Line::from(""),
    ];
    let mut field = |label: &str, value: &str| {
        if !value.is_empty() {
            lines.push(Line::from(vec![
                Span::styled(format!("{:<12}", label), theme.card_meta_style),
                Span::styled(value.to_string(), theme.message_text_style),
            ]));
        }
    };
    field("Author", &prompt.author);
    field("Chapter", &prompt.chapter);
    field("Category", &prompt.category);
    field("Difficulty", prompt.difficulty.as_deref().unwrap_or(""));
    field("Time", prompt.time.as_deref().unwrap_or(""));
    let tags: Vec<String> = prompt.tags.iter().map(|t| format!("#{}", t)).collect();
    field("Tags", &tags.join(" "));

    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        prompt.description.clone(),
        theme.message_text_style,
    )));
    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled("PROMPT", theme.header_title_style)));
    for line in prompt.prompt.lines() {
        lines.push(Line::from(Span::styled(
            line.to_string(),
            theme.input_text_style,
        )));
    }
    lines
}

fn render_details_card(f: &mut Frame, app: &App, prompt: &PromptRecord, area: Rect, scroll: u16) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(app.theme.card_selected_border_style)
        .title(Span::styled(" DETAILS ", app.theme.header_title_style))
        .title_bottom(Span::styled(
            " Enter: try this prompt · ↑↓ scroll · Esc: close ",
            app.theme.footer_text_style,
        ));
    let inner = block.inner(area);
    f.render_widget(Clear, area);
    f.render_widget(block, area);

    let lines = details_lines(prompt, &app.theme);
    let max_scroll = wrapped_height(&lines, inner.width).saturating_sub(inner.height);
    let para = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .scroll((scroll.min(max_scroll), 0));
    f.render_widget(para, inner);
}

fn transcript_lines(session: &ChatSession, theme: &Theme, tick: u64) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    for message in session.transcript().messages() {
        let label_style = match message.sender {
            Sender::User => theme.user_label_style,
            Sender::Ai => theme.ai_label_style,
        };
        lines.push(Line::from(Span::styled(
            format!(" {} ", message.sender.label()),
            label_style,
        )));
        if message.placeholder {
            let dots = ".".repeat((tick / 4 % 4) as usize);
            lines.push(Line::from(Span::styled(
                format!("  AI is typing{}", dots),
                theme.typing_style,
            )));
        } else if let Some(html) = &message.html {
            lines.extend(render_markup(html, theme, "  "));
        } else {
            for line in message.content.lines() {
                lines.push(Line::from(Span::styled(
                    format!("  {}", line),
                    theme.message_text_style,
                )));
            }
        }
        lines.push(Line::from(""));
    }
    lines
}

fn suggestion_lines(session: &ChatSession, theme: &Theme) -> Vec<Line<'static>> {
    if session.suggestions_loading() {
        return vec![Line::from(Span::styled(
            " Finding related prompts...",
            theme.typing_style,
        ))];
    }
    if session.suggestions().is_empty() {
        return Vec::new();
    }
    let mut lines = vec![Line::from(Span::styled(
        " You might also like:",
        theme.header_subtitle_style,
    ))];
    for (idx, suggestion) in session.suggestions().iter().enumerate() {
        lines.push(Line::from(vec![
            Span::styled(format!(" [{}] ", idx + 1), theme.footer_key_style),
            Span::styled(format!(" {}", suggestion.title), theme.suggestion_style),
            Span::styled(
                format!(" · {} · {}", suggestion.author, suggestion.reason),
                theme.card_meta_style,
            ),
        ]));
    }
    lines
}

fn render_chat_pane(f: &mut Frame, app: &mut App, card_idx: usize, area: Rect) {
    let tick = app.tick_count;
    let Some(card) = app.controller.cards().get(card_idx) else {
        return;
    };
    let Some(session) = card.session() else {
        return;
    };
    let Some(prompt) = app.controller.catalog().get(card.prompt_id()) else {
        return;
    };

    let status = if session.is_awaiting_reply() {
        " WAITING FOR REPLY "
    } else {
        " READY "
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(app.theme.card_selected_border_style)
        .title(Span::styled(
            format!(" CHAT · {} ", prompt.title),
            app.theme.card_title_style,
        ))
        .title(
            Line::from(Span::styled(status, app.theme.footer_highlight_style)).right_aligned(),
        );
    let inner = block.inner(area);
    f.render_widget(block, area);

    let transcript = transcript_lines(session, &app.theme, tick);
    let suggestions = suggestion_lines(session, &app.theme);
    let staged = session.staged_file().map(|p| {
        p.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| p.display().to_string())
    });

    let sections = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(1),
            Constraint::Length(suggestions.len() as u16),
            Constraint::Length(if staged.is_some() { 1 } else { 0 }),
            Constraint::Length(3),
        ])
        .split(inner);

    // Transcript + scrollbar
    let text_width = sections[0].width.saturating_sub(1);
    let content_height = wrapped_height(&transcript, text_width);
    let max_scroll = content_height.saturating_sub(sections[0].height);
    app.chat_max_scroll = max_scroll;
    if app.follow_chat || app.chat_scroll > max_scroll {
        app.chat_scroll = max_scroll;
    }
    let text_area = Rect {
        width: text_width,
        ..sections[0]
    };
    f.render_widget(
        Paragraph::new(transcript)
            .wrap(Wrap { trim: false })
            .scroll((app.chat_scroll, 0)),
        text_area,
    );
    if max_scroll > 0 {
        let mut scrollbar_state =
            ScrollbarState::new(max_scroll as usize + 1).position(app.chat_scroll as usize);
        let scrollbar = Scrollbar::new(ScrollbarOrientation::VerticalRight)
            .thumb_style(app.theme.border_style)
            .track_style(app.theme.base_style);
        f.render_stateful_widget(scrollbar, sections[0], &mut scrollbar_state);
    }

    if !suggestions.is_empty() {
        f.render_widget(Paragraph::new(suggestions), sections[1]);
    }
    if let Some(name) = staged {
        f.render_widget(
            Paragraph::new(Line::from(vec![
                Span::styled(" 📎 ", app.theme.card_meta_style),
                Span::styled(
                    format!("{} (sent with your next message)", name),
                    app.theme.card_meta_style,
                ),
            ])),
            sections[2],
        );
    }

    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(app.theme.border_style)
        .title(Span::styled(
            " MESSAGE · Enter send · /attach <path> · Ctrl+E export · Ctrl+G details ",
            app.theme.header_subtitle_style,
        ));
    let input_inner = input_block.inner(sections[3]);
    f.render_widget(input_block, sections[3]);
    let cursor_visible = app.focus == FocusArea::Content && (tick / 8) % 2 == 0;
    let line = render_input_line(
        &app.input,
        app.input_cursor,
        &app.theme,
        cursor_visible,
        input_inner.width,
    );
    f.render_widget(Paragraph::new(line), input_inner);
    app.input_rect = Some(input_inner);
}

/// Single input line; scrolls horizontally to keep the cursor in view.
fn render_input_line(
    text: &str,
    cursor: usize,
    theme: &Theme,
    cursor_visible: bool,
    width: u16,
) -> Line<'static> {
    let prefix_len = INPUT_PREFIX.chars().count();
    let visible = (width as usize).saturating_sub(prefix_len + 1).max(1);
    let skip = cursor.saturating_sub(visible);
    let shown: String = text.chars().skip(skip).take(visible + 1).collect();
    let (before, current, after) = split_line_at_char(&shown, cursor - skip);

    let mut spans = vec![Span::styled(INPUT_PREFIX, theme.input_prompt_style)];
    if !before.is_empty() {
        spans.push(Span::styled(before, theme.input_text_style));
    }
    let cursor_style = if cursor_visible {
        theme.input_cursor_style
    } else {
        theme.input_text_style
    };
    match current {
        Some(ch) => spans.push(Span::styled(ch.to_string(), cursor_style)),
        None if cursor_visible => spans.push(Span::styled(" ", cursor_style)),
        None => {}
    }
    if !after.is_empty() {
        spans.push(Span::styled(after, theme.input_text_style));
    }
    Line::from(spans)
}

fn wrapped_height(lines: &[Line<'_>], width: u16) -> u16 {
    let width = width.max(1) as usize;
    let rows: usize = lines
        .iter()
        .map(|line| {
            let w = line.width();
            if w == 0 {
                1
            } else {
                w.div_ceil(width)
            }
        })
        .sum();
    rows.min(u16::MAX as usize) as u16
}

fn render_log_pane(f: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(app.theme.border_style)
        .title(Span::styled(" SESSION LOG ", app.theme.header_title_style));
    let inner = block.inner(area);
    let take = inner.height as usize;
    let start = app.logs.len().saturating_sub(take);
    let lines: Vec<Line> = app.logs[start..]
        .iter()
        .map(|l| Line::from(Span::styled(format!(" {}", l), app.theme.footer_text_style)))
        .collect();
    f.render_widget(Paragraph::new(lines).block(block), area);
}

fn state_hint(state: AppState) -> &'static str {
    match state {
        AppState::Grid => {
            "←↑↓→ select · Enter try · d details · w workflows · n next · x cancel · c clear recent · l log · q quit"
        }
        AppState::Details => "Enter try this prompt · ↑↓ scroll · Esc close",
        AppState::Chat => {
            "Enter send · 1-3 suggestions (empty input) · Ctrl+N next step · PgUp/PgDn scroll · Esc close"
        }
        AppState::ChainPicker => "↑↓ choose · Enter start · Esc close",
        AppState::ConfirmCancelChain => "y cancel workflow · n keep going",
    }
}

fn render_footer(f: &mut Frame, app: &App, area: Rect, state: AppState) {
    let footer_block = Block::default()
        .borders(Borders::TOP)
        .border_style(app.theme.border_style);
    let inner = footer_block.inner(area);
    f.render_widget(footer_block, area);

    let first = match &app.notice {
        Some(notice) => Line::from(Span::styled(format!(" {} ", notice), app.theme.success_style)),
        None => Line::from(Span::styled(
            format!(" {}", state_hint(state)),
            app.theme.footer_text_style,
        )),
    };
    let mode = format!("{:?}", state).to_uppercase();
    let second = Line::from(vec![
        Span::styled(" MODE: ", app.theme.footer_text_style),
        Span::styled(mode, app.theme.footer_highlight_style),
        Span::styled("  ANIMATION: ", app.theme.footer_text_style),
        Span::styled(
            app.controller.animator_name().to_uppercase(),
            app.theme.footer_highlight_style,
        ),
        Span::styled("  RECENT: ", app.theme.footer_text_style),
        Span::styled(
            app.controller.recent().entries().len().to_string(),
            app.theme.footer_highlight_style,
        ),
    ]);
    f.render_widget(
        Paragraph::new(vec![first, second]).style(app.theme.base_style),
        inner,
    );
}

fn centered_rect(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect::new(
        area.x + (area.width - width) / 2,
        area.y + (area.height - height) / 2,
        width,
        height,
    )
}

fn render_chain_picker(f: &mut Frame, app: &App, area: Rect) {
    let chains = app.controller.chain_registry().chains();
    let height = (chains.len() as u16) * 3 + 3;
    let popup = centered_rect(area, area.width.saturating_sub(8).min(90), height);
    f.render_widget(Clear, popup);

    let mut lines = vec![Line::from("")];
    for (idx, chain) in chains.iter().enumerate() {
        let selected = idx == app.chain_selected;
        let name_style = if selected {
            app.theme.footer_selected_style
        } else {
            app.theme.card_title_style
        };
        lines.push(Line::from(vec![
            Span::styled(format!(" {} ", idx + 1), app.theme.footer_key_style),
            Span::styled(format!(" {} ", chain.name), name_style),
            Span::styled(
                format!(" {} steps", chain.steps.len()),
                app.theme.card_meta_style,
            ),
        ]));
        lines.push(Line::from(Span::styled(
            format!("    {}", chain.description),
            app.theme.card_meta_style,
        )));
        lines.push(Line::from(""));
    }

    let picker = Paragraph::new(lines)
        .style(app.theme.base_style)
        .wrap(Wrap { trim: false })
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(app.theme.card_selected_border_style)
                .title(Span::styled(
                    " GUIDED WORKFLOWS ",
                    app.theme.header_title_style,
                )),
        );
    f.render_widget(picker, popup);
}

fn render_cancel_confirm(f: &mut Frame, app: &App, area: Rect) {
    let name = app
        .controller
        .active_chain()
        .map(|c| c.name.clone())
        .unwrap_or_default();
    let popup = centered_rect(area, 60, 7);
    f.render_widget(Clear, popup);
    let lines = vec![
        Line::from(""),
        Line::from(Span::styled(
            format!(" Cancel the \"{}\" workflow?", name),
            app.theme.card_title_style,
        )),
        Line::from(Span::styled(
            " Your progress through its steps will be lost.",
            app.theme.card_meta_style,
        )),
        Line::from(""),
        Line::from(Span::styled(" y: cancel it · n: keep going", app.theme.footer_text_style)),
    ];
    let dialog = Paragraph::new(lines).style(app.theme.base_style).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(app.theme.error_style)
            .title(Span::styled(" CANCEL WORKFLOW ", app.theme.error_style)),
    );
    f.render_widget(dialog, popup);
}

fn compact_button_label(label: &str) -> String {
    match label {
        "TRY PROMPT" => "TRY".to_string(),
        "DETAILS" => "INFO".to_string(),
        "WORKFLOWS" => "FLOWS".to_string(),
        "NEXT STEP" => "NEXT".to_string(),
        "CANCEL FLOW" => "CANCEL".to_string(),
        "CLEAR RECENT" => "CLR".to_string(),
        "EXPORT" => "SAVE".to_string(),
        other => {
            if other.chars().count() > 12 {
                other.chars().take(12).collect()
            } else {
                other.to_string()
            }
        }
    }
}

fn button_row_width(buttons: &[(FooterAction, String)]) -> u16 {
    let mut width = 0u16;
    for (idx, (_, label)) in buttons.iter().enumerate() {
        let token_width = label.chars().count() as u16 + 4; // " [label] "
        width = width.saturating_add(token_width);
        if idx + 1 < buttons.len() {
            width = width.saturating_add(1); // layout spacing
        }
    }
    width
}

fn render_button_bar(f: &mut Frame, app: &mut App, area: Rect) {
    let specs = footer_buttons_for_state(app);
    if specs.is_empty() || area.height == 0 || area.width == 0 {
        app.footer_buttons.clear();
        app.footer_focus = 0;
        if app.focus == FocusArea::FooterButtons {
            app.focus = FocusArea::Content;
        }
        return;
    }

    let compact = button_row_width(&specs) > area.width;
    let mut candidates: Vec<(FooterAction, String)> = specs
        .into_iter()
        .map(|(action, label)| {
            let rendered = if compact {
                compact_button_label(&label)
            } else {
                label
            };
            (action, rendered)
        })
        .collect();
    // QUIT is last; drop from the middle so it stays reachable.
    while candidates.len() > 1 && button_row_width(&candidates) > area.width {
        let drop_at = candidates.len() - 2;
        candidates.remove(drop_at);
    }
    if button_row_width(&candidates) > area.width {
        candidates.clear();
    }
    if candidates.is_empty() {
        app.footer_buttons.clear();
        app.footer_focus = 0;
        if app.focus == FocusArea::FooterButtons {
            app.focus = FocusArea::Content;
        }
        return;
    }
    if app.footer_focus >= candidates.len() {
        app.footer_focus = 0;
    }

    let mut display_texts: Vec<String> = Vec::with_capacity(candidates.len());
    let mut actions: Vec<FooterAction> = Vec::with_capacity(candidates.len());
    let mut constraints: Vec<Constraint> = Vec::with_capacity(candidates.len());
    for (action, label) in candidates {
        let t = format!(" [{}] ", label);
        constraints.push(Constraint::Length(t.chars().count() as u16));
        display_texts.push(t);
        actions.push(action);
    }

    let button_rects = Layout::default()
        .direction(Direction::Horizontal)
        .constraints(constraints)
        .spacing(1)
        .split(area);

    app.footer_buttons.clear();
    for (i, rect) in button_rects.iter().enumerate() {
        let mut style = app.theme.footer_key_style;
        if app.focus == FocusArea::FooterButtons && app.footer_focus == i {
            style = app.theme.footer_selected_style;
        }

        let text = display_texts.get(i).cloned().unwrap_or_default();
        f.render_widget(Paragraph::new(text).style(style), *rect);
        let action = *actions.get(i).unwrap_or(&FooterAction::Quit);
        app.footer_buttons.push(FooterButton {
            rect: *rect,
            action,
        });
    }
}

pub fn footer_buttons_for_state(app: &App) -> Vec<(FooterAction, String)> {
    let chain_active = app.controller.active_chain().is_some();
    match app.state() {
        AppState::Grid => {
            let mut buttons = vec![
                (FooterAction::TryPrompt, "TRY PROMPT".to_string()),
                (FooterAction::ViewDetails, "DETAILS".to_string()),
                (FooterAction::OpenChains, "WORKFLOWS".to_string()),
            ];
            if chain_active {
                buttons.push((FooterAction::NextStep, "NEXT STEP".to_string()));
                buttons.push((FooterAction::CancelChain, "CANCEL FLOW".to_string()));
            }
            if app.controller.recent().is_visible() {
                buttons.push((FooterAction::ClearRecent, "CLEAR RECENT".to_string()));
            }
            buttons.push((
                FooterAction::ToggleLog,
                if app.show_log { "LOG:ON" } else { "LOG:OFF" }.to_string(),
            ));
            buttons.push((FooterAction::Quit, "QUIT".to_string()));
            buttons
        }
        AppState::Details => vec![
            (FooterAction::SwitchToChat, "TRY PROMPT".to_string()),
            (FooterAction::Close, "CLOSE".to_string()),
            (FooterAction::Quit, "QUIT".to_string()),
        ],
        AppState::Chat => {
            let mut buttons = vec![
                (FooterAction::Send, "SEND".to_string()),
                (FooterAction::Export, "EXPORT".to_string()),
                (FooterAction::SwitchToDetails, "DETAILS".to_string()),
            ];
            if chain_active {
                buttons.push((FooterAction::NextStep, "NEXT STEP".to_string()));
            }
            let suggestions = app
                .controller
                .expanded_card()
                .and_then(Card::session)
                .map(|s| s.suggestions().len())
                .unwrap_or(0);
            for idx in 0..suggestions {
                buttons.push((FooterAction::Suggestion(idx), format!("#{}", idx + 1)));
            }
            buttons.push((FooterAction::Close, "CLOSE".to_string()));
            buttons.push((FooterAction::Quit, "QUIT".to_string()));
            buttons
        }
        AppState::ChainPicker => vec![
            (FooterAction::StartChain, "START".to_string()),
            (FooterAction::CloseOverlay, "BACK".to_string()),
        ],
        AppState::ConfirmCancelChain => vec![
            (FooterAction::ConfirmCancelChain, "YES, CANCEL".to_string()),
            (FooterAction::KeepChain, "KEEP GOING".to_string()),
        ],
    }
}

fn truncate_with_ellipsis(input: &str, max_chars: usize) -> String {
    let count = input.chars().count();
    if count <= max_chars {
        return input.to_string();
    }
    if max_chars <= 3 {
        return ".".repeat(max_chars);
    }
    let mut out: String = input.chars().take(max_chars - 3).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cards_outside_the_viewport_are_skipped() {
        let area = Rect::new(0, 5, 80, 20);
        let visible = CardRect::new(0.0, 0.0, 30.0, 7.0);
        assert_eq!(to_screen(&visible, area, 0), Some(Rect::new(0, 5, 30, 7)));

        let below = CardRect::new(0.0, 40.0, 30.0, 7.0);
        assert_eq!(to_screen(&below, area, 0), None);
        assert_eq!(to_screen(&below, area, 30), Some(Rect::new(0, 15, 30, 7)));
    }

    #[test]
    fn partially_visible_cards_are_clipped() {
        let area = Rect::new(0, 0, 80, 10);
        let rect = CardRect::new(40.0, 6.0, 60.0, 7.0);
        assert_eq!(to_screen(&rect, area, 0), Some(Rect::new(40, 6, 40, 4)));
    }

    #[test]
    fn input_line_scrolls_to_cursor() {
        let theme = Theme::dark();
        let text = "abcdefghijklmnopqrstuvwxyz";
        let line = render_input_line(text, 26, &theme, true, 13);
        let shown: String = line.spans.iter().map(|s| s.content.as_ref()).collect();
        assert!(shown.starts_with(INPUT_PREFIX));
        assert!(shown.ends_with("z "));
        assert!(!shown.contains('a'));
    }

    #[test]
    fn wrapped_height_counts_rows() {
        let lines = vec![Line::from("x".repeat(25)), Line::from(""), Line::from("short")];
        assert_eq!(wrapped_height(&lines, 10), 5);
    }

    #[test]
    fn truncation_adds_ellipsis() {
        assert_eq!(truncate_with_ellipsis("Design Class Plan", 8), "Desig...");
        assert_eq!(truncate_with_ellipsis("Quiz", 8), "Quiz");
    }
}
