use ratatui::style::{Color, Modifier, Style};

#[derive(Debug, Clone)]
pub struct Theme {
    // Base
    pub base_style: Style,
    pub border_style: Style,
    // Header
    pub header_title_style: Style,
    pub header_subtitle_style: Style,
    // Cards
    pub card_title_style: Style,
    pub card_meta_style: Style,
    pub card_tag_style: Style,
    pub card_selected_border_style: Style,
    pub card_dimmed_style: Style,
    // Chat
    pub user_label_style: Style,
    pub ai_label_style: Style,
    pub message_text_style: Style,
    pub strong_style: Style,
    pub emphasis_style: Style,
    pub typing_style: Style,
    pub suggestion_style: Style,
    // Input
    pub input_prompt_style: Style,
    pub input_text_style: Style,
    pub input_cursor_style: Style,
    // Chain progress
    pub step_completed_style: Style,
    pub step_current_style: Style,
    pub step_upcoming_style: Style,
    // Footer
    pub footer_text_style: Style,
    pub footer_highlight_style: Style,
    pub footer_key_style: Style,
    pub footer_selected_style: Style,
    // Alerts
    pub error_style: Style,
    pub success_style: Style,
}

impl Theme {
    pub fn from_config(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "dark" => Self::dark(),
            "light" => Self::light(),
            "retro" => Self::retro(),
            _ => match dark_light::detect() {
                dark_light::Mode::Light => Self::light(),
                // Detection failures fall back to dark.
                dark_light::Mode::Dark | dark_light::Mode::Default => Self::dark(),
            },
        }
    }

    pub fn retro() -> Self {
        let amber = Color::Rgb(255, 176, 0);
        let amber_dim = Color::Rgb(150, 110, 0);
        let amber_faint = Color::Rgb(90, 66, 0);
        let red_alert = Color::Rgb(255, 40, 40);
        let bg = Color::Black;

        Self {
            base_style: Style::default().fg(amber),
            border_style: Style::default().fg(amber_dim),

            header_title_style: Style::default().fg(amber).add_modifier(Modifier::BOLD),
            header_subtitle_style: Style::default().fg(amber_dim),

            card_title_style: Style::default().fg(amber).add_modifier(Modifier::BOLD),
            card_meta_style: Style::default().fg(amber_dim),
            card_tag_style: Style::default().fg(bg).bg(amber_dim),
            card_selected_border_style: Style::default().fg(amber).add_modifier(Modifier::BOLD),
            card_dimmed_style: Style::default().fg(amber_faint),

            user_label_style: Style::default().fg(bg).bg(amber),
            ai_label_style: Style::default().fg(amber).add_modifier(Modifier::BOLD),
            message_text_style: Style::default().fg(amber),
            strong_style: Style::default().fg(amber).add_modifier(Modifier::BOLD),
            emphasis_style: Style::default().fg(amber).add_modifier(Modifier::ITALIC),
            typing_style: Style::default()
                .fg(amber_dim)
                .add_modifier(Modifier::SLOW_BLINK),
            suggestion_style: Style::default().fg(amber).add_modifier(Modifier::UNDERLINED),

            input_prompt_style: Style::default().fg(amber).add_modifier(Modifier::BOLD),
            input_text_style: Style::default().fg(Color::White),
            input_cursor_style: Style::default()
                .bg(amber)
                .fg(bg)
                .add_modifier(Modifier::RAPID_BLINK),

            step_completed_style: Style::default().fg(amber_dim),
            step_current_style: Style::default().fg(bg).bg(amber),
            step_upcoming_style: Style::default().fg(amber_faint),

            footer_text_style: Style::default().fg(amber_dim),
            footer_highlight_style: Style::default().fg(amber),
            footer_key_style: Style::default().fg(bg).bg(amber),
            footer_selected_style: Style::default()
                .fg(Color::Blue)
                .bg(Color::Rgb(190, 190, 190))
                .add_modifier(Modifier::BOLD),

            error_style: Style::default().fg(red_alert),
            success_style: Style::default().fg(bg).bg(amber),
        }
    }

    pub fn light() -> Self {
        let text_main = Color::Black;
        let text_dim = Color::DarkGray;
        let text_faint = Color::Gray;
        let accent = Color::Blue;
        let red_alert = Color::Red;

        Self {
            base_style: Style::default().fg(text_main),
            border_style: Style::default().fg(accent),

            header_title_style: Style::default().fg(accent).add_modifier(Modifier::BOLD),
            header_subtitle_style: Style::default().fg(text_dim),

            card_title_style: Style::default().fg(text_main).add_modifier(Modifier::BOLD),
            card_meta_style: Style::default().fg(text_dim),
            card_tag_style: Style::default().fg(Color::White).bg(accent),
            card_selected_border_style: Style::default().fg(accent).add_modifier(Modifier::BOLD),
            card_dimmed_style: Style::default().fg(text_faint),

            user_label_style: Style::default().fg(Color::White).bg(accent),
            ai_label_style: Style::default().fg(accent).add_modifier(Modifier::BOLD),
            message_text_style: Style::default().fg(text_main),
            strong_style: Style::default().fg(text_main).add_modifier(Modifier::BOLD),
            emphasis_style: Style::default().fg(text_main).add_modifier(Modifier::ITALIC),
            typing_style: Style::default()
                .fg(text_dim)
                .add_modifier(Modifier::SLOW_BLINK),
            suggestion_style: Style::default().fg(accent).add_modifier(Modifier::UNDERLINED),

            input_prompt_style: Style::default().fg(accent).add_modifier(Modifier::BOLD),
            input_text_style: Style::default().fg(accent),
            input_cursor_style: Style::default()
                .bg(accent)
                .fg(Color::White)
                .add_modifier(Modifier::RAPID_BLINK),

            step_completed_style: Style::default().fg(Color::Green),
            step_current_style: Style::default().fg(Color::White).bg(accent),
            step_upcoming_style: Style::default().fg(text_dim),

            footer_text_style: Style::default().fg(text_dim),
            footer_highlight_style: Style::default().fg(accent),
            footer_key_style: Style::default().fg(Color::White).bg(accent),
            footer_selected_style: Style::default()
                .fg(Color::Blue)
                .bg(Color::Rgb(190, 190, 190))
                .add_modifier(Modifier::BOLD),

            error_style: Style::default().fg(red_alert),
            success_style: Style::default().fg(Color::White).bg(accent),
        }
    }

    pub fn dark() -> Self {
        let text_main = Color::Rgb(225, 228, 235);
        let text_dim = Color::Rgb(140, 146, 160);
        let text_faint = Color::Rgb(70, 74, 84);
        let accent = Color::Rgb(102, 126, 234);
        let bg = Color::Rgb(16, 18, 24);
        let red_alert = Color::Rgb(255, 80, 80);

        Self {
            base_style: Style::default().fg(text_main).bg(bg),
            border_style: Style::default().fg(text_dim),

            header_title_style: Style::default().fg(accent).add_modifier(Modifier::BOLD),
            header_subtitle_style: Style::default().fg(text_dim),

            card_title_style: Style::default().fg(text_main).add_modifier(Modifier::BOLD),
            card_meta_style: Style::default().fg(text_dim),
            card_tag_style: Style::default().fg(bg).bg(accent),
            card_selected_border_style: Style::default().fg(accent).add_modifier(Modifier::BOLD),
            card_dimmed_style: Style::default().fg(text_faint),

            user_label_style: Style::default().fg(bg).bg(accent),
            ai_label_style: Style::default().fg(accent).add_modifier(Modifier::BOLD),
            message_text_style: Style::default().fg(text_main),
            strong_style: Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
            emphasis_style: Style::default().fg(text_main).add_modifier(Modifier::ITALIC),
            typing_style: Style::default()
                .fg(text_dim)
                .add_modifier(Modifier::SLOW_BLINK),
            suggestion_style: Style::default().fg(accent).add_modifier(Modifier::UNDERLINED),

            input_prompt_style: Style::default().fg(accent).add_modifier(Modifier::BOLD),
            input_text_style: Style::default().fg(Color::White),
            input_cursor_style: Style::default()
                .bg(accent)
                .fg(bg)
                .add_modifier(Modifier::RAPID_BLINK),

            step_completed_style: Style::default().fg(Color::Rgb(72, 187, 120)),
            step_current_style: Style::default().fg(bg).bg(accent),
            step_upcoming_style: Style::default().fg(text_dim),

            footer_text_style: Style::default().fg(text_dim),
            footer_highlight_style: Style::default().fg(accent),
            footer_key_style: Style::default().fg(bg).bg(accent),
            footer_selected_style: Style::default()
                .fg(Color::Blue)
                .bg(Color::Rgb(190, 190, 190))
                .add_modifier(Modifier::BOLD),

            error_style: Style::default().fg(red_alert),
            success_style: Style::default().fg(bg).bg(accent),
        }
    }
}
