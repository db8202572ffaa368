use anyhow::{Context, Result};
use chrono::Utc;
use promptdeck_core::{
    CardMode, ChainAdvance, ChainError, Config, ExpandMode, PromptRecord, SendOutcome,
    TransitionOutcome, ViewController,
};
use ratatui::layout::Rect;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::app::editor::char_count;
use crate::app::session_log::SessionLogger;
use crate::theme::Theme;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum AppState {
    Grid,
    Details,
    Chat,
    ChainPicker,
    ConfirmCancelChain,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FocusArea {
    Content,
    FooterButtons,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FooterAction {
    TryPrompt,
    ViewDetails,
    ClearRecent,
    OpenChains,
    NextStep,
    CancelChain,
    Send,
    Export,
    SwitchToDetails,
    SwitchToChat,
    Close,
    ToggleLog,
    Quit,
    StartChain,
    CloseOverlay,
    ConfirmCancelChain,
    KeepChain,
    Suggestion(usize),
}

#[derive(Clone, Debug)]
pub struct FooterButton {
    pub rect: Rect,
    pub action: FooterAction,
}

#[derive(Clone, Copy, Debug)]
pub struct CardHitbox {
    pub rect: Rect,
    pub prompt_id: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Overlay {
    ChainPicker,
    ConfirmCancelChain,
}

/// What the chat input line asked for.
#[derive(Debug, PartialEq, Eq)]
pub enum InputCommand {
    Attach(PathBuf),
    AttachUsage,
    Message(String),
}

pub fn parse_input_command(input: &str) -> InputCommand {
    let trimmed = input.trim();
    match trimmed.strip_prefix("/attach") {
        Some(rest) if rest.is_empty() || rest.starts_with(char::is_whitespace) => {
            let path = rest.trim().trim_matches('"');
            if path.is_empty() {
                InputCommand::AttachUsage
            } else {
                InputCommand::Attach(PathBuf::from(path))
            }
        }
        _ => InputCommand::Message(trimmed.to_string()),
    }
}

pub struct App {
    pub controller: ViewController,
    pub config: Config,
    pub theme: Theme,
    overlay: Option<Overlay>,
    pub selected: usize,
    pub chain_selected: usize,
    pub input: String,
    pub input_cursor: usize,
    pub input_rect: Option<Rect>,
    pub logs: Vec<String>,
    pub show_log: bool,
    pub notice: Option<String>,
    pub focus: FocusArea,
    pub footer_buttons: Vec<FooterButton>,
    pub footer_focus: usize,
    pub card_hitboxes: Vec<CardHitbox>,
    pub recent_hitboxes: Vec<CardHitbox>,
    pub grid_scroll: u16,
    pub chat_scroll: u16,
    pub chat_max_scroll: u16,
    pub follow_chat: bool,
    pub details_scroll: u16,
    pub tick_count: u64,
    pub dirty: bool,
    pub session_logger: SessionLogger,
    pub export_dir: PathBuf,
    last_expanded: Option<u32>,
    logged_messages: usize,
}

impl App {
    pub fn new(
        config: Config,
        controller: ViewController,
        session_logger: SessionLogger,
        export_dir: PathBuf,
    ) -> Self {
        let theme = Theme::from_config(&config.client.theme);
        let mut app = Self {
            controller,
            config,
            theme,
            overlay: None,
            selected: 0,
            chain_selected: 0,
            input: String::new(),
            input_cursor: 0,
            input_rect: None,
            logs: Vec::new(),
            show_log: false,
            notice: None,
            focus: FocusArea::Content,
            footer_buttons: Vec::new(),
            footer_focus: 0,
            card_hitboxes: Vec::new(),
            recent_hitboxes: Vec::new(),
            grid_scroll: 0,
            chat_scroll: 0,
            chat_max_scroll: 0,
            follow_chat: true,
            details_scroll: 0,
            tick_count: 0,
            dirty: true,
            session_logger,
            export_dir,
            last_expanded: None,
            logged_messages: 0,
        };
        app.push_log(format!(
            "PromptDeck ready: {} prompts, relay {}.",
            app.controller.catalog().len(),
            app.config.client.relay_url
        ));
        if let Some(path) = app.session_logger.display_path() {
            app.push_log(format!("Session log file: {}", path));
        }
        if let Some(chain) = app.controller.active_chain() {
            let name = chain.name.clone();
            app.push_log(format!("Resuming workflow: {}", name));
        }
        app
    }

    pub fn state(&self) -> AppState {
        match self.overlay {
            Some(Overlay::ChainPicker) => return AppState::ChainPicker,
            Some(Overlay::ConfirmCancelChain) => return AppState::ConfirmCancelChain,
            None => {}
        }
        match self.controller.expanded_card().map(|c| c.mode()) {
            Some(CardMode::Chat) => AppState::Chat,
            Some(CardMode::Details) => AppState::Details,
            _ => AppState::Grid,
        }
    }

    pub fn selected_prompt(&self) -> Option<&PromptRecord> {
        self.controller.catalog().prompts().get(self.selected)
    }

    pub fn selected_prompt_id(&self) -> Option<u32> {
        self.selected_prompt().map(|p| p.id)
    }

    pub fn select_prompt(&mut self, prompt_id: u32) {
        if let Some(idx) = self.controller.catalog().position(prompt_id) {
            self.selected = idx;
        }
    }

    /// Arrow-key movement over the grid, clamped to the catalog.
    pub fn move_selection(&mut self, dx: isize, dy: isize) {
        let total = self.controller.cards().len();
        if total == 0 {
            return;
        }
        let cols = self.controller.metrics().columns().max(1) as isize;
        let current = self.selected as isize;
        let target = current + dx + dy * cols;
        self.selected = target.clamp(0, total as isize - 1) as usize;
        self.dirty = true;
    }

    pub fn try_selected(&mut self, now: Instant) {
        if let Some(id) = self.selected_prompt_id() {
            self.open_card(id, ExpandMode::Chat, now);
        }
    }

    pub fn view_selected_details(&mut self, now: Instant) {
        if let Some(id) = self.selected_prompt_id() {
            self.open_card(id, ExpandMode::Details, now);
        }
    }

    /// Switches the expanded card between chat and details.
    pub fn switch_expanded(&mut self, mode: ExpandMode, now: Instant) {
        if let Some(id) = self.controller.expanded_card().map(|c| c.prompt_id()) {
            self.open_card(id, mode, now);
        }
    }

    pub fn open_card(&mut self, prompt_id: u32, mode: ExpandMode, now: Instant) {
        self.select_prompt(prompt_id);
        let outcome = self.controller.expand(prompt_id, mode, now);
        if outcome == TransitionOutcome::Started {
            let title = self
                .controller
                .catalog()
                .get(prompt_id)
                .map(|p| p.title.clone())
                .unwrap_or_default();
            self.push_log(format!("{:?}: {}", mode, title));
            if mode == ExpandMode::Details {
                self.details_scroll = 0;
            }
        }
        self.dirty = true;
    }

    pub fn close_card(&mut self, now: Instant) {
        if self.controller.close(now) == TransitionOutcome::Started {
            self.input.clear();
            self.input_cursor = 0;
        }
        self.dirty = true;
    }

    pub fn submit_input(&mut self) {
        match parse_input_command(&self.input) {
            InputCommand::AttachUsage => {
                self.notice = Some("Usage: /attach <path to file>".to_string());
            }
            InputCommand::Attach(path) => self.stage_attachment(path),
            InputCommand::Message(text) => match self.controller.send_message(&text) {
                SendOutcome::Sent => {
                    self.log_block("CHAT_SEND", &text);
                    self.input.clear();
                    self.input_cursor = 0;
                    self.follow_chat = true;
                    self.notice = None;
                }
                SendOutcome::Busy => {
                    self.notice = Some("Waiting for the AI to reply...".to_string());
                }
                SendOutcome::NoSession => {
                    self.notice = Some("Open a prompt in chat to send messages.".to_string());
                }
                SendOutcome::Empty => {
                    if let Some(name) = self.staged_attachment_name() {
                        self.notice = Some(format!("Type a message to send with {}.", name));
                    }
                }
            },
        }
        self.dirty = true;
    }

    fn staged_attachment_name(&self) -> Option<String> {
        let session = self.controller.expanded_card()?.session()?;
        session.staged_file().map(file_label)
    }

    fn stage_attachment(&mut self, path: PathBuf) {
        if !path.is_file() {
            self.notice = Some(format!("File not found: {}", path.display()));
            return;
        }
        let name = file_label(&path);
        if self.controller.stage_attachment(path) {
            self.input.clear();
            self.input_cursor = 0;
            self.notice = Some(format!("{} will be sent with your next message.", name));
            self.push_log(format!("Attachment staged: {}", name));
        } else {
            self.notice = Some("Open a prompt in chat before attaching files.".to_string());
        }
    }

    pub async fn export_chat(&mut self) -> Result<()> {
        let Some(export) = self.controller.export_chat(Utc::now()) else {
            self.notice = Some("Nothing to export yet.".to_string());
            self.dirty = true;
            return Ok(());
        };
        let path = self.export_dir.join(&export.filename);
        tokio::fs::write(&path, export.contents)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        self.notice = Some(format!("Conversation saved to {}", path.display()));
        self.push_log(format!("Exported conversation: {}", path.display()));
        self.dirty = true;
        Ok(())
    }

    pub fn select_suggestion(&mut self, index: usize, now: Instant) {
        match self.controller.select_suggestion(index, now) {
            Some(id) => {
                let title = self
                    .controller
                    .catalog()
                    .get(id)
                    .map(|p| p.title.clone())
                    .unwrap_or_default();
                self.push_log(format!("Following suggestion: {}", title));
                self.input.clear();
                self.input_cursor = 0;
            }
            None => self.notice = Some(format!("No suggestion {}.", index + 1)),
        }
        self.dirty = true;
    }

    pub fn clear_recent(&mut self) {
        self.controller.clear_recent();
        self.push_log("Recent prompts cleared.");
        self.dirty = true;
    }

    pub fn open_chain_picker(&mut self) {
        self.overlay = Some(Overlay::ChainPicker);
        let count = self.controller.chain_registry().chains().len();
        if self.chain_selected >= count {
            self.chain_selected = 0;
        }
        self.footer_focus = 0;
        self.dirty = true;
    }

    pub fn close_overlay(&mut self) {
        self.overlay = None;
        self.footer_focus = 0;
        self.dirty = true;
    }

    pub fn move_chain_selection(&mut self, delta: isize) {
        let count = self.controller.chain_registry().chains().len() as isize;
        if count == 0 {
            return;
        }
        self.chain_selected = (self.chain_selected as isize + delta).rem_euclid(count) as usize;
        self.dirty = true;
    }

    pub fn start_selected_chain(&mut self, now: Instant) {
        let Some(chain) = self
            .controller
            .chain_registry()
            .chains()
            .get(self.chain_selected)
            .cloned()
        else {
            return;
        };
        self.overlay = None;
        match self.controller.start_chain(chain.key, now) {
            Ok(first) => {
                self.push_log(format!("Workflow started: {}", chain.name));
                if let Some(id) = first {
                    self.select_prompt(id);
                }
                self.notice = Some(format!(
                    "Workflow \"{}\" started. Press Ctrl+N in chat or n on the grid for the next step.",
                    chain.name
                ));
            }
            Err(err) => self.report_chain_error(err),
        }
        self.dirty = true;
    }

    pub fn advance_chain(&mut self, now: Instant) {
        match self.controller.advance_chain(now) {
            Ok(ChainAdvance::Next { step, prompt_id }) => {
                let title = self
                    .controller
                    .active_chain()
                    .and_then(|c| c.current_title())
                    .unwrap_or_default()
                    .to_string();
                self.push_log(format!("Workflow step {}: {}", step + 1, title));
                if let Some(id) = prompt_id {
                    self.select_prompt(id);
                }
                self.input.clear();
                self.input_cursor = 0;
            }
            Ok(ChainAdvance::Completed { name, .. }) => {
                self.push_log(format!("Workflow completed: {}", name));
            }
            Err(err) => self.report_chain_error(err),
        }
        self.dirty = true;
    }

    pub fn request_cancel_chain(&mut self) {
        if self.controller.active_chain().is_some() {
            self.overlay = Some(Overlay::ConfirmCancelChain);
            self.footer_focus = 0;
        } else {
            self.notice = Some("No workflow is active.".to_string());
        }
        self.dirty = true;
    }

    pub fn resolve_cancel_chain(&mut self, confirmed: bool) {
        self.overlay = None;
        let name = self.controller.active_chain().map(|c| c.name.clone());
        if self.controller.cancel_chain(|_| confirmed) {
            if let Some(name) = name {
                self.push_log(format!("Workflow cancelled: {}", name));
            }
            self.notice = Some("Workflow cancelled.".to_string());
        }
        self.dirty = true;
    }

    fn report_chain_error(&mut self, err: ChainError) {
        let message = match err {
            ChainError::NotActive => "No workflow is active. Press w to pick one.".to_string(),
            other => other.to_string(),
        };
        self.push_log(format!("Workflow error: {}", message));
        self.notice = Some(message);
    }

    /// Drives the controller clock and mirrors its changes into the view.
    pub fn on_tick(&mut self, now: Instant) {
        self.tick_count = self.tick_count.wrapping_add(1);
        let before = self.controller.has_pending_calls();
        self.controller.tick(now);
        if before != self.controller.has_pending_calls() {
            self.dirty = true;
        }

        for notice in self.controller.take_notices() {
            self.push_log(notice.clone());
            self.notice = Some(notice);
            self.dirty = true;
        }

        let expanded = self.controller.expanded_card().map(|c| c.prompt_id());
        if expanded != self.last_expanded {
            self.last_expanded = expanded;
            self.logged_messages = 0;
            self.chat_scroll = 0;
            self.follow_chat = true;
            if let Some(id) = expanded {
                self.select_prompt(id);
            }
            self.dirty = true;
        }
        self.log_new_messages();
    }

    fn log_new_messages(&mut self) {
        let Some(session) = self.controller.expanded_card().and_then(|c| c.session()) else {
            return;
        };
        let lines: Vec<(String, String)> = session
            .transcript()
            .real_messages()
            .skip(self.logged_messages)
            .map(|m| (m.sender.label().to_uppercase(), m.content.clone()))
            .collect();
        if lines.is_empty() {
            return;
        }
        self.logged_messages += lines.len();
        for (label, content) in lines {
            if label != "YOU" {
                self.session_logger.block(&format!("CHAT_{}", label), &content);
            }
        }
        self.dirty = true;
    }

    pub fn is_busy(&self) -> bool {
        self.controller.is_animating()
            || self.controller.has_pending_navigation()
            || self.controller.has_pending_calls()
    }

    pub fn push_log<S: Into<String>>(&mut self, message: S) {
        let message = message.into();
        self.session_logger.event("LOG", &message);
        self.logs.push(message);
        const MAX_LOG_LINES: usize = 500;
        if self.logs.len() > MAX_LOG_LINES {
            let overflow = self.logs.len() - MAX_LOG_LINES;
            self.logs.drain(0..overflow);
        }
    }

    pub fn log_block(&self, label: &str, body: &str) {
        self.session_logger.block(label, body);
    }

    pub fn set_input(&mut self, text: &str) {
        self.input = text.to_string();
        self.input_cursor = char_count(&self.input);
    }
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use async_trait::async_trait;
    use promptdeck_core::{
        AnimationStrategy, Catalog, ChatRequest, KeyValueStore, MemoryStore, Relay, RelayError,
        UploadFile, UploadReceipt,
    };
    use std::sync::Arc;

    pub struct EchoRelay;

    #[async_trait]
    impl Relay for EchoRelay {
        async fn chat(&self, request: ChatRequest) -> Result<String, RelayError> {
            Ok(format!("echo: {}", request.message))
        }

        async fn upload(&self, _file: UploadFile) -> Result<UploadReceipt, RelayError> {
            Err(RelayError::Interrupted)
        }
    }

    pub fn test_app(export_dir: &Path) -> App {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let controller = ViewController::new(
            Catalog::builtin().unwrap(),
            Arc::new(EchoRelay),
            store,
            AnimationStrategy::Native,
        );
        App::new(
            Config::default(),
            controller,
            SessionLogger::disabled(),
            export_dir.to_path_buf(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::test_app;
    use super::*;
    use std::time::Duration;

    fn after_reflow(now: Instant) -> Instant {
        now + Duration::from_millis(500)
    }

    #[test]
    fn attach_command_parsing() {
        assert_eq!(
            parse_input_command("/attach ./notes/week1.pdf"),
            InputCommand::Attach(PathBuf::from("./notes/week1.pdf"))
        );
        assert_eq!(
            parse_input_command("/attach \"my slides.pptx\""),
            InputCommand::Attach(PathBuf::from("my slides.pptx"))
        );
        assert_eq!(parse_input_command("/attach"), InputCommand::AttachUsage);
        assert_eq!(
            parse_input_command("/attachment is a word"),
            InputCommand::Message("/attachment is a word".to_string())
        );
        assert_eq!(
            parse_input_command("  hello  "),
            InputCommand::Message("hello".to_string())
        );
    }

    #[tokio::test]
    async fn selection_moves_by_rows_and_clamps() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = test_app(dir.path());
        let cols = app.controller.metrics().columns();

        app.move_selection(0, 1);
        assert_eq!(app.selected, cols);
        app.move_selection(-1, 0);
        assert_eq!(app.selected, cols - 1);
        app.move_selection(0, -5);
        assert_eq!(app.selected, 0);
        app.move_selection(100, 0);
        assert_eq!(app.selected, app.controller.cards().len() - 1);
    }

    #[tokio::test]
    async fn chat_round_trip_and_export() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = test_app(dir.path());
        let start = Instant::now();

        app.try_selected(start);
        assert_eq!(app.state(), AppState::Chat);
        app.controller.settle().await;
        app.on_tick(after_reflow(start));

        app.set_input("Intro to statistics, 40 students");
        app.submit_input();
        assert!(app.input.is_empty());
        app.controller.settle().await;

        let session = app.controller.expanded_card().unwrap().session().unwrap();
        let last = session.transcript().messages().last().unwrap();
        assert_eq!(last.content, "echo: Intro to statistics, 40 students");

        app.export_chat().await.unwrap();
        let written: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(written.len(), 1);
        assert!(written[0].contains("_conversation_"));
    }

    #[tokio::test]
    async fn attach_rejects_missing_file_and_stages_real_one() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = test_app(dir.path());
        let start = Instant::now();
        app.try_selected(start);
        app.controller.settle().await;

        app.set_input("/attach /definitely/not/here.pdf");
        app.submit_input();
        assert!(app.notice.as_deref().unwrap().starts_with("File not found"));

        let file = dir.path().join("rubric.txt");
        std::fs::write(&file, "criteria").unwrap();
        app.set_input(&format!("/attach {}", file.display()));
        app.submit_input();
        let session = app.controller.expanded_card().unwrap().session().unwrap();
        assert_eq!(session.staged_file(), Some(file.as_path()));
        assert!(app.input.is_empty());
    }

    #[tokio::test]
    async fn empty_send_keeps_staged_file_and_says_why() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = test_app(dir.path());
        let start = Instant::now();
        app.try_selected(start);
        app.controller.settle().await;

        let file = dir.path().join("syllabus.txt");
        std::fs::write(&file, "week 1").unwrap();
        app.set_input(&format!("/attach {}", file.display()));
        app.submit_input();

        app.set_input("   ");
        app.submit_input();
        assert_eq!(
            app.notice.as_deref(),
            Some("Type a message to send with syllabus.txt.")
        );
        let session = app.controller.expanded_card().unwrap().session().unwrap();
        assert_eq!(session.staged_file(), Some(file.as_path()));
    }

    #[tokio::test]
    async fn chain_picker_starts_and_cancel_needs_confirmation() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = test_app(dir.path());
        let start = Instant::now();

        app.open_chain_picker();
        assert_eq!(app.state(), AppState::ChainPicker);
        app.start_selected_chain(start);
        app.controller.settle().await;
        assert!(app.controller.active_chain().is_some());
        assert_eq!(app.state(), AppState::Chat);

        app.request_cancel_chain();
        assert_eq!(app.state(), AppState::ConfirmCancelChain);
        app.resolve_cancel_chain(false);
        assert!(app.controller.active_chain().is_some());

        app.request_cancel_chain();
        app.resolve_cancel_chain(true);
        assert!(app.controller.active_chain().is_none());
        assert_eq!(app.notice.as_deref(), Some("Workflow cancelled."));
    }

    #[tokio::test]
    async fn advancing_without_chain_reports_notice() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = test_app(dir.path());
        app.advance_chain(Instant::now());
        assert!(app.notice.as_deref().unwrap().contains("No workflow is active"));
    }
}
