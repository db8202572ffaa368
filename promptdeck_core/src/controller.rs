//! Card expansion, chat sessions and chain navigation for one deck.
//!
//! All state lives in [`ViewController`]; time is passed in by the caller
//! so the transition window and navigation delay are driven by `tick`.
//! Relay calls run on spawned tasks and report back through oneshot
//! channels drained by `poll`. Each result carries the card and session
//! epoch it was issued for, and results for a session that has since been
//! closed or replaced are dropped.

use crate::animation::{animator_for, Reflow, ReflowAnimator};
use crate::catalog::{Catalog, PromptRecord};
use crate::chain::{ActiveChainState, ChainAdvance, ChainEngine, ChainError, ChainRegistry, StepProgress};
use crate::config::AnimationStrategy;
use crate::layout::{compute_layout, GridMetrics, Placement, Rect};
use crate::recent::RecentPrompts;
use crate::relay::{
    ChatRequest, Relay, RelayError, UploadFile, CONNECTIVITY_FAILURE_MESSAGE, EMPTY_REPLY_MESSAGE,
    FALLBACK_GREETING,
};
use crate::store::KeyValueStore;
use crate::suggestions::{
    build_suggestion_request, parse_suggestions, Suggestion, SUGGESTION_THRESHOLD,
};
use crate::transcript::{export_transcript, ChatMessage, Transcript, TranscriptExport};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;

/// Gap between closing one card and opening the next during navigation.
pub const NAVIGATION_DELAY: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardMode {
    Collapsed,
    Chat,
    Details,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpandMode {
    Chat,
    Details,
    Collapse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    Started,
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    /// A reply for this session is still outstanding.
    Busy,
    Empty,
    NoSession,
}

pub struct ChatSession {
    epoch: u64,
    transcript: Transcript,
    staged_file: Option<PathBuf>,
    awaiting_reply: bool,
    suggestions_requested: bool,
    suggestions_loading: bool,
    suggestions: Vec<Suggestion>,
}

impl ChatSession {
    fn new(epoch: u64) -> Self {
        let mut transcript = Transcript::new();
        transcript.push_typing();
        Self {
            epoch,
            transcript,
            staged_file: None,
            awaiting_reply: true,
            suggestions_requested: false,
            suggestions_loading: false,
            suggestions: Vec::new(),
        }
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn staged_file(&self) -> Option<&Path> {
        self.staged_file.as_deref()
    }

    pub fn is_awaiting_reply(&self) -> bool {
        self.awaiting_reply
    }

    pub fn suggestions(&self) -> &[Suggestion] {
        &self.suggestions
    }

    pub fn suggestions_loading(&self) -> bool {
        self.suggestions_loading
    }
}

pub struct Card {
    prompt_id: u32,
    mode: CardMode,
    dim_siblings: bool,
    session: Option<ChatSession>,
}

impl Card {
    fn new(prompt_id: u32) -> Self {
        Self {
            prompt_id,
            mode: CardMode::Collapsed,
            dim_siblings: false,
            session: None,
        }
    }

    pub fn prompt_id(&self) -> u32 {
        self.prompt_id
    }

    pub fn mode(&self) -> CardMode {
        self.mode
    }

    pub fn is_expanded(&self) -> bool {
        self.mode != CardMode::Collapsed
    }

    pub fn dims_siblings(&self) -> bool {
        self.dim_siblings
    }

    pub fn session(&self) -> Option<&ChatSession> {
        self.session.as_ref()
    }

    fn placement(&self) -> Placement {
        match self.mode {
            CardMode::Collapsed => Placement::Collapsed,
            CardMode::Chat => Placement::FullScreen,
            CardMode::Details => Placement::InFlow,
        }
    }

    fn reset(&mut self) {
        self.mode = CardMode::Collapsed;
        self.dim_siblings = false;
        self.session = None;
    }
}

struct Transition {
    card: u32,
    reflow: Reflow,
}

#[derive(Debug, Clone, Copy)]
struct PendingNavigation {
    due: Instant,
    prompt_id: u32,
    mode: ExpandMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallKind {
    Greeting,
    Reply,
    Suggestions,
}

struct PendingCall {
    card: u32,
    epoch: u64,
    kind: CallKind,
    rx: oneshot::Receiver<Result<String, RelayError>>,
}

pub struct ViewController {
    catalog: Catalog,
    relay: Arc<dyn Relay>,
    animator: Box<dyn ReflowAnimator>,
    metrics: GridMetrics,
    recent: RecentPrompts,
    chains: ChainEngine,
    cards: Vec<Card>,
    current_prompt: Option<u32>,
    transition: Option<Transition>,
    pending_nav: Option<PendingNavigation>,
    /// Close requested while the lock was held; runs when it is released.
    pending_collapse: bool,
    pending_calls: Vec<PendingCall>,
    next_epoch: u64,
    notices: Vec<String>,
}

impl ViewController {
    pub fn new(
        catalog: Catalog,
        relay: Arc<dyn Relay>,
        store: Arc<dyn KeyValueStore>,
        strategy: AnimationStrategy,
    ) -> Self {
        let cards = catalog.prompts().iter().map(|p| Card::new(p.id)).collect();
        Self {
            catalog,
            relay,
            animator: animator_for(strategy),
            metrics: GridMetrics::default(),
            recent: RecentPrompts::load(store.clone()),
            chains: ChainEngine::load(store, ChainRegistry::default()),
            cards,
            current_prompt: None,
            transition: None,
            pending_nav: None,
            pending_collapse: false,
            pending_calls: Vec::new(),
            next_epoch: 0,
            notices: Vec::new(),
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    pub fn card(&self, prompt_id: u32) -> Option<&Card> {
        self.cards.iter().find(|c| c.prompt_id == prompt_id)
    }

    pub fn expanded_card(&self) -> Option<&Card> {
        self.cards.iter().find(|c| c.is_expanded())
    }

    pub fn current_prompt(&self) -> Option<&PromptRecord> {
        self.current_prompt.and_then(|id| self.catalog.get(id))
    }

    pub fn recent(&self) -> &RecentPrompts {
        &self.recent
    }

    pub fn active_chain(&self) -> Option<&ActiveChainState> {
        self.chains.active()
    }

    pub fn chain_registry(&self) -> &ChainRegistry {
        self.chains.registry()
    }

    pub fn chain_progress(&self) -> Vec<StepProgress> {
        self.chains.progress()
    }

    pub fn animator_name(&self) -> &'static str {
        self.animator.name()
    }

    pub fn is_animating(&self) -> bool {
        self.transition.is_some()
    }

    pub fn has_pending_navigation(&self) -> bool {
        self.pending_nav.is_some()
    }

    pub fn has_pending_calls(&self) -> bool {
        !self.pending_calls.is_empty()
    }

    /// One-time messages for the user, such as chain completion.
    pub fn take_notices(&mut self) -> Vec<String> {
        std::mem::take(&mut self.notices)
    }

    pub fn set_metrics(&mut self, metrics: GridMetrics) {
        self.metrics = metrics;
    }

    pub fn metrics(&self) -> &GridMetrics {
        &self.metrics
    }

    /// Card rectangles to draw at `now`, following any in-flight reflow.
    pub fn card_rects(&self, now: Instant) -> Vec<Rect> {
        match &self.transition {
            Some(t) => t.reflow.frame(now),
            None => self.layout(),
        }
    }

    fn layout(&self) -> Vec<Rect> {
        let placements: Vec<Placement> = self.cards.iter().map(Card::placement).collect();
        compute_layout(&self.metrics, &placements)
    }

    fn card_index(&self, prompt_id: u32) -> Option<usize> {
        self.cards.iter().position(|c| c.prompt_id == prompt_id)
    }

    fn chat_card_index(&self) -> Option<usize> {
        self.cards
            .iter()
            .position(|c| c.mode == CardMode::Chat && c.session.is_some())
    }

    /// Expands, switches or collapses one card. Requests made while another
    /// transition is in flight are dropped.
    pub fn expand(&mut self, prompt_id: u32, mode: ExpandMode, now: Instant) -> TransitionOutcome {
        if let Some(t) = &self.transition {
            tracing::debug!(
                "Transition on card {} in flight; dropping {:?} for card {}",
                t.card,
                mode,
                prompt_id
            );
            return TransitionOutcome::Ignored;
        }
        let Some(index) = self.card_index(prompt_id) else {
            tracing::warn!("No card for prompt {}; skipping {:?}", prompt_id, mode);
            return TransitionOutcome::Ignored;
        };
        let Some(record) = self.catalog.get(prompt_id).cloned() else {
            tracing::warn!("Prompt {} missing from catalog", prompt_id);
            return TransitionOutcome::Ignored;
        };

        let current = self.cards[index].mode;
        let unchanged = matches!(
            (mode, current),
            (ExpandMode::Collapse, CardMode::Collapsed)
                | (ExpandMode::Chat, CardMode::Chat)
                | (ExpandMode::Details, CardMode::Details)
        );
        if unchanged {
            return TransitionOutcome::Ignored;
        }

        let before = self.layout();

        match mode {
            ExpandMode::Collapse => {
                self.cards[index].reset();
            }
            ExpandMode::Chat => {
                self.collapse_others(index);
                self.recent.record(&record);
                let epoch = self.next_epoch();
                let card = &mut self.cards[index];
                card.mode = CardMode::Chat;
                card.dim_siblings = true;
                card.session = Some(ChatSession::new(epoch));
                self.current_prompt = Some(prompt_id);
                self.spawn_call(prompt_id, epoch, CallKind::Greeting, greeting_request(&record));
            }
            ExpandMode::Details => {
                self.collapse_others(index);
                let card = &mut self.cards[index];
                // Coming from full-screen chat keeps the siblings dimmed.
                card.dim_siblings = card.mode == CardMode::Chat;
                card.mode = CardMode::Details;
                card.session = None;
                self.current_prompt = Some(prompt_id);
            }
        }

        let after = self.layout();
        tracing::debug!("Card {} -> {:?} ({})", prompt_id, mode, self.animator.name());
        self.transition = Some(Transition {
            card: prompt_id,
            reflow: self.animator.begin(before, after, now),
        });
        TransitionOutcome::Started
    }

    pub fn try_prompt(&mut self, prompt_id: u32, now: Instant) -> TransitionOutcome {
        self.expand(prompt_id, ExpandMode::Chat, now)
    }

    pub fn view_details(&mut self, prompt_id: u32, now: Instant) -> TransitionOutcome {
        self.expand(prompt_id, ExpandMode::Details, now)
    }

    /// Collapses whichever card is expanded.
    pub fn close(&mut self, now: Instant) -> TransitionOutcome {
        match self.expanded_card().map(|c| c.prompt_id) {
            Some(id) => self.expand(id, ExpandMode::Collapse, now),
            None => TransitionOutcome::Ignored,
        }
    }

    fn collapse_others(&mut self, keep: usize) {
        for (i, card) in self.cards.iter_mut().enumerate() {
            if i != keep && card.is_expanded() {
                card.reset();
            }
        }
    }

    fn next_epoch(&mut self) -> u64 {
        self.next_epoch += 1;
        self.next_epoch
    }

    /// Advances time: ends a finished transition, then fires a due navigation
    /// once no transition holds the lock.
    pub fn tick(&mut self, now: Instant) {
        self.poll();

        let finished = self
            .transition
            .as_ref()
            .map(|t| t.reflow.is_finished(now))
            .unwrap_or(false);
        if finished {
            self.transition = None;
            if self.expanded_card().is_none() {
                self.current_prompt = None;
            }
        }

        if self.pending_collapse && self.transition.is_none() {
            self.pending_collapse = false;
            self.close(now);
        }

        if let Some(nav) = self.pending_nav {
            if now >= nav.due && self.transition.is_none() {
                self.pending_nav = None;
                self.expand(nav.prompt_id, nav.mode, now);
            }
        }
    }

    /// Closes the open card and opens `prompt_id` once the collapse is done.
    fn navigate_to(&mut self, prompt_id: u32, mode: ExpandMode, now: Instant) {
        self.pending_collapse = false;
        let due = if self.expanded_card().is_some() {
            self.close(now);
            now + NAVIGATION_DELAY
        } else {
            now
        };
        self.pending_nav = Some(PendingNavigation {
            due,
            prompt_id,
            mode,
        });
        self.tick(now);
    }

    pub fn select_suggestion(&mut self, index: usize, now: Instant) -> Option<u32> {
        let target = self
            .chat_card_index()
            .and_then(|i| self.cards[i].session.as_ref())
            .and_then(|s| s.suggestions.get(index))
            .map(|s| s.prompt_id)?;
        self.navigate_to(target, ExpandMode::Chat, now);
        Some(target)
    }

    /// Stages one file for the next message of the open chat.
    pub fn stage_attachment(&mut self, path: PathBuf) -> bool {
        let Some(index) = self.chat_card_index() else {
            return false;
        };
        match self.cards[index].session.as_mut() {
            Some(session) => {
                session.staged_file = Some(path);
                true
            }
            None => false,
        }
    }

    pub fn send_message(&mut self, text: &str) -> SendOutcome {
        let text = text.trim();
        if text.is_empty() {
            return SendOutcome::Empty;
        }
        let Some(index) = self.chat_card_index() else {
            return SendOutcome::NoSession;
        };
        let prompt_id = self.cards[index].prompt_id;
        let Some(system) = self.catalog.get(prompt_id).map(|p| p.prompt.clone()) else {
            return SendOutcome::NoSession;
        };
        let Some(session) = self.cards[index].session.as_mut() else {
            return SendOutcome::NoSession;
        };
        if session.awaiting_reply {
            return SendOutcome::Busy;
        }

        let attachment = session.staged_file.take();
        let shown = match &attachment {
            Some(path) => format!("{}\n[Attached: {}]", text, display_name(path)),
            None => text.to_string(),
        };
        session.transcript.push(ChatMessage::user(shown));
        session.transcript.push_typing();
        session.awaiting_reply = true;
        let epoch = session.epoch;

        let relay = self.relay.clone();
        let text = text.to_string();
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let message = match attachment {
                Some(path) => with_attachment(relay.as_ref(), &path, &text).await,
                None => text,
            };
            let result = relay
                .chat(ChatRequest {
                    message,
                    prompt: system,
                })
                .await;
            let _ = tx.send(result);
        });
        self.pending_calls.push(PendingCall {
            card: prompt_id,
            epoch,
            kind: CallKind::Reply,
            rx,
        });
        SendOutcome::Sent
    }

    fn spawn_call(&mut self, card: u32, epoch: u64, kind: CallKind, request: ChatRequest) {
        let relay = self.relay.clone();
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let _ = tx.send(relay.chat(request).await);
        });
        self.pending_calls.push(PendingCall {
            card,
            epoch,
            kind,
            rx,
        });
    }

    /// Applies relay results that have arrived. Returns whether anything changed.
    pub fn poll(&mut self) -> bool {
        let mut ready = Vec::new();
        self.pending_calls.retain_mut(|call| match call.rx.try_recv() {
            Ok(result) => {
                ready.push((call.card, call.epoch, call.kind, result));
                false
            }
            Err(TryRecvError::Empty) => true,
            Err(TryRecvError::Closed) => {
                ready.push((call.card, call.epoch, call.kind, Err(RelayError::Interrupted)));
                false
            }
        });

        let changed = !ready.is_empty();
        for (card, epoch, kind, result) in ready {
            self.apply_result(card, epoch, kind, result);
        }
        changed
    }

    fn apply_result(
        &mut self,
        card: u32,
        epoch: u64,
        kind: CallKind,
        result: Result<String, RelayError>,
    ) {
        let Some(index) = self.card_index(card) else {
            return;
        };
        let Some(session) = self.cards[index]
            .session
            .as_mut()
            .filter(|s| s.epoch == epoch)
        else {
            tracing::debug!("Discarding {:?} result for closed session on card {}", kind, card);
            return;
        };

        let mut wants_suggestions = false;
        match kind {
            CallKind::Greeting => {
                let text = match result {
                    Ok(text) if !text.trim().is_empty() => text,
                    Ok(_) => FALLBACK_GREETING.to_string(),
                    Err(err) => {
                        tracing::warn!("Greeting failed for prompt {}: {}", card, err);
                        FALLBACK_GREETING.to_string()
                    }
                };
                session.transcript.resolve_typing(ChatMessage::ai(text));
                session.awaiting_reply = false;
            }
            CallKind::Reply => {
                let text = match result {
                    Ok(text) if !text.trim().is_empty() => text,
                    Ok(_) => EMPTY_REPLY_MESSAGE.to_string(),
                    Err(err) => {
                        tracing::warn!("Chat turn failed for prompt {}: {}", card, err);
                        CONNECTIVITY_FAILURE_MESSAGE.to_string()
                    }
                };
                session.transcript.resolve_typing(ChatMessage::ai(text));
                session.awaiting_reply = false;
                wants_suggestions = !session.suggestions_requested
                    && session.transcript.real_len() >= SUGGESTION_THRESHOLD;
            }
            CallKind::Suggestions => {
                session.suggestions_loading = false;
                match result {
                    Ok(text) => {
                        session.suggestions = parse_suggestions(&text, &self.catalog, Some(card));
                        tracing::info!(
                            "{} follow-up suggestions for prompt {}",
                            session.suggestions.len(),
                            card
                        );
                    }
                    Err(err) => tracing::warn!("Suggestion request failed: {}", err),
                }
            }
        }

        if wants_suggestions {
            self.request_suggestions(index);
        }
    }

    fn request_suggestions(&mut self, index: usize) {
        let card = &mut self.cards[index];
        let prompt_id = card.prompt_id;
        let Some(session) = card.session.as_mut() else {
            return;
        };
        let Some(record) = self.catalog.get(prompt_id) else {
            return;
        };
        let request = build_suggestion_request(record, &session.transcript, &self.catalog);
        session.suggestions_requested = true;
        session.suggestions_loading = true;
        let epoch = session.epoch;
        self.spawn_call(prompt_id, epoch, CallKind::Suggestions, request);
    }

    /// Waits for every outstanding relay call and applies the results.
    pub async fn settle(&mut self) {
        while !self.pending_calls.is_empty() {
            tokio::task::yield_now().await;
            self.poll();
        }
    }

    pub fn export_chat(&self, exported_at: DateTime<Utc>) -> Option<TranscriptExport> {
        let card = &self.cards[self.chat_card_index()?];
        let record = self.catalog.get(card.prompt_id)?;
        let session = card.session.as_ref()?;
        Some(export_transcript(record, &session.transcript, exported_at))
    }

    pub fn clear_recent(&mut self) {
        self.recent.clear();
    }

    /// Starts a chain and opens its first step in chat.
    pub fn start_chain(&mut self, chain_key: &str, now: Instant) -> Result<Option<u32>, ChainError> {
        let prompt_id = self.chains.start(chain_key, &self.catalog)?.current_prompt_id;
        match prompt_id {
            Some(id) => self.navigate_to(id, ExpandMode::Chat, now),
            None => tracing::warn!("First step of chain {} is not in the catalog", chain_key),
        }
        Ok(prompt_id)
    }

    pub fn advance_chain(&mut self, now: Instant) -> Result<ChainAdvance, ChainError> {
        let advance = self.chains.advance(&self.catalog)?;
        match &advance {
            ChainAdvance::Next {
                prompt_id: Some(id),
                ..
            } => self.navigate_to(*id, ExpandMode::Chat, now),
            ChainAdvance::Next {
                step,
                prompt_id: None,
            } => tracing::warn!("Chain step {} is not in the catalog", step),
            ChainAdvance::Completed { notice, .. } => {
                self.notices.push(notice.clone());
                // A step queued by an earlier advance must not open after completion.
                self.pending_nav = None;
                if self.close(now) == TransitionOutcome::Ignored && self.transition.is_some() {
                    self.pending_collapse = true;
                }
            }
        }
        Ok(advance)
    }

    pub fn cancel_chain<F>(&mut self, confirm: F) -> bool
    where
        F: FnOnce(&ActiveChainState) -> bool,
    {
        self.chains.cancel(confirm)
    }
}

fn greeting_request(record: &PromptRecord) -> ChatRequest {
    let message = format!(
        "I'd like to use the \"{}\" prompt. {}\n\nGreet me briefly, then ask me for the specific information you need from me to get started. Do not produce the final result yet.",
        record.title, record.description
    );
    ChatRequest {
        message,
        prompt: record.prompt.clone(),
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Uploads the staged file, then prefixes the message with what happened.
async fn with_attachment(relay: &dyn Relay, path: &Path, text: &str) -> String {
    let note = match UploadFile::from_path(path).await {
        Ok(file) => match relay.upload(file).await {
            Ok(receipt) => format!(
                "[Attached file: {} ({}, {} bytes)]",
                receipt.file.name, receipt.file.mime, receipt.file.size
            ),
            Err(err) => {
                tracing::warn!("Upload of {} failed: {}", path.display(), err);
                format!("[File upload failed: {}]", err)
            }
        },
        Err(err) => {
            tracing::warn!("Could not read {}: {}", path.display(), err);
            format!("[File upload failed: could not read {}: {}]", display_name(path), err)
        }
    };
    format!("{}\n\n{}", note, text)
}
