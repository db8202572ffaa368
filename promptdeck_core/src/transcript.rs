use crate::catalog::PromptRecord;
use crate::markdown::format_markdown;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sender {
    User,
    Ai,
}

impl Sender {
    pub fn label(self) -> &'static str {
        match self {
            Sender::User => "You",
            Sender::Ai => "AI",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub sender: Sender,
    /// Raw text as typed or as returned by the relay.
    pub content: String,
    /// Rendered markup; only set for AI messages.
    pub html: Option<String>,
    pub placeholder: bool,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            sender: Sender::User,
            content: content.into(),
            html: None,
            placeholder: false,
        }
    }

    pub fn ai(content: impl Into<String>) -> Self {
        let content = content.into();
        let html = Some(format_markdown(&content));
        Self {
            sender: Sender::Ai,
            content,
            html,
            placeholder: false,
        }
    }

    pub fn typing() -> Self {
        Self {
            sender: Sender::Ai,
            content: String::new(),
            html: None,
            placeholder: true,
        }
    }
}

/// Ordered chat messages for one card session.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    messages: Vec<ChatMessage>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    pub fn push_typing(&mut self) {
        self.messages.push(ChatMessage::typing());
    }

    /// Replaces the most recent typing placeholder, or appends when none is left.
    pub fn resolve_typing(&mut self, message: ChatMessage) {
        match self.messages.iter().rposition(|m| m.placeholder) {
            Some(idx) => self.messages[idx] = message,
            None => self.messages.push(message),
        }
    }

    pub fn is_typing(&self) -> bool {
        self.messages.iter().any(|m| m.placeholder)
    }

    pub fn real_messages(&self) -> impl Iterator<Item = &ChatMessage> {
        self.messages.iter().filter(|m| !m.placeholder)
    }

    pub fn real_len(&self) -> usize {
        self.real_messages().count()
    }

    /// The last `n` non-placeholder messages, oldest first.
    pub fn tail(&self, n: usize) -> Vec<&ChatMessage> {
        let real: Vec<&ChatMessage> = self.real_messages().collect();
        let start = real.len().saturating_sub(n);
        real[start..].to_vec()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptExport {
    pub filename: String,
    pub contents: String,
}

pub fn export_transcript(
    prompt: &PromptRecord,
    transcript: &Transcript,
    exported_at: DateTime<Utc>,
) -> TranscriptExport {
    let mut out = String::new();
    out.push_str(&format!("Conversation: {}\n", prompt.title));
    if !prompt.author.is_empty() {
        out.push_str(&format!("Prompt by: {}\n", prompt.author));
    }
    out.push_str(&format!(
        "Exported: {}\n",
        exported_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    out.push_str(&"=".repeat(60));
    out.push_str("\n\n");

    for message in transcript.real_messages() {
        out.push_str(&format!("{}:\n{}\n\n", message.sender.label(), message.content));
    }

    TranscriptExport {
        filename: export_filename(&prompt.title, exported_at),
        contents: out,
    }
}

pub fn export_filename(title: &str, exported_at: DateTime<Utc>) -> String {
    let sanitized: String = title
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!(
        "{}_conversation_{}.txt",
        sanitized,
        exported_at.format("%Y-%m-%d")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> PromptRecord {
        PromptRecord {
            id: 1,
            title: "Design Class Plan".to_string(),
            description: String::new(),
            category: String::new(),
            author: "Lilach Mollick".to_string(),
            chapter: String::new(),
            prompt: "You plan lessons.".to_string(),
            tags: Vec::new(),
            difficulty: None,
            time: None,
        }
    }

    fn at() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-04-12T15:30:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn export_lists_messages_in_order_under_header() {
        let mut transcript = Transcript::new();
        transcript.push(ChatMessage::user("Hi"));
        transcript.push(ChatMessage::ai("Hello"));
        transcript.push_typing();

        let export = export_transcript(&record(), &transcript, at());
        let header_end = export.contents.find("====").unwrap();
        let header = &export.contents[..header_end];
        assert!(header.contains("Design Class Plan"));
        assert!(header.contains("2026-04-12 15:30:00"));

        let hi = export.contents.find("Hi").unwrap();
        let hello = export.contents.find("Hello").unwrap();
        assert!(header_end < hi && hi < hello);
        assert_eq!(
            export.filename,
            "Design_Class_Plan_conversation_2026-04-12.txt"
        );
    }

    #[test]
    fn filename_replaces_every_non_alphanumeric() {
        assert_eq!(
            export_filename("Generate Explanations, Examples, and Analogies", at()),
            "Generate_Explanations__Examples__and_Analogies_conversation_2026-04-12.txt"
        );
    }

    #[test]
    fn typing_placeholder_is_replaced_in_place() {
        let mut transcript = Transcript::new();
        transcript.push(ChatMessage::user("Question"));
        transcript.push_typing();
        assert!(transcript.is_typing());
        assert_eq!(transcript.real_len(), 1);

        transcript.resolve_typing(ChatMessage::ai("**Answer**"));
        assert!(!transcript.is_typing());
        assert_eq!(transcript.messages().len(), 2);
        assert_eq!(
            transcript.messages()[1].html.as_deref(),
            Some("<p><strong>Answer</strong></p>")
        );
    }

    #[test]
    fn tail_skips_placeholders() {
        let mut transcript = Transcript::new();
        for i in 0..8 {
            transcript.push(ChatMessage::user(format!("m{}", i)));
        }
        transcript.push_typing();
        let tail: Vec<&str> = transcript
            .tail(6)
            .iter()
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(tail, vec!["m2", "m3", "m4", "m5", "m6", "m7"]);
    }
}
