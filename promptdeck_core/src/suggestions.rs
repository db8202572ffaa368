use crate::catalog::{Catalog, PromptRecord};
use crate::relay::ChatRequest;
use crate::transcript::{Sender, Transcript};
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

pub const MAX_SUGGESTIONS: usize = 3;
pub const SUGGESTION_CONTEXT_MESSAGES: usize = 6;
/// Non-placeholder messages needed before follow-ups are requested.
pub const SUGGESTION_THRESHOLD: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suggestion {
    pub prompt_id: u32,
    pub title: String,
    pub author: String,
    pub reason: String,
}

pub fn build_suggestion_request(
    current: &PromptRecord,
    transcript: &Transcript,
    catalog: &Catalog,
) -> ChatRequest {
    let conversation = transcript
        .tail(SUGGESTION_CONTEXT_MESSAGES)
        .iter()
        .map(|m| {
            let who = match m.sender {
                Sender::User => "User",
                Sender::Ai => "Assistant",
            };
            format!("{}: {}", who, truncate_chars(&m.content, 400))
        })
        .collect::<Vec<_>>()
        .join("\n");

    let available = catalog
        .prompts()
        .iter()
        .filter(|p| p.id != current.id)
        .map(|p| format!("- {} | {} | {}", p.title, p.author, p.description))
        .collect::<Vec<_>>()
        .join("\n");

    let system = format!(
        r#"You recommend follow-up prompts from a fixed catalog of teaching prompts.
Choose exactly {count} prompts from the list below that would help this educator next.

### Available prompts (title | author | description):
{available}

Output format, one line per suggestion and nothing else:
SUGGESTION 1: Title|Author|One sentence reason
SUGGESTION 2: Title|Author|One sentence reason
SUGGESTION 3: Title|Author|One sentence reason
"#,
        count = MAX_SUGGESTIONS,
        available = available,
    );

    let message = format!(
        "The educator has been using the prompt \"{}\".\n\n### Recent conversation:\n{}\n\nWhich {} prompts should they try next?",
        current.title, conversation, MAX_SUGGESTIONS
    );

    ChatRequest {
        message,
        prompt: system,
    }
}

/// Parses `SUGGESTION n: Title|Author|Reason` lines. Lines that do not
/// follow the format or do not name a catalog prompt are dropped.
pub fn parse_suggestions(
    response: &str,
    catalog: &Catalog,
    exclude_id: Option<u32>,
) -> Vec<Suggestion> {
    static LINE_RE: OnceLock<Regex> = OnceLock::new();
    let line_re =
        LINE_RE.get_or_init(|| Regex::new(r"(?i)^\W*suggestion\s*\d+\s*[:.)-]\s*(.+)$").unwrap());

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for raw_line in response.lines() {
        if out.len() >= MAX_SUGGESTIONS {
            break;
        }
        let Some(caps) = line_re.captures(raw_line.trim()) else {
            continue;
        };
        let Some(body) = caps.get(1) else {
            continue;
        };
        let mut parts = body.as_str().split('|').map(str::trim);
        let title = parts.next().unwrap_or_default();
        let author = parts.next().unwrap_or_default();
        let reason = parts.collect::<Vec<_>>().join(" | ");

        let Some(record) = catalog.fuzzy_find_title(title) else {
            tracing::debug!("Dropping suggestion with unknown title: {}", title);
            continue;
        };
        if Some(record.id) == exclude_id || !seen.insert(record.id) {
            continue;
        }
        out.push(Suggestion {
            prompt_id: record.id,
            title: record.title.clone(),
            author: if author.is_empty() {
                record.author.clone()
            } else {
                author.to_string()
            },
            reason,
        });
    }
    out
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::ChatMessage;

    #[test]
    fn parses_well_formed_lines_and_drops_noise() {
        let catalog = Catalog::builtin().unwrap();
        let response = "Here are my picks:\n\
SUGGESTION 1: Create Diagnostic Quiz|Cynthia Alby|Check prior knowledge first.\n\
SUGGESTION 2: Underwater Basket Weaving|Nobody|Not real.\n\
garbage line\n\
**SUGGESTION 3:** Grade Student Work with Rubrics|Bruce Ellis|Close the loop.\n\
SUGGESTION 4: Design Class Plan|Lilach Mollick|Plan it.\n\
SUGGESTION 5: Student Reflection Coach|Blake|Reflect.";

        let parsed = parse_suggestions(response, &catalog, None);
        let ids: Vec<u32> = parsed.iter().map(|s| s.prompt_id).collect();
        assert_eq!(ids, vec![6, 10, 8]);
        assert_eq!(parsed[0].reason, "Check prior knowledge first.");
        assert_eq!(parsed[0].author, "Cynthia Alby");
    }

    #[test]
    fn excludes_current_prompt_and_duplicates() {
        let catalog = Catalog::builtin().unwrap();
        let response = "SUGGESTION 1: Design Class Plan|x|y\n\
SUGGESTION 2: create diagnostic quiz|x|y\n\
SUGGESTION 3: Create Diagnostic Quiz|x|y";
        let parsed = parse_suggestions(response, &catalog, Some(8));
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].title, "Create Diagnostic Quiz");
    }

    #[test]
    fn missing_author_falls_back_to_catalog() {
        let catalog = Catalog::builtin().unwrap();
        let parsed = parse_suggestions("SUGGESTION 1: Improve Class Slides", &catalog, None);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].author, "Dan Levy, Harvard Kennedy School");
        assert!(parsed[0].reason.is_empty());
    }

    #[test]
    fn request_uses_last_six_messages_and_omits_current_prompt() {
        let catalog = Catalog::builtin().unwrap();
        let current = catalog.get(1).unwrap();
        let mut transcript = Transcript::new();
        for i in 0..8 {
            transcript.push(ChatMessage::user(format!("turn-{}", i)));
        }

        let request = build_suggestion_request(current, &transcript, &catalog);
        assert!(!request.message.contains("turn-1"));
        assert!(request.message.contains("turn-2"));
        assert!(request.message.contains("turn-7"));
        assert!(request.prompt.contains("SUGGESTION 1: Title|Author|"));
        assert!(!request.prompt.contains(&format!("- {} |", current.title)));
    }
}
