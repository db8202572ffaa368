//! Minimal markdown to HTML conversion for AI-authored chat messages.
//!
//! Supported: `**bold**`, `*italic*`, numbered and bulleted list lines
//! (collapsed into one list block per run), and blank-line separated
//! paragraphs. Anything else passes through as escaped text.

use regex::Regex;
use std::sync::OnceLock;

enum Block {
    Paragraph(Vec<String>),
    List(Vec<String>),
}

pub fn format_markdown(text: &str) -> String {
    let ordered = has_numbered_items(text);
    let list_tag = if ordered { "ol" } else { "ul" };

    let mut blocks: Vec<Block> = Vec::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            // Blank lines end prose runs but not list runs.
            if let Some(Block::Paragraph(_)) = blocks.last() {
                blocks.push(Block::Paragraph(Vec::new()));
            }
            continue;
        }

        if let Some(item) = list_item_text(line) {
            match blocks.last_mut() {
                Some(Block::List(items)) => items.push(item.to_string()),
                _ => blocks.push(Block::List(vec![item.to_string()])),
            }
            continue;
        }

        match blocks.last_mut() {
            Some(Block::Paragraph(lines)) => lines.push(line.trim().to_string()),
            _ => blocks.push(Block::Paragraph(vec![line.trim().to_string()])),
        }
    }

    let mut out = String::new();
    for block in blocks {
        match block {
            Block::Paragraph(lines) if lines.is_empty() => {}
            Block::Paragraph(lines) => {
                let body: Vec<String> = lines.iter().map(|l| format_inline(l)).collect();
                out.push_str("<p>");
                out.push_str(&body.join("<br>"));
                out.push_str("</p>");
            }
            Block::List(items) => {
                out.push('<');
                out.push_str(list_tag);
                out.push('>');
                for item in items {
                    out.push_str("<li>");
                    out.push_str(&format_inline(&item));
                    out.push_str("</li>");
                }
                out.push_str("</");
                out.push_str(list_tag);
                out.push('>');
            }
        }
    }
    out
}

fn numbered_item_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*\d+[.)]\s+(.*)$").unwrap())
}

fn bullet_item_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*[-*•]\s+(.*)$").unwrap())
}

fn has_numbered_items(text: &str) -> bool {
    text.lines().any(|l| numbered_item_re().is_match(l))
}

fn list_item_text(line: &str) -> Option<&str> {
    numbered_item_re()
        .captures(line)
        .or_else(|| bullet_item_re().captures(line))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
}

fn format_inline(text: &str) -> String {
    static BOLD_RE: OnceLock<Regex> = OnceLock::new();
    static ITALIC_RE: OnceLock<Regex> = OnceLock::new();
    let bold_re = BOLD_RE.get_or_init(|| Regex::new(r"\*\*(.+?)\*\*").unwrap());
    let italic_re = ITALIC_RE.get_or_init(|| Regex::new(r"\*([^*]+?)\*").unwrap());

    let escaped = escape_html(text);
    let bolded = bold_re.replace_all(&escaped, "<strong>$1</strong>");
    italic_re.replace_all(&bolded, "<em>$1</em>").into_owned()
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}
