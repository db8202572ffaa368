//! Turns the formatter's chat HTML (`p`, `br`, `ol`/`ul`/`li`, `strong`,
//! `em`) into styled terminal lines.

use ratatui::style::Style;
use ratatui::text::{Line, Span};

use crate::theme::Theme;

enum Token<'a> {
    Open(&'a str),
    Close(&'a str),
    Text(&'a str),
}

fn tokenize(html: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut rest = html;
    while !rest.is_empty() {
        match rest.find('<') {
            Some(0) => match rest.find('>') {
                Some(end) => {
                    let tag = rest[1..end].trim();
                    match tag.strip_prefix('/') {
                        Some(name) => tokens.push(Token::Close(name.trim())),
                        None => tokens.push(Token::Open(tag.trim_end_matches('/').trim())),
                    }
                    rest = &rest[end + 1..];
                }
                None => {
                    tokens.push(Token::Text(rest));
                    rest = "";
                }
            },
            Some(idx) => {
                tokens.push(Token::Text(&rest[..idx]));
                rest = &rest[idx..];
            }
            None => {
                tokens.push(Token::Text(rest));
                rest = "";
            }
        }
    }
    tokens
}

fn unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

struct LineBuilder {
    lines: Vec<Line<'static>>,
    current: Vec<Span<'static>>,
}

impl LineBuilder {
    fn flush(&mut self) {
        if !self.current.is_empty() {
            self.lines.push(Line::from(std::mem::take(&mut self.current)));
        }
    }

    fn blank(&mut self) {
        self.flush();
        if self.lines.last().map(|l| l.width() > 0).unwrap_or(false) {
            self.lines.push(Line::from(""));
        }
    }
}

pub fn render_markup(html: &str, theme: &Theme, indent: &str) -> Vec<Line<'static>> {
    let mut out = LineBuilder {
        lines: Vec::new(),
        current: Vec::new(),
    };
    let mut bold = false;
    let mut italic = false;
    let mut ordered: Option<usize> = None;
    let mut in_list = false;

    for token in tokenize(html) {
        match token {
            Token::Open("p") => out.flush(),
            Token::Close("p") => out.blank(),
            Token::Open("br") => out.flush(),
            Token::Open("ol") => {
                out.flush();
                in_list = true;
                ordered = Some(0);
            }
            Token::Open("ul") => {
                out.flush();
                in_list = true;
                ordered = None;
            }
            Token::Close("ol") | Token::Close("ul") => {
                in_list = false;
                ordered = None;
                out.blank();
            }
            Token::Open("li") => {
                out.flush();
                let marker = match ordered.as_mut() {
                    Some(n) => {
                        *n += 1;
                        format!("{}{}. ", indent, n)
                    }
                    None if in_list => format!("{}• ", indent),
                    None => format!("{}- ", indent),
                };
                out.current.push(Span::styled(marker, theme.ai_label_style));
            }
            Token::Close("li") => out.flush(),
            Token::Open("strong") | Token::Open("b") => bold = true,
            Token::Close("strong") | Token::Close("b") => bold = false,
            Token::Open("em") | Token::Open("i") => italic = true,
            Token::Close("em") | Token::Close("i") => italic = false,
            Token::Open(_) | Token::Close(_) => {}
            Token::Text(text) => {
                let style: Style = if bold {
                    theme.strong_style
                } else if italic {
                    theme.emphasis_style
                } else {
                    theme.message_text_style
                };
                if out.current.is_empty() {
                    out.current.push(Span::raw(indent.to_string()));
                }
                out.current.push(Span::styled(unescape(text), style));
            }
        }
    }

    out.flush();
    while out.lines.last().map(|l| l.width() == 0).unwrap_or(false) {
        out.lines.pop();
    }
    out.lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use promptdeck_core::format_markdown;

    fn plain(lines: &[Line<'_>]) -> Vec<String> {
        lines
            .iter()
            .map(|l| l.spans.iter().map(|s| s.content.as_ref()).collect())
            .collect()
    }

    #[test]
    fn paragraphs_and_breaks_become_lines() {
        let theme = Theme::dark();
        let lines = render_markup(&format_markdown("Line one\nline two\n\nNext"), &theme, "");
        assert_eq!(plain(&lines), vec!["Line one", "line two", "", "Next"]);
    }

    #[test]
    fn ordered_lists_are_numbered() {
        let theme = Theme::dark();
        let html = format_markdown("Steps:\n1. plan\n2. **teach**");
        let lines = render_markup(&html, &theme, "  ");
        assert_eq!(
            plain(&lines),
            vec!["  Steps:", "", "  1. plan", "  2. teach"]
        );
        let teach = lines[3].spans.last().unwrap();
        assert_eq!(teach.style, theme.strong_style);
    }

    #[test]
    fn bullets_and_entities() {
        let theme = Theme::light();
        let html = format_markdown("- a &lt; b\n- *soft*");
        let lines = render_markup(&html, &theme, "");
        assert_eq!(plain(&lines), vec!["• a &lt; b", "• soft"]);
        assert_eq!(lines[1].spans.last().unwrap().style, theme.emphasis_style);
    }
}
