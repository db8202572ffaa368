//! Single-line chat input editing. Cursor positions count chars, not bytes.

use ratatui::layout::Rect;

pub fn split_line_at_char(line: &str, idx: usize) -> (String, Option<char>, String) {
    let mut before = String::new();
    let mut current = None;
    let mut after = String::new();

    for (i, ch) in line.chars().enumerate() {
        if i < idx {
            before.push(ch);
        } else if i == idx {
            current = Some(ch);
        } else {
            after.push(ch);
        }
    }

    (before, current, after)
}

pub fn char_count(text: &str) -> usize {
    text.chars().count()
}

fn byte_index(text: &str, char_idx: usize) -> usize {
    if char_idx == 0 {
        return 0;
    }
    if let Some((idx, _)) = text.char_indices().nth(char_idx) {
        return idx;
    }
    text.len()
}

pub fn insert_char_at_cursor(text: &mut String, cursor: &mut usize, ch: char) {
    // Pasted newlines would break the one-line input.
    let ch = if ch == '\n' || ch == '\r' { ' ' } else { ch };
    let idx = byte_index(text, *cursor);
    text.insert(idx, ch);
    *cursor += 1;
}

pub fn delete_char_before_cursor(text: &mut String, cursor: &mut usize) {
    if *cursor == 0 {
        return;
    }
    let start = byte_index(text, *cursor - 1);
    let end = byte_index(text, *cursor);
    if start < end {
        text.replace_range(start..end, "");
        *cursor -= 1;
    }
}

pub fn delete_char_at_cursor(text: &mut String, cursor: &mut usize) {
    let len = char_count(text);
    if *cursor >= len {
        return;
    }
    let start = byte_index(text, *cursor);
    let end = byte_index(text, *cursor + 1);
    if start < end {
        text.replace_range(start..end, "");
    }
}

/// Ctrl+W: removes the word left of the cursor plus trailing spaces.
pub fn delete_word_before_cursor(text: &mut String, cursor: &mut usize) {
    let chars: Vec<char> = text.chars().collect();
    let mut start = (*cursor).min(chars.len());
    while start > 0 && chars[start - 1] == ' ' {
        start -= 1;
    }
    while start > 0 && chars[start - 1] != ' ' {
        start -= 1;
    }
    let from = byte_index(text, start);
    let to = byte_index(text, *cursor);
    text.replace_range(from..to, "");
    *cursor = start;
}

pub fn point_in_rect(rect: Rect, col: u16, row: u16) -> bool {
    col >= rect.x
        && col < rect.x.saturating_add(rect.width)
        && row >= rect.y
        && row < rect.y.saturating_add(rect.height)
}

/// `area` is the input line including its prompt prefix.
pub fn set_cursor_from_click(text: &str, cursor: &mut usize, area: Rect, col: u16, prefix_len: u16) {
    if area.width == 0 {
        return;
    }
    let col_in_text = col.saturating_sub(area.x).saturating_sub(prefix_len) as usize;
    *cursor = col_in_text.min(char_count(text));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_delete_respect_multibyte_chars() {
        let mut text = String::from("héllo");
        let mut cursor = 2;
        insert_char_at_cursor(&mut text, &mut cursor, 'X');
        assert_eq!(text, "héXllo");
        assert_eq!(cursor, 3);

        delete_char_before_cursor(&mut text, &mut cursor);
        delete_char_before_cursor(&mut text, &mut cursor);
        assert_eq!(text, "hllo");
        assert_eq!(cursor, 1);

        delete_char_at_cursor(&mut text, &mut cursor);
        assert_eq!(text, "hlo");
    }

    #[test]
    fn pasted_newlines_become_spaces() {
        let mut text = String::new();
        let mut cursor = 0;
        for ch in "a\nb".chars() {
            insert_char_at_cursor(&mut text, &mut cursor, ch);
        }
        assert_eq!(text, "a b");
    }

    #[test]
    fn delete_word_stops_at_previous_space() {
        let mut text = String::from("grade the essays  ");
        let mut cursor = char_count(&text);
        delete_word_before_cursor(&mut text, &mut cursor);
        assert_eq!(text, "grade the ");
        assert_eq!(cursor, 10);
    }

    #[test]
    fn click_maps_to_clamped_column() {
        let area = Rect::new(10, 5, 40, 1);
        let mut cursor = 0;
        set_cursor_from_click("hello", &mut cursor, area, 15, 3);
        assert_eq!(cursor, 2);
        set_cursor_from_click("hello", &mut cursor, area, 45, 3);
        assert_eq!(cursor, 5);
        assert!(point_in_rect(area, 10, 5));
        assert!(!point_in_rect(area, 50, 5));
    }
}
