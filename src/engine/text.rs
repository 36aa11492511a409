//! Character-offset helpers. Every offset in the engine counts `char`s.

pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

pub fn char_to_byte_idx(text: &str, char_idx: usize) -> usize {
    if char_idx == 0 {
        return 0;
    }
    for (count, (byte_idx, _)) in text.char_indices().enumerate() {
        if count == char_idx {
            return byte_idx;
        }
    }
    text.len()
}

pub fn slice_chars(text: &str, start: usize, end: usize) -> &str {
    let start_byte = char_to_byte_idx(text, start);
    let end_byte = char_to_byte_idx(text, end.max(start));
    &text[start_byte..end_byte]
}

pub fn split_at_char(text: &str, offset: usize) -> (&str, &str) {
    text.split_at(char_to_byte_idx(text, offset))
}

/// Char index of the last occurrence of `needle` that ends at or before `offset`.
pub fn last_index_before(text: &str, offset: usize, needle: &str) -> Option<usize> {
    let before = slice_chars(text, 0, offset);
    let byte_idx = before.rfind(needle)?;
    Some(before[..byte_idx].chars().count())
}

pub(crate) fn is_word_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_'
}

pub fn previous_word_boundary(text: &str, offset: usize) -> usize {
    let chars: Vec<char> = text.chars().collect();
    let mut idx = offset.min(chars.len());
    if idx == 0 {
        return 0;
    }

    while idx > 0 && chars[idx - 1].is_whitespace() {
        idx -= 1;
    }
    if idx == 0 {
        return 0;
    }

    while idx > 0 && is_word_char(chars[idx - 1]) {
        idx -= 1;
    }
    if idx > 0 && !is_word_char(chars[idx - 1]) && !chars[idx - 1].is_whitespace() {
        while idx > 0 && !is_word_char(chars[idx - 1]) && !chars[idx - 1].is_whitespace() {
            idx -= 1;
        }
    }
    idx
}

pub fn next_word_boundary(text: &str, offset: usize) -> usize {
    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();
    let mut idx = offset.min(len);
    if idx >= len {
        return len;
    }

    if chars[idx].is_whitespace() {
        while idx < len && chars[idx].is_whitespace() {
            idx += 1;
        }
        return idx;
    }

    while idx < len && is_word_char(chars[idx]) {
        idx += 1;
    }
    while idx < len && !chars[idx].is_whitespace() && !is_word_char(chars[idx]) {
        idx += 1;
    }
    while idx < len && chars[idx].is_whitespace() {
        idx += 1;
    }
    idx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_index_counts_chars_not_bytes() {
        assert_eq!(last_index_before("héllo @wör", 10, "@"), Some(6));
        assert_eq!(last_index_before("a@b@c", 3, "@"), Some(1));
        assert_eq!(last_index_before("abc", 3, "@"), None);
    }

    #[test]
    fn word_boundaries_skip_whitespace() {
        assert_eq!(previous_word_boundary("hello world", 11), 6);
        assert_eq!(previous_word_boundary("hello world", 6), 0);
        assert_eq!(next_word_boundary("foo bar baz", 0), 4);
        assert_eq!(next_word_boundary("foo bar baz", 8), 11);
    }

    #[test]
    fn slicing_clamps_to_text() {
        assert_eq!(slice_chars("añb", 1, 9), "ñb");
        assert_eq!(split_at_char("añb", 2), ("añ", "b"));
    }
}
