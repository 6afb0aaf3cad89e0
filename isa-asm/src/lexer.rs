//! Per-line cleaning: strip comments, drop blank lines, normalize punctuation and
//! tokenize on whitespace. One line in, zero-or-more tokens out.

/// Cleans a single source line into its whitespace-separated tokens, or `None` if
/// the line is blank or comment-only.
///
/// Mirrors the reference cleaning step exactly: drop everything from `;` onward,
/// trim, bail out on empty/comment lines, replace `,` and `=` with spaces, then
/// split on whitespace.
pub fn clean_line(raw: &str) -> Option<Vec<String>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.starts_with(';') {
        return None;
    }

    let without_comment = raw.split(';').next().unwrap_or("").trim();
    if without_comment.is_empty() {
        return None;
    }

    let normalized = without_comment.replace(',', " ").replace('=', " ");
    let tokens: Vec<String> = normalized.split_whitespace().map(str::to_string).collect();
    if tokens.is_empty() {
        None
    } else {
        Some(tokens)
    }
}

/// Tokenizes a whole source file, tagging surviving lines with their 1-based
/// source line number so later passes can report precise error locations.
pub fn clean_source(source: &str) -> Vec<(usize, Vec<String>)> {
    source
        .lines()
        .enumerate()
        .filter_map(|(i, line)| clean_line(line).map(|tokens| (i + 1, tokens)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_comments_and_blank_lines() {
        assert_eq!(clean_line("  ; a full comment"), None);
        assert_eq!(clean_line("   "), None);
        assert_eq!(clean_line(""), None);
    }

    #[test]
    fn splits_commas_and_equals() {
        let tokens = clean_line("LD R0, 30 ; load thirty").unwrap();
        assert_eq!(tokens, vec!["LD", "R0", "30"]);

        let tokens = clean_line("x = 5").unwrap();
        assert_eq!(tokens, vec!["x", "5"]);
    }

    #[test]
    fn preserves_char_literal_as_one_token() {
        let tokens = clean_line(".byte 'a' 10").unwrap();
        assert_eq!(tokens, vec![".byte", "'a'", "10"]);
    }

    #[test]
    fn clean_source_tags_line_numbers() {
        let src = "NOP\n; comment\n\nHALT\n";
        let lines = clean_source(src);
        assert_eq!(lines, vec![(1, vec!["NOP".to_string()]), (4, vec!["HALT".to_string()])]);
    }
}
