//! Character-budget text wrapping for marks
//!
//! Mark text is wrapped before rasterization. Wrapping works on
//! character counts rather than glyph advances, and never breaks a
//! `$...$` math span (or the punctuation that trails it) across lines.

/// Punctuation that stays glued to a preceding math span.
const MATH_TRAILING_PUNCTUATION: &[char] = &[
    '.', ',', ';', ':', '!', '?', '，', '。', '；', '：', '！', '？',
];

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Space,
    Word(String),
}

/// Wrap `text` so that no line is longer than `width` characters.
///
/// Explicit line breaks are kept: every input line is wrapped on its own
/// and the results are joined with `\n`. A single token longer than
/// `width` is never split; it occupies a line of its own. Lines that
/// contain nothing but whitespace produce no output.
pub fn wrap_text(text: &str, width: usize) -> String {
    split_lines(text)
        .into_iter()
        .flat_map(|line| wrap_line(line, width))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Split on `\n`, `\r\n` and bare `\r`.
fn split_lines(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut lines = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'\n' => {
                lines.push(&text[start..i]);
                i += 1;
                start = i;
            }
            b'\r' => {
                lines.push(&text[start..i]);
                i += 1;
                if bytes.get(i) == Some(&b'\n') {
                    i += 1;
                }
                start = i;
            }
            _ => i += 1,
        }
    }

    if start < text.len() {
        lines.push(&text[start..]);
    }
    lines
}

fn tokenize(line: &str) -> Vec<Token> {
    let chars: Vec<char> = line.chars().collect();
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];

        if ch.is_whitespace() {
            if !current.is_empty() {
                tokens.push(Token::Word(std::mem::take(&mut current)));
            }
            while i < chars.len() && chars[i].is_whitespace() {
                i += 1;
            }
            tokens.push(Token::Space);
            continue;
        }

        if ch == '$' {
            if !current.is_empty() {
                tokens.push(Token::Word(std::mem::take(&mut current)));
            }
            if let Some(offset) = chars[i + 1..].iter().position(|&c| c == '$') {
                let end = i + 1 + offset;
                let mut span: String = chars[i..=end].iter().collect();
                i = end + 1;
                while i < chars.len() && MATH_TRAILING_PUNCTUATION.contains(&chars[i]) {
                    span.push(chars[i]);
                    i += 1;
                }
                tokens.push(Token::Word(span));
                continue;
            }
            // Unclosed `$` is ordinary text
        }

        current.push(ch);
        i += 1;
    }

    if !current.is_empty() {
        tokens.push(Token::Word(current));
    }
    tokens
}

fn wrap_line(line: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for token in tokenize(line) {
        match token {
            Token::Space => {
                if current.is_empty() || current.ends_with(' ') {
                    continue;
                }
                if current_len + 1 > width {
                    lines.push(current.trim_end().to_string());
                    current.clear();
                    current_len = 0;
                } else {
                    current.push(' ');
                    current_len += 1;
                }
            }
            Token::Word(word) => {
                let word_len = word.chars().count();
                if current.is_empty() {
                    current = word;
                    current_len = word_len;
                    continue;
                }

                let separator = usize::from(!current.ends_with(' '));
                if current_len + separator + word_len > width {
                    lines.push(current.trim_end().to_string());
                    current = word;
                    current_len = word_len;
                } else {
                    if separator == 1 {
                        current.push(' ');
                    }
                    current.push_str(&word);
                    current_len += separator + word_len;
                }
            }
        }
    }

    if !current.is_empty() {
        lines.push(current.trim_end().to_string());
    }
    lines
}

/// Strip the `$` delimiters from math spans for literal rendering.
///
/// Uses the same pairing rule as the wrapper: a `$` opens a span only if
/// a closing `$` follows on the same line.
pub fn strip_math_delimiters(line: &str) -> String {
    let chars: Vec<char> = line.chars().collect();
    let mut out = String::with_capacity(line.len());
    let mut i = 0;

    while i < chars.len() {
        if chars[i] == '$' {
            if let Some(offset) = chars[i + 1..].iter().position(|&c| c == '$') {
                let end = i + 1 + offset;
                out.extend(&chars[i + 1..end]);
                i = end + 1;
                continue;
            }
        }
        out.push(chars[i]);
        i += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn test_short_text_is_unchanged() {
        assert_eq!(wrap_text("good", 30), "good");
        assert_eq!(wrap_text("nice work", 30), "nice work");
    }

    #[test]
    fn test_wraps_at_word_boundary() {
        assert_eq!(
            wrap_text("the quick brown fox jumps", 10),
            "the quick\nbrown fox\njumps"
        );
    }

    #[test]
    fn test_exact_fit_stays_on_one_line() {
        assert_eq!(wrap_text("abcd efgh", 9), "abcd efgh");
        assert_eq!(wrap_text("abcd efghi", 9), "abcd\nefghi");
    }

    #[test]
    fn test_long_token_is_not_split() {
        assert_eq!(
            wrap_text("a supercalifragilistic b", 5),
            "a\nsupercalifragilistic\nb"
        );
    }

    #[test]
    fn test_whitespace_runs_collapse() {
        assert_eq!(wrap_text("a    b\t\tc", 30), "a b c");
        assert_eq!(wrap_text("   leading", 30), "leading");
        assert_eq!(wrap_text("trailing   ", 30), "trailing");
    }

    #[test]
    fn test_math_span_is_atomic() {
        assert_eq!(
            wrap_text("so $a + b = c$ holds", 8),
            "so\n$a + b = c$\nholds"
        );
    }

    #[test]
    fn test_math_span_keeps_trailing_punctuation() {
        assert_eq!(wrap_text("since $x$, done", 6), "since\n$x$,\ndone");
        assert_eq!(wrap_text("值为 $x$。好", 30), "值为 $x$。 好");
    }

    #[test]
    fn test_text_glued_to_math_gets_separated() {
        assert_eq!(wrap_text("ab$cd$ef", 30), "ab $cd$ ef");
    }

    #[test]
    fn test_unclosed_dollar_is_plain_text() {
        assert_eq!(wrap_text("cost $5 total", 30), "cost $5 total");
    }

    #[test]
    fn test_explicit_line_breaks_are_preserved() {
        assert_eq!(wrap_text("first\nsecond", 30), "first\nsecond");
        assert_eq!(wrap_text("first\r\nsecond\rthird", 30), "first\nsecond\nthird");
    }

    #[test]
    fn test_blank_lines_produce_no_output() {
        assert_eq!(wrap_text("a\n\n  \nb", 30), "a\nb");
        assert_eq!(wrap_text("", 30), "");
    }

    #[test]
    fn test_each_line_wrapped_independently() {
        assert_eq!(
            wrap_text("one two three\nfour five", 7),
            "one two\nthree\nfour\nfive"
        );
    }

    #[test]
    fn test_space_overflow_flushes_line() {
        // "abc" fills width 3, the following space forces a flush
        assert_eq!(wrap_text("abc d", 3), "abc\nd");
    }

    #[test]
    fn test_character_counts_not_bytes() {
        assert_eq!(wrap_text("ééé ééé", 7), "ééé ééé");
        assert_eq!(wrap_text("ééé ééé", 6), "ééé\nééé");
    }

    #[test]
    fn test_strip_math_delimiters() {
        assert_eq!(strip_math_delimiters("so $a+b$, ok"), "so a+b, ok");
        assert_eq!(strip_math_delimiters("cost $5"), "cost $5");
        assert_eq!(strip_math_delimiters("$$"), "");
    }

    proptest! {
        #[test]
        fn prop_long_lines_are_single_tokens(
            text in "[a-z$ .,]{0,80}",
            width in 1usize..40,
        ) {
            for line in wrap_text(&text, width).split('\n') {
                if line.chars().count() > width {
                    let words = tokenize(line)
                        .into_iter()
                        .filter(|t| *t != Token::Space)
                        .count();
                    prop_assert_eq!(words, 1, "line {:?} over width {}", line, width);
                }
            }
        }

        #[test]
        fn prop_math_span_never_split(
            before in proptest::collection::vec("[a-z]{1,8}", 0..6),
            math in "[a-z+=]{1,6}",
            punct in "[.,;]?",
            after in proptest::collection::vec("[a-z]{1,8}", 0..6),
            width in 1usize..30,
        ) {
            let span = format!("${}${}", math, punct);
            let mut words = before.clone();
            words.push(span.clone());
            words.extend(after.iter().cloned());
            let text = words.join(" ");

            let wrapped = wrap_text(&text, width);
            prop_assert!(
                wrapped.split('\n').any(|line| line.contains(&span)),
                "span {:?} split in {:?}", span, wrapped
            );
        }

        #[test]
        fn prop_wrap_is_idempotent(
            text in "[a-z$ .,\n]{0,80}",
            width in 1usize..40,
        ) {
            let once = wrap_text(&text, width);
            prop_assert_eq!(wrap_text(&once, width), once);
        }
    }
}
