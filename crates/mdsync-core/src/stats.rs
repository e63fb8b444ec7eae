/// Derived counts shown in the status bar.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DocumentStats {
    pub line_count: usize,
    pub word_count: usize,
    pub character_count: usize,
}

impl DocumentStats {
    /// Stats of the empty document: one line, no words.
    pub const EMPTY: Self = Self {
        line_count: 1,
        word_count: 0,
        character_count: 0,
    };
}

const fn is_word_separator(ch: char) -> bool {
    matches!(ch, ' ' | '\t' | '\n' | '\r' | '\u{000C}' | '\u{000B}')
}

/// Count lines, words and characters of `content` in a single pass.
///
/// Lines are `1 + '\n'` count, so an empty document is one line. Words are
/// maximal runs of anything that is not ASCII whitespace (space, tab, LF, CR,
/// form feed, vertical tab). Characters are Unicode scalar values.
pub fn compute_stats(content: &str) -> DocumentStats {
    let mut stats = DocumentStats::EMPTY;
    let mut in_word = false;

    for ch in content.chars() {
        stats.character_count += 1;
        if ch == '\n' {
            stats.line_count += 1;
        }

        if is_word_separator(ch) {
            in_word = false;
        } else if !in_word {
            in_word = true;
            stats.word_count += 1;
        }
    }

    stats
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compute_stats_counts_basic_cases() {
        for (content, lines, words, chars) in [
            ("", 1, 0, 0),
            ("hello world", 1, 2, 11),
            ("  a  b ", 1, 2, 7),
            ("\n", 2, 0, 1),
            ("one\ntwo\n", 3, 2, 8),
            ("tab\tseparated\rwords", 1, 3, 19),
            ("\u{000B}\u{000C} \t", 1, 0, 4),
            ("# Title\n\n- [x] done", 3, 5, 19),
        ] {
            let stats = compute_stats(content);
            assert_eq!(stats.line_count, lines, "lines of {content:?}");
            assert_eq!(stats.word_count, words, "words of {content:?}");
            assert_eq!(stats.character_count, chars, "chars of {content:?}");
        }
    }

    #[test]
    fn compute_stats_counts_chars_not_bytes() {
        let stats = compute_stats("héllo wörld ✓");
        assert_eq!(stats.character_count, 13);
        assert_eq!(stats.word_count, 3);
    }

    #[test]
    fn compute_stats_treats_unicode_spaces_as_word_characters() {
        // Only the ASCII whitespace set separates words.
        let stats = compute_stats("a\u{00A0}b");
        assert_eq!(stats.word_count, 1);
    }

    #[test]
    fn line_count_matches_newline_count_for_many_inputs() {
        let samples = [
            "",
            "x",
            "\n\n\n",
            "a\r\nb\r\n",
            "trailing\n",
            "\nleading",
            "mixed\n\t \nspace",
        ];
        for sample in samples {
            let expected = 1 + sample.bytes().filter(|b| *b == b'\n').count();
            assert_eq!(compute_stats(sample).line_count, expected);
            assert_eq!(compute_stats(sample).character_count, sample.chars().count());
        }
    }

    #[test]
    fn word_count_agrees_with_split_on_separator_set() {
        let samples = ["", "   ", "a", " a ", "a b  c", "x\u{000C}y\u{000B}z", "é ü"];
        for sample in samples {
            let expected = sample
                .split(is_word_separator)
                .filter(|word| !word.is_empty())
                .count();
            assert_eq!(compute_stats(sample).word_count, expected, "{sample:?}");
        }
    }
}
