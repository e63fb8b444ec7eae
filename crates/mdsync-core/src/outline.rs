//! Document outline: ATX headings with stable anchor ids.

use std::collections::HashMap;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Heading {
    pub level: u8,
    pub text: String,
    pub id: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct FenceState {
    marker: u8,
    marker_len: usize,
}

/// Track fenced code blocks line by line. Returns true if `line` opened or
/// closed a fence.
fn consume_fence_delimiter(line: &str, state: &mut Option<FenceState>) -> bool {
    let Some((marker, marker_len, rest)) = parse_fence_marker(line) else {
        return false;
    };

    match state {
        Some(open)
            if open.marker == marker && marker_len >= open.marker_len && rest.trim().is_empty() =>
        {
            *state = None;
            true
        }
        Some(_) => false,
        None => {
            *state = Some(FenceState { marker, marker_len });
            true
        }
    }
}

fn parse_fence_marker(line: &str) -> Option<(u8, usize, &str)> {
    let trimmed = line.trim_start();
    let first = *trimmed.as_bytes().first()?;
    if first != b'`' && first != b'~' {
        return None;
    }
    let marker_len = trimmed.bytes().take_while(|byte| *byte == first).count();
    (marker_len >= 3).then_some((first, marker_len, &trimmed[marker_len..]))
}

fn parse_heading(line: &str) -> Option<(u8, &str)> {
    let trimmed = line.trim_start();
    let level = trimmed.bytes().take_while(|byte| *byte == b'#').count();
    if !(1..=6).contains(&level) {
        return None;
    }

    let rest = &trimmed[level..];
    if !rest.starts_with([' ', '\t']) {
        return None;
    }

    let mut text = rest.trim();
    // Optional closing sequence: a run of '#' preceded by whitespace.
    let without_hashes = text.trim_end_matches('#');
    if without_hashes.is_empty() {
        text = "";
    } else if without_hashes.len() < text.len() && without_hashes.ends_with([' ', '\t']) {
        text = without_hashes.trim_end();
    }

    u8::try_from(level).ok().map(|level| (level, text))
}

fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_dash = false;
    for ch in text.chars() {
        if ch.is_alphanumeric() || ch == '_' {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.extend(ch.to_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}

/// Collect ATX headings outside fenced code blocks, in document order.
///
/// Ids are slugs of the heading text; repeats get `-2`, `-3`, ... and a
/// heading with nothing to slug becomes `heading-N` (its 1-based position).
pub fn extract_headings(markdown: &str) -> Vec<Heading> {
    let mut headings = Vec::new();
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut fence = None;

    for line in markdown.lines() {
        if consume_fence_delimiter(line, &mut fence) || fence.is_some() {
            continue;
        }
        let Some((level, text)) = parse_heading(line) else {
            continue;
        };
        if text.is_empty() {
            continue;
        }

        let mut base = slugify(text);
        if base.is_empty() {
            base = format!("heading-{}", headings.len() + 1);
        }
        let count = seen.entry(base.clone()).or_insert(0);
        *count += 1;
        let id = if *count == 1 {
            base
        } else {
            format!("{base}-{count}")
        };

        headings.push(Heading {
            level,
            text: text.to_owned(),
            id,
        });
    }

    headings
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(markdown: &str) -> Vec<String> {
        extract_headings(markdown)
            .into_iter()
            .map(|heading| heading.id)
            .collect()
    }

    #[test]
    fn consume_fence_delimiter_requires_matching_marker_and_length_to_close() {
        let mut state = None;
        assert!(consume_fence_delimiter("~~~~", &mut state));
        assert!(!consume_fence_delimiter("```", &mut state));
        assert!(!consume_fence_delimiter("~~~", &mut state));
        assert!(state.is_some());
        assert!(consume_fence_delimiter("~~~~", &mut state));
        assert!(state.is_none());
    }

    #[test]
    fn consume_fence_delimiter_ignores_non_fence_lines() {
        let mut state = None;
        assert!(!consume_fence_delimiter("`inline`", &mut state));
        assert!(!consume_fence_delimiter("~~", &mut state));
        assert!(!consume_fence_delimiter("plain text", &mut state));
        assert!(state.is_none());
    }

    #[test]
    fn extracts_levels_and_text() {
        let headings = extract_headings("# Title\n\ntext\n\n## Part one ##\n###### Deep\n");
        let summary: Vec<(u8, &str)> = headings
            .iter()
            .map(|heading| (heading.level, heading.text.as_str()))
            .collect();
        assert_eq!(summary, vec![(1, "Title"), (2, "Part one"), (6, "Deep")]);
    }

    #[test]
    fn skips_headings_inside_fences() {
        let markdown = "# Real\n```md\n# Not a heading\n```\n~~~\n## Also not\n~~~\n## Real too";
        assert_eq!(ids(markdown), vec!["real", "real-too"]);
    }

    #[test]
    fn rejects_non_headings() {
        let markdown = "#hashtag\n####### seven\n#\n##   ##\nplain";
        assert!(extract_headings(markdown).is_empty());
    }

    #[test]
    fn closing_hashes_need_leading_space() {
        let headings = extract_headings("# C#\n# Done ###");
        let texts: Vec<&str> = headings.iter().map(|h| h.text.as_str()).collect();
        assert_eq!(texts, vec!["C#", "Done"]);
    }

    #[test]
    fn duplicate_slugs_get_numbered() {
        assert_eq!(
            ids("# Notes\n## Notes\n### notes!\n# Other"),
            vec!["notes", "notes-2", "notes-3", "other"]
        );
    }

    #[test]
    fn punctuation_only_heading_falls_back_to_position() {
        assert_eq!(ids("# Intro\n## ???\n"), vec!["intro", "heading-2"]);
    }

    #[test]
    fn slugs_collapse_separators_and_keep_unicode_letters() {
        assert_eq!(slugify("  Hello,   World! "), "hello-world");
        assert_eq!(slugify("Café au lait"), "café-au-lait");
        assert_eq!(slugify("snake_case id"), "snake_case-id");
    }
}
