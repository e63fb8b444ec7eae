//! Markdown ↔ markup conversion.
//!
//! The engine only depends on [`MarkupConverter`]. [`HtmlConverter`] is the
//! default: markdown is rendered to HTML with `pulldown-cmark`, and HTML is
//! turned back into markdown by a small tree walker that understands the
//! tags a rich editor produces. The two directions are not exact inverses;
//! callers compare before acting on a difference.

use std::borrow::Cow;

use memchr::memchr;
use pulldown_cmark::{Event, Options, Parser, html};

pub trait MarkupConverter: Send + Sync {
    fn to_markup(&self, markdown: &str) -> String;
    fn to_markdown(&self, markup: &str) -> String;
}

fn options() -> Options {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_TASKLISTS);
    options
}

/// Create a `pulldown-cmark` parser with our default options enabled.
pub fn parser(source: &str) -> Parser<'_> {
    Parser::new_ext(source, options())
}

#[derive(Clone, Copy, Debug)]
pub struct HtmlConverter {
    /// Render single newlines inside a paragraph as `<br />`, the way the
    /// rich editor shows them.
    pub hard_breaks: bool,
}

impl Default for HtmlConverter {
    fn default() -> Self {
        Self { hard_breaks: true }
    }
}

impl HtmlConverter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MarkupConverter for HtmlConverter {
    fn to_markup(&self, markdown: &str) -> String {
        let hard_breaks = self.hard_breaks;
        let events = parser(markdown).map(move |event| match event {
            Event::SoftBreak if hard_breaks => Event::HardBreak,
            other => other,
        });

        let mut out = String::with_capacity(markdown.len() + markdown.len() / 2);
        html::push_html(&mut out, events);
        out
    }

    fn to_markdown(&self, markup: &str) -> String {
        render_blocks(&parse_markup(markup), "\n\n")
    }
}

#[derive(Debug)]
enum Node {
    Element(Element),
    Text(String),
}

#[derive(Debug, Default)]
struct Element {
    name: String,
    attrs: Vec<(String, String)>,
    children: Vec<Node>,
}

impl Element {
    fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn has_attr(&self, key: &str) -> bool {
        self.attrs.iter().any(|(k, _)| k == key)
    }

    fn child_elements(&self) -> impl Iterator<Item = &Self> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(el) => Some(el),
            Node::Text(_) => None,
        })
    }
}

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "hr", "img", "input", "link", "meta", "source", "wbr",
];

fn is_block(name: &str) -> bool {
    matches!(
        name,
        "p" | "h1"
            | "h2"
            | "h3"
            | "h4"
            | "h5"
            | "h6"
            | "pre"
            | "ul"
            | "ol"
            | "li"
            | "blockquote"
            | "hr"
            | "table"
            | "div"
            | "section"
            | "article"
            | "header"
            | "footer"
            | "figure"
    )
}

fn heading_level(name: &str) -> Option<usize> {
    match name {
        "h1" => Some(1),
        "h2" => Some(2),
        "h3" => Some(3),
        "h4" => Some(4),
        "h5" => Some(5),
        "h6" => Some(6),
        _ => None,
    }
}

fn parse_markup(markup: &str) -> Vec<Node> {
    let mut stack = vec![Element::default()];
    let mut rest = markup;

    while let Some(pos) = memchr(b'<', rest.as_bytes()) {
        push_text(&mut stack, &rest[..pos]);
        rest = &rest[pos..];

        if let Some(comment) = rest.strip_prefix("<!--") {
            rest = comment.find("-->").map_or("", |end| &comment[end + 3..]);
            continue;
        }

        let Some(end) = memchr(b'>', rest.as_bytes()) else {
            break;
        };
        let inner = &rest[1..end];
        if !looks_like_tag(inner) {
            push_text(&mut stack, "<");
            rest = &rest[1..];
            continue;
        }

        rest = &rest[end + 1..];
        handle_tag(&mut stack, inner);
    }
    push_text(&mut stack, rest);

    while stack.len() > 1 {
        close_top(&mut stack);
    }
    stack.pop().map(|root| root.children).unwrap_or_default()
}

fn looks_like_tag(inner: &str) -> bool {
    let mut chars = inner.chars();
    match chars.next() {
        Some('/') => chars.next().is_some_and(|ch| ch.is_ascii_alphabetic()),
        Some('!' | '?') => true,
        Some(ch) => ch.is_ascii_alphabetic(),
        None => false,
    }
}

fn push_text(stack: &mut [Element], text: &str) {
    if text.is_empty() {
        return;
    }
    if let Some(top) = stack.last_mut() {
        top.children.push(Node::Text(decode_entities(text)));
    }
}

fn close_top(stack: &mut Vec<Element>) {
    if stack.len() <= 1 {
        return;
    }
    if let Some(done) = stack.pop()
        && let Some(parent) = stack.last_mut()
    {
        parent.children.push(Node::Element(done));
    }
}

fn handle_tag(stack: &mut Vec<Element>, inner: &str) {
    if inner.starts_with(['!', '?']) {
        return;
    }

    if let Some(closing) = inner.strip_prefix('/') {
        let name = closing.trim().to_ascii_lowercase();
        if !stack.iter().skip(1).any(|el| el.name == name) {
            return;
        }
        while stack.len() > 1 {
            let matched = stack.last().is_some_and(|top| top.name == name);
            close_top(stack);
            if matched {
                break;
            }
        }
        return;
    }

    let self_closing = inner.ends_with('/');
    let body = inner.trim_end_matches('/');
    let name_end = body
        .find(|ch: char| ch.is_ascii_whitespace())
        .unwrap_or(body.len());
    let element = Element {
        name: body[..name_end].to_ascii_lowercase(),
        attrs: parse_attrs(&body[name_end..]),
        children: Vec::new(),
    };

    if self_closing || VOID_ELEMENTS.contains(&element.name.as_str()) {
        if let Some(top) = stack.last_mut() {
            top.children.push(Node::Element(element));
        }
    } else {
        stack.push(element);
    }
}

fn parse_attrs(src: &str) -> Vec<(String, String)> {
    let mut attrs = Vec::new();
    let mut rest = src.trim_start();

    while !rest.is_empty() {
        let key_end = rest
            .find(|ch: char| ch.is_ascii_whitespace() || ch == '=')
            .unwrap_or(rest.len());
        if key_end == 0 {
            // A stray '=' with no key in front of it.
            rest = rest[1..].trim_start();
            continue;
        }

        let key = rest[..key_end].to_ascii_lowercase();
        rest = rest[key_end..].trim_start();

        let mut value = String::new();
        if let Some(after_eq) = rest.strip_prefix('=') {
            let after_eq = after_eq.trim_start();
            let (raw, remaining) = match after_eq.chars().next() {
                Some(quote @ ('"' | '\'')) => {
                    let quoted = &after_eq[1..];
                    let close = quoted.find(quote).unwrap_or(quoted.len());
                    (&quoted[..close], quoted.get(close + 1..).unwrap_or_default())
                }
                _ => {
                    let end = after_eq
                        .find(|ch: char| ch.is_ascii_whitespace())
                        .unwrap_or(after_eq.len());
                    (&after_eq[..end], &after_eq[end..])
                }
            };
            value = decode_entities(raw);
            rest = remaining.trim_start();
        }

        attrs.push((key, value));
    }

    attrs
}

fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_owned();
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];

        let decoded = rest
            .find(';')
            .filter(|end| *end <= 10)
            .and_then(|end| decode_entity(&rest[1..end]).map(|ch| (ch, end)));
        match decoded {
            Some((ch, end)) => {
                out.push(ch);
                rest = &rest[end + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        _ => {
            let number = name.strip_prefix('#')?;
            let code = match number.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => number.parse().ok()?,
            };
            char::from_u32(code)
        }
    }
}

fn render_blocks(nodes: &[Node], separator: &str) -> String {
    let mut blocks: Vec<String> = Vec::new();
    let mut inline = String::new();

    for node in nodes {
        match node {
            Node::Element(el) if is_block(&el.name) => {
                flush_inline(&mut inline, &mut blocks);
                let block = render_block(el);
                if !block.is_empty() {
                    blocks.push(block);
                }
            }
            other => render_inline(other, &mut inline),
        }
    }
    flush_inline(&mut inline, &mut blocks);

    blocks.join(separator)
}

fn flush_inline(inline: &mut String, blocks: &mut Vec<String>) {
    let text = escape_line_starts(&tidy_inline(inline));
    if !text.is_empty() {
        blocks.push(text);
    }
    inline.clear();
}

fn tidy_inline(raw: &str) -> String {
    raw.lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_owned()
}

fn render_block(el: &Element) -> String {
    if let Some(level) = heading_level(&el.name) {
        let mut text = inline_of(&el.children);
        // A trailing `#` would be read as a closing sequence.
        if text.ends_with('#') {
            text.insert(text.len() - 1, '\\');
        }
        return format!("{} {text}", "#".repeat(level)).trim_end().to_owned();
    }

    match el.name.as_str() {
        "p" => escape_line_starts(&inline_of(&el.children)),
        "pre" => render_code_block(el),
        "ul" | "ol" => render_list(el),
        "li" => render_list_item(el, "- "),
        "blockquote" => prefix_lines(&render_blocks(&el.children, "\n\n")),
        "hr" => "---".to_owned(),
        "table" => render_table(el),
        _ => render_blocks(&el.children, "\n\n"),
    }
}

fn inline_of(nodes: &[Node]) -> String {
    let mut out = String::new();
    for node in nodes {
        render_inline(node, &mut out);
    }
    tidy_inline(&out)
}

fn render_inline(node: &Node, out: &mut String) {
    let el = match node {
        Node::Text(text) => {
            push_inline_text(out, text);
            return;
        }
        Node::Element(el) => el,
    };

    match el.name.as_str() {
        "strong" | "b" => wrap_inline(out, "**", &el.children),
        "em" | "i" => wrap_inline(out, "*", &el.children),
        "del" | "s" | "strike" => wrap_inline(out, "~~", &el.children),
        "code" => {
            let code = text_content(el);
            let fence = if code.contains('`') { "``" } else { "`" };
            out.push_str(fence);
            out.push_str(&code);
            out.push_str(fence);
        }
        "br" => out.push('\n'),
        "a" => {
            let label = inline_of(&el.children);
            match el.attr("href") {
                Some(href) => out.push_str(&format!("[{label}]({href})")),
                None => out.push_str(&label),
            }
        }
        "img" => {
            let alt = el.attr("alt").unwrap_or_default();
            let src = el.attr("src").unwrap_or_default();
            out.push_str(&format!("![{alt}]({src})"));
        }
        // Task checkboxes are rendered by their list item.
        "input" => {}
        _ => {
            for child in &el.children {
                render_inline(child, out);
            }
        }
    }
}

fn at_line_start(out: &str) -> bool {
    out.is_empty() || out.ends_with(['\n', ' '])
}

/// Characters escaped wherever they appear in text.
const ESCAPED: &[char] = &['\\', '*', '_', '[', ']', '<', '>', '`', '~'];

fn looks_like_entity(rest: &str) -> bool {
    let body = rest.strip_prefix('&').unwrap_or(rest);
    body.find(';').is_some_and(|end| {
        end > 0
            && end <= 32
            && body[..end]
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || ch == '#')
    })
}

/// Append text with HTML whitespace collapsing, escaping anything that
/// markdown would otherwise read as syntax.
fn push_inline_text(out: &mut String, text: &str) {
    let mut pending_space = false;
    for (i, ch) in text.char_indices() {
        if ch.is_ascii_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space && !at_line_start(out) {
            out.push(' ');
        }
        pending_space = false;
        if ESCAPED.contains(&ch) || (ch == '&' && looks_like_entity(&text[i..])) {
            out.push('\\');
        }
        out.push(ch);
    }
    if pending_space && !at_line_start(out) {
        out.push(' ');
    }
}

/// Escape characters that would open a block (heading, list, thematic
/// break, setext underline) at the start of a line.
fn escape_line_starts(text: &str) -> String {
    text.split('\n')
        .map(escape_line_start)
        .collect::<Vec<_>>()
        .join("\n")
}

fn escape_line_start(line: &str) -> Cow<'_, str> {
    if line.starts_with(['#', '-', '+', '=']) {
        return Cow::Owned(format!("\\{line}"));
    }
    let digits = line.bytes().take_while(u8::is_ascii_digit).count();
    if digits > 0 && line[digits..].starts_with(['.', ')']) {
        return Cow::Owned(format!("{}\\{}", &line[..digits], &line[digits..]));
    }
    Cow::Borrowed(line)
}

fn wrap_inline(out: &mut String, marker: &str, children: &[Node]) {
    let inner = inline_of(children);
    if inner.is_empty() {
        return;
    }
    out.push_str(marker);
    out.push_str(&inner);
    out.push_str(marker);
}

fn text_content(el: &Element) -> String {
    let mut out = String::new();
    collect_text(el, &mut out);
    out
}

fn collect_text(el: &Element, out: &mut String) {
    for node in &el.children {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Element(child) if child.name == "br" => out.push('\n'),
            Node::Element(child) => collect_text(child, out),
        }
    }
}

fn render_code_block(pre: &Element) -> String {
    let code_el = pre.child_elements().find(|el| el.name == "code");
    let (lang, code) = match code_el {
        Some(el) => (
            el.attr("class").and_then(|class| {
                class
                    .split_ascii_whitespace()
                    .find_map(|c| c.strip_prefix("language-"))
            }),
            text_content(el),
        ),
        None => (None, text_content(pre)),
    };

    let fence = if code.contains("```") { "````" } else { "```" };
    let mut block = String::with_capacity(code.len() + 16);
    block.push_str(fence);
    block.push_str(lang.unwrap_or_default());
    block.push('\n');
    block.push_str(&code);
    if !code.is_empty() && !code.ends_with('\n') {
        block.push('\n');
    }
    block.push_str(fence);
    block
}

fn render_list(list: &Element) -> String {
    let ordered = list.name == "ol";
    let start: usize = list
        .attr("start")
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(1);

    list.child_elements()
        .filter(|el| el.name == "li")
        .enumerate()
        .map(|(i, item)| {
            let marker = if ordered {
                format!("{}. ", start + i)
            } else {
                "- ".to_owned()
            };
            render_list_item(item, &marker)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_list_item(item: &Element, marker: &str) -> String {
    let loose = item.child_elements().any(|el| el.name == "p");
    let body = render_blocks(&item.children, if loose { "\n\n" } else { "\n" });

    let body = match task_state(item) {
        Some(checked) => format!(
            "[{}] {}",
            if checked { 'x' } else { ' ' },
            strip_task_prefix(&body)
        ),
        None => body,
    };

    let pad = " ".repeat(marker.len());
    let mut out = String::with_capacity(body.len() + marker.len());
    for (i, line) in body.lines().enumerate() {
        if i == 0 {
            out.push_str(marker);
            out.push_str(line);
            continue;
        }
        out.push('\n');
        if !line.is_empty() {
            out.push_str(&pad);
            out.push_str(line);
        }
    }
    if out.is_empty() {
        out.push_str(marker.trim_end());
    }
    out
}

fn task_state(item: &Element) -> Option<bool> {
    if let Some(flag) = item.attr("data-checked") {
        return Some(flag == "true");
    }
    find_checkbox(item).map(|input| input.has_attr("checked"))
}

fn find_checkbox(el: &Element) -> Option<&Element> {
    for child in el.child_elements() {
        if matches!(child.name.as_str(), "ul" | "ol") {
            continue;
        }
        if child.name == "input" && child.attr("type") == Some("checkbox") {
            return Some(child);
        }
        if let Some(found) = find_checkbox(child) {
            return Some(found);
        }
    }
    None
}

fn strip_task_prefix(body: &str) -> &str {
    let trimmed = body.trim_start();
    for prefix in ["[ ]", "[x]", "[X]", "\\[ \\]", "\\[x\\]", "\\[X\\]"] {
        if let Some(rest) = trimmed.strip_prefix(prefix) {
            return rest.trim_start();
        }
    }
    trimmed
}

fn prefix_lines(body: &str) -> String {
    body.lines()
        .map(|line| {
            if line.is_empty() {
                ">".to_owned()
            } else {
                format!("> {line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn collect_rows<'a>(el: &'a Element, rows: &mut Vec<&'a Element>) {
    for child in el.child_elements() {
        if child.name == "tr" {
            rows.push(child);
        } else {
            collect_rows(child, rows);
        }
    }
}

fn alignment_marker(cell: &Element) -> &'static str {
    let style = cell.attr("style").unwrap_or_default();
    let align = cell.attr("align").unwrap_or_default();
    if style.contains("center") || align == "center" {
        ":---:"
    } else if style.contains("right") || align == "right" {
        "---:"
    } else if style.contains("left") || align == "left" {
        ":---"
    } else {
        "---"
    }
}

fn render_table(table: &Element) -> String {
    let mut rows = Vec::new();
    collect_rows(table, &mut rows);
    let Some((header, body)) = rows.split_first() else {
        return String::new();
    };

    let render_row = |row: &Element| {
        let cells: Vec<String> = row
            .child_elements()
            .filter(|el| matches!(el.name.as_str(), "th" | "td"))
            .map(|cell| inline_of(&cell.children).replace('|', "\\|"))
            .collect();
        format!("| {} |", cells.join(" | "))
    };

    let separator: Vec<&str> = header
        .child_elements()
        .filter(|el| matches!(el.name.as_str(), "th" | "td"))
        .map(alignment_marker)
        .collect();

    let mut lines = vec![render_row(header), format!("| {} |", separator.join(" | "))];
    lines.extend(body.iter().map(|row| render_row(row)));
    lines.join("\n")
}
