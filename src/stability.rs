//! Stable prefix analysis for growing markdown text.
//!
//! A prefix is stable when no text appended later can change how it parses.
//! Boundaries sit right after a blank line, outside any fenced code, `$$`
//! math or raw HTML region, and only once the next line is known to start a
//! new top-level block.

use crate::latex::{self, DelimiterStack, Token};

/// Byte length of the longest prefix of `markdown` that later appends cannot
/// change. Always 0 or just past a `\n`.
pub fn stable_prefix_len(markdown: &str) -> usize {
    let mut delimiters = DelimiterScan::new(markdown);
    let mut fence: Option<Fence> = None;
    let mut html_end: Option<&'static str> = None;
    let mut in_math = false;
    let mut pins_references = false;
    // Set once a nested fence may have lost its container
    let mut frozen = false;

    let mut offset = 0;
    let mut pending: Option<usize> = None;
    let mut boundary = 0;

    let mut lines = markdown.split('\n').peekable();
    while let Some(line) = lines.next() {
        let complete = lines.peek().is_some();
        let trimmed = line.trim();

        if !trimmed.is_empty() {
            if let Some(at) = pending.take() {
                if complete
                    && !frozen
                    && starts_fresh_block(line)
                    && !delimiters.open_block_before(at)
                {
                    boundary = at;
                }
            }
        }

        if let Some(open) = fence {
            if open.is_closed_by(line) {
                fence = None;
            } else if open.may_be_left_by(line) {
                frozen = true;
            }
        } else if let Some(end) = html_end {
            if line.to_ascii_lowercase().contains(end) {
                html_end = None;
            }
        } else if let Some(open) = Fence::opened_by(line) {
            fence = Some(open);
        } else {
            html_end = raw_html_end(line);
        }
        if trimmed == "$$" {
            in_math = !in_math;
        }
        pins_references |= pins_references_line(line);

        offset += line.len();
        if complete {
            offset += 1;
        }

        if trimmed.is_empty() && fence.is_none() && html_end.is_none() && !in_math {
            pending = Some(offset);
        }
    }

    // References anywhere resolve against definitions anywhere.
    if pins_references {
        return 0;
    }
    boundary
}

/// Whether appended text may redefine references that earlier blocks already
/// resolved: any line opening a footnote (`[^x]:`) or link (`[x]:`)
/// definition, including inside quotes and list items.
pub fn needs_full_reparse(appended: &str) -> bool {
    if appended.is_empty() {
        return false;
    }
    appended
        .split('\n')
        .any(|line| definition_label(line).is_some())
}

/// Replays the LaTeX delimiter pairing up to a given offset.
struct DelimiterScan<'a> {
    text: &'a str,
    tokens: Vec<Token>,
    next: usize,
    stack: DelimiterStack,
}

impl<'a> DelimiterScan<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            tokens: latex::tokens(text).collect(),
            next: 0,
            stack: DelimiterStack::default(),
        }
    }

    /// Offsets must be queried in increasing order.
    fn open_block_before(&mut self, offset: usize) -> bool {
        while let Some(&token) = self.tokens.get(self.next) {
            if token.start >= offset {
                break;
            }
            self.stack.push(self.text, token);
            self.next += 1;
        }
        self.stack.has_open_block()
    }
}

#[derive(Debug, Clone, Copy)]
struct Fence {
    marker: u8,
    len: usize,
    indent: usize,
}

impl Fence {
    fn opened_by(line: &str) -> Option<Fence> {
        let indent = block_indent(line)?;
        let rest = &line[indent..];
        let marker = *rest.as_bytes().first()?;
        if marker != b'`' && marker != b'~' {
            return None;
        }
        let len = rest.bytes().take_while(|&b| b == marker).count();
        if len < 3 {
            return None;
        }
        // Backtick fences cannot carry backticks in their info string
        if marker == b'`' && rest[len..].contains('`') {
            return None;
        }
        Some(Fence {
            marker,
            len,
            indent,
        })
    }

    /// A closer at or beyond the opener's indent closes the fence whether or
    /// not it sits in a list item.
    fn is_closed_by(self, line: &str) -> bool {
        let Some(indent) = block_indent(line) else {
            return false;
        };
        indent >= self.indent && self.is_closer(&line[indent..])
    }

    /// An indented opener may belong to a list item. A line indented less
    /// than the opener, or a closer indented past 3 spaces, then reads
    /// differently depending on the container, so its state is unknown.
    fn may_be_left_by(self, line: &str) -> bool {
        if self.indent == 0 || line.trim().is_empty() {
            return false;
        }
        let indent = line.bytes().take_while(|&b| b == b' ').count();
        indent < self.indent || (indent > 3 && self.is_closer(&line[indent..]))
    }

    fn is_closer(self, rest: &str) -> bool {
        let len = rest.bytes().take_while(|&b| b == self.marker).count();
        len >= self.len && rest[len..].trim().is_empty()
    }
}

/// Leading spaces when they are few enough (at most 3) to open a block.
fn block_indent(line: &str) -> Option<usize> {
    let indent = line.bytes().take_while(|&b| b == b' ').count();
    if indent > 3 || line.as_bytes().get(indent) == Some(&b'\t') {
        None
    } else {
        Some(indent)
    }
}

/// HTML blocks that may contain blank lines, with their end markers.
const RAW_HTML_BLOCKS: &[(&str, &str)] = &[
    ("<script", "</script>"),
    ("<pre", "</pre>"),
    ("<style", "</style>"),
    ("<textarea", "</textarea>"),
    ("<!--", "-->"),
    ("<?", "?>"),
    ("<![cdata[", "]]>"),
];

/// End marker of a raw HTML block opened but not closed on `line`.
fn raw_html_end(line: &str) -> Option<&'static str> {
    let start = block_indent(line)?;
    let rest = line[start..].to_ascii_lowercase();

    for &(open, end) in RAW_HTML_BLOCKS {
        let Some(after) = rest.strip_prefix(open) else {
            continue;
        };
        let is_tag = open.chars().nth(1).is_some_and(|c| c.is_ascii_alphabetic());
        if is_tag && !(after.is_empty() || after.starts_with([' ', '\t', '>'])) {
            continue;
        }
        return if after.contains(end) { None } else { Some(end) };
    }

    // Declarations such as <!DOCTYPE html>
    let after = rest.strip_prefix("<!")?;
    if after.starts_with(|c: char| c.is_ascii_alphabetic()) && !after.contains('>') {
        return Some(">");
    }
    None
}

/// A definition that makes every stable prefix unsafe: any link reference
/// definition, or a footnote definition whose label may render differently
/// once a reference to it resolves.
fn pins_references_line(line: &str) -> bool {
    let Some(label) = definition_label(line) else {
        return false;
    };
    match label.strip_prefix('^') {
        Some(footnote) => !footnote
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '.'),
        None => true,
    }
}

/// Label of a `[label]:` or `[^label]:` line, looking through indentation,
/// quote markers and list markers.
fn definition_label(line: &str) -> Option<&str> {
    let rest = strip_containers(line).strip_prefix('[')?;
    let end = rest.find("]:")?;
    Some(&rest[..end])
}

fn strip_containers(line: &str) -> &str {
    let mut rest = line.trim_start();
    loop {
        if let Some(after) = rest.strip_prefix('>') {
            rest = after.trim_start();
        } else if let Some(len) = list_marker_len(rest) {
            rest = rest[len..].trim_start();
        } else {
            return rest;
        }
    }
}

/// A line that cannot continue a block left open before the preceding blank
/// line: unindented and not a list marker.
fn starts_fresh_block(line: &str) -> bool {
    match line.chars().next() {
        Some(first) if !first.is_whitespace() => list_marker_len(line).is_none(),
        _ => false,
    }
}

/// Byte length of a leading `-`, `+`, `*`, `N.` or `N)` list marker.
fn list_marker_len(line: &str) -> Option<usize> {
    let bytes = line.as_bytes();
    let marker_len = match bytes.first() {
        Some(b'-' | b'+' | b'*') => 1,
        Some(b) if b.is_ascii_digit() => {
            let digits = bytes.iter().take_while(|b| b.is_ascii_digit()).count();
            if digits > 9 {
                return None;
            }
            match bytes.get(digits) {
                Some(b'.' | b')') => digits + 1,
                _ => return None,
            }
        }
        _ => return None,
    };
    match bytes.get(marker_len) {
        None | Some(b' ' | b'\t') => Some(marker_len),
        _ => None,
    }
}
