//! LaTeX formula protection.
//!
//! Formulas are found by pairing `$`, `$$`, `\(`, `\)`, `\[` and `\]`
//! delimiters, and their payloads are base64-encoded so the Markdown tokenizer
//! sees one opaque word instead of lines it could split into paragraphs or
//! read as emphasis. Delimiters are normalized to `$...$` (inline) and
//! `$$...$$` (block).

use std::sync::LazyLock;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use regex::{Captures, Regex};

static DELIMITER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\$|\$|\\\(|\\\)|\\\[|\\\]").unwrap());

static ENCODED_FORMULA_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\$([A-Za-z0-9+/=]*)\$\$|\$([A-Za-z0-9+/=]+)\$").unwrap()
});

const LATEX_COMMANDS: &[&str] = &[
    "\\frac", "\\sqrt", "\\sum", "\\int", "\\prod", "\\alpha", "\\beta", "\\gamma", "\\delta",
    "\\theta", "\\pi", "\\sigma", "\\omega", "\\infty", "\\partial", "\\left", "\\right",
    "\\begin", "\\end", "\\text", "\\mathbf", "\\mathrm", "\\times", "\\div", "\\pm", "\\leq",
    "\\geq", "\\neq", "\\approx", "\\cdot", "\\boxed", "\\dfrac",
];

const MATH_OPERATORS: &[char] = &[
    '+', '-', '*', '/', '=', '<', '>', '±', '≠', '≈', '≤', '≥',
];

const ALLOWED_SYMBOLS: &[char] = &[
    '+', '-', '*', '/', '=', '>', '<', '±', '∑', '∫', '≠', '≈', '≤', '≥', '∞', '∂', '→', '←',
    '↑', '↓', '^', '_', '(', ')', '[', ']', '{', '}', '\\', '.', '|', '′', '″', '‴', '!', ' ',
];

/// Longest run of letters accepted as a variable name.
const MAX_VARIABLE_LEN: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delimiter {
    Dollar,
    DoubleDollar,
    OpenParen,
    CloseParen,
    OpenBracket,
    CloseBracket,
}

impl Delimiter {
    fn from_token(token: &str) -> Option<Self> {
        match token {
            "$" => Some(Delimiter::Dollar),
            "$$" => Some(Delimiter::DoubleDollar),
            "\\(" => Some(Delimiter::OpenParen),
            "\\)" => Some(Delimiter::CloseParen),
            "\\[" => Some(Delimiter::OpenBracket),
            "\\]" => Some(Delimiter::CloseBracket),
            _ => None,
        }
    }

    fn is_opener(self) -> bool {
        matches!(
            self,
            Delimiter::Dollar | Delimiter::DoubleDollar | Delimiter::OpenParen | Delimiter::OpenBracket
        )
    }

    fn closes(self, opener: Delimiter) -> bool {
        matches!(
            (opener, self),
            (Delimiter::Dollar, Delimiter::Dollar)
                | (Delimiter::DoubleDollar, Delimiter::DoubleDollar)
                | (Delimiter::OpenParen, Delimiter::CloseParen)
                | (Delimiter::OpenBracket, Delimiter::CloseBracket)
        )
    }

    fn is_inline(self) -> bool {
        matches!(
            self,
            Delimiter::Dollar | Delimiter::OpenParen | Delimiter::CloseParen
        )
    }
}

/// A delimiter occurrence, as a byte range into the scanned text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Token {
    pub start: usize,
    pub end: usize,
    pub delimiter: Delimiter,
}

pub(crate) fn tokens(text: &str) -> impl Iterator<Item = Token> + '_ {
    DELIMITER_PATTERN.find_iter(text).filter_map(|found| {
        Delimiter::from_token(found.as_str()).map(|delimiter| Token {
            start: found.start(),
            end: found.end(),
            delimiter,
        })
    })
}

/// Pairs delimiter tokens fed in text order.
#[derive(Debug, Default)]
pub(crate) struct DelimiterStack {
    open: Vec<Token>,
}

impl DelimiterStack {
    /// Feed the next token. Returns the `(open, close)` pair when it closes a
    /// formula.
    pub fn push(&mut self, text: &str, token: Token) -> Option<(Token, Token)> {
        if let Some(&last) = self.open.last() {
            if token.delimiter.closes(last.delimiter) {
                self.open.pop();
                let payload = &text[last.end..token.start];
                if last.delimiter != Delimiter::Dollar || is_math_formula(payload) {
                    return Some((last, token));
                }
                log::trace!("not a formula: {payload:?}");
                if token.delimiter.is_opener() {
                    self.open.push(token);
                }
                return None;
            }
        }
        if token.delimiter.is_opener() {
            self.open.push(token);
        }
        None
    }

    /// True while a `$$`, `\(` or `\[` is waiting for its closer. A lone `$`
    /// does not count: it can never pair across a blank line.
    pub fn has_open_block(&self) -> bool {
        self.open
            .iter()
            .any(|token| token.delimiter != Delimiter::Dollar)
    }
}

/// Encode every formula payload in `text` and normalize its delimiters.
pub fn process(text: &str) -> String {
    let mut stack = DelimiterStack::default();
    let mut spans: Vec<(Token, Token)> = tokens(text)
        .filter_map(|token| stack.push(text, token))
        .collect();
    if spans.is_empty() {
        return text.to_string();
    }

    // Spans close innermost first; an inner span is part of its outer payload.
    spans.sort_by_key(|(open, _)| open.start);
    let mut outermost: Vec<(Token, Token)> = Vec::with_capacity(spans.len());
    for span in spans {
        let nested = outermost
            .last()
            .is_some_and(|(_, close)| span.0.start < close.end);
        if !nested {
            outermost.push(span);
        }
    }

    let mut out = String::with_capacity(text.len() + text.len() / 3);
    let mut cursor = 0;
    for (open, close) in outermost {
        out.push_str(&text[cursor..open.start]);
        let fence = if open.delimiter.is_inline() { "$" } else { "$$" };
        out.push_str(fence);
        out.push_str(&BASE64.encode(&text[open.end..close.start]));
        out.push_str(fence);
        cursor = close.end;
    }
    out.push_str(&text[cursor..]);
    out
}

/// Recover a formula payload encoded by [`process`]. Text that is not valid
/// base64 of UTF-8 is returned unchanged.
pub fn decode_placeholder(text: &str) -> String {
    BASE64
        .decode(text)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .unwrap_or_else(|| text.to_string())
}

/// Decode every encoded `$...$` and `$$...$$` payload in `text`, keeping the
/// normalized delimiters.
pub fn decode_math(text: &str) -> String {
    ENCODED_FORMULA_PATTERN
        .replace_all(text, |caps: &Captures| {
            if let Some(payload) = caps.get(1) {
                format!("$${}$$", decode_placeholder(payload.as_str()))
            } else {
                let payload = caps.get(2).map_or("", |m| m.as_str());
                format!("${}$", decode_placeholder(payload))
            }
        })
        .into_owned()
}

/// Decide whether a bare `$...$` payload is a formula rather than prose that
/// happens to contain dollar signs.
pub(crate) fn is_math_formula(text: &str) -> bool {
    let formula = text.trim_matches('$');

    if spans_blank_line(formula) {
        return false;
    }

    let only_number = formula
        .chars()
        .all(|c| c.is_numeric() || matches!(c, ' ' | ',' | '.' | '。' | '，'));
    if only_number {
        return false;
    }

    if formula.chars().count() < MAX_VARIABLE_LEN && formula.chars().all(char::is_alphanumeric) {
        return true;
    }

    let has_command = LATEX_COMMANDS
        .iter()
        .any(|command| formula.contains(command));

    let mut variable_len = 0;
    let mut in_braces = false;
    let mut has_letter = false;
    let mut has_operator = false;

    for c in formula.chars() {
        match c {
            '{' => {
                in_braces = true;
                continue;
            }
            '}' => {
                in_braces = false;
                continue;
            }
            _ if in_braces => continue,
            _ => {}
        }

        if MATH_OPERATORS.contains(&c) {
            has_operator = true;
        }

        if c.is_alphabetic() {
            has_letter = true;
            variable_len += 1;
            continue;
        }

        if variable_len > MAX_VARIABLE_LEN {
            return false;
        }
        variable_len = 0;

        if !c.is_ascii_digit() && !ALLOWED_SYMBOLS.contains(&c) {
            return false;
        }
    }

    if variable_len > MAX_VARIABLE_LEN {
        return false;
    }

    has_command || (has_operator && has_letter)
}

fn spans_blank_line(text: &str) -> bool {
    let lines: Vec<&str> = text.split('\n').collect();
    lines.len() > 2 && lines[1..lines.len() - 1].iter().any(|line| line.trim().is_empty())
}
