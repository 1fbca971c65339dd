use std::borrow::Cow;

use crate::ast::{self, Extensions, Node, NodeKind};
use crate::block::{Block, Document, ListItem, TaskItem, footnotes_last};
use crate::inline::{inline_text, inline_text_of};
use crate::latex;

/// Anything that turns markdown into a flat block list.
pub trait BlockSource {
    fn parse_blocks(&self, markdown: &str) -> Vec<Block>;
}

/// Anything that turns markdown into a [`Document`].
pub trait Parse {
    fn parse(&self, markdown: &str) -> Document;
}

#[derive(Debug, Clone, Copy)]
pub struct ParserOptions {
    pub extensions: Extensions,
    /// Protect LaTeX formulas before tokenizing.
    pub math: bool,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            extensions: Extensions::default(),
            math: true,
        }
    }
}

/// Stateless parser: every call parses the full text.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkdownParser {
    options: ParserOptions,
}

impl MarkdownParser {
    pub fn new(options: ParserOptions) -> Self {
        Self { options }
    }
}

impl BlockSource for MarkdownParser {
    fn parse_blocks(&self, markdown: &str) -> Vec<Block> {
        parse_blocks_with(markdown, &self.options)
    }
}

impl Parse for MarkdownParser {
    fn parse(&self, markdown: &str) -> Document {
        Document::new(self.parse_blocks(markdown))
    }
}

/// Parse markdown text into a list of blocks, footnotes last
pub fn parse_blocks(markdown: &str) -> Vec<Block> {
    parse_blocks_with(markdown, &ParserOptions::default())
}

pub fn parse_blocks_with(markdown: &str, options: &ParserOptions) -> Vec<Block> {
    let processed = if options.math {
        Cow::Owned(latex::process(markdown))
    } else {
        Cow::Borrowed(markdown)
    };
    let root = ast::parse(&processed, options.extensions);
    footnotes_last(extract_blocks(&root))
}

/// Fold a node tree into blocks, in document order.
pub fn extract_blocks(root: &Node) -> Vec<Block> {
    Extractor::default().visit(root)
}

#[derive(Default)]
struct Extractor {
    depth_path: Vec<usize>,
}

impl Extractor {
    fn at(depth_path: &[usize]) -> Self {
        Self {
            depth_path: depth_path.to_vec(),
        }
    }

    fn visit(&self, node: &Node) -> Vec<Block> {
        match &node.kind {
            NodeKind::Heading(level) => vec![Block::Heading {
                level: *level,
                text: inline_text_of(&node.children),
            }],
            NodeKind::Paragraph => paragraph_blocks(&node.children),
            NodeKind::BlockQuote => self.quote(node),
            NodeKind::List { ordered } => self.list(node, *ordered),
            NodeKind::CodeBlock { language, code } => vec![Block::Code {
                language: language.clone().filter(|lang| !lang.is_empty()),
                code: code.trim_matches(|c| c == '\n' || c == '\r').to_string(),
            }],
            NodeKind::Rule => vec![Block::Divider],
            NodeKind::HtmlBlock(raw) => vec![Block::Html { raw: raw.clone() }],
            NodeKind::Table => vec![table(node)],
            NodeKind::FootnoteDefinition(label) => footnote_definition(label, node),
            NodeKind::Image { url, title } => vec![Block::Image {
                alt: inline_text_of(&node.children),
                url: url.clone(),
                title: title.clone(),
            }],
            NodeKind::Link { url } => vec![Block::Link {
                title: inline_text_of(&node.children),
                url: url.clone(),
            }],
            _ => node
                .children
                .iter()
                .flat_map(|child| self.visit(child))
                .collect(),
        }
    }

    /// Quotes keep only the text of their paragraphs and headings.
    fn quote(&self, node: &Node) -> Vec<Block> {
        let lines: Vec<String> = node
            .children
            .iter()
            .flat_map(|child| self.visit(child))
            .filter_map(|block| match block {
                Block::Paragraph { text } | Block::Heading { text, .. } => Some(text),
                _ => None,
            })
            .collect();
        if lines.is_empty() {
            Vec::new()
        } else {
            vec![Block::Quote { lines }]
        }
    }

    fn list(&self, node: &Node, ordered: bool) -> Vec<Block> {
        let parsed = self.collect_items(node);
        if parsed.is_empty() {
            return Vec::new();
        }

        // One checkbox anywhere makes it a task list; items without one read
        // as unchecked.
        if parsed.iter().any(|item| item.checked.is_some()) {
            let items = parsed
                .into_iter()
                .map(|item| TaskItem {
                    checked: item.checked.unwrap_or(false),
                    text: item.text,
                    depth_path: item.depth_path,
                    blocks: item.blocks,
                })
                .collect();
            return vec![Block::TaskList { items }];
        }

        let items = parsed
            .into_iter()
            .map(|item| ListItem {
                text: item.text,
                depth_path: item.depth_path,
                blocks: item.blocks,
            })
            .collect();
        if ordered {
            vec![Block::OrderedList { items }]
        } else {
            vec![Block::UnorderedList { items }]
        }
    }

    fn collect_items(&self, list: &Node) -> Vec<ParsedItem> {
        list.children
            .iter()
            .filter_map(|child| match child.kind {
                NodeKind::Item { checked } => Some((child, checked)),
                _ => None,
            })
            .enumerate()
            .map(|(index, (item, checked))| {
                let mut depth_path = self.depth_path.clone();
                depth_path.push(index + 1);
                let (text, blocks) = item_content(item, &depth_path);
                ParsedItem {
                    text,
                    depth_path,
                    checked,
                    blocks,
                }
            })
            .collect()
    }
}

struct ParsedItem {
    text: String,
    depth_path: Vec<usize>,
    checked: Option<bool>,
    blocks: Vec<Block>,
}

/// Split an item into its own text and the blocks nested under it.
fn item_content(item: &Node, depth_path: &[usize]) -> (String, Vec<Block>) {
    let nested = Extractor::at(depth_path);
    let mut parts: Vec<String> = Vec::new();
    let mut blocks = Vec::new();
    // Tight lists put inline content directly under the item
    let mut run: Vec<Node> = Vec::new();

    for child in &item.children {
        if child.is_inline() {
            run.push(child.clone());
            continue;
        }
        push_part(&mut parts, inline_text_of(&std::mem::take(&mut run)));
        match child.kind {
            NodeKind::Paragraph | NodeKind::Heading(_) => push_part(&mut parts, inline_text(child)),
            _ => blocks.extend(nested.visit(child)),
        }
    }
    push_part(&mut parts, inline_text_of(&run));

    (parts.join("\n").trim().to_string(), blocks)
}

fn push_part(parts: &mut Vec<String>, text: String) {
    if !text.is_empty() {
        parts.push(text);
    }
}

/// Split a paragraph at its images, classifying each text run.
fn paragraph_blocks(children: &[Node]) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut run_start = 0;

    for (index, child) in children.iter().enumerate() {
        if let NodeKind::Image { url, title } = &child.kind {
            flush_text(&children[run_start..index], &mut blocks);
            blocks.push(Block::Image {
                alt: inline_text_of(&child.children),
                url: url.clone(),
                title: title.clone(),
            });
            run_start = index + 1;
        }
    }
    flush_text(&children[run_start..], &mut blocks);
    blocks
}

fn flush_text(nodes: &[Node], blocks: &mut Vec<Block>) {
    if nodes.is_empty() {
        return;
    }
    let text = inline_text_of(nodes);
    if text.trim().is_empty() {
        return;
    }

    let footnotes = footnote_definitions(&text);
    if !footnotes.is_empty() {
        blocks.extend(footnotes);
        return;
    }

    // Math text is trimmed; paragraph text keeps its whitespace.
    match math_kind(&text) {
        Some(MathKind::Block) => blocks.push(Block::MathBlock {
            text: text.trim().to_string(),
        }),
        Some(MathKind::Inline) => blocks.push(Block::MathInline {
            text: text.trim().to_string(),
        }),
        None => blocks.push(Block::Paragraph { text }),
    }
}

fn table(node: &Node) -> Block {
    let mut headers = Vec::new();
    let mut rows = Vec::new();
    for child in &node.children {
        match child.kind {
            NodeKind::TableHead => headers = row_cells(child),
            NodeKind::TableRow => rows.push(row_cells(child)),
            _ => {}
        }
    }

    if headers.is_empty() {
        if !rows.is_empty() {
            headers = rows.remove(0);
        }
    } else if rows.first() == Some(&headers) {
        rows.remove(0);
    }
    Block::Table { headers, rows }
}

/// Cell texts of a row. Heads may hold their cells directly or in a row.
fn row_cells(row: &Node) -> Vec<String> {
    let mut cells = Vec::new();
    for child in &row.children {
        match child.kind {
            NodeKind::TableCell => cells.push(inline_text_of(&child.children)),
            NodeKind::TableRow => cells.extend(row_cells(child)),
            _ => {}
        }
    }
    cells
}

fn footnote_definition(label: &str, node: &Node) -> Vec<Block> {
    let content = node
        .children
        .iter()
        .filter(|child| matches!(child.kind, NodeKind::Paragraph | NodeKind::Heading(_)))
        .map(inline_text)
        .collect::<Vec<_>>()
        .join("\n\n");
    let label = label.trim();
    let content = content.trim();
    if label.is_empty() || content.is_empty() {
        return Vec::new();
    }
    vec![Block::Footnote {
        label: label.to_string(),
        content: content.to_string(),
    }]
}

/// Read `[^label]: content` definitions out of paragraph text.
///
/// Returns nothing unless every line belongs to a definition: continuation
/// lines must be blank or indented by four spaces or a tab.
fn footnote_definitions(text: &str) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut current: Option<(String, Vec<String>)> = None;

    for line in text.split('\n') {
        let trimmed = line.trim_matches([' ', '\t']);
        if let Some((label, first)) = definition_opener(trimmed) {
            flush_footnote(current.take(), &mut blocks);
            let lines = if first.is_empty() {
                Vec::new()
            } else {
                vec![first.to_string()]
            };
            current = Some((label.to_string(), lines));
            continue;
        }
        if let Some((_, lines)) = current.as_mut() {
            if trimmed.is_empty() {
                lines.push(String::new());
                continue;
            }
            if line.starts_with("    ") || line.starts_with('\t') {
                lines.push(trimmed.to_string());
                continue;
            }
        }
        return Vec::new();
    }
    flush_footnote(current, &mut blocks);
    blocks
}

fn definition_opener(line: &str) -> Option<(&str, &str)> {
    let rest = line.strip_prefix("[^")?;
    let marker = rest.find("]:")?;
    Some((rest[..marker].trim(), rest[marker + 2..].trim_matches([' ', '\t'])))
}

fn flush_footnote(current: Option<(String, Vec<String>)>, blocks: &mut Vec<Block>) {
    let Some((label, lines)) = current else {
        return;
    };
    let content = lines.join("\n");
    let content = content.trim();
    if !label.is_empty() && !content.is_empty() {
        blocks.push(Block::Footnote {
            label,
            content: content.to_string(),
        });
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MathKind {
    Inline,
    Block,
}

/// Classify paragraph text that carries a formula.
fn math_kind(text: &str) -> Option<MathKind> {
    let trimmed = text.trim();

    if let Some(inner) = wrapped(trimmed, "\\[", "\\]") {
        if !inner.trim().is_empty() {
            return Some(MathKind::Block);
        }
    }
    if let Some(inner) = wrapped(trimmed, "\\(", "\\)") {
        if !inner.trim().is_empty() {
            return Some(MathKind::Inline);
        }
    }
    if contains_pair(trimmed, "$$", "$$") {
        return Some(MathKind::Block);
    }
    if contains_pair(trimmed, "\\(", "\\)") {
        return Some(MathKind::Inline);
    }
    if contains_pair(trimmed, "\\[", "\\]") {
        return Some(MathKind::Block);
    }
    if contains_dollar_pair(trimmed) {
        return Some(MathKind::Inline);
    }
    None
}

fn wrapped<'a>(text: &'a str, open: &str, close: &str) -> Option<&'a str> {
    text.strip_prefix(open)?.strip_suffix(close)
}

/// True when `open` is followed later by `close` with non-blank text between.
fn contains_pair(text: &str, open: &str, close: &str) -> bool {
    let Some(start) = text.find(open) else {
        return false;
    };
    let rest = &text[start + open.len()..];
    rest.find(close)
        .is_some_and(|end| !rest[..end].trim().is_empty())
}

/// Bare `$...$`, skipping `$$` pairs of dollar signs.
fn contains_dollar_pair(text: &str) -> bool {
    let bytes = text.as_bytes();
    let mut index = 0;
    while index < bytes.len() {
        if bytes[index] == b'$' {
            if bytes.get(index + 1) == Some(&b'$') {
                index += 2;
                continue;
            }
            let rest = &text[index + 1..];
            if let Some(end) = rest.find('$') {
                if !rest[..end].trim().is_empty() {
                    return true;
                }
            }
        }
        index += 1;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn para(text: &str) -> Block {
        Block::Paragraph {
            text: text.to_string(),
        }
    }

    fn item(text: &str, depth_path: &[usize]) -> ListItem {
        ListItem {
            text: text.to_string(),
            depth_path: depth_path.to_vec(),
            blocks: Vec::new(),
        }
    }

    fn task(checked: bool, text: &str, depth_path: &[usize]) -> TaskItem {
        TaskItem {
            checked,
            text: text.to_string(),
            depth_path: depth_path.to_vec(),
            blocks: Vec::new(),
        }
    }

    #[test]
    fn heading_and_paragraph() {
        assert_eq!(
            parse_blocks("# Title\n\nHello *world*."),
            vec![
                Block::Heading {
                    level: 1,
                    text: "Title".to_string(),
                },
                para("Hello _world_."),
            ]
        );
    }

    #[test]
    fn mixed_checkboxes_make_one_task_list() {
        assert_eq!(
            parse_blocks("- a\n- [ ] b\n- [x] c"),
            vec![Block::TaskList {
                items: vec![
                    task(false, "a", &[1]),
                    task(false, "b", &[2]),
                    task(true, "c", &[3]),
                ],
            }]
        );
    }

    #[test]
    fn ordered_and_unordered_lists() {
        assert_eq!(
            parse_blocks("1. one\n2. two\n\n- x\n- y\n"),
            vec![
                Block::OrderedList {
                    items: vec![item("one", &[1]), item("two", &[2])],
                },
                Block::UnorderedList {
                    items: vec![item("x", &[1]), item("y", &[2])],
                },
            ]
        );
    }

    #[test]
    fn nested_list_extends_depth_path() {
        let blocks = parse_blocks("- parent\n  - child\n  - sibling\n- second\n");

        let nested = Block::UnorderedList {
            items: vec![item("child", &[1, 1]), item("sibling", &[1, 2])],
        };
        assert_eq!(
            blocks,
            vec![Block::UnorderedList {
                items: vec![
                    ListItem {
                        text: "parent".to_string(),
                        depth_path: vec![1],
                        blocks: vec![nested],
                    },
                    item("second", &[2]),
                ],
            }]
        );
    }

    #[test]
    fn loose_list_items_read_their_paragraphs() {
        assert_eq!(
            parse_blocks("- first\n\n  more\n\n- second\n"),
            vec![Block::UnorderedList {
                items: vec![item("first\nmore", &[1]), item("second", &[2])],
            }]
        );
    }

    #[test]
    fn code_block_trims_surrounding_newlines() {
        assert_eq!(
            parse_blocks("```swift\n\nlet x = 1\n\n```\n\n```\nplain\n```"),
            vec![
                Block::Code {
                    language: Some("swift".to_string()),
                    code: "let x = 1".to_string(),
                },
                Block::Code {
                    language: None,
                    code: "plain".to_string(),
                },
            ]
        );
    }

    #[test]
    fn quote_collects_paragraph_and_heading_lines() {
        assert_eq!(
            parse_blocks("> ## Note\n>\n> first\n>\n> ```\n> dropped\n> ```\n>\n> second\n"),
            vec![Block::Quote {
                lines: vec![
                    "Note".to_string(),
                    "first".to_string(),
                    "second".to_string(),
                ],
            }]
        );
    }

    #[test]
    fn divider_and_html() {
        assert_eq!(
            parse_blocks("---\n\n<div>\nhi\n</div>\n"),
            vec![
                Block::Divider,
                Block::Html {
                    raw: "<div>\nhi\n</div>\n".to_string(),
                },
            ]
        );
    }

    #[test]
    fn table_with_header() {
        assert_eq!(
            parse_blocks("| a | b |\n|---|---|\n| 1 | **2** |\n"),
            vec![Block::Table {
                headers: vec!["a".to_string(), "b".to_string()],
                rows: vec![vec!["1".to_string(), "**2**".to_string()]],
            }]
        );
    }

    #[test]
    fn table_header_falls_back_to_first_row() {
        let root = Node {
            kind: NodeKind::Table,
            children: vec![
                row(NodeKind::TableHead, &[]),
                row(NodeKind::TableRow, &["h1", "h2"]),
                row(NodeKind::TableRow, &["v1", "v2"]),
            ],
        };

        assert_eq!(
            table(&root),
            Block::Table {
                headers: vec!["h1".to_string(), "h2".to_string()],
                rows: vec![vec!["v1".to_string(), "v2".to_string()]],
            }
        );
    }

    #[test]
    fn table_drops_body_row_duplicating_header() {
        let root = Node {
            kind: NodeKind::Table,
            children: vec![
                row(NodeKind::TableHead, &["h"]),
                row(NodeKind::TableRow, &["h"]),
                row(NodeKind::TableRow, &["v"]),
            ],
        };

        assert_eq!(
            table(&root),
            Block::Table {
                headers: vec!["h".to_string()],
                rows: vec![vec!["v".to_string()]],
            }
        );
    }

    fn row(kind: NodeKind, cells: &[&str]) -> Node {
        Node {
            kind,
            children: cells
                .iter()
                .map(|cell| Node {
                    kind: NodeKind::TableCell,
                    children: vec![Node {
                        kind: NodeKind::Text(cell.to_string()),
                        children: Vec::new(),
                    }],
                })
                .collect(),
        }
    }

    #[test]
    fn paragraph_splits_at_images() {
        assert_eq!(
            parse_blocks("before ![alt](a.png \"Title\") after"),
            vec![
                para("before "),
                Block::Image {
                    alt: "alt".to_string(),
                    url: "a.png".to_string(),
                    title: Some("Title".to_string()),
                },
                para(" after"),
            ]
        );
    }

    #[test]
    fn lone_image_has_no_title() {
        assert_eq!(
            parse_blocks("![](x.png)"),
            vec![Block::Image {
                alt: String::new(),
                url: "x.png".to_string(),
                title: None,
            }]
        );
    }

    #[test]
    fn footnotes_move_to_the_end() {
        let blocks = parse_blocks("Body[^1] text.\n\n[^1]: The note.\n\nLater paragraph.\n");

        assert_eq!(
            blocks,
            vec![
                para("Body[^1] text."),
                para("Later paragraph."),
                Block::Footnote {
                    label: "1".to_string(),
                    content: "The note.".to_string(),
                },
            ]
        );
    }

    #[test]
    fn scrapes_multiple_definitions_from_text() {
        assert_eq!(
            footnote_definitions("[^a]: first\n[^b]: second\n    more"),
            vec![
                Block::Footnote {
                    label: "a".to_string(),
                    content: "first".to_string(),
                },
                Block::Footnote {
                    label: "b".to_string(),
                    content: "second\nmore".to_string(),
                },
            ]
        );
    }

    #[test]
    fn scraping_rejects_stray_lines() {
        assert_eq!(footnote_definitions("[^a]: first\nnot indented"), Vec::new());
        assert_eq!(footnote_definitions("plain text"), Vec::new());
    }

    #[rstest]
    #[case("\\[x^2\\]", Some(MathKind::Block))]
    #[case("\\(x\\)", Some(MathKind::Inline))]
    #[case("see $$a+b$$ here", Some(MathKind::Block))]
    #[case("inline $x$ here", Some(MathKind::Inline))]
    #[case("$$ $$", None)]
    #[case("no math", None)]
    fn classifies_math_text(#[case] text: &str, #[case] expected: Option<MathKind>) {
        assert_eq!(math_kind(text), expected);
    }

    #[test]
    fn block_formula_keeps_encoded_newlines() {
        let blocks = parse_blocks("$$\nx^2\n+ y\n$$");

        let [Block::MathBlock { text }] = blocks.as_slice() else {
            panic!("expected one math block, got {blocks:?}");
        };
        let payload = text
            .strip_prefix("$$")
            .and_then(|rest| rest.strip_suffix("$$"))
            .unwrap();
        assert_eq!(latex::decode_placeholder(payload), "\nx^2\n+ y\n");
    }

    #[test]
    fn inline_formula_round_trips() {
        let blocks = parse_blocks("$x+y$");

        assert_eq!(
            blocks,
            vec![Block::MathInline {
                text: latex::process("$x+y$"),
            }]
        );
        if let [Block::MathInline { text }] = blocks.as_slice() {
            assert_eq!(latex::decode_math(text), "$x+y$");
        }
    }

    #[test]
    fn math_text_is_trimmed_unlike_paragraphs() {
        let image = Block::Image {
            alt: "i".to_string(),
            url: "u".to_string(),
            title: None,
        };

        assert_eq!(
            parse_blocks("$x+y$ ![i](u)"),
            vec![
                Block::MathInline {
                    text: latex::process("$x+y$"),
                },
                image.clone(),
            ]
        );
        assert_eq!(parse_blocks("plain ![i](u)"), vec![para("plain "), image]);
    }

    #[test]
    fn without_math_preprocessing_escapes_win() {
        let options = ParserOptions {
            math: false,
            ..ParserOptions::default()
        };

        assert_eq!(parse_blocks_with("\\(a\\)", &options), vec![para("(a)")]);
        assert_eq!(
            parse_blocks("\\(a\\)"),
            vec![Block::MathInline {
                text: latex::process("\\(a\\)"),
            }]
        );
    }

    #[test]
    fn empty_input_has_no_blocks() {
        assert_eq!(parse_blocks(""), Vec::new());
        assert_eq!(parse_blocks("\n\n   \n"), Vec::new());
    }
}
