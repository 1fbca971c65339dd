//! Generic Markdown node tree built from `pulldown-cmark` events.

use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Document,
    Heading(u8),
    Paragraph,
    BlockQuote,
    List { ordered: bool },
    /// `checked` is `None` for items without a checkbox.
    Item { checked: Option<bool> },
    CodeBlock { language: Option<String>, code: String },
    Rule,
    HtmlBlock(String),
    Table,
    TableHead,
    TableRow,
    TableCell,
    FootnoteDefinition(String),
    Text(String),
    Emphasis,
    Strong,
    Strikethrough,
    Code(String),
    SoftBreak,
    HardBreak,
    Link { url: String },
    Image { url: String, title: Option<String> },
    InlineHtml(String),
    FootnoteReference(String),
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub kind: NodeKind,
    pub children: Vec<Node>,
}

impl Node {
    fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            children: Vec::new(),
        }
    }

    pub fn is_inline(&self) -> bool {
        matches!(
            self.kind,
            NodeKind::Text(_)
                | NodeKind::Emphasis
                | NodeKind::Strong
                | NodeKind::Strikethrough
                | NodeKind::Code(_)
                | NodeKind::SoftBreak
                | NodeKind::HardBreak
                | NodeKind::Link { .. }
                | NodeKind::Image { .. }
                | NodeKind::InlineHtml(_)
                | NodeKind::FootnoteReference(_)
        )
    }
}

/// Which GFM extensions the tokenizer recognizes. Footnotes are always on.
#[derive(Debug, Clone, Copy)]
pub struct Extensions {
    pub tables: bool,
    pub strikethrough: bool,
    pub tasklists: bool,
}

impl Default for Extensions {
    fn default() -> Self {
        Self {
            tables: true,
            strikethrough: true,
            tasklists: true,
        }
    }
}

impl Extensions {
    fn options(self) -> Options {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_FOOTNOTES);
        if self.tables {
            options.insert(Options::ENABLE_TABLES);
        }
        if self.strikethrough {
            options.insert(Options::ENABLE_STRIKETHROUGH);
        }
        if self.tasklists {
            options.insert(Options::ENABLE_TASKLISTS);
        }
        options
    }
}

/// Parse markdown into a tree rooted at a `Document` node
pub fn parse(markdown: &str, extensions: Extensions) -> Node {
    let parser = Parser::new_ext(markdown, extensions.options());
    let mut state = TreeState {
        stack: vec![Node::new(NodeKind::Document)],
    };

    for event in parser {
        process_event(event, &mut state);
    }

    // Events are balanced, but fold anything left open rather than lose it.
    while state.stack.len() > 1 {
        state.close();
    }
    state
        .stack
        .pop()
        .unwrap_or_else(|| Node::new(NodeKind::Document))
}

struct TreeState {
    stack: Vec<Node>,
}

impl TreeState {
    fn open(&mut self, kind: NodeKind) {
        self.stack.push(Node::new(kind));
    }

    fn close(&mut self) {
        if self.stack.len() < 2 {
            return;
        }
        if let Some(node) = self.stack.pop() {
            self.leaf(node);
        }
    }

    fn leaf(&mut self, node: Node) {
        if let Some(parent) = self.stack.last_mut() {
            parent.children.push(node);
        }
    }

    fn top_kind(&mut self) -> Option<&mut NodeKind> {
        self.stack.last_mut().map(|node| &mut node.kind)
    }
}

fn process_event(event: Event, state: &mut TreeState) {
    match event {
        Event::Start(tag) => {
            let kind = tag_kind(tag);
            state.open(kind);
        }
        Event::End(_) => state.close(),

        // Code blocks and HTML blocks collect their raw text
        Event::Text(text) => match state.top_kind() {
            Some(NodeKind::CodeBlock { code, .. }) => code.push_str(&text),
            Some(NodeKind::HtmlBlock(raw)) => raw.push_str(&text),
            _ => state.leaf(Node::new(NodeKind::Text(text.into_string()))),
        },
        Event::Html(html) => match state.top_kind() {
            Some(NodeKind::HtmlBlock(raw)) => raw.push_str(&html),
            _ => state.leaf(Node::new(NodeKind::HtmlBlock(html.into_string()))),
        },
        Event::InlineHtml(html) => {
            state.leaf(Node::new(NodeKind::InlineHtml(html.into_string())));
        }

        Event::Code(code) => state.leaf(Node::new(NodeKind::Code(code.into_string()))),
        Event::FootnoteReference(label) => {
            state.leaf(Node::new(NodeKind::FootnoteReference(label.into_string())));
        }
        Event::SoftBreak => state.leaf(Node::new(NodeKind::SoftBreak)),
        Event::HardBreak => state.leaf(Node::new(NodeKind::HardBreak)),
        Event::Rule => state.leaf(Node::new(NodeKind::Rule)),

        // Task list checkboxes belong to the innermost open item
        Event::TaskListMarker(checked) => {
            let item = state
                .stack
                .iter_mut()
                .rev()
                .find(|node| matches!(node.kind, NodeKind::Item { .. }));
            if let Some(node) = item {
                node.kind = NodeKind::Item {
                    checked: Some(checked),
                };
            }
        }

        // Math is handled by the LaTeX preprocessor, never by the tokenizer
        Event::InlineMath(text) | Event::DisplayMath(text) => {
            state.leaf(Node::new(NodeKind::Text(text.into_string())));
        }
    }
}

fn tag_kind(tag: Tag) -> NodeKind {
    match tag {
        Tag::Paragraph => NodeKind::Paragraph,
        Tag::Heading { level, .. } => NodeKind::Heading(heading_level_to_u8(level)),
        Tag::BlockQuote(_) => NodeKind::BlockQuote,
        Tag::CodeBlock(kind) => {
            let language = match kind {
                CodeBlockKind::Fenced(lang) => {
                    let lang = lang.into_string();
                    if lang.is_empty() { None } else { Some(lang) }
                }
                CodeBlockKind::Indented => None,
            };
            NodeKind::CodeBlock {
                language,
                code: String::new(),
            }
        }
        Tag::HtmlBlock => NodeKind::HtmlBlock(String::new()),
        Tag::List(first_item) => NodeKind::List {
            ordered: first_item.is_some(),
        },
        Tag::Item => NodeKind::Item { checked: None },
        Tag::FootnoteDefinition(label) => NodeKind::FootnoteDefinition(label.into_string()),
        Tag::Table(_) => NodeKind::Table,
        Tag::TableHead => NodeKind::TableHead,
        Tag::TableRow => NodeKind::TableRow,
        Tag::TableCell => NodeKind::TableCell,
        Tag::Emphasis => NodeKind::Emphasis,
        Tag::Strong => NodeKind::Strong,
        Tag::Strikethrough => NodeKind::Strikethrough,
        Tag::Link { dest_url, .. } => NodeKind::Link {
            url: dest_url.into_string(),
        },
        Tag::Image {
            dest_url, title, ..
        } => {
            let title = title.into_string();
            NodeKind::Image {
                url: dest_url.into_string(),
                title: if title.is_empty() { None } else { Some(title) },
            }
        }
        _ => NodeKind::Other,
    }
}

fn heading_level_to_u8(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}
