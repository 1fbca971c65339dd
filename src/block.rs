use serde::Serialize;

/// A single list item, which can contain nested blocks
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ListItem {
    pub text: String,
    /// 1-based position at every nesting level, root first. A layout hint,
    /// not an identity: it is rebuilt on every parse.
    pub depth_path: Vec<usize>,
    pub blocks: Vec<Block>,
}

/// A list item carrying a checkbox
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TaskItem {
    pub checked: bool,
    pub text: String,
    pub depth_path: Vec<usize>,
    pub blocks: Vec<Block>,
}

/// Block-level elements parsed from Markdown.
///
/// Text fields hold inline Markdown re-serialized as a string (`_em_`,
/// `**strong**`, `` `code` ``, `[label](url)`), one level shallower than a
/// full inline tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Heading {
        level: u8,
        text: String,
    },
    Paragraph {
        text: String,
    },
    Quote {
        lines: Vec<String>,
    },
    UnorderedList {
        items: Vec<ListItem>,
    },
    OrderedList {
        items: Vec<ListItem>,
    },
    TaskList {
        items: Vec<TaskItem>,
    },
    Code {
        language: Option<String>,
        code: String,
    },
    Link {
        title: String,
        url: String,
    },
    Image {
        alt: String,
        url: String,
        title: Option<String>,
    },
    Table {
        headers: Vec<String>,
        rows: Vec<Vec<String>>,
    },
    Divider,
    Html {
        raw: String,
    },
    Footnote {
        label: String,
        content: String,
    },
    MathInline {
        text: String,
    },
    MathBlock {
        text: String,
    },
}

impl Block {
    pub fn is_footnote(&self) -> bool {
        matches!(self, Block::Footnote { .. })
    }
}

/// The result of a parse: an ordered list of blocks with no cross-references.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Document {
    pub blocks: Vec<Block>,
}

impl Document {
    pub fn new(blocks: Vec<Block>) -> Self {
        Self { blocks }
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn footnotes(&self) -> impl Iterator<Item = &Block> {
        self.blocks.iter().filter(|block| block.is_footnote())
    }
}

/// Move footnotes behind every other block, keeping relative order on both
/// sides.
pub(crate) fn footnotes_last(blocks: Vec<Block>) -> Vec<Block> {
    let (mut body, footnotes): (Vec<Block>, Vec<Block>) =
        blocks.into_iter().partition(|block| !block.is_footnote());
    body.extend(footnotes);
    body
}
