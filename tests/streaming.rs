use std::sync::Arc;
use std::thread;

use mdkit::{
    Block, CachedParser, MarkdownParser, Parse, ParseOutcome, ParserOptions, parse_blocks,
    parse_blocks_with, stable_prefix_len,
};
use pretty_assertions::assert_eq;
use rstest::rstest;

const DOCUMENT: &str = "# Streaming

Some *intro* text with `code`.

- one
- two
  - nested

1. first
2. second

- [x] done
- [ ] todo

> quoted
> lines

```rust
fn main() {

    println!(\"hi\");
}
```

| a | b |
|---|---|
| 1 | 2 |

$$
E = mc^2
$$

Inline \\(x^2 + y\\) math.

---

See the note[^n].

[^n]: A footnote.

Closing paragraph.
";

/// Every prefix of `text` ending on a char boundary, `step` bytes apart.
fn prefixes(text: &str, step: usize) -> Vec<&str> {
    let mut out = Vec::new();
    let mut end = 0;
    while end < text.len() {
        end = (end + step).min(text.len());
        while !text.is_char_boundary(end) {
            end += 1;
        }
        out.push(&text[..end]);
    }
    out
}

#[rstest]
#[case(1)]
#[case(7)]
#[case(64)]
fn streamed_prefixes_match_fresh_parses(#[case] step: usize) {
    let parser = CachedParser::new();

    for prefix in prefixes(DOCUMENT, step) {
        assert_eq!(parser.parse(prefix).blocks, parse_blocks(prefix), "{prefix:?}");
    }
    assert!(parser.stats().reused > 0);
}

#[rstest]
#[case::fence_left_by_its_list_item("- a\n\n  ```\n  code\n```\n\nx\n\ny\n")]
#[case::fence_closed_in_its_list_item("1. a\n\n   ```\n   code\n\n   ```\n\nx\n\ny\n")]
#[case::footnote_label_with_emphasis("Body.\n\n[^a*b*]: note\n\nMore.\n\nsee [^a*b*] here\n")]
#[case::footnote_reference_before_markup_label(
    "see [^a_b_] here\n\nMore.\n\n[^a_b_]: note\n\nEnd.\n"
)]
#[case::link_definition_in_quote("see [x] now\n\nPara.\n\n> [x]: h")]
#[case::link_definition_in_list("see [y] now\n\nPara.\n\n- [y]: h\n\nEnd.\n")]
#[case::footnote_definition_in_quote("Text[^n].\n\nMore.\n\n> [^n]: quoted note\n\nEnd.\n")]
fn hard_documents_stream_byte_by_byte(#[case] markdown: &str) {
    let parser = CachedParser::new();

    for prefix in prefixes(markdown, 1) {
        assert_eq!(parser.parse(prefix).blocks, parse_blocks(prefix), "{prefix:?}");
    }
}

#[test]
fn streamed_document_has_every_block_kind() {
    let parser = CachedParser::new();
    let document = prefixes(DOCUMENT, 5)
        .into_iter()
        .map(|prefix| parser.parse(prefix))
        .last()
        .unwrap();

    let kinds: Vec<&str> = document
        .blocks
        .iter()
        .map(|block| match block {
            Block::Heading { .. } => "heading",
            Block::Paragraph { .. } => "paragraph",
            Block::Quote { .. } => "quote",
            Block::UnorderedList { .. } => "unordered",
            Block::OrderedList { .. } => "ordered",
            Block::TaskList { .. } => "tasks",
            Block::Code { .. } => "code",
            Block::Table { .. } => "table",
            Block::Divider => "divider",
            Block::Footnote { .. } => "footnote",
            Block::MathInline { .. } => "math_inline",
            Block::MathBlock { .. } => "math_block",
            _ => "other",
        })
        .collect();

    assert_eq!(
        kinds,
        [
            "heading",
            "paragraph",
            "unordered",
            "ordered",
            "tasks",
            "quote",
            "code",
            "table",
            "math_block",
            "math_inline",
            "divider",
            "paragraph",
            "paragraph",
            "footnote",
        ]
    );
}

#[test]
fn multibyte_text_streams_on_char_boundaries() {
    let text = "# 見出し\n\n日本語の段落。\n\nÜmlaut *ünd* émoji 🎉\n\n最後\n";
    let parser = CachedParser::new();

    for prefix in prefixes(text, 1) {
        assert_eq!(parser.parse(prefix).blocks, parse_blocks(prefix));
    }
}

#[test]
fn open_math_block_is_never_stable() {
    let parser = CachedParser::new();
    let steps = ["Intro\n\n$$\n", "Intro\n\n$$\nx^2\n", "Intro\n\n$$\nx^2\n$$"];

    for markdown in steps {
        assert!(stable_prefix_len(markdown) <= "Intro\n\n".len());
        assert_eq!(parser.parse(markdown).blocks, parse_blocks(markdown));
    }

    let last = parser.parse(steps[2]);
    assert!(matches!(last.blocks.last(), Some(Block::MathBlock { .. })));
}

#[test]
fn repeated_parse_is_idempotent() {
    let parser = CachedParser::new();
    let first = parser.parse(DOCUMENT);
    let second = parser.parse(DOCUMENT);

    assert_eq!(first, second);
    assert_eq!(parser.last_outcome(), Some(ParseOutcome::Hit));
}

#[test]
fn footnotes_follow_body_blocks() {
    let markdown = "[^a]: First note.\n\nBody[^a] and[^b].\n\n[^b]: Second note.\n\nEnd.\n";
    let document = CachedParser::new().parse(markdown);
    let blocks = &document.blocks;

    let labels: Vec<&str> = document
        .footnotes()
        .filter_map(|block| match block {
            Block::Footnote { label, .. } => Some(label.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(labels, ["a", "b"]);
    assert!(matches!(blocks[0], Block::Paragraph { .. }));
    assert!(blocks.iter().rev().take(2).all(Block::is_footnote));
    assert!(!document.is_empty());
}

#[test]
fn shared_parser_is_consistent_across_threads() {
    let parser = Arc::new(CachedParser::new());
    let steps = prefixes(DOCUMENT, 11);

    thread::scope(|scope| {
        for worker in 0..4 {
            let parser = Arc::clone(&parser);
            let steps = &steps;
            scope.spawn(move || {
                for prefix in steps.iter().skip(worker) {
                    assert_eq!(parser.parse(prefix).blocks, parse_blocks(prefix));
                }
            });
        }
    });

    assert_eq!(parser.parse(DOCUMENT).blocks, parse_blocks(DOCUMENT));
}

#[test]
fn caching_and_plain_parsers_agree() {
    let options = ParserOptions::default();
    let plain = MarkdownParser::new(options);
    let cached = CachedParser::with_source(plain);

    for prefix in prefixes(DOCUMENT, 13) {
        assert_eq!(Parse::parse(&cached, prefix), plain.parse(prefix));
    }
    assert_eq!(plain.parse(DOCUMENT).blocks, parse_blocks_with(DOCUMENT, &options));
}
