pub mod ast;
mod block;
mod cache;
mod config;
pub mod inline;
pub mod latex;
mod parser;
mod stability;

pub use ast::Extensions;
pub use block::{Block, Document, ListItem, TaskItem};
pub use cache::{CacheStats, CachedParser, ParseOutcome};
pub use config::{CacheConfig, Config, ConfigError, MarkdownConfig, MathConfig, StreamConfig};
pub use latex::{decode_math, decode_placeholder};
pub use parser::{
    BlockSource, MarkdownParser, Parse, ParserOptions, extract_blocks, parse_blocks,
    parse_blocks_with,
};
pub use stability::{needs_full_reparse, stable_prefix_len};

/// Parse markdown text into a vector of blocks.
pub fn parse(markdown: &str) -> Vec<Block> {
    parser::parse_blocks(markdown)
}
