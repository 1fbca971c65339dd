//! Prefix-reusing parse cache for text that grows by appends.
//!
//! Each call to [`CachedParser::parse`] takes one of four paths:
//!
//! - **hit**: the text is unchanged, the previous blocks are returned as is;
//! - **cold**: nothing is cached yet, the full text is parsed;
//! - **reused**: the text only grew, so the blocks of the stable prefix are
//!   kept and only the rest is parsed;
//! - **reparsed**: anything else (an edit, or appended text that defines
//!   references) falls back to a full parse.
//!
//! The whole read-modify-write runs under one lock, so concurrent callers
//! are serialized and never observe a half-updated cache.

use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use crate::block::{Block, Document, footnotes_last};
use crate::parser::{BlockSource, MarkdownParser, Parse};
use crate::stability::{needs_full_reparse, stable_prefix_len};

/// Which path the last parse took
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseOutcome {
    Hit,
    Cold,
    Reused,
    Reparsed,
}

/// Per-instance parse counters
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: usize,
    pub cold: usize,
    pub reused: usize,
    pub reparsed: usize,
}

impl CacheStats {
    fn record(&mut self, outcome: ParseOutcome) {
        match outcome {
            ParseOutcome::Hit => self.hits += 1,
            ParseOutcome::Cold => self.cold += 1,
            ParseOutcome::Reused => self.reused += 1,
            ParseOutcome::Reparsed => self.reparsed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.hits + self.cold + self.reused + self.reparsed
    }
}

#[derive(Debug, Default)]
struct CacheState {
    last_text: String,
    last_blocks: Vec<Block>,
    /// Byte length of the stable prefix of `last_text`
    stable_len: usize,
    /// Blocks of `last_text[..stable_len]` parsed on their own
    stable_blocks: Vec<Block>,
    last_outcome: Option<ParseOutcome>,
    stats: CacheStats,
}

/// Caching parser for one logical document.
///
/// Instances share nothing; use one per document being displayed.
#[derive(Debug)]
pub struct CachedParser<P = MarkdownParser> {
    source: P,
    state: Mutex<CacheState>,
}

impl CachedParser {
    pub fn new() -> Self {
        Self::with_source(MarkdownParser::default())
    }
}

impl Default for CachedParser {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: BlockSource> CachedParser<P> {
    pub fn with_source(source: P) -> Self {
        Self {
            source,
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn parse(&self, markdown: &str) -> Document {
        let mut state = self.lock();
        let outcome = self.update(&mut state, markdown);
        state.last_outcome = Some(outcome);
        state.stats.record(outcome);
        Document::new(state.last_blocks.clone())
    }

    pub fn last_outcome(&self) -> Option<ParseOutcome> {
        self.lock().last_outcome
    }

    pub fn stats(&self) -> CacheStats {
        self.lock().stats
    }

    /// Forget the cached text and counters.
    pub fn reset(&self) {
        *self.lock() = CacheState::default();
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        // Every write replaces the state as a whole, so a panic mid-parse
        // cannot leave it half-updated.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn update(&self, state: &mut CacheState, markdown: &str) -> ParseOutcome {
        if markdown == state.last_text {
            log::debug!("cache hit ({} bytes)", markdown.len());
            return ParseOutcome::Hit;
        }

        if state.last_text.is_empty() {
            log::debug!("cold start, full parse ({} bytes)", markdown.len());
            self.parse_full(state, markdown);
            return ParseOutcome::Cold;
        }

        if !markdown.starts_with(state.last_text.as_str()) {
            log::debug!("content changed, full parse");
            self.parse_full(state, markdown);
            return ParseOutcome::Reparsed;
        }

        // Include the partial last line so a definition split across two
        // appends is still seen as one line.
        let line_start = state.last_text.rfind('\n').map_or(0, |i| i + 1);
        if needs_full_reparse(&markdown[line_start..]) {
            log::debug!("appended text defines references, full parse");
            self.parse_full(state, markdown);
            return ParseOutcome::Reparsed;
        }

        if state.stable_len == 0 || state.stable_blocks.is_empty() {
            log::debug!("no stable prefix yet, full parse");
            self.parse_full(state, markdown);
            return ParseOutcome::Reparsed;
        }

        let start = state.stable_len.min(markdown.len());
        let Some(suffix) = markdown.get(start..) else {
            self.parse_full(state, markdown);
            return ParseOutcome::Reparsed;
        };
        log::debug!(
            "reusing {} stable bytes, parsing {} byte suffix",
            start,
            suffix.len()
        );
        let mut blocks = state.stable_blocks.clone();
        blocks.extend(self.source.parse_blocks(suffix));
        self.store(state, markdown, footnotes_last(blocks));
        ParseOutcome::Reused
    }

    fn parse_full(&self, state: &mut CacheState, markdown: &str) {
        let blocks = self.source.parse_blocks(markdown);
        self.store(state, markdown, blocks);
    }

    fn store(&self, state: &mut CacheState, markdown: &str, blocks: Vec<Block>) {
        let stable_len = stable_prefix_len(markdown).min(markdown.len());
        let unchanged_prefix = stable_len == state.stable_len
            && state.last_text.get(..stable_len) == markdown.get(..stable_len);

        let stable_blocks = if stable_len == 0 {
            Vec::new()
        } else if stable_len == markdown.len() {
            blocks.clone()
        } else if unchanged_prefix {
            std::mem::take(&mut state.stable_blocks)
        } else {
            // Block boundaries do not map 1:1 onto offsets, so the prefix is
            // parsed on its own to get a self-consistent anchor.
            self.source.parse_blocks(&markdown[..stable_len])
        };

        *state = CacheState {
            last_text: markdown.to_string(),
            last_blocks: blocks,
            stable_len,
            stable_blocks,
            last_outcome: state.last_outcome,
            stats: state.stats,
        };
    }
}

impl<P: BlockSource> Parse for CachedParser<P> {
    fn parse(&self, markdown: &str) -> Document {
        CachedParser::parse(self, markdown)
    }
}
