use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use log::LevelFilter;
use mdkit::{CachedParser, Config, Document, MarkdownParser, Parse};

#[derive(Parser)]
#[command(name = "mdkit")]
#[command(about = "Parse Markdown into blocks, replaying it as a growing stream")]
struct Cli {
    /// Input Markdown file, or `-` for stdin
    input: PathBuf,

    /// Config file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bytes appended per streaming step
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Parse every step from scratch
    #[arg(long)]
    no_cache: bool,

    /// Pretty-print the JSON output
    #[arg(long)]
    pretty: bool,

    /// Print cache statistics to stderr
    #[arg(long)]
    stats: bool,
}

fn main() -> Result<()> {
    // RUST_LOG overrides the default level
    env_logger::Builder::new()
        .filter_level(LevelFilter::Warn)
        .parse_default_env()
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::from_path(path)?,
        None => Config::compiled_default(),
    };
    if let Some(chunk_size) = cli.chunk_size {
        config.stream.chunk_size = chunk_size;
    }
    if cli.no_cache {
        config.cache.enabled = false;
    }

    let markdown = read_input(&cli.input)?;
    let source = MarkdownParser::new(config.parser_options());

    let document = if config.cache.enabled {
        let parser = CachedParser::with_source(source);
        let document = replay(&parser, &markdown, config.stream.step());
        if cli.stats {
            eprintln!("{}", serde_json::to_string(&parser.stats())?);
        }
        document
    } else {
        replay(&source, &markdown, config.stream.step())
    };

    let json = if cli.pretty {
        serde_json::to_string_pretty(&document)?
    } else {
        serde_json::to_string(&document)?
    };
    println!("{json}");
    Ok(())
}

fn read_input(input: &Path) -> Result<String> {
    if input.as_os_str() == "-" {
        let mut markdown = String::new();
        io::stdin()
            .read_to_string(&mut markdown)
            .context("Failed to read stdin")?;
        return Ok(markdown);
    }
    fs::read_to_string(input).with_context(|| format!("Failed to read {}", input.display()))
}

/// Feed `markdown` to `parser` as growing prefixes, `step` bytes at a time,
/// and return the document for the full text.
fn replay(parser: &impl Parse, markdown: &str, step: usize) -> Document {
    let mut document = Document::default();
    let mut end = 0;
    while end < markdown.len() {
        end = (end + step).min(markdown.len());
        while !markdown.is_char_boundary(end) {
            end += 1;
        }
        log::debug!("streaming {end}/{} bytes", markdown.len());
        document = parser.parse(&markdown[..end]);
    }
    document
}
