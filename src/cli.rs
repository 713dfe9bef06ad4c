use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

use crate::{
    chunking::{
        ChunkingConfig,
        DEFAULT_MAX_TOKENS,
        DEFAULT_OVERLAP_TOKENS,
        DEFAULT_SENTENCE_OVERLAP,
        DEFAULT_TARGET_CHARS,
    },
    embedding::{DEFAULT_BATCH_SIZE, DEFAULT_DIMENSION},
    export::ExportKind,
    search::SearchParams,
    session::SearchMode,
};

#[derive(Debug, Parser)]
#[command(
    name = "docsift",
    version,
    about = "Chunk documents, index them with BM25 and search with hybrid rank fusion"
)]
pub struct Cli {
    /// Override the XDG data directory
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Chunk, index and optionally embed files or directories
    Ingest(IngestArgs),
    /// Search the ingested chunks
    Search(SearchArgs),
    /// Write an export bundle
    Export(ExportArgs),
    /// Show session statistics
    Status(StatusArgs),
    /// Discard the stored session
    Reset,
    /// Generate shell completions
    #[command(hide = true)]
    Completions(CompletionsArgs),
}

// -- Ingest --

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Strategy {
    /// Non-overlapping token windows
    Fixed,
    /// Overlapping token windows
    Sliding,
    /// Sentences packed up to a character target
    Sentences,
    /// Heading-aware paragraph packing
    Recursive,
}

#[derive(Debug, Parser)]
pub struct IngestArgs {
    /// Files or directories to ingest
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Chunking strategy
    #[arg(long, value_enum, default_value = "sentences")]
    pub strategy: Strategy,

    /// Tokens per window (fixed, sliding)
    #[arg(long, default_value_t = DEFAULT_MAX_TOKENS)]
    pub max_tokens: usize,

    /// Tokens shared by consecutive windows (sliding)
    #[arg(long, default_value_t = DEFAULT_OVERLAP_TOKENS)]
    pub overlap: usize,

    /// Character target per chunk (sentences, recursive)
    #[arg(long, default_value_t = DEFAULT_TARGET_CHARS)]
    pub target_chars: usize,

    /// Sentences carried into the next chunk (sentences)
    #[arg(long, default_value_t = DEFAULT_SENTENCE_OVERLAP)]
    pub sentence_overlap: usize,

    /// Only ingest files whose path below a directory matches (repeatable)
    #[arg(long)]
    pub include: Vec<String>,

    /// Embed new chunks with the built-in hashing embedder
    #[arg(long)]
    pub embed: bool,

    /// Vector dimension for --embed
    #[arg(long, default_value_t = DEFAULT_DIMENSION)]
    pub dimension: usize,

    /// Texts per embedding call
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,
}

impl IngestArgs {
    pub fn chunking_config(&self) -> ChunkingConfig {
        match self.strategy {
            Strategy::Fixed => ChunkingConfig::FixedTokens {
                max_tokens: self.max_tokens,
            },
            Strategy::Sliding => ChunkingConfig::SlidingTokens {
                max_tokens: self.max_tokens,
                overlap_tokens: self.overlap,
            },
            Strategy::Sentences => ChunkingConfig::SentParagraph {
                target_chars: self.target_chars,
                sentence_overlap: self.sentence_overlap,
            },
            Strategy::Recursive => ChunkingConfig::Recursive {
                target_chars: self.target_chars,
            },
        }
    }
}

// -- Search --

#[derive(Debug, Parser)]
pub struct SearchArgs {
    /// The search query
    pub query: String,

    /// Number of results to return
    #[arg(short = 'n', long, default_value = "10")]
    pub count: usize,

    /// Ranking signal
    #[arg(long, value_enum, default_value = "sparse")]
    pub mode: SearchMode,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,

    /// Return all results above the score threshold
    #[arg(long)]
    pub all: bool,

    /// Drop results scoring below this threshold
    #[arg(long, allow_negative_numbers = true)]
    pub min_score: Option<f32>,
}

impl SearchArgs {
    pub fn params(&self) -> SearchParams {
        SearchParams {
            query: self.query.clone(),
            count: self.count,
            mode: self.mode,
            min_score: self.min_score,
            all: self.all,
        }
    }
}

// -- Export --

#[derive(Debug, Parser)]
pub struct ExportArgs {
    /// What each chunk record carries
    #[arg(long, value_enum, default_value = "chunks")]
    pub kind: ExportKind,

    /// Output directory
    #[arg(long)]
    pub out: PathBuf,
}

// -- Status --

#[derive(Debug, Parser)]
pub struct StatusArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Completions --

#[derive(Debug, Parser)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

impl CompletionsArgs {
    /// Generate shell completions and print to stdout.
    pub fn generate(&self) {
        let mut cmd = Cli::command();
        clap_complete::generate(
            self.shell,
            &mut cmd,
            "docsift",
            &mut std::io::stdout(),
        );
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_ingest_defaults() {
        let cli = Cli::parse_from(["docsift", "ingest", "notes"]);
        match cli.command {
            Command::Ingest(args) => {
                assert_eq!(args.paths, vec![PathBuf::from("notes")]);
                assert_eq!(args.strategy, Strategy::Sentences);
                assert!(!args.embed);
                assert_eq!(args.chunking_config(), ChunkingConfig::default());
            }
            _ => panic!("expected ingest command"),
        }
    }

    #[test]
    fn parse_sliding_ingest() {
        let cli = Cli::parse_from([
            "docsift",
            "ingest",
            "a.md",
            "b.md",
            "--strategy",
            "sliding",
            "--max-tokens",
            "10",
            "--overlap",
            "3",
            "--include",
            "*.md",
        ]);
        match cli.command {
            Command::Ingest(args) => {
                assert_eq!(args.paths.len(), 2);
                assert_eq!(args.include, vec!["*.md"]);
                assert_eq!(
                    args.chunking_config(),
                    ChunkingConfig::SlidingTokens {
                        max_tokens: 10,
                        overlap_tokens: 3,
                    }
                );
            }
            _ => panic!("expected ingest command"),
        }
    }

    #[test]
    fn parse_search_defaults() {
        let cli = Cli::parse_from(["docsift", "search", "hello"]);
        match cli.command {
            Command::Search(args) => {
                assert_eq!(args.query, "hello");
                assert_eq!(args.count, 10);
                assert_eq!(args.mode, SearchMode::Sparse);
                assert!(!args.json);
                assert!(!args.all);
                assert_eq!(args.min_score, None);
            }
            _ => panic!("expected search command"),
        }
    }

    #[test]
    fn parse_hybrid_search_with_global_flags() {
        let cli = Cli::parse_from([
            "docsift", "search", "q", "--mode", "hybrid", "-n", "3", "-vv",
        ]);
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Command::Search(args) => {
                assert_eq!(args.params().mode, SearchMode::Hybrid);
                assert_eq!(args.params().count, 3);
            }
            _ => panic!("expected search command"),
        }
    }

    #[test]
    fn parse_export() {
        let cli = Cli::parse_from([
            "docsift", "export", "--kind", "sparse", "--out", "bundle",
        ]);
        match cli.command {
            Command::Export(args) => {
                assert_eq!(args.kind, ExportKind::Sparse);
                assert_eq!(args.out, PathBuf::from("bundle"));
            }
            _ => panic!("expected export command"),
        }
    }

    #[test]
    fn parse_quiet_status() {
        let cli = Cli::parse_from(["docsift", "status", "--json", "-q"]);
        assert!(cli.quiet);
        assert!(matches!(cli.command, Command::Status(StatusArgs { json: true })));
    }
}
