//! CLI module for waveplan
//!
//! Command-line parsing for the `waveplan` binary. Uses clap for argument
//! parsing and owo-colors for colored terminal output.

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// waveplan - decision layer for two-wave research pipelines
///
/// Classifies queries, plans research perspectives, gates evidence quality
/// and enforces the stage order of a research session.
#[derive(Parser, Debug)]
#[command(
    name = "waveplan",
    author = "Dirmacs <build@dirmacs.com>",
    version,
    about = "waveplan - decision layer for two-wave research pipelines",
    long_about = "Classifies research queries by consensus, plans perspectives, scores wave-1\n\
                  worker output, decides whether a second wave is needed and enforces the\n\
                  order of pipeline stages through marker files.\n\n\
                  Every command exits 0 on success and 1 on failure or a blocked gate.",
    after_help = "EXAMPLES:\n    \
                  waveplan classify \"Research OSINT tools for threat intelligence\"\n    \
                  waveplan --session ./run plan \"Compare vector databases\"\n    \
                  waveplan --session ./run mark wave1\n    \
                  waveplan --session ./run analyze --json\n    \
                  waveplan --session ./run skip-wave2 \"coverage sufficient\"\n    \
                  waveplan --session ./run status --json"
)]
pub struct Cli {
    /// Session directory (defaults to [session].root, then the current directory)
    #[arg(short, long, global = true, env = "WAVEPLAN_SESSION")]
    pub session: Option<PathBuf>,

    /// Path to the configuration file (defaults to ./waveplan.toml when present)
    #[arg(short, long, global = true, env = "WAVEPLAN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check that a stage's prerequisite marker exists
    Verify {
        /// Stage id or number (wave1, wave1-validated, pivot, wave2, citations, synthesis)
        stage: String,
    },

    /// Record a stage as complete
    Mark {
        /// Stage id or number
        stage: String,
    },

    /// Record that wave 2 was deliberately skipped
    #[command(name = "skip-wave2")]
    SkipWave2 {
        /// Why wave 2 is not needed
        reason: String,
    },

    /// Show stage progress for the session
    Status {
        /// Print the status as JSON
        #[arg(long)]
        json: bool,
    },

    /// Count worker outputs per wave
    Count,

    /// Classify a query by keyword and semantic consensus
    Classify {
        /// The research query
        query: String,

        /// Use the keyword classifier only
        #[arg(long)]
        keyword_only: bool,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Generate and validate research perspectives, writing analysis/plan.json
    Plan {
        /// The research query
        query: String,

        /// Derive perspectives from keyword classification only
        #[arg(long)]
        keyword_only: bool,
    },

    /// Score a wave and decide whether wave 2 is needed
    Analyze {
        /// Wave to analyse
        #[arg(long, default_value_t = 1)]
        wave: u8,

        /// Print the analysis as JSON
        #[arg(long)]
        json: bool,
    },

    /// Tier a list of source URLs and run the quality gate
    Sources {
        /// URLs to evaluate
        #[arg(required = true)]
        urls: Vec<String>,

        /// Print the gate result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Manage the classification cache
    #[command(subcommand)]
    Cache(CacheCommands),
}

/// Cache maintenance subcommands
#[derive(Subcommand, Debug)]
pub enum CacheCommands {
    /// Show entry counts and hit totals
    Stats {
        /// Print the stats as JSON
        #[arg(long)]
        json: bool,
    },

    /// Remove every entry
    Clear,

    /// Remove expired entries
    Prune,
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
