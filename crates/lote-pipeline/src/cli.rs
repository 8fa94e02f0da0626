//! Command-line definition of the `lote` binary

use clap::{Parser, Subcommand};

use crate::seed::{DEFAULT_FIRST_DAY_COUNT, DEFAULT_PER_DAY_COUNT, DEFAULT_SEED_FROM, DEFAULT_SEED_TO};

/// Lote - framed batch transfer from `concurso` to `concurso_processado`
#[derive(Parser, Debug)]
#[command(name = "lote")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print the full command reference as markdown and exit
    #[arg(long, hide = true)]
    pub markdown_help: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Publish every source row of DATE as one framed batch
    Extract {
        /// Extraction date (YYYY-MM-DD)
        date: String,
    },

    /// Read the next batch of DATE, validate it and insert or quarantine it
    Consume {
        /// Extraction date (YYYY-MM-DD)
        date: String,
    },

    /// Replace the source table with a synthetic data set
    Seed {
        /// First day of the range (YYYY-MM-DD)
        #[arg(long, default_value = DEFAULT_SEED_FROM)]
        from: String,

        /// Last day of the range, inclusive (YYYY-MM-DD)
        #[arg(long, default_value = DEFAULT_SEED_TO)]
        to: String,

        /// Rows for every day after the first
        #[arg(long, default_value_t = DEFAULT_PER_DAY_COUNT)]
        per_day: u64,

        /// Rows for the first day, 10% of them without a status
        #[arg(long, default_value_t = DEFAULT_FIRST_DAY_COUNT)]
        first_day: u64,
    },

    /// Apply database migrations and exit
    Migrate,
}
