//! Build automation tasks for the lote workspace
//!
//! Currently generates the `lote` command reference from the clap definitions.

use clap::Parser;
use std::fs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Build automation tasks for lote", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Parser)]
enum Command {
    /// Generate the CLI reference in Markdown
    GenerateCliDocs {
        /// Output directory for generated documentation
        #[arg(short, long, default_value = "docs")]
        output_dir: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::GenerateCliDocs { output_dir } => generate_cli_docs(&output_dir)?,
    }

    Ok(())
}

fn generate_cli_docs(output_dir: &str) -> anyhow::Result<()> {
    println!("Generating CLI documentation...");

    let markdown = clap_markdown::help_markdown::<lote_pipeline::cli::Cli>();

    let content = format!(
        r#"# lote CLI Reference

Generated from the CLI source code. Last updated: {}.

## Overview

`lote` moves one day of `concurso` rows through a message channel as a framed
batch. `extract` publishes a header, every record of the day and a footer to the
date topic. `consume` rebuilds the frame, validates it, then either inserts the
batch into `concurso_processado` or sends every record to the error topic and
writes audit artifacts.

## Quick Start

```bash
# Apply migrations
lote migrate

# Load January 2025 test data
lote seed

# Move one day through the pipeline
lote extract 2025-01-02
lote consume 2025-01-02
```

## Commands

{}

## Exit Codes

- `0` - batch accepted (or command succeeded)
- `1` - nothing accepted
- `2` - usage error
- `3` - batch partially inserted

## Environment Variables

- `DATABASE_URL` - PostgreSQL connection string (required)
- `LOTE_TOPIC_PREFIX` - date topic prefix (default: `concurso`)
- `LOTE_ERROR_TOPIC` - quarantine topic (default: `concurso_erros`)
- `LOTE_CONSUMER_GROUP` - consumer group for `consume`
- `LOTE_EXTRACT_PAGE_SIZE`, `LOTE_PUBLISH_BATCH_SIZE`, `LOTE_INSERT_BATCH_SIZE` - paging and chunk sizes
- `LOTE_MAX_MESSAGES` - upper bound on messages read per `consume`
- `LOTE_EXTRACT_TIMEOUT_SECS`, `LOTE_CONSUME_TIMEOUT_SECS` - per-invocation deadlines
- `LOTE_AUDIT_TIMEOUT_SECS` - upper bound on one audit artifact write (default: 30)
- `LOTE_AUDIT_BACKEND` - `fs` or `s3`; `LOTE_AUDIT_DIR` - artifact root for `fs`
- `LOG_LEVEL`, `LOG_OUTPUT`, `LOG_FORMAT`, `LOG_DIR` - logging

---

*To update, run `cargo xtask generate-cli-docs`.*
"#,
        chrono::Utc::now().format("%Y-%m-%d"),
        markdown
    );

    let output_path = PathBuf::from(output_dir);
    fs::create_dir_all(&output_path)?;

    let file_path = output_path.join("cli-reference.md");
    fs::write(&file_path, content)?;

    println!("Generated CLI documentation at: {}", file_path.display());

    Ok(())
}
