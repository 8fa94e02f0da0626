//! Lote - Main entry point

use anyhow::Context;
use clap::Parser;
use lote_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};
use lote_common::types::ExtractionDate;
use lote_pipeline::audit::{AuditSink, FsAuditSink, S3AuditConfig, S3AuditSink};
use lote_pipeline::channel::PgChannel;
use lote_pipeline::cli::{Cli, Commands};
use lote_pipeline::config::{AuditBackend, PipelineConfig};
use lote_pipeline::db::{create_pool, run_migrations};
use lote_pipeline::seed::SeedPlan;
use lote_pipeline::store::PgRecordStore;
use lote_pipeline::{Pipeline, PipelineError};
use std::process;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.markdown_help {
        println!("{}", clap_markdown::help_markdown::<Cli>());
        return;
    }

    let Some(command) = cli.command else {
        eprintln!("Error: A subcommand is required");
        eprintln!();
        eprintln!("For more information, try '--help'.");
        process::exit(2);
    };

    let log_config = LogConfig::builder()
        .level(if cli.verbose { LogLevel::Debug } else { LogLevel::Info })
        .output(LogOutput::Console)
        .log_file_prefix("lote")
        .filter_directives("sqlx=warn,aws_config=warn,aws_smithy_runtime=warn")
        .build();

    // LOG_* variables take precedence when any is set
    let log_config = if std::env::vars().any(|(key, _)| key.starts_with("LOG_")) {
        LogConfig::from_env().unwrap_or(log_config)
    } else {
        log_config
    };
    let log_guard = match init_logging(&log_config) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Warning: logging disabled: {e:#}");
            None
        },
    };

    let code = match run(command).await {
        Ok(message) => {
            println!("{message}");
            0
        },
        Err(e) => match e.downcast_ref::<PipelineError>() {
            Some(rejected) if rejected.is_rejection() => {
                eprintln!("Rejected: {rejected} (records quarantined)");
                warn!(error = %rejected, "Batch rejected");
                rejected.outcome().exit_code()
            },
            Some(pipeline_error) => {
                let outcome = pipeline_error.outcome();
                let code = outcome.exit_code();
                eprintln!("Error: {pipeline_error} ({outcome})");
                error!(error = %pipeline_error, code, "Command failed");
                code
            },
            None => {
                eprintln!("Error: {e:#}");
                error!(error = %e, code = 1, "Command failed");
                1
            },
        },
    };

    // process::exit skips destructors, flush file logs first
    drop(log_guard);
    process::exit(code);
}

async fn run(command: Commands) -> anyhow::Result<String> {
    let config = PipelineConfig::load()?;
    let pool = create_pool(&config.database)
        .await
        .context("Failed to connect to the database")?;
    run_migrations(&pool).await?;

    if matches!(command, Commands::Migrate) {
        return Ok("Migrations applied".to_string());
    }

    let audit: Arc<dyn AuditSink> = match config.audit.backend {
        AuditBackend::Fs => Arc::new(FsAuditSink::new(&config.audit.dir)),
        AuditBackend::S3 => Arc::new(S3AuditSink::new(S3AuditConfig::from_env(
            config.audit.dir.to_string_lossy(),
        ))),
    };

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));

    let pipeline = Pipeline::new(
        Arc::new(PgRecordStore::new(pool.clone())),
        Arc::new(PgChannel::new(pool, config.channel.clone())),
        audit,
        config.batch.clone(),
    )
    .with_shutdown(shutdown);

    let message = match command {
        Commands::Extract { date } => {
            let report = pipeline.extract(&date).await?;
            format!("Batch {} published: {} records sent for {}", report.lote, report.sent, report.date)
        },
        Commands::Consume { date } => {
            let report = pipeline.consume(&date).await?;
            format!(
                "Batch {} accepted: {} records inserted for {}",
                report.lote, report.inserted, report.date
            )
        },
        Commands::Seed {
            from,
            to,
            per_day,
            first_day,
        } => {
            let plan = SeedPlan {
                from: from.parse::<ExtractionDate>().map_err(PipelineError::from)?,
                to: to.parse::<ExtractionDate>().map_err(PipelineError::from)?,
                first_day_count: first_day,
                per_day_count: per_day,
            };
            let inserted = pipeline.seed(plan).await?;
            format!("Seeded {inserted} records from {from} to {to}")
        },
        Commands::Migrate => "Migrations applied".to_string(),
    };

    Ok(message)
}

/// Cancel `token` on Ctrl+C or SIGTERM.
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, cancelling current operation");
        },
        _ = terminate => {
            info!("Received terminate signal, cancelling current operation");
        },
    }

    token.cancel();
}
