use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};

use file_logger::config::Config;
use file_logger::export::{ManifestTarget, ShareRequest};
use file_logger::logging::{self, LogLevel, RotatingLogWriter};
use file_logger::FileLogger;

#[derive(Parser)]
#[command(name = "file-logger")]
#[command(about = "Rotating file logger")]
#[command(version)]
struct Cli {
    /// Path to config file (default: <config dir>/file-logger/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Append messages (or stdin lines when none are given) to the log
    Write {
        /// debug, info, warning or error
        #[arg(short, long, default_value = "info", value_parser = parse_level)]
        level: LogLevel,

        messages: Vec<String>,
    },

    /// Print retained log files, oldest first
    Paths,

    /// Delete every log file and start a fresh one
    Delete,

    /// Print a JSON share manifest of the retained log files
    Export {
        #[arg(long)]
        to: Option<String>,

        #[arg(long)]
        subject: Option<String>,

        #[arg(long)]
        body: Option<String>,
    },
}

fn parse_level(name: &str) -> Result<LogLevel, String> {
    LogLevel::parse(name).ok_or_else(|| format!("unknown level '{name}'"))
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init_diagnostics(None)?;

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    let writer = RotatingLogWriter::new().with_queue_capacity(config.queue_capacity);
    let logger = FileLogger::with_writer(config.app_id.clone(), writer);
    logger
        .configure(&config.configure_options())
        .context("Failed to configure file logger")?;

    match cli.command {
        Commands::Write { level, messages } => write_messages(&logger, level, messages).await?,
        Commands::Paths => {
            for path in logger.get_log_file_paths()? {
                println!("{path}");
            }
        }
        Commands::Delete => {
            logger.delete_log_files().await?;
            if let Some(policy) = logger.writer().policy() {
                tracing::info!(dir = %policy.directory.display(), "Log files deleted");
            }
        }
        Commands::Export { to, subject, body } => {
            let request = ShareRequest { to, subject, body };
            let target = ManifestTarget::new(std::io::stdout());
            logger.send_log_files_by_email(&request, &target).await?;
        }
    }

    logger.writer().flush().await?;
    Ok(())
}

async fn write_messages(logger: &FileLogger, level: LogLevel, messages: Vec<String>) -> Result<()> {
    if !messages.is_empty() {
        for message in messages {
            logger.writer().write(level, message);
        }
        return Ok(());
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        logger.writer().write(level, line);
    }

    let dropped = logger.writer().dropped_entries();
    if dropped > 0 {
        tracing::warn!(dropped, "Some entries were dropped because the queue was full");
    }
    Ok(())
}
