use std::path::PathBuf;
use std::process::ExitCode;

use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};

use mailq::config::ConfigSource;
use mailq::dispatch::{Dispatcher, RunStatus};
use mailq::mailer::SmtpMailer;
use mailq::models::queue::QueueItem;
use mailq::progress::{LogReporter, StatusBoard};
use mailq::store::sqlite::SqliteStore;
use mailq::store::{ContactStore, MailQueueAdmin, QueueStore};
use mailq::{boot, tasks};

/// Drain the outbound e-mail queue over SMTP
#[derive(Parser, Debug)]
#[command(name = "mailq")]
#[command(about = "Send queued e-mail over SMTP", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the SQLite database
    #[arg(long, default_value = "data/mailq.db")]
    db: PathBuf,

    /// TOML run configuration (the settings table is used when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Dry run: process an in-memory copy of the queue, send nothing and
    /// leave the queue untouched (only with `once`)
    #[arg(long, global = true)]
    memory: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Process the queue periodically until killed
    Run {
        /// Seconds between runs (overrides mailq_interval_secs)
        #[arg(long)]
        interval: Option<u64>,
    },
    /// Process the queue once and print the summary
    Once,
    /// Add a message to the queue
    Enqueue {
        /// Recipients, separated by ',' or ';'
        #[arg(long)]
        to: String,
        #[arg(long, default_value = "")]
        subject: String,
        #[arg(long, default_value = "")]
        body: String,
        /// Sender (defaults to DefaultFromAddress)
        #[arg(long)]
        from: Option<String>,
        /// Send the body as HTML
        #[arg(long)]
        html: bool,
        /// File to attach
        #[arg(long)]
        attachment: Option<String>,
        /// Hold the message back for this many minutes
        #[arg(long)]
        delay_minutes: Option<i64>,
        /// Record a history note against this contact once sent
        #[arg(long)]
        contact: Option<String>,
        /// User the message is attributed to
        #[arg(long)]
        user: Option<String>,
    },
    /// Print queue counters as JSON
    Stats,
    /// List messages past the error ceiling
    Stuck,
    /// Clear the failure count of a message so it is attempted again
    Retry {
        /// Queue item id
        id: i64,
    },
    /// List e-mail history recorded for a contact
    History {
        /// Contact id
        contact_id: String,
    },
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("mailq: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode, String> {
    if cli.memory && !matches!(cli.command, Commands::Once) {
        return Err("--memory only applies to `once`".to_string());
    }

    boot::run(&cli.db, cli.config.as_deref())?;

    let store = SqliteStore::new_at(&cli.db.to_string_lossy())?;
    store.run_migrations()?;
    store.seed_defaults()?;

    let source = match &cli.config {
        Some(path) => ConfigSource::File(path.clone()),
        None => ConfigSource::Settings,
    };

    match cli.command {
        Commands::Run { interval } => {
            let board = StatusBoard::forwarding(Box::new(LogReporter));
            tasks::run_forever(&store, &source, &SmtpMailer, &board, interval)
        }
        Commands::Once => {
            let config = source.load(&store).map_err(|e| e.to_string())?;
            let summary = if cli.memory {
                tasks::dry_run(&store, &config, &LogReporter)
            } else {
                Dispatcher::new(&store, &store, &SmtpMailer)
                    .with_progress(&LogReporter)
                    .run_once(&config)
            }
            .map_err(|e| e.to_string())?;
            println!("{}: {}", summary.status.as_str(), summary.message());
            match summary.status {
                RunStatus::Error | RunStatus::NotConfigured => Ok(ExitCode::FAILURE),
                RunStatus::Complete | RunStatus::Disabled => Ok(ExitCode::SUCCESS),
            }
        }
        Commands::Enqueue {
            to,
            subject,
            body,
            from,
            html,
            attachment,
            delay_minutes,
            contact,
            user,
        } => {
            let mut item = QueueItem::new(&to, &subject, &body);
            item.from_address = from;
            item.is_html = Some(html);
            item.attachment_path = attachment;
            item.delay_until = delay_minutes
                .filter(|m| *m > 0)
                .map(|m| Utc::now().naive_utc() + Duration::minutes(m));
            item.record_for_contact_id = contact;
            item.create_user = user;
            let id = store.push(&item)?;
            println!("{}", id);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Stats => {
            let config = source.load(&store).map_err(|e| e.to_string())?;
            let stats = store.stats(config.max_error_attempts, Utc::now().naive_utc())?;
            println!("{}", to_json(&stats)?);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Stuck => {
            let config = source.load(&store).map_err(|e| e.to_string())?;
            let stuck = store.stuck(config.max_error_attempts)?;
            println!("{}", to_json(&stuck)?);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Retry { id } => {
            if store.reset_attempts(id)? {
                println!("Item {} will be retried on the next run", id);
                Ok(ExitCode::SUCCESS)
            } else {
                Err(format!("no queued item with id {}", id))
            }
        }
        Commands::History { contact_id } => {
            let notes = store.history_for_contact(&contact_id)?;
            println!("{}", to_json(&notes)?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| e.to_string())
}
