//! `ticketscan` command line entrypoint.

use std::{path::PathBuf, process::ExitCode, sync::Arc, time::Duration};

use clap::{Parser, Subcommand};
use tokio::io::BufReader;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use ticketscan::{
    camera::lines::LineDecoder,
    config::AppConfig,
    core::history::ScanHistory,
    persist::{sqlite::SqliteHistoryStore, HistoryStore},
    runtime::{
        events::ScanEvent,
        handle::{spawn_scanner, ScannerHandle},
    },
    scan::{EventContext, ScanEntry},
    validate::http::ApiClient,
};

#[derive(Debug, Parser)]
#[command(name = "ticketscan", about = "Validate event tickets from decoded QR codes")]
struct Cli {
    /// Config file (default: <config_dir>/ticketscan/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// History database, overriding the config file.
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List the organizer's events.
    Events,
    /// Validate codes read from stdin, one per line.
    Scan {
        /// Event id to validate against (default: first organizer event).
        #[arg(long)]
        event: Option<String>,
    },
    /// Print stored scan history.
    History,
    /// Print per-status counts.
    Stats,
    /// Wipe stored scan history.
    Clear {
        /// Confirm the wipe.
        #[arg(long)]
        yes: bool,
    },
}

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "ticketscan failed");
            ExitCode::FAILURE
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> CliResult<()> {
    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(db) = cli.db {
        config.db_path = Some(db);
    }

    match cli.command {
        Command::Events => {
            for event in api_client(&config)?.organizer_events().await? {
                println!("{}\t{}", event.id, event.title);
            }
        }
        Command::Scan { event } => scan(&config, event).await?,
        Command::History => {
            for entry in open_history(&config)?.iter() {
                print_entry(entry);
            }
        }
        Command::Stats => {
            let stats = open_history(&config)?.stats();
            println!(
                "valid {} | invalid {} | pending {} | total {}",
                stats.valid, stats.invalid, stats.pending, stats.total
            );
        }
        Command::Clear { yes } => {
            if !yes {
                println!("refusing to clear scan history without --yes");
                return Ok(());
            }
            open_store(&config)?.clear()?;
            info!("Scan history cleared");
        }
    }
    Ok(())
}

async fn scan(config: &AppConfig, event: Option<String>) -> CliResult<()> {
    let api = api_client(config)?;
    let events = api.organizer_events().await?;
    let context = match event {
        Some(id) => events
            .into_iter()
            .find(|e| e.id == id)
            .unwrap_or_else(|| EventContext::new(id, "")),
        None => events.into_iter().next().unwrap_or_else(|| EventContext::new("", "")),
    };

    let store = open_store(config)?;
    let history = store.load()?;
    let decoder = LineDecoder::new(BufReader::new(tokio::io::stdin()));
    let handle = spawn_scanner(
        history,
        Box::new(store),
        Arc::new(api),
        Box::new(decoder),
        config.scanner.clone(),
    );

    let mut events = handle.subscribe();
    handle.start(context).await?;

    loop {
        match events.recv().await {
            Ok(ScanEvent::DecoderEnded) => break,
            Ok(event) => print_event(&event),
            Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                info!(skipped = n, "Event stream lagged");
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        }
    }

    finish(&handle, events).await
}

async fn finish(
    handle: &ScannerHandle,
    mut events: tokio::sync::broadcast::Receiver<ScanEvent>,
) -> CliResult<()> {
    handle.shutdown().await?;
    while let Ok(event) = events.try_recv() {
        print_event(&event);
    }
    Ok(())
}

fn api_client(config: &AppConfig) -> CliResult<ApiClient> {
    let url = config.require_api_url()?;
    let token = config.require_access_token()?;
    let client = match config.request_timeout_ms {
        Some(ms) => ApiClient::with_timeout(url, token, Duration::from_millis(ms))?,
        None => ApiClient::new(url, token),
    };
    Ok(client)
}

fn open_store(config: &AppConfig) -> CliResult<SqliteHistoryStore> {
    let path = config.resolved_db_path();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    Ok(SqliteHistoryStore::open(path)?)
}

fn open_history(config: &AppConfig) -> CliResult<ScanHistory> {
    let store = open_store(config)?;
    Ok(ScanHistory::from_entries(store.load()?, config.scanner.history_cap))
}

fn print_event(event: &ScanEvent) {
    match event {
        ScanEvent::Captured { id, code } => println!("#{id} {code} PENDING"),
        ScanEvent::Accepted { id } => println!("#{id} VALID"),
        ScanEvent::Rejected { id, reason } => println!("#{id} INVALID ({reason:?})"),
        _ => {}
    }
}

fn print_entry(entry: &ScanEntry) {
    println!("#{}\t{}\t{:?}", entry.id, entry.short_code(), entry.status);
}
