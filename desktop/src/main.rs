mod preferences;
mod theme;

use std::sync::Arc;

use anyhow::Context;
use bucketdeck_core::app::App;
use bucketdeck_core::bus::BusConfig;
use bucketdeck_core::repository::DeckRepository;
use bucketdeck_core::s3::aws::AwsClientFactory;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use preferences::{config_dir, FilePreferences};
use theme::ConsoleTheme;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn print_usage() {
    eprintln!("Usage: bucketdeck [--export | --version | --help]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --export    Print the saved connections as JSON and exit");
    eprintln!("  --version   Print version and exit");
    eprintln!("  --help      Print this help message");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();

    match args.get(1).map(String::as_str) {
        None => run().await,
        Some("--export") => {
            let prefs = FilePreferences::open(&config_dir()?)?;
            DeckRepository::new(Arc::new(prefs))
                .export(std::io::stdout().lock())
                .context("Failed to export connections")?;
            println!();
            Ok(())
        }
        Some("--version") => {
            println!("bucketdeck {}", VERSION);
            Ok(())
        }
        Some("--help") => {
            print_usage();
            Ok(())
        }
        Some(other) => {
            eprintln!("Unknown option: {}", other);
            print_usage();
            std::process::exit(1);
        }
    }
}

async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let dir = config_dir()?;
    info!("bucketdeck {} using config directory {}", VERSION, dir.display());
    let prefs = Arc::new(FilePreferences::open(&dir)?);

    let done = CancellationToken::new();
    let app = App::build(
        done.clone(),
        prefs,
        Arc::new(AwsClientFactory),
        Arc::new(ConsoleTheme::default()),
        BusConfig::default(),
    )
    .await;

    let mut messages = app.notification_view().messages().subscribe();
    let printer = tokio::spawn(async move {
        while messages.changed().await.is_ok() {
            let latest = messages.borrow_and_update().first().cloned();
            if let Some(message) = latest {
                eprintln!("{message}");
            }
        }
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("interrupted"),
        _ = done.cancelled() => {}
    }
    app.shutdown();
    printer.abort();
    Ok(())
}
