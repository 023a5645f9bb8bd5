use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tap_appstore::{
    AppStoreClient, Catalog, MessageWriter, State, SyncSettings, TapConfig, discover, sync,
};

/// Extract App Store Connect reports as Singer messages.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Config file with key_id, key_file, issuer_id, vendor and start_date.
    #[arg(short, long)]
    config: PathBuf,

    /// State file from a previous run.
    #[arg(short, long)]
    state: Option<PathBuf>,

    /// Catalog selecting the streams to sync.
    #[arg(long, visible_alias = "properties")]
    catalog: Option<PathBuf>,

    /// Print the catalog and exit.
    #[arg(short, long)]
    discover: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tap_appstore=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let args = Args::parse();
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let config = TapConfig::load(&args.config)
        .with_context(|| format!("invalid config {}", args.config.display()))?;

    if args.discover {
        let catalog = discover()?;
        serde_json::to_writer_pretty(io::stdout().lock(), &catalog)
            .context("failed to write catalog")?;
        println!();
        return Ok(());
    }

    let client = AppStoreClient::new(&config).context("failed to set up API client")?;

    let catalog = match &args.catalog {
        Some(path) => Catalog::load(path)
            .with_context(|| format!("failed to load catalog {}", path.display()))?,
        None => {
            info!("No catalog given, syncing every stream");
            let mut catalog = discover()?;
            catalog.select_all();
            catalog
        }
    };

    let state = match &args.state {
        Some(path) => State::load(path)
            .with_context(|| format!("failed to load state {}", path.display()))?,
        None => State::new(),
    };

    let settings = SyncSettings::from_config(&config, Utc::now());
    let mut writer = MessageWriter::new(io::stdout().lock());
    sync(&client, &settings, &catalog, state, &mut writer)
        .await
        .context("sync failed")?;
    Ok(())
}
