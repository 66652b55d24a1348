use std::path::PathBuf;

use chatline_client::{ClientSettings, SettingsStore};
use clap::Parser;
use snafu::ResultExt;
use tracing_subscriber::EnvFilter;

mod command;
mod error;
mod repl;
mod terminal;

use error::{CliError, InitConfigSnafu, RuntimeSnafu};

/// Terminal chat client with optimistic sends and background sync.
#[derive(Parser, Debug)]
#[command(version)]
struct Args {
    /// Settings file to read instead of the per-user default.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Server base URL, overriding the settings file.
    #[arg(long, value_name = "URL")]
    base_url: Option<String>,

    /// Write the effective settings to the settings file and exit.
    #[arg(long, default_value_t = false)]
    init_config: bool,
}

fn init_tracing() {
    let default_level = "info";
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(default_level))
                .unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> Result<(), CliError> {
    let args = Args::parse();
    init_tracing();

    let store = SettingsStore::new(args.config.unwrap_or_else(SettingsStore::default_config_path));
    if args.init_config {
        let settings = ClientSettings::clone(&store.settings());
        store.update(settings).context(InitConfigSnafu {
            stage: "init-config",
            path: store.config_path().to_path_buf(),
        })?;
        println!("wrote settings to {}", store.config_path().display());
        return Ok(());
    }

    let mut settings = ClientSettings::clone(&store.settings());
    if let Some(base_url) = args.base_url {
        settings.base_url = base_url;
    }
    let settings = settings.normalized();
    tracing::info!(api_root = %settings.api_root(), "starting chatline");

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context(RuntimeSnafu {
            stage: "build-runtime",
        })?;
    let local = tokio::task::LocalSet::new();
    local.block_on(&runtime, repl::run(settings))
}
