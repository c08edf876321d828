//! Daemon entry point for the taxi trip pipeline.
//!
//! Loads configuration from flags and the environment, then serves the API,
//! runs a one-shot import, or downloads trip files.

mod config;
mod logging;

use std::path::PathBuf;

use taxi_api::{ApiServer, ApiServerConfig};
use taxi_core::control::{ImportOptions, TaxiControlPlane};
use taxi_core::download::TlcDownloader;
use taxi_core::store::{MemoryTripStore, PgTripStore, TripStore};
use tracing::{info, warn};

use crate::config::{CommandConfig, DatabaseSettings, DownloadSettings, TaxiConfig};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

enum StoreCommand {
    Serve(ApiServerConfig),
    Import {
        data_dir: PathBuf,
        options: ImportOptions,
    },
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let config = TaxiConfig::from_args()?;
    logging::init(config.logging)?;

    match config.command {
        CommandConfig::Serve { database, server } => {
            run_with(database, StoreCommand::Serve(server)).await
        }
        CommandConfig::Import {
            database,
            data_dir,
            options,
        } => run_with(database, StoreCommand::Import { data_dir, options }).await,
        CommandConfig::Download(settings) => download(settings).await,
    }
}

async fn run_with(database: DatabaseSettings, command: StoreCommand) -> Result<(), BoxError> {
    match database {
        DatabaseSettings::Postgres {
            options,
            max_connections,
        } => {
            let store = PgTripStore::connect(options, max_connections).await?;
            info!(max_connections, "connected to postgres");
            run(store, command).await
        }
        DatabaseSettings::InMemory => {
            warn!("using the in-memory store; data is lost on exit");
            run(MemoryTripStore::new(), command).await
        }
    }
}

async fn run<S: TripStore>(store: S, command: StoreCommand) -> Result<(), BoxError> {
    let control = TaxiControlPlane::new(store);
    control.init_schema().await?;

    match command {
        StoreCommand::Serve(server) => ApiServer::new(control, server).serve().await,
        StoreCommand::Import { data_dir, options } => {
            let report = control.import_directory(&data_dir, &options).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if report.failed_files > 0 {
                return Err(format!("{} file(s) failed to import", report.failed_files).into());
            }
            Ok(())
        }
    }
}

async fn download(settings: DownloadSettings) -> Result<(), BoxError> {
    let downloader = TlcDownloader::new(settings.year, &settings.data_dir, settings.check_exists)?;
    info!(
        year = downloader.year(),
        data_dir = %downloader.data_dir().display(),
        "downloading trip files"
    );
    let report = match settings.months.as_deref() {
        Some(months) => downloader.download_months(months).await,
        None => downloader.download_year().await,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    if report.failed > 0 {
        return Err(format!("{} download(s) failed", report.failed).into());
    }
    Ok(())
}
