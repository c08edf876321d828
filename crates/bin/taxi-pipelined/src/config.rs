use std::error::Error;
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono::{Datelike, Utc};
use clap::{ArgAction, Args, Parser, Subcommand, builder::BoolishValueParser};
use sqlx::postgres::PgConnectOptions;
use taxi_api::ApiServerConfig;
use taxi_core::control::ImportOptions;
use taxi_store::models::ImportMethod;

const DEFAULT_PG_PORT: u16 = 5432;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_API_ADDR: &str = "0.0.0.0:8000";
const DEFAULT_DATA_DIR: &str = "data";
const DEFAULT_DOWNLOAD_DIR: &str = "data/raw";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_IMPORT_TIMEOUT_SECS: u64 = 3600;
const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;
const DEFAULT_BATCH_ROWS: usize = 200_000;
// First year TLC publishes yellow taxi trip files for.
const FIRST_TLC_YEAR: i32 = 2009;

#[derive(Parser, Debug)]
#[command(name = "taxi-pipelined", version, about = "NYC taxi trip pipeline.")]
struct CliArgs {
    #[command(flatten)]
    database: DatabaseArgs,

    /// Raise log verbosity (-v debug, -vv trace). `RUST_LOG` takes precedence.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[arg(
        long,
        env = "TAXI_LOG_JSON",
        default_value_t = false,
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct DatabaseArgs {
    /// Full connection URL; wins over the individual `PG_*` settings.
    #[arg(long, env = "DATABASE_URL", hide_env_values = true, global = true)]
    database_url: Option<String>,

    #[arg(long, env = "PG_HOST", global = true)]
    pg_host: Option<String>,

    #[arg(long, env = "PG_PORT", default_value_t = DEFAULT_PG_PORT, global = true)]
    pg_port: u16,

    #[arg(long, env = "PG_DB", global = true)]
    pg_db: Option<String>,

    #[arg(long, env = "PG_USER", global = true)]
    pg_user: Option<String>,

    #[arg(long, env = "PG_PASSWORD", hide_env_values = true, global = true)]
    pg_password: Option<String>,

    #[arg(
        long,
        env = "TAXI_DB_MAX_CONNECTIONS",
        default_value_t = DEFAULT_DB_MAX_CONNECTIONS,
        global = true
    )]
    db_max_connections: u32,

    #[arg(
        long,
        env = "TAXI_DB_IN_MEMORY",
        default_value_t = false,
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    db_in_memory: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the HTTP API.
    Serve(ServeArgs),
    /// Import Parquet files from a directory.
    Import(ImportArgs),
    /// Download monthly TLC trip files.
    Download(DownloadArgs),
}

#[derive(Args, Debug)]
struct ServeArgs {
    #[arg(long, env = "TAXI_API_ADDR", default_value = DEFAULT_API_ADDR)]
    addr: SocketAddr,

    #[arg(long, env = "DATA_DIR", default_value = DEFAULT_DATA_DIR)]
    data_dir: PathBuf,

    #[arg(
        long,
        env = "TAXI_REQUEST_TIMEOUT_SECS",
        default_value_t = DEFAULT_REQUEST_TIMEOUT_SECS
    )]
    request_timeout_secs: u64,

    #[arg(
        long,
        env = "TAXI_IMPORT_TIMEOUT_SECS",
        default_value_t = DEFAULT_IMPORT_TIMEOUT_SECS
    )]
    import_timeout_secs: u64,

    #[arg(long, env = "TAXI_MAX_BODY_BYTES", default_value_t = DEFAULT_MAX_BODY_BYTES)]
    max_body_bytes: usize,

    #[arg(long, env = "TAXI_BATCH_ROWS", default_value_t = DEFAULT_BATCH_ROWS)]
    batch_rows: usize,
}

#[derive(Args, Debug)]
#[allow(clippy::struct_excessive_bools)]
struct ImportArgs {
    #[arg(long, env = "DATA_DIR", default_value = DEFAULT_DATA_DIR)]
    data_dir: PathBuf,

    #[arg(long, env = "TAXI_BATCH_ROWS", default_value_t = DEFAULT_BATCH_ROWS)]
    batch_rows: usize,

    /// `copy` or `values`.
    #[arg(long, env = "TAXI_IMPORT_METHOD", default_value = "copy")]
    method: ImportMethod,

    /// Read one batch per file and write nothing.
    #[arg(long)]
    dry_run: bool,

    /// Only scan the top level of the data directory.
    #[arg(long)]
    no_recursive: bool,

    #[arg(long)]
    max_files: Option<usize>,

    /// Skip files whose name sorts before this one.
    #[arg(long)]
    start_with: Option<String>,
}

#[derive(Args, Debug)]
struct DownloadArgs {
    /// Defaults to the current year.
    #[arg(long)]
    year: Option<i32>,

    #[arg(long, default_value = DEFAULT_DOWNLOAD_DIR)]
    data_dir: PathBuf,

    /// HEAD each file first and skip months that are not published.
    #[arg(long)]
    check_exists: bool,

    /// Comma-separated months; defaults to every published month.
    #[arg(long, value_delimiter = ',')]
    months: Option<Vec<u32>>,
}

/// Runtime configuration loaded from CLI arguments and environment variables.
#[derive(Debug, Clone)]
pub struct TaxiConfig {
    pub logging: LogSettings,
    pub command: CommandConfig,
}

#[derive(Debug, Clone, Copy)]
pub struct LogSettings {
    pub verbosity: u8,
    pub json: bool,
}

#[derive(Debug, Clone)]
pub enum DatabaseSettings {
    Postgres {
        options: PgConnectOptions,
        max_connections: u32,
    },
    InMemory,
}

#[derive(Debug, Clone)]
pub struct DownloadSettings {
    pub year: i32,
    pub data_dir: PathBuf,
    pub check_exists: bool,
    pub months: Option<Vec<u32>>,
}

#[derive(Debug, Clone)]
pub enum CommandConfig {
    Serve {
        database: DatabaseSettings,
        server: ApiServerConfig,
    },
    Import {
        database: DatabaseSettings,
        data_dir: PathBuf,
        options: ImportOptions,
    },
    Download(DownloadSettings),
}

#[derive(Debug)]
pub enum ConfigError {
    MissingSetting(&'static str),
    InvalidSetting { name: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingSetting(name) => write!(f, "missing required setting: {name}"),
            Self::InvalidSetting { name, value } => {
                write!(f, "invalid {name} value: {value}")
            }
        }
    }
}

impl Error for ConfigError {}

impl TaxiConfig {
    pub fn from_args() -> Result<Self, ConfigError> {
        let args = CliArgs::parse();
        Self::try_from(args)
    }
}

impl TryFrom<CliArgs> for TaxiConfig {
    type Error = ConfigError;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        let logging = LogSettings {
            verbosity: args.verbose,
            json: args.log_json,
        };

        let command = match args.command {
            Command::Serve(serve) => CommandConfig::Serve {
                database: DatabaseSettings::try_from(args.database)?,
                server: ApiServerConfig::new(serve.addr)
                    .with_max_body_bytes(serve.max_body_bytes)
                    .with_request_timeout(Duration::from_secs(serve.request_timeout_secs))
                    .with_import_timeout(Duration::from_secs(serve.import_timeout_secs))
                    .with_data_dir(serve.data_dir)
                    .with_batch_size(positive_batch_rows(serve.batch_rows)?),
            },
            Command::Import(import) => CommandConfig::Import {
                database: DatabaseSettings::try_from(args.database)?,
                data_dir: import.data_dir,
                options: ImportOptions {
                    batch_size: positive_batch_rows(import.batch_rows)?,
                    method: import.method,
                    dry_run: import.dry_run,
                    recursive: !import.no_recursive,
                    max_files: import.max_files,
                    start_with: import.start_with.filter(|value| !value.trim().is_empty()),
                },
            },
            Command::Download(download) => {
                CommandConfig::Download(DownloadSettings::try_from(download)?)
            }
        };

        Ok(Self { logging, command })
    }
}

impl TryFrom<DatabaseArgs> for DatabaseSettings {
    type Error = ConfigError;

    fn try_from(args: DatabaseArgs) -> Result<Self, Self::Error> {
        if args.db_in_memory {
            return Ok(Self::InMemory);
        }
        if args.db_max_connections == 0 {
            return Err(ConfigError::InvalidSetting {
                name: "TAXI_DB_MAX_CONNECTIONS",
                value: args.db_max_connections.to_string(),
            });
        }

        let non_empty = |value: Option<String>| value.filter(|value| !value.trim().is_empty());

        if let Some(url) = non_empty(args.database_url) {
            let options = PgConnectOptions::from_str(&url).map_err(|_| {
                ConfigError::InvalidSetting {
                    name: "DATABASE_URL",
                    value: "<redacted>".to_string(),
                }
            })?;
            return Ok(Self::Postgres {
                options,
                max_connections: args.db_max_connections,
            });
        }

        let host = non_empty(args.pg_host).ok_or(ConfigError::MissingSetting("PG_HOST"))?;
        let database = non_empty(args.pg_db).ok_or(ConfigError::MissingSetting("PG_DB"))?;
        let user = non_empty(args.pg_user).ok_or(ConfigError::MissingSetting("PG_USER"))?;
        let password = non_empty(args.pg_password).ok_or(ConfigError::MissingSetting("PG_PASSWORD"))?;

        let options = PgConnectOptions::new()
            .host(&host)
            .port(args.pg_port)
            .database(&database)
            .username(&user)
            .password(&password);

        Ok(Self::Postgres {
            options,
            max_connections: args.db_max_connections,
        })
    }
}

impl TryFrom<DownloadArgs> for DownloadSettings {
    type Error = ConfigError;

    fn try_from(args: DownloadArgs) -> Result<Self, Self::Error> {
        let current_year = Utc::now().year();
        let year = args.year.unwrap_or(current_year);
        if !(FIRST_TLC_YEAR..=current_year).contains(&year) {
            return Err(ConfigError::InvalidSetting {
                name: "--year",
                value: year.to_string(),
            });
        }

        if let Some(month) = args
            .months
            .iter()
            .flatten()
            .find(|month| !(1..=12).contains(*month))
        {
            return Err(ConfigError::InvalidSetting {
                name: "--months",
                value: month.to_string(),
            });
        }

        Ok(Self {
            year,
            data_dir: args.data_dir,
            check_exists: args.check_exists,
            months: args.months.filter(|months| !months.is_empty()),
        })
    }
}

fn positive_batch_rows(batch_rows: usize) -> Result<usize, ConfigError> {
    if batch_rows == 0 {
        return Err(ConfigError::InvalidSetting {
            name: "TAXI_BATCH_ROWS",
            value: batch_rows.to_string(),
        });
    }
    Ok(batch_rows)
}
