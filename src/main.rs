use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, ValueEnum};
use gcp_inventory::config::Config;
use gcp_inventory::gcp::auth::{default_scopes, AdcCredentials, Authorizer};
use gcp_inventory::gcp::client::GcpClient;
use gcp_inventory::gcp::credentials::CredentialCache;
use gcp_inventory::gcp::oauth::InstalledAppFlow;
use gcp_inventory::gcp::provider::CredentialProvider;
use gcp_inventory::inventory::{self, Listing};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Version injected at compile time via GCP_INVENTORY_VERSION env var (set by
/// CI/CD), or "dev" for local builds.
pub const VERSION: &str = match option_env!("GCP_INVENTORY_VERSION") {
    Some(v) => v,
    None => "dev",
};

/// Export a GCP inventory to CSV
#[derive(Parser, Debug)]
#[command(name = "gcp-inventory", version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    listing: Listing,

    /// Configuration file (default: <config dir>/gcp-inventory/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding token.json and client_secrets.json
    #[arg(long, global = true)]
    credentials_dir: Option<PathBuf>,

    /// Directory receiving the CSV file
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,

    /// Directory receiving the log file
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Where API credentials come from
    #[arg(long, value_enum, default_value = "user", global = true)]
    auth: AuthMode,

    /// Use this bearer token instead of any credential flow
    #[arg(long, global = true)]
    access_token: Option<String>,

    /// Maximum zone listings in flight
    #[arg(long, global = true)]
    max_concurrency: Option<usize>,

    /// Log level of the log file
    #[arg(long, value_enum, default_value = "info", global = true)]
    log_level: LogLevel,

    /// Project to leave out (repeatable)
    #[arg(long = "exclude-project", global = true)]
    exclude_projects: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum AuthMode {
    /// Interactive user OAuth with a cached token
    User,
    /// Application Default Credentials
    Adc,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

/// File logging at the requested level, errors always echoed to stderr
fn setup_logging(
    level: LogLevel,
    log_path: &Path,
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let Some(tracing_level) = level.to_tracing_level() else {
        tracing_subscriber::fmt()
            .with_max_level(Level::ERROR)
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
        return Ok(None);
    };

    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log directory {}", parent.display()))?;
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .with_context(|| format!("Failed to open log file {}", log_path.display()))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_max_level(tracing_level)
        .with_writer(
            non_blocking
                .with_max_level(tracing_level)
                .and(std::io::stderr.with_max_level(Level::ERROR)),
        )
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("gcp-inventory {} started with log level: {:?}", VERSION, level);
    tracing::info!("Log file: {:?}", log_path);

    Ok(Some(guard))
}

/// Config file, then command-line overrides. Also returns a warning about a
/// skipped config file, to be logged once logging is up.
fn build_config(args: &Args) -> Result<(Config, Option<String>)> {
    let (mut config, warning) = Config::load(args.config.as_deref())?;

    if let Some(dir) = &args.credentials_dir {
        config.credentials_dir = Some(dir.clone());
    }
    if let Some(dir) = &args.output_dir {
        config.output_dir = Some(dir.clone());
    }
    if let Some(dir) = &args.log_dir {
        config.log_dir = Some(dir.clone());
    }
    if let Some(n) = args.max_concurrency {
        anyhow::ensure!(n > 0, "--max-concurrency must be at least 1");
        config.max_concurrency = n;
    }
    config
        .excluded_projects
        .extend(args.exclude_projects.iter().cloned());

    Ok((config, warning))
}

async fn authorize(args: &Args, config: &Config) -> Result<Authorizer> {
    if let Some(token) = &args.access_token {
        tracing::info!("Using the access token given on the command line");
        return Ok(Authorizer::fixed(token));
    }

    match args.auth {
        AuthMode::User => {
            let flow = InstalledAppFlow::new(
                config.client_secrets_path(),
                default_scopes(),
                config.consent_timeout(),
                config.request_timeout(),
            )?;
            let provider = CredentialProvider::new(CredentialCache::new(config.token_path()), flow);
            let credential = provider
                .acquire()
                .await
                .context("Could not obtain user credentials")?;
            Ok(Authorizer::user(credential))
        }
        AuthMode::Adc => {
            let adc = AdcCredentials::new()
                .await
                .context("Could not initialize application default credentials")?;
            Ok(Authorizer::ApplicationDefault(adc))
        }
    }
}

fn timestamp(message: &str) {
    let now = Local::now().format("%d-%m-%Y %H:%M:%S");
    println!("{} - {}", now, message);
    tracing::info!("{} {}", message, now);
}

async fn run(args: &Args, config: &Config) -> Result<()> {
    let authorizer = authorize(args, config).await?;
    tracing::info!("Authenticated with {}", authorizer.describe());

    let client = GcpClient::new(authorizer, config).context("Failed to build the API client")?;
    let rows = inventory::export(args.listing, &client, config).await?;

    timestamp(&format!(
        "Scan finished: {} row(s) written to {}",
        rows,
        config.output_path(args.listing.name()).display()
    ));
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let (config, config_warning) = match build_config(&args) {
        Ok(loaded) => loaded,
        Err(err) => {
            eprintln!("Error: {err:#}");
            return ExitCode::FAILURE;
        }
    };

    let _log_guard = match setup_logging(args.log_level, &config.log_path(args.listing.name())) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("Error: {err:#}");
            return ExitCode::FAILURE;
        }
    };
    if let Some(warning) = config_warning {
        tracing::warn!("{}", warning);
    }

    timestamp(&format!("Started {} export", args.listing));

    match run(&args, &config).await {
        Ok(()) => {
            timestamp("Finished");
            ExitCode::SUCCESS
        }
        Err(err) => {
            tracing::error!("Fatal: {:#}", err);
            ExitCode::FAILURE
        }
    }
}
