use crate::server;
use clap::{Args, Parser, Subcommand};
use ficha_tlc::config::{DatabaseConfig, TelemetryConfig};
use ficha_tlc::error::AppError;
use ficha_tlc::storage::{SqliteStore, SCHEMA_VERSION};
use ficha_tlc::telemetry;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "ficha-tlc",
    about = "Registration form with hosted checkout and payment reconciliation",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Apply pending database schema migrations and exit
    Migrate,
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Migrate => run_migrations(),
    }
}

fn run_migrations() -> Result<(), AppError> {
    let database = DatabaseConfig::from_env()?;
    telemetry::init(&TelemetryConfig::from_env())?;

    let store = SqliteStore::open(&database.path)?;
    let applied = store.migrate()?;
    info!(
        path = %database.path.display(),
        applied,
        version = SCHEMA_VERSION,
        "database schema up to date"
    );
    Ok(())
}
