//! dbctl - apply database migration scripts and track them in a change log.

mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use dbctl_config::{AppConfig, ConfigLoader};
use dbctl_connectors::{Connector, registry};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dbctl")]
#[command(about = "Record and inspect applied database migrations")]
#[command(version)]
struct Cli {
    /// Path to a YAML or TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Connection string, overriding config and environment
    #[arg(long)]
    connection_string: Option<String>,

    /// Connector name, overriding config and environment
    #[arg(long)]
    connector: Option<String>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the change log table (once per database)
    Init,

    /// Show applied migrations, most recent first
    Log {
        /// Print entries as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run scripts that are not yet recorded and record them
    Apply {
        /// Script files named <direction>-<version>-<description>.<type>
        #[arg(required = true)]
        scripts: Vec<PathBuf>,
    },

    /// Run a script without recording it
    Exec { script: PathBuf },

    /// List available connectors
    Connectors,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(cli.log_format);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn setup_logging(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn run(cli: Cli) -> Result<()> {
    dbctl_sqlite::register(
        &mut *registry()
            .write()
            .map_err(|_| anyhow::anyhow!("connector registry lock poisoned"))?,
    )?;

    match &cli.command {
        Commands::Connectors => {
            let registry = registry()
                .read()
                .map_err(|_| anyhow::anyhow!("connector registry lock poisoned"))?;
            print!("{}", commands::format_connectors(&registry.list()));
        }
        Commands::Init => {
            let mut session = Session::open(&cli)?;
            let cs = session.connection_string();
            commands::init(session.connector.as_mut(), &cs, &session.cancel).await?;
            println!("change log table created");
        }
        Commands::Log { json } => {
            let mut session = Session::open(&cli)?;
            let cs = session.connection_string();
            let entries = session
                .connector
                .fetch_change_log_entries(&cs, &session.cancel)
                .await?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                print!("{}", commands::format_history(&entries));
            }
        }
        Commands::Apply { scripts } => {
            let mut session = Session::open(&cli)?;
            let cs = session.connection_string();
            let applied_by = session.config.applied_by();
            let summary = commands::apply(
                session.connector.as_mut(),
                &cs,
                &applied_by,
                scripts,
                &session.cancel,
            )
            .await?;
            println!(
                "applied {}, skipped {}",
                summary.applied.len(),
                summary.skipped.len()
            );
        }
        Commands::Exec { script } => {
            let mut session = Session::open(&cli)?;
            let cs = session.connection_string();
            let rows =
                commands::exec(session.connector.as_mut(), &cs, script, &session.cancel).await?;
            println!("rows affected: {rows}");
        }
    }

    Ok(())
}

/// Configuration plus the connector it selects, for commands that touch a store.
struct Session {
    config: AppConfig,
    connector: Box<dyn Connector>,
    cancel: CancellationToken,
}

impl Session {
    fn open(cli: &Cli) -> Result<Self> {
        let config = load_config(cli)?;
        let connector = registry()
            .read()
            .map_err(|_| anyhow::anyhow!("connector registry lock poisoned"))?
            .create(&config.connector)?;
        let meta = connector.metadata();
        info!("using connector {} {}", meta.name, meta.version);

        Ok(Self {
            config,
            connector,
            cancel: cancel_on_ctrl_c(),
        })
    }

    fn connection_string(&self) -> String {
        self.config.connection_string.clone()
    }
}

fn load_config(cli: &Cli) -> Result<AppConfig> {
    let mut config =
        ConfigLoader::load(cli.config.as_deref()).context("failed to load configuration")?;

    if let Some(cs) = &cli.connection_string {
        config.connection_string = cs.clone();
    }
    if let Some(connector) = &cli.connector {
        config.connector = connector.clone();
    }

    config.validate()?;
    Ok(config)
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling");
            token.cancel();
        }
    });
    cancel
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connectors_lists_without_configuration() {
        let cli = Cli::try_parse_from(["dbctl", "connectors"]).unwrap();
        assert!(matches!(cli.command, Commands::Connectors));

        run(cli).await.unwrap();
        let registry = registry().read().unwrap();
        assert_eq!(registry.metadata("sqlite").unwrap().name, "SQLite");
    }
}
