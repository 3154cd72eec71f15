mod backup_commands;
mod config_commands;
mod context;
mod data_commands;

use std::path::{Path, PathBuf};

use {
    clap::{Parser, Subcommand},
    solace_config::SolaceConfig,
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "solace", about = "Solace: encrypted journal storage and backups")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file to use instead of the discovered one.
    #[arg(long, global = true, env = "SOLACE_CONFIG")]
    config: Option<PathBuf>,

    /// Directory that anchors a relative database path.
    #[arg(long, global = true, env = "SOLACE_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Backup password for export and import.
    #[arg(long, global = true, env = "SOLACE_BACKUP_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Print collected metrics to stderr before exiting.
    #[arg(long, global = true, default_value_t = false)]
    print_metrics: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a stored record, upgrading legacy formats on the way.
    Read { key: String },
    /// Encrypt and store a record. VALUE is JSON, or a plain string.
    Write { key: String, value: String },
    /// Export every record to a backup file.
    Export(backup_commands::ExportArgs),
    /// Restore records from a backup file, replacing current data.
    Import { file: PathBuf },
    /// Delete the master key and every record.
    Reset {
        #[arg(long)]
        yes: bool,
    },
    /// Show master key state and record formats.
    Status,
    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: config_commands::ConfigAction,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_ansi(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

/// Load the explicit config file, or discover one.
pub(crate) fn load_config(explicit: Option<&Path>) -> anyhow::Result<SolaceConfig> {
    match explicit {
        Some(path) => solace_config::load_config(path),
        None => Ok(solace_config::discover_and_load()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "solace starting");

    if let Commands::Config { action } = cli.command {
        return config_commands::handle_config(action, cli.config.as_deref());
    }

    let config = load_config(cli.config.as_deref())?;
    let metrics = solace_metrics::init_metrics(solace_metrics::MetricsRecorderConfig {
        enabled: config.metrics.enabled || cli.print_metrics,
        global_labels: Vec::new(),
    })?;

    let vault = context::open(&config, cli.data_dir).await?;
    let password = backup_commands::resolve_password(cli.password.as_deref(), &config);

    let result = match cli.command {
        Commands::Read { key } => data_commands::read(&vault, &key).await,
        Commands::Write { key, value } => data_commands::write(&vault, &key, &value).await,
        Commands::Export(args) => backup_commands::export(&vault, &config, args, password).await,
        Commands::Import { file } => backup_commands::import(&vault, &file, password).await,
        Commands::Reset { yes } => data_commands::reset(&vault, yes).await,
        Commands::Status => data_commands::status(&vault).await,
        Commands::Config { .. } => Ok(()),
    };

    if cli.print_metrics {
        eprint!("{}", metrics.render());
    }
    result
}
