// table-mirror command-line front end

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, Level};

use table_mirror::commands::{self, AppState};
use table_mirror::config::{
    get_default_store_path, validate_store_path, BinaryMode, ConnectionsConfig, MirrorSettings,
    DEFAULT_MAX_ROWS,
};
use table_mirror::db::ConnectionRegistry;
use table_mirror::mirror::{MirrorEngine, MirrorRequest};
use table_mirror::report;

#[derive(Parser)]
#[command(name = "table-mirror")]
#[command(author, version, about = "Mirror source tables into a local SQLite store", long_about = None)]
struct Cli {
    /// Path to the TOML connection definitions file
    #[arg(short, long, global = true, default_value = "connections.toml")]
    connections: PathBuf,

    /// Destination SQLite file (defaults to the per-user data directory)
    #[arg(short, long, global = true)]
    store: Option<PathBuf>,

    /// Maximum rows copied per mirror operation
    #[arg(long, global = true, default_value_t = DEFAULT_MAX_ROWS)]
    max_rows: usize,

    /// How binary cells are stored
    #[arg(long, global = true, value_enum, default_value_t = BinaryModeArg::DebugText)]
    binary_mode: BinaryModeArg,

    /// Log level (error, warn, info, debug)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Log format (text, json)
    #[arg(long, global = true, default_value = "text")]
    log_format: String,

    /// Print results as JSON instead of markdown
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy a source table into the destination store
    Mirror {
        /// Source table, optionally schema-qualified
        source_table: String,

        /// Destination table name (defaults to the source name)
        #[arg(long = "dest")]
        dest_table: Option<String>,

        /// Named connection (defaults to the configured default)
        #[arg(long = "connection")]
        connection_name: Option<String>,

        /// Replace existing rows in the destination table
        #[arg(long)]
        overwrite: bool,
    },

    /// List configured connections
    ListConnections,

    /// Show the columns of a source table and their destination types
    Describe {
        table: String,

        #[arg(long = "connection")]
        connection_name: Option<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum BinaryModeArg {
    DebugText,
    Blob,
}

impl From<BinaryModeArg> for BinaryMode {
    fn from(arg: BinaryModeArg) -> Self {
        match arg {
            BinaryModeArg::DebugText => BinaryMode::DebugText,
            BinaryModeArg::Blob => BinaryMode::Blob,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    setup_logging(&cli.log_level, &cli.log_format);

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::from(2)
        }
    }
}

/// Returns whether the command succeeded
fn run(cli: Cli) -> Result<bool> {
    let config = ConnectionsConfig::load(&cli.connections)
        .with_context(|| format!("Failed to load connections from {}", cli.connections.display()))?;

    let store_path = match cli.store {
        Some(path) => {
            validate_store_path(&path)?;
            path
        }
        None => get_default_store_path()?,
    };

    let settings = MirrorSettings::new(cli.max_rows, cli.binary_mode.into())?;

    info!("Connections file: {}", cli.connections.display());
    info!("Destination store: {}", store_path.display());
    info!("Max rows: {}", settings.max_rows);

    let engine = MirrorEngine::new(ConnectionRegistry::new(config), store_path, settings);
    let state = AppState::new(engine);

    match cli.command {
        Commands::Mirror {
            source_table,
            dest_table,
            connection_name,
            overwrite,
        } => {
            let request = MirrorRequest {
                source_table,
                dest_table,
                connection_name,
                overwrite,
            };
            let result = commands::mirror_table(&state, request).map_err(|e| anyhow!(e))?;
            if cli.json {
                println!("{}", report::render_json(&result)?);
            } else {
                println!("{}", report::render_mirror_result(&result));
            }
            Ok(result.is_success())
        }
        Commands::ListConnections => {
            let listing = commands::list_connections(&state).map_err(|e| anyhow!(e))?;
            if cli.json {
                println!("{}", report::render_json(&listing)?);
            } else {
                print!("{}", report::render_connections(&listing));
            }
            Ok(true)
        }
        Commands::Describe {
            table,
            connection_name,
        } => {
            let description = commands::describe_table(&state, &table, connection_name.as_deref())
                .map_err(|e| anyhow!(e))?;
            if cli.json {
                println!("{}", report::render_json(&description)?);
            } else {
                print!("{}", report::render_table_description(&description));
            }
            Ok(true)
        }
    }
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // stdout carries the rendered result
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
