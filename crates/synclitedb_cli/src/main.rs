//! SyncLiteDB CLI
//!
//! Runs the SyncLiteDB request broker.
//!
//! # Commands
//!
//! - `serve` - Start the HTTP broker (default port 5555)
//! - `check-config` - Validate a logger config file
//! - `version` - Show version information

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use synclitedb_core::{BrokerConfig, LoggerConfig};
use synclitedb_server::{BrokerServer, ServerConfig, DEFAULT_PORT};
use tracing_subscriber::EnvFilter;

/// SyncLiteDB request broker.
#[derive(Parser, Debug)]
#[command(name = "synclitedb")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP broker
    Serve {
        /// Address to listen on
        #[arg(short, long, default_value_t = SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)))]
        bind: SocketAddr,

        /// Maximum concurrent connections
        #[arg(long, default_value_t = 1000)]
        max_connections: usize,

        /// Seconds allowed for one request
        #[arg(long, default_value_t = 30)]
        request_timeout_secs: u64,

        /// Largest accepted request body in bytes
        #[arg(long, default_value_t = 16 * 1024 * 1024)]
        max_body_bytes: usize,

        /// Default commit log directory for databases without a logger config
        #[arg(long)]
        stage_dir: Option<PathBuf>,

        /// Leave tuples before a failing batch tuple applied
        #[arg(long)]
        non_atomic_batches: bool,
    },

    /// Validate a logger config file and print its settings
    CheckConfig {
        /// Path to the logger config file
        path: PathBuf,
    },

    /// Show version information
    Version,
}

impl Commands {
    fn server_config(&self) -> Option<ServerConfig> {
        let Commands::Serve {
            bind,
            max_connections,
            request_timeout_secs,
            max_body_bytes,
            stage_dir,
            non_atomic_batches,
        } = self
        else {
            return None;
        };

        let mut broker = BrokerConfig::new().atomic_batches(!non_atomic_batches);
        if let Some(dir) = stage_dir {
            broker = broker.stage_dir(dir);
        }
        Some(
            ServerConfig::new(*bind)
                .with_max_connections(*max_connections)
                .with_request_timeout(Duration::from_secs(*request_timeout_secs))
                .with_max_body_bytes(*max_body_bytes)
                .with_broker(broker),
        )
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // RUST_LOG wins over --verbose
    let default = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Some(config) = cli.command.server_config() {
        tracing::info!(
            bind = %config.bind_addr,
            max_connections = config.max_connections,
            atomic_batches = config.broker.atomic_batches,
            "starting synclitedb"
        );
        BrokerServer::new(config).run().await?;
        return Ok(());
    }

    match cli.command {
        Commands::CheckConfig { path } => {
            let config = LoggerConfig::load(&path)?;
            println!("config: {}", path.display());
            match config.stage_dir() {
                Some(dir) => println!("  stage directory: {}", dir.display()),
                None => println!("  stage directory: (none, commit log disabled)"),
            }
            match config.device_name() {
                Some(name) => println!("  device name: {name}"),
                None => println!("  device name: (from db-name)"),
            }
        }
        Commands::Version => {
            println!("synclitedb {}", env!("CARGO_PKG_VERSION"));
            println!("core {}", synclitedb_core::VERSION);
        }
        Commands::Serve { .. } => {}
    }

    Ok(())
}
