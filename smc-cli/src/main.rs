mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use smc_client::SessionContext;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "smcctl")]
#[command(version = "0.1.0")]
#[command(about = "SMC management and monitoring CLI", long_about = None)]
struct Cli {
    /// REST API entry point, e.g. http://smc.example.net:8082/6.4
    #[arg(long, env = "SMC_API_URL", default_value = "http://127.0.0.1:8082/6.4", global = true)]
    api_url: String,

    /// Monitoring socket base URL, e.g. ws://smc.example.net:8082
    #[arg(long, env = "SMC_SOCKET_URL", default_value = "ws://127.0.0.1:8082", global = true)]
    socket_url: String,

    /// Session cookie of a logged-in SMC session (JSESSIONID=...)
    #[arg(long, env = "SMC_SESSION_COOKIE", default_value = "", global = true)]
    cookie: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch stored logs or follow them in real time
    Logs(commands::logs::LogsArgs),

    /// Show session monitoring state on an engine
    Monitor(commands::monitor::MonitorArgs),

    /// Resolve log field IDs to field descriptors
    Fields {
        /// Field IDs to resolve
        #[arg(required = true)]
        ids: Vec<i64>,
    },

    /// Search elements by name
    Search(commands::search::SearchArgs),

    /// Manage administrator accounts
    Admin {
        #[command(subcommand)]
        command: commands::admin::AdminCommands,
    },

    /// Bootstrap an appliance from an OVF environment file
    Bootstrap(commands::bootstrap::BootstrapArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let session = SessionContext::new(cli.api_url, cli.socket_url, cli.cookie);

    match cli.command {
        Commands::Logs(args) => commands::logs::execute(&session, args).await,
        Commands::Monitor(args) => commands::monitor::execute(&session, args).await,
        Commands::Fields { ids } => commands::fields::execute(&session, ids).await,
        Commands::Search(args) => commands::search::execute(&session, args).await,
        Commands::Admin { command } => commands::admin::execute(&session, command).await,
        Commands::Bootstrap(args) => commands::bootstrap::execute(&args),
    }
}
