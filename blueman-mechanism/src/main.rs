/*!
 * Blueman Mechanism
 * Privileged rfkill and power control for the Bluetooth applet
 */

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use blueman_mechanism::rfkill::RfKill;
use blueman_mechanism::server::{bind_socket, MechanismServer, RequestHandler};
use blueman_mechanism::{Authority, MechanismClient, MechanismConfig};

#[derive(Parser)]
#[command(name = "blueman-mechanism")]
#[command(about = "Blueman privileged helper")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file path
    #[arg(short, long, default_value = "/etc/blueman/mechanism.toml")]
    config: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the helper
    Run,
    /// Check that a running helper answers
    Ping,
    /// Ask a running helper to switch Bluetooth on or off
    SetRfkill {
        #[arg(value_enum)]
        state: PowerState,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum PowerState {
    On,
    Off,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(format!("blueman_mechanism={}", log_level))
        .init();

    // Load configuration
    let config = MechanismConfig::load(&cli.config)?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_mechanism(config).await,
        Commands::Ping => ping(&config).await,
        Commands::SetRfkill { state } => set_rfkill(&config, matches!(state, PowerState::On)).await,
    }
}

async fn run_mechanism(config: MechanismConfig) -> Result<()> {
    info!("Blueman mechanism starting...");

    let socket = Path::new(&config.socket_path);
    let listener = bind_socket(socket).await?;
    // Access control happens per request against peer credentials.
    fs::set_permissions(socket, fs::Permissions::from_mode(0o666))?;

    let handler = RequestHandler::new(
        Authority::new(config.policy.clone()),
        RfKill::probe(config.rfkill.clone()),
    );
    let server = MechanismServer::new(listener, handler);

    info!("Blueman mechanism ready on socket: {}", config.socket_path);

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => info!("Interrupted, shutting down"),
    }

    let _ = fs::remove_file(socket);
    Ok(())
}

fn client(config: &MechanismConfig) -> MechanismClient {
    MechanismClient::new(&config.socket_path, Duration::from_secs(5))
}

async fn ping(config: &MechanismConfig) -> Result<()> {
    client(config).ping().await?;
    println!("blueman-mechanism is running on {}", config.socket_path);
    Ok(())
}

async fn set_rfkill(config: &MechanismConfig, state: bool) -> Result<()> {
    client(config).set_rfkill_state(state).await?;
    println!("Bluetooth {}", if state { "enabled" } else { "disabled" });
    Ok(())
}
