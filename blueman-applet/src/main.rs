/*!
 * Blueman Applet
 * Bluetooth tray applet with a dependency-ordered plugin core
 */

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use blueman_applet::client::AppletClient;
use blueman_applet::ipc::{Request, Response};
use blueman_applet::{runtime, AppletConfig};

#[derive(Parser)]
#[command(name = "blueman-applet")]
#[command(about = "Blueman Bluetooth Applet")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file path
    #[arg(short, long, default_value = "/etc/blueman/applet.toml")]
    config: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the applet
    Run,
    /// Show applet status
    Status,
    /// List known plugins
    Plugins,
    /// Load a plugin and its dependencies
    Load { id: String },
    /// Unload a plugin and its dependents
    Unload { id: String },
    /// Call a method provided by a loaded plugin
    Call {
        method: String,
        /// JSON arguments
        args: Option<String>,
    },
    /// Print applet signals as they arrive
    Monitor,
    /// Stop the applet
    Stop,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(format!("blueman_applet={}", log_level))
        .init();

    let config = AppletConfig::load(&cli.config)?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            info!("Blueman applet starting...");
            runtime::run(config).await
        }
        Commands::Monitor => monitor(&config).await,
        Commands::Status => request(&config, Request::GetStatus).await,
        Commands::Plugins => request(&config, Request::ListPlugins).await,
        Commands::Load { id } => request(&config, Request::LoadPlugin { id }).await,
        Commands::Unload { id } => request(&config, Request::UnloadPlugin { id }).await,
        Commands::Call { method, args } => {
            let args = match args {
                Some(raw) => serde_json::from_str(&raw)?,
                None => serde_json::Value::Null,
            };
            request(&config, Request::Call { method, args }).await
        }
        Commands::Stop => request(&config, Request::Quit).await,
    }
}

async fn request(config: &AppletConfig, request: Request) -> Result<()> {
    let client = AppletClient::new(&config.socket_path);

    match client.send_request(&request).await? {
        Response::Status {
            manager_state,
            visible,
            icon_name,
            tooltip_title,
            tooltip_text,
            plugins,
        } => {
            println!("BlueZ:    {}", if manager_state { "running" } else { "not running" });
            println!("Icon:     {} ({})", icon_name, if visible { "visible" } else { "hidden" });
            println!("Tooltip:  {} / {}", tooltip_title, tooltip_text);
            println!("Plugins:  {}", plugins.join(", "));
        }
        Response::Plugins { plugins } => {
            for plugin in plugins {
                let mut flags = Vec::new();
                if !plugin.enabled {
                    flags.push("disabled");
                }
                if plugin.hidden {
                    flags.push("hidden");
                }
                if !plugin.unloadable {
                    flags.push("permanent");
                }
                println!(
                    "{:<22} {:<9} {}{}",
                    plugin.id,
                    format!("{:?}", plugin.state).to_lowercase(),
                    plugin.description,
                    if flags.is_empty() {
                        String::new()
                    } else {
                        format!(" [{}]", flags.join(", "))
                    }
                );
                if let Some(error) = plugin.error {
                    println!("{:<22} error: {}", "", error);
                }
            }
        }
        Response::Value { value } => println!("{}", serde_json::to_string_pretty(&value)?),
        Response::Success { message } => println!("{}", message),
        Response::Signal { signal } => println!("{:?}", signal),
        Response::Error { message } => bail!("{}", message),
    }
    Ok(())
}

async fn monitor(config: &AppletConfig) -> Result<()> {
    let client = AppletClient::new(&config.socket_path);
    let mut subscription = client.subscribe().await?;

    while let Some(signal) = subscription.next().await? {
        println!("{}", serde_json::to_string(&signal)?);
    }
    Ok(())
}
