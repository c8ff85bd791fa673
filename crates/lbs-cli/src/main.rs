use clap::{Parser, Subcommand};
use tracing::info;

use lbs_client::LbsClient;
use lbs_core::config::{default_config_path, LbsConfig};
use lbs_protocol::ResourceClass;

#[derive(Parser)]
#[command(name = "lbs")]
#[command(about = "LBS - shared location provider with reference-counted resource arbitration")]
#[command(version)]
struct Cli {
    /// Provider socket (defaults to the configured or platform path)
    #[arg(short, long, global = true)]
    socket: Option<String>,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the provider service
    Server {
        /// Provider name reported by GetProviderInfo
        #[arg(long)]
        name: Option<String>,

        /// Provider description reported by GetProviderInfo
        #[arg(long)]
        description: Option<String>,

        /// Maximum concurrently connected clients
        #[arg(long)]
        max_clients: Option<u32>,

        /// Write PID to this file (for service managers)
        #[arg(long)]
        pid_file: Option<String>,
    },

    /// Reference a resource class and hold it until Ctrl+C
    AddRef {
        /// gps, nps, agps or geofence
        resource: ResourceClass,

        /// Requested update interval in milliseconds
        #[arg(short, long)]
        interval: Option<u32>,
    },

    /// Release a reference from a fresh connection (the server logs the anomaly)
    RemoveRef {
        resource: ResourceClass,
    },

    /// Record an interval request without referencing the class
    Interval {
        resource: ResourceClass,

        /// Interval in milliseconds
        interval_ms: u32,
    },

    /// Show provider info, status and the arbitration state
    Status,

    /// Print provider status changes until Ctrl+C
    Watch,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    lbs_common::init_logging();

    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(default_config_path);
    let mut config = LbsConfig::load_or_default(&config_path);
    if cli.socket.is_some() {
        config.server.socket_path = cli.socket;
    }
    let socket = config
        .server
        .socket_path
        .clone()
        .unwrap_or_else(lbs_common::platform::default_socket_path);

    match cli.command {
        Commands::Server {
            name,
            description,
            max_clients,
            pid_file,
        } => {
            if let Some(ref path) = pid_file {
                std::fs::write(path, std::process::id().to_string())?;
            }

            if name.is_some() {
                config.server.name = name;
            }
            if description.is_some() {
                config.server.description = description;
            }
            if let Some(max) = max_clients {
                config.server.max_clients = max;
            }

            info!(
                "starting {} on {} ({})",
                config.server.service_name,
                socket,
                lbs_common::platform::platform_name()
            );

            let server = lbs_server::LbsServer::new(config, lbs_server::ProviderHooks::logging());
            let result = server.run().await.map_err(|e| anyhow::anyhow!("{}", e));

            if let Some(ref path) = pid_file {
                let _ = std::fs::remove_file(path);
            }

            result?;
        }

        Commands::AddRef { resource, interval } => {
            let mut client = LbsClient::connect(&socket, "lbs-cli").await?;
            client.add_reference(resource).await?;
            if let Some(ms) = interval {
                client.request_interval(resource, ms).await?;
            }
            println!("{} holds a {} reference; Ctrl+C to release", client.unique_name(), resource);
            print_state(&mut client).await?;

            tokio::signal::ctrl_c().await?;
            client.remove_reference(resource).await?;
            println!("released {}", resource);
        }

        Commands::RemoveRef { resource } => {
            let mut client = LbsClient::connect(&socket, "lbs-cli").await?;
            client.remove_reference(resource).await?;
            print_state(&mut client).await?;
        }

        Commands::Interval {
            resource,
            interval_ms,
        } => {
            let mut client = LbsClient::connect(&socket, "lbs-cli").await?;
            client.request_interval(resource, interval_ms).await?;
            print_state(&mut client).await?;
        }

        Commands::Status => {
            let mut client = LbsClient::connect(&socket, "lbs-cli").await?;
            let (name, description) = client.provider_info().await?;
            let status = client.status().await?;
            let state = client.state().await?;

            println!("Provider:    {}", name.unwrap_or_else(|| "-".to_string()));
            println!("Description: {}", description.unwrap_or_else(|| "-".to_string()));
            println!("Status:      {}", status);
            println!("Clients:     {}", state.tracked_clients);
            println!();
            for (i, resource) in ResourceClass::ALL.iter().enumerate() {
                let running = !state.shutdown.get(i).copied().unwrap_or(true);
                let interval = state.effective_intervals.get(i).copied().flatten();
                match interval {
                    Some(ms) => println!("  {:<9} running={} interval={}ms", resource, running, ms),
                    None => println!("  {:<9} running={}", resource, running),
                }
            }
        }

        Commands::Watch => {
            let mut client = LbsClient::connect(&socket, "lbs-cli").await?;
            println!("status: {}", client.status().await?);
            loop {
                tokio::select! {
                    change = client.next_status_change() => {
                        let (resource, status) = change?;
                        println!("{:<9} status={}", resource, status);
                    }
                    _ = tokio::signal::ctrl_c() => break,
                }
            }
        }
    }

    Ok(())
}

async fn print_state(client: &mut LbsClient) -> anyhow::Result<()> {
    let state = client.state().await?;
    println!("{}", serde_json::to_string_pretty(&state)?);
    Ok(())
}
