use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tracing_subscriber::EnvFilter;
use ucp_agents::{
    agent::Agent,
    config::{create_default_config_file, AppConfig},
    gateway::{self, SharedAgent},
    protocol::UcpMessage,
    tasks::spawn_periodic,
};

#[derive(Parser)]
#[command(name = "ucp-agent")]
#[command(about = "UCP commerce agent (buyer, seller, mediator or simulator)")]
struct Args {
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Override the configured role.
    #[arg(short, long)]
    role: Option<String>,

    /// Override the configured listen port.
    #[arg(short, long)]
    port: Option<u16>,

    /// Write a default config file to the --config path and exit.
    #[arg(long)]
    init: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.init {
        create_default_config_file(&args.config)?;
        println!("wrote default configuration to {}", args.config);
        return Ok(());
    }

    let mut config = if std::path::Path::new(&args.config).exists() {
        AppConfig::load_with_env_overrides(&args.config)?
    } else {
        AppConfig::default()
    };
    if let Some(role) = args.role {
        config.agent.role = role;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    config.validate()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone())),
        )
        .init();

    let agent = Agent::from_config(&config)?;
    let agent_id = agent.id.clone();
    let role = agent.role;
    let capabilities = agent.capabilities();
    tracing::info!(agent = %agent_id, role = role.as_str(), "agent starting");
    agent.publish_profile().await;

    let shared: SharedAgent = Arc::new(Mutex::new(agent));

    // Periodic discovery and heartbeat broadcasts, when a network gateway
    // is configured.
    let mut background = Vec::new();
    if let Some(gateway_url) = config.network.gateway_url.clone() {
        let client = reqwest::Client::new();

        // One-shot registration, then the recurring broadcasts.
        match UcpMessage::register(&agent_id, &capabilities) {
            Ok(msg) => {
                if let Err(e) = gateway::deliver(&client, &gateway_url, &msg).await {
                    tracing::warn!(error = %e, "registration failed, continuing");
                }
            }
            Err(e) => tracing::warn!(error = %e, "registration message invalid"),
        }

        let discover_url = gateway_url.clone();
        let discover_client = client.clone();
        let discover_id = agent_id.clone();
        let discover_caps = capabilities.clone();
        background.push(spawn_periodic(
            "discovery",
            Duration::from_secs(config.network.discovery_interval_secs.max(1)),
            move || {
                let client = discover_client.clone();
                let url = discover_url.clone();
                let id = discover_id.clone();
                let caps = discover_caps.clone();
                async move {
                    match UcpMessage::discover(&id, &caps) {
                        Ok(msg) => {
                            if let Err(e) = gateway::deliver(&client, &url, &msg).await {
                                tracing::warn!(error = %e, "discovery broadcast failed");
                            }
                        }
                        Err(e) => tracing::warn!(error = %e, "discovery message invalid"),
                    }
                }
            },
        ));

        let heartbeat_id = agent_id.clone();
        background.push(spawn_periodic(
            "heartbeat",
            Duration::from_secs(config.network.heartbeat_interval_secs.max(1)),
            move || {
                let client = client.clone();
                let url = gateway_url.clone();
                let id = heartbeat_id.clone();
                async move {
                    match UcpMessage::heartbeat(&id) {
                        Ok(msg) => {
                            if let Err(e) = gateway::deliver(&client, &url, &msg).await {
                                tracing::warn!(error = %e, "heartbeat failed");
                            }
                        }
                        Err(e) => tracing::warn!(error = %e, "heartbeat message invalid"),
                    }
                }
            },
        ));
    }

    let app = gateway::router(shared);
    let address = config.server_address();
    let listener = TcpListener::bind(&address).await?;
    tracing::info!(%address, "listening for UCP messages");

    axum::serve(listener, app).await?;

    for task in background {
        task.shutdown().await;
    }
    Ok(())
}
