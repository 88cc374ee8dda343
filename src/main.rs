use anyhow::Context;
use automation_event_bus::{
    config::Config,
    streams::{gather_metrics, RetentionSweeper, StreamClient},
};
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "automation-event-bus")]
#[command(version, about = "Reliable event streaming for the automation platform", long_about = None)]
struct Cli {
    /// Configuration file layered over the built-in defaults
    #[arg(short, long, env = "CONFIG_PATH", default_value = "config/default.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Provision the topology and run the retention sweeper until Ctrl+C
    Serve,

    /// Run one retention pass
    Sweep {
        /// Override the configured maximum entry age
        #[arg(short, long)]
        max_age_hours: Option<u64>,
    },

    /// Show length, first/last entry and groups of a stream
    Inspect {
        #[arg(value_name = "STREAM")]
        stream: String,
    },

    /// List delivered but unacknowledged entries of a stream's group
    Pending {
        #[arg(value_name = "STREAM")]
        stream: String,

        /// Group to inspect instead of the stream's own
        #[arg(short, long)]
        group: Option<String>,

        #[arg(short = 'n', long, default_value = "20")]
        count: usize,
    },

    /// Show the metrics stream and this process's Prometheus metrics
    Metrics,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::load_from(&cli.config).unwrap_or_else(|e| {
        eprintln!("Failed to load configuration: {}", e);
        eprintln!("Using default configuration");
        Config::default()
    });

    init_tracing(&config);

    tracing::info!(
        "Starting automation event bus v{}",
        env!("CARGO_PKG_VERSION")
    );
    tracing::info!("Storage backend: {:?}", config.streams.storage);

    let client = StreamClient::connect(config.streams.clone())
        .await
        .context("failed to connect to the stream store")?;

    let result = match cli.command {
        Commands::Serve => serve(&client, &config).await,
        Commands::Sweep { max_age_hours } => {
            let max_age_hours = max_age_hours.unwrap_or(config.retention.max_age_hours);
            let report = client.cleanup(max_age_hours).await;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Commands::Inspect { stream } => {
            let info = client
                .stream_info(&stream)
                .await
                .with_context(|| format!("failed to read stream '{}'", stream))?;
            println!("{}", serde_json::to_string_pretty(&info)?);
            Ok(())
        }
        Commands::Pending {
            stream,
            group,
            count,
        } => {
            let pending = client
                .pending_messages(&stream, group.as_deref(), count)
                .await;
            println!("{}", serde_json::to_string_pretty(&pending)?);
            Ok(())
        }
        Commands::Metrics => {
            if let Some(info) = client.stream_info("metrics").await {
                println!("{}", serde_json::to_string_pretty(&info)?);
            }
            print!("{}", gather_metrics());
            Ok(())
        }
    };

    client.close().await?;
    result
}

fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("automation_event_bus={}", config.observability.log_level).into()
    });

    if config.observability.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

async fn serve(client: &StreamClient, config: &Config) -> anyhow::Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let sweeper = if config.retention.enabled {
        let handle =
            RetentionSweeper::from_config(client.clone(), &config.retention).spawn(shutdown_rx);
        tracing::info!("✅ Retention sweeper started");
        Some(handle)
    } else {
        tracing::info!("⚠️  Retention sweeper disabled in configuration");
        None
    };

    tracing::info!(
        "🚀 Event bus ready (namespace: {})",
        client.registry().namespace()
    );

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    tracing::info!("Shutdown signal received");

    let _ = shutdown_tx.send(true);
    if let Some(handle) = sweeper {
        if let Err(e) = handle.await {
            tracing::error!("Retention sweeper task failed: {}", e);
        }
    }

    Ok(())
}
