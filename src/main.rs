//! op-panel - operator panel service
//!
//! Drives the operator panel LCD and buttons and forwards selected panel
//! functions to the host.

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use op_panel::api::{self, ApiState};
use op_panel::config::AppConfig;
use op_panel::event_log::TracingEventLog;
use op_panel::host::HostForwarder;
use op_panel::input::spawn_button_reader;
use op_panel::state::{FunctionCatalog, StateMachine};
use op_panel::transport::Transport;
use op_panel::{InboundEvent, Panel};

/// Depth of the inbound event queue
const EVENT_QUEUE_DEPTH: usize = 64;

/// Operator panel service
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "panel.yaml")]
    config: String,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,

    /// Use the simulated bus for every panel
    #[arg(long)]
    simulate: bool,

    /// Load and validate the configuration, then exit
    #[arg(long)]
    check_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();
    init_logging(&args.log_level, args.log_json)?;

    info!("Starting op-panel {}...", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let config = AppConfig::load(&args.config).await?;

    if args.check_config {
        print_summary(&config);
        return Ok(());
    }

    let mut transports = Vec::with_capacity(config.panels.len());
    for panel in &config.panels {
        let transport = Transport::open(panel, args.simulate)
            .with_context(|| format!("Failed to open panel '{}'", panel.name))?;
        transports.push(transport);
    }

    let machine = StateMachine::new(FunctionCatalog::default_catalog())?;

    let forwarder = if config.host.enabled {
        let forwarder = HostForwarder::from_config(&config.host, Arc::new(TracingEventLog))?;
        info!(
            eid = config.host.eid,
            socket = %config.host.socket.display(),
            "Host function forwarding enabled"
        );
        Some(forwarder)
    } else {
        info!("Host function forwarding disabled");
        None
    };

    let panel = Panel::new(machine, transports, forwarder, config.system.clone());

    run_app(panel, &config, shutdown_signal()).await?;

    info!("op-panel shutdown complete");
    Ok(())
}

async fn run_app(
    mut panel: Panel,
    config: &AppConfig,
    shutdown: impl std::future::Future<Output = ()>,
) -> Result<()> {
    let (tx, mut rx) = mpsc::channel(EVENT_QUEUE_DEPTH);

    // Producers
    for panel_config in &config.panels {
        if let Some(device) = &panel_config.input_device {
            spawn_button_reader(device.clone(), tx.clone());
        }
    }

    if config.api.enabled {
        let state = Arc::new(ApiState { events: tx.clone() });
        let bind = config.api.bind.clone();
        let port = config.api.port;
        tokio::spawn(async move {
            if let Err(e) = api::start_server(state, &bind, port).await {
                warn!("API server stopped: {:#}", e);
            }
        });
    }

    for panel_config in config.panels.iter().filter(|p| p.assume_present) {
        tx.send(InboundEvent::PresenceChanged {
            panel: panel_config.name.clone(),
            present: true,
        })
        .await
        .context("Panel event queue closed during startup")?;
    }

    info!("Ready to process panel events");

    // Main event loop
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            Some(event) = rx.recv() => {
                debug!(?event, "Panel event");
                panel.handle(event).await;
            }

            _ = &mut shutdown => {
                info!("Shutdown signal received, stopping event loop");
                break;
            }
        }
    }

    Ok(())
}

fn init_logging(level: &str, json: bool) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(false))
            .try_init()
            .context("Failed to initialize logging")?;
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_thread_names(false),
            )
            .try_init()
            .context("Failed to initialize logging")?;
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for CTRL+C: {}", e);
        std::future::pending::<()>().await;
    }
}

fn print_summary(config: &AppConfig) {
    println!("Configuration OK");
    for panel in &config.panels {
        println!(
            "  panel {:<10} {:?} {} @ {:#04x} ({:?}){}",
            panel.name,
            panel.variant,
            panel.device.display(),
            panel.address,
            panel.backend,
            if panel.assume_present { "" } else { " waits for presence" },
        );
    }
    if config.host.enabled {
        println!(
            "  host       eid {} via {} ({} effecter PDRs)",
            config.host.eid,
            config.host.socket.display(),
            config.host.effecter_pdrs.len()
        );
    } else {
        println!("  host       forwarding disabled");
    }
    if config.api.enabled {
        println!("  api        http://{}:{}", config.api.bind, config.api.port);
    }
}
