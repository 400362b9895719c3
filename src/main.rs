use anyhow::Result;
use clap::Parser;
use tokio::sync::broadcast;

use hindsight::session::SessionEvent;
use hindsight::{DebugSessionManager, DebugSettings};

/// Standalone time-travel debug server.
///
/// Applications attach over TCP and stream their state transitions here;
/// events are logged as they arrive. Host and port come from the saved
/// settings file unless overridden.
#[derive(Parser)]
#[command(name = "hindsight", version, about)]
struct Cli {
    /// Host to listen on (overrides saved settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on (overrides saved settings).
    #[arg(long)]
    port: Option<String>,

    /// Log full snapshot payloads instead of one-line summaries.
    #[arg(long)]
    detailed: bool,

    /// Persist the effective settings for future runs.
    #[arg(long)]
    save: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    let mut settings = DebugSettings::load();
    if let Some(host) = cli.host {
        settings.host = host;
    }
    if let Some(port) = cli.port {
        settings.port = port;
    }
    if cli.detailed {
        settings.detailed_output = true;
    }
    if cli.save {
        settings.save()?;
    }

    let detailed = settings.detailed_output;
    let mut manager = DebugSessionManager::new(settings);
    let mut events = manager.subscribe();
    manager.start().await?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(event) => log_event(&manager, event, detailed).await,
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "event log lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    manager.stop().await?;
    Ok(())
}

async fn log_event(manager: &DebugSessionManager, event: SessionEvent, detailed: bool) {
    match event {
        SessionEvent::ServerStarted { address } => {
            tracing::info!(%address, "listening for components");
        }
        SessionEvent::ServerStopped => {
            tracing::info!("server stopped");
        }
        SessionEvent::ComponentAttached { component } => {
            tracing::info!(%component, "component attached");
        }
        SessionEvent::ComponentDetached { component } => {
            tracing::info!(%component, "component detached");
        }
        SessionEvent::SnapshotAppended {
            component,
            snapshot,
        } => {
            if detailed {
                let payload = manager
                    .server()
                    .component(&component)
                    .await
                    .and_then(|debug| {
                        debug
                            .snapshots()
                            .iter()
                            .find(|s| s.meta.id == snapshot)
                            .and_then(|s| serde_json::to_string_pretty(s).ok())
                    });
                match payload {
                    Some(payload) => tracing::info!(%component, %snapshot, "snapshot:\n{payload}"),
                    None => tracing::info!(%component, %snapshot, "snapshot recorded"),
                }
            } else {
                tracing::info!(%component, %snapshot, "snapshot recorded");
            }
        }
        SessionEvent::ActionApplied { component, call_id } => {
            tracing::info!(%component, %call_id, "directive acknowledged");
        }
        SessionEvent::Exception { component, reason } => {
            tracing::warn!(component = ?component, %reason, "session exception");
        }
    }
}
