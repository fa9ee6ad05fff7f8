use clap::Parser;
use tracing::{info, warn};

use stagehand_core::{Core, StagehandConfig};
use stagehand_events::EventDispatcher;

mod hooks;
mod setup;

#[derive(Parser, Debug)]
#[command(
    name = "stagehand",
    about = "Session management daemon for the media graph",
    version
)]
struct Cli {
    /// Path to stagehand.toml (default: ~/.stagehand/stagehand.toml).
    #[arg(long)]
    config: Option<String>,

    /// Log filter directive, e.g. "stagehand=debug,stagehand_events=trace".
    #[arg(long)]
    log_filter: Option<String>,

    /// Shorthand for --log-filter stagehand=debug.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // config: explicit path > STAGEHAND_CONFIG env > ~/.stagehand/stagehand.toml
    let config_path = cli
        .config
        .clone()
        .or_else(|| std::env::var("STAGEHAND_CONFIG").ok());
    let (config, config_err) = match StagehandConfig::load(config_path.as_deref()) {
        Ok(config) => (config, None),
        Err(err) => (StagehandConfig::default(), Some(err)),
    };

    // log filter: CLI > STAGEHAND_LOG env > config default
    let filter = if cli.verbose {
        "stagehand=debug".to_string()
    } else {
        cli.log_filter
            .clone()
            .or_else(|| std::env::var("STAGEHAND_LOG").ok())
            .unwrap_or_else(|| config.logging.filter.clone())
    };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .init();

    if let Some(err) = config_err {
        warn!("Config load failed ({}), using defaults", err);
    }

    let core = Core::new(config);
    let dispatcher = EventDispatcher::get_instance(&core);

    let daemon = setup::install(&core)?;

    let (stopped_tx, stopped_rx) = tokio::sync::oneshot::channel();
    hooks::register_shutdown_hook(&dispatcher, stopped_tx)?;

    info!(name = %core.config().daemon.name, "stagehand running");

    wait_for_signal().await?;
    info!("shutdown signal received");
    dispatcher.push_event(hooks::shutdown_event()?);

    // the shutdown terminal hook stops the dispatcher once the batch drains
    let _ = stopped_rx.await;
    info!(
        objects = daemon.manager.n_objects(),
        endpoints = daemon.factory.n_endpoints(),
        "stagehand stopped"
    );
    Ok(())
}

async fn wait_for_signal() -> anyhow::Result<()> {
    let mut term = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result?,
        _ = term.recv() => {}
    }
    Ok(())
}
