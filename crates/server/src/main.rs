//! skript-host - loads a folder of scripts into the in-memory host
//!
//! Usage: `skript-host [root]`. `root` holds `config.sk` and the scripts
//! folder it names (default `scripts`).

use anyhow::Context;
use skript_config::SkriptConfig;
use skript_scripting::{default_registry, InMemoryHost, LoadSummary, ScriptLoader};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let root = std::env::args().nth(1).map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));

    let config = SkriptConfig::load_default(&root).context("Failed to load config.sk")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.verbosity.filter_directive())),
        )
        .init();

    info!("Skript host starting up...");
    config.display();

    let folder = if config.scripts_folder.is_absolute() {
        config.scripts_folder.clone()
    } else {
        root.join(&config.scripts_folder)
    };
    let async_loading = config.async_loading;

    let host = InMemoryHost::new(config);
    let registry = Arc::new(default_registry().context("Failed to register built-in structures")?);
    let loader = Arc::new(ScriptLoader::new(registry, host.host.clone()));

    let scripts = if async_loading {
        let sources = loader.collect_sources(&folder)?;
        info!("Loading {} script(s) from {} on a worker", sources.len(), folder.display());
        let (mut ctx, mut scripts) = loader.load_scripts_async(sources).await?;
        let ran = loader.run_pending(&mut ctx, &mut scripts);
        info!("Applied {} queued registration(s)", ran);
        scripts
    } else {
        let mut ctx = loader.new_context();
        loader.load_folder(&mut ctx, &folder)?
    };

    let summary = LoadSummary::from_scripts(&scripts);
    if summary.errors > 0 {
        warn!("Some scripts did not load cleanly");
    }

    info!(
        "Host ready: {} event subscription(s), {} command(s), {} function(s)",
        host.events.subscription_count() + host.events.self_registering_count(),
        host.commands.len(),
        host.host.functions.function_count()
    );
    for name in host.commands.names() {
        info!("    /{}", name);
    }

    match host.variables.to_json() {
        Ok(json) => tracing::debug!("Variables:\n{}", json),
        Err(e) => error!("Failed to export variables: {}", e),
    }

    Ok(())
}
