/**
 * SVITLO BRIDGE - Point d'entrée du process
 *
 * RÔLE : Bootstrap complet : .env, options, logging, sources, MQTT, boucle de
 * traitement, arrêt propre sur SIGINT/SIGTERM.
 */

use anyhow::{Context, Result};
use std::process::ExitCode;
use std::time::Duration;
use svitlo_bridge::config::{load_options, options_path, Settings};
use svitlo_bridge::mqtt::{spawn_event_loop, MqttBus};
use svitlo_bridge::{bridge, SourceRouter};
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    // Charger les variables d'environnement depuis .env (si présent)
    dotenvy::dotenv().ok();

    let settings = match load_settings().await {
        Ok(settings) => settings,
        Err(e) => {
            init_logging(false);
            error!("{e:#}");
            return ExitCode::from(2);
        }
    };
    init_logging(settings.debug);

    match serve(settings).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn load_settings() -> Result<Settings> {
    let path = options_path();
    let options = load_options(&path)
        .await
        .with_context(|| format!("failed to load options from {}", path.display()))?;
    options
        .resolve(|key| std::env::var(key).ok())
        .context("invalid configuration")
}

/// WARN par défaut, INFO avec `debug: true` ; RUST_LOG a toujours le dernier mot
fn init_logging(debug: bool) {
    let default = if debug { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn serve(settings: Settings) -> Result<()> {
    let router = SourceRouter::new(settings.bindings, settings.mqtt.qos);
    for binding in router.bindings() {
        info!(
            source = %binding.identity,
            namespace = %binding.namespace,
            parser = %binding.parser.kind(),
            "listening to source"
        );
    }

    let (bus, eventloop) = MqttBus::connect(&settings.mqtt);
    let (tx, rx) = mpsc::unbounded_channel();
    let mut listener = spawn_event_loop(bus.client().clone(), eventloop, settings.mqtt.inbox_topic.clone(), tx);

    bridge::run(&router, &bus, rx, shutdown_signal()).await;

    if let Err(e) = bus.disconnect() {
        warn!("MQTT disconnect failed: {e}");
    }
    match tokio::time::timeout(Duration::from_secs(5), &mut listener).await {
        Ok(joined) => joined.context("MQTT event loop task failed")?,
        Err(_) => {
            warn!("MQTT event loop did not stop in time, aborting it");
            listener.abort();
        }
    }
    Ok(())
}

/// Attend SIGINT (Ctrl+C) ou SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
