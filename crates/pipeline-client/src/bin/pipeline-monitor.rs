//! Connects to the execution engine and logs connection and run status
//!
//! Usage: `pipeline-monitor [CONFIG_DIR]` (defaults to the current
//! directory). `PIPELINE_ENDPOINT` and `PIPELINE_PERSISTENCE_URL` override
//! the loaded configuration.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use pipeline_client::{ClientConfig, ConnectionState, SyncClient};
use pipeline_engine::{EventError, EventSink, GraphEvent, GraphStore};

/// Echoes store changes at debug level
struct LogSink;

impl EventSink for LogSink {
    fn send(&self, event: GraphEvent) -> Result<(), EventError> {
        log::debug!("Graph event: {:?}", event);
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let config_dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));

    let config = match ClientConfig::load(&config_dir).await {
        Ok(config) => config.with_env_overrides(),
        Err(e) => {
            log::error!("Failed to load configuration from {:?}: {}", config_dir, e);
            std::process::exit(1);
        }
    };
    log::info!("pipeline-monitor starting, engine at {}", config.endpoint);

    let mut store = GraphStore::with_history_depth(config.history_depth);
    store.subscribe(Arc::new(LogSink));
    let store = store.into_shared();

    let client = SyncClient::from_config(&config, store.clone());
    let mut status = client.subscribe();
    client.connect();

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    let mut last_progress = None;

    loop {
        tokio::select! {
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *status.borrow_and_update();
                match current.state {
                    ConnectionState::Error => log::error!(
                        "Gave up on {} after {} attempts; waiting for Ctrl-C",
                        config.endpoint,
                        current.attempts
                    ),
                    state => log::info!("{} (attempt {})", state.label(), current.attempts),
                }
            }
            _ = ticker.tick() => {
                let guard = store.read();
                let execution = guard.execution();
                let progress = execution.progress();
                let running = execution.active_pipeline().map(str::to_string);
                if last_progress == Some((running.clone(), progress)) {
                    continue;
                }
                match &running {
                    Some(pipeline) => log::info!(
                        "Pipeline {} running: {}/{} nodes",
                        pipeline,
                        progress.completed,
                        progress.total
                    ),
                    None => {
                        if let Some(error) = execution.last_error() {
                            log::warn!("Last run failed: {}", error);
                        } else if let Some(ms) = execution.last_run_ms() {
                            log::info!("Last run finished in {} ms", ms);
                        }
                    }
                }
                last_progress = Some((running, progress));
            }
            _ = &mut shutdown => {
                log::info!("Shutting down");
                break;
            }
        }
    }

    client.disconnect();
}
