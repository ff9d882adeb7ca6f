use anyhow::{Context, Result};
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use wms_realtime_core::{ExternalTrigger, InvalidationPredicate, RealtimeConfig, RealtimeManager};
use wms_realtime_websocket_client::{WebsocketConfig, WebsocketTransport};

const STATUS_INTERVAL: Duration = Duration::from_secs(15);

#[tokio::main]
async fn main() -> Result<()> {
    // initialize tracing
    tracing_subscriber::fmt().with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))).init();

    let endpoint = std::env::var("WMS_REALTIME_URL").context("WMS_REALTIME_URL must be set")?;
    let api_key = std::env::var("WMS_REALTIME_API_KEY").context("WMS_REALTIME_API_KEY must be set")?;
    let mut config = RealtimeConfig::default();
    if let Ok(channel) = std::env::var("WMS_REALTIME_CHANNEL") {
        config = config.with_channel_name(channel);
    }

    let transport = Arc::new(WebsocketTransport::new(WebsocketConfig::new(endpoint, api_key)));
    let manager = RealtimeManager::new(config, transport);

    // Log every invalidation instead of clearing a real cache
    let guard = manager.subscribe(Arc::new(|predicate: &InvalidationPredicate| info!("invalidate {}", predicate)), None);
    info!("Monitoring channel {} as {}", manager.channel_name(), guard.id());

    let mut status_tick = tokio::time::interval(STATUS_INTERVAL);
    let mut state = manager.state();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = status_tick.tick() => {
                let status = manager.status();
                info!("status: {}", serde_json::to_string(&status)?);
                if status.retries_exhausted {
                    warn!("Retries exhausted, forcing a fresh connection");
                    manager.handle_trigger(ExternalTrigger::VisibilityRegained);
                }
            }
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                info!("connection {}", *state.borrow_and_update());
            }
        }
    }

    info!("Shutting down");
    guard.dispose();
    manager.global_cleanup();
    Ok(())
}
