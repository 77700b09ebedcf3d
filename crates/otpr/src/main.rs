use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use otpr_core::{
    config::Config, control::ControlPlane, dedup::DedupCache, dispatcher::BroadcastDispatcher,
    gate::RelayGate, poller::SourcePoller, registry::DestinationRegistry, source::HttpSource,
};
use otpr_telegram::TelegramMessenger;

#[tokio::main]
async fn main() -> Result<(), otpr_core::Error> {
    let cfg = Arc::new(Config::load()?);
    otpr_core::logging::init("otpr", cfg.log_json)?;

    // Corrupt state is the one fatal startup condition.
    let registry = Arc::new(DestinationRegistry::open(
        cfg.registry_path(),
        cfg.fallback_label.clone(),
    )?);
    let gate = Arc::new(RelayGate::open(cfg.relay_state_path())?);
    let dedup = Arc::new(DedupCache::open(cfg.dedup_path(), cfg.dedup_retention)?);
    info!(
        state_dir = %cfg.state_dir.display(),
        destinations = registry.len().await,
        fingerprints = dedup.len().await,
        enabled = gate.is_enabled(),
        "state loaded"
    );

    let messenger = Arc::new(TelegramMessenger::from_token(&cfg.telegram_bot_token));
    let source = Arc::new(HttpSource::new(
        cfg.source_url.clone(),
        cfg.source_fields.clone(),
        cfg.fetch_timeout,
    )?);
    let dispatcher = Arc::new(BroadcastDispatcher::new(
        registry.clone(),
        messenger.clone(),
        cfg.buttons.clone(),
        cfg.delivery_timeout,
    ));
    let poller = Arc::new(SourcePoller::new(
        gate.clone(),
        source,
        dedup,
        dispatcher,
        cfg.poll_interval,
        cfg.fetch_timeout,
    ));

    let cancel = CancellationToken::new();
    let poller_task = poller.spawn(cancel.clone());

    let control = Arc::new(ControlPlane::new(gate, registry));
    let res = otpr_telegram::router::run_polling(cfg.clone(), messenger.bot(), control).await;

    info!("shutting down");
    cancel.cancel();
    if let Err(e) = poller_task.await {
        error!("poller task ended abnormally: {e}");
    }

    res.map_err(|e| otpr_core::Error::External(format!("telegram bot failed: {e}")))?;
    Ok(())
}
