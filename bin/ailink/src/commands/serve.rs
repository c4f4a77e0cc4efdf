use ailink_bus::AgentBus;
use ailink_core::{Config, Paths};
use ailink_scheduler::TaskNotifier;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Run the bus scheduler until ctrl-c. Expired contexts are swept on a slow
/// side interval; read semantics are unaffected, it only reclaims storage.
pub async fn run() -> anyhow::Result<()> {
    let paths = Paths::new();
    let config = Config::load(&paths)?;
    let store_path = config.store_path(&paths);

    let bus = AgentBus::open(&store_path)?;
    info!(store = %store_path.display(), "Bus opened");

    let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);

    let notifier = Arc::new(
        TaskNotifier::new(bus.clone())
            .with_interval(Duration::from_millis(config.scheduler.tick_interval_ms)),
    );
    let notifier_handle = tokio::spawn(notifier.run_loop(shutdown_tx.subscribe()));

    let sweeper_bus = bus.clone();
    let mut sweeper_shutdown = shutdown_tx.subscribe();
    let sweeper_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = sweeper_bus.contexts.sweep_expired() {
                        tracing::error!(error = %e, "Context sweep failed");
                    }
                }
                _ = sweeper_shutdown.recv() => break,
            }
        }
    });

    info!("ailink serving; press ctrl-c to stop");
    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    // let in-flight ticks finish rather than aborting mid-write
    let _ = shutdown_tx.send(());
    let _ = notifier_handle.await;
    let _ = sweeper_handle.await;

    Ok(())
}
