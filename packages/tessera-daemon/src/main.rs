/// tessera-daemon: index a vault's dashboards and keep their references
/// correct while files move.
///
/// Usage: `tessera-daemon [config-path]`
mod config;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tessera_core::config::load_settings;
use tessera_core::storage::local::LocalStorage;
use tessera_core::{DocumentStorage, ReferenceTracker, StorageError};
use tokio::sync::watch;

#[derive(Debug, thiserror::Error)]
enum DaemonError {
    #[error("No vault configured (set \"vault\" in {0})")]
    NoVault(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Failed to watch vault: {0}")]
    Watch(String),
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run().await {
        log::error!("[tessera.daemon] {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), DaemonError> {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(config::default_config_path);
    let config = config::load_config(&config_path);
    let vault = config
        .vault
        .clone()
        .ok_or_else(|| DaemonError::NoVault(config_path.display().to_string()))?;
    let settings = load_settings(&config.settings_path(&vault));

    let storage = Arc::new(LocalStorage::open(&vault)?);
    let _watcher = storage
        .watch()
        .map_err(|e| DaemonError::Watch(e.to_string()))?;
    // Subscribe before the initial scan so no change slips between the two.
    let events = storage.subscribe();

    let mut tracker = ReferenceTracker::new(storage.clone(), settings.debounce_window());
    let stats = tracker.init();
    log::info!(
        "[tessera.daemon] Vault {} ready: {} dashboards, {} references",
        storage.root().display(),
        stats.documents,
        stats.references
    );

    let _subscriptions = [
        tracker.add_rename_listener(|change| {
            if let Some(new) = &change.new {
                log::info!(
                    "[tessera.daemon.rename] {}: {} -> {}",
                    change.document,
                    change.old,
                    new
                );
            }
        }),
        tracker.add_delete_listener(|change| {
            log::warn!(
                "[tessera.daemon.delete] {}: {} is gone, reference is broken",
                change.document,
                change.old
            );
        }),
        tracker.add_modify_listener(|notice| {
            log::info!(
                "[tessera.daemon.modify] {} changed ({} dashboards)",
                notice.content,
                notice.documents.len()
            );
        }),
    ];

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let cleanup_storage = storage.clone();
    let cleanup_every = Duration::from_secs(config.fingerprint_cleanup_secs.max(1));
    let mut cleanup_shutdown_rx = shutdown_rx.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(cleanup_every);
        loop {
            tokio::select! {
                _ = interval.tick() => cleanup_storage.cleanup_expired_fingerprints(),
                _ = cleanup_shutdown_rx.changed() => break,
            }
        }
    });

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => log::info!("[tessera.daemon] Interrupted, shutting down"),
            Err(e) => {
                log::error!("[tessera.daemon] Cannot listen for Ctrl-C: {}", e);
                // Keep the sender alive; dropping it would stop the tracker.
                std::future::pending::<()>().await;
            }
        }
        let _ = shutdown_tx.send(true);
    });

    tracker.run(events, shutdown_rx).await;
    Ok(())
}
