// Periodic local scan: Docker → stored snapshots → notification processing.

use crate::docker_repo::DockerRepo;
use crate::models::Host;
use crate::notify::NotificationService;
use crate::store::SqliteStore;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{Duration, interval};
use tracing::Instrument;

pub struct ScannerDeps {
    pub docker_repo: Arc<DockerRepo>,
    pub store: Arc<SqliteStore>,
    pub notifier: Arc<NotificationService>,
    pub host: Host,
    pub shutdown_rx: watch::Receiver<bool>,
}

/// Scans the host once, persists the snapshots and runs the notification pass for it.
/// Returns the number of containers seen.
pub async fn scan_once(
    docker_repo: &DockerRepo,
    store: &SqliteStore,
    notifier: &NotificationService,
    host: &Host,
) -> anyhow::Result<usize> {
    let snapshots = docker_repo.scan(host).await?;
    if snapshots.is_empty() {
        store.mark_host_scanned(host.id, chrono::Utc::now()).await?;
    } else {
        store.save_containers(&snapshots).await?;
    }
    let summary = notifier.process_events(host.id).await?;
    tracing::debug!(
        host = %host.name,
        containers = snapshots.len(),
        events = summary.events,
        dispatched = summary.dispatched,
        queued = summary.queued,
        "scan complete"
    );
    Ok(snapshots.len())
}

pub fn spawn(deps: ScannerDeps, interval_secs: u64) -> tokio::task::JoinHandle<()> {
    let ScannerDeps {
        docker_repo,
        store,
        notifier,
        host,
        mut shutdown_rx,
    } = deps;

    let scanner_span =
        tracing::span!(tracing::Level::DEBUG, "scanner", host = %host.name, interval_secs);
    let task = async move {
        let mut tick = interval(Duration::from_secs(interval_secs));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    if let Err(e) = scan_once(&docker_repo, &store, &notifier, &host).await {
                        tracing::warn!(
                            error = %e,
                            operation = "scan",
                            host = %host.name,
                            "scan failed"
                        );
                    }
                }
                _ = shutdown_rx.changed() => {
                    tracing::debug!("Scanner shutting down");
                    break;
                }
            }
        }
    };
    tokio::spawn(task.instrument(scanner_span))
}
