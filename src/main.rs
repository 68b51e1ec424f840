use anyhow::Result;
use census::notify::{BaselineCollector, NotificationService};
use census::store::{SqliteStore, Store};
use census::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter)
        .init();

    let app_config = config::AppConfig::load()?;

    let store = Arc::new(
        SqliteStore::connect(&app_config.database.path, app_config.database.max_pool_size).await?,
    );
    store.init().await?;
    if store.initialize_default_notifications().await? {
        tracing::info!("Seeded default notification channel and rules");
    }
    let dyn_store: Arc<dyn Store> = store.clone();

    let baseline = Arc::new(BaselineCollector::new(
        dyn_store.clone(),
        &app_config.baseline,
    ));
    let notifier = Arc::new(NotificationService::new(
        dyn_store,
        baseline.clone(),
        &app_config.notifications,
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut handles = vec![
        notifier.clone().spawn_batch_flusher(shutdown_rx.clone()),
        baseline.spawn_periodic_updates(
            Duration::from_secs(app_config.baseline.update_interval_secs),
            shutdown_rx.clone(),
        ),
        maintenance_worker::spawn(
            store.clone(),
            maintenance_worker::MaintenanceConfig::from(&app_config.database),
            shutdown_rx.clone(),
        ),
    ];

    if app_config.scanner.enabled {
        match start_scanner(&app_config, &store, &notifier, shutdown_rx.clone()).await {
            Ok(handle) => handles.push(handle),
            Err(e) => tracing::warn!(error = %e, "Docker unavailable; local scanner disabled"),
        }
    }

    let app = routes::app(store.clone(), notifier.clone());
    let addr = format!("{}:{}", app_config.server.host, app_config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on http://{}", addr);

    let in_container = std::path::Path::new("/.dockerenv").exists()
        || std::env::var("CONTAINER").as_deref() == Ok("1");

    if in_container {
        // In Docker: run server until error or SIGTERM (no signal handler; avoids immediate exit)
        axum::serve(listener, app).await?;
    } else {
        tokio::select! {
            result = axum::serve(listener, app) => {
                result?;
            }
            _ = async {
                #[cfg(unix)]
                {
                    let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                        Ok(s) => s,
                        Err(_) => {
                            let _ = tokio::signal::ctrl_c().await;
                            return;
                        }
                    };
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => {}
                        _ = sigterm.recv() => {}
                    }
                }
                #[cfg(not(unix))]
                {
                    let _ = tokio::signal::ctrl_c().await;
                }
            } => {
                tracing::info!("Received shutdown signal");
                let _ = shutdown_tx.send(true);
                for handle in handles {
                    let _ = handle.await;
                }
            }
        }
    }

    Ok(())
}

/// Registers the local Docker host and starts its scan loop.
async fn start_scanner(
    app_config: &config::AppConfig,
    store: &Arc<SqliteStore>,
    notifier: &Arc<NotificationService>,
    shutdown_rx: watch::Receiver<bool>,
) -> Result<tokio::task::JoinHandle<()>> {
    let docker_repo = Arc::new(docker_repo::DockerRepo::connect()?);
    docker_repo.ping().await?;
    let host = store.upsert_host(&app_config.scanner.host_name, true).await?;
    tracing::info!(host = %host.name, host_id = host.id, "Local Docker host registered");

    Ok(scanner::spawn(
        scanner::ScannerDeps {
            docker_repo,
            store: store.clone(),
            notifier: notifier.clone(),
            host,
            shutdown_rx,
        },
        app_config.scanner.interval_secs,
    ))
}
