mod config;

use config::{config_path_from_env, load_or_create_config, resolve_roots};
use library::{Library, LibraryError, LibraryStatus};
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config_path = config_path_from_env();
    let (config, created) = load_or_create_config(&config_path)?;
    if created {
        info!("Created default config at {:?}", config_path);
    } else {
        info!("Loaded config from {:?}", config_path);
    }

    let roots = resolve_roots(&config_path, &config);
    if roots.is_empty() {
        info!(
            "No library roots configured yet; add library_roots to {:?}",
            config_path
        );
    }
    let library = Library::new(roots, config.scan_options());

    let mut rebuilds = library.subscribe();
    tokio::spawn(async move {
        loop {
            match rebuilds.recv().await {
                Ok(snapshot) => info!(
                    "Library generation {} published: {} albums, {} tracks",
                    snapshot.generation(),
                    snapshot.len(),
                    snapshot.track_count()
                ),
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Missed {} library rebuild notifications", skipped)
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    match library.rescan().await {
        Ok(_) => {}
        Err(LibraryError::NoRoots) => {}
        Err(err) => error!("Initial index failed: {}", err),
    }
    if let LibraryStatus::Error(message) = library.status() {
        error!("Library unavailable: {}", message);
    }

    if config.watch_sidecars {
        if let Err(err) = library.watch(config.watch_options()) {
            warn!("Failed to start sidecar watcher: {}", err);
        }
    } else {
        info!("Sidecar watcher disabled (watch_sidecars=false)");
    }

    shutdown_signal().await;
    library.unwatch();
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = match signal(SignalKind::terminate()) {
            Ok(signal) => signal,
            Err(err) => {
                warn!("Failed to install terminate signal handler: {}", err);
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for ctrl-c: {}", err);
        }
    }

    info!("Shutdown signal received.");
}
