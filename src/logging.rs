use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Exports the variables of each existing file, first file first. Variables
/// already set are left alone. Call before [`init_tracing`] so a `RUST_LOG`
/// from these files is honored.
pub fn load_env_files(files: &[&str]) {
    for file in files {
        // Missing files are fine; every key can come from the real environment.
        dotenvy::from_filename(file).ok();
    }
}

/// Installs the global subscriber: `RUST_LOG` filter, or `default_filter` when unset.
pub fn init_tracing(default_filter: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
