mod config;
mod routes;
mod watch;

use anyhow::Context;
use axum::http::HeaderValue;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::Settings;
use crate::routes::AppState;
use crate::watch::{InboxWatcher, WatcherHandle};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("teller_server=info,teller_engine=info,teller_storage=info")
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::load()?;

    if let Some(parent) = settings.db_path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let pool = teller_storage::create_db(&settings.db_path)
        .await
        .with_context(|| format!("opening database at {}", settings.db_path.display()))?;

    let origin: HeaderValue = settings
        .allowed_origin
        .parse()
        .with_context(|| format!("invalid allowed origin '{}'", settings.allowed_origin))?;

    let (watcher, handle) = if settings.watch {
        tokio::fs::create_dir_all(&settings.inbox_dir)
            .await
            .with_context(|| format!("creating {}", settings.inbox_dir.display()))?;
        let watcher = InboxWatcher::spawn(settings.inbox_dir.clone(), pool.clone())
            .context("starting inbox watcher")?;
        let handle = watcher.handle();
        (Some(watcher), handle)
    } else {
        (None, WatcherHandle::disabled(settings.inbox_dir.clone()))
    };

    let app = routes::router(AppState { pool, watcher: handle }, origin);

    let listener = tokio::net::TcpListener::bind(settings.addr)
        .await
        .with_context(|| format!("binding {}", settings.addr))?;
    tracing::info!(addr = %settings.addr, "teller listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    if let Some(watcher) = watcher {
        watcher.stop();
    }
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
