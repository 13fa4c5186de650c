//! Visibility Client CLI
//!
//! Fetches each endpoint given on the command line through the cache and
//! prints the JSON responses to stdout.

use anyhow::{bail, Context};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use visibility_client::session::AuthState;
use visibility_client::{spawn_cleanup_task, AppContext, CachedRequestOptions, Config};

/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging (stderr)
/// 2. Load configuration from environment variables
/// 3. Build services and restore the cache snapshot
/// 4. Restore the session from persisted tokens
/// 5. Start background cache maintenance
/// 6. Fetch every endpoint, stopping early on Ctrl+C/SIGTERM
/// 7. Flush the cache snapshot
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "visibility_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let endpoints: Vec<String> = std::env::args().skip(1).collect();
    if endpoints.is_empty() {
        bail!("usage: visibility_client [ENDPOINT]...");
    }

    let config = Config::from_env();
    info!(
        "Configuration loaded: api_base_url={}, request_timeout={}s, cache_max_entries={}, cleanup_interval={}s",
        config.api_base_url, config.request_timeout, config.cache_max_entries, config.cleanup_interval
    );

    let context = AppContext::from_config(&config)
        .await
        .context("failed to initialize client")?;

    match context.auth.initialize().await {
        AuthState::Authenticated(user) => info!(user_id = %user.id, "Session restored"),
        _ => warn!("No authenticated session, protected endpoints will fail"),
    }

    let cleanup_handle = spawn_cleanup_task(
        context.cache.clone(),
        config.cleanup_interval,
        config.cache_persist_path.clone(),
    );

    let outcome = tokio::select! {
        result = fetch_all(&context, &endpoints) => result,
        _ = shutdown_signal() => {
            warn!("Interrupted, skipping remaining endpoints");
            Ok(())
        }
    };

    cleanup_handle.abort();
    match context.persist_cache().await {
        Ok(saved) if saved > 0 => info!(saved, "Cache snapshot written"),
        Ok(_) => {}
        Err(err) => warn!(error = %err, "Could not write cache snapshot"),
    }

    outcome
}

async fn fetch_all(context: &AppContext, endpoints: &[String]) -> anyhow::Result<()> {
    for endpoint in endpoints {
        let value = context
            .cached
            .cached_request(endpoint, CachedRequestOptions::default())
            .await
            .with_context(|| format!("request to {} failed", endpoint))?;
        println!("{}", serde_json::to_string_pretty(&value)?);
    }

    let stats = context.cache.stats().await;
    info!(
        hits = stats.hits,
        misses = stats.misses,
        hit_rate = stats.hit_rate(),
        "Cache stats"
    );
    Ok(())
}

/// Waits for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!(error = %err, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
