use anyhow::Result;
use profile_gateway::{
    build_avatar_locator, router, AccountStore, AppState, BasicAuthenticator, Config,
    InMemoryAccountStore, ProfileService, RateLimiters,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,profile_gateway=debug"));
    fmt().with_env_filter(env_filter).with_target(true).init();

    let config = Config::from_env()?;
    info!(
        "Avatar references: {:?}, CDN {:?}",
        config.avatar.mode, config.avatar.cdn
    );

    let records = InMemoryAccountStore::load_records(&config.accounts_file)?;
    let store = InMemoryAccountStore::from_records(&records);
    let account_count = store.len();
    let accounts: Arc<dyn AccountStore> = Arc::new(store);
    let authenticator = Arc::new(BasicAuthenticator::from_records(
        &records,
        accounts.clone(),
        config.lookup_timeout,
    ));

    let rate_limiters = RateLimiters::from_config(&config.rate_limits);
    let profiles = Arc::new(ProfileService::new(
        rate_limiters.clone(),
        accounts,
        build_avatar_locator(&config.avatar),
        config.lookup_timeout,
    ));

    // Create task tracker and cancellation token for coordinated shutdown
    let cancellation_token = CancellationToken::new();
    let task_tracker = TaskTracker::new();

    // Periodically drop limiter state for idle callers
    let cleanup_token = cancellation_token.clone();
    let cleanup_interval = config.limiter_cleanup_interval;
    task_tracker.spawn(async move {
        loop {
            tokio::select! {
                _ = cleanup_token.cancelled() => {
                    info!("Rate limiter cleanup cancelled, exiting");
                    break;
                }
                _ = tokio::time::sleep(cleanup_interval) => {
                    rate_limiters.retain_recent();
                }
            }
        }
    });

    // Periodically log lookup outcomes
    let metrics_token = cancellation_token.clone();
    let metrics_profiles = profiles.clone();
    task_tracker.spawn(async move {
        loop {
            tokio::select! {
                _ = metrics_token.cancelled() => {
                    info!("Metrics logger cancelled, exiting");
                    break;
                }
                _ = tokio::time::sleep(Duration::from_secs(300)) => {
                    let m = metrics_profiles.metrics();
                    info!(
                        "Profile lookups: served={} unauthenticated={} rate_limited={} missing={} disabled={} storage_failures={}",
                        m.total_served,
                        m.total_unauthenticated,
                        m.total_rate_limited,
                        m.total_target_missing,
                        m.total_target_disabled,
                        m.total_storage_failures
                    );
                }
            }
        }
    });

    let app = router(AppState {
        authenticator,
        profiles,
    });

    let addr: SocketAddr = config.bind_addr;
    println!("\nProfile gateway starting");
    println!("HTTP: http://{addr}/v1/profile/{{identifier}}");
    println!("\nConfiguration:");
    println!(
        "- Accounts: {} ({} accounts)",
        config.accounts_file.display(),
        account_count
    );
    println!(
        "- Profile rate limit: bucket {} / leak {} per minute",
        config.rate_limits.profile.bucket_size, config.rate_limits.profile.leak_rate_per_minute
    );
    println!("- Lookup timeout: {:?}", config.lookup_timeout);

    // Handle shutdown signal
    let shutdown_token = cancellation_token.clone();
    let shutdown_signal = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
        }
        info!("Shutdown signal received, stopping services...");
        shutdown_token.cancel();
    };

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    info!("Server stopped, shutting down background tasks...");
    cancellation_token.cancel();
    task_tracker.close();

    match tokio::time::timeout(Duration::from_secs(30), task_tracker.wait()).await {
        Ok(()) => info!("All background tasks completed successfully"),
        Err(_) => {
            error!("Timeout waiting for background tasks to complete");
            std::process::exit(1);
        }
    }

    info!("Clean shutdown complete");

    Ok(())
}
