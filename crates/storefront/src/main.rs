//! Larder cart API: reference remote cart store.
//!
//! Serves the cart contract on port 3100 by default, with carts held in
//! memory. Set `CART_API_TOKEN` to require a bearer token.

#![cfg_attr(not(test), forbid(unsafe_code))]

use larder_storefront::config::CartApiConfig;
use larder_storefront::state::AppState;
use sentry::integrations::tracing::{self as sentry_tracing, EventFilter};
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_LOG_FILTER: &str = "larder_storefront=info,larder_cart_api=info,tower_http=debug";

/// Start reporting to Sentry when `SENTRY_DSN` is set.
///
/// Events are sent until the returned guard is dropped.
fn init_sentry(config: &CartApiConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_deref()?;
    let options = sentry::ClientOptions {
        release: sentry::release_name!(),
        environment: config.sentry_environment.clone().map(Into::into),
        traces_sample_rate: config.sentry_traces_sample_rate,
        attach_stacktrace: true,
        ..Default::default()
    };

    let guard = sentry::init((dsn, options));
    sentry::configure_scope(|scope| scope.set_tag("service", "cart-api"));
    tracing::info!("Reporting cart API errors to Sentry");
    Some(guard)
}

/// Cart store failures become Sentry events; request traces become
/// breadcrumbs on them.
fn sentry_level_filter(metadata: &tracing::Metadata<'_>) -> EventFilter {
    match *metadata.level() {
        Level::ERROR => EventFilter::Event,
        Level::WARN | Level::INFO => EventFilter::Breadcrumb,
        Level::DEBUG | Level::TRACE => EventFilter::Ignore,
    }
}

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer().event_filter(sentry_level_filter))
        .init();
}

#[tokio::main]
async fn main() {
    let config = CartApiConfig::from_env().expect("Failed to load cart API configuration");

    // The Sentry client has to exist before the tracing layer forwards to it.
    let _sentry = init_sentry(&config);
    init_tracing();

    if config.api_token.is_none() {
        tracing::warn!("CART_API_TOKEN is not set; cart routes are open");
    }

    let addr = config.socket_addr();
    let app = larder_storefront::app(AppState::new(config))
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction());

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind cart API address");
    tracing::info!(%addr, "Cart API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let signal = stop_requested().await;
            tracing::info!(signal, "Draining cart API connections");
        })
        .await
        .expect("Cart API server failed");
}

/// Resolve with the name of the first stop signal received.
async fn stop_requested() -> &'static str {
    tokio::select! {
        () = ctrl_c_received() => "Ctrl+C",
        () = sigterm_received() => "SIGTERM",
    }
}

async fn ctrl_c_received() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Cannot listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
}

#[cfg(unix)]
async fn sigterm_received() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            tracing::warn!(error = %e, "Cannot listen for SIGTERM");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn sigterm_received() {
    std::future::pending::<()>().await;
}
