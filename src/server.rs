//! Application wiring: clients, stores, routes and the listener.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::middleware;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::billing::postgrest::PostgrestStore;
use crate::billing::reconciler::Reconciler;
use crate::config::AppConfig;
use crate::error::Result;
use crate::handlers::status::{status_router, track_latency, StatusState};
use crate::stripe::client::StripeClient;
use crate::stripe::handler::{stripe_webhook_router, StripeWebhookState, WEBHOOK_PATH};
use crate::stripe::processor::SubscriptionHandler;

/// Combine the webhook and status routes behind tracing and latency tracking
pub fn router<H: SubscriptionHandler>(
    webhook: Arc<StripeWebhookState<H>>,
    status: Arc<StatusState>,
) -> Router {
    Router::new()
        .merge(stripe_webhook_router(webhook))
        .merge(status_router(status.clone()))
        .layer(middleware::from_fn_with_state(status, track_latency))
        .layer(TraceLayer::new_for_http())
}

/// Build the production application from configuration
pub fn build_app(config: &AppConfig) -> Result<Router> {
    let provider = Arc::new(StripeClient::new(
        config.stripe.secret_key.clone(),
        config.stripe.api_base.clone(),
        config.http_timeout,
    )?);
    let store = Arc::new(PostgrestStore::new(&config.store, config.http_timeout)?);

    let reconciler = Arc::new(Reconciler::new(store.clone(), store, provider));
    let webhook = Arc::new(StripeWebhookState::new(&config.stripe, reconciler));

    Ok(router(webhook, Arc::new(StatusState::new())))
}

/// Bind and serve until the process is stopped
pub async fn serve(config: &AppConfig, addr: SocketAddr) -> Result<()> {
    let app = build_app(config)?;
    let listener = TcpListener::bind(addr).await?;

    info!(
        address = %listener.local_addr()?,
        webhook_path = WEBHOOK_PATH,
        "billing-sync listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("billing-sync stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Could not listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
