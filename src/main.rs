//! Cobranza service entry point.
//!
//! Loads configuration, wires the storage backend chosen at startup into
//! the billing router, and serves.

use std::sync::Arc;

use secrecy::SecretString;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use cobranza::adapters::http::billing::{billing_router, BillingAppState, RedirectPages};
use cobranza::adapters::memory::{
    InMemoryInvoiceRepository, InMemoryPaymentRepository, InMemoryPlanRepository,
    InMemorySubscriptionRepository, InMemoryWebhookEventRepository,
};
use cobranza::adapters::mercadopago::{MercadoPagoAdapter, MercadoPagoConfig};
use cobranza::adapters::postgres::{
    PostgresInvoiceRepository, PostgresPaymentRepository, PostgresPlanRepository,
    PostgresSubscriptionRepository, PostgresWebhookEventRepository,
};
use cobranza::config::{AppConfig, StorageBackend};
use cobranza::domain::billing::WebhookSignatureVerifier;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::load()?;
    config.validate()?;

    let provider = Arc::new(MercadoPagoAdapter::new(MercadoPagoConfig::new(
        config.payment.access_token.clone(),
    )));
    let verifier = Arc::new(WebhookSignatureVerifier::new(
        config
            .payment
            .webhook_secret
            .clone()
            .map(SecretString::new),
        config.is_production(),
    ));
    let redirect_pages = RedirectPages {
        success: config.payment.success_url.clone(),
        pending: config.payment.pending_url.clone(),
        failure: config.payment.failure_url.clone(),
    };

    // The storage backend is chosen exactly once, here.
    let state = match config.database.backend {
        StorageBackend::Postgres => {
            let url = config
                .database
                .url
                .as_deref()
                .expect("validated: postgres backend has a URL");
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(config.database.max_connections)
                .connect(url)
                .await?;
            sqlx::migrate!("./migrations").run(&pool).await?;
            tracing::info!("storage backend: postgres");

            BillingAppState {
                plans: Arc::new(PostgresPlanRepository::new(pool.clone())),
                subscriptions: Arc::new(PostgresSubscriptionRepository::new(pool.clone())),
                payments: Arc::new(PostgresPaymentRepository::new(pool.clone())),
                invoices: Arc::new(PostgresInvoiceRepository::new(pool.clone())),
                webhook_events: Arc::new(PostgresWebhookEventRepository::new(pool)),
                provider,
                verifier,
                webhook_token: config.payment.webhook_token.clone(),
                redirect_pages,
            }
        }
        StorageBackend::Memory => {
            tracing::warn!("storage backend: memory (non-durable, development only)");
            BillingAppState {
                plans: Arc::new(InMemoryPlanRepository::new()),
                subscriptions: Arc::new(InMemorySubscriptionRepository::new()),
                payments: Arc::new(InMemoryPaymentRepository::new()),
                invoices: Arc::new(InMemoryInvoiceRepository::new()),
                webhook_events: Arc::new(InMemoryWebhookEventRepository::new()),
                provider,
                verifier,
                webhook_token: config.payment.webhook_token.clone(),
                redirect_pages,
            }
        }
    };

    let app = billing_router()
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    let addr = config.server.socket_addr();
    tracing::info!(%addr, "cobranza listening");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
