//! Webhook events worker
//!
//! Consumes entry tasks from NATS JetStream and calls app webhooks.

use anyhow::Context;
use invoice_store::InvoiceStore;
use message_bus::{JetStreamConsumer, JetStreamDeadLetters, NatsClient};
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use webhook_events::{EventHandler, HttpWebhookClient, ServiceConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    info!("Starting webhook events worker");

    let config = ServiceConfig::load().context("failed to load configuration")?;
    info!(
        nats = %config.nats.url,
        consumer = %config.subscriber.durable_name,
        apps = config.apps.len(),
        "Configuration loaded"
    );

    let invoices = InvoiceStore::open(&config.invoices).context("failed to open invoice store")?;
    let webhooks = HttpWebhookClient::new(&config.webhook).context("failed to build webhook client")?;
    let handler = Arc::new(EventHandler::new(
        invoices,
        Arc::new(config.app_store()),
        Arc::new(webhooks),
        tracing::info_span!("webhook_events"),
    ));

    let client = NatsClient::connect(config.nats.clone())
        .await
        .context("failed to connect to NATS")?;
    let dead_letters = Arc::new(JetStreamDeadLetters::new(client.jetstream().clone()));
    let consumer = JetStreamConsumer::new(client, config.subscriber.clone());

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received shutdown signal"),
            Err(e) => error!("Unable to listen for shutdown signal: {}", e),
        }
        shutdown.cancel();
    });

    consumer
        .run(handler, dead_letters, cancel)
        .await
        .context("consumer failed")?;

    info!("Webhook events worker stopped");
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT").map(|f| f == "json").unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}
