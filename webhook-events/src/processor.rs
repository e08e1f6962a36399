//! Event processor
//!
//! Ingesters hand entries to [`Processor::write`], which enqueues them on the
//! task queue. The queue delivers each task to an [`EventHandler`] that
//! correlates the transaction with its invoice and owning app, then POSTs a
//! signed notification to the app's events webhook.
//!
//! Delivery is at-least-once: an app may see the same transaction twice.

use crate::{
    app::{AppConfigError, AppConfigStore},
    error::{Error, Result},
    event::{Event, StellarData, TransactionEvent},
    metrics::EVENTS_TOTAL,
    webhook::WebhookClient,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use history_model::{Entry, EntryKind};
use invoice_store::InvoiceStore;
use message_bus::{HandlerError, Message, MessageHandler, Submitter};
use std::sync::Arc;
use tracing::{debug, field, info, info_span, warn, Instrument, Span};

/// Enqueues entries for webhook notification
pub struct Processor {
    submitter: Arc<dyn Submitter>,
    span: Span,
}

impl std::fmt::Debug for Processor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Processor").finish_non_exhaustive()
    }
}

impl Processor {
    /// Create a processor
    ///
    /// `queue_ctor` receives the handler that will process deliveries and
    /// returns the submitter used by [`Processor::write`].
    pub fn new<F>(
        queue_ctor: F,
        invoices: InvoiceStore,
        apps: Arc<dyn AppConfigStore>,
        webhooks: Arc<dyn WebhookClient>,
        span: Span,
    ) -> Result<Self>
    where
        F: FnOnce(Arc<dyn MessageHandler>) -> message_bus::Result<Arc<dyn Submitter>>,
    {
        let handler = EventHandler::new(invoices, apps, webhooks, span.clone());
        let submitter = queue_ctor(Arc::new(handler))?;

        Ok(Self { submitter, span })
    }

    /// Enqueue an entry; returns once the queue accepted it
    pub async fn write(&self, entry: &Entry) -> Result<()> {
        let message = Message::new(Entry::TYPE_NAME, entry.to_bytes()?);
        let span = info_span!(parent: &self.span, "write", message_id = %message.id);

        self.submitter.submit(message).instrument(span).await?;
        Ok(())
    }
}

/// Why a handled entry produced no webhook call, or that it did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Delivered,
    NoMemo,
    AppNotFound,
    NoEventsUrl,
}

impl Outcome {
    fn label(self) -> &'static str {
        match self {
            Outcome::Delivered => "delivered",
            Outcome::NoMemo => "no_memo",
            Outcome::AppNotFound => "app_not_found",
            Outcome::NoEventsUrl => "no_events_url",
        }
    }
}

/// Queue handler that turns entries into webhook calls
pub struct EventHandler {
    invoices: InvoiceStore,
    apps: Arc<dyn AppConfigStore>,
    webhooks: Arc<dyn WebhookClient>,
    span: Span,
}

impl std::fmt::Debug for EventHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHandler")
            .field("invoices", &self.invoices)
            .finish_non_exhaustive()
    }
}

impl EventHandler {
    /// Create a handler; per-task spans are children of `span`
    pub fn new(
        invoices: InvoiceStore,
        apps: Arc<dyn AppConfigStore>,
        webhooks: Arc<dyn WebhookClient>,
        span: Span,
    ) -> Self {
        Self {
            invoices,
            apps,
            webhooks,
            span,
        }
    }

    async fn process(&self, message: &Message) -> Result<Outcome> {
        if message.type_name != Entry::TYPE_NAME {
            return Err(Error::UnsupportedMessage(message.type_name.clone()));
        }

        let entry = Entry::from_bytes(&message.raw_value)?;
        let tx_hash = entry.tx_hash()?;
        Span::current().record("tx_hash", STANDARD.encode(tx_hash).as_str());

        let invoice_list = match self.invoices.get_by_tx_hash(&tx_hash).await {
            Ok(invoice) => Some(invoice.canonical_bytes()?),
            Err(invoice_store::Error::NotFound) => None,
            Err(e) => return Err(e.into()),
        };

        let (stellar_event, memo) = match &entry.kind {
            EntryKind::Stellar(s) => (
                StellarData {
                    result_xdr: s.result_xdr.clone(),
                    envelope_xdr: s.envelope_xdr.clone(),
                },
                s.kin_memo()?,
            ),
        };

        let app_index = match memo {
            Some(memo) => memo.app_index(),
            None => return Ok(Outcome::NoMemo),
        };
        Span::current().record("app_index", u64::from(app_index));

        let app = match self.apps.get(app_index).await {
            Ok(app) => app,
            Err(AppConfigError::NotFound) => return Ok(Outcome::AppNotFound),
            Err(e) => return Err(e.into()),
        };

        let Some(url) = app.events_url.as_deref() else {
            return Ok(Outcome::NoEventsUrl);
        };

        let event = Event::Transaction(TransactionEvent {
            kin_version: i32::from(entry.version.tag()),
            tx_hash: tx_hash.to_vec(),
            invoice_list,
            stellar_event: Some(stellar_event),
        });
        let body = serde_json::to_vec(&[event])?;

        self.webhooks
            .events(url, &app.webhook_secret, body)
            .await?;

        info!(app = %app.app_name, "Event delivered");
        Ok(Outcome::Delivered)
    }
}

#[async_trait]
impl MessageHandler for EventHandler {
    async fn handle(&self, message: &Message) -> std::result::Result<(), HandlerError> {
        let span = info_span!(
            parent: &self.span,
            "handle",
            message_id = %message.id,
            tx_hash = field::Empty,
            app_index = field::Empty,
        );

        match self.process(message).instrument(span.clone()).await {
            Ok(outcome) => {
                EVENTS_TOTAL.with_label_values(&[outcome.label()]).inc();
                if outcome != Outcome::Delivered {
                    debug!(parent: &span, outcome = outcome.label(), "Event dropped");
                }
                Ok(())
            }
            Err(e) => {
                let transient = e.is_transient();
                EVENTS_TOTAL
                    .with_label_values(&[if transient { "retry" } else { "failed" }])
                    .inc();
                warn!(parent: &span, transient, "Failed to process entry: {}", e);
                Err(e.into())
            }
        }
    }
}
