//! Event handling from queued entry to webhook call

use async_trait::async_trait;
use history_model::{
    testutil::{generate_account_id, generate_entry, generate_envelope, payment_operation},
    Entry, HashPrefix, Invoice, KinMemo, KinVersion, LineItem, TransactionType, TxHash,
};
use invoice_store::{InvoiceRecord, InvoiceStore, InvoiceTable, Page};
use message_bus::{
    HandlerError, MemoryDeadLetters, Message, MessageHandler, QueueConfig, Submitter, WorkQueue,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use stellar_xdr::curr::Memo;
use webhook_events::{
    AppConfig, AppConfigError, AppConfigStore, Event, EventHandler, MemoryAppConfigStore,
    Processor, WebhookClient, WebhookError,
};

const APP_INDEX: u16 = 7;
const EVENTS_URL: &str = "https://shop.example/events";
const SECRET: &str = "s3cret";

#[derive(Debug, Clone)]
struct Call {
    url: String,
    secret: String,
    body: Vec<u8>,
}

/// Records calls; the first `failures` calls answer 503
struct RecordingWebhooks {
    calls: Mutex<Vec<Call>>,
    failures: Mutex<u32>,
}

impl RecordingWebhooks {
    fn failing(failures: u32) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(failures),
        })
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl WebhookClient for RecordingWebhooks {
    async fn events(&self, url: &str, secret: &str, body: Vec<u8>) -> Result<(), WebhookError> {
        self.calls.lock().push(Call {
            url: url.to_string(),
            secret: secret.to_string(),
            body,
        });

        let mut failures = self.failures.lock();
        if *failures > 0 {
            *failures -= 1;
            return Err(WebhookError::Status {
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        Ok(())
    }

    async fn sign_transaction(
        &self,
        _url: &str,
        _secret: &str,
        _request: &webhook_events::SignTransactionRequest,
    ) -> Result<webhook_events::SignTransactionResponse, WebhookError> {
        unimplemented!("not used by the event handler")
    }
}

fn app(events_url: Option<&str>) -> AppConfig {
    AppConfig {
        app_name: "shop".to_string(),
        events_url: events_url.map(str::to_string),
        sign_url: None,
        webhook_secret: SECRET.to_string(),
    }
}

fn apps(config: Option<AppConfig>) -> Arc<MemoryAppConfigStore> {
    let store = MemoryAppConfigStore::new();
    if let Some(config) = config {
        store.add(APP_INDEX, config);
    }
    Arc::new(store)
}

fn entry_with_memo(memo: Memo) -> Entry {
    let source = generate_account_id();
    let destination = generate_account_id();
    let envelope = generate_envelope(
        &source,
        1,
        memo,
        vec![payment_operation(None, &destination)],
    );
    generate_entry(KinVersion::Kin3, &envelope)
}

fn app_entry() -> Entry {
    let memo = KinMemo::new(1, TransactionType::Spend, APP_INDEX, b"order-1").unwrap();
    entry_with_memo(memo.to_xdr())
}

fn invoice() -> Invoice {
    Invoice::new(vec![LineItem {
        title: "Sticker".to_string(),
        description: "Holographic".to_string(),
        amount: 150_000,
        sku: Some(b"sku-1".to_vec()),
    }])
}

fn message(entry: &Entry) -> Message {
    Message::new(Entry::TYPE_NAME, entry.to_bytes().unwrap())
}

/// App config backend that is down
struct UnavailableApps;

#[async_trait]
impl AppConfigStore for UnavailableApps {
    async fn get(&self, _app_index: u16) -> Result<AppConfig, AppConfigError> {
        Err(AppConfigError::Unavailable("connection refused".to_string()))
    }
}

/// Invoice table whose reads fail
struct UnavailableTable;

#[async_trait]
impl InvoiceTable for UnavailableTable {
    async fn put_if_absent(&self, _record: InvoiceRecord) -> invoice_store::Result<()> {
        Err(invoice_store::Error::Storage("write stalled".to_string()))
    }

    async fn get(
        &self,
        _prefix: &HashPrefix,
        _tx_hash: &TxHash,
    ) -> invoice_store::Result<Option<Vec<u8>>> {
        Err(invoice_store::Error::Storage("read stalled".to_string()))
    }

    async fn query(
        &self,
        _prefix: &HashPrefix,
        _exclusive_start: Option<TxHash>,
        _limit: usize,
    ) -> invoice_store::Result<Page> {
        Err(invoice_store::Error::Storage("read stalled".to_string()))
    }

    async fn find_by_tx_hash(
        &self,
        _tx_hash: &TxHash,
    ) -> invoice_store::Result<Option<InvoiceRecord>> {
        Err(invoice_store::Error::Storage("read stalled".to_string()))
    }
}

fn handler(
    invoices: InvoiceStore,
    apps: Arc<dyn AppConfigStore>,
    webhooks: Arc<RecordingWebhooks>,
) -> EventHandler {
    EventHandler::new(invoices, apps, webhooks, tracing::Span::none())
}

fn single_event(call: &Call) -> webhook_events::TransactionEvent {
    let events: Vec<Event> = serde_json::from_slice(&call.body).unwrap();
    assert_eq!(events.len(), 1);
    let Event::Transaction(tx) = events.into_iter().next().unwrap();
    tx
}

#[tokio::test]
async fn test_entry_without_memo_is_dropped() {
    let webhooks = RecordingWebhooks::failing(0);
    let handler = handler(
        InvoiceStore::in_memory(),
        apps(Some(app(Some(EVENTS_URL)))),
        webhooks.clone(),
    );

    let entry = entry_with_memo(Memo::None);
    handler.handle(&message(&entry)).await.unwrap();

    assert!(webhooks.calls().is_empty());
}

#[tokio::test]
async fn test_unknown_app_is_dropped() {
    let webhooks = RecordingWebhooks::failing(0);
    let handler = handler(InvoiceStore::in_memory(), apps(None), webhooks.clone());

    handler.handle(&message(&app_entry())).await.unwrap();

    assert!(webhooks.calls().is_empty());
}

#[tokio::test]
async fn test_app_without_events_url_is_dropped() {
    let webhooks = RecordingWebhooks::failing(0);
    let handler = handler(
        InvoiceStore::in_memory(),
        apps(Some(app(None))),
        webhooks.clone(),
    );

    handler.handle(&message(&app_entry())).await.unwrap();

    assert!(webhooks.calls().is_empty());
}

#[tokio::test]
async fn test_event_carries_invoice() {
    let invoices = InvoiceStore::in_memory();
    let entry = app_entry();
    let tx_hash = entry.tx_hash().unwrap();
    invoices.add(&invoice(), &tx_hash).await.unwrap();

    let webhooks = RecordingWebhooks::failing(0);
    let handler = handler(invoices, apps(Some(app(Some(EVENTS_URL)))), webhooks.clone());

    handler.handle(&message(&entry)).await.unwrap();

    let calls = webhooks.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].url, EVENTS_URL);
    assert_eq!(calls[0].secret, SECRET);

    let event = single_event(&calls[0]);
    assert_eq!(event.kin_version, 3);
    assert_eq!(event.tx_hash, tx_hash.to_vec());
    assert_eq!(
        event.invoice_list,
        Some(invoice().canonical_bytes().unwrap())
    );

    let history_model::EntryKind::Stellar(stellar) = &entry.kind;
    let data = event.stellar_event.unwrap();
    assert_eq!(data.envelope_xdr, stellar.envelope_xdr);
    assert_eq!(data.result_xdr, stellar.result_xdr);
}

#[tokio::test]
async fn test_event_without_invoice_omits_list() {
    let webhooks = RecordingWebhooks::failing(0);
    let handler = handler(
        InvoiceStore::in_memory(),
        apps(Some(app(Some(EVENTS_URL)))),
        webhooks.clone(),
    );

    handler.handle(&message(&app_entry())).await.unwrap();

    let calls = webhooks.calls();
    assert_eq!(calls.len(), 1);

    let raw: serde_json::Value = serde_json::from_slice(&calls[0].body).unwrap();
    assert!(raw[0].get("invoice_list").is_none());
    assert_eq!(single_event(&calls[0]).invoice_list, None);
}

#[tokio::test]
async fn test_wrong_type_tag_is_permanent() {
    let webhooks = RecordingWebhooks::failing(0);
    let handler = handler(
        InvoiceStore::in_memory(),
        apps(Some(app(Some(EVENTS_URL)))),
        webhooks.clone(),
    );

    let entry = app_entry();
    let msg = Message::new("history.v1.Other", entry.to_bytes().unwrap());

    let result = handler.handle(&msg).await;
    assert!(matches!(result, Err(HandlerError::Permanent(_))));
    assert!(webhooks.calls().is_empty());
}

#[tokio::test]
async fn test_garbage_payload_is_permanent() {
    let webhooks = RecordingWebhooks::failing(0);
    let handler = handler(
        InvoiceStore::in_memory(),
        apps(Some(app(Some(EVENTS_URL)))),
        webhooks.clone(),
    );

    let msg = Message::new(Entry::TYPE_NAME, vec![0xff, 0x00, 0x13]);

    let result = handler.handle(&msg).await;
    assert!(matches!(result, Err(HandlerError::Permanent(_))));
    assert!(webhooks.calls().is_empty());
}

#[tokio::test]
async fn test_webhook_outage_is_transient() {
    let webhooks = RecordingWebhooks::failing(1);
    let handler = handler(
        InvoiceStore::in_memory(),
        apps(Some(app(Some(EVENTS_URL)))),
        webhooks.clone(),
    );

    let result = handler.handle(&message(&app_entry())).await;
    assert!(matches!(result, Err(HandlerError::Transient(_))));
}

#[tokio::test]
async fn test_app_store_outage_is_transient() {
    let webhooks = RecordingWebhooks::failing(0);
    let handler = handler(
        InvoiceStore::in_memory(),
        Arc::new(UnavailableApps),
        webhooks.clone(),
    );

    let result = handler.handle(&message(&app_entry())).await;
    assert!(matches!(result, Err(HandlerError::Transient(_))));
    assert!(webhooks.calls().is_empty());
}

#[tokio::test]
async fn test_invoice_store_outage_is_transient() {
    let webhooks = RecordingWebhooks::failing(0);
    let handler = handler(
        InvoiceStore::new(Arc::new(UnavailableTable), 10),
        apps(Some(app(Some(EVENTS_URL)))),
        webhooks.clone(),
    );

    let result = handler.handle(&message(&app_entry())).await;
    assert!(matches!(result, Err(HandlerError::Transient(_))));
    assert!(webhooks.calls().is_empty());
}

#[tokio::test]
async fn test_processor_retries_through_work_queue() {
    let webhooks = RecordingWebhooks::failing(1);
    let dead_letters = Arc::new(MemoryDeadLetters::new());
    let queue_config = QueueConfig {
        initial_backoff_ms: 1,
        max_backoff_ms: 5,
        ..Default::default()
    };

    let mut started: Option<Arc<WorkQueue>> = None;
    let processor = Processor::new(
        |handler| {
            let queue = WorkQueue::start(handler, dead_letters.clone(), queue_config);
            started = Some(queue.clone());
            Ok(queue as Arc<dyn Submitter>)
        },
        InvoiceStore::in_memory(),
        apps(Some(app(Some(EVENTS_URL)))),
        webhooks.clone(),
        tracing::info_span!("test"),
    )
    .unwrap();

    let entry = app_entry();
    processor.write(&entry).await.unwrap();

    tokio::time::timeout(Duration::from_secs(5), async {
        while webhooks.calls().len() < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("webhook not retried");

    let calls = webhooks.calls();
    assert_eq!(calls[0].body, calls[1].body);
    assert_eq!(single_event(&calls[1]).tx_hash, entry.tx_hash().unwrap().to_vec());
    assert!(dead_letters.is_empty());

    if let Some(queue) = started {
        queue.shutdown().await;
    }
}
