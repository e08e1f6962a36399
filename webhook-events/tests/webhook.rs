//! HttpWebhookClient against a mock app server

use serde_json::json;
use webhook_events::{
    sign_body, HttpWebhookClient, InvoiceError, SignTransactionRequest, SignTransactionResponse,
    WebhookClient, WebhookConfig, WebhookError, HMAC_HEADER,
};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SECRET: &str = "s3cret";

fn client() -> HttpWebhookClient {
    HttpWebhookClient::new(&WebhookConfig { timeout_ms: 2_000 }).unwrap()
}

#[tokio::test]
async fn test_events_are_signed() {
    let server = MockServer::start().await;
    let body = br#"[{"kin_version":3,"tx_hash":"AQID"}]"#.to_vec();
    let signature = sign_body(SECRET, &body).unwrap();

    Mock::given(method("POST"))
        .and(path("/events"))
        .and(header(HMAC_HEADER, signature.as_str()))
        .and(header("content-type", "application/json"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let url = format!("{}/events", server.uri());
    client().events(&url, SECRET, body.clone()).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].body, body);
}

#[tokio::test]
async fn test_events_server_error_is_transient() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/events"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(1)
        .mount(&server)
        .await;

    let url = format!("{}/events", server.uri());
    let err = client().events(&url, SECRET, b"[]".to_vec()).await.unwrap_err();

    assert_eq!(
        err,
        WebhookError::Status {
            status: 500,
            body: "boom".to_string()
        }
    );
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_events_client_error_is_permanent() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/events"))
        .respond_with(ResponseTemplate::new(400))
        .mount(&server)
        .await;

    let url = format!("{}/events", server.uri());
    let err = client().events(&url, SECRET, b"[]".to_vec()).await.unwrap_err();

    assert!(!err.is_transient());
}

#[tokio::test]
async fn test_unreachable_app_is_transient() {
    // Nothing listens on the discard port
    let err = client()
        .events("http://127.0.0.1:9/events", SECRET, b"[]".to_vec())
        .await
        .unwrap_err();

    assert!(matches!(err, WebhookError::Request(_)));
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_sign_transaction_approved() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/sign_transaction"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "envelope_xdr": "BAUG"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let request = SignTransactionRequest {
        envelope_xdr: vec![1, 2, 3],
        invoice_list: Some(vec![9]),
    };
    let url = format!("{}/sign_transaction", server.uri());
    let response = client().sign_transaction(&url, SECRET, &request).await.unwrap();

    assert_eq!(
        response,
        SignTransactionResponse::Approved {
            envelope_xdr: Some(vec![4, 5, 6])
        }
    );

    let requests = server.received_requests().await.unwrap();
    let sent: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(sent, json!({"envelope_xdr": "AQID", "invoice_list": "CQ=="}));
}

#[tokio::test]
async fn test_sign_transaction_rejected() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/sign_transaction"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "invoice_errors": [{"operation_index": 0, "reason": "sku_not_found"}]
        })))
        .mount(&server)
        .await;

    let request = SignTransactionRequest {
        envelope_xdr: vec![1],
        invoice_list: None,
    };
    let url = format!("{}/sign_transaction", server.uri());
    let response = client().sign_transaction(&url, SECRET, &request).await.unwrap();

    assert_eq!(
        response,
        SignTransactionResponse::Rejected {
            invoice_errors: vec![InvoiceError {
                operation_index: 0,
                reason: "sku_not_found".to_string(),
            }]
        }
    );
}
