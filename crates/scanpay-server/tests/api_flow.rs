//! End-to-end API tests against the in-memory store.
//!
//! The router is driven with `oneshot` requests and a manual clock, so the
//! expiry windows can be crossed without sleeping.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use scanpay_server::auth::TokenIssuer;
use scanpay_server::clock::{Clock, ManualClock};
use scanpay_server::services::TopUpPolicy;
use scanpay_server::store::{DeviceStore, InvoiceStore, LedgerStore, MemoryStore};
use scanpay_server::{create_router, AppState};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

struct TestApp {
    app: Router,
    state: AppState,
    store: MemoryStore,
    clock: ManualClock,
}

impl TestApp {
    fn new() -> Self {
        let clock = ManualClock::new(Utc::now());
        let (signing_key, _) = scanpay_crypto::generate_keypair();
        let store = MemoryStore::new();
        let state = AppState::new(
            Arc::new(store.clone()),
            Arc::new(clock.clone()),
            TokenIssuer::new(signing_key, 900),
            TopUpPolicy::default(),
        );
        Self {
            app: create_router(state.clone()),
            state,
            store,
            clock,
        }
    }

    fn bearer(&self, account: Uuid) -> String {
        self.state
            .tokens
            .issue_access_token(account, self.clock.now(), 86_400)
            .unwrap()
    }

    async fn send(
        &self,
        method: &str,
        uri: &str,
        account: Option<Uuid>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(account) = account {
            builder = builder.header("Authorization", format!("Bearer {}", self.bearer(account)));
        }
        let request = match body {
            Some(body) => builder
                .header("Content-Type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    /// Registers a device and returns its polling secret.
    async fn register_device(&self, owner: Uuid, device_id: &str) -> String {
        let (status, body) = self
            .send("POST", "/api/devices/", Some(owner), Some(json!({ "device_id": device_id })))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["secret"].as_str().unwrap().to_string()
    }

    /// Creates an invoice and returns `(public_id, link token)`.
    async fn create_invoice(
        &self,
        owner: Uuid,
        device_id: &str,
        amount: &str,
        duration_sec: i64,
    ) -> (String, String) {
        let (status, body) = self
            .send(
                "POST",
                "/api/invoices/",
                Some(owner),
                Some(json!({
                    "amount": amount,
                    "description": "Sim payment",
                    "device_id": device_id,
                    "duration_sec": duration_sec
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        (
            body["public_id"].as_str().unwrap().to_string(),
            body["token"].as_str().unwrap().to_string(),
        )
    }
}

#[tokio::test]
async fn test_health() {
    let t = TestApp::new();
    let (status, body) = t.send("GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_create_invoice_response() {
    let t = TestApp::new();
    let merchant = Uuid::new_v4();
    t.register_device(merchant, "DEV001").await;

    let (status, body) = t
        .send(
            "POST",
            "/api/invoices/",
            Some(merchant),
            Some(json!({ "amount": 5, "device_id": "DEV001", "duration_sec": 240 })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["amount"], "5.00");
    assert_eq!(body["status"], "PENDING");
    assert_eq!(body["description"], "");
    assert!(body["paid_reference"].is_null());

    let public_id = body["public_id"].as_str().unwrap();
    assert!(public_id.starts_with("pay_"));
    let token = body["token"].as_str().unwrap();
    assert_eq!(body["pay_url"], format!("/pay/{}?t={}", public_id, token));
    assert!(body.get("owner_id").is_none());

    let (status, _) = t
        .send(
            "POST",
            "/api/invoices/",
            None,
            Some(json!({ "amount": "5.00", "device_id": "DEV001", "duration_sec": 240 })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = t
        .send(
            "POST",
            "/api/invoices/",
            Some(merchant),
            Some(json!({ "amount": "5.00", "device_id": "DEV001", "duration_sec": 0 })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().unwrap().contains("duration_sec"));
}

#[tokio::test]
async fn test_insufficient_balance_then_topup_then_pay() {
    let t = TestApp::new();
    let merchant = Uuid::new_v4();
    let payer = Uuid::new_v4();
    t.register_device(merchant, "DEV001").await;
    let (public_id, _) = t.create_invoice(merchant, "DEV001", "13.50", 300).await;

    let (status, body) = t
        .send("POST", "/api/wallet/topup/", Some(payer), Some(json!({ "preset": 10 })))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["balance"], "10.00");
    assert_eq!(body["topup_amount"], "10.00");

    let pay = json!({ "invoice_public_id": public_id });
    let (status, body) = t
        .send("POST", "/api/wallet/pay/", Some(payer), Some(pay.clone()))
        .await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert!(body["detail"].as_str().unwrap().contains("13.50"));

    let (_, wallet) = t.send("GET", "/api/wallet/me/", Some(payer), None).await;
    assert_eq!(wallet["balance"], "10.00");
    assert_eq!(wallet["transactions"].as_array().unwrap().len(), 1);

    let (status, body) = t
        .send("POST", "/api/wallet/topup/", Some(payer), Some(json!({ "amount": "5.00" })))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["balance"], "15.00");

    let (status, body) = t
        .send("POST", "/api/wallet/pay/", Some(payer), Some(pay.clone()))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["status"], "PAID");
    assert_eq!(body["new_balance"], "1.50");
    let paid_reference = body["paid_reference"].as_str().unwrap().to_string();

    let (_, wallet) = t.send("GET", "/api/wallet/me/", Some(payer), None).await;
    assert_eq!(wallet["balance"], "1.50");
    let transactions = wallet["transactions"].as_array().unwrap();
    assert_eq!(transactions.len(), 3);
    assert_eq!(transactions[0]["tx_type"], "PAYMENT");
    assert_eq!(transactions[0]["amount"], "13.50");
    assert_eq!(transactions[0]["reference"], paid_reference.as_str());
    assert_eq!(transactions[0]["invoice_public_id"], public_id.as_str());

    let (_, status_view) = t
        .send("GET", &format!("/api/invoices/{}/status/", public_id), None, None)
        .await;
    assert_eq!(status_view["status"], "PAID");
    assert_eq!(status_view["paid_reference"], paid_reference.as_str());

    // Settled once; every further attempt is rejected without touching the wallet.
    let (status, _) = t
        .send("POST", "/api/wallet/pay/", Some(payer), Some(pay.clone()))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    let (status, _) = t.send("POST", "/api/pay/guest/", None, Some(pay)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, wallet) = t.send("GET", "/api/wallet/me/", Some(payer), None).await;
    assert_eq!(wallet["balance"], "1.50");
}

#[tokio::test]
async fn test_invoice_expiry_is_read_time() {
    let t = TestApp::new();
    let merchant = Uuid::new_v4();
    t.register_device(merchant, "DEV001").await;
    let (public_id, token) = t.create_invoice(merchant, "DEV001", "5.00", 240).await;

    let uri = format!("/api/invoices/{}/?t={}", public_id, token);
    let (status, body) = t.send("GET", &uri, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "PENDING");

    t.clock.advance(Duration::seconds(239));
    let (_, latest) = t
        .send("GET", "/api/device/DEV001/latest-invoice/?only_pending=1", None, None)
        .await;
    assert_eq!(latest["has_invoice"], true);
    assert_eq!(latest["invoice"]["public_id"], public_id.as_str());

    t.clock.advance(Duration::seconds(1));

    let (status, body) = t.send("GET", &uri, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "EXPIRED");

    let (status, body) = t
        .send(
            "POST",
            "/api/pay/guest/",
            None,
            Some(json!({ "invoice_public_id": public_id, "guest_name": "Ana" })),
        )
        .await;
    assert_eq!(status, StatusCode::GONE, "{body}");

    let (_, latest) = t
        .send("GET", "/api/device/DEV001/latest-invoice/?only_pending=1", None, None)
        .await;
    assert_eq!(latest["has_invoice"], false);
    assert!(latest.get("invoice").is_none());

    let (_, latest) = t
        .send("GET", "/api/device/DEV001/latest-invoice/", None, None)
        .await;
    assert_eq!(latest["has_invoice"], true);
    assert_eq!(latest["invoice"]["status"], "EXPIRED");
    assert!(latest["pay_url"].as_str().unwrap().starts_with("/pay/"));
}

#[tokio::test]
async fn test_link_token_is_required_and_scoped() {
    let t = TestApp::new();
    let merchant = Uuid::new_v4();
    t.register_device(merchant, "DEV001").await;
    let (first, first_token) = t.create_invoice(merchant, "DEV001", "1.00", 3600).await;
    let (second, _) = t.create_invoice(merchant, "DEV001", "2.00", 3600).await;

    let (status, _) = t
        .send("GET", &format!("/api/invoices/{}/", first), None, None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = t
        .send("GET", &format!("/api/invoices/{}/?t={}", second, first_token), None, None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Link tokens lapse after their lifetime even if the invoice has not.
    t.clock.advance(Duration::seconds(901));
    let (status, _) = t
        .send("GET", &format!("/api/invoices/{}/?t={}", first, first_token), None, None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let unknown_token = t
        .state
        .tokens
        .issue_link_token("pay_UNKNOWN", t.clock.now())
        .unwrap();
    let (status, _) = t
        .send("GET", &format!("/api/invoices/pay_UNKNOWN/?t={}", unknown_token), None, None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = t
        .send("GET", "/api/invoices/pay_UNKNOWN/status/", None, None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_guest_pay_feeds_device_command_queue() {
    let t = TestApp::new();
    let merchant = Uuid::new_v4();
    let secret = t.register_device(merchant, "DEV001").await;
    let (public_id, _) = t.create_invoice(merchant, "DEV001", "3.00", 120).await;

    let next_uri = format!("/api/device/DEV001/next/?secret={}", secret);
    let (status, body) = t.send("GET", &next_uri, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "has_command": false }));

    let (status, body) = t
        .send(
            "POST",
            "/api/pay/guest/",
            None,
            Some(json!({ "invoice_public_id": public_id })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "PAID");
    assert!(body["paid_reference"].as_str().unwrap().starts_with("GUEST-"));

    let (_, command) = t.send("GET", &next_uri, None, None).await;
    assert_eq!(command["has_command"], true);
    assert_eq!(command["action"], 1);
    assert_eq!(command["duration_sec"], 120);
    let command_id = command["command_id"].as_i64().unwrap();

    let (_, again) = t.send("GET", &next_uri, None, None).await;
    assert_eq!(again["has_command"], false);

    let (status, body) = t
        .send(
            "POST",
            "/api/device/DEV001/ack/",
            None,
            Some(json!({ "secret": secret, "command_id": command_id })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);

    let (status, _) = t
        .send("GET", "/api/device/DEV001/next/?secret=wrong", None, None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = t
        .send(
            "POST",
            "/api/device/DEV001/ack/",
            None,
            Some(json!({ "secret": secret, "command_id": command_id + 1 })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, devices) = t.send("GET", "/api/devices/", Some(merchant), None).await;
    assert!(!devices[0]["last_seen"].is_null());
}

#[tokio::test]
async fn test_device_registry_scoping() {
    let t = TestApp::new();
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();

    let (status, _) = t.send("GET", "/api/devices/", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = t
        .send("POST", "/api/devices/", Some(alice), Some(json!({ "device_id": "DEV001" })))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["device_id"], "DEV001");
    assert_eq!(body["is_active"], true);
    assert_eq!(body["secret"].as_str().unwrap().len(), 32);
    assert!(body.get("secret_hash").is_none());

    let (status, _) = t
        .send("POST", "/api/devices/", Some(bob), Some(json!({ "device_id": "DEV001" })))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = t
        .send("POST", "/api/devices/", Some(bob), Some(json!({ "device_id": "bad id" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = t
        .send(
            "POST",
            "/api/invoices/",
            Some(bob),
            Some(json!({ "amount": "1.00", "device_id": "DEV001", "duration_sec": 60 })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (public_id, _) = t.create_invoice(alice, "DEV001", "1.00", 60).await;

    let (_, listed) = t.send("GET", "/api/devices/", Some(alice), None).await;
    assert_eq!(listed.as_array().unwrap().len(), 1);
    let (_, listed) = t.send("GET", "/api/devices/", Some(bob), None).await;
    assert!(listed.as_array().unwrap().is_empty());

    let (status, _) = t.send("DELETE", "/api/devices/DEV001/", Some(bob), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, body) = t.send("DELETE", "/api/devices/DEV001/", Some(alice), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(body.is_null());
    let (status, _) = t.send("DELETE", "/api/devices/DEV001/", Some(alice), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Invoice history survives the device.
    let (status, body) = t
        .send("GET", &format!("/api/invoices/{}/status/", public_id), None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["device_id"], "DEV001");
}

#[tokio::test]
async fn test_topup_validation() {
    let t = TestApp::new();
    let payer = Uuid::new_v4();

    for body in [
        json!({ "preset": 3 }),
        json!({ "amount": "0.001" }),
        json!({ "amount": "-5" }),
        json!({ "amount": "600.00" }),
        json!({ "amount": "ten" }),
        json!({}),
    ] {
        let (status, response) = t
            .send("POST", "/api/wallet/topup/", Some(payer), Some(body.clone()))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{body} -> {response}");
    }

    let (status, body) = t
        .send(
            "POST",
            "/api/wallet/topup/",
            Some(payer),
            Some(json!({ "preset": 50, "amount": "abc" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["balance"], "50.00");
    assert!(body["reference"].as_str().unwrap().starts_with("TOPUP-"));

    let (_, wallet) = t.send("GET", "/api/wallet/me/", Some(payer), None).await;
    assert_eq!(wallet["balance"], "50.00");
    assert_eq!(wallet["transactions"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_oversized_amounts_are_client_errors() {
    let t = TestApp::new();
    let merchant = Uuid::new_v4();
    let payer = Uuid::new_v4();
    t.register_device(merchant, "DEV001").await;

    for amount in ["10000000000.00", "100000000000000000000", "1e9999", "1e999999999"] {
        let (status, body) = t
            .send(
                "POST",
                "/api/invoices/",
                Some(merchant),
                Some(json!({ "amount": amount, "device_id": "DEV001", "duration_sec": 60 })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{amount} -> {body}");

        let (status, body) = t
            .send("POST", "/api/wallet/topup/", Some(payer), Some(json!({ "amount": amount })))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{amount} -> {body}");
    }

    let (_, latest) = t
        .send("GET", "/api/device/DEV001/latest-invoice/", None, None)
        .await;
    assert_eq!(latest["has_invoice"], false);
}

#[tokio::test]
async fn test_zero_balances_render_two_decimals() {
    let t = TestApp::new();
    let merchant = Uuid::new_v4();
    let payer = Uuid::new_v4();
    t.register_device(merchant, "DEV001").await;

    let (status, wallet) = t.send("GET", "/api/wallet/me/", Some(payer), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(wallet["balance"], "0.00");

    let (status, _) = t
        .send("POST", "/api/wallet/topup/", Some(payer), Some(json!({ "preset": 5 })))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let (public_id, _) = t.create_invoice(merchant, "DEV001", "5", 300).await;

    let (status, body) = t
        .send(
            "POST",
            "/api/wallet/pay/",
            Some(payer),
            Some(json!({ "invoice_public_id": public_id })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["new_balance"], "0.00");

    let (_, wallet) = t.send("GET", "/api/wallet/me/", Some(payer), None).await;
    assert_eq!(wallet["balance"], "0.00");
    for tx in wallet["transactions"].as_array().unwrap() {
        assert_eq!(tx["amount"], "5.00");
    }

    let (next_id, _) = t.create_invoice(merchant, "DEV001", "1.00", 300).await;
    let (status, body) = t
        .send(
            "POST",
            "/api/wallet/pay/",
            Some(payer),
            Some(json!({ "invoice_public_id": next_id })),
        )
        .await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert!(body["detail"].as_str().unwrap().contains("0.00"), "{body}");
}

#[tokio::test]
async fn test_latest_invoice_polling_never_writes() {
    let t = TestApp::new();
    let merchant = Uuid::new_v4();
    let payer = Uuid::new_v4();
    t.register_device(merchant, "DEV001").await;
    let (status, _) = t
        .send("POST", "/api/wallet/topup/", Some(payer), Some(json!({ "preset": 10 })))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let (public_id, token) = t.create_invoice(merchant, "DEV001", "4.00", 60).await;

    let stored_before = t.store.find_invoice(&public_id).await.unwrap();
    let ledger_before = t.store.recent_transactions(payer, 20).await.unwrap();
    let device_before = t.store.find_device("DEV001").await.unwrap();

    for step in 1..=12 {
        t.clock.advance(Duration::seconds(10));

        let (status, pending) = t
            .send("GET", "/api/device/DEV001/latest-invoice/?only_pending=1", None, None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(pending["has_invoice"], step < 6, "step {step}");

        let (_, latest) = t
            .send("GET", "/api/device/DEV001/latest-invoice/", None, None)
            .await;
        assert_eq!(latest["invoice"]["public_id"], public_id.as_str());

        let uri = format!("/api/invoices/{}/?t={}", public_id, token);
        let (status, _) = t.send("GET", &uri, None, None).await;
        assert_eq!(status, StatusCode::OK);
    }

    assert_eq!(t.store.find_invoice(&public_id).await.unwrap(), stored_before);
    assert_eq!(t.store.recent_transactions(payer, 20).await.unwrap(), ledger_before);
    assert_eq!(t.store.find_device("DEV001").await.unwrap(), device_before);
    assert!(t
        .store
        .take_next_command("DEV001", t.clock.now())
        .await
        .unwrap()
        .is_none());
}
