mod common;

use common::{Failure, TestApp, id};
use serde_json::json;
use stayhub::domain::booking::BookingStatus;
use stayhub::domain::payment::{GatewayStatus, PaymentStatus};
use stayhub::domain::ports::{BookingStore, PaymentStore};
use std::sync::Arc;
use uuid::Uuid;

async fn init_payment(app: &TestApp, booking_id: &str) -> String {
    let response = app
        .call(
            "POST",
            "/payments/init",
            Some("guest"),
            json!({"booking_id": booking_id}),
        )
        .await;
    assert_eq!(response.status, 201, "init failed: {:?}", response.body);
    assert_eq!(response.body["payment"]["payment_status"], "PENDING");
    id(&response.body["payment"], "reference")
}

async fn booking_status(app: &TestApp, booking_id: &str) -> BookingStatus {
    app.store
        .get_booking(Uuid::parse_str(booking_id).unwrap())
        .await
        .unwrap()
        .unwrap()
        .status
}

async fn payment_status(app: &TestApp, reference: &str) -> PaymentStatus {
    app.store
        .payment_by_reference(reference)
        .await
        .unwrap()
        .unwrap()
        .payment_status
}

#[tokio::test]
async fn test_init_returns_checkout_url() {
    let (app, booking_id) = TestApp::booked().await;
    let response = app
        .call(
            "POST",
            "/payments/init",
            Some("guest"),
            json!({"booking_id": booking_id, "amount": "300"}),
        )
        .await;
    assert_eq!(response.status, 201);
    let reference = id(&response.body["payment"], "reference");
    assert_eq!(
        response.body["checkout_url"],
        format!("https://checkout.fake/{reference}")
    );

    let checkouts = app.gateway.checkouts.lock().unwrap();
    assert_eq!(checkouts.len(), 1);
    assert_eq!(checkouts[0].email, "guest@example.com");
    assert_eq!(checkouts[0].amount.to_string(), "300.00");
}

#[tokio::test]
async fn test_init_rejects_other_payers_and_wrong_amounts() {
    let (app, booking_id) = TestApp::booked().await;
    let as_host = app
        .call(
            "POST",
            "/payments/init",
            Some("host"),
            json!({"booking_id": booking_id}),
        )
        .await;
    assert_eq!(as_host.status, 403);

    let wrong = app
        .call(
            "POST",
            "/payments/init",
            Some("guest"),
            json!({"booking_id": booking_id, "amount": "1.00"}),
        )
        .await;
    assert_eq!(wrong.status, 400);
    assert!(app.gateway.checkouts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_verify_failed_marks_payment_failed_and_keeps_booking_pending() {
    let (app, booking_id) = TestApp::booked().await;
    let reference = init_payment(&app, &booking_id).await;
    app.gateway.report(GatewayStatus::Failed);

    let response = app
        .call(
            "POST",
            "/payments/verify",
            Some("guest"),
            json!({"tx_ref": reference}),
        )
        .await;
    assert_eq!(response.status, 200);
    assert_eq!(response.body["payment"]["payment_status"], "FAILED");
    assert_eq!(payment_status(&app, &reference).await, PaymentStatus::Failed);
    assert_eq!(booking_status(&app, &booking_id).await, BookingStatus::Pending);
    assert_eq!(app.notifier.count(), 0);
}

#[tokio::test]
async fn test_verify_success_confirms_booking() {
    let (app, booking_id) = TestApp::booked().await;
    let reference = init_payment(&app, &booking_id).await;

    let response = app
        .call(
            "POST",
            "/payments/verify",
            Some("host"),
            json!({"tx_ref": reference}),
        )
        .await;
    assert_eq!(response.status, 200);
    assert_eq!(response.body["message"], "Payment verified successfully");
    assert_eq!(payment_status(&app, &reference).await, PaymentStatus::Success);
    assert_eq!(
        booking_status(&app, &booking_id).await,
        BookingStatus::Confirmed
    );
    assert_eq!(
        app.notifier.sent.lock().unwrap().as_slice(),
        &[("guest@example.com".to_string(), reference)]
    );
}

#[tokio::test]
async fn test_verify_by_stranger_is_forbidden() {
    let (app, booking_id) = TestApp::booked().await;
    let reference = init_payment(&app, &booking_id).await;
    app.signup("stranger", "guest").await;

    let response = app
        .call(
            "POST",
            "/payments/verify",
            Some("stranger"),
            json!({"tx_ref": reference}),
        )
        .await;
    assert_eq!(response.status, 403);
    assert_eq!(app.gateway.verifications.load(std::sync::atomic::Ordering::SeqCst), 0);

    let missing = app
        .call(
            "POST",
            "/payments/verify",
            Some("guest"),
            json!({"tx_ref": "no-such-ref"}),
        )
        .await;
    assert_eq!(missing.status, 404);
}

#[tokio::test]
async fn test_gateway_failures_leave_payment_pending() {
    let (app, booking_id) = TestApp::booked().await;
    let reference = init_payment(&app, &booking_id).await;

    app.gateway.fail(Some(Failure::Error));
    let response = app
        .call(
            "POST",
            "/payments/verify",
            Some("guest"),
            json!({"tx_ref": reference}),
        )
        .await;
    assert_eq!(response.status, 400);
    assert_eq!(response.body["error"], "GatewayError");
    assert!(!response.body["detail"].as_str().unwrap().contains("10.1.2.3"));
    assert_eq!(payment_status(&app, &reference).await, PaymentStatus::Pending);

    app.gateway.fail(Some(Failure::Timeout));
    let response = app
        .call(
            "POST",
            "/payments/init",
            Some("guest"),
            json!({"booking_id": booking_id}),
        )
        .await;
    assert_eq!(response.status, 400);
    assert_eq!(response.body["error"], "GatewayTimeout");
    let payments = app
        .store
        .payments_for_booking(Uuid::parse_str(&booking_id).unwrap())
        .await
        .unwrap();
    assert_eq!(payments.len(), 1);
}

#[tokio::test]
async fn test_webhook_with_unknown_reference_is_404_and_mutates_nothing() {
    let (app, booking_id) = TestApp::booked().await;
    let reference = init_payment(&app, &booking_id).await;

    let response = app
        .call(
            "POST",
            "/payments/webhook",
            None,
            json!({"tx_ref": "unknown-ref", "status": "success"}),
        )
        .await;
    assert_eq!(response.status, 404);
    assert_eq!(payment_status(&app, &reference).await, PaymentStatus::Pending);
    assert_eq!(booking_status(&app, &booking_id).await, BookingStatus::Pending);

    let malformed = app
        .call("POST", "/payments/webhook", None, json!({"status": "success"}))
        .await;
    assert_eq!(malformed.status, 400);
}

#[tokio::test]
async fn test_replayed_success_webhook_applies_once() {
    let (app, booking_id) = TestApp::booked().await;
    let reference = init_payment(&app, &booking_id).await;
    let event = json!({"tx_ref": reference, "status": "success"});

    for _ in 0..3 {
        let response = app
            .call("POST", "/payments/webhook", None, event.clone())
            .await;
        assert_eq!(response.status, 200);
        assert_eq!(response.body["payment_status"], "SUCCESS");
    }
    // A late failure report cannot undo a recorded success.
    let late = app
        .call(
            "POST",
            "/payments/webhook",
            None,
            json!({"tx_ref": reference, "status": "failed"}),
        )
        .await;
    assert_eq!(late.body["payment_status"], "SUCCESS");

    assert_eq!(
        booking_status(&app, &booking_id).await,
        BookingStatus::Confirmed
    );
    assert_eq!(app.notifier.count(), 1);
}

#[tokio::test]
async fn test_paid_booking_cannot_be_charged_again() {
    let (app, booking_id) = TestApp::booked().await;
    let reference = init_payment(&app, &booking_id).await;
    app.call(
        "POST",
        "/payments/webhook",
        None,
        json!({"tx_ref": reference, "status": "success"}),
    )
    .await;

    let again = app
        .call(
            "POST",
            "/payments/init",
            Some("guest"),
            json!({"booking_id": booking_id}),
        )
        .await;
    assert_eq!(again.status, 400);
    assert_eq!(again.body["error"], "Conflict");
    assert_eq!(app.gateway.checkouts.lock().unwrap().len(), 1);
    let payments = app
        .store
        .payments_for_booking(Uuid::parse_str(&booking_id).unwrap())
        .await
        .unwrap();
    assert_eq!(payments.len(), 1);
}

#[tokio::test]
async fn test_failed_then_successful_attempt() {
    let (app, booking_id) = TestApp::booked().await;
    let reference = init_payment(&app, &booking_id).await;

    let failed = app
        .call(
            "POST",
            "/payments/webhook",
            None,
            json!({"tx_ref": reference, "status": "failed"}),
        )
        .await;
    assert_eq!(failed.body["payment_status"], "FAILED");

    let retried = app
        .call(
            "POST",
            "/payments/webhook",
            None,
            json!({"tx_ref": reference, "status": "success"}),
        )
        .await;
    assert_eq!(retried.body["payment_status"], "SUCCESS");
    assert_eq!(
        booking_status(&app, &booking_id).await,
        BookingStatus::Confirmed
    );
}

#[tokio::test]
async fn test_return_page_reports_without_mutating() {
    let (app, booking_id) = TestApp::booked().await;
    let reference = init_payment(&app, &booking_id).await;

    let response = app
        .call(
            "GET",
            &format!("/payments/return?tx_ref={reference}"),
            None,
            json!(null),
        )
        .await;
    assert_eq!(response.status, 200);
    assert_eq!(response.body["payment_status"], "PENDING");
    assert_eq!(response.body["booking_id"], booking_id);
    assert_eq!(app.gateway.verifications.load(std::sync::atomic::Ordering::SeqCst), 0);

    let encoded = app
        .call(
            "GET",
            &format!("/payments/return?tx_ref={}", reference.replace('-', "%2D")),
            None,
            json!(null),
        )
        .await;
    assert_eq!(encoded.status, 200);
    assert_eq!(encoded.body["tx_ref"], reference);

    let missing = app
        .call("GET", "/payments/return?tx_ref=nope", None, json!(null))
        .await;
    assert_eq!(missing.status, 404);
}

#[tokio::test]
async fn test_concurrent_success_webhooks_notify_once() {
    let (app, booking_id) = TestApp::booked().await;
    let reference = init_payment(&app, &booking_id).await;
    let app = Arc::new(app);

    let mut handles = Vec::new();
    for _ in 0..16 {
        let app = app.clone();
        let event = json!({"tx_ref": reference, "status": "success"});
        handles.push(tokio::spawn(async move {
            app.call("POST", "/payments/webhook", None, event).await
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap().status, 200);
    }

    assert_eq!(app.notifier.count(), 1);
    assert_eq!(
        booking_status(&app, &booking_id).await,
        BookingStatus::Confirmed
    );
}
